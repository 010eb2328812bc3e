use crate::error::Result;
use serde::Serialize;
use std::io::Write;

/// One line of the run report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub row: usize,
    pub signer: String,
    pub call: String,
    pub outcome: String,
    pub verdict: String,
}

impl ReportRow {
    pub fn passed(&self) -> bool {
        self.verdict == "pass"
    }
}

/// Writes report rows as CSV with a `row,signer,call,outcome,verdict` header.
pub struct ReportWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_rows<'a>(&mut self, rows: impl IntoIterator<Item = &'a ReportRow>) -> Result<()> {
        for row in rows {
            self.writer.serialize(row)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

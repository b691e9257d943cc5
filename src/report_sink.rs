//! Report sinks
//!
//! A sink consumes the projected rows of one report exactly once.

use std::io::Write;

use serde::Serialize;
use tracing::info;

use crate::errors::Result;
use crate::projection::ProjectedRow;

pub trait ReportSink {
    /// Consume `rows` for `report_name` and return how many were written.
    fn emit(
        &mut self,
        report_name: &str,
        title: &str,
        rows: &mut dyn Iterator<Item = ProjectedRow>,
    ) -> Result<usize>;
}

#[derive(Serialize)]
struct JsonLine<'a> {
    report: &'a str,
    row: &'a ProjectedRow,
}

/// Writes one JSON object per row: `{"report": "...", "row": {...}}`
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ReportSink for JsonLinesSink<W> {
    fn emit(
        &mut self,
        report_name: &str,
        title: &str,
        rows: &mut dyn Iterator<Item = ProjectedRow>,
    ) -> Result<usize> {
        let mut count = 0;
        for row in rows {
            serde_json::to_writer(
                &mut self.writer,
                &JsonLine {
                    report: report_name,
                    row: &row,
                },
            )?;
            self.writer.write_all(b"\n")?;
            count += 1;
        }
        self.writer.flush()?;

        info!(report = report_name, rows = count, "{}", title);
        Ok(count)
    }
}

use std::io::{self, Write};

use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink, UploadReport};
use crate::processor_spec::ProcessorSpec;
use crate::sorting::NwbSorting;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_upload(report: &UploadReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_sorting(sorting: &NwbSorting) -> io::Result<()> {
        Self::print_json(sorting)
    }

    pub fn print_spec(spec: &ProcessorSpec) -> io::Result<()> {
        Self::print_json(spec)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

/// Keeps stdout clean for the JSON document.
impl ProgressSink for JsonOutput {
    fn event(&self, event: ProgressEvent) {
        tracing::info!("{}", event.message);
    }
}

/// Prints every progress message on its own stdout line.
pub struct StdoutSink;

impl ProgressSink for StdoutSink {
    fn event(&self, event: ProgressEvent) {
        let mut stdout = io::stdout().lock();
        let _ = writeln!(stdout, "{}", event.message);
    }
}

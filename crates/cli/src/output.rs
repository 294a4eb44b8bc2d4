use crate::error::CliError;
use engine_runtime::execution::executor::StreamSummary;
use model::records::batch::ResultBatch;
use serde::Serialize;
use std::{
    fs::File,
    io::{self, BufWriter, Write},
};

/// Where streamed batches are written, one JSON document per line.
pub enum BatchWriter {
    Stdout(io::Stdout),
    File(BufWriter<File>),
    Discard,
}

impl BatchWriter {
    pub fn open(path: Option<&str>, quiet: bool) -> Result<Self, CliError> {
        match (path, quiet) {
            (Some(path), _) => Ok(Self::File(BufWriter::new(File::create(path)?))),
            (None, true) => Ok(Self::Discard),
            (None, false) => Ok(Self::Stdout(io::stdout())),
        }
    }

    pub fn write(&mut self, batch: &ResultBatch) -> Result<(), CliError> {
        let line = serde_json::to_string(batch)?;
        match self {
            Self::Stdout(out) => writeln!(out.lock(), "{line}")?,
            Self::File(out) => writeln!(out, "{line}")?,
            Self::Discard => {}
        }
        Ok(())
    }

    pub fn finish(self) -> Result<(), CliError> {
        if let Self::File(mut out) = self {
            out.flush()?;
        }
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SummaryReport<'a> {
    query_id: &'a str,
    batches: usize,
    rows: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    update_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub fn print_summary(query_id: &str, summary: &StreamSummary) -> Result<(), CliError> {
    let report = SummaryReport {
        query_id,
        batches: summary.batches,
        rows: summary.rows,
        state: summary.final_state.map(|state| state.to_string()),
        update_count: summary.update_count,
        error: summary
            .error
            .as_ref()
            .map(|err| format!("{} ({})", err.message, err.error_name)),
    };
    let json = serde_json::to_string_pretty(&report)?;
    eprintln!("{json}");
    Ok(())
}

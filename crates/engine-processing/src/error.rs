use model::{
    core::data_type::DataType,
    query::error::QueryError,
    records::page::PageCodecError,
};
use thiserror::Error;

/// Protocol errors: the caller asked for a token that cannot be served.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CursorError {
    #[error("Result for token {token} is gone: last served token is {last}")]
    ResultGone { token: u64, last: u64 },

    #[error("Result for token {token} not found")]
    ResultNotFound { token: u64 },
}

/// Misuse of the batch assembler. These indicate a bug in the caller and
/// are surfaced as query failures rather than panics.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssemblerError {
    #[error("Rows were supplied before an output schema was set")]
    SchemaRequired,

    #[error("Page has {actual} channels but the schema has {expected} columns")]
    SchemaMismatch { expected: usize, actual: usize },
}

/// A value or page that could not be converted for the client.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Column '{column}' expects {expected} but found {found}")]
    TypeMismatch {
        column: String,
        expected: DataType,
        found: &'static str,
    },

    #[error("Value {value} for column '{column}' is out of range for {data_type}")]
    Overflow {
        column: String,
        data_type: DataType,
        value: i64,
    },

    #[error("Failed to decode page: {0}")]
    Page(#[from] PageCodecError),

    #[error(transparent)]
    Assembler(#[from] AssemblerError),
}

/// Receives faults found while assembling a batch.
pub trait FaultSink {
    fn report(&mut self, fault: QueryError);
}

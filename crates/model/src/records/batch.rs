use crate::{
    core::identifiers::QueryId,
    query::{
        error::QueryError,
        snapshot::{SessionUpdates, Warning},
        stats::StatementStats,
    },
    records::column::Column,
};
use serde::Serialize;
use xxhash_rust::xxh3::xxh3_64_with_seed;

/// A converted row, one JSON value per column.
pub type Row = Vec<serde_json::Value>;

/// The client-visible unit served for one token.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultBatch {
    pub id: String,
    pub query_id: QueryId,
    pub token: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<Column>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Row>>,
    pub stats: StatementStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<QueryError>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Warning>,
    #[serde(skip_serializing_if = "SessionUpdates::is_empty")]
    pub session: SessionUpdates,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_count: Option<u64>,
    pub next_token: Option<u64>,
    pub manifest: Manifest,
    pub ts: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub row_count: usize,
    pub checksum_xxh3: u64, // rolling checksum over canonical row bytes
}

pub fn manifest_for(rows: &[Row]) -> Manifest {
    let mut h: u64 = 0;
    for row in rows {
        let bytes = serde_json::to_vec(row).unwrap_or_default();
        h = xxh3_64_with_seed(&bytes, h);
    }

    Manifest {
        row_count: rows.len(),
        checksum_xxh3: h,
    }
}

impl ResultBatch {
    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    pub fn row_count(&self) -> usize {
        self.data.as_ref().map_or(0, Vec::len)
    }

    /// True when no further token will be served after this batch.
    pub fn is_terminal(&self) -> bool {
        self.next_token.is_none()
    }

    pub fn rows(&self) -> &[Row] {
        self.data.as_deref().unwrap_or(&[])
    }
}

use std::time::Duration;

/// What kind of statement the simulated query executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// Produces rows through an output stage.
    Select,
    /// No output stage; finishes without producing pages.
    Ddl,
    /// Reports an affected-row count through a single-value output.
    Update { rows: u64 },
}

/// Shape of a simulated query execution.
#[derive(Debug, Clone)]
pub struct SimulationSettings {
    pub statement: StatementKind,
    /// Number of output buffers (one producing task per location).
    pub locations: usize,
    pub pages_per_location: usize,
    pub rows_per_page: usize,
    /// Pause between pages of one location.
    pub page_delay: Duration,
    /// Global page index (location-major) whose first row carries a value
    /// of the wrong type.
    pub corrupt_page: Option<usize>,
    /// Location index whose task fails with a transport error after its
    /// first page.
    pub failing_location: Option<usize>,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            statement: StatementKind::Select,
            locations: 2,
            pages_per_location: 5,
            rows_per_page: 100,
            page_delay: Duration::from_millis(5),
            corrupt_page: None,
            failing_location: None,
        }
    }
}

impl SimulationSettings {
    pub fn total_pages(&self) -> usize {
        match self.statement {
            StatementKind::Select => self.locations * self.pages_per_location,
            StatementKind::Update { .. } => 1,
            StatementKind::Ddl => 0,
        }
    }

    pub fn total_rows(&self) -> usize {
        match self.statement {
            StatementKind::Select => self.total_pages() * self.rows_per_page,
            StatementKind::Update { .. } => 1,
            StatementKind::Ddl => 0,
        }
    }
}

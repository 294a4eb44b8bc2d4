use crate::core::data_type::DataType;
use serde::{Deserialize, Serialize};

/// Client-visible output column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Zips parallel name/type lists into columns. Returns `None` when the
/// lists disagree in length.
pub fn columns_from(names: &[String], types: &[DataType]) -> Option<Vec<Column>> {
    if names.len() != types.len() {
        return None;
    }

    Some(
        names
            .iter()
            .zip(types)
            .map(|(name, data_type)| Column::new(name.clone(), data_type.clone()))
            .collect(),
    )
}

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt};
use thiserror::Error;

/// SQL type of an output column, as announced to clients.
///
/// Serialized as its type signature (`bigint`, `array(varchar)`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum DataType {
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    VarChar,
    VarBinary,
    Date,
    Timestamp,
    Json,
    Uuid,
    Array(Box<DataType>),
    /// Type of an untyped `NULL` literal; only nulls convert.
    Unknown,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum DataTypeError {
    #[error("Unknown type signature: {0}")]
    UnknownSignature(String),
}

lazy_static! {
    static ref TYPE_MAP: HashMap<&'static str, DataType> = build_type_map();
}

impl DataType {
    pub fn from_signature(signature: &str) -> Result<Self, DataTypeError> {
        let normalized = Self::normalize_signature(signature);

        if let Some(element) = normalized
            .strip_prefix("array(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            let element = DataType::from_signature(element)?;
            return Ok(DataType::Array(Box::new(element)));
        }

        TYPE_MAP
            .get(normalized.as_str())
            .cloned()
            .ok_or_else(|| DataTypeError::UnknownSignature(signature.to_string()))
    }

    pub fn signature(&self) -> String {
        match self {
            DataType::Boolean => "boolean".to_string(),
            DataType::TinyInt => "tinyint".to_string(),
            DataType::SmallInt => "smallint".to_string(),
            DataType::Integer => "integer".to_string(),
            DataType::BigInt => "bigint".to_string(),
            DataType::Real => "real".to_string(),
            DataType::Double => "double".to_string(),
            DataType::VarChar => "varchar".to_string(),
            DataType::VarBinary => "varbinary".to_string(),
            DataType::Date => "date".to_string(),
            DataType::Timestamp => "timestamp(3)".to_string(),
            DataType::Json => "json".to_string(),
            DataType::Uuid => "uuid".to_string(),
            DataType::Array(element) => format!("array({})", element.signature()),
            DataType::Unknown => "unknown".to_string(),
        }
    }

    /// Inclusive value range for the integral types.
    pub fn integral_range(&self) -> Option<(i64, i64)> {
        match self {
            DataType::TinyInt => Some((i8::MIN as i64, i8::MAX as i64)),
            DataType::SmallInt => Some((i16::MIN as i64, i16::MAX as i64)),
            DataType::Integer => Some((i32::MIN as i64, i32::MAX as i64)),
            DataType::BigInt => Some((i64::MIN, i64::MAX)),
            _ => None,
        }
    }

    pub fn is_integral(&self) -> bool {
        self.integral_range().is_some()
    }

    fn normalize_signature(signature: &str) -> String {
        signature
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase()
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.signature())
    }
}

impl From<DataType> for String {
    fn from(data_type: DataType) -> Self {
        data_type.signature()
    }
}

impl TryFrom<String> for DataType {
    type Error = DataTypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        DataType::from_signature(&s)
    }
}

impl TryFrom<&str> for DataType {
    type Error = DataTypeError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        DataType::from_signature(s)
    }
}

fn build_type_map() -> HashMap<&'static str, DataType> {
    use DataType::*;

    let entries = [
        ("boolean", Boolean),
        ("bool", Boolean),
        ("tinyint", TinyInt),
        ("smallint", SmallInt),
        ("integer", Integer),
        ("int", Integer),
        ("bigint", BigInt),
        ("real", Real),
        ("float", Real),
        ("double", Double),
        ("varchar", VarChar),
        ("char", VarChar),
        ("varbinary", VarBinary),
        ("date", Date),
        ("timestamp", Timestamp),
        ("timestamp(3)", Timestamp),
        ("json", Json),
        ("uuid", Uuid),
        ("unknown", Unknown),
    ];

    let mut map = HashMap::new();
    for (name, data_type) in entries {
        map.insert(name, data_type);
    }
    map
}

use crate::error::{AssemblerError, DecodeError, FaultSink};
use model::{
    core::{data_type::DataType, value::Value},
    query::error::{QueryError, StandardErrorCode},
    records::{batch::Row, column::Column, page::Page},
};
use serde_json::Value as JsonValue;
use tracing::warn;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Builds the client rows of one batch from drained pages.
///
/// The schema is fixed at construction. A value that cannot be converted drops its
/// row and is reported to the fault sink; the remaining rows are kept.
#[derive(Debug, Default)]
pub struct BatchAssembler {
    columns: Option<Vec<Column>>,
    rows: Vec<Row>,
}

impl BatchAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(columns: Vec<Column>) -> Self {
        Self {
            columns: Some(columns),
            rows: Vec::new(),
        }
    }

    /// One boolean column holding a single value, for statements that
    /// produce no output of their own.
    pub fn single_boolean(name: &str, value: bool) -> Self {
        Self {
            columns: Some(vec![Column::new(name, DataType::Boolean)]),
            rows: vec![vec![JsonValue::Bool(value)]],
        }
    }

    /// Converts every row of `page`, returning the number of rows kept.
    pub fn add_page(
        &mut self,
        page: &Page,
        faults: &mut dyn FaultSink,
    ) -> Result<usize, AssemblerError> {
        let columns = self
            .columns
            .as_ref()
            .ok_or(AssemblerError::SchemaRequired)?;

        if page.channel_count() != columns.len() {
            return Err(AssemblerError::SchemaMismatch {
                expected: columns.len(),
                actual: page.channel_count(),
            });
        }

        let mut kept = 0;
        for position in 0..page.position_count() {
            match convert_row(columns, page.row(position)) {
                Ok(row) => {
                    self.rows.push(row);
                    kept += 1;
                }
                Err(err) => {
                    warn!(position, error = %err, "Dropping row that failed to convert");
                    faults.report(QueryError::from_error(
                        StandardErrorCode::SerializationError,
                        &err,
                    ));
                }
            }
        }

        Ok(kept)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn columns(&self) -> Option<&[Column]> {
        self.columns.as_deref()
    }

    /// The affected-row count of an update statement: one row holding one
    /// non-negative integral value.
    pub fn update_count(&self) -> Option<u64> {
        let [column] = self.columns.as_deref()? else {
            return None;
        };
        if !column.data_type.is_integral() {
            return None;
        }
        match self.rows.as_slice() {
            [row] => row.first()?.as_u64(),
            _ => None,
        }
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

fn convert_row<'a>(
    columns: &[Column],
    values: impl Iterator<Item = &'a Value>,
) -> Result<Row, DecodeError> {
    columns
        .iter()
        .zip(values)
        .map(|(column, value)| to_client_value(value, &column.data_type, &column.name))
        .collect()
}

/// Converts one engine value into its client representation for `data_type`.
pub fn to_client_value(
    value: &Value,
    data_type: &DataType,
    column: &str,
) -> Result<JsonValue, DecodeError> {
    let mismatch = || DecodeError::TypeMismatch {
        column: column.to_string(),
        expected: data_type.clone(),
        found: value.kind(),
    };

    if value.is_null() {
        return Ok(JsonValue::Null);
    }

    match (data_type, value) {
        (DataType::Boolean, Value::Boolean(b)) => Ok(JsonValue::Bool(*b)),

        (DataType::TinyInt | DataType::SmallInt | DataType::Integer | DataType::BigInt, Value::Int(v)) => {
            let (min, max) = data_type.integral_range().ok_or_else(mismatch)?;
            if *v < min || *v > max {
                return Err(DecodeError::Overflow {
                    column: column.to_string(),
                    data_type: data_type.clone(),
                    value: *v,
                });
            }
            Ok(JsonValue::from(*v))
        }

        (DataType::Real | DataType::Double, Value::Int(v)) => Ok(JsonValue::from(*v as f64)),
        (DataType::Real | DataType::Double, Value::Float(f)) => Ok(float_value(*f)),

        (DataType::VarChar, Value::String(s)) => Ok(JsonValue::String(s.clone())),
        (DataType::VarBinary, Value::Bytes(bytes)) => Ok(JsonValue::String(hex(bytes))),
        (DataType::Date, Value::Date(d)) => Ok(JsonValue::String(d.format("%Y-%m-%d").to_string())),
        (DataType::Timestamp, Value::Timestamp(ts)) => {
            Ok(JsonValue::String(ts.format(TIMESTAMP_FORMAT).to_string()))
        }
        (DataType::Json, Value::Json(v)) => Ok(JsonValue::String(v.to_string())),
        (DataType::Uuid, Value::Uuid(u)) => Ok(JsonValue::String(u.to_string())),

        (DataType::Array(element), Value::Array(items)) => items
            .iter()
            .map(|item| to_client_value(item, element, column))
            .collect::<Result<Vec<_>, _>>()
            .map(JsonValue::Array),

        _ => Err(mismatch()),
    }
}

fn float_value(f: f64) -> JsonValue {
    if f.is_nan() {
        JsonValue::String("NaN".into())
    } else if f.is_infinite() {
        let label = if f > 0.0 { "Infinity" } else { "-Infinity" };
        JsonValue::String(label.into())
    } else {
        serde_json::Number::from_f64(f).map_or(JsonValue::Null, JsonValue::Number)
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use serde_json::json;

    #[derive(Default)]
    struct Collect(Vec<QueryError>);

    impl FaultSink for Collect {
        fn report(&mut self, fault: QueryError) {
            self.0.push(fault);
        }
    }

    fn schema() -> Vec<Column> {
        vec![
            Column::new("id", DataType::Integer),
            Column::new("name", DataType::VarChar),
        ]
    }

    #[test]
    fn converts_rows_in_order() {
        let mut assembler = BatchAssembler::with_schema(schema());
        let page = Page::from_rows(vec![
            vec![Value::Int(1), Value::String("a".into())],
            vec![Value::Int(2), Value::Null],
        ]);

        let mut faults = Collect::default();
        assert_eq!(assembler.add_page(&page, &mut faults).unwrap(), 2);
        assert!(faults.0.is_empty());
        assert_eq!(
            assembler.into_rows(),
            vec![vec![json!(1), json!("a")], vec![json!(2), JsonValue::Null]]
        );
    }

    #[test]
    fn faulty_row_is_dropped_and_reported() {
        let mut assembler = BatchAssembler::with_schema(schema());
        let page = Page::from_rows(vec![
            vec![Value::Int(1), Value::String("a".into())],
            vec![Value::String("bad".into()), Value::String("b".into())],
            vec![Value::Int(3), Value::String("c".into())],
        ]);

        let mut faults = Collect::default();
        assert_eq!(assembler.add_page(&page, &mut faults).unwrap(), 2);
        assert_eq!(faults.0.len(), 1);
        assert!(faults.0[0].is(StandardErrorCode::SerializationError));
        assert_eq!(assembler.row_count(), 2);
    }

    #[test]
    fn rows_without_schema_are_rejected() {
        let mut assembler = BatchAssembler::new();
        let page = Page::from_rows(vec![vec![Value::Int(1)]]);
        assert_eq!(
            assembler.add_page(&page, &mut Collect::default()),
            Err(AssemblerError::SchemaRequired)
        );
    }

    #[test]
    fn channel_count_must_match_schema() {
        let mut assembler = BatchAssembler::with_schema(schema());
        let page = Page::from_rows(vec![vec![Value::Int(1)]]);
        assert_eq!(
            assembler.add_page(&page, &mut Collect::default()),
            Err(AssemblerError::SchemaMismatch {
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn update_count_requires_single_integral_value() {
        let mut assembler = BatchAssembler::with_schema(vec![Column::new("rows", DataType::BigInt)]);
        assert_eq!(assembler.update_count(), None);

        let page = Page::from_rows(vec![vec![Value::Int(42)]]);
        assembler.add_page(&page, &mut Collect::default()).unwrap();
        assert_eq!(assembler.update_count(), Some(42));

        let ddl = BatchAssembler::single_boolean("result", true);
        assert_eq!(ddl.update_count(), None);
        assert_eq!(ddl.row_count(), 1);
    }

    #[test]
    fn integral_values_are_range_checked() {
        let err = to_client_value(&Value::Int(300), &DataType::TinyInt, "c").unwrap_err();
        assert!(matches!(err, DecodeError::Overflow { value: 300, .. }));
    }

    #[test]
    fn client_representations() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();

        let cases = [
            (Value::Float(f64::NAN), DataType::Double, json!("NaN")),
            (Value::Float(f64::NEG_INFINITY), DataType::Real, json!("-Infinity")),
            (Value::Bytes(vec![0xde, 0xad]), DataType::VarBinary, json!("dead")),
            (Value::Date(date), DataType::Date, json!("2024-01-02")),
            (Value::Timestamp(ts), DataType::Timestamp, json!("2024-01-02 03:04:05.000")),
            (Value::Json(json!({"k": 1})), DataType::Json, json!("{\"k\":1}")),
            (
                Value::Array(vec![Value::Int(1), Value::Null]),
                DataType::Array(Box::new(DataType::BigInt)),
                json!([1, null]),
            ),
            (Value::Null, DataType::Unknown, JsonValue::Null),
        ];

        for (value, data_type, expected) in cases {
            assert_eq!(to_client_value(&value, &data_type, "c").unwrap(), expected);
        }
    }

    #[test]
    fn unknown_type_only_accepts_null() {
        let err = to_client_value(&Value::Int(1), &DataType::Unknown, "c").unwrap_err();
        assert!(matches!(err, DecodeError::TypeMismatch { found: "int", .. }));
    }
}

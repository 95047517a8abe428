//! Materialized result tables
//!
//! A [`ResultTable`] is the row-oriented form of a query result. It converts
//! to and from Arrow [`RecordBatch`]es, which serve as the columnar form and
//! as the in-memory entity input.

use crate::error::{Error, Result};
use crate::type_map::{resolve_arrow_type, to_arrow};
use crate::types::{ColumnSchema, Value, ValueType};
use arrow::array::{
    Array, ArrayRef, BinaryArray, BooleanArray, Date32Array, Float32Array, Float64Array,
    Int32Array, Int64Array, RecordBatch, StringArray, TimestampMicrosecondArray,
};
use arrow::compute::cast;
use arrow::datatypes::{Field, Schema};
use chrono::Datelike;
use std::sync::Arc;

/// Days from 0001-01-01 (CE) to 1970-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Row-oriented, fully materialized table
#[derive(Debug, Clone, PartialEq)]
pub struct ResultTable {
    columns: Vec<ColumnSchema>,
    rows: Vec<Vec<Value>>,
}

impl ResultTable {
    /// Creates a table, checking that every row matches the column count
    pub fn new(columns: Vec<ColumnSchema>, rows: Vec<Vec<Value>>) -> Result<Self> {
        if let Some((idx, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(Error::internal(format!(
                "Row {} has {} values but the table has {} columns",
                idx,
                row.len(),
                columns.len()
            )));
        }
        Ok(Self { columns, rows })
    }

    pub fn empty(columns: Vec<ColumnSchema>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Vec<Value>> {
        self.rows
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Value of column `name` in row `row`
    pub fn value(&self, row: usize, name: &str) -> Option<&Value> {
        let idx = self.column_index(name)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Converts the table into a single Arrow record batch
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let fields: Vec<Field> = self
            .columns
            .iter()
            .map(|c| Field::new(&c.name, to_arrow(c.value_type), true))
            .collect();
        let schema = Arc::new(Schema::new(fields));

        let arrays = self
            .columns
            .iter()
            .enumerate()
            .map(|(idx, column)| build_array(column, self.rows.iter().map(|r| &r[idx])))
            .collect::<Result<Vec<ArrayRef>>>()?;

        RecordBatch::try_new(schema, arrays).map_err(|e| Error::internal(e.to_string()))
    }

    /// Reads an Arrow record batch into a row-oriented table
    ///
    /// Every column must have a canonical type; nested columns fail with
    /// `UnsupportedColumnType`.
    pub fn from_record_batch(batch: &RecordBatch) -> Result<Self> {
        let schema = batch.schema();
        let mut columns = Vec::with_capacity(schema.fields().len());
        let mut column_values = Vec::with_capacity(schema.fields().len());

        for (field, array) in schema.fields().iter().zip(batch.columns()) {
            let value_type = resolve_arrow_type(field.name(), field.data_type())?;
            column_values.push(read_array(field.name(), value_type, array)?);
            columns.push(ColumnSchema::new(field.name().clone(), value_type));
        }

        let mut rows: Vec<Vec<Value>> = (0..batch.num_rows())
            .map(|_| Vec::with_capacity(columns.len()))
            .collect();
        for values in column_values {
            for (row, value) in rows.iter_mut().zip(values) {
                row.push(value);
            }
        }

        Ok(Self { columns, rows })
    }
}

fn mismatch(column: &ColumnSchema, value: &Value) -> Error {
    Error::internal(format!(
        "Value {:?} does not match type {} of column '{}'",
        value, column.value_type, column.name
    ))
}

fn build_array<'a>(
    column: &ColumnSchema,
    values: impl Iterator<Item = &'a Value>,
) -> Result<ArrayRef> {
    macro_rules! collect {
        ($variant:ident, $array:ty, $conv:expr) => {{
            let values = values
                .map(|value| match value {
                    Value::Null => Ok(None),
                    Value::$variant(v) => Ok(Some(($conv)(v))),
                    other => Err(mismatch(column, other)),
                })
                .collect::<Result<Vec<_>>>()?;
            Arc::new(<$array>::from(values)) as ArrayRef
        }};
    }

    let array = match column.value_type {
        ValueType::Int32 => collect!(Int32, Int32Array, |v: &i32| *v),
        ValueType::Int64 => collect!(Int64, Int64Array, |v: &i64| *v),
        ValueType::Float32 => collect!(Float32, Float32Array, |v: &f32| *v),
        ValueType::Float64 => collect!(Float64, Float64Array, |v: &f64| *v),
        ValueType::Bool => collect!(Bool, BooleanArray, |v: &bool| *v),
        ValueType::String => collect!(String, StringArray, |v: &String| v.clone()),
        ValueType::Timestamp => collect!(
            Timestamp,
            TimestampMicrosecondArray,
            |v: &chrono::NaiveDateTime| v.and_utc().timestamp_micros()
        ),
        ValueType::Date => collect!(Date, Date32Array, |v: &chrono::NaiveDate| {
            v.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
        }),
        ValueType::Binary => {
            let values = values
                .map(|value| match value {
                    Value::Null => Ok(None),
                    Value::Binary(v) => Ok(Some(v.as_slice())),
                    other => Err(mismatch(column, other)),
                })
                .collect::<Result<Vec<_>>>()?;
            Arc::new(BinaryArray::from_opt_vec(values)) as ArrayRef
        }
    };
    Ok(array)
}

fn read_array(name: &str, value_type: ValueType, array: &ArrayRef) -> Result<Vec<Value>> {
    let array = cast(array, &to_arrow(value_type))
        .map_err(|e| Error::unsupported_column(name, format!("{} ({})", array.data_type(), e)))?;

    macro_rules! read {
        ($array:ty, |$arr:ident, $i:ident| $value:expr) => {{
            let $arr = array
                .as_any()
                .downcast_ref::<$array>()
                .ok_or_else(|| Error::internal(format!("Unexpected array type for '{}'", name)))?;
            (0..$arr.len())
                .map(|$i| {
                    if $arr.is_null($i) {
                        Ok(Value::Null)
                    } else {
                        $value
                    }
                })
                .collect::<Result<Vec<Value>>>()
        }};
    }

    match value_type {
        ValueType::Int32 => read!(Int32Array, |a, i| Ok(Value::Int32(a.value(i)))),
        ValueType::Int64 => read!(Int64Array, |a, i| Ok(Value::Int64(a.value(i)))),
        ValueType::Float32 => read!(Float32Array, |a, i| Ok(Value::Float32(a.value(i)))),
        ValueType::Float64 => read!(Float64Array, |a, i| Ok(Value::Float64(a.value(i)))),
        ValueType::Bool => read!(BooleanArray, |a, i| Ok(Value::Bool(a.value(i)))),
        ValueType::String => read!(StringArray, |a, i| Ok(Value::String(a.value(i).to_string()))),
        ValueType::Timestamp => read!(TimestampMicrosecondArray, |a, i| a
            .value_as_datetime(i)
            .map(Value::Timestamp)
            .ok_or_else(|| Error::invalid_input(format!("Timestamp out of range in '{}'", name)))),
        ValueType::Date => read!(Date32Array, |a, i| a
            .value_as_date(i)
            .map(Value::Date)
            .ok_or_else(|| Error::invalid_input(format!("Date out of range in '{}'", name)))),
        ValueType::Binary => read!(BinaryArray, |a, i| Ok(Value::Binary(a.value(i).to_vec()))),
    }
}

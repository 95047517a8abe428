//! Type Mapper
//!
//! Bidirectional mapping between canonical [`ValueType`]s, warehouse column
//! type names and Arrow data types.
//!
//! Backend names are emitted in their Hive spelling (`bigint`, `double`,
//! `string`, ...). DuckDB accepts every one of those as an alias, so a single
//! spelling serves both dialects. The reverse direction accepts both
//! vocabularies.

use crate::error::{Error, Result};
use crate::types::ValueType;
use arrow::datatypes::{DataType, TimeUnit};

/// Warehouse type name for a canonical type
pub fn to_backend(value_type: ValueType) -> &'static str {
    match value_type {
        ValueType::Int32 => "int",
        ValueType::Int64 => "bigint",
        ValueType::Float32 => "float",
        ValueType::Float64 => "double",
        ValueType::Bool => "boolean",
        ValueType::String => "string",
        ValueType::Timestamp => "timestamp",
        ValueType::Date => "date",
        ValueType::Binary => "binary",
    }
}

/// Canonical type for a warehouse type name
///
/// Matching is case-insensitive and ignores type parameters such as
/// `varchar(64)` or `timestamp(6)`. Nested types (`array<...>`, `struct<...>`,
/// `map<...>`, `INTEGER[]`) and unknown names return `None`.
pub fn to_canonical(type_name: &str) -> Option<ValueType> {
    let normalized = type_name.trim().to_ascii_lowercase();
    if normalized.ends_with("[]") || normalized.contains('<') {
        return None;
    }
    let base = match normalized.find('(') {
        Some(idx) => normalized[..idx].trim(),
        None => normalized.as_str(),
    };

    let value_type = match base {
        "tinyint" | "smallint" | "int" | "integer" | "int1" | "int2" | "int4" | "utinyint"
        | "usmallint" => ValueType::Int32,
        "bigint" | "int8" | "long" | "uinteger" => ValueType::Int64,
        "float" | "real" | "float4" => ValueType::Float32,
        "double" | "double precision" | "float8" => ValueType::Float64,
        "boolean" | "bool" => ValueType::Bool,
        "string" | "varchar" | "char" | "text" | "bpchar" => ValueType::String,
        "timestamp" | "datetime" | "timestamp_s" | "timestamp_ms" | "timestamp_ns"
        | "timestamp_us" | "timestamptz" | "timestamp with time zone" => ValueType::Timestamp,
        "date" => ValueType::Date,
        "binary" | "blob" | "bytea" | "varbinary" => ValueType::Binary,
        _ => return None,
    };
    Some(value_type)
}

/// Canonical type for a named column, failing with `UnsupportedColumnType`
pub fn resolve_column_type(column: &str, type_name: &str) -> Result<ValueType> {
    to_canonical(type_name).ok_or_else(|| Error::unsupported_column(column, type_name))
}

/// Arrow data type used to carry a canonical type in record batches
pub fn to_arrow(value_type: ValueType) -> DataType {
    match value_type {
        ValueType::Int32 => DataType::Int32,
        ValueType::Int64 => DataType::Int64,
        ValueType::Float32 => DataType::Float32,
        ValueType::Float64 => DataType::Float64,
        ValueType::Bool => DataType::Boolean,
        ValueType::String => DataType::Utf8,
        ValueType::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, None),
        ValueType::Date => DataType::Date32,
        ValueType::Binary => DataType::Binary,
    }
}

/// Canonical type for an Arrow data type
///
/// Lists, structs, maps, unions, decimals and `UInt64` (which does not fit
/// the signed integer range) are unsupported.
pub fn from_arrow(data_type: &DataType) -> Option<ValueType> {
    let value_type = match data_type {
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::UInt8 | DataType::UInt16 => {
            ValueType::Int32
        }
        DataType::Int64 | DataType::UInt32 => ValueType::Int64,
        DataType::Float16 | DataType::Float32 => ValueType::Float32,
        DataType::Float64 => ValueType::Float64,
        DataType::Boolean => ValueType::Bool,
        DataType::Utf8 | DataType::LargeUtf8 => ValueType::String,
        DataType::Timestamp(_, _) => ValueType::Timestamp,
        DataType::Date32 | DataType::Date64 => ValueType::Date,
        DataType::Binary | DataType::LargeBinary | DataType::FixedSizeBinary(_) => {
            ValueType::Binary
        }
        _ => return None,
    };
    Some(value_type)
}

/// Canonical type for an Arrow column, failing with `UnsupportedColumnType`
pub fn resolve_arrow_type(column: &str, data_type: &DataType) -> Result<ValueType> {
    from_arrow(data_type).ok_or_else(|| Error::unsupported_column(column, data_type.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::Field;
    use std::sync::Arc;

    #[test]
    fn test_round_trip_stays_in_category() {
        for value_type in ValueType::ALL {
            let back = to_canonical(to_backend(value_type)).unwrap();
            assert_eq!(back.category(), value_type.category(), "{}", value_type);
        }
    }

    #[test]
    fn test_duckdb_names() {
        assert_eq!(to_canonical("VARCHAR"), Some(ValueType::String));
        assert_eq!(to_canonical("INTEGER"), Some(ValueType::Int32));
        assert_eq!(to_canonical("BIGINT"), Some(ValueType::Int64));
        assert_eq!(to_canonical("TIMESTAMP WITH TIME ZONE"), Some(ValueType::Timestamp));
        assert_eq!(to_canonical("BLOB"), Some(ValueType::Binary));
        assert_eq!(to_canonical("varchar(64)"), Some(ValueType::String));
    }

    #[test]
    fn test_nested_types_rejected() {
        assert_eq!(to_canonical("array<string>"), None);
        assert_eq!(to_canonical("struct<a:int>"), None);
        assert_eq!(to_canonical("INTEGER[]"), None);
        assert_eq!(to_canonical("decimal(10,2)"), None);

        let err = resolve_column_type("tags", "array<string>").unwrap_err();
        assert!(matches!(err, Error::UnsupportedColumnType { ref column, .. } if column == "tags"));
    }

    #[test]
    fn test_arrow_mapping() {
        for value_type in ValueType::ALL {
            assert_eq!(from_arrow(&to_arrow(value_type)), Some(value_type));
        }
        assert_eq!(
            from_arrow(&DataType::Timestamp(TimeUnit::Nanosecond, Some("UTC".into()))),
            Some(ValueType::Timestamp)
        );

        let list = DataType::List(Arc::new(Field::new("item", DataType::Int64, true)));
        assert_eq!(from_arrow(&list), None);
        assert!(resolve_arrow_type("scores", &list).is_err());
        assert_eq!(from_arrow(&DataType::UInt64), None);
    }
}

//! SQL dialects
//!
//! The compiler and the stager emit the same statements for every backend;
//! only the spelling of a handful of constructs differs. [`SqlDialect`]
//! owns those spellings.

use crate::types::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Timestamp literal format (`YYYY-MM-DD HH:MM:SS.ffffff`)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Date literal format
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    Hive,
    #[serde(alias = "duck_db")]
    DuckDb,
}

impl SqlDialect {
    /// Name used in configuration files (`type: hive`)
    pub fn name(self) -> &'static str {
        match self {
            SqlDialect::Hive => "hive",
            SqlDialect::DuckDb => "duckdb",
        }
    }

    /// Quotes an identifier, splitting on `.` so that `db.table` stays qualified
    pub fn quote_identifier(self, ident: &str) -> String {
        ident
            .split('.')
            .map(|part| self.quote_part(part))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Quotes a single identifier part; dots are kept verbatim
    pub fn quote_part(self, part: &str) -> String {
        match self {
            SqlDialect::Hive => format!("`{}`", part.replace('`', "``")),
            SqlDialect::DuckDb => format!("\"{}\"", part.replace('"', "\"\"")),
        }
    }

    /// Renders a string literal
    pub fn quote_string(self, value: &str) -> String {
        match self {
            SqlDialect::Hive => {
                let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
                format!("'{}'", escaped)
            }
            SqlDialect::DuckDb => format!("'{}'", value.replace('\'', "''")),
        }
    }

    /// Type used when casting a key or timestamp to text
    pub fn text_type(self) -> &'static str {
        match self {
            SqlDialect::Hive => "STRING",
            SqlDialect::DuckDb => "VARCHAR",
        }
    }

    /// `expr - seconds` on a timestamp expression
    ///
    /// Interval arithmetic keeps the result a timestamp with its fractional
    /// seconds.
    pub fn subtract_seconds(self, expr: &str, seconds: u64) -> String {
        match self {
            SqlDialect::Hive => format!("({} - INTERVAL '{}' SECOND)", expr, seconds),
            SqlDialect::DuckDb => format!("({} - INTERVAL {} SECOND)", expr, seconds),
        }
    }

    /// Equality operator that treats two NULLs as equal
    pub fn null_safe_eq(self) -> &'static str {
        match self {
            SqlDialect::Hive => "<=>",
            SqlDialect::DuckDb => "IS NOT DISTINCT FROM",
        }
    }

    /// Prefix of a multi-row insert statement
    pub fn insert_prefix(self) -> &'static str {
        match self {
            SqlDialect::Hive => "INSERT INTO TABLE",
            SqlDialect::DuckDb => "INSERT INTO",
        }
    }

    /// Whether `ROW_NUMBER() OVER (...)` is available by default
    pub fn supports_window_functions(self) -> bool {
        match self {
            SqlDialect::Hive | SqlDialect::DuckDb => true,
        }
    }

    /// Statements issued once per retrieval before any staging
    ///
    /// The batch-window prefilter cross joins a one-row bounds table, which
    /// Hive's strict mode rejects unless the cartesian check is disabled.
    pub fn session_preamble(self, settings: &BTreeMap<String, String>) -> Vec<String> {
        match self {
            SqlDialect::Hive => {
                let mut statements =
                    vec!["SET hive.strict.checks.cartesian.product=false".to_string()];
                statements.extend(settings.iter().map(|(k, v)| format!("SET {}={}", k, v)));
                statements
            }
            SqlDialect::DuckDb => Vec::new(),
        }
    }

    /// Renders a value as a literal of this dialect
    ///
    /// Strings, timestamps and dates are quoted; every other type is emitted
    /// bare. Timestamps are cast back so that comparisons stay typed.
    pub fn literal(self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Int32(v) => v.to_string(),
            Value::Int64(v) => v.to_string(),
            Value::Float32(v) => float_literal(self, *v),
            Value::Float64(v) => float_literal(self, *v),
            Value::Bool(v) => if *v { "TRUE" } else { "FALSE" }.to_string(),
            Value::String(s) => self.quote_string(s),
            Value::Timestamp(ts) => format!(
                "CAST({} AS TIMESTAMP)",
                self.quote_string(&ts.format(TIMESTAMP_FORMAT).to_string())
            ),
            Value::Date(d) => format!(
                "CAST({} AS DATE)",
                self.quote_string(&d.format(DATE_FORMAT).to_string())
            ),
            Value::Binary(bytes) => {
                let hex: String = bytes.iter().map(|b| format!("{:02X}", b)).collect();
                match self {
                    SqlDialect::Hive => format!("unhex('{}')", hex),
                    SqlDialect::DuckDb => format!("from_hex('{}')", hex),
                }
            }
        }
    }

    /// Renders a value inside an `INSERT ... VALUES` row
    ///
    /// Timestamps and dates are plain quoted strings here; the target column
    /// type converts them.
    pub fn insert_literal(self, value: &Value) -> String {
        match value {
            Value::Timestamp(ts) => self.quote_string(&ts.format(TIMESTAMP_FORMAT).to_string()),
            Value::Date(d) => self.quote_string(&d.format(DATE_FORMAT).to_string()),
            other => self.literal(other),
        }
    }
}

fn float_literal<F>(dialect: SqlDialect, v: F) -> String
where
    F: Into<f64> + fmt::Debug + Copy,
{
    let wide: f64 = v.into();
    if wide.is_finite() {
        // `{:?}` keeps a decimal point (1.0 rather than 1) and the shortest
        // digits that round-trip in the value's own width
        format!("{:?}", v)
    } else {
        let text = if wide.is_nan() {
            "NaN"
        } else if wide > 0.0 {
            "Infinity"
        } else {
            "-Infinity"
        };
        format!("CAST({} AS DOUBLE)", dialect.quote_string(text))
    }
}

impl fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    #[test]
    fn test_identifier_quoting() {
        assert_eq!(SqlDialect::Hive.quote_identifier("feast.driver"), "`feast`.`driver`");
        assert_eq!(SqlDialect::DuckDb.quote_identifier("driver_id"), "\"driver_id\"");
        assert_eq!(SqlDialect::DuckDb.quote_part("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_string_escaping() {
        assert_eq!(SqlDialect::Hive.quote_string("it's"), "'it\\'s'");
        assert_eq!(SqlDialect::Hive.quote_string("a\\b"), "'a\\\\b'");
        assert_eq!(SqlDialect::DuckDb.quote_string("it's"), "'it''s'");
    }

    #[test]
    fn test_literals() {
        let d = SqlDialect::DuckDb;
        let ts = NaiveDateTime::parse_from_str("2024-03-01 12:30:05", "%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(
            d.literal(&Value::Timestamp(ts)),
            "CAST('2024-03-01 12:30:05.000000' AS TIMESTAMP)"
        );
        assert_eq!(
            d.literal(&Value::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())),
            "CAST('2024-03-01' AS DATE)"
        );
        assert_eq!(d.literal(&Value::Int64(42)), "42");
        assert_eq!(d.literal(&Value::Float64(1.0)), "1.0");
        assert_eq!(d.literal(&Value::Bool(true)), "TRUE");
        assert_eq!(d.literal(&Value::Null), "NULL");
        assert_eq!(d.literal(&Value::Binary(vec![0x0a, 0xff])), "from_hex('0AFF')");
        assert_eq!(SqlDialect::Hive.literal(&Value::Binary(vec![1])), "unhex('01')");
        assert_eq!(d.literal(&Value::Float64(f64::NAN)), "CAST('NaN' AS DOUBLE)");
    }

    #[test]
    fn test_float32_literals_keep_their_digits() {
        let d = SqlDialect::Hive;
        assert_eq!(d.literal(&Value::Float32(0.1)), "0.1");
        assert_eq!(d.insert_literal(&Value::Float32(0.3)), "0.3");
        assert_eq!(d.literal(&Value::Float32(2.0)), "2.0");
        assert_eq!(
            d.literal(&Value::Float32(f32::NEG_INFINITY)),
            "CAST('-Infinity' AS DOUBLE)"
        );
    }

    #[test]
    fn test_insert_literals_quote_temporal_values() {
        let ts = NaiveDateTime::parse_from_str("2024-03-01 12:30:05.25", "%Y-%m-%d %H:%M:%S%.f").unwrap();
        assert_eq!(
            SqlDialect::Hive.insert_literal(&Value::Timestamp(ts)),
            "'2024-03-01 12:30:05.250000'"
        );
        assert_eq!(
            SqlDialect::Hive.insert_literal(&Value::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())),
            "'2024-03-01'"
        );
        assert_eq!(SqlDialect::Hive.insert_literal(&Value::String("a".into())), "'a'");
        assert_eq!(SqlDialect::Hive.insert_literal(&Value::Int32(5)), "5");
    }

    #[test]
    fn test_ttl_arithmetic() {
        assert_eq!(
            SqlDialect::Hive.subtract_seconds("t.ts", 60),
            "(t.ts - INTERVAL '60' SECOND)"
        );
        assert_eq!(
            SqlDialect::DuckDb.subtract_seconds("t.ts", 60),
            "(t.ts - INTERVAL 60 SECOND)"
        );
    }

    #[test]
    fn test_hive_preamble() {
        let mut settings = BTreeMap::new();
        settings.insert("hive.exec.parallel".to_string(), "true".to_string());
        let statements = SqlDialect::Hive.session_preamble(&settings);
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[1], "SET hive.exec.parallel=true");
        assert!(SqlDialect::DuckDb.session_preamble(&settings).is_empty());
    }
}

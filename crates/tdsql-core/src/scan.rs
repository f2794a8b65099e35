//! Typed scanning of row values into Rust destinations
//!
//! [`FromValue`] converts a single [`Value`] and [`FromRow`] converts a whole
//! [`Row`], positionally, into a tuple:
//!
//! ```ignore
//! let row = conn.query_row("SELECT au_fname, au_lname FROM authors WHERE au_id = ?", &["172-32-1176".into()]).await?;
//! let (first, last): (String, String) = row.scan()?;
//! ```

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use uuid::Uuid;

use crate::{Result, Row, TdsqlError, Value};

/// Conversion from a database value into a Rust type
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self>;
}

fn mismatch<T>(value: &Value, target: &str) -> Result<T> {
    Err(TdsqlError::Conversion(format!(
        "cannot convert {} into {}",
        value.type_name(),
        target
    )))
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::String(s) | Value::Decimal(s) => Ok(s.clone()),
            Value::Bytes(b) => String::from_utf8(b.clone())
                .map_err(|e| TdsqlError::Conversion(format!("bytes are not valid UTF-8: {}", e))),
            Value::Null | Value::Array(_) => mismatch(value, "String"),
            other => Ok(other.to_string()),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(i64::from(*b)),
            Value::Decimal(s) => s
                .parse::<i64>()
                .map_err(|e| TdsqlError::Conversion(format!("'{}' is not an integer: {}", s, e))),
            other => match other.as_i64() {
                Some(v) => Ok(v),
                None => mismatch(other, "i64"),
            },
        }
    }
}

macro_rules! impl_from_value_narrowing {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: &Value) -> Result<Self> {
                    let wide = i64::from_value(value)?;
                    <$ty>::try_from(wide).map_err(|_| {
                        TdsqlError::Conversion(format!(
                            "{} is out of range for {}",
                            wide,
                            stringify!($ty)
                        ))
                    })
                }
            }
        )*
    };
}

impl_from_value_narrowing!(i8, i16, i32, u8, u16, u32, u64, usize);

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        if let Some(v) = value.as_f64() {
            return Ok(v);
        }
        match value.as_i64() {
            Some(v) => Ok(v as f64),
            None => mismatch(value, "f64"),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Float32(v) => Ok(*v),
            other => f64::from_value(other).map(|v| v as f32),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(*b),
            Value::Int8(_) | Value::Int16(_) | Value::Int32(_) | Value::Int64(_) => {
                Ok(value.as_i64() != Some(0))
            }
            other => mismatch(other, "bool"),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Bytes(b) => Ok(b.clone()),
            Value::String(s) => Ok(s.as_bytes().to_vec()),
            other => mismatch(other, "Vec<u8>"),
        }
    }
}

impl FromValue for Uuid {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Uuid(u) => Ok(*u),
            Value::String(s) => Uuid::parse_str(s)
                .map_err(|e| TdsqlError::Conversion(format!("'{}' is not a UUID: {}", s, e))),
            other => mismatch(other, "Uuid"),
        }
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Date(d) => Ok(*d),
            Value::DateTime(dt) => Ok(dt.date()),
            other => mismatch(other, "NaiveDate"),
        }
    }
}

impl FromValue for NaiveTime {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Time(t) => Ok(*t),
            Value::DateTime(dt) => Ok(dt.time()),
            other => mismatch(other, "NaiveTime"),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::DateTime(dt) => Ok(*dt),
            Value::DateTimeUtc(dt) => Ok(dt.naive_utc()),
            Value::Date(d) => Ok(d.and_time(NaiveTime::MIN)),
            other => mismatch(other, "NaiveDateTime"),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::DateTimeUtc(dt) => Ok(*dt),
            Value::DateTime(dt) => Ok(dt.and_utc()),
            other => mismatch(other, "DateTime<Utc>"),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Json(j) => Ok(j.clone()),
            Value::String(s) => Ok(serde_json::from_str(s)?),
            other => mismatch(other, "serde_json::Value"),
        }
    }
}

/// Conversion from a whole row into a Rust type
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> Result<Self>;
}

impl FromRow for Vec<Value> {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(row.values.clone())
    }
}

macro_rules! impl_from_row_tuple {
    ($len:expr => $($idx:tt $name:ident),+) => {
        impl<$($name: FromValue),+> FromRow for ($($name,)+) {
            fn from_row(row: &Row) -> Result<Self> {
                if row.len() != $len {
                    return Err(TdsqlError::Conversion(format!(
                        "expected {} columns to scan, row has {}",
                        $len,
                        row.len()
                    )));
                }
                Ok(($(row.try_get::<$name>($idx)?,)+))
            }
        }
    };
}

impl_from_row_tuple!(1 => 0 A);
impl_from_row_tuple!(2 => 0 A, 1 B);
impl_from_row_tuple!(3 => 0 A, 1 B, 2 C);
impl_from_row_tuple!(4 => 0 A, 1 B, 2 C, 3 D);
impl_from_row_tuple!(5 => 0 A, 1 B, 2 C, 3 D, 4 E);
impl_from_row_tuple!(6 => 0 A, 1 B, 2 C, 3 D, 4 E, 5 F);
impl_from_row_tuple!(7 => 0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G);
impl_from_row_tuple!(8 => 0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G, 7 H);

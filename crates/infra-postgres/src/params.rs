// Bound Query Parameters
// Positional, heterogeneous values bound as $1, $2, ...

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgArguments;
use sqlx::Arguments;
use uuid::Uuid;

use crate::error::{DbError, DbResult};

/// One positional query parameter.
///
/// Every variant carries an `Option` so `None` binds as a NULL of the
/// right PostgreSQL type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SqlParam {
    Bool(Option<bool>),
    SmallInt(Option<i16>),
    Int(Option<i32>),
    BigInt(Option<i64>),
    Real(Option<f32>),
    Double(Option<f64>),
    Text(Option<String>),
    Bytes(Option<Vec<u8>>),
    Json(Option<serde_json::Value>),
    Uuid(Option<Uuid>),
    Timestamp(Option<DateTime<Utc>>),
}

impl SqlParam {
    pub fn is_null(&self) -> bool {
        match self {
            SqlParam::Bool(v) => v.is_none(),
            SqlParam::SmallInt(v) => v.is_none(),
            SqlParam::Int(v) => v.is_none(),
            SqlParam::BigInt(v) => v.is_none(),
            SqlParam::Real(v) => v.is_none(),
            SqlParam::Double(v) => v.is_none(),
            SqlParam::Text(v) => v.is_none(),
            SqlParam::Bytes(v) => v.is_none(),
            SqlParam::Json(v) => v.is_none(),
            SqlParam::Uuid(v) => v.is_none(),
            SqlParam::Timestamp(v) => v.is_none(),
        }
    }

    fn add_to(&self, args: &mut PgArguments) -> Result<(), sqlx::error::BoxDynError> {
        match self {
            SqlParam::Bool(v) => Arguments::add(args, *v),
            SqlParam::SmallInt(v) => Arguments::add(args, *v),
            SqlParam::Int(v) => Arguments::add(args, *v),
            SqlParam::BigInt(v) => Arguments::add(args, *v),
            SqlParam::Real(v) => Arguments::add(args, *v),
            SqlParam::Double(v) => Arguments::add(args, *v),
            SqlParam::Text(v) => Arguments::add(args, v.clone()),
            SqlParam::Bytes(v) => Arguments::add(args, v.clone()),
            SqlParam::Json(v) => Arguments::add(args, v.clone()),
            SqlParam::Uuid(v) => Arguments::add(args, *v),
            SqlParam::Timestamp(v) => Arguments::add(args, *v),
        }
    }
}

macro_rules! impl_from_param {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for SqlParam {
                fn from(value: $ty) -> Self {
                    SqlParam::$variant(Some(value))
                }
            }

            impl From<Option<$ty>> for SqlParam {
                fn from(value: Option<$ty>) -> Self {
                    SqlParam::$variant(value)
                }
            }
        )*
    };
}

impl_from_param! {
    bool => Bool,
    i16 => SmallInt,
    i32 => Int,
    i64 => BigInt,
    f32 => Real,
    f64 => Double,
    String => Text,
    Vec<u8> => Bytes,
    serde_json::Value => Json,
    Uuid => Uuid,
    DateTime<Utc> => Timestamp,
}

impl From<&str> for SqlParam {
    fn from(value: &str) -> Self {
        SqlParam::Text(Some(value.to_string()))
    }
}

impl From<Option<&str>> for SqlParam {
    fn from(value: Option<&str>) -> Self {
        SqlParam::Text(value.map(str::to_string))
    }
}

impl From<&[u8]> for SqlParam {
    fn from(value: &[u8]) -> Self {
        SqlParam::Bytes(Some(value.to_vec()))
    }
}

/// Build a `Vec<SqlParam>` from heterogeneous values.
///
/// ```ignore
/// db.exec("UPDATE users SET name = $1 WHERE id = $2", &params!["ada", 7_i64]).await?;
/// ```
#[macro_export]
macro_rules! params {
    () => {
        ::std::vec::Vec::<$crate::SqlParam>::new()
    };
    ($($value:expr),+ $(,)?) => {
        ::std::vec![$($crate::SqlParam::from($value)),+]
    };
}

/// Encode parameters positionally into sqlx arguments
pub(crate) fn bind_all(params: &[SqlParam]) -> DbResult<PgArguments> {
    let mut args = PgArguments::default();
    for (index, param) in params.iter().enumerate() {
        param.add_to(&mut args).map_err(|e| DbError::Bind {
            index: index + 1,
            message: e.to_string(),
        })?;
    }
    Ok(args)
}

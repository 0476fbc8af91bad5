//! Helpers for storing serde-tagged enums (`#[serde(rename_all = "snake_case")]`)
//! as plain TEXT columns instead of a parallel Postgres enum type.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::{DbError, DbResult};

pub fn enum_to_text<T: Serialize>(value: &T) -> DbResult<String> {
    match serde_json::to_value(value)
        .map_err(|e| DbError::Database(sqlx::Error::Protocol(e.to_string())))?
    {
        serde_json::Value::String(s) => Ok(s),
        other => Err(DbError::Database(sqlx::Error::Protocol(format!(
            "expected a string-serializable enum, got {other}"
        )))),
    }
}

pub fn text_to_enum<T: DeserializeOwned>(text: &str) -> DbResult<T> {
    serde_json::from_value(serde_json::Value::String(text.to_string()))
        .map_err(|e| DbError::Database(sqlx::Error::Decode(Box::new(e))))
}

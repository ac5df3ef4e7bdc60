//! Column decoding helpers shared by the row mappers.

use chrono::{DateTime, NaiveDate, Utc};
use libsql::Row;
use serde::Serialize;
use serde::de::DeserializeOwned;
use visapress_shared::{Lifecycle, PipelineError, Result};

pub(crate) fn text(row: &Row, idx: i32) -> Result<String> {
    row.get::<String>(idx).map_err(PipelineError::persistence)
}

pub(crate) fn opt_text(row: &Row, idx: i32) -> Option<String> {
    row.get::<String>(idx).ok()
}

pub(crate) fn int(row: &Row, idx: i32) -> Result<i64> {
    row.get::<i64>(idx).map_err(PipelineError::persistence)
}

pub(crate) fn real(row: &Row, idx: i32) -> Result<f64> {
    row.get::<f64>(idx).map_err(PipelineError::persistence)
}

pub(crate) fn timestamp(row: &Row, idx: i32) -> Result<DateTime<Utc>> {
    let s = text(row, idx)?;
    parse_timestamp(&s)
}

pub(crate) fn opt_timestamp(row: &Row, idx: i32) -> Result<Option<DateTime<Utc>>> {
    opt_text(row, idx).map(|s| parse_timestamp(&s)).transpose()
}

pub(crate) fn opt_date(row: &Row, idx: i32) -> Result<Option<NaiveDate>> {
    opt_text(row, idx)
        .map(|s| {
            NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .map_err(|e| PipelineError::PersistenceFailed(format!("invalid date '{s}': {e}")))
        })
        .transpose()
}

pub(crate) fn status<S: Lifecycle>(row: &Row, idx: i32) -> Result<S> {
    let s = text(row, idx)?;
    S::parse(&s).ok_or_else(|| {
        PipelineError::PersistenceFailed(format!("unknown {} status '{s}'", S::ENTITY))
    })
}

pub(crate) fn json_list<T: DeserializeOwned>(row: &Row, idx: i32) -> Result<Vec<T>> {
    let s = text(row, idx)?;
    serde_json::from_str(&s).map_err(|e| {
        PipelineError::PersistenceFailed(format!("column {idx} holds invalid JSON: {e}"))
    })
}

pub(crate) fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(PipelineError::persistence)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| PipelineError::PersistenceFailed(format!("invalid timestamp '{s}': {e}")))
}

use crate::db;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use chrono::{NaiveDate, Utc};
use rusqlite::Connection;

pub fn required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// `YYYY-MM-DD` or absent. Anything else is rejected rather than ignored.
pub fn optional_date(params: &serde_json::Value, key: &str) -> Result<Option<NaiveDate>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let s = v
                .as_str()
                .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a YYYY-MM-DD string", key)))?;
            if s.trim().is_empty() {
                return Ok(None);
            }
            NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map(Some)
                .map_err(|_| {
                    HandlerErr::bad_params(format!("{} must be YYYY-MM-DD", key))
                        .with_details(serde_json::json!({ "field": key, "value": s }))
                })
        }
    }
}

pub fn now_stamp() -> String {
    Utc::now().to_rfc3339()
}

pub fn ensure_class(conn: &Connection, class_id: &str) -> Result<(), HandlerErr> {
    if db::class_exists(conn, class_id).map_err(HandlerErr::db("db_query_failed"))? {
        Ok(())
    } else {
        Err(HandlerErr::not_found("class not found"))
    }
}

pub fn ensure_student(conn: &Connection, class_id: &str, student_id: &str) -> Result<(), HandlerErr> {
    if db::student_in_class(conn, class_id, student_id).map_err(HandlerErr::db("db_query_failed"))? {
        Ok(())
    } else {
        Err(HandlerErr::not_found("student not found"))
    }
}

/// Run a handler body against the open workspace and wrap the outcome in the
/// response envelope.
pub fn with_db<F>(state: &AppState, req: &Request, body: F) -> serde_json::Value
where
    F: FnOnce(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
{
    let Some(conn) = state.db.as_ref() else {
        return HandlerErr::new("no_workspace", "select a workspace first").response(&req.id);
    };
    match body(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => {
            tracing::warn!(method = %req.method, id = %req.id, code = error.code, "{}", error.message);
            error.response(&req.id)
        }
    }
}

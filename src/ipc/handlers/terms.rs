use crate::db;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{optional_date, required_str, with_db};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn required_i64(params: &serde_json::Value, key: &str) -> Result<i64, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an integer", key)))
}

fn terms_upsert(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let academic_year = required_str(params, "academicYear")?;
    let term_no = required_i64(params, "termNo")?;
    if !(1..=2).contains(&term_no) {
        return Err(HandlerErr::bad_params("termNo must be 1 or 2")
            .with_details(json!({ "field": "termNo", "value": term_no })));
    }
    let total_weeks = required_i64(params, "totalWeeks")?;
    if total_weeks < 0 {
        return Err(HandlerErr::bad_params("totalWeeks must not be negative")
            .with_details(json!({ "field": "totalWeeks", "value": total_weeks })));
    }
    let start_date = optional_date(params, "startDate")?;
    let end_date = optional_date(params, "endDate")?;
    if let (Some(start), Some(end)) = (start_date, end_date) {
        if start > end {
            return Err(HandlerErr::bad_params("startDate is after endDate")
                .with_details(json!({ "field": "startDate" })));
        }
    }
    let start_s = start_date.map(|d| d.format("%Y-%m-%d").to_string());
    let end_s = end_date.map(|d| d.format("%Y-%m-%d").to_string());

    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM terms WHERE academic_year = ? AND term_no = ?",
            (&academic_year, term_no),
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::db("db_query_failed"))?;

    let term_id = match existing {
        Some(id) => {
            conn.execute(
                "UPDATE terms SET total_weeks = ?, start_date = ?, end_date = ? WHERE id = ?",
                (total_weeks, &start_s, &end_s, &id),
            )
            .map_err(HandlerErr::db("db_update_failed"))?;
            id
        }
        None => {
            let id = Uuid::new_v4().to_string();
            conn.execute(
                "INSERT INTO terms(id, academic_year, term_no, total_weeks, start_date, end_date, active)
                 VALUES(?, ?, ?, ?, ?, ?, 0)",
                (&id, &academic_year, term_no, total_weeks, &start_s, &end_s),
            )
            .map_err(HandlerErr::db("db_insert_failed"))?;
            id
        }
    };
    Ok(json!({ "termId": term_id }))
}

fn terms_list(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let terms = db::list_terms(conn).map_err(HandlerErr::db("db_query_failed"))?;
    let terms: Vec<serde_json::Value> = terms.iter().map(db::TermRow::to_json).collect();
    Ok(json!({ "terms": terms }))
}

fn terms_set_active(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let term_id = required_str(params, "termId")?;
    let tx = conn
        .unchecked_transaction()
        .map_err(HandlerErr::db("db_tx_failed"))?;
    let changed = tx
        .execute("UPDATE terms SET active = 1 WHERE id = ?", [&term_id])
        .map_err(HandlerErr::db("db_update_failed"))?;
    if changed == 0 {
        return Err(HandlerErr::not_found("term not found"));
    }
    tx.execute("UPDATE terms SET active = 0 WHERE id <> ?", [&term_id])
        .map_err(HandlerErr::db("db_update_failed"))?;
    tx.commit().map_err(HandlerErr::db("db_commit_failed"))?;
    Ok(json!({ "ok": true }))
}

fn terms_active(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let term = db::active_term(conn).map_err(HandlerErr::db("db_query_failed"))?;
    Ok(json!({ "term": term.as_ref().map(db::TermRow::to_json) }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "terms.upsert" => Some(with_db(state, req, terms_upsert)),
        "terms.list" => Some(with_db(state, req, terms_list)),
        "terms.setActive" => Some(with_db(state, req, terms_set_active)),
        "terms.active" => Some(with_db(state, req, terms_active)),
        _ => None,
    }
}

use crate::db;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{ensure_class, now_stamp, optional_str, required_str, with_db};
use crate::ipc::types::{AppState, Request};
use crate::rows::attendance_record_from_json;
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

/// Insert raw attendance rows. Rows are kept as entered (weekday and status
/// stay free text); rows without a date or for a student outside the class
/// are skipped and counted.
fn attendance_record(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    let Some(records) = params.get("records").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing records"));
    };
    ensure_class(conn, &class_id)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(HandlerErr::db("db_tx_failed"))?;
    let mut inserted = 0usize;
    let mut skipped = 0usize;
    for raw in records {
        let record = attendance_record_from_json(raw);
        let (Some(student_id), Some(event_date)) = (record.student_id, record.event_date) else {
            skipped += 1;
            continue;
        };
        if !db::student_in_class(&tx, &class_id, &student_id)
            .map_err(HandlerErr::db("db_query_failed"))?
        {
            skipped += 1;
            continue;
        }
        tx.execute(
            "INSERT INTO attendance_records(id, class_id, student_id, event_date, weekday, status, created_at)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                &class_id,
                &student_id,
                &event_date,
                &record.weekday,
                &record.status,
                now_stamp(),
            ),
        )
        .map_err(|e| {
            HandlerErr::new("db_insert_failed", e.to_string())
                .with_details(json!({ "table": "attendance_records" }))
        })?;
        inserted += 1;
    }
    tx.commit().map_err(HandlerErr::db("db_commit_failed"))?;

    if skipped > 0 {
        tracing::debug!(class_id = %class_id, inserted, skipped, "attendance rows skipped");
    }
    Ok(json!({ "inserted": inserted, "skipped": skipped }))
}

fn attendance_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    let student_id = optional_str(params, "studentId");
    ensure_class(conn, &class_id)?;
    let records = db::list_attendance(conn, &class_id, student_id.as_deref())
        .map_err(HandlerErr::db("db_query_failed"))?;
    Ok(json!({ "records": records }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.record" => Some(with_db(state, req, attendance_record)),
        "attendance.list" => Some(with_db(state, req, attendance_list)),
        _ => None,
    }
}

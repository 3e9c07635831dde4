use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{ensure_class, now_stamp, optional_str, required_str, with_db};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

fn classes_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name = required_str(params, "name")?;
    let academic_year = optional_str(params, "academicYear");
    let class_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO classes(id, name, academic_year, created_at) VALUES(?, ?, ?, ?)",
        (&class_id, &name, &academic_year, now_stamp()),
    )
    .map_err(HandlerErr::db("db_insert_failed"))?;
    Ok(json!({ "classId": class_id }))
}

fn classes_list(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT c.id, c.name, c.academic_year,
                    (SELECT COUNT(*) FROM students s WHERE s.class_id = c.id)
             FROM classes c
             ORDER BY c.name, c.id",
        )
        .map_err(HandlerErr::db("db_query_failed"))?;
    let classes = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "academicYear": r.get::<_, Option<String>>(2)?,
                "studentCount": r.get::<_, i64>(3)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db("db_query_failed"))?;
    Ok(json!({ "classes": classes }))
}

fn classes_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    ensure_class(conn, &class_id)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(HandlerErr::db("db_tx_failed"))?;
    for table in ["attendance_records", "score_details", "students"] {
        tx.execute(
            &format!("DELETE FROM {} WHERE class_id = ?", table),
            [&class_id],
        )
        .map_err(|e| {
            HandlerErr::new("db_delete_failed", e.to_string()).with_details(json!({ "table": table }))
        })?;
    }
    tx.execute("DELETE FROM classes WHERE id = ?", [&class_id])
        .map_err(HandlerErr::db("db_delete_failed"))?;
    tx.commit().map_err(HandlerErr::db("db_commit_failed"))?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.create" => Some(with_db(state, req, classes_create)),
        "classes.list" => Some(with_db(state, req, classes_list)),
        "classes.delete" => Some(with_db(state, req, classes_delete)),
        _ => None,
    }
}

use crate::db;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{ensure_class, ensure_student, now_stamp, required_str, with_db};
use crate::ipc::types::{AppState, Request};
use crate::rank::compare_names;
use crate::rows::{
    alias_text, find_alias, StudentBasic, FIRST_NAME_KEYS, FULL_NAME_KEYS, LAST_NAME_KEYS,
    PHONE_KEYS, SAINT_NAME_KEYS,
};
use rusqlite::{params_from_iter, types::Value, Connection};
use serde_json::json;
use uuid::Uuid;

/// Stored column and the JSON keys that may carry it.
const STUDENT_COLUMNS: [(&str, &[&str]); 5] = [
    ("saint_name", SAINT_NAME_KEYS),
    ("first_name", FIRST_NAME_KEYS),
    ("last_name", LAST_NAME_KEYS),
    ("full_name", FULL_NAME_KEYS),
    ("phone", PHONE_KEYS),
];

fn student_json(row: &db::StudentRow) -> serde_json::Value {
    let s = &row.basic;
    json!({
        "id": s.id,
        "saintName": s.saint_name,
        "firstName": s.first_name,
        "lastName": s.last_name,
        "fullName": s.full_name,
        "displayName": s.display_name(),
        "phone": row.phone,
        "sortOrder": row.sort_order,
    })
}

fn students_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    ensure_class(conn, &class_id)?;

    let student = StudentBasic {
        id: Uuid::new_v4().to_string(),
        saint_name: alias_text(params, SAINT_NAME_KEYS),
        first_name: alias_text(params, FIRST_NAME_KEYS),
        last_name: alias_text(params, LAST_NAME_KEYS),
        full_name: alias_text(params, FULL_NAME_KEYS),
    };
    if student.display_name().is_empty() {
        return Err(HandlerErr::bad_params("student needs a name"));
    }
    let phone = alias_text(params, PHONE_KEYS);

    let next_sort: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM students WHERE class_id = ?",
            [&class_id],
            |r| r.get(0),
        )
        .map_err(HandlerErr::db("db_query_failed"))?;

    conn.execute(
        "INSERT INTO students(id, class_id, saint_name, first_name, last_name, full_name, phone, sort_order, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &student.id,
            &class_id,
            &student.saint_name,
            &student.first_name,
            &student.last_name,
            &student.full_name,
            &phone,
            next_sort,
            now_stamp(),
        ),
    )
    .map_err(HandlerErr::db("db_insert_failed"))?;
    Ok(json!({ "studentId": student.id }))
}

fn students_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    ensure_class(conn, &class_id)?;
    let mut rows = db::list_students(conn, &class_id).map_err(HandlerErr::db("db_query_failed"))?;
    rows.sort_by(|a, b| {
        compare_names(&a.basic.display_name(), &b.basic.display_name())
            .then_with(|| a.basic.id.cmp(&b.basic.id))
    });
    let students: Vec<serde_json::Value> = rows.iter().map(student_json).collect();
    Ok(json!({ "students": students }))
}

fn students_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    let student_id = required_str(params, "studentId")?;
    let Some(patch) = params.get("patch").filter(|v| v.is_object()) else {
        return Err(HandlerErr::bad_params("missing patch"));
    };
    ensure_student(conn, &class_id, &student_id)?;

    let mut sets: Vec<String> = Vec::new();
    let mut bind_values: Vec<Value> = Vec::new();
    for (column, keys) in STUDENT_COLUMNS {
        let Some(v) = find_alias(patch, keys) else {
            continue;
        };
        let text = match v {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => {
                return Err(HandlerErr::bad_params(format!("{} must be a string or null", column))
                    .with_details(json!({ "field": column })))
            }
        };
        sets.push(format!("{} = ?", column));
        bind_values.push(text.map(Value::Text).unwrap_or(Value::Null));
    }
    if sets.is_empty() {
        return Err(HandlerErr::bad_params("patch has no student fields"));
    }

    sets.push("updated_at = ?".to_string());
    bind_values.push(Value::Text(now_stamp()));
    bind_values.push(Value::Text(class_id));
    bind_values.push(Value::Text(student_id));
    let sql = format!(
        "UPDATE students SET {} WHERE class_id = ? AND id = ?",
        sets.join(", ")
    );
    conn.execute(&sql, params_from_iter(bind_values))
        .map_err(HandlerErr::db("db_update_failed"))?;
    Ok(json!({ "ok": true }))
}

fn students_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    let student_id = required_str(params, "studentId")?;
    ensure_student(conn, &class_id, &student_id)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(HandlerErr::db("db_tx_failed"))?;
    for table in ["attendance_records", "score_details"] {
        tx.execute(
            &format!("DELETE FROM {} WHERE class_id = ? AND student_id = ?", table),
            (&class_id, &student_id),
        )
        .map_err(|e| {
            HandlerErr::new("db_delete_failed", e.to_string()).with_details(json!({ "table": table }))
        })?;
    }
    tx.execute(
        "DELETE FROM students WHERE class_id = ? AND id = ?",
        (&class_id, &student_id),
    )
    .map_err(HandlerErr::db("db_delete_failed"))?;
    tx.commit().map_err(HandlerErr::db("db_commit_failed"))?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.create" => Some(with_db(state, req, students_create)),
        "students.list" => Some(with_db(state, req, students_list)),
        "students.update" => Some(with_db(state, req, students_update)),
        "students.delete" => Some(with_db(state, req, students_delete)),
        _ => None,
    }
}

use crate::calc;
use crate::db;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{ensure_student, now_stamp, required_str, with_db};
use crate::ipc::types::{AppState, Request};
use crate::rows::{find_alias, parse_score_value, ScoreDetail, ScoreField};
use rusqlite::Connection;
use serde_json::json;

const MIN_SCORE: f64 = 0.0;
const MAX_SCORE: f64 = 10.0;

/// Entry-side check: the calculator itself accepts any number.
fn validated_component(field: ScoreField, v: &serde_json::Value) -> Result<Option<f64>, HandlerErr> {
    let parsed = parse_score_value(v).map_err(|_| {
        HandlerErr::bad_params(format!("{} must be a number", field.column()))
            .with_details(json!({ "field": field.column(), "value": v }))
    })?;
    match parsed {
        Some(x) if !x.is_finite() || !(MIN_SCORE..=MAX_SCORE).contains(&x) => Err(
            HandlerErr::bad_params(format!(
                "{} must be between {} and {}",
                field.column(),
                MIN_SCORE,
                MAX_SCORE
            ))
            .with_details(json!({ "field": field.column(), "value": v })),
        ),
        other => Ok(other),
    }
}

fn slot(detail: &mut ScoreDetail, field: ScoreField) -> &mut Option<f64> {
    match field {
        ScoreField::Half1 => &mut detail.half1,
        ScoreField::Exam1 => &mut detail.exam1,
        ScoreField::Half2 => &mut detail.half2,
        ScoreField::Exam2 => &mut detail.exam2,
    }
}

/// Set the components present in params; absent ones keep their stored value
/// and `null` clears one.
fn scores_set(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    let student_id = required_str(params, "studentId")?;

    let mut updates: Vec<(ScoreField, Option<f64>)> = Vec::new();
    for field in ScoreField::ALL {
        if let Some(v) = find_alias(params, field.keys()) {
            updates.push((field, validated_component(field, v)?));
        }
    }
    if updates.is_empty() {
        return Err(HandlerErr::bad_params("no score components given"));
    }
    ensure_student(conn, &class_id, &student_id)?;

    let mut detail = db::score_detail(conn, &class_id, &student_id)
        .map_err(HandlerErr::db("db_query_failed"))?
        .unwrap_or_else(|| ScoreDetail {
            id: student_id.clone(),
            ..Default::default()
        });
    for (field, value) in updates {
        *slot(&mut detail, field) = value;
    }

    conn.execute(
        "INSERT INTO score_details(class_id, student_id, half1, exam1, half2, exam2, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(class_id, student_id) DO UPDATE SET
           half1 = excluded.half1,
           exam1 = excluded.exam1,
           half2 = excluded.half2,
           exam2 = excluded.exam2,
           updated_at = excluded.updated_at",
        (
            &class_id,
            &student_id,
            detail.half1,
            detail.exam1,
            detail.half2,
            detail.exam2,
            now_stamp(),
        ),
    )
    .map_err(|e| {
        HandlerErr::new("db_update_failed", e.to_string())
            .with_details(json!({ "table": "score_details" }))
    })?;

    let average = calc::compute_catechism_average(detail.half1, detail.exam1, detail.half2, detail.exam2);
    Ok(json!({ "ok": true, "score": detail, "catechismAverage": average }))
}

fn scores_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    let student_id = required_str(params, "studentId")?;
    ensure_student(conn, &class_id, &student_id)?;
    let detail = db::score_detail(conn, &class_id, &student_id)
        .map_err(HandlerErr::db("db_query_failed"))?;
    let average = detail
        .as_ref()
        .and_then(|d| calc::compute_catechism_average(d.half1, d.exam1, d.half2, d.exam2));
    Ok(json!({ "score": detail, "catechismAverage": average }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "scores.set" => Some(with_db(state, req, scores_set)),
        "scores.get" => Some(with_db(state, req, scores_get)),
        _ => None,
    }
}

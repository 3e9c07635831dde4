use crate::attendance::{
    normalize_attendance, parse_event_date, AttendanceSheet, Presence, PresenceMap,
};
use crate::calc::{self, AttendanceResult, ScoreRow};
use crate::db::{self, TermRow};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{required_str, with_db};
use crate::ipc::types::{AppState, Request};
use crate::rank::{compare_names, rank_students, sort_by_name};
use crate::rows::{AttendanceRecord, ScoreDetail, StudentBasic};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::collections::HashMap;

/// Students of one class, fetched once per request and shared by every step
/// of the report.
struct StudentLookup {
    order: Vec<String>,
    by_id: HashMap<String, (StudentBasic, Option<String>)>,
}

impl StudentLookup {
    fn load(conn: &Connection, class_id: &str) -> Result<Self, HandlerErr> {
        let rows = db::list_students(conn, class_id).map_err(HandlerErr::db("db_query_failed"))?;
        let order = rows.iter().map(|r| r.basic.id.clone()).collect();
        let by_id = rows
            .into_iter()
            .map(|r| (r.basic.id.clone(), (r.basic, r.phone)))
            .collect();
        Ok(Self { order, by_id })
    }

    fn iter(&self) -> impl Iterator<Item = &StudentBasic> {
        self.order
            .iter()
            .filter_map(|id| self.by_id.get(id).map(|(s, _)| s))
    }

    fn phone(&self, id: &str) -> Option<&str> {
        self.by_id.get(id).and_then(|(_, p)| p.as_deref())
    }

    fn saint_name(&self, id: &str) -> Option<&str> {
        self.by_id
            .get(id)
            .and_then(|(s, _)| s.saint_name.as_deref())
    }
}

struct ClassReport {
    class_id: String,
    class_name: String,
    term: Option<TermRow>,
    students: StudentLookup,
    sheet: AttendanceSheet,
    attendance: HashMap<String, AttendanceResult>,
    rows: Vec<ScoreRow>,
}

fn in_window(record: &AttendanceRecord, start: Option<NaiveDate>, end: Option<NaiveDate>) -> bool {
    // Unreadable dates pass through; the normalizer drops them.
    let Some(date) = record.event_date.as_deref().and_then(parse_event_date) else {
        return true;
    };
    start.map(|s| date >= s).unwrap_or(true) && end.map(|e| date <= e).unwrap_or(true)
}

fn build_class_report(conn: &Connection, class_id: &str) -> Result<ClassReport, HandlerErr> {
    let class_name: Option<String> = conn
        .query_row("SELECT name FROM classes WHERE id = ?", [class_id], |r| {
            r.get(0)
        })
        .optional()
        .map_err(HandlerErr::db("db_query_failed"))?;
    let Some(class_name) = class_name else {
        return Err(HandlerErr::not_found("class not found"));
    };

    let term = db::active_term(conn).map_err(HandlerErr::db("db_query_failed"))?;
    let total_weeks = term
        .as_ref()
        .and_then(|t| u32::try_from(t.total_weeks).ok());
    let (start, end) = term.as_ref().map(TermRow::window).unwrap_or((None, None));

    let students = StudentLookup::load(conn, class_id)?;
    let records: Vec<AttendanceRecord> = db::list_attendance(conn, class_id, None)
        .map_err(HandlerErr::db("db_query_failed"))?
        .into_iter()
        .filter(|r| in_window(r, start, end))
        .collect();
    let sheet = normalize_attendance(&records);
    let categories = sheet.category_index();

    let scores: HashMap<String, ScoreDetail> = db::list_score_details(conn, class_id)
        .map_err(HandlerErr::db("db_query_failed"))?
        .into_iter()
        .map(|s| (s.id.clone(), s))
        .collect();

    let empty = PresenceMap::new();
    let mut attendance = HashMap::new();
    let mut rows = Vec::new();
    for student in students.iter() {
        let presence = sheet.presence_for(&student.id).unwrap_or(&empty);
        let result = calc::compute_attendance_score(presence, &categories, total_weeks);
        rows.push(calc::build_score_row(student, &result, scores.get(&student.id)));
        attendance.insert(student.id.clone(), result);
    }

    tracing::debug!(
        class_id,
        students = rows.len(),
        sessions = sheet.sessions.len(),
        total_weeks = ?total_weeks,
        "class report computed"
    );

    Ok(ClassReport {
        class_id: class_id.to_string(),
        class_name,
        term,
        students,
        sheet,
        attendance,
        rows,
    })
}

fn report_header(report: &ClassReport) -> serde_json::Value {
    json!({
        "class": { "id": report.class_id, "name": report.class_name },
        "term": report.term.as_ref().map(TermRow::to_json),
    })
}

fn reports_scores(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    let report = build_class_report(conn, &class_id)?;
    let mut out = report_header(&report);
    let ranked = rank_students(report.rows);
    out["rows"] = json!(ranked);
    Ok(out)
}

fn reports_roster(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    let report = build_class_report(conn, &class_id)?;
    let mut out = report_header(&report);

    let mut ranked = rank_students(report.rows);
    sort_by_name(&mut ranked);
    let students: Vec<serde_json::Value> = ranked
        .iter()
        .map(|row| {
            let mut v = json!(row);
            v["saintName"] = json!(report.students.saint_name(&row.student_id));
            v["phone"] = json!(report.students.phone(&row.student_id));
            v
        })
        .collect();
    out["students"] = json!(students);
    Ok(out)
}

fn reports_attendance(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    let report = build_class_report(conn, &class_id)?;
    let mut out = report_header(&report);

    let sessions = &report.sheet.sessions;
    let mut present_counts = vec![0usize; sessions.len()];
    let mut students: Vec<(String, String, serde_json::Value)> = Vec::new();
    for student in report.students.iter() {
        let presence = report.sheet.presence_for(&student.id);
        let marks: Vec<serde_json::Value> = sessions
            .iter()
            .enumerate()
            .map(|(i, session)| match presence.and_then(|m| m.get(&session.date)) {
                Some(p) => {
                    if *p == Presence::Present {
                        present_counts[i] += 1;
                    }
                    json!(p)
                }
                None => serde_json::Value::Null,
            })
            .collect();
        let result = report.attendance.get(&student.id);
        let name = student.display_name();
        students.push((
            name.clone(),
            student.id.clone(),
            json!({
                "studentId": student.id,
                "fullName": name,
                "marks": marks,
                "weeksPresent": result.map(|r| r.weeks_present),
                "weeksWithPrimary": result.map(|r| r.weeks_with_primary),
                "weeksWithSecondary": result.map(|r| r.weeks_with_secondary),
                "score": result.and_then(|r| r.score),
            }),
        ));
    }
    students.sort_by(|a, b| compare_names(&a.0, &b.0).then_with(|| a.1.cmp(&b.1)));

    let sessions_json: Vec<serde_json::Value> = sessions
        .iter()
        .zip(present_counts)
        .map(|(s, count)| {
            let mut v = json!(s);
            v["presentCount"] = json!(count);
            v
        })
        .collect();
    out["sessions"] = json!(sessions_json);
    out["students"] = json!(students.into_iter().map(|(_, _, v)| v).collect::<Vec<_>>());
    Ok(out)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.scores" => Some(with_db(state, req, reports_scores)),
        "reports.roster" => Some(with_db(state, req, reports_roster)),
        "reports.attendance" => Some(with_db(state, req, reports_attendance)),
        _ => None,
    }
}

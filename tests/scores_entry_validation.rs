use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_catechd");
    let mut child = Command::new(exe)
        .env_remove("CATECHD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn catechd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn expect_error(value: &serde_json::Value, code: &str) -> serde_json::Value {
    assert_eq!(value["ok"], json!(false), "expected {} error: {}", code, value);
    assert_eq!(value["error"]["code"], json!(code), "unexpected error: {}", value);
    value["error"].get("details").cloned().unwrap_or(json!(null))
}

#[test]
fn score_entry_rejects_out_of_range_and_merges_components() {
    let workspace = temp_dir("catechd-scores-validation");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let class_id = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "classes.create",
        json!({ "name": "Xưng Tội 1" }),
    )["classId"]
        .as_str()
        .expect("classId")
        .to_string();
    let student_id = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({ "classId": class_id, "fullName": "Anna Phan Thị Hằng" }),
    )["studentId"]
        .as_str()
        .expect("studentId")
        .to_string();

    let too_high = request(
        &mut stdin,
        &mut reader,
        "4",
        "scores.set",
        json!({ "classId": class_id, "studentId": student_id, "exam1": 11 }),
    );
    let details = expect_error(&too_high, "bad_params");
    assert_eq!(details["field"], json!("exam1"));

    let negative = request(
        &mut stdin,
        &mut reader,
        "5",
        "scores.set",
        json!({ "classId": class_id, "studentId": student_id, "half2": -0.5 }),
    );
    assert_eq!(expect_error(&negative, "bad_params")["field"], json!("half2"));

    let text = request(
        &mut stdin,
        &mut reader,
        "6",
        "scores.set",
        json!({ "classId": class_id, "studentId": student_id, "half1": "tám" }),
    );
    assert_eq!(expect_error(&text, "bad_params")["field"], json!("half1"));

    let nothing = request(
        &mut stdin,
        &mut reader,
        "7",
        "scores.set",
        json!({ "classId": class_id, "studentId": student_id }),
    );
    expect_error(&nothing, "bad_params");

    let stranger = request(
        &mut stdin,
        &mut reader,
        "8",
        "scores.set",
        json!({ "classId": class_id, "studentId": "missing", "exam1": 5 }),
    );
    expect_error(&stranger, "not_found");

    // Rejected writes left nothing behind.
    let empty = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "scores.get",
        json!({ "classId": class_id, "studentId": student_id }),
    );
    assert!(empty["score"].is_null());
    assert!(empty["catechismAverage"].is_null());

    // Aliased keys and decimal commas.
    let first = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "scores.set",
        json!({
            "classId": class_id,
            "studentId": student_id,
            "giuaKy1": "8,5",
            "cuoiKy1": 9
        }),
    );
    assert_eq!(first["score"]["half1"], json!(8.5));
    assert_eq!(first["score"]["exam1"], json!(9.0));
    assert!(first["score"]["half2"].is_null());
    // (8.5 + 2*9) / 6
    assert_eq!(first["catechismAverage"], json!(4.42));

    // Later writes keep components they do not name.
    let second = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "scores.set",
        json!({ "classId": class_id, "studentId": student_id, "half2": 8, "exam2": 8.5 }),
    );
    assert_eq!(second["score"]["half1"], json!(8.5));
    assert_eq!(second["catechismAverage"], json!(8.58));

    let cleared = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "scores.set",
        json!({ "classId": class_id, "studentId": student_id, "exam2": null }),
    );
    assert!(cleared["score"]["exam2"].is_null());
    assert_eq!(cleared["score"]["half2"], json!(8.0));

    let fetched = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "scores.get",
        json!({ "classId": class_id, "studentId": student_id }),
    );
    assert_eq!(fetched["score"], cleared["score"]);
    assert_eq!(fetched["catechismAverage"], cleared["catechismAverage"]);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn term_entry_validates_number_weeks_and_dates() {
    let workspace = temp_dir("catechd-terms-validation");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let bad_term = request(
        &mut stdin,
        &mut reader,
        "2",
        "terms.upsert",
        json!({ "academicYear": "2024-2025", "termNo": 3, "totalWeeks": 16 }),
    );
    assert_eq!(expect_error(&bad_term, "bad_params")["field"], json!("termNo"));

    let bad_weeks = request(
        &mut stdin,
        &mut reader,
        "3",
        "terms.upsert",
        json!({ "academicYear": "2024-2025", "termNo": 1, "totalWeeks": -1 }),
    );
    assert_eq!(expect_error(&bad_weeks, "bad_params")["field"], json!("totalWeeks"));

    let bad_date = request(
        &mut stdin,
        &mut reader,
        "4",
        "terms.upsert",
        json!({
            "academicYear": "2024-2025",
            "termNo": 1,
            "totalWeeks": 16,
            "startDate": "01/09/2024"
        }),
    );
    assert_eq!(expect_error(&bad_date, "bad_params")["field"], json!("startDate"));

    let reversed = request(
        &mut stdin,
        &mut reader,
        "5",
        "terms.upsert",
        json!({
            "academicYear": "2024-2025",
            "termNo": 2,
            "totalWeeks": 16,
            "startDate": "2025-05-31",
            "endDate": "2025-01-15"
        }),
    );
    expect_error(&reversed, "bad_params");

    let missing = request(
        &mut stdin,
        &mut reader,
        "6",
        "terms.setActive",
        json!({ "termId": "missing" }),
    );
    expect_error(&missing, "not_found");

    let t1 = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "terms.upsert",
        json!({ "academicYear": "2024-2025", "termNo": 1, "totalWeeks": 16 }),
    )["termId"]
        .as_str()
        .expect("termId")
        .to_string();
    let t2 = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "terms.upsert",
        json!({ "academicYear": "2024-2025", "termNo": 2, "totalWeeks": 18 }),
    )["termId"]
        .as_str()
        .expect("termId")
        .to_string();

    // Upserting the same year and number updates in place.
    let again = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "terms.upsert",
        json!({ "academicYear": "2024-2025", "termNo": 1, "totalWeeks": 17 }),
    );
    assert_eq!(again["termId"], json!(t1));

    let _ = request_ok(&mut stdin, &mut reader, "10", "terms.setActive", json!({ "termId": t1 }));
    let _ = request_ok(&mut stdin, &mut reader, "11", "terms.setActive", json!({ "termId": t2 }));
    let listed = request_ok(&mut stdin, &mut reader, "12", "terms.list", json!({}));
    let terms = listed["terms"].as_array().expect("terms");
    assert_eq!(terms.len(), 2);
    let active: Vec<&serde_json::Value> = terms.iter().filter(|t| t["active"] == json!(true)).collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0]["id"], json!(t2));
    assert_eq!(terms[0]["totalWeeks"], json!(17));

    let current = request_ok(&mut stdin, &mut reader, "13", "terms.active", json!({}));
    assert_eq!(current["term"]["termNo"], json!(2));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

// Canonical record shapes and the adapters that build them from loosely typed
// JSON rows.
//
// Clients built over several generations of the class screens send the same
// concept under different keys ("phone", "parentPhone", "sdt", ...). The
// aliases are resolved here, once, so storage and the aggregation core only
// ever see one field per concept.
use serde::{Deserialize, Serialize};

pub const SAINT_NAME_KEYS: &[&str] = &[
    "saintName",
    "saint_name",
    "tenThanh",
    "ten_thanh",
    "holyName",
    "baptismalName",
];
pub const FIRST_NAME_KEYS: &[&str] = &["firstName", "first_name", "givenName", "ten"];
pub const LAST_NAME_KEYS: &[&str] = &[
    "lastName",
    "last_name",
    "familyName",
    "hoLot",
    "ho_lot",
    "ho",
];
pub const FULL_NAME_KEYS: &[&str] = &["fullName", "full_name", "hoTen", "ho_ten", "name"];
pub const PHONE_KEYS: &[&str] = &[
    "phone",
    "phoneNumber",
    "phone_number",
    "parentPhone",
    "parent_phone",
    "soDienThoai",
    "sdt",
];

const STUDENT_ID_KEYS: &[&str] = &["studentId", "student_id", "thieuNhiId"];
const EVENT_DATE_KEYS: &[&str] = &["eventDate", "event_date", "attendanceDate", "date", "ngay"];
const WEEKDAY_KEYS: &[&str] = &["weekday", "dayOfWeek", "day_of_week", "thu"];
const STATUS_KEYS: &[&str] = &["status", "presence", "attendance", "trangThai", "trang_thai"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentBasic {
    pub id: String,
    pub saint_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub full_name: Option<String>,
}

impl StudentBasic {
    /// Name shown in reports: the stored full name, or
    /// `saint last first` when no full name was entered.
    pub fn display_name(&self) -> String {
        if let Some(full) = self.full_name.as_deref().map(str::trim) {
            if !full.is_empty() {
                return full.split_whitespace().collect::<Vec<_>>().join(" ");
            }
        }
        [&self.saint_name, &self.last_name, &self.first_name]
            .iter()
            .filter_map(|p| p.as_deref())
            .flat_map(str::split_whitespace)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreDetail {
    pub id: String,
    pub half1: Option<f64>,
    pub exam1: Option<f64>,
    pub half2: Option<f64>,
    pub exam2: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub student_id: Option<String>,
    pub event_date: Option<String>,
    pub weekday: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreField {
    Half1,
    Exam1,
    Half2,
    Exam2,
}

impl ScoreField {
    pub const ALL: [ScoreField; 4] = [
        ScoreField::Half1,
        ScoreField::Exam1,
        ScoreField::Half2,
        ScoreField::Exam2,
    ];

    pub fn column(self) -> &'static str {
        match self {
            ScoreField::Half1 => "half1",
            ScoreField::Exam1 => "exam1",
            ScoreField::Half2 => "half2",
            ScoreField::Exam2 => "exam2",
        }
    }

    pub fn keys(self) -> &'static [&'static str] {
        match self {
            ScoreField::Half1 => &[
                "half1",
                "firstHalfTerm",
                "first_half_term",
                "giuaKy1",
                "giua_ky_1",
            ],
            ScoreField::Exam1 => &[
                "exam1",
                "firstTermExam",
                "first_term_exam",
                "cuoiKy1",
                "cuoi_ky_1",
            ],
            ScoreField::Half2 => &[
                "half2",
                "secondHalfTerm",
                "second_half_term",
                "giuaKy2",
                "giua_ky_2",
            ],
            ScoreField::Exam2 => &[
                "exam2",
                "secondTermExam",
                "second_term_exam",
                "cuoiKy2",
                "cuoi_ky_2",
            ],
        }
    }
}

/// First alias present on the object, with the value it carried. `null`
/// counts as present so callers can clear a field.
pub fn find_alias<'a>(
    row: &'a serde_json::Value,
    keys: &[&str],
) -> Option<&'a serde_json::Value> {
    let obj = row.as_object()?;
    keys.iter().find_map(|k| obj.get(*k))
}

/// Trimmed, non-empty text under any alias. Numbers are accepted and rendered
/// as text since ids and phone numbers sometimes arrive unquoted.
pub fn alias_text(row: &serde_json::Value, keys: &[&str]) -> Option<String> {
    let obj = row.as_object()?;
    keys.iter().find_map(|k| value_text(obj.get(*k)?))
}

fn value_text(v: &serde_json::Value) -> Option<String> {
    let s = match v {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

pub fn attendance_record_from_json(row: &serde_json::Value) -> AttendanceRecord {
    AttendanceRecord {
        student_id: alias_text(row, STUDENT_ID_KEYS),
        event_date: alias_text(row, EVENT_DATE_KEYS),
        weekday: alias_text(row, WEEKDAY_KEYS),
        status: alias_text(row, STATUS_KEYS),
    }
}

/// Parse a score cell. `Ok(None)` is an empty cell; `Err(())` means the value
/// is not a number at all. Decimal commas ("8,5") are accepted.
pub fn parse_score_value(v: &serde_json::Value) -> Result<Option<f64>, ()> {
    match v {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Number(n) => n.as_f64().map(Some).ok_or(()),
        serde_json::Value::String(s) => {
            let t = s.trim();
            if t.is_empty() {
                return Ok(None);
            }
            t.replace(',', ".").parse::<f64>().map(Some).map_err(|_| ())
        }
        _ => Err(()),
    }
}

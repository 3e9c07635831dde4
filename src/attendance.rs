use crate::fold::compact_key;
use crate::rows::AttendanceRecord;
use chrono::{Datelike, NaiveDate, Weekday};
use serde::Serialize;
use std::collections::BTreeMap;

/// Which weekly class a session belongs to. Thursday evening class is the
/// primary session, Sunday class the secondary one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Primary,
    Secondary,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Present,
    Absent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedSession {
    #[serde(skip)]
    pub date: NaiveDate,
    pub iso_date: String,
    pub display_label: String,
    pub weekday_label: String,
    pub category: Category,
}

pub type PresenceMap = BTreeMap<NaiveDate, Presence>;
pub type CategoryIndex = BTreeMap<NaiveDate, Category>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttendanceSheet {
    pub sessions: Vec<NormalizedSession>,
    pub presence_by_student: BTreeMap<String, PresenceMap>,
}

impl AttendanceSheet {
    pub fn category_index(&self) -> CategoryIndex {
        self.sessions.iter().map(|s| (s.date, s.category)).collect()
    }

    pub fn presence_for(&self, student_id: &str) -> Option<&PresenceMap> {
        self.presence_by_student.get(student_id)
    }
}

const SECONDARY_LABELS: &[&str] = &["CN", "CHUNHAT", "SUNDAY", "SUN"];
const PRIMARY_LABELS: &[&str] = &["T5", "THU5", "THUNAM", "THURSDAY"];

const PRESENT_TOKENS: &[&str] = &[
    "CO", "COMAT", "DI", "DIHOC", "X", "P", "V", "PRESENT", "1", "TRUE", "YES",
];
const ABSENT_TOKENS: &[&str] = &[
    "VANG",
    "VANGMAT",
    "VANGCOPHEP",
    "VANGKHONGPHEP",
    "KP",
    "CP",
    "NGHI",
    "KHONG",
    "A",
    "ABSENT",
    "0",
    "FALSE",
    "NO",
];

/// Date part of an event timestamp. Time components and offsets are dropped
/// without converting zones: the class day is whatever day was written down.
pub fn parse_event_date(raw: &str) -> Option<NaiveDate> {
    let t = raw.trim();
    if t.is_empty() {
        return None;
    }
    let date_part = t.split(['T', ' ']).next().unwrap_or(t);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(date_part, "%d/%m/%Y"))
        .ok()
}

pub fn category_from_label(label: &str) -> Option<Category> {
    let key = compact_key(label);
    if SECONDARY_LABELS.contains(&key.as_str()) {
        Some(Category::Secondary)
    } else if PRIMARY_LABELS.contains(&key.as_str()) {
        Some(Category::Primary)
    } else {
        None
    }
}

pub fn category_from_date(date: NaiveDate) -> Category {
    match date.weekday() {
        Weekday::Sun => Category::Secondary,
        Weekday::Thu => Category::Primary,
        _ => Category::Other,
    }
}

/// A recognized label beats the calendar.
pub fn classify_session(label: Option<&str>, date: NaiveDate) -> Category {
    label
        .and_then(category_from_label)
        .unwrap_or_else(|| category_from_date(date))
}

/// `None` for markers outside the allow-list.
pub fn presence_token(status: &str) -> Option<Presence> {
    let key = compact_key(status);
    if PRESENT_TOKENS.contains(&key.as_str()) {
        Some(Presence::Present)
    } else if ABSENT_TOKENS.contains(&key.as_str()) {
        Some(Presence::Absent)
    } else {
        None
    }
}

pub fn parse_presence(status: Option<&str>) -> Presence {
    status
        .and_then(presence_token)
        .unwrap_or(Presence::Absent)
}

fn vietnamese_weekday(date: NaiveDate) -> &'static str {
    match date.weekday() {
        Weekday::Mon => "Thứ 2",
        Weekday::Tue => "Thứ 3",
        Weekday::Wed => "Thứ 4",
        Weekday::Thu => "Thứ 5",
        Weekday::Fri => "Thứ 6",
        Weekday::Sat => "Thứ 7",
        Weekday::Sun => "Chủ nhật",
    }
}

fn build_session(date: NaiveDate, label: Option<&str>) -> NormalizedSession {
    let label = label.map(str::trim).filter(|l| !l.is_empty());
    NormalizedSession {
        date,
        iso_date: date.format("%Y-%m-%d").to_string(),
        display_label: date.format("%d/%m/%Y").to_string(),
        weekday_label: label
            .map(str::to_string)
            .unwrap_or_else(|| vietnamese_weekday(date).to_string()),
        category: classify_session(label, date),
    }
}

/// Reduce raw attendance rows into the session list and a per-student
/// presence map.
///
/// Rows without a student id or a readable date are skipped. For one
/// (student, date) pair the first marker is kept unless a later one says
/// present; present is never downgraded.
pub fn normalize_attendance(records: &[AttendanceRecord]) -> AttendanceSheet {
    let mut sessions: BTreeMap<NaiveDate, NormalizedSession> = BTreeMap::new();
    let mut presence_by_student: BTreeMap<String, PresenceMap> = BTreeMap::new();

    for r in records {
        let Some(student_id) = r
            .student_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        else {
            continue;
        };
        let Some(date) = r.event_date.as_deref().and_then(parse_event_date) else {
            continue;
        };

        sessions
            .entry(date)
            .or_insert_with(|| build_session(date, r.weekday.as_deref()));

        let presence = parse_presence(r.status.as_deref());
        presence_by_student
            .entry(student_id.to_string())
            .or_default()
            .entry(date)
            .and_modify(|p| {
                if presence == Presence::Present {
                    *p = Presence::Present;
                }
            })
            .or_insert(presence);
    }

    AttendanceSheet {
        sessions: sessions.into_values().collect(),
        presence_by_student,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(student: &str, date: &str, weekday: Option<&str>, status: &str) -> AttendanceRecord {
        AttendanceRecord {
            student_id: Some(student.to_string()),
            event_date: Some(date.to_string()),
            weekday: weekday.map(str::to_string),
            status: Some(status.to_string()),
        }
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("date")
    }

    #[test]
    fn event_dates_drop_time_components() {
        assert_eq!(parse_event_date("2024-09-05"), Some(d("2024-09-05")));
        assert_eq!(
            parse_event_date("2024-09-05T19:30:00+07:00"),
            Some(d("2024-09-05"))
        );
        assert_eq!(parse_event_date("2024-09-05 19:30"), Some(d("2024-09-05")));
        assert_eq!(parse_event_date("05/09/2024"), Some(d("2024-09-05")));
        assert_eq!(parse_event_date("yesterday"), None);
        assert_eq!(parse_event_date("  "), None);
    }

    #[test]
    fn label_wins_over_calendar() {
        // 2024-09-08 is a Sunday.
        let sunday = d("2024-09-08");
        assert_eq!(classify_session(Some("Thứ 5"), sunday), Category::Primary);
        assert_eq!(classify_session(Some("t5"), sunday), Category::Primary);
        assert_eq!(classify_session(Some("CN"), d("2024-09-05")), Category::Secondary);
        assert_eq!(classify_session(Some("Chủ Nhật"), d("2024-09-05")), Category::Secondary);
    }

    #[test]
    fn unknown_or_missing_label_falls_back_to_weekday() {
        assert_eq!(classify_session(None, d("2024-09-08")), Category::Secondary);
        assert_eq!(classify_session(None, d("2024-09-05")), Category::Primary);
        assert_eq!(classify_session(Some("Thứ"), d("2024-09-05")), Category::Primary);
        assert_eq!(classify_session(Some("Lễ"), d("2024-09-06")), Category::Other);
    }

    #[test]
    fn presence_tokens_are_case_and_diacritic_insensitive() {
        assert_eq!(parse_presence(Some("Có mặt")), Presence::Present);
        assert_eq!(parse_presence(Some("co-mat")), Presence::Present);
        assert_eq!(parse_presence(Some("x")), Presence::Present);
        assert_eq!(parse_presence(Some("Vắng không phép")), Presence::Absent);
        assert_eq!(parse_presence(Some("???")), Presence::Absent);
        assert_eq!(parse_presence(None), Presence::Absent);
        assert_eq!(presence_token("???"), None);
    }

    #[test]
    fn presence_dominates_absence_in_either_order() {
        let sheet = normalize_attendance(&[
            rec("a", "2024-09-05", None, "vắng"),
            rec("a", "2024-09-05", None, "có mặt"),
            rec("b", "2024-09-05", None, "có mặt"),
            rec("b", "2024-09-05T10:00:00", None, "vắng"),
        ]);
        let day = d("2024-09-05");
        assert_eq!(sheet.presence_for("a").and_then(|m| m.get(&day)), Some(&Presence::Present));
        assert_eq!(sheet.presence_for("b").and_then(|m| m.get(&day)), Some(&Presence::Present));
    }

    #[test]
    fn absent_first_marker_is_kept_without_a_present() {
        let sheet = normalize_attendance(&[
            rec("a", "2024-09-05", None, "vắng"),
            rec("a", "2024-09-05", None, "???"),
        ]);
        assert_eq!(
            sheet.presence_for("a").and_then(|m| m.get(&d("2024-09-05"))),
            Some(&Presence::Absent)
        );
    }

    #[test]
    fn sessions_are_distinct_and_sorted() {
        let sheet = normalize_attendance(&[
            rec("a", "2024-09-08", None, "x"),
            rec("a", "2024-09-05", Some("Thứ 5"), "x"),
            rec("b", "2024-09-05", Some("CN"), "x"),
        ]);
        let dates: Vec<&str> = sheet.sessions.iter().map(|s| s.iso_date.as_str()).collect();
        assert_eq!(dates, vec!["2024-09-05", "2024-09-08"]);
        // First record seen for a date decides its label.
        assert_eq!(sheet.sessions[0].weekday_label, "Thứ 5");
        assert_eq!(sheet.sessions[0].category, Category::Primary);
        assert_eq!(sheet.sessions[0].display_label, "05/09/2024");
        assert_eq!(sheet.sessions[1].weekday_label, "Chủ nhật");
        assert_eq!(sheet.sessions[1].category, Category::Secondary);
    }

    #[test]
    fn bad_rows_are_dropped_and_empty_input_is_empty() {
        let sheet = normalize_attendance(&[
            AttendanceRecord {
                student_id: None,
                event_date: Some("2024-09-05".into()),
                weekday: None,
                status: Some("x".into()),
            },
            rec("  ", "2024-09-05", None, "x"),
            rec("a", "not a date", None, "x"),
        ]);
        assert!(sheet.sessions.is_empty());
        assert!(sheet.presence_by_student.is_empty());
        assert_eq!(normalize_attendance(&[]), AttendanceSheet::default());
    }

    #[test]
    fn normalizing_twice_gives_identical_output() {
        let records = vec![
            rec("a", "2024-09-05", Some("Thứ 5"), "x"),
            rec("b", "2024-09-08", None, "vắng"),
        ];
        assert_eq!(normalize_attendance(&records), normalize_attendance(&records));
    }
}

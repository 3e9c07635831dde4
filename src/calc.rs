use crate::attendance::{category_from_date, Category, CategoryIndex, Presence, PresenceMap};
use crate::rows::{ScoreDetail, StudentBasic};
use chrono::Datelike;
use serde::Serialize;
use std::collections::BTreeSet;

pub const CATECHISM_WEIGHT: f64 = 0.6;
pub const ATTENDANCE_WEIGHT: f64 = 0.4;
pub const HALF_TERM_WEIGHT: f64 = 1.0;
pub const EXAM_WEIGHT: f64 = 2.0;
/// Two half-term marks at weight 1 plus two exams at weight 2.
pub const COMPONENT_WEIGHT_SUM: f64 = 2.0 * HALF_TERM_WEIGHT + 2.0 * EXAM_WEIGHT;
/// Attendance and averages are reported on a 0..10 scale.
pub const SCORE_SCALE: f64 = 10.0;

/// Round half up at 2 decimals: `floor(100*x + 0.5) / 100`.
pub fn round_off_2_decimals(x: f64) -> f64 {
    ((100.0 * x) + 0.5).floor() / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceResult {
    pub weeks_present: u32,
    pub weeks_with_primary: u32,
    pub weeks_with_secondary: u32,
    pub score: Option<f64>,
}

/// Attendance on the 0..10 scale.
///
/// Counts ISO weeks (Monday..Sunday) with at least one present mark on a
/// primary or secondary session, so a Thursday and the following Sunday make
/// one week. Dates missing from `categories` are classified by weekday.
/// `total_weeks` of zero or unset gives no score.
pub fn compute_attendance_score(
    presence: &PresenceMap,
    categories: &CategoryIndex,
    total_weeks: Option<u32>,
) -> AttendanceResult {
    let mut any_week: BTreeSet<(i32, u32)> = BTreeSet::new();
    let mut primary_weeks: BTreeSet<(i32, u32)> = BTreeSet::new();
    let mut secondary_weeks: BTreeSet<(i32, u32)> = BTreeSet::new();

    for (date, presence) in presence {
        if *presence != Presence::Present {
            continue;
        }
        let week = date.iso_week();
        let key = (week.year(), week.week());
        let category = categories
            .get(date)
            .copied()
            .unwrap_or_else(|| category_from_date(*date));
        match category {
            Category::Primary => {
                primary_weeks.insert(key);
                any_week.insert(key);
            }
            Category::Secondary => {
                secondary_weeks.insert(key);
                any_week.insert(key);
            }
            Category::Other => {}
        }
    }

    let weeks_present = any_week.len() as u32;
    let score = match total_weeks {
        Some(total) if total > 0 => Some(round_off_2_decimals(
            (weeks_present as f64 / total as f64) * SCORE_SCALE,
        )),
        _ => None,
    };

    AttendanceResult {
        weeks_present,
        weeks_with_primary: primary_weeks.len() as u32,
        weeks_with_secondary: secondary_weeks.len() as u32,
        score,
    }
}

/// `(half1 + half2 + 2*exam1 + 2*exam2) / 6`. Missing parts count as zero;
/// with every part missing there is no average at all.
pub fn compute_catechism_average(
    half1: Option<f64>,
    exam1: Option<f64>,
    half2: Option<f64>,
    exam2: Option<f64>,
) -> Option<f64> {
    if half1.is_none() && exam1.is_none() && half2.is_none() && exam2.is_none() {
        return None;
    }
    let sum = half1.unwrap_or(0.0) * HALF_TERM_WEIGHT
        + half2.unwrap_or(0.0) * HALF_TERM_WEIGHT
        + exam1.unwrap_or(0.0) * EXAM_WEIGHT
        + exam2.unwrap_or(0.0) * EXAM_WEIGHT;
    Some(round_off_2_decimals(sum / COMPONENT_WEIGHT_SUM))
}

pub fn compute_total_score(catechism_avg: Option<f64>, attendance_avg: Option<f64>) -> Option<f64> {
    if catechism_avg.is_none() && attendance_avg.is_none() {
        return None;
    }
    Some(round_off_2_decimals(
        catechism_avg.unwrap_or(0.0) * CATECHISM_WEIGHT
            + attendance_avg.unwrap_or(0.0) * ATTENDANCE_WEIGHT,
    ))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRow {
    pub student_id: String,
    pub full_name: String,
    pub weeks_present: u32,
    pub weeks_with_primary: u32,
    pub weeks_with_secondary: u32,
    pub attendance_score: Option<f64>,
    pub half1: Option<f64>,
    pub exam1: Option<f64>,
    pub half2: Option<f64>,
    pub exam2: Option<f64>,
    pub catechism_average: Option<f64>,
    pub total_score: Option<f64>,
    pub rank: Option<u32>,
}

/// One unranked row for a student.
pub fn build_score_row(
    student: &StudentBasic,
    attendance: &AttendanceResult,
    score: Option<&ScoreDetail>,
) -> ScoreRow {
    let (half1, exam1, half2, exam2) = score
        .map(|s| (s.half1, s.exam1, s.half2, s.exam2))
        .unwrap_or((None, None, None, None));
    let catechism_average = compute_catechism_average(half1, exam1, half2, exam2);
    ScoreRow {
        student_id: student.id.clone(),
        full_name: student.display_name(),
        weeks_present: attendance.weeks_present,
        weeks_with_primary: attendance.weeks_with_primary,
        weeks_with_secondary: attendance.weeks_with_secondary,
        attendance_score: attendance.score,
        half1,
        exam1,
        half2,
        exam2,
        catechism_average,
        total_score: compute_total_score(catechism_average, attendance.score),
        rank: None,
    }
}

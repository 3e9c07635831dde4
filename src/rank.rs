use crate::calc::ScoreRow;
use crate::fold::strip_diacritics;
use std::cmp::Ordering;

/// Totals closer than this are the same score.
pub const SCORE_EPSILON: f64 = 1e-9;

fn collation_key(name: &str) -> String {
    strip_diacritics(name)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Name order for Vietnamese rosters: letters compare without case or tone
/// marks first ("Đào" sits with "Dao"), then the marked lowercase form, then
/// the raw string so the order is total.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    collation_key(a)
        .cmp(&collation_key(b))
        .then_with(|| a.to_lowercase().cmp(&b.to_lowercase()))
        .then_with(|| a.cmp(b))
}

fn by_name_then_id(a: &ScoreRow, b: &ScoreRow) -> Ordering {
    compare_names(&a.full_name, &b.full_name).then_with(|| a.student_id.cmp(&b.student_id))
}

fn is_scored(row: &ScoreRow) -> bool {
    row.total_score.map(f64::is_finite).unwrap_or(false)
}

fn same_score(a: f64, b: f64) -> bool {
    (a - b).abs() < SCORE_EPSILON
}

/// Competition ranking over finite totals: highest first, equal totals share
/// a rank and the next distinct total takes its 1-based position (1, 1, 3).
///
/// Rows without a finite total get no rank and follow the ranked rows in name
/// order.
pub fn rank_students(rows: Vec<ScoreRow>) -> Vec<ScoreRow> {
    let (mut scored, mut unscored): (Vec<ScoreRow>, Vec<ScoreRow>) =
        rows.into_iter().partition(is_scored);

    scored.sort_by(|a, b| {
        let x = a.total_score.unwrap_or(0.0);
        let y = b.total_score.unwrap_or(0.0);
        if same_score(x, y) {
            by_name_then_id(a, b)
        } else {
            y.partial_cmp(&x).unwrap_or(Ordering::Equal)
        }
    });

    let mut prev: Option<(f64, u32)> = None;
    for (idx, row) in scored.iter_mut().enumerate() {
        let total = row.total_score.unwrap_or(0.0);
        let rank = match prev {
            Some((prev_total, prev_rank)) if same_score(prev_total, total) => prev_rank,
            _ => idx as u32 + 1,
        };
        row.rank = Some(rank);
        prev = Some((total, rank));
    }

    for row in unscored.iter_mut() {
        row.rank = None;
    }
    unscored.sort_by(by_name_then_id);

    scored.extend(unscored);
    scored
}

/// Roster order: by name, then id. Ranks are left as they are.
pub fn sort_by_name(rows: &mut [ScoreRow]) {
    rows.sort_by(by_name_then_id);
}

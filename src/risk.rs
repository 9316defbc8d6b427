use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::collections::HashMap;

use crate::calendar;
use crate::sf2::DayStatus;

/// The assessment looks at the last 30 school days ending at the as-of date.
pub const WINDOW_SCHOOL_DAYS: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowStats {
    pub school_days: usize,
    pub present: usize,
    pub late: usize,
    pub absent: usize,
    pub unmarked: usize,
    pub consecutive_absences: usize,
    pub attendance_rate: f64,
}

/// The last `count` school days ending at `as_of` (or the nearest school day
/// before it), in ascending order.
pub fn trailing_school_days(as_of: NaiveDate, count: usize) -> Vec<NaiveDate> {
    let mut days = Vec::with_capacity(count);
    let mut cursor = as_of;
    while days.len() < count {
        if calendar::is_school_day(cursor) {
            days.push(cursor);
        }
        let Some(prev) = cursor.checked_sub_signed(Duration::days(1)) else {
            break;
        };
        cursor = prev;
    }
    days.reverse();
    days
}

/// Per-window counts over an ascending school-day sequence. Attendance rate
/// is (present + late) / school days; an unmarked day lowers the rate but is
/// not an explicit absence. The consecutive-absence streak runs backward from
/// the window's end while each day is absent or unrecorded, stopping at the
/// first present or late day.
pub fn window_stats(
    days: &[NaiveDate],
    statuses: &HashMap<NaiveDate, DayStatus>,
) -> WindowStats {
    let mut present = 0_usize;
    let mut late = 0_usize;
    let mut absent = 0_usize;
    let mut unmarked = 0_usize;
    for day in days {
        match statuses.get(day) {
            Some(DayStatus::Present) => present += 1,
            Some(DayStatus::Late) => late += 1,
            Some(DayStatus::Absent) => absent += 1,
            None => unmarked += 1,
        }
    }

    let mut consecutive_absences = 0_usize;
    for day in days.iter().rev() {
        match statuses.get(day) {
            Some(DayStatus::Present) | Some(DayStatus::Late) => break,
            Some(DayStatus::Absent) | None => consecutive_absences += 1,
        }
    }

    let attendance_rate = if days.is_empty() {
        0.0
    } else {
        100.0 * (present + late) as f64 / days.len() as f64
    };

    WindowStats {
        school_days: days.len(),
        present,
        late,
        absent,
        unmarked,
        consecutive_absences,
        attendance_rate,
    }
}

pub fn risk_tier(stats: &WindowStats) -> RiskTier {
    let mut tier = if stats.attendance_rate < 70.0 {
        RiskTier::High
    } else if stats.attendance_rate <= 85.0 {
        RiskTier::Medium
    } else {
        RiskTier::Low
    };
    if stats.consecutive_absences >= 5 {
        tier = RiskTier::High;
    } else if (stats.consecutive_absences >= 3 || stats.late >= 5) && tier < RiskTier::Medium {
        tier = RiskTier::Medium;
    }
    tier
}

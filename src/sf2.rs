use rusqlite::{Connection, OptionalExtension};
use serde::{Serialize, Serializer};
use std::collections::HashMap;

use crate::calendar;

/// Closed set of attendance statuses. The display mapping is the SF2 form
/// convention: present renders as an empty cell, absent as `/`, late as `T`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayStatus {
    Present,
    Absent,
    Late,
}

impl DayStatus {
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "present" => Some(DayStatus::Present),
            "absent" => Some(DayStatus::Absent),
            "late" => Some(DayStatus::Late),
            _ => None,
        }
    }

    pub fn as_db_str(self) -> &'static str {
        match self {
            DayStatus::Present => "present",
            DayStatus::Absent => "absent",
            DayStatus::Late => "late",
        }
    }

    pub fn display_code(self) -> char {
        match self {
            DayStatus::Present => ' ',
            DayStatus::Absent => '/',
            DayStatus::Late => 'T',
        }
    }
}

/// One cell per school day. `None` is an unmarked day: no record exists.
/// Unmarked days render blank, stay out of the absent/tardy totals, and
/// count as present in the daily attendance totals. The cell is explicit so
/// every row always has exactly one cell per school day.
pub type DayCell = Option<DayStatus>;

pub fn cell_code(cell: DayCell) -> char {
    cell.map(DayStatus::display_code).unwrap_or(' ')
}

fn ser_day_codes<S: Serializer>(cells: &Vec<DayCell>, ser: S) -> Result<S::Ok, S::Error> {
    let codes: String = cells.iter().map(|c| cell_code(*c)).collect();
    ser.serialize_str(&codes)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRow {
    pub student_id: String,
    pub display_name: String,
    pub lrn: Option<String>,
    #[serde(rename = "dayCodes", serialize_with = "ser_day_codes")]
    pub per_day: Vec<DayCell>,
    pub absent_count: u32,
    pub tardy_count: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenderBlock {
    pub rows: Vec<ReportRow>,
    pub enrolled: usize,
    pub absent_total: u32,
    pub tardy_total: u32,
    /// Students counted present per school day, aligned to the school-day
    /// sequence. Unmarked days count as present.
    pub daily_present: Vec<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionInfo {
    pub id: String,
    pub name: String,
    pub grade_level: String,
    pub school_year: String,
    pub adviser: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sf2Model {
    pub section: SectionInfo,
    pub year: i32,
    pub month: u32,
    pub month_name: String,
    pub school_days: Vec<u32>,
    pub male: GenderBlock,
    pub female: GenderBlock,
    pub combined_enrolled: usize,
    pub combined_absent_total: u32,
    pub combined_tardy_total: u32,
    pub combined_daily_present: Vec<u32>,
    pub average_daily_attendance: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Sf2Error {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl Sf2Error {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(code: &str, message: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: Some(details),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Sf2Context<'a> {
    pub conn: &'a Connection,
    pub section_id: &'a str,
}

#[derive(Debug, Clone)]
struct RosterStudent {
    id: String,
    display_name: String,
    lrn: Option<String>,
    male: bool,
}

pub fn date_key(year: i32, month: u32, day: u32) -> String {
    format!("{:04}-{:02}-{:02}", year, month, day)
}

fn load_section(ctx: &Sf2Context<'_>) -> Result<SectionInfo, Sf2Error> {
    let row: Option<(String, String, String, Option<String>)> = ctx
        .conn
        .query_row(
            "SELECT name, grade_level, school_year, adviser FROM sections WHERE id = ?",
            [ctx.section_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .optional()
        .map_err(|e| Sf2Error::new("db_query_failed", e.to_string()))?;
    let Some((name, grade_level, school_year, adviser)) = row else {
        return Err(Sf2Error::new("not_found", "section not found"));
    };
    if grade_level.trim().is_empty() {
        return Err(Sf2Error::with_details(
            "not_found",
            "section has no grade level",
            serde_json::json!({ "sectionId": ctx.section_id }),
        ));
    }
    Ok(SectionInfo {
        id: ctx.section_id.to_string(),
        name,
        grade_level,
        school_year,
        adviser,
    })
}

fn load_roster(ctx: &Sf2Context<'_>) -> Result<Vec<RosterStudent>, Sf2Error> {
    let mut stmt = ctx
        .conn
        .prepare(
            "SELECT id, last_name, first_name, lrn, gender
             FROM students
             WHERE section_id = ? AND active = 1
             ORDER BY last_name COLLATE NOCASE, first_name COLLATE NOCASE",
        )
        .map_err(|e| Sf2Error::new("db_query_failed", e.to_string()))?;
    stmt.query_map([ctx.section_id], |r| {
        let last: String = r.get(1)?;
        let first: String = r.get(2)?;
        let gender: String = r.get(4)?;
        Ok(RosterStudent {
            id: r.get(0)?,
            display_name: format!("{}, {}", last, first),
            lrn: r.get(3)?,
            male: gender == "male",
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(|e| Sf2Error::new("db_query_failed", e.to_string()))
}

fn load_month_statuses(
    ctx: &Sf2Context<'_>,
    year: i32,
    month: u32,
) -> Result<HashMap<(String, u32), DayStatus>, Sf2Error> {
    let first = date_key(year, month, 1);
    let last = date_key(year, month, calendar::days_in_month(year, month));
    let mut stmt = ctx
        .conn
        .prepare(
            "SELECT student_id, date, status
             FROM attendance_records
             WHERE section_id = ? AND date >= ? AND date <= ?",
        )
        .map_err(|e| Sf2Error::new("db_query_failed", e.to_string()))?;
    let rows = stmt
        .query_map((ctx.section_id, &first, &last), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| Sf2Error::new("db_query_failed", e.to_string()))?;

    let mut by_day = HashMap::new();
    for (student_id, date, status) in rows {
        let Some(day) = date
            .rsplit('-')
            .next()
            .and_then(|d| d.parse::<u32>().ok())
        else {
            continue;
        };
        let Some(status) = DayStatus::from_db_str(&status) else {
            return Err(Sf2Error::with_details(
                "bad_status",
                "attendance record has an unknown status",
                serde_json::json!({ "studentId": student_id, "date": date, "status": status }),
            ));
        };
        by_day.insert((student_id, day), status);
    }
    Ok(by_day)
}

fn build_row(
    student: &RosterStudent,
    school_days: &[u32],
    statuses: &HashMap<(String, u32), DayStatus>,
) -> ReportRow {
    let mut per_day: Vec<DayCell> = Vec::with_capacity(school_days.len());
    let mut absent_count = 0_u32;
    let mut tardy_count = 0_u32;
    for day in school_days {
        let cell = statuses.get(&(student.id.clone(), *day)).copied();
        match cell {
            Some(DayStatus::Absent) => absent_count += 1,
            Some(DayStatus::Late) => tardy_count += 1,
            Some(DayStatus::Present) | None => {}
        }
        per_day.push(cell);
    }
    ReportRow {
        student_id: student.id.clone(),
        display_name: student.display_name.clone(),
        lrn: student.lrn.clone(),
        per_day,
        absent_count,
        tardy_count,
    }
}

fn build_block(rows: Vec<ReportRow>, school_days: &[u32]) -> GenderBlock {
    let enrolled = rows.len();
    let absent_total = rows.iter().map(|r| r.absent_count).sum();
    let tardy_total = rows.iter().map(|r| r.tardy_count).sum();
    let daily_present = (0..school_days.len())
        .map(|i| {
            rows.iter()
                .filter(|r| r.per_day[i] != Some(DayStatus::Absent))
                .count() as u32
        })
        .collect();
    GenderBlock {
        rows,
        enrolled,
        absent_total,
        tardy_total,
        daily_present,
    }
}

pub fn build_sf2_model(
    ctx: &Sf2Context<'_>,
    year: i32,
    month: u32,
) -> Result<Sf2Model, Sf2Error> {
    calendar::validate_year_month(year, month).map_err(|m| Sf2Error::new("bad_params", m))?;

    let section = load_section(ctx)?;
    let roster = load_roster(ctx)?;
    let statuses = load_month_statuses(ctx, year, month)?;
    let school_days = calendar::school_days(year, month);

    let male_rows: Vec<ReportRow> = roster
        .iter()
        .filter(|s| s.male)
        .map(|s| build_row(s, &school_days, &statuses))
        .collect();
    let female_rows: Vec<ReportRow> = roster
        .iter()
        .filter(|s| !s.male)
        .map(|s| build_row(s, &school_days, &statuses))
        .collect();

    let male = build_block(male_rows, &school_days);
    let female = build_block(female_rows, &school_days);

    let combined_enrolled = male.enrolled + female.enrolled;
    let combined_absent_total = male.absent_total + female.absent_total;
    let combined_tardy_total = male.tardy_total + female.tardy_total;
    let combined_daily_present: Vec<u32> = male
        .daily_present
        .iter()
        .zip(female.daily_present.iter())
        .map(|(m, f)| m + f)
        .collect();
    let average_daily_attendance = if school_days.is_empty() {
        0.0
    } else {
        combined_daily_present.iter().map(|n| *n as f64).sum::<f64>()
            / school_days.len() as f64
    };

    Ok(Sf2Model {
        section,
        year,
        month,
        month_name: calendar::month_name(month).to_string(),
        school_days,
        male,
        female,
        combined_enrolled,
        combined_absent_total,
        combined_tardy_total,
        combined_daily_present,
        average_daily_attendance,
    })
}

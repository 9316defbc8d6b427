use rust_xlsxwriter::{Format, FormatAlign, FormatBorder, Workbook, Worksheet, XlsxError};

use super::{cell_ref, GridCursor, RenderError};
use crate::calendar;
use crate::sf2::{cell_code, GenderBlock, Sf2Model};

struct Formats {
    title: Format,
    label: Format,
    day_header: Format,
    name: Format,
    cell: Format,
    total_label: Format,
    total_cell: Format,
    footer: Format,
}

fn build_formats() -> Formats {
    let title = Format::new()
        .set_bold()
        .set_font_size(12)
        .set_align(FormatAlign::Center);
    let label = Format::new().set_bold().set_border(FormatBorder::Thin);
    let day_header = Format::new()
        .set_bold()
        .set_font_size(8)
        .set_align(FormatAlign::Center)
        .set_border(FormatBorder::Thin)
        .set_background_color(0xD9D9D9);
    let name = Format::new().set_font_size(9).set_border(FormatBorder::Thin);
    let cell = Format::new()
        .set_font_size(9)
        .set_align(FormatAlign::Center)
        .set_border(FormatBorder::Thin);
    let total_label = Format::new()
        .set_bold()
        .set_font_size(9)
        .set_border(FormatBorder::Thin)
        .set_background_color(0xF2F2F2);
    let total_cell = Format::new()
        .set_bold()
        .set_font_size(9)
        .set_align(FormatAlign::Center)
        .set_border(FormatBorder::Thin)
        .set_background_color(0xF2F2F2);
    let footer = Format::new().set_font_size(9);
    Formats {
        title,
        label,
        day_header,
        name,
        cell,
        total_label,
        total_cell,
        footer,
    }
}

/// Fixed column layout: No. | learner's name | LRN | one column per school
/// day | absent total | tardy total.
#[derive(Debug, Clone, Copy)]
struct Layout {
    first_day_col: u16,
    day_count: u16,
    absent_col: u16,
    tardy_col: u16,
}

impl Layout {
    fn new(day_count: usize) -> Self {
        let first_day_col = 3;
        let day_count = day_count as u16;
        let absent_col = first_day_col + day_count;
        Self {
            first_day_col,
            day_count,
            absent_col,
            tardy_col: absent_col + 1,
        }
    }

    fn day_col(&self, idx: usize) -> u16 {
        self.first_day_col + idx as u16
    }

    fn last_col(&self) -> u16 {
        self.tardy_col
    }
}

/// Where a rendered gender block landed, so the combined row can reference
/// the per-gender total rows by cell.
#[derive(Debug, Clone, Copy)]
struct BlockRefs {
    total_row: u32,
}

fn fail(stage: &'static str, cursor: GridCursor, e: XlsxError) -> RenderError {
    RenderError::at(stage, cursor, e.to_string())
}

pub fn render_sf2_xlsx(model: &Sf2Model) -> Result<Vec<u8>, RenderError> {
    let mut workbook = Workbook::new();
    let formats = build_formats();
    let layout = Layout::new(model.school_days.len());

    let sheet = workbook.add_worksheet();
    sheet
        .set_name("SF2")
        .map_err(|e| RenderError::new("setup", e.to_string()))?;
    set_column_widths(sheet, &layout);

    let cursor = GridCursor::new(0, 0);
    let cursor = write_title_block(sheet, model, &formats, &layout, cursor)?;
    let cursor = write_day_header(sheet, model, &formats, &layout, cursor)?;
    let (cursor, male_refs) =
        write_gender_block(sheet, &model.male, "MALE", model, &formats, &layout, cursor)?;
    let (cursor, female_refs) =
        write_gender_block(sheet, &model.female, "FEMALE", model, &formats, &layout, cursor)?;
    let cursor = write_combined_row(
        sheet, model, &formats, &layout, cursor, male_refs, female_refs,
    )?;
    write_footer(sheet, model, &formats, &layout, cursor.line_start())?;

    workbook
        .save_to_buffer()
        .map_err(|e| RenderError::new("finalize", e.to_string()))
}

fn set_column_widths(sheet: &mut Worksheet, layout: &Layout) {
    sheet.set_column_width(0, 4).ok();
    sheet.set_column_width(1, 28).ok();
    sheet.set_column_width(2, 14).ok();
    for idx in 0..layout.day_count {
        sheet.set_column_width(layout.first_day_col + idx, 3.5).ok();
    }
    sheet.set_column_width(layout.absent_col, 8).ok();
    sheet.set_column_width(layout.tardy_col, 8).ok();
}

fn write_title_block(
    sheet: &mut Worksheet,
    model: &Sf2Model,
    formats: &Formats,
    layout: &Layout,
    cursor: GridCursor,
) -> Result<GridCursor, RenderError> {
    let stage = "title";
    let last = layout.last_col();
    sheet
        .merge_range(
            cursor.row,
            0,
            cursor.row,
            last,
            "School Form 2 (SF2) Daily Attendance Report of Learners",
            &formats.title,
        )
        .map_err(|e| fail(stage, cursor, e))?;
    sheet.set_row_height(cursor.row, 18).ok();

    let cursor = cursor.line_start();
    let split = last / 2;
    sheet
        .merge_range(
            cursor.row,
            0,
            cursor.row,
            split,
            &format!("School Year: {}", model.section.school_year),
            &formats.label,
        )
        .map_err(|e| fail(stage, cursor, e))?;
    sheet
        .merge_range(
            cursor.row,
            split + 1,
            cursor.row,
            last,
            &format!("Report for the Month of: {} {}", model.month_name, model.year),
            &formats.label,
        )
        .map_err(|e| fail(stage, cursor, e))?;

    let cursor = cursor.line_start();
    sheet
        .merge_range(
            cursor.row,
            0,
            cursor.row,
            split,
            &format!("Section: {}", model.section.name),
            &formats.label,
        )
        .map_err(|e| fail(stage, cursor, e))?;
    sheet
        .merge_range(
            cursor.row,
            split + 1,
            cursor.row,
            last,
            &format!("Grade Level: {}", model.section.grade_level),
            &formats.label,
        )
        .map_err(|e| fail(stage, cursor, e))?;

    Ok(cursor.line_start())
}

/// Two header rows: day-of-month numbers over weekday abbreviations. The
/// fixed columns and the totals pair span both rows via merges.
fn write_day_header(
    sheet: &mut Worksheet,
    model: &Sf2Model,
    formats: &Formats,
    layout: &Layout,
    cursor: GridCursor,
) -> Result<GridCursor, RenderError> {
    let stage = "day_header";
    let top = cursor.row;
    let bottom = cursor.row + 1;

    sheet
        .merge_range(top, 0, bottom, 0, "No.", &formats.day_header)
        .map_err(|e| fail(stage, cursor, e))?;
    sheet
        .merge_range(top, 1, bottom, 1, "LEARNER'S NAME", &formats.day_header)
        .map_err(|e| fail(stage, cursor, e))?;
    sheet
        .merge_range(top, 2, bottom, 2, "LRN", &formats.day_header)
        .map_err(|e| fail(stage, cursor, e))?;

    let mut day_cursor = cursor.at_col(layout.first_day_col);
    for day in &model.school_days {
        sheet
            .write_with_format(top, day_cursor.col, *day, &formats.day_header)
            .map_err(|e| fail(stage, day_cursor, e))?;
        sheet
            .write_with_format(
                bottom,
                day_cursor.col,
                calendar::weekday_abbrev(model.year, model.month, *day),
                &formats.day_header,
            )
            .map_err(|e| fail(stage, day_cursor, e))?;
        day_cursor = day_cursor.right();
    }

    sheet
        .merge_range(
            top,
            layout.absent_col,
            top,
            layout.tardy_col,
            "TOTAL FOR THE MONTH",
            &formats.day_header,
        )
        .map_err(|e| fail(stage, cursor.at_col(layout.absent_col), e))?;
    sheet
        .write_with_format(bottom, layout.absent_col, "ABSENT", &formats.day_header)
        .map_err(|e| fail(stage, cursor.at_col(layout.absent_col), e))?;
    sheet
        .write_with_format(bottom, layout.tardy_col, "TARDY", &formats.day_header)
        .map_err(|e| fail(stage, cursor.at_col(layout.tardy_col), e))?;

    Ok(GridCursor::new(bottom + 1, 0))
}

fn write_gender_block(
    sheet: &mut Worksheet,
    block: &GenderBlock,
    label: &str,
    model: &Sf2Model,
    formats: &Formats,
    layout: &Layout,
    cursor: GridCursor,
) -> Result<(GridCursor, BlockRefs), RenderError> {
    let stage = "body";
    let first_data_row = cursor.row;
    let mut cursor = cursor;

    for (idx, row) in block.rows.iter().enumerate() {
        sheet.set_row_format(cursor.row, &formats.cell).ok();
        sheet
            .write_with_format(cursor.row, 0, (idx + 1) as u32, &formats.cell)
            .map_err(|e| fail(stage, cursor, e))?;
        sheet
            .write_with_format(cursor.row, 1, row.display_name.as_str(), &formats.name)
            .map_err(|e| fail(stage, cursor.at_col(1), e))?;
        sheet
            .write_with_format(
                cursor.row,
                2,
                row.lrn.as_deref().unwrap_or(""),
                &formats.name,
            )
            .map_err(|e| fail(stage, cursor.at_col(2), e))?;

        for (day_idx, dc) in row.per_day.iter().enumerate() {
            let col = layout.day_col(day_idx);
            let code = cell_code(*dc);
            let at = cursor.at_col(col);
            if code == ' ' {
                sheet
                    .write_blank(cursor.row, col, &formats.cell)
                    .map_err(|e| fail(stage, at, e))?;
            } else {
                sheet
                    .write_with_format(cursor.row, col, code.to_string().as_str(), &formats.cell)
                    .map_err(|e| fail(stage, at, e))?;
            }
        }

        // Live totals: the sheet stays correct if a day cell is edited after
        // export.
        let first_day = cell_ref(cursor.at_col(layout.first_day_col));
        let last_day = cell_ref(cursor.at_col(layout.absent_col - 1));
        sheet
            .write_formula_with_format(
                cursor.row,
                layout.absent_col,
                format!("=COUNTIF({}:{},\"/\")", first_day, last_day).as_str(),
                &formats.cell,
            )
            .map_err(|e| fail(stage, cursor.at_col(layout.absent_col), e))?;
        sheet
            .write_formula_with_format(
                cursor.row,
                layout.tardy_col,
                format!("=COUNTIF({}:{},\"T\")", first_day, last_day).as_str(),
                &formats.cell,
            )
            .map_err(|e| fail(stage, cursor.at_col(layout.tardy_col), e))?;

        cursor = cursor.line_start();
    }

    let stage = "totals";
    let total_row = cursor.row;
    sheet
        .merge_range(
            total_row,
            0,
            total_row,
            2,
            &format!("{} | TOTAL Per Day", label),
            &formats.total_label,
        )
        .map_err(|e| fail(stage, cursor, e))?;

    for day_idx in 0..model.school_days.len() {
        let col = layout.day_col(day_idx);
        let at = GridCursor::new(total_row, col);
        if block.rows.is_empty() {
            sheet
                .write_with_format(total_row, col, 0_u32, &formats.total_cell)
                .map_err(|e| fail(stage, at, e))?;
        } else {
            let top = cell_ref(GridCursor::new(first_data_row, col));
            let bottom = cell_ref(GridCursor::new(total_row - 1, col));
            sheet
                .write_formula_with_format(
                    total_row,
                    col,
                    format!(
                        "={}-COUNTIF({}:{},\"/\")",
                        block.enrolled, top, bottom
                    )
                    .as_str(),
                    &formats.total_cell,
                )
                .map_err(|e| fail(stage, at, e))?;
        }
    }

    for col in [layout.absent_col, layout.tardy_col] {
        let at = GridCursor::new(total_row, col);
        if block.rows.is_empty() {
            sheet
                .write_with_format(total_row, col, 0_u32, &formats.total_cell)
                .map_err(|e| fail(stage, at, e))?;
        } else {
            let top = cell_ref(GridCursor::new(first_data_row, col));
            let bottom = cell_ref(GridCursor::new(total_row - 1, col));
            sheet
                .write_formula_with_format(
                    total_row,
                    col,
                    format!("=SUM({}:{})", top, bottom).as_str(),
                    &formats.total_cell,
                )
                .map_err(|e| fail(stage, at, e))?;
        }
    }

    Ok((cursor.line_start(), BlockRefs { total_row }))
}

fn write_combined_row(
    sheet: &mut Worksheet,
    model: &Sf2Model,
    formats: &Formats,
    layout: &Layout,
    cursor: GridCursor,
    male: BlockRefs,
    female: BlockRefs,
) -> Result<GridCursor, RenderError> {
    let stage = "totals";
    sheet
        .merge_range(
            cursor.row,
            0,
            cursor.row,
            2,
            "COMBINED | TOTAL Per Day",
            &formats.total_label,
        )
        .map_err(|e| fail(stage, cursor, e))?;

    let mut cols: Vec<u16> = (0..model.school_days.len())
        .map(|i| layout.day_col(i))
        .collect();
    cols.push(layout.absent_col);
    cols.push(layout.tardy_col);
    for col in cols {
        let at = cursor.at_col(col);
        let male_ref = cell_ref(GridCursor::new(male.total_row, col));
        let female_ref = cell_ref(GridCursor::new(female.total_row, col));
        sheet
            .write_formula_with_format(
                cursor.row,
                col,
                format!("={}+{}", male_ref, female_ref).as_str(),
                &formats.total_cell,
            )
            .map_err(|e| fail(stage, at, e))?;
    }

    Ok(cursor)
}

fn write_footer(
    sheet: &mut Worksheet,
    model: &Sf2Model,
    formats: &Formats,
    layout: &Layout,
    cursor: GridCursor,
) -> Result<GridCursor, RenderError> {
    let stage = "footer";
    let last = layout.last_col();
    let mut cursor = cursor.line_start();

    let lines = [
        "Codes: (blank) Present    / Absent    T Tardy".to_string(),
        format!(
            "Enrolment: Male {}    Female {}    Combined {}",
            model.male.enrolled, model.female.enrolled, model.combined_enrolled
        ),
        format!(
            "Month Totals: Absences {}    Tardies {}    Average Daily Attendance {:.2}",
            model.combined_absent_total,
            model.combined_tardy_total,
            model.average_daily_attendance
        ),
    ];
    for line in lines {
        sheet
            .merge_range(cursor.row, 0, cursor.row, last, &line, &formats.footer)
            .map_err(|e| fail(stage, cursor, e))?;
        cursor = cursor.line_start();
    }

    if let Some(adviser) = model.section.adviser.as_deref() {
        sheet
            .merge_range(
                cursor.row,
                0,
                cursor.row,
                last,
                &format!("Prepared by: {} (Adviser)", adviser),
                &formats.footer,
            )
            .map_err(|e| fail(stage, cursor, e))?;
        cursor = cursor.line_start();
    }

    Ok(cursor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sf2::{DayStatus, GenderBlock, ReportRow, SectionInfo};

    fn row(name: &str, per_day: Vec<Option<DayStatus>>) -> ReportRow {
        let absent_count = per_day.iter().filter(|c| **c == Some(DayStatus::Absent)).count() as u32;
        let tardy_count = per_day.iter().filter(|c| **c == Some(DayStatus::Late)).count() as u32;
        ReportRow {
            student_id: format!("id-{}", name),
            display_name: name.to_string(),
            lrn: None,
            per_day,
            absent_count,
            tardy_count,
        }
    }

    fn block(rows: Vec<ReportRow>, days: usize) -> GenderBlock {
        let enrolled = rows.len();
        let absent_total = rows.iter().map(|r| r.absent_count).sum();
        let tardy_total = rows.iter().map(|r| r.tardy_count).sum();
        let daily_present = (0..days)
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

    fn tiny_model() -> Sf2Model {
        let school_days = vec![1, 2, 3, 4, 5];
        let mut abad = vec![None; 5];
        abad[1] = Some(DayStatus::Absent);
        abad[3] = Some(DayStatus::Late);
        let male = block(
            vec![row("Abad, Luis", abad), row("Ramos, Diego", vec![None; 5])],
            5,
        );
        let female = block(vec![row("Cruz, Maria", vec![Some(DayStatus::Present); 5])], 5);
        let combined_daily_present = male
            .daily_present
            .iter()
            .zip(female.daily_present.iter())
            .map(|(m, f)| m + f)
            .collect::<Vec<_>>();
        let average_daily_attendance =
            combined_daily_present.iter().map(|n| *n as f64).sum::<f64>() / 5.0;
        Sf2Model {
            section: SectionInfo {
                id: "sec1".to_string(),
                name: "Sampaguita".to_string(),
                grade_level: "Grade 4".to_string(),
                school_year: "2023-2024".to_string(),
                adviser: Some("R. Cruz".to_string()),
            },
            year: 2024,
            month: 3,
            month_name: "March".to_string(),
            school_days,
            combined_enrolled: male.enrolled + female.enrolled,
            combined_absent_total: male.absent_total + female.absent_total,
            combined_tardy_total: male.tardy_total + female.tardy_total,
            combined_daily_present,
            average_daily_attendance,
            male,
            female,
        }
    }

    #[test]
    fn renders_a_nonempty_workbook() {
        let bytes = render_sf2_xlsx(&tiny_model()).expect("render xlsx");
        assert!(bytes.len() > 1000);
        // xlsx is a zip archive.
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn renders_with_an_empty_gender_block() {
        let mut model = tiny_model();
        model.female = block(Vec::new(), 5);
        model.combined_enrolled = model.male.enrolled;
        let bytes = render_sf2_xlsx(&model).expect("render xlsx");
        assert!(!bytes.is_empty());
    }

    #[test]
    fn layout_places_totals_after_the_day_columns() {
        let layout = Layout::new(21);
        assert_eq!(layout.first_day_col, 3);
        assert_eq!(layout.day_col(20), 23);
        assert_eq!(layout.absent_col, 24);
        assert_eq!(layout.tardy_col, 25);
    }
}

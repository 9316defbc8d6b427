use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference};

use super::RenderError;
use crate::calendar;
use crate::sf2::{cell_code, GenderBlock, Sf2Model};

// Landscape A4.
const PAGE_W: f32 = 297.0;
const PAGE_H: f32 = 210.0;
const TOP_Y: f32 = PAGE_H - 12.0;
const BOTTOM_Y: f32 = 14.0;
const ROW_H: f32 = 5.2;

const NO_X: f32 = 10.0;
const NAME_X: f32 = 17.0;
const DAY_AREA_X: f32 = 90.0;
const DAY_AREA_END: f32 = 266.0;
const ABSENT_X: f32 = 270.0;
const TARDY_X: f32 = 284.0;

const NAME_MAX_CHARS: usize = 34;

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

struct Page {
    layer: PdfLayerReference,
    y: f32,
}

fn truncate_name(name: &str) -> String {
    if name.chars().count() <= NAME_MAX_CHARS {
        return name.to_string();
    }
    let mut out: String = name.chars().take(NAME_MAX_CHARS - 3).collect();
    out.push_str("...");
    out
}

fn day_x(idx: usize, day_count: usize) -> f32 {
    let width = (DAY_AREA_END - DAY_AREA_X) / day_count.max(1) as f32;
    DAY_AREA_X + idx as f32 * width
}

/// Single-pass paginated text grid. No merges and no formulas: every total
/// and percentage is precomputed in the model and written as plain text.
pub fn render_sf2_pdf(model: &Sf2Model) -> Result<Vec<u8>, RenderError> {
    let title = format!(
        "SF2 Daily Attendance Report - {} - {} {}",
        model.section.name, model.month_name, model.year
    );
    let (doc, page_idx, layer_idx) = PdfDocument::new(&title, Mm(PAGE_W), Mm(PAGE_H), "grid");
    let fonts = Fonts {
        regular: doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| RenderError::new("setup", e.to_string()))?,
        bold: doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| RenderError::new("setup", e.to_string()))?,
    };
    let mut page = Page {
        layer: doc.get_page(page_idx).get_layer(layer_idx),
        y: TOP_Y,
    };

    write_title_block(&mut page, model, &fonts);
    write_day_header(&mut page, model, &fonts);
    write_gender_block(&doc, &mut page, model, &model.male, "MALE", &fonts);
    write_gender_block(&doc, &mut page, model, &model.female, "FEMALE", &fonts);
    write_combined_row(&doc, &mut page, model, &fonts);
    write_footer(&doc, &mut page, model, &fonts);

    doc.save_to_bytes()
        .map_err(|e| RenderError::new("finalize", e.to_string()))
}

fn next_page(doc: &PdfDocumentReference, page: &mut Page, model: &Sf2Model, fonts: &Fonts) {
    let (p, l) = doc.add_page(Mm(PAGE_W), Mm(PAGE_H), "grid");
    page.layer = doc.get_page(p).get_layer(l);
    page.y = TOP_Y;
    write_day_header(page, model, fonts);
}

fn ensure_room(
    doc: &PdfDocumentReference,
    page: &mut Page,
    model: &Sf2Model,
    fonts: &Fonts,
    needed: f32,
) {
    if page.y - needed < BOTTOM_Y {
        next_page(doc, page, model, fonts);
    }
}

fn write_title_block(page: &mut Page, model: &Sf2Model, fonts: &Fonts) {
    page.layer.use_text(
        "School Form 2 (SF2) Daily Attendance Report of Learners",
        12.0,
        Mm(NO_X),
        Mm(page.y),
        &fonts.bold,
    );
    page.y -= 7.0;
    page.layer.use_text(
        format!(
            "School Year: {}    Report for the Month of: {} {}",
            model.section.school_year, model.month_name, model.year
        ),
        9.0,
        Mm(NO_X),
        Mm(page.y),
        &fonts.regular,
    );
    page.y -= 5.5;
    page.layer.use_text(
        format!(
            "Section: {}    Grade Level: {}",
            model.section.name, model.section.grade_level
        ),
        9.0,
        Mm(NO_X),
        Mm(page.y),
        &fonts.regular,
    );
    page.y -= 8.0;
}

fn write_day_header(page: &mut Page, model: &Sf2Model, fonts: &Fonts) {
    let day_count = model.school_days.len();
    page.layer
        .use_text("No.", 7.0, Mm(NO_X), Mm(page.y), &fonts.bold);
    page.layer
        .use_text("LEARNER'S NAME", 7.0, Mm(NAME_X), Mm(page.y), &fonts.bold);
    for (idx, day) in model.school_days.iter().enumerate() {
        page.layer.use_text(
            day.to_string(),
            7.0,
            Mm(day_x(idx, day_count)),
            Mm(page.y),
            &fonts.bold,
        );
    }
    page.layer
        .use_text("ABSENT", 7.0, Mm(ABSENT_X), Mm(page.y), &fonts.bold);
    page.layer
        .use_text("TARDY", 7.0, Mm(TARDY_X), Mm(page.y), &fonts.bold);
    page.y -= 4.0;

    for (idx, day) in model.school_days.iter().enumerate() {
        page.layer.use_text(
            calendar::weekday_abbrev(model.year, model.month, *day),
            6.0,
            Mm(day_x(idx, day_count)),
            Mm(page.y),
            &fonts.regular,
        );
    }
    page.y -= ROW_H;
}

fn write_gender_block(
    doc: &PdfDocumentReference,
    page: &mut Page,
    model: &Sf2Model,
    block: &GenderBlock,
    label: &str,
    fonts: &Fonts,
) {
    let day_count = model.school_days.len();

    ensure_room(doc, page, model, fonts, ROW_H * 2.0);
    page.layer
        .use_text(label, 8.0, Mm(NO_X), Mm(page.y), &fonts.bold);
    page.y -= ROW_H;

    for (idx, row) in block.rows.iter().enumerate() {
        ensure_room(doc, page, model, fonts, ROW_H);
        page.layer.use_text(
            format!("{}", idx + 1),
            7.0,
            Mm(NO_X),
            Mm(page.y),
            &fonts.regular,
        );
        page.layer.use_text(
            truncate_name(&row.display_name),
            7.0,
            Mm(NAME_X),
            Mm(page.y),
            &fonts.regular,
        );
        for (day_idx, dc) in row.per_day.iter().enumerate() {
            let code = cell_code(*dc);
            if code == ' ' {
                continue;
            }
            page.layer.use_text(
                code.to_string(),
                7.0,
                Mm(day_x(day_idx, day_count)),
                Mm(page.y),
                &fonts.regular,
            );
        }
        page.layer.use_text(
            row.absent_count.to_string(),
            7.0,
            Mm(ABSENT_X),
            Mm(page.y),
            &fonts.regular,
        );
        page.layer.use_text(
            row.tardy_count.to_string(),
            7.0,
            Mm(TARDY_X),
            Mm(page.y),
            &fonts.regular,
        );
        page.y -= ROW_H;
    }

    ensure_room(doc, page, model, fonts, ROW_H);
    page.layer.use_text(
        format!("{} TOTAL Per Day", label),
        7.0,
        Mm(NO_X),
        Mm(page.y),
        &fonts.bold,
    );
    for (day_idx, present) in block.daily_present.iter().enumerate() {
        page.layer.use_text(
            present.to_string(),
            7.0,
            Mm(day_x(day_idx, day_count)),
            Mm(page.y),
            &fonts.bold,
        );
    }
    page.layer.use_text(
        block.absent_total.to_string(),
        7.0,
        Mm(ABSENT_X),
        Mm(page.y),
        &fonts.bold,
    );
    page.layer.use_text(
        block.tardy_total.to_string(),
        7.0,
        Mm(TARDY_X),
        Mm(page.y),
        &fonts.bold,
    );
    page.y -= ROW_H;
}

fn write_combined_row(
    doc: &PdfDocumentReference,
    page: &mut Page,
    model: &Sf2Model,
    fonts: &Fonts,
) {
    let day_count = model.school_days.len();
    ensure_room(doc, page, model, fonts, ROW_H);
    page.layer.use_text(
        "COMBINED TOTAL Per Day",
        7.0,
        Mm(NO_X),
        Mm(page.y),
        &fonts.bold,
    );
    for (day_idx, present) in model.combined_daily_present.iter().enumerate() {
        page.layer.use_text(
            present.to_string(),
            7.0,
            Mm(day_x(day_idx, day_count)),
            Mm(page.y),
            &fonts.bold,
        );
    }
    page.layer.use_text(
        model.combined_absent_total.to_string(),
        7.0,
        Mm(ABSENT_X),
        Mm(page.y),
        &fonts.bold,
    );
    page.layer.use_text(
        model.combined_tardy_total.to_string(),
        7.0,
        Mm(TARDY_X),
        Mm(page.y),
        &fonts.bold,
    );
    page.y -= ROW_H * 1.5;
}

fn write_footer(
    doc: &PdfDocumentReference,
    page: &mut Page,
    model: &Sf2Model,
    fonts: &Fonts,
) {
    let attendance_pct = if model.combined_enrolled == 0 {
        0.0
    } else {
        100.0 * model.average_daily_attendance / model.combined_enrolled as f64
    };
    let mut lines = vec![
        "Codes: (blank) Present    / Absent    T Tardy".to_string(),
        format!(
            "Enrolment: Male {}    Female {}    Combined {}",
            model.male.enrolled, model.female.enrolled, model.combined_enrolled
        ),
        format!(
            "Month Totals: Absences {}    Tardies {}    Average Daily Attendance {:.2} ({:.1}%)",
            model.combined_absent_total,
            model.combined_tardy_total,
            model.average_daily_attendance,
            attendance_pct
        ),
    ];
    if let Some(adviser) = model.section.adviser.as_deref() {
        lines.push(format!("Prepared by: {} (Adviser)", adviser));
    }
    for line in lines {
        ensure_room(doc, page, model, fonts, ROW_H);
        page.layer
            .use_text(line, 8.0, Mm(NO_X), Mm(page.y), &fonts.regular);
        page.y -= ROW_H;
    }
}

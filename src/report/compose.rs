//! Report card composition.
//!
//! A report is drawn in one pass that threads the Y cursor through the
//! header block, the grade table, extracurriculars, attendance beside the
//! homeroom remarks and the signature block. A second pass revisits every
//! page the student occupied to add the running identity strip and the
//! footer, which need the final page count.

use crate::layout::{
    draw_side_by_side, Align, BoundSection, Canvas, ColumnSpec, FontWeight, LayoutContext,
    MarginSettings, PageGeometry, PdfCanvas, RecordingCanvas, TableSection, TableStyle,
    TextOptions,
};

use super::model::{ExtracurricularRow, GradeRow, ReportCard};

/// Space kept free at the top of continuation pages for the identity strip.
pub const RESERVED_HEADER_BAND: f64 = 11.0;
pub const SIGNATURE_HEIGHT: f64 = 62.0;
const SECTION_GAP: f64 = 5.0;
const SIDE_GAP: f64 = 5.0;

/// Pages (1-based, inclusive) occupied by one student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSpan {
    pub start: usize,
    pub end: usize,
}

impl PageSpan {
    pub fn len(&self) -> usize {
        self.end + 1 - self.start
    }
}

pub fn layout_context(page: PageGeometry, margins: MarginSettings) -> LayoutContext {
    LayoutContext::new(page, margins, RESERVED_HEADER_BAND)
}

fn format_score(score: Option<f64>) -> String {
    match score {
        Some(s) if s.fract().abs() < 1e-9 => format!("{:.0}", s),
        Some(s) => format!("{:.1}", s),
        None => "-".to_string(),
    }
}

fn dash_if_empty(s: &str) -> String {
    if s.trim().is_empty() {
        "-".to_string()
    } else {
        s.to_string()
    }
}

fn grade_columns(content_width: f64) -> Vec<ColumnSpec<GradeRow>> {
    vec![
        ColumnSpec::new(10.0, "No", |i, _| (i + 1).to_string()).align(Align::Center),
        ColumnSpec::new(50.0, "Mata Pelajaran", |_, g: &GradeRow| g.subject.clone()),
        ColumnSpec::new(18.0, "Nilai", |_, g: &GradeRow| format_score(g.score))
            .align(Align::Center),
        ColumnSpec::new(18.0, "Predikat", |_, g: &GradeRow| dash_if_empty(&g.predikat))
            .align(Align::Center),
        ColumnSpec::new(
            (content_width - 96.0).max(20.0),
            "Capaian Kompetensi",
            |_, g: &GradeRow| dash_if_empty(&g.description),
        ),
    ]
}

fn extracurricular_columns(content_width: f64) -> Vec<ColumnSpec<ExtracurricularRow>> {
    vec![
        ColumnSpec::new(10.0, "No", |i, _| (i + 1).to_string()).align(Align::Center),
        ColumnSpec::new(60.0, "Kegiatan Ekstrakurikuler", |_, e: &ExtracurricularRow| {
            e.name.clone()
        }),
        ColumnSpec::new(20.0, "Predikat", |_, e: &ExtracurricularRow| {
            dash_if_empty(&e.predikat)
        })
        .align(Align::Center),
        ColumnSpec::new(
            (content_width - 90.0).max(20.0),
            "Keterangan",
            |_, e: &ExtracurricularRow| dash_if_empty(&e.description),
        ),
    ]
}

fn attendance_columns() -> Vec<ColumnSpec<(&'static str, i64)>> {
    vec![
        ColumnSpec::new(50.0, "Ketidakhadiran", |_, r: &(&'static str, i64)| r.0.to_string()),
        ColumnSpec::new(30.0, "Jumlah", |_, r: &(&'static str, i64)| format!("{} hari", r.1))
            .align(Align::Center),
    ]
}

fn remark_columns(width: f64) -> Vec<ColumnSpec<String>> {
    vec![ColumnSpec::new(width, "Catatan Wali Kelas", |_, s: &String| {
        dash_if_empty(s)
    })]
}

fn identity_pair(canvas: &mut dyn Canvas, x: f64, y: f64, label: &str, value: &str) {
    canvas.set_font(FontWeight::Normal);
    canvas.text_line(label, x, y, Align::Left);
    canvas.text_line(&format!(": {}", value), x + 32.0, y, Align::Left);
}

fn draw_header_block(canvas: &mut dyn Canvas, ctx: &LayoutContext, report: &ReportCard, y: f64) -> f64 {
    let left = ctx.content_left();
    let center = left + ctx.content_width() / 2.0;
    let right_col = center + 5.0;

    canvas.set_font(FontWeight::Bold);
    canvas.set_font_size(12.0);
    canvas.text_line("LAPORAN HASIL BELAJAR PESERTA DIDIK", center, y + 5.0, Align::Center);
    canvas.set_font_size(11.0);
    if !report.school.name.is_empty() {
        canvas.text_line(&report.school.name, center, y + 11.0, Align::Center);
    }
    canvas.line(left, y + 14.0, left + ctx.content_width(), y + 14.0);

    canvas.set_font_size(9.0);
    let s = &report.student;
    let nis = format!("{} / {}", dash_if_empty(&s.nis), dash_if_empty(&s.nisn));
    identity_pair(canvas, left, y + 20.0, "Nama Peserta Didik", &s.name);
    identity_pair(canvas, left, y + 25.0, "NIS / NISN", &nis);
    identity_pair(canvas, left, y + 30.0, "Nama Sekolah", &dash_if_empty(&report.school.name));
    identity_pair(canvas, right_col, y + 20.0, "Kelas", &dash_if_empty(&s.class_name));
    identity_pair(canvas, right_col, y + 25.0, "Semester", &dash_if_empty(&report.school.semester));
    identity_pair(
        canvas,
        right_col,
        y + 30.0,
        "Tahun Pelajaran",
        &dash_if_empty(&report.school.academic_year),
    );
    y + 36.0
}

fn draw_signature_block(
    canvas: &mut dyn Canvas,
    ctx: &LayoutContext,
    report: &ReportCard,
    y: f64,
) -> f64 {
    let mut y = y;
    if !ctx.fits(y, SIGNATURE_HEIGHT) && !ctx.at_page_top(y) {
        y = ctx.break_page(canvas);
    }
    let left = ctx.content_left();
    let width = ctx.content_width();
    let (parent_x, teacher_x, center) = (left + width / 6.0, left + width * 5.0 / 6.0, left + width / 2.0);
    let school = &report.school;
    let student = &report.student;

    canvas.set_font(FontWeight::Normal);
    canvas.set_font_size(10.0);
    let place_date = match (school.city.trim(), school.report_date.trim()) {
        ("", "") => String::new(),
        ("", date) => date.to_string(),
        (city, "") => city.to_string(),
        (city, date) => format!("{}, {}", city, date),
    };
    canvas.text_line(&place_date, teacher_x, y + 4.0, Align::Center);
    canvas.text_line("Orang Tua/Wali", parent_x, y + 9.0, Align::Center);
    canvas.text_line("Wali Kelas", teacher_x, y + 9.0, Align::Center);
    canvas.text_line("(.........................)", parent_x, y + 28.0, Align::Center);
    // Long names wrap onto the NIP line rather than run into the next column.
    let name_opts = TextOptions {
        align: Align::Center,
        max_width: Some(width / 3.0 - 4.0),
    };
    canvas.set_font(FontWeight::Bold);
    let name_lines = canvas.text(&dash_if_empty(&student.homeroom_teacher), teacher_x, y + 28.0, name_opts);
    canvas.set_font(FontWeight::Normal);
    if !student.homeroom_nip.is_empty() {
        let nip_y = y + 28.0 + canvas.line_height() * name_lines as f64 + 1.0;
        canvas.text_line(&format!("NIP. {}", student.homeroom_nip), teacher_x, nip_y, Align::Center);
    }

    canvas.text_line("Mengetahui,", center, y + 38.0, Align::Center);
    canvas.text_line("Kepala Sekolah", center, y + 43.0, Align::Center);
    canvas.set_font(FontWeight::Bold);
    let name_lines = canvas.text(&dash_if_empty(&school.principal_name), center, y + 55.0, name_opts);
    canvas.set_font(FontWeight::Normal);
    if !school.principal_nip.is_empty() {
        let nip_y = y + 55.0 + canvas.line_height() * name_lines as f64 + 1.0;
        canvas.text_line(&format!("NIP. {}", school.principal_nip), center, nip_y, Align::Center);
    }
    y + SIGNATURE_HEIGHT
}

/// Draws one report card from the current page on. The caller provides a
/// fresh page.
pub fn compose_student(canvas: &mut dyn Canvas, ctx: &LayoutContext, report: &ReportCard) -> PageSpan {
    let start = canvas.current_page();
    let cw = ctx.content_width();
    let left = ctx.content_left();

    let mut y = draw_header_block(canvas, ctx, report, ctx.margins.top);

    let grade_cols = grade_columns(cw);
    let grades = TableSection::new(&grade_cols, TableStyle::GRADES, left);
    y = grades.draw(canvas, ctx, y, Some("A. Nilai Akademik"), &report.grades);

    let extra_cols = extracurricular_columns(cw);
    let extras = TableSection::new(&extra_cols, TableStyle::EXTRACURRICULAR, left);
    y = extras.draw(
        canvas,
        ctx,
        y + SECTION_GAP,
        Some("B. Ekstrakurikuler"),
        &report.extracurriculars,
    );

    let absence_cols = attendance_columns();
    let absence_width: f64 = absence_cols.iter().map(|c| c.width).sum();
    let remark_cols = remark_columns((cw - absence_width - SIDE_GAP).max(30.0));
    let absences = report.attendance.rows();
    let notes = [report.homeroom_note.clone()];
    let attendance = BoundSection {
        table: TableSection::new(&absence_cols, TableStyle::ATTENDANCE, left),
        records: &absences,
    };
    let remarks = BoundSection {
        table: TableSection::new(
            &remark_cols,
            TableStyle::REMARKS,
            left + absence_width + SIDE_GAP,
        ),
        records: &notes,
    };
    y = draw_side_by_side(
        canvas,
        ctx,
        y + SECTION_GAP,
        Some("C. Ketidakhadiran dan Catatan"),
        &attendance,
        &remarks,
    );

    draw_signature_block(canvas, ctx, report, y + SECTION_GAP * 2.0);

    let span = PageSpan {
        start,
        end: canvas.current_page(),
    };
    decorate(canvas, ctx, report, span);
    span
}

/// Second pass over the pages of one student: identity strip on
/// continuation pages, footer on all of them.
fn decorate(canvas: &mut dyn Canvas, ctx: &LayoutContext, report: &ReportCard, span: PageSpan) {
    let left = ctx.content_left();
    let right = left + ctx.content_width();
    let footer_y = ctx.footer_baseline();
    let student = &report.student;

    for page in span.start..=span.end {
        canvas.set_page(page);
        canvas.set_font_size(8.0);

        if page != span.start {
            let strip_y = ctx.margins.top + 5.0;
            canvas.set_font(FontWeight::Bold);
            canvas.text_line(&student.name, left, strip_y, Align::Left);
            canvas.set_font(FontWeight::Normal);
            canvas.text_line(
                &format!("Kelas {} | NIS {}", student.class_name, dash_if_empty(&student.nis)),
                right,
                strip_y,
                Align::Right,
            );
            let rule = ctx.margins.top + RESERVED_HEADER_BAND - 3.0;
            canvas.line(left, rule, right, rule);
        }

        canvas.set_font(FontWeight::Italic);
        let footer = format!(
            "Halaman {} dari {} | {} | {}",
            page + 1 - span.start,
            span.len(),
            student.class_name,
            student.name
        );
        canvas.text_line(&footer, (left + right) / 2.0, footer_y, Align::Center);
    }
    canvas.set_page(span.end);
    canvas.set_font(FontWeight::Normal);
}

/// Draws every report into one canvas, each student from a fresh page.
pub fn compose_class(canvas: &mut dyn Canvas, ctx: &LayoutContext, reports: &[ReportCard]) -> Vec<PageSpan> {
    let mut spans = Vec::with_capacity(reports.len());
    for (i, report) in reports.iter().enumerate() {
        if i > 0 {
            canvas.add_page();
        }
        spans.push(compose_student(canvas, ctx, report));
    }
    spans
}

pub fn render_student_pdf(ctx: &LayoutContext, report: &ReportCard) -> PdfCanvas {
    let mut canvas = PdfCanvas::new(ctx.page);
    canvas.set_title(format!("Rapor {} - {}", report.student.name, report.student.class_name));
    compose_student(&mut canvas, ctx, report);
    canvas
}

pub fn render_class_pdf(
    ctx: &LayoutContext,
    class_name: &str,
    reports: &[ReportCard],
) -> (PdfCanvas, Vec<PageSpan>) {
    let mut canvas = PdfCanvas::new(ctx.page);
    canvas.set_title(format!("Rapor Kelas {}", class_name));
    let spans = compose_class(&mut canvas, ctx, reports);
    (canvas, spans)
}

/// Display list of one report card, used for on-screen previews.
pub fn preview_student(ctx: &LayoutContext, report: &ReportCard) -> (RecordingCanvas, PageSpan) {
    let mut canvas = RecordingCanvas::new(ctx.page);
    let span = compose_student(&mut canvas, ctx, report);
    (canvas, span)
}

use std::cmp::Ordering;

use super::canvas::{Align, Canvas, FillMode, FontWeight};
use super::page::LayoutContext;

/// Baseline offset of the first line inside its line box.
const BASELINE: f64 = 0.72;
const NO_DATA: &str = "Tidak ada data";
const TITLE_HEIGHT: f64 = 7.0;
const TITLE_FILL: f64 = 0.92;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VAlign {
    Top,
    Middle,
}

/// Text and spacing settings for one kind of table section. All lengths in mm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableStyle {
    pub font_size: f64,
    pub line_height: f64,
    pub min_row_height: f64,
    pub header_height: f64,
    pub padding_x: f64,
    pub padding_top: f64,
    pub padding_bottom: f64,
    pub header_fill: f64,
    pub valign: VAlign,
}

impl TableStyle {
    pub const GRADES: TableStyle = TableStyle {
        font_size: 9.0,
        line_height: 4.2,
        min_row_height: 10.0,
        header_height: 10.0,
        padding_x: 1.5,
        padding_top: 2.0,
        padding_bottom: 2.0,
        header_fill: 0.85,
        valign: VAlign::Top,
    };

    pub const EXTRACURRICULAR: TableStyle = TableStyle {
        min_row_height: 8.0,
        header_height: 8.0,
        padding_top: 1.5,
        padding_bottom: 1.5,
        ..TableStyle::GRADES
    };

    /// Three fixed rows, 18 mm together.
    pub const ATTENDANCE: TableStyle = TableStyle {
        min_row_height: 6.0,
        header_height: 7.0,
        padding_top: 0.8,
        padding_bottom: 0.8,
        valign: VAlign::Middle,
        ..TableStyle::GRADES
    };

    pub const REMARKS: TableStyle = TableStyle {
        min_row_height: 18.0,
        header_height: 7.0,
        padding_top: 1.0,
        padding_bottom: 1.0,
        ..TableStyle::GRADES
    };

    pub fn vertical_padding(&self) -> f64 {
        self.padding_top + self.padding_bottom
    }

    /// `max(min_row_height, lines * line_height + vertical padding)`
    pub fn row_height(&self, lines: usize) -> f64 {
        let content = lines.max(1) as f64 * self.line_height + self.vertical_padding();
        content.max(self.min_row_height)
    }
}

/// One column of a table section: width, header label and how to read the
/// cell text from a record (`index` is the record's 0-based position).
pub struct ColumnSpec<T> {
    pub width: f64,
    pub header: String,
    pub align: Align,
    pub accessor: fn(usize, &T) -> String,
}

impl<T> ColumnSpec<T> {
    pub fn new(width: f64, header: impl Into<String>, accessor: fn(usize, &T) -> String) -> Self {
        Self {
            width,
            header: header.into(),
            align: Align::Left,
            accessor,
        }
    }

    pub fn align(mut self, align: Align) -> Self {
        self.align = align;
        self
    }
}

/// A record's cell text wrapped per column, plus the shared row height.
#[derive(Debug, Clone, PartialEq)]
pub struct RowLayout {
    pub cells: Vec<Vec<String>>,
    pub height: f64,
}

pub struct TableSection<'a, T> {
    pub columns: &'a [ColumnSpec<T>],
    pub style: TableStyle,
    pub x: f64,
}

impl<'a, T> TableSection<'a, T> {
    pub fn new(columns: &'a [ColumnSpec<T>], style: TableStyle, x: f64) -> Self {
        Self { columns, style, x }
    }

    pub fn width(&self) -> f64 {
        self.columns.iter().map(|c| c.width).sum()
    }

    /// Column widths scaled down when their sum exceeds `available`.
    pub fn fitted_widths(&self, available: f64) -> Vec<f64> {
        let total = self.width();
        let scale = if total > available && total > 0.0 {
            available / total
        } else {
            1.0
        };
        self.columns.iter().map(|c| c.width * scale).collect()
    }

    fn wrap_cells(&self, canvas: &mut dyn Canvas, texts: &[String], widths: &[f64]) -> RowLayout {
        let cells: Vec<Vec<String>> = texts
            .iter()
            .zip(widths)
            .map(|(text, w)| {
                canvas.split_text_to_size(text, (w - 2.0 * self.style.padding_x).max(1.0))
            })
            .collect();
        let lines = cells.iter().map(|c| c.len()).max().unwrap_or(1);
        RowLayout {
            height: self.style.row_height(lines),
            cells,
        }
    }

    pub fn layout_row(
        &self,
        canvas: &mut dyn Canvas,
        widths: &[f64],
        index: usize,
        record: &T,
    ) -> RowLayout {
        canvas.set_font(FontWeight::Normal);
        canvas.set_font_size(self.style.font_size);
        let texts: Vec<String> = self
            .columns
            .iter()
            .map(|c| (c.accessor)(index, record))
            .collect();
        self.wrap_cells(canvas, &texts, widths)
    }

    fn layout_header(&self, canvas: &mut dyn Canvas, widths: &[f64]) -> RowLayout {
        canvas.set_font(FontWeight::Bold);
        canvas.set_font_size(self.style.font_size);
        let texts: Vec<String> = self.columns.iter().map(|c| c.header.clone()).collect();
        let mut header = self.wrap_cells(canvas, &texts, widths);
        let lines = header.cells.iter().map(|c| c.len()).max().unwrap_or(1);
        header.height = (lines as f64 * self.style.line_height + self.style.vertical_padding())
            .max(self.style.header_height);
        header
    }

    fn lay_out(
        &self,
        canvas: &mut dyn Canvas,
        ctx: &LayoutContext,
        records: &[T],
    ) -> (Vec<f64>, RowLayout, Vec<RowLayout>) {
        let widths = self.fitted_widths(ctx.content_width());
        let header = self.layout_header(canvas, &widths);
        let rows = records
            .iter()
            .enumerate()
            .map(|(i, r)| self.layout_row(canvas, &widths, i, r))
            .collect();
        (widths, header, rows)
    }

    /// Height of header plus all rows if drawn without a page break.
    pub fn measure(&self, canvas: &mut dyn Canvas, ctx: &LayoutContext, records: &[T]) -> f64 {
        let (_, header, rows) = self.lay_out(canvas, ctx, records);
        let body: f64 = if rows.is_empty() {
            self.style.row_height(1)
        } else {
            rows.iter().map(|r| r.height).sum()
        };
        header.height + body
    }

    fn lead_of(&self, ctx: &LayoutContext, header: &RowLayout, rows: &[RowLayout]) -> f64 {
        let first = rows
            .first()
            .map(|r| r.height)
            .unwrap_or_else(|| self.style.row_height(1));
        // A first row taller than a page is split, so only its first line
        // has to stay with the header.
        if header.height + first > ctx.content_bottom() - ctx.content_top() {
            header.height + self.style.row_height(1)
        } else {
            header.height + first
        }
    }

    /// Height of the header plus the first row, the least that must share a
    /// page with anything kept above the table.
    pub fn lead_height(&self, canvas: &mut dyn Canvas, ctx: &LayoutContext, records: &[T]) -> f64 {
        let (_, header, rows) = self.lay_out(canvas, ctx, records);
        self.lead_of(ctx, &header, &rows)
    }

    /// Draws the section, preceded by `title` when given, starting at `y`
    /// and returns the cursor below it.
    ///
    /// The title, header and first row share one break decision, so neither
    /// the title nor the header ever ends a page on its own. Before each
    /// further row the break rule `y + height > page bottom` is checked; on a
    /// break the cursor resets to the top of the content area and the header
    /// is drawn again. A row taller than the room under a fresh header is
    /// split between its wrapped lines.
    pub fn draw(
        &self,
        canvas: &mut dyn Canvas,
        ctx: &LayoutContext,
        y: f64,
        title: Option<&str>,
        records: &[T],
    ) -> f64 {
        let (widths, header, rows) = self.lay_out(canvas, ctx, records);
        let lead = self.lead_of(ctx, &header, &rows);

        let mut y = y;
        if !ctx.fits(y, title_height(title) + lead) && !ctx.at_page_top(y) {
            y = ctx.break_page(canvas);
        }
        if let Some(title) = title {
            draw_title(canvas, self.x, widths.iter().sum(), y, title);
            y += TITLE_HEIGHT;
        }
        self.draw_body(canvas, ctx, y, &widths, &header, &rows)
    }

    /// Header and rows from `y` with no break before the header; the caller
    /// has already kept the lead on this page.
    pub fn draw_kept(&self, canvas: &mut dyn Canvas, ctx: &LayoutContext, y: f64, records: &[T]) -> f64 {
        let (widths, header, rows) = self.lay_out(canvas, ctx, records);
        self.draw_body(canvas, ctx, y, &widths, &header, &rows)
    }

    fn draw_body(
        &self,
        canvas: &mut dyn Canvas,
        ctx: &LayoutContext,
        y: f64,
        widths: &[f64],
        header: &RowLayout,
        rows: &[RowLayout],
    ) -> f64 {
        self.draw_row(canvas, widths, y, header, true);
        let mut y = y + header.height;
        if rows.is_empty() {
            return y + self.draw_no_data(canvas, widths, y);
        }

        let mut rows_on_page = 0usize;
        for row in rows {
            let mut pending = row.clone();
            loop {
                if ctx.fits(y, pending.height) {
                    self.draw_row(canvas, widths, y, &pending, false);
                    y += pending.height;
                    rows_on_page += 1;
                    break;
                }
                if rows_on_page == 0 {
                    if let Some((head, tail)) = self.split_row(&pending, ctx.content_bottom() - y) {
                        self.draw_row(canvas, widths, y, &head, false);
                        pending = tail;
                    } else if ctx.at_page_top(y - header.height) {
                        // Not one line fits even on a fresh page.
                        self.draw_row(canvas, widths, y, &pending, false);
                        y += pending.height;
                        rows_on_page += 1;
                        break;
                    }
                }
                y = ctx.break_page(canvas);
                self.draw_row(canvas, widths, y, header, true);
                y += header.height;
                rows_on_page = 0;
            }
        }
        y
    }

    /// Cuts `row` after as many lines as fit in `room`. `None` when not even
    /// one line fits or there is nothing left to carry over.
    fn split_row(&self, row: &RowLayout, room: f64) -> Option<(RowLayout, RowLayout)> {
        let lines = row.cells.iter().map(|c| c.len()).max().unwrap_or(1);
        let fit = ((room - self.style.vertical_padding()) / self.style.line_height + 1e-6).floor();
        if fit < 1.0 || lines <= 1 {
            return None;
        }
        let take = (fit as usize).min(lines - 1);
        let head: Vec<Vec<String>> = row
            .cells
            .iter()
            .map(|c| c.iter().take(take).cloned().collect())
            .collect();
        let tail: Vec<Vec<String>> = row
            .cells
            .iter()
            .map(|c| c.iter().skip(take).cloned().collect())
            .collect();
        let tail_lines = tail.iter().map(|c| c.len()).max().unwrap_or(1);
        Some((
            RowLayout {
                cells: head,
                height: self.style.row_height(take).min(room),
            },
            RowLayout {
                cells: tail,
                height: self.style.row_height(tail_lines),
            },
        ))
    }

    /// Draws header and rows with no page-break checks.
    pub fn draw_unbroken(
        &self,
        canvas: &mut dyn Canvas,
        ctx: &LayoutContext,
        y: f64,
        records: &[T],
    ) -> f64 {
        let widths = self.fitted_widths(ctx.content_width());
        let header = self.layout_header(canvas, &widths);
        self.draw_row(canvas, &widths, y, &header, true);
        let mut y = y + header.height;
        if records.is_empty() {
            return y + self.draw_no_data(canvas, &widths, y);
        }
        for (i, record) in records.iter().enumerate() {
            let row = self.layout_row(canvas, &widths, i, record);
            self.draw_row(canvas, &widths, y, &row, false);
            y += row.height;
        }
        y
    }

    fn draw_row(&self, canvas: &mut dyn Canvas, widths: &[f64], y: f64, row: &RowLayout, header: bool) {
        canvas.set_font(if header {
            FontWeight::Bold
        } else {
            FontWeight::Normal
        });
        canvas.set_font_size(self.style.font_size);

        let mut x = self.x;
        for ((column, width), lines) in self.columns.iter().zip(widths).zip(&row.cells) {
            if header {
                canvas.set_fill_gray(self.style.header_fill);
                canvas.rect(x, y, *width, row.height, FillMode::FillStroke);
            } else {
                canvas.rect(x, y, *width, row.height, FillMode::Stroke);
            }

            let (anchor, align) = if header {
                (x + width / 2.0, Align::Center)
            } else {
                match column.align {
                    Align::Left => (x + self.style.padding_x, Align::Left),
                    Align::Center => (x + width / 2.0, Align::Center),
                    Align::Right => (x + width - self.style.padding_x, Align::Right),
                }
            };
            let block = lines.len() as f64 * self.style.line_height;
            let top = if header || self.style.valign == VAlign::Middle {
                y + (row.height - block) / 2.0
            } else {
                y + self.style.padding_top
            };
            for (i, line) in lines.iter().enumerate() {
                let baseline = top + self.style.line_height * (i as f64 + BASELINE);
                canvas.text_line(line, anchor, baseline, align);
            }
            x += width;
        }
    }

    fn draw_no_data(&self, canvas: &mut dyn Canvas, widths: &[f64], y: f64) -> f64 {
        let height = self.style.row_height(1);
        let width: f64 = widths.iter().sum();
        canvas.set_font(FontWeight::Italic);
        canvas.set_font_size(self.style.font_size);
        canvas.rect(self.x, y, width, height, FillMode::Stroke);
        let baseline = y + (height - self.style.line_height) / 2.0 + self.style.line_height * BASELINE;
        canvas.text_line(NO_DATA, self.x + width / 2.0, baseline, Align::Center);
        height
    }
}

/// A table section bound to its records, so sections over different record
/// types can be laid out together.
pub trait Section {
    fn measure(&self, canvas: &mut dyn Canvas, ctx: &LayoutContext) -> f64;
    fn lead_height(&self, canvas: &mut dyn Canvas, ctx: &LayoutContext) -> f64;
    fn draw_unbroken(&self, canvas: &mut dyn Canvas, ctx: &LayoutContext, y: f64) -> f64;
    fn draw_kept(&self, canvas: &mut dyn Canvas, ctx: &LayoutContext, y: f64) -> f64;
}

pub struct BoundSection<'a, T> {
    pub table: TableSection<'a, T>,
    pub records: &'a [T],
}

impl<'a, T> Section for BoundSection<'a, T> {
    fn measure(&self, canvas: &mut dyn Canvas, ctx: &LayoutContext) -> f64 {
        self.table.measure(canvas, ctx, self.records)
    }

    fn lead_height(&self, canvas: &mut dyn Canvas, ctx: &LayoutContext) -> f64 {
        self.table.lead_height(canvas, ctx, self.records)
    }

    fn draw_unbroken(&self, canvas: &mut dyn Canvas, ctx: &LayoutContext, y: f64) -> f64 {
        self.table.draw_unbroken(canvas, ctx, y, self.records)
    }

    fn draw_kept(&self, canvas: &mut dyn Canvas, ctx: &LayoutContext, y: f64) -> f64 {
        self.table.draw_kept(canvas, ctx, y, self.records)
    }
}

/// Draws two sections next to each other from the same `y`, under an
/// optional title spanning the content width.
///
/// The break decision uses the taller projected height and is taken before
/// either side is drawn, so a pair that fits on one page is never split.
/// A pair taller than a page keeps the taller lead with the title; each side
/// then paginates on its own from the same `y` and the cursor ends below
/// whichever finishes later.
pub fn draw_side_by_side(
    canvas: &mut dyn Canvas,
    ctx: &LayoutContext,
    y: f64,
    title: Option<&str>,
    left: &dyn Section,
    right: &dyn Section,
) -> f64 {
    let height = left.measure(canvas, ctx).max(right.measure(canvas, ctx));
    let title_h = title_height(title);
    let keep = if title_h + height <= ctx.content_bottom() - ctx.content_top() {
        height
    } else {
        left.lead_height(canvas, ctx).max(right.lead_height(canvas, ctx))
    };

    let mut y = y;
    if !ctx.fits(y, title_h + keep) && !ctx.at_page_top(y) {
        y = ctx.break_page(canvas);
    }
    if let Some(title) = title {
        draw_title(canvas, ctx.content_left(), ctx.content_width(), y, title);
        y += TITLE_HEIGHT;
    }
    if ctx.fits(y, height) {
        let left_end = left.draw_unbroken(canvas, ctx, y);
        let right_end = right.draw_unbroken(canvas, ctx, y);
        return left_end.max(right_end);
    }

    let start = canvas.current_page();
    let left_end = left.draw_kept(canvas, ctx, y);
    let left_page = canvas.current_page();
    canvas.set_page(start);
    let right_end = right.draw_kept(canvas, ctx, y);
    let right_page = canvas.current_page();
    match left_page.cmp(&right_page) {
        Ordering::Greater => {
            canvas.set_page(left_page);
            left_end
        }
        Ordering::Less => right_end,
        Ordering::Equal => left_end.max(right_end),
    }
}

fn title_height(title: Option<&str>) -> f64 {
    if title.is_some() {
        TITLE_HEIGHT
    } else {
        0.0
    }
}

/// Bold section caption on a light band.
fn draw_title(canvas: &mut dyn Canvas, x: f64, width: f64, y: f64, title: &str) {
    canvas.set_fill_gray(TITLE_FILL);
    canvas.rect(x, y + 0.8, width, TITLE_HEIGHT - 1.2, FillMode::Fill);
    canvas.set_font(FontWeight::Bold);
    canvas.set_font_size(10.0);
    canvas.text_line(title, x + 1.0, y + 5.0, Align::Left);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::canvas::Canvas;
    use crate::layout::page::{MarginSettings, PageGeometry};
    use crate::layout::recording::{DrawOp, RecordingCanvas};

    struct Grade {
        subject: String,
        score: f64,
        description: String,
    }

    fn grade(subject: &str, description: &str) -> Grade {
        Grade {
            subject: subject.to_string(),
            score: 80.0,
            description: description.to_string(),
        }
    }

    fn columns() -> Vec<ColumnSpec<Grade>> {
        vec![
            ColumnSpec::new(10.0, "No", |i, _| (i + 1).to_string()).align(Align::Center),
            ColumnSpec::new(60.0, "Mata Pelajaran", |_, g: &Grade| g.subject.clone()),
            ColumnSpec::new(20.0, "Nilai", |_, g: &Grade| format!("{:.0}", g.score))
                .align(Align::Center),
            ColumnSpec::new(90.0, "Capaian Kompetensi", |_, g: &Grade| g.description.clone()),
        ]
    }

    fn ctx() -> LayoutContext {
        LayoutContext::new(PageGeometry::A4, MarginSettings::default(), 11.0)
    }

    /// Y of every cell rectangle drawn at `x`, per page.
    fn row_tops(canvas: &RecordingCanvas, page: usize, x: f64) -> Vec<f64> {
        canvas
            .ops(page)
            .iter()
            .filter_map(|op| match op {
                DrawOp::Rect { x: rx, y, .. } if (*rx - x).abs() < 1e-9 => Some(*y),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn row_height_is_shared_and_driven_by_tallest_cell() {
        let mut canvas = RecordingCanvas::new(PageGeometry::A4);
        let cols = columns();
        let table = TableSection::new(&cols, TableStyle::GRADES, 15.0);
        let widths = table.fitted_widths(180.0);
        let long = "Menunjukkan penguasaan yang sangat baik dalam memahami konsep, \
                    menerapkan prosedur, dan menyelesaikan masalah kontekstual secara mandiri.";
        let row = table.layout_row(&mut canvas, &widths, 0, &grade("Matematika", long));
        let lines = row.cells.iter().map(|c| c.len()).max().expect("cells");
        assert!(lines >= 2);
        let expected = lines as f64 * TableStyle::GRADES.line_height
            + TableStyle::GRADES.vertical_padding();
        assert!(row.height >= expected - 1e-9);
        assert!((row.height - TableStyle::GRADES.row_height(lines)).abs() < 1e-9);

        let y = table.draw_unbroken(&mut canvas, &ctx(), 50.0, &[grade("Matematika", long)]);
        let heights: Vec<f64> = canvas
            .ops(1)
            .iter()
            .filter_map(|op| match op {
                DrawOp::Rect { y, h, .. } if *y > 50.0 => Some(*h),
                _ => None,
            })
            .collect();
        assert_eq!(heights.len(), 4);
        assert!(heights.iter().all(|h| (*h - row.height).abs() < 1e-9));
        assert!((y - (50.0 + TableStyle::GRADES.header_height + row.height)).abs() < 1e-9);
    }

    #[test]
    fn single_line_rows_use_minimum_height() {
        assert_eq!(TableStyle::GRADES.row_height(1), 10.0);
        assert_eq!(TableStyle::ATTENDANCE.row_height(1) * 3.0, 18.0);
        assert!(TableStyle::GRADES.row_height(5) > 10.0);
    }

    #[test]
    fn forty_rows_break_after_seventeen() {
        let mut canvas = RecordingCanvas::new(PageGeometry::A4);
        let cols = columns();
        let table = TableSection::new(&cols, TableStyle::GRADES, 15.0);
        let records: Vec<Grade> = (0..40).map(|i| grade(&format!("Mapel {}", i + 1), "Baik")).collect();
        let ctx = ctx();

        // Header at 90, first row body at 100.
        let end = table.draw(&mut canvas, &ctx, 90.0, None, &records);

        let page1 = row_tops(&canvas, 1, 15.0);
        assert_eq!(page1.len(), 1 + 17);
        assert_eq!(page1[1], 100.0);
        assert_eq!(*page1.last().expect("last"), 260.0);

        let page2 = row_tops(&canvas, 2, 15.0);
        // Reset cursor: margin top + reserved band, header redrawn there.
        assert_eq!(page2[0], ctx.margins.top + 11.0);
        // Row 18 sits under the repeated header.
        assert_eq!(page2[1], ctx.margins.top + 21.0);
        assert!(canvas.find_text("Mapel 18").map(|t| t.0) == Some(2));
        assert_eq!(canvas.page_count(), 2);
        assert_eq!(end, ctx.margins.top + 21.0 + 23.0 * 10.0);
    }

    #[test]
    fn header_is_not_orphaned_at_page_bottom() {
        let mut canvas = RecordingCanvas::new(PageGeometry::A4);
        let cols = columns();
        let table = TableSection::new(&cols, TableStyle::GRADES, 15.0);
        let ctx = ctx();
        table.draw(&mut canvas, &ctx, 265.0, None, &[grade("Fisika", "Baik")]);
        assert!(row_tops(&canvas, 1, 15.0).is_empty());
        assert_eq!(row_tops(&canvas, 2, 15.0), vec![26.0, 36.0]);
    }

    #[test]
    fn empty_section_draws_no_data_row() {
        let mut canvas = RecordingCanvas::new(PageGeometry::A4);
        let cols = columns();
        let table = TableSection::new(&cols, TableStyle::EXTRACURRICULAR, 15.0);
        let end = table.draw(&mut canvas, &ctx(), 40.0, None, &[]);
        assert!(canvas.find_text(NO_DATA).is_some());
        assert_eq!(end, 40.0 + 8.0 + 8.0);
    }

    /// Every op of every page stays above the bottom margin.
    fn assert_inside_content(canvas: &RecordingCanvas, ctx: &LayoutContext) {
        for page in 1..=canvas.page_count() {
            for op in canvas.ops(page) {
                let bottom = match op {
                    DrawOp::Rect { y, h, .. } => y + h,
                    DrawOp::Line { y1, y2, .. } => y1.max(*y2),
                    DrawOp::Text { y, .. } => *y,
                };
                assert!(
                    bottom <= ctx.content_bottom() + 1e-6,
                    "page {} op ends at {}",
                    page,
                    bottom
                );
            }
        }
    }

    #[test]
    fn row_taller_than_a_page_is_split_between_lines() {
        let mut canvas = RecordingCanvas::new(PageGeometry::A4);
        let cols = columns();
        let table = TableSection::new(&cols, TableStyle::GRADES, 15.0);
        let ctx = ctx();
        let huge = "kata ".repeat(2000);
        let end = table.draw(
            &mut canvas,
            &ctx,
            26.0,
            None,
            &[grade("Seni", &huge), grade("PJOK", "Baik")],
        );

        let pages = canvas.page_count();
        assert!(pages >= 3);
        assert_inside_content(&canvas, &ctx);
        for page in 1..=pages {
            let headers = canvas
                .texts()
                .into_iter()
                .filter(|(p, t, _, _)| *p == page && *t == "Capaian Kompetensi")
                .count();
            assert_eq!(headers, 1, "header on page {}", page);
        }
        for page in 1..pages {
            assert!(canvas
                .texts()
                .iter()
                .any(|(p, t, _, _)| *p == page && t.starts_with("kata")));
        }
        // The subject cell is printed once, on the first slice.
        assert_eq!(canvas.texts().iter().filter(|(_, t, _, _)| *t == "Seni").count(), 1);
        assert_eq!(canvas.find_text("PJOK").map(|t| t.0), Some(pages));
        assert_eq!(canvas.current_page(), pages);
        assert!(end <= ctx.content_bottom());
    }

    #[test]
    fn oversized_first_row_keeps_its_first_line_with_the_header() {
        let mut canvas = RecordingCanvas::new(PageGeometry::A4);
        let cols = columns();
        let table = TableSection::new(&cols, TableStyle::GRADES, 15.0);
        let ctx = ctx();
        let huge = "kata ".repeat(2000);
        // Header and one line fit below 240; the whole row never would.
        table.draw(&mut canvas, &ctx, 240.0, None, &[grade("Seni", &huge)]);
        assert_eq!(row_tops(&canvas, 1, 15.0)[0], 240.0);
        assert_eq!(canvas.find_text("Seni").map(|t| t.0), Some(1));
        assert_inside_content(&canvas, &ctx);
    }

    #[test]
    fn title_breaks_together_with_header_and_first_row() {
        let mut canvas = RecordingCanvas::new(PageGeometry::A4);
        let cols = columns();
        let table = TableSection::new(&cols, TableStyle::GRADES, 15.0);
        let ctx = ctx();
        // Title and header alone would fit at 255; the first row would not.
        let end = table.draw(&mut canvas, &ctx, 255.0, Some("A. Nilai Akademik"), &[grade("Fisika", "Baik")]);
        assert!(canvas.ops(1).is_empty());
        let (page, _, y) = canvas.find_text("A. Nilai Akademik").expect("title");
        assert_eq!(page, 2);
        assert_eq!(y, ctx.content_top() + 5.0);
        assert_eq!(row_tops(&canvas, 2, 15.0), vec![26.0 + 0.8, 33.0, 43.0]);
        assert_eq!(end, 53.0);
    }

    #[test]
    fn wide_columns_are_scaled_to_content_width() {
        let cols = columns();
        let table = TableSection::new(&cols, TableStyle::GRADES, 15.0);
        let widths = table.fitted_widths(90.0);
        assert!((widths.iter().sum::<f64>() - 90.0).abs() < 1e-9);
        assert_eq!(table.fitted_widths(500.0), vec![10.0, 60.0, 20.0, 90.0]);
    }

    struct Absence {
        label: &'static str,
        days: i64,
    }

    #[test]
    fn side_by_side_pair_breaks_together() {
        let mut canvas = RecordingCanvas::new(PageGeometry::A4);
        let ctx = ctx();
        let (absence_cols, remark_cols, absences, remarks) =
            attendance_and_remarks("Tingkatkan terus prestasimu. ".repeat(12));
        let left = BoundSection {
            table: TableSection::new(&absence_cols, TableStyle::ATTENDANCE, 15.0),
            records: &absences,
        };
        let right = BoundSection {
            table: TableSection::new(&remark_cols, TableStyle::REMARKS, 100.0),
            records: &remarks,
        };
        let left_h = left.measure(&mut canvas, &ctx);
        let right_h = right.measure(&mut canvas, &ctx);
        assert_eq!(left_h, 7.0 + 18.0);
        assert!(right_h > left_h);

        // The left table alone would fit at this y; the pair does not.
        let y = ctx.content_bottom() - left_h - 1.0;
        let end = draw_side_by_side(&mut canvas, &ctx, y, None, &left, &right);
        assert_eq!(canvas.page_count(), 2);
        assert!(canvas.ops(1).is_empty());
        assert_eq!(canvas.find_text("Sakit").map(|t| t.0), Some(2));
        assert!((end - (ctx.content_top() + right_h)).abs() < 1e-9);
    }

    type PairFixture = (
        Vec<ColumnSpec<Absence>>,
        Vec<ColumnSpec<String>>,
        [Absence; 3],
        Vec<String>,
    );

    fn attendance_and_remarks(remark: String) -> PairFixture {
        let absence_cols = vec![
            ColumnSpec::new(50.0, "Ketidakhadiran", |_, a: &Absence| a.label.to_string()),
            ColumnSpec::new(30.0, "Jumlah", |_, a: &Absence| format!("{} hari", a.days)),
        ];
        let remark_cols = vec![ColumnSpec::new(95.0, "Catatan Wali Kelas", |_, s: &String| {
            s.clone()
        })];
        let absences = [
            Absence { label: "Sakit", days: 1 },
            Absence { label: "Izin", days: 0 },
            Absence { label: "Tanpa Keterangan", days: 2 },
        ];
        (absence_cols, remark_cols, absences, vec![remark])
    }

    #[test]
    fn pair_taller_than_a_page_paginates_inside_the_margins() {
        let mut canvas = RecordingCanvas::new(PageGeometry::A4);
        let ctx = ctx();
        let (absence_cols, remark_cols, absences, remarks) =
            attendance_and_remarks("Tingkatkan terus prestasimu. ".repeat(200));
        let left = BoundSection {
            table: TableSection::new(&absence_cols, TableStyle::ATTENDANCE, 15.0),
            records: &absences,
        };
        let right = BoundSection {
            table: TableSection::new(&remark_cols, TableStyle::REMARKS, 100.0),
            records: &remarks,
        };
        assert!(right.measure(&mut canvas, &ctx) > ctx.content_bottom() - ctx.content_top());

        // Room for the title alone, not for the title with both leads.
        let y = ctx.content_bottom() - 20.0;
        let end = draw_side_by_side(&mut canvas, &ctx, y, Some("C. Ketidakhadiran dan Catatan"), &left, &right);

        assert!(canvas.ops(1).is_empty());
        let title_page = canvas.find_text("C. Ketidakhadiran dan Catatan").map(|t| t.0);
        assert_eq!(title_page, Some(2));
        assert_eq!(canvas.find_text("Sakit").map(|t| t.0), Some(2));
        assert_eq!(canvas.find_text("Catatan Wali Kelas").map(|t| t.0), Some(2));
        // Both sides start right under the title.
        let under_title = ctx.content_top() + TITLE_HEIGHT;
        assert!(row_tops(&canvas, 2, 15.0).contains(&under_title));
        assert_eq!(row_tops(&canvas, 2, 100.0)[0], under_title);

        let pages = canvas.page_count();
        assert!(pages >= 3);
        assert_inside_content(&canvas, &ctx);
        // The remarks run on; the cursor follows them to their last page.
        assert_eq!(canvas.current_page(), pages);
        assert!(end > ctx.content_top() && end <= ctx.content_bottom());
    }

    #[test]
    fn break_page_reuses_pages_drawn_by_a_neighbour() {
        let mut canvas = RecordingCanvas::new(PageGeometry::A4);
        let ctx = ctx();
        canvas.add_page();
        canvas.set_page(1);
        assert_eq!(ctx.break_page(&mut canvas), ctx.content_top());
        assert_eq!((canvas.current_page(), canvas.page_count()), (2, 2));
        ctx.break_page(&mut canvas);
        assert_eq!((canvas.current_page(), canvas.page_count()), (3, 3));
    }
}

//! PDF output over the standard Helvetica faces.
//!
//! Only what report cards need: text, strokes, gray fills. No font
//! embedding; text is WinAnsi encoded.

use anyhow::Context;
use pdf_writer::{Content, Name, Pdf, Rect, Ref, Str, TextStr};
use std::path::Path;

use super::canvas::{Align, Canvas, FillMode, Font, FontWeight};
use super::metrics::{self, PT_TO_MM};
use super::page::PageGeometry;

const MM_TO_PT: f64 = 1.0 / PT_TO_MM;
const LINE_WIDTH_MM: f64 = 0.2;

const FACES: [(&[u8], &[u8]); 3] = [
    (b"F1", b"Helvetica"),
    (b"F2", b"Helvetica-Bold"),
    (b"F3", b"Helvetica-Oblique"),
];

pub struct PdfCanvas {
    page_size: PageGeometry,
    pages: Vec<Content>,
    current: usize,
    font: Font,
    fill_gray: f64,
    title: Option<String>,
}

impl PdfCanvas {
    pub fn new(page_size: PageGeometry) -> Self {
        let mut canvas = Self {
            page_size,
            pages: Vec::new(),
            current: 0,
            font: Font::default(),
            fill_gray: 0.0,
            title: None,
        };
        canvas.add_page();
        canvas
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = Some(title.into());
    }

    fn x(&self, mm: f64) -> f32 {
        (mm * MM_TO_PT) as f32
    }

    fn y(&self, mm: f64) -> f32 {
        ((self.page_size.height - mm) * MM_TO_PT) as f32
    }

    fn out(&mut self) -> &mut Content {
        &mut self.pages[self.current]
    }

    /// Serializes the document. Object ids: catalog, page tree, the three
    /// faces, info, then one page/content pair per page.
    pub fn finish(self) -> Vec<u8> {
        let mut alloc = Ref::new(1);
        let catalog_id = alloc.bump();
        let tree_id = alloc.bump();
        let font_ids: Vec<Ref> = FACES.iter().map(|_| alloc.bump()).collect();
        let info_id = alloc.bump();
        let page_ids: Vec<(Ref, Ref)> = self
            .pages
            .iter()
            .map(|_| (alloc.bump(), alloc.bump()))
            .collect();

        let mut pdf = Pdf::new();
        pdf.catalog(catalog_id).pages(tree_id);
        pdf.pages(tree_id)
            .kids(page_ids.iter().map(|(page, _)| *page))
            .count(page_ids.len() as i32);
        for ((_, base), id) in FACES.iter().zip(&font_ids) {
            pdf.type1_font(*id)
                .base_font(Name(base))
                .encoding_predefined(Name(b"WinAnsiEncoding"));
        }
        {
            let mut info = pdf.document_info(info_id);
            info.producer(TextStr("rapord"));
            if let Some(title) = &self.title {
                info.title(TextStr(title));
            }
        }

        let media_box = Rect::new(
            0.0,
            0.0,
            (self.page_size.width * MM_TO_PT) as f32,
            (self.page_size.height * MM_TO_PT) as f32,
        );
        for (content, (page_id, content_id)) in self.pages.into_iter().zip(page_ids) {
            {
                let mut page = pdf.page(page_id);
                page.media_box(media_box).parent(tree_id).contents(content_id);
                let mut resources = page.resources();
                let mut fonts = resources.fonts();
                for ((key, _), id) in FACES.iter().zip(&font_ids) {
                    fonts.pair(Name(key), *id);
                }
            }
            pdf.stream(content_id, &content.finish());
        }
        pdf.finish()
    }

    pub fn save(self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
        }
        std::fs::write(path, self.finish())
            .with_context(|| format!("failed to write PDF {}", path.to_string_lossy()))
    }
}

impl Canvas for PdfCanvas {
    fn add_page(&mut self) {
        let mut content = Content::new();
        content
            .set_line_width((LINE_WIDTH_MM * MM_TO_PT) as f32)
            .set_stroke_gray(0.0)
            .set_fill_gray(0.0);
        self.pages.push(content);
        self.current = self.pages.len() - 1;
    }

    fn set_page(&mut self, page: usize) {
        if (1..=self.pages.len()).contains(&page) {
            self.current = page - 1;
        }
    }

    fn current_page(&self) -> usize {
        self.current + 1
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn font(&self) -> Font {
        self.font
    }

    fn set_font(&mut self, weight: FontWeight) {
        self.font.weight = weight;
    }

    fn set_font_size(&mut self, size: f64) {
        self.font.size = size;
    }

    fn set_fill_gray(&mut self, gray: f64) {
        self.fill_gray = gray.clamp(0.0, 1.0);
    }

    fn rect(&mut self, x: f64, y: f64, w: f64, h: f64, mode: FillMode) {
        let (px, py) = (self.x(x), self.y(y + h));
        let (pw, ph) = ((w * MM_TO_PT) as f32, (h * MM_TO_PT) as f32);
        let gray = self.fill_gray as f32;
        let out = self.out();
        match mode {
            FillMode::Stroke => {
                out.rect(px, py, pw, ph).stroke();
            }
            FillMode::Fill => {
                out.save_state()
                    .set_fill_gray(gray)
                    .rect(px, py, pw, ph)
                    .fill_nonzero()
                    .restore_state();
            }
            FillMode::FillStroke => {
                out.save_state()
                    .set_fill_gray(gray)
                    .rect(px, py, pw, ph)
                    .fill_nonzero_and_stroke()
                    .restore_state();
            }
        }
    }

    fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64) {
        let (ax, ay, bx, by) = (self.x(x1), self.y(y1), self.x(x2), self.y(y2));
        self.out().move_to(ax, ay).line_to(bx, by).stroke();
    }

    fn text_line(&mut self, content: &str, x: f64, y: f64, align: Align) {
        if content.is_empty() {
            return;
        }
        let width = metrics::text_width(content, self.font);
        let left = match align {
            Align::Left => x,
            Align::Center => x - width / 2.0,
            Align::Right => x - width,
        };
        let key: &[u8] = match self.font.weight {
            FontWeight::Normal => b"F1",
            FontWeight::Bold => b"F2",
            FontWeight::Italic => b"F3",
        };
        let (px, py) = (self.x(left), self.y(y));
        let size = self.font.size as f32;
        let bytes = metrics::encode_winansi(content);
        self.out()
            .begin_text()
            .set_font(Name(key), size)
            .next_line(px, py)
            .show(Str(&bytes))
            .end_text();
    }
}

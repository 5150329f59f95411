use serde::Serialize;

use super::canvas::{Align, Canvas, FillMode, Font, FontWeight};
use super::page::PageGeometry;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum DrawOp {
    Rect {
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        mode: FillMode,
        gray: f64,
    },
    Line {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
    },
    Text {
        text: String,
        x: f64,
        y: f64,
        align: Align,
        font: Font,
    },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RecordedPage {
    pub ops: Vec<DrawOp>,
}

/// Canvas that keeps a display list per page instead of rendering.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingCanvas {
    page_size: PageGeometry,
    pages: Vec<RecordedPage>,
    #[serde(skip)]
    current: usize,
    #[serde(skip)]
    font: Font,
    #[serde(skip)]
    fill_gray: f64,
}

impl RecordingCanvas {
    pub fn new(page_size: PageGeometry) -> Self {
        Self {
            page_size,
            pages: vec![RecordedPage::default()],
            current: 0,
            font: Font::default(),
            fill_gray: 0.0,
        }
    }

    /// Ops of page `page` (1-based).
    #[cfg(test)]
    pub fn ops(&self, page: usize) -> &[DrawOp] {
        self.pages
            .get(page.wrapping_sub(1))
            .map(|p| p.ops.as_slice())
            .unwrap_or(&[])
    }

    /// Every text op as `(page, text, x, y)`.
    #[cfg(test)]
    pub fn texts(&self) -> Vec<(usize, &str, f64, f64)> {
        let mut out = Vec::new();
        for (i, page) in self.pages.iter().enumerate() {
            for op in &page.ops {
                if let DrawOp::Text { text, x, y, .. } = op {
                    out.push((i + 1, text.as_str(), *x, *y));
                }
            }
        }
        out
    }

    /// First text op equal to `needle`.
    #[cfg(test)]
    pub fn find_text(&self, needle: &str) -> Option<(usize, f64, f64)> {
        self.texts()
            .into_iter()
            .find(|(_, t, _, _)| *t == needle)
            .map(|(p, _, x, y)| (p, x, y))
    }

    fn push(&mut self, op: DrawOp) {
        if let Some(page) = self.pages.get_mut(self.current) {
            page.ops.push(op);
        }
    }
}

impl Canvas for RecordingCanvas {
    fn add_page(&mut self) {
        self.pages.push(RecordedPage::default());
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
        let gray = self.fill_gray;
        self.push(DrawOp::Rect {
            x,
            y,
            w,
            h,
            mode,
            gray,
        });
    }

    fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64) {
        self.push(DrawOp::Line { x1, y1, x2, y2 });
    }

    fn text_line(&mut self, content: &str, x: f64, y: f64, align: Align) {
        let font = self.font;
        self.push(DrawOp::Text {
            text: content.to_string(),
            x,
            y,
            align,
            font,
        });
    }
}

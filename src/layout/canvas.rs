use serde::{Deserialize, Serialize};

use super::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FontWeight {
    Normal,
    Bold,
    Italic,
}

/// Helvetica at `size` points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Font {
    pub weight: FontWeight,
    pub size: f64,
}

impl Default for Font {
    fn default() -> Self {
        Self {
            weight: FontWeight::Normal,
            size: 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FillMode {
    Stroke,
    Fill,
    FillStroke,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TextOptions {
    pub align: Align,
    pub max_width: Option<f64>,
}

/// Stateful page surface. Coordinates are millimetres from the top-left
/// corner of the current page; text `y` is the baseline. Pages are numbered
/// from 1 and a fresh canvas already has page 1.
pub trait Canvas {
    /// Appends a page and makes it current.
    fn add_page(&mut self);
    fn set_page(&mut self, page: usize);
    fn current_page(&self) -> usize;
    fn page_count(&self) -> usize;

    fn font(&self) -> Font;
    fn set_font(&mut self, weight: FontWeight);
    fn set_font_size(&mut self, size: f64);

    /// Gray level (0 black, 1 white) used by filled rectangles.
    fn set_fill_gray(&mut self, gray: f64);

    fn rect(&mut self, x: f64, y: f64, w: f64, h: f64, mode: FillMode);
    fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64);

    /// Places one line of text; `x` is the anchor selected by `align`.
    fn text_line(&mut self, content: &str, x: f64, y: f64, align: Align);

    fn text_width(&self, text: &str) -> f64 {
        metrics::text_width(text, self.font())
    }

    fn line_height(&self) -> f64 {
        metrics::line_height(self.font())
    }

    fn split_text_to_size(&self, text: &str, max_width: f64) -> Vec<String> {
        metrics::wrap_text(text, max_width, |s| self.text_width(s))
    }

    /// Places text, wrapping it to `max_width` when given. Returns the number
    /// of lines drawn.
    fn text(&mut self, content: &str, x: f64, y: f64, opts: TextOptions) -> usize {
        let lines = match opts.max_width {
            Some(w) => self.split_text_to_size(content, w),
            None => content.split('\n').map(|s| s.to_string()).collect(),
        };
        let step = self.line_height();
        for (i, line) in lines.iter().enumerate() {
            self.text_line(line, x, y + step * i as f64, opts.align);
        }
        lines.len()
    }
}

use serde::{Deserialize, Serialize};

use super::canvas::Canvas;

const EPSILON: f64 = 1e-6;

/// Least bottom margin that still holds the page footer below the content.
pub const MIN_BOTTOM_MARGIN: f64 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageGeometry {
    pub width: f64,
    pub height: f64,
}

impl PageGeometry {
    pub const A4: PageGeometry = PageGeometry {
        width: 210.0,
        height: 297.0,
    };
    /// Folio, common for Indonesian report cards.
    pub const F4: PageGeometry = PageGeometry {
        width: 215.0,
        height: 330.0,
    };

    pub fn named(name: &str) -> Option<PageGeometry> {
        match name.to_ascii_uppercase().as_str() {
            "A4" => Some(Self::A4),
            "F4" | "FOLIO" => Some(Self::F4),
            _ => None,
        }
    }
}

/// Page margins in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginSettings {
    pub top: f64,
    pub bottom: f64,
    pub left: f64,
    pub right: f64,
}

impl Default for MarginSettings {
    fn default() -> Self {
        Self {
            top: 15.0,
            bottom: 20.0,
            left: 15.0,
            right: 15.0,
        }
    }
}

impl MarginSettings {
    pub fn is_usable_on(&self, page: PageGeometry) -> bool {
        [self.top, self.bottom, self.left, self.right]
            .iter()
            .all(|m| m.is_finite() && *m >= 0.0)
            && self.bottom >= MIN_BOTTOM_MARGIN
            && self.left + self.right < page.width
            && self.top + self.bottom < page.height
    }
}

/// Fixed geometry of one document: page size, margins and the band at the
/// top of continuation pages kept free for the running header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutContext {
    pub page: PageGeometry,
    pub margins: MarginSettings,
    pub reserved_header: f64,
}

impl LayoutContext {
    pub fn new(page: PageGeometry, margins: MarginSettings, reserved_header: f64) -> Self {
        Self {
            page,
            margins,
            reserved_header,
        }
    }

    /// Where content resumes after a page break.
    pub fn content_top(&self) -> f64 {
        self.margins.top + self.reserved_header
    }

    pub fn content_bottom(&self) -> f64 {
        self.page.height - self.margins.bottom
    }

    /// Footer baseline, centred in the bottom margin.
    pub fn footer_baseline(&self) -> f64 {
        self.page.height - self.margins.bottom / 2.0
    }

    pub fn content_left(&self) -> f64 {
        self.margins.left
    }

    pub fn content_width(&self) -> f64 {
        self.page.width - self.margins.left - self.margins.right
    }

    pub fn fits(&self, y: f64, height: f64) -> bool {
        y + height <= self.content_bottom() + EPSILON
    }

    /// True when `y` is already at the top of a continuation page, where
    /// breaking again would not gain any room.
    pub fn at_page_top(&self, y: f64) -> bool {
        y <= self.content_top() + EPSILON
    }

    /// Moves to the next page, appending one when the current page is the
    /// last, and returns the reset cursor.
    pub fn break_page(&self, canvas: &mut dyn Canvas) -> f64 {
        let next = canvas.current_page() + 1;
        if next <= canvas.page_count() {
            canvas.set_page(next);
        } else {
            canvas.add_page();
        }
        self.content_top()
    }
}

//! Page layout for printed reports.
//!
//! Drawing goes through the [`Canvas`] trait: [`PdfCanvas`] writes a real
//! document, [`RecordingCanvas`] keeps a display list for previews and tests.
//! [`table`] holds the paginating table engine.

pub mod canvas;
pub mod metrics;
pub mod page;
pub mod pdf;
pub mod recording;
pub mod table;

pub use canvas::{Align, Canvas, FontWeight, TextOptions};
pub use page::{LayoutContext, MarginSettings, PageGeometry};
pub use pdf::PdfCanvas;
pub use recording::RecordingCanvas;
pub use table::{draw_side_by_side, BoundSection, ColumnSpec, TableSection, TableStyle};

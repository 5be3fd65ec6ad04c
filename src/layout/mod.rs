//! Paginated layout of markdown reports

pub mod engine;
pub mod markup;
pub mod metrics;
pub mod wrap;


pub use engine::{
    DocumentLayoutEngine, DocumentSource, Fragment, LineKind, Page, PageGeometry, PlacedLine,
    Typography,
};
pub use markup::{to_plain_text, StyledRun, BULLET};
pub use metrics::{FontMetrics, MonospaceMetrics, StandardFontMetrics};

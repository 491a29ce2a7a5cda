//! Weekly-bin storage and the browsing/rerun surface over it.

pub mod browse;
pub mod failures;
pub mod pdf_store;
pub mod rerun;
pub mod week;

pub use browse::{FileEntry, Library, WeekSummary};
pub use failures::{FailureLog, FailureRecord};
pub use pdf_store::{embed_metadata, extract_subject, extract_subject_mem, PdfStore, SaveOptions};
pub use rerun::{RerunApi, RerunSelection, RerunSummary};
pub use week::{bin_path, parse_week_id, week_id, week_of};

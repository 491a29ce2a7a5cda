//! shelfmark-core: asynchronous job substrate and pipelines that turn
//! bookmarked URLs into persistent artifacts (rendered PDFs, media files,
//! podcast transcript PDFs) organized into ISO-week bins.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;

pub use config::Config;

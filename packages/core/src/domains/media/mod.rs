//! Media collection: streaming downloads of feed enclosures into weekly
//! bins.

mod worker;

pub use worker::{destination_filename, extension_for, MediaHandler};

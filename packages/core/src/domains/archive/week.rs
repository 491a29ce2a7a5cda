//! ISO-8601 weekly bin layout.
//!
//! `binPath(date, mediaType) = DATA_DIR/media/{year}-W{ww}/{mediaType}s/`.
//! The mapping is a pure function of `(week_of(date), media_type)`, so
//! reruns and concurrent workers always resolve the same directory.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Utc};

use crate::domains::ingest::MediaType;

/// ISO year and week of a timestamp (Monday-first; week 1 contains Jan 4).
pub fn week_of(date: DateTime<Utc>) -> (i32, u32) {
    let iso = date.iso_week();
    (iso.year(), iso.week())
}

/// `{year}-W{ww}` identifier, e.g. `2024-W05`.
pub fn week_id(year: i32, week: u32) -> String {
    format!("{year}-W{week:02}")
}

/// Parse a `{year}-W{ww}` identifier.
pub fn parse_week_id(id: &str) -> Option<(i32, u32)> {
    let (year, week) = id.split_once("-W")?;
    let year: i32 = year.parse().ok()?;
    let week: u32 = week.parse().ok()?;
    if !(1..=53).contains(&week) {
        return None;
    }
    Some((year, week))
}

/// Directory for artifacts of `media_type` bookmarked at `date`.
pub fn bin_path(data_dir: &Path, date: DateTime<Utc>, media_type: MediaType) -> PathBuf {
    let (year, week) = week_of(date);
    data_dir
        .join("media")
        .join(week_id(year, week))
        .join(media_type.plural())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn iso_week_reference_dates() {
        // Wednesday 2020-01-01 is in W1 of 2020.
        assert_eq!(week_of(date(2020, 1, 1)), (2020, 1));
        // Friday 2021-01-01 belongs to 2020-W53.
        assert_eq!(week_of(date(2021, 1, 1)), (2020, 53));
        // Monday 2024-12-30 starts 2025-W1.
        assert_eq!(week_of(date(2024, 12, 30)), (2025, 1));
    }

    #[test]
    fn bin_path_is_pure_and_zero_padded() {
        let d = date(2024, 2, 5);
        let p1 = bin_path(Path::new("/data"), d, MediaType::Pdf);
        let p2 = bin_path(Path::new("/data"), d, MediaType::Pdf);
        assert_eq!(p1, p2);
        assert_eq!(p1, PathBuf::from("/data/media/2024-W06/pdfs"));
        assert_eq!(
            bin_path(Path::new("/data"), d, MediaType::Podcast),
            PathBuf::from("/data/media/2024-W06/podcasts")
        );
    }

    #[test]
    fn week_id_roundtrip() {
        assert_eq!(week_id(2024, 6), "2024-W06");
        assert_eq!(parse_week_id("2024-W06"), Some((2024, 6)));
        assert_eq!(parse_week_id("2020-W53"), Some((2020, 53)));
        assert_eq!(parse_week_id("junk"), None);
        assert_eq!(parse_week_id("2024-W99"), None);
    }
}

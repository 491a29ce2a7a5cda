//! Recurrence specs for queue schedulers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A stored recurrence: every `every_ms`, produce a job from `template`.
///
/// Ticks are aligned to `start_at` (the epoch when absent), so restarting
/// the process does not drift the schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSpec {
    pub every_ms: i64,
    #[serde(default)]
    pub start_at: Option<DateTime<Utc>>,
    /// Job name the produced jobs carry.
    pub job_name: String,
    /// Payload template for produced jobs.
    pub template: Value,
}

impl SchedulerSpec {
    /// First tick strictly after `now`.
    pub fn next_tick(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let origin = self.start_at.map(|d| d.timestamp_millis()).unwrap_or(0);
        let now_ms = now.timestamp_millis();
        let every = self.every_ms.max(1);

        let next_ms = if now_ms < origin {
            origin
        } else {
            let elapsed = now_ms - origin;
            origin + (elapsed / every + 1) * every
        };
        DateTime::from_timestamp_millis(next_ms).unwrap_or(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn spec(every_ms: i64, start_at: Option<DateTime<Utc>>) -> SchedulerSpec {
        SchedulerSpec {
            every_ms,
            start_at,
            job_name: "tick".into(),
            template: serde_json::json!({}),
        }
    }

    #[test]
    fn epoch_aligned_ticks() {
        // 15 minutes, epoch aligned: 12:07 -> 12:15
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 7, 0).unwrap();
        let next = spec(15 * 60 * 1000, None).next_tick(now);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 1, 12, 15, 0).unwrap());
    }

    #[test]
    fn tick_on_boundary_moves_to_next() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 15, 0).unwrap();
        let next = spec(15 * 60 * 1000, None).next_tick(now);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap());
    }

    #[test]
    fn offset_start_shifts_the_grid() {
        // Every 5 minutes, offset by 2.5 minutes from the epoch grid.
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 2, 30).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 6, 0).unwrap();
        let next = spec(5 * 60 * 1000, Some(start)).next_tick(now);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 1, 12, 7, 30).unwrap());
    }

    #[test]
    fn future_start_is_first_tick() {
        let start = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(spec(60_000, Some(start)).next_tick(now), start);
    }
}

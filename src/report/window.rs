use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Reporting span selected by the dashboard. Each window subdivides into a
/// fixed number of display buckets: weekday for a week, calendar day for a
/// month, ISO week for a quarter, calendar month for a year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportWindow {
    Last7Days,
    Last30Days,
    Last90Days,
    Last365Days,
}

impl ReportWindow {
    pub fn span_days(self) -> i64 {
        match self {
            ReportWindow::Last7Days => 7,
            ReportWindow::Last30Days => 30,
            ReportWindow::Last90Days => 90,
            ReportWindow::Last365Days => 365,
        }
    }

    pub fn span(self) -> Duration {
        Duration::days(self.span_days())
    }

    pub fn bucket_count(self) -> usize {
        match self {
            ReportWindow::Last7Days => 7,
            ReportWindow::Last30Days => 30,
            ReportWindow::Last90Days => 13,
            ReportWindow::Last365Days => 12,
        }
    }

    /// Maps a current-period timestamp to exactly one bucket. Weekday buckets
    /// are categorical, so visits from different calendar weeks sharing a
    /// weekday land in the same bucket. The remaining granularities anchor on
    /// `now` and count backwards; calendar arithmetic at the oldest window edge
    /// can land one step out of range and is clamped into the nearest bucket
    /// instead of dropping the record.
    pub fn bucket_index(self, timestamp: DateTime<Utc>, now: DateTime<Utc>) -> usize {
        let count = self.bucket_count() as i64;
        let days_ago = (now.date_naive() - timestamp.date_naive()).num_days();
        let index = match self {
            ReportWindow::Last7Days => timestamp.weekday().num_days_from_monday() as i64,
            ReportWindow::Last30Days => count - 1 - days_ago,
            ReportWindow::Last90Days => count - 1 - days_ago / 7,
            ReportWindow::Last365Days => {
                let months_ago =
                    month_ordinal(now.date_naive()) - month_ordinal(timestamp.date_naive());
                count - 1 - months_ago
            }
        };
        index.clamp(0, count - 1) as usize
    }

    /// Bucket labels in the same order `bucket_index` assigns: ascending
    /// chronological, or Mon..Sun for the categorical weekday window.
    pub fn bucket_labels(self, now: DateTime<Utc>) -> Vec<String> {
        let today = now.date_naive();
        match self {
            ReportWindow::Last7Days => ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"]
                .iter()
                .map(|day| day.to_string())
                .collect(),
            ReportWindow::Last30Days => (0..30)
                .rev()
                .map(|days_ago| {
                    (today - Duration::days(days_ago))
                        .format("%Y-%m-%d")
                        .to_string()
                })
                .collect(),
            ReportWindow::Last90Days => (0..13)
                .rev()
                .map(|weeks_ago| {
                    let week = (today - Duration::weeks(weeks_ago)).iso_week();
                    format!("{}-W{:02}", week.year(), week.week())
                })
                .collect(),
            ReportWindow::Last365Days => (0..12)
                .rev()
                .map(|months_ago| {
                    let ordinal = month_ordinal(today) - months_ago;
                    format!("{}-{:02}", ordinal.div_euclid(12), ordinal.rem_euclid(12) + 1)
                })
                .collect(),
        }
    }
}

fn month_ordinal(date: NaiveDate) -> i64 {
    date.year() as i64 * 12 + date.month0() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn labels_match_bucket_count() {
        let now = at(2026, 8, 6);
        for window in [
            ReportWindow::Last7Days,
            ReportWindow::Last30Days,
            ReportWindow::Last90Days,
            ReportWindow::Last365Days,
        ] {
            assert_eq!(window.bucket_labels(now).len(), window.bucket_count());
        }
    }

    #[test]
    fn weekday_buckets_are_categorical() {
        let now = at(2026, 8, 6);
        // 2026-08-06 is a Thursday; both Thursdays map to the same bucket.
        let this_thursday = at(2026, 8, 6);
        let last_thursday = at(2026, 7, 30);
        let idx = ReportWindow::Last7Days.bucket_index(this_thursday, now);
        assert_eq!(idx, 3);
        assert_eq!(ReportWindow::Last7Days.bucket_index(last_thursday, now), idx);
        assert_eq!(ReportWindow::Last7Days.bucket_index(at(2026, 8, 3), now), 0);
        assert_eq!(ReportWindow::Last7Days.bucket_index(at(2026, 8, 2), now), 6);
    }

    #[test]
    fn daily_buckets_run_oldest_to_newest() {
        let now = at(2026, 8, 6);
        assert_eq!(ReportWindow::Last30Days.bucket_index(now, now), 29);
        assert_eq!(
            ReportWindow::Last30Days.bucket_index(at(2026, 7, 8), now),
            0
        );
        let labels = ReportWindow::Last30Days.bucket_labels(now);
        assert_eq!(labels.first().unwrap(), "2026-07-08");
        assert_eq!(labels.last().unwrap(), "2026-08-06");
    }

    #[test]
    fn out_of_range_days_clamp_into_edge_bucket() {
        let now = at(2026, 8, 6);
        // A record exactly 30 calendar days back computes to index -1.
        assert_eq!(
            ReportWindow::Last30Days.bucket_index(at(2026, 7, 7), now),
            0
        );
    }

    #[test]
    fn weekly_buckets_group_seven_days() {
        let now = at(2026, 8, 6);
        assert_eq!(ReportWindow::Last90Days.bucket_index(now, now), 12);
        assert_eq!(
            ReportWindow::Last90Days.bucket_index(at(2026, 7, 31), now),
            12
        );
        assert_eq!(
            ReportWindow::Last90Days.bucket_index(at(2026, 7, 30), now),
            11
        );
        assert_eq!(
            ReportWindow::Last90Days.bucket_index(at(2026, 5, 8), now),
            0
        );
    }

    #[test]
    fn monthly_buckets_follow_calendar_months() {
        let now = at(2026, 8, 6);
        assert_eq!(ReportWindow::Last365Days.bucket_index(now, now), 11);
        assert_eq!(
            ReportWindow::Last365Days.bucket_index(at(2026, 7, 20), now),
            10
        );
        assert_eq!(
            ReportWindow::Last365Days.bucket_index(at(2025, 9, 15), now),
            0
        );
        // The partial oldest month clamps rather than dropping records.
        assert_eq!(
            ReportWindow::Last365Days.bucket_index(at(2025, 8, 20), now),
            0
        );
        let labels = ReportWindow::Last365Days.bucket_labels(now);
        assert_eq!(labels.first().unwrap(), "2025-09");
        assert_eq!(labels.last().unwrap(), "2026-08");
    }

    #[test]
    fn month_labels_cross_year_boundary() {
        let labels = ReportWindow::Last365Days.bucket_labels(at(2026, 1, 15));
        assert_eq!(labels.first().unwrap(), "2025-02");
        assert_eq!(labels.last().unwrap(), "2026-01");
    }
}

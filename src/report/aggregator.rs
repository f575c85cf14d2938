use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use super::{
    round2, AggregateReport, BreakdownRow, BucketStats, CountMetric, RateMetric, ReportWindow,
    VisitRecord,
};

const TOP_PATHS_LIMIT: usize = 10;

/// Turns the visits and conversion events of a doubled reporting range into one
/// dashboard report. The caller scopes `records` and `conversions` to
/// `[now - 2 * span, now]`; anything outside that range is ignored. Pure and
/// stateless, so concurrent report requests need no coordination.
pub fn aggregate(
    records: &[VisitRecord],
    conversions: &[DateTime<Utc>],
    window: ReportWindow,
    now: DateTime<Utc>,
) -> AggregateReport {
    let span = window.span();
    let current_start = now - span;
    let previous_start = current_start - span;

    let current: Vec<&VisitRecord> = records
        .iter()
        .filter(|r| r.timestamp >= current_start && r.timestamp <= now)
        .collect();
    let previous: Vec<&VisitRecord> = records
        .iter()
        .filter(|r| r.timestamp >= previous_start && r.timestamp < current_start)
        .collect();

    let current_visitors = unique_visitors(&current);
    let previous_visitors = unique_visitors(&previous);

    let current_conversions = conversions
        .iter()
        .filter(|t| **t >= current_start && **t <= now)
        .count();
    let previous_conversions = conversions
        .iter()
        .filter(|t| **t >= previous_start && **t < current_start)
        .count();

    AggregateReport {
        window,
        buckets: bucket_stats(&current, window, now),
        unique_visitors: CountMetric::new(current_visitors, previous_visitors),
        page_views: CountMetric::new(page_views(&current), page_views(&previous)),
        bounce_rate: RateMetric::new(bounce_rate(&current), bounce_rate(&previous)),
        engagement_rate: RateMetric::new(engagement_rate(&current), engagement_rate(&previous)),
        conversion_rate: RateMetric::new(
            conversion_rate(current_conversions, current_visitors),
            conversion_rate(previous_conversions, previous_visitors),
        ),
        device_breakdown: grouped(&current, |r| r.device_class.as_str()),
        top_paths: top_paths(&current),
    }
}

fn unique_visitors(records: &[&VisitRecord]) -> u64 {
    records
        .iter()
        .map(|r| r.client_id.as_str())
        .collect::<HashSet<_>>()
        .len() as u64
}

fn page_views(records: &[&VisitRecord]) -> u64 {
    records.iter().map(|r| u64::from(r.page_view_count)).sum()
}

/// Share of visits with a single page view and under 30 seconds on site.
fn bounce_rate(records: &[&VisitRecord]) -> f64 {
    share(records, |r| {
        r.page_view_count <= 1 && r.time_on_site_seconds < 30
    })
}

/// Share of visits with over a minute on site or more than two page views.
fn engagement_rate(records: &[&VisitRecord]) -> f64 {
    share(records, |r| {
        r.time_on_site_seconds > 60 || r.page_view_count > 2
    })
}

fn share(records: &[&VisitRecord], predicate: impl Fn(&VisitRecord) -> bool) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    let matching = records.iter().filter(|r| predicate(r)).count();
    round2(matching as f64 / records.len() as f64 * 100.0)
}

fn conversion_rate(conversions: usize, visitors: u64) -> f64 {
    if visitors == 0 {
        return 0.0;
    }
    round2(conversions as f64 / visitors as f64 * 100.0)
}

fn bucket_stats(
    current: &[&VisitRecord],
    window: ReportWindow,
    now: DateTime<Utc>,
) -> Vec<BucketStats> {
    let count = window.bucket_count();
    let mut visitors: Vec<HashSet<&str>> = vec![HashSet::new(); count];
    let mut views = vec![0u64; count];

    for record in current.iter().copied() {
        let index = window.bucket_index(record.timestamp, now);
        visitors[index].insert(record.client_id.as_str());
        views[index] += u64::from(record.page_view_count);
    }

    window
        .bucket_labels(now)
        .into_iter()
        .zip(visitors.iter().zip(&views))
        .map(|(label, (bucket_visitors, &page_views))| BucketStats {
            label,
            unique_visitors: bucket_visitors.len() as u64,
            page_views,
        })
        .collect()
}

fn grouped<'a>(
    records: &[&'a VisitRecord],
    key: impl Fn(&'a VisitRecord) -> &'a str,
) -> Vec<BreakdownRow> {
    let mut groups: HashMap<&str, (HashSet<&str>, u64)> = HashMap::new();
    for record in records.iter().copied() {
        let entry = groups.entry(key(record)).or_default();
        entry.0.insert(record.client_id.as_str());
        entry.1 += u64::from(record.page_view_count);
    }

    let mut rows: Vec<BreakdownRow> = groups
        .into_iter()
        .map(|(label, (group_visitors, page_views))| BreakdownRow {
            label: label.to_string(),
            unique_visitors: group_visitors.len() as u64,
            page_views,
        })
        .collect();
    rows.sort_by(|a, b| {
        b.unique_visitors
            .cmp(&a.unique_visitors)
            .then(b.page_views.cmp(&a.page_views))
            .then(a.label.cmp(&b.label))
    });
    rows
}

fn top_paths(current: &[&VisitRecord]) -> Vec<BreakdownRow> {
    let mut rows = grouped(current, |r| r.path.as_str());
    rows.truncate(TOP_PATHS_LIMIT);
    rows
}

#[cfg(test)]
mod tests {
    use super::super::{percent_change, DeviceClass};
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 6, 12, 0, 0).unwrap()
    }

    fn visit(client_id: &str, days_ago: i64, views: u32, seconds: u32) -> VisitRecord {
        VisitRecord {
            client_id: client_id.to_string(),
            timestamp: now() - Duration::days(days_ago),
            page_view_count: views,
            time_on_site_seconds: seconds,
            device_class: DeviceClass::Desktop,
            browser_family: "Firefox".to_string(),
            path: "/".to_string(),
        }
    }

    #[test]
    fn counts_and_rates_for_mixed_visits() {
        let records = vec![
            visit("A", 1, 1, 45),
            visit("A", 2, 3, 200),
            visit("B", 3, 1, 5),
        ];
        let report = aggregate(&records, &[], ReportWindow::Last7Days, now());

        assert_eq!(report.unique_visitors.current, 2);
        assert_eq!(report.page_views.current, 5);
        // Only the third visit bounces; only the second is engaged.
        assert_eq!(report.bounce_rate.current, 33.33);
        assert_eq!(report.engagement_rate.current, 33.33);
    }

    #[test]
    fn bounce_counts_every_qualifying_record() {
        let records = vec![
            visit("A", 1, 1, 10),
            visit("A", 2, 3, 200),
            visit("B", 3, 1, 5),
        ];
        let report = aggregate(&records, &[], ReportWindow::Last7Days, now());
        // Both single-view short visits bounce, including A's first one.
        assert_eq!(report.bounce_rate.current, 66.67);
    }

    #[test]
    fn unique_visitors_never_exceed_record_count() {
        let records = vec![
            visit("A", 1, 1, 0),
            visit("A", 2, 1, 0),
            visit("A", 3, 1, 0),
            visit("B", 10, 2, 0),
            visit("B", 12, 2, 0),
        ];
        let report = aggregate(&records, &[], ReportWindow::Last7Days, now());
        assert_eq!(report.unique_visitors.current, 1);
        assert_eq!(report.unique_visitors.previous, 1);
    }

    #[test]
    fn bucket_totals_sum_to_current_period_totals() {
        let mut records = Vec::new();
        for day in 0..28 {
            records.push(visit(&format!("c{}", day % 5), day, 2, 45));
        }
        // Previous-period noise that must stay out of the buckets.
        records.push(visit("old", 40, 7, 500));

        for window in [ReportWindow::Last7Days, ReportWindow::Last30Days] {
            let report = aggregate(&records, &[], window, now());
            let expected = match window {
                ReportWindow::Last7Days => 8 * 2,
                _ => 28 * 2,
            };
            let bucketed: u64 = report.buckets.iter().map(|b| b.page_views).sum();
            assert_eq!(report.page_views.current, expected);
            assert_eq!(bucketed, report.page_views.current);
        }
    }

    #[test]
    fn percent_change_is_always_finite() {
        assert_eq!(percent_change(0.0, 0.0), 0.0);
        assert_eq!(percent_change(0.0, 7.0), -100.0);
        assert_eq!(percent_change(7.0, 0.0), 0.0);
        assert_eq!(percent_change(100.0, 50.0), 100.0);
        assert_eq!(percent_change(50.0, 100.0), -50.0);
    }

    #[test]
    fn zero_previous_period_reports_zero_change() {
        let records = vec![
            visit("A", 1, 1, 10),
            visit("B", 2, 1, 10),
            visit("C", 3, 1, 10),
        ];
        let report = aggregate(&records, &[], ReportWindow::Last7Days, now());
        assert_eq!(report.unique_visitors.current, 3);
        assert_eq!(report.unique_visitors.previous, 0);
        assert_eq!(report.unique_visitors.change_pct, 0.0);
    }

    #[test]
    fn empty_input_degrades_to_zeros() {
        let report = aggregate(&[], &[], ReportWindow::Last30Days, now());
        assert_eq!(report.unique_visitors.current, 0);
        assert_eq!(report.page_views.current, 0);
        assert_eq!(report.bounce_rate.current, 0.0);
        assert_eq!(report.engagement_rate.current, 0.0);
        assert_eq!(report.conversion_rate.current, 0.0);
        assert_eq!(report.buckets.len(), 30);
        assert!(report.buckets.iter().all(|b| b.page_views == 0));
    }

    #[test]
    fn rates_stay_within_bounds() {
        let records = vec![
            visit("A", 1, 1, 5),
            visit("B", 2, 1, 5),
            visit("C", 3, 1, 5),
        ];
        let report = aggregate(&records, &[], ReportWindow::Last7Days, now());
        assert_eq!(report.bounce_rate.current, 100.0);
        assert_eq!(report.engagement_rate.current, 0.0);
    }

    #[test]
    fn periods_split_at_window_boundary() {
        let boundary = now() - Duration::days(7);
        let mut current_edge = visit("A", 0, 1, 0);
        current_edge.timestamp = boundary;
        let mut previous_edge = visit("B", 0, 1, 0);
        previous_edge.timestamp = boundary - Duration::seconds(1);
        let mut stale = visit("C", 0, 1, 0);
        stale.timestamp = now() - Duration::days(15);

        let report = aggregate(
            &[current_edge, previous_edge, stale],
            &[],
            ReportWindow::Last7Days,
            now(),
        );
        assert_eq!(report.unique_visitors.current, 1);
        assert_eq!(report.unique_visitors.previous, 1);
        assert_eq!(report.page_views.current + report.page_views.previous, 2);
    }

    #[test]
    fn conversion_rate_joins_by_time_range() {
        let records = vec![
            visit("A", 1, 2, 90),
            visit("B", 2, 1, 10),
            visit("C", 9, 1, 10),
        ];
        let conversions = vec![
            now() - Duration::days(1),
            now() - Duration::days(8),
            now() - Duration::days(8),
        ];
        let report = aggregate(&records, &conversions, ReportWindow::Last7Days, now());
        assert_eq!(report.conversion_rate.current, 50.0);
        assert_eq!(report.conversion_rate.previous, 200.0);
    }

    #[test]
    fn conversion_rate_with_no_visitors_is_zero() {
        let conversions = vec![now() - Duration::days(1)];
        let report = aggregate(&[], &conversions, ReportWindow::Last7Days, now());
        assert_eq!(report.conversion_rate.current, 0.0);
    }

    #[test]
    fn weekday_buckets_collapse_across_weeks() {
        // 2026-08-06 and 2026-07-30 are both Thursdays.
        let records = vec![visit("A", 0, 1, 0), visit("B", 7, 1, 0)];
        let report = aggregate(&records, &[], ReportWindow::Last7Days, now());
        let thursday = &report.buckets[3];
        assert_eq!(thursday.label, "Thu");
        assert_eq!(thursday.unique_visitors, 2);
        assert_eq!(thursday.page_views, 2);
    }

    #[test]
    fn breakdowns_group_current_period_only() {
        let mut mobile = visit("A", 1, 2, 30);
        mobile.device_class = DeviceClass::Mobile;
        mobile.path = "/products/cctv".to_string();
        let mut tablet = visit("B", 9, 1, 30);
        tablet.device_class = DeviceClass::Tablet;
        let desktop = visit("C", 2, 1, 30);

        let report = aggregate(&[mobile, tablet, desktop], &[], ReportWindow::Last7Days, now());
        assert_eq!(report.device_breakdown.len(), 2);
        assert!(report
            .device_breakdown
            .iter()
            .all(|row| row.label != "tablet"));
        assert_eq!(report.top_paths.len(), 2);
        let cctv = report
            .top_paths
            .iter()
            .find(|row| row.label == "/products/cctv")
            .unwrap();
        assert_eq!(cctv.page_views, 2);
    }

    #[test]
    fn input_records_are_not_consumed() {
        let records = vec![visit("A", 1, 1, 10)];
        let _ = aggregate(&records, &[], ReportWindow::Last7Days, now());
        assert_eq!(records[0].client_id, "A");
    }
}

//! Month-over-month spike/drop detection.
//!
//! Each restaurant's buckets are compared with the bucket right before them in
//! time. Only the two adjacent ratios matter: no smoothing, no lookahead.

use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::model::{EventKind, MonthlyBucket, SentimentEvent, round_half_even};

///Classifies a positive-ratio delta (percentage points). Thresholds are inclusive.
/// # Example
/// ```
/// use review_pulse::{EventKind, classify_delta};
/// assert_eq!(classify_delta(Some(-15.0), 15.0, -15.0), EventKind::Drop);
/// assert_eq!(classify_delta(Some(-14.9), 15.0, -15.0), EventKind::Stable);
/// assert_eq!(classify_delta(None, 15.0, -15.0), EventKind::Stable);
/// ```
pub fn classify_delta(delta: Option<f64>, spike: f64, drop: f64) -> EventKind {
    match delta {
        Some(d) if d <= drop => EventKind::Drop,
        Some(d) if d >= spike => EventKind::Spike,
        _ => EventKind::Stable,
    }
}

fn events_for(restaurant: &str, mut months: Vec<&MonthlyBucket>, spike: f64, drop: f64) -> Vec<SentimentEvent> {
    months.sort_by_key(|b| b.year_month);
    let mut events = Vec::with_capacity(months.len());
    let mut previous: Option<&MonthlyBucket> = None;
    for current in months {
        let delta_positive =
            previous.map(|p| round_half_even(current.positive_ratio - p.positive_ratio, 1));
        let delta_negative =
            previous.map(|p| round_half_even(current.negative_ratio - p.negative_ratio, 1));
        events.push(SentimentEvent {
            restaurant: restaurant.to_string(),
            year_month: current.year_month,
            delta_positive,
            delta_negative,
            kind: classify_delta(delta_positive, spike, drop),
        });
        previous = Some(current);
    }
    events
}

/// One event per bucket, sorted by `(restaurant, year_month)`.
pub fn detect_events(buckets: &[MonthlyBucket], spike: f64, drop: f64) -> Vec<SentimentEvent> {
    let mut by_restaurant: BTreeMap<&str, Vec<&MonthlyBucket>> = BTreeMap::new();
    for bucket in buckets {
        by_restaurant
            .entry(bucket.restaurant.as_str())
            .or_default()
            .push(bucket);
    }
    let shards: Vec<_> = by_restaurant.into_iter().collect();
    shards
        .into_par_iter()
        .flat_map_iter(|(restaurant, months)| events_for(restaurant, months, spike, drop))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::YearMonth;

    fn bucket(restaurant: &str, month: u32, positive: f64, negative: f64) -> MonthlyBucket {
        MonthlyBucket {
            restaurant: restaurant.to_string(),
            year_month: YearMonth::new(2024, month),
            review_count: 10,
            avg_final_score: 0.0,
            positive_ratio: positive,
            negative_ratio: negative,
            neutral_ratio: round_half_even(100.0 - positive - negative, 1),
            positive_categories: Vec::new(),
            negative_categories: Vec::new(),
        }
    }

    #[test]
    fn thresholds_are_inclusive() {
        assert_eq!(classify_delta(Some(15.0), 15.0, -15.0), EventKind::Spike);
        assert_eq!(classify_delta(Some(14.9), 15.0, -15.0), EventKind::Stable);
        assert_eq!(classify_delta(Some(-15.0), 15.0, -15.0), EventKind::Drop);
        assert_eq!(classify_delta(Some(-14.9), 15.0, -15.0), EventKind::Stable);
    }

    #[test]
    fn spike_then_drop() {
        let buckets = vec![
            bucket("X", 1, 40.0, 30.0),
            bucket("X", 2, 56.0, 20.0),
            bucket("X", 3, 40.0, 35.0),
        ];
        let events = detect_events(&buckets, 15.0, -15.0);
        let kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::Stable, EventKind::Spike, EventKind::Drop]);
        assert_eq!(events[0].delta_positive, None);
        assert_eq!(events[1].delta_positive, Some(16.0));
        assert_eq!(events[1].delta_negative, Some(-10.0));
        assert_eq!(events[2].delta_positive, Some(-16.0));
    }

    #[test]
    fn first_month_is_stable_whatever_its_ratio() {
        let events = detect_events(&[bucket("Y", 6, 100.0, 0.0)], 15.0, -15.0);
        assert_eq!(events[0].kind, EventKind::Stable);
    }

    #[test]
    fn restaurants_do_not_leak_into_each_other() {
        let buckets = vec![
            bucket("B", 2, 90.0, 5.0),
            bucket("A", 1, 10.0, 50.0),
            bucket("B", 1, 10.0, 50.0),
            bucket("A", 2, 12.0, 50.0),
        ];
        let events = detect_events(&buckets, 15.0, -15.0);
        let summary: Vec<(&str, String, EventKind)> = events
            .iter()
            .map(|e| (e.restaurant.as_str(), e.year_month.to_string(), e.kind))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("A", "2024-01".to_string(), EventKind::Stable),
                ("A", "2024-02".to_string(), EventKind::Stable),
                ("B", "2024-01".to_string(), EventKind::Stable),
                ("B", "2024-02".to_string(), EventKind::Spike),
            ]
        );
    }

    #[test]
    fn float_noise_does_not_hide_a_threshold_hit() {
        let buckets = vec![bucket("Z", 1, 40.1, 0.0), bucket("Z", 2, 55.1, 0.0)];
        let events = detect_events(&buckets, 15.0, -15.0);
        assert_eq!(events[1].delta_positive, Some(15.0));
        assert_eq!(events[1].kind, EventKind::Spike);
    }
}

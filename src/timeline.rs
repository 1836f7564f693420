//! Restaurant-month aggregation.
//!
//! Reviews are grouped by `(restaurant, year_month)`. Reviews without a valid
//! date belong to no bucket. Groups below the minimum size are dropped.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::Serialize;

use crate::model::{
    CategoryShare, EnrichedReview, MonthlyBucket, Polarity, RestaurantInsight, YearMonth,
    round_half_even,
};

/// One line of the monthly problem-percentage table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProblemRow {
    pub restaurant_name: String,
    pub year_month: YearMonth,
    pub detected_problem: String,
    pub problem_count: usize,
    pub problem_percentage: f64,
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round_half_even(part as f64 / whole as f64 * 100.0, 1)
}

///Share of each category among all detections in `categories`, ranked by
///descending percentage (ties by name). Empty input gives an empty list.
pub fn category_shares<'a>(categories: impl IntoIterator<Item = &'a str>) -> Vec<CategoryShare> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for category in categories {
        *counts.entry(category).or_insert(0) += 1;
    }
    let total: usize = counts.values().sum();
    let mut shares: Vec<CategoryShare> = counts
        .into_iter()
        .map(|(category, count)| CategoryShare {
            category: category.to_string(),
            count,
            percentage: percentage(count, total),
        })
        .collect();
    shares.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.category.cmp(&b.category)));
    shares
}

fn shares_for(members: &[&EnrichedReview], polarity: Polarity) -> Vec<CategoryShare> {
    category_shares(
        members
            .iter()
            .filter(|r| r.assessment.final_label == polarity)
            .flat_map(|r| r.tags.iter().map(|t| t.category.as_str())),
    )
}

fn build_bucket(
    restaurant: String,
    year_month: YearMonth,
    members: &[&EnrichedReview],
    min_reviews: usize,
) -> Option<MonthlyBucket> {
    let n = members.len();
    if n == 0 || n < min_reviews {
        return None;
    }
    let count_of = |p: Polarity| members.iter().filter(|r| r.assessment.final_label == p).count();
    let mean = members.iter().map(|r| r.assessment.final_score).sum::<f64>() / n as f64;
    Some(MonthlyBucket {
        restaurant,
        year_month,
        review_count: n,
        avg_final_score: round_half_even(mean, 2),
        positive_ratio: percentage(count_of(Polarity::Positive), n),
        negative_ratio: percentage(count_of(Polarity::Negative), n),
        neutral_ratio: percentage(count_of(Polarity::Neutral), n),
        positive_categories: shares_for(members, Polarity::Positive),
        negative_categories: shares_for(members, Polarity::Negative),
    })
}

/// Monthly buckets sorted by `(restaurant, year_month)`, each with at least `min_reviews` reviews.
pub fn aggregate(reviews: &[EnrichedReview], min_reviews: usize) -> Vec<MonthlyBucket> {
    let mut groups: BTreeMap<(&str, YearMonth), Vec<&EnrichedReview>> = BTreeMap::new();
    for review in reviews {
        if let Some(ym) = review.year_month() {
            groups
                .entry((review.review.restaurant.as_str(), ym))
                .or_default()
                .push(review);
        }
    }
    let groups: Vec<_> = groups.into_iter().collect();
    groups
        .par_iter()
        .filter_map(|((restaurant, ym), members)| {
            build_bucket(restaurant.to_string(), *ym, members, min_reviews)
        })
        .collect()
}

/// Negative-review category rows, ranked within each restaurant-month.
pub fn problem_rows(buckets: &[MonthlyBucket]) -> Vec<ProblemRow> {
    buckets
        .iter()
        .flat_map(|b| {
            b.negative_categories.iter().map(move |share| ProblemRow {
                restaurant_name: b.restaurant.clone(),
                year_month: b.year_month,
                detected_problem: share.category.clone(),
                problem_count: share.count,
                problem_percentage: share.percentage,
            })
        })
        .collect()
}

/// Top-N problems and praised features per restaurant over all its scored reviews.
pub fn insights(reviews: &[EnrichedReview], top_n: usize) -> Vec<RestaurantInsight> {
    let mut by_restaurant: BTreeMap<&str, Vec<&EnrichedReview>> = BTreeMap::new();
    for review in reviews {
        by_restaurant
            .entry(review.review.restaurant.as_str())
            .or_default()
            .push(review);
    }
    by_restaurant
        .into_iter()
        .map(|(restaurant, members)| {
            let mut top_problems = shares_for(&members, Polarity::Negative);
            let mut top_positive_features = shares_for(&members, Polarity::Positive);
            top_problems.truncate(top_n);
            top_positive_features.truncate(top_n);
            RestaurantInsight {
                restaurant: restaurant.to_string(),
                top_problems,
                top_positive_features,
            }
        })
        .collect()
}

///Formats ranked shares as `Label (P%)` joined by ", ".
/// # Example
/// ```
/// use review_pulse::{CategoryShare, format_shares};
/// let shares = vec![
///     CategoryShare { category: "Delivery Speed".into(), count: 3, percentage: 60.0 },
///     CategoryShare { category: "Packaging".into(), count: 2, percentage: 40.0 },
/// ];
/// assert_eq!(format_shares(&shares), "Delivery Speed (60.0%), Packaging (40.0%)");
/// ```
pub fn format_shares(shares: &[CategoryShare]) -> String {
    shares
        .iter()
        .map(|s| format!("{} ({:.1}%)", s.category, s.percentage))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CategoryTag, Review, SentimentAssessment};
    use chrono::NaiveDate;

    fn enriched(id: usize, restaurant: &str, date: Option<(i32, u32)>, label: Polarity, tags: &[&str]) -> EnrichedReview {
        let score = match label {
            Polarity::Positive => 0.8,
            Polarity::Neutral => 0.0,
            Polarity::Negative => -0.8,
        };
        EnrichedReview {
            review: Review {
                id,
                restaurant: restaurant.to_string(),
                text: String::new(),
                rating: 3,
                timestamp: date.map(|(y, m)| {
                    NaiveDate::from_ymd_opt(y, m, 15).unwrap().and_hms_opt(10, 0, 0).unwrap()
                }),
            },
            cleaned_text: String::new(),
            assessment: SentimentAssessment {
                predicted_star: 3,
                model_confidence: 1.0,
                rating_score: 0.0,
                model_score: score,
                final_score: score,
                final_label: label,
            },
            top_words: Vec::new(),
            tags: tags
                .iter()
                .map(|c| CategoryTag {
                    review_id: id,
                    category: c.to_string(),
                    confidence: 0.9,
                })
                .collect(),
        }
    }

    fn month(restaurant: &str, y: i32, m: u32, labels: &[Polarity]) -> Vec<EnrichedReview> {
        labels
            .iter()
            .enumerate()
            .map(|(i, l)| enriched(i, restaurant, Some((y, m)), *l, &[]))
            .collect()
    }

    #[test]
    fn min_reviews_boundary() {
        let nine = month("A", 2024, 1, &[Polarity::Positive; 9]);
        assert!(aggregate(&nine, 10).is_empty());
        let ten = month("A", 2024, 1, &[Polarity::Positive; 10]);
        let buckets = aggregate(&ten, 10);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].review_count, 10);
        assert_eq!(buckets[0].positive_ratio, 100.0);
    }

    #[test]
    fn ratios_and_mean_are_rounded() {
        let mut labels = vec![Polarity::Positive; 1];
        labels.extend([Polarity::Negative; 1]);
        labels.extend([Polarity::Neutral; 1]);
        let buckets = aggregate(&month("A", 2024, 2, &labels), 1);
        let b = &buckets[0];
        assert_eq!(b.positive_ratio, 33.3);
        assert_eq!(b.negative_ratio, 33.3);
        assert_eq!(b.neutral_ratio, 33.3);
        assert_eq!(b.avg_final_score, 0.0);
    }

    #[test]
    fn undated_reviews_join_no_bucket() {
        let mut reviews = month("A", 2024, 1, &[Polarity::Positive; 2]);
        reviews.push(enriched(99, "A", None, Polarity::Negative, &["Service"]));
        let buckets = aggregate(&reviews, 1);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].review_count, 2);
        assert!(buckets[0].negative_categories.is_empty());
    }

    #[test]
    fn output_sorted_regardless_of_input_order() {
        let mut reviews = month("B", 2024, 3, &[Polarity::Neutral; 2]);
        reviews.extend(month("A", 2024, 5, &[Polarity::Neutral; 2]));
        reviews.extend(month("B", 2023, 12, &[Polarity::Neutral; 2]));
        reviews.extend(month("A", 2024, 1, &[Polarity::Neutral; 2]));
        let keys: Vec<(String, String)> = aggregate(&reviews, 1)
            .into_iter()
            .map(|b| (b.restaurant, b.year_month.to_string()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("A".to_string(), "2024-01".to_string()),
                ("A".to_string(), "2024-05".to_string()),
                ("B".to_string(), "2023-12".to_string()),
                ("B".to_string(), "2024-03".to_string()),
            ]
        );
    }

    #[test]
    fn category_percentages_per_polarity_sum_to_100() {
        let reviews = vec![
            enriched(1, "A", Some((2024, 1)), Polarity::Negative, &["Delivery Speed", "Food Temperature"]),
            enriched(2, "A", Some((2024, 1)), Polarity::Negative, &["Delivery Speed"]),
            enriched(3, "A", Some((2024, 1)), Polarity::Negative, &["Packaging"]),
            enriched(4, "A", Some((2024, 1)), Polarity::Positive, &["Taste & Flavor"]),
            enriched(5, "A", Some((2024, 1)), Polarity::Neutral, &["Service"]),
        ];
        let b = &aggregate(&reviews, 1)[0];
        let neg: Vec<(&str, f64)> = b
            .negative_categories
            .iter()
            .map(|s| (s.category.as_str(), s.percentage))
            .collect();
        assert_eq!(
            neg,
            vec![("Delivery Speed", 50.0), ("Food Temperature", 25.0), ("Packaging", 25.0)]
        );
        let sum: f64 = b.negative_categories.iter().map(|s| s.percentage).sum();
        assert!((sum - 100.0).abs() <= 0.1);
        assert_eq!(b.positive_categories.len(), 1);
        assert_eq!(b.positive_categories[0].percentage, 100.0);

        let rows = problem_rows(&aggregate(&reviews, 1));
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].detected_problem, "Delivery Speed");
        assert_eq!(rows[0].problem_count, 2);
    }

    #[test]
    fn thirds_stay_within_rounding_tolerance() {
        let shares = category_shares(["a", "b", "c"]);
        let sum: f64 = shares.iter().map(|s| s.percentage).sum();
        assert!((sum - 100.0).abs() <= 0.1 + 1e-9);
    }

    #[test]
    fn insights_rank_and_truncate() {
        let reviews = vec![
            enriched(1, "A", None, Polarity::Negative, &["Delivery Speed", "Delivery Speed", "Packaging"]),
            enriched(2, "A", Some((2024, 1)), Polarity::Negative, &["Service"]),
            enriched(3, "A", Some((2024, 1)), Polarity::Positive, &["Taste & Flavor"]),
            enriched(4, "B", Some((2024, 1)), Polarity::Neutral, &["Service"]),
        ];
        let all = insights(&reviews, 2);
        assert_eq!(all.len(), 2);
        assert_eq!(
            format_shares(&all[0].top_problems),
            "Delivery Speed (50.0%), Packaging (25.0%)"
        );
        assert_eq!(format_shares(&all[0].top_positive_features), "Taste & Flavor (100.0%)");
        assert!(all[1].top_problems.is_empty());
        assert_eq!(format_shares(&all[1].top_problems), "");
    }
}

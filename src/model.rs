//! Value types flowing between pipeline stages.
//!
//! Every stage consumes the previous stage's records and produces new ones;
//! nothing here is mutated after construction.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize, Serializer};

/// One input review as read from the batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Review {
    /// Position in the input batch, used as review id.
    pub id: usize,
    pub restaurant: String,
    pub text: String,
    /// Explicit star rating, always in 1..=5.
    pub rating: u8,
    /// `None` when the source date could not be parsed.
    pub timestamp: Option<NaiveDateTime>,
}

impl Review {
    pub fn year_month(&self) -> Option<YearMonth> {
        self.timestamp.map(YearMonth::from)
    }
}

/// Calendar month key, formatted `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Self {
        YearMonth { year, month }
    }
}

impl From<NaiveDateTime> for YearMonth {
    fn from(ts: NaiveDateTime) -> Self {
        YearMonth::new(ts.year(), ts.month())
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (y, m) = s
            .split_once('-')
            .ok_or_else(|| format!("expected YYYY-MM, got {s:?}"))?;
        let year = y.parse::<i32>().map_err(|e| format!("bad year in {s:?}: {e}"))?;
        let month = m.parse::<u32>().map_err(|e| format!("bad month in {s:?}: {e}"))?;
        if !(1..=12).contains(&month) {
            return Err(format!("month out of range in {s:?}"));
        }
        Ok(YearMonth::new(year, month))
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Sentiment bucket. Serialized lower-case everywhere in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Positive,
    Neutral,
    Negative,
}

impl Polarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Polarity::Positive => "positive",
            Polarity::Neutral => "neutral",
            Polarity::Negative => "negative",
        }
    }
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fused sentiment for one review.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentimentAssessment {
    pub predicted_star: u8,
    pub model_confidence: f64,
    pub rating_score: f64,
    pub model_score: f64,
    pub final_score: f64,
    pub final_label: Polarity,
}

/// A detected taxonomy category. A review may carry several.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTag {
    pub review_id: usize,
    pub category: String,
    pub confidence: f64,
}

/// A review after normalization, scoring and tagging.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedReview {
    pub review: Review,
    pub cleaned_text: String,
    pub assessment: SentimentAssessment,
    /// Most attended tokens, empty when no explainer is configured.
    pub top_words: Vec<String>,
    pub tags: Vec<CategoryTag>,
}

impl EnrichedReview {
    pub fn year_month(&self) -> Option<YearMonth> {
        self.review.year_month()
    }
}

/// Share of one category among all detections of a polarity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryShare {
    pub category: String,
    pub count: usize,
    pub percentage: f64,
}

/// Aggregated restaurant-month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyBucket {
    pub restaurant: String,
    pub year_month: YearMonth,
    pub review_count: usize,
    pub avg_final_score: f64,
    pub positive_ratio: f64,
    pub negative_ratio: f64,
    pub neutral_ratio: f64,
    /// Sorted by descending percentage, then name.
    pub positive_categories: Vec<CategoryShare>,
    /// Sorted by descending percentage, then name.
    pub negative_categories: Vec<CategoryShare>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Stable,
    Spike,
    Drop,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Stable => "stable",
            EventKind::Spike => "spike",
            EventKind::Drop => "drop",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Month-over-month change for one restaurant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentimentEvent {
    pub restaurant: String,
    pub year_month: YearMonth,
    /// `None` for the first month of a restaurant.
    pub delta_positive: Option<f64>,
    pub delta_negative: Option<f64>,
    pub kind: EventKind,
}

/// Per-restaurant summary of the strongest problems and praised features.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestaurantInsight {
    pub restaurant: String,
    pub top_problems: Vec<CategoryShare>,
    pub top_positive_features: Vec<CategoryShare>,
}

/// Rounds half to even at `decimals` places. Used for every reported number.
pub fn round_half_even(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round_ties_even() / factor
}

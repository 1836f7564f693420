//! Reading review batches from CSV.
//!
//! Input columns: `restaurant_name, review_date, rating, review_text`. Bad rows
//! are reported and skipped; an unparseable date keeps the review but it joins
//! no monthly bucket.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use log::warn;
use serde::Deserialize;
use walkdir::WalkDir;

use crate::error::{PipelineError, Result, ReviewError, ReviewFailure};
use crate::model::Review;

/// One input row before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawReview {
    pub restaurant_name: String,
    #[serde(default)]
    pub review_date: Option<String>,
    #[serde(default)]
    pub rating: Option<String>,
    #[serde(default)]
    pub review_text: Option<String>,
}

/// Reviews ready for scoring plus the rows that were rejected.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub reviews: Vec<Review>,
    pub rejected: Vec<ReviewFailure>,
    pub files: Vec<PathBuf>,
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y", "%B %d, %Y", "%b %d, %Y", "%d %B %Y", "%d %b %Y",
];

///Parses the review date formats seen in exports. `None` when nothing matches.
/// # Example
/// ```
/// use review_pulse::parse_review_date;
/// assert!(parse_review_date("2024-02-29T18:30:00Z").is_some());
/// assert!(parse_review_date("2024-01-05").is_some());
/// assert!(parse_review_date("yesterday").is_none());
/// ```
pub fn parse_review_date(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    if let Some(dt) = DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
    {
        return Some(dt);
    }
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Accepts integral ratings 1..=5, also written as "4.0".
pub fn parse_rating(raw: Option<&str>) -> std::result::Result<u8, ReviewError> {
    let s = raw.map(str::trim).unwrap_or_default();
    let value: f64 = s
        .parse()
        .map_err(|_| ReviewError::MalformedInput(format!("rating {s:?} is not a number")))?;
    if value.fract() != 0.0 || !(1.0..=5.0).contains(&value) {
        return Err(ReviewError::MalformedInput(format!("rating {s:?} outside 1..=5")));
    }
    Ok(value as u8)
}

/// Validates one row. Empty text or a bad rating rejects the row.
pub fn parse_review(id: usize, raw: RawReview) -> std::result::Result<Review, ReviewError> {
    let restaurant = raw.restaurant_name.trim().to_string();
    if restaurant.is_empty() {
        return Err(ReviewError::MalformedInput("empty restaurant_name".to_string()));
    }
    let text = raw.review_text.unwrap_or_default();
    if text.trim().is_empty() {
        return Err(ReviewError::MalformedInput("empty review_text".to_string()));
    }
    let rating = parse_rating(raw.rating.as_deref())?;
    let date = raw.review_date.unwrap_or_default();
    let timestamp = parse_review_date(&date);
    if timestamp.is_none() {
        warn!("review {id} ({restaurant}): unparseable date {date:?}, kept out of the timeline");
    }
    Ok(Review {
        id,
        restaurant,
        text,
        rating,
        timestamp,
    })
}

/// The CSV file itself, or every `.csv` below a directory, sorted.
pub fn collect_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        return Err(PipelineError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file or directory"),
        ));
    }
    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|x| x.to_str())
                .is_some_and(|x| x.eq_ignore_ascii_case("csv"))
        })
        .collect();
    files.sort();
    if files.is_empty() {
        return Err(PipelineError::NoInput(path.to_path_buf()));
    }
    Ok(files)
}

/// Reads reviews from any `csv::Reader`, numbering them from `first_id`.
pub fn read_reviews_from<R: std::io::Read>(
    reader: &mut csv::Reader<R>,
    first_id: usize,
    report: &mut IngestReport,
) {
    let mut id = first_id;
    for row in reader.deserialize::<RawReview>() {
        let parsed = match row {
            Ok(raw) => {
                let restaurant = raw.restaurant_name.trim().to_string();
                parse_review(id, raw).map_err(|e| (restaurant, e))
            }
            Err(e) => Err((String::new(), ReviewError::MalformedInput(e.to_string()))),
        };
        match parsed {
            Ok(review) => report.reviews.push(review),
            Err((restaurant, error)) => {
                warn!("skipping review {id}: {error}");
                report.rejected.push(ReviewFailure {
                    review_id: id,
                    restaurant,
                    error,
                });
            }
        }
        id += 1;
    }
}

/// Reads every input file under `path`. Ids are unique across files.
pub fn read_reviews(path: &Path) -> Result<IngestReport> {
    let mut report = IngestReport {
        files: collect_files(path)?,
        ..IngestReport::default()
    };
    let mut next_id = 0;
    for file in report.files.clone() {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_path(&file)?;
        read_reviews_from(&mut reader, next_id, &mut report);
        next_id = report.reviews.len() + report.rejected.len();
    }
    Ok(report)
}

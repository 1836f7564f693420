//! Normalizer → Scorer → Tagger per review, then Aggregator → Detector.
//!
//! Per-review stages run on the rayon pool in any order; a review that cannot be
//! scored is recorded and skipped, one that cannot be tagged keeps its score and
//! goes untagged. Aggregation and event detection are sharded by
//! restaurant.

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::config::PipelineConfig;
use crate::engines::Engines;
use crate::error::{PipelineError, Result, ReviewError, ReviewFailure};
use crate::events::detect_events;
use crate::model::{EnrichedReview, MonthlyBucket, RestaurantInsight, Review, SentimentEvent};
use crate::normalize::normalize;
use crate::sentiment::SentimentScorer;
use crate::tagger::CategoryTagger;
use crate::timeline::{ProblemRow, aggregate, insights, problem_rows};

/// Everything one run produces.
#[derive(Debug, Default)]
pub struct PipelineReport {
    /// Successfully processed reviews, in input order.
    pub reviews: Vec<EnrichedReview>,
    pub failures: Vec<ReviewFailure>,
    /// Scored reviews whose tagging failed; they are in `reviews` with no tags.
    pub untagged: Vec<ReviewFailure>,
    pub buckets: Vec<MonthlyBucket>,
    /// One per bucket, same order as `buckets`.
    pub events: Vec<SentimentEvent>,
    pub problems: Vec<ProblemRow>,
    pub insights: Vec<RestaurantInsight>,
}

pub struct Pipeline {
    config: PipelineConfig,
    scorer: SentimentScorer,
    tagger: CategoryTagger,
}

impl Pipeline {
    /// Validates the configuration and prepares the tagger.
    pub fn new(engines: &Engines, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let scorer = SentimentScorer::new(engines, &config);
        let tagger = CategoryTagger::new(engines, &config)?;
        Ok(Pipeline {
            config,
            scorer,
            tagger,
        })
    }

    /// Runs the per-review stages on one review. Tagging errors leave the tags empty.
    pub fn enrich(&self, review: &Review) -> std::result::Result<EnrichedReview, ReviewError> {
        self.enrich_with_tagging(review).map(|(enriched, _)| enriched)
    }

    fn enrich_with_tagging(
        &self,
        review: &Review,
    ) -> std::result::Result<(EnrichedReview, Option<ReviewError>), ReviewError> {
        let cleaned_text = normalize(&review.text);
        if cleaned_text.is_empty() {
            return Err(ReviewError::MalformedInput("text is empty after normalization".to_string()));
        }
        let assessment = self.scorer.score(review, &cleaned_text)?;
        let top_words = match self.scorer.explain(&cleaned_text) {
            Ok(weights) => weights.into_iter().map(|(token, _)| token).collect(),
            Err(e) => {
                debug!("review {}: no explanation: {e}", review.id);
                Vec::new()
            }
        };
        let (tags, tagging_error) = match self.tagger.tag_review(review.id, &cleaned_text) {
            Ok(tags) => (tags, None),
            Err(e) => (Vec::new(), Some(ReviewError::from(e))),
        };
        let enriched = EnrichedReview {
            review: review.clone(),
            cleaned_text,
            assessment,
            top_words,
            tags,
        };
        Ok((enriched, tagging_error))
    }

    /// Processes the whole batch. Fails only when no review could reach the models.
    pub fn run(&self, reviews: &[Review]) -> Result<PipelineReport> {
        let failure_of = |review: &Review, error: ReviewError| ReviewFailure {
            review_id: review.id,
            restaurant: review.restaurant.clone(),
            error,
        };
        let outcomes: Vec<_> = reviews
            .par_iter()
            .map(|review| match self.enrich_with_tagging(review) {
                Ok((enriched, None)) => Ok((enriched, None)),
                Ok((enriched, Some(error))) => {
                    warn!("review {} ({}) left untagged: {error}", review.id, review.restaurant);
                    Ok((enriched, Some(failure_of(review, error))))
                }
                Err(error) => {
                    warn!("skipping review {} ({}): {error}", review.id, review.restaurant);
                    Err(failure_of(review, error))
                }
            })
            .collect();

        let mut enriched = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        let mut untagged = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok((review, tagging_failure)) => {
                    enriched.push(review);
                    untagged.extend(tagging_failure);
                }
                Err(failure) => failures.push(failure),
            }
        }

        if enriched.is_empty() {
            if let Some(first) = failures.iter().find(|f| f.error.is_model_unavailable()) {
                return Err(PipelineError::ModelsUnreachable(first.error.to_string()));
            }
        }

        let buckets = aggregate(&enriched, self.config.min_reviews);
        let events = detect_events(
            &buckets,
            self.config.spike_threshold,
            self.config.drop_threshold,
        );
        let problems = problem_rows(&buckets);
        let insights = insights(&enriched, self.config.top_n);

        info!(
            "processed {} reviews ({} skipped, {} untagged), {} monthly buckets, {} restaurants",
            enriched.len(),
            failures.len(),
            untagged.len(),
            buckets.len(),
            insights.len()
        );

        Ok(PipelineReport {
            reviews: enriched,
            failures,
            untagged,
            buckets,
            events,
            problems,
            insights,
        })
    }
}

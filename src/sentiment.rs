//! Fuses the star classifier's prediction with the explicit rating.
//!
//! `final_score = w * model_score + (1 - w) * rating_score` where
//! `model_score = rating_score_of(predicted_star) * confidence` and `w` is the
//! configured model weight (0.7 by default). The result is a pure function of
//! `(rating, predicted_star, confidence)`.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::engines::{AttentionExplainer, Engines, StarClassifier};
use crate::error::{ModelError, ReviewError};
use crate::model::{Polarity, Review, SentimentAssessment};

/// Score of a 1..=5 star level, shared by ratings and predictions.
const STAR_SCORES: [f64; 5] = [-1.0, -0.5, 0.0, 0.5, 1.0];

///Maps a star level onto {-1, -0.5, 0, 0.5, 1}. `None` outside 1..=5.
/// # Example
/// ```
/// use review_pulse::rating_score_of;
/// assert_eq!(rating_score_of(1), Some(-1.0));
/// assert_eq!(rating_score_of(4), Some(0.5));
/// assert_eq!(rating_score_of(6), None);
/// ```
pub fn rating_score_of(star: u8) -> Option<f64> {
    match star {
        1..=5 => Some(STAR_SCORES[star as usize - 1]),
        _ => None,
    }
}

/// Bounds are exclusive: exactly `positive` or `negative` is neutral.
pub fn label_for(score: f64, positive: f64, negative: f64) -> Polarity {
    if score > positive {
        Polarity::Positive
    } else if score < negative {
        Polarity::Negative
    } else {
        Polarity::Neutral
    }
}

/// Keeps the first `max_tokens` whitespace tokens; the tail is dropped.
pub fn truncate_tokens(text: &str, max_tokens: usize) -> String {
    text.split_whitespace()
        .take(max_tokens)
        .collect::<Vec<_>>()
        .join(" ")
}

pub struct SentimentScorer {
    classifier: Arc<dyn StarClassifier>,
    explainer: Option<Arc<dyn AttentionExplainer>>,
    model_weight: f64,
    positive_threshold: f64,
    negative_threshold: f64,
    max_tokens: usize,
    top_k: usize,
}

impl SentimentScorer {
    pub fn new(engines: &Engines, config: &PipelineConfig) -> Self {
        SentimentScorer {
            classifier: Arc::clone(&engines.classifier),
            explainer: engines.explainer.clone(),
            model_weight: config.model_weight,
            positive_threshold: config.positive_threshold,
            negative_threshold: config.negative_threshold,
            max_tokens: config.max_tokens,
            top_k: config.explain_top_k,
        }
    }

    pub fn score(
        &self,
        review: &Review,
        normalized_text: &str,
    ) -> Result<SentimentAssessment, ReviewError> {
        let text = truncate_tokens(normalized_text, self.max_tokens);
        let (star, confidence) = self.classifier.classify(&text, self.max_tokens)?;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(ModelError::invalid_output(
                "classifier",
                format!("confidence {confidence} outside [0, 1]"),
            )
            .into());
        }
        self.fuse(review.rating, star, confidence)
    }

    /// Combines rating and prediction into the final assessment.
    pub fn fuse(
        &self,
        rating: u8,
        predicted_star: u8,
        confidence: f64,
    ) -> Result<SentimentAssessment, ReviewError> {
        let rating_score = rating_score_of(rating)
            .ok_or_else(|| ReviewError::MalformedInput(format!("rating {rating} outside 1..=5")))?;
        let predicted = rating_score_of(predicted_star).ok_or_else(|| {
            ModelError::invalid_output("classifier", format!("star {predicted_star} outside 1..=5"))
        })?;
        let model_score = predicted * confidence;
        let final_score = (self.model_weight * model_score
            + (1.0 - self.model_weight) * rating_score)
            .clamp(-1.0, 1.0);
        Ok(SentimentAssessment {
            predicted_star,
            model_confidence: confidence,
            rating_score,
            model_score,
            final_score,
            final_label: label_for(final_score, self.positive_threshold, self.negative_threshold),
        })
    }

    /// Top-K tokens by attention weight, special tokens removed. Empty without an explainer.
    pub fn explain(&self, normalized_text: &str) -> Result<Vec<(String, f64)>, ModelError> {
        let Some(explainer) = &self.explainer else {
            return Ok(Vec::new());
        };
        let text = truncate_tokens(normalized_text, self.max_tokens);
        let mut weights: Vec<(String, f64)> = explainer
            .attention(&text, self.max_tokens)?
            .into_iter()
            .filter(|(token, _)| !explainer.is_special_token(token))
            .collect();
        weights.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        weights.truncate(self.top_k);
        Ok(weights)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Mutex;

    struct Fixed {
        star: u8,
        confidence: f64,
        seen: Mutex<Vec<String>>,
    }

    impl StarClassifier for Fixed {
        fn classify(&self, text: &str, _max_tokens: usize) -> Result<(u8, f64), ModelError> {
            self.seen.lock().unwrap().push(text.to_string());
            Ok((self.star, self.confidence))
        }
    }

    struct Down;

    impl StarClassifier for Down {
        fn classify(&self, _: &str, _: usize) -> Result<(u8, f64), ModelError> {
            Err(ModelError::unavailable("classifier", "connection refused"))
        }
    }

    struct Attn;

    impl AttentionExplainer for Attn {
        fn attention(&self, _: &str, _: usize) -> Result<Vec<(String, f64)>, ModelError> {
            Ok(vec![
                ("[CLS]".into(), 0.9),
                ("cold".into(), 0.3),
                ("food".into(), 0.2),
                ("the".into(), 0.05),
                ("late".into(), 0.25),
                ("[SEP]".into(), 0.8),
            ])
        }
    }

    fn scorer_with(classifier: Arc<dyn StarClassifier>, config: &PipelineConfig) -> SentimentScorer {
        SentimentScorer::new(&Engines::new(classifier), config)
    }

    fn review(rating: u8) -> Review {
        Review {
            id: 0,
            restaurant: "X".into(),
            text: "text".into(),
            rating,
            timestamp: None,
        }
    }

    fn fixed(star: u8, confidence: f64) -> Arc<Fixed> {
        Arc::new(Fixed {
            star,
            confidence,
            seen: Mutex::new(Vec::new()),
        })
    }

    #[test]
    fn rating_scores_are_monotonic_and_symmetric() {
        let scores: Vec<f64> = (1..=5).map(|r| rating_score_of(r).unwrap()).collect();
        assert_eq!(scores, vec![-1.0, -0.5, 0.0, 0.5, 1.0]);
        assert!(scores.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(rating_score_of(0), None);
    }

    #[test]
    fn label_boundaries_are_exclusive() {
        assert_eq!(label_for(0.2, 0.2, -0.2), Polarity::Neutral);
        assert_eq!(label_for(-0.2, 0.2, -0.2), Polarity::Neutral);
        assert_eq!(label_for(0.2001, 0.2, -0.2), Polarity::Positive);
        assert_eq!(label_for(-0.2001, 0.2, -0.2), Polarity::Negative);
    }

    #[test]
    fn fusion_weights_model_over_rating() {
        let config = PipelineConfig::default();
        let s = scorer_with(fixed(5, 0.8), &config);
        let a = s.score(&review(1), "great food").unwrap();
        assert_eq!(a.rating_score, -1.0);
        assert!((a.model_score - 0.8).abs() < 1e-12);
        assert!((a.final_score - (0.7 * 0.8 - 0.3)).abs() < 1e-9);
        assert_eq!(a.final_label, Polarity::Positive);
    }

    #[test]
    fn input_is_truncated_from_the_tail() {
        let mut config = PipelineConfig::default();
        config.max_tokens = 3;
        let classifier = fixed(3, 0.5);
        let s = scorer_with(classifier.clone(), &config);
        s.score(&review(3), "one two three four five").unwrap();
        s.score(&review(3), "one two three four five").unwrap();
        let seen = classifier.seen.lock().unwrap();
        assert_eq!(seen[0], "one two three");
        assert_eq!(seen[0], seen[1]);
    }

    #[test]
    fn unreachable_classifier_is_model_unavailable() {
        let s = scorer_with(Arc::new(Down), &PipelineConfig::default());
        let err = s.score(&review(4), "ok").unwrap_err();
        assert!(err.is_model_unavailable());
    }

    #[test]
    fn out_of_range_outputs_are_rejected() {
        let config = PipelineConfig::default();
        assert!(scorer_with(fixed(6, 0.5), &config).score(&review(4), "x").is_err());
        assert!(scorer_with(fixed(4, 1.5), &config).score(&review(4), "x").is_err());
        assert!(matches!(
            scorer_with(fixed(4, 0.5), &config).score(&review(0), "x"),
            Err(ReviewError::MalformedInput(_))
        ));
    }

    #[test]
    fn explain_drops_special_tokens_and_ranks() {
        let config = PipelineConfig::default();
        let engines = Engines::new(fixed(3, 0.5)).with_explainer(Arc::new(Attn));
        let s = SentimentScorer::new(&engines, &config);
        let top = s.explain("the food was cold and late").unwrap();
        let tokens: Vec<&str> = top.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(tokens, vec!["cold", "late", "food", "the"]);
    }

    #[test]
    fn explain_without_explainer_is_empty() {
        let s = scorer_with(fixed(3, 0.5), &PipelineConfig::default());
        assert!(s.explain("anything").unwrap().is_empty());
    }

    proptest! {
        #[test]
        fn final_score_stays_in_range(rating in 1u8..=5, star in 1u8..=5, confidence in 0.0f64..=1.0) {
            let s = scorer_with(fixed(star, confidence), &PipelineConfig::default());
            let a = s.fuse(rating, star, confidence).unwrap();
            prop_assert!((-1.0..=1.0).contains(&a.final_score));
            let again = s.fuse(rating, star, confidence).unwrap();
            prop_assert_eq!(a, again);
        }
    }
}

//! Named thresholds and weights for every stage.

use std::fs;
use std::path::Path;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::taxonomy::Taxonomy;

/// How the tagger maps text onto the taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaggingStrategy {
    /// Sentence embeddings against category exemplars, best category per sentence.
    Embedding,
    /// Zero-shot scoring of the whole review, every category above threshold.
    Entailment,
}

/// Every tunable constant of the pipeline. Missing keys in a config file keep their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Weight of the text model in the fused score; the explicit rating gets the rest.
    pub model_weight: f64,
    /// `final_score` strictly above this is positive.
    pub positive_threshold: f64,
    /// `final_score` strictly below this is negative.
    pub negative_threshold: f64,
    /// Token budget for the classifier; longer text loses its tail.
    pub max_tokens: usize,
    pub explain_top_k: usize,
    pub strategy: TaggingStrategy,
    pub embedding_threshold: f64,
    pub entailment_threshold: f64,
    /// Restaurant-months with fewer reviews are dropped from the timeline.
    pub min_reviews: usize,
    pub spike_threshold: f64,
    pub drop_threshold: f64,
    /// Length of the ranked category lists in insight summaries.
    pub top_n: usize,
    pub translation_attempts: usize,
    /// Custom taxonomy, the built-in restaurant taxonomy when absent.
    pub taxonomy: Option<Taxonomy>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            model_weight: 0.7,
            positive_threshold: 0.2,
            negative_threshold: -0.2,
            max_tokens: 128,
            explain_top_k: 5,
            strategy: TaggingStrategy::Embedding,
            embedding_threshold: 0.55,
            entailment_threshold: 0.2,
            min_reviews: 10,
            spike_threshold: 15.0,
            drop_threshold: -15.0,
            top_n: 5,
            translation_attempts: 2,
            taxonomy: None,
        }
    }
}

impl PipelineConfig {
    /// Reads a TOML file on top of the defaults.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PipelineConfig =
            toml::from_str(content).map_err(|e| PipelineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn rating_weight(&self) -> f64 {
        1.0 - self.model_weight
    }

    /// Detection threshold of the configured strategy.
    pub fn tagging_threshold(&self) -> f64 {
        match self.strategy {
            TaggingStrategy::Embedding => self.embedding_threshold,
            TaggingStrategy::Entailment => self.entailment_threshold,
        }
    }

    pub fn taxonomy(&self) -> Taxonomy {
        self.taxonomy.clone().unwrap_or_default()
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(PipelineError::Config(msg));
        if !(0.0..=1.0).contains(&self.model_weight) {
            return fail(format!("model_weight must be in [0, 1], got {}", self.model_weight));
        }
        if !(-1.0..=1.0).contains(&self.negative_threshold)
            || !(-1.0..=1.0).contains(&self.positive_threshold)
            || self.negative_threshold > self.positive_threshold
        {
            return fail(format!(
                "sentiment thresholds must satisfy -1 <= negative ({}) <= positive ({}) <= 1",
                self.negative_threshold, self.positive_threshold
            ));
        }
        if self.max_tokens == 0 {
            return fail("max_tokens must be at least 1".to_string());
        }
        for (name, value) in [
            ("embedding_threshold", self.embedding_threshold),
            ("entailment_threshold", self.entailment_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return fail(format!("{name} must be in [0, 1], got {value}"));
            }
        }
        if self.spike_threshold <= 0.0 || self.drop_threshold >= 0.0 {
            return fail(format!(
                "spike_threshold must be positive and drop_threshold negative, got {} / {}",
                self.spike_threshold, self.drop_threshold
            ));
        }
        if self.translation_attempts == 0 {
            return fail("translation_attempts must be at least 1".to_string());
        }
        if let Some(taxonomy) = &self.taxonomy {
            taxonomy.validate().map_err(PipelineError::Config)?;
        }
        Ok(())
    }
}

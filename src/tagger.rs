//! Maps review text onto the category taxonomy.
//!
//! Embedding strategy: every sentence is compared with every exemplar; the single
//! best category wins if its maximum cosine similarity reaches the threshold.
//! Entailment strategy: the whole review is scored against every category label
//! and all categories at or above the threshold are kept.

use std::sync::{Arc, Mutex};

use log::warn;

use crate::config::{PipelineConfig, TaggingStrategy};
use crate::engines::{Embedder, Engines, Translator, ZeroShotScorer, cosine, translate_or_original};
use crate::error::{ModelError, PipelineError};
use crate::model::CategoryTag;
use crate::taxonomy::Taxonomy;

/// Splits on sentence punctuation and drops fragments of 3 chars or fewer.
pub fn split_sentences(text: &str) -> Vec<String> {
    text.split(['.', '!', '?', '؟', '\n'])
        .map(str::trim)
        .filter(|s| s.chars().count() > 3)
        .map(String::from)
        .collect()
}

/// True when the text holds letters outside the Latin script (Arabic, Cyrillic, ...).
pub fn needs_translation(text: &str) -> bool {
    text.chars().any(|c| c.is_alphabetic() && !is_latin(c))
}

fn is_latin(c: char) -> bool {
    matches!(c,
        'A'..='Z' | 'a'..='z'
        | '\u{00C0}'..='\u{024F}'
        | '\u{1E00}'..='\u{1EFF}'
        | '\u{2C60}'..='\u{2C7F}'
        | '\u{A720}'..='\u{A7FF}'
        | '\u{AB30}'..='\u{AB6F}'
        | '\u{FF21}'..='\u{FF3A}'
        | '\u{FF41}'..='\u{FF5A}'
        | 'ª' | 'º'
    )
}

/// Lowercase words only; punctuation becomes whitespace.
fn clean_for_matching(text: &str) -> String {
    let spaced: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' || c.is_whitespace() { c } else { ' ' })
        .collect();
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Per category, in taxonomy order: one vector per exemplar.
type ExemplarVectors = Vec<(String, Vec<Vec<f32>>)>;

enum Backend {
    Embedding {
        embedder: Arc<dyn Embedder>,
        /// Empty until the exemplars could be embedded once.
        cache: Mutex<Option<Arc<ExemplarVectors>>>,
    },
    Entailment {
        scorer: Arc<dyn ZeroShotScorer>,
    },
}

pub struct CategoryTagger {
    backend: Backend,
    taxonomy: Taxonomy,
    threshold: f64,
    translator: Option<Arc<dyn Translator>>,
    translation_attempts: usize,
}

impl CategoryTagger {
    /// Builds the tagger. The embedding strategy embeds all exemplars here; if the
    /// embedder is down, that is retried on the next review instead of failing.
    pub fn new(engines: &Engines, config: &PipelineConfig) -> Result<Self, PipelineError> {
        let taxonomy = config.taxonomy();
        taxonomy.validate().map_err(PipelineError::Config)?;
        let backend = match config.strategy {
            TaggingStrategy::Embedding => {
                let embedder = engines.embedder.clone().ok_or_else(|| {
                    PipelineError::Config("embedding strategy needs an embedder".to_string())
                })?;
                let cached = match embed_exemplars(embedder.as_ref(), &taxonomy) {
                    Ok(vectors) => Some(Arc::new(vectors)),
                    Err(e) => {
                        warn!("could not embed category exemplars, retrying per review: {e}");
                        None
                    }
                };
                Backend::Embedding {
                    embedder,
                    cache: Mutex::new(cached),
                }
            }
            TaggingStrategy::Entailment => Backend::Entailment {
                scorer: engines.zero_shot.clone().ok_or_else(|| {
                    PipelineError::Config("entailment strategy needs a zero-shot scorer".to_string())
                })?,
            },
        };
        Ok(CategoryTagger {
            backend,
            taxonomy,
            threshold: config.tagging_threshold(),
            translator: engines.translator.clone(),
            translation_attempts: config.translation_attempts,
        })
    }

    /// Detected `(category, confidence)` pairs for one piece of text.
    /// At most one pair with the embedding strategy.
    pub fn tag(&self, text: &str) -> Result<Vec<(String, f64)>, ModelError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let text = clean_for_matching(&self.to_english(text));
        if text.is_empty() {
            return Ok(Vec::new());
        }
        match &self.backend {
            Backend::Embedding { embedder, cache } => {
                let exemplars = self.exemplars(embedder.as_ref(), cache)?;
                let vectors = embed_checked(embedder.as_ref(), &[text])?;
                Ok(self.best_category(&vectors[0], &exemplars).into_iter().collect())
            }
            Backend::Entailment { scorer } => self.entailed(scorer.as_ref(), &text),
        }
    }

    /// Tags of a whole review. Embedding tags each sentence (one category per
    /// sentence at most); entailment tags the full text (multi-label).
    pub fn tag_review(&self, review_id: usize, text: &str) -> Result<Vec<CategoryTag>, ModelError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let detections = match &self.backend {
            Backend::Embedding { embedder, cache } => {
                let exemplars = self.exemplars(embedder.as_ref(), cache)?;
                let english = self.to_english(text);
                let sentences: Vec<String> = split_sentences(&english)
                    .iter()
                    .map(|s| clean_for_matching(s))
                    .filter(|s| !s.is_empty())
                    .collect();
                if sentences.is_empty() {
                    return Ok(Vec::new());
                }
                let vectors = embed_checked(embedder.as_ref(), &sentences)?;
                vectors
                    .iter()
                    .filter_map(|v| self.best_category(v, &exemplars))
                    .collect()
            }
            Backend::Entailment { .. } => self.tag(text)?,
        };
        Ok(detections
            .into_iter()
            .map(|(category, confidence)| CategoryTag {
                review_id,
                category,
                confidence,
            })
            .collect())
    }

    fn exemplars(
        &self,
        embedder: &dyn Embedder,
        cache: &Mutex<Option<Arc<ExemplarVectors>>>,
    ) -> Result<Arc<ExemplarVectors>, ModelError> {
        let mut slot = cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(vectors) = slot.as_ref() {
            return Ok(Arc::clone(vectors));
        }
        let vectors = Arc::new(embed_exemplars(embedder, &self.taxonomy)?);
        *slot = Some(Arc::clone(&vectors));
        Ok(vectors)
    }

    fn to_english(&self, text: &str) -> String {
        match &self.translator {
            Some(translator) if needs_translation(text) => {
                translate_or_original(translator.as_ref(), text, self.translation_attempts)
            }
            _ => text.to_string(),
        }
    }

    fn best_category(
        &self,
        sentence: &[f32],
        exemplars: &[(String, Vec<Vec<f32>>)],
    ) -> Option<(String, f64)> {
        let mut best: Option<(&str, f64)> = None;
        for (name, vectors) in exemplars {
            let score = vectors
                .iter()
                .map(|e| cosine(sentence, e))
                .fold(f64::NEG_INFINITY, f64::max);
            if best.is_none_or(|(_, b)| score > b) {
                best = Some((name.as_str(), score));
            }
        }
        best.filter(|(_, score)| *score >= self.threshold)
            .map(|(name, score)| (name.to_string(), score))
    }

    fn entailed(
        &self,
        scorer: &dyn ZeroShotScorer,
        text: &str,
    ) -> Result<Vec<(String, f64)>, ModelError> {
        let scores = scorer.score_categories(text, &self.taxonomy.categories)?;
        let mut detected = Vec::new();
        for category in &self.taxonomy.categories {
            let Some(score) = scores.get(&category.name) else {
                continue;
            };
            if !score.is_finite() {
                return Err(ModelError::invalid_output(
                    "zero-shot",
                    format!("non-finite score for {:?}", category.name),
                ));
            }
            let score = score.clamp(0.0, 1.0);
            if score >= self.threshold {
                detected.push((category.name.clone(), score));
            }
        }
        Ok(detected)
    }
}

fn embed_checked(embedder: &dyn Embedder, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
    let vectors = embedder.embed(texts)?;
    if vectors.len() != texts.len() {
        return Err(ModelError::invalid_output(
            "embedder",
            format!("{} vectors for {} texts", vectors.len(), texts.len()),
        ));
    }
    Ok(vectors)
}

fn embed_exemplars(embedder: &dyn Embedder, taxonomy: &Taxonomy) -> Result<ExemplarVectors, ModelError> {
    let phrases: Vec<String> = taxonomy
        .categories
        .iter()
        .flat_map(|c| c.exemplars.iter().map(|e| clean_for_matching(e)))
        .collect();
    let mut vectors = embed_checked(embedder, &phrases)?.into_iter();
    Ok(taxonomy
        .categories
        .iter()
        .map(|c| (c.name.clone(), vectors.by_ref().take(c.exemplars.len()).collect()))
        .collect())
}

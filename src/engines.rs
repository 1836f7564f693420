//! Scoring capabilities the pipeline is handed, never constructs itself.
//!
//! Each capability is a stateless request/response service. Implementations
//! must be `Send + Sync` so reviews can be processed on a rayon pool.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;

use crate::error::{ModelError, TranslationFailure};
use crate::taxonomy::Category;

/// Ordinal 1..=5 text classifier.
pub trait StarClassifier: Send + Sync {
    /// Returns `(star, confidence)`. Must fail, not guess, when the model is unreachable.
    fn classify(&self, text: &str, max_tokens: usize) -> Result<(u8, f64), ModelError>;
}

/// Attention weights of the classifier's last layer, averaged over heads and read
/// from the classification anchor position, one entry per input token.
pub trait AttentionExplainer: Send + Sync {
    fn attention(&self, text: &str, max_tokens: usize) -> Result<Vec<(String, f64)>, ModelError>;

    /// Structural tokens that never count as explanations.
    fn is_special_token(&self, token: &str) -> bool {
        matches!(
            token,
            "[CLS]" | "[SEP]" | "[PAD]" | "[UNK]" | "[MASK]" | "<s>" | "</s>" | "<pad>" | "<unk>" | "<mask>"
        )
    }
}

/// Sentence embeddings in a shared vector space.
pub trait Embedder: Send + Sync {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError>;
}

/// Multi-label zero-shot scoring: independent per-category probability in [0, 1].
pub trait ZeroShotScorer: Send + Sync {
    fn score_categories(
        &self,
        text: &str,
        categories: &[Category],
    ) -> Result<HashMap<String, f64>, ModelError>;
}

/// Best-effort machine translation.
pub trait Translator: Send + Sync {
    fn translate(&self, text: &str, source: &str, target: &str) -> Result<String, TranslationFailure>;
}

/// The capabilities one run works with.
#[derive(Clone)]
pub struct Engines {
    pub classifier: Arc<dyn StarClassifier>,
    pub explainer: Option<Arc<dyn AttentionExplainer>>,
    pub embedder: Option<Arc<dyn Embedder>>,
    pub zero_shot: Option<Arc<dyn ZeroShotScorer>>,
    pub translator: Option<Arc<dyn Translator>>,
}

impl Engines {
    pub fn new(classifier: Arc<dyn StarClassifier>) -> Self {
        Engines {
            classifier,
            explainer: None,
            embedder: None,
            zero_shot: None,
            translator: None,
        }
    }

    pub fn with_explainer(mut self, explainer: Arc<dyn AttentionExplainer>) -> Self {
        self.explainer = Some(explainer);
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_zero_shot(mut self, zero_shot: Arc<dyn ZeroShotScorer>) -> Self {
        self.zero_shot = Some(zero_shot);
        self
    }

    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = Some(translator);
        self
    }
}

/// Cosine similarity; 0.0 for empty, mismatched or zero vectors.
pub fn cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut na = 0.0f64;
    let mut nb = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    (dot / (na.sqrt() * nb.sqrt())).clamp(-1.0, 1.0)
}

/// Translates to English, retrying up to `attempts` times; falls back to `text` silently.
pub fn translate_or_original(translator: &dyn Translator, text: &str, attempts: usize) -> String {
    for attempt in 1..=attempts.max(1) {
        match translator.translate(text, "auto", "en") {
            Ok(translated) if !translated.trim().is_empty() => return translated,
            Ok(_) => debug!("translation attempt {attempt} returned empty text"),
            Err(e) => debug!("translation attempt {attempt} failed: {e}"),
        }
    }
    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Flaky {
        failures_left: AtomicUsize,
    }

    impl Translator for Flaky {
        fn translate(&self, text: &str, _: &str, _: &str) -> Result<String, TranslationFailure> {
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(TranslationFailure("timeout".into()));
            }
            Ok(format!("en:{text}"))
        }
    }

    #[test]
    fn cosine_basics() {
        assert!((cosine(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-9);
        assert!(cosine(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn translation_retries_then_succeeds() {
        let t = Flaky {
            failures_left: AtomicUsize::new(1),
        };
        assert_eq!(translate_or_original(&t, "مرحبا", 2), "en:مرحبا");
    }

    #[test]
    fn translation_falls_back_to_original() {
        let t = Flaky {
            failures_left: AtomicUsize::new(5),
        };
        assert_eq!(translate_or_original(&t, "مرحبا", 2), "مرحبا");
    }
}

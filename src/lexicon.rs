//! Offline scoring backend built from word lists.
//!
//! Stands in for the transformer services when none is configured: a lexicon
//! star classifier with negation and intensifiers, attention-like token weights,
//! a hashed bag-of-stems embedder and an overlap-based zero-shot scorer.
//! Everything is deterministic.

use std::collections::{HashMap, HashSet};

use rust_stemmers::{Algorithm, Stemmer};

use crate::engines::{AttentionExplainer, Embedder, StarClassifier, ZeroShotScorer};
use crate::error::ModelError;
use crate::taxonomy::Category;

const EMBEDDING_DIM: usize = 512;

/// Tokens after a negation that get their polarity flipped.
const NEGATION_WINDOW: usize = 3;

const POSITIVE: &[(&str, f64)] = &[
    ("excellent", 1.0),
    ("amazing", 0.9),
    ("perfect", 0.9),
    ("delicious", 0.9),
    ("fantastic", 0.9),
    ("awesome", 0.85),
    ("love", 0.8),
    ("best", 0.8),
    ("great", 0.75),
    ("tasty", 0.7),
    ("fresh", 0.6),
    ("friendly", 0.6),
    ("polite", 0.55),
    ("fast", 0.5),
    ("quick", 0.5),
    ("hot", 0.3),
    ("good", 0.5),
    ("nice", 0.45),
    ("clean", 0.45),
    ("recommend", 0.6),
    ("generous", 0.5),
    ("worth", 0.4),
    ("thank", 0.4),
    ("ممتاز", 0.9),
    ("رائع", 0.9),
    ("لذيذ", 0.8),
    ("حلو", 0.6),
    ("جميل", 0.6),
];

const NEGATIVE: &[(&str, f64)] = &[
    ("worst", -1.0),
    ("disgusting", -1.0),
    ("terrible", -0.9),
    ("horrible", -0.9),
    ("awful", -0.9),
    ("inedible", -0.9),
    ("hate", -0.8),
    ("rude", -0.7),
    ("dirty", -0.7),
    ("bad", -0.6),
    ("poor", -0.6),
    ("disappointed", -0.6),
    ("disappointing", -0.6),
    ("raw", -0.5),
    ("burnt", -0.6),
    ("undercooked", -0.6),
    ("late", -0.5),
    ("slow", -0.5),
    ("missing", -0.5),
    ("wrong", -0.5),
    ("cold", -0.5),
    ("spilled", -0.5),
    ("expensive", -0.4),
    ("overpriced", -0.6),
    ("bland", -0.5),
    ("small", -0.3),
    ("سيء", -0.8),
    ("زفت", -0.9),
    ("بارد", -0.5),
    ("متأخر", -0.6),
];

const INTENSIFIERS: &[(&str, f64)] = &[
    ("very", 1.5),
    ("really", 1.4),
    ("extremely", 1.8),
    ("so", 1.3),
    ("super", 1.5),
    ("too", 1.3),
    ("jiddan", 1.5),
    ("جدا", 1.5),
    ("slightly", 0.6),
    ("bit", 0.7),
];

const NEGATIONS: &[&str] = &[
    "not", "no", "never", "nothing", "dont", "didnt", "wasnt", "isnt", "wont", "cant", "مش", "مو", "ما",
];

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "is", "are", "was", "were", "be", "been", "it", "its", "this",
    "that", "of", "to", "in", "on", "at", "for", "with", "my", "me", "i", "we", "our", "you", "your",
    "they", "their", "he", "she", "his", "her", "as", "by", "from", "so", "very", "too", "had", "has",
    "have", "do", "did", "does", "not", "no", "just", "all", "also", "than", "then", "there", "here",
    "في", "على", "من", "عن", "كان", "كانت", "جدا", "جداً", "مره", "مرة",
];

///Lowercased word tokens; apostrophes are dropped so "didn't" becomes "didnt".
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '’' || c == '_'))
        .map(|t| t.replace(['\'', '’'], ""))
        .filter(|t| !t.is_empty())
        .collect()
}

pub struct LexiconModel {
    stemmer: Stemmer,
    polarity: HashMap<String, f64>,
    intensifiers: HashMap<&'static str, f64>,
    negations: HashSet<&'static str>,
    stopwords: HashSet<&'static str>,
}

impl Default for LexiconModel {
    fn default() -> Self {
        Self::new()
    }
}

impl LexiconModel {
    pub fn new() -> Self {
        let stemmer = Stemmer::create(Algorithm::English);
        let polarity = POSITIVE
            .iter()
            .chain(NEGATIVE)
            .map(|(word, score)| (stemmer.stem(word).into_owned(), *score))
            .collect();
        LexiconModel {
            stemmer,
            polarity,
            intensifiers: INTENSIFIERS.iter().copied().collect(),
            negations: NEGATIONS.iter().copied().collect(),
            stopwords: STOPWORDS.iter().copied().collect(),
        }
    }

    fn stem(&self, token: &str) -> String {
        self.stemmer.stem(token).into_owned()
    }

    /// Signed contribution of every token, 0.0 for tokens outside the lexicon.
    fn token_scores(&self, tokens: &[String]) -> Vec<f64> {
        let mut scores = Vec::with_capacity(tokens.len());
        let mut negated_for = 0usize;
        let mut boost = 1.0f64;
        for token in tokens {
            if self.negations.contains(token.as_str()) {
                negated_for = NEGATION_WINDOW;
                scores.push(0.0);
                continue;
            }
            if let Some(factor) = self.intensifiers.get(token.as_str()) {
                boost *= factor;
                scores.push(0.0);
                continue;
            }
            let base = self.polarity.get(&self.stem(token)).copied();
            let score = match base {
                Some(base) => {
                    let signed = if negated_for > 0 { -0.8 * base } else { base };
                    (signed * boost).clamp(-1.0, 1.0)
                }
                None => 0.0,
            };
            if base.is_some() {
                boost = 1.0;
            }
            negated_for = negated_for.saturating_sub(1);
            scores.push(score);
        }
        scores
    }

    fn content_stems(&self, text: &str) -> Vec<String> {
        tokenize(text)
            .into_iter()
            .filter(|t| !self.stopwords.contains(t.as_str()))
            .map(|t| self.stem(&t))
            .collect()
    }
}

fn star_for(polarity: f64) -> u8 {
    if polarity >= 0.6 {
        5
    } else if polarity >= 0.2 {
        4
    } else if polarity > -0.2 {
        3
    } else if polarity > -0.6 {
        2
    } else {
        1
    }
}

impl StarClassifier for LexiconModel {
    fn classify(&self, text: &str, max_tokens: usize) -> Result<(u8, f64), ModelError> {
        let tokens: Vec<String> = tokenize(text).into_iter().take(max_tokens).collect();
        let hits: Vec<f64> = self
            .token_scores(&tokens)
            .into_iter()
            .filter(|s| *s != 0.0)
            .collect();
        if hits.is_empty() {
            return Ok((3, 0.4));
        }
        let sum: f64 = hits.iter().sum();
        let magnitude: f64 = hits.iter().map(|s| s.abs()).sum();
        let polarity = (sum / hits.len() as f64).clamp(-1.0, 1.0);
        let agreement = sum.abs() / magnitude;
        let coverage = hits.len().min(3) as f64 / 3.0;
        let confidence = (0.4 + 0.6 * agreement * coverage).clamp(0.0, 1.0);
        Ok((star_for(polarity), confidence))
    }
}

impl AttentionExplainer for LexiconModel {
    fn attention(&self, text: &str, max_tokens: usize) -> Result<Vec<(String, f64)>, ModelError> {
        let tokens: Vec<String> = tokenize(text).into_iter().take(max_tokens).collect();
        let raw: Vec<f64> = self
            .token_scores(&tokens)
            .into_iter()
            .zip(&tokens)
            .map(|(score, token)| {
                if self.stopwords.contains(token.as_str()) {
                    0.01
                } else {
                    score.abs() + 0.05
                }
            })
            .collect();
        let total: f64 = raw.iter().sum();
        if total == 0.0 {
            return Ok(Vec::new());
        }
        Ok(tokens.into_iter().zip(raw).map(|(t, w)| (t, w / total)).collect())
    }
}

fn fnv1a(token: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in token.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

impl Embedder for LexiconModel {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; EMBEDDING_DIM];
                for stem in self.content_stems(text) {
                    v[(fnv1a(&stem) % EMBEDDING_DIM as u64) as usize] += 1.0;
                }
                let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm > 0.0 {
                    v.iter_mut().for_each(|x| *x /= norm);
                }
                v
            })
            .collect())
    }
}

impl ZeroShotScorer for LexiconModel {
    /// Best fraction of any exemplar's (or the label's) content words found in the text.
    fn score_categories(
        &self,
        text: &str,
        categories: &[Category],
    ) -> Result<HashMap<String, f64>, ModelError> {
        let present: HashSet<String> = self.content_stems(text).into_iter().collect();
        let overlap = |phrase: &str| {
            let stems = self.content_stems(phrase);
            if stems.is_empty() {
                return 0.0;
            }
            stems.iter().filter(|s| present.contains(*s)).count() as f64 / stems.len() as f64
        };
        Ok(categories
            .iter()
            .map(|c| {
                let best = c
                    .exemplars
                    .iter()
                    .map(|e| overlap(e))
                    .chain(std::iter::once(overlap(&c.name)))
                    .fold(0.0, f64::max);
                (c.name.clone(), best)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::cosine;
    use crate::taxonomy::Taxonomy;

    #[test]
    fn tokenizer_folds_apostrophes() {
        assert_eq!(tokenize("Didn't LIKE it, at all!"), vec!["didnt", "like", "it", "at", "all"]);
    }

    #[test]
    fn praise_and_complaints_map_to_opposite_stars() {
        let m = LexiconModel::new();
        let (good, conf_good) = m.classify("excellent food, really delicious and fast", 128).unwrap();
        let (bad, _) = m.classify("terrible, the food was cold and the driver was rude", 128).unwrap();
        assert!(good >= 4, "got {good}");
        assert!(bad <= 2, "got {bad}");
        assert!((0.0..=1.0).contains(&conf_good));
    }

    #[test]
    fn negation_flips_polarity() {
        let m = LexiconModel::new();
        let (star, _) = m.classify("not good not tasty", 128).unwrap();
        assert!(star <= 2, "got {star}");
    }

    #[test]
    fn no_signal_is_neutral() {
        let m = LexiconModel::new();
        assert_eq!(m.classify("ordered on tuesday", 128).unwrap(), (3, 0.4));
    }

    #[test]
    fn attention_favours_sentiment_words() {
        let m = LexiconModel::new();
        let weights = m.attention("the food was disgusting", 128).unwrap();
        let top = weights
            .iter()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
            .unwrap();
        assert_eq!(top.0, "disgusting");
        let total: f64 = weights.iter().map(|(_, w)| w).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn embeddings_share_stems() {
        let m = LexiconModel::new();
        let v = m
            .embed(&["the food arrived cold".to_string(), "food was cold".to_string(), "friendly driver".to_string()])
            .unwrap();
        assert!(cosine(&v[0], &v[1]) > 0.8);
        assert!(cosine(&v[0], &v[2]) < 0.3);
    }

    #[test]
    fn zero_shot_scores_every_category_independently() {
        let m = LexiconModel::new();
        let t = Taxonomy::default();
        let scores = m.score_categories("late delivery and the food was cold", &t.categories).unwrap();
        assert_eq!(scores.len(), t.categories.len());
        assert_eq!(scores["Delivery Speed"], 1.0);
        assert_eq!(scores["Food Temperature"], 1.0);
        assert_eq!(scores["Incorrect Billing"], 0.0);
    }
}

#![forbid(unsafe_code)]
//! # review_pulse
//!
//! Longitudinal sentiment and complaint/praise themes per restaurant from a
//! static batch of reviews.
//!
//! Stages, each consuming the previous stage's records:
//! 1. [`normalize`] canonicalizes review text.
//! 2. [`SentimentScorer`] fuses a 1–5 star classifier with the explicit rating.
//! 3. [`CategoryTagger`] maps sentences onto the category [`Taxonomy`].
//! 4. [`aggregate`] builds restaurant-month buckets.
//! 5. [`detect_events`] flags month-over-month spikes and drops.
//!
//! Models are never loaded here: they are passed in as [`Engines`], either the
//! offline [`LexiconModel`] or a [`RemoteModel`] talking to a model server.
//!
//! ## Example
//! ```
//! use std::sync::Arc;
//! use review_pulse::{Engines, LexiconModel, Pipeline, PipelineConfig, Review};
//!
//! let lexicon = Arc::new(LexiconModel::new());
//! let engines = Engines::new(lexicon.clone()).with_embedder(lexicon);
//! let pipeline = Pipeline::new(&engines, PipelineConfig::default()).unwrap();
//! let review = Review {
//!     id: 0,
//!     restaurant: "99 Grill".into(),
//!     text: "The food was cold and the delivery was very late".into(),
//!     rating: 1,
//!     timestamp: None,
//! };
//! let report = pipeline.run(&[review]).unwrap();
//! assert_eq!(report.reviews[0].assessment.final_label.as_str(), "negative");
//! ```

use std::sync::Arc;

use clap::ValueEnum;

pub mod config;
pub mod engines;
pub mod error;
pub mod events;
pub mod export;
pub mod ingest;
pub mod lexicon;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod remote;
pub mod sentiment;
pub mod tagger;
pub mod taxonomy;
pub mod timeline;

pub use config::{PipelineConfig, TaggingStrategy};
pub use engines::{
    AttentionExplainer, Embedder, Engines, StarClassifier, Translator, ZeroShotScorer, cosine,
};
pub use error::{ModelError, PipelineError, ReviewError, ReviewFailure};
pub use events::{classify_delta, detect_events};
pub use export::{ExportFormat, csv_safe_cell, render_summary, write_report};
pub use ingest::{IngestReport, collect_files, parse_review_date, read_reviews};
pub use lexicon::LexiconModel;
pub use model::{
    CategoryShare, CategoryTag, EnrichedReview, EventKind, MonthlyBucket, Polarity,
    RestaurantInsight, Review, SentimentAssessment, SentimentEvent, YearMonth,
};
pub use normalize::normalize;
pub use pipeline::{Pipeline, PipelineReport};
pub use remote::RemoteModel;
pub use sentiment::{SentimentScorer, label_for, rating_score_of};
pub use tagger::CategoryTagger;
pub use taxonomy::{Category, Taxonomy};
pub use timeline::{aggregate, format_shares};

/// Where the scoring capabilities come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Built-in word lists; no network, no translation.
    Lexicon,
    /// JSON model server at `--model-url`.
    Remote,
}

/// Builds the engine bundle for a backend.
pub fn engines_for(backend: Backend, model_url: Option<&str>) -> Result<Engines, PipelineError> {
    match backend {
        Backend::Lexicon => {
            let lexicon = Arc::new(LexiconModel::new());
            Ok(Engines::new(lexicon.clone())
                .with_explainer(lexicon.clone())
                .with_embedder(lexicon.clone())
                .with_zero_shot(lexicon))
        }
        Backend::Remote => {
            let url = model_url.ok_or_else(|| {
                PipelineError::Config("the remote backend needs --model-url".to_string())
            })?;
            let remote = Arc::new(RemoteModel::new(url, remote::DEFAULT_TIMEOUT)?);
            Ok(Engines::new(remote.clone())
                .with_explainer(remote.clone())
                .with_embedder(remote.clone())
                .with_zero_shot(remote.clone())
                .with_translator(remote))
        }
    }
}

//! Wikipedia importance: reference dataset import and per-place recomputation.

mod dataset;
mod recompute;
mod scorer;

pub use dataset::{
    import_wikipedia_articles, ErrorPolicy, SwapOutcome, DATASET_FILES, WIKIPEDIA_ARTICLE,
    WIKIPEDIA_REDIRECT,
};
pub use recompute::{ImportanceRecomputer, RecomputeStats};
pub use scorer::{ImportanceInputs, ImportanceScore, ImportanceScorer, WikipediaArticleScorer};

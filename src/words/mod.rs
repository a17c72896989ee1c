//! Word-pair selection for the round initializer.
//!
//! A round needs one (civilian_word, traitor_word) pair. Selection is a
//! three-tier fallback so starting a round never blocks on content
//! availability: the remote pool filtered by difficulty, then the remote
//! pool unfiltered, then a small built-in pool.

mod remote;

use crate::types::WordDifficulty;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use remote::RemoteWordProvider;

/// Result type for word-pair operations
pub type WordResult<T> = Result<T, WordPairError>;

/// Errors that can occur while fetching word pairs
#[derive(Debug, thiserror::Error)]
pub enum WordPairError {
    #[error("word provider request failed: {0}")]
    ApiError(String),

    #[error("word provider returned no usable pairs")]
    EmptyPool,

    #[error("response parsing failed: {0}")]
    ParseError(String),

    #[error("invalid configuration: {0}")]
    ConfigError(String),
}

/// A civilian/traitor word pairing
#[derive(Debug, Clone, PartialEq)]
pub struct WordPair {
    pub civilian_word: String,
    pub traitor_word: String,
}

/// Constraints applied when requesting a pair
#[derive(Debug, Clone, Copy)]
pub struct WordQuery {
    /// None means any difficulty
    pub difficulty: Option<WordDifficulty>,
    pub allow_adult: bool,
}

/// Trait implemented by word-pair sources
#[async_trait]
pub trait WordPairProvider: Send + Sync {
    /// Fetch a random pair matching the query
    async fn fetch_pair(&self, query: WordQuery) -> WordResult<WordPair>;

    /// Get the name of this provider
    fn name(&self) -> &str;
}

/// Built-in pairs used when no provider is reachable. Kept deliberately
/// small; the remote pool is the real content source.
const STATIC_PAIRS: &[(&str, &str)] = &[
    ("cat", "tiger"),
    ("coffee", "tea"),
    ("beach", "desert"),
    ("guitar", "violin"),
];

/// Pick a pair from the built-in pool
pub fn static_pair() -> WordPair {
    use rand::Rng;
    let mut rng = rand::rng();
    let (civilian, traitor) = STATIC_PAIRS[rng.random_range(0..STATIC_PAIRS.len())];
    WordPair {
        civilian_word: civilian.to_string(),
        traitor_word: traitor.to_string(),
    }
}

/// Select a word pair with the three-tier fallback. Remote failures are
/// logged and recovered, never surfaced to players; the built-in pool is the
/// last tier, so in practice this only errs if a future provider misbehaves
/// in a way the fallback cannot absorb.
pub async fn select_pair(
    provider: Option<&dyn WordPairProvider>,
    difficulty: WordDifficulty,
    allow_adult: bool,
) -> WordResult<WordPair> {
    let Some(provider) = provider else {
        return Ok(static_pair());
    };

    match provider
        .fetch_pair(WordQuery {
            difficulty: Some(difficulty),
            allow_adult,
        })
        .await
    {
        Ok(pair) => return Ok(pair),
        Err(e) => {
            tracing::warn!(
                "Word provider '{}' failed for difficulty {:?}: {}. Retrying unfiltered.",
                provider.name(),
                difficulty,
                e
            );
        }
    }

    match provider
        .fetch_pair(WordQuery {
            difficulty: None,
            allow_adult,
        })
        .await
    {
        Ok(pair) => Ok(pair),
        Err(e) => {
            tracing::warn!(
                "Word provider '{}' failed unfiltered: {}. Falling back to built-in pool.",
                provider.name(),
                e
            );
            Ok(static_pair())
        }
    }
}

/// Configuration for the word-pair provider
#[derive(Debug, Clone)]
pub struct WordConfig {
    /// Base URL of the remote word service; None disables the remote tier
    pub base_url: Option<String>,
    /// Timeout for remote requests
    pub timeout: Duration,
}

impl Default for WordConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(5),
        }
    }
}

impl WordConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let base_url = std::env::var("WORD_SERVICE_URL").ok().and_then(|url| {
            let trimmed = url.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        });

        Self {
            base_url,
            timeout: std::env::var("WORD_SERVICE_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(5)),
        }
    }

    /// Build the remote provider if one is configured
    pub fn build_provider(&self) -> WordResult<Option<Arc<dyn WordPairProvider>>> {
        match &self.base_url {
            Some(url) => {
                let provider = RemoteWordProvider::new(url.clone(), self.timeout)?;
                Ok(Some(Arc::new(provider)))
            }
            None => Ok(None),
        }
    }
}

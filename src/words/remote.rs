use super::*;
use crate::types::WordDifficulty;
use serde::Deserialize;

/// Word-pair provider backed by a remote HTTP word service
pub struct RemoteWordProvider {
    base_url: String,
    client: reqwest::Client,
}

impl RemoteWordProvider {
    pub fn new(base_url: String, timeout: Duration) -> WordResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WordPairError::ConfigError(e.to_string()))?;

        Ok(Self { base_url, client })
    }

    fn difficulty_param(difficulty: WordDifficulty) -> &'static str {
        match difficulty {
            WordDifficulty::Easy => "easy",
            WordDifficulty::Medium => "medium",
            WordDifficulty::Hard => "hard",
        }
    }
}

#[derive(Debug, Deserialize)]
struct WordPairResponse {
    civilian_word: String,
    traitor_word: String,
}

#[async_trait]
impl WordPairProvider for RemoteWordProvider {
    async fn fetch_pair(&self, query: WordQuery) -> WordResult<WordPair> {
        let mut request = self
            .client
            .get(format!("{}/pairs/random", self.base_url))
            .query(&[("adult", query.allow_adult.to_string())]);

        if let Some(difficulty) = query.difficulty {
            request = request.query(&[("difficulty", Self::difficulty_param(difficulty))]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| WordPairError::ApiError(format!("request failed: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            // The service answers 404 when no pair matches the filter
            return Err(WordPairError::EmptyPool);
        }

        if !response.status().is_success() {
            return Err(WordPairError::ApiError(format!(
                "unexpected status: {}",
                response.status()
            )));
        }

        let body: WordPairResponse = response
            .json()
            .await
            .map_err(|e| WordPairError::ParseError(e.to_string()))?;

        if body.civilian_word.trim().is_empty() || body.traitor_word.trim().is_empty() {
            return Err(WordPairError::EmptyPool);
        }

        Ok(WordPair {
            civilian_word: body.civilian_word,
            traitor_word: body.traitor_word,
        })
    }

    fn name(&self) -> &str {
        "remote"
    }
}

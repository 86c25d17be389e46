use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::caching::{CacheKey, FetchResult, ResourceRequest};
use crate::config::ModelProviderConfig;
use crate::providers::{AttemptBudget, FallbackChain, Provider, UpstreamClient};

/// The sections every generated brief must contain to count as complete.
pub const REQUIRED_SECTIONS: &[&str] = &["## Overview", "## Key Drivers", "## Risks"];

/// A generated market brief.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketBrief {
    /// The model that produced the text.
    pub model: String,
    /// The brief in markdown.
    pub text: String,
    pub generated_at: DateTime<Utc>,
}

/// Generates a market brief through the configured provider chain.
///
/// The cache identity is the normalized prompt plus the chain configuration,
/// so trivially reworded prompts hit the same entry, while a config change
/// never serves briefs produced by a previous chain.
#[derive(Debug, Clone)]
pub struct BriefRequest {
    upstream: Arc<UpstreamClient>,
    providers: Arc<[ModelProviderConfig]>,
    timeout: Duration,
    max_attempts: usize,
    prompt: String,
}

impl BriefRequest {
    pub fn new(
        upstream: Arc<UpstreamClient>,
        providers: Arc<[ModelProviderConfig]>,
        timeout: Duration,
        max_attempts: usize,
        prompt: String,
    ) -> Self {
        Self {
            upstream,
            providers,
            timeout,
            max_attempts,
            prompt,
        }
    }

    /// A stable fingerprint of the normalized prompt.
    ///
    /// Prompts are compared case-insensitively with whitespace runs
    /// collapsed, so that cosmetic edits do not bypass the cache.
    fn prompt_fingerprint(&self) -> String {
        let normalized = self
            .prompt
            .split_whitespace()
            .map(|word| word.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ");

        let hash = Sha256::digest(normalized.as_bytes());
        let mut out = String::with_capacity(32);
        for b in &hash[..16] {
            out.write_fmt(format_args!("{b:02x}")).unwrap();
        }
        out
    }
}

impl ResourceRequest for BriefRequest {
    type Item = MarketBrief;

    const NAME: &'static str = "briefs";

    fn cache_key(&self) -> CacheKey {
        let mut builder = CacheKey::builder(Self::NAME);
        builder
            .write_param("prompt", self.prompt_fingerprint())
            .unwrap();
        for provider in self.providers.iter() {
            builder
                .write_param("provider", format_args!("{}/{}", provider.name, provider.model))
                .unwrap();
        }
        builder.build()
    }

    fn fetch(&self) -> BoxFuture<'static, FetchResult<MarketBrief>> {
        let providers = self
            .providers
            .iter()
            .map(|config| ModelProvider {
                upstream: Arc::clone(&self.upstream),
                config: config.clone(),
                prompt: self.prompt.clone(),
                timeout: self.timeout,
            })
            .collect();
        let chain = FallbackChain::new(providers, self.max_attempts);

        Box::pin(async move { chain.run().await })
    }
}

/// One generation endpoint in the brief fallback chain.
struct ModelProvider {
    upstream: Arc<UpstreamClient>,
    config: ModelProviderConfig,
    prompt: String,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    text: String,
}

impl Provider for ModelProvider {
    type Output = MarketBrief;

    fn name(&self) -> &str {
        &self.config.name
    }

    fn attempt(&self, budget: AttemptBudget) -> BoxFuture<'_, FetchResult<MarketBrief>> {
        let max_tokens = match budget {
            AttemptBudget::Normal => self.config.max_output_tokens,
            AttemptBudget::Extended => self.config.max_output_tokens.saturating_mul(2),
        };

        Box::pin(async move {
            let body = GenerateBody {
                model: &self.config.model,
                prompt: &self.prompt,
                max_tokens,
            };
            let response: GenerateResponse = self
                .upstream
                .post_json(
                    self.config.url.clone(),
                    &body,
                    self.config.api_token.as_deref(),
                    self.timeout,
                )
                .await?;

            Ok(MarketBrief {
                model: self.config.model.clone(),
                text: response.text,
                generated_at: Utc::now(),
            })
        })
    }

    fn validate(&self, brief: &MarketBrief) -> Result<(), String> {
        for section in REQUIRED_SECTIONS {
            if !brief.text.contains(section) {
                return Err(format!("missing section {section:?}"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: &str, providers: &[(&str, &str)]) -> BriefRequest {
        let upstream = Arc::new(UpstreamClient::new(&crate::config::Config::default()));
        let providers: Vec<_> = providers
            .iter()
            .map(|(name, model)| ModelProviderConfig {
                name: (*name).to_owned(),
                url: "https://llm.example.com/v1/generate".parse().unwrap(),
                model: (*model).to_owned(),
                api_token: None,
                max_output_tokens: 1024,
            })
            .collect();

        BriefRequest::new(
            upstream,
            providers.into(),
            Duration::from_secs(1),
            4,
            prompt.to_owned(),
        )
    }

    #[test]
    fn test_prompt_normalization() {
        let a = request("Summarize  today's markets", &[("a", "m")]);
        let b = request("summarize today's MARKETS", &[("a", "m")]);
        let c = request("summarize yesterday's markets", &[("a", "m")]);

        assert_eq!(a.cache_key(), b.cache_key());
        assert_ne!(a.cache_key(), c.cache_key());
    }

    #[test]
    fn test_chain_config_scopes_cache_key() {
        let a = request("summarize", &[("a", "model-1")]);
        let b = request("summarize", &[("a", "model-2")]);
        let c = request("summarize", &[("a", "model-1"), ("b", "model-1")]);

        assert_ne!(a.cache_key(), b.cache_key());
        assert_ne!(a.cache_key(), c.cache_key());
    }

    #[test]
    fn test_brief_validation() {
        let provider = ModelProvider {
            upstream: Arc::new(UpstreamClient::new(&crate::config::Config::default())),
            config: ModelProviderConfig {
                name: "a".to_owned(),
                url: "https://llm.example.com/v1/generate".parse().unwrap(),
                model: "m".to_owned(),
                api_token: None,
                max_output_tokens: 1024,
            },
            prompt: "summarize".to_owned(),
            timeout: Duration::from_secs(1),
        };

        let complete = MarketBrief {
            model: "m".to_owned(),
            text: "## Overview\nfine\n## Key Drivers\nfine\n## Risks\nfine\n".to_owned(),
            generated_at: Utc::now(),
        };
        assert!(provider.validate(&complete).is_ok());

        let truncated = MarketBrief {
            model: "m".to_owned(),
            text: "## Overview\nfine\n## Key Dri".to_owned(),
            generated_at: Utc::now(),
        };
        let err = provider.validate(&truncated).unwrap_err();
        assert!(err.contains("Key Drivers"));
    }
}

use std::time::Duration;

use thiserror::Error;

use super::types::RuleSet;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("remote rule source request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("remote rule source returned an unusable document: {0}")]
    Decode(String),
}

/// A remote origin for versioned rule documents. Any error is treated as
/// "unavailable" by the provider, which then proceeds down its fallback
/// chain; the source itself never falls back.
pub trait RemoteRuleSource: Send + Sync {
    fn fetch(
        &self,
        fiscal_year: &str,
    ) -> impl Future<Output = Result<RuleSet, FetchError>> + Send;
}

/// Fetches `{base_url}/{fiscal_year}.json` with a bounded timeout.
#[derive(Debug, Clone)]
pub struct HttpRuleSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRuleSource {
    pub fn new(base_url: String) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl RemoteRuleSource for HttpRuleSource {
    async fn fetch(&self, fiscal_year: &str) -> Result<RuleSet, FetchError> {
        let url = format!("{}/{fiscal_year}.json", self.base_url);
        let response = self.client.get(&url).send().await?.error_for_status()?;
        let document = response.json::<RuleSet>().await?;
        if document.fiscal_year != fiscal_year {
            return Err(FetchError::Decode(format!(
                "document is for fiscal year {}, requested {fiscal_year}",
                document.fiscal_year
            )));
        }
        Ok(document)
    }
}

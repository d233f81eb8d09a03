pub mod error;
pub mod types;

pub use error::{ApifyError, Result};
pub use types::{RunData, Tweet, TweetAuthor, TweetPlace, TweetSearchInput};

use serde::de::DeserializeOwned;
use types::ApiResponse;

const BASE_URL: &str = "https://api.apify.com/v2";

/// Actor ID for apidojo/tweet-scraper.
const TWEET_SCRAPER: &str = "61RPP7dywgiy0JPD0";

/// Upper bound on long-poll rounds before a run is treated as stuck.
const MAX_POLLS: u32 = 30;

/// Pause after a failed poll (429, 5xx, network) before asking again.
const POLL_RETRY_DELAY: std::time::Duration = std::time::Duration::from_secs(5);

#[derive(Clone)]
pub struct ApifyClient {
    client: reqwest::Client,
    token: String,
    base_url: String,
}

impl ApifyClient {
    pub fn new(token: String) -> Self {
        Self::with_client(reqwest::Client::new(), token)
    }

    pub fn with_client(client: reqwest::Client, token: String) -> Self {
        Self {
            client,
            token,
            base_url: BASE_URL.to_string(),
        }
    }

    /// Point the client at a different API root (proxies, local fakes).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApifyError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Start a keyword search run. Returns immediately with run metadata.
    pub async fn start_tweet_search(&self, terms: &[String], max_items: u32) -> Result<RunData> {
        let input = TweetSearchInput {
            search_terms: terms.to_vec(),
            max_items,
            sort: "Latest".to_string(),
        };

        let url = format!("{}/acts/{}/runs", self.base_url, TWEET_SCRAPER);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&input)
            .send()
            .await?;

        let api_resp: ApiResponse<RunData> = Self::read_json(resp).await?;
        Ok(api_resp.data)
    }

    /// Poll until a run completes. Uses `waitForFinish=60` for efficient long-polling.
    pub async fn wait_for_run(&self, run_id: &str) -> Result<RunData> {
        for _ in 0..MAX_POLLS {
            let run = match self.poll_run(run_id).await {
                Ok(run) => run,
                Err(e) if e.is_transient() => {
                    tracing::warn!(run_id, error = %e, "Run poll failed, polling again");
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                    continue;
                }
                Err(e) => return Err(e),
            };
            match run.status.as_str() {
                "SUCCEEDED" => return Ok(run),
                "FAILED" | "ABORTED" | "TIMED-OUT" => {
                    return Err(ApifyError::RunFailed {
                        run_id: run_id.to_string(),
                        status: run.status,
                    });
                }
                _ => {
                    tracing::debug!(run_id, status = %run.status, "Run still in progress");
                }
            }
        }
        Err(ApifyError::RunFailed {
            run_id: run_id.to_string(),
            status: "STILL-RUNNING".to_string(),
        })
    }

    async fn poll_run(&self, run_id: &str) -> Result<RunData> {
        let url = format!("{}/actor-runs/{}?waitForFinish=60", self.base_url, run_id);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        let api_resp: ApiResponse<RunData> = Self::read_json(resp).await?;
        Ok(api_resp.data)
    }

    /// Fetch one page of dataset items.
    pub async fn dataset_page<T: DeserializeOwned>(
        &self,
        dataset_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<T>> {
        let url = format!(
            "{}/datasets/{}/items?format=json&clean=true&offset={}&limit={}",
            self.base_url, dataset_id, offset, limit
        );
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        Self::read_json(resp).await
    }

    /// Run a keyword search to completion and return the dataset holding its tweets.
    pub async fn search_tweets(&self, terms: &[String], max_items: u32) -> Result<RunData> {
        tracing::info!(terms = ?terms, max_items, "Starting X/Twitter keyword search");

        let run = self.start_tweet_search(terms, max_items).await?;
        tracing::info!(run_id = %run.id, "Apify run started, polling for completion");

        let completed = self.wait_for_run(&run.id).await?;
        tracing::info!(
            run_id = %completed.id,
            dataset_id = %completed.default_dataset_id,
            "Run completed"
        );
        Ok(completed)
    }
}

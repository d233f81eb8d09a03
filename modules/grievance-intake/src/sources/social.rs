use apify_client::{ApifyClient, ApifyError, Tweet};
use async_trait::async_trait;
use grievance_common::{GrievanceError, RawRecord, Result, SocialPost, SourceKind};
use tracing::{info, warn};

use super::{format_changed, unavailable, SourceAdapter, SourceBatch};

const ADAPTER_NAME: &str = "social";

/// Dataset items read per page.
const PAGE_SIZE: usize = 50;

/// Keyword search over X/Twitter through an Apify actor run.
///
/// The first page starts a run; later pages read its dataset. The cursor is
/// `dataset_id:offset`.
pub struct SocialScraper {
    client: ApifyClient,
    queries: Vec<String>,
    max_items: u32,
}

impl SocialScraper {
    pub fn new(client: ApifyClient, queries: Vec<String>, max_items: u32) -> Self {
        Self {
            client,
            queries,
            max_items,
        }
    }
}

fn source_error(err: ApifyError) -> GrievanceError {
    match err {
        ApifyError::Parse(_) => format_changed(ADAPTER_NAME, err),
        _ => unavailable(ADAPTER_NAME, err),
    }
}

fn parse_cursor(cursor: &str) -> Option<(&str, usize)> {
    let (dataset, offset) = cursor.rsplit_once(':')?;
    if dataset.is_empty() {
        return None;
    }
    Some((dataset, offset.parse().ok()?))
}

/// Map a dataset item to a raw post. Items without text are skipped.
pub fn tweet_to_post(tweet: Tweet) -> Option<SocialPost> {
    let text = tweet.content()?.to_string();
    let url = tweet.url.clone().or_else(|| {
        let user = tweet.author.as_ref()?.user_name.as_deref()?;
        let id = tweet.id.as_deref()?;
        Some(format!("https://x.com/{user}/status/{id}"))
    });
    Some(SocialPost {
        platform: "x".to_string(),
        post_id: tweet.id.clone(),
        url,
        author: tweet
            .author
            .as_ref()
            .and_then(|a| a.user_name.clone().or_else(|| a.name.clone())),
        place: tweet.place_name(),
        coordinates: None,
        hashtags: tweet.hashtags(),
        posted_at: tweet.posted_at(),
        text,
    })
}

#[async_trait]
impl SourceAdapter for SocialScraper {
    fn name(&self) -> &str {
        ADAPTER_NAME
    }

    fn kind(&self) -> SourceKind {
        SourceKind::SocialScrape
    }

    async fn fetch(&self, cursor: Option<&str>) -> Result<SourceBatch> {
        let resumed = match cursor {
            Some(raw) => {
                let parsed = parse_cursor(raw);
                if parsed.is_none() {
                    warn!(cursor = raw, "Unreadable social cursor, starting a new search");
                }
                parsed.map(|(dataset, offset)| (dataset.to_string(), offset))
            }
            None => None,
        };

        let (dataset_id, offset) = match resumed {
            Some(position) => position,
            None => {
                let run = self
                    .client
                    .search_tweets(&self.queries, self.max_items)
                    .await
                    .map_err(source_error)?;
                (run.default_dataset_id, 0)
            }
        };

        let tweets: Vec<Tweet> = self
            .client
            .dataset_page(&dataset_id, offset, PAGE_SIZE)
            .await
            .map_err(source_error)?;
        let fetched = tweets.len();
        let records: Vec<RawRecord> = tweets
            .into_iter()
            .filter_map(tweet_to_post)
            .map(RawRecord::Social)
            .collect();

        let next_cursor = (fetched == PAGE_SIZE).then(|| format!("{dataset_id}:{}", offset + fetched));
        info!(
            dataset_id = %dataset_id,
            offset,
            fetched,
            posts = records.len(),
            "Read social search results"
        );
        Ok(SourceBatch {
            records,
            next_cursor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_round_trips_dataset_and_offset() {
        assert_eq!(parse_cursor("aBc123:50"), Some(("aBc123", 50)));
        assert_eq!(parse_cursor(":50"), None);
        assert_eq!(parse_cursor("abc"), None);
        assert_eq!(parse_cursor("abc:x"), None);
    }

    #[test]
    fn tweet_without_url_gets_a_status_link() {
        let tweet: Tweet = serde_json::from_str(
            r#"{"id": "42", "text": "Sewage overflowing on MG Road for 3 days",
                "author": {"userName": "citizen"}}"#,
        )
        .unwrap();
        let post = tweet_to_post(tweet).unwrap();
        assert_eq!(post.url.as_deref(), Some("https://x.com/citizen/status/42"));
        assert_eq!(post.author.as_deref(), Some("citizen"));
        assert_eq!(post.platform, "x");
    }

    #[test]
    fn empty_tweets_are_skipped() {
        let tweet: Tweet = serde_json::from_str(r#"{"id": "43"}"#).unwrap();
        assert!(tweet_to_post(tweet).is_none());
    }

    #[test]
    fn parse_failures_mean_the_format_changed() {
        assert!(matches!(
            source_error(ApifyError::Parse("bad".into())),
            GrievanceError::SourceFormatChanged { .. }
        ));
        assert!(matches!(
            source_error(ApifyError::Network("reset".into())),
            GrievanceError::SourceUnavailable { .. }
        ));
    }
}

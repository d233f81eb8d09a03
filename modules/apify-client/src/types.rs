use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wrapper for Apify API responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

/// Input for X/Twitter keyword search via apidojo/tweet-scraper.
#[derive(Debug, Clone, Serialize)]
pub struct TweetSearchInput {
    #[serde(rename = "searchTerms")]
    pub search_terms: Vec<String>,
    #[serde(rename = "maxItems")]
    pub max_items: u32,
    /// "Latest" keeps results chronological so repeated runs overlap predictably.
    pub sort: String,
}

/// Author info nested inside a Tweet.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TweetAuthor {
    #[serde(rename = "userName")]
    pub user_name: Option<String>,
    pub name: Option<String>,
    pub location: Option<String>,
}

/// Geotag attached to a tweet, when the author shared one.
#[derive(Debug, Clone, Deserialize)]
pub struct TweetPlace {
    #[serde(rename = "fullName", alias = "full_name")]
    pub full_name: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TweetEntities {
    #[serde(default)]
    pub hashtags: Vec<TweetHashtag>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TweetHashtag {
    pub text: String,
}

/// A single tweet from the Apify dataset.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Tweet {
    pub id: Option<String>,
    pub text: Option<String>,
    #[serde(rename = "fullText", alias = "full_text")]
    pub full_text: Option<String>,
    pub url: Option<String>,
    #[serde(rename = "createdAt", alias = "created_at")]
    pub created_at: Option<String>,
    pub author: Option<TweetAuthor>,
    pub place: Option<TweetPlace>,
    pub entities: Option<TweetEntities>,
    #[serde(rename = "likeCount")]
    pub like_count: Option<i64>,
    #[serde(rename = "retweetCount")]
    pub retweet_count: Option<i64>,
}

impl Tweet {
    /// Returns whichever text field is populated, preferring `full_text`.
    pub fn content(&self) -> Option<&str> {
        self.full_text
            .as_deref()
            .or(self.text.as_deref())
            .filter(|t| !t.trim().is_empty())
    }

    /// X reports `created_at` as "Wed Oct 10 20:19:24 +0000 2018"; some actor
    /// versions emit RFC 3339 instead.
    pub fn posted_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.created_at.as_deref()?.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(dt) = DateTime::parse_from_str(raw, "%a %b %d %H:%M:%S %z %Y") {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
            .ok()
            .map(|naive| naive.and_utc())
    }

    pub fn hashtags(&self) -> Vec<String> {
        self.entities
            .as_ref()
            .map(|e| e.hashtags.iter().map(|h| h.text.clone()).collect())
            .unwrap_or_default()
    }

    /// Best available place text: the tweet's geotag, else the author's profile location.
    pub fn place_name(&self) -> Option<String> {
        self.place
            .as_ref()
            .and_then(|p| p.full_name.clone())
            .or_else(|| self.author.as_ref().and_then(|a| a.location.clone()))
            .filter(|p| !p.trim().is_empty())
    }
}

/// Apify actor run metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct RunData {
    pub id: String,
    pub status: String,
    #[serde(rename = "defaultDatasetId")]
    pub default_dataset_id: String,
    #[serde(rename = "startedAt")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(rename = "finishedAt")]
    pub finished_at: Option<DateTime<Utc>>,
}

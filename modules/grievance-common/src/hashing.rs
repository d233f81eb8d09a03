//! Text normalization and stable hashing used for fingerprints.
//!
//! Everything here is deterministic across processes and releases: fingerprints
//! are persisted in the store and compared on later runs.

use std::collections::BTreeSet;

use sha2::{Digest, Sha256};

use crate::types::Location;

/// Words too common to say anything about which grievance a title describes.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "at", "by", "for", "from", "in", "is", "of", "on", "or", "the", "to",
    "with",
];

/// Lowercase, replace punctuation with spaces, collapse whitespace.
pub fn normalize_text(text: &str) -> String {
    let mapped: String = text
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .to_lowercase();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalized, de-duplicated title tokens with stopwords removed.
pub fn title_tokens(title: &str) -> BTreeSet<String> {
    normalize_text(title)
        .split(' ')
        .filter(|t| !t.is_empty() && !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// Jaccard overlap of two token sets (0.0-1.0). Two empty sets share nothing.
pub fn token_overlap(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// SHA-256 over length-delimited parts, hex encoded.
pub fn stable_hash(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Hash of the normalized text, insensitive to case, punctuation and spacing.
pub fn content_hash(text: &str) -> String {
    stable_hash(&["content", &normalize_text(text)])
}

/// Comparable form of a location. Points are rounded to ~100m.
pub fn location_key(location: Option<&Location>) -> String {
    match location {
        None => String::new(),
        Some(Location::Place { text }) => normalize_text(text),
        Some(Location::Point { lat, lng }) => format!("{lat:.3},{lng:.3}"),
    }
}

/// Near-duplicate bucket: records can only merge when category and location agree.
pub fn bucket_key(category: &str, location: Option<&Location>) -> String {
    stable_hash(&["bucket", &normalize_text(category), &location_key(location)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_strips_punctuation_and_case() {
        assert_eq!(normalize_text("  Pothole -- on MAIN St.! "), "pothole on main st");
    }

    #[test]
    fn title_tokens_drop_stopwords() {
        let tokens = title_tokens("Pothole on the Main St");
        let expected: BTreeSet<String> =
            ["pothole", "main", "st"].iter().map(|s| s.to_string()).collect();
        assert_eq!(tokens, expected);
    }

    #[test]
    fn overlap_of_identical_titles_is_one() {
        let a = title_tokens("Garbage not collected in Dwarka");
        let b = title_tokens("garbage NOT collected, Dwarka");
        assert!((token_overlap(&a, &b) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn overlap_is_jaccard() {
        let a = title_tokens("water supply disruption sector 22");
        let b = title_tokens("water supply restored sector 22");
        // 4 shared of 6 distinct tokens
        assert!((token_overlap(&a, &b) - 4.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn overlap_of_empty_sets_is_zero() {
        assert_eq!(token_overlap(&BTreeSet::new(), &BTreeSet::new()), 0.0);
    }

    #[test]
    fn stable_hash_is_deterministic_and_delimited() {
        assert_eq!(stable_hash(&["a", "b"]), stable_hash(&["a", "b"]));
        assert_ne!(stable_hash(&["ab", ""]), stable_hash(&["a", "b"]));
        assert_eq!(stable_hash(&["x"]).len(), 64);
    }

    #[test]
    fn content_hash_ignores_formatting() {
        assert_eq!(
            content_hash("Street light  not working!"),
            content_hash("street light not working")
        );
    }

    #[test]
    fn nearby_points_share_a_bucket() {
        let a = Location::Point { lat: 28.61391, lng: 77.20902 };
        let b = Location::Point { lat: 28.61394, lng: 77.20899 };
        assert_eq!(bucket_key("Roads", Some(&a)), bucket_key("roads", Some(&b)));
    }

    #[test]
    fn different_places_split_buckets() {
        assert_ne!(
            bucket_key("roads", Some(&Location::place("Karol Bagh"))),
            bucket_key("roads", Some(&Location::place("Dwarka")))
        );
    }
}

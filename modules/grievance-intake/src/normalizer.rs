//! Raw source records to canonical drafts.

use chrono::{DateTime, Utc};
use grievance_common::{
    GrievanceDraft, GrievanceError, Location, MunicipalityListing, PortalEntry, RawRecord, Result,
    SocialPost, SourceKind, SubmissionForm, Submitter, DEFAULT_CATEGORY,
};

/// Generated titles are cut to this many characters.
const TITLE_MAX_CHARS: usize = 50;

/// Social posts shorter than this rarely describe an actual grievance.
const MIN_SOCIAL_TEXT_CHARS: usize = 20;

const TRACKING_PARAMS: &[&str] = &[
    "_dt", "fbclid", "gclid", "utm_source", "utm_medium", "utm_campaign", "utm_term",
    "utm_content", "modal", "ref", "ref_src", "s", "t", "mc_cid", "mc_eid",
];

/// Map any raw record to a draft, stamping it as observed at `observed_at`.
pub fn normalize(raw: RawRecord, observed_at: DateTime<Utc>) -> Result<GrievanceDraft> {
    match raw {
        RawRecord::UserSubmission(form) => from_submission(form, observed_at),
        RawRecord::Municipality(listing) => from_listing(listing, observed_at),
        RawRecord::Portal(entry) => from_portal(entry, observed_at),
        RawRecord::Social(post) => from_social(post, observed_at),
    }
}

fn from_submission(form: SubmissionForm, observed_at: DateTime<Utc>) -> Result<GrievanceDraft> {
    let description = required_description(&form.description)?;
    let place = [&form.city, &form.state, &form.country]
        .into_iter()
        .filter_map(|part| clean(part.as_deref()))
        .collect::<Vec<_>>()
        .join(", ");
    let submitter = Submitter {
        name: clean(form.name.as_deref()),
        email: clean(form.email.as_deref()).map(|e| e.to_lowercase()),
        phone: clean(form.phone.as_deref()),
    };

    Ok(GrievanceDraft {
        source: SourceKind::UserSubmission,
        source_ref: String::new(),
        title: title_or_fallback(form.heading.as_deref(), &description),
        category: category_or_default(form.category.as_deref()),
        location: (!place.is_empty()).then(|| Location::place(place)),
        submitter: (!submitter.is_empty()).then_some(submitter),
        description,
        reported_at: observed_at,
        observed_at,
    })
}

fn from_listing(listing: MunicipalityListing, observed_at: DateTime<Utc>) -> Result<GrievanceDraft> {
    let description = required_description(&listing.body)?;
    let source_ref = match clean(listing.listing_id.as_deref()) {
        Some(id) => format!("{}#{}", sanitize_url(&listing.page_url), id),
        None => String::new(),
    };
    Ok(GrievanceDraft {
        source: SourceKind::MunicipalityScrape,
        source_ref,
        title: title_or_fallback(listing.heading.as_deref(), &description),
        category: category_or_default(listing.category.as_deref()),
        location: clean(listing.locality.as_deref()).map(Location::place),
        submitter: None,
        description,
        reported_at: reported_at(listing.posted_at, observed_at),
        observed_at,
    })
}

fn from_portal(entry: PortalEntry, observed_at: DateTime<Utc>) -> Result<GrievanceDraft> {
    let description = required_description(&entry.details)?;
    let source_ref = match clean(entry.complaint_id.as_deref()) {
        Some(id) => format!("{}/{}", collapse_whitespace(&entry.portal), id),
        None => String::new(),
    };
    Ok(GrievanceDraft {
        source: SourceKind::PortalScrape,
        source_ref,
        title: title_or_fallback(entry.title.as_deref(), &description),
        category: category_or_default(entry.department.as_deref()),
        location: clean(entry.area.as_deref()).map(Location::place),
        submitter: None,
        description,
        reported_at: reported_at(entry.filed_at, observed_at),
        observed_at,
    })
}

fn from_social(post: SocialPost, observed_at: DateTime<Utc>) -> Result<GrievanceDraft> {
    let description = required_description(&post.text)?;
    if description.chars().count() < MIN_SOCIAL_TEXT_CHARS {
        return Err(GrievanceError::Normalization(format!(
            "post too short to describe a grievance ({} chars)",
            description.chars().count()
        )));
    }

    let source_ref = match (clean(post.url.as_deref()), clean(post.post_id.as_deref())) {
        (Some(url), _) => sanitize_url(&url),
        (None, Some(id)) => format!("{}:{}", post.platform, id),
        (None, None) => String::new(),
    };
    let location = match post.coordinates {
        Some((lat, lng)) if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng) => {
            Some(Location::Point { lat, lng })
        }
        _ => clean(post.place.as_deref()).map(Location::place),
    };

    Ok(GrievanceDraft {
        source: SourceKind::SocialScrape,
        source_ref,
        title: title_or_fallback(None, &description),
        category: DEFAULT_CATEGORY.to_string(),
        location,
        submitter: None,
        description,
        reported_at: reported_at(post.posted_at, observed_at),
        observed_at,
    })
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Trimmed, whitespace-collapsed value, or `None` when blank.
fn clean(value: Option<&str>) -> Option<String> {
    value.map(collapse_whitespace).filter(|v| !v.is_empty())
}

fn required_description(text: &str) -> Result<String> {
    let description = collapse_whitespace(text);
    if description.is_empty() {
        return Err(GrievanceError::Normalization(
            "description is empty".to_string(),
        ));
    }
    Ok(description)
}

fn category_or_default(category: Option<&str>) -> String {
    clean(category).unwrap_or_else(|| DEFAULT_CATEGORY.to_string())
}

/// Source timestamps in the future are clamped to ingestion time.
fn reported_at(at: Option<DateTime<Utc>>, observed_at: DateTime<Utc>) -> DateTime<Utc> {
    at.map_or(observed_at, |at| at.min(observed_at))
}

/// The given title, or the first sentence of the description, bounded.
fn title_or_fallback(title: Option<&str>, description: &str) -> String {
    if let Some(title) = clean(title) {
        return title;
    }
    let first_sentence = description
        .split_inclusive(['.', '!', '?', '\n'])
        .next()
        .unwrap_or(description)
        .trim()
        .trim_end_matches(['.', '!', '?'])
        .to_string();
    truncate_chars(&first_sentence, TITLE_MAX_CHARS)
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{}...", cut.trim_end())
}

/// Strip tracking parameters from URLs that may contain PII or cause dedup mismatches.
pub fn sanitize_url(url: &str) -> String {
    let Ok(mut parsed) = url::Url::parse(url) else {
        return url.to_string();
    };
    parsed.set_fragment(None);

    if parsed.query().is_none() {
        return parsed.to_string();
    }

    let clean_pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| !TRACKING_PARAMS.contains(&key.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if clean_pairs.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(clean_pairs);
    }

    parsed.to_string()
}

//! Result normalization for scholar search responses.
//!
//! The upstream JSON shape depends on the engine and query: author data may
//! live under any of several top-level keys, or be missing entirely. Each
//! extractor probes an ordered key list and uses the first key that yields
//! records. Later keys are ignored once one matches. Missing keys are "no
//! results", never an error.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

/// Keys probed for author candidates, in order
pub const AUTHOR_RESULT_KEYS: &[&str] = &["author_results", "scholar_results", "organic_results"];

/// Keys probed for publications, in order. `articles` is what the
/// author-profile engine returns.
pub const PUBLICATION_RESULT_KEYS: &[&str] = &[
    "articles",
    "scholar_results",
    "organic_results",
    "inline_people_also_search_for",
];

/// Keys probed for publications embedded inside a raw author item
pub const EMBEDDED_PUBLICATION_KEYS: &[&str] = &[
    "publications",
    "publication_results",
    "scholar_results",
    "organic_results",
];

/// Cap on embedded publications taken from one author item
pub const MAX_EMBEDDED_PUBLICATIONS: usize = 5;

static YEAR_REGEX: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\b(19|20)\d{2}\b").ok());

/// A person-like record pulled out of a search response, not yet validated
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AuthorCandidate {
    pub name: Option<String>,
    pub affiliation: Option<String>,
    pub profile_ref: Option<String>,
    pub snippet: Option<String>,
    /// Original item, kept for heuristics that need to look deeper
    pub raw: Value,
}

/// A publication record pulled out of a search response, not yet validated
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PublicationCandidate {
    pub title: Option<String>,
    pub year: Option<i32>,
    pub link: Option<String>,
    pub snippet: Option<String>,
    pub authors: Option<String>,
    pub journal: Option<String>,
    pub citation_count: Option<i64>,
    pub raw: Value,
}

/// Profile metadata from an author-profile document
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AuthorProfile {
    pub name: Option<String>,
    pub affiliation: Option<String>,
    pub email: Option<String>,
    pub photo_url: Option<String>,
    pub interests: Option<String>,
    pub citations: Option<i64>,
    pub h_index: Option<i64>,
    pub i10_index: Option<i64>,
}

/// Extract author candidates from a raw search response.
pub fn extract_authors(doc: &Value) -> Vec<AuthorCandidate> {
    first_match(doc, AUTHOR_RESULT_KEYS, normalize_author)
}

/// Extract publications from a raw search or author-profile response.
pub fn extract_publications(doc: &Value) -> Vec<PublicationCandidate> {
    first_match(doc, PUBLICATION_RESULT_KEYS, normalize_publication)
}

/// Extract publications embedded in a raw author item, capped at
/// [`MAX_EMBEDDED_PUBLICATIONS`].
pub fn extract_embedded_publications(raw: &Value) -> Vec<PublicationCandidate> {
    let mut pubs = first_match(raw, EMBEDDED_PUBLICATION_KEYS, normalize_publication);
    pubs.truncate(MAX_EMBEDDED_PUBLICATIONS);
    pubs
}

/// Probe `keys` in order; the first non-empty array ends the probe, even if
/// none of its items normalize.
fn first_match<T>(doc: &Value, keys: &[&str], normalize: fn(&Value) -> Option<T>) -> Vec<T> {
    for key in keys {
        let Some(Value::Array(items)) = doc.get(key) else {
            continue;
        };
        if items.is_empty() {
            continue;
        }

        let records: Vec<T> = items.iter().filter_map(normalize).collect();
        debug!(key = *key, items = items.len(), count = records.len(), "Matched result block");
        return records;
    }

    Vec::new()
}

fn normalize_author(item: &Value) -> Option<AuthorCandidate> {
    item.as_object()?;
    Some(AuthorCandidate {
        name: str_field(item, &["author", "title", "name"]),
        affiliation: str_field(item, &["affiliation", "publication"]),
        profile_ref: str_field(item, &["profile_link", "link"]),
        snippet: str_field(item, &["snippet", "description"]),
        raw: item.clone(),
    })
}

fn normalize_publication(item: &Value) -> Option<PublicationCandidate> {
    item.as_object()?;

    let snippet = str_field(item, &["snippet", "description"]);
    let title = str_field(item, &["title", "publication", "snippet"]);
    let summary = item
        .get("publication_info")
        .and_then(|info| str_field(info, &["summary"]));

    // `publication` is the venue only when `title` supplied the title
    let venue = if str_field(item, &["title"]).is_some() {
        str_field(item, &["publication", "journal"])
    } else {
        None
    };
    let journal = venue.or_else(|| summary.as_deref().and_then(venue_from_summary));

    let authors = str_field(item, &["authors"])
        .or_else(|| authors_from_info(item))
        .or_else(|| summary.as_deref().and_then(authors_from_summary));

    Some(PublicationCandidate {
        year: extract_year(item, snippet.as_deref()),
        link: str_field(item, &["link", "source_url", "url", "pub_url"]),
        citation_count: citation_count(item),
        title,
        snippet,
        authors,
        journal,
        raw: item.clone(),
    })
}

/// Best-effort year: structured fields first, then the first 19xx/20xx token
/// of the snippet.
pub fn extract_year(item: &Value, snippet: Option<&str>) -> Option<i32> {
    let structured = item
        .get("publication_info")
        .filter(|info| info.is_object())
        .and_then(|info| {
            info.get("year")
                .and_then(value_to_year)
                .or_else(|| info.get("pub_year").and_then(value_to_year))
        })
        .or_else(|| item.get("year").and_then(value_to_year))
        .or_else(|| item.get("publication_year").and_then(value_to_year));

    structured.or_else(|| snippet.and_then(year_from_text))
}

/// First standalone 4-digit token starting with 19 or 20.
pub fn year_from_text(text: &str) -> Option<i32> {
    YEAR_REGEX
        .as_ref()?
        .find(text)
        .and_then(|m| m.as_str().parse().ok())
}

fn value_to_year(val: &Value) -> Option<i32> {
    let year = match val {
        Value::Number(n) => n.as_i64().and_then(|n| i32::try_from(n).ok()),
        Value::String(s) => s.trim().parse::<i32>().ok(),
        _ => None,
    }?;
    (year > 0).then_some(year)
}

/// Extract profile metadata from an author-profile document.
///
/// Returns `None` when the document carries no `author` object.
pub fn extract_profile(doc: &Value) -> Option<AuthorProfile> {
    let author = doc.get("author").filter(|a| a.is_object())?;

    let interests = author
        .get("interests")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|i| str_field(i, &["title"]).or_else(|| i.as_str().map(str::to_string)))
                .collect::<Vec<_>>()
                .join(", ")
        })
        .filter(|s| !s.is_empty());

    let email = str_field(author, &["email"]).filter(|e| e.contains('@'));

    let mut profile = AuthorProfile {
        name: str_field(author, &["name"]),
        affiliation: str_field(author, &["affiliations", "affiliation"]),
        email,
        photo_url: str_field(author, &["thumbnail", "photo"]),
        interests,
        ..Default::default()
    };

    if let Some(table) = doc
        .get("cited_by")
        .and_then(|c| c.get("table"))
        .and_then(Value::as_array)
    {
        for row in table {
            if let Some(v) = row.get("citations").and_then(|c| c.get("all")) {
                profile.citations = value_to_i64(v);
            }
            if let Some(v) = row.get("h_index").and_then(|c| c.get("all")) {
                profile.h_index = value_to_i64(v);
            }
            if let Some(v) = row.get("i10_index").and_then(|c| c.get("all")) {
                profile.i10_index = value_to_i64(v);
            }
        }
    }

    Some(profile)
}

/// First non-blank string among `keys`
fn str_field(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| item.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn value_to_i64(val: &Value) -> Option<i64> {
    match val {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().replace(',', "").parse().ok(),
        _ => None,
    }
}

fn citation_count(item: &Value) -> Option<i64> {
    item.get("cited_by")
        .and_then(|c| c.get("value"))
        .and_then(value_to_i64)
        .or_else(|| {
            item.get("inline_links")
                .and_then(|l| l.get("cited_by"))
                .and_then(|c| c.get("total"))
                .and_then(value_to_i64)
        })
}

fn authors_from_info(item: &Value) -> Option<String> {
    let names: Vec<String> = item
        .get("publication_info")?
        .get("authors")?
        .as_array()?
        .iter()
        .filter_map(|a| str_field(a, &["name"]))
        .collect();
    (!names.is_empty()).then(|| names.join(", "))
}

/// "J Smith, A Doe - Journal of X, 2019 - publisher.com" -> "J Smith, A Doe"
fn authors_from_summary(summary: &str) -> Option<String> {
    let parts: Vec<&str> = summary.split(" - ").collect();
    if parts.len() < 2 {
        return None;
    }
    let authors = parts[0].trim();
    (!authors.is_empty()).then(|| authors.to_string())
}

/// "J Smith - Journal of X, 2019 - publisher.com" -> "Journal of X"
fn venue_from_summary(summary: &str) -> Option<String> {
    let parts: Vec<&str> = summary.split(" - ").collect();
    let venue_year = parts.get(1)?;

    let venue = match YEAR_REGEX.as_ref().and_then(|re| re.find(venue_year)) {
        Some(year_match) => venue_year[..year_match.start()].trim().trim_end_matches(','),
        None => venue_year.trim(),
    };
    let venue = venue.trim();
    (!venue.is_empty()).then(|| venue.to_string())
}

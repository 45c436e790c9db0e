//! Heuristic person filter.
//!
//! Rejects candidates that look like institutions, department listings or
//! publication titles rather than individuals. The rules are an ordered list
//! of independent predicates evaluated left to right; the first rejection
//! wins. Thresholds are part of the data-quality contract, keep them exact.

use crate::normalize::AuthorCandidate;
use std::fmt;

/// Punctuation typical of a publication title rather than a name
pub const TITLE_PUNCTUATION: &[char] = &[':', ',', ';', '(', ')', '–', '—', '"', '“', '”'];

/// Filter thresholds and token lists
#[derive(Debug, Clone)]
pub struct FilterConfig {
    /// Exact names (case-insensitive) of the institution itself
    pub institution_aliases: Vec<String>,
    /// Lowercase tokens that mark institutional/structural results
    pub blocklist: Vec<String>,
    /// Maximum name length in characters
    pub max_name_len: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            institution_aliases: ["Catholic University of America", "The Catholic University of America", "CUA"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            blocklist: [
                "university",
                "college",
                "department",
                "faculty",
                "institute",
                "center",
                "laboratory",
                "program",
                "project",
                "catholic",
                "school",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            max_name_len: 60,
        }
    }
}

/// Why a candidate was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    MissingName,
    InstitutionAlias,
    InstitutionalToken,
    SingleTokenWithoutProfile,
    AllUpperCase,
    TooLong,
    TitlePunctuation,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::MissingName => "missing name",
            Self::InstitutionAlias => "institution alias",
            Self::InstitutionalToken => "institutional token",
            Self::SingleTokenWithoutProfile => "single-token name without profile link",
            Self::AllUpperCase => "all upper-case",
            Self::TooLong => "name too long",
            Self::TitlePunctuation => "title punctuation",
        };
        write!(f, "{label}")
    }
}

/// Outcome of classifying one candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject(RejectReason),
}

impl Verdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, Verdict::Accept)
    }
}

/// A single rejection rule
pub type Predicate = fn(&AuthorCandidate, &FilterConfig) -> Option<RejectReason>;

/// Rules in evaluation order
pub const PREDICATES: &[Predicate] = &[
    missing_or_alias,
    institutional_token,
    single_token_without_profile,
    all_upper_case,
    title_like,
];

/// Run the predicate chain, short-circuiting on the first rejection.
pub fn classify(candidate: &AuthorCandidate, config: &FilterConfig) -> Verdict {
    PREDICATES
        .iter()
        .find_map(|rule| rule(candidate, config))
        .map_or(Verdict::Accept, Verdict::Reject)
}

fn name_of(candidate: &AuthorCandidate) -> &str {
    candidate.name.as_deref().map(str::trim).unwrap_or("")
}

/// Rule 1: empty name, or exactly the institution itself
pub fn missing_or_alias(candidate: &AuthorCandidate, config: &FilterConfig) -> Option<RejectReason> {
    let name = name_of(candidate);
    if name.is_empty() {
        return Some(RejectReason::MissingName);
    }
    config
        .institution_aliases
        .iter()
        .any(|alias| alias.eq_ignore_ascii_case(name))
        .then_some(RejectReason::InstitutionAlias)
}

/// Rule 2: lowercased name contains a blocklisted token
pub fn institutional_token(candidate: &AuthorCandidate, config: &FilterConfig) -> Option<RejectReason> {
    let lower = name_of(candidate).to_lowercase();
    config
        .blocklist
        .iter()
        .any(|tok| lower.contains(tok.as_str()))
        .then_some(RejectReason::InstitutionalToken)
}

/// Rule 3: fewer than two tokens, unless a profile link vouches for it
pub fn single_token_without_profile(
    candidate: &AuthorCandidate,
    _config: &FilterConfig,
) -> Option<RejectReason> {
    let tokens = name_of(candidate).split_whitespace().count();
    let has_profile = candidate
        .profile_ref
        .as_deref()
        .is_some_and(|r| !r.trim().is_empty());
    (tokens < 2 && !has_profile).then_some(RejectReason::SingleTokenWithoutProfile)
}

/// Rule 4: every letter is upper-case (headers, acronyms)
pub fn all_upper_case(candidate: &AuthorCandidate, _config: &FilterConfig) -> Option<RejectReason> {
    let mut letters = name_of(candidate).chars().filter(|c| c.is_alphabetic()).peekable();
    if letters.peek().is_none() {
        return None;
    }
    letters
        .all(|c| c.is_uppercase())
        .then_some(RejectReason::AllUpperCase)
}

/// Rule 5: too long, or carries title punctuation
pub fn title_like(candidate: &AuthorCandidate, config: &FilterConfig) -> Option<RejectReason> {
    let name = name_of(candidate);
    if name.chars().count() > config.max_name_len {
        return Some(RejectReason::TooLong);
    }
    name.contains(TITLE_PUNCTUATION)
        .then_some(RejectReason::TitlePunctuation)
}

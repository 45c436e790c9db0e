//! Stored entities and their insert shapes.

use crate::error::{OptionExt, Result};
use crate::normalize::{AuthorCandidate, AuthorProfile, PublicationCandidate};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Organization unit a professor belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Department {
    pub id: i64,
    pub name: String,
    pub description: String,
}

/// Stored academic profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Professor {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub department_id: i64,
    pub interests: String,
    pub profile_ref: Option<String>,
    pub affiliation: Option<String>,
    pub snippet: Option<String>,
    pub profile_photo: Option<String>,
    pub citations: Option<i64>,
    pub h_index: Option<i64>,
    pub i10_index: Option<i64>,
}

/// Stored publication, owned by one professor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Paper {
    pub id: i64,
    pub title: String,
    #[sqlx(rename = "abstract")]
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub publication_year: Option<i32>,
    pub professor_id: i64,
    pub url: Option<String>,
    pub snippet: Option<String>,
    pub citation_count: Option<i64>,
    pub authors: Option<String>,
    pub journal: Option<String>,
}

/// Professor row joined with its department name
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ProfessorListing {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub professor: Professor,
    pub department_name: String,
}

/// Professor with department name and every paper, in storage order
#[derive(Debug, Clone, Serialize)]
pub struct ProfessorWithPapers {
    #[serde(flatten)]
    pub professor: Professor,
    pub department_name: String,
    pub papers: Vec<Paper>,
}

/// Insert/update shape for a professor (department is passed separately)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewProfessor {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub interests: String,
    #[serde(default)]
    pub profile_ref: Option<String>,
    #[serde(default)]
    pub affiliation: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub profile_photo: Option<String>,
    #[serde(default)]
    pub citations: Option<i64>,
    #[serde(default)]
    pub h_index: Option<i64>,
    #[serde(default)]
    pub i10_index: Option<i64>,
}

impl NewProfessor {
    /// Build from a filtered candidate. A missing name is a validation error.
    pub fn from_candidate(candidate: &AuthorCandidate) -> Result<Self> {
        let name = candidate
            .name
            .as_deref()
            .map(collapse_whitespace)
            .filter(|n| !n.is_empty())
            .ok_or_validation("candidate has no name")?;

        Ok(Self {
            name,
            interests: candidate.snippet.clone().unwrap_or_default(),
            profile_ref: candidate.profile_ref.clone(),
            affiliation: candidate.affiliation.clone(),
            snippet: candidate.snippet.clone(),
            ..Default::default()
        })
    }

    /// Fold in metadata from the author-profile document
    pub fn apply_profile(&mut self, profile: &AuthorProfile) {
        if let Some(ref interests) = profile.interests {
            self.interests = interests.clone();
        }
        if profile.email.is_some() {
            self.email = profile.email.clone();
        }
        if self.affiliation.is_none() {
            self.affiliation = profile.affiliation.clone();
        }
        self.profile_photo = profile.photo_url.clone().or(self.profile_photo.take());
        self.citations = profile.citations.or(self.citations);
        self.h_index = profile.h_index.or(self.h_index);
        self.i10_index = profile.i10_index.or(self.i10_index);
    }

    /// Trim and collapse the name; reject a blank one
    pub fn validate(mut self) -> Result<Self> {
        self.name = collapse_whitespace(&self.name);
        if self.name.is_empty() {
            return Err(crate::ProfilesError::Validation("professor name is required".to_string()));
        }
        Ok(self)
    }
}

/// Insert/update shape for a paper (owner is passed separately)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewPaper {
    pub title: String,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub publication_year: Option<i32>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub citation_count: Option<i64>,
    #[serde(default)]
    pub authors: Option<String>,
    #[serde(default)]
    pub journal: Option<String>,
}

impl NewPaper {
    /// Build from a normalized publication. A missing title is a validation error.
    pub fn from_candidate(candidate: &PublicationCandidate) -> Result<Self> {
        let title = candidate
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_validation("publication has no title")?
            .to_string();

        Ok(Self {
            title,
            abstract_text: candidate.snippet.clone(),
            publication_year: candidate.year,
            url: candidate.link.clone(),
            snippet: candidate.snippet.clone(),
            citation_count: candidate.citation_count,
            authors: candidate.authors.clone(),
            journal: candidate.journal.clone(),
        })
    }

    /// Trim the title; reject a blank one
    pub fn validate(mut self) -> Result<Self> {
        self.title = self.title.trim().to_string();
        if self.title.is_empty() {
            return Err(crate::ProfilesError::Validation("paper title is required".to_string()));
        }
        Ok(self)
    }
}

/// Trim and collapse internal whitespace runs to one space
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProfilesError;

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  Jane \t  Roe \n"), "Jane Roe");
        assert_eq!(collapse_whitespace("   "), "");
    }

    #[test]
    fn test_professor_from_candidate() -> Result<()> {
        let candidate = AuthorCandidate {
            name: Some(" Jane   Roe ".to_string()),
            affiliation: Some("Physics, CUA".to_string()),
            profile_ref: Some("https://x/?user=1".to_string()),
            snippet: Some("Optics".to_string()),
            raw: serde_json::Value::Null,
        };
        let p = NewProfessor::from_candidate(&candidate)?;
        assert_eq!(p.name, "Jane Roe");
        assert_eq!(p.interests, "Optics");
        assert_eq!(p.profile_ref.as_deref(), Some("https://x/?user=1"));

        let nameless = AuthorCandidate::default();
        assert!(matches!(
            NewProfessor::from_candidate(&nameless),
            Err(ProfilesError::Validation(_))
        ));
        Ok(())
    }

    #[test]
    fn test_apply_profile_prefers_profile_metrics() -> Result<()> {
        let mut p = NewProfessor {
            name: "Jane Roe".to_string(),
            interests: "snippet text".to_string(),
            ..Default::default()
        };
        p.apply_profile(&AuthorProfile {
            interests: Some("Optics, Lasers".to_string()),
            citations: Some(10),
            h_index: Some(2),
            i10_index: Some(1),
            photo_url: Some("https://x/p.jpg".to_string()),
            ..Default::default()
        });
        assert_eq!(p.interests, "Optics, Lasers");
        assert_eq!(p.citations, Some(10));
        assert_eq!(p.profile_photo.as_deref(), Some("https://x/p.jpg"));
        Ok(())
    }

    #[test]
    fn test_paper_requires_title() {
        let untitled = PublicationCandidate {
            title: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            NewPaper::from_candidate(&untitled),
            Err(ProfilesError::Validation(_))
        ));
    }
}

//! Deduplication and upsert of imported profiles.
//!
//! Professors are matched by case-insensitive name, optionally scoped to a
//! department; callers choose the scope and what happens to a match. Papers
//! are insert-only on (professor, title): an existing title is never touched.
//! Each professor plus its papers is written in one transaction.

use crate::db::Database;
use crate::error::{ProfilesError, Result};
use crate::models::{collapse_whitespace, NewPaper, NewProfessor, Professor};
use crate::repository::{insert_paper, insert_professor};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, instrument};

/// Which records count as "the same professor"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DedupScope {
    /// Case-insensitive name across all departments
    Name,
    /// Case-insensitive name within the target department
    #[default]
    NameAndDepartment,
}

/// What to do when the professor already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpsertPolicy {
    /// Leave the stored record untouched
    #[default]
    Skip,
    /// Replace affiliation, snippet, profile and metric fields
    Overwrite,
}

impl FromStr for DedupScope {
    type Err = ProfilesError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "name" => Ok(Self::Name),
            "name-department" | "name-and-department" => Ok(Self::NameAndDepartment),
            other => Err(ProfilesError::Config(format!("unknown dedup scope '{other}'"))),
        }
    }
}

impl FromStr for UpsertPolicy {
    type Err = ProfilesError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "skip" => Ok(Self::Skip),
            "overwrite" => Ok(Self::Overwrite),
            other => Err(ProfilesError::Config(format!("unknown upsert policy '{other}'"))),
        }
    }
}

/// Result of upserting one professor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "id", rename_all = "snake_case")]
pub enum UpsertOutcome {
    Created(i64),
    Updated(i64),
    Skipped(i64),
}

impl UpsertOutcome {
    pub fn professor_id(&self) -> i64 {
        match *self {
            Self::Created(id) | Self::Updated(id) | Self::Skipped(id) => id,
        }
    }
}

impl fmt::Display for UpsertOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created(id) => write!(f, "created (id={id})"),
            Self::Updated(id) => write!(f, "updated (id={id})"),
            Self::Skipped(id) => write!(f, "skipped existing (id={id})"),
        }
    }
}

/// What one transactional unit wrote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UnitReport {
    pub outcome: UpsertOutcome,
    pub papers_added: usize,
    pub papers_skipped: usize,
}

/// Look up an existing professor by case-insensitive, whitespace-collapsed name.
pub async fn find_existing_professor(
    conn: &mut SqliteConnection,
    name: &str,
    department_id: i64,
    scope: DedupScope,
) -> Result<Option<Professor>> {
    let name = collapse_whitespace(name);
    let row = match scope {
        DedupScope::Name => {
            sqlx::query_as::<_, Professor>(
                "SELECT * FROM professors WHERE lower(name) = lower(?) ORDER BY id LIMIT 1",
            )
            .bind(&name)
            .fetch_optional(&mut *conn)
            .await?
        }
        DedupScope::NameAndDepartment => {
            sqlx::query_as::<_, Professor>(
                "SELECT * FROM professors WHERE lower(name) = lower(?) AND department_id = ? ORDER BY id LIMIT 1",
            )
            .bind(&name)
            .bind(department_id)
            .fetch_optional(&mut *conn)
            .await?
        }
    };
    Ok(row)
}

/// Create the professor, or apply `policy` to the existing match.
pub async fn upsert_professor(
    conn: &mut SqliteConnection,
    department_id: i64,
    professor: &NewProfessor,
    scope: DedupScope,
    policy: UpsertPolicy,
) -> Result<UpsertOutcome> {
    let professor = professor.clone().validate()?;

    let Some(existing) = find_existing_professor(conn, &professor.name, department_id, scope).await? else {
        let created = insert_professor(conn, department_id, &professor).await?;
        return Ok(UpsertOutcome::Created(created.id));
    };

    match policy {
        UpsertPolicy::Skip => Ok(UpsertOutcome::Skipped(existing.id)),
        UpsertPolicy::Overwrite => {
            sqlx::query(
                r"UPDATE professors
                  SET affiliation = ?, snippet = ?, profile_ref = ?, profile_photo = ?,
                      interests = ?, citations = ?, h_index = ?, i10_index = ?,
                      email = coalesce(?, email)
                  WHERE id = ?",
            )
            .bind(&professor.affiliation)
            .bind(&professor.snippet)
            .bind(&professor.profile_ref)
            .bind(&professor.profile_photo)
            .bind(&professor.interests)
            .bind(professor.citations)
            .bind(professor.h_index)
            .bind(professor.i10_index)
            .bind(&professor.email)
            .bind(existing.id)
            .execute(&mut *conn)
            .await?;
            Ok(UpsertOutcome::Updated(existing.id))
        }
    }
}

/// Insert the paper unless the professor already has one with this title.
///
/// Returns `false` when skipped. A unique-key race counts as skipped.
pub async fn insert_paper_if_absent(
    conn: &mut SqliteConnection,
    professor_id: i64,
    paper: &NewPaper,
) -> Result<bool> {
    let paper = paper.clone().validate()?;

    let exists: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM papers WHERE professor_id = ? AND lower(title) = lower(?) LIMIT 1")
            .bind(professor_id)
            .bind(&paper.title)
            .fetch_optional(&mut *conn)
            .await?;
    if exists.is_some() {
        return Ok(false);
    }

    match insert_paper(conn, professor_id, &paper).await {
        Ok(_) => Ok(true),
        Err(ProfilesError::PersistenceConflict(msg)) => {
            debug!(professor_id, title = %paper.title, %msg, "Paper inserted concurrently, skipping");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Write one professor and its papers in a single transaction.
///
/// A failure rolls back this unit only; earlier units stay committed.
#[instrument(skip(db, professor, papers), fields(name = %professor.name, papers = papers.len()))]
pub async fn import_unit(
    db: &Database,
    department_id: i64,
    professor: &NewProfessor,
    papers: &[NewPaper],
    scope: DedupScope,
    policy: UpsertPolicy,
) -> Result<UnitReport> {
    let mut tx = db.pool().begin().await?;

    let outcome = upsert_professor(&mut tx, department_id, professor, scope, policy).await?;
    let professor_id = outcome.professor_id();

    let mut papers_added = 0;
    let mut papers_skipped = 0;
    for paper in papers {
        if insert_paper_if_absent(&mut tx, professor_id, paper).await? {
            papers_added += 1;
        } else {
            papers_skipped += 1;
        }
    }

    tx.commit().await?;

    info!(%outcome, papers_added, papers_skipped, "Unit committed");
    Ok(UnitReport {
        outcome,
        papers_added,
        papers_skipped,
    })
}

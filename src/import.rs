//! Import pipeline: search → normalize → filter → dedup/upsert.
//!
//! Strictly sequential. Each accepted candidate is one unit of work: its
//! publications are gathered first (network, outside any transaction), then
//! the professor and papers are written together. A recoverable failure skips
//! the unit and the batch continues.

use crate::error::{ProfilesError, Result};
use crate::models::{NewPaper, NewProfessor};
use crate::normalize::{self, AuthorCandidate, PublicationCandidate};
use crate::person_filter::{classify, FilterConfig, Verdict};
use crate::repository::Store;
use crate::serpapi::SerpApiClient;
use crate::upsert::{self, DedupScope, UpsertOutcome, UpsertPolicy};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Department name used when nothing better can be derived
pub const UNKNOWN_DEPARTMENT: &str = "Unknown";

/// Where the department for imported professors comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepartmentSource {
    /// One department; query is `"{name} {affiliation hint}"`
    Named(String),
    /// Every department already stored, one query each
    AllKnown,
    /// One query for the institution; each candidate's department is the text
    /// before the first comma of its affiliation or snippet
    FromAffiliation { fallback: String },
}

/// Options for one import run
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub department: DepartmentSource,
    /// Replaces the derived search query
    pub query_override: Option<String>,
    /// Max author results per query
    pub limit: usize,
    /// Pause between searches and after each candidate that issued a request
    pub delay: Duration,
    /// Search, filter and check existence, but never write
    pub dry_run: bool,
    pub scope: DedupScope,
    pub policy: UpsertPolicy,
    /// Max publications stored per professor
    pub publication_limit: usize,
    /// Look up profile/query publications when none are embedded
    pub fetch_publications: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            department: DepartmentSource::AllKnown,
            query_override: None,
            limit: 20,
            delay: Duration::from_secs(1),
            dry_run: false,
            scope: DedupScope::default(),
            policy: UpsertPolicy::default(),
            publication_limit: 10,
            fetch_publications: true,
        }
    }
}

/// What a dry run would have done with one candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewAction {
    WouldCreate,
    WouldUpdate,
    WouldSkip,
}

/// One dry-run line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewEntry {
    pub name: String,
    pub department: String,
    pub action: PreviewAction,
    pub existing_id: Option<i64>,
}

/// Tally of one import run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    /// Candidates returned by all searches
    pub searched: usize,
    /// Candidates dropped by the person filter or validation
    pub rejected: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub papers_added: usize,
    /// Units (searches or candidates) skipped after a recoverable error
    pub failures: usize,
    /// Filled only on dry runs
    pub previews: Vec<PreviewEntry>,
}

/// How the department is resolved for one search
#[derive(Debug, Clone)]
enum TargetDepartment {
    Fixed(String),
    PerCandidate { fallback: String },
}

#[derive(Debug, Clone)]
struct SearchTarget {
    query: String,
    department: TargetDepartment,
}

/// Department from the text before the first comma of the affiliation, then
/// of the snippet, else `fallback`.
pub fn department_from_candidate(candidate: &AuthorCandidate, fallback: &str) -> String {
    [candidate.affiliation.as_deref(), candidate.snippet.as_deref()]
        .into_iter()
        .flatten()
        .filter_map(|text| text.split(',').next().map(str::trim))
        .find(|s| !s.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

/// Runs imports against one client and store
#[derive(Debug, Clone)]
pub struct Importer {
    client: SerpApiClient,
    store: Store,
    filter: FilterConfig,
}

impl Importer {
    pub fn new(client: SerpApiClient, store: Store, filter: FilterConfig) -> Self {
        Self { client, store, filter }
    }

    /// Run one import. Only configuration failures abort; everything scoped
    /// to a single search or candidate is logged, counted and skipped.
    #[instrument(skip(self, options), fields(dry_run = options.dry_run))]
    pub async fn run(&self, options: &ImportOptions) -> Result<ImportReport> {
        let mut report = ImportReport::default();

        for (idx, target) in self.targets(options).await?.into_iter().enumerate() {
            if idx > 0 && !options.delay.is_zero() {
                tokio::time::sleep(options.delay).await;
            }
            info!(query = %target.query, limit = options.limit, "Searching authors");
            let candidates = match self.client.search_authors(&target.query, options.limit).await {
                Ok(candidates) => candidates,
                Err(e) if !e.is_fatal() => {
                    warn!(query = %target.query, error = %e, "Search failed, skipping");
                    report.failures += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            report.searched += candidates.len();

            for candidate in &candidates {
                self.process_candidate(candidate, &target, options, &mut report).await?;
            }
        }

        info!(
            searched = report.searched,
            rejected = report.rejected,
            created = report.created,
            updated = report.updated,
            skipped = report.skipped,
            papers = report.papers_added,
            failures = report.failures,
            "Import finished"
        );
        Ok(report)
    }

    async fn targets(&self, options: &ImportOptions) -> Result<Vec<SearchTarget>> {
        let hint = &self.client.config().affiliation_hint;
        let query_for = |name: &str| {
            options
                .query_override
                .clone()
                .unwrap_or_else(|| format!("{} {}", name, hint))
        };

        let targets = match &options.department {
            DepartmentSource::Named(name) => vec![SearchTarget {
                query: query_for(name),
                department: TargetDepartment::Fixed(name.clone()),
            }],
            DepartmentSource::AllKnown => self
                .store
                .list_departments()
                .await?
                .into_iter()
                .map(|d| SearchTarget {
                    query: query_for(&d.name),
                    department: TargetDepartment::Fixed(d.name),
                })
                .collect(),
            DepartmentSource::FromAffiliation { fallback } => vec![SearchTarget {
                query: options.query_override.clone().unwrap_or_else(|| hint.clone()),
                department: TargetDepartment::PerCandidate {
                    fallback: fallback.clone(),
                },
            }],
        };

        if targets.is_empty() {
            warn!("No departments to import; create one or pass a department name");
        }
        Ok(targets)
    }

    async fn process_candidate(
        &self,
        candidate: &AuthorCandidate,
        target: &SearchTarget,
        options: &ImportOptions,
        report: &mut ImportReport,
    ) -> Result<()> {
        if let Verdict::Reject(reason) = classify(candidate, &self.filter) {
            info!(name = ?candidate.name, %reason, "Rejected candidate");
            report.rejected += 1;
            return Ok(());
        }

        let professor = match NewProfessor::from_candidate(candidate) {
            Ok(p) => p,
            Err(e) => {
                debug!(error = %e, "Dropping invalid candidate");
                report.rejected += 1;
                return Ok(());
            }
        };

        let department = match &target.department {
            TargetDepartment::Fixed(name) => name.clone(),
            TargetDepartment::PerCandidate { fallback } => department_from_candidate(candidate, fallback),
        };

        let mut requested = false;
        let result = if options.dry_run {
            self.preview(professor, department, options, report).await
        } else {
            self.import_candidate(candidate, professor, &department, options, report, &mut requested)
                .await
        };

        match result {
            Ok(()) => {}
            Err(e) if !e.is_fatal() => {
                // The unit's transaction has already rolled back
                warn!(name = ?candidate.name, error = %e, "Skipping candidate after error");
                report.failures += 1;
            }
            Err(e) => return Err(e),
        }

        if requested && !options.delay.is_zero() {
            tokio::time::sleep(options.delay).await;
        }
        Ok(())
    }

    async fn preview(
        &self,
        professor: NewProfessor,
        department: String,
        options: &ImportOptions,
        report: &mut ImportReport,
    ) -> Result<()> {
        let department_id = self
            .store
            .find_department_by_name(&department)
            .await?
            .map(|d| d.id);

        let existing = match (department_id, options.scope) {
            (None, DedupScope::NameAndDepartment) => None,
            (id, scope) => {
                let mut conn = self.store.db().pool().acquire().await?;
                upsert::find_existing_professor(&mut conn, &professor.name, id.unwrap_or_default(), scope)
                    .await?
            }
        };

        let action = match (&existing, options.policy) {
            (None, _) => PreviewAction::WouldCreate,
            (Some(_), UpsertPolicy::Skip) => PreviewAction::WouldSkip,
            (Some(_), UpsertPolicy::Overwrite) => PreviewAction::WouldUpdate,
        };
        info!(name = %professor.name, %department, ?action, "Dry run");

        report.previews.push(PreviewEntry {
            name: professor.name,
            department,
            action,
            existing_id: existing.map(|p| p.id),
        });
        Ok(())
    }

    async fn import_candidate(
        &self,
        candidate: &AuthorCandidate,
        mut professor: NewProfessor,
        department: &str,
        options: &ImportOptions,
        report: &mut ImportReport,
        requested: &mut bool,
    ) -> Result<()> {
        let department = self.store.get_or_create_department(department).await?;

        if options.policy == UpsertPolicy::Skip {
            let mut conn = self.store.db().pool().acquire().await?;
            let existing =
                upsert::find_existing_professor(&mut conn, &professor.name, department.id, options.scope).await?;
            if let Some(existing) = existing {
                info!(name = %professor.name, department = %department.name, id = existing.id, "Skipping existing professor");
                report.skipped += 1;
                return Ok(());
            }
        }

        let papers = self.gather_papers(candidate, &mut professor, options, requested).await?;

        let unit = upsert::import_unit(
            self.store.db(),
            department.id,
            &professor,
            &papers,
            options.scope,
            options.policy,
        )
        .await?;

        match unit.outcome {
            UpsertOutcome::Created(_) => report.created += 1,
            UpsertOutcome::Updated(_) => report.updated += 1,
            UpsertOutcome::Skipped(_) => report.skipped += 1,
        }
        report.papers_added += unit.papers_added;
        Ok(())
    }

    /// Publications for one candidate: embedded in the search item, then the
    /// author profile (which also fills metrics), then a name query.
    /// `requested` is set once any call goes out.
    async fn gather_papers(
        &self,
        candidate: &AuthorCandidate,
        professor: &mut NewProfessor,
        options: &ImportOptions,
        requested: &mut bool,
    ) -> Result<Vec<NewPaper>> {
        let embedded = normalize::extract_embedded_publications(&candidate.raw);
        if !embedded.is_empty() || !options.fetch_publications {
            return Ok(to_papers(embedded, options.publication_limit));
        }

        if let Some(profile_ref) = candidate.profile_ref.as_deref() {
            *requested = true;
            match self.client.fetch_author_profile(profile_ref).await {
                Ok(doc) => {
                    if let Some(profile) = normalize::extract_profile(&doc) {
                        professor.apply_profile(&profile);
                    }
                    let pubs = normalize::extract_publications(&doc);
                    if !pubs.is_empty() {
                        return Ok(to_papers(pubs, options.publication_limit));
                    }
                }
                Err(e) if e.is_recoverable() => {
                    warn!(name = %professor.name, error = %e, "Profile fetch failed, falling back to query");
                }
                Err(e) => return Err(e),
            }
        }

        *requested = true;
        let pubs = self
            .client
            .search_publications(&professor.name, None, options.publication_limit)
            .await?;
        Ok(to_papers(pubs, options.publication_limit))
    }
}

/// Untitled publications are dropped silently.
fn to_papers(pubs: Vec<PublicationCandidate>, limit: usize) -> Vec<NewPaper> {
    pubs.iter()
        .filter_map(|p| match NewPaper::from_candidate(p) {
            Ok(paper) => Some(paper),
            Err(ProfilesError::Validation(msg)) => {
                debug!(%msg, "Dropping publication");
                None
            }
            Err(_) => None,
        })
        .take(limit)
        .collect()
}

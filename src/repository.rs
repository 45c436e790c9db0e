//! CRUD and query access over departments, professors and papers.

use crate::db::Database;
use crate::error::{ProfilesError, Result};
use crate::models::{
    collapse_whitespace, Department, NewPaper, NewProfessor, Paper, Professor, ProfessorListing,
    ProfessorWithPapers,
};
use futures::TryStreamExt;
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Filters for the professor listing
#[derive(Debug, Clone, Default)]
pub struct ProfessorQuery {
    /// Department id, or a case-insensitive substring of its name
    pub department: Option<String>,
    /// Matches name, affiliation, interests or department name
    pub keyword: Option<String>,
    /// 1-based page number
    pub page: i64,
    pub page_size: i64,
}

/// One page of results
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub page: i64,
    pub page_size: i64,
    pub total: i64,
    pub results: Vec<T>,
}

/// Data access over the profile schema
#[derive(Debug, Clone)]
pub struct Store {
    db: Database,
}

impl Store {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    // ---- departments ----

    /// Find or lazily create a department by exact name.
    #[instrument(skip(self))]
    pub async fn get_or_create_department(&self, name: &str) -> Result<Department> {
        let mut conn = self.db.pool().acquire().await?;
        get_or_create_department(&mut conn, name).await
    }

    pub async fn list_departments(&self) -> Result<Vec<Department>> {
        let rows = sqlx::query_as::<_, Department>("SELECT * FROM departments ORDER BY name, id")
            .fetch_all(self.db.pool())
            .await?;
        Ok(rows)
    }

    pub async fn get_department(&self, id: i64) -> Result<Department> {
        sqlx::query_as::<_, Department>("SELECT * FROM departments WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?
            .ok_or_else(|| ProfilesError::NotFound(format!("department {id}")))
    }

    pub async fn find_department_by_name(&self, name: &str) -> Result<Option<Department>> {
        let row = sqlx::query_as::<_, Department>("SELECT * FROM departments WHERE name = ?")
            .bind(name.trim())
            .fetch_optional(self.db.pool())
            .await?;
        Ok(row)
    }

    /// Create a department; a duplicate name is a `PersistenceConflict`.
    pub async fn create_department(&self, name: &str, description: &str) -> Result<Department> {
        let name = validate_department_name(name)?;
        let row = sqlx::query_as::<_, Department>(
            "INSERT INTO departments (name, description) VALUES (?, ?) RETURNING *",
        )
        .bind(name)
        .bind(description)
        .fetch_one(self.db.pool())
        .await?;
        Ok(row)
    }

    pub async fn update_department(&self, id: i64, name: &str, description: &str) -> Result<Department> {
        let name = validate_department_name(name)?;
        sqlx::query_as::<_, Department>(
            "UPDATE departments SET name = ?, description = ? WHERE id = ? RETURNING *",
        )
        .bind(name)
        .bind(description)
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?
        .ok_or_else(|| ProfilesError::NotFound(format!("department {id}")))
    }

    /// Delete an empty department. Departments with professors are kept.
    pub async fn delete_department(&self, id: i64) -> Result<()> {
        let members: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM professors WHERE department_id = ?")
            .bind(id)
            .fetch_one(self.db.pool())
            .await?;
        if members.0 > 0 {
            return Err(ProfilesError::PersistenceConflict(format!(
                "department {id} still has {} professors",
                members.0
            )));
        }
        let result = sqlx::query("DELETE FROM departments WHERE id = ?")
            .bind(id)
            .execute(self.db.pool())
            .await?;
        check_affected("department", id, result.rows_affected())
    }

    // ---- professors ----

    #[instrument(skip(self, professor), fields(name = %professor.name))]
    pub async fn create_professor(&self, department_id: i64, professor: NewProfessor) -> Result<Professor> {
        let professor = professor.validate()?;
        self.get_department(department_id).await?;
        let mut conn = self.db.pool().acquire().await?;
        insert_professor(&mut conn, department_id, &professor).await
    }

    pub async fn get_professor(&self, id: i64) -> Result<Professor> {
        sqlx::query_as::<_, Professor>("SELECT * FROM professors WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?
            .ok_or_else(|| ProfilesError::NotFound(format!("professor {id}")))
    }

    /// Replace every field of a professor, including its department.
    pub async fn update_professor(
        &self,
        id: i64,
        department_id: i64,
        professor: NewProfessor,
    ) -> Result<Professor> {
        let p = professor.validate()?;
        self.get_department(department_id).await?;
        sqlx::query_as::<_, Professor>(
            r"UPDATE professors
              SET name = ?, email = ?, department_id = ?, interests = ?, profile_ref = ?,
                  affiliation = ?, snippet = ?, profile_photo = ?, citations = ?,
                  h_index = ?, i10_index = ?
              WHERE id = ?
              RETURNING *",
        )
        .bind(&p.name)
        .bind(&p.email)
        .bind(department_id)
        .bind(&p.interests)
        .bind(&p.profile_ref)
        .bind(&p.affiliation)
        .bind(&p.snippet)
        .bind(&p.profile_photo)
        .bind(p.citations)
        .bind(p.h_index)
        .bind(p.i10_index)
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?
        .ok_or_else(|| ProfilesError::NotFound(format!("professor {id}")))
    }

    /// Delete a professor; their papers go with them.
    pub async fn delete_professor(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM professors WHERE id = ?")
            .bind(id)
            .execute(self.db.pool())
            .await?;
        check_affected("professor", id, result.rows_affected())
    }

    /// Paginated, filtered professor listing ordered by name.
    #[instrument(skip(self))]
    pub async fn search_professors(&self, query: &ProfessorQuery) -> Result<Page<ProfessorListing>> {
        let page = query.page.max(1);
        let page_size = query.page_size.max(1);

        let mut count = QueryBuilder::<Sqlite>::new(
            "SELECT COUNT(*) FROM professors p JOIN departments d ON d.id = p.department_id",
        );
        push_listing_filters(&mut count, query);
        let total = count
            .build_query_as::<(i64,)>()
            .fetch_one(self.db.pool())
            .await?;

        let mut select = QueryBuilder::<Sqlite>::new(
            "SELECT p.*, d.name AS department_name FROM professors p JOIN departments d ON d.id = p.department_id",
        );
        push_listing_filters(&mut select, query);
        select
            .push(" ORDER BY p.name, p.id LIMIT ")
            .push_bind(page_size)
            .push(" OFFSET ")
            .push_bind((page - 1) * page_size);
        let results = select
            .build_query_as::<ProfessorListing>()
            .fetch_all(self.db.pool())
            .await?;

        debug!(total = total.0, returned = results.len(), "Professor listing");
        Ok(Page {
            page,
            page_size,
            total: total.0,
            results,
        })
    }

    /// A professor with department name and all papers.
    pub async fn professor_detail(&self, id: i64) -> Result<ProfessorWithPapers> {
        let professor = self.get_professor(id).await?;
        let department = self.get_department(professor.department_id).await?;
        let papers = self.list_papers(Some(id)).await?;
        Ok(ProfessorWithPapers {
            professor,
            department_name: department.name,
            papers,
        })
    }

    /// Every professor with every paper, in insertion order.
    #[instrument(skip(self))]
    pub async fn snapshot(&self) -> Result<Vec<ProfessorWithPapers>> {
        let mut by_owner: HashMap<i64, Vec<Paper>> = HashMap::new();
        let mut rows = sqlx::query_as::<_, Paper>("SELECT * FROM papers ORDER BY id").fetch(self.db.pool());
        while let Some(paper) = rows.try_next().await? {
            by_owner.entry(paper.professor_id).or_default().push(paper);
        }
        drop(rows);

        let professors = sqlx::query_as::<_, ProfessorListing>(
            "SELECT p.*, d.name AS department_name FROM professors p JOIN departments d ON d.id = p.department_id ORDER BY p.id",
        )
        .fetch_all(self.db.pool())
        .await?;

        Ok(professors
            .into_iter()
            .map(|row| ProfessorWithPapers {
                papers: by_owner.remove(&row.professor.id).unwrap_or_default(),
                professor: row.professor,
                department_name: row.department_name,
            })
            .collect())
    }

    // ---- papers ----

    pub async fn list_papers(&self, professor_id: Option<i64>) -> Result<Vec<Paper>> {
        let rows = match professor_id {
            Some(id) => {
                sqlx::query_as::<_, Paper>("SELECT * FROM papers WHERE professor_id = ? ORDER BY id")
                    .bind(id)
                    .fetch_all(self.db.pool())
                    .await?
            }
            None => {
                sqlx::query_as::<_, Paper>("SELECT * FROM papers ORDER BY id")
                    .fetch_all(self.db.pool())
                    .await?
            }
        };
        Ok(rows)
    }

    pub async fn get_paper(&self, id: i64) -> Result<Paper> {
        sqlx::query_as::<_, Paper>("SELECT * FROM papers WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?
            .ok_or_else(|| ProfilesError::NotFound(format!("paper {id}")))
    }

    /// Create a paper; an existing (professor, title) is a `PersistenceConflict`.
    pub async fn create_paper(&self, professor_id: i64, paper: NewPaper) -> Result<Paper> {
        let paper = paper.validate()?;
        self.get_professor(professor_id).await?;
        let mut conn = self.db.pool().acquire().await?;
        insert_paper(&mut conn, professor_id, &paper).await
    }

    pub async fn update_paper(&self, id: i64, professor_id: i64, paper: NewPaper) -> Result<Paper> {
        let p = paper.validate()?;
        self.get_professor(professor_id).await?;
        sqlx::query_as::<_, Paper>(
            r"UPDATE papers
              SET title = ?, abstract = ?, publication_year = ?, professor_id = ?, url = ?,
                  snippet = ?, citation_count = ?, authors = ?, journal = ?
              WHERE id = ?
              RETURNING *",
        )
        .bind(&p.title)
        .bind(&p.abstract_text)
        .bind(p.publication_year)
        .bind(professor_id)
        .bind(&p.url)
        .bind(&p.snippet)
        .bind(p.citation_count)
        .bind(&p.authors)
        .bind(&p.journal)
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?
        .ok_or_else(|| ProfilesError::NotFound(format!("paper {id}")))
    }

    pub async fn delete_paper(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM papers WHERE id = ?")
            .bind(id)
            .execute(self.db.pool())
            .await?;
        check_affected("paper", id, result.rows_affected())
    }
}

fn push_listing_filters(builder: &mut QueryBuilder<'_, Sqlite>, query: &ProfessorQuery) {
    builder.push(" WHERE 1 = 1");

    if let Some(dept) = query.department.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        match dept.parse::<i64>() {
            Ok(id) => {
                builder.push(" AND d.id = ").push_bind(id);
            }
            Err(_) => {
                builder
                    .push(" AND lower(d.name) LIKE ")
                    .push_bind(like_pattern(dept));
            }
        }
    }

    if let Some(keyword) = query.keyword.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        let pattern = like_pattern(keyword);
        builder
            .push(" AND (lower(p.name) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR lower(coalesce(p.affiliation, '')) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR lower(p.interests) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR lower(d.name) LIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

fn like_pattern(s: &str) -> String {
    format!("%{}%", s.to_lowercase())
}

fn validate_department_name(name: &str) -> Result<String> {
    let name = collapse_whitespace(name);
    if name.is_empty() {
        return Err(ProfilesError::Validation("department name is required".to_string()));
    }
    Ok(name)
}

fn check_affected(kind: &str, id: i64, rows: u64) -> Result<()> {
    if rows == 0 {
        return Err(ProfilesError::NotFound(format!("{kind} {id}")));
    }
    Ok(())
}

/// Find or create a department on an open connection or transaction.
pub async fn get_or_create_department(conn: &mut SqliteConnection, name: &str) -> Result<Department> {
    let name = validate_department_name(name)?;
    sqlx::query("INSERT INTO departments (name) VALUES (?) ON CONFLICT(name) DO NOTHING")
        .bind(&name)
        .execute(&mut *conn)
        .await?;
    let dept = sqlx::query_as::<_, Department>("SELECT * FROM departments WHERE name = ?")
        .bind(&name)
        .fetch_one(&mut *conn)
        .await?;
    Ok(dept)
}

/// Insert a professor row.
pub async fn insert_professor(
    conn: &mut SqliteConnection,
    department_id: i64,
    p: &NewProfessor,
) -> Result<Professor> {
    let row = sqlx::query_as::<_, Professor>(
        r"INSERT INTO professors (
            name, email, department_id, interests, profile_ref, affiliation,
            snippet, profile_photo, citations, h_index, i10_index
          )
          VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
          RETURNING *",
    )
    .bind(&p.name)
    .bind(&p.email)
    .bind(department_id)
    .bind(&p.interests)
    .bind(&p.profile_ref)
    .bind(&p.affiliation)
    .bind(&p.snippet)
    .bind(&p.profile_photo)
    .bind(p.citations)
    .bind(p.h_index)
    .bind(p.i10_index)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row)
}

/// Insert a paper row.
pub async fn insert_paper(conn: &mut SqliteConnection, professor_id: i64, p: &NewPaper) -> Result<Paper> {
    let row = sqlx::query_as::<_, Paper>(
        r"INSERT INTO papers (
            title, abstract, publication_year, professor_id, url, snippet,
            citation_count, authors, journal
          )
          VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
          RETURNING *",
    )
    .bind(&p.title)
    .bind(&p.abstract_text)
    .bind(p.publication_year)
    .bind(professor_id)
    .bind(&p.url)
    .bind(&p.snippet)
    .bind(p.citation_count)
    .bind(&p.authors)
    .bind(&p.journal)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> Result<Store> {
        Ok(Store::new(Database::new_in_memory().await?))
    }

    fn prof(name: &str, interests: &str) -> NewProfessor {
        NewProfessor {
            name: name.to_string(),
            interests: interests.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_get_or_create_department_is_idempotent() -> Result<()> {
        let store = store().await?;
        let a = store.get_or_create_department("Physics").await?;
        let b = store.get_or_create_department("  Physics ").await?;
        assert_eq!(a.id, b.id);
        assert_eq!(store.list_departments().await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_department_is_conflict() -> Result<()> {
        let store = store().await?;
        store.create_department("Biology", "").await?;
        let err = store
            .create_department("Biology", "again")
            .await
            .expect_err("duplicate name");
        assert!(matches!(err, ProfilesError::PersistenceConflict(_)));
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_professor_cascades_papers() -> Result<()> {
        let store = store().await?;
        let dept = store.get_or_create_department("Physics").await?;
        let p = store.create_professor(dept.id, prof("Jane Roe", "Optics")).await?;
        store
            .create_paper(
                p.id,
                NewPaper {
                    title: "Lasers".to_string(),
                    ..Default::default()
                },
            )
            .await?;
        assert_eq!(store.list_papers(Some(p.id)).await?.len(), 1);

        store.delete_professor(p.id).await?;
        assert!(store.list_papers(None).await?.is_empty());
        assert!(matches!(
            store.get_professor(p.id).await,
            Err(ProfilesError::NotFound(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_department_with_members_is_refused() -> Result<()> {
        let store = store().await?;
        let dept = store.get_or_create_department("Physics").await?;
        store.create_professor(dept.id, prof("Jane Roe", "")).await?;
        assert!(matches!(
            store.delete_department(dept.id).await,
            Err(ProfilesError::PersistenceConflict(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_search_filters_and_paginates() -> Result<()> {
        let store = store().await?;
        let physics = store.get_or_create_department("Physics").await?;
        let biology = store.get_or_create_department("Biology").await?;
        store.create_professor(physics.id, prof("Ada Byron", "optics")).await?;
        store.create_professor(physics.id, prof("Carl Dunn", "plasma")).await?;
        store.create_professor(biology.id, prof("Eve Fox", "genomics and optics")).await?;

        let by_dept = store
            .search_professors(&ProfessorQuery {
                department: Some("phys".to_string()),
                page: 1,
                page_size: 10,
                ..Default::default()
            })
            .await?;
        assert_eq!(by_dept.total, 2);

        let by_id = store
            .search_professors(&ProfessorQuery {
                department: Some(biology.id.to_string()),
                page: 1,
                page_size: 10,
                ..Default::default()
            })
            .await?;
        assert_eq!(by_id.total, 1);
        assert_eq!(by_id.results[0].department_name, "Biology");

        let by_keyword = store
            .search_professors(&ProfessorQuery {
                keyword: Some("OPTICS".to_string()),
                page: 1,
                page_size: 1,
                ..Default::default()
            })
            .await?;
        assert_eq!(by_keyword.total, 2);
        assert_eq!(by_keyword.results.len(), 1);
        assert_eq!(by_keyword.results[0].professor.name, "Ada Byron");

        let second = store
            .search_professors(&ProfessorQuery {
                keyword: Some("optics".to_string()),
                page: 2,
                page_size: 1,
                ..Default::default()
            })
            .await?;
        assert_eq!(second.results[0].professor.name, "Eve Fox");
        Ok(())
    }

    #[tokio::test]
    async fn test_snapshot_keeps_insertion_order() -> Result<()> {
        let store = store().await?;
        let dept = store.get_or_create_department("Physics").await?;
        let z = store.create_professor(dept.id, prof("Zed Young", "")).await?;
        let a = store.create_professor(dept.id, prof("Abe Bell", "")).await?;
        for title in ["Second", "First"] {
            store
                .create_paper(
                    z.id,
                    NewPaper {
                        title: title.to_string(),
                        ..Default::default()
                    },
                )
                .await?;
        }

        let snapshot = store.snapshot().await?;
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].professor.id, z.id);
        assert_eq!(snapshot[0].papers[0].title, "Second");
        assert_eq!(snapshot[1].professor.id, a.id);
        assert!(snapshot[1].papers.is_empty());
        Ok(())
    }
}

//! CSV export: one row per (professor, paper).
//!
//! A professor without papers still gets one row, with the publication
//! columns blank. Row order is storage order of professors, then papers.

use crate::error::Result;
use crate::models::{Paper, ProfessorWithPapers};
use crate::repository::Store;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tracing::{info, instrument};

/// One flattened export row. Field order and renames define the header.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExportRow {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "AffiliationOrgLabel")]
    pub affiliation_org_label: String,
    #[serde(rename = "Email")]
    pub email: String,
    #[serde(rename = "Affiliation")]
    pub affiliation: String,
    #[serde(rename = "OrgUnit")]
    pub org_unit: String,
    #[serde(rename = "ProfileLink")]
    pub profile_link: String,
    #[serde(rename = "ProfilePhoto")]
    pub profile_photo: String,
    #[serde(rename = "Interests")]
    pub interests: String,
    #[serde(rename = "Citations")]
    pub citations: Option<i64>,
    #[serde(rename = "hIndex")]
    pub h_index: Option<i64>,
    #[serde(rename = "i10Index")]
    pub i10_index: Option<i64>,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Year")]
    pub year: Option<i32>,
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "Snippet")]
    pub snippet: String,
    #[serde(rename = "CitationCount")]
    pub citation_count: Option<i64>,
    #[serde(rename = "Authors")]
    pub authors: String,
    #[serde(rename = "Journal")]
    pub journal: String,
}

/// Flatten professors and papers into export rows.
pub fn flatten(professors: &[ProfessorWithPapers], org_label: &str) -> Vec<ExportRow> {
    let mut rows = Vec::new();
    for entry in professors {
        let p = &entry.professor;
        let base = ExportRow {
            name: p.name.clone(),
            affiliation_org_label: org_label.to_string(),
            email: p.email.clone().unwrap_or_default(),
            affiliation: p.affiliation.clone().unwrap_or_default(),
            org_unit: entry.department_name.clone(),
            profile_link: p.profile_ref.clone().unwrap_or_default(),
            profile_photo: p.profile_photo.clone().unwrap_or_default(),
            interests: p.interests.clone(),
            citations: p.citations,
            h_index: p.h_index,
            i10_index: p.i10_index,
            ..Default::default()
        };

        if entry.papers.is_empty() {
            rows.push(base);
            continue;
        }
        rows.extend(entry.papers.iter().map(|paper| with_paper(base.clone(), paper)));
    }
    rows
}

fn with_paper(mut row: ExportRow, paper: &Paper) -> ExportRow {
    row.title = paper.title.clone();
    row.year = paper.publication_year;
    row.url = paper.url.clone().unwrap_or_default();
    row.snippet = paper
        .snippet
        .clone()
        .or_else(|| paper.abstract_text.clone())
        .unwrap_or_default();
    row.citation_count = paper.citation_count;
    row.authors = paper.authors.clone().unwrap_or_default();
    row.journal = paper.journal.clone().unwrap_or_default();
    row
}

/// Write rows with a header line. An empty export still writes the header.
pub fn write_csv<W: Write>(writer: W, rows: &[ExportRow]) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    wtr.write_record(HEADER)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Column names, in output order
pub const HEADER: [&str; 18] = [
    "Name",
    "AffiliationOrgLabel",
    "Email",
    "Affiliation",
    "OrgUnit",
    "ProfileLink",
    "ProfilePhoto",
    "Interests",
    "Citations",
    "hIndex",
    "i10Index",
    "Title",
    "Year",
    "URL",
    "Snippet",
    "CitationCount",
    "Authors",
    "Journal",
];

/// Export the whole store to `path`. Returns the number of rows written.
#[instrument(skip(store), fields(path = %path.display()))]
pub async fn export_to_path(store: &Store, path: &Path, org_label: &str) -> Result<usize> {
    let snapshot = store.snapshot().await?;
    let rows = flatten(&snapshot, org_label);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    write_csv(file, &rows)?;

    info!(professors = snapshot.len(), rows = rows.len(), "Export written");
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{NewPaper, NewProfessor, Professor};

    fn professor(id: i64, name: &str) -> Professor {
        Professor {
            id,
            name: name.to_string(),
            email: None,
            department_id: 1,
            interests: "Optics".to_string(),
            profile_ref: Some(format!("https://x/?user={id}")),
            affiliation: Some("Physics, CUA".to_string()),
            snippet: None,
            profile_photo: None,
            citations: Some(42),
            h_index: Some(3),
            i10_index: None,
        }
    }

    fn paper(id: i64, owner: i64, title: &str, year: i32) -> Paper {
        Paper {
            id,
            title: title.to_string(),
            abstract_text: Some("abstract".to_string()),
            publication_year: Some(year),
            professor_id: owner,
            url: None,
            snippet: None,
            citation_count: Some(7),
            authors: Some("J Roe".to_string()),
            journal: Some("Nature".to_string()),
        }
    }

    #[test]
    fn test_flatten_one_row_per_pair_and_blank_for_none() {
        let data = vec![
            ProfessorWithPapers {
                professor: professor(1, "Jane Roe"),
                department_name: "Physics".to_string(),
                papers: vec![paper(1, 1, "First", 2001), paper(2, 1, "Second", 2002)],
            },
            ProfessorWithPapers {
                professor: professor(2, "John Doe"),
                department_name: "Physics".to_string(),
                papers: vec![],
            },
        ];

        let rows = flatten(&data, "Catholic University of America");
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].title, "First");
        assert_eq!(rows[1].title, "Second");
        assert_eq!(rows[0].snippet, "abstract");
        assert_eq!(rows[2].name, "John Doe");
        assert_eq!(rows[2].affiliation_org_label, "Catholic University of America");
        assert_eq!(rows[2].title, "");
        assert_eq!(rows[2].year, None);
        assert_eq!(rows[2].citation_count, None);
        assert_eq!(rows[2].journal, "");
    }

    #[test]
    fn test_write_csv_header_and_blank_fields() -> Result<()> {
        let data = vec![ProfessorWithPapers {
            professor: professor(2, "John Doe"),
            department_name: "Physics".to_string(),
            papers: vec![],
        }];
        let mut out = Vec::new();
        write_csv(&mut out, &flatten(&data, "CUA"))?;

        let text = String::from_utf8(out).expect("csv is utf-8");
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(HEADER.join(",").as_str()));
        assert_eq!(
            lines.next(),
            Some("John Doe,CUA,,\"Physics, CUA\",Physics,https://x/?user=2,,Optics,42,3,,,,,,,,")
        );
        assert_eq!(lines.next(), None);
        Ok(())
    }

    #[test]
    fn test_empty_export_writes_header_only() -> Result<()> {
        let mut out = Vec::new();
        write_csv(&mut out, &[])?;
        let text = String::from_utf8(out).expect("csv is utf-8");
        assert_eq!(text.lines().count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_export_to_path_in_storage_order() -> Result<()> {
        let store = Store::new(Database::new_in_memory().await?);
        let dept = store.get_or_create_department("Physics").await?;
        let zed = store
            .create_professor(dept.id, NewProfessor { name: "Zed Adams".to_string(), ..Default::default() })
            .await?;
        store
            .create_professor(dept.id, NewProfessor { name: "Amy Brown".to_string(), ..Default::default() })
            .await?;
        for title in ["Paper One", "Paper Two"] {
            store
                .create_paper(zed.id, NewPaper { title: title.to_string(), ..Default::default() })
                .await?;
        }

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out").join("professors.csv");
        let written = export_to_path(&store, &path, "CUA").await?;
        assert_eq!(written, 3);

        let mut reader = csv::Reader::from_path(&path)?;
        let names: Vec<String> = reader
            .records()
            .map(|r| r.map(|rec| rec[0].to_string()))
            .collect::<std::result::Result<_, _>>()?;
        assert_eq!(names, ["Zed Adams", "Zed Adams", "Amy Brown"]);
        Ok(())
    }
}

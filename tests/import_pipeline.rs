//! End-to-end import runs against a mock search endpoint and in-memory store.

use rustprofiles::config::SearchConfig;
use rustprofiles::db::Database;
use rustprofiles::import::{DepartmentSource, ImportOptions, Importer, PreviewAction};
use rustprofiles::person_filter::FilterConfig;
use rustprofiles::repository::Store;
use rustprofiles::serpapi::SerpApiClient;
use rustprofiles::upsert::UpsertPolicy;
use rustprofiles::Result;
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn importer(server: &MockServer, store: Store) -> Result<Importer> {
    let config = SearchConfig::new(Some("test-key".to_string()))?
        .with_endpoint(format!("{}/search", server.uri()))
        .with_affiliation_hint("Example University");
    Ok(Importer::new(SerpApiClient::new(config)?, store, FilterConfig::default()))
}

fn options(department: DepartmentSource) -> ImportOptions {
    ImportOptions {
        department,
        delay: Duration::ZERO,
        ..Default::default()
    }
}

async fn store() -> Result<Store> {
    Ok(Store::new(Database::new_in_memory().await?))
}

fn physics_results() -> Value {
    json!({
        "author_results": [
            {
                "name": "Jane Roe",
                "affiliation": "Physics, Example University",
                "link": "https://scholar.google.com/citations?user=j1",
                "snippet": "Quantum optics",
                "publications": [
                    {"title": "Entangled Photons", "year": 2019, "snippet": "We study photons."},
                    {"title": "Cold Atoms", "snippet": "Published in 2007 at Nature"}
                ]
            },
            {"name": "Bob Lee", "link": "https://scholar.google.com/citations?user=b1"},
            {"name": "Department of Physics", "link": "https://physics.example.edu"},
            {"name": "Smith"}
        ]
    })
}

fn bob_profile() -> Value {
    json!({
        "author": {
            "name": "Bob Lee",
            "affiliations": "Example University",
            "email": "bob@example.edu",
            "interests": [{"title": "Lasers"}, {"title": "Optics"}]
        },
        "cited_by": {
            "table": [
                {"citations": {"all": 120}},
                {"h_index": {"all": 5}},
                {"i10_index": {"all": 3}}
            ]
        },
        "articles": [{"title": "Laser Cooling", "year": "2015", "publication": "Phys Rev A"}]
    })
}

async fn mount_physics(server: &MockServer, profile_calls: u64) {
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("engine", "google_scholar"))
        .and(query_param("q", "Physics Example University"))
        .respond_with(ResponseTemplate::new(200).set_body_json(physics_results()))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("engine", "google_scholar_author"))
        .and(query_param("author_id", "b1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bob_profile()))
        .expect(profile_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_import_named_department_then_skip_on_rerun() -> Result<()> {
    let server = MockServer::start().await;
    // Second run skips existing professors before any profile lookup
    mount_physics(&server, 1).await;

    let store = store().await?;
    let importer = importer(&server, store.clone())?;
    let opts = options(DepartmentSource::Named("Physics".to_string()));

    let report = importer.run(&opts).await?;
    assert_eq!(report.searched, 4);
    assert_eq!(report.rejected, 2);
    assert_eq!(report.created, 2);
    assert_eq!(report.papers_added, 3);
    assert_eq!(report.failures, 0);

    let snapshot = store.snapshot().await?;
    assert_eq!(snapshot.len(), 2);

    let jane = &snapshot[0];
    assert_eq!(jane.professor.name, "Jane Roe");
    assert_eq!(jane.department_name, "Physics");
    assert_eq!(jane.professor.interests, "Quantum optics");
    let years: Vec<_> = jane.papers.iter().map(|p| p.publication_year).collect();
    assert_eq!(years, [Some(2019), Some(2007)]);

    let bob = &snapshot[1];
    assert_eq!(bob.professor.citations, Some(120));
    assert_eq!(bob.professor.h_index, Some(5));
    assert_eq!(bob.professor.email.as_deref(), Some("bob@example.edu"));
    assert_eq!(bob.professor.interests, "Lasers, Optics");
    assert_eq!(bob.papers.len(), 1);
    assert_eq!(bob.papers[0].journal.as_deref(), Some("Phys Rev A"));

    let rerun = importer.run(&opts).await?;
    assert_eq!(rerun.created, 0);
    assert_eq!(rerun.skipped, 2);
    assert_eq!(store.snapshot().await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_overwrite_updates_in_place() -> Result<()> {
    let server = MockServer::start().await;
    mount_physics(&server, 2).await;

    let store = store().await?;
    let importer = importer(&server, store.clone())?;
    let mut opts = options(DepartmentSource::Named("Physics".to_string()));
    importer.run(&opts).await?;

    opts.policy = UpsertPolicy::Overwrite;
    let report = importer.run(&opts).await?;
    assert_eq!(report.updated, 2);
    assert_eq!(report.created, 0);
    assert_eq!(report.papers_added, 0);

    let snapshot = store.snapshot().await?;
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot[0].papers.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_dry_run_writes_nothing() -> Result<()> {
    let server = MockServer::start().await;
    mount_physics(&server, 0).await;

    let store = store().await?;
    let mut opts = options(DepartmentSource::Named("Physics".to_string()));
    opts.dry_run = true;

    let report = importer(&server, store.clone())?.run(&opts).await?;
    assert_eq!(report.previews.len(), 2);
    assert!(report
        .previews
        .iter()
        .all(|p| p.action == PreviewAction::WouldCreate && p.department == "Physics"));
    assert_eq!(report.created, 0);

    assert!(store.list_departments().await?.is_empty());
    assert!(store.snapshot().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_search_failure_is_counted_not_fatal() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "backend down"})))
        .mount(&server)
        .await;

    let store = store().await?;
    let report = importer(&server, store.clone())?
        .run(&options(DepartmentSource::Named("Physics".to_string())))
        .await?;
    assert_eq!(report.failures, 1);
    assert_eq!(report.searched, 0);
    assert!(store.snapshot().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_departments_from_affiliation() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("q", "Example University"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "organic_results": [
                {"title": "Ann Smith", "affiliation": "Chemistry, Example University"},
                {"title": "Carl Young", "snippet": "Psychology, Example University"},
                {"title": "Dana White", "link": "https://scholar.google.com/citations?user=d1"}
            ]
        })))
        .mount(&server)
        .await;

    let store = store().await?;
    let mut opts = options(DepartmentSource::FromAffiliation {
        fallback: "Unknown".to_string(),
    });
    opts.fetch_publications = false;

    let report = importer(&server, store.clone())?.run(&opts).await?;
    assert_eq!(report.created, 3);

    let names: Vec<String> = store
        .list_departments()
        .await?
        .into_iter()
        .map(|d| d.name)
        .collect();
    assert_eq!(names, ["Chemistry", "Psychology", "Unknown"]);
    Ok(())
}

#[tokio::test]
async fn test_all_known_departments() -> Result<()> {
    let server = MockServer::start().await;
    for (dept, person) in [("Biology", "Mary Leakey"), ("History", "Eric Hobsbawm")] {
        Mock::given(method("GET"))
            .and(query_param("q", format!("{dept} Example University").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "author_results": [{"name": person}]
            })))
            .mount(&server)
            .await;
    }

    let store = store().await?;
    store.create_department("Biology", "").await?;
    store.create_department("History", "").await?;

    let mut opts = options(DepartmentSource::AllKnown);
    opts.fetch_publications = false;
    let report = importer(&server, store.clone())?.run(&opts).await?;
    assert_eq!(report.searched, 2);
    assert_eq!(report.created, 2);

    let snapshot = store.snapshot().await?;
    let placed: Vec<(&str, &str)> = snapshot
        .iter()
        .map(|p| (p.professor.name.as_str(), p.department_name.as_str()))
        .collect();
    assert_eq!(placed, [("Mary Leakey", "Biology"), ("Eric Hobsbawm", "History")]);
    Ok(())
}

#[tokio::test]
async fn test_storage_failure_in_one_unit_does_not_stop_the_batch() -> Result<()> {
    let server = MockServer::start().await;
    mount_physics(&server, 1).await;

    let store = store().await?;
    sqlx::query(
        "CREATE TRIGGER reject_cold_atoms BEFORE INSERT ON papers
         WHEN NEW.title = 'Cold Atoms'
         BEGIN SELECT RAISE(ABORT, 'disk hiccup'); END",
    )
    .execute(store.db().pool())
    .await?;

    let report = importer(&server, store.clone())?
        .run(&options(DepartmentSource::Named("Physics".to_string())))
        .await?;
    assert_eq!(report.failures, 1);
    assert_eq!(report.created, 1);
    assert_eq!(report.papers_added, 1);

    // Jane's unit rolled back as a whole, Bob's went through
    let snapshot = store.snapshot().await?;
    let names: Vec<&str> = snapshot.iter().map(|p| p.professor.name.as_str()).collect();
    assert_eq!(names, ["Bob Lee"]);
    assert!(store.list_papers(None).await?.iter().all(|p| p.title != "Entangled Photons"));
    Ok(())
}

#[tokio::test]
async fn test_candidate_transport_failure_skips_only_that_candidate() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("engine", "google_scholar"))
        .and(query_param("q", "Physics Example University"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "author_results": [
                {"name": "Ann Fail", "link": "https://scholar.google.com/citations?user=f1"},
                {"name": "Ben Good", "publications": [{"title": "Working Paper", "year": 2021}]}
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("engine", "google_scholar_author"))
        .and(query_param("author_id", "f1"))
        .respond_with(ResponseTemplate::new(502))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("engine", "google_scholar"))
        .and(query_param("q", "Ann Fail Example University"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let store = store().await?;
    let report = importer(&server, store.clone())?
        .run(&options(DepartmentSource::Named("Physics".to_string())))
        .await?;
    assert_eq!(report.failures, 1);
    assert_eq!(report.created, 1);
    assert_eq!(report.papers_added, 1);

    let snapshot = store.snapshot().await?;
    let names: Vec<&str> = snapshot.iter().map(|p| p.professor.name.as_str()).collect();
    assert_eq!(names, ["Ben Good"]);
    Ok(())
}

#[tokio::test]
async fn test_no_pause_after_units_without_requests() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("engine", "google_scholar"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "author_results": [
                {"name": "Ada Byron", "link": "https://scholar.google.com/citations?user=a1",
                 "publications": [{"title": "Notes", "year": 1843}]},
                {"name": "Carl Gauss", "link": "https://scholar.google.com/citations?user=c1",
                 "publications": [{"title": "Disquisitiones", "year": 1801}]}
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("engine", "google_scholar_author"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let store = store().await?;
    let importer = importer(&server, store.clone())?;
    let mut opts = options(DepartmentSource::Named("Mathematics".to_string()));
    opts.delay = Duration::from_secs(30);

    opts.dry_run = true;
    let preview = tokio::time::timeout(Duration::from_secs(10), importer.run(&opts))
        .await
        .expect("dry run issues no per-candidate requests")?;
    assert_eq!(preview.previews.len(), 2);

    opts.dry_run = false;
    let report = tokio::time::timeout(Duration::from_secs(10), importer.run(&opts))
        .await
        .expect("embedded publications need no requests")?;
    assert_eq!(report.created, 2);
    assert_eq!(report.papers_added, 2);
    Ok(())
}

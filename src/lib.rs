//! # rustprofiles
//!
//! Academic profile collector: scholar search import, dedup, CSV export and
//! a small query service.
//!
//! ## Modules
//!
//! - [`serpapi`] - Scholar search API client
//! - [`normalize`] - Raw response → author/publication candidates
//! - [`person_filter`] - Heuristic "is this a person" classifier
//! - [`upsert`] - Dedup and transactional upsert
//! - [`import`] - Search → filter → upsert pipeline
//! - [`export`] - CSV export
//! - [`repository`] - CRUD and listing queries
//! - [`server`] - HTTP surface
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rustprofiles::config::SearchConfig;
//! use rustprofiles::db::Database;
//! use rustprofiles::import::{DepartmentSource, ImportOptions, Importer};
//! use rustprofiles::person_filter::FilterConfig;
//! use rustprofiles::repository::Store;
//! use rustprofiles::serpapi::SerpApiClient;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = SerpApiClient::new(SearchConfig::new(std::env::var("SERPAPI_API_KEY").ok())?)?;
//!     let store = Store::new(Database::new(std::path::Path::new("profiles.db")).await?);
//!     let options = ImportOptions {
//!         department: DepartmentSource::Named("Physics".to_string()),
//!         ..Default::default()
//!     };
//!     let report = Importer::new(client, store, FilterConfig::default()).run(&options).await?;
//!     println!("Created {} professors", report.created);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod import;
pub mod models;
pub mod normalize;
pub mod person_filter;
pub mod repository;
pub mod serpapi;
pub mod server;
pub mod upsert;

pub use error::{ProfilesError, Result};

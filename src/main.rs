//! rustprofiles - Academic profile collector
//!
//! Imports academic profiles from a scholar search API, filters out
//! non-person results, dedups into SQLite, exports CSV and serves a small
//! query/CRUD API.
//!
//! ## Usage
//!
//! ### CLI Mode
//! ```bash
//! rustprofiles import --department "Physics" --limit 20 --dry-run
//! rustprofiles export --output professors.csv
//! ```
//!
//! ### HTTP Server Mode
//! ```bash
//! rustprofiles serve --port 3000
//! ```

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use rustprofiles::{
    config::{self, SearchConfig, ServerConfig, DEFAULT_AFFILIATION_HINT},
    db::Database,
    export,
    import::{DepartmentSource, ImportOptions, ImportReport, Importer, UNKNOWN_DEPARTMENT},
    person_filter::FilterConfig,
    repository::Store,
    serpapi::SerpApiClient,
    server::{self, AppState},
    upsert::{DedupScope, UpsertPolicy},
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Academic profile collector
#[derive(Parser)]
#[command(name = "rustprofiles")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// SQLite database path
    #[arg(long, global = true, env = "PROFILES_DATABASE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Search service connection flags
#[derive(Args, Clone)]
struct SearchArgs {
    /// Search API key
    #[arg(long, env = "SERPAPI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Search endpoint URL
    #[arg(long, env = "SERPAPI_ENDPOINT")]
    endpoint: Option<String>,

    /// Institution appended to department queries
    #[arg(long, default_value = DEFAULT_AFFILIATION_HINT)]
    affiliation_hint: String,
}

impl SearchArgs {
    fn config(&self) -> rustprofiles::Result<SearchConfig> {
        let mut config =
            SearchConfig::new(self.api_key.clone())?.with_affiliation_hint(self.affiliation_hint.clone());
        if let Some(ref endpoint) = self.endpoint {
            config = config.with_endpoint(endpoint.clone());
        }
        config.validate()?;
        Ok(config)
    }

    fn client(&self) -> Result<SerpApiClient> {
        let config = self
            .config()
            .context("Search API key missing or invalid (set --api-key or SERPAPI_API_KEY)")?;
        Ok(SerpApiClient::new(config)?)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Import professors for one or all departments
    Import {
        /// Department to search; omit to run every stored department
        #[arg(long, conflicts_with = "from_affiliation")]
        department: Option<String>,

        /// Search the institution once and derive each department from the affiliation
        #[arg(long)]
        from_affiliation: bool,

        /// Department used when none can be derived
        #[arg(long, default_value = UNKNOWN_DEPARTMENT)]
        fallback_department: String,

        /// Override the search query
        #[arg(long)]
        query: Option<String>,

        /// Max authors per department
        #[arg(long, default_value = "20")]
        limit: usize,

        /// Seconds to wait between candidates
        #[arg(long, default_value = "1.0")]
        delay: f64,

        /// Do not write to the database
        #[arg(long)]
        dry_run: bool,

        /// Dedup scope: name or name-department
        #[arg(long, default_value = "name-department")]
        scope: DedupScope,

        /// What to do with an existing professor: skip or overwrite
        #[arg(long, default_value = "skip")]
        policy: UpsertPolicy,

        /// Max papers stored per professor
        #[arg(long, default_value = "10")]
        publication_limit: usize,

        /// Only store publications embedded in the search results
        #[arg(long)]
        no_publication_lookup: bool,

        #[command(flatten)]
        search: SearchArgs,
    },

    /// Look up publications for one author
    Publications {
        /// Author name
        author: String,

        /// Profile link or author id
        #[arg(long)]
        profile: Option<String>,

        /// Max publications
        #[arg(long, default_value = "10")]
        limit: usize,

        #[command(flatten)]
        search: SearchArgs,
    },

    /// Export every professor and paper to CSV
    Export {
        /// Output file (default: professors_<timestamp>.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Value of the AffiliationOrgLabel column
        #[arg(long, default_value = DEFAULT_AFFILIATION_HINT)]
        org_label: String,
    },

    /// Run as HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Bearer token required for persisting imports
        #[arg(long, env = "PROFILES_ADMIN_TOKEN", hide_env_values = true)]
        admin_token: Option<String>,

        /// Listing page size
        #[arg(long, default_value = "20")]
        page_size: i64,

        #[command(flatten)]
        search: SearchArgs,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    if cli.json_logs {
        fmt().json().with_env_filter(filter).init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .init();
    }

    let db_path = cli.database.unwrap_or_else(config::default_database_path);

    match cli.command {
        Commands::Import {
            department,
            from_affiliation,
            fallback_department,
            query,
            limit,
            delay,
            dry_run,
            scope,
            policy,
            publication_limit,
            no_publication_lookup,
            search,
        } => {
            let department = match (department, from_affiliation) {
                (Some(name), _) => DepartmentSource::Named(name),
                (None, true) => DepartmentSource::FromAffiliation {
                    fallback: fallback_department,
                },
                (None, false) => DepartmentSource::AllKnown,
            };
            let options = ImportOptions {
                department,
                query_override: query,
                limit,
                delay: Duration::try_from_secs_f64(delay).context("Invalid --delay")?,
                dry_run,
                scope,
                policy,
                publication_limit,
                fetch_publications: !no_publication_lookup,
            };
            run_import(db_path, search, options).await
        }
        Commands::Publications {
            author,
            profile,
            limit,
            search,
        } => run_publications(search, author, profile, limit).await,
        Commands::Export { output, org_label } => run_export(db_path, output, org_label).await,
        Commands::Serve {
            port,
            host,
            admin_token,
            page_size,
            search,
        } => {
            let config = ServerConfig {
                page_size,
                admin_token,
                org_label: search.affiliation_hint.clone(),
                ..Default::default()
            };
            run_server(db_path, search, config, host, port).await
        }
    }
}

async fn open_store(db_path: &std::path::Path) -> Result<Store> {
    let db = Database::new(db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    Ok(Store::new(db))
}

// ============================================================================
// Import
// ============================================================================

async fn run_import(db_path: PathBuf, search: SearchArgs, options: ImportOptions) -> Result<()> {
    let client = search.client()?;
    let store = open_store(&db_path).await?;

    println!("Database: {}", db_path.display());
    match &options.department {
        DepartmentSource::Named(name) => println!("\n--- Importing department: {} ---", name),
        DepartmentSource::AllKnown => println!("\n--- Importing all stored departments ---"),
        DepartmentSource::FromAffiliation { .. } => println!("\n--- Importing by affiliation ---"),
    }
    if options.dry_run {
        println!("Dry run: nothing will be written.");
    }

    let report = Importer::new(client, store.clone(), FilterConfig::default())
        .run(&options)
        .await
        .context("Import failed")?;

    print_report(&report);
    store.db().clone().close().await;
    Ok(())
}

fn print_report(report: &ImportReport) {
    for preview in &report.previews {
        let action = match preview.action {
            rustprofiles::import::PreviewAction::WouldCreate => "Would create",
            rustprofiles::import::PreviewAction::WouldUpdate => "Would update",
            rustprofiles::import::PreviewAction::WouldSkip => "Would skip existing",
        };
        println!("  {}: {} (dept={})", action, preview.name, preview.department);
    }

    println!("\nSearched:  {}", report.searched);
    println!("Rejected:  {}", report.rejected);
    println!("Created:   {}", report.created);
    println!("Updated:   {}", report.updated);
    println!("Skipped:   {}", report.skipped);
    println!("Papers:    {}", report.papers_added);
    println!("Failures:  {}", report.failures);
    println!("\n✓ Import finished.");
}

// ============================================================================
// Publications
// ============================================================================

async fn run_publications(search: SearchArgs, author: String, profile: Option<String>, limit: usize) -> Result<()> {
    let client = search.client()?;

    println!("\n--- Publications for {} ---", author);
    let pubs = client
        .search_publications(&author, profile.as_deref(), limit)
        .await
        .context("Publication lookup failed")?;

    if pubs.is_empty() {
        println!("No publications found.");
        return Ok(());
    }

    for (idx, p) in pubs.iter().enumerate() {
        let year = p.year.map(|y| y.to_string()).unwrap_or_else(|| "----".to_string());
        println!(
            "{:>3}. [{}] {}",
            idx + 1,
            year,
            p.title.as_deref().unwrap_or("(untitled)")
        );
        if let Some(ref journal) = p.journal {
            println!("       {}", journal);
        }
    }
    println!("\nFound {} publications.", pubs.len());
    Ok(())
}

// ============================================================================
// Export
// ============================================================================

async fn run_export(db_path: PathBuf, output: Option<PathBuf>, org_label: String) -> Result<()> {
    let store = open_store(&db_path).await?;

    let path = output.unwrap_or_else(|| {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        PathBuf::from(format!("professors_{}.csv", timestamp))
    });

    let rows = export::export_to_path(&store, &path, &org_label)
        .await
        .context("Export failed")?;

    println!("Saved {} rows: {:?}", rows, path);
    Ok(())
}

// ============================================================================
// HTTP Server
// ============================================================================

async fn run_server(db_path: PathBuf, search: SearchArgs, config: ServerConfig, host: String, port: u16) -> Result<()> {
    info!(host = %host, port = port, "Starting HTTP server");
    println!("Starting server at http://{}:{}", host, port);

    let store = open_store(&db_path).await?;

    let client = match search.config() {
        Ok(search_config) => Some(SerpApiClient::new(search_config)?),
        Err(e) => {
            println!("Search client disabled ({}); live data and imports unavailable.", e);
            None
        }
    };
    if config.admin_token.is_none() {
        println!("No admin token configured; persisting imports is disabled.");
    }

    let app = server::router(AppState {
        store,
        client,
        filter: FilterConfig::default(),
        config,
    });

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .context("Invalid host:port")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}

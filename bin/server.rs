// Civic Reconcile - Upload Server
// REST API with Axum: upload both snapshots, get back the differences

use anyhow::{anyhow, Context};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Local, Utc};
use civic_reconcile::db::{self, InputFile, RunKind, RunRecord};
use civic_reconcile::output::removal_stamp;
use civic_reconcile::pipeline::{self, DiffOutcome, DiffTargets, MergePaths, MergeSummary};
use civic_reconcile::{archive, loader, DatasetKind, NeighbourhoodConfig};
use clap::Parser;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const MERGED_FILE: &str = "out.csv";
const ERRORS_FILE: &str = "err.csv";
const IMPORT_FILE: &str = "import.csv";

#[derive(Parser, Debug, Clone)]
#[command(name = "civic-server")]
#[command(about = "Upload service for property owner and business license snapshots")]
struct Args {
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:3000")]
    listen: String,

    /// Archived snapshots and removed caches
    #[arg(long, env = "ARCHIVE_DIR", default_value = "archive")]
    archive_dir: PathBuf,

    /// Merge outputs and differences CSVs
    #[arg(long, env = "OUTPUT_DIR", default_value = "public")]
    output_dir: PathBuf,

    #[arg(long, env = "AUDIT_DB", default_value = "audit.db")]
    db: PathBuf,

    /// Neighbourhood tables as JSON
    #[arg(long, env = "NEIGHBOURHOOD_CONFIG")]
    config: Option<PathBuf>,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    config: Arc<NeighbourhoodConfig>,
    archive_dir: PathBuf,
    output_dir: PathBuf,
    // Also serializes runs, which share the archive
    db: Arc<Mutex<Connection>>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Upload {
    filename: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MergeRequest {
    property_owners: Upload,
    business_licenses: Upload,
}

#[derive(Serialize)]
struct MergeResponse {
    run_id: String,
    last_updated: DateTime<Utc>,
    summary: MergeSummary,
    property_owners: DiffOutcome,
    business_licenses: DiffOutcome,
    merged: PathBuf,
    errors: PathBuf,
    import: PathBuf,
}

#[derive(Deserialize)]
struct RunsQuery {
    limit: Option<usize>,
    /// merge or diff
    kind: Option<String>,
    /// Only runs that read a file with this SHA-256
    sha256: Option<String>,
}

// ============================================================================
// Validation
// ============================================================================

/// `{code}-mm-dd-yy.csv`
fn is_snapshot_name(filename: &str, kind: DatasetKind) -> bool {
    let Some(rest) = filename.strip_prefix(kind.code()) else {
        return false;
    };
    let Some(date) = rest.strip_suffix(".csv") else {
        return false;
    };

    let bytes = date.as_bytes();
    bytes.len() == 9
        && bytes.iter().enumerate().all(|(i, b)| match i {
            0 | 3 | 6 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}

fn validate_name(upload: &Upload, kind: DatasetKind, errors: &mut Vec<String>) {
    let label = kind.label();

    if !upload.filename.to_lowercase().ends_with(".csv") {
        errors.push(format!(
            "{} must be a CSV file, with .csv extension. In Excel Save it as CSV",
            label
        ));
    }
    if !is_snapshot_name(&upload.filename, kind) {
        errors.push(format!(
            "{} must have file name in this format: \"{}-mm-dd-yy.csv\"",
            label,
            kind.code()
        ));
    }
}

fn validate_width(upload: &Upload, kind: DatasetKind, errors: &mut Vec<String>) {
    let label = kind.label();

    match loader::header_width(upload.content.as_bytes()) {
        Ok(Some(width)) if width == kind.columns() => {}
        Ok(Some(width)) => {
            errors.push(format!(
                "{} file has wrong number of fields. Got {}, expected {}.",
                label,
                width,
                kind.columns()
            ));
            errors.push(format!("Expected these columns: {}", kind.headers().join(", ")));
            let got = upload.content.lines().next().unwrap_or("");
            errors.push(format!("Got these columns: {}", got));
        }
        Ok(None) => errors.push(format!("{} file is empty.", label)),
        Err(e) => errors.push(format!("{} file could not be read: {}", label, e)),
    }
}

/// All problems with a request; empty when it can be processed.
/// Contents are only inspected once both file names pass.
fn validate(request: &MergeRequest) -> Vec<String> {
    let uploads = [
        (&request.property_owners, DatasetKind::PropertyOwners),
        (&request.business_licenses, DatasetKind::BusinessLicenses),
    ];

    let mut errors = Vec::new();
    for (upload, kind) in uploads {
        validate_name(upload, kind, &mut errors);
    }
    if !errors.is_empty() {
        return errors;
    }

    for (upload, kind) in uploads {
        validate_width(upload, kind, &mut errors);
    }
    errors
}

// ============================================================================
// Processing
// ============================================================================

fn save_upload(run_id: &str, upload: &Upload) -> anyhow::Result<PathBuf> {
    let path = std::env::temp_dir().join(format!("{}-{}", run_id, upload.filename));
    fs::write(&path, &upload.content).with_context(|| format!("Failed to save upload {:?}", path))?;
    Ok(path)
}

fn process_uploads(state: &AppState, request: &MergeRequest) -> anyhow::Result<MergeResponse> {
    let conn = state
        .db
        .lock()
        .map_err(|_| anyhow!("audit database lock poisoned"))?;

    let run_id = uuid::Uuid::new_v4().to_string();
    let po_path = save_upload(&run_id, &request.property_owners)?;
    let bl_path = save_upload(&run_id, &request.business_licenses)?;

    let result = merge_saved(state, &conn, &run_id, request, &po_path, &bl_path);
    if result.is_err() {
        // Archived uploads were moved already; only leftovers remain
        let _ = fs::remove_file(&po_path);
        let _ = fs::remove_file(&bl_path);
    }

    result
}

fn merge_saved(
    state: &AppState,
    conn: &Connection,
    run_id: &str,
    request: &MergeRequest,
    po_path: &Path,
    bl_path: &Path,
) -> anyhow::Result<MergeResponse> {
    let today = Local::now().date_naive();
    fs::create_dir_all(&state.output_dir)
        .with_context(|| format!("Failed to create {:?}", state.output_dir))?;

    let targets = DiffTargets {
        out_dir: Some(state.output_dir.as_path()),
        cache_dir: Some(state.archive_dir.as_path()),
        date: today,
    };

    let previous_po = archive::most_recent(&state.archive_dir, DatasetKind::PropertyOwners)?;
    let previous_bl = archive::most_recent(&state.archive_dir, DatasetKind::BusinessLicenses)?;

    let po_diff = pipeline::run_diff(
        DatasetKind::PropertyOwners,
        po_path,
        previous_po.as_deref(),
        &state.config,
        &targets,
    )?;
    let bl_diff = pipeline::run_diff(
        DatasetKind::BusinessLicenses,
        bl_path,
        previous_bl.as_deref(),
        &state.config,
        &targets,
    )?;

    // Removed caches were just rewritten by the diffs above
    let removed = pipeline::load_removed(&state.archive_dir, &state.config)?;

    let paths = MergePaths {
        owners: po_path.to_path_buf(),
        licenses: bl_path.to_path_buf(),
        output: state.output_dir.join(MERGED_FILE),
        errors: state.output_dir.join(ERRORS_FILE),
        import: state.output_dir.join(IMPORT_FILE),
    };
    let summary = pipeline::run_merge(&paths, &state.config, &removed, &removal_stamp(today))?;

    archive::archive_upload(po_path, &state.archive_dir, DatasetKind::PropertyOwners, today)?;
    archive::archive_upload(bl_path, &state.archive_dir, DatasetKind::BusinessLicenses, today)?;

    let mut run = RunRecord::new(RunKind::Merge, "web", serde_json::to_value(&summary)?)
        .with_input(InputFile::from_bytes(
            "property_owners",
            &request.property_owners.filename,
            request.property_owners.content.as_bytes(),
        ))
        .with_input(InputFile::from_bytes(
            "business_licenses",
            &request.business_licenses.filename,
            request.business_licenses.content.as_bytes(),
        ));
    run.run_id = run_id.to_string();
    if let Some(summary) = run.summary.as_object_mut() {
        summary.insert(
            "differences".to_string(),
            serde_json::json!({ "PO": po_diff.summary, "BL": bl_diff.summary }),
        );
    }
    db::record_run(conn, &run)?;

    info!(run = %run_id, "upload merged");

    Ok(MergeResponse {
        run_id: run_id.to_string(),
        last_updated: Utc::now(),
        summary,
        property_owners: po_diff,
        business_licenses: bl_diff,
        merged: paths.output,
        errors: paths.errors,
        import: paths.import,
    })
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /api/merge - Validate, diff and merge both uploads
async fn merge_uploads(
    State(state): State<AppState>,
    Json(request): Json<MergeRequest>,
) -> impl IntoResponse {
    let errors = validate(&request);
    if !errors.is_empty() {
        warn!(?errors, "upload rejected");
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::<MergeResponse>::err(errors.join("\n"))),
        )
            .into_response();
    }

    let result = tokio::task::spawn_blocking(move || process_uploads(&state, &request)).await;

    match result {
        Ok(Ok(response)) => (StatusCode::OK, Json(ApiResponse::ok(response))).into_response(),
        Ok(Err(e)) => {
            error!(error = %format!("{:#}", e), "merge failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<MergeResponse>::err(format!(
                    "Merge failed. Possibly invalid input files. {:#}",
                    e
                ))),
            )
                .into_response()
        }
        Err(e) => {
            error!(error = %e, "merge task panicked");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<MergeResponse>::err("Merge failed".to_string())),
            )
                .into_response()
        }
    }
}

fn query_runs(conn: &Connection, query: &RunsQuery) -> anyhow::Result<Vec<RunRecord>> {
    let limit = query.limit.unwrap_or(20);

    if let Some(sha256) = &query.sha256 {
        let mut runs = db::runs_using_file(conn, sha256)?;
        runs.truncate(limit);
        return Ok(runs);
    }

    let kind = query
        .kind
        .as_deref()
        .map(str::parse::<RunKind>)
        .transpose()
        .map_err(|e| anyhow!(e))?;
    db::recent_runs(conn, kind, limit)
}

/// GET /api/runs - Recent runs, by kind or by input file
async fn recent_runs(
    State(state): State<AppState>,
    Query(query): Query<RunsQuery>,
) -> impl IntoResponse {
    let Ok(conn) = state.db.lock() else {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::<Vec<RunRecord>>::err("audit database unavailable".to_string())),
        )
            .into_response();
    };

    match query_runs(&conn, &query) {
        Ok(runs) => (StatusCode::OK, Json(ApiResponse::ok(runs))).into_response(),
        Err(e) => {
            warn!(error = %e, "runs query failed");
            (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::<Vec<RunRecord>>::err(e.to_string())),
            )
                .into_response()
        }
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => NeighbourhoodConfig::from_file(path)?,
        None => NeighbourhoodConfig::default(),
    };

    let conn = db::open_database(&args.db)?;
    info!(db = ?args.db, "audit database opened");

    // Create shared state
    let state = AppState {
        config: Arc::new(config),
        archive_dir: args.archive_dir.clone(),
        output_dir: args.output_dir.clone(),
        db: Arc::new(Mutex::new(conn)),
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/merge", post(merge_uploads))
        .route("/runs", get(recent_runs))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&args.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", args.listen))?;

    info!(listen = %args.listen, "server running");

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(filename: &str, content: &str) -> Upload {
        Upload {
            filename: filename.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn test_snapshot_name() {
        assert!(is_snapshot_name("PO-03-07-24.csv", DatasetKind::PropertyOwners));
        assert!(!is_snapshot_name("PO-3-7-24.csv", DatasetKind::PropertyOwners));
        assert!(!is_snapshot_name("BL-03-07-24.csv", DatasetKind::PropertyOwners));
        assert!(!is_snapshot_name("BL-03-07-24.txt", DatasetKind::BusinessLicenses));
    }

    #[test]
    fn test_validate_names_before_contents() {
        // Bad PO name, BL with a short header: only the name errors come back
        let request = MergeRequest {
            property_owners: upload("owners.xls", "a,b"),
            business_licenses: upload("BL-03-07-24.csv", "a,b,c\n"),
        };

        let errors = validate(&request);

        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("with .csv extension"));
        assert!(errors[1].contains("PO-mm-dd-yy.csv"));
    }

    #[test]
    fn test_validate_widths_once_names_pass() {
        let request = MergeRequest {
            property_owners: upload("PO-03-07-24.csv", ""),
            business_licenses: upload("BL-03-07-24.csv", "a,b,c\n"),
        };

        let errors = validate(&request);

        assert_eq!(errors.len(), 4);
        assert_eq!(errors[0], "Property Owners file is empty.");
        assert_eq!(errors[1], "Business License file has wrong number of fields. Got 3, expected 15.");
        assert_eq!(errors[3], "Got these columns: a,b,c");
    }

    #[test]
    fn test_query_runs_filters() {
        let conn = Connection::open_in_memory().unwrap();
        db::setup_database(&conn).unwrap();

        let upload = InputFile::from_bytes("property_owners", "PO-03-07-24.csv", b"po");
        let merge = RunRecord::new(RunKind::Merge, "web", serde_json::json!({})).with_input(upload.clone());
        db::record_run(&conn, &merge).unwrap();
        db::record_run(&conn, &RunRecord::new(RunKind::Diff, "cli", serde_json::json!({}))).unwrap();

        let query = |kind: Option<&str>, sha256: Option<&str>| RunsQuery {
            limit: None,
            kind: kind.map(str::to_string),
            sha256: sha256.map(str::to_string),
        };

        assert_eq!(query_runs(&conn, &query(None, None)).unwrap().len(), 2);
        assert_eq!(query_runs(&conn, &query(Some("diff"), None)).unwrap()[0].kind, RunKind::Diff);

        let by_file = query_runs(&conn, &query(None, Some(&upload.sha256))).unwrap();
        assert_eq!(by_file.len(), 1);
        assert_eq!(by_file[0].run_id, merge.run_id);

        assert!(query_runs(&conn, &query(Some("import"), None)).is_err());
    }
}

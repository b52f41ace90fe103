//! Router, request handlers and server startup

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use minijinja::context;
use tower_http::services::ServeDir;

use super::pages::{self, Pages};
use super::response::{MatchPage, UploadOutcome, render};
use crate::config::MatchViewConfig;
use crate::ingest::{self, IngestError};
use crate::matching::{self, FeatureMatcher};
use crate::storage::{PUBLIC_PREFIX, UploadDir};

/// Shared, read-only state handed to every request
#[derive(Clone)]
pub struct AppState {
    pub uploads: UploadDir,
    pub matcher: Arc<dyn FeatureMatcher>,
    pub pages: Arc<Pages>,
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    let static_files = ServeDir::new(state.uploads.root());
    Router::new()
        .route("/", get(index))
        .route("/upload", post(upload))
        .nest_service(PUBLIC_PREFIX, static_files)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

/// Bind the listener and serve until Ctrl+C
pub async fn run(config: MatchViewConfig) -> anyhow::Result<()> {
    let uploads = UploadDir::new(&config.upload_dir);
    uploads.ensure().with_context(|| {
        format!(
            "Could not create upload directory {}",
            config.upload_dir.display()
        )
    })?;

    let matcher = matching::from_config(&config.matcher);
    let pages = Arc::new(Pages::load()?);
    log::info!(
        "Serving uploads from {} with the {} matcher",
        uploads.root().display(),
        matcher.name()
    );

    let state = AppState {
        uploads,
        matcher,
        pages,
    };
    let app = router(state, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("Could not bind {}", config.listen_addr))?;
    log::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl+C: {}", err);
        std::future::pending::<()>().await;
    }
    log::info!("Shutting down");
}

async fn index(State(state): State<AppState>) -> Response {
    render(&state.pages, StatusCode::OK, pages::INDEX, context! {})
}

async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let outcome = match multipart {
        Ok(multipart) => process_upload(&state, multipart).await,
        Err(rejection) => {
            log::debug!("Upload rejected: {}", rejection);
            UploadOutcome::Rejected
        }
    };
    outcome.respond(&state.pages)
}

async fn process_upload(state: &AppState, multipart: Multipart) -> UploadOutcome {
    let stored = match receive_and_store(&state.uploads, multipart).await {
        Ok(stored) => stored,
        Err(err) if err.is_rejection() => {
            log::debug!("Upload rejected: {}", err);
            return UploadOutcome::Rejected;
        }
        Err(IngestError::Multipart(err)) => {
            log::warn!("Malformed upload: {}", err);
            return UploadOutcome::failed(err.status(), err.body_text());
        }
        Err(err) => {
            log::error!("{}", err);
            return UploadOutcome::failed(
                StatusCode::INTERNAL_SERVER_ERROR,
                "The uploaded images could not be stored.",
            );
        }
    };

    // the result file is created, written and kept entirely inside the task
    let uploads = state.uploads.clone();
    let matcher = Arc::clone(&state.matcher);
    let joined = tokio::task::spawn_blocking(move || {
        uploads.write_result(|out| matcher.match_images(&stored.origin, &stored.concat, out))
    })
    .await;

    let (report, result) = match joined {
        Ok(Ok(done)) => done,
        Ok(Err(err)) if err.is_input_error() => {
            log::warn!("Matching failed: {}", err);
            return UploadOutcome::failed(StatusCode::UNPROCESSABLE_ENTITY, err.to_string());
        }
        Ok(Err(err)) => {
            log::error!("Matching failed: {}", err);
            return UploadOutcome::failed(StatusCode::INTERNAL_SERVER_ERROR, err.to_string());
        }
        Err(err) => {
            log::error!("Matching task panicked: {}", err);
            return UploadOutcome::failed(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Feature matching failed unexpectedly.",
            );
        }
    };

    log::info!(
        "Matched {} against {} keypoints: {} matches -> {}",
        report.origin_keypoints,
        report.concat_keypoints,
        report.matches,
        result.path.display()
    );

    UploadOutcome::Succeeded(MatchPage {
        result_image: result.url,
        report,
        backend: state.matcher.name(),
        generated_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
    })
}

async fn receive_and_store(
    uploads: &UploadDir,
    multipart: Multipart,
) -> Result<ingest::StoredPair, IngestError> {
    let pair = ingest::receive(multipart).await?;
    ingest::persist(uploads, &pair).await
}

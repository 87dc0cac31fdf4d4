//! Upload handlers.
//!
//! Multipart fields are named after the session role (`intro`, `main`
//! or `main_track`, `outro`) and are streamed to disk one at a time.

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use podcaster_models::{Role, SessionId, StoredFile};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Serialize)]
pub struct UploadResponse {
    pub session_id: SessionId,
    pub stored_files: Vec<StoredFile>,
}

/// POST /api/uploads
///
/// Allocates a new session. If any file fails, nothing of the session is kept.
pub async fn create_session(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<UploadResponse>)> {
    let session_id = SessionId::generate();
    match ingest_fields(&state, &session_id, multipart).await {
        Ok(stored_files) => {
            info!(session_id = %session_id, files = stored_files.len(), "Upload session created");
            Ok((
                StatusCode::CREATED,
                Json(UploadResponse {
                    session_id,
                    stored_files,
                }),
            ))
        }
        Err(e) => {
            state.uploads.discard(&session_id).await;
            Err(e)
        }
    }
}

/// POST /api/uploads/:session_id
///
/// Adds or replaces files of an existing session. Files committed before
/// a failing field are kept. Sessions referenced by any job are `409`.
pub async fn add_to_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let session_id = SessionId::parse(session_id)?;
    state.uploads.ensure_appendable(&session_id).await?;
    let stored_files = ingest_fields(&state, &session_id, multipart).await?;
    Ok(Json(UploadResponse {
        session_id,
        stored_files,
    }))
}

async fn ingest_fields(
    state: &AppState,
    session_id: &SessionId,
    mut multipart: Multipart,
) -> ApiResult<Vec<StoredFile>> {
    let mut stored = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        let Some(role) = field.name().and_then(Role::from_field_name) else {
            debug!(field = ?field.name(), "Ignoring unknown upload field");
            continue;
        };
        let file_name = field
            .file_name()
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| role.to_string());
        stored.push(
            state
                .uploads
                .store_file(session_id, role, &file_name, field)
                .await?,
        );
    }

    if stored.is_empty() {
        return Err(ApiError::bad_request(
            "No files uploaded; expected intro, main or outro fields",
        ));
    }
    Ok(stored)
}

//! Artifact downloads.
//!
//! Serves `<releases_path>/<project name>/<version>/<file>` for binaries the
//! catalog knows about. Anything not recorded in the catalog is a 404, even if
//! a file happens to exist on disk.

use std::io;

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;

use super::{ApiError, AppState};
use crate::build::validate_path_component;
use crate::catalog::Catalog;
use crate::types::ProjectId;

/// `GET /releases/{id}/{version}/{file}`
pub async fn download_handler(
    State(app_state): State<AppState>,
    Path((id, version, file)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let project = app_state.catalog().get(&ProjectId::new(id)).await?;

    let listed = project
        .releases
        .get(&version)
        .is_some_and(|release| release.binaries.iter().any(|b| b.file_name == file));
    if !listed {
        return Err(ApiError::NotFound);
    }

    for component in [&project.name, &version, &file] {
        validate_path_component(component).map_err(|_| ApiError::NotFound)?;
    }

    let path = app_state
        .config()
        .build
        .releases_path
        .join(&project.name)
        .join(&version)
        .join(&file);
    let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ApiError::NotFound,
        _ => ApiError::Internal(format!("{}: {}", path.display(), e)),
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file.replace('"', "")),
            ),
        ],
        bytes,
    ))
}

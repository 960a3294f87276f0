//! Read endpoints over the catalog.

use axum::Json;
use axum::extract::{Path, State};

use super::{ApiError, AppState};
use crate::aggregate::project_views;
use crate::catalog::Catalog;
use crate::types::{Project, ProjectId, ProjectUI};

/// `GET /api/v1/project`
///
/// Every project with its latest release and download URLs, sorted by name.
pub async fn list_handler(State(app_state): State<AppState>) -> Result<Json<Vec<ProjectUI>>, ApiError> {
    let projects = app_state.catalog().list().await?;
    Ok(Json(project_views(&projects, &app_state.config().app.domain)))
}

/// `GET /api/v1/project/{id}`
///
/// The stored project as-is. Unknown ids are answered from an existence
/// check without reading a document.
pub async fn get_handler(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Project>, ApiError> {
    let id = ProjectId::new(id);
    let catalog = app_state.catalog();
    if !catalog.exists(&id).await? {
        return Err(ApiError::NotFound);
    }

    let project = catalog.get(&id).await?;
    Ok(Json(project))
}

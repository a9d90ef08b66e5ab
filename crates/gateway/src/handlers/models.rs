//! Model catalog handler

use axum::{extract::State, Json};

use crate::AppState;
use ragline_common::{answerer::ModelCatalog, auth::AuthContext, errors::Result};

/// Proxy the backend's model catalog to authenticated callers
pub async fn list_models(
    State(state): State<AppState>,
    _auth: AuthContext,
) -> Result<Json<ModelCatalog>> {
    let catalog = state.answerer.list_models().await?;

    Ok(Json(catalog))
}

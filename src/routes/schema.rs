//! Schema metadata route handlers

use crate::schema::MetadataDocument;
use crate::state::SharedState;
use axum::{extract::State, Json};
use tracing::{debug, info};

/// Describe every entity of the configured application namespace
pub async fn get_models_info(State(state): State<SharedState>) -> Json<MetadataDocument> {
    debug!("Reflecting models of '{}'", state.app_label);

    let document = state.document();

    info!("Described {} models of '{}'", document.len(), state.app_label);

    Json(document)
}

//! Link registry route handlers

use crate::error::ApiResult;
use crate::links::LinkEntry;
use crate::models::{RecordId, SuccessResponse, WorkspaceId, WorkspaceRecordId};
use crate::state::SharedState;
use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinksResponse {
    pub key: WorkspaceRecordId,
    pub entry: LinkEntry,
    /// The original this record was copied from, if any
    pub canonical_source: Option<WorkspaceRecordId>,
}

/// Get the link entry of a record
pub async fn get_links(
    State(state): State<SharedState>,
    Path((workspace, record)): Path<(WorkspaceId, RecordId)>,
) -> ApiResult<Json<SuccessResponse<LinksResponse>>> {
    let key = WorkspaceRecordId::new(workspace, record);
    let entry = state.links.load(key).await?;
    let canonical_source = state.links.canonical_source(key).await?;

    Ok(Json(SuccessResponse::with_data(
        format!("{} linked child(ren).", entry.linked_children().len()),
        LinksResponse {
            key,
            entry,
            canonical_source,
        },
    )))
}

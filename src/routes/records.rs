//! Record action and hook route handlers

use crate::broadcast::{ActionReport, LifecycleEvent, RecordAction, SaveHookOutcome};
use crate::error::{validation_error, ApiResult};
use crate::models::{RecordId, SuccessResponse, WorkspaceId, WorkspaceRecordId};
use crate::state::SharedState;
use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use validator::Validate;

/// Bulk action on records of one workspace
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub workspace: WorkspaceId,
    pub action: RecordAction,
    #[validate(length(min = 1, message = "At least one record id is required"))]
    pub record_ids: Vec<RecordId>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub record_id: RecordId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ActionReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Apply an action to every listed record; failures are reported per record
pub async fn apply_actions(
    State(state): State<SharedState>,
    Json(payload): Json<ActionRequest>,
) -> ApiResult<Json<SuccessResponse<Vec<ActionResult>>>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let mut results = Vec::with_capacity(payload.record_ids.len());
    for &record_id in &payload.record_ids {
        let result = match state
            .broadcaster
            .apply_action(payload.workspace, record_id, payload.action)
            .await
        {
            Ok(report) => ActionResult {
                record_id,
                report: Some(report),
                error: None,
            },
            Err(e) => {
                warn!("{:?} failed for {}/{}: {}", payload.action, payload.workspace, record_id, e);
                ActionResult {
                    record_id,
                    report: None,
                    error: Some(e.to_string()),
                }
            }
        };
        results.push(result);
    }

    Ok(Json(SuccessResponse::with_data(
        format!("Applied {:?} to {} record(s).", payload.action, results.len()),
        results,
    )))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedRequest {
    pub user_id: u64,
}

/// Save hook: broadcast with the user's last used settings
pub async fn record_saved(
    State(state): State<SharedState>,
    Path((workspace, record)): Path<(WorkspaceId, RecordId)>,
    Json(payload): Json<SavedRequest>,
) -> ApiResult<Json<SuccessResponse<SaveHookOutcome>>> {
    let key = WorkspaceRecordId::new(workspace, record);
    debug!("Record {} saved by user {}", key, payload.user_id);

    let outcome = state.broadcaster.handle_saved_record(payload.user_id, key).await?;
    let message = match &outcome {
        SaveHookOutcome::Skipped { reason } => format!("Not broadcast: {:?}.", reason),
        SaveHookOutcome::Broadcast { outcomes } => format!("Broadcast to {} workspace(s).", outcomes.len()),
    };

    Ok(Json(SuccessResponse::with_data(message, outcome)))
}

#[derive(Debug, Deserialize)]
pub struct LifecycleRequest {
    pub event: LifecycleEvent,
}

/// Propagate trash, untrash or delete of a source record
pub async fn record_lifecycle(
    State(state): State<SharedState>,
    Path((workspace, record)): Path<(WorkspaceId, RecordId)>,
    Json(payload): Json<LifecycleRequest>,
) -> ApiResult<Json<SuccessResponse<ActionReport>>> {
    let key = WorkspaceRecordId::new(workspace, record);
    let report = state.broadcaster.handle_lifecycle(key, payload.event).await?;

    Ok(Json(SuccessResponse::with_data(
        format!("{:?} propagated to {} record(s).", payload.event, report.affected.len()),
        report,
    )))
}

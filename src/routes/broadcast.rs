//! Broadcast route handlers

use crate::broadcast::{BroadcastRequest, TargetOutcome};
use crate::error::{validation_error, ApiResult};
use crate::models::{RecordId, SuccessResponse, WorkspaceId, WorkspaceRecordId};
use crate::state::SharedState;
use axum::{extract::State, Json};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};
use validator::Validate;

/// Result of one broadcast operation
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastResponse {
    pub operation: uuid::Uuid,
    pub source: WorkspaceRecordId,
    pub outcomes: Vec<TargetOutcome>,
    /// Every linked child of the source after the operation
    pub linked_children: BTreeMap<WorkspaceId, RecordId>,
}

/// Broadcast a record to the requested workspaces
pub async fn broadcast_record(
    State(state): State<SharedState>,
    Json(payload): Json<BroadcastRequest>,
) -> ApiResult<Json<SuccessResponse<BroadcastResponse>>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    debug!("Broadcast requested for {} to {:?}", payload.source(), payload.targets);

    let ctx = state.broadcaster.prepare(&payload).await?;
    let ctx = state.broadcaster.replicate(ctx).await?;

    let linked_children = state.links.load(ctx.source).await?.linked_children().clone();
    let copies = ctx.copies().len();
    info!("Broadcast {} finished: {} of {} target(s) written", ctx.id, copies, ctx.outcomes.len());

    Ok(Json(SuccessResponse::with_data(
        format!("Broadcast to {} workspace(s).", copies),
        BroadcastResponse {
            operation: ctx.id,
            source: ctx.source,
            outcomes: ctx.outcomes,
            linked_children,
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::{Broadcaster, TargetStatus};
    use crate::config::BroadcastPolicy;
    use crate::links::LinkRegistry;
    use crate::models::{Record, RecordStatus};
    use crate::preferences::PreferenceStore;
    use crate::state::AppState;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    async fn state() -> (tempfile::TempDir, SharedState) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new(dir.path()));
        store.add_workspace(1, "http://one.test").await;
        store.add_workspace(2, "http://two.test").await;
        store
            .put_record(
                1,
                Record {
                    id: 100,
                    guid: "http://one.test/?p=100".to_string(),
                    record_type: "post".to_string(),
                    status: RecordStatus::Publish,
                    name: "hello".to_string(),
                    title: "Hello".to_string(),
                    body: String::new(),
                    excerpt: String::new(),
                    parent: None,
                    author: None,
                    menu_order: 0,
                    comment_count: 0,
                },
            )
            .await
            .unwrap();

        let broadcaster = Broadcaster::new(
            store,
            LinkRegistry::in_memory(),
            Arc::new(PreferenceStore::in_memory()),
            BroadcastPolicy::default(),
        );
        (dir, Arc::new(AppState::new(Arc::new(broadcaster))))
    }

    fn request(targets: Vec<WorkspaceId>) -> BroadcastRequest {
        serde_json::from_value(serde_json::json!({
            "workspace": 1,
            "recordId": 100,
            "targets": targets,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_broadcast_returns_children() {
        let (_dir, state) = state().await;

        let Json(response) = broadcast_record(State(state), Json(request(vec![2])))
            .await
            .unwrap();
        let data = response.data.unwrap();

        assert_eq!(data.outcomes[0].status, TargetStatus::Created);
        assert_eq!(data.linked_children.get(&2), data.outcomes[0].record_id.as_ref());
    }

    #[tokio::test]
    async fn test_empty_targets_fail_validation() {
        let (_dir, state) = state().await;
        let result = broadcast_record(State(state), Json(request(vec![]))).await;
        assert!(matches!(result, Err(crate::error::AppError::Validation(_))));
    }
}

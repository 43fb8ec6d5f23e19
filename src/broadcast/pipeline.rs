//! Extension stages
//!
//! External logic observes and rewrites a replication by registering
//! handlers on named stages. Handlers run in ascending priority order
//! (registration order breaks ties) and may stop propagation by returning
//! [`StageFlow::Finish`].

use super::context::BroadcastContext;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Named checkpoints of a replication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    BroadcastingStarted,
    BroadcastingAfterSwitchTarget,
    BroadcastingModifyBody,
    BroadcastingBeforeRestoreContext,
    BroadcastingFinished,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::BroadcastingStarted => "broadcasting_started",
            Stage::BroadcastingAfterSwitchTarget => "broadcasting_after_switch_target",
            Stage::BroadcastingModifyBody => "broadcasting_modify_body",
            Stage::BroadcastingBeforeRestoreContext => "broadcasting_before_restore_context",
            Stage::BroadcastingFinished => "broadcasting_finished",
        };
        write!(f, "{}", name)
    }
}

/// What a handler wants to happen next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageFlow {
    Continue,
    /// Skip the remaining handlers of this stage
    Finish,
}

pub trait StageHandler: Send + Sync {
    fn name(&self) -> &str {
        "anonymous"
    }

    fn handle(&self, stage: Stage, ctx: &mut BroadcastContext) -> StageFlow;
}

impl<F> StageHandler for F
where
    F: Fn(Stage, &mut BroadcastContext) -> StageFlow + Send + Sync,
{
    fn handle(&self, stage: Stage, ctx: &mut BroadcastContext) -> StageFlow {
        self(stage, ctx)
    }
}

struct Registered {
    priority: i32,
    handler: Arc<dyn StageHandler>,
}

/// Ordered handler lists per stage
#[derive(Default)]
pub struct Pipeline {
    stages: HashMap<Stage, Vec<Registered>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler; lower priorities run first
    pub fn register(&mut self, stage: Stage, priority: i32, handler: impl StageHandler + 'static) {
        let handlers = self.stages.entry(stage).or_default();
        handlers.push(Registered {
            priority,
            handler: Arc::new(handler),
        });
        // Stable sort keeps registration order for equal priorities.
        handlers.sort_by_key(|r| r.priority);
    }

    pub fn handler_count(&self, stage: Stage) -> usize {
        self.stages.get(&stage).map(Vec::len).unwrap_or(0)
    }

    /// Run a stage. Returns true when a handler finished it early.
    pub fn dispatch(&self, stage: Stage, ctx: &mut BroadcastContext) -> bool {
        let Some(handlers) = self.stages.get(&stage) else {
            return false;
        };

        for registered in handlers {
            if registered.handler.handle(stage, ctx) == StageFlow::Finish {
                debug!("Stage {} finished by handler {}", stage, registered.handler.name());
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::context::Facets;
    use crate::models::{Record, RecordStatus};
    use std::sync::Mutex;

    fn context() -> BroadcastContext {
        let record = Record {
            id: 1,
            guid: String::new(),
            record_type: "post".to_string(),
            status: RecordStatus::Publish,
            name: "a".to_string(),
            title: "A".to_string(),
            body: String::new(),
            excerpt: String::new(),
            parent: None,
            author: None,
            menu_order: 0,
            comment_count: 0,
        };
        BroadcastContext::new(record, 1, &[2], Facets::default())
    }

    #[test]
    fn test_priority_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = Pipeline::new();

        for (priority, label) in [(10, "late"), (-5, "early"), (10, "late-second")] {
            let calls = Arc::clone(&calls);
            pipeline.register(Stage::BroadcastingStarted, priority, move |_: Stage, _: &mut BroadcastContext| {
                calls.lock().unwrap().push(label);
                StageFlow::Continue
            });
        }

        let mut ctx = context();
        assert!(!pipeline.dispatch(Stage::BroadcastingStarted, &mut ctx));
        assert_eq!(*calls.lock().unwrap(), vec!["early", "late", "late-second"]);
    }

    #[test]
    fn test_finish_short_circuits() {
        let mut pipeline = Pipeline::new();
        pipeline.register(Stage::BroadcastingFinished, 0, |_: Stage, ctx: &mut BroadcastContext| {
            ctx.targets.clear();
            StageFlow::Finish
        });
        pipeline.register(Stage::BroadcastingFinished, 1, |_: Stage, ctx: &mut BroadcastContext| {
            ctx.targets.push(99);
            StageFlow::Continue
        });

        let mut ctx = context();
        assert!(pipeline.dispatch(Stage::BroadcastingFinished, &mut ctx));
        assert!(ctx.targets.is_empty());
    }

    #[test]
    fn test_empty_stage() {
        let pipeline = Pipeline::new();
        let mut ctx = context();
        assert!(!pipeline.dispatch(Stage::BroadcastingModifyBody, &mut ctx));
        assert_eq!(pipeline.handler_count(Stage::BroadcastingModifyBody), 0);
    }
}

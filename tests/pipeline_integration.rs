//! Cross-module pipeline invariants from spec.md §8: `SessionContext`
//! identity is invariant across a run, and a failing stage leaves the
//! concurrency manager clean (not processing, no queued waiters) the way
//! the message handler's fail-fast path relies on.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use agent_bridge::backend::BackendKind;
use agent_bridge::concurrency::ConcurrencyManager;
use agent_bridge::context_builder::ContextBuilder;
use agent_bridge::error::{BridgeError, Result};
use agent_bridge::pipeline::{Pipeline, PipelineOutcome, Stage, StageContext, TurnInput};
use agent_bridge::pool::AssistantPool;
use agent_bridge::session::SessionContext;

struct IdentityCheckingStage {
    expected_id: String,
}

#[async_trait]
impl Stage for IdentityCheckingStage {
    fn name(&self) -> &'static str {
        "identity-check"
    }

    async fn run(&self, ctx: &StageContext<'_>, _outcome: &mut PipelineOutcome) -> Result<()> {
        assert_eq!(ctx.session.session_id(), self.expected_id);
        Ok(())
    }
}

struct AlwaysFailsStage;

#[async_trait]
impl Stage for AlwaysFailsStage {
    fn name(&self) -> &'static str {
        "always-fails"
    }

    async fn run(&self, _ctx: &StageContext<'_>, _outcome: &mut PipelineOutcome) -> Result<()> {
        Err(BridgeError::PipelineStage {
            stage: "always-fails".to_string(),
            message: "synthetic failure".to_string(),
        })
    }
}

fn turn() -> TurnInput {
    TurnInput {
        message_id: "m1".to_string(),
        content: "hi".to_string(),
        working_dir: PathBuf::from("."),
        resume_backend_session_id: None,
        system_prompt: None,
        allowed_tools: Vec::new(),
    }
}

#[tokio::test]
async fn session_id_is_invariant_across_stages() {
    let session = SessionContext::new(BackendKind::Claude);
    let expected_id = session.session_id().to_string();

    let pipeline = Pipeline::new(vec![
        Box::new(IdentityCheckingStage {
            expected_id: expected_id.clone(),
        }),
        Box::new(IdentityCheckingStage { expected_id }),
    ]);

    let turn = turn();
    pipeline
        .run(
            &session,
            CancellationToken::new(),
            Arc::new(AssistantPool::new()),
            Arc::new(ContextBuilder::new("http://127.0.0.1:1")),
            &turn,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn stage_failure_leaves_concurrency_manager_clean() {
    let concurrency = ConcurrencyManager::new();
    concurrency.acquire_lock("s1", "m1").await.unwrap();

    let session = SessionContext::new(BackendKind::Claude);
    let pipeline = Pipeline::new(vec![Box::new(AlwaysFailsStage)]);
    let turn = turn();
    let result = pipeline
        .run(
            &session,
            CancellationToken::new(),
            Arc::new(AssistantPool::new()),
            Arc::new(ContextBuilder::new("http://127.0.0.1:1")),
            &turn,
        )
        .await;
    assert!(result.is_err());

    // The message handler always releases the lock regardless of
    // pipeline outcome; simulate that here and assert the manager ends
    // up idle with no stranded waiters.
    concurrency.release_lock("s1").await;
    assert!(concurrency.active_message_ids().await.is_empty());
}

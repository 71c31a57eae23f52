//! The message pipeline (C6): runs a fixed sequence of stages for one
//! turn, each under its own timeout and a shared cancellation token,
//! emitting the named lifecycle events. Grounded on
//! `other_examples/.../gateway-bridge.rs`'s `tokio::select!` +
//! `CancellationToken` shutdown pattern, generalized from a single select
//! to a stage sequence.

pub mod stages;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::context_builder::ContextBuilder;
use crate::error::{BridgeError, Result};
use crate::pool::AssistantPool;
use crate::session::SessionContext;

pub use stages::{PipelineOutcome, Stage, StageContext, TurnInput};

/// Default per-stage timeout, overridden per stage name via
/// [`Pipeline::with_stage_timeout`].
const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 120;

pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    stage_timeouts: HashMap<&'static str, Duration>,
}

impl Pipeline {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self {
            stages,
            stage_timeouts: HashMap::new(),
        }
    }

    pub fn with_stage_timeout(mut self, stage: &'static str, timeout: Duration) -> Self {
        self.stage_timeouts.insert(stage, timeout);
        self
    }

    fn timeout_for(&self, stage: &'static str) -> Duration {
        self.stage_timeouts
            .get(stage)
            .copied()
            .unwrap_or(Duration::from_secs(DEFAULT_STAGE_TIMEOUT_SECS))
    }

    /// Run every stage in order against `session`. Emits
    /// `pipeline:start`/`stage:<name>:start`/`stage:<name>:complete`/
    /// `pipeline:complete` (or `pipeline:error`) onto the session's event
    /// log as it goes. On the first stage failure or cancellation, runs
    /// no further stages and returns the error -- callers are expected to
    /// treat this as fail-fast and release the concurrency lock
    /// regardless of outcome.
    pub async fn run(
        &self,
        session: &SessionContext,
        cancel: CancellationToken,
        pool: Arc<AssistantPool>,
        context_builder: Arc<ContextBuilder>,
        turn: &TurnInput,
    ) -> Result<PipelineOutcome> {
        session.push_event("pipeline:start", HashMap::new()).await;

        let mut outcome = PipelineOutcome::default();
        for stage in &self.stages {
            let name = stage.name();
            session
                .push_event(format!("stage:{name}:start"), HashMap::new())
                .await;

            let timeout = self.timeout_for(name);
            let ctx = StageContext {
                session,
                cancel: cancel.clone(),
                pool: pool.clone(),
                context_builder: context_builder.clone(),
                turn,
            };

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    Err(BridgeError::PipelineStage {
                        stage: name.to_string(),
                        message: "cancelled".to_string(),
                    })
                }
                result = tokio::time::timeout(timeout, stage.run(&ctx, &mut outcome)) => {
                    match result {
                        Ok(inner) => inner,
                        Err(_) => Err(BridgeError::PipelineStageTimeout {
                            stage: name.to_string(),
                            timeout_secs: timeout.as_secs(),
                        }),
                    }
                }
            };

            match result {
                Ok(()) => {
                    session
                        .push_event(format!("stage:{name}:complete"), HashMap::new())
                        .await;
                }
                Err(err) => {
                    let mut detail = HashMap::new();
                    detail.insert("error".to_string(), err.to_string());
                    session.push_event("pipeline:error", detail).await;
                    return Err(err);
                }
            }
        }

        session.push_event("pipeline:complete", HashMap::new()).await;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendKind;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingStage {
        name: &'static str,
        order: Arc<std::sync::Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    #[async_trait]
    impl Stage for RecordingStage {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn run(&self, _ctx: &StageContext<'_>, _outcome: &mut PipelineOutcome) -> Result<()> {
            self.order.lock().unwrap().push(self.name);
            if self.fail {
                return Err(BridgeError::PipelineStage {
                    stage: self.name.to_string(),
                    message: "boom".to_string(),
                });
            }
            Ok(())
        }
    }

    fn test_turn() -> TurnInput {
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
    async fn runs_stages_in_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let pipeline = Pipeline::new(vec![
            Box::new(RecordingStage {
                name: "one",
                order: order.clone(),
                fail: false,
            }),
            Box::new(RecordingStage {
                name: "two",
                order: order.clone(),
                fail: false,
            }),
        ]);
        let session = SessionContext::new(BackendKind::Claude);
        let turn = test_turn();
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
        assert_eq!(*order.lock().unwrap(), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn stops_after_first_failure() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let pipeline = Pipeline::new(vec![
            Box::new(RecordingStage {
                name: "one",
                order: order.clone(),
                fail: true,
            }),
            Box::new(RecordingStage {
                name: "two",
                order: order.clone(),
                fail: false,
            }),
        ]);
        let session = SessionContext::new(BackendKind::Claude);
        let turn = test_turn();
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
        assert_eq!(*order.lock().unwrap(), vec!["one"]);
    }

    #[tokio::test]
    async fn cancellation_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        struct Slow(Arc<AtomicUsize>);
        #[async_trait]
        impl Stage for Slow {
            fn name(&self) -> &'static str {
                "slow"
            }
            async fn run(
                &self,
                _ctx: &StageContext<'_>,
                _outcome: &mut PipelineOutcome,
            ) -> Result<()> {
                self.0.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                Ok(())
            }
        }

        let pipeline = Pipeline::new(vec![Box::new(Slow(calls.clone()))]);
        let session = SessionContext::new(BackendKind::Claude);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let turn = test_turn();
        let result = pipeline
            .run(
                &session,
                cancel,
                Arc::new(AssistantPool::new()),
                Arc::new(ContextBuilder::new("http://127.0.0.1:1")),
                &turn,
            )
            .await;
        assert!(result.is_err());
    }
}

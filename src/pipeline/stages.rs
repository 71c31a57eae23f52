//! The five pipeline stages from spec.md §4.7: acquire-lock,
//! check-context-injection, inject-context, stream-response, finalize.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::context_builder::ContextBuilder;
use crate::error::Result;
use crate::pool::AssistantPool;
use crate::session::SessionContext;

/// Accumulated state threaded through the stage sequence. Each stage
/// reads what earlier stages wrote and adds its own contribution.
#[derive(Default)]
pub struct PipelineOutcome {
    /// Whether the editing context (if any) is up to date for this turn
    /// -- either there was nothing to inject, or a full injection had
    /// already been done for the current entity and only the minimal
    /// prefix was needed.
    pub context_injected: bool,
    /// Whether THIS turn performed a full injection (distinct from
    /// `context_injected`, which is also true when nothing needed
    /// injecting at all). Drives the `session:context_injected` event.
    pub full_injection_performed: bool,
    pub response_text: String,
    pub thinking_text: String,
    pub tool_uses: Vec<(String, String, serde_json::Value)>,
    pub tool_results: Vec<(String, String, bool)>,
    pub backend_session_id: Option<String>,
    pub context_usage: Option<crate::session::ContextUsage>,
}

/// Total context window size assumed for `percent` when a backend reports
/// token usage without also reporting a window size of its own.
const DEFAULT_CONTEXT_WINDOW: u64 = 200_000;

/// The inputs for the current turn that stages need but that don't
/// belong on `SessionContext` itself (it's the message handler's job to
/// gather these, not the session's).
pub struct TurnInput {
    pub message_id: String,
    pub content: String,
    pub working_dir: PathBuf,
    pub resume_backend_session_id: Option<String>,
    pub system_prompt: Option<String>,
    pub allowed_tools: Vec<String>,
}

pub struct StageContext<'a> {
    pub session: &'a SessionContext,
    pub cancel: CancellationToken,
    pub pool: Arc<AssistantPool>,
    pub context_builder: Arc<ContextBuilder>,
    pub turn: &'a TurnInput,
}

#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;
    async fn run(&self, ctx: &StageContext<'_>, outcome: &mut PipelineOutcome) -> Result<()>;
}

/// acquire-lock: the pipeline itself does not call
/// [`crate::concurrency::ConcurrencyManager`] -- the message handler
/// acquires the lock before constructing the pipeline run so it can
/// release it in its own fail-fast path. This stage only records that the
/// lock is held by transitioning the session to `Locked`.
pub struct AcquireLockStage;

#[async_trait]
impl Stage for AcquireLockStage {
    fn name(&self) -> &'static str {
        "acquire-lock"
    }

    async fn run(&self, ctx: &StageContext<'_>, _outcome: &mut PipelineOutcome) -> Result<()> {
        ctx.session
            .transition(crate::session::Status::Locked)
            .await
    }
}

/// check-context-injection: decides whether this turn needs a full
/// context injection. Rule: inject full if an editing context is
/// present AND its `entity_id` differs from the last one a full
/// injection was built for (covers both "first message for this entity"
/// and "the user switched entities"). Otherwise the minimal one-line
/// prefix (or nothing, if there's no editing context at all) suffices.
pub struct CheckContextInjectionStage;

#[async_trait]
impl Stage for CheckContextInjectionStage {
    fn name(&self) -> &'static str {
        "check-context-injection"
    }

    async fn run(&self, ctx: &StageContext<'_>, outcome: &mut PipelineOutcome) -> Result<()> {
        outcome.context_injected = match ctx.session.editing_context().await {
            None => true,
            Some(ec) => ec.last_injected_entity_id.as_deref() == ec.entity_id.as_deref(),
        };
        Ok(())
    }
}

/// inject-context: builds the full markdown injection (transitioning to
/// `Injecting`) when the prior stage found the entity not yet injected,
/// otherwise applies the lightweight minimal prefix (or leaves the
/// message untouched if there's no editing context). Either way,
/// overwrites `currentMessage.content` with the result so
/// `stream-response` sees the final text.
pub struct InjectContextStage;

#[async_trait]
impl Stage for InjectContextStage {
    fn name(&self) -> &'static str {
        "inject-context"
    }

    async fn run(&self, ctx: &StageContext<'_>, outcome: &mut PipelineOutcome) -> Result<()> {
        let Some(mut ec) = ctx.session.editing_context().await else {
            return Ok(());
        };

        let current_content = ctx
            .session
            .current_message()
            .await
            .map(|m| m.content)
            .unwrap_or_else(|| ctx.turn.content.clone());

        if outcome.context_injected {
            let prefixed = crate::context_builder::ContextBuilder::build_minimal_injection(
                &ec.entity_type,
                ec.entity_id.as_deref(),
                &current_content,
            );
            ctx.session
                .set_current_message(ctx.turn.message_id.clone(), prefixed)
                .await;
            return Ok(());
        }

        ctx.session
            .transition(crate::session::Status::Injecting)
            .await?;

        let injected = ctx
            .context_builder
            .build_full_injection(&ec.entity_type, ec.entity_id.as_deref(), &current_content)
            .await;
        ctx.session
            .set_current_message(ctx.turn.message_id.clone(), injected)
            .await;

        ec.context_injected = true;
        ec.last_injected_entity_id = ec.entity_id.clone();
        ctx.session.set_editing_context(ec).await;

        outcome.context_injected = true;
        outcome.full_injection_performed = true;
        Ok(())
    }
}

/// stream-response: transitions to `Streaming`, spawns the backend
/// process through the assistant pool for this turn, and drains it to
/// completion, folding the resulting messages into `outcome`.
pub struct StreamResponseStage;

#[async_trait]
impl Stage for StreamResponseStage {
    fn name(&self) -> &'static str {
        "stream-response"
    }

    async fn run(&self, ctx: &StageContext<'_>, outcome: &mut PipelineOutcome) -> Result<()> {
        ctx.session
            .transition(crate::session::Status::Streaming)
            .await?;

        let backend = ctx.session.backend().await;
        let content = ctx
            .session
            .current_message()
            .await
            .map(|m| m.content)
            .unwrap_or_else(|| ctx.turn.content.clone());
        let handle = ctx
            .pool
            .spawn(
                ctx.session.session_id(),
                backend,
                ctx.turn.working_dir.clone(),
                &content,
                ctx.turn.resume_backend_session_id.as_deref(),
                ctx.turn.system_prompt.as_deref(),
                &ctx.turn.allowed_tools,
            )
            .await?;

        let messages = {
            let mut cli = handle.lock().await;
            cli.stream_turn(None).await?
        };

        outcome.response_text = crate::backend::extract_content(&messages);
        outcome.thinking_text = crate::backend::extract_thinking(&messages);
        outcome.tool_uses = crate::backend::extract_tool_uses(&messages);
        outcome.tool_results = crate::backend::extract_tool_results(&messages);
        if let Some((input_tokens, output_tokens, cache_read_tokens, cache_write_tokens)) =
            crate::backend::extract_usage(&messages)
        {
            let used = input_tokens + output_tokens + cache_read_tokens + cache_write_tokens;
            outcome.context_usage = Some(crate::session::ContextUsage {
                used,
                total: DEFAULT_CONTEXT_WINDOW,
                percent: (used as f32 / DEFAULT_CONTEXT_WINDOW as f32) * 100.0,
            });
        }
        for message in &messages {
            if let crate::backend::StreamMessage::SessionInit { backend_session_id } = message {
                outcome.backend_session_id = Some(backend_session_id.clone());
                ctx.session
                    .set_backend_session_id(backend_session_id.clone())
                    .await;
            }
        }

        ctx.pool.remove(ctx.session.session_id());
        Ok(())
    }
}

/// finalize: transitions Streaming -> Finalizing -> Complete and clears
/// the inbound queue (handled by `SessionContext::transition` itself on
/// reaching `Complete`).
pub struct FinalizeStage;

#[async_trait]
impl Stage for FinalizeStage {
    fn name(&self) -> &'static str {
        "finalize"
    }

    async fn run(&self, ctx: &StageContext<'_>, _outcome: &mut PipelineOutcome) -> Result<()> {
        ctx.session
            .transition(crate::session::Status::Finalizing)
            .await?;
        ctx.session.transition(crate::session::Status::Complete).await
    }
}

/// Build the standard 5-stage pipeline in spec order.
pub fn standard_stages() -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(AcquireLockStage),
        Box::new(CheckContextInjectionStage),
        Box::new(InjectContextStage),
        Box::new(StreamResponseStage),
        Box::new(FinalizeStage),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendKind;
    use std::path::PathBuf;

    fn turn_input() -> TurnInput {
        TurnInput {
            message_id: "m1".to_string(),
            content: "hello".to_string(),
            working_dir: PathBuf::from("."),
            resume_backend_session_id: None,
            system_prompt: None,
            allowed_tools: Vec::new(),
        }
    }

    fn stage_ctx<'a>(session: &'a SessionContext, turn: &'a TurnInput) -> StageContext<'a> {
        StageContext {
            session,
            cancel: CancellationToken::new(),
            pool: Arc::new(AssistantPool::new()),
            context_builder: Arc::new(ContextBuilder::new("http://127.0.0.1:1")),
            turn,
        }
    }

    #[tokio::test]
    async fn acquire_lock_stage_transitions_to_locked() {
        let session = SessionContext::new(BackendKind::Claude);
        let turn = turn_input();
        let ctx = stage_ctx(&session, &turn);
        AcquireLockStage.run(&ctx, &mut PipelineOutcome::default()).await.unwrap();
        assert_eq!(session.status().await, crate::session::Status::Locked);
    }

    #[tokio::test]
    async fn inject_context_stage_marks_injected_once() {
        let session = SessionContext::new(BackendKind::Claude);
        session.set_current_message("m1".to_string(), "please help".to_string()).await;
        session
            .set_editing_context(crate::session::EditingContext {
                entity_type: "task".to_string(),
                entity_id: Some("t1".to_string()),
                context_injected: false,
                last_injected_entity_id: None,
            })
            .await;
        session.transition(crate::session::Status::Locked).await.unwrap();

        let turn = turn_input();
        let ctx = stage_ctx(&session, &turn);
        let mut outcome = PipelineOutcome::default();
        CheckContextInjectionStage.run(&ctx, &mut outcome).await.unwrap();
        assert!(!outcome.context_injected);

        InjectContextStage.run(&ctx, &mut outcome).await.unwrap();
        assert!(outcome.context_injected);
        assert!(outcome.full_injection_performed);
        let ec = session.editing_context().await.unwrap();
        assert!(ec.context_injected);
        assert_eq!(ec.last_injected_entity_id.as_deref(), Some("t1"));
        assert!(session.current_message().await.unwrap().content.contains("task_update"));
    }

    #[tokio::test]
    async fn second_message_same_entity_gets_minimal_prefix_only() {
        let session = SessionContext::new(BackendKind::Claude);
        session.set_current_message("m1".to_string(), "first".to_string()).await;
        session
            .set_editing_context(crate::session::EditingContext {
                entity_type: "task".to_string(),
                entity_id: Some("t1".to_string()),
                context_injected: false,
                last_injected_entity_id: None,
            })
            .await;
        session.transition(crate::session::Status::Locked).await.unwrap();
        let turn = turn_input();
        let ctx = stage_ctx(&session, &turn);
        let mut outcome = PipelineOutcome::default();
        CheckContextInjectionStage.run(&ctx, &mut outcome).await.unwrap();
        InjectContextStage.run(&ctx, &mut outcome).await.unwrap();
        session.transition(crate::session::Status::Streaming).await.unwrap();
        session.transition(crate::session::Status::Finalizing).await.unwrap();
        session.transition(crate::session::Status::Complete).await.unwrap();
        session.transition(crate::session::Status::Idle).await.unwrap();

        session.set_current_message("m2".to_string(), "second".to_string()).await;
        session.transition(crate::session::Status::Locked).await.unwrap();
        let mut outcome2 = PipelineOutcome::default();
        CheckContextInjectionStage.run(&ctx, &mut outcome2).await.unwrap();
        assert!(outcome2.context_injected);
        InjectContextStage.run(&ctx, &mut outcome2).await.unwrap();
        assert!(!outcome2.full_injection_performed);
        let content = session.current_message().await.unwrap().content;
        assert_eq!(content, "[editing: task/t1]\nsecond");
    }

    #[tokio::test]
    async fn finalize_stage_reaches_complete() {
        let session = SessionContext::new(BackendKind::Claude);
        session.transition(crate::session::Status::Locked).await.unwrap();
        session.transition(crate::session::Status::Streaming).await.unwrap();

        let turn = turn_input();
        let ctx = stage_ctx(&session, &turn);
        FinalizeStage.run(&ctx, &mut PipelineOutcome::default()).await.unwrap();
        assert_eq!(session.status().await, crate::session::Status::Complete);
    }
}

//! Turn orchestration: one user message, at most one tool round, one reply
//!
//! A turn runs `Idle -> AwaitingInitialResponse -> [AwaitingToolResults ->
//! AwaitingFollowupResponse] -> Idle`. Every mode activation resets the view,
//! and the view's new epoch becomes the session generation. A turn whose
//! generation is no longer current stops at its next suspension point, and
//! its writes are refused by the view itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tokio::sync::mpsc;

use crate::llm::{LLMError, ToolResult};
use crate::modes::{Mode, ModeProfile};
use crate::session::{
    ChatSession, SendOptions, SessionFactory, SessionInput, DEFAULT_THINKING_BUDGET,
};
use crate::tools::ToolDispatcher;
use crate::view::{unique_id, ChatMessage, MessageRole, ViewState};

/// Shown in place of any session failure; details go to the log only
pub const GENERIC_FAILURE_TEXT: &str = "Oops! Something went wrong. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnState {
    #[default]
    Idle,
    AwaitingInitialResponse,
    AwaitingToolResults,
    AwaitingFollowupResponse,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorEvent {
    StateChanged(TurnState),
    ModeChanged(Mode),
    ToolExecuted { name: String, success: bool },
    TurnFinished(TurnOutcome),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("Message is empty")]
    BlankInput,
    #[error("A response is already in progress")]
    TurnInProgress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    /// Session call failed; the generic failure message was shown
    Failed,
    /// Mode changed mid-turn; remaining work was dropped
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnSummary {
    pub outcome: TurnOutcome,
    /// Tool calls actually executed
    pub tool_calls: usize,
}

impl TurnSummary {
    fn new(outcome: TurnOutcome, tool_calls: usize) -> Self {
        Self {
            outcome,
            tool_calls,
        }
    }
}

struct ActiveSession {
    /// View epoch this session writes into
    generation: u64,
    profile: ModeProfile,
    session: Arc<dyn ChatSession>,
}

pub struct Orchestrator {
    view: Arc<ViewState>,
    tools: ToolDispatcher,
    factory: Arc<dyn SessionFactory>,
    active: Mutex<ActiveSession>,
    state: Mutex<TurnState>,
    thinking: AtomicBool,
    thinking_budget: u32,
    event_tx: Option<mpsc::UnboundedSender<OrchestratorEvent>>,
}

/// Returns the loop to Idle and frees the turn slot on every exit path
struct TurnGuard<'a> {
    orchestrator: &'a Orchestrator,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        self.orchestrator.transition(TurnState::Idle);
        self.orchestrator.view.end_turn();
    }
}

impl Orchestrator {
    /// Activates `initial` right away: fresh session, view reset to its greeting
    pub fn new(
        view: Arc<ViewState>,
        tools: ToolDispatcher,
        factory: Arc<dyn SessionFactory>,
        initial: Mode,
    ) -> Self {
        let profile = initial.profile();
        let session = factory.create(&profile);
        let generation = view.reset(profile.greeting.clone());
        Self {
            view,
            tools,
            factory,
            active: Mutex::new(ActiveSession {
                generation,
                profile,
                session,
            }),
            state: Mutex::new(TurnState::Idle),
            thinking: AtomicBool::new(false),
            thinking_budget: DEFAULT_THINKING_BUDGET,
            event_tx: None,
        }
    }

    pub fn with_events(mut self, event_tx: mpsc::UnboundedSender<OrchestratorEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    pub fn with_thinking_budget(mut self, budget_tokens: u32) -> Self {
        self.thinking_budget = budget_tokens;
        self
    }

    pub fn view(&self) -> &Arc<ViewState> {
        &self.view
    }

    pub fn mode(&self) -> Mode {
        self.active().profile.mode
    }

    pub fn state(&self) -> TurnState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn thinking(&self) -> bool {
        self.thinking.load(Ordering::SeqCst)
    }

    /// Takes effect from the next turn; a running turn keeps its setting
    pub fn set_thinking(&self, enabled: bool) {
        self.thinking.store(enabled, Ordering::SeqCst);
    }

    /// Switch modes, discarding the current session. Returns false if
    /// `mode` is already active.
    pub fn set_mode(&self, mode: Mode) -> bool {
        {
            let mut active = self.active();
            if active.profile.mode == mode {
                return false;
            }
            let profile = mode.profile();
            active.session = self.factory.create(&profile);
            // Under the same lock, so no turn sees the new generation with the old view
            active.generation = self.view.reset(profile.greeting.clone());
            active.profile = profile;
        }

        tracing::info!(%mode, "Mode changed");
        self.emit(OrchestratorEvent::ModeChanged(mode));
        true
    }

    /// Run one user turn to completion
    pub async fn submit(&self, input: &str) -> Result<TurnSummary, SubmitError> {
        let text = input.trim();
        if text.is_empty() {
            return Err(SubmitError::BlankInput);
        }
        if !self.view.try_begin_turn() {
            return Err(SubmitError::TurnInProgress);
        }
        let _guard = TurnGuard { orchestrator: self };

        let options = SendOptions::new(self.thinking(), self.thinking_budget);
        let (generation, profile, session) = {
            let active = self.active();
            (active.generation, active.profile.clone(), active.session.clone())
        };

        let summary = if self.view.append_at(generation, ChatMessage::user(text)) {
            self.transition(TurnState::AwaitingInitialResponse);
            self.run_turn(text, generation, &profile, session.as_ref(), options)
                .await
        } else {
            self.discard(0)
        };
        self.emit(OrchestratorEvent::TurnFinished(summary.outcome));
        Ok(summary)
    }

    async fn run_turn(
        &self,
        text: &str,
        generation: u64,
        profile: &ModeProfile,
        session: &dyn ChatSession,
        options: SendOptions,
    ) -> TurnSummary {
        let response = match session
            .send(SessionInput::Text(text.to_string()), options)
            .await
        {
            Ok(response) => response,
            Err(e) => return self.fail(generation, e, 0),
        };
        if self.is_stale(generation) {
            return self.discard(0);
        }

        if !response.text.trim().is_empty() {
            let reply = ChatMessage::model(response.text).with_citations(response.citations);
            if !self.view.append_at(generation, reply) {
                return self.discard(0);
            }
        }

        if response.tool_calls.is_empty() {
            return TurnSummary::new(TurnOutcome::Completed, 0);
        }

        self.transition(TurnState::AwaitingToolResults);
        let mut results: Vec<ToolResult> = Vec::with_capacity(response.tool_calls.len());
        for call in &response.tool_calls {
            if self.is_stale(generation) {
                return self.discard(results.len());
            }
            let result = self.tools.execute(call, profile, generation).await;
            self.emit(OrchestratorEvent::ToolExecuted {
                name: result.name.clone(),
                success: result.is_success(),
            });
            results.push(result);
        }
        let executed = results.len();
        if self.is_stale(generation) {
            return self.discard(executed);
        }

        self.transition(TurnState::AwaitingFollowupResponse);
        let followup = match session
            .send(SessionInput::ToolResults(results), options)
            .await
        {
            Ok(followup) => followup,
            Err(e) => return self.fail(generation, e, executed),
        };
        if self.is_stale(generation) {
            return self.discard(executed);
        }

        if !followup.tool_calls.is_empty() {
            tracing::warn!(
                count = followup.tool_calls.len(),
                "Ignoring tool calls in follow-up response"
            );
        }
        if !followup.text.trim().is_empty() {
            let reply = ChatMessage::model(followup.text).with_citations(followup.citations);
            if !self.view.append_at(generation, reply) {
                return self.discard(executed);
            }
        }

        TurnSummary::new(TurnOutcome::Completed, executed)
    }

    fn fail(&self, generation: u64, error: LLMError, tool_calls: usize) -> TurnSummary {
        let notice = ChatMessage::new(unique_id("error"), MessageRole::Model, GENERIC_FAILURE_TEXT);
        if !self.view.append_at(generation, notice) {
            tracing::warn!(error = %error, "Session failed after mode change");
            return self.discard(tool_calls);
        }
        tracing::error!(error = %error, "Session call failed");
        TurnSummary::new(TurnOutcome::Failed, tool_calls)
    }

    fn discard(&self, tool_calls: usize) -> TurnSummary {
        tracing::warn!(tool_calls, "Mode changed during turn, discarding remaining work");
        TurnSummary::new(TurnOutcome::Discarded, tool_calls)
    }

    fn is_stale(&self, generation: u64) -> bool {
        self.active().generation != generation
    }

    fn active(&self) -> MutexGuard<'_, ActiveSession> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn transition(&self, new_state: TurnState) {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if *state == new_state {
                return;
            }
            *state = new_state;
        }
        tracing::debug!(state = ?new_state, "Turn state");
        self.emit(OrchestratorEvent::StateChanged(new_state));
    }

    fn emit(&self, event: OrchestratorEvent) {
        if let Some(ref tx) = self.event_tx {
            let _ = tx.send(event);
        }
    }
}

//! Wizard Controller
//!
//! Owns the session state and is the only place it changes. Every operation
//! runs the navigation guard, applies the transition, then fires the side
//! effects (persist, notify) without waiting on them.
//!
//! The controller is a cheap handle over shared state so the keyboard
//! binding and the host can drive the same session. The state lock is never
//! held across an await; an in-flight action is tracked by `busy` and a
//! per-session cancellation token decides whether its result still applies.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::events::{EventSender, WizardEvent};
use super::guard;
use super::registry::StepRegistry;
use super::state::{StepInfo, WizardState, WizardStatus, WizardView};
use super::step::{ActionTrigger, Step};
use super::WizardData;
use crate::action::{StepAction, StepActions};
use crate::error::{ActionError, WizardError};
use crate::keyboard::{KeyDispatcher, KeyboardBinding};
use crate::store::{InMemoryProgressStore, ProgressSnapshot, ProgressStore, ProgressWriter};

/// Upper bound on a step action before it fails as timed out
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Session id used when the host doesn't supply one
pub const DEFAULT_SESSION_ID: &str = "default";

/// Result of a navigation or action request.
///
/// Expected outcomes (a blocked step, a failed action, a stale result) are
/// variants here rather than errors.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Advanced { from: usize, to: usize },
    Retreated { from: usize, to: usize },
    Jumped { from: usize, to: usize },
    Resumed { to: usize },
    /// The guard refused; nothing changed.
    Blocked,
    /// The action failed; `busy` is cleared and the index kept.
    ActionFailed(ActionError),
    /// An on-demand action succeeded and its fields were merged.
    ActionCompleted { step_id: String },
    /// The final step was passed. Carries the collected data.
    Completed(WizardData),
    /// The session was closed or reset while the action was in flight;
    /// its result was dropped.
    Discarded,
}

impl Transition {
    /// Whether the active step changed.
    pub fn moved(&self) -> bool {
        matches!(
            self,
            Self::Advanced { .. } | Self::Retreated { .. } | Self::Resumed { .. }
        ) || matches!(self, Self::Jumped { from, to } if from != to)
    }
}

/// What `start()` found in the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StartOutcome {
    /// A saved session the user may resume. Never applied automatically.
    pub resume_offer: Option<ProgressSnapshot>,
}

enum Phase {
    NotStarted,
    Active(WizardState),
    Completed,
    Closed,
}

struct Inner {
    phase: Phase,
    /// Cancelled on close/reset; actions started under it are stale after.
    cancel: CancellationToken,
    resume_offer: Option<ProgressSnapshot>,
    binding: Option<KeyboardBinding>,
}

impl Inner {
    fn active(&self) -> Result<&WizardState, WizardError> {
        match &self.phase {
            Phase::Active(state) => Ok(state),
            Phase::NotStarted => Err(WizardError::NotStarted),
            Phase::Completed => Err(WizardError::AlreadyCompleted),
            Phase::Closed => Err(WizardError::Closed),
        }
    }

    fn active_mut(&mut self) -> Result<&mut WizardState, WizardError> {
        match &mut self.phase {
            Phase::Active(state) => Ok(state),
            Phase::NotStarted => Err(WizardError::NotStarted),
            Phase::Completed => Err(WizardError::AlreadyCompleted),
            Phase::Closed => Err(WizardError::Closed),
        }
    }
}

struct Shared {
    registry: StepRegistry,
    store: Arc<dyn ProgressStore>,
    action: Arc<dyn StepAction>,
    session_id: String,
    action_timeout: Duration,
    events: Option<EventSender>,
    keyboard: Option<KeyDispatcher>,
    writer: OnceLock<ProgressWriter>,
    inner: Mutex<Inner>,
}

/// Drives one wizard session.
#[derive(Clone)]
pub struct WizardController {
    shared: Arc<Shared>,
}

/// Non-owning handle, held by the keyboard binding.
#[derive(Clone)]
pub struct WeakController {
    shared: Weak<Shared>,
}

impl WeakController {
    pub fn upgrade(&self) -> Option<WizardController> {
        self.shared.upgrade().map(|shared| WizardController { shared })
    }
}

pub struct WizardControllerBuilder {
    registry: StepRegistry,
    store: Option<Arc<dyn ProgressStore>>,
    action: Option<Arc<dyn StepAction>>,
    session_id: String,
    action_timeout: Duration,
    events: Option<EventSender>,
    keyboard: Option<KeyDispatcher>,
}

impl WizardControllerBuilder {
    pub fn store(mut self, store: Arc<dyn ProgressStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn action(mut self, action: Arc<dyn StepAction>) -> Self {
        self.action = Some(action);
        self
    }

    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = timeout;
        self
    }

    pub fn events(mut self, tx: EventSender) -> Self {
        self.events = Some(tx);
        self
    }

    /// Bind arrow-key navigation on this dispatcher while a session is open.
    pub fn keyboard(mut self, dispatcher: KeyDispatcher) -> Self {
        self.keyboard = Some(dispatcher);
        self
    }

    pub fn build(self) -> WizardController {
        WizardController {
            shared: Arc::new(Shared {
                registry: self.registry,
                store: self
                    .store
                    .unwrap_or_else(|| Arc::new(InMemoryProgressStore::new())),
                action: self.action.unwrap_or_else(|| Arc::new(StepActions::new())),
                session_id: self.session_id,
                action_timeout: self.action_timeout,
                events: self.events,
                keyboard: self.keyboard,
                writer: OnceLock::new(),
                inner: Mutex::new(Inner {
                    phase: Phase::NotStarted,
                    cancel: CancellationToken::new(),
                    resume_offer: None,
                    binding: None,
                }),
            }),
        }
    }
}

impl WizardController {
    pub fn builder(registry: StepRegistry) -> WizardControllerBuilder {
        WizardControllerBuilder {
            registry,
            store: None,
            action: None,
            session_id: DEFAULT_SESSION_ID.to_string(),
            action_timeout: DEFAULT_ACTION_TIMEOUT,
            events: None,
            keyboard: None,
        }
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.shared.registry
    }

    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    pub fn downgrade(&self) -> WeakController {
        WeakController {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Open a session at the first step.
    ///
    /// Consults the store once. A saved snapshot is returned as an offer;
    /// call [`resume`](Self::resume) to apply it.
    pub async fn start(&self) -> Result<StartOutcome, WizardError> {
        self.lock().ensure_startable()?;

        let session_id = &self.shared.session_id;
        let len = self.shared.registry.len();
        let loaded = match self.shared.store.load(session_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(
                    "Failed to load progress for session {} ({} store): {}",
                    session_id,
                    self.shared.store.name(),
                    e
                );
                None
            }
        };
        let offer = loaded
            .filter(|snapshot| {
                let in_range = snapshot.step_index < len;
                if !in_range {
                    tracing::warn!(
                        "Ignoring saved progress for session {}: step {} out of range ({} steps)",
                        session_id,
                        snapshot.step_index,
                        len
                    );
                }
                in_range
            })
            .map(|mut snapshot| {
                if snapshot.max_visited_index >= len {
                    tracing::warn!(
                        "Clamping reached step {} for session {} to the last step",
                        snapshot.max_visited_index,
                        session_id
                    );
                    snapshot.max_visited_index = len - 1;
                }
                snapshot
            });

        let mut inner = self.lock();
        // Another start may have won while the store was loading.
        inner.ensure_startable()?;
        inner.cancel = CancellationToken::new();
        inner.phase = Phase::Active(WizardState::new(self.shared.registry.defaults().clone()));
        inner.resume_offer = offer.clone();
        inner.binding = self
            .shared
            .keyboard
            .as_ref()
            .map(|dispatcher| KeyboardBinding::acquire(dispatcher, self.downgrade()));
        drop(inner);

        tracing::info!(
            "Wizard session {} started ({} steps, resume offered: {})",
            session_id,
            len,
            offer.is_some()
        );
        self.emit(WizardEvent::Started {
            session_id: session_id.clone(),
        });
        Ok(StartOutcome {
            resume_offer: offer,
        })
    }

    /// Set `key` in the collected data. Never validates or moves.
    pub fn select(
        &self,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Result<(), WizardError> {
        self.lock().active_mut()?.select(key, value);
        Ok(())
    }

    /// Flip membership of `value` in the array at `key`.
    /// Returns whether it is selected afterwards.
    pub fn toggle(&self, key: &str, value: serde_json::Value) -> Result<bool, WizardError> {
        Ok(self.lock().active_mut()?.toggle(key, value))
    }

    /// Move to the next step if the guard allows.
    ///
    /// A step with an on-advance action only moves once the action
    /// succeeds. Advancing from the last step completes the session.
    pub async fn advance(&self) -> Result<Transition, WizardError> {
        let (token, step_id, data) = {
            let mut inner = self.lock();
            let token = inner.cancel.clone();
            let state = inner.active_mut()?;
            let step = self.step_at(state.current_step_index)?;
            if !guard::can_advance(step, &state.data, state.busy) {
                tracing::debug!(
                    "Advance blocked at step {} (busy: {})",
                    step.id(),
                    state.busy
                );
                return Ok(Transition::Blocked);
            }
            if step.action() != Some(ActionTrigger::OnAdvance) {
                return self.step_forward(&mut inner, WizardData::new());
            }
            state.busy = true;
            state.last_error = None;
            (token, step.id().to_string(), state.data.clone())
        };

        let outcome = self.execute(&step_id, data).await;

        let mut inner = self.lock();
        if token.is_cancelled() {
            tracing::debug!("Discarding stale {} action result", step_id);
            return Ok(Transition::Discarded);
        }
        match outcome {
            Ok(fields) => self.step_forward(&mut inner, fields),
            Err(error) => self.action_failed(&mut inner, error),
        }
    }

    /// Run the current step's action without moving (the "Connect" button).
    pub async fn run_action(&self) -> Result<Transition, WizardError> {
        let (token, step_id, data) = {
            let mut inner = self.lock();
            let token = inner.cancel.clone();
            let state = inner.active_mut()?;
            let step = self.step_at(state.current_step_index)?;
            if step.action().is_none() || state.busy {
                return Ok(Transition::Blocked);
            }
            state.busy = true;
            state.last_error = None;
            (token, step.id().to_string(), state.data.clone())
        };

        let outcome = self.execute(&step_id, data).await;

        let mut inner = self.lock();
        if token.is_cancelled() {
            tracing::debug!("Discarding stale {} action result", step_id);
            return Ok(Transition::Discarded);
        }
        match outcome {
            Ok(fields) => {
                let state = inner.active_mut()?;
                state.busy = false;
                state.merge(fields);
                drop(inner);
                tracing::info!("{} action succeeded", step_id);
                self.emit(WizardEvent::ActionSucceeded {
                    step_id: step_id.clone(),
                });
                Ok(Transition::ActionCompleted { step_id })
            }
            Err(error) => self.action_failed(&mut inner, error),
        }
    }

    /// Move back one step. Never touches data and never persists.
    pub fn retreat(&self) -> Result<Transition, WizardError> {
        let mut inner = self.lock();
        let state = inner.active_mut()?;
        if !guard::can_retreat(state.current_step_index, state.busy) {
            return Ok(Transition::Blocked);
        }
        let from = state.current_step_index;
        state.step_back();
        let to = state.current_step_index;
        drop(inner);

        tracing::debug!("Retreated {} -> {}", from, to);
        self.emit(WizardEvent::StepChanged(to));
        Ok(Transition::Retreated { from, to })
    }

    /// Jump to a step already reached in this session.
    pub fn jump_to(&self, index: usize) -> Result<Transition, WizardError> {
        let len = self.shared.registry.len();
        let mut inner = self.lock();
        let state = inner.active_mut()?;
        if index >= len {
            return Err(WizardError::UnknownStep { index, len });
        }
        if state.busy || !guard::can_jump_to(index, state.max_visited_index) {
            return Ok(Transition::Blocked);
        }
        let from = state.current_step_index;
        state.jump(index);
        drop(inner);

        if from != index {
            tracing::debug!("Jumped {} -> {}", from, index);
            self.emit(WizardEvent::StepChanged(index));
        }
        Ok(Transition::Jumped { from, to: index })
    }

    /// Apply the resume offer returned by `start()`.
    pub fn resume(&self) -> Result<Transition, WizardError> {
        let mut inner = self.lock();
        if inner.active()?.busy {
            return Ok(Transition::Blocked);
        }
        let offer = inner
            .resume_offer
            .take()
            .ok_or(WizardError::NoPendingResume)?;
        let state = inner.active_mut()?;
        state.restore(&offer);
        let to = state.current_step_index;
        drop(inner);

        tracing::info!(
            "Resumed session {} at step {}",
            self.shared.session_id,
            to
        );
        self.emit(WizardEvent::StepChanged(to));
        Ok(Transition::Resumed { to })
    }

    /// Drop the resume offer and start over from the first step.
    pub fn decline_resume(&self, clear_progress: bool) -> Result<(), WizardError> {
        let mut inner = self.lock();
        inner.active()?;
        inner
            .resume_offer
            .take()
            .ok_or(WizardError::NoPendingResume)?;
        drop(inner);

        if clear_progress {
            self.clear_persisted();
        }
        Ok(())
    }

    /// Tear down the session. Idempotent.
    ///
    /// Saved progress survives unless `clear_progress` is set, so the next
    /// `start()` can offer to resume. An in-flight action's result is
    /// dropped when it arrives.
    pub fn close(&self, clear_progress: bool) {
        let (was_open, binding) = {
            let mut inner = self.lock();
            inner.cancel.cancel();
            inner.resume_offer = None;
            let was_open = matches!(inner.phase, Phase::Active(_));
            if was_open {
                inner.phase = Phase::Closed;
            }
            (was_open, inner.binding.take())
        };
        drop(binding);

        if clear_progress {
            self.clear_persisted();
        }
        if was_open {
            tracing::info!("Wizard session {} closed", self.shared.session_id);
            self.emit(WizardEvent::Closed);
        }
    }

    /// Back to `NotStarted`, ready for a fresh `start()`. Also the way out
    /// of `Completed`.
    pub fn reset(&self, clear_progress: bool) {
        let (was_open, binding) = {
            let mut inner = self.lock();
            inner.cancel.cancel();
            inner.resume_offer = None;
            let was_open = matches!(inner.phase, Phase::Active(_));
            inner.phase = Phase::NotStarted;
            (was_open, inner.binding.take())
        };
        drop(binding);

        if clear_progress {
            self.clear_persisted();
        }
        tracing::info!("Wizard session {} reset", self.shared.session_id);
        if was_open {
            self.emit(WizardEvent::Closed);
        }
    }

    /// Immutable view of the open session, `None` when none is open.
    pub fn snapshot(&self) -> Option<WizardView> {
        let inner = self.lock();
        let Phase::Active(state) = &inner.phase else {
            return None;
        };
        let step = self.shared.registry.get(state.current_step_index)?;
        Some(WizardView {
            status: state.status,
            current_step_index: state.current_step_index,
            max_visited_index: state.max_visited_index,
            step_count: self.shared.registry.len(),
            step: StepInfo::from(step),
            can_advance: guard::can_advance(step, &state.data, state.busy),
            can_retreat: guard::can_retreat(state.current_step_index, state.busy),
            busy: state.busy,
            data: state.data.clone(),
            last_error: state.last_error.as_ref().map(ToString::to_string),
            resume_offer: inner.resume_offer.clone(),
        })
    }

    pub fn status(&self) -> WizardStatus {
        match self.lock().phase {
            Phase::Active(ref state) => state.status,
            Phase::Completed => WizardStatus::Completed,
            Phase::NotStarted | Phase::Closed => WizardStatus::NotStarted,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.lock().phase, Phase::Active(_))
    }

    pub fn can_advance(&self) -> bool {
        let inner = self.lock();
        let Ok(state) = inner.active() else {
            return false;
        };
        self.shared
            .registry
            .get(state.current_step_index)
            .is_some_and(|step| guard::can_advance(step, &state.data, state.busy))
    }

    pub fn can_retreat(&self) -> bool {
        let inner = self.lock();
        inner
            .active()
            .is_ok_and(|state| guard::can_retreat(state.current_step_index, state.busy))
    }

    /// Wait until every queued save/clear has reached the store.
    pub async fn flush_progress(&self) {
        if let Some(writer) = self.shared.writer.get() {
            writer.flush().await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn step_at(&self, index: usize) -> Result<&Step, WizardError> {
        self.shared
            .registry
            .get(index)
            .ok_or(WizardError::UnknownStep {
                index,
                len: self.shared.registry.len(),
            })
    }

    /// Apply a passed guard (and any action fields): move on, or complete
    /// when leaving the last step.
    fn step_forward(
        &self,
        inner: &mut MutexGuard<'_, Inner>,
        fields: WizardData,
    ) -> Result<Transition, WizardError> {
        let len = self.shared.registry.len();
        let state = inner.active_mut()?;
        state.busy = false;
        state.merge(fields);
        let from = state.current_step_index;

        if from + 1 == len {
            let data = std::mem::take(&mut state.data);
            return Ok(self.complete(inner, data));
        }

        state.step_forward();
        let to = state.current_step_index;
        let snapshot = ProgressSnapshot::capture(&self.shared.session_id, state);
        inner.resume_offer = None;

        tracing::debug!("Advanced {} -> {}", from, to);
        self.persist(snapshot);
        self.emit(WizardEvent::StepChanged(to));
        Ok(Transition::Advanced { from, to })
    }

    /// Fires exactly once: the phase leaves `Active` here and only
    /// `reset()` brings it back.
    fn complete(&self, inner: &mut MutexGuard<'_, Inner>, data: WizardData) -> Transition {
        inner.phase = Phase::Completed;
        inner.resume_offer = None;
        inner.binding = None;

        tracing::info!("Wizard session {} completed", self.shared.session_id);
        self.clear_persisted();
        self.emit(WizardEvent::Completed(data.clone()));
        Transition::Completed(data)
    }

    fn action_failed(
        &self,
        inner: &mut MutexGuard<'_, Inner>,
        error: ActionError,
    ) -> Result<Transition, WizardError> {
        let state = inner.active_mut()?;
        state.busy = false;
        state.last_error = Some(error.clone());

        let step_id = self
            .shared
            .registry
            .get(state.current_step_index)
            .map(|step| step.id().to_string())
            .unwrap_or_default();
        tracing::warn!("{}", error);
        self.emit(WizardEvent::ActionFailed {
            step_id,
            error: error.clone(),
        });
        Ok(Transition::ActionFailed(error))
    }

    /// Run the step action, bounded by the configured timeout.
    async fn execute(&self, step_id: &str, data: WizardData) -> Result<WizardData, ActionError> {
        let timeout = self.shared.action_timeout;
        self.emit(WizardEvent::ActionStarted {
            step_id: step_id.to_string(),
        });
        tracing::debug!("Running {} action (timeout {:?})", step_id, timeout);

        match tokio::time::timeout(timeout, self.shared.action.run(step_id, &data)).await {
            Ok(result) => result,
            Err(_) => Err(ActionError::TimedOut {
                step_id: step_id.to_string(),
                timeout,
            }),
        }
    }

    fn writer(&self) -> Option<&ProgressWriter> {
        if let Some(writer) = self.shared.writer.get() {
            return Some(writer);
        }
        // The writer task needs a runtime; outside one there is nothing to do.
        tokio::runtime::Handle::try_current().ok()?;
        Some(
            self.shared
                .writer
                .get_or_init(|| ProgressWriter::spawn(self.shared.store.clone())),
        )
    }

    fn persist(&self, snapshot: ProgressSnapshot) {
        match self.writer() {
            Some(writer) => writer.save(snapshot),
            None => tracing::warn!("No runtime for progress writer; snapshot dropped"),
        }
    }

    fn clear_persisted(&self) {
        match self.writer() {
            Some(writer) => writer.clear(&self.shared.session_id),
            None => tracing::warn!("No runtime for progress writer; clear dropped"),
        }
    }

    fn emit(&self, event: WizardEvent) {
        if let Some(tx) = &self.shared.events {
            let _ = tx.send(event);
        }
    }
}

impl Inner {
    fn ensure_startable(&self) -> Result<(), WizardError> {
        match self.phase {
            Phase::Active(_) => Err(WizardError::AlreadyStarted),
            Phase::Completed => Err(WizardError::AlreadyCompleted),
            Phase::NotStarted | Phase::Closed => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::MockStepAction;
    use crate::store::testing::UnavailableStore;
    use crate::wizard::events::{self, EventReceiver};
    use crate::wizard::onboarding;
    use async_trait::async_trait;
    use chrono::Utc;
    use proptest::prelude::*;
    use serde_json::json;
    use tokio::sync::Notify;

    /// Succeeds with `{"checked": true}` once released.
    struct GatedAction {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl StepAction for GatedAction {
        async fn run(&self, _: &str, _: &WizardData) -> Result<WizardData, ActionError> {
            self.gate.notified().await;
            let mut out = WizardData::new();
            out.insert("checked".into(), json!(true));
            Ok(out)
        }
    }

    /// Three plain steps with an on-advance action on the middle one.
    fn gated_registry() -> StepRegistry {
        StepRegistry::new(vec![
            Step::new("one", "One"),
            Step::new("two", "Two").with_action(ActionTrigger::OnAdvance),
            Step::new("three", "Three"),
        ])
        .unwrap()
    }

    fn plain_registry(len: usize) -> StepRegistry {
        StepRegistry::new(
            (0..len)
                .map(|i| Step::new(format!("s{i}"), format!("Step {i}")))
                .collect(),
        )
        .unwrap()
    }

    fn product(store: &InMemoryProgressStore) -> (WizardController, EventReceiver) {
        let (tx, rx) = events::channel();
        let controller = WizardController::builder(onboarding::registry())
            .store(Arc::new(store.clone()))
            .session_id("test")
            .events(tx)
            .build();
        (controller, rx)
    }

    async fn wait_until_busy(controller: &WizardController) {
        while !controller.snapshot().is_some_and(|v| v.busy) {
            tokio::task::yield_now().await;
        }
    }

    fn index(controller: &WizardController) -> usize {
        controller.snapshot().map(|v| v.current_step_index).unwrap()
    }

    #[tokio::test]
    async fn test_source_step_requires_a_source() {
        let store = InMemoryProgressStore::new();
        let (wizard, mut rx) = product(&store);
        wizard.start().await.unwrap();

        assert!(!wizard.can_advance());
        assert_eq!(wizard.advance().await.unwrap(), Transition::Blocked);
        assert_eq!(index(&wizard), 0);

        assert!(wizard.toggle(onboarding::SOURCES_KEY, json!("stripe")).unwrap());
        assert_eq!(
            wizard.advance().await.unwrap(),
            Transition::Advanced { from: 0, to: 1 }
        );
        assert_eq!(index(&wizard), 1);

        let events = events::drain(&mut rx);
        assert!(events.contains(&WizardEvent::StepChanged(1)));
    }

    #[tokio::test]
    async fn test_auth_is_skippable_without_running_the_action() {
        let mut action = MockStepAction::new();
        action.expect_run().times(0);

        let wizard = WizardController::builder(onboarding::registry())
            .action(Arc::new(action))
            .build();
        wizard.start().await.unwrap();
        wizard.toggle(onboarding::SOURCES_KEY, json!("stripe")).unwrap();
        wizard.advance().await.unwrap();
        assert_eq!(wizard.snapshot().unwrap().step.id, onboarding::AUTH);

        assert_eq!(
            wizard.advance().await.unwrap(),
            Transition::Advanced { from: 1, to: 2 }
        );
        assert!(!wizard.snapshot().unwrap().data.contains_key("authenticated"));
    }

    #[tokio::test]
    async fn test_completion_fires_once_with_collected_data() {
        let store = InMemoryProgressStore::new();
        let (wizard, mut rx) = product(&store);
        wizard.start().await.unwrap();
        wizard.toggle(onboarding::SOURCES_KEY, json!("stripe")).unwrap();
        for _ in 0..4 {
            assert!(wizard.advance().await.unwrap().moved());
        }
        assert_eq!(index(&wizard), 4);

        let expected = json!({
            "sources": ["stripe"],
            "template": "comprehensive",
            "priority": "mrr-based",
        });
        let Transition::Completed(data) = wizard.advance().await.unwrap() else {
            panic!("expected completion");
        };
        assert_eq!(serde_json::Value::Object(data), expected);

        // State is gone; nothing else can fire
        assert!(wizard.snapshot().is_none());
        assert_eq!(wizard.status(), WizardStatus::Completed);
        assert_eq!(
            wizard.advance().await.unwrap_err(),
            WizardError::AlreadyCompleted
        );
        assert_eq!(wizard.start().await.unwrap_err(), WizardError::AlreadyCompleted);

        let completions = events::drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, WizardEvent::Completed(_)))
            .count();
        assert_eq!(completions, 1);

        wizard.flush_progress().await;
        assert!(store.get("test").is_none());
    }

    #[tokio::test]
    async fn test_close_discards_pending_action_result() {
        let store = InMemoryProgressStore::new();
        let gate = Arc::new(Notify::new());
        let wizard = WizardController::builder(gated_registry())
            .store(Arc::new(store.clone()))
            .session_id("d")
            .action(Arc::new(GatedAction { gate: gate.clone() }))
            .build();
        wizard.start().await.unwrap();
        wizard.select("name", json!("acme")).unwrap();
        wizard.advance().await.unwrap();
        wizard.flush_progress().await;
        let saved = store.get("d").unwrap();

        let pending = tokio::spawn({
            let wizard = wizard.clone();
            async move { wizard.advance().await }
        });
        wait_until_busy(&wizard).await;

        wizard.close(false);
        gate.notify_one();
        assert_eq!(pending.await.unwrap().unwrap(), Transition::Discarded);

        wizard.flush_progress().await;
        assert_eq!(store.get("d").unwrap(), saved);
        assert!(wizard.snapshot().is_none());

        // Reopening offers the pre-close position untouched
        let outcome = wizard.start().await.unwrap();
        let offer = outcome.resume_offer.unwrap();
        assert_eq!(offer.step_index, 1);
        assert!(!offer.data.contains_key("checked"));
    }

    #[tokio::test]
    async fn test_close_discards_pending_connect_result() {
        let store = InMemoryProgressStore::new();
        let gate = Arc::new(Notify::new());
        let registry = StepRegistry::new(vec![
            Step::new("one", "One"),
            Step::new("connect", "Connect").with_action(ActionTrigger::OnDemand),
            Step::new("three", "Three"),
        ])
        .unwrap();
        let wizard = WizardController::builder(registry)
            .store(Arc::new(store.clone()))
            .session_id("c")
            .action(Arc::new(GatedAction { gate: gate.clone() }))
            .build();
        wizard.start().await.unwrap();
        wizard.advance().await.unwrap();
        wizard.flush_progress().await;
        let saved = store.get("c").unwrap();

        let pending = tokio::spawn({
            let wizard = wizard.clone();
            async move { wizard.run_action().await }
        });
        wait_until_busy(&wizard).await;

        wizard.close(false);
        gate.notify_one();
        assert_eq!(pending.await.unwrap().unwrap(), Transition::Discarded);

        wizard.flush_progress().await;
        assert_eq!(store.get("c").unwrap(), saved);

        wizard.start().await.unwrap();
        let view = wizard.snapshot().unwrap();
        assert!(!view.busy);
        assert!(!view.data.contains_key("checked"));
    }

    #[tokio::test]
    async fn test_reset_isolates_new_session_from_old_action() {
        let store = InMemoryProgressStore::new();
        let gate = Arc::new(Notify::new());
        let wizard = WizardController::builder(gated_registry())
            .store(Arc::new(store.clone()))
            .session_id("r")
            .action(Arc::new(GatedAction { gate: gate.clone() }))
            .build();
        wizard.start().await.unwrap();
        wizard.advance().await.unwrap();
        wizard.flush_progress().await;
        let saved = store.get("r").unwrap();

        let pending = tokio::spawn({
            let wizard = wizard.clone();
            async move { wizard.advance().await }
        });
        wait_until_busy(&wizard).await;

        wizard.reset(false);
        wizard.start().await.unwrap();
        gate.notify_one();
        assert_eq!(pending.await.unwrap().unwrap(), Transition::Discarded);

        let view = wizard.snapshot().unwrap();
        assert_eq!(view.current_step_index, 0);
        assert!(!view.busy);
        assert!(!view.data.contains_key("checked"));
        assert!(view.can_advance);

        wizard.flush_progress().await;
        assert_eq!(store.get("r").unwrap(), saved);
    }

    #[tokio::test]
    async fn test_busy_blocks_navigation() {
        let gate = Arc::new(Notify::new());
        let wizard = WizardController::builder(gated_registry())
            .action(Arc::new(GatedAction { gate: gate.clone() }))
            .build();
        wizard.start().await.unwrap();
        wizard.advance().await.unwrap();

        let pending = tokio::spawn({
            let wizard = wizard.clone();
            async move { wizard.advance().await }
        });
        wait_until_busy(&wizard).await;

        assert!(!wizard.can_advance());
        assert!(!wizard.can_retreat());
        assert_eq!(wizard.advance().await.unwrap(), Transition::Blocked);
        assert_eq!(wizard.retreat().unwrap(), Transition::Blocked);
        assert_eq!(wizard.jump_to(0).unwrap(), Transition::Blocked);

        gate.notify_one();
        assert_eq!(
            pending.await.unwrap().unwrap(),
            Transition::Advanced { from: 1, to: 2 }
        );
        let view = wizard.snapshot().unwrap();
        assert!(!view.busy);
        assert_eq!(view.data["checked"], json!(true));
    }

    #[tokio::test]
    async fn test_action_failure_is_recoverable() {
        let mut action = MockStepAction::new();
        let mut calls = 0;
        action.expect_run().times(2).returning(move |step_id, _| {
            calls += 1;
            if calls == 1 {
                Err(ActionError::failed(step_id, "connection refused"))
            } else {
                Ok(WizardData::new())
            }
        });

        let (tx, mut rx) = events::channel();
        let wizard = WizardController::builder(gated_registry())
            .action(Arc::new(action))
            .events(tx)
            .build();
        wizard.start().await.unwrap();
        wizard.advance().await.unwrap();

        let failed = wizard.advance().await.unwrap();
        assert!(matches!(failed, Transition::ActionFailed(ActionError::Failed { .. })));
        let view = wizard.snapshot().unwrap();
        assert_eq!(view.current_step_index, 1);
        assert!(!view.busy);
        assert!(view.last_error.unwrap().contains("connection refused"));
        assert!(events::drain(&mut rx)
            .iter()
            .any(|e| matches!(e, WizardEvent::ActionFailed { step_id, .. } if step_id == "two")));

        // Retry clears the error and moves on
        assert_eq!(
            wizard.advance().await.unwrap(),
            Transition::Advanced { from: 1, to: 2 }
        );
        assert!(wizard.snapshot().unwrap().last_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_action_timeout_fails_closed() {
        struct Hangs;

        #[async_trait]
        impl StepAction for Hangs {
            async fn run(&self, _: &str, _: &WizardData) -> Result<WizardData, ActionError> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(WizardData::new())
            }
        }

        let wizard = WizardController::builder(gated_registry())
            .action(Arc::new(Hangs))
            .action_timeout(Duration::from_secs(5))
            .build();
        wizard.start().await.unwrap();
        wizard.advance().await.unwrap();

        let outcome = wizard.advance().await.unwrap();
        assert_eq!(
            outcome,
            Transition::ActionFailed(ActionError::TimedOut {
                step_id: "two".into(),
                timeout: Duration::from_secs(5),
            })
        );
        assert_eq!(index(&wizard), 1);
        assert!(!wizard.snapshot().unwrap().busy);
    }

    #[tokio::test]
    async fn test_on_demand_action_merges_without_moving() {
        let mut action = MockStepAction::new();
        action
            .expect_run()
            .withf(|step_id, _| step_id == onboarding::AUTH)
            .times(1)
            .returning(|_, _| {
                let mut out = WizardData::new();
                out.insert("authenticated".into(), json!(true));
                Ok(out)
            });

        let wizard = WizardController::builder(onboarding::registry())
            .action(Arc::new(action))
            .build();
        wizard.start().await.unwrap();
        // No action on the source step
        assert_eq!(wizard.run_action().await.unwrap(), Transition::Blocked);

        wizard.toggle(onboarding::SOURCES_KEY, json!("paddle")).unwrap();
        wizard.advance().await.unwrap();
        assert_eq!(
            wizard.run_action().await.unwrap(),
            Transition::ActionCompleted {
                step_id: onboarding::AUTH.into()
            }
        );
        let view = wizard.snapshot().unwrap();
        assert_eq!(view.current_step_index, 1);
        assert_eq!(view.data["authenticated"], json!(true));
    }

    #[tokio::test]
    async fn test_retreat_keeps_data() {
        let wizard = WizardController::builder(plain_registry(3)).build();
        wizard.start().await.unwrap();
        assert_eq!(wizard.retreat().unwrap(), Transition::Blocked);

        wizard.select("a", json!(1)).unwrap();
        wizard.advance().await.unwrap();
        wizard.select("b", json!(2)).unwrap();
        let before = wizard.snapshot().unwrap().data;

        assert_eq!(
            wizard.retreat().unwrap(),
            Transition::Retreated { from: 1, to: 0 }
        );
        assert_eq!(wizard.snapshot().unwrap().data, before);
    }

    #[tokio::test]
    async fn test_jump_bounded_by_visited() {
        let wizard = WizardController::builder(plain_registry(5)).build();
        wizard.start().await.unwrap();
        wizard.advance().await.unwrap();
        wizard.advance().await.unwrap();

        assert_eq!(wizard.jump_to(3).unwrap(), Transition::Blocked);
        assert_eq!(
            wizard.jump_to(0).unwrap(),
            Transition::Jumped { from: 2, to: 0 }
        );
        assert_eq!(
            wizard.jump_to(2).unwrap(),
            Transition::Jumped { from: 0, to: 2 }
        );
        assert_eq!(
            wizard.jump_to(9).unwrap_err(),
            WizardError::UnknownStep { index: 9, len: 5 }
        );
    }

    #[tokio::test]
    async fn test_each_advance_is_persisted() {
        let store = InMemoryProgressStore::new();
        let wizard = WizardController::builder(plain_registry(5))
            .store(Arc::new(store.clone()))
            .session_id("n")
            .build();
        wizard.start().await.unwrap();
        for _ in 0..3 {
            wizard.advance().await.unwrap();
        }
        wizard.flush_progress().await;

        let saved = store.get("n").unwrap();
        assert_eq!(saved.step_index, 3);
        assert_eq!(saved.max_visited_index, 3);

        // Retreat doesn't write
        wizard.retreat().unwrap();
        wizard.flush_progress().await;
        assert_eq!(store.get("n").unwrap().step_index, 3);
    }

    #[tokio::test]
    async fn test_store_failures_never_block_navigation() {
        let wizard = WizardController::builder(plain_registry(3))
            .store(Arc::new(UnavailableStore))
            .build();
        let outcome = wizard.start().await.unwrap();
        assert!(outcome.resume_offer.is_none());

        wizard.advance().await.unwrap();
        wizard.advance().await.unwrap();
        wizard.flush_progress().await;
        assert_eq!(index(&wizard), 2);
    }

    #[tokio::test]
    async fn test_resume_offer() {
        let store = InMemoryProgressStore::new();
        let mut data = WizardData::new();
        data.insert(onboarding::SOURCES_KEY.into(), json!(["hubspot"]));
        data.insert(onboarding::PRIORITY_KEY.into(), json!("churn-risk"));
        store
            .save(
                "test",
                &ProgressSnapshot {
                    session_id: "test".into(),
                    step_index: 3,
                    max_visited_index: 3,
                    data,
                    timestamp: Utc::now(),
                },
            )
            .await
            .unwrap();

        let (wizard, _rx) = product(&store);
        let outcome = wizard.start().await.unwrap();
        assert_eq!(outcome.resume_offer.as_ref().map(|s| s.step_index), Some(3));
        // Offered, not applied
        assert_eq!(index(&wizard), 0);
        assert!(wizard.snapshot().unwrap().resume_offer.is_some());

        assert_eq!(wizard.resume().unwrap(), Transition::Resumed { to: 3 });
        let view = wizard.snapshot().unwrap();
        assert_eq!(view.max_visited_index, 3);
        assert_eq!(view.text(onboarding::PRIORITY_KEY), Some("churn-risk"));
        assert_eq!(view.text(onboarding::TEMPLATE_KEY), Some("comprehensive"));
        assert!(view.resume_offer.is_none());
        assert_eq!(wizard.resume().unwrap_err(), WizardError::NoPendingResume);
    }

    #[tokio::test]
    async fn test_decline_resume_can_clear() {
        let store = InMemoryProgressStore::new();
        let wizard = WizardController::builder(plain_registry(3))
            .store(Arc::new(store.clone()))
            .session_id("x")
            .build();
        wizard.start().await.unwrap();
        wizard.advance().await.unwrap();
        wizard.close(false);
        wizard.flush_progress().await;
        assert!(store.get("x").is_some());

        assert!(wizard.start().await.unwrap().resume_offer.is_some());
        wizard.decline_resume(true).unwrap();
        wizard.flush_progress().await;
        assert!(store.get("x").is_none());
        assert_eq!(index(&wizard), 0);
    }

    #[tokio::test]
    async fn test_out_of_range_snapshot_is_ignored() {
        let store = InMemoryProgressStore::new();
        store
            .save(
                "default",
                &ProgressSnapshot {
                    session_id: "default".into(),
                    step_index: 12,
                    max_visited_index: 12,
                    data: WizardData::new(),
                    timestamp: Utc::now(),
                },
            )
            .await
            .unwrap();

        let wizard = WizardController::builder(plain_registry(3))
            .store(Arc::new(store))
            .build();
        assert!(wizard.start().await.unwrap().resume_offer.is_none());
    }

    #[tokio::test]
    async fn test_reached_step_is_clamped_on_resume() {
        let store = InMemoryProgressStore::new();
        store
            .save(
                "default",
                &ProgressSnapshot {
                    session_id: "default".into(),
                    step_index: 1,
                    max_visited_index: 12,
                    data: WizardData::new(),
                    timestamp: Utc::now(),
                },
            )
            .await
            .unwrap();

        let wizard = WizardController::builder(plain_registry(3))
            .store(Arc::new(store))
            .build();
        let offer = wizard.start().await.unwrap().resume_offer.unwrap();
        assert_eq!(offer.step_index, 1);
        assert_eq!(offer.max_visited_index, 2);

        wizard.resume().unwrap();
        let view = wizard.snapshot().unwrap();
        assert_eq!(view.current_step_index, 1);
        assert_eq!(view.max_visited_index, 2);
        assert_eq!(
            wizard.jump_to(2).unwrap(),
            Transition::Jumped { from: 1, to: 2 }
        );
    }

    #[tokio::test]
    async fn test_misuse_is_reported() {
        let wizard = WizardController::builder(plain_registry(2)).build();
        assert_eq!(wizard.advance().await.unwrap_err(), WizardError::NotStarted);
        assert_eq!(wizard.retreat().unwrap_err(), WizardError::NotStarted);
        assert_eq!(wizard.jump_to(99).unwrap_err(), WizardError::NotStarted);
        assert_eq!(
            wizard.select("k", json!(1)).unwrap_err(),
            WizardError::NotStarted
        );

        wizard.start().await.unwrap();
        assert_eq!(wizard.start().await.unwrap_err(), WizardError::AlreadyStarted);

        wizard.close(false);
        wizard.close(false);
        assert_eq!(wizard.advance().await.unwrap_err(), WizardError::Closed);
        assert_eq!(wizard.jump_to(99).unwrap_err(), WizardError::Closed);
        assert!(!wizard.can_advance());
    }

    #[tokio::test]
    async fn test_reset_starts_a_fresh_session() {
        let (tx, mut rx) = events::channel();
        let wizard = WizardController::builder(plain_registry(1))
            .events(tx)
            .build();
        wizard.start().await.unwrap();
        wizard.select("k", json!(1)).unwrap();
        assert!(matches!(
            wizard.advance().await.unwrap(),
            Transition::Completed(_)
        ));

        wizard.reset(true);
        assert_eq!(wizard.status(), WizardStatus::NotStarted);
        wizard.start().await.unwrap();
        assert!(wizard.snapshot().unwrap().data.is_empty());

        let started = events::drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, WizardEvent::Started { .. }))
            .count();
        assert_eq!(started, 2);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Toggle(usize),
        Advance,
        Retreat,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..onboarding::SOURCES.len()).prop_map(Op::Toggle),
            Just(Op::Advance),
            Just(Op::Retreat),
        ]
    }

    proptest! {
        #[test]
        fn prop_advance_iff_guard_passes(ops in prop::collection::vec(op(), 1..40)) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async {
                let wizard = WizardController::builder(onboarding::registry()).build();
                wizard.start().await.unwrap();

                for op in ops {
                    let Some(before) = wizard.snapshot() else { break };
                    match op {
                        Op::Toggle(i) => {
                            wizard
                                .toggle(onboarding::SOURCES_KEY, json!(onboarding::SOURCES[i].0))
                                .unwrap();
                        }
                        Op::Advance => {
                            let step = wizard.registry().get(before.current_step_index).unwrap();
                            let expected = step.validate(&before.data) && !before.busy;
                            let outcome = wizard.advance().await.unwrap();
                            prop_assert_eq!(outcome != Transition::Blocked, expected);
                            if let Some(after) = wizard.snapshot() {
                                let moved = after.current_step_index == before.current_step_index + 1;
                                prop_assert_eq!(moved, expected);
                            }
                        }
                        Op::Retreat => {
                            wizard.retreat().unwrap();
                            let after = wizard.snapshot().unwrap();
                            prop_assert_eq!(after.data, before.data);
                            prop_assert_eq!(
                                after.current_step_index,
                                before.current_step_index.saturating_sub(1)
                            );
                        }
                    }
                }
                Ok(())
            })?;
        }
    }
}

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::ExecutionApi;
use crate::error::RunsheetResult;
use crate::models::{Execution, ExecutionUpdate, StepPatch, StepUpdate};

/// Notifications for the view that owns a coordinator.
#[derive(Debug, Clone)]
pub enum CoordinatorEvent {
    /// The server returned a new version of the execution.
    Updated(Execution),
    /// Every step is checked and `finishedAt` has been written.
    Completed(Execution),
    /// A debounced batch was rejected. Its updates are gone.
    FlushFailed {
        execution_id: Uuid,
        dropped: Vec<StepUpdate>,
        error: String,
    },
}

struct State {
    execution: Execution,
    pending: BTreeMap<usize, StepPatch>,
    composing: HashMap<usize, String>,
    timer: Option<JoinHandle<()>>,
    completing: bool,
    closed: bool,
}

impl State {
    /// Re-applies edits the server has not seen yet on top of a fresh
    /// server copy.
    fn overlay_local_edits(&mut self) {
        let now = Utc::now();
        for (idx, patch) in &self.pending {
            if let Some(step) = self.execution.steps.get_mut(*idx) {
                step.apply(patch, now);
            }
        }
        for (idx, text) in &self.composing {
            if let Some(step) = self.execution.steps.get_mut(*idx) {
                step.remark_text = Some(text.clone());
            }
        }
    }

    fn set_local_remark(&mut self, step_idx: usize, patch: &StepPatch) {
        if let Some(step) = self.execution.steps.get_mut(step_idx) {
            step.apply(patch, Utc::now());
        }
    }
}

struct Shared {
    api: Arc<dyn ExecutionApi>,
    execution_id: Uuid,
    debounce: Duration,
    state: Mutex<State>,
    events: UnboundedSender<CoordinatorEvent>,
}

impl Shared {
    fn emit(&self, event: CoordinatorEvent) {
        let _ = self.events.send(event);
    }

    /// Adopts a server response. Responses for another execution are
    /// ignored.
    fn accept(&self, execution: Execution) -> Execution {
        if execution.id != self.execution_id {
            debug!(
                expected = %self.execution_id,
                got = %execution.id,
                "Ignoring response for another execution"
            );
            return self.state.lock().execution.clone();
        }

        let view = {
            let mut state = self.state.lock();
            state.execution = execution.clone();
            state.overlay_local_edits();
            state.execution.clone()
        };
        self.emit(CoordinatorEvent::Updated(execution));
        view
    }

    /// Writes `finishedAt` once the server reports every step checked and
    /// no finish time yet.
    async fn complete_if_needed(&self, execution: Execution) -> RunsheetResult<Execution> {
        if execution.id != self.execution_id || !execution.needs_completion() {
            return Ok(execution);
        }

        {
            let mut state = self.state.lock();
            if state.completing {
                return Ok(execution);
            }
            state.completing = true;
        }

        let result = self
            .api
            .update_execution(self.execution_id, &ExecutionUpdate::finish(Utc::now()))
            .await;
        self.state.lock().completing = false;

        match result {
            Ok(finished) => {
                info!(execution_id = %self.execution_id, "All steps checked, execution finished");
                let view = self.accept(finished.clone());
                self.emit(CoordinatorEvent::Completed(finished));
                Ok(view)
            }
            Err(e) => {
                warn!(
                    execution_id = %self.execution_id,
                    error = %e,
                    "Failed to record execution finish"
                );
                Err(e)
            }
        }
    }

    fn take_pending(&self) -> Vec<StepUpdate> {
        let mut state = self.state.lock();
        std::mem::take(&mut state.pending)
            .into_iter()
            .map(|(idx, patch)| StepUpdate::new(idx, patch))
            .collect()
    }

    /// Sends everything queued as one batch. Failures are reported as an
    /// event; the taken updates are not requeued.
    async fn flush(&self) -> Option<Execution> {
        let updates = self.take_pending();
        if updates.is_empty() {
            return None;
        }

        debug!(
            execution_id = %self.execution_id,
            updates = updates.len(),
            "Flushing step updates"
        );

        match self
            .api
            .patch_steps_batch(self.execution_id, &updates)
            .await
        {
            Ok(execution) => {
                self.accept(execution.clone());
                // A failed finish write is logged and retried on the next
                // fully checked response.
                let _ = self.complete_if_needed(execution).await;
                Some(self.state.lock().execution.clone())
            }
            Err(e) => {
                warn!(
                    execution_id = %self.execution_id,
                    dropped = updates.len(),
                    error = %e,
                    "Batch step update failed"
                );
                self.emit(CoordinatorEvent::FlushFailed {
                    execution_id: self.execution_id,
                    dropped: updates,
                    error: e.to_string(),
                });
                None
            }
        }
    }
}

/// Per-view reconciler for step edits on one execution.
///
/// Checkbox toggles go straight to the server and are awaited. Remark text
/// and image edits are queued per step index, the newest edit replacing the
/// queued one, and sent as a single batch once no edit has arrived for the
/// debounce window. Whenever the server reports all steps checked with no
/// finish time, the coordinator writes `finishedAt`.
///
/// Queueing arms a timer with `tokio::spawn`, so edit methods must be
/// called from within a tokio runtime. Dropping the coordinator cancels the
/// timer and discards anything still queued; a flush already in flight runs
/// to completion.
pub struct StepUpdateCoordinator {
    shared: Arc<Shared>,
}

impl StepUpdateCoordinator {
    pub fn new(
        api: Arc<dyn ExecutionApi>,
        execution: Execution,
        debounce: Duration,
    ) -> (Self, UnboundedReceiver<CoordinatorEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            api,
            execution_id: execution.id,
            debounce,
            state: Mutex::new(State {
                execution,
                pending: BTreeMap::new(),
                composing: HashMap::new(),
                timer: None,
                completing: false,
                closed: false,
            }),
            events,
        });
        (Self { shared }, rx)
    }

    /// Fetches the execution and builds a coordinator for it.
    pub async fn open(
        api: Arc<dyn ExecutionApi>,
        execution_id: Uuid,
        debounce: Duration,
    ) -> RunsheetResult<(Self, UnboundedReceiver<CoordinatorEvent>)> {
        let execution = api.get_execution(execution_id).await?;
        Ok(Self::new(api, execution, debounce))
    }

    pub fn execution_id(&self) -> Uuid {
        self.shared.execution_id
    }

    /// Local view: the last server copy plus unsent edits.
    pub fn execution(&self) -> Execution {
        self.shared.state.lock().execution.clone()
    }

    /// Queued updates in step order.
    pub fn pending(&self) -> Vec<StepUpdate> {
        self.shared
            .state
            .lock()
            .pending
            .iter()
            .map(|(idx, patch)| StepUpdate::new(*idx, patch.clone()))
            .collect()
    }

    pub fn is_composing(&self, step_idx: usize) -> bool {
        self.shared.state.lock().composing.contains_key(&step_idx)
    }

    /// Sends the toggle immediately and waits for the server. On failure
    /// the local view is left as it was. A failed finish write after a
    /// successful toggle is also returned as an error; the toggle itself
    /// is already applied.
    pub async fn set_checked(&self, step_idx: usize, checked: bool) -> RunsheetResult<Execution> {
        let patch = StepPatch::checked(checked);
        debug!(
            execution_id = %self.shared.execution_id,
            step_idx,
            checked,
            "Sending immediate step update"
        );

        let execution = self
            .shared
            .api
            .patch_step(self.shared.execution_id, step_idx, &patch)
            .await?;

        self.shared.accept(execution.clone());
        self.shared.complete_if_needed(execution).await?;
        Ok(self.execution())
    }

    /// One keystroke of remark input. While a composition is open for the
    /// step only the local view changes.
    pub fn edit_remark_text(&self, step_idx: usize, text: impl Into<String>) {
        let text = text.into();
        let composing = {
            let mut state = self.shared.state.lock();
            if state.closed {
                return;
            }
            state.set_local_remark(step_idx, &StepPatch::remark_text(text.clone()));
            match state.composing.get_mut(&step_idx) {
                Some(buffer) => {
                    *buffer = text.clone();
                    true
                }
                None => false,
            }
        };

        if !composing {
            self.enqueue(step_idx, StepPatch::remark_text(text));
        }
    }

    pub fn edit_remark_image(&self, step_idx: usize, url: impl Into<String>) {
        let patch = StepPatch::remark_image(url);
        {
            let mut state = self.shared.state.lock();
            if state.closed {
                return;
            }
            state.set_local_remark(step_idx, &patch);
        }
        self.enqueue(step_idx, patch);
    }

    pub fn begin_composition(&self, step_idx: usize) {
        let mut state = self.shared.state.lock();
        if state.closed {
            return;
        }
        let current = state
            .execution
            .steps
            .get(step_idx)
            .and_then(|s| s.remark_text.clone())
            .unwrap_or_default();
        state.composing.insert(step_idx, current);
    }

    /// Queues the value the composition settled on.
    pub fn end_composition(&self, step_idx: usize) {
        let committed = self.shared.state.lock().composing.remove(&step_idx);
        if let Some(text) = committed {
            self.enqueue(step_idx, StepPatch::remark_text(text));
        }
    }

    /// Cancels the timer and sends the queue now. `None` when nothing was
    /// queued or the batch failed; failures are also reported as
    /// [`CoordinatorEvent::FlushFailed`].
    pub async fn flush_now(&self) -> Option<Execution> {
        self.cancel_timer();
        self.shared.flush().await
    }

    /// Cancels the timer and silently drops the queue. Later edits are
    /// ignored.
    pub fn close(&self) {
        let mut state = self.shared.state.lock();
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        if !state.pending.is_empty() {
            debug!(
                execution_id = %self.shared.execution_id,
                dropped = state.pending.len(),
                "Discarding queued step updates"
            );
        }
        state.pending.clear();
        state.composing.clear();
        state.closed = true;
    }

    fn cancel_timer(&self) {
        if let Some(timer) = self.shared.state.lock().timer.take() {
            timer.abort();
        }
    }

    fn enqueue(&self, step_idx: usize, patch: StepPatch) {
        let mut state = self.shared.state.lock();
        if state.closed {
            return;
        }
        state.pending.insert(step_idx, patch);
        debug!(
            execution_id = %self.shared.execution_id,
            step_idx,
            queued = state.pending.len(),
            "Queued step update"
        );

        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.timer = Some(spawn_timer(Arc::downgrade(&self.shared), self.shared.debounce));
    }
}

/// Sleeps out the debounce window, then hands the flush to its own task so
/// cancelling the timer never interrupts a request.
fn spawn_timer(shared: Weak<Shared>, debounce: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(debounce).await;
        if let Some(shared) = shared.upgrade() {
            tokio::spawn(async move {
                shared.flush().await;
            });
        }
    })
}

impl Drop for StepUpdateCoordinator {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}

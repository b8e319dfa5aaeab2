use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval, interval_at, sleep_until, Instant, MissedTickBehavior};

use crate::client::autosave::{AutosaveBuffer, OutgoingSave, SyncIndicator};
use crate::client::countdown::Countdown;
use crate::client::error::ClientError;
use crate::client::outbox::ViolationOutbox;
use crate::client::retry::{retry_request, RetryConfig};
use crate::client::signals::{EnvironmentSignal, SignalGate};
use crate::client::transport::ExamApi;
use crate::db::types::{AttemptState, FinalizeReason};
use crate::schemas::{
    AttemptView, LogViolationRequest, SaveAnswerRequest, SubmitResponse, ViolationAction,
};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub debounce: Duration,
    pub tick: Duration,
    pub heartbeat_interval: Duration,
    pub signal_cooldown: Duration,
    pub retry: RetryConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(1),
            tick: Duration::from_secs(1),
            heartbeat_interval: Duration::from_secs(30),
            signal_cooldown: Duration::from_secs(2),
            retry: RetryConfig::default(),
        }
    }
}

/// What the frontend feeds into a running session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionInput {
    Answer { question_id: String, value: String, question_index: i32 },
    Signal(EnvironmentSignal),
    Submit,
}

/// What the frontend renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Tick { remaining_seconds: i64 },
    Sync(SyncIndicator),
    Violation { total_violations: usize, action: ViolationAction },
    Closed { state: AttemptState },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub attempt_id: String,
    /// `in_progress` when the frontend detached; the attempt can be resumed.
    pub state: AttemptState,
    pub submitted_at: Option<String>,
    pub finalize_reason: Option<FinalizeReason>,
    /// Local edits the server never acknowledged.
    pub unsynced_answers: usize,
    /// Integrity signals that never reached the server.
    pub undelivered_violations: usize,
}

/// Submit requested by the student, advanced on its own deadline.
#[derive(Debug, Clone, Copy)]
struct PendingSubmit {
    due: Instant,
    flush_rounds: u32,
    failures: u32,
}

pub struct SessionController<A> {
    api: A,
    config: SessionConfig,
    attempt: AttemptView,
    countdown: Countdown,
    autosave: AutosaveBuffer,
    violations: ViolationOutbox,
    gate: SignalGate,
    submit: Option<PendingSubmit>,
    total_violations: usize,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl<A: ExamApi> SessionController<A> {
    /// Starts or resumes the attempt for `exam_id`.
    pub async fn start(
        api: A,
        exam_id: &str,
        config: SessionConfig,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<Self, ClientError> {
        let attempt = retry_request(&config.retry, "start", || api.start(exam_id)).await?;
        tracing::info!(
            attempt_id = %attempt.attempt_id,
            exam_id,
            resumed = attempt.resumed,
            remaining_seconds = attempt.remaining_seconds,
            "Exam session opened"
        );
        Ok(Self::resume(api, attempt, config, events))
    }

    pub fn resume(
        api: A,
        attempt: AttemptView,
        config: SessionConfig,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            countdown: Countdown::new(attempt.remaining_seconds),
            autosave: AutosaveBuffer::new(config.debounce, &attempt.previous_answers),
            violations: ViolationOutbox::new(),
            gate: SignalGate::new(config.signal_cooldown),
            submit: None,
            total_violations: attempt.total_violations,
            api,
            config,
            attempt,
            events,
        }
    }

    pub fn attempt(&self) -> &AttemptView {
        &self.attempt
    }

    pub fn answer(&self, question_id: &str) -> Option<&str> {
        self.autosave.answer(question_id)
    }

    pub fn remaining_seconds(&self) -> i64 {
        self.countdown.remaining()
    }

    pub fn total_violations(&self) -> usize {
        self.total_violations
    }

    /// Drives the session until it closes, the student submits, or `inputs`
    /// is dropped.
    pub async fn run(
        mut self,
        mut inputs: mpsc::Receiver<SessionInput>,
    ) -> Result<SessionOutcome, ClientError> {
        if self.attempt.state.is_terminal() {
            let state = self.attempt.state;
            return Ok(self.closed(state, None));
        }

        let mut tick = interval(self.config.tick);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut heartbeat = interval_at(
            Instant::now() + self.config.heartbeat_interval,
            self.config.heartbeat_interval,
        );
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut inputs_open = true;
        loop {
            let autosave_due = self.autosave.next_deadline();
            let violations_due = self.violations.next_deadline();
            let submit_due = self.submit.map(|submit| submit.due);
            let step = tokio::select! {
                _ = tick.tick() => self.on_tick().await?,
                _ = heartbeat.tick() => self.sync_heartbeat().await?,
                _ = until(autosave_due) => self.flush(false).await?,
                _ = until(violations_due) => self.deliver_violations().await?,
                _ = until(submit_due) => self.advance_submit().await?,
                input = inputs.recv(), if inputs_open => match input {
                    Some(SessionInput::Answer { question_id, value, question_index }) => {
                        self.autosave.record(question_id, value, question_index, Instant::now());
                        self.emit(SessionEvent::Sync(self.sync_indicator()));
                        None
                    }
                    Some(SessionInput::Signal(signal)) => self.forward_signal(signal).await?,
                    Some(SessionInput::Submit) => {
                        self.request_submit();
                        None
                    }
                    // A submit in flight still runs to completion.
                    None if self.submit.is_some() => {
                        inputs_open = false;
                        None
                    }
                    None => return self.detach().await,
                },
            };

            if let Some(outcome) = step {
                return Ok(outcome);
            }
        }
    }

    async fn on_tick(&mut self) -> Result<Option<SessionOutcome>, ClientError> {
        let remaining_seconds = self.countdown.remaining();
        self.emit(SessionEvent::Tick { remaining_seconds });
        if remaining_seconds > 0 {
            return Ok(None);
        }

        if let Some(outcome) = self.flush(true).await? {
            return Ok(Some(outcome));
        }
        self.sync_heartbeat().await
    }

    async fn sync_heartbeat(&mut self) -> Result<Option<SessionOutcome>, ClientError> {
        match self.api.heartbeat(&self.attempt.attempt_id).await {
            Ok(beat) => {
                self.countdown.sync(beat.remaining_seconds);
                if beat.state.is_terminal() {
                    return Ok(Some(self.closed(beat.state, None)));
                }
                Ok(None)
            }
            Err(ClientError::AttemptClosed { state }) => Ok(Some(self.closed(state, None))),
            Err(err) if err.is_retryable() => {
                tracing::warn!(
                    attempt_id = %self.attempt.attempt_id,
                    error = %err,
                    "Heartbeat failed; keeping local countdown"
                );
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Sends due answers (all pending ones when `all`). A transient failure
    /// reschedules the rest of the round with backoff.
    async fn flush(&mut self, all: bool) -> Result<Option<SessionOutcome>, ClientError> {
        let batch =
            if all { self.autosave.take_all() } else { self.autosave.take_due(Instant::now()) };
        if batch.is_empty() {
            return Ok(None);
        }

        for (position, save) in batch.iter().enumerate() {
            match self.api.save_answer(&self.save_request(save)).await {
                Ok(ack) => {
                    self.countdown.sync(ack.remaining_seconds);
                    self.autosave.acknowledge(save);
                }
                Err(ClientError::AttemptClosed { state }) => {
                    return Ok(Some(self.closed(state, None)));
                }
                Err(err) if err.is_retryable() => {
                    let wait = self.config.retry.delay_for(self.autosave.failures() + 1);
                    self.autosave.retry_at(&batch[position..], Instant::now() + wait);
                    tracing::warn!(
                        attempt_id = %self.attempt.attempt_id,
                        question_id = %save.question_id,
                        failures = self.autosave.failures(),
                        error = %err,
                        "Autosave failed; will retry"
                    );
                    break;
                }
                Err(err) => {
                    tracing::warn!(
                        attempt_id = %self.attempt.attempt_id,
                        question_id = %save.question_id,
                        error = %err,
                        "Answer rejected; dropping local edit"
                    );
                    self.autosave.discard(save);
                }
            }
        }

        self.emit(SessionEvent::Sync(self.sync_indicator()));
        Ok(None)
    }

    async fn forward_signal(
        &mut self,
        signal: EnvironmentSignal,
    ) -> Result<Option<SessionOutcome>, ClientError> {
        let kind = signal.violation_kind();
        let now = Instant::now();
        if !self.gate.admit(&kind, now) {
            tracing::debug!(violation_type = kind.as_str(), "Repeated signal suppressed");
            return Ok(None);
        }

        let request = LogViolationRequest {
            attempt_id: self.attempt.attempt_id.clone(),
            kind,
            details: None,
        };
        self.violations.push(request, now);
        self.deliver_violations().await
    }

    /// Sends queued violations in order. A transient failure parks the queue
    /// until its backoff deadline; the loop keeps running meanwhile.
    async fn deliver_violations(&mut self) -> Result<Option<SessionOutcome>, ClientError> {
        let was_stalled = self.violations.is_stalled();

        while let Some(request) = self.violations.next_ready(Instant::now()).cloned() {
            match self.api.log_violation(&request).await {
                Ok(response) => {
                    self.violations.delivered(Instant::now());
                    self.total_violations = response.total_violations;
                    self.emit(SessionEvent::Violation {
                        total_violations: response.total_violations,
                        action: response.action,
                    });
                    if response.state.is_terminal() {
                        let reason = (response.action == ViolationAction::ForceSubmit)
                            .then_some(FinalizeReason::Violation);
                        return Ok(Some(self.closed(response.state, reason)));
                    }
                }
                Err(ClientError::AttemptClosed { state }) => {
                    return Ok(Some(self.closed(state, None)));
                }
                Err(err) if err.is_retryable() => {
                    let wait = self.config.retry.delay_for(self.violations.failures() + 1);
                    self.violations.retry_at(Instant::now() + wait);
                    tracing::warn!(
                        attempt_id = %self.attempt.attempt_id,
                        violation_type = request.kind.as_str(),
                        failures = self.violations.failures(),
                        queued = self.violations.len(),
                        error = %err,
                        "Violation delivery failed; will retry"
                    );
                    self.emit(SessionEvent::Sync(self.sync_indicator()));
                    return Ok(None);
                }
                Err(err) => {
                    tracing::warn!(
                        attempt_id = %self.attempt.attempt_id,
                        violation_type = request.kind.as_str(),
                        error = %err,
                        "Violation rejected; dropping"
                    );
                    self.violations.reject(Instant::now());
                }
            }
        }

        if was_stalled && !self.violations.is_stalled() {
            self.emit(SessionEvent::Sync(self.sync_indicator()));
        }
        Ok(None)
    }

    fn request_submit(&mut self) {
        if self.submit.is_some() {
            return;
        }
        tracing::info!(attempt_id = %self.attempt.attempt_id, "Submit requested");
        self.submit = Some(PendingSubmit { due: Instant::now(), flush_rounds: 0, failures: 0 });
    }

    /// One submit step: push what is pending, then either wait for another
    /// flush round or call the server. Attempts are capped by the retry config.
    async fn advance_submit(&mut self) -> Result<Option<SessionOutcome>, ClientError> {
        if let Some(outcome) = self.flush(true).await? {
            return Ok(Some(outcome));
        }
        if let Some(outcome) = self.deliver_violations().await? {
            return Ok(Some(outcome));
        }
        let Some(mut pending) = self.submit.take() else {
            return Ok(None);
        };

        let max_attempts = u32::try_from(self.config.retry.max_attempts).unwrap_or(u32::MAX);
        let backlog = self.autosave.pending_len() + self.violations.len();
        if backlog > 0 {
            if pending.flush_rounds + 1 < max_attempts {
                pending.flush_rounds += 1;
                pending.due = Instant::now() + self.config.retry.delay_for(pending.flush_rounds);
                self.submit = Some(pending);
                return Ok(None);
            }
            tracing::warn!(
                attempt_id = %self.attempt.attempt_id,
                unsynced_answers = self.autosave.pending_len(),
                undelivered_violations = self.violations.len(),
                "Submitting with unsynced work"
            );
        }

        match self.api.submit(&self.attempt.attempt_id).await {
            Ok(response) => Ok(Some(self.submitted(response))),
            Err(ClientError::AttemptClosed { state }) => Ok(Some(self.closed(state, None))),
            Err(err) if err.is_retryable() && pending.failures + 1 < max_attempts => {
                pending.failures += 1;
                pending.due = Instant::now() + self.config.retry.delay_for(pending.failures);
                tracing::warn!(
                    attempt_id = %self.attempt.attempt_id,
                    failures = pending.failures,
                    error = %err,
                    "Submit failed; retrying"
                );
                self.submit = Some(pending);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn submitted(&mut self, response: SubmitResponse) -> SessionOutcome {
        let unsynced_answers = self.autosave.abandon();
        let undelivered_violations = self.violations.abandon();
        self.attempt.state = response.state;
        self.emit(SessionEvent::Closed { state: response.state });
        tracing::info!(
            attempt_id = %self.attempt.attempt_id,
            state = %response.state,
            unsynced_answers,
            undelivered_violations,
            "Exam session submitted"
        );

        SessionOutcome {
            attempt_id: self.attempt.attempt_id.clone(),
            state: response.state,
            submitted_at: response.submitted_at,
            finalize_reason: response.finalize_reason,
            unsynced_answers,
            undelivered_violations,
        }
    }

    /// Frontend went away: push what is pending once and leave the attempt open.
    async fn detach(mut self) -> Result<SessionOutcome, ClientError> {
        if let Some(outcome) = self.flush(true).await? {
            return Ok(outcome);
        }
        if let Some(outcome) = self.deliver_violations().await? {
            return Ok(outcome);
        }

        Ok(SessionOutcome {
            attempt_id: self.attempt.attempt_id.clone(),
            state: self.attempt.state,
            submitted_at: None,
            finalize_reason: None,
            unsynced_answers: self.autosave.pending_len(),
            undelivered_violations: self.violations.len(),
        })
    }

    fn closed(&mut self, state: AttemptState, reason: Option<FinalizeReason>) -> SessionOutcome {
        let unsynced_answers = self.autosave.abandon();
        let undelivered_violations = self.violations.abandon();
        if unsynced_answers > 0 || undelivered_violations > 0 {
            tracing::warn!(
                attempt_id = %self.attempt.attempt_id,
                unsynced_answers,
                undelivered_violations,
                "Attempt closed with unsynced work"
            );
        }
        self.attempt.state = state;
        self.emit(SessionEvent::Closed { state });

        SessionOutcome {
            attempt_id: self.attempt.attempt_id.clone(),
            state,
            submitted_at: None,
            finalize_reason: reason,
            unsynced_answers,
            undelivered_violations,
        }
    }

    /// Answers and violations share one indicator; a stalled violation shows
    /// as unsynced even when every answer is saved.
    fn sync_indicator(&self) -> SyncIndicator {
        if self.violations.is_stalled() {
            SyncIndicator::Unsynced
        } else {
            self.autosave.indicator()
        }
    }

    fn save_request(&self, save: &OutgoingSave) -> SaveAnswerRequest {
        SaveAnswerRequest {
            attempt_id: self.attempt.attempt_id.clone(),
            question_id: save.question_id.clone(),
            value: save.value.clone(),
            question_index: save.question_index,
        }
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("Session event receiver dropped");
        }
    }
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

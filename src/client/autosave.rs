use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::client::optimistic::Optimistic;
use crate::db::models::SavedAnswer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncIndicator {
    Synced,
    Saving,
    Unsynced,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftAnswer {
    pub value: String,
    pub question_index: i32,
}

/// One answer ready to go over the wire, tagged with its overlay revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingSave {
    pub question_id: String,
    pub value: String,
    pub question_index: i32,
    pub revision: u64,
}

/// Debounced per-question autosave queue on top of an optimistic overlay.
#[derive(Debug)]
pub struct AutosaveBuffer {
    overlay: Optimistic<String, DraftAnswer>,
    due: BTreeMap<String, Instant>,
    debounce: Duration,
    failures: u32,
}

impl AutosaveBuffer {
    pub fn new(debounce: Duration, saved: &BTreeMap<String, SavedAnswer>) -> Self {
        let confirmed = saved
            .iter()
            .map(|(question_id, answer)| {
                (
                    question_id.clone(),
                    DraftAnswer {
                        value: answer.value.clone(),
                        question_index: answer.question_index,
                    },
                )
            })
            .collect();

        Self {
            overlay: Optimistic::with_confirmed(confirmed),
            due: BTreeMap::new(),
            debounce,
            failures: 0,
        }
    }

    /// Buffers an edit; a later edit to the same question restarts its debounce.
    pub fn record(&mut self, question_id: String, value: String, question_index: i32, now: Instant) {
        self.due.insert(question_id.clone(), now + self.debounce);
        self.overlay.apply(question_id, DraftAnswer { value, question_index });
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.due.values().min().copied()
    }

    pub fn take_due(&mut self, now: Instant) -> Vec<OutgoingSave> {
        let ready: Vec<String> = self
            .due
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(question_id, _)| question_id.clone())
            .collect();

        ready
            .into_iter()
            .filter_map(|question_id| {
                self.due.remove(&question_id);
                self.outgoing(question_id)
            })
            .collect()
    }

    /// Everything still unacknowledged, ignoring debounce. Used before submit.
    pub fn take_all(&mut self) -> Vec<OutgoingSave> {
        self.due.clear();
        let keys: Vec<String> = self.overlay.pending_keys().cloned().collect();
        keys.into_iter().filter_map(|question_id| self.outgoing(question_id)).collect()
    }

    pub fn acknowledge(&mut self, save: &OutgoingSave) {
        self.failures = 0;
        self.overlay.confirm(&save.question_id, save.revision);
    }

    /// Counts one failed round and reschedules its saves. A newer edit keeps
    /// its own deadline.
    pub fn retry_at(&mut self, saves: &[OutgoingSave], at: Instant) {
        self.failures = self.failures.saturating_add(1);
        for save in saves {
            self.due.entry(save.question_id.clone()).or_insert(at);
        }
    }

    /// Drops an edit the server rejected for good.
    pub fn discard(&mut self, save: &OutgoingSave) {
        self.overlay.revert(&save.question_id, save.revision);
    }

    /// Drops every unacknowledged edit once the attempt is closed; returns how many.
    pub fn abandon(&mut self) -> usize {
        self.due.clear();
        self.overlay.revert_all()
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn pending_len(&self) -> usize {
        self.overlay.pending_len()
    }

    pub fn answer(&self, question_id: &str) -> Option<&str> {
        self.overlay.get(&question_id.to_string()).map(|draft| draft.value.as_str())
    }

    pub fn indicator(&self) -> SyncIndicator {
        if self.overlay.pending_len() == 0 {
            SyncIndicator::Synced
        } else if self.failures > 0 {
            SyncIndicator::Unsynced
        } else {
            SyncIndicator::Saving
        }
    }

    fn outgoing(&self, question_id: String) -> Option<OutgoingSave> {
        let (revision, draft) = self.overlay.pending(&question_id)?;
        Some(OutgoingSave {
            value: draft.value.clone(),
            question_index: draft.question_index,
            revision,
            question_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::time::primitive_now_utc;

    fn buffer() -> AutosaveBuffer {
        AutosaveBuffer::new(Duration::from_secs(1), &BTreeMap::new())
    }

    #[test]
    fn bursts_collapse_into_one_save_after_debounce() {
        let mut buffer = buffer();
        let t0 = Instant::now();

        buffer.record("q1".into(), "4".into(), 0, t0);
        buffer.record("q1".into(), "42".into(), 0, t0 + Duration::from_millis(400));

        assert!(buffer.take_due(t0 + Duration::from_millis(1_000)).is_empty());
        assert_eq!(buffer.next_deadline(), Some(t0 + Duration::from_millis(1_400)));

        let due = buffer.take_due(t0 + Duration::from_millis(1_400));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].value, "42");
        assert_eq!(buffer.indicator(), SyncIndicator::Saving);

        buffer.acknowledge(&due[0]);
        assert_eq!(buffer.indicator(), SyncIndicator::Synced);
        assert_eq!(buffer.answer("q1"), Some("42"));
    }

    #[test]
    fn failed_saves_stay_pending_until_retried() {
        let mut buffer = buffer();
        let t0 = Instant::now();
        buffer.record("q2".into(), "draft".into(), 1, t0);

        let due = buffer.take_due(t0 + Duration::from_secs(1));
        buffer.retry_at(&due, t0 + Duration::from_secs(3));

        assert_eq!(buffer.indicator(), SyncIndicator::Unsynced);
        assert_eq!(buffer.failures(), 1);
        assert!(buffer.take_due(t0 + Duration::from_secs(2)).is_empty());

        let retried = buffer.take_due(t0 + Duration::from_secs(3));
        assert_eq!(retried, due);
        buffer.acknowledge(&retried[0]);
        assert_eq!(buffer.failures(), 0);
        assert_eq!(buffer.indicator(), SyncIndicator::Synced);
    }

    #[test]
    fn edit_during_flight_survives_older_ack() {
        let mut buffer = buffer();
        let t0 = Instant::now();
        buffer.record("q1".into(), "a".into(), 0, t0);
        let in_flight = buffer.take_due(t0 + Duration::from_secs(1));

        buffer.record("q1".into(), "ab".into(), 0, t0 + Duration::from_secs(1));
        buffer.acknowledge(&in_flight[0]);

        assert_eq!(buffer.pending_len(), 1);
        assert_eq!(buffer.answer("q1"), Some("ab"));
    }

    #[test]
    fn resumed_answers_seed_the_confirmed_view() {
        let saved = BTreeMap::from([(
            "q3".to_string(),
            SavedAnswer { value: "kept".into(), saved_at: primitive_now_utc(), question_index: 2 },
        )]);
        let mut buffer = AutosaveBuffer::new(Duration::from_secs(1), &saved);
        assert_eq!(buffer.answer("q3"), Some("kept"));

        buffer.record("q3".into(), "lost".into(), 2, Instant::now());
        assert_eq!(buffer.take_all().len(), 1);
        assert_eq!(buffer.abandon(), 1);
        assert_eq!(buffer.answer("q3"), Some("kept"));
    }
}

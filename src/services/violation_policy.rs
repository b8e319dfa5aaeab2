use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::core::config::{ThresholdPair, ViolationSettings};
use crate::db::models::ViolationRecord;
use crate::db::types::ViolationKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationAction {
    None,
    Warn,
    ForceSubmit,
}

impl ViolationAction {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Warn => "warn",
            Self::ForceSubmit => "force_submit",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ViolationTally {
    pub(crate) by_kind: BTreeMap<ViolationKind, u32>,
    /// Every logged signal.
    pub(crate) total: u32,
    /// Signals that count toward the shared thresholds.
    pub(crate) counted: u32,
}

impl ViolationTally {
    pub(crate) fn kind_count(&self, kind: &ViolationKind) -> u32 {
        self.by_kind.get(kind).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ViolationPolicy {
    shared: ThresholdPair,
    uncounted: BTreeSet<ViolationKind>,
    per_kind: BTreeMap<ViolationKind, ThresholdPair>,
}

impl ViolationPolicy {
    pub(crate) fn new(warn: u32, force: u32) -> Self {
        Self {
            shared: ThresholdPair { warn, force },
            uncounted: BTreeSet::new(),
            per_kind: BTreeMap::new(),
        }
    }

    pub(crate) fn from_settings(settings: &ViolationSettings) -> Self {
        let policy = settings
            .uncounted
            .iter()
            .cloned()
            .fold(Self::new(settings.warn_threshold, settings.force_threshold), Self::with_uncounted);
        settings.per_kind.iter().fold(policy, |policy, (kind, limits)| {
            policy.with_override(kind.clone(), limits.warn, limits.force)
        })
    }

    pub(crate) fn with_uncounted(mut self, kind: ViolationKind) -> Self {
        self.uncounted.insert(kind);
        self
    }

    pub(crate) fn with_override(mut self, kind: ViolationKind, warn: u32, force: u32) -> Self {
        self.per_kind.insert(kind, ThresholdPair { warn, force });
        self
    }

    pub(crate) fn is_counted(&self, kind: &ViolationKind) -> bool {
        !self.uncounted.contains(kind)
    }

    pub(crate) fn tally(&self, records: &[ViolationRecord]) -> ViolationTally {
        let mut tally = ViolationTally::default();
        for record in records {
            *tally.by_kind.entry(record.kind.clone()).or_insert(0) += 1;
            tally.total += 1;
            if self.is_counted(&record.kind) {
                tally.counted += 1;
            }
        }
        tally
    }

    /// Decision for the signal `latest`, which must already be included in
    /// `tally`. Pure over the counts.
    pub(crate) fn decide(&self, tally: &ViolationTally, latest: &ViolationKind) -> ViolationAction {
        if !self.is_counted(latest) {
            return ViolationAction::None;
        }

        let kind_limits = self.per_kind.get(latest);
        let kind_count = tally.kind_count(latest);

        let forced = tally.counted >= self.shared.force
            || kind_limits.is_some_and(|limits| kind_count >= limits.force);
        if forced {
            return ViolationAction::ForceSubmit;
        }

        let warned = tally.counted >= self.shared.warn
            || kind_limits.is_some_and(|limits| kind_count >= limits.warn);
        if warned {
            return ViolationAction::Warn;
        }

        ViolationAction::None
    }
}

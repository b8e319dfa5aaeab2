use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::db::types::ViolationKind;

/// Browser-side integrity events, decoupled from any DOM API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentSignal {
    VisibilityHidden,
    WindowBlur,
    FullscreenExit,
    Copy,
    Paste,
    ContextMenu,
    Other(String),
}

impl EnvironmentSignal {
    pub fn violation_kind(&self) -> ViolationKind {
        match self {
            Self::VisibilityHidden => ViolationKind::TabSwitch,
            Self::WindowBlur => ViolationKind::WindowBlur,
            Self::FullscreenExit => ViolationKind::FullscreenExit,
            Self::Copy => ViolationKind::Copy,
            Self::Paste => ViolationKind::Paste,
            Self::ContextMenu => ViolationKind::RightClick,
            Self::Other(kind) => ViolationKind::parse(kind),
        }
    }
}

/// Suppresses repeats of the same kind inside `cooldown`. A single tab switch
/// typically fires several DOM events in a row.
#[derive(Debug, Clone)]
pub struct SignalGate {
    cooldown: Duration,
    last_sent: HashMap<ViolationKind, Instant>,
}

impl SignalGate {
    pub fn new(cooldown: Duration) -> Self {
        Self { cooldown, last_sent: HashMap::new() }
    }

    pub fn admit(&mut self, kind: &ViolationKind, now: Instant) -> bool {
        if let Some(last) = self.last_sent.get(kind) {
            if now.saturating_duration_since(*last) < self.cooldown {
                return false;
            }
        }
        self.last_sent.insert(kind.clone(), now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signals_map_to_violation_kinds() {
        assert_eq!(EnvironmentSignal::VisibilityHidden.violation_kind(), ViolationKind::TabSwitch);
        assert_eq!(EnvironmentSignal::ContextMenu.violation_kind(), ViolationKind::RightClick);
        assert_eq!(
            EnvironmentSignal::Other("devtools-open".into()).violation_kind().as_str(),
            "devtools-open"
        );
    }

    #[test]
    fn gate_drops_repeats_within_cooldown_per_kind() {
        let mut gate = SignalGate::new(Duration::from_secs(2));
        let t0 = Instant::now();

        assert!(gate.admit(&ViolationKind::TabSwitch, t0));
        assert!(!gate.admit(&ViolationKind::TabSwitch, t0 + Duration::from_millis(500)));
        assert!(gate.admit(&ViolationKind::FullscreenExit, t0 + Duration::from_millis(500)));
        assert!(gate.admit(&ViolationKind::TabSwitch, t0 + Duration::from_secs(2)));
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "examstatus", rename_all = "lowercase")]
pub enum ExamStatus {
    Draft,
    Published,
    Active,
    Completed,
    Archived,
}

impl ExamStatus {
    pub(crate) fn is_student_visible(self) -> bool {
        matches!(self, Self::Published | Self::Active)
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Archived => "archived",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "attemptstate", rename_all = "snake_case")]
pub enum AttemptState {
    InProgress,
    Submitted,
    AutoSubmitted,
}

impl AttemptState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::InProgress)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Submitted => "submitted",
            Self::AutoSubmitted => "auto_submitted",
        }
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "finalizereason", rename_all = "lowercase")]
pub enum FinalizeReason {
    Explicit,
    Timeout,
    Violation,
}

impl FinalizeReason {
    /// Terminal state an attempt lands in when finalized for this reason.
    pub fn target_state(self) -> AttemptState {
        match self {
            Self::Explicit => AttemptState::Submitted,
            Self::Timeout | Self::Violation => AttemptState::AutoSubmitted,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Explicit => "explicit",
            Self::Timeout => "timeout",
            Self::Violation => "violation",
        }
    }
}

/// Integrity signal reported by the exam client. The set is open: unknown
/// kebab-case identifiers are kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ViolationKind {
    TabSwitch,
    WindowBlur,
    FullscreenExit,
    Copy,
    Paste,
    CopyPaste,
    RightClick,
    Other(String),
}

impl ViolationKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::TabSwitch => "tab-switch",
            Self::WindowBlur => "window-blur",
            Self::FullscreenExit => "fullscreen-exit",
            Self::Copy => "copy",
            Self::Paste => "paste",
            Self::CopyPaste => "copy-paste",
            Self::RightClick => "right-click",
            Self::Other(value) => value,
        }
    }

    pub(crate) fn parse(value: &str) -> Self {
        match value {
            "tab-switch" => Self::TabSwitch,
            "window-blur" => Self::WindowBlur,
            "fullscreen-exit" => Self::FullscreenExit,
            "copy" => Self::Copy,
            "paste" => Self::Paste,
            "copy-paste" => Self::CopyPaste,
            "right-click" => Self::RightClick,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for ViolationKind {
    fn from(value: String) -> Self {
        Self::parse(value.trim())
    }
}

impl From<ViolationKind> for String {
    fn from(value: ViolationKind) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Error types shared across Reelsmith crates.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Phase of a render that an error or timing sample belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderPhase {
    Prepare,
    Segment,
    Assemble,
    Overlay,
    Export,
    Cleanup,
}

impl RenderPhase {
    pub const ALL: [RenderPhase; 6] = [
        RenderPhase::Prepare,
        RenderPhase::Segment,
        RenderPhase::Assemble,
        RenderPhase::Overlay,
        RenderPhase::Export,
        RenderPhase::Cleanup,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RenderPhase::Prepare => "prepare",
            RenderPhase::Segment => "segment",
            RenderPhase::Assemble => "assemble",
            RenderPhase::Overlay => "overlay",
            RenderPhase::Export => "export",
            RenderPhase::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for RenderPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a render stopped before completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// The caller set the cancellation token.
    Requested,
    /// The memory monitor observed the critical pressure band.
    MemoryPressure,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Requested => f.write_str("requested by caller"),
            CancelReason::MemoryPressure => f.write_str("critical memory pressure"),
        }
    }
}

/// Top-level error type for Reelsmith operations.
#[derive(Debug, thiserror::Error)]
pub enum ReelError {
    #[error("Invalid render plan: {message}")]
    InvalidPlan { message: String },

    #[error("Segment {index} failed: {message}")]
    Segment { index: usize, message: String },

    #[error("Assembly failed: {message}")]
    Assembly { message: String },

    #[error("Encoding failed during {phase}: {message}")]
    Encoding { phase: RenderPhase, message: String },

    #[error("Render cancelled during {phase}: {reason}")]
    Cancelled {
        phase: RenderPhase,
        reason: CancelReason,
    },

    #[error("Export timed out after {limit_secs:.1}s")]
    TimedOut { limit_secs: f64 },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using ReelError.
pub type ReelResult<T> = Result<T, ReelError>;

impl ReelError {
    pub fn invalid_plan(msg: impl Into<String>) -> Self {
        Self::InvalidPlan {
            message: msg.into(),
        }
    }

    pub fn segment(index: usize, msg: impl Into<String>) -> Self {
        Self::Segment {
            index,
            message: msg.into(),
        }
    }

    pub fn assembly(msg: impl Into<String>) -> Self {
        Self::Assembly {
            message: msg.into(),
        }
    }

    pub fn encoding(phase: RenderPhase, msg: impl Into<String>) -> Self {
        Self::Encoding {
            phase,
            message: msg.into(),
        }
    }

    pub fn cancelled(phase: RenderPhase, reason: CancelReason) -> Self {
        Self::Cancelled { phase, reason }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// The render phase this error is attributed to, when it has one.
    pub fn phase(&self) -> Option<RenderPhase> {
        match self {
            Self::InvalidPlan { .. } | Self::Config { .. } | Self::FileNotFound { .. } => {
                Some(RenderPhase::Prepare)
            }
            Self::Segment { .. } => Some(RenderPhase::Segment),
            Self::Assembly { .. } => Some(RenderPhase::Assemble),
            Self::Encoding { phase, .. } | Self::Cancelled { phase, .. } => Some(*phase),
            Self::TimedOut { .. } => Some(RenderPhase::Export),
            _ => None,
        }
    }

    /// True for cancellation and timeout, the outcomes a caller did not cause
    /// through a bad plan.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled { .. } | Self::TimedOut { .. })
    }
}

//! Error types for sampling and baking.

use thiserror::Error;

/// Why a single clip could not be sampled. Non-fatal at the bake level: the
/// aggregator records the failure, keeps the clip's slot, and moves on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SampleError {
    #[error("clip '{name}': {reason}")]
    UnresolvedClip { name: String, reason: &'static str },
    #[error("another pose evaluation is in progress")]
    PoseBusy,
}

impl SampleError {
    pub fn unresolved(name: &str, reason: &'static str) -> Self {
        Self::UnresolvedClip {
            name: name.to_string(),
            reason,
        }
    }

    /// Clip name this error refers to, when there is one.
    pub fn clip_name(&self) -> Option<&str> {
        match self {
            Self::UnresolvedClip { name, .. } => Some(name),
            Self::PoseBusy => None,
        }
    }
}

/// A whole bake pass refused or aborted. Nothing is committed when one of
/// these comes back; any previously baked data stays live.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BakeError {
    #[error("no skeleton to bake")]
    NoSkeleton,
    #[error("no animation clips assigned")]
    NoClips,
    #[error("no mesh weights assigned")]
    NoMesh,
    #[error("another pose evaluation holds the lock")]
    PoseLockHeld,
}

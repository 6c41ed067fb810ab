//! Three-way merge engine: per-line content merge, per-file/per-symlink
//! merge, and the blob/symlink installation primitives that apply the
//! result to the working tree.
//!
//! This crate implements the single-file slice of merging: given a base,
//! local, and incoming version of one path, it produces merged bytes (with
//! conflict markers where the changes overlap) and writes them into place.
//! Whole-tree merge orchestration — walking a tree diff and calling into
//! this crate per path — lives with the checkout/update and commit
//! collaborators.

pub mod content;
pub mod file;

use bstr::BString;
use wt_diff::DiffAlgorithm;

pub use file::{install_blob, install_symlink, merge_file, merge_symlink, InstallOutcome, MergeFileOutcome};

/// Options controlling content merge behaviour.
#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// Diff algorithm for content merge.
    pub diff_algorithm: DiffAlgorithm,
    /// Strategy options (e.g. "ours", "theirs") forcing a side to win
    /// outright instead of merging.
    pub strategy_options: Vec<String>,
    /// Conflict marker style.
    pub conflict_style: ConflictStyle,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            diff_algorithm: DiffAlgorithm::Myers,
            strategy_options: Vec::new(),
            conflict_style: ConflictStyle::Merge,
        }
    }
}

/// Conflict marker style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictStyle {
    /// Default: show ours and theirs only.
    Merge,
    /// Include base content between `|||||||` markers.
    Diff3,
    /// Zealous diff3: reduce conflict size by pulling out common prefix/suffix.
    ZDiff3,
}

impl ConflictStyle {
    /// Parse a conflict style name (as used by a `merge.conflictStyle`-style setting).
    ///
    /// Accepted values: "merge", "diff3", "zdiff3".
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "merge" => Some(Self::Merge),
            "diff3" => Some(Self::Diff3),
            "zdiff3" => Some(Self::ZDiff3),
            _ => None,
        }
    }

    /// Return the canonical name for this style.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Merge => "merge",
            Self::Diff3 => "diff3",
            Self::ZDiff3 => "zdiff3",
        }
    }
}

/// Result of a three-way content merge.
#[derive(Debug, Clone)]
pub enum ContentMergeResult {
    /// Clean merge, no conflicts.
    Clean(Vec<u8>),
    /// Conflict with markers in the content.
    Conflict {
        /// Merged content including conflict markers.
        content: Vec<u8>,
        /// Number of conflict regions.
        conflict_count: usize,
    },
}

impl ContentMergeResult {
    /// Whether the merge was clean.
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Clean(_))
    }

    /// Get the merged content (with or without conflict markers).
    pub fn content(&self) -> &[u8] {
        match self {
            Self::Clean(data) => data,
            Self::Conflict { content, .. } => content,
        }
    }
}

/// Error types for merge operations.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// The install target exists and is neither a regular file nor
    /// something we're allowed to replace.
    #[error("obstructed: {0}")]
    Obstructed(std::path::PathBuf),

    #[error(transparent)]
    Util(#[from] wt_utils::UtilError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

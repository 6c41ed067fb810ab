//! Stage and unstage (C10): moves a path's content between the working tree
//! and the index's staged slot, optionally hunk by hunk, without touching
//! refs or the commit pipeline — [`wt_worktree::commit`] reads the result
//! back out through the same [`wt_index::StageCode`] this crate writes.

mod patch;
mod stage;
mod unstage;

pub use patch::PatchDecision;
pub use stage::stage;
pub use unstage::unstage;

//! [`Commitable`]: a transient record built while collecting the paths a
//! commit will touch, carried through blob creation and tree rewriting.

use bstr::BString;
use wt_hash::ObjectId;
use wt_object::FileMode;
use wt_status::StatusCode;

/// One path whose staged or unstaged state differs from the work tree's
/// base tree, discovered while collecting changes for a commit.
#[derive(Debug, Clone)]
pub struct Commitable {
    /// Path relative to the work tree root.
    pub relative_path: BString,
    /// Path relative to the repository root (work tree's path-prefix joined
    /// with `relative_path`).
    pub repo_path: BString,
    /// The status this path was collected under (add/modify/delete/mode-change).
    pub status: StatusCode,
    /// True when this commitable came from the index's staged state rather
    /// than a live comparison against the on-disk file.
    pub staged: bool,
    /// Mode the new tree entry should carry (ignored for `Delete`).
    pub mode: FileMode,
    /// Blob id to install in the new tree. Filled during blob creation for
    /// commitables that don't already have one (a staged add/modify already
    /// carries its blob id from the index).
    pub blob_id: Option<ObjectId>,
    /// The blob id this path matched in the work tree's base commit, used
    /// by the out-of-date check.
    pub base_blob_id: Option<ObjectId>,
}

impl Commitable {
    pub fn is_delete(&self) -> bool {
        matches!(self.status, StatusCode::Delete)
    }
}

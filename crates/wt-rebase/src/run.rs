//! The per-commit replay loop shared by linear rebase and histedit.
//!
//! Each step is journaled through `commit-ref`: a fresh attempt records the
//! source commit id before touching anything, so a crash or a conflict
//! leaves enough on disk for [`replay_one`] to resume without redoing the
//! merge (and clobbering whatever the user resolved by hand).

use std::path::Path;

use bstr::BString;
use wt_hash::ObjectId;
use wt_meta::{WorkTree, WorktreeError};
use wt_merge::MergeOptions;
use wt_odb::ObjectStore;
use wt_ref::FilesRefStore;
use wt_utils::date::{GitDate, Signature};
use wt_worktree::derived_refs;

use crate::histedit::{self, HisteditOp};
use crate::replay::apply_commit_diff;

/// What became of one script step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step landed a new commit on `tmp-branch`.
    Landed(ObjectId),
    /// The step replayed its diff but didn't land (a `fold`, or `drop`
    /// which replays nothing at all).
    Carried,
    /// The step elided itself: its diff touched nothing, so `commit-ref`
    /// was dropped and nothing was recorded.
    Elided,
}

/// Replays `source_commit_id`'s diff (against its first parent) onto the
/// current work tree and, if `land` is true, commits the result with the
/// source commit's author, `now()` as the committer time, and `message`
/// (defaulting to the source commit's own message).
///
/// On a fresh attempt (no existing `commit-ref`) the diff is merged in;
/// resuming an attempt that already wrote `commit-ref` for this exact
/// commit skips straight to landing, so a conflict the caller resolved by
/// hand isn't re-merged over.
pub fn replay_one<S: ObjectStore>(
    worktree: &mut WorkTree,
    odb: &S,
    refs: &FilesRefStore,
    index_path: &Path,
    source_commit_id: ObjectId,
    land: bool,
    message: Option<BString>,
    options: &MergeOptions,
) -> Result<StepOutcome, WorktreeError> {
    let uuid = worktree.uuid();
    let commit_ref_name = derived_refs::commit_ref(uuid);

    let fresh = match refs.resolve_to_oid(&commit_ref_name)? {
        Some(existing) if existing != source_commit_id => {
            return Err(WorktreeError::RebaseCommitId(source_commit_id.to_hex()));
        }
        Some(_) => false,
        None => {
            refs.write_ref(&commit_ref_name, &source_commit_id)?;
            true
        }
    };

    let source_commit = odb.open_as_commit(&source_commit_id)?;

    if fresh {
        apply_commit_diff(worktree, odb, index_path, &source_commit, options)?;
    }

    if !land {
        refs.delete_ref(&commit_ref_name)?;
        return Ok(StepOutcome::Carried);
    }

    let message = message.unwrap_or_else(|| source_commit.message.clone());
    let author = source_commit.author.clone();
    let committer = Signature {
        name: source_commit.committer.name.clone(),
        email: source_commit.committer.email.clone(),
        date: GitDate::now(),
    };

    let result = wt_worktree::commit(
        worktree,
        odb,
        refs,
        index_path,
        &[],
        author,
        committer,
        &mut |_| message.clone(),
    );

    match result {
        Ok(new_commit_id) => {
            refs.delete_ref(&commit_ref_name)?;
            Ok(StepOutcome::Landed(new_commit_id))
        }
        Err(WorktreeError::NoChanges) => {
            refs.delete_ref(&commit_ref_name)?;
            Ok(StepOutcome::Elided)
        }
        Err(e) => Err(e),
    }
}

/// Replays a linear run of source commits (oldest first) straight through,
/// stopping at the first conflict. `commit-ref` is left in place on a
/// conflict; call [`replay_one`] again with the same commit id (after the
/// caller resolves the conflict markers) to resume.
pub fn run_linear<S: ObjectStore>(
    worktree: &mut WorkTree,
    odb: &S,
    refs: &FilesRefStore,
    index_path: &Path,
    commits: &[ObjectId],
    options: &MergeOptions,
) -> Result<(), WorktreeError> {
    for &id in commits {
        replay_one(worktree, odb, refs, index_path, id, true, None, options)?;
    }
    Ok(())
}

/// Where a histedit run stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HisteditPause {
    /// The whole script ran to completion.
    Done,
    /// An `edit` line landed its commit and the run paused there for the
    /// caller to amend it. Call [`run_histedit`] again to resume with
    /// whatever's on disk.
    EditStop(ObjectId),
}

/// Rewrites the message of the commit currently sitting on `tmp-branch`'s
/// tip, keeping its tree, parents, author and committer untouched.
///
/// `mesg` always follows the landing step it names (`validate` enforces
/// this), so by the time this runs, `tmp-branch` already points at the
/// commit to reword — reading it back from the ref rather than threading it
/// through in memory means a crash between the landing step and the `mesg`
/// step still resumes correctly.
fn reword_landed_commit<S: ObjectStore>(
    worktree: &mut WorkTree,
    odb: &S,
    refs: &FilesRefStore,
    message: BString,
) -> Result<(), WorktreeError> {
    let uuid = worktree.uuid();
    let tmp_branch = derived_refs::tmp_branch(uuid);
    let current = refs
        .resolve_to_oid(&tmp_branch)?
        .filter(|id| !id.is_null())
        .ok_or_else(|| WorktreeError::HistEditCommitId("mesg with no preceding landed commit".into()))?;

    let commit = odb.open_as_commit(&current)?;
    let reworded = odb.commit_create(
        commit.tree,
        commit.parents.clone(),
        commit.author.clone(),
        commit.committer.clone(),
        message,
    )?;

    let mut tx = wt_ref::RefTransaction::new();
    tx.update(tmp_branch, current, reworded, "histedit reword");
    refs.commit_transaction(tx).map_err(|e| match e {
        wt_ref::RefError::CasFailed { .. } => WorktreeError::HeadChanged,
        other => other.into(),
    })?;

    worktree.set_base_commit(reworded)?;
    let _ = refs.write_ref(&derived_refs::base_commit_ref(uuid), &reworded);

    Ok(())
}

/// Drives the work tree's in-progress histedit script one line at a time,
/// persisting the shrinking remainder back to the control file after each
/// step so the run can resume exactly where it left off.
///
/// A conflict propagates as an error without consuming the head-of-script
/// op: the next call to `run_histedit` re-reads the same op and retries it,
/// which [`replay_one`] recognizes as a resume rather than a fresh attempt.
pub fn run_histedit<S: ObjectStore>(
    worktree: &mut WorkTree,
    odb: &S,
    refs: &FilesRefStore,
    index_path: &Path,
    options: &MergeOptions,
) -> Result<HisteditPause, WorktreeError> {
    let mut script = histedit::read_script(worktree)?;

    while let Some(op) = script.ops.first().cloned() {
        match op {
            HisteditOp::Drop(_) => {
                script.ops.remove(0);
                histedit::write_script(worktree, &script)?;
            }
            HisteditOp::Mesg(text) => {
                reword_landed_commit(worktree, odb, refs, text)?;
                script.ops.remove(0);
                histedit::write_script(worktree, &script)?;
            }
            HisteditOp::Fold(id) => {
                replay_one(worktree, odb, refs, index_path, id, false, None, options)?;
                script.ops.remove(0);
                histedit::write_script(worktree, &script)?;
            }
            HisteditOp::Pick(id) => {
                replay_one(worktree, odb, refs, index_path, id, true, None, options)?;
                script.ops.remove(0);
                histedit::write_script(worktree, &script)?;
            }
            HisteditOp::Edit(id) => {
                replay_one(worktree, odb, refs, index_path, id, true, None, options)?;
                script.ops.remove(0);
                histedit::write_script(worktree, &script)?;
                return Ok(HisteditPause::EditStop(id));
            }
        }
    }

    histedit::clear_script(worktree)?;
    Ok(HisteditPause::Done)
}

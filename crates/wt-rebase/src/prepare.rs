//! Prepare/complete/abort: the setup and teardown around a rebase or
//! histedit run. These three functions own the derived refs and the work
//! tree's head pointer; the per-commit loop in [`crate::run`] only ever
//! touches `tmp-branch` through [`wt_worktree::commit`].

use std::path::Path;

use wt_hash::ObjectId;
use wt_index::{Index, StageCode};
use wt_merge::MergeOptions;
use wt_meta::{HeadRef, LockMode, WorkTree, WorktreeError};
use wt_odb::ObjectStore;
use wt_ref::{FilesRefStore, RefStore};
use wt_status::{classify, StatusCode, StatusError};
use wt_worktree::derived_refs;

use crate::histedit::HisteditScript;

fn lossy(path: &bstr::BStr) -> String {
    String::from_utf8_lossy(path.as_bytes()).into_owned()
}

fn map_status_err(e: StatusError) -> WorktreeError {
    match e {
        StatusError::Cancelled => WorktreeError::Cancelled,
        StatusError::Odb(e) => e.into(),
        StatusError::Io(e) => e.into(),
    }
}

fn path_to_os(path: &bstr::BStr) -> std::path::PathBuf {
    use std::os::unix::ffi::OsStrExt;
    std::path::PathBuf::from(std::ffi::OsStr::from_bytes(path.as_bytes()))
}

/// Rejects a dirty work tree: any staged entry, any entry whose on-disk
/// state differs from the index, any conflict, or any index entry whose
/// commit id doesn't match the work tree's own base commit.
fn ensure_clean<S: ObjectStore>(worktree: &WorkTree, odb: &S, index: &Index) -> Result<(), WorktreeError> {
    let base_commit = worktree.base_commit();

    for entry in index.iter() {
        if entry.stage != StageCode::None {
            return Err(WorktreeError::FileStaged(lossy(entry.path.as_bstr())));
        }
        if let Some(commit_id) = entry.commit_id {
            if commit_id != base_commit {
                return Err(WorktreeError::MixedCommits);
            }
        }

        let ondisk_path = worktree.root().join(path_to_os(entry.path.as_bstr()));
        let (status, _) = classify(odb, Some(entry), &ondisk_path).map_err(map_status_err)?;
        match status {
            StatusCode::NoChange => {}
            StatusCode::Conflict => return Err(WorktreeError::Conflicts(lossy(entry.path.as_bstr()))),
            _ => return Err(WorktreeError::Modified(lossy(entry.path.as_bstr()))),
        }
    }

    Ok(())
}

/// Sets up the derived refs for a rebase or histedit run and moves the work
/// tree's head onto `tmp-branch`, then checks `onto`'s tree out so the
/// per-commit merges have a known starting point to diff against.
///
/// The work tree must be on a branch (not detached) and completely clean.
/// Returns the original branch name so the caller doesn't need to re-derive
/// it from the now-repointed head.
pub fn prepare<S: ObjectStore>(
    worktree: &mut WorkTree,
    odb: &S,
    refs: &FilesRefStore,
    index_path: &Path,
    onto: ObjectId,
    options: &MergeOptions,
) -> Result<wt_ref::RefName, WorktreeError> {
    // `checkout_files` takes its own exclusive hold below, so the setup
    // portion here must release this one first: the advisory lock is
    // per-open-file-description, not reentrant within a process.
    let branch = {
        let _lock = worktree.lock(LockMode::Exclusive)?;

        let index = Index::read_from(index_path)?;
        ensure_clean(worktree, odb, &index)?;

        let HeadRef::Branch(branch) = worktree.head_ref().clone() else {
            return Err(WorktreeError::NotAWorktree(worktree.root().to_path_buf()));
        };

        let uuid = worktree.uuid();
        refs.write_symbolic_ref(&derived_refs::newbase_symref(uuid), &branch)?;
        refs.write_symbolic_ref(&derived_refs::branch_symref(uuid), &branch)?;
        refs.write_ref(&derived_refs::tmp_branch(uuid), &onto)?;
        refs.write_ref(&derived_refs::base_commit_ref(uuid), &onto)?;

        worktree.set_head_ref(HeadRef::Branch(derived_refs::tmp_branch(uuid)))?;
        worktree.set_base_commit(onto)?;
        branch
    };

    // The work tree was just verified clean, so forced vs. merging checkout
    // makes no observable difference here; force keeps this call cheap and
    // consistent with `abort`'s own use of the same pipeline.
    wt_worktree::checkout_files(
        worktree,
        odb,
        refs,
        index_path,
        &[],
        &mut || false,
        &mut |_, _| {},
        true,
        options,
    )?;

    Ok(branch)
}

/// Validates `script` against `source_history`, then runs the shared
/// [`prepare`] setup and writes the script to the work tree's control file
/// so [`crate::run::run_histedit`] has something to drive.
#[allow(clippy::too_many_arguments)]
pub fn prepare_histedit<S: ObjectStore>(
    worktree: &mut WorkTree,
    odb: &S,
    refs: &FilesRefStore,
    index_path: &Path,
    onto: ObjectId,
    script: &HisteditScript,
    source_history: &[ObjectId],
    options: &MergeOptions,
) -> Result<wt_ref::RefName, WorktreeError> {
    script.validate(source_history)?;
    let branch = prepare(worktree, odb, refs, index_path, onto, options)?;
    crate::histedit::write_script(worktree, script)?;
    Ok(branch)
}

/// Resolves `tmp-branch`, points the original branch there, restores the
/// work tree's head, and removes every derived ref this run created.
pub fn complete(worktree: &mut WorkTree, refs: &FilesRefStore, branch: wt_ref::RefName) -> Result<ObjectId, WorktreeError> {
    let mut lock = worktree.lock(LockMode::Exclusive)?;
    let uuid = worktree.uuid();

    let tmp_branch = derived_refs::tmp_branch(uuid);
    let final_commit = refs
        .resolve_to_oid(&tmp_branch)?
        .ok_or_else(|| WorktreeError::NotAWorktree(worktree.root().to_path_buf()))?;

    let old = refs.resolve_to_oid(&branch)?.unwrap_or_else(|| worktree.hash_algo().null_oid());
    let mut tx = wt_ref::RefTransaction::new();
    tx.update(branch.clone(), old, final_commit, "rebase finish");
    refs.commit_transaction(tx)?;

    worktree.set_head_ref(HeadRef::Branch(branch))?;
    worktree.set_base_commit(final_commit)?;

    cleanup_derived_refs(refs, uuid)?;
    crate::histedit::clear_script(worktree)?;
    lock.downgrade()?;

    Ok(final_commit)
}

/// Reads `newbase-symref` to recover the original head, resets the work
/// tree back to it, reverts every locally modified path, re-checks out the
/// original base's full tree, and removes the derived refs.
pub fn abort<S: ObjectStore>(
    worktree: &mut WorkTree,
    odb: &S,
    refs: &FilesRefStore,
    index_path: &Path,
    options: &MergeOptions,
) -> Result<(), WorktreeError> {
    {
        let _lock = worktree.lock(LockMode::Exclusive)?;
        let uuid = worktree.uuid();

        let newbase = refs.resolve(&derived_refs::newbase_symref(uuid))?;
        let branch = newbase
            .and_then(|r| r.symbolic_target().cloned())
            .ok_or_else(|| WorktreeError::NotAWorktree(worktree.root().to_path_buf()))?;

        let original_commit =
            refs.resolve_to_oid(&branch)?.unwrap_or_else(|| worktree.hash_algo().null_oid());

        worktree.set_head_ref(HeadRef::Branch(branch))?;
        worktree.set_base_commit(original_commit)?;
    }

    // Abort discards the run unconditionally, so the re-checkout must force
    // every path back to the original tree rather than three-way merging
    // local edits made mid-rebase into it.
    wt_worktree::checkout_files(
        worktree,
        odb,
        refs,
        index_path,
        &[],
        &mut || false,
        &mut |_, _| {},
        true,
        options,
    )?;

    cleanup_derived_refs(refs, worktree.uuid())?;
    crate::histedit::clear_script(worktree)?;

    Ok(())
}

fn cleanup_derived_refs(refs: &FilesRefStore, uuid: uuid::Uuid) -> Result<(), WorktreeError> {
    for name in [
        derived_refs::newbase_symref(uuid),
        derived_refs::branch_symref(uuid),
        derived_refs::tmp_branch(uuid),
        derived_refs::base_commit_ref(uuid),
        derived_refs::commit_ref(uuid),
    ] {
        let _ = refs.delete_ref(&name);
    }
    Ok(())
}

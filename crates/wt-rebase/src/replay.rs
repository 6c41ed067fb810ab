//! Replays one source commit's change set onto the current on-disk state.
//!
//! This is the merge step of the per-commit pipeline: diff a commit against
//! its first parent, then merge each touched path's content into the work
//! tree, leaving conflict markers where the local and incoming sides
//! disagree. Landing the result as a new commit is [`wt_worktree::commit`]'s
//! job, reused as-is by the driver in [`crate::run`].

use std::path::Path;

use bstr::{BStr, ByteSlice};
use wt_index::{FileEntry, Index};
use wt_meta::{WorkTree, WorktreeError};
use wt_merge::MergeOptions;
use wt_object::{Commit, TreeEntry};
use wt_odb::ObjectStore;

use crate::treediff;

fn path_to_os(path: &BStr) -> std::path::PathBuf {
    use std::os::unix::ffi::OsStrExt;
    std::path::PathBuf::from(std::ffi::OsStr::from_bytes(path.as_bytes()))
}

fn read_ondisk_or_empty(path: &Path) -> Result<Vec<u8>, WorktreeError> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => {
            use std::os::unix::ffi::OsStrExt;
            Ok(std::fs::read_link(path)?.as_os_str().as_bytes().to_vec())
        }
        Ok(_) => Ok(std::fs::read(path)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Writes conflict markers for a path the incoming commit deleted but the
/// local work tree has modified, mirroring `wt_merge::merge_symlink`'s
/// synthetic-conflict idiom since there's no "merge to nothing" primitive.
fn write_delete_conflict(path: &Path, local: &[u8]) -> Result<(), WorktreeError> {
    let mut content = Vec::new();
    content.extend_from_slice(b"<<<<<<< incoming (deleted)\n=======\n");
    content.extend_from_slice(local);
    if !local.ends_with(b"\n") {
        content.push(b'\n');
    }
    content.extend_from_slice(b">>>>>>> local\n");
    std::fs::write(path, content)?;
    Ok(())
}

pub(crate) fn strip_prefix_to_relative(worktree: &WorkTree, repo_path: &BStr) -> Option<bstr::BString> {
    let prefix = worktree.path_prefix();
    let trimmed = prefix.strip_prefix(b"/").unwrap_or(prefix);
    if trimmed.is_empty() {
        return Some(repo_path.to_owned());
    }
    let mut with_slash = bstr::BString::from(trimmed);
    with_slash.push(b'/');
    repo_path.strip_prefix(with_slash.as_slice()).map(bstr::BString::from)
}

fn replay_path<S: ObjectStore>(
    worktree: &WorkTree,
    odb: &S,
    index: &mut Index,
    relative: &BStr,
    old_entry: Option<&TreeEntry>,
    new_entry: Option<&TreeEntry>,
    options: &MergeOptions,
) -> Result<(), WorktreeError> {
    let ondisk_path = worktree.root().join(path_to_os(relative));

    match new_entry {
        Some(entry) => {
            if !index.contains(relative) {
                index.add(FileEntry::new(relative.to_owned()));
            }

            let derived_bytes = odb.open_as_blob(&entry.oid)?.data;
            let base_bytes = match old_entry {
                Some(old) => Some(odb.open_as_blob(&old.oid)?.data),
                None => None,
            };
            let ondisk_bytes = read_ondisk_or_empty(&ondisk_path)?;

            if entry.mode.is_symlink() {
                wt_merge::merge_symlink(
                    base_bytes.as_deref(),
                    &ondisk_bytes,
                    Some(&derived_bytes),
                    &ondisk_path,
                    "ancestor",
                    "incoming",
                )?;
            } else {
                wt_merge::merge_file(
                    base_bytes.as_deref(),
                    &ondisk_bytes,
                    &derived_bytes,
                    entry.mode,
                    &ondisk_path,
                    "ancestor",
                    "incoming",
                    options,
                )?;
            }
        }
        None => {
            let base_bytes = match old_entry {
                Some(old) => odb.open_as_blob(&old.oid)?.data,
                None => Vec::new(),
            };
            let ondisk_bytes = read_ondisk_or_empty(&ondisk_path)?;

            if ondisk_bytes == base_bytes {
                match std::fs::remove_file(&ondisk_path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
                index.mark_deleted_from_disk(relative);
            } else {
                write_delete_conflict(&ondisk_path, &ondisk_bytes)?;
            }
        }
    }

    Ok(())
}

/// Applies `source_commit`'s change set (relative to its first parent) onto
/// the work tree and the index, writing conflict markers for any path whose
/// local content diverges from both sides. Landing it as a commit is left
/// to the caller, which lets conflicted paths sit exactly as a normal merge
/// conflict would.
pub(crate) fn apply_commit_diff<S: ObjectStore>(
    worktree: &WorkTree,
    odb: &S,
    index_path: &Path,
    source_commit: &Commit,
    options: &MergeOptions,
) -> Result<(), WorktreeError> {
    let parent_tree = match source_commit.parents.first() {
        Some(parent_id) => Some(odb.open_as_commit(parent_id)?.tree),
        None => None,
    };

    let mut diffs = Vec::new();
    treediff::diff_trees(odb, parent_tree, Some(source_commit.tree), BStr::new(b""), &mut diffs)?;

    let mut index = Index::read_from(index_path)?;
    for (repo_path, old_entry, new_entry) in &diffs {
        let Some(relative) = strip_prefix_to_relative(worktree, repo_path.as_bstr()) else {
            continue;
        };
        replay_path(
            worktree,
            odb,
            &mut index,
            relative.as_bstr(),
            old_entry.as_ref(),
            new_entry.as_ref(),
            options,
        )?;
    }
    index.write_to(index_path)?;

    Ok(())
}

//! Unstage: reverses a stage, optionally hunk by hunk, reconciling the
//! reverted content back into the working file via a three-way merge.

use std::path::Path;

use bstr::{BStr, BString, ByteSlice};

use wt_diff::Hunk;
use wt_index::{FileType, Index, StageCode, StatFingerprint};
use wt_meta::{LockMode, WorkTree, WorktreeError};
use wt_object::FileMode;
use wt_odb::ObjectStore;

use crate::patch::{apply_selected_hunks, diff_hunks, supports_hunks, PatchDecision};

fn lossy(path: &BStr) -> String {
    String::from_utf8_lossy(path.as_bytes()).into_owned()
}

fn path_to_os(path: &BStr) -> std::path::PathBuf {
    use std::os::unix::ffi::OsStrExt;
    std::path::PathBuf::from(std::ffi::OsStr::from_bytes(path.as_bytes()))
}

fn mode_for(file_type: FileType, executable: bool) -> FileMode {
    match file_type {
        FileType::Symlink | FileType::BadSymlink => FileMode::Symlink,
        FileType::Regular if executable => FileMode::Executable,
        FileType::Regular => FileMode::Regular,
    }
}

/// The two buffers a hunk-level unstage reconstructs from the diff between
/// the base blob and the current staged blob.
struct Split {
    /// Moved back to the working file: the hunks the caller chose to
    /// unstage, applied on top of `base`.
    unstaged: Vec<u8>,
    /// What remains staged: the hunks the caller chose to keep, applied on
    /// top of `base`.
    retained: Vec<u8>,
}

fn split_content(
    base: &[u8],
    staged: &[u8],
    is_symlink: bool,
    path: &BStr,
    patch: &mut Option<&mut dyn FnMut(&BStr, &Hunk) -> PatchDecision>,
) -> Result<Split, WorktreeError> {
    match patch {
        Some(callback) if supports_hunks(staged, is_symlink) => {
            let hunks = diff_hunks(base, staged);
            let mut decisions: Vec<bool> = Vec::with_capacity(hunks.len());
            for hunk in &hunks {
                match callback(path, hunk) {
                    PatchDecision::Yes => decisions.push(true),
                    PatchDecision::No => decisions.push(false),
                    PatchDecision::Quit => return Err(WorktreeError::PatchChoice),
                }
            }
            let unstaged = apply_selected_hunks(base, &hunks, |i, _| Some(decisions[i]))
                .expect("decisions already resolved, no Quit can occur here");
            let retained = apply_selected_hunks(base, &hunks, |i, _| Some(!decisions[i]))
                .expect("decisions already resolved, no Quit can occur here");
            Ok(Split { unstaged, retained })
        }
        _ => Ok(Split {
            unstaged: staged.to_vec(),
            retained: base.to_vec(),
        }),
    }
}

/// Unstage a set of paths.
///
/// Each path must be tracked and currently staged, or the call fails with
/// `not-staged`. A staged delete simply clears the stage (there's no staged
/// content and nothing to reconcile on disk). Otherwise `patch` (if
/// supplied and the content isn't binary or a symlink target) is walked
/// hunk by hunk; accepted hunks move back into the working file via a
/// three-way merge against the base blob, and the rest stay staged. At
/// least one path must end up actually changed, or the call fails with
/// `no-change`.
pub fn unstage<S: ObjectStore>(
    worktree: &WorkTree,
    odb: &S,
    index_path: &Path,
    paths: &[BString],
    mut patch: Option<&mut dyn FnMut(&BStr, &Hunk) -> PatchDecision>,
    merge_options: &wt_merge::MergeOptions,
) -> Result<(), WorktreeError> {
    let _lock = worktree.lock(LockMode::Exclusive)?;
    let mut index = Index::read_from(index_path)?;

    let mut changed = false;

    for path in paths {
        let Some(entry) = index.get(path.as_bstr()).cloned() else {
            return Err(WorktreeError::NotStaged(lossy(path.as_bstr())));
        };
        if entry.stage == StageCode::None {
            return Err(WorktreeError::NotStaged(lossy(path.as_bstr())));
        }

        if entry.stage == StageCode::Delete {
            index.set_stage(path.as_bstr(), None, StageCode::None);
            changed = true;
            continue;
        }

        let staged_blob_id = entry
            .staged_blob_id
            .ok_or_else(|| WorktreeError::NotStaged(lossy(path.as_bstr())))?;
        let staged_bytes = odb.open_as_blob(&staged_blob_id)?.data;
        let base_bytes = match entry.blob_id {
            Some(id) => odb.open_as_blob(&id)?.data,
            None => Vec::new(),
        };

        let is_symlink = entry.file_type == FileType::Symlink;
        let split = split_content(&base_bytes, &staged_bytes, is_symlink, path.as_bstr(), &mut patch)?;

        let ondisk_path = worktree.root().join(path_to_os(path.as_bstr()));
        let mode = mode_for(entry.file_type, entry.stat.executable);

        if is_symlink {
            let local_target = std::fs::read_link(&ondisk_path)
                .map(|p| {
                    use std::os::unix::ffi::OsStrExt;
                    p.as_os_str().as_bytes().to_vec()
                })
                .unwrap_or_default();
            let base_opt = entry.blob_id.map(|_| base_bytes.as_slice());
            wt_merge::merge_symlink(base_opt, &local_target, Some(&split.unstaged), &ondisk_path, "base", "unstaged")?;
        } else {
            let ondisk_bytes = std::fs::read(&ondisk_path)?;
            let base_opt = entry.blob_id.map(|_| base_bytes.as_slice());
            wt_merge::merge_file(
                base_opt,
                &ondisk_bytes,
                &split.unstaged,
                mode,
                &ondisk_path,
                "base",
                "unstaged",
                merge_options,
            )?;
        }

        let fresh_stat = StatFingerprint::from_metadata(&std::fs::symlink_metadata(&ondisk_path)?);

        if split.retained == base_bytes {
            index.set_stage(path.as_bstr(), None, StageCode::None);
        } else {
            let new_staged_id = odb.blob_create_from_bytes(&split.retained)?;
            let stage_code = entry.stage;
            index.set_stage(path.as_bstr(), Some(new_staged_id), stage_code);
        }
        if let Some(e) = index.get_mut(path.as_bstr()) {
            e.stat = fresh_stat;
        }

        changed = true;
    }

    if !changed {
        return Err(WorktreeError::NoChanges);
    }

    index.write_to(index_path)?;
    Ok(())
}

//! The status engine (C4): classify one path into a [`StatusCode`] by
//! comparing its on-disk state against an (optional) index entry and,
//! when a stat-fingerprint match isn't enough to decide, the object it
//! last matched in the repository.

use std::fs;
use std::path::Path;

use wt_index::{FileEntry, FileType, StageCode, StatFingerprint};
use wt_odb::ObjectStore;

use crate::error::StatusError;

/// The full status vocabulary shared by the status engine, the tree diff
/// driver, and the checkout/commit pipelines that consume their output.
///
/// Not every variant is produced by [`classify`] — `merge`, `base-ref-err`,
/// `bump-base`, `cannot-delete`, `cannot-update`, `merge-conflict`, and
/// `revert` are assigned by the checkout and commit pipelines (C7/C8) to
/// describe the outcome of applying a change, not the state of a path at
/// rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    NoChange,
    Modify,
    Add,
    Delete,
    Conflict,
    Missing,
    Unversioned,
    Obstructed,
    NonExistent,
    ModeChange,
    Merge,
    BaseRefErr,
    BumpBase,
    CannotDelete,
    CannotUpdate,
    MergeConflict,
    Revert,
}

/// Three-line conflict markers the status engine looks for when deciding
/// between `modify` and `conflict`.
const CONFLICT_MARKERS: [&[u8]; 3] = [b"<<<<<<< ", b"=======", b">>>>>>> "];

fn has_conflict_markers(content: &[u8]) -> bool {
    content
        .split(|&b| b == b'\n')
        .any(|line| CONFLICT_MARKERS.iter().any(|m| line.starts_with(m)))
}

/// Classify `ondisk_path` given the (optional) index entry that tracks it.
///
/// Returns the status code plus the freshly observed stat fingerprint,
/// which the caller should feed back into [`wt_index::Index::update`] on a
/// clean match so subsequent calls are O(stat) rather than O(content).
pub fn classify<S: ObjectStore>(
    odb: &S,
    entry: Option<&FileEntry>,
    ondisk_path: &Path,
) -> Result<(StatusCode, Option<StatFingerprint>), StatusError> {
    let meta = match fs::symlink_metadata(ondisk_path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let claims_a_file = entry.is_some_and(|e| e.blob_id.is_some() || e.staged_blob_id.is_some());
            let code = if claims_a_file { StatusCode::Missing } else { StatusCode::Delete };
            return Ok((code, None));
        }
        Err(e) => return Err(e.into()),
    };

    let file_type = meta.file_type();
    if !file_type.is_file() && !file_type.is_symlink() {
        return Ok((StatusCode::Obstructed, None));
    }

    let Some(entry) = entry else {
        return Ok((StatusCode::Unversioned, None));
    };

    if entry.deleted_from_disk {
        return Ok((StatusCode::Delete, None));
    }

    if entry.blob_id.is_none() && entry.staged_blob_id.is_none() {
        return Ok((StatusCode::Add, None));
    }

    let current_stat = StatFingerprint::from_metadata(&meta);
    if entry.stat.matches(&current_stat) {
        return Ok((StatusCode::NoChange, Some(current_stat)));
    }

    let ondisk_is_symlink = file_type.is_symlink();
    let entry_is_symlink = entry.file_type == FileType::Symlink;
    if ondisk_is_symlink != entry_is_symlink {
        return Ok((StatusCode::Modify, Some(current_stat)));
    }

    let ondisk_bytes = read_ondisk_content(ondisk_path, ondisk_is_symlink)?;

    let compare_against = match entry.stage {
        StageCode::None => entry.blob_id,
        _ => entry.staged_blob_id.or(entry.blob_id),
    };

    let blob_bytes = match compare_against {
        Some(id) => odb.open_as_blob(&id)?.data,
        None => return Ok((StatusCode::Add, Some(current_stat))),
    };

    if ondisk_bytes == blob_bytes {
        let mode_changed = current_stat.executable != entry.stat.executable;
        let code = if mode_changed { StatusCode::ModeChange } else { StatusCode::NoChange };
        return Ok((code, Some(current_stat)));
    }

    if !ondisk_is_symlink && has_conflict_markers(&ondisk_bytes) {
        return Ok((StatusCode::Conflict, Some(current_stat)));
    }

    Ok((StatusCode::Modify, Some(current_stat)))
}

fn read_ondisk_content(path: &Path, is_symlink: bool) -> Result<Vec<u8>, StatusError> {
    if is_symlink {
        use std::os::unix::ffi::OsStrExt;
        Ok(fs::read_link(path)?.as_os_str().as_bytes().to_vec())
    } else {
        Ok(fs::read(path)?)
    }
}

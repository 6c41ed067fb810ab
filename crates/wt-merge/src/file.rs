//! Per-file merge and installation primitives.
//!
//! `merge_file`/`merge_symlink` perform the three-way merge for a single
//! working-tree entry; `install_blob`/`install_symlink` write the result (or
//! any freshly-created content) into the working tree without clobbering
//! anything that isn't a plain file or a plain symlink.

use std::fs;
use std::io;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::Path;

use wt_object::FileMode;
use wt_utils::tempfile::TempFile;

use crate::content::{merge_content, MergeLabels};
use crate::{MergeError, MergeOptions};

/// Outcome of installing content into the working tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Content was written as requested.
    Installed,
    /// The target wasn't a safe symlink destination; written as a regular
    /// file instead and the caller should mark the entry bad-symlink.
    BadSymlink,
}

/// Result of a three-way file merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeFileOutcome {
    /// True when the merge produced conflict markers.
    pub conflicted: bool,
    /// True when the merge was clean and the result is byte-identical to
    /// the derived (incoming) side, meaning the local change was entirely
    /// subsumed by it.
    pub subsumed: bool,
}

fn mode_bits(mode: FileMode) -> u32 {
    match mode {
        FileMode::Executable => 0o755,
        _ => 0o644,
    }
}

/// Atomically write `content` to `path`, chmod'd to `mode`, fsynced before
/// the rename lands it in place.
fn install_atomically(path: &Path, content: &[u8], mode: FileMode) -> Result<(), MergeError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut temp = TempFile::new_for(path)?;
    {
        let file = temp
            .file_mut()
            .expect("freshly created TempFile always has a handle");
        io::Write::write_all(file, content)?;
        file.sync_all()?;
        file.set_permissions(fs::Permissions::from_mode(mode_bits(mode)))?;
    }
    temp.persist(path)?;
    Ok(())
}

/// Perform the three-way merge of a regular file's content and write the
/// result over the on-disk path.
///
/// `base` is the common ancestor's content (`None` means both sides added
/// the same path, so an empty ancestor is used). `ondisk` is the current
/// working-tree content ("local"/"ours"); `derived` is the incoming side.
pub fn merge_file(
    base: Option<&[u8]>,
    ondisk: &[u8],
    derived: &[u8],
    mode: FileMode,
    target_path: &Path,
    label_base: &str,
    label_deriv: &str,
    options: &MergeOptions,
) -> Result<MergeFileOutcome, MergeError> {
    let base_content = base.unwrap_or(&[]);
    let labels = MergeLabels {
        base: label_base,
        ours: "local",
        theirs: label_deriv,
    };

    let result = merge_content(base_content, ondisk, derived, options, &labels);
    let conflicted = !result.is_clean();
    let subsumed = !conflicted && result.content() == derived;

    install_atomically(target_path, result.content(), mode)?;

    Ok(MergeFileOutcome {
        conflicted,
        subsumed,
    })
}

/// Perform the three-way merge of a symlink's target string.
///
/// Unlike `merge_file`, this never runs a line-level diff: symlink targets
/// merge as whole strings. A `None` derived target means the link was
/// deleted on the incoming side.
pub fn merge_symlink(
    base_target: Option<&[u8]>,
    local_target: &[u8],
    derived_target: Option<&[u8]>,
    target_path: &Path,
    label_base: &str,
    label_deriv: &str,
) -> Result<MergeFileOutcome, MergeError> {
    if derived_target == Some(local_target) {
        // Both sides agree (or the incoming side made no change); the
        // on-disk symlink is already correct.
        return Ok(MergeFileOutcome {
            conflicted: false,
            subsumed: derived_target.is_some(),
        });
    }

    let mut content = Vec::new();
    content.extend_from_slice(b"<<<<<<< ");
    content.extend_from_slice(label_deriv.as_bytes());
    content.push(b'\n');
    match derived_target {
        Some(t) => {
            content.extend_from_slice(t);
            content.push(b'\n');
        }
        None => content.extend_from_slice(b"(symlink was deleted)\n"),
    }
    if let Some(base) = base_target {
        content.extend_from_slice(label_base.as_bytes());
        content.push(b'\n');
        content.extend_from_slice(base);
        content.push(b'\n');
    }
    content.extend_from_slice(b"=======\n");
    content.extend_from_slice(local_target);
    content.push(b'\n');
    content.extend_from_slice(b">>>>>>>\n");

    install_atomically(target_path, &content, FileMode::Regular)?;

    Ok(MergeFileOutcome {
        conflicted: true,
        subsumed: false,
    })
}

/// Install a blob's content at `path`, never following an existing symlink
/// and never overwriting a non-regular obstruction.
///
/// Tries an exclusive, non-following create first; on `EEXIST` (the common
/// case when replacing a tracked file) falls back to a sibling temp file
/// plus rename.
pub fn install_blob(path: &Path, content: &[u8], mode: FileMode) -> Result<(), MergeError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let opened = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .custom_flags(libc::O_NOFOLLOW)
        .open(path);

    match opened {
        Ok(mut file) => {
            io::Write::write_all(&mut file, content)?;
            file.set_permissions(fs::Permissions::from_mode(mode_bits(mode)))?;
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            let meta = fs::symlink_metadata(path)?;
            if !meta.is_file() {
                return Err(MergeError::Obstructed(path.to_path_buf()));
            }
            install_atomically(path, content, mode)
        }
        Err(e) => Err(e.into()),
    }
}

/// Install a symlink at `path`, validating the target with the caller's
/// safety predicate first.
///
/// An unsafe or too-long target is written as a regular file instead and
/// `InstallOutcome::BadSymlink` is returned so the caller can mark the
/// index entry accordingly. A missing parent directory is created once and
/// the `symlink` call retried.
pub fn install_symlink(
    path: &Path,
    target: &[u8],
    is_bad_target: impl Fn(&[u8]) -> bool,
) -> Result<InstallOutcome, MergeError> {
    if is_bad_target(target) {
        install_atomically(path, target, FileMode::Regular)?;
        return Ok(InstallOutcome::BadSymlink);
    }

    use std::os::unix::ffi::OsStrExt;
    let target_path = Path::new(std::ffi::OsStr::from_bytes(target));
    match std::os::unix::fs::symlink(target_path, path) {
        Ok(()) => Ok(InstallOutcome::Installed),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            std::os::unix::fs::symlink(target_path, path)?;
            Ok(InstallOutcome::Installed)
        }
        Err(e) => Err(e.into()),
    }
}

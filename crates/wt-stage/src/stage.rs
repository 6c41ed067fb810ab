//! Stage: moves a path's working-tree content into the index's staged slot.

use std::path::Path;

use bstr::{BStr, BString, ByteSlice};

use wt_diff::Hunk;
use wt_hash::ObjectId;
use wt_index::{FileEntry, FileType, Index, StageCode, StatFingerprint};
use wt_meta::{LockMode, WorkTree, WorktreeError};
use wt_odb::ObjectStore;
use wt_status::{classify, StatusCode, StatusError};

use crate::patch::{apply_selected_hunks, diff_hunks, supports_hunks, PatchDecision};

fn lossy(path: &BStr) -> String {
    String::from_utf8_lossy(path.as_bytes()).into_owned()
}

fn path_to_os(path: &BStr) -> std::path::PathBuf {
    use std::os::unix::ffi::OsStrExt;
    std::path::PathBuf::from(std::ffi::OsStr::from_bytes(path.as_bytes()))
}

fn map_status_err(e: StatusError) -> WorktreeError {
    match e {
        StatusError::Cancelled => WorktreeError::Cancelled,
        StatusError::Odb(e) => e.into(),
        StatusError::Io(e) => e.into(),
    }
}

/// Read a path's current content and stat fingerprint, following the same
/// symlink-vs-regular split the status engine uses.
fn read_ondisk(path: &Path) -> Result<(Vec<u8>, bool, StatFingerprint), WorktreeError> {
    let meta = std::fs::symlink_metadata(path)?;
    let is_symlink = meta.file_type().is_symlink();
    let content = if is_symlink {
        use std::os::unix::ffi::OsStrExt;
        std::fs::read_link(path)?.as_os_str().as_bytes().to_vec()
    } else {
        std::fs::read(path)?
    };
    Ok((content, is_symlink, StatFingerprint::from_metadata(&meta)))
}

/// Build the new staged blob for a single path, routing through the patch
/// callback when one is supplied and the content supports hunking.
///
/// Returns `None` when the reconstructed content is byte-identical to
/// `base` — nothing to stage for this path (either every hunk was rejected,
/// or the caller asked to re-stage something already staged).
fn build_staged_content(
    base: &[u8],
    ondisk: &[u8],
    is_symlink: bool,
    path: &BStr,
    patch: &mut Option<&mut dyn FnMut(&BStr, &Hunk) -> PatchDecision>,
) -> Result<Option<Vec<u8>>, WorktreeError> {
    let content = match patch {
        Some(callback) if supports_hunks(ondisk, is_symlink) => {
            let hunks = diff_hunks(base, ondisk);
            let selected = apply_selected_hunks(base, &hunks, |_, hunk| match callback(path, hunk) {
                PatchDecision::Yes => Some(true),
                PatchDecision::No => Some(false),
                PatchDecision::Quit => None,
            });
            match selected {
                Some(bytes) => bytes,
                None => return Err(WorktreeError::PatchChoice),
            }
        }
        _ => ondisk.to_vec(),
    };

    if content == base {
        Ok(None)
    } else {
        Ok(Some(content))
    }
}

/// Stage a set of paths.
///
/// Rejects any path with a staging conflict before writing anything. A
/// path that's neither tracked nor present on disk is rejected as a bad
/// path. For each delete, the stage code is set to `delete` with no blob.
/// For each add/modify, `patch` (if supplied and the content isn't binary
/// or a symlink target) is asked hunk by hunk which lines to accept; the
/// accepted lines become the new staged blob. At least one path must end
/// up actually changed, or the whole call fails with `no-change`.
pub fn stage<S: ObjectStore>(
    worktree: &WorkTree,
    odb: &S,
    index_path: &Path,
    paths: &[BString],
    mut patch: Option<&mut dyn FnMut(&BStr, &Hunk) -> PatchDecision>,
) -> Result<(), WorktreeError> {
    let _lock = worktree.lock(LockMode::Exclusive)?;
    let mut index = Index::read_from(index_path)?;

    let mut changed = false;

    for path in paths {
        let ondisk_path = worktree.root().join(path_to_os(path.as_bstr()));
        let entry = index.get(path.as_bstr()).cloned();

        let (status, _) = classify(odb, entry.as_ref(), &ondisk_path).map_err(map_status_err)?;

        match status {
            StatusCode::Conflict => return Err(WorktreeError::StageConflict(lossy(path.as_bstr()))),
            StatusCode::NoChange => continue,
            StatusCode::Delete | StatusCode::Missing => {
                if entry.is_none() {
                    return Err(WorktreeError::BadPath(lossy(path.as_bstr())));
                }
                index.set_stage(path.as_bstr(), None, StageCode::Delete);
                changed = true;
                continue;
            }
            StatusCode::ModeChange => {
                let (_, _, stat) = read_ondisk(&ondisk_path)?;
                if let Some(e) = index.get_mut(path.as_bstr()) {
                    e.stat = stat;
                    e.stage = StageCode::Modify;
                    e.staged_blob_id = e.blob_id;
                }
                changed = true;
                continue;
            }
            StatusCode::Unversioned | StatusCode::Add | StatusCode::Modify => {}
            _ => return Err(WorktreeError::FileStatus(lossy(path.as_bstr()))),
        }

        let (ondisk, is_symlink, stat) = read_ondisk(&ondisk_path)?;

        let base_blob_id = entry.as_ref().and_then(|e| e.staged_blob_id.or(e.blob_id));
        let base = match base_blob_id {
            Some(id) => odb.open_as_blob(&id)?.data,
            None => Vec::new(),
        };

        let Some(content) = build_staged_content(&base, &ondisk, is_symlink, path.as_bstr(), &mut patch)? else {
            continue;
        };

        let blob_id: ObjectId = odb.blob_create_from_bytes(&content)?;
        let file_type = if is_symlink { FileType::Symlink } else { FileType::Regular };

        match entry {
            Some(_) => {
                let stage_code = if base_blob_id.is_none() { StageCode::Add } else { StageCode::Modify };
                index.set_stage(path.as_bstr(), Some(blob_id), stage_code);
                if let Some(e) = index.get_mut(path.as_bstr()) {
                    e.file_type = file_type;
                    e.stat = stat;
                }
            }
            None => {
                let mut new_entry = FileEntry::new(path.clone());
                new_entry.staged_blob_id = Some(blob_id);
                new_entry.stage = StageCode::Add;
                new_entry.file_type = file_type;
                new_entry.stat = stat;
                index.add(new_entry);
            }
        }
        changed = true;
    }

    if !changed {
        return Err(WorktreeError::NoChanges);
    }

    index.write_to(index_path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wt_hash::HashAlgorithm;
    use wt_odb::LooseObjectDatabase;
    use wt_ref::RefName;

    fn open_db(root: &Path) -> LooseObjectDatabase {
        LooseObjectDatabase::open(root.join("objects"), HashAlgorithm::Sha1)
    }

    fn main_branch() -> RefName {
        RefName::new("refs/heads/main").unwrap()
    }

    fn fixture(tmp: &tempfile::TempDir) -> (WorkTree, LooseObjectDatabase, std::path::PathBuf) {
        let wt_root = tmp.path().join("wt");
        std::fs::create_dir_all(&wt_root).unwrap();
        let odb = open_db(tmp.path());

        let worktree = WorkTree::init(
            &wt_root,
            wt_meta::HeadRef::Branch(main_branch()),
            "/",
            tmp.path().join("repo"),
            HashAlgorithm::Sha1,
        )
        .unwrap();

        let index_path = tmp.path().join("index");
        Index::new().write_to(&index_path).unwrap();

        (worktree, odb, index_path)
    }

    #[test]
    fn staging_an_unversioned_file_creates_an_add_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let (worktree, odb, index_path) = fixture(&tmp);

        std::fs::write(worktree.root().join("a.txt"), b"hello\n").unwrap();

        stage(&worktree, &odb, &index_path, &[BString::from("a.txt")], None).unwrap();

        let index = Index::read_from(&index_path).unwrap();
        let entry = index.get(BStr::new("a.txt")).unwrap();
        assert_eq!(entry.stage, StageCode::Add);
        let blob = odb.open_as_blob(&entry.staged_blob_id.unwrap()).unwrap();
        assert_eq!(blob.data, b"hello\n");
    }

    #[test]
    fn staging_a_modified_tracked_file_sets_modify_stage() {
        let tmp = tempfile::tempdir().unwrap();
        let (worktree, odb, index_path) = fixture(&tmp);

        let original = odb.blob_create_from_bytes(b"one\n").unwrap();
        std::fs::write(worktree.root().join("a.txt"), b"two\n").unwrap();

        let mut index = Index::read_from(&index_path).unwrap();
        let mut entry = FileEntry::new("a.txt");
        entry.blob_id = Some(original);
        index.add(entry);
        index.write_to(&index_path).unwrap();

        stage(&worktree, &odb, &index_path, &[BString::from("a.txt")], None).unwrap();

        let index = Index::read_from(&index_path).unwrap();
        let entry = index.get(BStr::new("a.txt")).unwrap();
        assert_eq!(entry.stage, StageCode::Modify);
        let blob = odb.open_as_blob(&entry.staged_blob_id.unwrap()).unwrap();
        assert_eq!(blob.data, b"two\n");
    }

    #[test]
    fn staging_a_conflicted_path_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let (worktree, odb, index_path) = fixture(&tmp);

        let original = odb.blob_create_from_bytes(b"base\n").unwrap();
        std::fs::write(
            worktree.root().join("a.txt"),
            b"<<<<<<< ours\nmine\n=======\ntheirs\n>>>>>>> theirs\n",
        )
        .unwrap();

        let mut index = Index::read_from(&index_path).unwrap();
        let mut entry = FileEntry::new("a.txt");
        entry.blob_id = Some(original);
        index.add(entry);
        index.write_to(&index_path).unwrap();

        let err = stage(&worktree, &odb, &index_path, &[BString::from("a.txt")], None).unwrap_err();
        assert!(matches!(err, WorktreeError::StageConflict(_)));
    }

    #[test]
    fn staging_a_nonexistent_path_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let (worktree, odb, index_path) = fixture(&tmp);

        let err = stage(&worktree, &odb, &index_path, &[BString::from("missing.txt")], None).unwrap_err();
        assert!(matches!(err, WorktreeError::BadPath(_)));
    }

    #[test]
    fn staging_with_no_real_changes_fails_with_no_changes() {
        let tmp = tempfile::tempdir().unwrap();
        let (worktree, odb, index_path) = fixture(&tmp);

        let blob = odb.blob_create_from_bytes(b"same\n").unwrap();
        std::fs::write(worktree.root().join("a.txt"), b"same\n").unwrap();

        let mut index = Index::read_from(&index_path).unwrap();
        let mut entry = FileEntry::new("a.txt");
        entry.blob_id = Some(blob);
        entry.stat = StatFingerprint::from_metadata(&std::fs::symlink_metadata(worktree.root().join("a.txt")).unwrap());
        index.add(entry);
        index.write_to(&index_path).unwrap();

        let err = stage(&worktree, &odb, &index_path, &[BString::from("a.txt")], None).unwrap_err();
        assert!(matches!(err, WorktreeError::NoChanges));
    }

    #[test]
    fn patch_callback_stages_only_accepted_hunks() {
        let tmp = tempfile::tempdir().unwrap();
        let (worktree, odb, index_path) = fixture(&tmp);

        let original = odb.blob_create_from_bytes(b"1\n2\n3\n4\n5\n6\n7\n8\n9\n10\n").unwrap();
        std::fs::write(
            worktree.root().join("a.txt"),
            b"1\n2\nCHANGED\n4\n5\n6\n7\n8\n9\nALSO\n",
        )
        .unwrap();

        let mut index = Index::read_from(&index_path).unwrap();
        let mut entry = FileEntry::new("a.txt");
        entry.blob_id = Some(original);
        index.add(entry);
        index.write_to(&index_path).unwrap();

        let mut calls = 0;
        let mut callback = |_: &BStr, _: &Hunk| {
            calls += 1;
            if calls == 1 {
                PatchDecision::Yes
            } else {
                PatchDecision::No
            }
        };

        stage(
            &worktree,
            &odb,
            &index_path,
            &[BString::from("a.txt")],
            Some(&mut callback),
        )
        .unwrap();

        let index = Index::read_from(&index_path).unwrap();
        let entry = index.get(BStr::new("a.txt")).unwrap();
        let blob = odb.open_as_blob(&entry.staged_blob_id.unwrap()).unwrap();
        let text = String::from_utf8(blob.data).unwrap();
        assert!(text.contains("CHANGED"));
        assert!(!text.contains("ALSO"));
    }

    #[test]
    fn quitting_mid_patch_aborts_the_whole_call() {
        let tmp = tempfile::tempdir().unwrap();
        let (worktree, odb, index_path) = fixture(&tmp);

        let original = odb.blob_create_from_bytes(b"1\n2\n3\n4\n5\n6\n7\n8\n9\n10\n").unwrap();
        std::fs::write(
            worktree.root().join("a.txt"),
            b"1\n2\nCHANGED\n4\n5\n6\n7\n8\n9\nALSO\n",
        )
        .unwrap();

        let mut index = Index::read_from(&index_path).unwrap();
        let mut entry = FileEntry::new("a.txt");
        entry.blob_id = Some(original);
        index.add(entry);
        index.write_to(&index_path).unwrap();

        let mut callback = |_: &BStr, _: &Hunk| PatchDecision::Quit;

        let err = stage(
            &worktree,
            &odb,
            &index_path,
            &[BString::from("a.txt")],
            Some(&mut callback),
        )
        .unwrap_err();
        assert!(matches!(err, WorktreeError::PatchChoice));

        let index = Index::read_from(&index_path).unwrap();
        assert_eq!(index.get(BStr::new("a.txt")).unwrap().stage, StageCode::None);
    }

    #[test]
    fn staging_a_delete_sets_delete_stage_with_no_blob() {
        let tmp = tempfile::tempdir().unwrap();
        let (worktree, odb, index_path) = fixture(&tmp);

        let original = odb.blob_create_from_bytes(b"gone\n").unwrap();
        let mut index = Index::read_from(&index_path).unwrap();
        let mut entry = FileEntry::new("a.txt");
        entry.blob_id = Some(original);
        index.add(entry);
        index.write_to(&index_path).unwrap();

        stage(&worktree, &odb, &index_path, &[BString::from("a.txt")], None).unwrap();

        let index = Index::read_from(&index_path).unwrap();
        let entry = index.get(BStr::new("a.txt")).unwrap();
        assert_eq!(entry.stage, StageCode::Delete);
        assert!(entry.staged_blob_id.is_none());
    }
}

//! Checkout/update (C7): populate or refresh working-tree files from the
//! work tree's base commit, updating the index to match.

use std::path::{Path, PathBuf};

use bstr::{BStr, BString, ByteSlice};
use wt_hash::ObjectId;
use wt_index::{FileEntry, FileType, Index, StatFingerprint};
use wt_meta::{LockMode, WorkTree};
use wt_merge::{InstallOutcome, MergeOptions};
use wt_object::{FileMode, TreeEntry};
use wt_odb::ObjectStore;
use wt_ref::FilesRefStore;
use wt_status::{classify, StatusCode, StatusError, TreeDiffCallbacks};

use crate::derived_refs;

enum Action {
    Write { path: BString, tree_entry: TreeEntry, old_entry: Option<FileEntry> },
    Remove { path: BString },
}

#[derive(Default)]
struct Collector {
    actions: Vec<Action>,
}

fn full_path(parent: &BStr, name: &BStr) -> BString {
    if parent.is_empty() {
        name.to_owned()
    } else {
        let mut p: BString = parent.to_owned();
        p.push(b'/');
        p.extend_from_slice(name);
        p
    }
}

impl TreeDiffCallbacks for Collector {
    fn diff_old_new(&mut self, entry: &FileEntry, tree_entry: &TreeEntry, _parent_path: &BStr) {
        let mode_matches = mode_for_entry(entry) == tree_entry.mode;
        if entry.blob_id != Some(tree_entry.oid) || !mode_matches {
            self.actions.push(Action::Write {
                path: entry.path.clone(),
                tree_entry: tree_entry.clone(),
                old_entry: Some(entry.clone()),
            });
        }
    }

    fn diff_old(&mut self, entry: &FileEntry, _parent_path: &BStr) {
        self.actions.push(Action::Remove { path: entry.path.clone() });
    }

    fn diff_new(&mut self, tree_entry: &TreeEntry, parent_path: &BStr) {
        self.actions.push(Action::Write {
            path: full_path(parent_path, tree_entry.name.as_bstr()),
            tree_entry: tree_entry.clone(),
            old_entry: None,
        });
    }
}

fn mode_for_entry(entry: &FileEntry) -> FileMode {
    match entry.file_type {
        FileType::Symlink | FileType::BadSymlink => FileMode::Symlink,
        FileType::Regular if entry.stat.executable => FileMode::Executable,
        FileType::Regular => FileMode::Regular,
    }
}

/// Populate or refresh `paths` (work-tree-relative; an empty slice means the
/// whole tree) against `worktree`'s current base commit, writing the result
/// into `index_path`.
///
/// `progress` is called once per path touched; `cancel` is checked at every
/// directory entered and may abort the walk early with
/// [`wt_meta::WorktreeError::Cancelled`]. When `force` is false, a path whose
/// on-disk content has locally diverged from what the index last recorded is
/// three-way merged (C4/C5/C6) rather than overwritten outright; `force`
/// skips that check and installs the incoming tree blindly, which is what a
/// rebase/histedit `abort` needs to genuinely discard local edits.
#[allow(clippy::too_many_arguments)]
pub fn checkout_files<S: ObjectStore>(
    worktree: &mut WorkTree,
    odb: &S,
    refs: &FilesRefStore,
    index_path: &Path,
    paths: &[BString],
    cancel: &mut dyn FnMut() -> bool,
    progress: &mut dyn FnMut(StatusCode, &BStr),
    force: bool,
    options: &MergeOptions,
) -> Result<(), wt_meta::WorktreeError> {
    let mut lock = worktree.lock(LockMode::Exclusive)?;

    let base_commit = worktree.base_commit();
    let tree_id = if base_commit.is_null() {
        None
    } else {
        Some(odb.open_as_commit(&base_commit)?.tree)
    };

    let mut index = Index::read_from(index_path)?;

    let scopes: Vec<BString> = if paths.is_empty() {
        vec![BString::from("")]
    } else {
        paths.to_vec()
    };

    for scope in &scopes {
        let mut collector = Collector::default();
        run_scoped_diff(odb, &index, tree_id, scope.as_bstr(), cancel, &mut collector)?;
        apply_actions(worktree, odb, &mut index, base_commit, collector.actions, force, options, progress)?;
    }

    bump_base_commit(&mut index, &scopes, base_commit, progress);

    match refs.write_ref(&derived_refs::base_commit_ref(worktree.uuid()), &base_commit) {
        Ok(()) => {}
        Err(_) => progress(StatusCode::BaseRefErr, BStr::new("")),
    }

    index.write_to(index_path)?;

    lock.downgrade()?;
    Ok(())
}

fn run_scoped_diff<S: ObjectStore>(
    odb: &S,
    index: &Index,
    tree_id: Option<ObjectId>,
    scope: &BStr,
    cancel: &mut dyn FnMut() -> bool,
    collector: &mut Collector,
) -> Result<(), wt_meta::WorktreeError> {
    struct Cancellable<'a> {
        inner: &'a mut Collector,
        cancel: &'a mut dyn FnMut() -> bool,
    }
    impl TreeDiffCallbacks for Cancellable<'_> {
        fn diff_old_new(&mut self, entry: &FileEntry, tree_entry: &TreeEntry, parent_path: &BStr) {
            self.inner.diff_old_new(entry, tree_entry, parent_path)
        }
        fn diff_old(&mut self, entry: &FileEntry, parent_path: &BStr) {
            self.inner.diff_old(entry, parent_path)
        }
        fn diff_new(&mut self, tree_entry: &TreeEntry, parent_path: &BStr) {
            self.inner.diff_new(tree_entry, parent_path)
        }
        fn cancelled(&self) -> bool {
            (self.cancel)()
        }
    }

    let mut cb = Cancellable { inner: collector, cancel };
    wt_status::diff_index_tree(odb, index.entries(), tree_id, scope, &mut cb).map_err(map_status_err)
}

fn map_status_err(e: StatusError) -> wt_meta::WorktreeError {
    match e {
        StatusError::Cancelled => wt_meta::WorktreeError::Cancelled,
        StatusError::Odb(e) => e.into(),
        StatusError::Io(e) => e.into(),
    }
}

/// Reads whatever's currently at `path`: a symlink's target, a regular
/// file's bytes, or empty if nothing's there. Mirrors
/// [`wt_status::status::classify`]'s own on-disk read, but lives here since
/// that helper isn't exported.
fn local_bytes(path: &Path) -> Result<Vec<u8>, wt_meta::WorktreeError> {
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

fn apply_actions<S: ObjectStore>(
    worktree: &WorkTree,
    odb: &S,
    index: &mut Index,
    base_commit: ObjectId,
    actions: Vec<Action>,
    force: bool,
    options: &MergeOptions,
    progress: &mut dyn FnMut(StatusCode, &BStr),
) -> Result<(), wt_meta::WorktreeError> {
    for action in actions {
        match action {
            Action::Write { path, tree_entry, old_entry } => {
                let ondisk_path = worktree.root().join(path_to_os(&path));
                let outcome = install_tree_entry(
                    worktree,
                    odb,
                    &ondisk_path,
                    &tree_entry,
                    old_entry.as_ref(),
                    force,
                    options,
                )?;

                let file_type = outcome.file_type;

                if outcome.matches_incoming {
                    let meta = std::fs::symlink_metadata(&ondisk_path)?;
                    let stat = StatFingerprint::from_metadata(&meta);
                    let mut entry = FileEntry::new(path.clone());
                    entry.stat = stat;
                    entry.blob_id = Some(tree_entry.oid);
                    entry.commit_id = Some(base_commit);
                    entry.file_type = file_type;
                    index.add(entry);
                } else {
                    // A local divergence was merged rather than overwritten:
                    // keep the entry's recorded blob/stat untouched so the
                    // next status check re-derives the real outcome by
                    // comparing content, instead of trusting a stale match.
                    let entry = index.get_mut(path.as_bstr());
                    match entry {
                        Some(e) => {
                            e.file_type = file_type;
                            e.commit_id = Some(base_commit);
                        }
                        None => {
                            let mut e = FileEntry::new(path.clone());
                            e.file_type = file_type;
                            e.commit_id = Some(base_commit);
                            index.add(e);
                        }
                    }
                }

                let code = if outcome.conflicted { StatusCode::MergeConflict } else { StatusCode::Modify };
                progress(code, path.as_bstr());
            }
            Action::Remove { path } => {
                let ondisk_path = worktree.root().join(path_to_os(&path));
                match std::fs::remove_file(&ondisk_path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
                index.remove(path.as_bstr());
                progress(StatusCode::Delete, path.as_bstr());
            }
        }
    }
    Ok(())
}

/// Outcome of writing one tree entry into the work tree.
struct InstallOutcomeFull {
    file_type: FileType,
    /// True when the write produced conflict markers.
    conflicted: bool,
    /// True when the on-disk content now matches the incoming blob exactly,
    /// meaning the index entry's blob id/stat can be advanced to it. False
    /// means a local divergence was merged (cleanly or not) and the entry's
    /// prior blob/stat must be left alone.
    matches_incoming: bool,
}

fn install_blind<S: ObjectStore>(
    worktree: &WorkTree,
    odb: &S,
    ondisk_path: &Path,
    tree_entry: &TreeEntry,
) -> Result<InstallOutcomeFull, wt_meta::WorktreeError> {
    if tree_entry.mode.is_symlink() {
        let blob = odb.open_as_blob(&tree_entry.oid)?;
        let outcome = wt_merge::install_symlink(ondisk_path, &blob.data, |t| {
            worktree.is_bad_symlink_target(t, ondisk_path)
        })?;
        let file_type = match outcome {
            InstallOutcome::Installed => FileType::Symlink,
            InstallOutcome::BadSymlink => FileType::BadSymlink,
        };
        return Ok(InstallOutcomeFull { file_type, conflicted: false, matches_incoming: true });
    }

    let blob = odb.open_as_blob(&tree_entry.oid)?;
    wt_merge::install_blob(ondisk_path, &blob.data, tree_entry.mode)?;
    Ok(InstallOutcomeFull { file_type: FileType::Regular, conflicted: false, matches_incoming: true })
}

/// Writes `tree_entry`'s content into the work tree at `ondisk_path`.
///
/// When `force` is set, or when `classify` finds no local divergence from
/// what `old_entry` last recorded, this installs the incoming content
/// outright (C6's blind path). Otherwise it three-way merges the on-disk
/// content against the incoming blob, using `old_entry`'s recorded blob as
/// the common ancestor, and writes conflict markers rather than losing the
/// local edit. A local file sitting at a brand-new tracked path, or any
/// non-regular/non-symlink obstruction, is refused outright.
fn install_tree_entry<S: ObjectStore>(
    worktree: &WorkTree,
    odb: &S,
    ondisk_path: &Path,
    tree_entry: &TreeEntry,
    old_entry: Option<&FileEntry>,
    force: bool,
    options: &MergeOptions,
) -> Result<InstallOutcomeFull, wt_meta::WorktreeError> {
    if force {
        return install_blind(worktree, odb, ondisk_path, tree_entry);
    }

    let (status, _) = classify(odb, old_entry, ondisk_path).map_err(map_status_err)?;

    match status {
        StatusCode::NoChange | StatusCode::Missing | StatusCode::Delete => {
            install_blind(worktree, odb, ondisk_path, tree_entry)
        }
        StatusCode::Obstructed | StatusCode::Unversioned => {
            Err(wt_meta::WorktreeError::Obstructed(ondisk_path.to_path_buf()))
        }
        StatusCode::Modify | StatusCode::Add | StatusCode::ModeChange | StatusCode::Conflict => {
            let Some(old_entry) = old_entry else {
                // Divergence statuses other than Obstructed/Unversioned only
                // arise when there's a prior entry to diverge from.
                return install_blind(worktree, odb, ondisk_path, tree_entry);
            };

            let derived_bytes = odb.open_as_blob(&tree_entry.oid)?.data;
            let base_bytes = match old_entry.blob_id {
                Some(id) => Some(odb.open_as_blob(&id)?.data),
                None => None,
            };
            let local_content = local_bytes(ondisk_path)?;

            if tree_entry.mode.is_symlink() {
                let outcome = wt_merge::merge_symlink(
                    base_bytes.as_deref(),
                    &local_content,
                    Some(&derived_bytes),
                    ondisk_path,
                    "ancestor",
                    "incoming",
                )?;
                let file_type = if outcome.conflicted { FileType::Regular } else { FileType::Symlink };
                Ok(InstallOutcomeFull {
                    file_type,
                    conflicted: outcome.conflicted,
                    matches_incoming: !outcome.conflicted && outcome.subsumed,
                })
            } else {
                let outcome = wt_merge::merge_file(
                    base_bytes.as_deref(),
                    &local_content,
                    &derived_bytes,
                    tree_entry.mode,
                    ondisk_path,
                    "ancestor",
                    "incoming",
                    options,
                )?;
                Ok(InstallOutcomeFull {
                    file_type: FileType::Regular,
                    conflicted: outcome.conflicted,
                    matches_incoming: !outcome.conflicted && outcome.subsumed,
                })
            }
        }
        _ => install_blind(worktree, odb, ondisk_path, tree_entry),
    }
}

fn path_to_os(path: &BStr) -> PathBuf {
    use std::os::unix::ffi::OsStrExt;
    PathBuf::from(std::ffi::OsStr::from_bytes(path.as_bytes()))
}

/// Walk every index entry under `scopes`, setting `commit_id` to the new
/// base for any entry that still pointed at an older one.
fn bump_base_commit(
    index: &mut Index,
    scopes: &[BString],
    base_commit: ObjectId,
    progress: &mut dyn FnMut(StatusCode, &BStr),
) {
    let in_scope = |path: &BStr| {
        scopes.iter().any(|s| {
            s.is_empty() || wt_meta::path::path_is_child(path, s.as_bstr(), s.len())
        })
    };

    for path in index.iter_paths_snapshot() {
        if !in_scope(path.as_bstr()) {
            continue;
        }
        let Some(entry) = index.get_mut(path.as_bstr()) else { continue };
        if entry.commit_id != Some(base_commit) {
            entry.commit_id = Some(base_commit);
            progress(StatusCode::BumpBase, path.as_bstr());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wt_hash::HashAlgorithm;
    use wt_meta::HeadRef;
    use wt_odb::LooseObjectDatabase;
    use wt_utils::date::{GitDate, Signature};

    fn sig() -> Signature {
        Signature {
            name: "Test".into(),
            email: "test@example.com".into(),
            date: GitDate { timestamp: 1_700_000_000, tz_offset: 0 },
        }
    }

    fn open_db(root: &Path) -> LooseObjectDatabase {
        LooseObjectDatabase::open(root.join("objects"), HashAlgorithm::Sha1)
    }

    #[test]
    fn checkout_files_populates_a_fresh_work_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let wt_root = tmp.path().join("wt");
        std::fs::create_dir_all(&wt_root).unwrap();
        let odb = open_db(tmp.path());
        let refs = FilesRefStore::new(tmp.path().join("gitdir"));
        std::fs::create_dir_all(tmp.path().join("gitdir")).unwrap();

        let blob = odb.blob_create_from_bytes(b"hello\n").unwrap();
        let tree = odb
            .tree_create(vec![TreeEntry { mode: FileMode::Regular, name: "a.txt".into(), oid: blob }])
            .unwrap();
        let commit_id =
            odb.commit_create(tree, Vec::new(), sig(), sig(), "init".into()).unwrap();

        let mut worktree =
            WorkTree::init(&wt_root, HeadRef::Detached(commit_id), "/", tmp.path().join("repo"), HashAlgorithm::Sha1)
                .unwrap();
        worktree.set_base_commit(commit_id).unwrap();

        let index_path = worktree.dotdir().join("index");
        let mut progressed = Vec::new();
        checkout_files(
            &mut worktree,
            &odb,
            &refs,
            &index_path,
            &[],
            &mut || false,
            &mut |_, path| progressed.push(path.to_owned()),
            false,
            &MergeOptions::default(),
        )
        .unwrap();

        assert_eq!(std::fs::read(wt_root.join("a.txt")).unwrap(), b"hello\n");
        assert!(!progressed.is_empty());

        let index = Index::read_from(&index_path).unwrap();
        let entry = index.get(BStr::new("a.txt")).unwrap();
        assert_eq!(entry.blob_id, Some(blob));
        assert_eq!(entry.commit_id, Some(commit_id));
    }

    #[test]
    fn checkout_files_removes_paths_dropped_from_the_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let wt_root = tmp.path().join("wt");
        std::fs::create_dir_all(&wt_root).unwrap();
        let odb = open_db(tmp.path());
        let refs = FilesRefStore::new(tmp.path().join("gitdir"));
        std::fs::create_dir_all(tmp.path().join("gitdir")).unwrap();

        let blob = odb.blob_create_from_bytes(b"hello\n").unwrap();
        let tree_with_file = odb
            .tree_create(vec![TreeEntry { mode: FileMode::Regular, name: "a.txt".into(), oid: blob }])
            .unwrap();
        let commit1 =
            odb.commit_create(tree_with_file, Vec::new(), sig(), sig(), "init".into()).unwrap();
        let empty_tree = odb.tree_create(Vec::new()).unwrap();
        let commit2 =
            odb.commit_create(empty_tree, vec![commit1], sig(), sig(), "remove a.txt".into()).unwrap();

        let mut worktree =
            WorkTree::init(&wt_root, HeadRef::Detached(commit1), "/", tmp.path().join("repo"), HashAlgorithm::Sha1)
                .unwrap();
        worktree.set_base_commit(commit1).unwrap();
        let index_path = worktree.dotdir().join("index");

        checkout_files(
            &mut worktree,
            &odb,
            &refs,
            &index_path,
            &[],
            &mut || false,
            &mut |_, _| {},
            false,
            &MergeOptions::default(),
        )
        .unwrap();
        assert!(wt_root.join("a.txt").exists());

        worktree.set_base_commit(commit2).unwrap();
        checkout_files(
            &mut worktree,
            &odb,
            &refs,
            &index_path,
            &[],
            &mut || false,
            &mut |_, _| {},
            false,
            &MergeOptions::default(),
        )
        .unwrap();

        assert!(!wt_root.join("a.txt").exists());
        let index = Index::read_from(&index_path).unwrap();
        assert!(index.is_empty());
    }

    /// Builds a one-file history (`a.txt` = `base_content` at `commit1`, then
    /// advanced to `new_content` at `commit2`), with a work tree and index
    /// already checked out to `commit1`.
    #[allow(clippy::type_complexity)]
    fn two_commit_worktree(
        tmp: &tempfile::TempDir,
        base_content: &[u8],
        new_content: &[u8],
    ) -> (WorkTree, LooseObjectDatabase, FilesRefStore, PathBuf, ObjectId, ObjectId, ObjectId, ObjectId) {
        let wt_root = tmp.path().join("wt");
        std::fs::create_dir_all(&wt_root).unwrap();
        let odb = open_db(tmp.path());
        let refs = FilesRefStore::new(tmp.path().join("gitdir"));
        std::fs::create_dir_all(tmp.path().join("gitdir")).unwrap();

        let blob1 = odb.blob_create_from_bytes(base_content).unwrap();
        let tree1 = odb
            .tree_create(vec![TreeEntry { mode: FileMode::Regular, name: "a.txt".into(), oid: blob1 }])
            .unwrap();
        let commit1 = odb.commit_create(tree1, Vec::new(), sig(), sig(), "first".into()).unwrap();

        let blob2 = odb.blob_create_from_bytes(new_content).unwrap();
        let tree2 = odb
            .tree_create(vec![TreeEntry { mode: FileMode::Regular, name: "a.txt".into(), oid: blob2 }])
            .unwrap();
        let commit2 = odb.commit_create(tree2, vec![commit1], sig(), sig(), "second".into()).unwrap();

        let mut worktree =
            WorkTree::init(&wt_root, HeadRef::Detached(commit1), "/", tmp.path().join("repo"), HashAlgorithm::Sha1)
                .unwrap();
        worktree.set_base_commit(commit1).unwrap();
        let index_path = worktree.dotdir().join("index");

        checkout_files(
            &mut worktree,
            &odb,
            &refs,
            &index_path,
            &[],
            &mut || false,
            &mut |_, _| {},
            false,
            &MergeOptions::default(),
        )
        .unwrap();

        (worktree, odb, refs, index_path, commit1, commit2, blob1, blob2)
    }

    #[test]
    fn checkout_files_merges_a_non_conflicting_local_edit() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut worktree, odb, refs, index_path, _commit1, commit2, _blob1, _blob2) =
            two_commit_worktree(&tmp, b"one\ntwo\nthree\n", b"ONE\ntwo\nthree\n");

        std::fs::write(worktree.root().join("a.txt"), b"one\ntwo\nTHREE\n").unwrap();
        worktree.set_base_commit(commit2).unwrap();

        let mut progressed = Vec::new();
        checkout_files(
            &mut worktree,
            &odb,
            &refs,
            &index_path,
            &[],
            &mut || false,
            &mut |code, path| progressed.push((code, path.to_owned())),
            false,
            &MergeOptions::default(),
        )
        .unwrap();

        let content = std::fs::read(worktree.root().join("a.txt")).unwrap();
        assert_eq!(content, b"ONE\ntwo\nTHREE\n");
        assert!(progressed.iter().any(|(code, _)| *code == StatusCode::Modify));
    }

    #[test]
    fn checkout_files_reports_a_conflict_instead_of_clobbering_a_local_edit() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut worktree, odb, refs, index_path, _commit1, commit2, blob1, blob2) =
            two_commit_worktree(&tmp, b"one\n", b"incoming\n");

        std::fs::write(worktree.root().join("a.txt"), b"local\n").unwrap();
        worktree.set_base_commit(commit2).unwrap();

        let mut progressed = Vec::new();
        checkout_files(
            &mut worktree,
            &odb,
            &refs,
            &index_path,
            &[],
            &mut || false,
            &mut |code, path| progressed.push((code, path.to_owned())),
            false,
            &MergeOptions::default(),
        )
        .unwrap();

        let content = std::fs::read_to_string(worktree.root().join("a.txt")).unwrap();
        assert!(content.contains("<<<<<<<"));
        assert!(content.contains("local"));
        assert!(content.contains("incoming"));
        assert!(progressed.iter().any(|(code, _)| *code == StatusCode::MergeConflict));

        // The index entry still points at the pre-merge blob so the next
        // status check re-derives the conflict from content instead of
        // trusting a stale match.
        let index = Index::read_from(&index_path).unwrap();
        let entry = index.get(BStr::new("a.txt")).unwrap();
        assert_eq!(entry.blob_id, Some(blob1));
        assert_ne!(entry.blob_id, Some(blob2));
    }

    #[test]
    fn checkout_files_refuses_to_clobber_an_untracked_file_at_a_new_path() {
        let tmp = tempfile::tempdir().unwrap();
        let wt_root = tmp.path().join("wt");
        std::fs::create_dir_all(&wt_root).unwrap();
        let odb = open_db(tmp.path());
        let refs = FilesRefStore::new(tmp.path().join("gitdir"));
        std::fs::create_dir_all(tmp.path().join("gitdir")).unwrap();

        let empty_tree = odb.tree_create(Vec::new()).unwrap();
        let commit1 = odb.commit_create(empty_tree, Vec::new(), sig(), sig(), "init".into()).unwrap();

        let blob = odb.blob_create_from_bytes(b"incoming\n").unwrap();
        let tree2 = odb
            .tree_create(vec![TreeEntry { mode: FileMode::Regular, name: "new.txt".into(), oid: blob }])
            .unwrap();
        let commit2 = odb.commit_create(tree2, vec![commit1], sig(), sig(), "add new.txt".into()).unwrap();

        let mut worktree =
            WorkTree::init(&wt_root, HeadRef::Detached(commit1), "/", tmp.path().join("repo"), HashAlgorithm::Sha1)
                .unwrap();
        worktree.set_base_commit(commit1).unwrap();
        let index_path = worktree.dotdir().join("index");
        Index::new().write_to(&index_path).unwrap();

        std::fs::write(wt_root.join("new.txt"), b"already here\n").unwrap();
        worktree.set_base_commit(commit2).unwrap();

        let err = checkout_files(
            &mut worktree,
            &odb,
            &refs,
            &index_path,
            &[],
            &mut || false,
            &mut |_, _| {},
            false,
            &MergeOptions::default(),
        )
        .unwrap_err();

        assert!(matches!(err, wt_meta::WorktreeError::Obstructed(_)));
        assert_eq!(std::fs::read(wt_root.join("new.txt")).unwrap(), b"already here\n");
    }
}

//! Commit pipeline (C8): collect the paths that differ from a work tree's
//! base commit (or just its staged entries, when any exist), write blobs and
//! a new tree, and land a new commit with a compare-and-swap head update.

use std::collections::BTreeMap;
use std::path::Path;

use bstr::{BStr, BString, ByteSlice};
use wt_hash::ObjectId;
use wt_index::{FileEntry, Index, StageCode};
use wt_meta::{HeadRef, LockMode, WorkTree, WorktreeError};
use wt_object::FileMode;
use wt_odb::{ObjectStore, OdbError};
use wt_ref::{FilesRefStore, RefError, RefStore, RefTransaction};
use wt_status::{classify, StatusCode, StatusError};
use wt_utils::date::Signature;

use crate::commitable::Commitable;
use crate::derived_refs;

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

fn mode_for_entry(entry: &FileEntry) -> FileMode {
    match entry.file_type {
        wt_index::FileType::Symlink | wt_index::FileType::BadSymlink => FileMode::Symlink,
        wt_index::FileType::Regular if entry.stat.executable => FileMode::Executable,
        wt_index::FileType::Regular => FileMode::Regular,
    }
}

fn repo_path_for(worktree: &WorkTree, relative: &BStr) -> BString {
    let prefix = worktree.path_prefix();
    let trimmed = prefix.strip_prefix(b"/").unwrap_or(prefix);
    if trimmed.is_empty() {
        relative.to_owned()
    } else {
        let mut p = BString::from(trimmed);
        p.push(b'/');
        p.extend_from_slice(relative);
        p
    }
}

fn in_scope(path: &BStr, scope: &BStr) -> bool {
    scope.is_empty() || wt_meta::path::path_is_child(path, scope, scope.len())
}

/// Resolves the work tree's branch or detached head to a commit id. An
/// unborn branch (never committed to) resolves to the null oid, matching
/// [`WorkTree::base_commit`]'s convention for a fresh work tree.
fn resolve_head(worktree: &WorkTree, refs: &FilesRefStore) -> Result<ObjectId, WorktreeError> {
    match worktree.head_ref() {
        HeadRef::Branch(name) => Ok(refs
            .resolve_to_oid(name)?
            .unwrap_or_else(|| worktree.hash_algo().null_oid())),
        HeadRef::Detached(id) => Ok(*id),
    }
}

fn collect_staged(
    worktree: &WorkTree,
    index: &Index,
    paths: &[BString],
) -> Result<Vec<Commitable>, WorktreeError> {
    let mut out = Vec::new();
    for path in index.iter_paths_snapshot() {
        let entry = index.get(path.as_bstr()).expect("snapshot path exists");
        if entry.stage == StageCode::None {
            continue;
        }
        let status = match entry.stage {
            StageCode::Add => StatusCode::Add,
            StageCode::Modify => StatusCode::Modify,
            StageCode::Delete => StatusCode::Delete,
            StageCode::None => unreachable!(),
        };
        out.push(Commitable {
            relative_path: path.clone(),
            repo_path: repo_path_for(worktree, path.as_bstr()),
            status,
            staged: true,
            mode: mode_for_entry(entry),
            blob_id: if status == StatusCode::Delete { None } else { entry.staged_blob_id },
            base_blob_id: entry.blob_id,
        });
    }

    for p in paths {
        if !out.iter().any(|c| c.relative_path == *p) {
            return Err(WorktreeError::BadPath(lossy(p.as_bstr())));
        }
    }

    Ok(out)
}

fn collect_unstaged<S: ObjectStore>(
    worktree: &WorkTree,
    odb: &S,
    index: &Index,
    paths: &[BString],
) -> Result<Vec<Commitable>, WorktreeError> {
    let mut out = Vec::new();
    let mut covered = vec![false; paths.len()];

    for path in index.iter_paths_snapshot() {
        let scope_idx = if paths.is_empty() {
            None
        } else {
            match paths.iter().position(|p| in_scope(path.as_bstr(), p.as_bstr())) {
                Some(idx) => Some(idx),
                None => continue,
            }
        };

        let entry = index.get(path.as_bstr()).expect("snapshot path exists");
        let ondisk_path = worktree.root().join(path_to_os(path.as_bstr()));
        let (status, fresh_stat) =
            classify(odb, Some(entry), &ondisk_path).map_err(map_status_err)?;

        match status {
            StatusCode::Conflict => return Err(WorktreeError::Conflicts(lossy(path.as_bstr()))),
            StatusCode::Modify | StatusCode::Add | StatusCode::Delete | StatusCode::ModeChange => {
                if let Some(idx) = scope_idx {
                    covered[idx] = true;
                }
                let mode = if status == StatusCode::Delete {
                    FileMode::Regular
                } else {
                    let is_symlink = std::fs::symlink_metadata(&ondisk_path)
                        .map(|m| m.file_type().is_symlink())
                        .unwrap_or(false);
                    if is_symlink {
                        FileMode::Symlink
                    } else if fresh_stat.is_some_and(|s| s.executable) {
                        FileMode::Executable
                    } else {
                        FileMode::Regular
                    }
                };
                out.push(Commitable {
                    relative_path: path.clone(),
                    repo_path: repo_path_for(worktree, path.as_bstr()),
                    status,
                    staged: false,
                    mode,
                    blob_id: None,
                    base_blob_id: entry.blob_id,
                });
            }
            _ => {}
        }
    }

    if let Some(idx) = covered.iter().position(|done| !done) {
        return Err(WorktreeError::BadPath(lossy(paths[idx].as_bstr())));
    }

    Ok(out)
}

/// Verifies every commitable's repo path still looks, in the current head
/// commit's tree, the way this work tree last observed it.
fn check_out_of_date<S: ObjectStore>(
    odb: &S,
    head_commit_id: ObjectId,
    commitables: &[Commitable],
) -> Result<(), WorktreeError> {
    if head_commit_id.is_null() {
        if commitables.iter().any(|c| c.status != StatusCode::Add) {
            return Err(WorktreeError::OutOfDate);
        }
        return Ok(());
    }

    for c in commitables {
        let lookup = odb.id_by_path(&head_commit_id, c.repo_path.as_bstr());
        let is_add = c.status == StatusCode::Add;
        match lookup {
            Ok(found) if is_add => {
                let _ = found;
                return Err(WorktreeError::OutOfDate);
            }
            Ok(found) if Some(found) == c.base_blob_id => {}
            Ok(_) => return Err(WorktreeError::OutOfDate),
            Err(OdbError::NoTreeEntry(_)) if is_add => {}
            Err(OdbError::NoTreeEntry(_)) => return Err(WorktreeError::OutOfDate),
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

fn create_blobs<S: ObjectStore>(
    worktree: &WorkTree,
    odb: &S,
    commitables: &mut [Commitable],
) -> Result<(), WorktreeError> {
    for c in commitables.iter_mut() {
        if c.is_delete() || c.staged {
            continue;
        }
        let ondisk_path = worktree.root().join(path_to_os(c.relative_path.as_bstr()));
        let oid = if c.mode == FileMode::Symlink {
            use std::os::unix::ffi::OsStrExt;
            let target = std::fs::read_link(&ondisk_path)?;
            odb.blob_create_from_bytes(target.as_os_str().as_bytes())?
        } else {
            odb.blob_create(&ondisk_path)?
        };
        c.blob_id = Some(oid);
    }
    Ok(())
}

enum TreeChange {
    Write(FileMode, ObjectId),
    Delete,
}

fn split_first_segment(path: &BStr) -> (BString, BString) {
    match path.find_byte(b'/') {
        Some(idx) => (BString::from(&path[..idx]), BString::from(&path[idx + 1..])),
        None => (path.to_owned(), BString::from("")),
    }
}

/// Recursively rewrites a tree with `changes` (repo-relative paths) applied,
/// copying any untouched existing entry verbatim and dropping subtrees left
/// empty. Mirrors the grouping-by-path-segment approach the status engine's
/// tree/index differ uses, run here against a set of edits instead of a diff.
fn rewrite_tree<S: ObjectStore>(
    odb: &S,
    existing: Option<ObjectId>,
    changes: Vec<(BString, TreeChange)>,
) -> Result<Option<ObjectId>, WorktreeError> {
    let existing_entries = match existing {
        Some(id) => odb.open_as_tree(&id)?.entries,
        None => Vec::new(),
    };

    let mut groups: BTreeMap<BString, Vec<(BString, TreeChange)>> = BTreeMap::new();
    for (path, change) in changes {
        let (head, rest) = split_first_segment(path.as_bstr());
        groups.entry(head).or_default().push((rest, change));
    }

    let mut new_entries = Vec::new();

    for entry in &existing_entries {
        if !groups.contains_key(&entry.name) {
            new_entries.push(entry.clone());
        }
    }

    for (name, group_changes) in groups {
        if group_changes.len() == 1 && group_changes[0].0.is_empty() {
            match &group_changes[0].1 {
                TreeChange::Write(mode, oid) => {
                    new_entries.push(wt_object::TreeEntry { mode: *mode, name, oid: *oid });
                }
                TreeChange::Delete => {}
            }
            continue;
        }

        let existing_subtree = existing_entries
            .iter()
            .find(|e| e.name == name && e.mode.is_tree())
            .map(|e| e.oid);

        if let Some(new_id) = rewrite_tree(odb, existing_subtree, group_changes)? {
            new_entries.push(wt_object::TreeEntry { mode: FileMode::Tree, name, oid: new_id });
        }
    }

    if new_entries.is_empty() {
        Ok(None)
    } else {
        Ok(Some(odb.tree_create(new_entries)?))
    }
}

fn sync_index(index: &mut Index, new_commit_id: ObjectId, commitables: &[Commitable]) {
    for c in commitables {
        if c.is_delete() {
            index.remove(c.relative_path.as_bstr());
            continue;
        }
        if let Some(entry) = index.get_mut(c.relative_path.as_bstr()) {
            entry.blob_id = c.blob_id;
            entry.commit_id = Some(new_commit_id);
            entry.staged_blob_id = None;
            entry.stage = StageCode::None;
        }
    }
}

/// Commits `paths` (work-tree-relative; an empty slice means every changed
/// path) against `worktree`'s branch or detached head.
///
/// When the index has any staged entries, only those are committed and every
/// path in `paths` must name one of them; otherwise every path's on-disk
/// state is compared against the index and the base tree. `message_fn` is
/// called once with the collected commitables to produce the log message; an
/// empty message aborts the commit.
#[allow(clippy::too_many_arguments)]
pub fn commit<S: ObjectStore>(
    worktree: &mut WorkTree,
    odb: &S,
    refs: &FilesRefStore,
    index_path: &Path,
    paths: &[BString],
    author: Signature,
    committer: Signature,
    message_fn: &mut dyn FnMut(&[Commitable]) -> BString,
) -> Result<ObjectId, WorktreeError> {
    let mut lock = worktree.lock(LockMode::Exclusive)?;

    let mut index = Index::read_from(index_path)?;
    let head_commit_id = resolve_head(worktree, refs)?;

    let has_staged = index.iter().any(|e| e.stage != StageCode::None);
    let mut commitables = if has_staged {
        collect_staged(worktree, &index, paths)?
    } else {
        collect_unstaged(worktree, odb, &index, paths)?
    };

    if commitables.is_empty() {
        return Err(WorktreeError::NoChanges);
    }

    check_out_of_date(odb, head_commit_id, &commitables)?;
    create_blobs(worktree, odb, &mut commitables)?;

    let changes: Vec<(BString, TreeChange)> = commitables
        .iter()
        .map(|c| {
            let change = if c.is_delete() {
                TreeChange::Delete
            } else {
                TreeChange::Write(c.mode, c.blob_id.expect("blob created before tree rewrite"))
            };
            (c.repo_path.clone(), change)
        })
        .collect();

    let existing_tree_id = if head_commit_id.is_null() {
        None
    } else {
        Some(odb.open_as_commit(&head_commit_id)?.tree)
    };

    let new_tree_id = match rewrite_tree(odb, existing_tree_id, changes)? {
        Some(id) => id,
        None => odb.tree_create(Vec::new())?,
    };

    let message = message_fn(&commitables);
    if message.is_empty() {
        return Err(WorktreeError::MsgEmpty);
    }

    let parents = if head_commit_id.is_null() { Vec::new() } else { vec![head_commit_id] };
    let new_commit_id = odb.commit_create(new_tree_id, parents, author, committer, message)?;

    match worktree.head_ref().clone() {
        HeadRef::Branch(name) => {
            let mut tx = RefTransaction::new();
            tx.update(name, head_commit_id, new_commit_id, "commit");
            refs.commit_transaction(tx).map_err(|e| match e {
                RefError::CasFailed { .. } => WorktreeError::HeadChanged,
                other => other.into(),
            })?;
        }
        HeadRef::Detached(_) => {
            worktree.set_head_ref(HeadRef::Detached(new_commit_id))?;
        }
    }

    worktree.set_base_commit(new_commit_id)?;

    if refs.write_ref(&derived_refs::base_commit_ref(worktree.uuid()), &new_commit_id).is_err() {
        // Best effort: losing the protective ref doesn't invalidate a commit
        // that already landed on the branch.
    }

    sync_index(&mut index, new_commit_id, &commitables);
    index.write_to(index_path)?;

    lock.downgrade()?;
    Ok(new_commit_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wt_hash::HashAlgorithm;
    use wt_object::TreeEntry;
    use wt_odb::LooseObjectDatabase;
    use wt_ref::RefName;
    use wt_utils::date::GitDate;

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

    fn main_branch() -> RefName {
        RefName::new("refs/heads/main").unwrap()
    }

    #[test]
    fn commit_from_unborn_branch_creates_first_commit() {
        let tmp = tempfile::tempdir().unwrap();
        let wt_root = tmp.path().join("wt");
        std::fs::create_dir_all(&wt_root).unwrap();
        let gitdir = tmp.path().join("gitdir");
        std::fs::create_dir_all(&gitdir).unwrap();
        let odb = open_db(tmp.path());
        let refs = FilesRefStore::new(&gitdir);

        std::fs::write(wt_root.join("hello.txt"), b"hi\n").unwrap();

        let mut worktree = WorkTree::init(
            &wt_root,
            HeadRef::Branch(main_branch()),
            "/",
            tmp.path().join("repo"),
            HashAlgorithm::Sha1,
        )
        .unwrap();

        let mut index = Index::new();
        let mut entry = FileEntry::new("hello.txt");
        entry.stat = wt_index::StatFingerprint::from_metadata(
            &std::fs::symlink_metadata(wt_root.join("hello.txt")).unwrap(),
        );
        index.add(entry);
        let index_path = worktree.dotdir().join("index");
        index.write_to(&index_path).unwrap();

        let new_commit = commit(
            &mut worktree,
            &odb,
            &refs,
            &index_path,
            &[],
            sig(),
            sig(),
            &mut |_| "first commit".into(),
        )
        .unwrap();

        assert_eq!(refs.resolve_to_oid(&main_branch()).unwrap(), Some(new_commit));
        assert_eq!(worktree.base_commit(), new_commit);

        let index = Index::read_from(&index_path).unwrap();
        let entry = index.get(BStr::new("hello.txt")).unwrap();
        assert!(entry.blob_id.is_some());
        assert_eq!(entry.commit_id, Some(new_commit));
        assert_eq!(entry.stage, StageCode::None);

        let committed_tree = odb.open_as_commit(&new_commit).unwrap().tree;
        let blob_id = odb.id_by_path(&new_commit, BStr::new("hello.txt")).unwrap();
        let _ = committed_tree;
        assert_eq!(odb.open_as_blob(&blob_id).unwrap().data, b"hi\n");
    }

    #[test]
    fn commit_rejects_changes_stale_against_the_current_head() {
        let tmp = tempfile::tempdir().unwrap();
        let wt_root = tmp.path().join("wt");
        std::fs::create_dir_all(&wt_root).unwrap();
        let gitdir = tmp.path().join("gitdir");
        std::fs::create_dir_all(&gitdir).unwrap();
        let odb = open_db(tmp.path());
        let refs = FilesRefStore::new(&gitdir);

        let blob1 = odb.blob_create_from_bytes(b"v1\n").unwrap();
        let tree1 = odb
            .tree_create(vec![TreeEntry { mode: FileMode::Regular, name: "x.txt".into(), oid: blob1 }])
            .unwrap();
        let commit_a = odb.commit_create(tree1, Vec::new(), sig(), sig(), "a".into()).unwrap();
        refs.write_ref(&main_branch(), &commit_a).unwrap();

        let mut worktree = WorkTree::init(
            &wt_root,
            HeadRef::Branch(main_branch()),
            "/",
            tmp.path().join("repo"),
            HashAlgorithm::Sha1,
        )
        .unwrap();
        worktree.set_base_commit(commit_a).unwrap();

        std::fs::write(wt_root.join("x.txt"), b"v2\n").unwrap();
        let mut index = Index::new();
        let mut entry = FileEntry::new("x.txt");
        entry.blob_id = Some(blob1);
        entry.commit_id = Some(commit_a);
        index.add(entry);
        let index_path = worktree.dotdir().join("index");
        index.write_to(&index_path).unwrap();

        // Someone else advances the branch concurrently.
        let blob2 = odb.blob_create_from_bytes(b"server\n").unwrap();
        let tree2 = odb
            .tree_create(vec![TreeEntry { mode: FileMode::Regular, name: "x.txt".into(), oid: blob2 }])
            .unwrap();
        let commit_b =
            odb.commit_create(tree2, vec![commit_a], sig(), sig(), "b".into()).unwrap();
        refs.write_ref(&main_branch(), &commit_b).unwrap();

        let result = commit(
            &mut worktree,
            &odb,
            &refs,
            &index_path,
            &[],
            sig(),
            sig(),
            &mut |_| "update".into(),
        );

        assert!(matches!(result, Err(WorktreeError::OutOfDate)));
    }

    #[test]
    fn commit_with_empty_message_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let wt_root = tmp.path().join("wt");
        std::fs::create_dir_all(&wt_root).unwrap();
        let gitdir = tmp.path().join("gitdir");
        std::fs::create_dir_all(&gitdir).unwrap();
        let odb = open_db(tmp.path());
        let refs = FilesRefStore::new(&gitdir);

        std::fs::write(wt_root.join("hello.txt"), b"hi\n").unwrap();
        let mut worktree = WorkTree::init(
            &wt_root,
            HeadRef::Branch(main_branch()),
            "/",
            tmp.path().join("repo"),
            HashAlgorithm::Sha1,
        )
        .unwrap();

        let mut index = Index::new();
        index.add(FileEntry::new("hello.txt"));
        let index_path = worktree.dotdir().join("index");
        index.write_to(&index_path).unwrap();

        let result = commit(
            &mut worktree,
            &odb,
            &refs,
            &index_path,
            &[],
            sig(),
            sig(),
            &mut |_| BString::from(""),
        );

        assert!(matches!(result, Err(WorktreeError::MsgEmpty)));
    }
}

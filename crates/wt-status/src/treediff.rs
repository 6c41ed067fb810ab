//! The tree diff driver (C5): walks a sorted file index against a
//! repository tree (or the work tree against the index) in lock-step,
//! sorted order, emitting callbacks for entries unique to each side and
//! for paths present in both.
//!
//! Directory ordering matches git's tree-entry rule: a directory sorts as
//! if its name carried a trailing `/`, so `"foo"` (a directory) sorts after
//! `"foo-bar"` but before `"foo.c"`.

use bstr::{BStr, BString, ByteSlice};
use wt_hash::ObjectId;
use wt_index::FileEntry;
use wt_object::TreeEntry;
use wt_odb::ObjectStore;

use crate::error::StatusError;

/// The three-callback shape plus `traverse`, fired once per directory
/// entered so ignore-pattern state (or similar per-directory bookkeeping)
/// can be pushed and popped around the recursive call.
pub trait TreeDiffCallbacks {
    /// A path tracked by both the index and the tree.
    fn diff_old_new(&mut self, entry: &FileEntry, tree_entry: &TreeEntry, parent_path: &BStr);
    /// A path present only in the index.
    fn diff_old(&mut self, entry: &FileEntry, parent_path: &BStr);
    /// A path present only in the tree.
    fn diff_new(&mut self, tree_entry: &TreeEntry, parent_path: &BStr);
    /// Fired once per directory entered, before its children are visited.
    fn traverse(&mut self, _dir_path: &BStr) {}
    /// Checked at each step; returning `true` aborts the walk with
    /// [`StatusError::Cancelled`].
    fn cancelled(&self) -> bool {
        false
    }
}

/// Diff `index_entries` (sorted by full path) against `tree_id` (or an
/// empty tree if `None`), restricted to paths under `scope_prefix`.
///
/// The walk is single-threaded and deterministic: given the same index
/// snapshot and tree, it visits paths in the same order every time.
pub fn diff_index_tree<S: ObjectStore>(
    odb: &S,
    index_entries: &[FileEntry],
    tree_id: Option<ObjectId>,
    scope_prefix: &BStr,
    callbacks: &mut dyn TreeDiffCallbacks,
) -> Result<(), StatusError> {
    let scoped = scoped_slice(index_entries, scope_prefix);
    diff_level(odb, scoped, scope_prefix, tree_id, callbacks)
}

fn scoped_slice<'a>(entries: &'a [FileEntry], prefix: &BStr) -> &'a [FileEntry] {
    if prefix.is_empty() {
        return entries;
    }
    let start = entries.partition_point(|e| e.path.as_bstr() < prefix);
    let end = entries.partition_point(|e| {
        e.path.as_bstr() < prefix || wt_meta::path::path_is_child(e.path.as_bstr(), prefix, prefix.len())
    });
    &entries[start..end]
}

/// One path segment relative to the level's prefix: either a leaf entry
/// (no further `/`) or the name of a subdirectory holding one or more
/// index entries.
enum Group<'a> {
    Leaf(&'a FileEntry),
    Dir { name: BString, entries: &'a [FileEntry] },
}

impl Group<'_> {
    fn sort_key(&self) -> BString {
        match self {
            Group::Leaf(e) => BString::from(relative_name(e.path.as_bstr()).as_bytes()),
            Group::Dir { name, .. } => {
                let mut key = name.clone();
                key.push(b'/');
                key
            }
        }
    }
}

fn relative_name(path: &BStr) -> &BStr {
    match path.rfind_byte(b'/') {
        Some(pos) => path[pos + 1..].as_bstr(),
        None => path,
    }
}

/// Split `entries` (all sharing `prefix` as an ancestor) into groups at the
/// next path segment below `prefix`.
fn group_entries<'a>(entries: &'a [FileEntry], prefix: &BStr) -> Vec<Group<'a>> {
    let skip = if prefix.is_empty() { 0 } else { prefix.len() + 1 };
    let mut groups = Vec::new();
    let mut i = 0;
    while i < entries.len() {
        let rest = &entries[i].path.as_bstr()[skip..];
        match rest.find_byte(b'/') {
            None => {
                groups.push(Group::Leaf(&entries[i]));
                i += 1;
            }
            Some(slash) => {
                let dir_name = BString::from(rest[..slash].as_bytes());
                let mut j = i + 1;
                while j < entries.len() {
                    let candidate = &entries[j].path.as_bstr()[skip..];
                    if candidate.len() > slash && &candidate[..slash] == dir_name.as_bstr() && candidate.as_bytes().get(slash) == Some(&b'/') {
                        j += 1;
                    } else {
                        break;
                    }
                }
                groups.push(Group::Dir { name: dir_name, entries: &entries[i..j] });
                i = j;
            }
        }
    }
    groups
}

fn join_path(prefix: &BStr, name: &BStr) -> BString {
    if prefix.is_empty() {
        name.to_owned()
    } else {
        let mut p: BString = prefix.to_owned();
        p.push(b'/');
        p.extend_from_slice(name);
        p
    }
}

fn diff_level<S: ObjectStore>(
    odb: &S,
    index_entries: &[FileEntry],
    prefix: &BStr,
    tree_id: Option<ObjectId>,
    cb: &mut dyn TreeDiffCallbacks,
) -> Result<(), StatusError> {
    if cb.cancelled() {
        return Err(StatusError::Cancelled);
    }
    cb.traverse(prefix);

    let tree_entries: Vec<TreeEntry> = match tree_id {
        Some(id) => odb.open_as_tree(&id)?.iter().cloned().collect(),
        None => Vec::new(),
    };
    let groups = group_entries(index_entries, prefix);

    let mut gi = 0usize;
    let mut ti = 0usize;
    loop {
        if cb.cancelled() {
            return Err(StatusError::Cancelled);
        }
        match (groups.get(gi), tree_entries.get(ti)) {
            (Some(group), Some(tentry)) => {
                let tree_key = tree_sort_key(tentry);
                match group.sort_key().as_bstr().cmp(tree_key.as_bstr()) {
                    std::cmp::Ordering::Less => {
                        emit_index_only(group, prefix, cb);
                        gi += 1;
                    }
                    std::cmp::Ordering::Greater => {
                        if !tentry.mode.is_gitlink() {
                            emit_tree_only(odb, tentry, prefix, cb)?;
                        }
                        ti += 1;
                    }
                    std::cmp::Ordering::Equal => {
                        if tentry.mode.is_gitlink() {
                            gi += 1;
                            ti += 1;
                            continue;
                        }
                        match group {
                            Group::Dir { entries, .. } if tentry.mode.is_tree() => {
                                let dir_path = join_path(prefix, tentry.name.as_bstr());
                                diff_level(odb, entries, dir_path.as_bstr(), Some(tentry.oid), cb)?;
                            }
                            Group::Leaf(entry) if !tentry.mode.is_tree() => {
                                cb.diff_old_new(entry, tentry, prefix);
                            }
                            _ => {
                                // A directory on one side meeting a file on the
                                // other at the same name: both are reported so
                                // the caller sees the full obstruction.
                                emit_index_only(group, prefix, cb);
                                if !tentry.mode.is_gitlink() {
                                    emit_tree_only(odb, tentry, prefix, cb)?;
                                }
                            }
                        }
                        gi += 1;
                        ti += 1;
                    }
                }
            }
            (Some(group), None) => {
                emit_index_only(group, prefix, cb);
                gi += 1;
            }
            (None, Some(tentry)) => {
                if !tentry.mode.is_gitlink() {
                    emit_tree_only(odb, tentry, prefix, cb)?;
                }
                ti += 1;
            }
            (None, None) => break,
        }
    }
    Ok(())
}

fn tree_sort_key(entry: &TreeEntry) -> BString {
    if entry.mode.is_tree() {
        let mut key = entry.name.clone();
        key.push(b'/');
        key
    } else {
        entry.name.clone()
    }
}

fn emit_index_only(group: &Group<'_>, prefix: &BStr, cb: &mut dyn TreeDiffCallbacks) {
    match group {
        Group::Leaf(entry) => cb.diff_old(entry, prefix),
        Group::Dir { entries, .. } => {
            for entry in *entries {
                cb.diff_old(entry, prefix);
            }
        }
    }
}

fn emit_tree_only<S: ObjectStore>(
    odb: &S,
    tentry: &TreeEntry,
    parent_path: &BStr,
    cb: &mut dyn TreeDiffCallbacks,
) -> Result<(), StatusError> {
    if !tentry.mode.is_tree() {
        cb.diff_new(tentry, parent_path);
        return Ok(());
    }
    let dir_path = join_path(parent_path, tentry.name.as_bstr());
    cb.traverse(dir_path.as_bstr());
    let subtree = odb.open_as_tree(&tentry.oid)?;
    for child in subtree.iter() {
        if child.mode.is_gitlink() {
            continue;
        }
        emit_tree_only(odb, child, dir_path.as_bstr(), cb)?;
    }
    Ok(())
}

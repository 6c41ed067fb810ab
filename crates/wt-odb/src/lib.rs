//! The object store collaborator.
//!
//! The work-tree core treats object storage as an external collaborator: it
//! opens objects by ID, resolves paths against commits, reads blob content,
//! and creates new blobs and commits, but never touches the on-disk object
//! format directly. This crate provides a loose-object-backed implementation
//! of that surface plus the ancestry query the rebase/histedit state
//! machines need.

pub mod ancestry;
mod loose;

use std::path::Path;

use bstr::{BStr, BString, ByteSlice};

use wt_hash::{HashAlgorithm, ObjectId};
use wt_object::{Blob, Commit, FileMode, Object, ObjectType, Tree, TreeEntry};
use wt_utils::date::Signature;

pub use loose::{LooseObjectIter, LooseObjectStore};

/// Errors from object-store operations.
///
/// `NotFound` is kept distinct from `Io` per the collaborator contract: the
/// core must be able to tell "the object does not exist" apart from "the
/// storage layer failed".
#[derive(Debug, thiserror::Error)]
pub enum OdbError {
    #[error("object not found: {0}")]
    NotFound(ObjectId),

    #[error("no such path in tree: {0}")]
    NoTreeEntry(BString),

    #[error("object {0} is not a {1}")]
    WrongType(ObjectId, &'static str),

    #[error("corrupt object {oid}: {reason}")]
    Corrupt { oid: String, reason: String },

    #[error(transparent)]
    Object(#[from] wt_object::ObjectError),

    #[error(transparent)]
    Hash(#[from] wt_hash::HashError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The object-store surface the work-tree core consumes.
///
/// Method names mirror the specification's external-interface vocabulary
/// (`open-object`, `open-as-*`, `id-by-path`, `tree-entries`,
/// `tree-find-entry`, `blob-read-block`, `blob-create`, `commit-create`) so
/// callers reading this trait alongside the design notes need no
/// translation step.
pub trait ObjectStore {
    fn open_object(&self, id: &ObjectId) -> Result<Object, OdbError>;

    fn open_as_commit(&self, id: &ObjectId) -> Result<Commit, OdbError> {
        match self.open_object(id)? {
            Object::Commit(c) => Ok(c),
            _ => Err(OdbError::WrongType(*id, "commit")),
        }
    }

    fn open_as_tree(&self, id: &ObjectId) -> Result<Tree, OdbError> {
        match self.open_object(id)? {
            Object::Tree(t) => Ok(t),
            _ => Err(OdbError::WrongType(*id, "tree")),
        }
    }

    fn open_as_blob(&self, id: &ObjectId) -> Result<Blob, OdbError> {
        match self.open_object(id)? {
            Object::Blob(b) => Ok(b),
            _ => Err(OdbError::WrongType(*id, "blob")),
        }
    }

    /// Resolve a slash-separated repository-relative path against a commit's
    /// tree, returning the OID of the path's final component.
    fn id_by_path(&self, commit: &ObjectId, path: &BStr) -> Result<ObjectId, OdbError> {
        let commit = self.open_as_commit(commit)?;
        let mut current = commit.tree;
        if path.is_empty() {
            return Ok(current);
        }
        let components: Vec<&[u8]> = path.split(|&b| b == b'/').collect();
        for (i, component) in components.iter().enumerate() {
            let tree = self.open_as_tree(&current)?;
            let entry = self
                .tree_find_entry(&tree, component.as_bstr())
                .ok_or_else(|| OdbError::NoTreeEntry(BString::from(path.as_bytes())))?;
            if i + 1 == components.len() {
                return Ok(entry.oid);
            }
            if !entry.mode.is_tree() {
                return Err(OdbError::NoTreeEntry(BString::from(path.as_bytes())));
            }
            current = entry.oid;
        }
        Ok(current)
    }

    fn tree_entries<'a>(&self, tree: &'a Tree) -> Box<dyn Iterator<Item = &'a TreeEntry> + 'a> {
        Box::new(tree.iter())
    }

    fn tree_find_entry<'a>(&self, tree: &'a Tree, name: &BStr) -> Option<&'a TreeEntry> {
        tree.find(name)
    }

    /// Read up to `buf.len()` bytes of a blob's content starting at `offset`,
    /// returning the number of bytes copied.
    fn blob_read_block(&self, id: &ObjectId, offset: usize, buf: &mut [u8]) -> Result<usize, OdbError> {
        let blob = self.open_as_blob(id)?;
        if offset >= blob.data.len() {
            return Ok(0);
        }
        let end = (offset + buf.len()).min(blob.data.len());
        let n = end - offset;
        buf[..n].copy_from_slice(&blob.data[offset..end]);
        Ok(n)
    }

    /// Hash and store the content at `path` as a blob, returning its OID.
    fn blob_create(&self, path: &Path) -> Result<ObjectId, OdbError>;

    /// Hash and store raw bytes as a blob, returning its OID.
    fn blob_create_from_bytes(&self, content: &[u8]) -> Result<ObjectId, OdbError>;

    /// Build and store a tree object from its sorted entries.
    fn tree_create(&self, entries: Vec<TreeEntry>) -> Result<ObjectId, OdbError>;

    #[allow(clippy::too_many_arguments)]
    fn commit_create(
        &self,
        tree: ObjectId,
        parents: Vec<ObjectId>,
        author: Signature,
        committer: Signature,
        message: BString,
    ) -> Result<ObjectId, OdbError>;

    fn contains(&self, id: &ObjectId) -> bool;
}

/// A loose-object-only object store rooted at a repository's objects
/// directory.
pub struct LooseObjectDatabase {
    store: LooseObjectStore,
}

impl LooseObjectDatabase {
    pub fn open(objects_dir: impl AsRef<Path>, hash_algo: HashAlgorithm) -> Self {
        Self {
            store: LooseObjectStore::open(objects_dir, hash_algo),
        }
    }

    pub fn hash_algo(&self) -> HashAlgorithm {
        self.store.hash_algo()
    }

    pub fn objects_dir(&self) -> &Path {
        self.store.objects_dir()
    }

    pub fn iter_oids(&self) -> Result<LooseObjectIter, OdbError> {
        self.store.iter()
    }
}

impl ObjectStore for LooseObjectDatabase {
    fn open_object(&self, id: &ObjectId) -> Result<Object, OdbError> {
        self.store.read(id)
    }

    fn blob_create(&self, path: &Path) -> Result<ObjectId, OdbError> {
        let content = std::fs::read(path)?;
        self.store.write_raw(ObjectType::Blob, &content)
    }

    fn blob_create_from_bytes(&self, content: &[u8]) -> Result<ObjectId, OdbError> {
        self.store.write_raw(ObjectType::Blob, content)
    }

    fn tree_create(&self, mut entries: Vec<TreeEntry>) -> Result<ObjectId, OdbError> {
        entries.sort();
        let tree = Tree { entries };
        self.store.write(&Object::Tree(tree))
    }

    fn commit_create(
        &self,
        tree: ObjectId,
        parents: Vec<ObjectId>,
        author: Signature,
        committer: Signature,
        message: BString,
    ) -> Result<ObjectId, OdbError> {
        let commit = Commit {
            tree,
            parents,
            author,
            committer,
            encoding: None,
            gpgsig: None,
            extra_headers: Vec::new(),
            message,
        };
        self.store.write(&Object::Commit(commit))
    }

    fn contains(&self, id: &ObjectId) -> bool {
        self.store.contains(id)
    }
}

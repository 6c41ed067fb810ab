//! The file index: an ordered set of [`FileEntry`] records keyed by
//! work-tree-relative path, with a length-prefixed, versioned on-disk form
//! rewritten atomically through [`wt_utils::lockfile::LockFile`].

mod entry;
mod error;

use std::path::Path;

use bstr::{BStr, ByteSlice};

pub use entry::{FileEntry, FileType, StageCode, StatFingerprint};
pub use error::IndexError;

const MAGIC: &[u8; 4] = b"WTIX";
const FORMAT_VERSION: u32 = 1;

/// The in-memory file index, kept sorted by path for the deterministic
/// walks the status engine and tree diff driver rely on.
#[derive(Debug, Default)]
pub struct Index {
    entries: Vec<FileEntry>,
}

impl Index {
    /// An empty index, as produced by work-tree init or by reading a
    /// not-yet-created index file.
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Read the index from `path`. A missing file yields an empty index —
    /// the state of a freshly initialized work tree before its first
    /// checkout.
    pub fn read_from(path: impl AsRef<Path>) -> Result<Self, IndexError> {
        let data = match std::fs::read(path.as_ref()) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(e.into()),
        };
        Self::parse(&data)
    }

    fn parse(data: &[u8]) -> Result<Self, IndexError> {
        if data.len() < 12 || &data[0..4] != MAGIC {
            return Err(IndexError::Corrupt("bad magic".into()));
        }
        let version = u32::from_be_bytes(data[4..8].try_into().unwrap());
        if version != FORMAT_VERSION {
            return Err(IndexError::UnsupportedVersion(version));
        }
        let count = u32::from_be_bytes(data[8..12].try_into().unwrap()) as usize;
        let mut cursor = 12;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            entries.push(FileEntry::decode(data, &mut cursor)?);
        }
        if cursor != data.len() {
            return Err(IndexError::Corrupt("trailing bytes after last entry".into()));
        }
        Ok(Self { entries })
    }

    /// Write the index to `path`, via a temp file in the same directory
    /// followed by an atomic rename.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), IndexError> {
        let path = path.as_ref();
        let mut lock = wt_utils::lockfile::LockFile::acquire(path).map_err(|_| IndexError::LockFailed {
            path: path.to_path_buf(),
        })?;

        let mut buf = Vec::new();
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&FORMAT_VERSION.to_be_bytes());
        buf.extend_from_slice(&(self.entries.len() as u32).to_be_bytes());
        for entry in &self.entries {
            entry.encode(&mut buf);
        }

        use std::io::Write;
        lock.write_all(&buf)?;
        lock.commit().map_err(|_| IndexError::LockFailed {
            path: path.to_path_buf(),
        })?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up the entry for `path`, if tracked.
    pub fn get(&self, path: &BStr) -> Option<&FileEntry> {
        self.binary_search(path).ok().map(|i| &self.entries[i])
    }

    pub fn get_mut(&mut self, path: &BStr) -> Option<&mut FileEntry> {
        match self.binary_search(path) {
            Ok(i) => Some(&mut self.entries[i]),
            Err(_) => None,
        }
    }

    pub fn contains(&self, path: &BStr) -> bool {
        self.binary_search(path).is_ok()
    }

    /// Insert `entry`, replacing any existing entry at the same path and
    /// keeping the index sorted.
    pub fn add(&mut self, entry: FileEntry) {
        match self.binary_search(entry.path.as_bstr()) {
            Ok(i) => self.entries[i] = entry,
            Err(i) => self.entries.insert(i, entry),
        }
    }

    /// Remove the entry for `path`. Returns it if it was present.
    pub fn remove(&mut self, path: &BStr) -> Option<FileEntry> {
        match self.binary_search(path) {
            Ok(i) => Some(self.entries.remove(i)),
            Err(_) => None,
        }
    }

    /// Mark `path` as deleted from disk without removing it from the index,
    /// for journaled deletions (e.g. mid-checkout).
    pub fn mark_deleted_from_disk(&mut self, path: &BStr) -> bool {
        match self.get_mut(path) {
            Some(entry) => {
                entry.deleted_from_disk = true;
                true
            }
            None => false,
        }
    }

    /// Set the staged blob id and stage code for `path`. No-op (returns
    /// `false`) if the path is not tracked.
    pub fn set_stage(&mut self, path: &BStr, staged_blob_id: Option<wt_hash::ObjectId>, stage: StageCode) -> bool {
        match self.get_mut(path) {
            Some(entry) => {
                entry.staged_blob_id = staged_blob_id;
                entry.stage = stage;
                true
            }
            None => false,
        }
    }

    /// Refresh the cached stat fingerprint and matched blob/commit ids for
    /// `path` after a successful compare or checkout.
    pub fn update(
        &mut self,
        path: &BStr,
        stat: StatFingerprint,
        blob_id: Option<wt_hash::ObjectId>,
        commit_id: Option<wt_hash::ObjectId>,
    ) -> bool {
        match self.get_mut(path) {
            Some(entry) => {
                entry.stat = stat;
                entry.blob_id = blob_id;
                entry.commit_id = commit_id;
                true
            }
            None => false,
        }
    }

    /// Iterate all entries in path order.
    pub fn iter(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries.iter()
    }

    /// The sorted entries as a slice, for callers (the tree diff driver)
    /// that need to scope and group a borrowed view rather than iterate.
    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    /// Iterate over a snapshot of the current paths, suitable for loops
    /// that call back into `remove`/`update` on this index — out-of-date
    /// checks and base-commit bumping both rely on this tolerating removal
    /// mid-iteration.
    pub fn iter_paths_snapshot(&self) -> Vec<bstr::BString> {
        self.entries.iter().map(|e| e.path.clone()).collect()
    }

    fn binary_search(&self, path: &BStr) -> Result<usize, usize> {
        self.entries.binary_search_by(|e| e.path.as_bstr().cmp(path))
    }
}

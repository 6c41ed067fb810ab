//! A single file entry and its constituent value types.

use bstr::{BString, ByteSlice};
use wt_hash::ObjectId;

/// Cached stat fingerprint used to short-circuit content comparison.
///
/// Deliberately narrower than a raw `stat(2)` snapshot: only the fields the
/// status engine actually compares (ctime, mtime, size, executable bit) are
/// kept. Device/inode/uid/gid are not part of this design's staleness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatFingerprint {
    pub ctime_secs: i64,
    pub ctime_nsecs: u32,
    pub mtime_secs: i64,
    pub mtime_nsecs: u32,
    pub size: u64,
    pub executable: bool,
}

impl StatFingerprint {
    #[cfg(unix)]
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            ctime_secs: meta.ctime(),
            ctime_nsecs: meta.ctime_nsec() as u32,
            mtime_secs: meta.mtime(),
            mtime_nsecs: meta.mtime_nsec() as u32,
            size: meta.len(),
            executable: meta.mode() & 0o111 != 0,
        }
    }

    #[cfg(not(unix))]
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .unwrap_or_default();
        Self {
            ctime_secs: mtime.as_secs() as i64,
            ctime_nsecs: mtime.subsec_nanos(),
            mtime_secs: mtime.as_secs() as i64,
            mtime_nsecs: mtime.subsec_nanos(),
            size: meta.len(),
            executable: false,
        }
    }

    /// Whether `self` still looks like the same file as `other`.
    pub fn matches(&self, other: &StatFingerprint) -> bool {
        self.size == other.size
            && self.mtime_secs == other.mtime_secs
            && self.mtime_nsecs == other.mtime_nsecs
            && self.ctime_secs == other.ctime_secs
            && self.ctime_nsecs == other.ctime_nsecs
            && self.executable == other.executable
    }
}

/// What the staged change (if any) for an entry amounts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StageCode {
    #[default]
    None,
    Add,
    Modify,
    Delete,
}

impl StageCode {
    fn as_u8(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Add => 1,
            Self::Modify => 2,
            Self::Delete => 3,
        }
    }

    fn from_u8(n: u8) -> Option<Self> {
        match n {
            0 => Some(Self::None),
            1 => Some(Self::Add),
            2 => Some(Self::Modify),
            3 => Some(Self::Delete),
            _ => None,
        }
    }
}

/// What kind of on-disk object this entry was last installed as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileType {
    #[default]
    Regular,
    Symlink,
    /// A symlink blob whose target was unsafe or too long, installed as a
    /// regular file holding the link-target bytes instead.
    BadSymlink,
}

impl FileType {
    fn as_u8(self) -> u8 {
        match self {
            Self::Regular => 0,
            Self::Symlink => 1,
            Self::BadSymlink => 2,
        }
    }

    fn from_u8(n: u8) -> Option<Self> {
        match n {
            0 => Some(Self::Regular),
            1 => Some(Self::Symlink),
            2 => Some(Self::BadSymlink),
            _ => None,
        }
    }
}

/// One tracked path and everything the engine needs to know about it
/// without touching the filesystem or the object store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: BString,
    pub stat: StatFingerprint,
    /// Content hash this entry last matched in the repository, if any.
    pub blob_id: Option<ObjectId>,
    /// Commit whose tree `blob_id` came from.
    pub commit_id: Option<ObjectId>,
    pub staged_blob_id: Option<ObjectId>,
    pub stage: StageCode,
    pub file_type: FileType,
    /// Set during journaled deletions: the path is gone from disk but the
    /// entry hasn't been removed from the index yet.
    pub deleted_from_disk: bool,
}

impl FileEntry {
    pub fn new(path: impl Into<BString>) -> Self {
        Self {
            path: path.into(),
            stat: StatFingerprint::default(),
            blob_id: None,
            commit_id: None,
            staged_blob_id: None,
            stage: StageCode::None,
            file_type: FileType::Regular,
            deleted_from_disk: false,
        }
    }

    pub(crate) fn encode(&self, buf: &mut Vec<u8>) {
        let path_bytes = self.path.as_bytes();
        buf.extend_from_slice(&(path_bytes.len() as u32).to_be_bytes());
        buf.extend_from_slice(path_bytes);

        buf.extend_from_slice(&self.stat.ctime_secs.to_be_bytes());
        buf.extend_from_slice(&self.stat.ctime_nsecs.to_be_bytes());
        buf.extend_from_slice(&self.stat.mtime_secs.to_be_bytes());
        buf.extend_from_slice(&self.stat.mtime_nsecs.to_be_bytes());
        buf.extend_from_slice(&self.stat.size.to_be_bytes());
        buf.push(self.stat.executable as u8);

        encode_oid(buf, self.blob_id);
        encode_oid(buf, self.commit_id);
        encode_oid(buf, self.staged_blob_id);

        buf.push(self.stage.as_u8());
        buf.push(self.file_type.as_u8());
        buf.push(self.deleted_from_disk as u8);
    }

    pub(crate) fn decode(data: &[u8], cursor: &mut usize) -> Result<Self, crate::IndexError> {
        let path_len = read_u32(data, cursor)? as usize;
        let path_bytes = read_bytes(data, cursor, path_len)?;
        let path = BString::from(path_bytes.to_vec());

        let ctime_secs = read_i64(data, cursor)?;
        let ctime_nsecs = read_u32(data, cursor)?;
        let mtime_secs = read_i64(data, cursor)?;
        let mtime_nsecs = read_u32(data, cursor)?;
        let size = read_u64(data, cursor)?;
        let executable = read_u8(data, cursor)? != 0;

        let blob_id = decode_oid(data, cursor)?;
        let commit_id = decode_oid(data, cursor)?;
        let staged_blob_id = decode_oid(data, cursor)?;

        let stage = StageCode::from_u8(read_u8(data, cursor)?)
            .ok_or_else(|| crate::IndexError::Corrupt("invalid stage code".into()))?;
        let file_type = FileType::from_u8(read_u8(data, cursor)?)
            .ok_or_else(|| crate::IndexError::Corrupt("invalid file type".into()))?;
        let deleted_from_disk = read_u8(data, cursor)? != 0;

        Ok(Self {
            path,
            stat: StatFingerprint {
                ctime_secs,
                ctime_nsecs,
                mtime_secs,
                mtime_nsecs,
                size,
                executable,
            },
            blob_id,
            commit_id,
            staged_blob_id,
            stage,
            file_type,
            deleted_from_disk,
        })
    }
}

fn encode_oid(buf: &mut Vec<u8>, oid: Option<ObjectId>) {
    match oid {
        None => buf.push(0),
        Some(oid) => {
            let bytes = oid.as_bytes();
            buf.push(bytes.len() as u8);
            buf.extend_from_slice(bytes);
        }
    }
}

fn decode_oid(data: &[u8], cursor: &mut usize) -> Result<Option<ObjectId>, crate::IndexError> {
    let len = read_u8(data, cursor)? as usize;
    if len == 0 {
        return Ok(None);
    }
    let bytes = read_bytes(data, cursor, len)?;
    let algo = wt_hash::HashAlgorithm::from_digest_len(len)
        .ok_or_else(|| crate::IndexError::Corrupt(format!("unsupported oid length {len}")))?;
    Ok(Some(ObjectId::from_bytes(bytes, algo)?))
}

fn read_bytes<'a>(data: &'a [u8], cursor: &mut usize, len: usize) -> Result<&'a [u8], crate::IndexError> {
    let end = cursor.checked_add(len).ok_or_else(|| crate::IndexError::Corrupt("entry overflow".into()))?;
    let slice = data
        .get(*cursor..end)
        .ok_or_else(|| crate::IndexError::Corrupt("entry truncated".into()))?;
    *cursor = end;
    Ok(slice)
}

fn read_u8(data: &[u8], cursor: &mut usize) -> Result<u8, crate::IndexError> {
    Ok(read_bytes(data, cursor, 1)?[0])
}

fn read_u32(data: &[u8], cursor: &mut usize) -> Result<u32, crate::IndexError> {
    let bytes = read_bytes(data, cursor, 4)?;
    Ok(u32::from_be_bytes(bytes.try_into().unwrap()))
}

fn read_u64(data: &[u8], cursor: &mut usize) -> Result<u64, crate::IndexError> {
    let bytes = read_bytes(data, cursor, 8)?;
    Ok(u64::from_be_bytes(bytes.try_into().unwrap()))
}

fn read_i64(data: &[u8], cursor: &mut usize) -> Result<i64, crate::IndexError> {
    let bytes = read_bytes(data, cursor, 8)?;
    Ok(i64::from_be_bytes(bytes.try_into().unwrap()))
}

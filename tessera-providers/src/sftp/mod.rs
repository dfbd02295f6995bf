// SPDX-License-Identifier: AGPL-3.0-or-later
//! SFTP storage backend
//!
//! Items live on a remote file system reached through SFTP sessions. Every
//! session capability the adapter needs is expressed by [`SftpSession`], so
//! the same adapter runs over a real SSH channel ([`ssh::SshConnector`], feature
//! `ssh2`) or a local directory tree ([`local::LocalConnector`]).

use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use tessera_core::NativeResult;

pub mod adapter;
#[cfg(feature = "local")]
pub mod local;
pub mod mapper;
#[cfg(feature = "ssh2")]
pub mod ssh;

pub use adapter::{SftpDataAdapter, SftpFactory};
#[cfg(feature = "local")]
pub use local::{LocalConnector, LocalSession};
pub use mapper::SftpIdMapper;
#[cfg(feature = "ssh2")]
pub use ssh::{SshAuth, SshConnector, SshSession};

pub use tessera_core::stream::BLOCK_SIZE;

/// rwxrws--T: group-writable, setgid so new items inherit the group, sticky
pub const DEFAULT_DIRECTORY_PERMISSIONS: u32 = 0o3770;

/// rw-rw----
pub const DEFAULT_FILE_PERMISSIONS: u32 = 0o660;

const S_IFMT: u32 = 0o170000;
const S_IFDIR: u32 = 0o040000;
const S_IFREG: u32 = 0o100000;
const S_IFLNK: u32 = 0o120000;

/// Remote path as raw bytes. SFTP servers are free to return names that are
/// not valid UTF-8.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SftpPath(Vec<u8>);

impl SftpPath {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Last path component.
    pub fn file_name(&self) -> &[u8] {
        let trimmed = match self.0.iter().rposition(|&b| b != b'/') {
            Some(end) => &self.0[..=end],
            None => return &[],
        };
        match trimmed.iter().rposition(|&b| b == b'/') {
            Some(slash) => &trimmed[slash + 1..],
            None => trimmed,
        }
    }

    #[cfg(unix)]
    pub fn to_path_buf(&self) -> PathBuf {
        use std::os::unix::ffi::OsStrExt;
        PathBuf::from(std::ffi::OsStr::from_bytes(&self.0))
    }

    #[cfg(not(unix))]
    pub fn to_path_buf(&self) -> PathBuf {
        PathBuf::from(String::from_utf8_lossy(&self.0).into_owned())
    }
}

impl fmt::Display for SftpPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for SftpPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SftpPath({:?})", String::from_utf8_lossy(&self.0))
    }
}

impl From<&str> for SftpPath {
    fn from(path: &str) -> Self {
        Self(path.as_bytes().to_vec())
    }
}

/// File attributes as reported by `stat`/`readdir`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileAttributes {
    pub size: Option<u64>,
    /// Full `st_mode`, including the file type bits
    pub permissions: Option<u32>,
    pub mtime: Option<u64>,
}

impl FileAttributes {
    pub fn directory(mode: u32) -> Self {
        Self { permissions: Some(S_IFDIR | (mode & 0o7777)), ..Default::default() }
    }

    pub fn file(mode: u32, size: u64) -> Self {
        Self { permissions: Some(S_IFREG | (mode & 0o7777)), size: Some(size), ..Default::default() }
    }

    /// Attributes of a symbolic link itself, as reported by `lstat`.
    pub fn symlink() -> Self {
        Self { permissions: Some(S_IFLNK | 0o777), ..Default::default() }
    }

    fn file_type(&self) -> Option<u32> {
        self.permissions.map(|mode| mode & S_IFMT)
    }

    pub fn is_dir(&self) -> bool {
        self.file_type() == Some(S_IFDIR)
    }

    pub fn is_file(&self) -> bool {
        self.file_type() == Some(S_IFREG)
    }

    pub fn is_symlink(&self) -> bool {
        self.file_type() == Some(S_IFLNK)
    }
}

/// One `readdir` result
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub filename: Vec<u8>,
    pub attributes: FileAttributes,
}

impl DirEntry {
    /// `.` and `..`, which some servers include in listings.
    pub fn is_self_or_parent(&self) -> bool {
        self.filename == b"." || self.filename == b".."
    }
}

/// SFTP capabilities a connection must offer.
#[async_trait]
pub trait SftpSession: Send {
    type File: RemoteFile;

    /// Attributes of `path`, following symbolic links.
    async fn stat(&mut self, path: &SftpPath) -> NativeResult<FileAttributes>;

    /// Attributes of `path` itself; a symbolic link is reported as a link.
    async fn lstat(&mut self, path: &SftpPath) -> NativeResult<FileAttributes>;

    async fn list_dir(&mut self, path: &SftpPath) -> NativeResult<Vec<DirEntry>>;

    async fn mkdir(&mut self, path: &SftpPath, mode: u32) -> NativeResult<()>;

    /// Remove an empty directory.
    async fn rmdir(&mut self, path: &SftpPath) -> NativeResult<()>;

    /// Remove a file.
    async fn remove(&mut self, path: &SftpPath) -> NativeResult<()>;

    async fn rename(&mut self, from: &SftpPath, to: &SftpPath) -> NativeResult<()>;

    async fn chmod(&mut self, path: &SftpPath, mode: u32) -> NativeResult<()>;

    async fn open_read(&mut self, path: &SftpPath) -> NativeResult<Self::File>;

    /// Open for writing, creating or truncating.
    async fn open_write(&mut self, path: &SftpPath) -> NativeResult<Self::File>;
}

/// Open remote file handle
#[async_trait]
pub trait RemoteFile: Send {
    /// Read up to `buf.len()` bytes; `0` means end of file.
    async fn read(&mut self, buf: &mut [u8]) -> NativeResult<usize>;

    async fn write_all(&mut self, data: &[u8]) -> NativeResult<()>;

    async fn flush(&mut self) -> NativeResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type_bits() {
        let dir = FileAttributes::directory(DEFAULT_DIRECTORY_PERMISSIONS);
        assert!(dir.is_dir());
        assert!(!dir.is_file());
        assert_eq!(dir.permissions, Some(0o043770));

        let file = FileAttributes::file(DEFAULT_FILE_PERMISSIONS, 12);
        assert!(file.is_file());
        assert!(!file.is_dir());

        let link = FileAttributes::symlink();
        assert_eq!(link.permissions, Some(0o120777));
        assert!(link.is_symlink());
        assert!(!link.is_dir());

        assert!(!FileAttributes::default().is_dir());
    }

    #[test]
    fn test_path_file_name() {
        assert_eq!(SftpPath::from("/srv/data/a.txt").file_name(), b"a.txt");
        assert_eq!(SftpPath::from("/srv/data/").file_name(), b"data");
        assert_eq!(SftpPath::from("plain").file_name(), b"plain");
        assert_eq!(SftpPath::from("/").file_name(), b"");
    }

    #[test]
    fn test_path_display_is_lossy() {
        let path = SftpPath::new(vec![b'/', b'a', 0xfe]);
        assert_eq!(path.to_string(), "/a\u{fffd}");
    }

    #[test]
    fn test_dot_entries() {
        let entry = |name: &[u8]| DirEntry { filename: name.to_vec(), attributes: FileAttributes::default() };
        assert!(entry(b".").is_self_or_parent());
        assert!(entry(b"..").is_self_or_parent());
        assert!(!entry(b"...").is_self_or_parent());
    }
}

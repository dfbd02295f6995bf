// SPDX-License-Identifier: AGPL-3.0-or-later
//! Local directory tree exposed through the SFTP session capabilities

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tessera_core::{ConnectionFactory, NativeError, NativeResult, PersistenceError, PersistenceResult};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::{DirEntry, FileAttributes, RemoteFile, SftpPath, SftpSession};

/// Opens sessions rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalConnector {
    root: PathBuf,
}

impl LocalConnector {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ConnectionFactory for LocalConnector {
    type Connection = LocalSession;

    async fn create_connection(&self) -> PersistenceResult<LocalSession> {
        let endpoint = self.root.display().to_string();
        let meta = fs::metadata(&self.root)
            .await
            .map_err(|e| PersistenceError::connection(&endpoint, NativeError::from_io(e, &endpoint)))?;
        if !meta.is_dir() {
            return Err(PersistenceError::Configuration(format!("'{}' is not a directory", endpoint)));
        }
        Ok(LocalSession { root: self.root.clone() })
    }
}

/// Session over a local directory. Remote paths are interpreted relative to
/// the connector root.
#[derive(Debug)]
pub struct LocalSession {
    root: PathBuf,
}

impl LocalSession {
    fn resolve(&self, path: &SftpPath) -> PathBuf {
        let bytes = path.as_bytes();
        let start = bytes.iter().position(|&b| b != b'/').unwrap_or(bytes.len());
        let relative = SftpPath::new(&bytes[start..]);
        if relative.as_bytes().is_empty() {
            self.root.clone()
        } else {
            self.root.join(relative.to_path_buf())
        }
    }
}

fn native(path: &SftpPath) -> impl FnOnce(std::io::Error) -> NativeError + '_ {
    move |e| NativeError::from_io(e, path.to_string())
}

#[cfg(unix)]
fn attributes(meta: &std::fs::Metadata) -> FileAttributes {
    use std::os::unix::fs::MetadataExt;
    FileAttributes {
        size: Some(meta.len()),
        permissions: Some(meta.mode()),
        mtime: modified_secs(meta),
    }
}

#[cfg(not(unix))]
fn attributes(meta: &std::fs::Metadata) -> FileAttributes {
    let mut attrs = if meta.file_type().is_symlink() {
        FileAttributes::symlink()
    } else if meta.is_dir() {
        FileAttributes::directory(0o755)
    } else {
        FileAttributes::file(0o644, meta.len())
    };
    attrs.mtime = modified_secs(meta);
    attrs
}

fn modified_secs(meta: &std::fs::Metadata) -> Option<u64> {
    meta.modified()
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|age| age.as_secs())
}

#[cfg(unix)]
fn file_name_bytes(name: &std::ffi::OsStr) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    name.as_bytes().to_vec()
}

#[cfg(not(unix))]
fn file_name_bytes(name: &std::ffi::OsStr) -> Vec<u8> {
    name.to_string_lossy().into_owned().into_bytes()
}

#[async_trait]
impl SftpSession for LocalSession {
    type File = LocalFile;

    async fn stat(&mut self, path: &SftpPath) -> NativeResult<FileAttributes> {
        let meta = fs::metadata(self.resolve(path)).await.map_err(native(path))?;
        Ok(attributes(&meta))
    }

    async fn lstat(&mut self, path: &SftpPath) -> NativeResult<FileAttributes> {
        let meta = fs::symlink_metadata(self.resolve(path)).await.map_err(native(path))?;
        Ok(attributes(&meta))
    }

    async fn list_dir(&mut self, path: &SftpPath) -> NativeResult<Vec<DirEntry>> {
        let mut reader = fs::read_dir(self.resolve(path)).await.map_err(native(path))?;
        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await.map_err(native(path))? {
            let meta = entry.metadata().await.map_err(native(path))?;
            entries.push(DirEntry {
                filename: file_name_bytes(&entry.file_name()),
                attributes: attributes(&meta),
            });
        }
        Ok(entries)
    }

    async fn mkdir(&mut self, path: &SftpPath, _mode: u32) -> NativeResult<()> {
        fs::create_dir(self.resolve(path)).await.map_err(native(path))
    }

    async fn rmdir(&mut self, path: &SftpPath) -> NativeResult<()> {
        fs::remove_dir(self.resolve(path)).await.map_err(native(path))
    }

    async fn remove(&mut self, path: &SftpPath) -> NativeResult<()> {
        fs::remove_file(self.resolve(path)).await.map_err(native(path))
    }

    async fn rename(&mut self, from: &SftpPath, to: &SftpPath) -> NativeResult<()> {
        fs::rename(self.resolve(from), self.resolve(to)).await.map_err(native(from))
    }

    #[cfg(unix)]
    async fn chmod(&mut self, path: &SftpPath, mode: u32) -> NativeResult<()> {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(self.resolve(path), std::fs::Permissions::from_mode(mode))
            .await
            .map_err(native(path))
    }

    #[cfg(not(unix))]
    async fn chmod(&mut self, path: &SftpPath, _mode: u32) -> NativeResult<()> {
        fs::metadata(self.resolve(path)).await.map(|_| ()).map_err(native(path))
    }

    async fn open_read(&mut self, path: &SftpPath) -> NativeResult<LocalFile> {
        let file = fs::File::open(self.resolve(path)).await.map_err(native(path))?;
        Ok(LocalFile { file })
    }

    async fn open_write(&mut self, path: &SftpPath) -> NativeResult<LocalFile> {
        let file = fs::File::create(self.resolve(path)).await.map_err(native(path))?;
        Ok(LocalFile { file })
    }
}

/// Open local file
#[derive(Debug)]
pub struct LocalFile {
    file: fs::File,
}

#[async_trait]
impl RemoteFile for LocalFile {
    async fn read(&mut self, buf: &mut [u8]) -> NativeResult<usize> {
        Ok(self.file.read(buf).await?)
    }

    async fn write_all(&mut self, data: &[u8]) -> NativeResult<()> {
        Ok(self.file.write_all(data).await?)
    }

    async fn flush(&mut self) -> NativeResult<()> {
        Ok(self.file.flush().await?)
    }
}

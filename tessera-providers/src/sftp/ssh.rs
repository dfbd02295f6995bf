// SPDX-License-Identifier: AGPL-3.0-or-later
//! SFTP sessions over SSH
//!
//! Uses the `ssh2` crate (libssh2). Its calls block, so every one of them runs
//! on tokio's blocking thread pool.

use async_trait::async_trait;
use parking_lot::Mutex;
use ssh2::{ErrorCode, FileStat, Session, Sftp};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::PathBuf;
use std::sync::Arc;
use tessera_core::{
    ConnectionFactory, Configuration, NativeError, NativeResult, PersistenceError, PersistenceResult,
};

use super::{DirEntry, FileAttributes, RemoteFile, SftpPath, SftpSession};

const DEFAULT_PORT: u16 = 22;

// SFTP status codes (draft-ietf-secsh-filexfer-02)
const FX_NO_SUCH_FILE: i32 = 2;
const FX_NO_CONNECTION: i32 = 6;
const FX_CONNECTION_LOST: i32 = 7;
const FX_NO_SUCH_PATH: i32 = 10;

// libssh2 transport error codes
const LIBSSH2_ERROR_SOCKET_SEND: i32 = -7;
const LIBSSH2_ERROR_TIMEOUT: i32 = -9;
const LIBSSH2_ERROR_SOCKET_DISCONNECT: i32 = -13;
const LIBSSH2_ERROR_SOCKET_TIMEOUT: i32 = -30;
const LIBSSH2_ERROR_SOCKET_RECV: i32 = -43;

/// SSH authentication method
#[derive(Clone)]
pub enum SshAuth {
    Password(String),
    PrivateKey {
        private_key_path: PathBuf,
        passphrase: Option<String>,
    },
    Agent,
}

impl std::fmt::Debug for SshAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SshAuth::Password(_) => f.write_str("Password(<redacted>)"),
            SshAuth::PrivateKey { private_key_path, .. } => {
                f.debug_struct("PrivateKey").field("private_key_path", private_key_path).finish()
            }
            SshAuth::Agent => f.write_str("Agent"),
        }
    }
}

/// Opens authenticated SFTP sessions to one server.
#[derive(Debug, Clone)]
pub struct SshConnector {
    host: String,
    port: u16,
    username: String,
    auth: SshAuth,
}

impl SshConnector {
    pub fn new(host: impl Into<String>, port: u16, username: impl Into<String>, auth: SshAuth) -> Self {
        Self { host: host.into(), port, username: username.into(), auth }
    }

    /// Password authentication when the configuration carries a password,
    /// the SSH agent otherwise.
    pub fn from_config(config: &Configuration) -> PersistenceResult<Self> {
        let host = config.require_host()?;
        let username = config
            .username
            .clone()
            .ok_or_else(|| PersistenceError::Configuration("SFTP requires a username".into()))?;
        let auth = match &config.password {
            Some(password) => SshAuth::Password(password.clone()),
            None => SshAuth::Agent,
        };
        Ok(Self::new(host, config.port.unwrap_or(DEFAULT_PORT), username, auth))
    }

    pub fn endpoint(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }

    fn connect_blocking(&self) -> NativeResult<SshSession> {
        let endpoint = format!("{}:{}", self.host, self.port);
        let tcp = TcpStream::connect((self.host.as_str(), self.port))
            .map_err(|e| NativeError::from_io(e, &endpoint))?;

        let mut session = Session::new().map_err(native)?;
        session.set_tcp_stream(tcp);
        session.handshake().map_err(native)?;

        match &self.auth {
            SshAuth::Password(password) => session.userauth_password(&self.username, password),
            SshAuth::PrivateKey { private_key_path, passphrase } => {
                session.userauth_pubkey_file(&self.username, None, private_key_path, passphrase.as_deref())
            }
            SshAuth::Agent => session.userauth_agent(&self.username),
        }
        .map_err(native)?;

        let sftp = session.sftp().map_err(native)?;
        Ok(SshSession { sftp: Arc::new(Mutex::new(sftp)), _session: session })
    }
}

#[async_trait]
impl ConnectionFactory for SshConnector {
    type Connection = SshSession;

    async fn create_connection(&self) -> PersistenceResult<SshSession> {
        let connector = self.clone();
        let endpoint = self.endpoint();
        tracing::debug!(%endpoint, "opening SFTP session");
        run_blocking(move || connector.connect_blocking())
            .await
            .map_err(|e| PersistenceError::connection(endpoint, e))
    }
}

/// Translate a libssh2 error into the native vocabulary.
fn native(err: ssh2::Error) -> NativeError {
    let message = err.message().to_string();
    match err.code() {
        ErrorCode::SFTP(FX_NO_SUCH_FILE | FX_NO_SUCH_PATH) => NativeError::NotFound(message),
        ErrorCode::SFTP(FX_NO_CONNECTION | FX_CONNECTION_LOST) => NativeError::ConnectionLost(message),
        ErrorCode::SFTP(code) => NativeError::Status { code: code as u32, message },
        ErrorCode::Session(
            LIBSSH2_ERROR_SOCKET_SEND
            | LIBSSH2_ERROR_TIMEOUT
            | LIBSSH2_ERROR_SOCKET_DISCONNECT
            | LIBSSH2_ERROR_SOCKET_TIMEOUT
            | LIBSSH2_ERROR_SOCKET_RECV,
        ) => NativeError::ConnectionLost(message),
        ErrorCode::Session(code) => NativeError::Other(format!("SSH error {}: {}", code, message)),
    }
}

async fn run_blocking<T, F>(op: F) -> NativeResult<T>
where
    F: FnOnce() -> NativeResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| NativeError::Other(format!("SFTP worker failed: {}", e)))?
}

/// `readdir` joins each name onto the directory; only the name is wanted.
#[cfg(unix)]
fn entry_name(path: &std::path::Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    path.file_name().map(|name| name.as_bytes().to_vec()).unwrap_or_default()
}

#[cfg(not(unix))]
fn entry_name(path: &std::path::Path) -> Vec<u8> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned().into_bytes())
        .unwrap_or_default()
}

fn attributes(stat: &FileStat) -> FileAttributes {
    FileAttributes { size: stat.size, permissions: stat.perm, mtime: stat.mtime }
}

/// Authenticated SFTP channel. The SSH session is kept alive alongside it.
pub struct SshSession {
    sftp: Arc<Mutex<Sftp>>,
    _session: Session,
}

impl SshSession {
    async fn call<T, F>(&self, op: F) -> NativeResult<T>
    where
        F: FnOnce(&Sftp) -> Result<T, ssh2::Error> + Send + 'static,
        T: Send + 'static,
    {
        let sftp = self.sftp.clone();
        run_blocking(move || op(&sftp.lock()).map_err(native)).await
    }
}

#[async_trait]
impl SftpSession for SshSession {
    type File = SshFile;

    async fn stat(&mut self, path: &SftpPath) -> NativeResult<FileAttributes> {
        let path = path.to_path_buf();
        let stat = self.call(move |sftp| sftp.stat(&path)).await?;
        Ok(attributes(&stat))
    }

    async fn lstat(&mut self, path: &SftpPath) -> NativeResult<FileAttributes> {
        let path = path.to_path_buf();
        let stat = self.call(move |sftp| sftp.lstat(&path)).await?;
        Ok(attributes(&stat))
    }

    async fn list_dir(&mut self, path: &SftpPath) -> NativeResult<Vec<DirEntry>> {
        let dir = path.clone();
        let listing = self.call(move |sftp| sftp.readdir(&dir.to_path_buf())).await?;
        Ok(listing
            .into_iter()
            .map(|(entry, stat)| DirEntry {
                filename: entry_name(&entry),
                attributes: attributes(&stat),
            })
            .collect())
    }

    async fn mkdir(&mut self, path: &SftpPath, mode: u32) -> NativeResult<()> {
        let path = path.to_path_buf();
        self.call(move |sftp| sftp.mkdir(&path, mode as i32)).await
    }

    async fn rmdir(&mut self, path: &SftpPath) -> NativeResult<()> {
        let path = path.to_path_buf();
        self.call(move |sftp| sftp.rmdir(&path)).await
    }

    async fn remove(&mut self, path: &SftpPath) -> NativeResult<()> {
        let path = path.to_path_buf();
        self.call(move |sftp| sftp.unlink(&path)).await
    }

    async fn rename(&mut self, from: &SftpPath, to: &SftpPath) -> NativeResult<()> {
        let (from, to) = (from.to_path_buf(), to.to_path_buf());
        self.call(move |sftp| sftp.rename(&from, &to, None)).await
    }

    async fn chmod(&mut self, path: &SftpPath, mode: u32) -> NativeResult<()> {
        let path = path.to_path_buf();
        let stat = FileStat { size: None, uid: None, gid: None, perm: Some(mode), atime: None, mtime: None };
        self.call(move |sftp| sftp.setstat(&path, stat)).await
    }

    async fn open_read(&mut self, path: &SftpPath) -> NativeResult<SshFile> {
        let path = path.to_path_buf();
        let file = self.call(move |sftp| sftp.open(&path)).await?;
        Ok(SshFile { file: Arc::new(Mutex::new(file)) })
    }

    async fn open_write(&mut self, path: &SftpPath) -> NativeResult<SshFile> {
        let path = path.to_path_buf();
        let file = self.call(move |sftp| sftp.create(&path)).await?;
        Ok(SshFile { file: Arc::new(Mutex::new(file)) })
    }
}

/// Remote file opened over an [`SshSession`]
pub struct SshFile {
    file: Arc<Mutex<ssh2::File>>,
}

#[async_trait]
impl RemoteFile for SshFile {
    async fn read(&mut self, buf: &mut [u8]) -> NativeResult<usize> {
        let file = self.file.clone();
        let capacity = buf.len();
        let block = run_blocking(move || {
            let mut block = vec![0u8; capacity];
            let read = file.lock().read(&mut block).map_err(|e| NativeError::from_io(e, "remote file"))?;
            block.truncate(read);
            Ok(block)
        })
        .await?;
        buf[..block.len()].copy_from_slice(&block);
        Ok(block.len())
    }

    async fn write_all(&mut self, data: &[u8]) -> NativeResult<()> {
        let file = self.file.clone();
        let data = data.to_vec();
        run_blocking(move || file.lock().write_all(&data).map_err(|e| NativeError::from_io(e, "remote file"))).await
    }

    async fn flush(&mut self) -> NativeResult<()> {
        let file = self.file.clone();
        run_blocking(move || file.lock().flush().map_err(|e| NativeError::from_io(e, "remote file"))).await
    }
}

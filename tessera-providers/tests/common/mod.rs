// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory SFTP server shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tessera_core::{
    stream::read_to_end, ConnectionFactory, ConnectionPool, DataStorer, Identifier, NativeError, NativeResult,
    PersistenceResult,
};
use tessera_providers::sftp::{DirEntry, FileAttributes, RemoteFile, SftpPath, SftpSession};
use tessera_providers::{SftpFactory, SftpIdMapper};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Dir { mode: u32 },
    File { mode: u32, data: Vec<u8> },
    Link { target: Vec<u8> },
}

/// Fault injected into the next call of one operation
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    ConnectionLost,
    PermissionDenied,
}

#[derive(Default)]
struct State {
    nodes: BTreeMap<Vec<u8>, Node>,
    log: Vec<String>,
    faults: Vec<(&'static str, Fault)>,
}

/// Shared file system plus the connector opening sessions on it.
#[derive(Clone)]
pub struct MemorySftp {
    state: Arc<Mutex<State>>,
    connections: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    latency: Option<Duration>,
}

impl MemorySftp {
    pub fn new() -> Self {
        let mut state = State::default();
        state.nodes.insert(b"/".to_vec(), Node::Dir { mode: 0o755 });
        Self {
            state: Arc::new(Mutex::new(state)),
            connections: Arc::new(AtomicUsize::new(0)),
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            latency: None,
        }
    }

    /// Every native call sleeps for `latency`, so concurrent callers overlap.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn factory(&self, max_connections: usize) -> SftpFactory<MemorySftp> {
        SftpFactory::new(ConnectionPool::new(self.clone(), max_connections), SftpIdMapper::default())
    }

    pub fn mkdir_p(&self, path: &str) {
        let mut state = self.state.lock();
        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(segment);
            state.nodes.entry(current.clone().into_bytes()).or_insert(Node::Dir { mode: 0o755 });
        }
    }

    pub fn put_file(&self, path: &str, data: &[u8]) {
        self.state
            .lock()
            .nodes
            .insert(path.as_bytes().to_vec(), Node::File { mode: 0o644, data: data.to_vec() });
    }

    pub fn put_link(&self, path: &str, target: &str) {
        self.state
            .lock()
            .nodes
            .insert(path.as_bytes().to_vec(), Node::Link { target: target.as_bytes().to_vec() });
    }

    pub fn put_raw_file(&self, path: Vec<u8>, data: &[u8]) {
        self.state.lock().nodes.insert(path, Node::File { mode: 0o644, data: data.to_vec() });
    }

    pub fn put_raw_dir(&self, path: Vec<u8>) {
        self.state.lock().nodes.insert(path, Node::Dir { mode: 0o755 });
    }

    pub fn node(&self, path: &str) -> Option<Node> {
        self.state.lock().nodes.get(path.as_bytes()).cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        self.state.lock().nodes.keys().map(|k| String::from_utf8_lossy(k).into_owned()).collect()
    }

    pub fn log(&self) -> Vec<String> {
        self.state.lock().log.clone()
    }

    pub fn clear_log(&self) {
        self.state.lock().log.clear();
    }

    pub fn fail_next(&self, operation: &'static str, fault: Fault) {
        self.state.lock().faults.push((operation, fault));
    }

    /// Sessions opened so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Highest number of native calls that were in flight at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionFactory for MemorySftp {
    type Connection = MemorySession;

    async fn create_connection(&self) -> PersistenceResult<MemorySession> {
        self.connections.fetch_add(1, Ordering::SeqCst);
        Ok(MemorySession { server: self.clone() })
    }
}

fn parent_of(path: &[u8]) -> Vec<u8> {
    match path.iter().rposition(|&b| b == b'/') {
        Some(0) | None => b"/".to_vec(),
        Some(slash) => path[..slash].to_vec(),
    }
}

fn name_of(path: &[u8]) -> Vec<u8> {
    match path.iter().rposition(|&b| b == b'/') {
        Some(slash) => path[slash + 1..].to_vec(),
        None => path.to_vec(),
    }
}

fn attributes(node: &Node) -> FileAttributes {
    match node {
        Node::Dir { mode } => FileAttributes::directory(*mode),
        Node::File { mode, data } => FileAttributes::file(*mode, data.len() as u64),
        Node::Link { .. } => FileAttributes::symlink(),
    }
}

/// Path with a final symbolic link replaced by its target.
fn follow(nodes: &BTreeMap<Vec<u8>, Node>, path: &[u8]) -> Vec<u8> {
    match nodes.get(path) {
        Some(Node::Link { target }) => target.clone(),
        _ => path.to_vec(),
    }
}

fn status(message: &str) -> NativeError {
    NativeError::Status { code: 4, message: message.to_string() }
}

pub struct MemorySession {
    server: MemorySftp,
}

impl MemorySession {
    /// Log the call, simulate latency and apply any pending fault.
    async fn enter(&self, operation: &'static str, path: &SftpPath) -> NativeResult<()> {
        let fault = {
            let mut state = self.server.state.lock();
            state.log.push(format!("{} {}", operation, path));
            let pending = state.faults.iter().position(|(op, _)| *op == operation);
            pending.map(|index| state.faults.remove(index).1)
        };

        let active = self.server.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.server.peak.fetch_max(active, Ordering::SeqCst);
        if let Some(latency) = self.server.latency {
            tokio::time::sleep(latency).await;
        }
        self.server.active.fetch_sub(1, Ordering::SeqCst);

        match fault {
            Some(Fault::ConnectionLost) => Err(NativeError::ConnectionLost(format!("{} {}", operation, path))),
            Some(Fault::PermissionDenied) => Err(NativeError::Status { code: 3, message: "Permission denied".into() }),
            None => Ok(()),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut BTreeMap<Vec<u8>, Node>) -> NativeResult<T>) -> NativeResult<T> {
        f(&mut self.server.state.lock().nodes)
    }
}

#[async_trait]
impl SftpSession for MemorySession {
    type File = MemoryFile;

    async fn stat(&mut self, path: &SftpPath) -> NativeResult<FileAttributes> {
        self.enter("stat", path).await?;
        self.with_state(|nodes| {
            let resolved = follow(nodes, path.as_bytes());
            nodes.get(&resolved).map(attributes).ok_or_else(|| NativeError::NotFound(path.to_string()))
        })
    }

    async fn lstat(&mut self, path: &SftpPath) -> NativeResult<FileAttributes> {
        self.enter("lstat", path).await?;
        self.with_state(|nodes| {
            nodes.get(path.as_bytes()).map(attributes).ok_or_else(|| NativeError::NotFound(path.to_string()))
        })
    }

    async fn list_dir(&mut self, path: &SftpPath) -> NativeResult<Vec<DirEntry>> {
        self.enter("list_dir", path).await?;
        self.with_state(|nodes| {
            let resolved = follow(nodes, path.as_bytes());
            match nodes.get(&resolved) {
                Some(Node::Dir { .. }) => {}
                Some(_) => return Err(status("not a directory")),
                None => return Err(NativeError::NotFound(path.to_string())),
            }
            let mut entries = vec![
                DirEntry { filename: b".".to_vec(), attributes: FileAttributes::directory(0o755) },
                DirEntry { filename: b"..".to_vec(), attributes: FileAttributes::directory(0o755) },
            ];
            for (key, node) in nodes.iter() {
                if *key != resolved && parent_of(key) == resolved {
                    entries.push(DirEntry { filename: name_of(key), attributes: attributes(node) });
                }
            }
            Ok(entries)
        })
    }

    async fn mkdir(&mut self, path: &SftpPath, mode: u32) -> NativeResult<()> {
        self.enter("mkdir", path).await?;
        self.with_state(|nodes| {
            if !matches!(nodes.get(&parent_of(path.as_bytes())), Some(Node::Dir { .. })) {
                return Err(NativeError::NotFound(path.to_string()));
            }
            if nodes.contains_key(path.as_bytes()) {
                return Err(status("file exists"));
            }
            // umask 022
            nodes.insert(path.as_bytes().to_vec(), Node::Dir { mode: mode & !0o022 });
            Ok(())
        })
    }

    async fn rmdir(&mut self, path: &SftpPath) -> NativeResult<()> {
        self.enter("rmdir", path).await?;
        self.with_state(|nodes| {
            match nodes.get(path.as_bytes()) {
                Some(Node::Dir { .. }) => {}
                Some(_) => return Err(status("not a directory")),
                None => return Err(NativeError::NotFound(path.to_string())),
            }
            if nodes.keys().any(|key| key.as_slice() != path.as_bytes() && parent_of(key) == path.as_bytes()) {
                return Err(status("directory not empty"));
            }
            nodes.remove(path.as_bytes());
            Ok(())
        })
    }

    async fn remove(&mut self, path: &SftpPath) -> NativeResult<()> {
        self.enter("remove", path).await?;
        self.with_state(|nodes| match nodes.get(path.as_bytes()) {
            Some(Node::File { .. }) | Some(Node::Link { .. }) => {
                nodes.remove(path.as_bytes());
                Ok(())
            }
            Some(_) => Err(status("is a directory")),
            None => Err(NativeError::NotFound(path.to_string())),
        })
    }

    async fn rename(&mut self, from: &SftpPath, to: &SftpPath) -> NativeResult<()> {
        self.enter("rename", from).await?;
        self.with_state(|nodes| {
            if !nodes.contains_key(from.as_bytes()) {
                return Err(NativeError::NotFound(from.to_string()));
            }
            let mut prefix = from.as_bytes().to_vec();
            prefix.push(b'/');
            let moved: Vec<Vec<u8>> = nodes
                .keys()
                .filter(|key| key.as_slice() == from.as_bytes() || key.starts_with(&prefix))
                .cloned()
                .collect();
            for key in moved {
                if let Some(node) = nodes.remove(&key) {
                    let mut target = to.as_bytes().to_vec();
                    target.extend_from_slice(&key[from.as_bytes().len()..]);
                    nodes.insert(target, node);
                }
            }
            Ok(())
        })
    }

    async fn chmod(&mut self, path: &SftpPath, mode: u32) -> NativeResult<()> {
        self.enter("chmod", path).await?;
        self.with_state(|nodes| match nodes.get_mut(path.as_bytes()) {
            Some(Node::Dir { mode: current }) | Some(Node::File { mode: current, .. }) => {
                *current = mode;
                Ok(())
            }
            Some(Node::Link { .. }) => Err(status("operation not supported on links")),
            None => Err(NativeError::NotFound(path.to_string())),
        })
    }

    async fn open_read(&mut self, path: &SftpPath) -> NativeResult<MemoryFile> {
        self.enter("open_read", path).await?;
        let data = self.with_state(|nodes| match nodes.get(&follow(nodes, path.as_bytes())) {
            Some(Node::File { data, .. }) => Ok(data.clone()),
            Some(_) => Err(status("is a directory")),
            None => Err(NativeError::NotFound(path.to_string())),
        })?;
        Ok(MemoryFile { server: self.server.clone(), path: path.as_bytes().to_vec(), data, position: 0 })
    }

    async fn open_write(&mut self, path: &SftpPath) -> NativeResult<MemoryFile> {
        self.enter("open_write", path).await?;
        self.with_state(|nodes| {
            if !matches!(nodes.get(&parent_of(path.as_bytes())), Some(Node::Dir { .. })) {
                return Err(NativeError::NotFound(path.to_string()));
            }
            match nodes.get_mut(path.as_bytes()) {
                Some(Node::File { data, .. }) => data.clear(),
                Some(_) => return Err(status("is a directory")),
                None => {
                    nodes.insert(path.as_bytes().to_vec(), Node::File { mode: 0o644, data: Vec::new() });
                }
            }
            Ok(())
        })?;
        Ok(MemoryFile { server: self.server.clone(), path: path.as_bytes().to_vec(), data: Vec::new(), position: 0 })
    }
}

/// Read handles serve a snapshot; write handles append to the shared node.
pub struct MemoryFile {
    server: MemorySftp,
    path: Vec<u8>,
    data: Vec<u8>,
    position: usize,
}

#[async_trait]
impl RemoteFile for MemoryFile {
    async fn read(&mut self, buf: &mut [u8]) -> NativeResult<usize> {
        let remaining = &self.data[self.position..];
        let count = remaining.len().min(buf.len());
        buf[..count].copy_from_slice(&remaining[..count]);
        self.position += count;
        Ok(count)
    }

    async fn write_all(&mut self, chunk: &[u8]) -> NativeResult<()> {
        let path = SftpPath::new(self.path.clone());
        let session = MemorySession { server: self.server.clone() };
        session.enter("write", &path).await?;
        match self.server.state.lock().nodes.get_mut(&self.path) {
            Some(Node::File { data, .. }) => {
                data.extend_from_slice(chunk);
                Ok(())
            }
            _ => Err(NativeError::NotFound(path.to_string())),
        }
    }

    async fn flush(&mut self) -> NativeResult<()> {
        Ok(())
    }
}

pub async fn content_of(storer: &dyn DataStorer) -> Vec<u8> {
    let mut stream = storer.read_data().await.unwrap();
    read_to_end(&mut stream).await.unwrap()
}

pub fn id(path: &str) -> Identifier {
    Identifier::new(path)
}

//! Hand-off between a new invocation and a running daemon.
//!
//! The daemon listens on `127.0.0.1:port`. Port and key live in a small
//! TOML file in the cache directory. A client sends one JSON line and the
//! daemon answers `ok`, `denied` or `closed`.

use crate::controller::DefaultAction;
use crate::daemon::{Request, RequestQueue};
use anyhow::{Context, Result};
use rand::distributions::{Alphanumeric, DistString};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::net::Ipv4Addr;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

const AUTH_FILE: &str = ".keepmenu-auth";
const AUTHKEY_LEN: usize = 32;
const MAX_LINE: u64 = 4096;

const REPLY_OK: &str = "ok";
const REPLY_DENIED: &str = "denied";
const REPLY_CLOSED: &str = "closed";

#[derive(Debug, Error)]
pub enum IpcError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("Corrupt auth file: {0}")]
    Corrupt(String),

    #[error("Keepmenu daemon rejected the auth key")]
    Denied,

    #[error("Keepmenu daemon is shutting down")]
    Closed,

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Port and key of the daemon, as stored in the auth file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    pub port: u16,
    pub authkey: String,
}

impl AuthToken {
    /// A random key and a port that was free a moment ago.
    pub fn generate() -> io::Result<Self> {
        let port = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?
            .local_addr()?
            .port();
        let authkey = Alphanumeric.sample_string(&mut rand::thread_rng(), AUTHKEY_LEN);
        Ok(Self { port, authkey })
    }

    /// `None` if the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>, IpcError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        toml::from_str(&content)
            .map(Some)
            .map_err(|e| IpcError::Corrupt(e.to_string()))
    }

    /// Write the file readable by the owner only.
    pub fn save(&self, path: &Path) -> Result<(), IpcError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string(self).map_err(|e| IpcError::Corrupt(e.to_string()))?;
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)?;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
        file.write_all(content.as_bytes())?;
        Ok(())
    }
}

/// The single line a client sends.
#[derive(Debug, Serialize, Deserialize)]
pub struct Handoff {
    pub authkey: String,
    pub action: DefaultAction,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ClientOutcome {
    /// A daemon took the request.
    Delivered,
    /// Nobody is listening. The caller becomes the daemon using this token,
    /// which is already saved.
    NoDaemon(AuthToken),
}

pub fn auth_path() -> Result<PathBuf> {
    let cache = dirs::cache_dir().context("Could not determine cache directory")?;
    Ok(cache.join(AUTH_FILE))
}

pub fn remove_auth_file(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => tracing::debug!("Removed {}", path.display()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => tracing::warn!("Failed to remove {}: {}", path.display(), err),
    }
}

/// Pass `action` to a running daemon, or report that there is none.
pub async fn hand_off(path: &Path, action: DefaultAction) -> Result<ClientOutcome, IpcError> {
    let token = match AuthToken::load(path)? {
        Some(token) => token,
        None => {
            let token = AuthToken::generate()?;
            token.save(path)?;
            return Ok(ClientOutcome::NoDaemon(token));
        }
    };

    let stream = match TcpStream::connect((Ipv4Addr::LOCALHOST, token.port)).await {
        Ok(stream) => stream,
        Err(err) if err.kind() == io::ErrorKind::ConnectionRefused => {
            tracing::debug!("No daemon on port {}, starting one", token.port);
            return Ok(ClientOutcome::NoDaemon(token));
        }
        Err(err) => return Err(err.into()),
    };

    let (read, mut write) = stream.into_split();
    let mut line = serde_json::to_string(&Handoff {
        authkey: token.authkey,
        action,
    })?;
    line.push('\n');
    write.write_all(line.as_bytes()).await?;

    let mut reply = String::new();
    BufReader::new(read)
        .take(MAX_LINE)
        .read_line(&mut reply)
        .await?;
    // A daemon that hangs up without answering is on its way out.
    match reply.trim() {
        REPLY_OK => Ok(ClientOutcome::Delivered),
        REPLY_CLOSED | "" => Err(IpcError::Closed),
        REPLY_DENIED => Err(IpcError::Denied),
        other => {
            tracing::warn!("Unexpected reply from daemon: {}", other);
            Err(IpcError::Denied)
        }
    }
}

/// Accept connections forever, queueing every request that carries `authkey`.
pub async fn accept_loop(listener: TcpListener, authkey: String, queue: RequestQueue) {
    let authkey: Arc<str> = authkey.into();
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tracing::debug!("Connection from {}", peer);
                let authkey = authkey.clone();
                let queue = queue.clone();
                tokio::spawn(async move {
                    if let Err(err) = serve(stream, &authkey, &queue).await {
                        tracing::warn!("Client connection failed: {}", err);
                    }
                });
            }
            Err(err) => tracing::warn!("Accept failed: {}", err),
        }
    }
}

async fn serve(stream: TcpStream, authkey: &str, queue: &RequestQueue) -> io::Result<()> {
    let (read, mut write) = stream.into_split();
    let mut line = String::new();
    BufReader::new(read)
        .take(MAX_LINE)
        .read_line(&mut line)
        .await?;

    let reply = match serde_json::from_str::<Handoff>(line.trim()) {
        Ok(handoff) if handoff.authkey == authkey => {
            tracing::info!("Received {:?}", handoff.action);
            if queue.submit(Request::Show(handoff.action)).await {
                REPLY_OK
            } else {
                REPLY_CLOSED
            }
        }
        Ok(_) => {
            tracing::warn!("Rejected request with wrong auth key");
            REPLY_DENIED
        }
        Err(err) => {
            tracing::warn!("Malformed request: {}", err);
            REPLY_DENIED
        }
    };

    write.write_all(format!("{reply}\n").as_bytes()).await?;
    write.shutdown().await
}

/// Recover from a broken auth file or a daemon that does not answer:
/// forget the file and stop any other keepmenu process.
pub fn self_heal(path: &Path) {
    remove_auth_file(path);

    let output = match Command::new("pgrep").args(["-x", "keepmenu"]).output() {
        Ok(output) => output,
        Err(err) => {
            tracing::warn!("Failed to run pgrep: {}", err);
            return;
        }
    };
    let own = std::process::id();
    let pids = String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|line| line.trim().parse::<u32>().ok())
        .filter(|pid| *pid != own)
        .collect::<Vec<_>>();
    for pid in pids {
        tracing::info!("Stopping keepmenu process {}", pid);
        if let Err(err) = Command::new("kill").arg(pid.to_string()).status() {
            tracing::warn!("Failed to kill {}: {}", pid, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::request_channel;
    use tempfile::TempDir;

    async fn listening_daemon(path: &Path, authkey: &str) -> tokio::sync::mpsc::Receiver<Request> {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        AuthToken {
            port,
            authkey: authkey.to_string(),
        }
        .save(path)
        .unwrap();
        let (queue, rx) = request_channel();
        tokio::spawn(accept_loop(listener, authkey.to_string(), queue));
        rx
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_request_is_delivered() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(AUTH_FILE);
        let mut rx = listening_daemon(&path, "secret-key").await;

        let outcome = hand_off(&path, DefaultAction::TypePassword).await.unwrap();
        assert_eq!(outcome, ClientOutcome::Delivered);
        assert_eq!(rx.recv().await, Some(Request::Show(DefaultAction::TypePassword)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_wrong_key_is_denied() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(AUTH_FILE);
        let mut rx = listening_daemon(&path, "secret-key").await;
        let mut token = AuthToken::load(&path).unwrap().unwrap();
        token.authkey = "guess".to_string();
        token.save(&path).unwrap();

        let err = hand_off(&path, DefaultAction::None).await.unwrap_err();
        assert!(matches!(err, IpcError::Denied));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_file_creates_private_token() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache").join(AUTH_FILE);

        let ClientOutcome::NoDaemon(token) = hand_off(&path, DefaultAction::None).await.unwrap() else {
            panic!("expected no daemon");
        };
        assert_eq!(token.authkey.len(), AUTHKEY_LEN);
        assert_eq!(AuthToken::load(&path).unwrap(), Some(token));
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stale_token_is_reused() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(AUTH_FILE);
        let stale = AuthToken::generate().unwrap();
        stale.save(&path).unwrap();

        let outcome = hand_off(&path, DefaultAction::None).await.unwrap();
        assert_eq!(outcome, ClientOutcome::NoDaemon(stale));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(AUTH_FILE);
        fs::write(&path, "port = \"not a number\"").unwrap();

        let err = hand_off(&path, DefaultAction::None).await.unwrap_err();
        assert!(matches!(err, IpcError::Corrupt(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_closed_queue_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(AUTH_FILE);
        let rx = listening_daemon(&path, "secret-key").await;
        drop(rx);

        let err = hand_off(&path, DefaultAction::None).await.unwrap_err();
        assert!(matches!(err, IpcError::Closed));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_hangup_without_reply_is_closed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(AUTH_FILE);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        AuthToken {
            port: listener.local_addr().unwrap().port(),
            authkey: "secret-key".to_string(),
        }
        .save(&path)
        .unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut line = String::new();
            BufReader::new(read).read_line(&mut line).await.unwrap();
            write.shutdown().await.unwrap();
        });

        let err = hand_off(&path, DefaultAction::None).await.unwrap_err();
        assert!(matches!(err, IpcError::Closed));
        assert!(path.exists());
    }

    #[test]
    fn test_remove_missing_auth_file_is_quiet() {
        let dir = TempDir::new().unwrap();
        remove_auth_file(&dir.path().join(AUTH_FILE));
    }
}

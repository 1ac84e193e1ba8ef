//! Control channel - lets a separate invocation query or stop a running pool.
//!
//! A Unix domain socket in the data directory, one request per connection,
//! newline-delimited JSON:
//!
//! ```text
//! → {"command":"status"}
//! ← {"result":"status","running":true,"pid":4242,"workers":3,"started_at":"..."}
//! → {"command":"stop"}
//! ← {"result":"stopping"}
//! ```
//!
//! The socket doubles as the "one pool per data directory" lock: binding
//! fails with `AlreadyRunning` while another server answers on it.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, warn};

use super::pool::WorkerPool;
use super::status::PoolStatus;
use crate::error::QueueError;

pub const SOCKET_FILE_NAME: &str = "queuectl.sock";

/// Per-connection limit, so a silent client cannot wedge the server.
const IO_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ControlRequest {
    Status,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ControlResponse {
    Status(PoolStatus),
    Stopping,
    Error { message: String },
}

pub fn socket_path(data_dir: impl AsRef<Path>) -> PathBuf {
    data_dir.as_ref().join(SOCKET_FILE_NAME)
}

pub struct ControlServer {
    listener: UnixListener,
    path: PathBuf,
}

impl ControlServer {
    /// Bind the socket at `path`, replacing a stale socket file left by a
    /// pool that did not shut down cleanly.
    pub async fn bind(path: impl Into<PathBuf>) -> Result<Self, QueueError> {
        let path = path.into();

        if path.exists() {
            match UnixStream::connect(&path).await {
                Ok(_) => return Err(QueueError::AlreadyRunning),
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "removing stale control socket");
                    std::fs::remove_file(&path)?;
                }
            }
        }
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&path)?;
        info!(path = %path.display(), "control socket listening");
        Ok(Self { listener, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Answer requests until a `stop` arrives. The caller then stops the pool.
    pub async fn run(&self, pool: &WorkerPool) -> Result<(), QueueError> {
        loop {
            let (stream, _) = self.listener.accept().await?;
            match tokio::time::timeout(IO_TIMEOUT, serve(stream, pool)).await {
                Ok(Ok(ControlRequest::Stop)) => {
                    info!("stop requested over control socket");
                    return Ok(());
                }
                Ok(Ok(ControlRequest::Status)) => {}
                Ok(Err(e)) => warn!(error = %e, "control request failed"),
                Err(_) => warn!("control client timed out"),
            }
        }
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Handle one connection. Returns the request that was answered; malformed
/// requests are answered with an error and reported as `Status` so the
/// server keeps going.
async fn serve(stream: UnixStream, pool: &WorkerPool) -> Result<ControlRequest, QueueError> {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();

    let Some(line) = lines.next_line().await? else {
        return Err(QueueError::Control("client closed without a request".to_string()));
    };

    let (request, response) = match serde_json::from_str::<ControlRequest>(&line) {
        Ok(ControlRequest::Status) => (
            ControlRequest::Status,
            ControlResponse::Status(pool.status()),
        ),
        Ok(ControlRequest::Stop) => (ControlRequest::Stop, ControlResponse::Stopping),
        Err(e) => (
            ControlRequest::Status,
            ControlResponse::Error {
                message: format!("bad request: {e}"),
            },
        ),
    };

    write_line(&mut write, &response).await?;
    Ok(request)
}

async fn write_line<W, T>(writer: &mut W, value: &T) -> Result<(), QueueError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut buf =
        serde_json::to_vec(value).map_err(|e| QueueError::Control(e.to_string()))?;
    buf.push(b'\n');
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Send one request to the pool listening on `path`.
///
/// `NotRunning` when nothing listens there.
pub async fn request(
    path: impl AsRef<Path>,
    req: ControlRequest,
) -> Result<ControlResponse, QueueError> {
    let stream = match UnixStream::connect(path.as_ref()).await {
        Ok(stream) => stream,
        Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::ConnectionRefused) => {
            return Err(QueueError::NotRunning);
        }
        Err(e) => return Err(e.into()),
    };

    tokio::time::timeout(IO_TIMEOUT, exchange(stream, req))
        .await
        .map_err(|_| QueueError::Control("timed out waiting for the worker pool".to_string()))?
}

async fn exchange(stream: UnixStream, req: ControlRequest) -> Result<ControlResponse, QueueError> {
    let (read, mut write) = stream.into_split();
    write_line(&mut write, &req).await?;

    let mut lines = BufReader::new(read).lines();
    let line = lines
        .next_line()
        .await?
        .ok_or_else(|| QueueError::Control("server closed without a response".to_string()))?;
    serde_json::from_str(&line).map_err(|e| QueueError::Control(format!("bad response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::app::worker_loop::tests::ScriptedExecutor;
    use crate::impls::InMemoryJobStore;
    use crate::ports::InMemorySettings;

    fn pool() -> WorkerPool {
        WorkerPool::new(
            Arc::new(InMemoryJobStore::new()),
            Arc::new(ScriptedExecutor::new([])),
            Arc::new(InMemorySettings::default()),
        )
    }

    #[test]
    fn wire_format_is_tagged_json() {
        assert_eq!(
            serde_json::to_string(&ControlRequest::Stop).unwrap(),
            r#"{"command":"stop"}"#
        );
        let status = ControlResponse::Status(PoolStatus {
            running: true,
            pid: 7,
            workers: 3,
            started_at: None,
        });
        let v = serde_json::to_value(&status).unwrap();
        assert_eq!(v["result"], "status");
        assert_eq!(v["workers"], 3);
        assert_eq!(
            serde_json::to_string(&ControlResponse::Stopping).unwrap(),
            r#"{"result":"stopping"}"#
        );
    }

    #[tokio::test]
    async fn status_then_stop_over_the_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = socket_path(dir.path());
        let pool = pool();
        pool.start(2).unwrap();

        let server = ControlServer::bind(&path).await.unwrap();
        let client = async {
            let status = request(&path, ControlRequest::Status).await.unwrap();
            let stop = request(&path, ControlRequest::Stop).await.unwrap();
            (status, stop)
        };
        let (served, (status, stop)) = tokio::join!(server.run(&pool), client);

        served.unwrap();
        match status {
            ControlResponse::Status(s) => {
                assert!(s.running);
                assert_eq!(s.workers, 2);
            }
            other => panic!("unexpected response: {other:?}"),
        }
        assert_eq!(stop, ControlResponse::Stopping);

        pool.stop().await.unwrap();
        drop(server);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn second_server_on_a_live_socket_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = socket_path(dir.path());

        let _first = ControlServer::bind(&path).await.unwrap();
        assert!(matches!(
            ControlServer::bind(&path).await,
            Err(QueueError::AlreadyRunning)
        ));
    }

    #[tokio::test]
    async fn stale_socket_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = socket_path(dir.path());

        // leaves the socket file behind without a listener
        drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
        assert!(path.exists());

        let server = ControlServer::bind(&path).await.unwrap();
        assert_eq!(server.path(), path.as_path());
    }

    #[tokio::test]
    async fn request_without_a_server_is_not_running() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            request(socket_path(dir.path()), ControlRequest::Status).await,
            Err(QueueError::NotRunning)
        ));
    }

    #[tokio::test]
    async fn malformed_request_gets_an_error_response() {
        let dir = tempfile::tempdir().unwrap();
        let path = socket_path(dir.path());
        let pool = pool();
        let server = ControlServer::bind(&path).await.unwrap();

        let client = async {
            let mut stream = UnixStream::connect(&path).await.unwrap();
            stream.write_all(b"{\"command\":\"explode\"}\n").await.unwrap();
            let mut lines = BufReader::new(stream).lines();
            let reply = lines.next_line().await.unwrap().unwrap();
            let stop = request(&path, ControlRequest::Stop).await.unwrap();
            (reply, stop)
        };
        let (served, (reply, stop)) = tokio::join!(server.run(&pool), client);

        served.unwrap();
        let reply: ControlResponse = serde_json::from_str(&reply).unwrap();
        assert!(matches!(reply, ControlResponse::Error { .. }));
        assert_eq!(stop, ControlResponse::Stopping);
    }
}

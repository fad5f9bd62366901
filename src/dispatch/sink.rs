use std::{
    future::Future,
    io,
    path::{Path, PathBuf},
    time::Duration,
};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::UnixStream,
    time::timeout,
};

const RESPONSE_BUFFER_BYTES: usize = 4096;

/// What came back after a command was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkReply {
    Response(String),
    /// Nothing arrived within the response timeout; presumed delivered.
    NoResponse,
    /// Peer closed the connection without answering.
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("command sink i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("command sink did not accept the command within {0:?}")]
    Timeout(Duration),
}

/// Destination for serialized player commands.
pub trait CommandSink: Send + Sync {
    fn send(&self, line: &str) -> impl Future<Output = Result<SinkReply, SinkError>> + Send;
}

/// One connection per command to a player's JSON IPC socket.
#[derive(Debug, Clone)]
pub struct UnixSocketSink {
    path: PathBuf,
    connect_timeout: Duration,
    response_timeout: Duration,
}

impl UnixSocketSink {
    pub fn new(path: impl Into<PathBuf>, connect_timeout: Duration, response_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            connect_timeout,
            response_timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CommandSink for UnixSocketSink {
    async fn send(&self, line: &str) -> Result<SinkReply, SinkError> {
        let mut stream = match timeout(self.connect_timeout, UnixStream::connect(&self.path)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(SinkError::Connect {
                    path: self.path.clone(),
                    source,
                })
            }
            Err(_) => return Err(SinkError::Timeout(self.connect_timeout)),
        };

        timeout(self.connect_timeout, stream.write_all(line.as_bytes()))
            .await
            .map_err(|_| SinkError::Timeout(self.connect_timeout))??;

        let mut buf = vec![0u8; RESPONSE_BUFFER_BYTES];
        match timeout(self.response_timeout, stream.read(&mut buf)).await {
            Err(_) => Ok(SinkReply::NoResponse),
            Ok(Ok(0)) => Ok(SinkReply::Closed),
            Ok(Ok(n)) => Ok(SinkReply::Response(
                String::from_utf8_lossy(&buf[..n]).trim_end().to_string(),
            )),
            Ok(Err(err)) => Err(SinkError::Io(err)),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    };

    /// In-memory sink that records every line and can be switched to fail.
    #[derive(Debug, Clone, Default)]
    pub struct RecordingSink {
        lines: Arc<Mutex<Vec<String>>>,
        unreachable: Arc<AtomicBool>,
        silent: Arc<AtomicBool>,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_unreachable(&self, unreachable: bool) {
            self.unreachable.store(unreachable, Ordering::SeqCst);
        }

        /// Accept lines but never answer, like a player that is busy.
        pub fn set_silent(&self, silent: bool) {
            self.silent.store(silent, Ordering::SeqCst);
        }

        pub fn lines(&self) -> Vec<String> {
            self.lines.lock().unwrap().clone()
        }
    }

    impl CommandSink for RecordingSink {
        async fn send(&self, line: &str) -> Result<SinkReply, SinkError> {
            if self.unreachable.load(Ordering::SeqCst) {
                return Err(SinkError::Connect {
                    path: PathBuf::from("/nonexistent/sink"),
                    source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
                });
            }
            self.lines.lock().unwrap().push(line.to_string());
            if self.silent.load(Ordering::SeqCst) {
                return Ok(SinkReply::NoResponse);
            }
            Ok(SinkReply::Response("{\"error\":\"success\"}".into()))
        }
    }
}

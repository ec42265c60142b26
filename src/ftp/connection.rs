//! FTP session handle
//!
//! `RemoteSession` is the seam between the crawl/hash logic and the wire.
//! A session is stateful (working directory, login, transfer type) and
//! single-owner: callers hold it by `&mut` and recover a dead session by
//! calling `reconnect`, which tears the control connection down and builds
//! a fresh one in place.
//!
//! `FtpConnection` is the production implementation on top of the `ftp`
//! crate, which negotiates passive mode (PASV) for every data transfer.

use crate::config::RemoteConfig;
use crate::error::{FtpError, FtpResult};
use ftp::status;
use ftp::types::FileType;
use ftp::FtpStream;
use regex::Regex;
use std::io::{self, ErrorKind, Read};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, warn};

/// Extracts the three-digit reply code from an `ftp` crate response error
static REPLY_CODE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:got response: |^)\s*([1-5]\d\d)\b").expect("Invalid reply code regex")
});

/// Operations the walker and hasher need from a remote endpoint
pub trait RemoteSession {
    /// Change the working directory (absolute path, or `..`)
    fn cwd(&mut self, path: &str) -> FtpResult<()>;

    /// Move to the parent of the working directory
    fn cdup(&mut self) -> FtpResult<()>;

    /// Raw `LIST` lines for the working directory
    fn list(&mut self) -> FtpResult<Vec<String>>;

    /// Download a whole file in binary mode
    fn retrieve(&mut self, path: &str) -> FtpResult<Vec<u8>>;

    /// Liveness probe (`NOOP`)
    fn noop(&mut self) -> FtpResult<()>;

    /// Drop the current session and establish a new one
    fn reconnect(&mut self) -> FtpResult<()>;

    /// Close the session; later calls fail with `NotConnected`
    fn disconnect(&mut self);

    /// Human-readable endpoint description for logs
    fn endpoint(&self) -> String;
}

/// Live FTP session
pub struct FtpConnection {
    config: RemoteConfig,
    stream: Option<FtpStream>,
}

impl FtpConnection {
    /// Connect and log in once, without retries
    pub fn connect(config: RemoteConfig) -> FtpResult<Self> {
        let stream = open_stream(&config)?;
        Ok(Self {
            config,
            stream: Some(stream),
        })
    }

    /// Server we're connected to
    pub fn server(&self) -> &str {
        &self.config.host
    }

    /// Check if a control connection is held
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn stream(&mut self) -> FtpResult<&mut FtpStream> {
        self.stream.as_mut().ok_or(FtpError::NotConnected)
    }
}

impl RemoteSession for FtpConnection {
    fn cwd(&mut self, path: &str) -> FtpResult<()> {
        self.stream()?
            .cwd(path)
            .map_err(|e| translate_error(path, e))
    }

    fn cdup(&mut self) -> FtpResult<()> {
        self.stream()?.cdup().map_err(|e| translate_error("..", e))
    }

    fn list(&mut self) -> FtpResult<Vec<String>> {
        // TODO: bound the LIST data socket too; `FtpStream::list` keeps it private
        self.stream()?.list(None).map_err(|e| translate_error(".", e))
    }

    fn retrieve(&mut self, path: &str) -> FtpResult<Vec<u8>> {
        let timeout = self.config.timeout;
        let stream = self.stream()?;

        let mut data = stream.get(path).map_err(|e| translate_error(path, e))?;
        data.get_ref()
            .get_ref()
            .set_read_timeout(Some(timeout))
            .map_err(|e| translate_io(path, e))?;
        let bytes = read_transfer(path, &mut data)?;
        drop(data);

        stream
            .read_response_in(&[
                status::CLOSING_DATA_CONNECTION,
                status::REQUESTED_FILE_ACTION_OK,
            ])
            .map_err(|e| translate_error(path, e))?;
        Ok(bytes)
    }

    fn noop(&mut self) -> FtpResult<()> {
        self.stream()?.noop().map_err(|e| translate_error("NOOP", e))
    }

    fn reconnect(&mut self) -> FtpResult<()> {
        self.disconnect();
        let stream = FtpConnectionBuilder::new(self.config.clone()).open()?;
        self.stream = Some(stream);
        debug!("Reconnected to {}", self.endpoint());
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            // A stale control connection often refuses QUIT; dropping closes the socket anyway
            if let Err(e) = stream.quit() {
                debug!("QUIT failed on {}: {}", self.config.host, e);
            }
        }
    }

    fn endpoint(&self) -> String {
        format!("ftp://{}@{}:{}", self.config.username, self.config.host, self.config.port)
    }
}

impl Drop for FtpConnection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Builder for FTP connections with retry support
pub struct FtpConnectionBuilder {
    config: RemoteConfig,
    retries: u32,
}

impl FtpConnectionBuilder {
    /// Create a new builder; retry count comes from the config
    pub fn new(config: RemoteConfig) -> Self {
        let retries = config.connect_retries;
        Self { config, retries }
    }

    /// Override retry count
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Build and connect with retries
    pub fn connect(self) -> FtpResult<FtpConnection> {
        let stream = self.open()?;
        Ok(FtpConnection {
            config: self.config,
            stream: Some(stream),
        })
    }

    fn open(&self) -> FtpResult<FtpStream> {
        let mut last_error = None;

        for attempt in 0..=self.retries {
            if attempt > 0 {
                // Exponential backoff: 100ms, 200ms, 400ms, ...
                let delay = Duration::from_millis(100 * (1 << (attempt - 1).min(6)));
                std::thread::sleep(delay);
            }

            match open_stream(&self.config) {
                Ok(stream) => return Ok(stream),
                // Wrong credentials will not get better by retrying
                Err(e @ FtpError::AuthenticationFailed { .. }) => return Err(e),
                Err(e) => {
                    warn!(
                        "Connect attempt {}/{} to {} failed: {}",
                        attempt + 1,
                        self.retries + 1,
                        self.config.host,
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| FtpError::ConnectionFailed {
            server: self.config.host.clone(),
            reason: "Connection failed after all retries".into(),
        }))
    }
}

/// Connect, apply socket timeouts, log in and switch to binary mode
fn open_stream(config: &RemoteConfig) -> FtpResult<FtpStream> {
    let addr = reachable_addr(&config.host, config.port, config.timeout)?;
    let mut stream = FtpStream::connect(addr).map_err(|e| FtpError::ConnectionFailed {
        server: config.host.clone(),
        reason: e.to_string(),
    })?;

    let timeout = Some(config.timeout);
    let socket = stream.get_ref();
    socket
        .set_read_timeout(timeout)
        .and_then(|_| socket.set_write_timeout(timeout))
        .map_err(|e| FtpError::ConnectionFailed {
            server: config.host.clone(),
            reason: format!("cannot set socket timeout: {}", e),
        })?;

    stream
        .login(&config.username, &config.password)
        .map_err(|e| FtpError::AuthenticationFailed {
            server: config.host.clone(),
            user: config.username.clone(),
            reason: e.to_string(),
        })?;

    stream
        .transfer_type(FileType::Binary)
        .map_err(|e| translate_error("TYPE I", e))?;

    Ok(stream)
}

/// First resolved address that accepts a TCP handshake within `timeout`
///
/// `FtpStream::connect` has no connect timeout of its own, so an
/// unreachable host is rejected here before it is handed an address.
fn reachable_addr(host: &str, port: u16, timeout: Duration) -> FtpResult<SocketAddr> {
    let failed = |reason: String| FtpError::ConnectionFailed {
        server: host.to_string(),
        reason,
    };

    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|e| failed(format!("cannot resolve: {}", e)))?;

    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(_) => return Ok(addr),
            Err(e) => {
                debug!("Connect to {} failed: {}", addr, e);
                last_error = Some(e);
            }
        }
    }

    Err(failed(match last_error {
        Some(e) => e.to_string(),
        None => "no addresses resolved".into(),
    }))
}

/// Drain a data connection; a stalled read surfaces as `Timeout`
fn read_transfer(path: &str, reader: &mut impl Read) -> FtpResult<Vec<u8>> {
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(|e| translate_io(path, e))?;
    Ok(bytes)
}

fn translate_io(path: &str, io: io::Error) -> FtpError {
    match io.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock => FtpError::Timeout { path: path.into() },
        _ => FtpError::ConnectionReset {
            path: path.into(),
            reason: io.to_string(),
        },
    }
}

/// Translate an `ftp` crate error to our error type
fn translate_error(path: &str, err: ftp::FtpError) -> FtpError {
    match err {
        ftp::FtpError::ConnectionError(io) => translate_io(path, io),
        ftp::FtpError::InvalidResponse(message) => classify_reply(path, &message),
        other => FtpError::Unexpected {
            path: path.into(),
            reason: other.to_string(),
        },
    }
}

/// Classify a server reply by its code
///
/// 4xx replies are transient; 550-class replies mean the path is not
/// accessible; other 5xx replies are permanent protocol failures.
pub(crate) fn classify_reply(path: &str, message: &str) -> FtpError {
    let code = REPLY_CODE_REGEX
        .captures(message)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok());

    match code {
        Some(code @ 400..=499) => FtpError::TransientReply {
            path: path.into(),
            code,
            message: message.trim().to_string(),
        },
        Some(530) => FtpError::AuthenticationFailed {
            server: String::new(),
            user: String::new(),
            reason: message.trim().to_string(),
        },
        Some(550..=553) => FtpError::PermissionDenied {
            path: path.into(),
            reason: message.trim().to_string(),
        },
        Some(code) => FtpError::Protocol {
            path: path.into(),
            code,
            message: message.trim().to_string(),
        },
        None => FtpError::Unexpected {
            path: path.into(),
            reason: message.trim().to_string(),
        },
    }
}

//! SSH transport backed by libssh2

use std::io::{self, Read};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use secrecy::{ExposeSecret, SecretString};
use ssh2::{Channel, CheckResult, KnownHostFileKind, Session};
use tracing::{debug, info, warn};

use crate::errors::PanelError;
use crate::ssh::{CommandResult, RemoteSession, RemoteTransport, SshTarget};

/// Password-authenticated SSH with trust-on-first-use host keys.
///
/// Unknown host keys are accepted and appended to `known_hosts_path`; a key
/// that differs from the stored one is rejected.
pub struct LibsshTransport {
    known_hosts_path: PathBuf,
}

impl LibsshTransport {
    pub fn new(known_hosts_path: impl Into<PathBuf>) -> Self {
        Self {
            known_hosts_path: known_hosts_path.into(),
        }
    }

    pub fn known_hosts_path(&self) -> &Path {
        &self.known_hosts_path
    }

    fn trust_on_first_use(&self, session: &Session, target: &SshTarget) -> Result<(), PanelError> {
        let (key, key_type) = session
            .host_key()
            .ok_or_else(|| connection_error("server did not present a host key"))?;

        let mut known_hosts = session.known_hosts().map_err(ssh_error)?;
        if self.known_hosts_path.exists() {
            known_hosts
                .read_file(&self.known_hosts_path, KnownHostFileKind::OpenSSH)
                .map_err(ssh_error)?;
        }

        match known_hosts.check_port(&target.host, target.port, key) {
            CheckResult::Match => Ok(()),
            CheckResult::NotFound => {
                let entry = if target.port == 22 {
                    target.host.clone()
                } else {
                    format!("[{}]:{}", target.host, target.port)
                };
                known_hosts
                    .add(&entry, key, "added by repodeck", key_type.into())
                    .map_err(ssh_error)?;
                if let Some(parent) = self.known_hosts_path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                known_hosts
                    .write_file(&self.known_hosts_path, KnownHostFileKind::OpenSSH)
                    .map_err(ssh_error)?;
                warn!("Trusting new host key for {} (first use)", entry);
                Ok(())
            }
            CheckResult::Mismatch => Err(connection_error(&format!(
                "host key for {} does not match the stored key",
                target.host
            ))),
            CheckResult::Failure => Err(connection_error("host key check failed")),
        }
    }
}

impl RemoteTransport for LibsshTransport {
    fn connect(
        &self,
        target: &SshTarget,
        secret: &SecretString,
        timeout: Duration,
    ) -> Result<Box<dyn RemoteSession>, PanelError> {
        debug!("Connecting to {}", target);

        let addr = (target.host.as_str(), target.port)
            .to_socket_addrs()
            .map_err(|e| connection_error(&format!("cannot resolve {}: {}", target.host, e)))?
            .next()
            .ok_or_else(|| connection_error(&format!("no address for {}", target.host)))?;

        let tcp = TcpStream::connect_timeout(&addr, timeout)
            .map_err(|e| connection_error(&format!("cannot reach {}: {}", addr, e)))?;

        let mut session = Session::new().map_err(ssh_error)?;
        session.set_timeout(millis(timeout));
        session.set_tcp_stream(tcp);
        session.handshake().map_err(ssh_error)?;

        self.trust_on_first_use(&session, target)?;

        session
            .userauth_password(&target.username, secret.expose_secret())
            .map_err(ssh_error)?;
        if !session.authenticated() {
            return Err(connection_error("authentication rejected"));
        }

        info!("SSH session established with {}", target);
        Ok(Box::new(LibsshSession {
            session,
            target: target.clone(),
        }))
    }
}

struct LibsshSession {
    session: Session,
    target: SshTarget,
}

impl RemoteSession for LibsshSession {
    fn execute(&mut self, command: &str, timeout: Duration) -> Result<CommandResult, PanelError> {
        self.session.set_timeout(millis(timeout));

        let mut channel = self.session.channel_session().map_err(ssh_error)?;
        channel.exec(command).map_err(ssh_error)?;

        self.session.set_blocking(false);
        let drained = drain_output(&mut channel, timeout);
        self.session.set_blocking(true);
        let (stdout, stderr) = drained?;

        channel.wait_close().map_err(ssh_error)?;
        let exit_code = channel.exit_status().map_err(ssh_error)?;

        Ok(CommandResult {
            exit_code,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }

    fn close(self: Box<Self>) {
        if let Err(e) = self.session.disconnect(None, "deploy finished", None) {
            debug!("Disconnect from {} failed: {}", self.target, e);
        }
    }
}

/// Idle wait between polls when neither stream had data
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Both output streams of a running command
trait OutputStreams {
    fn read_stdout(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn read_stderr(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    /// The remote sent EOF
    fn at_eof(&self) -> bool;
}

impl OutputStreams for Channel {
    fn read_stdout(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read(buf)
    }

    fn read_stderr(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stderr().read(buf)
    }

    fn at_eof(&self) -> bool {
        self.eof()
    }
}

/// Read stdout and stderr alternately until EOF.
///
/// A command that fills one stream's window stalls until that stream is read,
/// so neither stream may be read to the end before the other.
fn drain_output(
    streams: &mut dyn OutputStreams,
    timeout: Duration,
) -> Result<(Vec<u8>, Vec<u8>), PanelError> {
    let deadline = Instant::now() + timeout;
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut buf = [0u8; 8192];

    loop {
        let mut progressed = false;
        if let Some(n) = poll_read(streams.read_stdout(&mut buf), timeout)? {
            stdout.extend_from_slice(&buf[..n]);
            progressed = true;
        }
        if let Some(n) = poll_read(streams.read_stderr(&mut buf), timeout)? {
            stderr.extend_from_slice(&buf[..n]);
            progressed = true;
        }

        if progressed {
            continue;
        }
        if streams.at_eof() {
            return Ok((stdout, stderr));
        }
        if Instant::now() >= deadline {
            return Err(read_error(io::ErrorKind::TimedOut.into(), timeout));
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// `Some(n)` when bytes arrived, `None` when the stream had nothing
fn poll_read(result: io::Result<usize>, timeout: Duration) -> Result<Option<usize>, PanelError> {
    match result {
        Ok(0) => Ok(None),
        Ok(n) => Ok(Some(n)),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
        Err(e) => Err(read_error(e, timeout)),
    }
}

fn millis(timeout: Duration) -> u32 {
    timeout.as_millis().min(u32::MAX as u128) as u32
}

fn connection_error(message: &str) -> PanelError {
    PanelError::ConnectionError(message.to_string())
}

fn ssh_error(err: ssh2::Error) -> PanelError {
    PanelError::ConnectionError(err.message().to_string())
}

fn read_error(err: std::io::Error, timeout: Duration) -> PanelError {
    if err.kind() == std::io::ErrorKind::TimedOut {
        PanelError::ConnectionError(format!("command timed out after {}s", timeout.as_secs()))
    } else {
        PanelError::ConnectionError(err.to_string())
    }
}

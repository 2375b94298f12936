//! Tello SDK text protocol over UDP.

use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};

use super::{CameraDirection, MoveDirection, Rotation, Telemetry, VehicleLink};
use crate::control::Velocity;

const STATE_POLL: Duration = Duration::from_millis(200);
const MAX_DATAGRAM: usize = 2048;

#[derive(Clone, Debug)]
pub struct TelloConfig {
    /// Vehicle command endpoint.
    pub drone_addr: SocketAddr,
    /// Local command socket. Replies come back here.
    pub local_addr: SocketAddr,
    /// Local telemetry listener.
    pub state_addr: SocketAddr,
    pub response_timeout: Duration,
    pub connect_timeout: Duration,
    /// Sends per command, counting the first, before silence is an error.
    /// Zero is treated as one.
    pub retry_count: u32,
}

impl Default for TelloConfig {
    fn default() -> Self {
        Self {
            drone_addr: SocketAddr::from(([192, 168, 10, 1], 8889)),
            local_addr: SocketAddr::from(([0, 0, 0, 0], 8889)),
            state_addr: SocketAddr::from(([0, 0, 0, 0], 8890)),
            response_timeout: Duration::from_millis(10),
            connect_timeout: Duration::from_secs(3),
            retry_count: 1,
        }
    }
}

pub struct TelloLink {
    cfg: TelloConfig,
    socket: UdpSocket,
    latest_state: Arc<Mutex<Option<Telemetry>>>,
    shutdown: Arc<AtomicBool>,
    state_thread: Option<JoinHandle<()>>,
}

impl TelloLink {
    /// Bind the command and telemetry sockets. Nothing is sent until
    /// `connect`.
    pub fn open(cfg: TelloConfig) -> Result<Self> {
        let socket = UdpSocket::bind(cfg.local_addr)
            .with_context(|| format!("failed to bind command socket {}", cfg.local_addr))?;
        let state_socket = UdpSocket::bind(cfg.state_addr)
            .with_context(|| format!("failed to bind telemetry socket {}", cfg.state_addr))?;
        state_socket.set_read_timeout(Some(STATE_POLL))?;

        let latest_state = Arc::new(Mutex::new(None));
        let shutdown = Arc::new(AtomicBool::new(false));
        let state_thread = {
            let latest_state = latest_state.clone();
            let shutdown = shutdown.clone();
            std::thread::Builder::new()
                .name("tello-state".to_string())
                .spawn(move || run_state_listener(state_socket, latest_state, shutdown))
                .context("failed to spawn telemetry thread")?
        };

        log::info!(
            "tello link: {} -> {} (telemetry on {})",
            cfg.local_addr,
            cfg.drone_addr,
            cfg.state_addr
        );
        Ok(Self {
            cfg,
            socket,
            latest_state,
            shutdown,
            state_thread: Some(state_thread),
        })
    }

    /// Stop the telemetry listener. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.state_thread.take() {
            join.join()
                .map_err(|_| anyhow!("telemetry thread panicked"))?;
        }
        Ok(())
    }

    /// Send without waiting for the reply.
    fn send_only(&self, command: &str) -> Result<()> {
        log::debug!("tello <- {}", command);
        self.socket
            .send_to(command.as_bytes(), self.cfg.drone_addr)
            .with_context(|| format!("failed to send '{}'", command))?;
        Ok(())
    }

    /// Send and wait for a reply, resending on silence. `error` replies are
    /// returned as errors without resending.
    fn request(&self, command: &str, timeout: Duration) -> Result<String> {
        self.drain_replies()?;
        let attempts = self.cfg.retry_count.max(1);
        let mut buf = [0u8; MAX_DATAGRAM];
        for attempt in 0..attempts {
            if attempt > 0 {
                log::debug!("tello: resending '{}' (attempt {})", command, attempt + 1);
            }
            self.send_only(command)?;
            let deadline = Instant::now() + timeout;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                self.socket.set_read_timeout(Some(remaining))?;
                match self.socket.recv_from(&mut buf) {
                    Ok((len, from)) => {
                        if from.ip() != self.cfg.drone_addr.ip() {
                            log::debug!("tello: ignoring datagram from {}", from);
                            continue;
                        }
                        let reply = String::from_utf8_lossy(&buf[..len]).trim().to_string();
                        log::debug!("tello -> {}", reply);
                        if reply.starts_with("error") {
                            return Err(anyhow!("'{}' rejected by vehicle: {}", command, reply));
                        }
                        return Ok(reply);
                    }
                    Err(err) if is_timeout(&err) => break,
                    Err(err) => {
                        return Err(err)
                            .with_context(|| format!("failed to receive reply to '{}'", command))
                    }
                }
            }
        }
        Err(anyhow!(
            "no reply to '{}' within {:?} after {} attempts",
            command,
            timeout,
            attempts
        ))
    }

    fn command(&self, command: &str) -> Result<()> {
        self.request(command, self.cfg.response_timeout).map(|_| ())
    }

    /// Discard replies to earlier commands that arrived after their timeout.
    fn drain_replies(&self) -> Result<()> {
        self.socket.set_nonblocking(true)?;
        let mut buf = [0u8; MAX_DATAGRAM];
        let mut stale = 0usize;
        let result = loop {
            match self.socket.recv_from(&mut buf) {
                Ok(_) => stale += 1,
                Err(err) if err.kind() == ErrorKind::WouldBlock => break Ok(()),
                Err(err) => break Err(err),
            }
        };
        self.socket.set_nonblocking(false)?;
        if stale > 0 {
            log::debug!("tello: dropped {} stale replies", stale);
        }
        result.context("failed to drain command socket")
    }
}

impl VehicleLink for TelloLink {
    fn connect(&mut self) -> Result<()> {
        self.request("command", self.cfg.connect_timeout)
            .context("vehicle did not enter SDK mode")?;
        log::info!("tello: SDK mode entered");
        Ok(())
    }

    fn start_video(&mut self) -> Result<()> {
        self.request("streamon", self.cfg.connect_timeout)
            .context("vehicle did not start the video stream")
            .map(|_| ())
    }

    fn stop_video(&mut self) -> Result<()> {
        self.command("streamoff")
    }

    fn takeoff(&mut self) -> Result<()> {
        self.command("takeoff")
    }

    fn land(&mut self) -> Result<()> {
        self.command("land")
    }

    fn move_by(&mut self, direction: MoveDirection, cm: u32) -> Result<()> {
        self.command(&format!("{} {}", direction.verb(), cm))
    }

    fn rotate(&mut self, rotation: Rotation, degrees: u32) -> Result<()> {
        self.command(&format!("{} {}", rotation.verb(), degrees))
    }

    fn set_velocity(&mut self, velocity: Velocity) -> Result<()> {
        self.send_only(&format!(
            "rc {} {} {} {}",
            velocity.left_right, velocity.forward_back, velocity.up_down, velocity.yaw
        ))
    }

    fn send_keepalive(&mut self) -> Result<()> {
        self.send_only("command")
    }

    fn query_state(&self) -> Option<Telemetry> {
        self.latest_state.lock().ok()?.clone()
    }

    fn sdk_version(&mut self) -> Result<String> {
        self.request("sdk?", self.cfg.connect_timeout)
    }

    fn set_motors(&mut self, on: bool) -> Result<()> {
        self.command(if on { "motoron" } else { "motoroff" })
    }

    fn set_camera(&mut self, direction: CameraDirection) -> Result<()> {
        match direction {
            CameraDirection::Forward => self.command("downvision 0"),
            CameraDirection::Downward => self.command("downvision 1"),
        }
    }
}

impl Drop for TelloLink {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::error!("tello link: {}", err);
        }
    }
}

fn run_state_listener(
    socket: UdpSocket,
    latest_state: Arc<Mutex<Option<Telemetry>>>,
    shutdown: Arc<AtomicBool>,
) {
    let mut buf = [0u8; MAX_DATAGRAM];
    let mut rejected = 0u64;
    while !shutdown.load(Ordering::SeqCst) {
        match socket.recv_from(&mut buf) {
            Ok((len, _)) => {
                let raw = String::from_utf8_lossy(&buf[..len]);
                match Telemetry::parse(&raw) {
                    Ok(telemetry) => {
                        if let Ok(mut slot) = latest_state.lock() {
                            *slot = Some(telemetry);
                        }
                    }
                    Err(err) => {
                        rejected += 1;
                        log::debug!("telemetry: {}", err);
                    }
                }
            }
            Err(err) if is_timeout(&err) => continue,
            Err(err) => {
                log::error!("telemetry listener stopped: {}", err);
                break;
            }
        }
    }
    if rejected > 0 {
        log::debug!("telemetry: {} malformed datagrams", rejected);
    }
}

fn is_timeout(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

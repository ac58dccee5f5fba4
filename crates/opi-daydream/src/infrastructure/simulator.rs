//! A simulated Daydream headset.
//!
//! Listens on TCP and plays the device side of the protocol well enough for
//! integration tests and dry runs of stimulus scripts:
//!
//! - `OPI_GET_RES` → the configured [`ScreenGeometry`].
//! - `OPI_IMAGE w h` → `READY`, reads `w × h × 3` bytes, then `OK`.
//!   Oversized or unparsable announcements are answered with `ERROR` and no
//!   payload is read.
//! - `OPI_MONO_PRESENT` → fault code 0 if that eye has no background yet,
//!   code 1 if no image was uploaded, otherwise the configured reply.
//! - `OPI_MONO_SET_BG` / `OPI_MONO_BG_ADD` → `OK`.
//! - `OPI_CLOSE` → `OK`, then the connection ends.
//! - Anything else → `ERROR`.
//!
//! Every command line received is appended to a shared [`CommandLog`].
//! Each accepted connection is served by its own Tokio task; the reachability
//! probe that `DeviceSession::initialise` makes simply connects and hangs up.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use opi_core::domain::image::BYTES_PER_PIXEL;
use opi_core::{DeviceFault, Eye, PresentReply, ScreenGeometry};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::Mutex;
use tokio::time;
use tracing::{debug, error, info, warn};

/// Largest image the simulator will accept, in bytes.
const MAX_IMAGE_BYTES: usize = 64 * 1024 * 1024;

/// How the simulated headset answers.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub geometry: ScreenGeometry,
    /// Reply sent to every present once background and image are set.
    pub present_reply: PresentReply,
    /// Delay before answering a present, standing in for the subject.
    pub reaction_delay: Duration,
    /// When `false`, every `OPI_IMAGE` is refused with `ERROR`.
    pub accept_images: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            geometry: ScreenGeometry {
                width: 2880,
                height: 1440,
                eye_width: 1440,
                eye_height: 1440,
            },
            present_reply: PresentReply {
                seen: 1,
                time: 350.0,
            },
            reaction_delay: Duration::ZERO,
            accept_images: true,
        }
    }
}

/// Command lines received by a simulated headset, across all connections.
#[derive(Debug, Clone, Default)]
pub struct CommandLog(Arc<Mutex<Vec<String>>>);

impl CommandLog {
    async fn push(&self, line: &str) {
        self.0.lock().await.push(line.to_string());
    }

    /// A copy of every line received so far, oldest first.
    pub async fn commands(&self) -> Vec<String> {
        self.0.lock().await.clone()
    }
}

/// A bound, not yet running, simulated headset.
pub struct SimulatedHeadset {
    listener: TcpListener,
    config: Arc<SimulatorConfig>,
    log: CommandLog,
}

impl SimulatedHeadset {
    /// Binds the listener.  Use port 0 to let the OS pick one.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn bind(addr: impl ToSocketAddrs, config: SimulatorConfig) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .context("failed to bind simulated headset")?;
        Ok(Self {
            listener,
            config: Arc::new(config),
            log: CommandLog::default(),
        })
    }

    /// The address the simulator is listening on.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket's local address cannot be read.
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("simulated headset has no local address")
    }

    /// A handle on the command log; stays valid after `run` takes `self`.
    pub fn log(&self) -> CommandLog {
        self.log.clone()
    }

    /// Accepts connections forever, one task per connection.
    pub async fn run(self) {
        match self.listener.local_addr() {
            Ok(addr) => info!("simulated daydream listening on {addr}"),
            Err(e) => warn!("simulated daydream listening on unknown address: {e}"),
        }

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    debug!("simulator: connection from {peer}");
                    let config = Arc::clone(&self.config);
                    let log = self.log.clone();
                    tokio::spawn(async move {
                        handle_connection(stream, peer, config, log).await;
                    });
                }
                Err(e) => error!("simulator accept error: {e}"),
            }
        }
    }
}

// ── Per-connection handler ────────────────────────────────────────────────────

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    config: Arc<SimulatorConfig>,
    log: CommandLog,
) {
    match serve(stream, &config, &log).await {
        Ok(()) => debug!("simulator: {peer} disconnected"),
        Err(e) => warn!("simulator: {peer} dropped with error: {e:#}"),
    }
}

/// Device-side state of one connection.
#[derive(Debug, Default)]
struct HeadsetState {
    backgrounds: HashSet<Eye>,
    image_loaded: bool,
}

async fn serve(
    stream: TcpStream,
    config: &SimulatorConfig,
    log: &CommandLog,
) -> anyhow::Result<()> {
    let mut stream = BufReader::new(stream);
    let mut state = HeadsetState::default();
    let mut line = String::new();

    loop {
        line.clear();
        if stream.read_line(&mut line).await? == 0 {
            return Ok(());
        }
        let command = line.trim_end_matches(['\r', '\n']);
        log.push(command).await;
        debug!("simulator <- {command}");

        let mut args = command.split_whitespace();
        match args.next().unwrap_or_default() {
            "OPI_GET_RES" => {
                stream.write_all(&config.geometry.encode()).await?;
            }
            "OPI_IMAGE" => {
                let Some(len) = image_len(args.next(), args.next()) else {
                    stream.write_all(b"ERROR\n").await?;
                    continue;
                };
                if !config.accept_images {
                    stream.write_all(b"ERROR\n").await?;
                    continue;
                }
                stream.write_all(b"READY\n").await?;
                let mut payload = vec![0u8; len];
                stream
                    .read_exact(&mut payload)
                    .await
                    .context("short image payload")?;
                state.image_loaded = true;
                stream.write_all(b"OK\n").await?;
            }
            "OPI_MONO_PRESENT" => {
                let eye = args.next().and_then(|e| e.parse::<Eye>().ok());
                let reply = match eye {
                    Some(eye) if !state.backgrounds.contains(&eye) => {
                        fault(DeviceFault::BackgroundNotSet)
                    }
                    Some(_) if !state.image_loaded => fault(DeviceFault::StimImage),
                    Some(_) => {
                        time::sleep(config.reaction_delay).await;
                        config.present_reply
                    }
                    None => fault(DeviceFault::PresentFailed),
                };
                stream.write_all(&reply.encode()).await?;
            }
            "OPI_MONO_SET_BG" => match args.next().and_then(|e| e.parse::<Eye>().ok()) {
                Some(eye) => {
                    state.backgrounds.insert(eye);
                    stream.write_all(b"OK\n").await?;
                }
                None => stream.write_all(b"ERROR\n").await?,
            },
            "OPI_MONO_BG_ADD" => {
                stream.write_all(b"OK\n").await?;
            }
            "OPI_CLOSE" => {
                stream.write_all(b"OK\n").await?;
                stream.flush().await?;
                return Ok(());
            }
            other => {
                warn!("simulator: unknown command {other:?}");
                stream.write_all(b"ERROR\n").await?;
            }
        }
        stream.flush().await?;
    }
}

fn image_len(width: Option<&str>, height: Option<&str>) -> Option<usize> {
    let width: usize = width?.parse().ok()?;
    let height: usize = height?.parse().ok()?;
    let len = width.checked_mul(height)?.checked_mul(BYTES_PER_PIXEL)?;
    (len <= MAX_IMAGE_BYTES).then_some(len)
}

fn fault(code: DeviceFault) -> PresentReply {
    PresentReply {
        seen: 0,
        time: code.code(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

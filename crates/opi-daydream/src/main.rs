//! OPI Daydream command-line entry point.
//!
//! Loads the configuration, installs logging, then either drives a headset
//! through one OPI session or runs the simulated headset.
//!
//! # Commands
//!
//! ```text
//! opi-daydream query                          snapshot of the device as JSON
//! opi-daydream background --lum 10            set an eye's background
//! opi-daydream present --x 3 --y -3 ...       one static stimulus
//! opi-daydream run --stimuli field.toml       a scripted list of stimuli
//! opi-daydream simulate --port 50008          the simulated headset
//! ```
//!
//! Every device command opens its own session and closes it before exiting.
//! Results go to stdout as JSON; logs go to stderr.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use opi_core::{Eye, Fixation, PresentReply, Rgb, StaticStimulus, Stimulus};
use opi_daydream::application::opi::BackgroundRequest;
use opi_daydream::application::present_series::PresentSeriesUseCase;
use opi_daydream::infrastructure::config::{load_config, load_stimulus_script, AppConfig};
use opi_daydream::infrastructure::session::DeviceSession;
use opi_daydream::infrastructure::simulator::{SimulatedHeadset, SimulatorConfig};

#[derive(Parser)]
#[command(author, version, about = "OPI client for the Daydream VR perimetry headset", long_about = None)]
struct Cli {
    /// Config file (default: the platform config directory)
    #[arg(long, env = "OPI_DAYDREAM_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Headset IP address, overriding the config file
    #[arg(long, env = "OPI_DAYDREAM_IP", global = true)]
    ip: Option<String>,

    /// Headset port, overriding the config file
    #[arg(long, env = "OPI_DAYDREAM_PORT", global = true)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Device(DeviceCommands),

    /// Run the simulated headset until Ctrl-C
    Simulate {
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,

        /// Reaction time reported for every present, in ms
        #[arg(long, default_value_t = 350.0)]
        reaction_ms: f64,
    },
}

/// Commands that run inside one device session.
#[derive(Subcommand)]
enum DeviceCommands {
    /// Connect and print the session snapshot
    Query,

    /// Set an eye's background luminance and fixation mark
    Background(BackgroundArgs),

    /// Present one static stimulus
    Present {
        #[arg(long, default_value = "L")]
        eye: Eye,

        /// Horizontal position in degrees
        #[arg(long, allow_hyphen_values = true)]
        x: f64,

        /// Vertical position in degrees
        #[arg(long, allow_hyphen_values = true)]
        y: f64,

        /// Diameter in degrees (Goldmann III = 0.43)
        #[arg(long, default_value_t = 0.43)]
        size: f64,

        /// Luminance in cd/m²
        #[arg(long)]
        level: f64,

        /// Presentation time in ms
        #[arg(long, default_value_t = 200.0)]
        duration: f64,

        /// Time to wait for a response in ms
        #[arg(long, default_value_t = 1500.0)]
        response_window: f64,

        /// Set this background luminance (cd/m²) on the eye first
        #[arg(long)]
        background: Option<f64>,
    },

    /// Present every stimulus of a TOML script, one JSON line each
    Run {
        /// File of `[[stimulus]]` tables
        #[arg(long)]
        stimuli: PathBuf,

        /// Set this background luminance (cd/m²) on every eye used first
        #[arg(long)]
        background: Option<f64>,
    },
}

#[derive(Args)]
struct BackgroundArgs {
    /// Luminance in cd/m²
    #[arg(long)]
    lum: f64,

    #[arg(long, default_value = "L")]
    eye: Eye,

    /// `cross` or `none`
    #[arg(long, default_value = "cross")]
    fixation: Fixation,

    /// Side of the fixation image in pixels
    #[arg(long, default_value_t = 21)]
    fixation_size: u32,

    /// Fixation colour as `R,G,B`
    #[arg(long, default_value = "0,128,0")]
    fixation_color: Rgb,
}

impl From<BackgroundArgs> for BackgroundRequest {
    fn from(args: BackgroundArgs) -> Self {
        Self {
            lum: Some(args.lum),
            fixation: args.fixation,
            fixation_size: args.fixation_size,
            fixation_color: args.fixation_color,
            eye: args.eye,
            ..Self::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(ip) = cli.ip {
        config.device.ip = ip;
    }
    if let Some(port) = cli.port {
        config.device.port = port;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("OPI Daydream {} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Simulate { bind, reaction_ms } => {
            simulate(&bind, config.device.port, reaction_ms).await
        }
        Commands::Device(command) => {
            let mut session = open_session(&config).await?;
            let outcome = run_command(&mut session, command).await;
            let closed = session.close().await;
            outcome?;
            closed.context("failed to close session")
        }
    }
}

async fn open_session(config: &AppConfig) -> anyhow::Result<DeviceSession> {
    DeviceSession::initialise(
        &config.device,
        config.calibration.luminance_table(),
        Box::new(config.calibration.projection()),
    )
    .await
    .with_context(|| {
        format!(
            "failed to initialise daydream at {}",
            config.device.address()
        )
    })
}

async fn run_command(session: &mut DeviceSession, command: DeviceCommands) -> anyhow::Result<()> {
    match command {
        DeviceCommands::Query => {
            let snapshot = session.query_device();
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        DeviceCommands::Background(args) => {
            session
                .set_background(&args.into())
                .await
                .context("set background failed")?;
        }
        DeviceCommands::Present {
            eye,
            x,
            y,
            size,
            level,
            duration,
            response_window,
            background,
        } => {
            if let Some(lum) = background {
                set_plain_background(session, lum, eye).await?;
            }
            let stim = StaticStimulus::new(eye, x, y, size, level, duration, response_window);
            let response = session
                .present(&stim.into(), None)
                .await
                .context("present failed")?;
            println!("{}", serde_json::to_string(&response)?);
        }
        DeviceCommands::Run {
            stimuli,
            background,
        } => {
            let script = load_stimulus_script(&stimuli)
                .with_context(|| format!("failed to load {}", stimuli.display()))?;

            if let Some(lum) = background {
                let mut eyes: Vec<Eye> = Vec::new();
                for eye in script.iter().filter_map(|s| s.eye) {
                    if !eyes.contains(&eye) {
                        eyes.push(eye);
                    }
                }
                for eye in eyes {
                    set_plain_background(session, lum, eye).await?;
                }
            }

            let stimuli: Vec<Stimulus> = script.into_iter().map(Stimulus::from).collect();
            let records = PresentSeriesUseCase::new(session)
                .run(&stimuli)
                .await
                .context("stimulus series aborted")?;
            for record in &records {
                println!("{}", serde_json::to_string(record)?);
            }
        }
    }
    Ok(())
}

async fn set_plain_background(session: &mut DeviceSession, lum: f64, eye: Eye) -> anyhow::Result<()> {
    session
        .set_background(&BackgroundRequest::new(lum, eye))
        .await
        .with_context(|| format!("failed to set {eye} background"))
}

async fn simulate(bind: &str, port: u16, reaction_ms: f64) -> anyhow::Result<()> {
    let config = SimulatorConfig {
        present_reply: PresentReply {
            seen: 1,
            time: reaction_ms as f32,
        },
        reaction_delay: Duration::try_from_secs_f64(reaction_ms.max(0.0) / 1000.0)
            .context("reaction time out of range")?,
        ..SimulatorConfig::default()
    };
    let headset = SimulatedHeadset::bind((bind, port), config).await?;
    info!("simulated headset on {}", headset.local_addr()?);

    tokio::select! {
        _ = headset.run() => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            info!("Ctrl-C received, stopping simulator");
        }
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

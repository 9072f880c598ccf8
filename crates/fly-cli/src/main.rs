use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use fly_control::doctor as control_doctor;
use fly_control::{pid, ControlConfig, ControlDispatcher, PidSettings};
use fly_link::doctor as link_doctor;
use fly_link::{LinkConfig, UdpLink};
use fly_proto::commander::{CommandFrame, THRUST_MAX};
use fly_proto::config::{test_frame, LoopKind, PidAxis, PidGains};

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug, Parser)]
#[command(name = "espfly", version, about = "ESP-FLY ground link - UDP control and telemetry")]
struct Cli {
    /// TOML config; built-in defaults are used when omitted.
    #[arg(long)]
    config: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate the configuration.
    Doctor,
    /// Connect, stream idle setpoints and print battery/console telemetry.
    Monitor {
        #[arg(long)]
        seconds: Option<u64>,
    },
    /// Hold a level hover, then emergency stop.
    Hover {
        #[arg(long)]
        thrust: Option<u16>,
        #[arg(long, default_value_t = 5)]
        seconds: u64,
    },
    Pid { #[command(subcommand)] cmd: PidCmd },
    /// Send a diagnostic text frame; the device logs it.
    Ping { message: String },
}

#[derive(Debug, Subcommand)]
enum PidCmd {
    /// Push all rate and attitude gains from the config.
    Push,
    /// Ask the device to print its current gains on the console.
    Query,
    /// Send one gain set, e.g. `pid set rate roll 250 500 2.5`.
    Set {
        /// rate | attitude
        kind: String,
        /// roll | pitch | yaw
        axis: String,
        kp: f32,
        ki: f32,
        kd: f32,
    },
}

fn parse_loop(s: &str) -> Result<LoopKind> {
    match s.to_ascii_lowercase().as_str() {
        "rate" => Ok(LoopKind::Rate),
        "attitude" | "att" => Ok(LoopKind::Attitude),
        other => anyhow::bail!("unknown loop kind: {}", other),
    }
}

fn parse_axis(s: &str) -> Result<PidAxis> {
    match s.to_ascii_lowercase().as_str() {
        "roll" => Ok(PidAxis::Roll),
        "pitch" => Ok(PidAxis::Pitch),
        "yaw" => Ok(PidAxis::Yaw),
        other => anyhow::bail!("unknown axis: {}", other),
    }
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct Config {
    link: LinkConfig,
    control: ControlConfig,
    pid: PidSettings,
}

fn load_config(path: Option<&str>) -> Result<Config> {
    let Some(path) = path else { return Ok(Config::default()); };
    let s = std::fs::read_to_string(path).with_context(|| format!("read config {}", path))?;
    toml::from_str(&s).context("parse config toml")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_deref())?;

    match cli.cmd {
        Command::Doctor => doctor(&cfg),
        Command::Monitor { seconds } => monitor(&cfg, seconds).await,
        Command::Hover { thrust, seconds } => hover(&cfg, thrust, seconds).await,
        Command::Pid { cmd } => pid_cmd(&cfg, cmd).await,
        Command::Ping { message } => ping(&cfg, &message).await,
    }
}

fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");
    link_doctor::check_link(&cfg.link)?;
    control_doctor::check_control(&cfg.control)?;
    control_doctor::check_pid(&cfg.pid)?;
    if cfg.link.local_port == 0 {
        warn!("link.local_port=0: the device may not know where to reply");
    }
    info!("doctor: OK ({} -> local {})", cfg.link.remote(), cfg.link.local_port);
    Ok(())
}

async fn connect(cfg: &Config) -> Result<Arc<UdpLink>> {
    let link = Arc::new(UdpLink::new(cfg.link.clone()));
    link.connect().await.with_context(|| format!("connect {}", cfg.link.remote()))?;
    Ok(link)
}

/// Prints telemetry until the link is dropped.
fn spawn_printers(link: &UdpLink) -> Vec<JoinHandle<()>> {
    let mut battery = link.subscribe_battery();
    let mut console = link.subscribe_console();
    let mut status = link.subscribe_status();

    vec![
        tokio::spawn(async move {
            while battery.changed().await.is_ok() {
                let b = *battery.borrow_and_update();
                if let Some(b) = b {
                    println!("battery {:>3}% {:.2}V ({}mV) {:?}", b.level_pct, b.voltage_v, b.voltage_mv, b.state);
                }
            }
        }),
        tokio::spawn(async move {
            loop {
                match console.recv().await {
                    Ok(line) => println!("console> {}", line),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => warn!("console: skipped {} lines", n),
                    Err(_) => break,
                }
            }
        }),
        tokio::spawn(async move {
            while status.changed().await.is_ok() {
                let msg = status.borrow_and_update().clone();
                println!("link: {}", msg);
            }
        }),
    ]
}

/// Sleeps for `secs` (forever when None). Returns false if interrupted by Ctrl-C.
async fn wait_or_interrupt(secs: Option<u64>) -> bool {
    let timer = async {
        match secs {
            Some(s) => tokio::time::sleep(Duration::from_secs(s)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::select! {
        _ = timer => true,
        r = tokio::signal::ctrl_c() => {
            if let Err(e) = r { warn!("ctrl-c handler failed: {}", e); }
            info!("interrupted");
            false
        }
    }
}

async fn teardown(link: &UdpLink, ctl: Option<&ControlDispatcher>, printers: Vec<JoinHandle<()>>) {
    if let Some(ctl) = ctl {
        ctl.emergency_stop().await;
        // let the stop burst leave the queue
        tokio::time::sleep(Duration::from_millis(50)).await;
        ctl.shutdown();
    }
    link.disconnect().await;
    for p in printers {
        p.abort();
    }
}

async fn monitor(cfg: &Config, seconds: Option<u64>) -> Result<()> {
    let link = connect(cfg).await?;
    let printers = spawn_printers(&link);

    let ctl = ControlDispatcher::new(link.clone(), cfg.control.clone());
    ctl.start();

    wait_or_interrupt(seconds).await;
    teardown(&link, Some(&ctl), printers).await;
    Ok(())
}

async fn hover(cfg: &Config, thrust: Option<u16>, seconds: u64) -> Result<()> {
    let thrust = thrust.unwrap_or(cfg.control.hover_thrust);
    anyhow::ensure!(thrust <= THRUST_MAX, "thrust {} above {}", thrust, THRUST_MAX);

    let link = connect(cfg).await?;
    let printers = spawn_printers(&link);

    let ctl = ControlDispatcher::new(link.clone(), cfg.control.clone());
    ctl.set_frame(CommandFrame::hover(thrust));
    ctl.start();
    info!("hover: thrust {} for {}s", thrust, seconds);

    wait_or_interrupt(Some(seconds)).await;
    teardown(&link, Some(&ctl), printers).await;
    Ok(())
}

async fn pid_cmd(cfg: &Config, cmd: PidCmd) -> Result<()> {
    // validate arguments before touching the network
    let single = match &cmd {
        PidCmd::Set { kind, axis, kp, ki, kd } => {
            let gains = PidGains::new(*kp, *ki, *kd);
            let mut probe = cfg.pid.clone();
            let (kind, axis) = (parse_loop(kind)?, parse_axis(axis)?);
            probe.set(kind, axis, gains);
            control_doctor::check_pid(&probe)?;
            Some((kind, axis, gains))
        }
        _ => None,
    };

    let link = connect(cfg).await?;
    let printers = spawn_printers(&link);

    match cmd {
        PidCmd::Push => {
            let gap = Duration::from_millis(cfg.control.pid_push_gap_ms);
            let n = pid::push_all(&link, &cfg.pid, gap).await;
            anyhow::ensure!(n == 6, "only {} of 6 gain sets queued", n);
        }
        PidCmd::Query => {
            anyhow::ensure!(pid::query(&link), "link dropped before query");
        }
        PidCmd::Set { .. } => {
            if let Some((kind, axis, gains)) = single {
                anyhow::ensure!(pid::push_one(&link, axis, kind, gains), "link dropped before send");
            }
        }
    }

    // device answers on the console
    wait_or_interrupt(Some(2)).await;
    teardown(&link, None, printers).await;
    Ok(())
}

async fn ping(cfg: &Config, message: &str) -> Result<()> {
    let link = connect(cfg).await?;
    anyhow::ensure!(link.send(test_frame(message)), "link dropped before send");
    // give the send loop a moment before the socket goes away
    tokio::time::sleep(Duration::from_millis(100)).await;
    link.disconnect().await;
    Ok(())
}

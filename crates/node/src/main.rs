mod config;
mod simulation;

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use config::NodeConfig;
use twine::{NetworkMode, Role, Session};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Single,
    ClientServer,
    PeerToPeer,
}

impl From<ModeArg> for NetworkMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Single => Self::Single,
            ModeArg::ClientServer => Self::ClientServer,
            ModeArg::PeerToPeer => Self::PeerToPeer,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RoleArg {
    Client,
    Server,
    Host,
    Peer,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Client => Self::Client,
            RoleArg::Server => Self::Server,
            RoleArg::Host => Self::Host,
            RoleArg::Peer => Self::Peer,
        }
    }
}

#[derive(Parser)]
#[command(name = "twine-node")]
#[command(about = "Runs one participant of a synchronized session")]
struct Args {
    #[arg(short, long, help = "RON file providing the base configuration")]
    config: Option<PathBuf>,

    #[arg(short, long, value_enum)]
    mode: Option<ModeArg>,

    #[arg(short, long, value_enum)]
    role: Option<RoleArg>,

    #[arg(short, long, help = "Server or host address to join")]
    server: Option<String>,

    #[arg(short, long, help = "Address peers use to reach this node")]
    advertise: Option<String>,

    #[arg(long)]
    max_players: Option<u32>,

    #[arg(short, long)]
    tick_rate: Option<u32>,

    #[arg(short, long, help = "Exit after this many frames")]
    frames: Option<u64>,
}

impl Args {
    fn into_config(self) -> Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::load(path)?,
            None => NodeConfig::default(),
        };

        if let Some(mode) = self.mode {
            config.session.mode = mode.into();
        }
        if let Some(role) = self.role {
            config.session.role = role.into();
        }
        if let Some(server) = self.server {
            config.session.remote_addr = server;
        }
        if let Some(advertise) = self.advertise {
            config.session.advertise_addr = advertise;
        }
        if let Some(max_players) = self.max_players {
            config.session.max_players = max_players;
        }
        if let Some(tick_rate) = self.tick_rate {
            config.tick_rate = tick_rate;
        }
        if self.frames.is_some() {
            config.frames = self.frames;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config()?;
    anyhow::ensure!(config.tick_rate > 0, "tick rate must be positive");

    let session = Session::start(config.session.clone(), simulation::default_scene())
        .context("failed to start session")?;
    log::info!(
        "Running as {:?}, participant {}, {} Hz",
        session.info().topology,
        session.info().id,
        config.tick_rate
    );

    run(&session, &config);

    let stats = session.stats();
    log::info!(
        "Sent {} updates ({} bytes), received {} ({} bytes), admitted {}, removed {}",
        stats.updates_sent,
        stats.bytes_sent,
        stats.updates_received,
        stats.bytes_received,
        stats.participants_admitted,
        stats.entities_removed
    );
    session.shutdown();
    Ok(())
}

fn run(session: &Session, config: &NodeConfig) {
    let frame_time = Duration::from_secs_f64(1.0 / f64::from(config.tick_rate));
    let dt = frame_time.as_secs_f32();
    let start = Instant::now();
    let mut frame: u64 = 0;

    while config.frames.is_none_or(|limit| frame < limit) {
        let frame_start = Instant::now();

        simulation::step(
            session.store(),
            session.info(),
            start.elapsed().as_secs_f32(),
            dt,
            config.drift_radius,
        );
        let sent = session.broadcast();
        log::trace!("Frame {} sent {} updates", frame, sent);

        if frame % u64::from(config.tick_rate) == 0 {
            log::debug!(
                "{} entities, {} workers",
                session.store().len(),
                session.worker_count()
            );
        }

        frame += 1;
        if let Some(remaining) = frame_time.checked_sub(frame_start.elapsed()) {
            thread::sleep(remaining);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn flags_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "(session: (mode: ClientServer, role: Server, max_players: 8), tick_rate: 30)"
        )
        .unwrap();
        let path = file.path().to_str().unwrap();

        let args = Args::try_parse_from([
            "twine-node",
            "--config",
            path,
            "--role",
            "client",
            "--server",
            "10.0.0.2",
            "--frames",
            "5",
        ])
        .unwrap();
        let config = args.into_config().unwrap();

        assert_eq!(config.session.mode, NetworkMode::ClientServer);
        assert_eq!(config.session.role, Role::Client);
        assert_eq!(config.session.remote_addr, "10.0.0.2");
        assert_eq!(config.session.max_players, 8);
        assert_eq!(config.tick_rate, 30);
        assert_eq!(config.frames, Some(5));
    }

    #[test]
    fn defaults_without_file() {
        let config = Args::try_parse_from(["twine-node", "--mode", "peer-to-peer", "-r", "host"])
            .unwrap()
            .into_config()
            .unwrap();
        assert_eq!(config.session.mode, NetworkMode::PeerToPeer);
        assert_eq!(config.session.role, Role::Host);
        assert_eq!(config.tick_rate, 60);
        assert!(config.frames.is_none());
    }
}

//! Main application logic and lifecycle management.
//!
//! The [`Application`] runs one authoritative simulation and several client
//! simulations over the in-process loopback hub. Every participant keeps
//! writing to the scene for a fixed number of ticks; afterwards the host
//! waits for all replicas to agree and reports per-participant statistics.

use crate::cli::CliArgs;
use crate::config::AppConfig;
use crate::logging::display_banner;
use crate::scene::{self, Fingerprint};
use crate::signals::install_shutdown_handler;
use scene_sync::{
    LoopbackHub, PacketTransport, PeerId, Role, RootTree, SessionHandle, ShutdownState,
    Simulation, SimulationSession, SyncStats,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

type BoxError = Box<dyn std::error::Error>;

/// Outcome of a soak run.
#[derive(Debug, Clone)]
pub struct SoakReport {
    /// Ticks that actually ran (fewer if interrupted)
    pub ticks_run: u64,
    /// Whether every replica ended with the same replicated state
    pub converged: bool,
    /// Final counters per participant, server first
    pub stats: Vec<(PeerId, SyncStats)>,
}

/// Main application struct.
pub struct Application {
    /// Loaded application configuration
    config: AppConfig,
}

struct Participant {
    handle: SessionHandle,
    task: JoinHandle<Simulation>,
}

impl Application {
    /// Loads configuration, applies CLI overrides and validates the result.
    ///
    /// # Process
    ///
    /// 1. Load configuration from file (creating default if missing)
    /// 2. Apply command-line argument overrides
    /// 3. Validate merged configuration
    /// 4. Display startup banner
    pub async fn new(args: CliArgs) -> Result<Self, BoxError> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        if let Some(clients) = args.clients {
            config.session.clients = clients;
        }
        if let Some(ticks) = args.ticks {
            config.session.ticks = ticks;
        }
        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }
        if args.json_logs {
            config.logging.json_format = true;
        }

        config.validate()?;
        display_banner();
        Ok(Self::with_config(config))
    }

    /// Skips file loading; used by tests and embedders.
    pub fn with_config(config: AppConfig) -> Self {
        Self { config }
    }

    /// Runs the soak session until it completes or a termination signal arrives.
    pub async fn run(self) -> Result<SoakReport, BoxError> {
        info!("🌟 Starting scene host");
        self.log_configuration_summary();

        let stop = ShutdownState::new();
        install_shutdown_handler(stop.clone());

        let report = self.soak(stop).await?;
        log_final_statistics(&report);

        if !report.converged {
            error!("❌ Replicas diverged after {} ticks", report.ticks_run);
            return Err("replicas did not converge".into());
        }
        info!("✅ All {} replicas converged", report.stats.len());
        Ok(report)
    }

    /// Builds the session, drives writes for the configured number of ticks
    /// (or until `stop` is initiated), then checks convergence.
    pub async fn soak(&self, stop: ShutdownState) -> Result<SoakReport, BoxError> {
        let settings = &self.config.session;
        let types = scene::demo_types()?;
        let hub = LoopbackHub::new();
        let transport: Arc<dyn PacketTransport> = Arc::new(hub.clone());

        // Server: the scene is built during setup, so nothing is announced.
        let server_peer = PeerId::server();
        let mut server = Simulation::new(
            self.config.to_simulation_config(server_peer.clone(), Role::Server),
            types.clone(),
        );
        for definition in scene::world() {
            server.spawn_in(RootTree::World, definition)?;
        }
        for definition in scene::prefabs() {
            server.spawn_in(RootTree::Prefabs, definition)?;
        }
        server.start()?;
        let inbound = hub.connect(server_peer);
        let (session, server_handle) = SimulationSession::new(server, transport.clone(), inbound);
        let mut participants = vec![Participant {
            handle: server_handle.clone(),
            task: session.spawn(),
        }];

        for index in 1..=settings.clients {
            let peer = PeerId::new(format!("peer-{}", index));
            let inbound = hub.connect(peer.clone());
            let sim = Simulation::new(
                self.config.to_simulation_config(peer.clone(), Role::Client),
                types.clone(),
            );
            let (session, handle) = SimulationSession::new(sim, transport.clone(), inbound);
            let task = session.spawn();
            handle.with(|sim| sim.start()).await??;
            server_handle
                .with(move |sim| sim.on_peer_connected(peer))
                .await??;
            participants.push(Participant { handle, task });
        }
        info!("🔌 {} clients connected", settings.clients);

        let handles: Vec<SessionHandle> = participants.iter().map(|p| p.handle.clone()).collect();
        if !wait_for_convergence(&handles, settings.convergence_timeout_ms).await? {
            warn!("⚠️ Clients did not settle after joining");
        }

        // Each client owns one probe entity.
        for handle in &handles[1..] {
            let peer = handle.peer().clone();
            handle
                .with(move |sim| sim.spawn_in(RootTree::World, scene::probe(&peer)))
                .await??;
        }

        let mut ticker = tokio::time::interval(Duration::from_millis(settings.tick_interval_ms));
        let mut ticks_run = 0;
        while ticks_run < settings.ticks {
            tokio::select! {
                _ = stop.wait() => break,
                _ = ticker.tick() => {}
            }
            ticks_run += 1;
            if ticks_run % settings.write_interval_ticks == 0 {
                write_round(&handles, ticks_run).await?;
            }
            if ticks_run % 100 == 0 {
                let stats = handles[0].with(|sim| sim.stats().clone()).await?;
                info!(
                    "📊 Tick {} - server sent {} / received {} packets",
                    ticks_run, stats.packets_sent, stats.packets_received
                );
            }
        }
        if stop.is_shutdown_initiated() {
            warn!("🛑 Soak interrupted after {} ticks", ticks_run);
        }

        let converged = wait_for_convergence(&handles, settings.convergence_timeout_ms).await?;

        let mut stats = Vec::with_capacity(participants.len());
        for participant in &participants {
            participant.handle.shutdown();
        }
        for participant in participants {
            let sim = participant.task.await?;
            stats.push((sim.local_peer().clone(), sim.stats().clone()));
        }

        Ok(SoakReport {
            ticks_run,
            converged,
            stats,
        })
    }

    fn log_configuration_summary(&self) {
        let session = &self.config.session;
        info!("📋 Configuration Summary:");
        info!("  🤝 Clients: {}", session.clients);
        info!(
            "  ⏱️ Ticks: {} every {}ms",
            session.ticks, session.tick_interval_ms
        );
        info!("  ✍️ Writes every {} ticks", session.write_interval_ticks);
        info!("  📦 Max reports per packet: {}", session.max_reports_per_packet);
        info!("  📝 Log level: {}", self.config.logging.level);
    }
}

/// One write per participant: the server damages the hull, clients race
/// on the shared engine speed and bump their own probe counter.
async fn write_round(handles: &[SessionHandle], tick: u64) -> Result<(), BoxError> {
    for (index, handle) in handles.iter().enumerate() {
        let result = if index == 0 {
            handle
                .with(move |sim| sim.write_value(&scene::hull(), json!(100 - (tick % 100) as i64)))
                .await?
        } else {
            let peer = handle.peer().clone();
            handle
                .with(move |sim| {
                    sim.write_value(&scene::shared_speed(), json!(tick as f64 + index as f64 / 10.0))?;
                    let counter = scene::probe_ref(&peer);
                    sim.write_field(&counter, None, "counter", json!(tick))
                })
                .await?
        };
        if let Err(err) = result {
            debug!("Write by participant {} refused: {}", index, err);
        }
    }
    Ok(())
}

/// Polls every replica until their fingerprints match or the timeout passes.
async fn wait_for_convergence(handles: &[SessionHandle], timeout_ms: u64) -> Result<bool, BoxError> {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
    loop {
        let mut fingerprints = Vec::with_capacity(handles.len());
        for handle in handles {
            fingerprints.push(handle.with(|sim| Fingerprint::of(sim)).await?);
        }
        if fingerprints.windows(2).all(|pair| pair[0] == pair[1]) {
            debug!(
                "🔍 {} replicas agree on {} entities",
                fingerprints.len(),
                fingerprints.first().map_or(0, Fingerprint::entity_count)
            );
            return Ok(true);
        }
        if tokio::time::Instant::now() >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn log_final_statistics(report: &SoakReport) {
    info!("📊 Final statistics after {} ticks:", report.ticks_run);
    for (peer, stats) in &report.stats {
        info!(
            "  {} - sent {} | received {} | dropped {} | reported {} | applied {} | rejected {}",
            peer,
            stats.packets_sent,
            stats.packets_received,
            stats.packets_dropped,
            stats.values_reported,
            stats.values_applied,
            stats.values_rejected
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_config(clients: usize) -> AppConfig {
        let mut config = AppConfig::default();
        config.session.clients = clients;
        config.session.ticks = 20;
        config.session.tick_interval_ms = 5;
        config.session.write_interval_ticks = 2;
        config
    }

    #[tokio::test]
    async fn test_soak_converges() {
        let app = Application::with_config(quick_config(3));
        let report = app.soak(ShutdownState::new()).await.unwrap();

        assert!(report.converged);
        assert_eq!(report.ticks_run, 20);
        assert_eq!(report.stats.len(), 4);
        assert_eq!(report.stats[0].0, PeerId::server());
        for (_, stats) in &report.stats {
            assert_eq!(stats.packets_dropped, 0);
        }
        assert!(report.stats[0].1.values_applied > 0);
    }

    #[tokio::test]
    async fn test_soak_stops_early_on_shutdown() {
        let mut config = quick_config(1);
        config.session.ticks = 10_000;
        let app = Application::with_config(config);

        let stop = ShutdownState::new();
        let trigger = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.initiate_shutdown();
        });

        let report = app.soak(stop).await.unwrap();
        assert!(report.ticks_run < 10_000);
        assert!(report.converged);
    }
}

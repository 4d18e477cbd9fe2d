//! # Simulation Session
//!
//! Confines a [`Simulation`] to a single tokio task. The task owns the
//! simulation outright and multiplexes three inputs:
//!
//! - a periodic tick, which flushes dirty values
//! - the inbound byte stream from the transport
//! - commands submitted through a [`SessionHandle`]
//!
//! After every step the outbox is drained into the [`PacketTransport`].
//! Nothing else ever touches the tree, the registry or the ignore set, so
//! no locking is needed around them.

use crate::error::SessionError;
use crate::shutdown::ShutdownState;
use crate::sim::Simulation;
use crate::transport::{Inbound, PacketTransport};
use crate::types::PeerId;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// A closure run on the session task with exclusive access to the simulation.
pub type Command = Box<dyn FnOnce(&mut Simulation) + Send>;

/// Driver owning one simulation.
pub struct SimulationSession {
    sim: Simulation,
    transport: Arc<dyn PacketTransport>,
    inbound: Inbound,
    commands: mpsc::UnboundedReceiver<Command>,
    shutdown: ShutdownState,
}

/// Cloneable access to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    peer: PeerId,
    commands: mpsc::UnboundedSender<Command>,
    shutdown: ShutdownState,
}

impl SimulationSession {
    /// Wraps a simulation.
    ///
    /// # Arguments
    ///
    /// * `sim` - The simulation to drive
    /// * `transport` - Where outbound packets go
    /// * `inbound` - Encoded envelopes addressed to this participant
    pub fn new(
        sim: Simulation,
        transport: Arc<dyn PacketTransport>,
        inbound: Inbound,
    ) -> (Self, SessionHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = ShutdownState::new();
        let handle = SessionHandle {
            peer: sim.local_peer().clone(),
            commands: tx,
            shutdown: shutdown.clone(),
        };
        let session = Self {
            sim,
            transport,
            inbound,
            commands: rx,
            shutdown,
        };
        (session, handle)
    }

    /// Runs the session on its own task. The simulation is handed back when it ends.
    pub fn spawn(self) -> JoinHandle<Simulation> {
        tokio::spawn(self.run())
    }

    /// Drives the simulation until shutdown, the inbound stream ends, or
    /// every handle is dropped.
    pub async fn run(mut self) -> Simulation {
        let period = Duration::from_millis(self.sim.config().tick_interval_ms.max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let shutdown = self.shutdown.clone();

        info!("🚀 Session for {} running ({:?} ticks)", self.sim.local_peer(), period);

        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = ticker.tick() => {
                    self.sim.tick();
                }
                bytes = self.inbound.recv() => match bytes {
                    // Failures are logged and counted by the simulation.
                    Some(bytes) => {
                        let _ = self.sim.receive_bytes(&bytes);
                    }
                    None => {
                        debug!("Inbound stream for {} closed", self.sim.local_peer());
                        break;
                    }
                },
                command = self.commands.recv() => match command {
                    Some(command) => command(&mut self.sim),
                    None => break,
                },
            }
            self.flush_outbox().await;
        }

        self.sim.tick();
        self.flush_outbox().await;
        self.sim.stop();
        shutdown.complete_shutdown();
        info!(
            "📊 Session for {} finished: {:?}",
            self.sim.local_peer(),
            self.sim.stats()
        );
        self.sim
    }

    async fn flush_outbox(&mut self) {
        let from = self.sim.local_peer().clone();
        for outbound in self.sim.drain_outbox() {
            if let Err(err) = self.transport.send(&from, outbound).await {
                warn!("❌ Transport send from {} failed: {}", from, err);
            }
        }
    }
}

impl SessionHandle {
    /// Identity of the simulation when the session was created.
    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    /// Runs `f` on the session task and returns its result.
    pub async fn with<R, F>(&self, f: F) -> Result<R, SessionError>
    where
        F: FnOnce(&mut Simulation) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let command: Command = Box::new(move |sim| {
            let _ = tx.send(f(sim));
        });
        self.commands.send(command).map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Stops the session after its current step.
    pub fn shutdown(&self) {
        self.shutdown.initiate_shutdown();
    }

    pub fn shutdown_state(&self) -> &ShutdownState {
        &self.shutdown
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("peer", &self.peer)
            .field("closed", &self.commands.is_closed())
            .finish()
    }
}

//! # Scheduler
//!
//! The heartbeat of the console. Every tick it reads the current mode:
//!
//! - **AUTO**: decrement the countdown and publish a `tick` event carrying the
//!   remaining count. When the countdown reaches zero, fetch the registry,
//!   enrich it, publish the snapshot and reset the countdown.
//! - **MANUAL**: hold the countdown at its reset value. Nothing is published.
//!
//! A mode change is only observed at the next tick boundary. A failed fetch is
//! logged and the cycle is skipped; the countdown resets so a failing provider
//! is retried once per period, not on every tick.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use super::console::Console;
use super::dispatcher::HubMessage;
use super::mode::OperatingMode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
    /// Ticks between two snapshots.
    pub period_ticks: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            period_ticks: 60,
        }
    }
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// MANUAL: countdown held, nothing published.
    Idle,
    /// AUTO: countdown published, no snapshot due yet.
    Counted(u32),
    /// AUTO: snapshot published to this many subscribers.
    Published(usize),
    /// AUTO: snapshot was due but the fetch failed.
    Skipped,
}

pub struct Scheduler {
    console: Arc<Console>,
    config: SchedulerConfig,
    remaining: u32,
}

impl Scheduler {
    pub fn new(console: Arc<Console>, config: SchedulerConfig) -> Self {
        let config = SchedulerConfig {
            period_ticks: config.period_ticks.max(1),
            ..config
        };
        Self {
            remaining: config.period_ticks,
            console,
            config,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Runs one tick of the state machine.
    pub async fn tick(&mut self) -> TickOutcome {
        if self.console.current_mode().await == OperatingMode::Manual {
            self.remaining = self.config.period_ticks;
            return TickOutcome::Idle;
        }

        self.remaining = self.remaining.saturating_sub(1);
        self.console.hub().publish(HubMessage::tick(self.remaining));
        if self.remaining > 0 {
            return TickOutcome::Counted(self.remaining);
        }

        self.remaining = self.config.period_ticks;
        match self.console.broadcast_registry().await {
            Ok(delivered) => {
                log::debug!("Registry snapshot pushed to {} clients", delivered);
                TickOutcome::Published(delivered)
            }
            Err(e) => {
                log::error!("Error fetching registry for broadcast: {}", e);
                TickOutcome::Skipped
            }
        }
    }

    /// Ticks on a fixed interval until `shutdown` resolves.
    pub async fn run<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;

        log::info!(
            "Scheduler started: {:?} tick, snapshot every {} ticks",
            self.config.tick_interval,
            self.config.period_ticks
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    log::info!("Scheduler stopping");
                    break;
                }
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }
    }
}

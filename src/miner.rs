//! The miner driver: at most one engine run in flight, debounced restarts,
//! and crash respawn.
//!
//! The driver is a single task owning all mining bookkeeping (job
//! interlock, restart-pending flag, debounce timer). The node talks to it
//! only through commands; the engine talks back only through completion
//! reports and reads only the shared cancel word, so no mutable structure
//! crosses the node/miner boundary.

use crate::constants::MINER_RESPAWN_DELAY_MS;
use crate::mining::{mine, MiningOutcome};
use crate::node::Node;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub enum MinerCommand {
    /// Restart after the debounce window (tip or pool changed).
    ScheduleRestart,
    /// Turn mining on or off; off cancels the running job.
    SetEnabled(bool),
}

/// Cheap cloneable handle the node holds; dropping every handle stops the
/// driver.
#[derive(Clone)]
pub struct MinerHandle {
    commands: mpsc::UnboundedSender<MinerCommand>,
}

impl MinerHandle {
    pub fn schedule_restart(&self) {
        let _ = self.commands.send(MinerCommand::ScheduleRestart);
    }

    pub fn set_enabled(&self, enabled: bool) {
        let _ = self.commands.send(MinerCommand::SetEnabled(enabled));
    }
}

pub fn channel() -> (MinerHandle, mpsc::UnboundedReceiver<MinerCommand>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MinerHandle { commands: tx }, rx)
}

enum EngineReport {
    Finished(MiningOutcome),
    Crashed,
}

/// Drive the mining lifecycle for `node` until every command handle is
/// dropped.
pub(crate) async fn run_driver(
    node: Node,
    mut commands: mpsc::UnboundedReceiver<MinerCommand>,
) {
    let debounce = Duration::from_millis(node.config().debounce_ms);
    let (report_tx, mut reports) = mpsc::unbounded_channel::<EngineReport>();

    let mut enabled = node.mining_enabled();
    // Cancel word of the in-flight job; `Some` is the single-job interlock.
    let mut running: Option<Arc<AtomicBool>> = None;
    let mut restart_pending = false;
    let mut deadline: Option<Instant> = None;

    if enabled {
        deadline = Some(Instant::now());
    }

    loop {
        // A far-future stand-in keeps the select arm well-formed when no
        // timer is pending.
        let wake_at = deadline
            .unwrap_or_else(|| Instant::now() + Duration::from_secs(86_400));

        tokio::select! {
            command = commands.recv() => match command {
                None => {
                    if let Some(cancel) = &running {
                        cancel.store(true, Ordering::Relaxed);
                    }
                    debug!("miner driver shutting down");
                    return;
                }
                Some(MinerCommand::ScheduleRestart) => {
                    if enabled {
                        deadline = Some(Instant::now() + debounce);
                    }
                }
                Some(MinerCommand::SetEnabled(true)) => {
                    if !enabled {
                        enabled = true;
                        info!("mining enabled");
                        deadline = Some(Instant::now());
                    }
                }
                Some(MinerCommand::SetEnabled(false)) => {
                    if enabled {
                        enabled = false;
                        restart_pending = false;
                        deadline = None;
                        if let Some(cancel) = &running {
                            cancel.store(true, Ordering::Relaxed);
                        }
                        info!("mining disabled");
                    }
                }
            },

            report = reports.recv() => {
                // The report channel outlives every job because the driver
                // holds the sender; recv can only yield Some here.
                let Some(report) = report else { return };
                running = None;
                match report {
                    EngineReport::Finished(MiningOutcome::Mined(block)) => {
                        node.ingest_mined_block(block).await;
                    }
                    EngineReport::Finished(MiningOutcome::Canceled) => {
                        debug!("mining job canceled");
                    }
                    EngineReport::Crashed => {
                        warn!("mining engine crashed, respawning after backoff");
                        if enabled {
                            deadline = Some(
                                Instant::now()
                                    + Duration::from_millis(MINER_RESPAWN_DELAY_MS),
                            );
                        }
                    }
                }
                // Success and cancellation both release the interlock and
                // let a pending restart fire.
                if restart_pending && enabled && running.is_none() {
                    restart_pending = false;
                    running = Some(spawn_job(&node, &report_tx));
                }
            },

            _ = tokio::time::sleep_until(wake_at), if deadline.is_some() => {
                deadline = None;
                if !enabled {
                    // Disabled between scheduling and firing; nothing to do.
                } else if let Some(cancel) = &running {
                    cancel.store(true, Ordering::Relaxed);
                    restart_pending = true;
                } else {
                    running = Some(spawn_job(&node, &report_tx));
                }
            },
        }
    }
}

/// Snapshot a candidate under the node lock and hand it to the engine on a
/// blocking worker. The returned cancel word is the only shared state.
fn spawn_job(
    node: &Node,
    report_tx: &mpsc::UnboundedSender<EngineReport>,
) -> Arc<AtomicBool> {
    let template = node.build_mining_template();
    debug!(height = template.height, txs = template.data.txs.len(), "mining job started");
    let cancel = Arc::new(AtomicBool::new(false));
    let engine_cancel = Arc::clone(&cancel);
    let report_tx = report_tx.clone();
    tokio::spawn(async move {
        let worker =
            tokio::task::spawn_blocking(move || mine(template, &engine_cancel));
        let report = match worker.await {
            Ok(outcome) => EngineReport::Finished(outcome),
            Err(_) => EngineReport::Crashed,
        };
        let _ = report_tx.send(report);
    });
    cancel
}

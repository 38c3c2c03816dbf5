//! EngineActor - owns the controller on a single task
//!
//! Commands, timer deadlines and trigger clock ticks are processed one at a
//! time, so the controller never needs a lock.

use chrono::Local;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use super::commands::EngineCommand;
use super::handle::EngineHandle;
use crate::controller::Controller;

pub struct EngineActor {
    controller: Controller,
    command_rx: mpsc::UnboundedReceiver<EngineCommand>,
    tick_interval: Duration,
    ticks: u64,
    commands_processed: u64,
}

impl EngineActor {
    /// Spawn the actor loop and return a handle to it
    pub fn spawn(controller: Controller, tick_interval: Duration) -> EngineHandle {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let modules = controller.services().modules.clone();

        let actor = EngineActor {
            controller,
            command_rx: cmd_rx,
            tick_interval,
            ticks: 0,
            commands_processed: 0,
        };
        tokio::spawn(actor.run());
        info!("EngineActor spawned");

        EngineHandle::new(cmd_tx, modules)
    }

    async fn run(mut self) {
        debug!("EngineActor run loop started");
        let period = self.tick_interval.max(Duration::from_millis(1));
        let mut clock = time::interval_at(Instant::now() + period, period);
        clock.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let deadline = self.controller.next_deadline();
            let timer = async move {
                match deadline {
                    Some(deadline) => time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                cmd = self.command_rx.recv() => {
                    let Some(cmd) = cmd else {
                        debug!("All engine handles dropped");
                        self.controller.shutdown();
                        break;
                    };
                    trace!(?cmd, "Processing command");
                    self.commands_processed += 1;
                    if !self.handle_command(cmd) {
                        break;
                    }
                }
                _ = timer => {
                    let fired = self.controller.run_due_timers(Instant::now());
                    trace!(fired, "Timers fired");
                }
                _ = clock.tick() => {
                    self.ticks += 1;
                    self.controller.tick(self.ticks, Local::now());
                }
            }
        }

        info!(
            commands = self.commands_processed,
            ticks = self.ticks,
            "EngineActor run loop terminated"
        );
    }

    /// Returns false when the loop should stop
    fn handle_command(&mut self, cmd: EngineCommand) -> bool {
        match cmd {
            EngineCommand::Press {
                control_id,
                pressed,
                surface_id,
                force,
            } => {
                if let Err(e) = self.controller.press_control(
                    &control_id,
                    pressed,
                    surface_id.as_deref(),
                    force,
                ) {
                    warn!("Press on {} rejected: {}", control_id, e);
                }
            }
            EngineCommand::Rotate {
                control_id,
                clockwise,
                surface_id,
            } => {
                if let Err(e) =
                    self.controller
                        .rotate_control(&control_id, clockwise, surface_id.as_deref())
                {
                    warn!("Rotation on {} rejected: {}", control_id, e);
                }
            }
            EngineCommand::FeedbackValues {
                connection_id,
                values,
            } => {
                self.controller
                    .update_feedback_values(&connection_id, &values);
            }
            EngineCommand::VariablesChanged(names) => {
                self.controller.on_variables_changed(&names);
            }
            EngineCommand::ClientConnected => {
                self.controller.client_connected();
            }
            EngineCommand::SignalReady => {
                let fired = self.controller.signal_ready();
                info!("🚀 Engine ready ({} startup events fired)", fired);
            }
            EngineCommand::UpdateSettings(settings) => {
                debug!(?settings, "Applying controller settings");
                self.controller.update_settings(settings);
            }
            EngineCommand::Call(f) => f(&mut self.controller),
            EngineCommand::Shutdown { response } => {
                info!("EngineActor received shutdown command");
                self.controller.shutdown();
                let _ = response.send(());
                return false;
            }
        }
        true
    }
}

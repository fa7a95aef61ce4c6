//! Robot motion control
//!
//! [`MotionControl`] is the capability set of the robot's sport service.
//! [`MotionExecutor`] turns parsed intents and remote commands into paced
//! sequences of those calls. Pacing is open loop: each primitive is followed
//! by a fixed sleep, and a running sequence is never interrupted.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::Result;
use crate::command::Intent;
use crate::config::CommandConfig;
use crate::net::RemoteCommand;

/// Linear speed for remote `forward`/`backward` in m/s
pub const REMOTE_LINEAR_SPEED: f32 = 0.6;

/// Yaw rate for remote `left`/`right` in rad/s
pub const REMOTE_YAW_RATE: f32 = 1.0;

/// Low level motion primitives
///
/// Calls are fire-and-forget; the caller paces repeated calls.
pub trait MotionControl: Send + Sync {
    /// Command body velocity: forward `vx`, lateral `vy` (m/s), `yaw_rate` (rad/s)
    ///
    /// # Errors
    ///
    /// Returns error if the backend rejects the call
    fn move_velocity(&self, vx: f32, vy: f32, yaw_rate: f32) -> Result<()>;

    /// Rise from lying down
    ///
    /// # Errors
    ///
    /// Returns error if the backend rejects the call
    fn stand_up(&self) -> Result<()>;

    /// Lie down
    ///
    /// # Errors
    ///
    /// Returns error if the backend rejects the call
    fn stand_down(&self) -> Result<()>;

    /// Enter balanced standing, ready to walk
    ///
    /// # Errors
    ///
    /// Returns error if the backend rejects the call
    fn balance_stand(&self) -> Result<()>;

    /// Select a gait
    ///
    /// # Errors
    ///
    /// Returns error if the backend rejects the call
    fn switch_gait(&self, gait: u8) -> Result<()>;
}

/// Backend that only logs, for running without a robot
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunMotion;

impl MotionControl for DryRunMotion {
    fn move_velocity(&self, vx: f32, vy: f32, yaw_rate: f32) -> Result<()> {
        tracing::info!(vx, vy, yaw_rate, "dry run: move");
        Ok(())
    }

    fn stand_up(&self) -> Result<()> {
        tracing::info!("dry run: stand up");
        Ok(())
    }

    fn stand_down(&self) -> Result<()> {
        tracing::info!("dry run: stand down");
        Ok(())
    }

    fn balance_stand(&self) -> Result<()> {
        tracing::info!("dry run: balance stand");
        Ok(())
    }

    fn switch_gait(&self, gait: u8) -> Result<()> {
        tracing::info!(gait, "dry run: switch gait");
        Ok(())
    }
}

/// Sleeps between motion primitives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionPacing {
    /// After each walking step
    pub step_interval: Duration,
    /// After each turn step
    pub turn_interval: Duration,
    /// Between standing up and balancing
    pub stand_settle: Duration,
}

impl MotionPacing {
    /// No pacing at all
    #[must_use]
    pub const fn immediate() -> Self {
        Self {
            step_interval: Duration::ZERO,
            turn_interval: Duration::ZERO,
            stand_settle: Duration::ZERO,
        }
    }
}

impl From<&CommandConfig> for MotionPacing {
    fn from(config: &CommandConfig) -> Self {
        Self {
            step_interval: Duration::from_millis(config.step_interval_ms),
            turn_interval: Duration::from_millis(config.turn_interval_ms),
            stand_settle: Duration::from_millis(config.stand_settle_ms),
        }
    }
}

/// Runs intents against a motion backend
///
/// Every public entry point blocks for the full paced sequence and holds an
/// internal lock, so voice plans and remote commands never interleave. Call
/// from a blocking context (`tokio::task::spawn_blocking`).
pub struct MotionExecutor {
    backend: Arc<dyn MotionControl>,
    pacing: MotionPacing,
    lock: Mutex<()>,
}

impl MotionExecutor {
    /// Create an executor
    #[must_use]
    pub fn new(backend: Arc<dyn MotionControl>, pacing: MotionPacing) -> Self {
        Self {
            backend,
            pacing,
            lock: Mutex::new(()),
        }
    }

    /// Execute one intent
    ///
    /// # Errors
    ///
    /// Returns the first backend error; the remaining steps are skipped
    pub fn execute(&self, intent: &Intent) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.run(intent)
    }

    /// Execute intents in order as one uninterrupted sequence
    ///
    /// # Errors
    ///
    /// Returns the first backend error; later intents are skipped
    pub fn execute_all(&self, intents: &[Intent]) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        for intent in intents {
            self.run(intent)?;
        }
        Ok(())
    }

    /// Execute a command received from the cloud server
    ///
    /// # Errors
    ///
    /// Returns error if the backend rejects a call
    pub fn execute_remote(&self, command: RemoteCommand) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        tracing::info!(command = command.as_str(), "executing remote command");
        match command {
            RemoteCommand::Forward => self.backend.move_velocity(REMOTE_LINEAR_SPEED, 0.0, 0.0),
            RemoteCommand::Backward => self.backend.move_velocity(-REMOTE_LINEAR_SPEED, 0.0, 0.0),
            RemoteCommand::Left => self.backend.move_velocity(0.0, 0.0, REMOTE_YAW_RATE),
            RemoteCommand::Right => self.backend.move_velocity(0.0, 0.0, -REMOTE_YAW_RATE),
            RemoteCommand::Stop => self.backend.move_velocity(0.0, 0.0, 0.0),
            RemoteCommand::SitDown => self.backend.stand_down(),
            RemoteCommand::StandUp => self.stand_up(),
        }
    }

    fn run(&self, intent: &Intent) -> Result<()> {
        match *intent {
            Intent::Move {
                direction,
                steps,
                speed,
            } => {
                tracing::info!(direction, steps, speed, "walking");
                let vx = f32::from(direction) * speed;
                for _ in 0..steps {
                    self.backend.move_velocity(vx, 0.0, 0.0)?;
                    pause(self.pacing.step_interval);
                }
                self.backend.move_velocity(0.0, 0.0, 0.0)
            }
            Intent::Turn {
                direction,
                angle_deg,
                repeat,
            } => {
                tracing::info!(direction, angle_deg, repeat, "turning");
                let yaw = f32::from(direction) * angle_deg.to_radians();
                for _ in 0..repeat {
                    self.backend.move_velocity(0.0, 0.0, yaw)?;
                    pause(self.pacing.turn_interval);
                }
                self.backend.move_velocity(0.0, 0.0, 0.0)
            }
            Intent::StandUp => {
                tracing::info!("standing up");
                self.stand_up()
            }
            Intent::SitDown => {
                tracing::info!("sitting down");
                self.backend.stand_down()
            }
            Intent::AdjustSetting { .. } | Intent::SetMode(_) | Intent::Unmatched => Ok(()),
        }
    }

    fn stand_up(&self) -> Result<()> {
        self.backend.stand_up()?;
        pause(self.pacing.stand_settle);
        self.backend.balance_stand()
    }
}

fn pause(interval: Duration) {
    if !interval.is_zero() {
        std::thread::sleep(interval);
    }
}

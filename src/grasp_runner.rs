use futures_signals::signal::Mutable;
use log::{error, info, warn};
use tokio::sync;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};
use tokio::time::interval;

use crate::grasp_fsm::{GraspFsm, GraspState};
use crate::gripper_hal::{GripperHal, HalResult};
use crate::params::Params;

/// Latest snapshot out of the control loop: what the sensor said and what
/// got commanded on that tick.
#[derive(Debug, Clone, PartialEq)]
pub struct GraspStatus {
  pub state: GraspState,
  pub f_meas: f64,
  pub q_cmd: f64,
  pub z_cmd: f64,
  pub ticks: u64,
}

/// Ticks the grasp FSM against a HAL at the configured rate: read force,
/// step, re-send both servo targets. Runs until shut down or until the HAL
/// errors; either way the last word lands in `status`.
pub struct GraspRunner {
  handle: JoinHandle<()>,
  pub status: Mutable<HalResult<GraspStatus>>,
  shutdown: UnboundedSender<()>,
}

impl GraspRunner {
  pub async fn start(mut hal: Box<dyn GripperHal + Send>, prm: Params) -> anyhow::Result<Self> {
    let fsm = GraspFsm::new(&prm)?;
    hal.calibrate()?;

    let control_hz = 1.0 / prm.dt;
    let sensor_hz = hal.force_sensor_frequency_hz()?;
    if control_hz > f64::from(sensor_hz) {
      warn!("Control rate {control_hz:.0} Hz outruns the force sensor at {sensor_hz} Hz; \
             readings will repeat across ticks");
    }

    // Start open at ground level, then publish what the sensor sees there.
    hal.command_jaw(fsm.q_cmd(), prm.jaw_force)?;
    hal.command_lift(fsm.z_cmd(), prm.lift_force)?;
    let f_meas = hal.current_force_n()?;
    let status = Mutable::new(Ok(GraspStatus {
      state: fsm.state(),
      f_meas,
      q_cmd: fsm.q_cmd(),
      z_cmd: fsm.z_cmd(),
      ticks: 0,
    }));

    let status_for_async = status.clone();
    let (shutdown_tx, shutdown_rx) = sync::mpsc::unbounded_channel::<()>();
    let handle = tokio::spawn(async move {
      run_control_loop(hal, fsm, prm, status_for_async, shutdown_rx).await;
      info!("Control loop stopped");
    });
    Ok(Self { handle, status, shutdown: shutdown_tx })
  }
}

async fn run_control_loop(
    mut hal: Box<dyn GripperHal + Send>,
    mut fsm: GraspFsm,
    prm: Params,
    status: Mutable<HalResult<GraspStatus>>,
    mut shutdown: UnboundedReceiver<()>) {
  let mut interval = interval(Duration::from_secs_f64(prm.dt));
  interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
  let mut ticks: u64 = 0;
  let mut last_state = fsm.state();
  loop {
    tokio::select! {
      _ = interval.tick() => {
        ticks += 1;
        match tick_once(hal.as_mut(), &mut fsm, &prm, ticks) {
          Ok(snapshot) => {
            if snapshot.state != last_state {
              info!(
                  "tick {}: {:?} -> {:?} (F={:.2} N, q={:.4} m, z={:.4} m)",
                  ticks, last_state, snapshot.state, snapshot.f_meas,
                  snapshot.q_cmd, snapshot.z_cmd);
              last_state = snapshot.state;
            }
            status.set(Ok(snapshot));
          },
          Err(e) => {
            error!("tick {ticks}: HAL failure: {e}");
            status.set(Err(e));
            return;
          },
        }
      },
      _ = shutdown.recv() => {
        return;
      },
    }
  }
}

fn tick_once(
    hal: &mut dyn GripperHal,
    fsm: &mut GraspFsm,
    prm: &Params,
    ticks: u64) -> HalResult<GraspStatus> {
  let f_meas = hal.current_force_n()?;
  let (state, q_cmd, z_cmd) = fsm.step(f_meas, prm);
  hal.command_jaw(q_cmd, prm.jaw_force)?;
  hal.command_lift(z_cmd, prm.lift_force)?;
  Ok(GraspStatus { state, f_meas, q_cmd, z_cmd, ticks })
}

impl Drop for GraspRunner {
  fn drop(&mut self) {
    // The loop may already be gone if the HAL errored out.
    self.shutdown.send(()).ok();
  }
}

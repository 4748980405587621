use thiserror::Error;

#[derive(Error, PartialEq, Clone, Debug)]
pub enum HalError {
  #[error("{0}")]
  DeviceNotConnected(String),
  #[error("{0}")]
  InternalError(String),
}

pub type HalResult<T> = Result<T, HalError>;

/// Boundary to whatever actually moves the gripper: a physics backend in
/// bench runs, real servo hardware otherwise. Commands are position-servo
/// targets and are safe to re-send every tick.
pub trait GripperHal {
  fn calibrate(&mut self) -> HalResult<()>;

  /// Native update rate of the fingertip force sensing.
  fn force_sensor_frequency_hz(&self) -> HalResult<u32>;

  /// Summed contact-normal force across the fingertip surfaces, in newtons.
  /// Zero when nothing is touching.
  fn current_force_n(&self) -> HalResult<f64>;

  /// Drive both jaws inward to `position` meters (0 = fully open), limiting
  /// each servo to `max_force` newtons.
  fn command_jaw(&mut self, position: f64, max_force: f64) -> HalResult<()>;

  /// Drive the lift carriage to `position` meters above start height.
  fn command_lift(&mut self, position: f64, max_force: f64) -> HalResult<()>;
}

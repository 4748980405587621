use log::trace;

use crate::gripper_hal::{GripperHal, HalResult};

/// Stand-in backend: a compliant block sitting between the jaws. No force
/// until the commanded travel passes the contact point, then linear in the
/// overlap. Servo tracking is assumed perfect (the command *is* the
/// position), which is plenty to exercise the controller end to end.
pub struct GripperHalMock {
    /// Jaw travel at which the fingertips meet the block (m).
    contact_q: f64,
    /// Block stiffness (N/m of overlap).
    stiffness: f64,
    jaw_cmd: f64,
    lift_cmd: f64,
}

impl GripperHalMock {
    pub fn new(contact_q: f64, stiffness: f64) -> Self {
        Self {
            contact_q,
            stiffness,
            jaw_cmd: 0.0,
            lift_cmd: 0.0,
        }
    }

    pub fn jaw_cmd(&self) -> f64 {
        self.jaw_cmd
    }

    pub fn lift_cmd(&self) -> f64 {
        self.lift_cmd
    }
}

impl Default for GripperHalMock {
    /// Soft enough that the default proportional gain converges instead of
    /// bouncing off the safety cap.
    fn default() -> Self {
        Self::new(0.006, 800.0)
    }
}

impl GripperHal for GripperHalMock {
    fn calibrate(&mut self) -> HalResult<()> {
        trace!("calibrate: jaw and lift re-zeroed");
        self.jaw_cmd = 0.0;
        self.lift_cmd = 0.0;
        Ok(())
    }

    fn force_sensor_frequency_hz(&self) -> HalResult<u32> {
        Ok(240)
    }

    fn current_force_n(&self) -> HalResult<f64> {
        let overlap = self.jaw_cmd - self.contact_q;
        let answer = if overlap > 0.0 { self.stiffness * overlap } else { 0.0 };
        trace!("current_force_n: {answer:.3}");
        Ok(answer)
    }

    fn command_jaw(&mut self, position: f64, max_force: f64) -> HalResult<()> {
        trace!("command_jaw: {position:.4} m (max {max_force} N)");
        self.jaw_cmd = position;
        Ok(())
    }

    fn command_lift(&mut self, position: f64, max_force: f64) -> HalResult<()> {
        trace!("command_lift: {position:.4} m (max {max_force} N)");
        self.lift_cmd = position;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_force_before_contact() {
        let mut hal = GripperHalMock::new(0.006, 800.0);
        hal.command_jaw(0.005, 80.0).unwrap();
        assert_eq!(hal.current_force_n().unwrap(), 0.0);
    }

    #[test]
    fn test_force_linear_in_overlap() {
        let mut hal = GripperHalMock::new(0.006, 800.0);
        hal.command_jaw(0.016, 80.0).unwrap();
        assert!((hal.current_force_n().unwrap() - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_calibrate_rezeros() {
        let mut hal = GripperHalMock::default();
        hal.command_jaw(0.02, 80.0).unwrap();
        hal.command_lift(0.1, 200.0).unwrap();
        hal.calibrate().unwrap();
        assert_eq!(hal.jaw_cmd(), 0.0);
        assert_eq!(hal.lift_cmd(), 0.0);
        assert_eq!(hal.current_force_n().unwrap(), 0.0);
    }
}

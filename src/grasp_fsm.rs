use crate::params::{Params, ParamsError};

/// Tolerance for "command has reached a joint bound" checks.
const BOUND_EPS: f64 = 1e-6;

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum GraspState {
    /// Closing open-loop until the fingertips report contact.
    ClosingToContact,
    /// Proportional force regulation toward `f_des`.
    ForceRegulate,
    /// One settling correction before the lift begins.
    Hold,
    /// Lifting while continuing to regulate grip force.
    Lift,
    /// Over-force retreat; reopens fully, then retries from the top.
    FailRecover,
}

/// FSM for force-limited pinch + lift (fingers-only version).
///
/// Jaw command convention:
///   q_cmd = q_open -> open
///   q_cmd increases -> close
///
/// Lift command convention:
///   z_cmd = 0 -> start height
///   z_cmd increases -> lift
///
/// `step` is a pure function of the previous state, the current force
/// reading and the params; it does no I/O and cannot fail. All outputs are
/// clamped, so a misbehaving sensor can degrade the grasp but never drive
/// the commands out of range.
#[derive(Debug, Clone)]
pub struct GraspFsm {
    state: GraspState,
    q_cmd: f64,
    z_cmd: f64,
    stable_counter: u32,
}

impl GraspFsm {
    pub fn new(prm: &Params) -> Result<Self, ParamsError> {
        prm.validate()?;
        Ok(Self {
            state: GraspState::ClosingToContact,
            q_cmd: prm.q_open,
            z_cmd: 0.0,
            stable_counter: 0,
        })
    }

    pub fn state(&self) -> GraspState {
        self.state
    }

    pub fn q_cmd(&self) -> f64 {
        self.q_cmd
    }

    pub fn z_cmd(&self) -> f64 {
        self.z_cmd
    }

    /// Advance one control tick. `f_meas` is the summed fingertip normal
    /// force in newtons; negative readings are treated as zero.
    pub fn step(&mut self, f_meas: f64, prm: &Params) -> (GraspState, f64, f64) {
        let f_meas = f_meas.max(0.0);

        match self.state {
            GraspState::ClosingToContact => {
                // Close slowly until contact; no force feedback exists yet.
                self.q_cmd = prm.q_closed.min(self.q_cmd + prm.close_speed);
                if f_meas > prm.contact_threshold {
                    self.state = GraspState::ForceRegulate;
                    self.stable_counter = 0;
                }
            }

            GraspState::ForceRegulate => {
                if f_meas > prm.f_max {
                    // Hard cap: back off a step and go recover.
                    self.q_cmd = prm.q_open.max(self.q_cmd - prm.emergency_open_step);
                    self.state = GraspState::FailRecover;
                    self.stable_counter = 0;
                } else {
                    let err = self.regulate(f_meas, prm);
                    if err.abs() < prm.stable_band {
                        self.stable_counter += 1;
                        if self.stable_counter > prm.settle_steps {
                            self.state = GraspState::Hold;
                        }
                    } else {
                        // Stability must be consecutive; no partial credit.
                        self.stable_counter = 0;
                    }
                }
            }

            GraspState::Hold => {
                if f_meas > prm.f_max {
                    self.state = GraspState::FailRecover;
                    self.stable_counter = 0;
                } else {
                    // One more settling correction, then straight to LIFT.
                    self.regulate(f_meas, prm);
                    self.state = GraspState::Lift;
                    self.z_cmd = 0.0;
                }
            }

            GraspState::Lift => {
                if f_meas > prm.f_max {
                    self.state = GraspState::FailRecover;
                    self.stable_counter = 0;
                } else {
                    // Keep compensating as the payload shifts during lift.
                    self.regulate(f_meas, prm);
                    self.z_cmd = prm.lift_max.min(self.z_cmd + prm.lift_speed);
                    // Terminal in practice: stays in LIFT at the ceiling.
                }
            }

            GraspState::FailRecover => {
                // Force reading is ignored here; just reopen, then retry.
                // z_cmd is deliberately left alone (abort the grasp at the
                // current height).
                self.q_cmd = prm.q_open.max(self.q_cmd - prm.emergency_open_step);
                if self.q_cmd <= prm.q_open + BOUND_EPS {
                    self.state = GraspState::ClosingToContact;
                }
            }
        }

        (self.state, self.q_cmd, self.z_cmd)
    }

    /// Proportional update: more force needed -> close further, too much
    /// force -> open slightly. Returns the force error.
    fn regulate(&mut self, f_meas: f64, prm: &Params) -> f64 {
        let err = prm.f_des - f_meas;
        let dq = prm.k_force * err;
        self.q_cmd = (self.q_cmd + dq).clamp(prm.q_open, prm.q_closed);
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_fsm() -> (GraspFsm, Params) {
        let prm = Params::default();
        let fsm = GraspFsm::new(&prm).unwrap();
        (fsm, prm)
    }

    #[test]
    fn test_rejects_bad_params() {
        let prm = Params { f_max: 10.0, f_des: 20.0, ..Default::default() };
        assert!(GraspFsm::new(&prm).is_err());
    }

    #[test]
    fn test_closes_monotonically_without_contact() {
        let (mut fsm, prm) = default_fsm();
        let mut last_q = fsm.q_cmd();
        for _ in 0..200 {
            let (state, q, z) = fsm.step(0.0, &prm);
            assert_eq!(state, GraspState::ClosingToContact);
            assert!(q >= last_q);
            assert!(q <= prm.q_closed);
            assert_eq!(z, 0.0);
            last_q = q;
        }
        assert_eq!(last_q, prm.q_closed);
    }

    #[test]
    fn test_contact_transitions_same_tick() {
        let (mut fsm, prm) = default_fsm();
        assert_eq!(prm.contact_threshold, 0.5);
        let (state, q, _) = fsm.step(0.6, &prm);
        assert_eq!(state, GraspState::ForceRegulate);
        // The closing advance still happened on the contact tick.
        assert_eq!(q, prm.q_open + prm.close_speed);
    }

    #[test]
    fn test_settles_through_hold_to_lift() {
        let (mut fsm, prm) = default_fsm();
        fsm.step(prm.contact_threshold + 0.1, &prm);
        assert_eq!(fsm.state(), GraspState::ForceRegulate);

        // Zero error: q_cmd must not move while the counter runs up.
        let q_before = fsm.q_cmd();
        for _ in 0..prm.settle_steps {
            let (state, q, _) = fsm.step(prm.f_des, &prm);
            assert_eq!(state, GraspState::ForceRegulate);
            assert_eq!(q, q_before);
        }
        let (state, q, _) = fsm.step(prm.f_des, &prm);
        assert_eq!(state, GraspState::Hold);
        assert_eq!(q, q_before);

        let (state, q, z) = fsm.step(prm.f_des, &prm);
        assert_eq!(state, GraspState::Lift);
        assert_eq!(q, q_before);
        assert_eq!(z, 0.0);
    }

    #[test]
    fn test_out_of_band_reading_resets_stability() {
        let (mut fsm, prm) = default_fsm();
        fsm.step(0.6, &prm);
        for _ in 0..prm.settle_steps {
            fsm.step(prm.f_des, &prm);
        }
        // One reading outside the band wipes all accumulated credit.
        let (state, _, _) = fsm.step(prm.f_des + prm.stable_band + 0.5, &prm);
        assert_eq!(state, GraspState::ForceRegulate);
        for _ in 0..prm.settle_steps {
            let (state, _, _) = fsm.step(prm.f_des, &prm);
            assert_eq!(state, GraspState::ForceRegulate);
        }
        let (state, _, _) = fsm.step(prm.f_des, &prm);
        assert_eq!(state, GraspState::Hold);
    }

    #[test]
    fn test_overforce_in_regulate_retreats_and_fails() {
        let (mut fsm, prm) = default_fsm();
        for _ in 0..10 {
            fsm.step(0.0, &prm);
        }
        fsm.step(0.6, &prm);
        let q_before = fsm.q_cmd();
        let (state, q, _) = fsm.step(prm.f_max + 1.0, &prm);
        assert_eq!(state, GraspState::FailRecover);
        assert_eq!(q, q_before - prm.emergency_open_step);
    }

    #[test]
    fn test_overforce_in_lift_fails_then_retreats() {
        let (mut fsm, prm) = default_fsm();
        drive_to_lift(&mut fsm, &prm);

        let q_before = fsm.q_cmd();
        let (state, q, _) = fsm.step(prm.f_max + 1.0, &prm);
        assert_eq!(state, GraspState::FailRecover);
        assert_eq!(q, q_before);
        let (_, q, _) = fsm.step(0.0, &prm);
        assert_eq!(q, q_before - prm.emergency_open_step);
    }

    #[test]
    fn test_recovery_drains_to_open_and_retries() {
        let (mut fsm, prm) = default_fsm();
        for _ in 0..20 {
            fsm.step(0.0, &prm);
        }
        fsm.step(0.6, &prm);
        fsm.step(prm.f_max + 5.0, &prm);
        assert_eq!(fsm.state(), GraspState::FailRecover);

        let mut last_q = fsm.q_cmd();
        let mut state = fsm.state();
        for _ in 0..100 {
            // Recovery ignores whatever the sensor says.
            let (s, q, _) = fsm.step(123.0, &prm);
            assert!(q <= last_q);
            assert!(q >= prm.q_open);
            last_q = q;
            state = s;
            if state == GraspState::ClosingToContact {
                break;
            }
        }
        assert_eq!(state, GraspState::ClosingToContact);
        assert!((last_q - prm.q_open).abs() <= 1e-6);
    }

    #[test]
    fn test_recovery_leaves_lift_height_alone() {
        let (mut fsm, prm) = default_fsm();
        drive_to_lift(&mut fsm, &prm);
        for _ in 0..50 {
            fsm.step(prm.f_des, &prm);
        }
        let z_before = fsm.z_cmd();
        assert!(z_before > 0.0);

        fsm.step(prm.f_max + 1.0, &prm);
        for _ in 0..30 {
            let (_, _, z) = fsm.step(0.0, &prm);
            assert_eq!(z, z_before);
        }
    }

    #[test]
    fn test_hold_applies_one_correction() {
        let (mut fsm, prm) = default_fsm();
        fsm.step(0.6, &prm);
        for _ in 0..=prm.settle_steps {
            fsm.step(prm.f_des, &prm);
        }
        assert_eq!(fsm.state(), GraspState::Hold);

        // In-band but nonzero error: exactly one proportional update.
        let q_before = fsm.q_cmd();
        let f = prm.f_des - 0.5;
        let (state, q, z) = fsm.step(f, &prm);
        assert_eq!(state, GraspState::Lift);
        assert!((q - (q_before + prm.k_force * 0.5)).abs() < 1e-12);
        assert_eq!(z, 0.0);
    }

    #[test]
    fn test_negative_reading_treated_as_zero() {
        let (mut fsm, prm) = default_fsm();
        let (state, q, _) = fsm.step(-5.0, &prm);
        assert_eq!(state, GraspState::ClosingToContact);
        assert_eq!(q, prm.q_open + prm.close_speed);
    }

    #[test]
    fn test_end_to_end_numeric_scenario() {
        let (mut fsm, prm) = default_fsm();

        // Free closing: 0.02 / 0.0006 saturates on tick 34.
        let mut ticks = 0;
        while fsm.q_cmd() < prm.q_closed {
            fsm.step(0.0, &prm);
            ticks += 1;
        }
        assert_eq!(ticks, 34);
        assert_eq!(fsm.state(), GraspState::ClosingToContact);

        // Steady 80.3 N: contact on the first tick, then err = -0.3 stays
        // inside the band, so HOLD lands after settle_steps + 1 regulation
        // ticks.
        fsm.step(80.3, &prm);
        assert_eq!(fsm.state(), GraspState::ForceRegulate);
        let mut regulate_ticks = 0;
        while fsm.state() == GraspState::ForceRegulate {
            let q_before = fsm.q_cmd();
            fsm.step(80.3, &prm);
            regulate_ticks += 1;
            let expect = (q_before + 0.0008 * -0.3).clamp(prm.q_open, prm.q_closed);
            assert!((fsm.q_cmd() - expect).abs() < 1e-12);
        }
        assert_eq!(regulate_ticks, 121);
        assert_eq!(fsm.state(), GraspState::Hold);

        fsm.step(80.3, &prm);
        assert_eq!(fsm.state(), GraspState::Lift);

        let mut lift_ticks = 0;
        while fsm.z_cmd() < prm.lift_max - 1e-9 {
            let (state, q, z) = fsm.step(80.3, &prm);
            lift_ticks += 1;
            assert_eq!(state, GraspState::Lift);
            assert!(q >= prm.q_open && q <= prm.q_closed);
            assert!(z <= prm.lift_max);
        }
        assert_eq!(lift_ticks, 240);

        // Saturated lift is terminal in practice.
        let (state, _, z) = fsm.step(80.3, &prm);
        assert_eq!(state, GraspState::Lift);
        assert_eq!(z, prm.lift_max);
    }

    fn drive_to_lift(fsm: &mut GraspFsm, prm: &Params) {
        // Close a while before contact so the jaw sits well clear of
        // q_open; a later retreat step must then move it by the full
        // emergency_open_step instead of clamping.
        for _ in 0..20 {
            fsm.step(0.0, prm);
        }
        fsm.step(0.6, prm);
        for _ in 0..=prm.settle_steps {
            fsm.step(prm.f_des, prm);
        }
        fsm.step(prm.f_des, prm);
        assert_eq!(fsm.state(), GraspState::Lift);
    }
}

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Tuning for the force-regulated pinch + lift sequence.
///
/// Gains and speeds are applied additively once per control tick, so every
/// value here is only meaningful against a fixed `dt`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Control period.
    ///
    /// Units: seconds
    pub dt: f64,

    /// Grip force to regulate toward once contact is made.
    ///
    /// Units: newtons
    pub f_des: f64,

    /// Hard cap; exceeding it aborts the grasp and retreats the jaw.
    ///
    /// Units: newtons
    pub f_max: f64,

    /// Proportional gain mapping force error into jaw travel.
    ///
    /// Units: meters/newton
    pub k_force: f64,

    /// Jaw travel per tick while searching for contact.
    ///
    /// Units: meters/tick
    pub close_speed: f64,

    /// Minimum measured force that counts as first contact.
    ///
    /// Units: newtons
    pub contact_threshold: f64,

    /// Force error band within which the grasp counts as settled.
    ///
    /// Units: newtons
    pub stable_band: f64,

    /// Consecutive in-band ticks required before advancing past regulation.
    pub settle_steps: u32,

    /// Jaw command at fully open (each jaw's inward travel).
    ///
    /// Units: meters
    pub q_open: f64,

    /// Jaw command at fully closed.
    ///
    /// Units: meters
    pub q_closed: f64,

    /// Jaw retreat per tick during fail recovery.
    ///
    /// Units: meters/tick
    pub emergency_open_step: f64,

    /// Lift travel per tick.
    ///
    /// Units: meters/tick
    pub lift_speed: f64,

    /// Lift ceiling.
    ///
    /// Units: meters
    pub lift_max: f64,

    /// Max actuation force handed to the jaw position servos.
    ///
    /// Units: newtons
    pub jaw_force: f64,

    /// Max actuation force handed to the lift position servo.
    ///
    /// Units: newtons
    pub lift_force: f64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            dt: 1.0 / 240.0,
            f_des: 80.0,
            f_max: 90.0,
            k_force: 0.0008,
            close_speed: 0.0006,
            contact_threshold: 0.5,
            stable_band: 1.0,
            settle_steps: 120,
            q_open: 0.0,
            q_closed: 0.02,
            emergency_open_step: 0.003,
            lift_speed: 0.0005,
            lift_max: 0.12,
            jaw_force: 80.0,
            lift_force: 200.0,
        }
    }
}

#[derive(Error, PartialEq, Clone, Debug)]
pub enum ParamsError {
    #[error("f_max ({f_max}) must exceed f_des ({f_des})")]
    ForceCapTooLow { f_des: f64, f_max: f64 },
    #[error("q_closed ({q_closed}) must exceed q_open ({q_open})")]
    JawRangeEmpty { q_open: f64, q_closed: f64 },
    #[error("{name} must be positive, got {value}")]
    NotPositive { name: &'static str, value: f64 },
    #[error("{name} must not be negative, got {value}")]
    Negative { name: &'static str, value: f64 },
}

impl Params {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let params: Params = serde_json::from_reader(reader)?;
        params.validate()?;
        Ok(params)
    }

    /// Checked once when a controller is constructed; the controller itself
    /// never fails after that.
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.f_max <= self.f_des {
            return Err(ParamsError::ForceCapTooLow { f_des: self.f_des, f_max: self.f_max });
        }
        if self.q_closed <= self.q_open {
            return Err(ParamsError::JawRangeEmpty { q_open: self.q_open, q_closed: self.q_closed });
        }
        for (name, value) in [
            ("dt", self.dt),
            ("k_force", self.k_force),
            ("close_speed", self.close_speed),
            ("emergency_open_step", self.emergency_open_step),
            ("lift_speed", self.lift_speed),
            ("lift_max", self.lift_max),
            ("stable_band", self.stable_band),
        ] {
            if value <= 0.0 {
                return Err(ParamsError::NotPositive { name, value });
            }
        }
        for (name, value) in [
            ("contact_threshold", self.contact_threshold),
            ("jaw_force", self.jaw_force),
            ("lift_force", self.lift_force),
        ] {
            if value < 0.0 {
                return Err(ParamsError::Negative { name, value });
            }
        }
        Ok(())
    }
}

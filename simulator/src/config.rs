use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

/// Uptake and clearance rates (1/s) for one tissue class.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TissueKinetics {
    pub k_in: f64,
    pub k_out: f64,
}

impl TissueKinetics {
    pub const fn new(k_in: f64, k_out: f64) -> Self {
        Self { k_in, k_out }
    }
}

/// Immutable parameters of a single simulation run.
///
/// Every component receives this by reference; nothing reads global state.
/// Time quantities are in seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    pub grid_size: usize,
    /// Tumor center in voxel coordinates `(x, y)`. May lie outside the grid.
    pub tumor_center: (i64, i64),
    pub tumor_radius: f64,
    pub healthy: TissueKinetics,
    pub tumor: TissueKinetics,
    pub half_life: f64,
    pub injected_dose: f64,
    /// Time constant of the plasma bolus washout.
    pub plasma_tau: f64,
    /// Poisson noise scaling. Zero is accepted; see `kinetics::NOISE_FLOOR`.
    pub noise_level: f64,
    pub t_max: f64,
    pub dt: f64,
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            grid_size: 50,
            tumor_center: (25, 25),
            tumor_radius: 8.0,
            healthy: TissueKinetics::new(0.01, 0.02),
            tumor: TissueKinetics::new(0.04, 0.005),
            half_life: 10.0 * 60.0,
            injected_dose: 1000.0,
            plasma_tau: 60.0,
            noise_level: 0.05,
            t_max: 600.0,
            dt: 1.0,
            seed: 42,
        }
    }
}

impl SimulationConfig {
    /// Reads a (possibly partial) JSON config; missing fields take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs::read(path.as_ref())?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Checks every parameter, reporting the first offending one.
    pub fn validate(&self) -> Result<()> {
        if self.grid_size == 0 {
            return Err(SimError::invalid("grid_size", self.grid_size, "must be > 0"));
        }
        non_negative("tumor_radius", self.tumor_radius)?;
        non_negative("healthy.k_in", self.healthy.k_in)?;
        non_negative("healthy.k_out", self.healthy.k_out)?;
        non_negative("tumor.k_in", self.tumor.k_in)?;
        non_negative("tumor.k_out", self.tumor.k_out)?;
        positive("half_life", self.half_life)?;
        non_negative("injected_dose", self.injected_dose)?;
        positive("plasma_tau", self.plasma_tau)?;
        non_negative("noise_level", self.noise_level)?;
        non_negative("t_max", self.t_max)?;
        positive("dt", self.dt)?;
        Ok(())
    }

    pub fn decay_constant(&self) -> f64 {
        std::f64::consts::LN_2 / self.half_life
    }

    pub fn time_axis(&self) -> TimeAxis {
        TimeAxis::new(self.t_max, self.dt)
    }
}

fn non_negative(parameter: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(SimError::invalid(parameter, value, "must be finite"));
    }
    if value < 0.0 {
        return Err(SimError::invalid(parameter, value, "must be >= 0"));
    }
    Ok(())
}

fn positive(parameter: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(SimError::invalid(parameter, value, "must be finite"));
    }
    if value <= 0.0 {
        return Err(SimError::invalid(parameter, value, "must be > 0"));
    }
    Ok(())
}

/// Uniform sample instants `0, dt, 2*dt, ...` up to and including `t_max`.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeAxis {
    dt: f64,
    points: Vec<f64>,
}

impl TimeAxis {
    // Absorbs representation error so that e.g. t_max = 0.3, dt = 0.1 keeps 0.3.
    const TOLERANCE: f64 = 1e-9;

    pub fn new(t_max: f64, dt: f64) -> Self {
        let steps = (t_max / dt + Self::TOLERANCE).floor() as usize;
        let points = (0..=steps).map(|k| k as f64 * dt).collect();
        Self { dt, points }
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn points(&self) -> &[f64] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

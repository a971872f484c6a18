//! Per-voxel compartmental kinetics.
//!
//! Each voxel integrates `dA/dt = k_in * Cp(t) - (k_out + lambda) * A` with
//! forward Euler from `A(0) = 0`. After every step the non-negative part of
//! the state is pushed through Poisson counting noise and the scaled count
//! is what gets reported. The recurrence itself only ever sees the true
//! (signed, unclamped) state.
//!
//! The reported value is `Poisson(max(A, 0) * noise) / max(noise, NOISE_FLOOR)`.
//! Small noise levels therefore do not converge to the true state: the
//! count is almost always zero and a rare hit is scaled by a huge factor.
//! This is the synthetic detector model, not a low-noise limit.

use candle_core::{DType, Device, Tensor};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Poisson};
use tracing::{debug, info};

use crate::config::{SimulationConfig, TimeAxis, TissueKinetics};
use crate::error::Result;
use crate::plasma::PlasmaInput;
use crate::tissue::{TissueClass, TissueMap};

/// Lower bound on the divisor used to rescale Poisson counts.
pub const NOISE_FLOOR: f64 = 1e-6;

/// Noisy activity indexed `(time_index, x, y)`, stored as an f64 tensor.
#[derive(Debug, Clone)]
pub struct ActivityTensor {
    tensor: Tensor,
}

impl ActivityTensor {
    pub fn from_tensor(tensor: Tensor) -> Result<Self> {
        // Validate rank up front so accessors can rely on dims3.
        tensor.dims3()?;
        let tensor = tensor.to_dtype(DType::F64)?;
        Ok(Self { tensor })
    }

    pub fn tensor(&self) -> &Tensor {
        &self.tensor
    }

    pub fn time_len(&self) -> usize {
        self.tensor.dims()[0]
    }

    pub fn grid_size(&self) -> usize {
        self.tensor.dims()[1]
    }

    /// Full `[time][x][y]` copy, as written to the activity map.
    pub fn to_nested(&self) -> Result<Vec<Vec<Vec<f64>>>> {
        Ok(self.tensor.to_vec3::<f64>()?)
    }

    /// One `[x][y]` snapshot.
    pub fn frame(&self, time_index: usize) -> Result<Vec<Vec<f64>>> {
        Ok(self.tensor.get(time_index)?.to_vec2::<f64>()?)
    }

    /// Reported activity of one voxel across the time axis.
    pub fn voxel_curve(&self, x: usize, y: usize) -> Result<Vec<f64>> {
        Ok(self
            .tensor
            .narrow(1, x, 1)?
            .narrow(2, y, 1)?
            .flatten_all()?
            .to_vec1::<f64>()?)
    }
}

/// Step-by-step record of a single voxel.
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelTrace {
    /// Integrator state after each step (signed, unclamped).
    pub true_state: Vec<f64>,
    /// Noisy observation after each step.
    pub reported: Vec<f64>,
}

pub struct KineticsIntegrator<'a> {
    config: &'a SimulationConfig,
    axis: &'a TimeAxis,
    plasma: PlasmaInput,
    decay: f64,
}

impl<'a> KineticsIntegrator<'a> {
    pub fn new(config: &'a SimulationConfig, axis: &'a TimeAxis) -> Self {
        Self {
            config,
            axis,
            plasma: PlasmaInput::new(config.injected_dose, config.plasma_tau),
            decay: config.decay_constant(),
        }
    }

    pub fn kinetics_for(&self, class: TissueClass) -> TissueKinetics {
        match class {
            TissueClass::Healthy => self.config.healthy,
            TissueClass::Tumor => self.config.tumor,
        }
    }

    /// Independent random stream of the voxel at flat index `voxel_index`.
    ///
    /// Streams depend only on the seed and the index, so voxels can be
    /// visited in any order (or on any worker) without changing results.
    pub fn voxel_rng(&self, voxel_index: usize) -> ChaCha8Rng {
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        rng.set_stream(voxel_index as u64);
        rng
    }

    /// Integrates one voxel over the whole time axis.
    pub fn integrate_voxel<R: Rng + ?Sized>(
        &self,
        kinetics: TissueKinetics,
        rng: &mut R,
    ) -> VoxelTrace {
        let dt = self.axis.dt();
        let noise = self.config.noise_level;
        let scale = noise.max(NOISE_FLOOR);

        let mut true_state = Vec::with_capacity(self.axis.len());
        let mut reported = Vec::with_capacity(self.axis.len());
        let mut a = 0.0f64;
        for &t in self.axis.points() {
            let cp = self.plasma.concentration(t);
            a += dt * (kinetics.k_in * cp - kinetics.k_out * a - self.decay * a);
            let counts = poisson_counts(a.max(0.0) * noise, rng);
            true_state.push(a);
            reported.push(counts / scale);
        }
        VoxelTrace {
            true_state,
            reported,
        }
    }

    /// Runs every voxel of `map` and assembles the activity tensor.
    pub fn simulate(&self, map: &TissueMap, device: &Device) -> Result<ActivityTensor> {
        let n = map.size();
        let n_voxels = map.voxel_count();
        let n_times = self.axis.len();
        debug!(
            grid_size = n,
            time_samples = n_times,
            decay = self.decay,
            "integrating voxels"
        );

        let mut buffer = vec![0f64; n_times * n_voxels];
        for (x, y, class) in map.voxels() {
            let voxel_index = x * n + y;
            let mut rng = self.voxel_rng(voxel_index);
            let trace = self.integrate_voxel(self.kinetics_for(class), &mut rng);
            for (t_idx, value) in trace.reported.into_iter().enumerate() {
                buffer[t_idx * n_voxels + voxel_index] = value;
            }
        }

        let tensor = Tensor::from_vec(buffer, (n_times, n, n), device)?;
        info!(voxels = n_voxels, time_samples = n_times, "kinetics integrated");
        ActivityTensor::from_tensor(tensor)
    }
}

/// Poisson draw with the given mean; zero mean yields zero counts.
fn poisson_counts<R: Rng + ?Sized>(mean: f64, rng: &mut R) -> f64 {
    if mean <= 0.0 {
        return 0.0;
    }
    match Poisson::<f64>::new(mean) {
        Ok(dist) => dist.sample(rng),
        // Beyond the sampler's supported range the relative noise is negligible.
        Err(_) => mean.round(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn short_config() -> SimulationConfig {
        SimulationConfig {
            grid_size: 6,
            tumor_center: (2, 3),
            tumor_radius: 1.5,
            t_max: 60.0,
            ..Default::default()
        }
    }

    #[test]
    fn euler_recurrence_drives_true_state() {
        let config = short_config();
        let axis = config.time_axis();
        let integrator = KineticsIntegrator::new(&config, &axis);
        let kinetics = config.tumor;
        let trace = integrator.integrate_voxel(kinetics, &mut integrator.voxel_rng(0));

        let plasma = PlasmaInput::new(config.injected_dose, config.plasma_tau);
        let decay = config.decay_constant();
        let mut prev = 0.0f64;
        for (k, &t) in axis.points().iter().enumerate() {
            let cp = plasma.concentration(t);
            let expected =
                prev + config.dt * (kinetics.k_in * cp - kinetics.k_out * prev - decay * prev);
            assert_eq!(trace.true_state[k], expected);
            prev = expected;
        }
        // First update already happens at t = 0.
        let first = config.dt * kinetics.k_in * config.injected_dose;
        assert!((trace.true_state[0] - first).abs() < 1e-12);
    }

    #[test]
    fn no_uptake_means_no_activity() {
        let config = SimulationConfig {
            healthy: TissueKinetics::new(0.0, 0.0),
            tumor: TissueKinetics::new(0.0, 0.0),
            half_life: 1e300,
            ..short_config()
        };
        let axis = config.time_axis();
        let integrator = KineticsIntegrator::new(&config, &axis);
        for class in TissueClass::ALL {
            let kinetics = integrator.kinetics_for(class);
            let trace = integrator.integrate_voxel(kinetics, &mut integrator.voxel_rng(3));
            assert!(trace.true_state.iter().all(|&a| a == 0.0));
            assert!(trace.reported.iter().all(|&r| r == 0.0));
        }
    }

    #[test]
    fn zero_uptake_never_goes_positive() {
        let config = SimulationConfig {
            healthy: TissueKinetics::new(0.0, 0.3),
            tumor: TissueKinetics::new(0.0, 0.01),
            injected_dose: 1e6,
            ..short_config()
        };
        let axis = config.time_axis();
        let integrator = KineticsIntegrator::new(&config, &axis);
        for class in TissueClass::ALL {
            let kinetics = integrator.kinetics_for(class);
            let trace = integrator.integrate_voxel(kinetics, &mut integrator.voxel_rng(1));
            assert!(trace.true_state.iter().all(|&a| a <= 0.0));
        }
    }

    #[test]
    fn zero_and_floor_noise_do_not_divide_by_zero() {
        for noise_level in [0.0, NOISE_FLOOR] {
            let config = SimulationConfig {
                noise_level,
                ..short_config()
            };
            let axis = config.time_axis();
            let integrator = KineticsIntegrator::new(&config, &axis);
            let trace = integrator.integrate_voxel(config.tumor, &mut integrator.voxel_rng(0));
            assert!(trace.reported.iter().all(|r| r.is_finite() && *r >= 0.0));
            if noise_level == 0.0 {
                assert!(trace.reported.iter().all(|&r| r == 0.0));
            }
        }
    }

    #[test]
    fn reported_values_are_scaled_counts() {
        let config = short_config();
        let axis = config.time_axis();
        let integrator = KineticsIntegrator::new(&config, &axis);
        let trace = integrator.integrate_voxel(config.tumor, &mut integrator.voxel_rng(7));
        for &r in &trace.reported {
            let counts = r * config.noise_level;
            assert!((counts - counts.round()).abs() < 1e-6, "{r} is not a whole count");
        }
    }

    #[test]
    fn high_count_rate_tracks_true_state() {
        let config = SimulationConfig {
            noise_level: 1e6,
            ..short_config()
        };
        let axis = config.time_axis();
        let integrator = KineticsIntegrator::new(&config, &axis);
        let trace = integrator.integrate_voxel(config.healthy, &mut integrator.voxel_rng(2));
        for (a, r) in trace.true_state.iter().zip(&trace.reported) {
            assert!((a.max(0.0) - r).abs() < 1.0, "true {a}, reported {r}");
        }
    }

    #[test]
    fn tensor_columns_match_independent_voxel_runs() -> Result<()> {
        let config = short_config();
        let axis = config.time_axis();
        let map = TissueMap::build(config.grid_size, config.tumor_center, config.tumor_radius);
        let integrator = KineticsIntegrator::new(&config, &axis);
        let activity = integrator.simulate(&map, &Device::Cpu)?;
        assert_eq!(activity.tensor().dims(), &[axis.len(), 6, 6]);

        // Visit a voxel out of order: its stream must not depend on the others.
        let (x, y) = (4, 1);
        let trace = integrator.integrate_voxel(
            integrator.kinetics_for(map.class_at(x, y)),
            &mut integrator.voxel_rng(x * 6 + y),
        );
        assert_eq!(activity.voxel_curve(x, y)?, trace.reported);

        let frame = activity.frame(10)?;
        assert_eq!(frame[x][y], trace.reported[10]);
        Ok(())
    }

    #[test]
    fn same_seed_same_tensor() -> Result<()> {
        let config = short_config();
        let axis = config.time_axis();
        let map = TissueMap::build(config.grid_size, config.tumor_center, config.tumor_radius);

        let a = KineticsIntegrator::new(&config, &axis).simulate(&map, &Device::Cpu)?;
        let b = KineticsIntegrator::new(&config, &axis).simulate(&map, &Device::Cpu)?;
        assert_eq!(a.to_nested()?, b.to_nested()?);

        let reseeded = SimulationConfig {
            seed: 7,
            ..config.clone()
        };
        let c = KineticsIntegrator::new(&reseeded, &axis).simulate(&map, &Device::Cpu)?;
        assert_ne!(a.to_nested()?, c.to_nested()?);
        Ok(())
    }

    #[test]
    fn poisson_counts_handles_degenerate_means() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(poisson_counts(0.0, &mut rng), 0.0);
        assert_eq!(poisson_counts(-3.0, &mut rng), 0.0);
        let draw = poisson_counts(4.0, &mut rng);
        assert!(draw >= 0.0 && draw.fract() == 0.0);
    }

    #[test]
    fn stored_activity_keeps_full_precision() -> Result<()> {
        // 1 / 0.03 has no exact f32 representation.
        let config = SimulationConfig {
            grid_size: 4,
            noise_level: 0.03,
            ..short_config()
        };
        let axis = config.time_axis();
        let map = TissueMap::build(config.grid_size, config.tumor_center, config.tumor_radius);
        let integrator = KineticsIntegrator::new(&config, &axis);
        let activity = integrator.simulate(&map, &Device::Cpu)?;
        assert_eq!(activity.tensor().dtype(), DType::F64);

        for (x, y, class) in map.voxels() {
            let mut rng = integrator.voxel_rng(x * 4 + y);
            let trace = integrator.integrate_voxel(integrator.kinetics_for(class), &mut rng);
            let stored = activity.voxel_curve(x, y)?;
            for (k, &value) in stored.iter().enumerate() {
                assert_eq!(value, trace.reported[k]);
                let counts = (value * 0.03).round();
                assert_eq!(value, counts / 0.03);
            }
        }
        Ok(())
    }

    #[test]
    fn huge_dose_stays_finite() -> Result<()> {
        let config = SimulationConfig {
            grid_size: 3,
            tumor_center: (1, 1),
            tumor_radius: 0.0,
            injected_dose: 1e40,
            t_max: 5.0,
            ..Default::default()
        };
        let axis = config.time_axis();
        let map = TissueMap::build(config.grid_size, config.tumor_center, config.tumor_radius);
        let activity = KineticsIntegrator::new(&config, &axis).simulate(&map, &Device::Cpu)?;
        let nested = activity.to_nested()?;
        assert!(nested.iter().flatten().flatten().all(|v| v.is_finite()));
        Ok(())
    }
}

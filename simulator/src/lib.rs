// Library root

pub mod aggregate;
pub mod config;
pub mod error;
pub mod export;
pub mod kinetics;
pub mod plasma;
pub mod tissue;

use candle_core::Device;
use tracing::{debug, info};

pub use aggregate::{AggregateCurves, RunSummary};
pub use config::{SimulationConfig, TimeAxis, TissueKinetics};
pub use error::{Result, SimError};
pub use export::Exporter;
pub use kinetics::{ActivityTensor, KineticsIntegrator, VoxelTrace, NOISE_FLOOR};
pub use plasma::PlasmaInput;
pub use tissue::{TissueClass, TissueMap};

/// Everything a run produces, in memory.
#[derive(Debug, Clone)]
pub struct SimulationOutput {
    pub time_axis: TimeAxis,
    pub tissue_map: TissueMap,
    pub activity: ActivityTensor,
    pub curves: AggregateCurves,
    pub summary: RunSummary,
}

/// Validates `config`, then builds the tissue map, integrates every voxel
/// and aggregates the class curves.
pub fn run_simulation(config: &SimulationConfig) -> Result<SimulationOutput> {
    run_simulation_on(config, &Device::Cpu)
}

pub fn run_simulation_on(config: &SimulationConfig, device: &Device) -> Result<SimulationOutput> {
    config.validate()?;

    let tissue_map = TissueMap::build(config.grid_size, config.tumor_center, config.tumor_radius);
    debug!(
        tumor = tissue_map.count(TissueClass::Tumor),
        healthy = tissue_map.count(TissueClass::Healthy),
        "tissue map built"
    );

    let time_axis = config.time_axis();
    let activity = KineticsIntegrator::new(config, &time_axis).simulate(&tissue_map, device)?;
    let curves = AggregateCurves::compute(&activity, &tissue_map)?;
    let summary = RunSummary::from_curves(&curves);
    info!(
        peak_tumor = summary.peak_tumor,
        peak_healthy = summary.peak_healthy,
        final_contrast = summary.final_contrast,
        "simulation complete"
    );

    Ok(SimulationOutput {
        time_axis,
        tissue_map,
        activity,
        curves,
        summary,
    })
}

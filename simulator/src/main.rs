// Entry point for the tracer uptake simulator

use std::path::PathBuf;

use anyhow::{Context, Result};
use candle_core::Device;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tracer_simulator::{run_simulation_on, Exporter, SimulationConfig, TissueClass};

#[derive(Debug, Parser)]
#[command(name = "tracer-simulator", about = "Simulate PET tracer uptake in a 2D tissue slice")]
struct Args {
    /// JSON config file; CLI flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for activity_map.json / activity_curves.json
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Also write activity_curves.csv
    #[arg(long)]
    csv: bool,

    #[arg(long)]
    grid_size: Option<usize>,

    /// Tumor center as two integers: --tumor-center X Y
    #[arg(long, num_args = 2, value_names = ["X", "Y"], allow_negative_numbers = true)]
    tumor_center: Option<Vec<i64>>,

    #[arg(long)]
    tumor_radius: Option<f64>,

    #[arg(long)]
    healthy_k_in: Option<f64>,

    #[arg(long)]
    healthy_k_out: Option<f64>,

    #[arg(long)]
    tumor_k_in: Option<f64>,

    #[arg(long)]
    tumor_k_out: Option<f64>,

    /// Half-life in seconds
    #[arg(long, conflicts_with = "half_life_min")]
    half_life: Option<f64>,

    /// Half-life in minutes
    #[arg(long)]
    half_life_min: Option<f64>,

    #[arg(long)]
    dose: Option<f64>,

    /// Plasma washout time constant (seconds)
    #[arg(long)]
    plasma_tau: Option<f64>,

    #[arg(long)]
    noise_level: Option<f64>,

    /// Simulation horizon (seconds)
    #[arg(long)]
    t_max: Option<f64>,

    /// Time step (seconds)
    #[arg(long)]
    dt: Option<f64>,

    #[arg(long)]
    seed: Option<u64>,
}

impl Args {
    fn resolve_config(&self) -> Result<SimulationConfig> {
        let mut config = match &self.config {
            Some(path) => SimulationConfig::from_json_file(path)
                .with_context(|| format!("failed to load config {:?}", path))?,
            None => SimulationConfig::default(),
        };

        if let Some(v) = self.grid_size {
            config.grid_size = v;
        }
        if let Some(center) = &self.tumor_center {
            config.tumor_center = (center[0], center[1]);
        }
        if let Some(v) = self.tumor_radius {
            config.tumor_radius = v;
        }
        if let Some(v) = self.healthy_k_in {
            config.healthy.k_in = v;
        }
        if let Some(v) = self.healthy_k_out {
            config.healthy.k_out = v;
        }
        if let Some(v) = self.tumor_k_in {
            config.tumor.k_in = v;
        }
        if let Some(v) = self.tumor_k_out {
            config.tumor.k_out = v;
        }
        if let Some(v) = self.half_life {
            config.half_life = v;
        }
        if let Some(v) = self.half_life_min {
            config.half_life = v * 60.0;
        }
        if let Some(v) = self.dose {
            config.injected_dose = v;
        }
        if let Some(v) = self.plasma_tau {
            config.plasma_tau = v;
        }
        if let Some(v) = self.noise_level {
            config.noise_level = v;
        }
        if let Some(v) = self.t_max {
            config.t_max = v;
        }
        if let Some(v) = self.dt {
            config.dt = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
        Ok(config)
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tracer_simulator=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let config = args.resolve_config()?;

    let device = Device::Cpu;
    info!(
        device = ?device,
        grid_size = config.grid_size,
        tumor_center = ?config.tumor_center,
        tumor_radius = config.tumor_radius,
        t_max = config.t_max,
        dt = config.dt,
        seed = config.seed,
        "starting tracer simulation"
    );

    let output = run_simulation_on(&config, &device).context("simulation failed")?;
    info!(
        tumor_voxels = output.tissue_map.count(TissueClass::Tumor),
        healthy_voxels = output.tissue_map.count(TissueClass::Healthy),
        final_tumor = output.summary.final_tumor,
        final_healthy = output.summary.final_healthy,
        "run summary"
    );

    let files = Exporter::new(&output, &config)
        .write_all(&args.output_dir, args.csv)
        .with_context(|| format!("failed to write output to {:?}", args.output_dir))?;
    println!(
        "Simulation complete. Output saved to {} and {}.",
        files.activity_map.display(),
        files.activity_curves.display()
    );
    if let Some(csv) = files.curves_csv {
        println!("Curves CSV: {}", csv.display());
    }

    Ok(())
}

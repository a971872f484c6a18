use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::SimulationConfig;
use crate::error::Result;
use crate::SimulationOutput;

pub const FORMAT_VERSION: u32 = 1;
pub const ACTIVITY_MAP_FILE: &str = "activity_map.json";
pub const ACTIVITY_CURVES_FILE: &str = "activity_curves.json";
pub const ACTIVITY_CSV_FILE: &str = "activity_curves.csv";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunMetadata {
    pub version: u32,
    pub timestamp: String,
    pub config: SimulationConfig,
}

impl RunMetadata {
    pub fn new(config: SimulationConfig) -> Self {
        let now: DateTime<Utc> = Utc::now();
        Self {
            version: FORMAT_VERSION,
            timestamp: now.to_rfc3339(),
            config,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ActivityMapRecord<'a> {
    pub metadata: &'a RunMetadata,
    pub grid_size: usize,
    pub time_points: &'a [f64],
    pub activity: Vec<Vec<Vec<f64>>>,
    pub tissue_type: Vec<Vec<u8>>,
}

/// `NaN` entries (empty tissue classes) serialize as `null`.
#[derive(Debug, Serialize)]
pub struct ActivityCurvesRecord<'a> {
    pub metadata: &'a RunMetadata,
    pub time_points: &'a [f64],
    pub avg_tumor: &'a [f64],
    pub avg_healthy: &'a [f64],
}

/// Paths of the files written by [`Exporter::write_all`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedFiles {
    pub activity_map: PathBuf,
    pub activity_curves: PathBuf,
    pub curves_csv: Option<PathBuf>,
}

pub struct Exporter<'a> {
    output: &'a SimulationOutput,
    metadata: RunMetadata,
}

impl<'a> Exporter<'a> {
    pub fn new(output: &'a SimulationOutput, config: &SimulationConfig) -> Self {
        Self {
            output,
            metadata: RunMetadata::new(config.clone()),
        }
    }

    pub fn metadata(&self) -> &RunMetadata {
        &self.metadata
    }

    pub fn activity_map(&self) -> Result<ActivityMapRecord<'_>> {
        Ok(ActivityMapRecord {
            metadata: &self.metadata,
            grid_size: self.output.tissue_map.size(),
            time_points: self.output.time_axis.points(),
            activity: self.output.activity.to_nested()?,
            tissue_type: self.output.tissue_map.codes(),
        })
    }

    pub fn activity_curves(&self) -> ActivityCurvesRecord<'_> {
        ActivityCurvesRecord {
            metadata: &self.metadata,
            time_points: self.output.time_axis.points(),
            avg_tumor: &self.output.curves.avg_tumor,
            avg_healthy: &self.output.curves.avg_healthy,
        }
    }

    pub fn write_activity_map<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, &self.activity_map()?)?;
        writer.flush()?;
        Ok(())
    }

    pub fn write_activity_curves<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, &self.activity_curves())?;
        writer.flush()?;
        Ok(())
    }

    /// Curves as `Time (s),Tumor Activity,Healthy Activity` rows.
    /// Undefined averages are left as empty cells.
    pub fn write_curves_csv<W: Write>(&self, mut writer: W) -> Result<()> {
        writeln!(writer, "Time (s),Tumor Activity,Healthy Activity")?;
        let curves = &self.output.curves;
        for (i, t) in self.output.time_axis.points().iter().enumerate() {
            writeln!(
                writer,
                "{},{},{}",
                t,
                csv_cell(curves.avg_tumor[i]),
                csv_cell(curves.avg_healthy[i])
            )?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Writes both JSON records (and the CSV when asked) into `dir`.
    pub fn write_all<P: AsRef<Path>>(&self, dir: P, with_csv: bool) -> Result<ExportedFiles> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let activity_map = dir.join(ACTIVITY_MAP_FILE);
        self.write_activity_map(&activity_map)?;
        let activity_curves = dir.join(ACTIVITY_CURVES_FILE);
        self.write_activity_curves(&activity_curves)?;

        let curves_csv = if with_csv {
            let path = dir.join(ACTIVITY_CSV_FILE);
            self.write_curves_csv(BufWriter::new(File::create(&path)?))?;
            Some(path)
        } else {
            None
        };

        info!(dir = %dir.display(), csv = with_csv, "output written");
        Ok(ExportedFiles {
            activity_map,
            activity_curves,
            curves_csv,
        })
    }
}

fn csv_cell(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        value.to_string()
    }
}

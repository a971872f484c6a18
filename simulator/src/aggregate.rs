use serde::Serialize;
use tracing::warn;

use crate::error::Result;
use crate::kinetics::ActivityTensor;
use crate::tissue::{TissueClass, TissueMap};

/// Mean reported activity per tissue class at each time index.
///
/// A class with no voxels yields `NaN` at every index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateCurves {
    pub avg_healthy: Vec<f64>,
    pub avg_tumor: Vec<f64>,
}

impl AggregateCurves {
    pub fn compute(activity: &ActivityTensor, map: &TissueMap) -> Result<Self> {
        Ok(Self {
            avg_healthy: class_mean(activity, map, TissueClass::Healthy)?,
            avg_tumor: class_mean(activity, map, TissueClass::Tumor)?,
        })
    }

    pub fn curve(&self, class: TissueClass) -> &[f64] {
        match class {
            TissueClass::Healthy => &self.avg_healthy,
            TissueClass::Tumor => &self.avg_tumor,
        }
    }

    pub fn len(&self) -> usize {
        self.avg_healthy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.avg_healthy.is_empty()
    }
}

fn class_mean(activity: &ActivityTensor, map: &TissueMap, class: TissueClass) -> Result<Vec<f64>> {
    let n_times = activity.time_len();
    let members = map.count(class);
    if members == 0 {
        warn!(?class, "tissue class has no voxels; its curve is undefined");
        return Ok(vec![f64::NAN; n_times]);
    }

    let tensor = activity.tensor();
    // Gather only this class's voxels: masking by multiplication would let an
    // infinite value elsewhere turn into NaN (inf * 0) and leak into this mean.
    let indices = map.indices(class, tensor.device())?;
    let sums = tensor
        .flatten_from(1)?
        .index_select(&indices, 1)?
        .sum(1)?
        .to_vec1::<f64>()?;
    let n = members as f64;
    Ok(sums.into_iter().map(|s| s / n).collect())
}

/// Headline numbers of a run, taken from the aggregated curves.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunSummary {
    pub peak_tumor: f64,
    pub peak_healthy: f64,
    pub final_tumor: f64,
    pub final_healthy: f64,
    /// Tumor-to-healthy contrast at the last time point.
    pub final_contrast: f64,
}

impl RunSummary {
    pub fn from_curves(curves: &AggregateCurves) -> Self {
        let peak = |c: &[f64]| c.iter().copied().fold(f64::NAN, f64::max);
        let last = |c: &[f64]| c.last().copied().unwrap_or(f64::NAN);
        let final_tumor = last(&curves.avg_tumor);
        let final_healthy = last(&curves.avg_healthy);
        Self {
            peak_tumor: peak(&curves.avg_tumor),
            peak_healthy: peak(&curves.avg_healthy),
            final_tumor,
            final_healthy,
            final_contrast: final_tumor / final_healthy,
        }
    }
}

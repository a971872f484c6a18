use candle_core::{Device, Tensor};
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TissueClass {
    Healthy,
    Tumor,
}

impl TissueClass {
    pub const ALL: [TissueClass; 2] = [TissueClass::Healthy, TissueClass::Tumor];

    /// Integer code used in exported maps (0 = healthy, 1 = tumor).
    pub fn code(self) -> u8 {
        match self {
            TissueClass::Healthy => 0,
            TissueClass::Tumor => 1,
        }
    }
}

/// Static N×N classification of voxels, stored row-major as `x * size + y`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TissueMap {
    size: usize,
    classes: Vec<TissueClass>,
}

impl TissueMap {
    /// Marks every voxel inside the closed disk around `center` as tumor.
    ///
    /// A negative (or NaN) radius describes an empty disk: every voxel is healthy.
    pub fn build(size: usize, center: (i64, i64), radius: f64) -> Self {
        let r2 = radius * radius;
        let (cx, cy) = (center.0 as f64, center.1 as f64);
        let mut classes = Vec::with_capacity(size * size);
        for x in 0..size {
            for y in 0..size {
                // f64 so that far-away centers cannot overflow the squared distance.
                let dx = x as f64 - cx;
                let dy = y as f64 - cy;
                let inside = radius >= 0.0 && dx * dx + dy * dy <= r2;
                classes.push(if inside {
                    TissueClass::Tumor
                } else {
                    TissueClass::Healthy
                });
            }
        }
        Self { size, classes }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn voxel_count(&self) -> usize {
        self.classes.len()
    }

    pub fn class_at(&self, x: usize, y: usize) -> TissueClass {
        self.classes[x * self.size + y]
    }

    /// Voxels in row-major order as `(x, y, class)`.
    pub fn voxels(&self) -> impl Iterator<Item = (usize, usize, TissueClass)> + '_ {
        let size = self.size;
        self.classes
            .iter()
            .enumerate()
            .map(move |(idx, &class)| (idx / size, idx % size, class))
    }

    pub fn count(&self, class: TissueClass) -> usize {
        self.classes.iter().filter(|&&c| c == class).count()
    }

    /// `[x][y]` grid of class codes.
    pub fn codes(&self) -> Vec<Vec<u8>> {
        self.classes
            .chunks(self.size)
            .map(|row| row.iter().map(|c| c.code()).collect())
            .collect()
    }

    /// Flat `x * size + y` indices of the voxels belonging to `class`, as a u32 tensor.
    pub fn indices(&self, class: TissueClass, device: &Device) -> Result<Tensor> {
        let idx: Vec<u32> = self
            .classes
            .iter()
            .enumerate()
            .filter(|(_, c)| **c == class)
            .map(|(i, _)| i as u32)
            .collect();
        let len = idx.len();
        Ok(Tensor::from_vec(idx, len, device)?)
    }
}

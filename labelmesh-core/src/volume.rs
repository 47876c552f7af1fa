//! Labeled voxel volumes

use crate::error::{Error, Result};
use crate::point::Point3f;
use ndarray::{Array3, ShapeBuilder};
use std::collections::BTreeSet;

/// Label value reserved for background voxels
pub const BACKGROUND_LABEL: i32 = 0;

/// A regular 3D grid of integer labels.
///
/// Labels are indexed `[x, y, z]`. Voxel `(i, j, k)` has its center at
/// `origin + (i, j, k) * spacing`.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelVolume {
    labels: Array3<i32>,
    spacing: [f32; 3],
    origin: Point3f,
}

impl LabelVolume {
    /// Create a background-filled volume
    pub fn new(dimensions: [usize; 3], spacing: [f32; 3], origin: Point3f) -> Self {
        Self {
            labels: Array3::from_elem((dimensions[0], dimensions[1], dimensions[2]), BACKGROUND_LABEL),
            spacing,
            origin,
        }
    }

    /// Wrap an existing label array
    pub fn from_array(labels: Array3<i32>, spacing: [f32; 3], origin: Point3f) -> Self {
        Self {
            labels,
            spacing,
            origin,
        }
    }

    /// Build a volume from samples stored with x varying fastest, then y, then z
    pub fn from_x_fastest(
        dimensions: [usize; 3],
        samples: Vec<i32>,
        spacing: [f32; 3],
        origin: Point3f,
    ) -> Result<Self> {
        let expected = dimensions[0] * dimensions[1] * dimensions[2];
        if samples.len() != expected {
            return Err(Error::InvalidData(format!(
                "Expected {} samples for dimensions {:?}, got {}",
                expected,
                dimensions,
                samples.len()
            )));
        }
        let labels = Array3::from_shape_vec((dimensions[0], dimensions[1], dimensions[2]).f(), samples)
            .map_err(|e| Error::InvalidData(e.to_string()))?;
        Ok(Self::from_array(labels, spacing, origin))
    }

    /// Grid dimensions `[nx, ny, nz]`
    pub fn dimensions(&self) -> [usize; 3] {
        let (nx, ny, nz) = self.labels.dim();
        [nx, ny, nz]
    }

    /// Physical size of a voxel along each axis
    pub fn spacing(&self) -> [f32; 3] {
        self.spacing
    }

    /// World position of voxel `(0, 0, 0)`
    pub fn origin(&self) -> Point3f {
        self.origin
    }

    /// Underlying label array
    pub fn labels(&self) -> &Array3<i32> {
        &self.labels
    }

    /// Number of voxels
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Check if the grid has no voxels
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Get the label at grid coordinates (with bounds checking)
    pub fn get(&self, x: usize, y: usize, z: usize) -> Option<i32> {
        self.labels.get((x, y, z)).copied()
    }

    /// Get the label at signed grid coordinates; anything outside the grid is background
    pub fn get_padded(&self, x: isize, y: isize, z: isize) -> i32 {
        if x < 0 || y < 0 || z < 0 {
            return BACKGROUND_LABEL;
        }
        self.get(x as usize, y as usize, z as usize)
            .unwrap_or(BACKGROUND_LABEL)
    }

    /// Set the label at grid coordinates
    pub fn set(&mut self, x: usize, y: usize, z: usize, label: i32) -> Result<()> {
        let dims = self.dimensions();
        match self.labels.get_mut((x, y, z)) {
            Some(value) => {
                *value = label;
                Ok(())
            }
            None => Err(Error::InvalidData(format!(
                "Grid coordinates ({}, {}, {}) out of bounds for dimensions {:?}",
                x, y, z, dims
            ))),
        }
    }

    /// Fill an inclusive box of grid coordinates with a label
    pub fn fill_box(&mut self, min: [usize; 3], max: [usize; 3], label: i32) -> Result<()> {
        for z in min[2]..=max[2] {
            for y in min[1]..=max[1] {
                for x in min[0]..=max[0] {
                    self.set(x, y, z, label)?;
                }
            }
        }
        Ok(())
    }

    /// Convert grid coordinates to world coordinates
    pub fn grid_to_world(&self, x: f32, y: f32, z: f32) -> Point3f {
        Point3f::new(
            self.origin.x + x * self.spacing[0],
            self.origin.y + y * self.spacing[1],
            self.origin.z + z * self.spacing[2],
        )
    }

    /// Number of voxels carrying the given label
    pub fn count(&self, label: i32) -> usize {
        self.labels.iter().filter(|&&v| v == label).count()
    }

    /// Distinct non-background labels present in the volume, ascending
    pub fn unique_labels(&self) -> Vec<i32> {
        self.labels
            .iter()
            .copied()
            .filter(|&v| v != BACKGROUND_LABEL)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

use serde::{Deserialize, Serialize};

use super::ValidationError;

/// Axis-aligned bounding box size in millimetres
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Extents {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Extents {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn get(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self::new(self.x * factor, self.y * factor, self.z * factor)
    }

    fn is_valid(&self) -> bool {
        [self.x, self.y, self.z]
            .iter()
            .all(|v| v.is_finite() && *v > 0.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

/// Printer build envelope
pub const BUILD_VOLUME: Extents = Extents::new(300.0, 300.0, 330.0);

/// Result of a scale change. `clamped` means the request would have left the
/// build volume and `applied` is the largest scale that fits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleOutcome {
    pub applied: f64,
    pub clamped: bool,
}

/// Uploaded model geometry with its user-controlled uniform scale
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelGeometry {
    extents: Extents,
    scale: f64,
}

impl ModelGeometry {
    /// Starts at scale 1.0, clamped down if the model does not fit as-is.
    pub fn new(extents: Extents) -> Result<Self, ValidationError> {
        if !extents.is_valid() {
            return Err(ValidationError::InvalidExtents);
        }
        let mut geometry = Self {
            extents,
            scale: 1.0,
        };
        geometry.scale = geometry.fit(1.0).applied;
        Ok(geometry)
    }

    pub fn extents(&self) -> Extents {
        self.extents
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn scaled_extents(&self) -> Extents {
        self.extents.scaled(self.scale)
    }

    pub fn volume_mm3(&self) -> f64 {
        self.extents.x * self.extents.y * self.extents.z * self.scale.powi(3)
    }

    /// Largest scale keeping every axis inside the build volume.
    pub fn max_scale(&self) -> f64 {
        (BUILD_VOLUME.x / self.extents.x)
            .min(BUILD_VOLUME.y / self.extents.y)
            .min(BUILD_VOLUME.z / self.extents.z)
    }

    pub fn set_scale(&mut self, requested: f64) -> Result<ScaleOutcome, ValidationError> {
        if !requested.is_finite() || requested <= 0.0 {
            return Err(ValidationError::InvalidScale);
        }
        let outcome = self.fit(requested);
        self.scale = outcome.applied;
        Ok(outcome)
    }

    /// Back-solves the scale from a typed length for one axis.
    pub fn set_axis_length(
        &mut self,
        axis: Axis,
        input: &str,
    ) -> Result<ScaleOutcome, ValidationError> {
        let value: f64 = input
            .trim()
            .parse()
            .map_err(|_| ValidationError::InvalidDimension(input.to_string()))?;
        if !value.is_finite() || value <= 0.0 {
            return Err(ValidationError::InvalidDimension(input.to_string()));
        }
        self.set_scale(value / self.extents.get(axis))
    }

    pub fn reset_scale(&mut self) -> ScaleOutcome {
        let outcome = self.fit(1.0);
        self.scale = outcome.applied;
        outcome
    }

    fn fit(&self, requested: f64) -> ScaleOutcome {
        let scaled = self.extents.scaled(requested);
        if scaled.x > BUILD_VOLUME.x || scaled.y > BUILD_VOLUME.y || scaled.z > BUILD_VOLUME.z {
            ScaleOutcome {
                applied: self.max_scale(),
                clamped: true,
            }
        } else {
            ScaleOutcome {
                applied: requested,
                clamped: false,
            }
        }
    }
}

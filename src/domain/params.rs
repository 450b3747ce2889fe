use serde::{Deserialize, Serialize};

use super::ValidationError;

/// Infill percentage, 10..=100 in steps of 10
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "u32", into = "u32")]
pub struct Infill(u32);

impl Infill {
    pub const DEFAULT: Infill = Infill(20);

    pub fn new(percent: u32) -> Result<Self, ValidationError> {
        if (10..=100).contains(&percent) && percent % 10 == 0 {
            Ok(Self(percent))
        } else {
            Err(ValidationError::InvalidInfill(percent))
        }
    }

    pub fn percent(self) -> u32 {
        self.0
    }

    pub fn fraction(self) -> f64 {
        f64::from(self.0) / 100.0
    }
}

impl Default for Infill {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u32> for Infill {
    type Error = ValidationError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Infill> for u32 {
    fn from(value: Infill) -> Self {
        value.0
    }
}

/// Layer heights the printers are profiled for
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(try_from = "f64", into = "f64")]
pub enum LayerHeight {
    /// 0.15 mm, quality
    Fine,
    /// 0.20 mm, standard
    #[default]
    Standard,
    /// 0.28 mm, fast
    Draft,
    /// 0.32 mm, maximum speed
    Coarse,
}

impl LayerHeight {
    pub const ALL: [LayerHeight; 4] = [Self::Fine, Self::Standard, Self::Draft, Self::Coarse];

    pub fn millimetres(self) -> f64 {
        match self {
            Self::Fine => 0.15,
            Self::Standard => 0.20,
            Self::Draft => 0.28,
            Self::Coarse => 0.32,
        }
    }

    /// Deposition rate in grams per hour.
    pub fn print_speed(self) -> f64 {
        match self {
            Self::Fine => 15.0,
            Self::Standard => 25.0,
            Self::Draft => 35.0,
            Self::Coarse => 45.0,
        }
    }

    pub fn from_millimetres(mm: f64) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|h| (h.millimetres() - mm).abs() < 1e-6)
    }
}

impl TryFrom<f64> for LayerHeight {
    type Error = ValidationError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::from_millimetres(value).ok_or(ValidationError::UnsupportedLayerHeight(value))
    }
}

impl From<LayerHeight> for f64 {
    fn from(value: LayerHeight) -> Self {
        value.millimetres()
    }
}

/// Free-text brief collected when the operator picks the material
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct OperatorNotes {
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub loads: Option<String>,
}

/// User-chosen print configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PrintParameters {
    pub infill: Infill,
    pub layer_height: LayerHeight,
    #[serde(default)]
    pub operator_choice: bool,
    #[serde(default)]
    pub notes: OperatorNotes,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infill_accepts_only_tens() {
        assert_eq!(Infill::new(20).unwrap().fraction(), 0.2);
        assert!(Infill::new(100).is_ok());
        assert_eq!(Infill::new(5), Err(ValidationError::InvalidInfill(5)));
        assert_eq!(Infill::new(25), Err(ValidationError::InvalidInfill(25)));
        assert_eq!(Infill::new(110), Err(ValidationError::InvalidInfill(110)));
    }

    #[test]
    fn layer_height_wire_format_is_millimetres() {
        assert_eq!(serde_json::to_string(&LayerHeight::Draft).unwrap(), "0.28");
        let parsed: LayerHeight = serde_json::from_str("0.2").unwrap();
        assert_eq!(parsed, LayerHeight::Standard);
        assert!(serde_json::from_str::<LayerHeight>("0.1").is_err());
    }
}

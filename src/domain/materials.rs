use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Supported display locales
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Ru,
    Ro,
}

/// Text carried in every supported locale
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct LocalizedText {
    pub ru: String,
    pub ro: String,
}

impl LocalizedText {
    pub fn new(ru: impl Into<String>, ro: impl Into<String>) -> Self {
        Self {
            ru: ru.into(),
            ro: ro.into(),
        }
    }

    pub fn get(&self, locale: Locale) -> &str {
        match locale {
            Locale::Ru => &self.ru,
            Locale::Ro => &self.ro,
        }
    }
}

/// Filament family. Drives density, fallback price and nothing else.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MaterialFamily {
    #[serde(rename = "PLA")]
    Pla,
    #[serde(rename = "PETG")]
    Petg,
    #[serde(rename = "ABS")]
    Abs,
    #[serde(rename = "TPU")]
    Tpu,
    #[serde(rename = "Nylon")]
    Nylon,
    #[serde(other)]
    Other,
}

impl MaterialFamily {
    /// Density in g/cm³. Unknown families print like PLA.
    pub fn density(self) -> f64 {
        match self {
            Self::Pla | Self::Other => 1.24,
            Self::Abs => 1.04,
            Self::Petg => 1.27,
            Self::Tpu => 1.21,
            Self::Nylon => 1.14,
        }
    }

    /// List price per kilogram used when a profile carries none.
    pub fn default_price_per_kg(self) -> f64 {
        match self {
            Self::Pla | Self::Other => 290.0,
            Self::Petg => 320.0,
            Self::Abs => 300.0,
            Self::Tpu => 450.0,
            Self::Nylon => 550.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pla => "PLA",
            Self::Petg => "PETG",
            Self::Abs => "ABS",
            Self::Tpu => "TPU",
            Self::Nylon => "Nylon",
            Self::Other => "Other",
        }
    }

    /// Case-insensitive lookup; anything unrecognised is `Other`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "PLA" => Self::Pla,
            "PETG" => Self::Petg,
            "ABS" => Self::Abs,
            "TPU" => Self::Tpu,
            "NYLON" => Self::Nylon,
            _ => Self::Other,
        }
    }
}

impl std::fmt::Display for MaterialFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Material profile entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MaterialProfile {
    pub id: Uuid,
    pub name: LocalizedText,
    pub family: MaterialFamily,
    /// Currency units per kilogram; `None` falls back to the family list price
    pub price_per_kg: Option<f64>,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub description: Option<LocalizedText>,
}

impl MaterialProfile {
    /// Effective price per kilogram. Missing or non-positive prices fall back
    /// to the family table.
    pub fn effective_price_per_kg(&self) -> f64 {
        self.price_per_kg
            .filter(|price| *price > 0.0)
            .unwrap_or_else(|| self.family.default_price_per_kg())
    }

    pub fn display_name(&self, locale: Locale) -> &str {
        self.name.get(locale)
    }
}

/// Request DTO for creating or replacing a material
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialRequest {
    pub name: LocalizedText,
    pub family: MaterialFamily,
    #[serde(default)]
    pub price_per_kg: Option<f64>,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub description: Option<LocalizedText>,
}

impl MaterialRequest {
    /// Returns a message describing the first invalid field, if any.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.ru.trim().is_empty() && self.name.ro.trim().is_empty() {
            return Err("Material name is required".to_string());
        }
        if let Some(price) = self.price_per_kg {
            if !price.is_finite() || price <= 0.0 {
                return Err("price_per_kg must be greater than zero".to_string());
            }
        }
        if self.colors.iter().any(|c| c.trim().is_empty()) {
            return Err("Color names must not be empty".to_string());
        }
        Ok(())
    }

    pub fn into_profile(self, id: Uuid) -> MaterialProfile {
        MaterialProfile {
            id,
            name: self.name,
            family: self.family,
            price_per_kg: self.price_per_kg,
            colors: self.colors,
            description: self.description,
        }
    }
}

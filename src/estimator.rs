//! Print cost estimation.
//!
//! Converts a model's bounding-box volume into weight, print time and a price
//! breakdown. The weight model assumes a solid 15% shell plus an interior that
//! scales with infill; it is an approximation, not a slicer simulation.

use serde::{Deserialize, Serialize};

use crate::domain::{MaterialProfile, ModelGeometry, PrintParameters};

/// Fraction of the bounding volume always printed solid.
pub const SHELL_FRACTION: f64 = 0.15;

/// Pricing constants for the print shop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostModel {
    /// Currency units per kWh
    pub electricity_cost_per_kwh: f64,
    pub printer_power_watts: f64,
    /// Printer wear, currency units per printing hour
    pub amortization_per_hour: f64,
    pub markup: f64,
    /// No job is quoted below this, in whole currency units
    pub minimum_price: i64,
}

impl CostModel {
    pub const STANDARD: CostModel = CostModel {
        electricity_cost_per_kwh: 20.0,
        printer_power_watts: 350.0,
        amortization_per_hour: 22.0,
        markup: 1.3,
        minimum_price: 50,
    };

    pub fn estimate(
        &self,
        geometry: Option<&ModelGeometry>,
        material: Option<&MaterialProfile>,
        params: &PrintParameters,
    ) -> Option<PriceEstimate> {
        let geometry = geometry?;
        let material = material?;

        let density = material.family.density();
        let price_per_kg = material.effective_price_per_kg();
        let print_speed = params.layer_height.print_speed();

        let volume_cm3 = geometry.volume_mm3() / 1000.0;
        let weight_g =
            volume_cm3 * density * (SHELL_FRACTION + (1.0 - SHELL_FRACTION) * params.infill.fraction());
        let print_time_hours = weight_g / print_speed;

        let material_cost = weight_g / 1000.0 * price_per_kg;
        let electricity_cost =
            print_time_hours * (self.printer_power_watts / 1000.0) * self.electricity_cost_per_kwh;
        let amortization_cost = print_time_hours * self.amortization_per_hour;

        let base_cost = material_cost + electricity_cost + amortization_cost;
        let total = ((base_cost * self.markup).round() as i64).max(self.minimum_price);

        Some(PriceEstimate {
            weight_g,
            print_time_hours,
            print_time_minutes: (print_time_hours * 60.0).round() as u32,
            material_cost,
            electricity_cost,
            amortization_cost,
            total,
        })
    }
}

impl Default for CostModel {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// Estimate with the shop's standard constants.
pub fn estimate(
    geometry: Option<&ModelGeometry>,
    material: Option<&MaterialProfile>,
    params: &PrintParameters,
) -> Option<PriceEstimate> {
    CostModel::STANDARD.estimate(geometry, material, params)
}

/// Estimator output. Costs are unrounded; `total` is whole currency units.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PriceEstimate {
    pub weight_g: f64,
    pub print_time_hours: f64,
    pub print_time_minutes: u32,
    pub material_cost: f64,
    pub electricity_cost: f64,
    pub amortization_cost: f64,
    pub total: i64,
}

impl PriceEstimate {
    pub fn base_cost(&self) -> f64 {
        self.material_cost + self.electricity_cost + self.amortization_cost
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

/// A unit of work a worker agent can advertise and execute.
///
/// The set is closed: routing, parameter extraction, memoization and
/// execution all match on this enum, so adding a capability is a compile
/// error everywhere it has not been handled yet.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    BuildingEnergyAnalysis,
    ApplianceEnergyBreakdown,
    PeakLoadForecasting,
    EnergySavingRecommendations,
    SolarEnergyEstimation,
    CostEstimation,
}

impl Capability {
    /// Every capability, in routing priority order.
    pub const ALL: [Capability; 6] = [
        Capability::BuildingEnergyAnalysis,
        Capability::ApplianceEnergyBreakdown,
        Capability::PeakLoadForecasting,
        Capability::EnergySavingRecommendations,
        Capability::SolarEnergyEstimation,
        Capability::CostEstimation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::BuildingEnergyAnalysis => "building_energy_analysis",
            Capability::ApplianceEnergyBreakdown => "appliance_energy_breakdown",
            Capability::PeakLoadForecasting => "peak_load_forecasting",
            Capability::EnergySavingRecommendations => "energy_saving_recommendations",
            Capability::SolarEnergyEstimation => "solar_energy_estimation",
            Capability::CostEstimation => "cost_estimation",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }

    /// Canonical name with underscores replaced by spaces.
    pub fn spoken_name(&self) -> String {
        self.as_str().replace('_', " ")
    }

    /// Lower-case vocabulary that signals this capability in a prompt.
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            Capability::BuildingEnergyAnalysis => &[
                "building", "energy", "consumption", "analyze", "analysis",
                "usage", "consumed", "building_energy_analysis",
            ],
            Capability::ApplianceEnergyBreakdown => &[
                "appliance", "breakdown", "by type", "hvac", "lighting",
                "computers", "equipment", "appliance_energy_breakdown",
            ],
            Capability::PeakLoadForecasting => &[
                "forecast", "predict", "peak", "load", "future", "tomorrow",
                "next week", "demand", "peak_load_forecasting",
            ],
            Capability::EnergySavingRecommendations => &[
                "recommend", "saving", "save", "efficiency", "optimize",
                "reduce", "suggestions", "tips", "energy_saving_recommendations",
            ],
            Capability::SolarEnergyEstimation => &[
                "solar", "renewable", "generation", "panel", "pv", "photovoltaic",
                "solar_energy_estimation",
            ],
            Capability::CostEstimation => &[
                "cost", "price", "bill", "expense", "money", "dollar", "usd",
                "cost_estimation",
            ],
        }
    }

    /// Whether `prompt_lower` (already lower-cased) names this capability
    /// or mentions any of its keywords.
    pub fn matches(&self, prompt_lower: &str) -> bool {
        prompt_lower.contains(self.as_str())
            || prompt_lower.contains(&self.spoken_name())
            || self.keywords().iter().any(|k| prompt_lower.contains(k))
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Campus energy capabilities with deterministic synthetic figures.
//!
//! No measurement data or trained model is involved: every capability
//! answers from fixed baselines and closed-form formulas, so identical
//! inputs (and the same clock) always yield identical results.

use agentmesh_core::{Capability, Error, Result};
use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, Timelike};
use serde_json::{json, Map, Value};
use std::f64::consts::PI;
use std::sync::Arc;
use tracing::info;

use crate::executor::CapabilityExecutor;

const DEFAULT_BUILDING: &str = "Building-A";
const DEFAULT_LOCATION: &str = "Campus-Main";

const SYNTHETIC_TOTAL_KWH: f64 = 1250.5;
const SYNTHETIC_PEAK_HOUR: u32 = 14;
const SYNTHETIC_AVERAGE_KWH: f64 = 52.1;

const DEFAULT_CONSUMPTION_KWH: f64 = 1250.0;
const DEFAULT_RATE_PER_KWH: f64 = 0.12;
const DEFAULT_PANEL_CAPACITY_KW: f64 = 100.0;
const DEFAULT_IRRADIANCE: f64 = 0.75;
const DEFAULT_SUN_HOURS: f64 = 8.0;
const BASE_LOAD_KWH: f64 = 50.0;
const MAX_FORECAST_HOURS: u64 = 24 * 365;
const MAX_SAVINGS_FRACTION: f64 = 0.20;

const SHIFT_RECOMMENDATION: &str =
    "Shift non-essential loads to off-peak hours (after 8 PM) to reduce peak demand charges";
const HVAC_RECOMMENDATION: &str =
    "Reduce HVAC setpoint by 1°C during non-occupied hours to save ~8% on HVAC energy";
const LIGHTING_RECOMMENDATION: &str =
    "Replace incandescent bulbs with LED lighting to reduce lighting energy by 75%";

/// Local wall-clock source; replaceable for deterministic tests.
pub type LocalClock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn invalid(msg: String) -> Error {
    Error::Execution(msg)
}

fn str_param(params: &Map<String, Value>, key: &str, default: &str) -> Result<String> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(default.to_string()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(invalid(format!("{} must be a string, got {}", key, other))),
    }
}

fn f64_param(params: &Map<String, Value>, key: &str, default: f64) -> Result<f64> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(v) => v
            .as_f64()
            .ok_or_else(|| invalid(format!("{} must be a number, got {}", key, v))),
    }
}

fn non_negative(key: &str, v: f64) -> Result<f64> {
    if v.is_finite() && v >= 0.0 {
        Ok(v)
    } else {
        Err(invalid(format!("{} must be a non-negative number, got {}", key, v)))
    }
}

struct Savings {
    fraction: f64,
    kwh: f64,
    breakdown: Map<String, Value>,
}

/// Savings implied by a set of recommendations, capped at 20%.
fn estimate_savings(consumption: f64, recommendations: &[&str]) -> Savings {
    let mut fraction = 0.0;
    let mut breakdown = Map::new();
    for rec in recommendations {
        let rec = rec.to_lowercase();
        let (name, share) = if rec.contains("shift") || rec.contains("off-peak") {
            ("load_shifting", 0.05)
        } else if rec.contains("hvac") || rec.contains("setpoint") {
            ("hvac_optimization", 0.08)
        } else if rec.contains("lighting") {
            ("lighting", 0.03)
        } else {
            continue;
        };
        fraction += share;
        breakdown.insert(name.to_string(), json!(share));
    }
    let fraction = f64::min(fraction, MAX_SAVINGS_FRACTION);
    Savings {
        fraction,
        kwh: consumption * fraction,
        breakdown,
    }
}

fn forecast_load(hour: u32) -> f64 {
    BASE_LOAD_KWH * (1.0 + 0.3 * (2.0 * PI * (f64::from(hour) - 6.0) / 24.0).sin())
}

fn parse_start_time(raw: &str) -> Result<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.naive_utc());
    }
    let trimmed = raw.trim_end_matches('Z');
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M"))
        .map_err(|_| invalid(format!("Invalid start_time '{}': expected ISO-8601", raw)))
}

pub struct EnergyExecutor {
    clock: LocalClock,
}

impl Default for EnergyExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl EnergyExecutor {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(|| Local::now().naive_local()),
        }
    }

    pub fn with_clock(clock: LocalClock) -> Self {
        Self { clock }
    }

    fn now(&self) -> NaiveDateTime {
        (self.clock)()
    }

    fn resolve_date(&self, raw: &str) -> Result<NaiveDate> {
        if raw == "today" {
            return Ok(self.now().date());
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|_| invalid(format!("Invalid date '{}': expected YYYY-MM-DD", raw)))
    }

    fn recommendations(&self) -> Vec<&'static str> {
        let mut recs = Vec::with_capacity(3);
        if (14..=18).contains(&self.now().hour()) {
            recs.push(SHIFT_RECOMMENDATION);
        }
        recs.push(HVAC_RECOMMENDATION);
        recs.push(LIGHTING_RECOMMENDATION);
        recs
    }

    fn building_energy_analysis(&self, params: &Map<String, Value>) -> Result<Value> {
        let building_id = str_param(params, "building_id", DEFAULT_BUILDING)?;
        let date = self.resolve_date(&str_param(params, "date", "today")?)?;

        Ok(json!({
            "data": {
                "building_id": building_id,
                "date": date.format("%Y-%m-%d").to_string(),
                "total_consumption_kwh": round2(SYNTHETIC_TOTAL_KWH),
                "peak_hour": SYNTHETIC_PEAK_HOUR,
                "average_consumption_kwh": round2(SYNTHETIC_AVERAGE_KWH),
                "consumption_trend": "stable",
            },
            "explainability": [
                format!("Analyzed 24-hour consumption data for {} on {}", building_id, date),
                format!("Total consumption: {:.1} kWh", SYNTHETIC_TOTAL_KWH),
                format!("Peak consumption occurred at {}:00", SYNTHETIC_PEAK_HOUR),
                "Trend analysis indicates stable consumption pattern",
            ],
        }))
    }

    fn appliance_energy_breakdown(&self, params: &Map<String, Value>) -> Result<Value> {
        let building_id = str_param(params, "building_id", DEFAULT_BUILDING)?;
        let date = str_param(params, "date", "today")?;

        let shares = [
            ("HVAC", 450.0, 36.0),
            ("Lighting", 200.0, 16.0),
            ("Computers", 300.0, 24.0),
            ("Other", 300.5, 24.0),
        ];
        let total: f64 = shares.iter().map(|(_, kwh, _)| kwh).sum();
        let breakdown: Map<String, Value> = shares
            .iter()
            .map(|(name, kwh, pct)| {
                (
                    name.to_string(),
                    json!({ "consumption_kwh": kwh, "percentage": pct }),
                )
            })
            .collect();

        Ok(json!({
            "data": {
                "building_id": building_id,
                "date": date,
                "total_consumption_kwh": round2(total),
                "breakdown": breakdown,
            },
            "explainability": [
                format!("Energy breakdown for {} on {}", building_id, date),
                "HVAC systems account for the largest share (36%)",
                "Computers and IT equipment contribute 24%",
                "Lighting systems use 16% of total energy",
            ],
        }))
    }

    fn peak_load_forecasting(&self, params: &Map<String, Value>) -> Result<Value> {
        let building_id = str_param(params, "building_id", DEFAULT_BUILDING)?;
        let hours = match params.get("forecast_hours") {
            None | Some(Value::Null) => 24,
            Some(v) => v
                .as_u64()
                .ok_or_else(|| invalid(format!("forecast_hours must be a positive integer, got {}", v)))?,
        };
        if hours == 0 || hours > MAX_FORECAST_HOURS {
            return Err(invalid(format!(
                "forecast_hours must be between 1 and {}, got {}",
                MAX_FORECAST_HOURS, hours
            )));
        }
        let start = match str_param(params, "start_time", "now")?.as_str() {
            "now" => self.now(),
            raw => parse_start_time(raw)?,
        };

        let mut forecasts = Vec::with_capacity(hours as usize);
        let mut peak_kwh = 0.0;
        let mut peak_hour: Option<u32> = None;
        for i in 0..hours {
            let at = start + Duration::hours(i as i64);
            let predicted = forecast_load(at.hour());
            forecasts.push(json!({
                "timestamp": format!("{}Z", at.format("%Y-%m-%dT%H:%M:%S")),
                "predicted_consumption_kwh": round2(predicted),
            }));
            if predicted > peak_kwh {
                peak_kwh = predicted;
                peak_hour = Some(at.hour());
            }
        }

        let peak_label = peak_hour.map(|h| h.to_string()).unwrap_or_else(|| "-".to_string());
        Ok(json!({
            "data": {
                "building_id": building_id,
                "forecast_hours": hours,
                "peak_forecast_kwh": round2(peak_kwh),
                "peak_hour": peak_hour,
                "forecasts": forecasts,
            },
            "explainability": [
                format!("Generated {}-hour forecast for {}", hours, building_id),
                format!("Peak load predicted: {:.1} kWh at {}:00", peak_kwh, peak_label),
                "Model uses time-of-day and day-of-week patterns",
                "Forecast based on historical consumption patterns",
            ],
        }))
    }

    fn energy_saving_recommendations(&self, params: &Map<String, Value>) -> Result<Value> {
        let building_id = str_param(params, "building_id", DEFAULT_BUILDING)?;
        let consumption = non_negative(
            "current_consumption",
            f64_param(params, "current_consumption", DEFAULT_CONSUMPTION_KWH)?,
        )?;

        let recommendations = self.recommendations();
        let savings = estimate_savings(consumption, &recommendations);
        let percent = savings.fraction * 100.0;

        Ok(json!({
            "data": {
                "building_id": building_id,
                "recommendations": recommendations,
                "estimated_savings": {
                    "savings_percent": round2(percent),
                    "savings_kwh": round2(savings.kwh),
                    "breakdown": savings.breakdown,
                },
            },
            "explainability": [
                format!("Generated {} recommendations for {}", recommendations.len(), building_id),
                format!("Potential savings: {:.1}% ({:.1} kWh)", percent, savings.kwh),
                "Recommendations based on current consumption patterns and best practices",
                "HVAC optimization offers the highest savings potential",
            ],
        }))
    }

    fn solar_energy_estimation(&self, params: &Map<String, Value>) -> Result<Value> {
        let capacity = non_negative(
            "panel_capacity_kw",
            f64_param(params, "panel_capacity_kw", DEFAULT_PANEL_CAPACITY_KW)?,
        )?;
        let irradiance = non_negative(
            "irradiance_factor",
            f64_param(params, "irradiance_factor", DEFAULT_IRRADIANCE)?,
        )?;
        let hours = non_negative("hours", f64_param(params, "hours", DEFAULT_SUN_HOURS)?)?;
        let location = str_param(params, "location", DEFAULT_LOCATION)?;

        let daily = capacity * irradiance * hours;
        let monthly = daily * 30.0;
        let annual = daily * 365.0;

        Ok(json!({
            "data": {
                "location": location,
                "panel_capacity_kw": capacity,
                "irradiance_factor": irradiance,
                "sunlight_hours": hours,
                "estimated_generation": {
                    "daily_kwh": round2(daily),
                    "monthly_kwh": round2(monthly),
                    "annual_kwh": round2(annual),
                },
            },
            "explainability": [
                format!("Solar energy estimation for {}", location),
                "Formula: generation = capacity × irradiance × hours",
                format!("Daily generation: {:.1} kWh", daily),
                format!("Annual potential: {:.0} kWh", annual),
            ],
        }))
    }

    fn cost_estimation(&self, params: &Map<String, Value>) -> Result<Value> {
        let consumption = non_negative(
            "consumption_kwh",
            f64_param(params, "consumption_kwh", DEFAULT_CONSUMPTION_KWH)?,
        )?;
        let rate = non_negative("rate_per_kwh", f64_param(params, "rate_per_kwh", DEFAULT_RATE_PER_KWH)?)?;
        let building_id = str_param(params, "building_id", DEFAULT_BUILDING)?;

        let total_cost = consumption * rate;
        let savings = estimate_savings(consumption, &self.recommendations());
        let savings_kwh = round2(savings.kwh);
        let savings_cost = savings_kwh * rate;
        let savings_percent = if consumption > 0.0 {
            savings_kwh / consumption * 100.0
        } else {
            0.0
        };

        Ok(json!({
            "data": {
                "building_id": building_id,
                "consumption_kwh": consumption,
                "rate_per_kwh": rate,
                "total_cost_usd": round2(total_cost),
                "potential_savings": {
                    "savings_kwh": savings_kwh,
                    "savings_cost_usd": round2(savings_cost),
                    "savings_percent": round2(savings_percent),
                },
            },
            "explainability": [
                format!("Cost analysis for {}", building_id),
                format!(
                    "Current consumption: {:.1} kWh at ${}/kWh = ${:.2}",
                    consumption, rate, total_cost
                ),
                format!("Potential savings: {:.1} kWh (${:.2})", savings_kwh, savings_cost),
                "Savings calculated based on recommended energy efficiency measures",
            ],
        }))
    }
}

impl CapabilityExecutor for EnergyExecutor {
    fn capabilities(&self) -> Vec<Capability> {
        Capability::ALL.to_vec()
    }

    fn execute(&self, capability: Capability, params: &Map<String, Value>) -> Result<Map<String, Value>> {
        info!(task = %capability, "Processing task");

        let result = match capability {
            Capability::BuildingEnergyAnalysis => self.building_energy_analysis(params)?,
            Capability::ApplianceEnergyBreakdown => self.appliance_energy_breakdown(params)?,
            Capability::PeakLoadForecasting => self.peak_load_forecasting(params)?,
            Capability::EnergySavingRecommendations => self.energy_saving_recommendations(params)?,
            Capability::SolarEnergyEstimation => self.solar_energy_estimation(params)?,
            Capability::CostEstimation => self.cost_estimation(params)?,
        };

        let mut results = match result {
            Value::Object(map) => map,
            _ => return Err(Error::Execution(format!("{} produced a non-object result", capability))),
        };
        results.insert("ltm_hit".to_string(), Value::Bool(false));
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(hour: u32) -> EnergyExecutor {
        let now = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap();
        EnergyExecutor::with_clock(Arc::new(move || now))
    }

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_building_analysis_resolves_today() {
        let out = at(9)
            .execute(Capability::BuildingEnergyAnalysis, &params(json!({ "date": "today" })))
            .unwrap();
        assert_eq!(out["data"]["date"], "2024-03-01");
        assert_eq!(out["data"]["building_id"], "Building-A");
        assert_eq!(out["data"]["total_consumption_kwh"], 1250.5);
        assert_eq!(out["data"]["peak_hour"], 14);
        assert_eq!(out["ltm_hit"], false);
    }

    #[test]
    fn test_bad_date_is_an_error() {
        let err = at(9)
            .execute(Capability::BuildingEnergyAnalysis, &params(json!({ "date": "03/01/2024" })))
            .unwrap_err();
        assert!(err.to_string().contains("Invalid date"));
    }

    #[test]
    fn test_solar_formula() {
        let out = at(9)
            .execute(Capability::SolarEnergyEstimation, &params(json!({ "panel_capacity_kw": 50.0 })))
            .unwrap();
        let gen = &out["data"]["estimated_generation"];
        assert_eq!(gen["daily_kwh"], 300.0);
        assert_eq!(gen["monthly_kwh"], 9000.0);
        assert_eq!(gen["annual_kwh"], 109500.0);
    }

    #[test]
    fn test_cost_uses_recommendation_savings() {
        // Outside 14:00-18:00 only HVAC (8%) and lighting (3%) apply.
        let out = at(9).execute(Capability::CostEstimation, &Map::new()).unwrap();
        let data = &out["data"];
        assert_eq!(data["total_cost_usd"], 150.0);
        assert_eq!(data["potential_savings"]["savings_kwh"], 137.5);
        assert_eq!(data["potential_savings"]["savings_cost_usd"], 16.5);
        assert_eq!(data["potential_savings"]["savings_percent"], 11.0);

        // During the afternoon peak, load shifting adds 5%.
        let out = at(15).execute(Capability::CostEstimation, &Map::new()).unwrap();
        assert_eq!(out["data"]["potential_savings"]["savings_kwh"], 200.0);
    }

    #[test]
    fn test_forecast_shape_and_peak() {
        let out = at(0)
            .execute(Capability::PeakLoadForecasting, &params(json!({ "forecast_hours": 24 })))
            .unwrap();
        let data = &out["data"];
        assert_eq!(data["forecasts"].as_array().unwrap().len(), 24);
        assert_eq!(data["peak_hour"], 12);
        assert_eq!(data["peak_forecast_kwh"], 65.0);
        assert_eq!(data["forecasts"][0]["timestamp"], "2024-03-01T00:00:00Z");
    }

    #[test]
    fn test_forecast_hours_validated() {
        let exec = at(0);
        assert!(exec
            .execute(Capability::PeakLoadForecasting, &params(json!({ "forecast_hours": 0 })))
            .is_err());
        assert!(exec
            .execute(Capability::PeakLoadForecasting, &params(json!({ "forecast_hours": "many" })))
            .is_err());
    }

    #[test]
    fn test_breakdown_total() {
        let out = at(9).execute(Capability::ApplianceEnergyBreakdown, &Map::new()).unwrap();
        assert_eq!(out["data"]["total_consumption_kwh"], 1250.5);
        assert_eq!(out["data"]["breakdown"]["HVAC"]["percentage"], 36.0);
    }
}

use agentmesh_core::Capability;
use chrono::{Duration, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};

static FIRST_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+").expect("valid regex"));

const BUILDINGS: &[(&str, &str)] = &[
    ("building-a", "Building-A"),
    ("building-b", "Building-B"),
    ("building-c", "Building-C"),
    ("building a", "Building-A"),
    ("building b", "Building-B"),
    ("building c", "Building-C"),
];

const DEFAULT_BUILDING: &str = "Building-A";
const DEFAULT_FORECAST_HOURS: u32 = 24;
const WEEK_HOURS: u32 = 168;
const DEFAULT_PANEL_CAPACITY_KW: f64 = 100.0;

/// Best-effort task parameters pulled out of a prompt. Never fails; any
/// parameter left out falls back to the worker's own default.
pub fn extract_parameters(prompt: &str, capability: Capability, today: NaiveDate) -> Map<String, Value> {
    let prompt_lower = prompt.to_lowercase();
    let mut params = Map::new();

    let building = BUILDINGS
        .iter()
        .find(|(needle, _)| prompt_lower.contains(needle))
        .map(|(_, id)| *id)
        .unwrap_or(DEFAULT_BUILDING);
    params.insert("building_id".to_string(), json!(building));

    if prompt_lower.contains("today") {
        params.insert("date".to_string(), json!("today"));
    } else if prompt_lower.contains("yesterday") {
        let day = today - Duration::days(1);
        params.insert("date".to_string(), json!(day.format("%Y-%m-%d").to_string()));
    } else if prompt_lower.contains("tomorrow") {
        let day = today + Duration::days(1);
        params.insert("date".to_string(), json!(day.format("%Y-%m-%d").to_string()));
    }

    if prompt_lower.contains("forecast")
        || prompt_lower.contains("predict")
        || capability == Capability::PeakLoadForecasting
    {
        let hours = if prompt.contains("24") || prompt_lower.contains("day") {
            DEFAULT_FORECAST_HOURS
        } else if prompt_lower.contains("week") {
            WEEK_HOURS
        } else {
            DEFAULT_FORECAST_HOURS
        };
        params.insert("forecast_hours".to_string(), json!(hours));
    }

    if prompt_lower.contains("solar") || capability == Capability::SolarEnergyEstimation {
        let capacity = FIRST_NUMBER
            .find(prompt)
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .unwrap_or(DEFAULT_PANEL_CAPACITY_KW);
        params.insert("panel_capacity_kw".to_string(), json!(capacity));
    }

    params
}

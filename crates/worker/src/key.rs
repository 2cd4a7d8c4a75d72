use serde_json::{Map, Value};

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Memoization key for a task: the task name, then `building_id`, then
/// `date` (or `start_date` when there is no `date`), joined with `:`.
pub fn ltm_key(task_name: &str, params: &Map<String, Value>) -> String {
    let mut parts = vec![task_name.to_string()];
    if let Some(building) = params.get("building_id") {
        parts.push(render(building));
    }
    if let Some(date) = params.get("date").or_else(|| params.get("start_date")) {
        parts.push(render(date));
    }
    parts.join(":")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_key_parts() {
        let p = params(json!({ "building_id": "Building-A", "date": "today", "start_date": "2024-01-01" }));
        assert_eq!(ltm_key("building_energy_analysis", &p), "building_energy_analysis:Building-A:today");

        let p = params(json!({ "building_id": "Building-B", "start_date": "2024-01-01" }));
        assert_eq!(ltm_key("cost_estimation", &p), "cost_estimation:Building-B:2024-01-01");

        assert_eq!(ltm_key("solar_energy_estimation", &Map::new()), "solar_energy_estimation");
    }

    #[test]
    fn test_ignores_unkeyed_params() {
        let a = params(json!({ "building_id": "Building-A", "forecast_hours": 24 }));
        let b = params(json!({ "building_id": "Building-A", "forecast_hours": 168 }));
        assert_eq!(ltm_key("peak_load_forecasting", &a), ltm_key("peak_load_forecasting", &b));
    }

    #[test]
    fn test_non_string_values_use_json_text() {
        let p = params(json!({ "building_id": 7 }));
        assert_eq!(ltm_key("cost_estimation", &p), "cost_estimation:7");
    }
}

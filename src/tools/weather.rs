//! Built-in mock weather tool.
//!
//! Returns randomized but fixed-shape weather data so the approval flow can
//! be exercised without any external service.

use async_trait::async_trait;
use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::{json, Value};

use super::Tool;

const CONDITIONS: &[&str] = &[
    "sunny",
    "cloudy",
    "overcast",
    "light rain",
    "heavy rain",
    "thunderstorm",
    "light snow",
    "heavy snow",
];

const WIND_DIRECTIONS: &[&str] = &[
    "north",
    "northeast",
    "east",
    "southeast",
    "south",
    "southwest",
    "west",
    "northwest",
];

/// Mock weather lookup for a named location.
pub struct WeatherTool;

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "Get the current weather for a given location. Returns condition, temperature, humidity and wind as JSON."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "City or place name to look up"
                }
            },
            "required": ["location"]
        })
    }

    async fn invoke(&self, args: Value) -> anyhow::Result<String> {
        let location = args["location"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing 'location' argument"))?;

        let mut rng = rand::thread_rng();
        let report = json!({
            "location": location,
            "condition": CONDITIONS.choose(&mut rng).copied().unwrap_or("sunny"),
            "temperature": round1(rng.gen_range(5.0..=35.0)),
            "humidity": rng.gen_range(30..=95),
            "wind": {
                "speed": round1(rng.gen_range(0.0..=10.0)),
                "direction": WIND_DIRECTIONS.choose(&mut rng).copied().unwrap_or("north"),
            },
            "updated_at": Utc::now().format("%Y-%m-%d %H:%M").to_string(),
        });

        Ok(report.to_string())
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn report_echoes_location_and_stays_in_range() {
        let tool = WeatherTool;
        // Randomized output: sample repeatedly to cover the ranges.
        for _ in 0..32 {
            let raw = tool
                .invoke(json!({"location": "北京"}))
                .await
                .expect("weather invoke");
            let report: Value = serde_json::from_str(&raw).expect("weather JSON");

            assert_eq!(report["location"], "北京");
            let condition = report["condition"].as_str().expect("condition");
            assert!(CONDITIONS.contains(&condition));

            let temperature = report["temperature"].as_f64().expect("temperature");
            assert!((5.0..=35.0).contains(&temperature));

            let humidity = report["humidity"].as_i64().expect("humidity");
            assert!((30..=95).contains(&humidity));

            let speed = report["wind"]["speed"].as_f64().expect("wind speed");
            assert!((0.0..=10.0).contains(&speed));
            let direction = report["wind"]["direction"].as_str().expect("direction");
            assert!(WIND_DIRECTIONS.contains(&direction));

            assert!(report["updated_at"].as_str().is_some_and(|s| !s.is_empty()));
        }
    }

    #[tokio::test]
    async fn missing_location_is_rejected() {
        let tool = WeatherTool;
        let err = tool
            .invoke(json!({}))
            .await
            .expect_err("location is required");
        assert!(err.to_string().contains("location"));
    }
}

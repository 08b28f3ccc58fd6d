use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub country: String,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub text: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub code: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentConditions {
    pub temp_c: f64,
    pub feels_like_c: f64,
    pub wind_kph: f64,
    pub humidity: f64,
    pub condition: Condition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyForecast {
    pub date: String,
    pub max_temp_c: f64,
    pub min_temp_c: f64,
    pub chance_of_rain: f64,
    pub total_precip_mm: f64,
    pub max_wind_kph: f64,
    pub condition: Condition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Forecast {
    pub location: Location,
    pub current: CurrentConditions,
    pub days: Vec<DailyForecast>,
}

impl Forecast {
    /// One-paragraph description used as chat context.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "Weather for {}, {}: currently {:.0}°C (feels like {:.0}°C), {}, wind {:.0} km/h, humidity {:.0}%.",
            self.location.name,
            self.location.country,
            self.current.temp_c,
            self.current.feels_like_c,
            self.current.condition.text.to_lowercase(),
            self.current.wind_kph,
            self.current.humidity,
        );
        for d in &self.days {
            out.push_str(&format!(
                " {}: {:.0}-{:.0}°C, {}, {:.0}% chance of rain.",
                d.date,
                d.min_temp_c,
                d.max_temp_c,
                d.condition.text.to_lowercase(),
                d.chance_of_rain,
            ));
        }
        out
    }
}

// Raw WeatherAPI.com payloads.

#[derive(Debug, Deserialize)]
pub(super) struct RawForecastResponse {
    pub location: Location,
    pub current: RawCurrent,
    pub forecast: RawForecast,
}

#[derive(Debug, Deserialize)]
pub(super) struct RawCurrent {
    pub temp_c: f64,
    pub feelslike_c: f64,
    pub wind_kph: f64,
    pub humidity: f64,
    pub condition: Condition,
}

#[derive(Debug, Deserialize)]
pub(super) struct RawForecast {
    pub forecastday: Vec<RawForecastDay>,
}

#[derive(Debug, Deserialize)]
pub(super) struct RawForecastDay {
    pub date: String,
    pub day: RawDay,
}

#[derive(Debug, Deserialize)]
pub(super) struct RawDay {
    pub maxtemp_c: f64,
    pub mintemp_c: f64,
    pub maxwind_kph: f64,
    pub totalprecip_mm: f64,
    #[serde(default)]
    pub daily_chance_of_rain: f64,
    pub condition: Condition,
}

impl From<RawForecastResponse> for Forecast {
    fn from(r: RawForecastResponse) -> Self {
        Self {
            location: r.location,
            current: CurrentConditions {
                temp_c: r.current.temp_c,
                feels_like_c: r.current.feelslike_c,
                wind_kph: r.current.wind_kph,
                humidity: r.current.humidity,
                condition: r.current.condition,
            },
            days: r
                .forecast
                .forecastday
                .into_iter()
                .map(|d| DailyForecast {
                    date: d.date,
                    max_temp_c: d.day.maxtemp_c,
                    min_temp_c: d.day.mintemp_c,
                    chance_of_rain: d.day.daily_chance_of_rain,
                    total_precip_mm: d.day.totalprecip_mm,
                    max_wind_kph: d.day.maxwind_kph,
                    condition: d.day.condition,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "location": {"name": "Yosemite Valley", "region": "California", "country": "USA", "lat": 37.74, "lon": -119.59},
        "current": {"temp_c": 18.2, "feelslike_c": 17.0, "wind_kph": 9.4, "humidity": 40,
                    "condition": {"text": "Sunny", "icon": "//cdn/113.png", "code": 1000}},
        "forecast": {"forecastday": [
            {"date": "2026-06-01", "day": {"maxtemp_c": 24.0, "mintemp_c": 8.0, "maxwind_kph": 14.0,
             "totalprecip_mm": 0.0, "daily_chance_of_rain": 10, "condition": {"text": "Sunny"}}}
        ]}
    }"#;

    #[test]
    fn maps_weatherapi_payload() {
        let raw: RawForecastResponse = serde_json::from_str(SAMPLE).unwrap();
        let f = Forecast::from(raw);
        assert_eq!(f.location.name, "Yosemite Valley");
        assert_eq!(f.current.feels_like_c, 17.0);
        assert_eq!(f.days.len(), 1);
        assert_eq!(f.days[0].chance_of_rain, 10.0);
    }

    #[test]
    fn summary_mentions_location_and_days() {
        let f = Forecast::from(serde_json::from_str::<RawForecastResponse>(SAMPLE).unwrap());
        let s = f.summary();
        assert!(s.contains("Yosemite Valley, USA"));
        assert!(s.contains("2026-06-01: 8-24°C"));
    }
}

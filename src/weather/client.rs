use anyhow::Context;
use async_trait::async_trait;
use tracing::debug;

use super::dto::{Forecast, Location, RawForecastResponse};

const BASE_URL: &str = "https://api.weatherapi.com/v1";
pub const MAX_FORECAST_DAYS: u8 = 10;

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn search(&self, query: &str) -> anyhow::Result<Vec<Location>>;
    async fn forecast(&self, lat: f64, lon: f64, days: u8) -> anyhow::Result<Forecast>;
}

pub struct WeatherApiClient {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl WeatherApiClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            base_url: BASE_URL.to_string(),
        }
    }

    fn key(&self) -> anyhow::Result<&str> {
        self.api_key
            .as_deref()
            .context("WEATHER_API_KEY is not configured")
    }
}

#[async_trait]
impl WeatherProvider for WeatherApiClient {
    async fn search(&self, query: &str) -> anyhow::Result<Vec<Location>> {
        let url = format!("{}/search.json", self.base_url);
        let locations: Vec<Location> = self
            .http
            .get(&url)
            .query(&[("key", self.key()?), ("q", query)])
            .send()
            .await
            .context("weather search request")?
            .error_for_status()
            .context("weather search status")?
            .json()
            .await
            .context("parse weather search")?;
        debug!(query, results = locations.len(), "weather search");
        Ok(locations)
    }

    async fn forecast(&self, lat: f64, lon: f64, days: u8) -> anyhow::Result<Forecast> {
        let url = format!("{}/forecast.json", self.base_url);
        let days = days.clamp(1, MAX_FORECAST_DAYS).to_string();
        let q = format!("{lat},{lon}");
        let raw: RawForecastResponse = self
            .http
            .get(&url)
            .query(&[
                ("key", self.key()?),
                ("q", q.as_str()),
                ("days", days.as_str()),
                ("aqi", "no"),
                ("alerts", "no"),
            ])
            .send()
            .await
            .context("weather forecast request")?
            .error_for_status()
            .context("weather forecast status")?
            .json()
            .await
            .context("parse weather forecast")?;
        Ok(raw.into())
    }
}

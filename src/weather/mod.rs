mod client;
mod dto;
pub mod handlers;

use crate::state::AppState;
use axum::Router;

pub use client::{WeatherApiClient, WeatherProvider};
pub use dto::{Condition, CurrentConditions, DailyForecast, Forecast, Location};

pub fn router() -> Router<AppState> {
    handlers::weather_routes()
}

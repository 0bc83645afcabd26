//! Weather snapshot contract, HTTP provider and category suggestions

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::config::AppConfig;
use crate::errors::GeoRankError;
use crate::errors::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCondition {
    Clear,
    Sunny,
    PartlyCloudy,
    Cloudy,
    Overcast,
    LightRain,
    Rain,
    HeavyRain,
    Thunderstorm,
    Snow,
    Fog,
    Windy,
    Hot,
    Cold,
    #[serde(other)]
    Unknown,
}

impl WeatherCondition {
    pub fn is_rain(self) -> bool {
        matches!(
            self,
            Self::LightRain | Self::Rain | Self::HeavyRain | Self::Thunderstorm
        )
    }

    /// Conditions that can count as pleasant outdoor weather
    pub fn is_fair(self) -> bool {
        matches!(self, Self::Clear | Self::Sunny | Self::PartlyCloudy)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Clear => "clear",
            Self::Sunny => "sunny",
            Self::PartlyCloudy => "partly_cloudy",
            Self::Cloudy => "cloudy",
            Self::Overcast => "overcast",
            Self::LightRain => "light_rain",
            Self::Rain => "rain",
            Self::HeavyRain => "heavy_rain",
            Self::Thunderstorm => "thunderstorm",
            Self::Snow => "snow",
            Self::Fog => "fog",
            Self::Windy => "windy",
            Self::Hot => "hot",
            Self::Cold => "cold",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for WeatherCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time weather summary used by the weather factor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub temperature_c: f64,
    pub condition: WeatherCondition,
    pub is_rainy: bool,
    pub is_hot: bool,
    pub is_cold: bool,
    pub is_pleasant: bool,
    pub description: String,
}

impl WeatherSnapshot {
    /// Derives the condition flags from a raw reading
    pub fn from_reading(
        temperature_c: f64,
        condition: WeatherCondition,
        precipitation_chance: f64,
        description: impl Into<String>,
    ) -> Self {
        Self {
            temperature_c,
            condition,
            is_rainy: condition.is_rain() || precipitation_chance > 50.0,
            is_hot: temperature_c > 25.0,
            is_cold: temperature_c < 10.0,
            is_pleasant: condition.is_fair()
                && (10.0..=25.0).contains(&temperature_c)
                && precipitation_chance < 20.0,
            description: description.into(),
        }
    }
}

/// Raw provider payload
#[derive(Debug, Clone, Deserialize)]
pub struct WeatherReading {
    #[serde(alias = "temperature_celsius", alias = "temp_c")]
    pub temperature_c: f64,
    #[serde(default = "unknown_condition")]
    pub condition: WeatherCondition,
    #[serde(default)]
    pub precipitation_chance: f64,
    #[serde(default)]
    pub description: String,
}

fn unknown_condition() -> WeatherCondition {
    WeatherCondition::Unknown
}

impl From<WeatherReading> for WeatherSnapshot {
    fn from(reading: WeatherReading) -> Self {
        let description = if reading.description.is_empty() {
            reading.condition.as_str().replace('_', " ")
        } else {
            reading.description
        };
        Self::from_reading(
            reading.temperature_c,
            reading.condition,
            reading.precipitation_chance,
            description,
        )
    }
}

/// Source of weather snapshots
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn current_weather(&self, lat: f64, lon: f64) -> Result<WeatherSnapshot>;
}

/// Provider answering `GET {endpoint}?lat=..&lon=..` with a [`WeatherReading`]
pub struct HttpWeatherProvider {
    endpoint: String,
    client: Client,
}

impl HttpWeatherProvider {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GeoRankError::Config(format!("HTTP client build error: {e}")))?;

        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }
}

#[async_trait]
impl WeatherProvider for HttpWeatherProvider {
    async fn current_weather(&self, lat: f64, lon: f64) -> Result<WeatherSnapshot> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("lat", lat), ("lon", lon)])
            .send()
            .await
            .map_err(|e| GeoRankError::Weather(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(GeoRankError::Weather(format!("HTTP {}", response.status())));
        }

        let reading: WeatherReading = response
            .json()
            .await
            .map_err(|e| GeoRankError::Weather(format!("invalid payload: {e}")))?;

        debug!(
            "Weather at ({:.3}, {:.3}): {} {:.1}°C",
            lat, lon, reading.condition, reading.temperature_c
        );

        Ok(reading.into())
    }
}

/// Provider used when no weather endpoint is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct NoWeather;

#[async_trait]
impl WeatherProvider for NoWeather {
    async fn current_weather(&self, _lat: f64, _lon: f64) -> Result<WeatherSnapshot> {
        Err(GeoRankError::Weather("no weather provider configured".to_string()))
    }
}

/// Builds the provider selected by configuration
pub fn provider_from_config(config: &AppConfig) -> Result<Box<dyn WeatherProvider>> {
    match config.weather_endpoint() {
        Some(endpoint) => Ok(Box::new(HttpWeatherProvider::new(
            endpoint,
            config.weather_timeout(),
        )?)),
        None => Ok(Box::new(NoWeather)),
    }
}

const RAINY_PREFERRED: &[&str] = &[
    "shopping mall",
    "indoor restaurant",
    "cinema",
    "cafe with covered seating",
    "bookstore",
    "library",
    "gym",
    "indoor entertainment",
    "covered parking",
    "museum",
    "arcade",
    "indoor sports",
];

const RAINY_AVOID: &[&str] = &[
    "outdoor market",
    "park",
    "outdoor sports",
    "beach",
    "outdoor dining",
    "golf course",
    "outdoor events",
    "hiking trails",
    "outdoor festivals",
];

const HOT_PREFERRED: &[&str] = &[
    "air conditioned restaurant",
    "shopping mall",
    "ice cream shop",
    "pool",
    "beach",
    "water sports",
    "indoor cafe",
    "cold drinks",
    "frozen yogurt",
    "movie theater",
    "aquarium",
    "water park",
];

const HOT_AVOID: &[&str] = &[
    "outdoor market",
    "hot food",
    "sauna",
    "outdoor sports during midday",
    "hiking",
    "non-AC venues",
    "heavy meals",
];

const COLD_PREFERRED: &[&str] = &[
    "coffee shop",
    "warm restaurant",
    "indoor dining",
    "heated venues",
    "hot food",
    "warm clothing store",
    "indoor activities",
    "soup restaurant",
    "spa",
    "indoor markets",
    "cozy cafes",
];

const COLD_AVOID: &[&str] = &[
    "ice cream",
    "cold drinks",
    "outdoor dining",
    "swimming",
    "water activities",
    "outdoor seating",
    "cold food",
];

const PLEASANT_PREFERRED: &[&str] = &[
    "outdoor dining",
    "park",
    "outdoor market",
    "sports venue",
    "outdoor events",
    "walking trails",
    "outdoor cafe",
    "recreational activities",
    "farmers market",
    "outdoor concerts",
    "picnic areas",
];

/// Preferred and avoided business categories for the given weather
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WeatherSuggestions {
    pub preferred: Vec<String>,
    pub avoid: Vec<String>,
}

impl WeatherSuggestions {
    fn extend(&mut self, preferred: &[&str], avoid: &[&str]) {
        push_unique(&mut self.preferred, preferred);
        push_unique(&mut self.avoid, avoid);
    }
}

fn push_unique(target: &mut Vec<String>, items: &[&str]) {
    for item in items {
        if !target.iter().any(|existing| existing == item) {
            target.push((*item).to_string());
        }
    }
}

/// Suggestion lists: rainy, then hot, cold or pleasant, plus condition extras
pub fn weather_suggestions(weather: &WeatherSnapshot) -> WeatherSuggestions {
    let mut suggestions = WeatherSuggestions::default();

    if weather.is_rainy {
        suggestions.extend(RAINY_PREFERRED, RAINY_AVOID);
    } else if weather.is_hot {
        suggestions.extend(HOT_PREFERRED, HOT_AVOID);
    } else if weather.is_cold {
        suggestions.extend(COLD_PREFERRED, COLD_AVOID);
    } else if weather.is_pleasant {
        suggestions.extend(PLEASANT_PREFERRED, &[]);
    }

    match weather.condition {
        WeatherCondition::Sunny => suggestions.extend(
            &["sunglasses shop", "outdoor gear", "beach accessories", "sunscreen"],
            &[],
        ),
        WeatherCondition::Fog => suggestions.extend(
            &["indoor venues", "coffee shop", "bookstore"],
            &["scenic viewpoints", "outdoor photography", "driving tours"],
        ),
        WeatherCondition::Snow => suggestions.extend(
            &["winter sports", "ski shop", "warm clothing", "hot chocolate"],
            &["outdoor markets", "beach activities", "cold drinks"],
        ),
        _ => {}
    }

    suggestions
}

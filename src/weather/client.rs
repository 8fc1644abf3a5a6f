//! Open-Meteo forecast API client.

use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://api.open-meteo.com/v1/forecast";
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
const CURRENT_FIELDS: &str = "temperature_2m,relative_humidity_2m";

#[derive(Error, Debug)]
pub enum WeatherError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected status code {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Current outdoor conditions at the configured location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurrentWeather {
    /// Air temperature 2 m above ground, °C
    pub temperature: f64,
    /// Relative humidity 2 m above ground, %
    pub humidity: f64,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current: CurrentBlock,
}

#[derive(Debug, Deserialize)]
struct CurrentBlock {
    temperature_2m: f64,
    // Integer percent on the wire; accepted as a float either way.
    relative_humidity_2m: f64,
}

#[derive(Debug, Clone)]
pub struct OpenMeteoClient {
    http: reqwest::Client,
    base_url: String,
}

impl OpenMeteoClient {
    pub fn new() -> Result<Self, WeatherError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Client talking to `base_url` instead of the public API.
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, WeatherError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch current temperature and humidity for a location.
    pub async fn current_weather(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<CurrentWeather, WeatherError> {
        let response = self
            .http
            .get(&self.base_url)
            .query(&[
                ("latitude", latitude.to_string()),
                ("longitude", longitude.to_string()),
                ("current", CURRENT_FIELDS.to_string()),
            ])
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WeatherError::Status { status, body });
        }

        let body = response.bytes().await?;
        let parsed: ForecastResponse = serde_json::from_slice(&body)?;
        Ok(CurrentWeather {
            temperature: parsed.current.temperature_2m,
            humidity: parsed.current.relative_humidity_2m,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn forecast_body() -> serde_json::Value {
        json!({
            "latitude": 53.35,
            "longitude": -6.26,
            "generationtime_ms": 0.03,
            "utc_offset_seconds": 0,
            "timezone": "GMT",
            "timezone_abbreviation": "GMT",
            "elevation": 8.0,
            "current_units": {
                "time": "iso8601",
                "interval": "seconds",
                "temperature_2m": "°C",
                "relative_humidity_2m": "%"
            },
            "current": {
                "time": "2024-01-01T12:00",
                "interval": 900,
                "temperature_2m": 11.8,
                "relative_humidity_2m": 95
            }
        })
    }

    fn client_for(server: &MockServer) -> OpenMeteoClient {
        OpenMeteoClient::with_base_url(format!("{}/v1/forecast", server.uri())).unwrap()
    }

    #[test]
    fn test_default_base_url() {
        assert_eq!(OpenMeteoClient::new().unwrap().base_url(), DEFAULT_BASE_URL);
    }

    #[tokio::test]
    async fn test_current_weather_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .and(query_param("latitude", "53.35"))
            .and(query_param("longitude", "-6.26"))
            .and(query_param("current", "temperature_2m,relative_humidity_2m"))
            .and(header("accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body()))
            .expect(1)
            .mount(&server)
            .await;

        let weather = client_for(&server)
            .current_weather(53.35, -6.26)
            .await
            .unwrap();

        assert_eq!(weather.temperature, 11.8);
        assert_eq!(weather.humidity, 95.0);
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .current_weather(0.0, 0.0)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            WeatherError::Status { status, .. } if status == StatusCode::INTERNAL_SERVER_ERROR
        ));
        assert!(err.to_string().contains("unexpected status code 500"));
    }

    #[tokio::test]
    async fn test_invalid_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("invalid json"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .current_weather(0.0, 0.0)
            .await
            .unwrap_err();

        assert!(matches!(err, WeatherError::Parse(_)));
    }

    #[tokio::test]
    async fn test_missing_current_block() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "latitude": 1.0 })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .current_weather(1.0, 2.0)
            .await
            .unwrap_err();

        assert!(matches!(err, WeatherError::Parse(_)));
    }
}

//! Nominatim HTTP adapter for reverse geocoding.

use serde::{Deserialize, Serialize};

use crate::error::GeocodeError;
use crate::traits::Geocoder;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NominatimConfig {
    pub base_url: String,
    /// Nominatim's usage policy requires an identifying agent.
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Preferred result language, sent as `accept-language`.
    pub language: Option<String>,
}

impl Default for NominatimConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            user_agent: concat!("geotrack/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 10,
            language: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NominatimClient {
    config: NominatimConfig,
    client: reqwest::blocking::Client,
}

impl NominatimClient {
    pub fn new(config: NominatimConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self { config, client })
    }

    fn reverse_request(&self, latitude: f64, longitude: f64) -> reqwest::blocking::RequestBuilder {
        let url = format!("{}/reverse", self.config.base_url.trim_end_matches('/'));
        let mut params = vec![
            ("format", "jsonv2".to_string()),
            ("lat", format!("{:.6}", latitude)),
            ("lon", format!("{:.6}", longitude)),
        ];
        if let Some(language) = &self.config.language {
            params.push(("accept-language", language.clone()));
        }
        self.client.get(url).query(&params)
    }
}

impl Geocoder for NominatimClient {
    fn reverse_geocode(&self, latitude: f64, longitude: f64) -> Result<Option<String>, GeocodeError> {
        let body = self
            .reverse_request(latitude, longitude)
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.json::<NominatimReverseResponse>())?;

        match (body.display_name, body.error) {
            (Some(name), _) if !name.is_empty() => Ok(Some(name)),
            // Nominatim reports "Unable to geocode" for open water etc.
            (_, Some(message)) if message.starts_with("Unable to geocode") => Ok(None),
            (_, Some(message)) => Err(GeocodeError::Service(message)),
            _ => Ok(None),
        }
    }
}

#[derive(Debug, Deserialize)]
struct NominatimReverseResponse {
    display_name: Option<String>,
    error: Option<String>,
}

//! Reverse geocoding against a Nominatim-compatible service.
//!
//! Strictly best-effort: every failure mode degrades to a fixed placeholder
//! string, and a slow upstream is bounded by the client timeout. The
//! attendance request itself never fails because of geocoding.

use std::time::Duration;
use timeclock_geo::Coordinate;

const PLACEHOLDER_NO_LOCATION: &str = "Location not provided";
const PLACEHOLDER_NOT_FOUND: &str = "Address not found";
const PLACEHOLDER_LOOKUP_FAILED: &str = "Address lookup failed";
const PLACEHOLDER_TIMED_OUT: &str = "Address lookup timed out";
const PLACEHOLDER_ERROR: &str = "Address lookup error";

const USER_AGENT: &str = concat!("timeclock/", env!("CARGO_PKG_VERSION"));

enum Mode {
    Http { client: reqwest::Client, endpoint: String },
    /// Fixed answer, used by tests and air-gapped deployments.
    Fixed(String),
}

pub struct ReverseGeocoder {
    mode: Mode,
}

impl ReverseGeocoder {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            mode: Mode::Http {
                client,
                endpoint: endpoint.trim_end_matches('/').to_string(),
            },
        })
    }

    pub fn fixed(address: &str) -> Self {
        Self { mode: Mode::Fixed(address.to_string()) }
    }

    /// Resolve a human-readable address for the position.
    ///
    /// Always returns a string; see the placeholder constants for the
    /// degraded outcomes.
    pub async fn resolve(&self, position: Option<Coordinate>) -> String {
        let Some(position) = position.filter(Coordinate::is_set) else {
            return PLACEHOLDER_NO_LOCATION.to_string();
        };

        let (client, endpoint) = match &self.mode {
            Mode::Fixed(address) => return address.clone(),
            Mode::Http { client, endpoint } => (client, endpoint),
        };

        let url = format!(
            "{endpoint}/reverse?lat={}&lon={}&format=json",
            position.latitude, position.longitude
        );

        match client.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                match response.json::<serde_json::Value>().await {
                    Ok(body) => body
                        .get("display_name")
                        .and_then(|v| v.as_str())
                        .map(str::to_string)
                        .unwrap_or_else(|| PLACEHOLDER_NOT_FOUND.to_string()),
                    Err(err) => {
                        tracing::warn!(error = %err, "geocoding response was not valid JSON");
                        PLACEHOLDER_ERROR.to_string()
                    }
                }
            }
            Ok(response) => {
                tracing::warn!(status = %response.status(), "geocoding service returned an error");
                PLACEHOLDER_LOOKUP_FAILED.to_string()
            }
            Err(err) if err.is_timeout() => {
                tracing::warn!("geocoding request timed out");
                PLACEHOLDER_TIMED_OUT.to_string()
            }
            Err(err) => {
                tracing::warn!(error = %err, "geocoding request failed");
                PLACEHOLDER_ERROR.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_position_short_circuits() {
        let geocoder = ReverseGeocoder::fixed("somewhere");
        assert_eq!(geocoder.resolve(None).await, PLACEHOLDER_NO_LOCATION);
        assert_eq!(
            geocoder.resolve(Some(Coordinate::new(0.0, 0.0))).await,
            PLACEHOLDER_NO_LOCATION
        );
    }

    #[tokio::test]
    async fn fixed_mode_returns_configured_address() {
        let geocoder = ReverseGeocoder::fixed("1 Main St");
        assert_eq!(
            geocoder.resolve(Some(Coordinate::new(10.0, 10.0))).await,
            "1 Main St"
        );
    }
}

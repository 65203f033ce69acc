// src/services/connectivity.rs

//! Connectivity gate.
//!
//! One cheap request to a well-known host decides whether a live collection
//! is worth attempting. The probe never fails: errors and timeouts read as
//! "unreachable".

use std::time::Duration;

use crate::models::HttpConfig;

/// Decides whether the network path is usable.
pub trait ConnectivityGate {
    fn probe(&self) -> bool;
}

/// A gate with a fixed answer, for offline mode and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedGate(pub bool);

impl ConnectivityGate for FixedGate {
    fn probe(&self) -> bool {
        self.0
    }
}

/// Probes a fixed URL with a short timeout.
pub struct HttpProbe {
    client: Option<reqwest::blocking::Client>,
    url: String,
}

impl HttpProbe {
    pub fn new(config: &HttpConfig) -> Self {
        let client = reqwest::blocking::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.probe_timeout_secs))
            .build()
            .map_err(|e| log::warn!("Connectivity probe client unavailable: {}", e))
            .ok();
        Self {
            client,
            url: config.probe_url.clone(),
        }
    }
}

impl ConnectivityGate for HttpProbe {
    fn probe(&self) -> bool {
        let Some(client) = &self.client else {
            return false;
        };
        match client.head(&self.url).send() {
            Ok(response) => {
                let reachable = !response.status().is_server_error();
                log::debug!("Probe {} -> {}", self.url, response.status());
                reachable
            }
            Err(e) => {
                log::info!("Network unreachable ({}): {}", self.url, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_gate_answers_as_told() {
        assert!(FixedGate(true).probe());
        assert!(!FixedGate(false).probe());
    }

    #[test]
    fn unreachable_probe_is_false_not_error() {
        let config = HttpConfig {
            probe_url: "http://127.0.0.1:9/".into(),
            probe_timeout_secs: 1,
            ..HttpConfig::default()
        };
        assert!(!HttpProbe::new(&config).probe());
    }

    #[test]
    fn malformed_probe_url_is_false() {
        let config = HttpConfig {
            probe_url: "::not a url::".into(),
            ..HttpConfig::default()
        };
        assert!(!HttpProbe::new(&config).probe());
    }
}

//! 🚚 HTTP transport construction.
//!
//! One config struct, one build function, a fixed order of steps:
//! timeouts and keepalive first, then proxy resolution, then the client
//! build. Proxy resolution has a single precedence rule: an explicitly
//! configured URL beats whatever the environment says, and disabling
//! beats both.

use std::time::Duration;

use serde::Deserialize;

use crate::connection::ClientError;

/// Transport-level knobs, all optional in config files.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Overall request timeout in seconds, bulk body included.
    pub timeout_secs: u64,
    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Explicit proxy URL. Overrides proxy settings from the environment.
    pub proxy_url: Option<String>,
    /// Disable proxying entirely, including environment-derived proxies.
    pub proxy_disable: bool,
    /// TCP keepalive interval in seconds. Off when absent.
    pub tcp_keepalive_secs: Option<u64>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            timeout_secs: 90,
            connect_timeout_secs: 10,
            proxy_url: None,
            proxy_disable: false,
            tcp_keepalive_secs: None,
        }
    }
}

impl TransportConfig {
    /// Build the HTTP client these settings describe.
    pub fn build(&self) -> Result<reqwest::Client, ClientError> {
        // step 1: timing
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs));
        if let Some(secs) = self.tcp_keepalive_secs {
            builder = builder.tcp_keepalive(Duration::from_secs(secs));
        }

        // step 2: proxy, disable wins over an explicit URL
        if self.proxy_disable {
            builder = builder.no_proxy();
        } else if let Some(url) = &self.proxy_url {
            let proxy = reqwest::Proxy::all(url)
                .map_err(|err| ClientError::InvalidConfig(format!("invalid proxy url: {err}")))?;
            builder = builder.proxy(proxy);
        }

        // step 3: build
        Ok(builder.build()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_defaults_produce_a_client() {
        let config = TransportConfig::default();
        assert_eq!(config.timeout_secs, 90);
        assert_eq!(config.connect_timeout_secs, 10);
        assert!(!config.proxy_disable);
        config.build().unwrap();
    }

    #[test]
    fn the_one_where_a_bad_proxy_url_is_a_config_error() {
        let config = TransportConfig {
            proxy_url: Some("::not a url::".to_string()),
            ..TransportConfig::default()
        };
        assert!(matches!(
            config.build(),
            Err(ClientError::InvalidConfig(_))
        ));
    }

    #[test]
    fn the_one_where_disabling_beats_the_configured_proxy() {
        // a broken proxy URL is never parsed when proxying is disabled
        let config = TransportConfig {
            proxy_url: Some("::not a url::".to_string()),
            proxy_disable: true,
            ..TransportConfig::default()
        };
        config.build().unwrap();
    }

    #[test]
    fn the_one_where_partial_toml_fills_in_defaults() {
        let config: TransportConfig = serde_json::from_str(r#"{"timeout_secs": 5}"#).unwrap();
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.connect_timeout_secs, 10);
        assert_eq!(config.tcp_keepalive_secs, None);
    }
}

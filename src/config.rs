use reqwest::Url;

use crate::errors::ConfigError;

pub const DEFAULT_GRAPH_API_VERSION: &str = "v21.0";
pub const DEFAULT_BLUESKY_SERVICE: &str = "https://bsky.social";

/// Facebook app credentials used for the OAuth dance and Graph API calls.
#[derive(Debug, Clone)]
pub struct FacebookConfig {
    pub app_id: String,
    pub app_secret: String,
    pub redirect_uri: String,
    pub api_version: String,
}

/// Bluesky account the bridge publishes to.
#[derive(Debug, Clone)]
pub struct BlueskyConfig {
    pub identifier: String,
    pub app_password: String,
    pub service: String,
}

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub facebook: FacebookConfig,
    pub bluesky: BlueskyConfig,
}

impl BridgeConfig {
    /// Reject empty required values and malformed URLs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require("FACEBOOK_APP_ID", &self.facebook.app_id)?;
        require("FACEBOOK_APP_SECRET", &self.facebook.app_secret)?;
        require("FACEBOOK_REDIRECT_URI", &self.facebook.redirect_uri)?;
        require("BLUESKY_HANDLE", &self.bluesky.identifier)?;
        require("BLUESKY_APP_PASSWORD", &self.bluesky.app_password)?;

        require_http_url("FACEBOOK_REDIRECT_URI", &self.facebook.redirect_uri)?;
        require_http_url("BLUESKY_SERVICE", &self.bluesky.service)?;

        if !self.facebook.api_version.starts_with('v') {
            return Err(ConfigError::Invalid {
                name: "GRAPH_API_VERSION",
                message: format!("expected a version like v21.0, got '{}'", self.facebook.api_version),
            });
        }
        Ok(())
    }
}

fn require(name: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Missing { name });
    }
    Ok(())
}

fn require_http_url(name: &'static str, value: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::Invalid {
        name,
        message: format!("'{}' is not an http(s) URL: {}", value, reason),
    };
    let url = Url::parse(value).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("unsupported scheme"));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> BridgeConfig {
        BridgeConfig {
            facebook: FacebookConfig {
                app_id: "123".into(),
                app_secret: "shh".into(),
                redirect_uri: "http://localhost:5000/callback".into(),
                api_version: DEFAULT_GRAPH_API_VERSION.into(),
            },
            bluesky: BlueskyConfig {
                identifier: "me.bsky.social".into(),
                app_password: "xxxx-xxxx".into(),
                service: DEFAULT_BLUESKY_SERVICE.into(),
            },
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn blank_app_id_is_missing() {
        let mut config = valid();
        config.facebook.app_id = "  ".into();
        match config.validate() {
            Err(ConfigError::Missing { name }) => assert_eq!(name, "FACEBOOK_APP_ID"),
            other => panic!("Expected Missing, got {:?}", other),
        }
    }

    #[test]
    fn blank_bluesky_password_is_missing() {
        let mut config = valid();
        config.bluesky.app_password = String::new();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing {
                name: "BLUESKY_APP_PASSWORD"
            })
        ));
    }

    #[test]
    fn redirect_uri_must_be_http() {
        let mut config = valid();
        config.facebook.redirect_uri = "localhost/callback".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                name: "FACEBOOK_REDIRECT_URI",
                ..
            })
        ));
    }

    #[test]
    fn urls_need_http_scheme_and_host() {
        for bad in ["http://", "https://", "ftp://bsky.social", "bsky.social"] {
            let mut config = valid();
            config.bluesky.service = bad.into();
            assert!(
                matches!(
                    config.validate(),
                    Err(ConfigError::Invalid {
                        name: "BLUESKY_SERVICE",
                        ..
                    })
                ),
                "accepted {}",
                bad
            );
        }
    }

    #[test]
    fn api_version_must_look_like_a_version() {
        let mut config = valid();
        config.facebook.api_version = "21.0".into();
        assert!(config.validate().is_err());
    }
}

use lazy_static::lazy_static;
use std::env;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::RwLock;

lazy_static! {
    static ref CONFIG: RwLock<Config> = RwLock::new(Config::new());
}

/// Default SRTP cipher/auth selection applied when a MIKEY message
/// under-specifies a policy (§10 ambient config surface).
#[derive(Debug, Clone)]
pub struct SrtpDefaultsConfig {
    /// Cipher name, as it would appear in the `srtp-cipher` caps field.
    pub cipher: String,
    /// Auth scheme name, as it would appear in the `srtp-auth` caps field.
    pub auth: String,
}

/// Ambient runtime configuration: address-pool range, backlog
/// thresholds, preroll timeout, and SRTP defaults, layered from
/// built-in defaults, an optional config file, then environment
/// variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Default RTSP URL used by examples/tests that need one.
    pub rtsp_url: String,
    /// Inclusive even-RTP-port range the address pool hands out from.
    pub rtp_port_min: u16,
    /// See [`Config::rtp_port_min`].
    pub rtp_port_max: u16,
    /// Default multicast TTL when a `SETUP` request doesn't specify one.
    pub default_multicast_ttl: u8,
    /// Maximum duration, in seconds, a TCP transport's backlog may span
    /// before it is considered overflowed (alongside the length cap).
    pub backlog_max_duration_secs: u32,
    /// Item-count floor below which a long-duration backlog is still
    /// tolerated; overflow requires exceeding both caps.
    pub backlog_max_len: usize,
    /// Timeout, in seconds, `wait_preroll` allows before declaring ERROR.
    pub preroll_timeout_secs: u64,
    /// Number of UDP bind attempts the port-allocation retry loop makes
    /// before giving up.
    pub rtp_port_bind_retries: u32,
    /// Default SRTP cipher/auth selection.
    pub srtp_defaults: SrtpDefaultsConfig,
}

impl Config {
    fn new() -> Self {
        // Default values (not containing sensitive information)
        let mut config = Config {
            rtsp_url: String::from("rtsp://example.com:3000/stream"),
            rtp_port_min: 20000,
            rtp_port_max: 20100,
            default_multicast_ttl: 16,
            backlog_max_duration_secs: 10,
            backlog_max_len: 100,
            preroll_timeout_secs: 20,
            rtp_port_bind_retries: 20,
            srtp_defaults: SrtpDefaultsConfig {
                cipher: String::from("aes-128-icm"),
                auth: String::from("hmac-sha1-80"),
            },
        };

        // Try loading from environment variables first
        if let Ok(url) = env::var("VDKIO_RTSP_URL") {
            config.rtsp_url = url;
        }
        if let Ok(min) = env::var("VDKIO_RTP_PORT_MIN").and_then(|v| {
            v.parse().map_err(|_| env::VarError::NotPresent)
        }) {
            config.rtp_port_min = min;
        }
        if let Ok(max) = env::var("VDKIO_RTP_PORT_MAX").and_then(|v| {
            v.parse().map_err(|_| env::VarError::NotPresent)
        }) {
            config.rtp_port_max = max;
        }

        // Then try loading from config file
        let config_paths = ["./config.toml", "./vdkio_config.toml"];
        for path in &config_paths {
            if let Ok(mut file) = File::open(path) {
                let mut content = String::new();
                if file.read_to_string(&mut content).is_ok() {
                    config.apply_line("rtsp_url", &content, |c, v| c.rtsp_url = v.to_string());
                    config.apply_parsed_line("rtp_port_min", &content, |c, v| c.rtp_port_min = v);
                    config.apply_parsed_line("rtp_port_max", &content, |c, v| c.rtp_port_max = v);
                    config.apply_parsed_line("default_multicast_ttl", &content, |c, v| {
                        c.default_multicast_ttl = v
                    });
                    config.apply_parsed_line("backlog_max_duration_secs", &content, |c, v| {
                        c.backlog_max_duration_secs = v
                    });
                    config.apply_parsed_line("backlog_max_len", &content, |c, v| {
                        c.backlog_max_len = v
                    });
                    config.apply_parsed_line("preroll_timeout_secs", &content, |c, v| {
                        c.preroll_timeout_secs = v
                    });
                    config.apply_parsed_line("rtp_port_bind_retries", &content, |c, v| {
                        c.rtp_port_bind_retries = v
                    });
                }
            }
        }

        config
    }

    fn apply_line(&mut self, key: &str, content: &str, set: impl FnOnce(&mut Self, &str)) {
        if let Some(line) = content.lines().find(|line| line.trim_start().starts_with(key)) {
            if let Some(value) = line.split('=').nth(1) {
                let value = value.trim().trim_matches('"').trim_matches('\'');
                if !value.is_empty() {
                    set(self, value);
                }
            }
        }
    }

    fn apply_parsed_line<T: std::str::FromStr>(
        &mut self,
        key: &str,
        content: &str,
        set: impl FnOnce(&mut Self, T),
    ) {
        if let Some(line) = content.lines().find(|line| line.trim_start().starts_with(key)) {
            if let Some(value) = line.split('=').nth(1) {
                let value = value.trim().trim_matches('"').trim_matches('\'');
                if let Ok(parsed) = value.parse::<T>() {
                    set(self, parsed);
                }
            }
        }
    }

    /// Reloads the global configuration from the environment and
    /// config file, replacing whatever was previously loaded.
    pub fn reload() {
        let new_config = Config::new();
        if let Ok(mut config) = CONFIG.write() {
            *config = new_config;
        }
    }
}

/// Returns the RTSP URL from configuration
pub fn get_rtsp_url() -> String {
    CONFIG.read().unwrap().rtsp_url.clone()
}

/// Returns a clone of the full configuration.
pub fn get_config() -> Config {
    CONFIG.read().unwrap().clone()
}

/// Creates a default config template file if it doesn't exist
pub fn create_default_config_template<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    if !path.as_ref().exists() {
        let template = r#"# VDKIO Configuration
# This is a template. Replace the values with your actual configuration.

# RTSP URL for testing/examples
rtsp_url = "rtsp://example.com:3000/stream"
"#;
        std::fs::write(path, template)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_hold_without_env_or_config_file() {
        // Picks up a `.env` file if the workspace has one; a no-op otherwise.
        dotenv::dotenv().ok();
        let config = Config::new();
        assert_eq!(config.rtp_port_min, 20000);
        assert_eq!(config.rtp_port_max, 20100);
        assert_eq!(config.default_multicast_ttl, 16);
        assert_eq!(config.backlog_max_duration_secs, 10);
        assert_eq!(config.backlog_max_len, 100);
        assert_eq!(config.preroll_timeout_secs, 20);
        assert_eq!(config.srtp_defaults.cipher, "aes-128-icm");
        assert_eq!(config.srtp_defaults.auth, "hmac-sha1-80");
    }
}

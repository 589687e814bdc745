//! Process configuration loading: TOML file + environment overlay for
//! secrets, mirroring the core library's settings-loading shape but for a
//! config file on disk rather than in-memory defaults.

use std::fs;
use std::path::{Path, PathBuf};

use gateway_core::GatewayConfig;

/// Default config file path, overridable via `GATEWAY_CONFIG`.
pub fn default_config_path() -> PathBuf {
    std::env::var_os("GATEWAY_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("./gateway.toml"))
}

/// Load configuration from `path` if it exists (falling back to defaults
/// otherwise), then overlay secrets from environment variables. The ASR API
/// key is never read from the file — only from `GATEWAY_ASR_API_KEY` — so a
/// checked-in config file can never leak a credential.
pub fn load_config(path: &Path) -> anyhow::Result<GatewayConfig> {
    let mut config = match fs::read_to_string(path) {
        Ok(raw) => toml::from_str(&raw)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => GatewayConfig::default(),
        Err(e) => return Err(e.into()),
    };

    overlay_env(&mut config);
    Ok(config)
}

fn overlay_env(config: &mut GatewayConfig) {
    if let Ok(key) = std::env::var("GATEWAY_ASR_API_KEY") {
        config.asr.api_key = key;
    }
    if let Ok(url) = std::env::var("GATEWAY_ASR_BASE_URL") {
        config.asr.base_url = url;
    }
    if let Ok(port) = std::env::var("GATEWAY_LISTEN_PORT") {
        if let Ok(port) = port.parse() {
            config.listen_port = port;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = load_config(Path::new("/nonexistent/gateway.toml")).unwrap();
        assert_eq!(config.listen_port, 8787);
    }

    #[test]
    fn file_values_are_overridden_by_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "listen_port = 9090\n[asr]\napi_key = \"from-file\"").unwrap();

        std::env::set_var("GATEWAY_ASR_API_KEY", "from-env");
        let config = load_config(file.path()).unwrap();
        std::env::remove_var("GATEWAY_ASR_API_KEY");

        assert_eq!(config.listen_port, 9090);
        assert_eq!(config.asr.api_key, "from-env");
    }
}

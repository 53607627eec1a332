//! Global configuration loader for Palaver.
//!
//! Reads `config.toml` from the data directory (`~/.palaver/` in production)
//! and deserializes it into [`GlobalConfig`]. Falls back to defaults when the
//! file is missing or malformed.

use std::path::Path;

use palaver_types::config::GlobalConfig;

/// File name of the global configuration inside the data directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Load global configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`GlobalConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
/// - Otherwise returns the parsed config.
pub async fn load_global_config(data_dir: &Path) -> GlobalConfig {
    let config_path = data_dir.join(CONFIG_FILE);

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return GlobalConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return GlobalConfig::default();
        }
    };

    match toml::from_str::<GlobalConfig>(&content) {
        Ok(config) => {
            tracing::debug!(
                bots = config.raw_bots.len(),
                quotas = config.usage.quotas.len(),
                "loaded {}",
                config_path.display()
            );
            config
        }
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            GlobalConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palaver_types::usage::ResetPeriod;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_global_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_global_config(tmp.path()).await;
        assert_eq!(config.provider.name, "openai");
        assert!(config.usage.quotas.is_empty());
        assert!(config.bots().is_empty());
    }

    #[tokio::test]
    async fn load_global_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join(CONFIG_FILE),
            r#"
[chat]
persist_partial = true

[[usage.quotas]]
role = "anonymous"
limit_type = "messages"
max_usage = 20
reset_period = "daily"

[[bots]]
id = "helper"
name = "Helper"
model = "gpt-4o"
"#,
        )
        .await
        .unwrap();

        let config = load_global_config(tmp.path()).await;
        assert!(config.chat.persist_partial);
        assert_eq!(config.usage.quotas.len(), 1);
        assert_eq!(config.usage.quotas[0].reset_period, ResetPeriod::Daily);
        assert_eq!(config.bot("helper").unwrap().model.name, "gpt-4o");
    }

    #[tokio::test]
    async fn load_global_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join(CONFIG_FILE), "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_global_config(tmp.path()).await;
        assert!(!config.chat.persist_partial);
        assert!(config.usage.quotas.is_empty());
    }
}

//! Local JSON settings files kept next to the synced content.
//!
//! `sync_config.json` is read on every start. When it is missing, defaults are
//! written; when it cannot be parsed, it is replaced with defaults. Dedicated
//! servers additionally read `sync_server_config.json`.

use crate::utils::errors::{Result, SyncError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Directory under the game directory that holds the settings files.
pub const SETTINGS_DIR: &str = "synccraft";
pub const SYNC_CONFIG_FILE: &str = "sync_config.json";
pub const SERVER_CONFIG_FILE: &str = "sync_server_config.json";

/// Which side of the game this agent runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncSettings {
    pub config_version: u32,
    /// Sync directory, relative to the game directory
    pub directory: String,
    /// Expected `serverName` of the manifest
    pub server_name: String,
    /// Base URL the manifest is fetched from
    pub server: String,
    /// Local content-pack version (semver)
    pub pack_version: String,
    /// Never delete local files, even when the manifest asks for force sync
    pub weak_sync: bool,
    /// Whether config files are synced at all
    pub sync_config: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            config_version: 1,
            directory: "synccraft".to_string(),
            server_name: "SyncCraftExample".to_string(),
            server: "http://localhost:35196/".to_string(),
            pack_version: "1.0.0".to_string(),
            weak_sync: false,
            sync_config: true,
        }
    }
}

impl SyncSettings {
    /// URL of the remote manifest: `{server}/mods.json`.
    pub fn manifest_url(&self) -> String {
        let mut url = self.server.clone();
        if !url.ends_with('/') {
            url.push('/');
        }
        url.push_str("mods.json");
        url
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkingMode {
    /// Content is hosted elsewhere; the server syncs like a client.
    #[serde(alias = "consumer", alias = "CONSUMER")]
    Consumer,
    /// The server hosts the content itself.
    #[serde(alias = "provider", alias = "PROVIDER")]
    Provider,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    pub config_version: u32,
    pub working_mode: WorkingMode,
    pub provider_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            config_version: 1,
            working_mode: WorkingMode::Consumer,
            provider_port: 35196,
        }
    }
}

/// Settings loaded for one sync attempt.
#[derive(Debug, Clone)]
pub struct Settings {
    pub sync: SyncSettings,
    pub server: Option<ServerSettings>,
}

impl Settings {
    /// Load (or create) the settings files under `<game_dir>/synccraft/`.
    ///
    /// Servers running in provider mode are refused.
    pub fn load(game_dir: &Path, role: Role) -> Result<Self> {
        let dir = game_dir.join(SETTINGS_DIR);
        let sync: SyncSettings = load_or_default(&dir.join(SYNC_CONFIG_FILE))?;

        let server = match role {
            Role::Client => None,
            Role::Server => {
                let server: ServerSettings = load_or_default(&dir.join(SERVER_CONFIG_FILE))?;
                if server.working_mode == WorkingMode::Provider {
                    return Err(SyncError::Unsupported(
                        "provider working mode is not implemented".to_string(),
                    ));
                }
                Some(server)
            }
        };

        Ok(Self { sync, server })
    }

    /// Absolute sync directory (`<game_dir>/<directory>`).
    pub fn sync_dir(&self, game_dir: &Path) -> PathBuf {
        game_dir.join(&self.sync.directory)
    }
}

/// Read a JSON settings object, writing defaults when the file is absent or unparsable.
pub fn load_or_default<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Serialize + Default,
{
    if !path.exists() {
        info!("Settings file {} not found, writing defaults", path.display());
        let value = T::default();
        save(path, &value)?;
        return Ok(value);
    }

    let content = std::fs::read_to_string(path).map_err(|e| SyncError::fs(path, e))?;
    match serde_json::from_str(&content) {
        Ok(value) => Ok(value),
        Err(e) => {
            warn!(
                "Settings file {} is malformed ({}), resetting to defaults",
                path.display(),
                e
            );
            let value = T::default();
            save(path, &value)?;
            Ok(value)
        }
    }
}

/// Write a settings object as pretty-printed JSON, creating parent directories.
pub fn save<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| SyncError::fs(parent, e))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).map_err(|e| SyncError::fs(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_writes_defaults() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let settings = Settings::load(temp_dir.path(), Role::Client)?;

        assert_eq!(settings.sync, SyncSettings::default());
        assert!(settings.server.is_none());
        assert!(temp_dir.path().join("synccraft/sync_config.json").exists());
        assert!(!temp_dir.path().join("synccraft/sync_server_config.json").exists());
        Ok(())
    }

    #[test]
    fn test_existing_file_is_read() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("synccraft/sync_config.json");
        std::fs::create_dir_all(path.parent().unwrap())?;
        std::fs::write(
            &path,
            r#"{"serverName":"Survival","server":"https://mods.example.com","weakSync":true}"#,
        )?;

        let settings = Settings::load(temp_dir.path(), Role::Client)?;
        assert_eq!(settings.sync.server_name, "Survival");
        assert!(settings.sync.weak_sync);
        // Omitted fields fall back to defaults
        assert_eq!(settings.sync.pack_version, "1.0.0");
        assert!(settings.sync.sync_config);
        Ok(())
    }

    #[test]
    fn test_malformed_file_reset_to_defaults() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("sync_config.json");
        std::fs::write(&path, "{ not json")?;

        let settings: SyncSettings = load_or_default(&path)?;
        assert_eq!(settings, SyncSettings::default());

        let rewritten: SyncSettings = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        assert_eq!(rewritten, SyncSettings::default());
        Ok(())
    }

    #[test]
    fn test_server_role_loads_server_config() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let settings = Settings::load(temp_dir.path(), Role::Server)?;
        assert_eq!(settings.server, Some(ServerSettings::default()));
        Ok(())
    }

    #[test]
    fn test_provider_mode_unsupported() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("synccraft/sync_server_config.json");
        std::fs::create_dir_all(path.parent().unwrap())?;
        std::fs::write(&path, r#"{"workingMode":"Provider"}"#)?;

        let result = Settings::load(temp_dir.path(), Role::Server);
        assert!(matches!(result, Err(SyncError::Unsupported(_))));
        Ok(())
    }

    #[test]
    fn test_manifest_url() {
        let mut settings = SyncSettings::default();
        assert_eq!(settings.manifest_url(), "http://localhost:35196/mods.json");

        settings.server = "https://mods.example.com/pack".to_string();
        assert_eq!(settings.manifest_url(), "https://mods.example.com/pack/mods.json");
    }
}

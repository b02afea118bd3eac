// Local configuration for the sync client.
//
// Global config: `~/.bufsync/config.toml`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::scan::DEFAULT_MAX_FILE_SIZE;

/// Root directory for bufsync global state: `~/.bufsync/`.
pub fn global_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".bufsync"))
}

/// Path to the global config file: `~/.bufsync/config.toml`.
pub fn global_config_path() -> Option<PathBuf> {
    global_dir().map(|d| d.join("config.toml"))
}

// ── Global config ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GlobalConfig {
    /// Name shown to collaborators.
    pub display_name: Option<String>,
    pub sync: SyncSettings,
    pub refetch: RefetchSettings,
}

impl GlobalConfig {
    /// Load from `~/.bufsync/config.toml`. Returns defaults if the file
    /// doesn't exist or can't be parsed.
    pub fn load() -> Self {
        global_config_path().and_then(|p| Self::load_from(&p).ok()).unwrap_or_default()
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&contents).map_err(ConfigError::Parse)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = global_config_path().ok_or_else(|| {
            ConfigError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "could not determine home directory",
            ))
        })?;
        self.save_to(&path)
    }

    /// Save to a specific path, creating parent directories. The directory
    /// and file are restricted to the owner.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Io)?;
            restrict_to_owner(parent, 0o700).map_err(ConfigError::Io)?;
        }
        let contents = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, contents).map_err(ConfigError::Io)?;
        restrict_to_owner(path, 0o600).map_err(ConfigError::Io)
    }
}

/// Buffer synchronization behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncSettings {
    /// Delete local files when a collaborator deletes the buffer.
    pub delete_local_files: bool,
    /// Draw collaborators' selections.
    pub show_highlights: bool,
    /// Only upload files that are explicitly added.
    pub sparse_mode: bool,
    /// Fetch buffers whose local copy differs on join.
    pub get_bufs: bool,
    /// How often local edits and selections are flushed.
    pub flush_interval_ms: u64,
    /// Delay between scan cycles.
    pub scan_delay_ms: u64,
    /// Files above this size (bytes) are never uploaded.
    pub max_file_size: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            delete_local_files: false,
            show_highlights: true,
            sparse_mode: false,
            get_bufs: true,
            flush_interval_ms: 100,
            scan_delay_ms: 25,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl SyncSettings {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.max(1))
    }

    pub fn scan_delay(&self) -> Duration {
        Duration::from_millis(self.scan_delay_ms)
    }
}

/// Retry policy for full-buffer refetches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RefetchSettings {
    /// How long to wait for a requested buffer before asking again.
    pub timeout_ms: u64,
    /// Requests sent before giving up on a buffer.
    pub max_attempts: u32,
}

impl Default for RefetchSettings {
    fn default() -> Self {
        Self { timeout_ms: 10_000, max_attempts: 3 }
    }
}

impl RefetchSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn restrict_to_owner(path: &Path, mode: u32) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let current = std::fs::metadata(path)?.permissions().mode() & 0o777;
        if current != mode {
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
        }
    }

    #[cfg(not(unix))]
    {
        let _ = (path, mode);
    }

    Ok(())
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config I/O error: {e}"),
            Self::Parse(e) => write!(f, "config parse error: {e}"),
            Self::Serialize(e) => write!(f, "config serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

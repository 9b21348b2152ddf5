use parking_lot::RwLock;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::settings::{ConfigError, Configuration};

/// Directory under the project root holding persisted state
pub const STATE_DIR: &str = ".warden";

const CONFIG_FILE: &str = "config.toml";

/// Owns the configuration of one project root.
///
/// Mutations hold the write lock across validate, persist and swap, so
/// there is a single writer per root. Readers get the last value written.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    current: RwLock<Configuration>,
}

impl ConfigStore {
    /// Open the store for a project root, loading any persisted configuration
    pub fn open<P: AsRef<Path>>(project_root: P) -> Result<Self, ConfigError> {
        let path = Self::config_path(project_root.as_ref());
        let config = read_config(&path)?;

        Ok(Self {
            path,
            current: RwLock::new(config),
        })
    }

    /// Get the config file path for a project root
    pub fn config_path(project_root: &Path) -> PathBuf {
        project_root.join(STATE_DIR).join(CONFIG_FILE)
    }

    /// Get the path this store persists to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the persisted configuration.
    ///
    /// A missing file yields the default configuration.
    pub fn load(&self) -> Result<Configuration, ConfigError> {
        let mut current = self.current.write();
        let config = read_config(&self.path)?;
        *current = config.clone();
        Ok(config)
    }

    /// Snapshot of the current configuration
    pub fn current(&self) -> Configuration {
        self.current.read().clone()
    }

    /// Read from the current configuration without cloning it
    pub fn with_config<R>(&self, f: impl FnOnce(&Configuration) -> R) -> R {
        f(&self.current.read())
    }

    /// Validate and persist a whole configuration
    pub fn save(&self, config: Configuration) -> Result<(), ConfigError> {
        let mut current = self.current.write();
        write_config(&self.path, &config)?;
        *current = config;
        info!(path = %self.path.display(), "configuration saved");
        Ok(())
    }

    /// Set a single field addressed by a dotted path, e.g. `general.git_auto_commit`
    /// or `custom_tools.0.command`.
    pub fn update(&self, field: &str, value: toml::Value) -> Result<Configuration, ConfigError> {
        let mut current = self.current.write();

        let mut document = toml::Value::try_from(&*current)?;
        set_field(&mut document, field, value)?;

        let updated = document
            .try_into::<Configuration>()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;

        write_config(&self.path, &updated)?;
        *current = updated.clone();
        info!(field, "configuration updated");
        Ok(updated)
    }

    /// Apply a mutation to a copy of the configuration, then validate and
    /// persist it. The stored value is untouched if any step fails.
    pub fn mutate<F>(&self, f: F) -> Result<Configuration, ConfigError>
    where
        F: FnOnce(&mut Configuration) -> Result<(), ConfigError>,
    {
        let mut current = self.current.write();
        let mut next = current.clone();
        f(&mut next)?;

        if next == *current {
            debug!("configuration unchanged, skipping write");
            return Ok(next);
        }

        write_config(&self.path, &next)?;
        *current = next.clone();
        Ok(next)
    }

    /// Documented template for a new project. Does not touch disk.
    pub fn generate_sample() -> Configuration {
        Configuration::sample()
    }
}

/// Load and validate a config file. Absence is not an error.
fn read_config(path: &Path) -> Result<Configuration, ConfigError> {
    if !path.exists() {
        debug!(path = %path.display(), "no config file, using defaults");
        return Ok(Configuration::default_config());
    }

    let contents = fs::read_to_string(path)?;
    let config: Configuration = toml::from_str(&contents)?;
    config.validate()?;

    Ok(config)
}

fn write_config(path: &Path, config: &Configuration) -> Result<(), ConfigError> {
    config.validate()?;
    let contents = toml::to_string_pretty(config)?;
    write_atomic(path, &contents)?;
    Ok(())
}

/// Write to a sibling temp file, then rename over the target
pub(crate) fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    fs::write(&tmp_path, contents)?;

    // Owner read/write only
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(&tmp_path)?.permissions();
        perms.set_mode(0o600);
        fs::set_permissions(&tmp_path, perms)?;
    }

    fs::rename(&tmp_path, path)
}

fn set_field(document: &mut toml::Value, field: &str, value: toml::Value) -> Result<(), ConfigError> {
    let not_found = || ConfigError::FieldNotFound(field.to_string());

    if field.split('.').any(|segment| segment.trim().is_empty()) {
        return Err(not_found());
    }

    let mut target = document;
    for segment in field.split('.') {
        target = match target {
            toml::Value::Table(table) => table.get_mut(segment),
            toml::Value::Array(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get_mut(index)),
            _ => None,
        }
        .ok_or_else(not_found)?;
    }

    *target = value;
    Ok(())
}

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::backend::{self, Backend, BackendKind, BackendLocator, Platform};
use crate::credentials::Credentials;
use crate::error::ConfigError;
use crate::options::ExecOptions;

/// Environment variable that overrides the config file location
pub const CONFIG_ENV: &str = "REMEXEC_CONFIG";

/// Environment variable consulted for the password when nothing else names one
pub const DEFAULT_PASSWORD_ENV: &str = "REMEXEC_PASSWORD";

/// Centralized configuration for remexec
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemexecConfig {
    pub backend: BackendConfig,
    pub defaults: DefaultsConfig,
    /// Named host profiles (keyed by profile name)
    pub hosts: BTreeMap<String, HostProfile>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Force a backend family instead of auto-detecting
    pub kind: Option<BackendKind>,
    /// Executable to run (kind is inferred from the name when `kind` is unset)
    pub program: Option<PathBuf>,
    /// Directory holding bundled paexec.exe / winexe_x64
    pub bundle_dir: Option<PathBuf>,
    /// Working directory for the backend process
    pub working_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub username: Option<String>,
    /// Raw password (discouraged, see `validate_secrets`)
    pub password: Option<String>,
    pub password_env: Option<String>,
    pub timeout_secs: Option<u64>,
    pub system: bool,
    pub elevated: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostProfile {
    pub host: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub password_env: Option<String>,
    pub timeout_secs: Option<u64>,
    pub system: Option<bool>,
    pub elevated: Option<bool>,
    pub reinstall: Option<bool>,
    pub uninstall: Option<bool>,
}

/// A host with its merged credentials and options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub profile: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub password_env: Option<String>,
    pub options: ExecOptions,
}

impl Target {
    /// Resolve credentials, reading the password from the environment when
    /// the target names a variable instead of a literal
    pub fn credentials(&self) -> Credentials {
        let password = self
            .password
            .clone()
            .or_else(|| self.password_env.as_deref().and_then(|var| env::var(var).ok()));
        Credentials::new(self.username.as_deref(), password.as_deref())
    }
}

impl RemexecConfig {
    /// Load config from `REMEXEC_CONFIG` or ~/.remexec/config.toml.
    ///
    /// A missing file yields the defaults; `.env` files are loaded first so
    /// `${VAR}` references and `password_env` can see them.
    pub fn load() -> Result<Self, ConfigError> {
        load_dotenv();
        let path = Self::config_path();
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load and expand a specific config file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        config.expand_variables();
        Ok(config)
    }

    /// Get config file path: $REMEXEC_CONFIG or ~/.remexec/config.toml
    pub fn config_path() -> PathBuf {
        if let Ok(path) = env::var(CONFIG_ENV) {
            if !path.is_empty() {
                return PathBuf::from(path);
            }
        }
        config_home().join("config.toml")
    }

    /// Expand ${VAR} references from the environment
    fn expand_variables(&mut self) {
        let expand_path = |p: &mut Option<PathBuf>| {
            if let Some(path) = p {
                *path = PathBuf::from(expand_string(&path.display().to_string()));
            }
        };
        let expand_opt = |s: &mut Option<String>| {
            if let Some(value) = s {
                *value = expand_string(value);
            }
        };

        expand_path(&mut self.backend.program);
        expand_path(&mut self.backend.bundle_dir);
        expand_path(&mut self.backend.working_dir);

        expand_opt(&mut self.defaults.username);
        expand_opt(&mut self.defaults.password);

        for profile in self.hosts.values_mut() {
            profile.host = expand_string(&profile.host);
            expand_opt(&mut profile.username);
            expand_opt(&mut profile.password);
        }
    }

    pub fn bundle_dir(&self) -> PathBuf {
        self.backend
            .bundle_dir
            .clone()
            .unwrap_or_else(backend::default_bundle_dir)
    }

    /// Backend chosen by configuration, falling back to detection
    pub fn resolve_backend(&self, platform: Platform, locator: &dyn BackendLocator) -> Option<Backend> {
        match (&self.backend.kind, &self.backend.program) {
            (Some(kind), Some(program)) => Some(Backend::explicit(*kind, program)),
            (None, Some(program)) => Some(Backend::from_program(program)),
            (Some(kind), None) => Backend::locate(*kind, locator),
            (None, None) => backend::detect(platform, locator, &self.bundle_dir()),
        }
    }

    /// Merge `[defaults]` with the `[hosts.<name>]` profile matching
    /// `name_or_host`. Anything that is not a profile name is a host.
    pub fn resolve_target(&self, name_or_host: &str) -> Target {
        let defaults = &self.defaults;
        let mut target = Target {
            host: name_or_host.to_string(),
            profile: None,
            username: defaults.username.clone(),
            password: defaults.password.clone(),
            password_env: defaults
                .password_env
                .clone()
                .or_else(|| Some(DEFAULT_PASSWORD_ENV.to_string())),
            options: ExecOptions {
                system: defaults.system,
                elevated: defaults.elevated,
                timeout: defaults.timeout_secs.map(Duration::from_secs),
                ..Default::default()
            },
        };

        if let Some(profile) = self.hosts.get(name_or_host) {
            target.profile = Some(name_or_host.to_string());
            if !profile.host.is_empty() {
                target.host = profile.host.clone();
            }
            if profile.username.is_some() {
                target.username = profile.username.clone();
                // A profile's own account reads only its own password settings
                target.password = None;
                target.password_env = None;
            }
            if profile.password.is_some() {
                target.password = profile.password.clone();
            }
            if profile.password_env.is_some() {
                target.password_env = profile.password_env.clone();
            }
            if let Some(secs) = profile.timeout_secs {
                target.options.timeout = Some(Duration::from_secs(secs));
            }
            if let Some(system) = profile.system {
                target.options.system = system;
            }
            if let Some(elevated) = profile.elevated {
                target.options.elevated = elevated;
            }
            if let Some(reinstall) = profile.reinstall {
                target.options.reinstall = reinstall;
            }
            if let Some(uninstall) = profile.uninstall {
                target.options.uninstall = uninstall;
            }
        }

        target
    }

    /// Like [`RemexecConfig::resolve_target`] but the name must be a profile
    pub fn profile(&self, name: &str) -> Result<Target, ConfigError> {
        if !self.hosts.contains_key(name) {
            return Err(ConfigError::UnknownProfile(name.to_string()));
        }
        Ok(self.resolve_target(name))
    }

    /// Warn about raw secrets stored in the file
    pub fn validate_secrets(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.defaults.password.as_deref().is_some_and(is_raw_secret) {
            warnings.push("defaults.password contains a raw secret (use password_env)".to_string());
        }
        for (name, profile) in &self.hosts {
            if profile.password.as_deref().is_some_and(is_raw_secret) {
                warnings.push(format!(
                    "hosts.{}.password contains a raw secret (use password_env)",
                    name
                ));
            }
        }

        warnings
    }

    /// Problems that make the configuration unusable
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if let Some(program) = &self.backend.program {
            if !program.exists() {
                errors.push(format!("backend.program {:?} does not exist", program));
            }
        }
        if let Some(dir) = &self.backend.working_dir {
            if !dir.is_dir() {
                errors.push(format!("backend.working_dir {:?} is not a directory", dir));
            }
        }
        for (name, profile) in &self.hosts {
            if profile.host.trim().is_empty() {
                errors.push(format!("hosts.{}.host is empty", name));
            }
        }

        errors
    }

    /// Save config to `path`
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        }

        let toml_str = toml::to_string_pretty(self).map_err(|e| ConfigError::Write {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        fs::write(path, toml_str).map_err(|e| ConfigError::Write {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }
}

/// ~/.remexec
pub fn config_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".remexec")
}

/// Load ~/.remexec/.env, then ./.env. Existing variables win.
pub fn load_dotenv() {
    let home_env = config_home().join(".env");
    if home_env.exists() {
        if let Err(e) = dotenvy::from_path(&home_env) {
            debug!(path = %home_env.display(), error = %e, "failed to load .env");
        }
    }
    dotenvy::dotenv().ok();
}

/// Expand ${VAR} references from the environment; unknown variables expand
/// to the empty string
pub fn expand_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                result.push_str(&env::var(name).unwrap_or_default());
                rest = &after[end + 1..];
            }
            None => {
                result.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    result.push_str(rest);
    result
}

fn is_raw_secret(value: &str) -> bool {
    !value.is_empty() && !value.starts_with("${")
}

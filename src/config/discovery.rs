//! Configuration file discovery.

use std::fmt;
use std::path::{Path, PathBuf};

/// Directory holding project configuration, relative to the repository root.
pub const CONFIG_DIR: &str = ".repoguard";

/// Configuration file name at every tier.
pub const CONFIG_FILE: &str = "config.yaml";

/// Returns the XDG-compliant config directory for repoguard.
///
/// Uses `$XDG_CONFIG_HOME/repoguard/` when set, otherwise
/// `$HOME/.config/repoguard/`. `dirs::config_dir()` is avoided because it
/// points at `~/Library/Application Support/` on macOS.
fn xdg_config_dir() -> Option<PathBuf> {
    if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
        if !xdg_home.is_empty() {
            return Some(PathBuf::from(xdg_home).join("repoguard"));
        }
    }

    dirs::home_dir().map(|home| home.join(".config").join("repoguard"))
}

/// Where a resolved configuration file came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Passed explicitly with `--config`.
    Explicit(PathBuf),
    /// Found in `{dir}/local/{filename}`.
    LocalOverride(PathBuf),
    /// Found in `{dir}/{filename}`.
    Project(PathBuf),
    /// Found in `$XDG_CONFIG_HOME/repoguard/{filename}`.
    Xdg(PathBuf),
    /// Found in `$HOME/.repoguard/{filename}`.
    Global(PathBuf),
    /// No file anywhere; built-in defaults apply.
    Defaults,
}

impl ConfigSource {
    /// Path of the file, unless defaults are in use.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Explicit(p)
            | Self::LocalOverride(p)
            | Self::Project(p)
            | Self::Xdg(p)
            | Self::Global(p) => Some(p),
            Self::Defaults => None,
        }
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Explicit(p) => write!(f, "Explicit: {}", p.display()),
            Self::LocalOverride(p) => write!(f, "Local override: {}", p.display()),
            Self::Project(p) => write!(f, "Project: {}", p.display()),
            Self::Xdg(p) => write!(f, "Global (XDG): {}", p.display()),
            Self::Global(p) => write!(f, "Global: {}", p.display()),
            Self::Defaults => write!(f, "Built-in defaults"),
        }
    }
}

/// Resolves a configuration file with local override support and global fallback.
///
/// Priority:
/// 1. `{dir}/local/{filename}`
/// 2. `{dir}/{filename}`
/// 3. `$XDG_CONFIG_HOME/repoguard/{filename}`
/// 4. `$HOME/.repoguard/{filename}`
pub fn resolve_config_file(dir: &Path, filename: &str) -> ConfigSource {
    let local_path = dir.join("local").join(filename);
    if local_path.is_file() {
        return ConfigSource::LocalOverride(local_path);
    }

    let project_path = dir.join(filename);
    if project_path.is_file() {
        return ConfigSource::Project(project_path);
    }

    if let Some(xdg_dir) = xdg_config_dir() {
        let xdg_path = xdg_dir.join(filename);
        if xdg_path.is_file() {
            return ConfigSource::Xdg(xdg_path);
        }
    }

    if let Some(home_dir) = dirs::home_dir() {
        let home_path = home_dir.join(CONFIG_DIR).join(filename);
        if home_path.is_file() {
            return ConfigSource::Global(home_path);
        }
    }

    ConfigSource::Defaults
}

/// Resolves the project configuration directory for a repository.
///
/// `REPOGUARD_CONFIG_DIR` overrides `{repo_root}/.repoguard`.
pub fn resolve_config_dir(repo_root: &Path) -> PathBuf {
    if let Ok(env_dir) = std::env::var("REPOGUARD_CONFIG_DIR") {
        if !env_dir.is_empty() {
            return PathBuf::from(env_dir);
        }
    }
    repo_root.join(CONFIG_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_override_wins() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let base = dir.path();
        std::fs::create_dir_all(base.join("local"))?;
        std::fs::write(base.join("local").join(CONFIG_FILE), "private_branch: a")?;
        std::fs::write(base.join(CONFIG_FILE), "private_branch: b")?;

        let resolved = resolve_config_file(base, CONFIG_FILE);
        assert_eq!(
            resolved,
            ConfigSource::LocalOverride(base.join("local").join(CONFIG_FILE))
        );
        Ok(())
    }

    #[test]
    fn project_fallback() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let base = dir.path();
        std::fs::write(base.join(CONFIG_FILE), "private_branch: b")?;

        let resolved = resolve_config_file(base, CONFIG_FILE);
        assert_eq!(resolved, ConfigSource::Project(base.join(CONFIG_FILE)));
        assert_eq!(resolved.path(), Some(base.join(CONFIG_FILE).as_path()));
        Ok(())
    }

    #[test]
    fn missing_project_files_never_resolve_locally() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let resolved = resolve_config_file(dir.path(), "repoguard-test-nonexistent.yaml");
        assert!(!matches!(
            resolved,
            ConfigSource::LocalOverride(_) | ConfigSource::Project(_)
        ));
        Ok(())
    }
}

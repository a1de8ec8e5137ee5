//! Configuration loading.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::model::ExamId;

/// Top-level gabarito configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GabaritoConfig {
    /// Number of shuffled variants per set.
    #[serde(default = "default_variant_count")]
    pub variant_count: u32,
    /// Largest exam a variant set may be generated for.
    #[serde(default = "default_max_questions")]
    pub max_questions: usize,
    /// Hours during which a new set may not be deleted.
    #[serde(default = "default_cooldown_hours")]
    pub cooldown_hours: i64,
    /// Max concurrent gradings in a batch.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Where variant-set ledgers are stored.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    /// Attempts at invalidating cached artifacts after an exam edit.
    #[serde(default = "default_cache_retries")]
    pub cache_invalidation_retries: u32,
    /// Exams hidden from listings.
    #[serde(default)]
    pub archived_exams: Vec<ExamId>,
}

fn default_variant_count() -> u32 {
    5
}
fn default_max_questions() -> usize {
    45
}
fn default_cooldown_hours() -> i64 {
    24
}
fn default_parallelism() -> usize {
    4
}
fn default_state_dir() -> PathBuf {
    PathBuf::from("./.gabarito")
}
fn default_cache_retries() -> u32 {
    3
}

impl Default for GabaritoConfig {
    fn default() -> Self {
        Self {
            variant_count: default_variant_count(),
            max_questions: default_max_questions(),
            cooldown_hours: default_cooldown_hours(),
            parallelism: default_parallelism(),
            state_dir: default_state_dir(),
            cache_invalidation_retries: default_cache_retries(),
            archived_exams: Vec::new(),
        }
    }
}

impl GabaritoConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::hours(self.cooldown_hours)
    }

    pub fn archived(&self) -> HashSet<ExamId> {
        self.archived_exams.iter().copied().collect()
    }

    /// Reject settings the core cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.variant_count == 0 {
            anyhow::bail!("variant_count must be at least 1");
        }
        if self.parallelism == 0 {
            anyhow::bail!("parallelism must be at least 1");
        }
        if self.cooldown_hours < 0 {
            anyhow::bail!("cooldown_hours must not be negative");
        }
        Ok(())
    }

    /// Apply `GABARITO_*` overrides and expand `${VAR}` in paths.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(dir) = lookup("GABARITO_STATE_DIR") {
            self.state_dir = PathBuf::from(dir);
        }
        if let Some(count) = lookup("GABARITO_VARIANT_COUNT") {
            self.variant_count = count
                .trim()
                .parse()
                .with_context(|| format!("GABARITO_VARIANT_COUNT is not a number: {count}"))?;
        }
        let state_dir = self.state_dir.to_string_lossy().into_owned();
        self.state_dir = PathBuf::from(resolve_env_vars(&state_dir, &lookup));
        Ok(())
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str, lookup: &impl Fn(&str) -> Option<String>) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    // Substituted values are copied verbatim, never rescanned.
    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start..].find('}') else {
            break;
        };
        result.push_str(&rest[..start]);
        result.push_str(&lookup(&rest[start + 2..start + end]).unwrap_or_default());
        rest = &rest[start + end + 1..];
    }
    result.push_str(rest);
    result
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `gabarito.toml` in the current directory
/// 2. `~/.config/gabarito/config.toml`
///
/// Environment variable overrides: `GABARITO_STATE_DIR`, `GABARITO_VARIANT_COUNT`.
pub fn load_config() -> Result<GabaritoConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<GabaritoConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("gabarito.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<GabaritoConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => GabaritoConfig::default(),
    };

    config.apply_env(|name| std::env::var(name).ok())?;
    config.validate()?;
    tracing::debug!(?config, "configuration loaded");
    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("gabarito"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn resolve_env_vars_basic() {
        let lookup = env(&[("TERM_DIR", "/srv/exams")]);
        assert_eq!(resolve_env_vars("${TERM_DIR}", &lookup), "/srv/exams");
        assert_eq!(
            resolve_env_vars("${TERM_DIR}/state", &lookup),
            "/srv/exams/state"
        );
        assert_eq!(resolve_env_vars("${MISSING}x", &lookup), "x");
        assert_eq!(resolve_env_vars("${unterminated", &lookup), "${unterminated");
    }

    #[test]
    fn resolve_env_vars_does_not_rescan_values() {
        let lookup = env(&[("LOOP", "${LOOP}/x"), ("BASE", "/srv")]);
        assert_eq!(resolve_env_vars("${LOOP}", &lookup), "${LOOP}/x");
        assert_eq!(resolve_env_vars("${BASE}/${LOOP}", &lookup), "/srv/${LOOP}/x");
    }

    #[test]
    fn default_config() {
        let config = GabaritoConfig::default();
        assert_eq!(config.variant_count, 5);
        assert_eq!(config.max_questions, 45);
        assert_eq!(config.cooldown(), Duration::hours(24));
        assert!(config.archived().is_empty());
        config.validate().unwrap();
    }

    #[test]
    fn parse_partial_config() {
        let config: GabaritoConfig = toml::from_str(
            r#"
variant_count = 3
archived_exams = [4, 9]
"#,
        )
        .unwrap();
        assert_eq!(config.variant_count, 3);
        assert_eq!(config.parallelism, 4);
        assert!(config.archived().contains(&9));
    }

    #[test]
    fn env_overrides() {
        let mut config = GabaritoConfig {
            state_dir: PathBuf::from("${BASE}/gabarito"),
            ..Default::default()
        };
        config
            .apply_env(env(&[("BASE", "/data"), ("GABARITO_VARIANT_COUNT", "4")]))
            .unwrap();
        assert_eq!(config.state_dir, PathBuf::from("/data/gabarito"));
        assert_eq!(config.variant_count, 4);

        config
            .apply_env(env(&[("GABARITO_STATE_DIR", "/tmp/x")]))
            .unwrap();
        assert_eq!(config.state_dir, PathBuf::from("/tmp/x"));

        assert!(config
            .apply_env(env(&[("GABARITO_VARIANT_COUNT", "many")]))
            .is_err());
    }

    #[test]
    fn zero_variants_is_rejected() {
        let config = GabaritoConfig {
            variant_count: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let err = load_config_from(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }
}

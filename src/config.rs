use anyhow::{anyhow, Context};
use std::path::PathBuf;
use std::{env, fmt::Display, str::FromStr};
use tracing::{info, warn};

pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone)]
pub struct Config {
    /// Workspace opened at start-up; `workspace.select` can still switch it.
    pub workspace: Option<PathBuf>,
    pub log_filter: String,
    pub default_fee_amount: f64,
    pub id_prefix: String,
    pub admin_email: String,
    pub admin_password: String,
    pub page_limit_max: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: None,
            log_filter: "colleged=info".to_string(),
            default_fee_amount: 5000.0,
            id_prefix: "STU".to_string(),
            admin_email: "admin@college.com".to_string(),
            admin_password: "admin123".to_string(),
            page_limit_max: 100,
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Config::default();
        let cfg = Config {
            workspace: lookup("COLLEGED_WORKSPACE")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            log_filter: lookup("COLLEGED_LOG").unwrap_or(d.log_filter),
            default_fee_amount: parse_or("COLLEGED_DEFAULT_FEE", &lookup, d.default_fee_amount)?,
            id_prefix: lookup("COLLEGED_ID_PREFIX").unwrap_or(d.id_prefix),
            admin_email: lookup("COLLEGED_ADMIN_EMAIL").unwrap_or(d.admin_email),
            admin_password: lookup("COLLEGED_ADMIN_PASSWORD").unwrap_or(d.admin_password),
            page_limit_max: parse_or("COLLEGED_PAGE_LIMIT_MAX", &lookup, d.page_limit_max)?,
        };

        if !cfg.default_fee_amount.is_finite() || cfg.default_fee_amount < 0.0 {
            return Err(anyhow!("COLLEGED_DEFAULT_FEE must be a non-negative amount"));
        }
        if cfg.page_limit_max < 1 {
            return Err(anyhow!("COLLEGED_PAGE_LIMIT_MAX must be at least 1"));
        }
        if cfg.id_prefix.is_empty() || !cfg.id_prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(anyhow!("COLLEGED_ID_PREFIX must be non-empty ASCII alphanumerics"));
        }
        Ok(cfg)
    }
}

fn parse_or<T, F>(key: &str, lookup: &F, default: T) -> anyhow::Result<T>
where
    T: FromStr + Display,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().with_context(|| {
            warn!("Invalid {key} value: {raw}");
            format!("invalid {}", key)
        }),
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let cfg = Config::from_lookup(|_| None).expect("config");
        assert!(cfg.workspace.is_none());
        assert_eq!(cfg.default_fee_amount, 5000.0);
        assert_eq!(cfg.id_prefix, "STU");
        assert_eq!(cfg.page_limit_max, 100);
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = Config::from_lookup(lookup_from(&[
            ("COLLEGED_WORKSPACE", "/tmp/ws"),
            ("COLLEGED_DEFAULT_FEE", "1200.5"),
            ("COLLEGED_ID_PREFIX", "CLG"),
        ]))
        .expect("config");
        assert_eq!(cfg.workspace, Some(PathBuf::from("/tmp/ws")));
        assert_eq!(cfg.default_fee_amount, 1200.5);
        assert_eq!(cfg.id_prefix, "CLG");
    }

    #[test]
    fn rejects_bad_values() {
        assert!(Config::from_lookup(lookup_from(&[("COLLEGED_DEFAULT_FEE", "lots")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("COLLEGED_DEFAULT_FEE", "-1")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("COLLEGED_ID_PREFIX", "S-1")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("COLLEGED_PAGE_LIMIT_MAX", "0")])).is_err());
    }
}

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

const PROJECT_URL_VARS: [&str; 2] = ["SUPABASE_PROJECT_URL", "VITE_SUPABASE_PROJECT_URL"];
const API_KEY_VARS: [&str; 2] = ["SUPABASE_API_KEY", "VITE_SUPABASE_API_KEY"];
const ACCESS_TOKEN_VARS: [&str; 1] = ["SUPABASE_ACCESS_TOKEN"];

/// Connection settings for the hosted project.
///
/// Values are not validated here; a bad URL or key shows up as an error
/// response from the first remote call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SupabaseConfig {
    pub project_url: String,
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

impl SupabaseConfig {
    pub fn new(project_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            project_url: project_url.into(),
            api_key: api_key.into(),
            access_token: None,
        }
    }

    /// Read settings from the process environment.
    pub fn from_env() -> Self {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Read settings from an explicit variable map, first name wins.
    pub fn from_vars(vars: &HashMap<String, String>) -> Self {
        let lookup = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| vars.get(*name).filter(|v| !v.is_empty()).cloned())
        };

        let project_url = lookup(&PROJECT_URL_VARS).unwrap_or_else(|| {
            log::warn!("{} is not set", PROJECT_URL_VARS[0]);
            String::new()
        });
        let api_key = lookup(&API_KEY_VARS).unwrap_or_else(|| {
            log::warn!("{} is not set", API_KEY_VARS[0]);
            String::new()
        });

        Self {
            project_url,
            api_key,
            access_token: lookup(&ACCESS_TOKEN_VARS),
        }
    }
}

/// Which cache entries a successful write refreshes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationScope {
    /// Only the resource's list entry `[R]`.
    #[default]
    ListOnly,
    /// The list entry and every item entry `[R, id]`.
    Resource,
}

/// Cache tuning. Durations are written as `"30s"`, `"5m"` and so on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// How long fetched data counts as fresh. Zero means always refetch on subscribe.
    #[serde(with = "humantime_serde")]
    pub stale_time: Duration,
    /// How long an unobserved entry survives before garbage collection.
    #[serde(with = "humantime_serde")]
    pub gc_time: Duration,
    pub invalidation: InvalidationScope,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_time: Duration::ZERO,
            gc_time: Duration::from_secs(5 * 60),
            invalidation: InvalidationScope::ListOnly,
        }
    }
}

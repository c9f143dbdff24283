use std::time::Duration;

use rmbackup_core::DEFAULT_BASE_URL;

use crate::sync::engine::StalenessPolicy;

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackupConfig {
    pub base_url: String,
    pub connect_timeout: Duration,
    pub staleness: StalenessPolicy,
    pub log_filter: String,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl BackupConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup("RMBACKUP_BASE_URL")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let connect_timeout = Duration::from_secs(read_u64(
            &lookup,
            "RMBACKUP_CONNECT_TIMEOUT_SECS",
            DEFAULT_CONNECT_TIMEOUT_SECS,
        ));
        let staleness = if read_bool(&lookup, "RMBACKUP_SKIP_UNCHANGED", false) {
            StalenessPolicy::SkipIfLocalNewer
        } else {
            StalenessPolicy::AlwaysOverwrite
        };
        let log_filter = lookup("RMBACKUP_LOG")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Self {
            base_url,
            connect_timeout,
            staleness,
            log_filter,
        }
    }
}

fn read_u64<F>(lookup: &F, name: &str, default: u64) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn read_bool<F>(lookup: &F, name: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(default)
}

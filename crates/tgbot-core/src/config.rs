use std::{env, fmt, fs, path::Path, str::FromStr, time::Duration};

use crate::{errors::Error, update::Category, Result};

/// Where FSM state lives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StorageBackend {
    /// In-process map behind a mutex.
    #[default]
    Memory,
    /// In-process map owned by a single task.
    Actor,
    /// State is discarded (every write logs a warning).
    None,
}

impl FromStr for StorageBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "mem" => Ok(Self::Memory),
            "actor" => Ok(Self::Actor),
            "none" | "noop" | "off" => Ok(Self::None),
            other => Err(Error::Config(format!(
                "STORAGE_BACKEND must be one of memory, actor, none (got {other:?})"
            ))),
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Memory => "memory",
            Self::Actor => "actor",
            Self::None => "none",
        })
    }
}

/// Typed runtime configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub telegram_bot_token: String,

    // Polling
    pub poll_timeout: Duration,
    pub poll_limit: u8,
    /// Categories asked from Telegram. Empty means "whatever Telegram sends by default".
    pub allowed_updates: Vec<Category>,
    pub fetch_retry_delay: Duration,

    // Dispatch
    pub max_concurrent_updates: usize,
    pub storage_backend: StorageBackend,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            telegram_bot_token: String::new(),
            poll_timeout: Duration::from_secs(30),
            poll_limit: 100,
            allowed_updates: Vec::new(),
            fetch_retry_delay: Duration::from_millis(1000),
            max_concurrent_updates: 64,
            storage_backend: StorageBackend::Memory,
        }
    }
}

impl Config {
    /// Load from the environment, after merging `.env` from the working directory.
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(env_str)
    }

    /// Build from an arbitrary key lookup. `load` uses the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let telegram_bot_token = lookup("TELEGRAM_BOT_TOKEN")
            .and_then(non_empty)
            .ok_or_else(|| {
                Error::Config("TELEGRAM_BOT_TOKEN environment variable is required".to_string())
            })?;

        let poll_timeout = parse_opt::<u64>(&lookup, "POLL_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.poll_timeout);

        let poll_limit = parse_opt::<u8>(&lookup, "POLL_LIMIT")?.unwrap_or(defaults.poll_limit);
        if !(1..=100).contains(&poll_limit) {
            return Err(Error::Config(format!(
                "POLL_LIMIT must be between 1 and 100 (got {poll_limit})"
            )));
        }

        let max_concurrent_updates = parse_opt::<usize>(&lookup, "MAX_CONCURRENT_UPDATES")?
            .unwrap_or(defaults.max_concurrent_updates);
        if max_concurrent_updates == 0 {
            return Err(Error::Config(
                "MAX_CONCURRENT_UPDATES must be at least 1".to_string(),
            ));
        }

        let fetch_retry_delay = parse_opt::<u64>(&lookup, "FETCH_RETRY_DELAY_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.fetch_retry_delay);

        let storage_backend = match lookup("STORAGE_BACKEND").and_then(non_empty) {
            Some(v) => v.parse()?,
            None => defaults.storage_backend,
        };

        let allowed_updates = parse_csv_categories(lookup("ALLOWED_UPDATES"))?;

        Ok(Self {
            telegram_bot_token,
            poll_timeout,
            poll_limit,
            allowed_updates,
            fetch_retry_delay,
            max_concurrent_updates,
            storage_backend,
        })
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn parse_opt<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let Some(raw) = lookup(key).and_then(non_empty) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|e| Error::Config(format!("{key}: invalid value {raw:?}: {e}")))
}

fn parse_csv_categories(v: Option<String>) -> Result<Vec<Category>> {
    let mut out = Vec::new();
    for name in v
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
    {
        let category = Category::parse(&name)
            .filter(|c| *c != Category::Update)
            .ok_or_else(|| {
                Error::Config(format!("ALLOWED_UPDATES: unknown update category {name:?}"))
            })?;
        if !out.contains(&category) {
            out.push(category);
        }
    }
    Ok(out)
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn token_is_required() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("TELEGRAM_BOT_TOKEN")));

        let err = Config::from_lookup(lookup(&[("TELEGRAM_BOT_TOKEN", "  ")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = Config::from_lookup(lookup(&[("TELEGRAM_BOT_TOKEN", "t")])).unwrap();
        assert_eq!(cfg.telegram_bot_token, "t");
        assert_eq!(cfg.poll_timeout, Duration::from_secs(30));
        assert_eq!(cfg.poll_limit, 100);
        assert_eq!(cfg.max_concurrent_updates, 64);
        assert_eq!(cfg.fetch_retry_delay, Duration::from_millis(1000));
        assert_eq!(cfg.storage_backend, StorageBackend::Memory);
        assert!(cfg.allowed_updates.is_empty());
    }

    #[test]
    fn reads_every_setting() {
        let cfg = Config::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("POLL_TIMEOUT_SECS", "5"),
            ("POLL_LIMIT", "20"),
            ("MAX_CONCURRENT_UPDATES", "8"),
            ("FETCH_RETRY_DELAY_MS", "250"),
            ("STORAGE_BACKEND", "Actor"),
            ("ALLOWED_UPDATES", "message, callback_query,message"),
        ]))
        .unwrap();

        assert_eq!(cfg.poll_timeout, Duration::from_secs(5));
        assert_eq!(cfg.poll_limit, 20);
        assert_eq!(cfg.max_concurrent_updates, 8);
        assert_eq!(cfg.fetch_retry_delay, Duration::from_millis(250));
        assert_eq!(cfg.storage_backend, StorageBackend::Actor);
        assert_eq!(
            cfg.allowed_updates,
            vec![Category::Message, Category::CallbackQuery]
        );
    }

    #[test]
    fn invalid_values_are_config_errors() {
        for (key, val) in [
            ("POLL_TIMEOUT_SECS", "soon"),
            ("POLL_LIMIT", "0"),
            ("POLL_LIMIT", "500"),
            ("MAX_CONCURRENT_UPDATES", "0"),
            ("STORAGE_BACKEND", "redis"),
            ("ALLOWED_UPDATES", "message,poll_answer"),
            ("ALLOWED_UPDATES", "update"),
        ] {
            let res = Config::from_lookup(lookup(&[("TELEGRAM_BOT_TOKEN", "t"), (key, val)]));
            assert!(
                matches!(res, Err(Error::Config(_))),
                "{key}={val} should be rejected"
            );
        }
    }

    #[test]
    fn dotenv_lines() {
        let parsed = parse_dotenv(
            "# comment\n\nTELEGRAM_BOT_TOKEN=\"abc\"\nPOLL_LIMIT = 10\nbroken line\n=x\nQ='single'\n",
        );
        assert_eq!(
            parsed,
            vec![
                ("TELEGRAM_BOT_TOKEN".to_string(), "abc".to_string()),
                ("POLL_LIMIT".to_string(), "10".to_string()),
                ("Q".to_string(), "single".to_string()),
            ]
        );
    }
}

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use courier_cache::CacheConfig;
use courier_core::{Channel, ConfigError};
use courier_events::delivery::{EmailConfig, TwilioConfig};
use courier_events::RetryPolicy;

/// Worker configuration loaded from environment variables.
///
/// Every field has a default suitable for local development except the
/// provider credentials, which are required for each channel listed in
/// `NOTIFY_CHANNELS`.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub cache: CacheConfig,
    /// Retry policy of the built-in logger and metrics listeners.
    pub listener_retry: RetryPolicy,
    pub stream: StreamConfig,
    /// Upper bound on a single provider call.
    pub provider_timeout: Duration,
    /// JSON file replacing the built-in trigger table.
    pub trigger_table_path: Option<PathBuf>,
    /// Channels that must have a configured provider.
    pub channels: Vec<Channel>,
    pub email: Option<EmailConfig>,
    pub sms: Option<TwilioConfig>,
}

/// The business-event stream bridged into the trigger engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    pub name: String,
    pub group: String,
    pub consumer: String,
    pub batch_size: usize,
    pub block: Duration,
    /// Entries kept per stream before the oldest are trimmed.
    pub max_len: usize,
    pub backend: StreamBackend,
}

/// Where streams are stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamBackend {
    /// Redis server at the given `redis://` URL.
    Redis { url: String },
    /// In-process only. Streams are lost on exit and not shared.
    Memory,
}

impl StreamBackend {
    /// `STREAM_BACKEND` plus the Redis connection variables.
    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let backend = lookup("STREAM_BACKEND").unwrap_or_else(|| "redis".into());
        match backend.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "redis" => {
                if let Some(url) = lookup("REDIS_URL").filter(|u| !u.trim().is_empty()) {
                    return Ok(Self::Redis { url });
                }
                let host = lookup("REDIS_HOST").unwrap_or_else(|| "localhost".into());
                let port: u16 = parse(lookup, "REDIS_PORT", 6379)?;
                let url = match lookup("REDIS_PASSWORD").filter(|p| !p.is_empty()) {
                    Some(password) => format!("redis://:{password}@{host}:{port}"),
                    None => format!("redis://{host}:{port}"),
                };
                Ok(Self::Redis { url })
            }
            other => Err(ConfigError::Invalid {
                var: "STREAM_BACKEND",
                reason: format!("unknown backend {other:?}, expected redis or memory"),
            }),
        }
    }
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default              |
    /// |---------------------------|----------------------|
    /// | `CACHE_TTL_MS`            | `300000`             |
    /// | `CACHE_MAX_SIZE`          | `1000`               |
    /// | `CACHE_CHECK_PERIOD_MS`   | `60000`              |
    /// | `LISTENER_RETRY_ATTEMPTS` | `3`                  |
    /// | `LISTENER_RETRY_DELAY_MS` | `1000`               |
    /// | `STREAM_NAME`             | `business-events`    |
    /// | `STREAM_GROUP`            | `courier`            |
    /// | `STREAM_CONSUMER`         | `courier-<uuid>`     |
    /// | `STREAM_BATCH_SIZE`       | `10`                 |
    /// | `STREAM_BLOCK_MS`         | `5000`               |
    /// | `STREAM_MAX_LEN`          | `100000`             |
    /// | `STREAM_BACKEND`          | `redis`              |
    /// | `REDIS_URL`               | unset                |
    /// | `REDIS_HOST`              | `localhost`          |
    /// | `REDIS_PORT`              | `6379`               |
    /// | `REDIS_PASSWORD`          | unset                |
    /// | `PROVIDER_TIMEOUT_MS`     | `30000`              |
    /// | `TRIGGER_TABLE_PATH`      | unset                |
    /// | `NOTIFY_CHANNELS`         | `email,sms`          |
    ///
    /// `REDIS_URL` takes precedence over the `REDIS_HOST` group.
    /// Provider credentials are read by [`EmailConfig`] (`SMTP_*`) and
    /// [`TwilioConfig`] (`TWILIO_*`).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let cache = CacheConfig {
            ttl: millis(&lookup, "CACHE_TTL_MS", 300_000)?,
            max_size: parse(&lookup, "CACHE_MAX_SIZE", 1000)?,
            check_period: millis(&lookup, "CACHE_CHECK_PERIOD_MS", 60_000)?,
        };
        if cache.max_size == 0 {
            return Err(ConfigError::Invalid {
                var: "CACHE_MAX_SIZE",
                reason: "must be at least 1".into(),
            });
        }

        let listener_retry = RetryPolicy::new(
            parse(&lookup, "LISTENER_RETRY_ATTEMPTS", 3)?,
            millis(&lookup, "LISTENER_RETRY_DELAY_MS", 1000)?,
        );

        let stream = StreamConfig {
            name: lookup("STREAM_NAME").unwrap_or_else(|| "business-events".into()),
            group: lookup("STREAM_GROUP").unwrap_or_else(|| "courier".into()),
            consumer: lookup("STREAM_CONSUMER")
                .unwrap_or_else(|| format!("courier-{}", uuid::Uuid::new_v4())),
            batch_size: parse(&lookup, "STREAM_BATCH_SIZE", 10)?,
            block: millis(&lookup, "STREAM_BLOCK_MS", 5000)?,
            max_len: parse(&lookup, "STREAM_MAX_LEN", 100_000)?,
            backend: StreamBackend::from_lookup(&lookup)?,
        };
        for (var, value) in [
            ("STREAM_BATCH_SIZE", stream.batch_size),
            ("STREAM_MAX_LEN", stream.max_len),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    var,
                    reason: "must be at least 1".into(),
                });
            }
        }

        let provider_timeout = millis(&lookup, "PROVIDER_TIMEOUT_MS", 30_000)?;
        let trigger_table_path = lookup("TRIGGER_TABLE_PATH")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        let channels = parse_channels(&lookup("NOTIFY_CHANNELS").unwrap_or_else(|| "email,sms".into()))?;
        let email = EmailConfig::from_lookup(&lookup)?;
        let sms = TwilioConfig::from_lookup(&lookup)?;

        for channel in &channels {
            match channel {
                Channel::Email if email.is_none() => return Err(ConfigError::Missing("SMTP_HOST")),
                Channel::Sms if sms.is_none() => return Err(ConfigError::Missing("TWILIO_ACCOUNT_SID")),
                Channel::Email | Channel::Sms => {}
                other => {
                    return Err(ConfigError::Invalid {
                        var: "NOTIFY_CHANNELS",
                        reason: format!("no delivery provider for {other}"),
                    })
                }
            }
        }

        Ok(Self {
            cache,
            listener_retry,
            stream,
            provider_timeout,
            trigger_table_path,
            channels,
            email,
            sms,
        })
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            var,
            reason: format!("{raw:?} is not a non-negative integer"),
        }),
    }
}

fn millis(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: u64,
) -> Result<Duration, ConfigError> {
    parse(lookup, var, default).map(Duration::from_millis)
}

/// Comma-separated, case-insensitive channel names. Blank means none.
fn parse_channels(raw: &str) -> Result<Vec<Channel>, ConfigError> {
    let mut channels = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let channel = Channel::parse(name).ok_or_else(|| ConfigError::Invalid {
            var: "NOTIFY_CHANNELS",
            reason: format!("unknown channel {name:?}"),
        })?;
        if !channels.contains(&channel) {
            channels.push(channel);
        }
    }
    Ok(channels)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: Vec<(String, String)> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
    }

    #[test]
    fn defaults_without_channels() {
        let config = WorkerConfig::from_lookup(env(&[("NOTIFY_CHANNELS", "")])).unwrap();

        assert_eq!(config.cache, CacheConfig::default());
        assert_eq!(config.listener_retry, RetryPolicy::new(3, Duration::from_secs(1)));
        assert_eq!(config.stream.name, "business-events");
        assert_eq!(config.stream.group, "courier");
        assert!(config.stream.consumer.starts_with("courier-"));
        assert_eq!(config.stream.batch_size, 10);
        assert_eq!(config.stream.block, Duration::from_millis(5000));
        assert_eq!(config.stream.max_len, 100_000);
        assert_eq!(
            config.stream.backend,
            StreamBackend::Redis {
                url: "redis://localhost:6379".into()
            }
        );
        assert_eq!(config.provider_timeout, Duration::from_secs(30));
        assert!(config.trigger_table_path.is_none());
        assert!(config.channels.is_empty());
        assert!(config.email.is_none());
        assert!(config.sms.is_none());
    }

    #[test]
    fn overrides_are_applied() {
        let config = WorkerConfig::from_lookup(env(&[
            ("NOTIFY_CHANNELS", "email"),
            ("SMTP_HOST", "smtp.example.com"),
            ("SMTP_FROM", "noreply@example.com"),
            ("CACHE_TTL_MS", "1000"),
            ("CACHE_MAX_SIZE", "5"),
            ("STREAM_NAME", "events"),
            ("STREAM_CONSUMER", "worker-1"),
            ("PROVIDER_TIMEOUT_MS", "250"),
            ("TRIGGER_TABLE_PATH", "/etc/courier/triggers.json"),
        ]))
        .unwrap();

        assert_eq!(config.cache.ttl, Duration::from_secs(1));
        assert_eq!(config.cache.max_size, 5);
        assert_eq!(config.stream.name, "events");
        assert_eq!(config.stream.consumer, "worker-1");
        assert_eq!(config.provider_timeout, Duration::from_millis(250));
        assert_eq!(
            config.trigger_table_path.as_deref(),
            Some(std::path::Path::new("/etc/courier/triggers.json"))
        );
        assert_eq!(config.channels, vec![Channel::Email]);
        assert_eq!(config.email.unwrap().smtp_host, "smtp.example.com");
    }

    #[test]
    fn default_channels_require_credentials() {
        assert_matches!(
            WorkerConfig::from_lookup(env(&[])),
            Err(ConfigError::Missing("SMTP_HOST"))
        );
        assert_matches!(
            WorkerConfig::from_lookup(env(&[
                ("SMTP_HOST", "smtp.example.com"),
                ("SMTP_FROM", "noreply@example.com"),
            ])),
            Err(ConfigError::Missing("TWILIO_ACCOUNT_SID"))
        );
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        assert_matches!(
            WorkerConfig::from_lookup(env(&[("NOTIFY_CHANNELS", ""), ("STREAM_BATCH_SIZE", "lots")])),
            Err(ConfigError::Invalid { var: "STREAM_BATCH_SIZE", .. })
        );
        assert_matches!(
            WorkerConfig::from_lookup(env(&[("NOTIFY_CHANNELS", ""), ("CACHE_TTL_MS", "-1")])),
            Err(ConfigError::Invalid { var: "CACHE_TTL_MS", .. })
        );
        assert_matches!(
            WorkerConfig::from_lookup(env(&[("NOTIFY_CHANNELS", ""), ("CACHE_MAX_SIZE", "0")])),
            Err(ConfigError::Invalid { var: "CACHE_MAX_SIZE", .. })
        );
        assert_matches!(
            WorkerConfig::from_lookup(env(&[("NOTIFY_CHANNELS", ""), ("REDIS_PORT", "99999")])),
            Err(ConfigError::Invalid { var: "REDIS_PORT", .. })
        );
    }

    #[test]
    fn zero_batch_size_and_max_len_are_rejected() {
        assert_matches!(
            WorkerConfig::from_lookup(env(&[("NOTIFY_CHANNELS", ""), ("STREAM_BATCH_SIZE", "0")])),
            Err(ConfigError::Invalid { var: "STREAM_BATCH_SIZE", reason }) if reason == "must be at least 1"
        );
        assert_matches!(
            WorkerConfig::from_lookup(env(&[("NOTIFY_CHANNELS", ""), ("STREAM_MAX_LEN", "0")])),
            Err(ConfigError::Invalid { var: "STREAM_MAX_LEN", .. })
        );
        let config =
            WorkerConfig::from_lookup(env(&[("NOTIFY_CHANNELS", ""), ("STREAM_BATCH_SIZE", "1")])).unwrap();
        assert_eq!(config.stream.batch_size, 1);
    }

    #[test]
    fn redis_connection_variables() {
        let config = WorkerConfig::from_lookup(env(&[
            ("NOTIFY_CHANNELS", ""),
            ("REDIS_HOST", "cache.internal"),
            ("REDIS_PORT", "6380"),
            ("REDIS_PASSWORD", "s3cret"),
        ]))
        .unwrap();
        assert_eq!(
            config.stream.backend,
            StreamBackend::Redis {
                url: "redis://:s3cret@cache.internal:6380".into()
            }
        );

        let config = WorkerConfig::from_lookup(env(&[
            ("NOTIFY_CHANNELS", ""),
            ("REDIS_URL", "redis://queue:6379/2"),
            ("REDIS_HOST", "ignored"),
        ]))
        .unwrap();
        assert_eq!(
            config.stream.backend,
            StreamBackend::Redis {
                url: "redis://queue:6379/2".into()
            }
        );
    }

    #[test]
    fn stream_backend_selection() {
        let config =
            WorkerConfig::from_lookup(env(&[("NOTIFY_CHANNELS", ""), ("STREAM_BACKEND", "Memory")])).unwrap();
        assert_eq!(config.stream.backend, StreamBackend::Memory);

        assert_matches!(
            WorkerConfig::from_lookup(env(&[("NOTIFY_CHANNELS", ""), ("STREAM_BACKEND", "kafka")])),
            Err(ConfigError::Invalid { var: "STREAM_BACKEND", reason }) if reason.contains("kafka")
        );
    }

    #[test]
    fn channels_without_providers_are_rejected() {
        assert_matches!(
            WorkerConfig::from_lookup(env(&[("NOTIFY_CHANNELS", "push")])),
            Err(ConfigError::Invalid { var: "NOTIFY_CHANNELS", .. })
        );
        assert_matches!(
            WorkerConfig::from_lookup(env(&[("NOTIFY_CHANNELS", "pager")])),
            Err(ConfigError::Invalid { var: "NOTIFY_CHANNELS", reason }) if reason.contains("pager")
        );
    }

    #[test]
    fn channel_list_is_case_insensitive_and_deduplicated() {
        assert_eq!(parse_channels(" SMS, sms ,Email").unwrap(), vec![Channel::Sms, Channel::Email]);
        assert!(parse_channels(" , ").unwrap().is_empty());
    }
}

use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context as _, Result};
use serde::{Deserialize, Serialize};
use tracing::info;
use typed_builder::TypedBuilder;

pub const DEFAULT_REPLAY: usize = 1;
pub const DEFAULT_BUFFER: usize = 64;

/// When the shared upstream starts and whether it ever stops on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Started {
    /// Start when the component is built. Never stop.
    Eagerly,

    /// Start on the first subscriber. Never stop.
    Lazily,

    /// Start on the first subscriber, stop once the last one has been gone
    /// for `stop_timeout`. After a stop the replay cache is cleared once
    /// `replay_expiration` elapses (`None` keeps it forever).
    WhileSubscribed {
        #[serde(default, with = "millis")]
        stop_timeout: Duration,
        #[serde(default, with = "optional_millis")]
        replay_expiration: Option<Duration>,
    },
}

impl Started {
    /// Stop immediately on the last unsubscribe, keep the replay cache.
    pub fn while_subscribed() -> Self {
        Started::WhileSubscribed {
            stop_timeout: Duration::ZERO,
            replay_expiration: None,
        }
    }
}

impl Default for Started {
    fn default() -> Self {
        Self::while_subscribed()
    }
}

/// Sharing policy of a component's upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
pub struct ShareOptions {
    #[builder(default)]
    #[serde(default)]
    pub started: Started,

    /// How many trailing snapshots a new subscriber receives immediately.
    #[builder(default = DEFAULT_REPLAY)]
    #[serde(default = "default_replay")]
    pub replay: usize,

    /// Pending snapshots per subscriber before the upstream waits for it.
    #[builder(default = DEFAULT_BUFFER)]
    #[serde(default = "default_buffer")]
    pub buffer: usize,
}

impl Default for ShareOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ShareOptions {
    /// Load sharing options from `TEAFLOW_*` environment variables.
    /// Unset variables fall back to defaults; malformed ones are errors.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let started = match var("TEAFLOW_SHARING").as_deref().map(str::trim) {
            None | Some("while_subscribed") => Started::WhileSubscribed {
                stop_timeout: parsed_var::<u64>(&var, "TEAFLOW_STOP_TIMEOUT_MS")?
                    .map(Duration::from_millis)
                    .unwrap_or(Duration::ZERO),
                replay_expiration: parsed_var::<u64>(&var, "TEAFLOW_REPLAY_EXPIRATION_MS")?
                    .map(Duration::from_millis),
            },
            Some("eagerly") => Started::Eagerly,
            Some("lazily") => Started::Lazily,
            Some(other) => bail!(
                "TEAFLOW_SHARING must be one of eagerly, lazily, while_subscribed (got {other:?})"
            ),
        };

        let options = Self {
            started,
            replay: parsed_var(&var, "TEAFLOW_REPLAY")?.unwrap_or(DEFAULT_REPLAY),
            buffer: parsed_var(&var, "TEAFLOW_BUFFER")?.unwrap_or(DEFAULT_BUFFER),
        };
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if self.buffer == 0 {
            bail!("share buffer must be at least 1");
        }
        Ok(())
    }

    pub fn log_summary(&self) {
        match &self.started {
            Started::Eagerly | Started::Lazily => info!(
                started = ?self.started,
                replay = self.replay,
                buffer = self.buffer,
                "Share options"
            ),
            Started::WhileSubscribed {
                stop_timeout,
                replay_expiration,
            } => info!(
                started = "while_subscribed",
                stop_timeout_ms = stop_timeout.as_millis() as u64,
                replay_expiration_ms = ?replay_expiration.map(|d| d.as_millis() as u64),
                replay = self.replay,
                buffer = self.buffer,
                "Share options"
            ),
        }
    }
}

fn parsed_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("{key} must be a non-negative integer (got {raw:?})"))
        })
        .transpose()
}

fn default_replay() -> usize {
    DEFAULT_REPLAY
}

fn default_buffer() -> usize {
    DEFAULT_BUFFER
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod optional_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

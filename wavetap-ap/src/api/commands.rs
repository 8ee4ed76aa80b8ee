//! Command dispatch
//!
//! Every client command is a method name plus a bag of named arguments. The
//! router validates arguments before anything reaches a session, so caller
//! misuse is reported with a specific code and leaves session state alone.
//!
//! | method        | arguments        | result            |
//! |---------------|------------------|-------------------|
//! | `init`        | `id`             | ack               |
//! | `setSource`   | `id`, `path`     | ack               |
//! | `play`        | `id`             | ack               |
//! | `pause`       | `id`             | ack               |
//! | `stop`        | `id`             | ack               |
//! | `seek`        | `id`, `position` | ack               |
//! | `setVolume`   | `id`, `volume`   | ack               |
//! | `setRate`     | `id`, `rate`     | ack               |
//! | `getPosition` | `id`             | seconds           |
//! | `getDuration` | `id`             | seconds           |
//! | `getState`    | `id`             | state code 0..=5  |
//! | `getSamples`  | `id`             | latest batch      |
//! | `getMetadata` | `path`           | track metadata    |
//! | `close`       | `id`             | ack               |
//!
//! Any other method is answered with [`CommandReply::NotImplemented`].
//!
//! Engine calls can wait on an audio-pipeline thread (binding a source or
//! stopping joins the previous one), so every controller call runs on the
//! blocking pool. The async workers keep serving other sessions meanwhile.

use crate::engine::MetadataReader;
use crate::error::{Error, Result};
use crate::playback::{PlaybackController, Session, SessionRegistry};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Named command arguments
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct CommandArgs {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    /// Seek target in seconds
    #[serde(default)]
    pub position: Option<f64>,
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default)]
    pub rate: Option<f64>,
}

impl CommandArgs {
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    fn require_id(&self) -> Result<&str> {
        match self.id.as_deref() {
            Some(id) if !id.is_empty() => Ok(id),
            _ => Err(Error::MissingId),
        }
    }

    fn require_path(&self) -> Result<&str> {
        match self.path.as_deref() {
            Some(path) if !path.is_empty() => Ok(path),
            _ => Err(Error::MissingPath),
        }
    }

    fn require_number(value: Option<f64>, name: &str) -> Result<f64> {
        let value = value.ok_or_else(|| Error::MissingArgument(name.to_string()))?;
        if !value.is_finite() {
            return Err(Error::InvalidArgument(format!("{} must be a finite number", name)));
        }
        Ok(value)
    }
}

/// Successful outcome of a command
#[derive(Debug, Clone, PartialEq)]
pub enum CommandReply {
    /// Command applied, nothing to return
    Ack,
    /// Query result
    Value(Value),
    /// Method not recognised
    NotImplemented(String),
}

/// Dispatches commands to sessions
pub struct CommandRouter {
    registry: Arc<SessionRegistry>,
    metadata: Arc<dyn MetadataReader>,
}

impl CommandRouter {
    pub fn new(registry: Arc<SessionRegistry>, metadata: Arc<dyn MetadataReader>) -> Self {
        Self { registry, metadata }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    async fn session(&self, args: &CommandArgs) -> Result<Arc<Session>> {
        let id = args.require_id()?;
        self.registry.get(id).await
    }

    /// Look up the session and run `f` against its controller off the runtime
    async fn with_controller<T, F>(&self, args: &CommandArgs, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&PlaybackController) -> Result<T> + Send + 'static,
    {
        let session = self.session(args).await?;
        tokio::task::spawn_blocking(move || f(session.controller()))
            .await
            .map_err(|e| Error::Internal(format!("Controller task failed: {}", e)))?
    }

    /// Run one command
    pub async fn dispatch(&self, method: &str, args: CommandArgs) -> Result<CommandReply> {
        debug!("Command {} (id={:?})", method, args.id);

        match method {
            "init" => {
                let id = args.require_id()?;
                self.registry.init(id).await?;
                Ok(CommandReply::Ack)
            }
            "setSource" => {
                args.require_id()?;
                let path = args.require_path()?.to_string();
                self.with_controller(&args, move |c| c.set_source(&path)).await?;
                Ok(CommandReply::Ack)
            }
            "play" => {
                self.with_controller(&args, |c| c.play()).await?;
                Ok(CommandReply::Ack)
            }
            "pause" => {
                self.with_controller(&args, |c| c.pause()).await?;
                Ok(CommandReply::Ack)
            }
            "stop" => {
                self.with_controller(&args, |c| c.stop()).await?;
                Ok(CommandReply::Ack)
            }
            "seek" => {
                args.require_id()?;
                let position = CommandArgs::require_number(args.position, "position")?;
                if position < 0.0 {
                    return Err(Error::InvalidArgument(format!(
                        "position must not be negative (got {})",
                        position
                    )));
                }
                self.with_controller(&args, move |c| c.seek(position)).await?;
                Ok(CommandReply::Ack)
            }
            "setVolume" => {
                args.require_id()?;
                let volume = CommandArgs::require_number(args.volume, "volume")?;
                if volume < 0.0 {
                    return Err(Error::InvalidArgument(format!(
                        "volume must not be negative (got {})",
                        volume
                    )));
                }
                self.with_controller(&args, move |c| c.set_volume(volume as f32))
                    .await?;
                Ok(CommandReply::Ack)
            }
            "setRate" => {
                args.require_id()?;
                let rate = CommandArgs::require_number(args.rate, "rate")?;
                if rate <= 0.0 {
                    return Err(Error::InvalidArgument(format!(
                        "rate must be positive (got {})",
                        rate
                    )));
                }
                self.with_controller(&args, move |c| c.set_rate(rate as f32))
                    .await?;
                Ok(CommandReply::Ack)
            }
            "getPosition" => {
                let position = self.with_controller(&args, |c| c.position()).await?;
                Ok(CommandReply::Value(json!(position)))
            }
            "getDuration" => {
                let duration = self.with_controller(&args, |c| c.duration()).await?;
                Ok(CommandReply::Value(json!(duration)))
            }
            "getState" => {
                let state = self.session(&args).await?.state();
                Ok(CommandReply::Value(json!(state.code())))
            }
            "getSamples" => {
                let samples = self.session(&args).await?.samples();
                Ok(CommandReply::Value(json!(samples.as_slice())))
            }
            "getMetadata" => {
                let path = PathBuf::from(args.require_path()?);
                let reader = Arc::clone(&self.metadata);
                let metadata = tokio::task::spawn_blocking(move || reader.read(&path))
                    .await
                    .map_err(|e| Error::Internal(format!("Metadata task failed: {}", e)))??;
                let value = serde_json::to_value(metadata)
                    .map_err(|e| Error::Internal(format!("Failed to encode metadata: {}", e)))?;
                Ok(CommandReply::Value(value))
            }
            "close" => {
                let id = args.require_id()?;
                self.registry.close(id).await;
                Ok(CommandReply::Ack)
            }
            other => {
                debug!("Command {} not implemented", other);
                Ok(CommandReply::NotImplemented(other.to_string()))
            }
        }
    }
}

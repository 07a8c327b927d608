//! Scheduler Builder API
//!
//! Provides a builder-style API for creating schedulers, either from explicit
//! configuration or from a parsed connection string entry.

use std::sync::Arc;

use logpipe_core::config::{OPTION_ASYNC_ENABLED, OPTION_CAPTION};
use logpipe_core::{
    ConfigError, ConnectionEntry, LogpipeResult, SchedulerConfig, Sink, COMMON_OPTION_KEYS,
};
use tracing::{debug, info};

use crate::scheduler::Scheduler;
use crate::worker::{ErrorListener, SinkFailure};

/// Caption used when none is configured
pub const DEFAULT_CAPTION: &str = "scheduler";

// ----------------------------------------------------------------------------
// Scheduler Builder
// ----------------------------------------------------------------------------

/// Builder for creating a [`Scheduler`] around a sink
pub struct SchedulerBuilder<S: Sink> {
    sink: S,
    config: SchedulerConfig,
    caption: String,
    error_listener: Option<ErrorListener>,
}

impl<S: Sink> SchedulerBuilder<S> {
    /// Create a new builder with the default configuration
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            config: SchedulerConfig::default(),
            caption: DEFAULT_CAPTION.to_string(),
            error_listener: None,
        }
    }

    /// Create a builder from one entry of a connection string
    ///
    /// `protocol_keys` lists the options the sink itself understands; the
    /// common `async.*` and `caption` options are always accepted. Fails if
    /// the options do not parse, name an unknown key, carry an invalid value,
    /// or do not enable asynchronous mode.
    pub fn from_connection(
        sink: S,
        entry: &ConnectionEntry,
        protocol_keys: &[&str],
    ) -> LogpipeResult<Self> {
        let options = entry.option_table()?;

        let allowed: Vec<&str> = COMMON_OPTION_KEYS
            .iter()
            .chain(protocol_keys)
            .copied()
            .collect();
        options.ensure_known(&entry.protocol, &allowed)?;

        if !options.boolean(OPTION_ASYNC_ENABLED, false) {
            return Err(ConfigError::AsyncDisabled {
                protocol: entry.protocol.clone(),
            }
            .into());
        }

        let config = SchedulerConfig::from_options(&options)?;
        let caption = options.string_or(OPTION_CAPTION, &entry.protocol).to_string();
        debug!("Configured scheduler {} from connection options: {:?}", caption, config);

        Ok(Self {
            sink,
            config,
            caption,
            error_listener: None,
        })
    }

    /// Set the scheduler configuration
    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the caption used in logs and the worker thread name
    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = caption.into();
        self
    }

    /// Receive every sink failure on the worker thread
    pub fn with_error_listener<F>(mut self, listener: F) -> Self
    where
        F: Fn(&SinkFailure<'_>) + Send + Sync + 'static,
    {
        self.error_listener = Some(Arc::new(listener));
        self
    }

    /// Validate the configuration and create the scheduler, not yet started
    pub fn build(self) -> LogpipeResult<Scheduler<S>> {
        self.config.validate()?;
        Ok(Scheduler::from_parts(
            self.sink,
            self.config,
            self.caption,
            self.error_listener,
        ))
    }

    /// Build and start the scheduler
    pub fn build_and_start(self) -> LogpipeResult<Scheduler<S>> {
        let scheduler = self.build()?;
        scheduler.start()?;
        info!(
            "Scheduler {} ready (capacity {} bytes, batch {})",
            scheduler.caption(),
            scheduler.config().capacity_bytes,
            scheduler.config().batch_size
        );
        Ok(scheduler)
    }
}

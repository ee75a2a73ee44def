//! Lifecycle notifications.
//!
//! Every object lifecycle change is announced as a `Signal`. The emitter
//! forwards each signal to its attached sinks (the bus, a test recorder,
//! ...). Delivery is best effort: a failing sink is logged and skipped, and
//! never turns into an error for the call that caused the signal.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::ServiceError;
use crate::paths;

/// A notification about an object, addressed to the object that emits it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    CollectionCreated { collection: String },
    CollectionChanged { collection: String },
    ItemCreated { collection: String, item: String },
    ItemDeleted { collection: String, item: String },
    ItemChanged { collection: String, item: String },
    PromptCompleted {
        prompt: String,
        dismissed: bool,
        result: Vec<String>,
    },
}

impl Signal {
    /// The D-Bus member name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CollectionCreated { .. } => "CollectionCreated",
            Self::CollectionChanged { .. } => "CollectionChanged",
            Self::ItemCreated { .. } => "ItemCreated",
            Self::ItemDeleted { .. } => "ItemDeleted",
            Self::ItemChanged { .. } => "ItemChanged",
            Self::PromptCompleted { .. } => "Completed",
        }
    }

    /// The object path the signal is emitted from.
    ///
    /// Collection signals come from the service root, item signals from the
    /// owning collection, prompt completion from the prompt itself.
    pub fn emitter_path(&self) -> &str {
        match self {
            Self::CollectionCreated { .. } | Self::CollectionChanged { .. } => {
                paths::SERVICE_PATH
            }
            Self::ItemCreated { collection, .. }
            | Self::ItemDeleted { collection, .. }
            | Self::ItemChanged { collection, .. } => collection,
            Self::PromptCompleted { prompt, .. } => prompt,
        }
    }
}

/// A destination for signals. Implement this to forward signals to the bus
/// or to record them.
#[async_trait]
pub trait SignalSink: Send + Sync {
    async fn deliver(&self, signal: &Signal) -> Result<(), ServiceError>;
}

/// Fan-out of signals to the attached sinks.
#[derive(Default)]
pub struct SignalEmitter {
    sinks: Vec<Arc<dyn SignalSink>>,
}

impl std::fmt::Debug for SignalEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalEmitter")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl SignalEmitter {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    /// Add a sink that receives every signal.
    pub fn add_sink(&mut self, sink: Arc<dyn SignalSink>) {
        self.sinks.push(sink);
    }

    pub fn with_sink(mut self, sink: Arc<dyn SignalSink>) -> Self {
        self.add_sink(sink);
        self
    }

    /// Deliver `signal` to every sink. Failures are logged, not returned.
    pub async fn emit(&self, signal: Signal) {
        debug!(signal = signal.name(), path = signal.emitter_path(), "emitting");
        for sink in &self.sinks {
            if let Err(err) = sink.deliver(&signal).await {
                warn!(
                    signal = signal.name(),
                    path = signal.emitter_path(),
                    error = %err,
                    "signal delivery failed"
                );
            }
        }
    }
}

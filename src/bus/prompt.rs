//! `org.freedesktop.Secret.Prompt`.

use std::sync::Arc;

use tracing::debug;
use zbus::interface;
use zbus::object_server::SignalEmitter;
use zbus::zvariant::Value;

use crate::prompt::Prompt;

pub struct PromptObject {
    prompt: Arc<Prompt>,
}

impl PromptObject {
    pub fn new(prompt: Arc<Prompt>) -> Self {
        Self { prompt }
    }
}

#[interface(name = "org.freedesktop.Secret.Prompt")]
impl PromptObject {
    /// Starts the unlock and returns at once; the outcome arrives as
    /// `Completed`.
    async fn prompt(&self, window_id: &str) {
        debug!(path = self.prompt.path(), window_id, "prompt requested");
        self.prompt.start();
    }

    async fn dismiss(&self) {
        self.prompt.dismiss().await;
    }

    #[zbus(signal)]
    pub(crate) async fn completed(
        emitter: &SignalEmitter<'_>,
        dismissed: bool,
        result: Value<'_>,
    ) -> zbus::Result<()>;
}

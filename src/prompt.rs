//! Unlock prompts.
//!
//! An `Unlock` call on a locked vault returns a prompt object instead of
//! blocking. The client calls `Prompt` to start the unlock attempt and later
//! receives `Completed(dismissed, result)`.
//!
//! ```text
//! Created --start--> Running --unlocked--> Completed(dismissed = false)
//!    |                  |
//!    |                  +--failed / timed out / dismissed--> Completed(dismissed = true)
//!    +--dismiss / never started in time--> Completed(dismissed = true)
//! ```
//!
//! All state changes go through the prompt's state channel, whose lock is the
//! single-fire latch: only the first transition into `Completed` wins, and
//! only that one emits the signal and tears the prompt down.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::cancel::{cancellation, CancelHandle};
use crate::error::ServiceError;
use crate::export::{ObjectExporter, ObjectKind};
use crate::paths;
use crate::signals::{Signal, SignalEmitter};
use crate::vault::{VaultClient, VaultError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptState {
    Created,
    Running,
    Completed { dismissed: bool },
}

impl PromptState {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

pub struct Prompt {
    id: u64,
    path: String,
    targets: Vec<String>,
    state: watch::Sender<PromptState>,
    cancel: CancelHandle,
    registry: Weak<PromptRegistry>,
}

impl fmt::Debug for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prompt")
            .field("path", &self.path)
            .field("targets", &self.targets)
            .field("state", &self.state())
            .finish()
    }
}

impl Prompt {
    fn new(id: u64, targets: Vec<String>, registry: Weak<PromptRegistry>) -> Self {
        let (state, _) = watch::channel(PromptState::Created);
        let (cancel, _) = cancellation();
        Self {
            id,
            path: paths::prompt_path(id),
            targets,
            state,
            cancel,
            registry,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The objects the prompt unlocks.
    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    pub fn state(&self) -> PromptState {
        *self.state.borrow()
    }

    /// Launch the unlock attempt and return at once.
    ///
    /// Only the first call on a fresh prompt does anything.
    pub fn start(self: &Arc<Self>) {
        let started = self.state.send_if_modified(|state| {
            if *state != PromptState::Created {
                return false;
            }
            *state = PromptState::Running;
            true
        });
        if !started {
            debug!(path = %self.path, "prompt already started");
            return;
        }

        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let vault = registry.vault.clone();
        let timeout = registry.timeout;
        let token = self.cancel.token();
        let prompt = self.clone();

        info!(path = %self.path, "unlock prompt started");
        tokio::spawn(async move {
            // The vault sees the token first; the second arm covers clients
            // that ignore it.
            let outcome = tokio::select! {
                biased;
                result = tokio::time::timeout(timeout, vault.ensure_unlocked(&token)) => {
                    result.unwrap_or(Err(VaultError::Cancelled))
                }
                _ = token.cancelled() => Err(VaultError::Cancelled),
            };
            match outcome {
                Ok(()) => prompt.complete(false).await,
                Err(err) => {
                    // Wrong password, unreachable vault and timeout all look
                    // the same to the client.
                    debug!(path = %prompt.path, error = %err, "unlock attempt failed");
                    prompt.complete(true).await
                }
            };
        });
    }

    /// Cancel any running attempt and complete as dismissed. Idempotent.
    pub async fn dismiss(&self) {
        self.cancel.cancel();
        self.complete(true).await;
    }

    /// Resolve once the prompt completed. Returns `dismissed`.
    pub async fn completed(&self) -> bool {
        let mut rx = self.state.subscribe();
        let state = match rx.wait_for(PromptState::is_completed).await {
            Ok(state) => *state,
            Err(_) => return true,
        };
        matches!(state, PromptState::Completed { dismissed: true })
    }

    /// Complete as dismissed if the client never started the prompt.
    async fn expire(&self) -> bool {
        let won = self.state.send_if_modified(|state| {
            if *state != PromptState::Created {
                return false;
            }
            *state = PromptState::Completed { dismissed: true };
            true
        });
        if !won {
            return false;
        }
        debug!(path = %self.path, "prompt expired unstarted");
        self.announce(true).await;
        true
    }

    /// The latch. Returns false if the prompt had already completed.
    async fn complete(&self, dismissed: bool) -> bool {
        let won = self.state.send_if_modified(|state| {
            if state.is_completed() {
                return false;
            }
            *state = PromptState::Completed { dismissed };
            true
        });
        if !won {
            return false;
        }
        self.announce(dismissed).await;
        true
    }

    /// Runs once, after the latch.
    async fn announce(&self, dismissed: bool) {
        let result = if dismissed {
            Vec::new()
        } else {
            self.targets.clone()
        };
        info!(path = %self.path, dismissed, "prompt completed");
        if let Some(registry) = self.registry.upgrade() {
            registry.finish(self, dismissed, result).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Owns the live prompts. A prompt is removed once it completes.
pub struct PromptRegistry {
    next_id: AtomicU64,
    prompts: Mutex<HashMap<String, Arc<Prompt>>>,
    vault: Arc<dyn VaultClient>,
    exporter: Arc<dyn ObjectExporter>,
    signals: Arc<SignalEmitter>,
    timeout: Duration,
}

impl fmt::Debug for PromptRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromptRegistry")
            .field("prompts", &self.len())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl PromptRegistry {
    pub fn new(
        vault: Arc<dyn VaultClient>,
        exporter: Arc<dyn ObjectExporter>,
        signals: Arc<SignalEmitter>,
        timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1),
            prompts: Mutex::new(HashMap::new()),
            vault,
            exporter,
            signals,
            timeout,
        })
    }

    /// Create and export a prompt that unlocks `targets`.
    ///
    /// A prompt still unstarted after the prompt timeout completes as
    /// dismissed and is removed.
    pub async fn create(self: &Arc<Self>, targets: Vec<String>) -> Result<Arc<Prompt>, ServiceError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let prompt = Arc::new(Prompt::new(id, targets, Arc::downgrade(self)));

        self.exporter.export_prompt(&prompt).await?;
        self.lock()
            .insert(prompt.path().to_string(), prompt.clone());

        let pending = Arc::downgrade(&prompt);
        let timeout = self.timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(prompt) = pending.upgrade() {
                prompt.expire().await;
            }
        });

        debug!(path = prompt.path(), "prompt created");
        Ok(prompt)
    }

    pub fn get(&self, path: &str) -> Option<Arc<Prompt>> {
        self.lock().get(path).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    async fn finish(&self, prompt: &Prompt, dismissed: bool, result: Vec<String>) {
        self.signals
            .emit(Signal::PromptCompleted {
                prompt: prompt.path().to_string(),
                dismissed,
                result,
            })
            .await;

        self.lock().remove(prompt.path());
        self.exporter.unexport(ObjectKind::Prompt, prompt.path()).await;
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<Prompt>>> {
        self.prompts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;

    use super::*;
    use crate::export::NoopExporter;
    use crate::memory::MemoryVault;
    use crate::signals::SignalSink;

    #[derive(Default)]
    struct CompletionCounter {
        completions: AtomicUsize,
        last: Mutex<Option<Signal>>,
    }

    #[async_trait]
    impl SignalSink for CompletionCounter {
        async fn deliver(&self, signal: &Signal) -> Result<(), ServiceError> {
            if let Signal::PromptCompleted { .. } = signal {
                self.completions.fetch_add(1, Ordering::SeqCst);
                *self.last.lock().unwrap() = Some(signal.clone());
            }
            Ok(())
        }
    }

    fn setup(vault: MemoryVault) -> (Arc<PromptRegistry>, Arc<MemoryVault>, Arc<CompletionCounter>) {
        let vault = Arc::new(vault);
        let counter = Arc::new(CompletionCounter::default());
        let signals = Arc::new(SignalEmitter::new().with_sink(counter.clone()));
        let registry = PromptRegistry::new(
            vault.clone(),
            Arc::new(NoopExporter),
            signals,
            Duration::from_secs(300),
        );
        (registry, vault, counter)
    }

    fn targets() -> Vec<String> {
        vec![paths::collection_path("default")]
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_unlock_reports_targets() {
        let (registry, vault, counter) = setup(
            MemoryVault::new("pw")
                .locked()
                .with_unlock_answer(Some("pw"))
                .with_unlock_delay(Duration::from_secs(2)),
        );
        let prompt = registry.create(targets()).await.unwrap();

        prompt.start();
        assert_eq!(prompt.state(), PromptState::Running);
        assert!(!prompt.completed().await);

        assert!(!vault.is_locked_now());
        assert_eq!(counter.completions.load(Ordering::SeqCst), 1);
        assert_eq!(
            *counter.last.lock().unwrap(),
            Some(Signal::PromptCompleted {
                prompt: prompt.path().to_string(),
                dismissed: false,
                result: targets(),
            })
        );
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_launches_one_attempt() {
        let (registry, vault, counter) = setup(
            MemoryVault::new("pw")
                .locked()
                .with_unlock_answer(Some("pw"))
                .with_unlock_delay(Duration::from_secs(1)),
        );
        let prompt = registry.create(targets()).await.unwrap();

        prompt.start();
        prompt.start();
        prompt.completed().await;
        prompt.start();

        assert_eq!(vault.unlock_attempts(), 1);
        assert_eq!(counter.completions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismiss_cancels_running_attempt() {
        let (registry, vault, counter) = setup(
            MemoryVault::new("pw")
                .locked()
                .with_unlock_answer(Some("pw"))
                .with_unlock_delay(Duration::from_secs(10)),
        );
        let prompt = registry.create(targets()).await.unwrap();

        prompt.start();
        tokio::time::sleep(Duration::from_secs(1)).await;
        prompt.dismiss().await;
        prompt.dismiss().await;
        assert_eq!(prompt.state(), PromptState::Completed { dismissed: true });

        // Let the cancelled attempt run to its end.
        tokio::time::sleep(Duration::from_secs(20)).await;

        assert!(vault.is_locked_now());
        assert_eq!(vault.cancelled_attempts(), 1);
        assert_eq!(counter.completions.load(Ordering::SeqCst), 1);
        assert!(registry.get(prompt.path()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrong_password_completes_dismissed() {
        let (registry, _vault, counter) =
            setup(MemoryVault::new("pw").locked().with_unlock_answer(Some("nope")));
        let prompt = registry.create(targets()).await.unwrap();

        prompt.start();
        assert!(prompt.completed().await);
        assert_eq!(
            *counter.last.lock().unwrap(),
            Some(Signal::PromptCompleted {
                prompt: prompt.path().to_string(),
                dismissed: true,
                result: Vec::new(),
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_times_out() {
        let vault = Arc::new(
            MemoryVault::new("pw")
                .locked()
                .with_unlock_answer(Some("pw"))
                .with_unlock_delay(Duration::from_secs(3600)),
        );
        let registry = PromptRegistry::new(
            vault.clone(),
            Arc::new(NoopExporter),
            Arc::new(SignalEmitter::new()),
            Duration::from_secs(5),
        );
        let prompt = registry.create(targets()).await.unwrap();

        prompt.start();
        assert!(prompt.completed().await);
        assert!(vault.is_locked_now());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unstarted_prompt_expires() {
        let (registry, vault, counter) = setup(MemoryVault::new("pw").locked());
        let prompt = registry.create(targets()).await.unwrap();

        tokio::time::sleep(Duration::from_secs(299)).await;
        assert_eq!(prompt.state(), PromptState::Created);
        assert_eq!(registry.len(), 1);

        assert!(prompt.completed().await);
        assert!(registry.is_empty());
        assert_eq!(vault.unlock_attempts(), 0);
        assert_eq!(counter.completions.load(Ordering::SeqCst), 1);

        // Too late to start now.
        prompt.start();
        assert_eq!(prompt.state(), PromptState::Completed { dismissed: true });
        assert_eq!(vault.unlock_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_running_prompt_does_not_expire() {
        let (registry, vault, counter) = setup(
            MemoryVault::new("pw")
                .locked()
                .with_unlock_answer(Some("pw"))
                .with_unlock_delay(Duration::from_secs(250)),
        );
        let prompt = registry.create(targets()).await.unwrap();

        // Started late; the attempt outlives the creation deadline.
        tokio::time::sleep(Duration::from_secs(100)).await;
        prompt.start();

        assert!(!prompt.completed().await);
        assert!(!vault.is_locked_now());
        assert_eq!(counter.completions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dismiss_before_start() {
        let (registry, vault, counter) = setup(MemoryVault::new("pw").locked());
        let prompt = registry.create(targets()).await.unwrap();

        prompt.dismiss().await;
        prompt.start();

        assert_eq!(prompt.state(), PromptState::Completed { dismissed: true });
        assert_eq!(vault.unlock_attempts(), 0);
        assert_eq!(counter.completions.load(Ordering::SeqCst), 1);
    }
}

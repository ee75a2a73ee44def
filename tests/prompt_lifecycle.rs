//! Unlock prompts driven through the dispatcher.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use vault_secret_service::{
    LoginAttributeMapper, MemoryVault, NoopExporter, SecretService, ServiceConfig, ServiceError,
    Signal, SignalEmitter, SignalSink,
};

const DEFAULT: &str = "/org/freedesktop/secrets/collections/default";

#[derive(Default)]
struct CompletedSink {
    completed: Mutex<Vec<(String, bool, Vec<String>)>>,
}

#[async_trait]
impl SignalSink for CompletedSink {
    async fn deliver(&self, signal: &Signal) -> Result<(), ServiceError> {
        if let Signal::PromptCompleted {
            prompt,
            dismissed,
            result,
        } = signal
        {
            self.completed
                .lock()
                .unwrap()
                .push((prompt.clone(), *dismissed, result.clone()));
        }
        Ok(())
    }
}

fn service(vault: Arc<MemoryVault>, config: ServiceConfig) -> (SecretService, Arc<CompletedSink>) {
    let sink = Arc::new(CompletedSink::default());
    let service = SecretService::new(
        config,
        vault,
        Arc::new(LoginAttributeMapper),
        Arc::new(NoopExporter),
        Arc::new(SignalEmitter::new().with_sink(sink.clone())),
    );
    (service, sink)
}

#[tokio::test(start_paused = true)]
async fn test_dismissed_prompt_leaves_vault_locked_and_can_be_retried() {
    let vault = Arc::new(
        MemoryVault::new("pw")
            .locked()
            .with_unlock_answer(Some("pw"))
            .with_unlock_delay(Duration::from_secs(30)),
    );
    let (service, sink) = service(vault.clone(), ServiceConfig::default());

    // 1. First attempt is dismissed while the user is still typing.
    let (_, first_path) = service.unlock(&[]).await.unwrap();
    let first = service.prompts().get(&first_path).unwrap();
    first.start();
    tokio::time::sleep(Duration::from_secs(5)).await;
    first.dismiss().await;

    assert!(first.completed().await);
    assert!(vault.is_locked_now());
    assert_eq!(
        sink.completed.lock().unwrap().as_slice(),
        &[(first_path.clone(), true, Vec::new())]
    );

    // 2. A new Unlock call gets a fresh prompt that succeeds.
    let (_, second_path) = service.unlock(&[]).await.unwrap();
    assert_ne!(first_path, second_path);
    let second = service.prompts().get(&second_path).unwrap();
    second.start();

    assert!(!second.completed().await);
    assert!(!vault.is_locked_now());
    assert_eq!(vault.unlock_attempts(), 2);
    assert_eq!(vault.cancelled_attempts(), 1);
    assert_eq!(
        sink.completed.lock().unwrap().last(),
        Some(&(second_path, false, vec![DEFAULT.to_string()]))
    );
    assert!(service.prompts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_configured_timeout_dismisses_prompt() {
    let vault = Arc::new(
        MemoryVault::new("pw")
            .locked()
            .with_unlock_answer(Some("pw"))
            .with_unlock_delay(Duration::from_secs(600)),
    );
    let config = ServiceConfig {
        prompt_timeout_secs: 10,
        ..ServiceConfig::default()
    };
    let (service, sink) = service(vault.clone(), config);

    let (_, path) = service.unlock(&[]).await.unwrap();
    let prompt = service.prompts().get(&path).unwrap();
    let started = tokio::time::Instant::now();
    prompt.start();

    assert!(prompt.completed().await);
    assert!(started.elapsed() >= Duration::from_secs(10));
    assert!(started.elapsed() < Duration::from_secs(600));
    assert!(vault.is_locked_now());
    assert_eq!(sink.completed.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_prompt_reports_requested_objects() {
    let vault = Arc::new(MemoryVault::new("pw").locked().with_unlock_answer(Some("pw")));
    let (service, sink) = service(vault, ServiceConfig::default());
    let item = format!("{}/5f1a6c0e3b7d4e9a8c210d4b6e8f9a12", DEFAULT);

    let (unlocked, path) = service.unlock(&[item.clone()]).await.unwrap();
    assert!(unlocked.is_empty());
    let prompt = service.prompts().get(&path).unwrap();
    assert_eq!(prompt.targets(), &[item.clone()]);

    prompt.start();
    assert!(!prompt.completed().await);
    assert_eq!(
        sink.completed.lock().unwrap().as_slice(),
        &[(path, false, vec![item])]
    );
}

#[tokio::test(start_paused = true)]
async fn test_dismiss_before_start_never_prompts() {
    let vault = Arc::new(MemoryVault::new("pw").locked().with_unlock_answer(Some("pw")));
    let (service, sink) = service(vault.clone(), ServiceConfig::default());

    let (_, path) = service.unlock(&[]).await.unwrap();
    let prompt = service.prompts().get(&path).unwrap();
    prompt.dismiss().await;
    prompt.start();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(vault.unlock_attempts(), 0);
    assert!(vault.is_locked_now());
    assert_eq!(sink.completed.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_prompts_are_cleared() {
    let vault = Arc::new(MemoryVault::new("pw").locked().with_unlock_answer(Some("pw")));
    let config = ServiceConfig {
        prompt_timeout_secs: 30,
        ..ServiceConfig::default()
    };
    let (service, sink) = service(vault.clone(), config);

    // 1. A client asks to unlock five times and never runs a prompt.
    let mut paths = Vec::new();
    for _ in 0..5 {
        let (_, path) = service.unlock(&[]).await.unwrap();
        paths.push(path);
    }
    assert_eq!(service.prompts().len(), 5);

    // 2. Once the prompt timeout passes they are all gone.
    tokio::time::sleep(Duration::from_secs(31)).await;

    assert!(service.prompts().is_empty());
    assert_eq!(vault.unlock_attempts(), 0);
    let completed = sink.completed.lock().unwrap();
    assert!(completed
        .iter()
        .all(|(_, dismissed, result)| *dismissed && result.is_empty()));
    let mut announced: Vec<String> = completed.iter().map(|(path, _, _)| path.clone()).collect();
    announced.sort();
    paths.sort();
    assert_eq!(announced, paths);
}

//! Serve the Secret Service on the session bus from an in-memory vault.
//!
//! Run with: `cargo run --example memory_vault [config.toml]`
//!
//! Then, from another shell:
//! - `secret-tool search --all url https://mail.example.com`
//! - `secret-tool store --label=chat service chat username bob`
//!
//! The vault starts locked. The first read triggers an unlock prompt, which
//! "types" the master password after two seconds.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing_subscriber::EnvFilter;
use vault_secret_service::vault::{Login, LoginUri};
use vault_secret_service::{bus, LoginAttributeMapper, MemoryVault, ServiceConfig, VaultItem};

const MASTER_PASSWORD: &str = "correct horse battery staple";

fn seed() -> Vec<VaultItem> {
    let now = Utc::now();
    vec![VaultItem {
        id: "5f1a6c0e-3b7d-4e9a-8c21-0d4b6e8f9a12".into(),
        name: "mail".into(),
        login: Some(Login {
            username: Some("alice".into()),
            password: Some("hunter2".into()),
            uris: vec![LoginUri {
                uri: "https://mail.example.com".into(),
            }],
        }),
        notes: None,
        creation_date: now,
        revision_date: now,
    }]
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("vault_secret_service=info")),
        )
        .init();

    // 1. Configuration, defaults if no file is given.
    let config = match std::env::args().nth(1) {
        Some(path) => ServiceConfig::load(&PathBuf::from(path))?,
        None => ServiceConfig::default(),
    };
    config.validate()?;

    // 2. A locked vault with one login.
    let vault = MemoryVault::new(MASTER_PASSWORD)
        .locked()
        .with_unlock_answer(Some(MASTER_PASSWORD))
        .with_unlock_delay(Duration::from_secs(2))
        .with_items(seed());

    // 3. Claim org.freedesktop.secrets and serve until interrupted.
    let server = bus::serve(config, Arc::new(vault), Arc::new(LoginAttributeMapper)).await?;
    println!(
        "Serving {} collection(s); press Ctrl-C to stop",
        server.service().collection_paths().await?.len()
    );

    tokio::signal::ctrl_c().await?;
    println!("Shutting down");
    Ok(())
}

use anyhow::Result;
use installreferrer::testing::{FakePlatform, FakeReply};
use installreferrer::{RawResponse, ReferrerConfig, SessionNotification};
use std::{env, process, sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "installreferrer=debug,cli=info".into()),
        )
        .init();

    // An optional config path; otherwise the built-in store contract is used.
    let args: Vec<String> = env::args().collect();
    let config = match args.len() {
        1 => ReferrerConfig::new("com.example.demo"),
        2 => ReferrerConfig::load(&args[1])?,
        _ => {
            eprintln!("Usage: {} [config.toml]", args[0]);
            process::exit(1);
        }
    };
    info!(package = %config.package_name, "config loaded");

    // Pretend the second store in the list is installed and knows our referrer.
    let provider = config
        .providers
        .get(1)
        .or_else(|| config.providers.first())
        .cloned()
        .unwrap_or_default();
    let reply = RawResponse::new()
        .with("result_code", 0)
        .with("install_referrer", "utm_source=demo&utm_medium=cli")
        .with("onestore_pid", "DEMO-PID")
        .with("referrer_click_timestamp_seconds", 1_760_000_000)
        .with("install_begin_timestamp_seconds", 1_760_000_042);
    let platform = Arc::new(
        FakePlatform::new()
            .offer(provider, 70000)
            .reply(FakeReply::Delay(Duration::from_millis(200), Some(reply))),
    );

    let (notification_tx, mut notification_rx) = mpsc::channel(8);
    let session = installreferrer::start_with_notifier(config, platform, notification_tx).await?;
    let client = session.client();
    let lookup = tokio::spawn(async move { client.fetch().await });

    while let Some(note) = notification_rx.recv().await {
        match note {
            SessionNotification::Connected { provider } => {
                println!("[CLIENT] ==> connected to '{}'", provider);
            }
            SessionNotification::Disconnected { provider } => {
                println!("[CLIENT] ==> '{}' went away", provider);
            }
            SessionNotification::Completed { .. } => break,
        }
    }

    match lookup.await? {
        Ok(record) => println!("{}", serde_json::to_string_pretty(&record)?),
        Err(e) => eprintln!("[CLIENT] referrer lookup failed: {}", e),
    }

    session.shutdown().await?;
    Ok(())
}

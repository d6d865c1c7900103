use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use dockline_comms::CommsClient;
use dockline_realtime::Feed;
use dockline_store::Database;

/// Headless communications session: opens the store, logs in the
/// configured user, then tails badge updates and urgent alerts until
/// ctrl-c. Handy for watching the realtime plumbing without the
/// dashboard in front of it.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dockline=debug".into()),
        )
        .init();

    // Config
    let db_path = std::env::var("DOCKLINE_DB_PATH").unwrap_or_else(|_| "dockline.db".into());
    let user_id: Uuid = std::env::var("DOCKLINE_USER_ID")
        .unwrap_or_else(|_| Uuid::new_v4().to_string())
        .parse()?;
    let user_name =
        std::env::var("DOCKLINE_USER_NAME").unwrap_or_else(|_| "floor-console".into());

    let db = Arc::new(Database::open(&PathBuf::from(&db_path))?);
    if db.display_name(user_id).is_err() {
        db.create_user(user_id, &user_name)?;
        info!("Registered user {} ({})", user_name, user_id);
    }

    let feed = Feed::new();
    let client = CommsClient::new(db, feed);
    let unread = client.login(user_id).await?;
    info!("Session up for {} — {} unread threads", user_name, unread);

    let mut badge = client.badge().subscribe();
    let mut alerts = client.alerts().subscribe();

    loop {
        tokio::select! {
            changed = badge.changed() => {
                if changed.is_err() {
                    break;
                }
                info!("Unread threads: {}", *badge.borrow_and_update());
            }
            alert = alerts.recv() => {
                match alert {
                    Ok(alert) => info!(
                        "URGENT from {} in '{}'",
                        alert.sender_name,
                        alert.thread_title.as_deref().unwrap_or("(untitled)")
                    ),
                    Err(_) => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                client.logout();
                break;
            }
        }
    }

    Ok(())
}

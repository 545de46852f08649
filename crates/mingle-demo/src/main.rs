use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use tracing::{info, warn};

use mingle_db::{KeyValueStore, SqliteStore};
use mingle_lifecycle::{MatchLifecycle, StaticPremium};
use mingle_types::{Match, MatchPolicy};
use mingle_unread::{MemoryFeed, UnreadAggregator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "mingle_demo=debug,mingle_lifecycle=info,mingle_unread=info,mingle_db=info".into()
            }),
        )
        .init();

    // Config
    let policy = MatchPolicy::from_env()?;
    let db_path = std::env::var("MINGLE_DB_PATH").unwrap_or_else(|_| "mingle.db".into());
    let viewer = std::env::var("MINGLE_DEMO_USER").unwrap_or_else(|_| "alice".into());

    let store: Arc<dyn KeyValueStore> = if db_path == ":memory:" {
        Arc::new(SqliteStore::open_in_memory()?)
    } else {
        Arc::new(SqliteStore::open(&PathBuf::from(&db_path))?)
    };
    let lifecycle = MatchLifecycle::new(store, Arc::new(StaticPremium::new(["carol"])), &policy);

    let now = Utc::now();
    let fresh = Match {
        id: "demo-fresh".into(),
        user1_id: viewer.clone(),
        user2_id: "bob".into(),
        created_at: now - TimeDelta::hours(23) - TimeDelta::minutes(10),
        venue_id: Some("corner-cafe".into()),
    };
    let stale = Match {
        id: "demo-stale".into(),
        user1_id: "carol".into(),
        user2_id: viewer.clone(),
        created_at: now - TimeDelta::hours(30),
        venue_id: None,
    };

    let feed = Arc::new(MemoryFeed::new());
    feed.upsert_match(fresh.clone());
    feed.upsert_match(stale.clone());

    let (handle, mut updates) = UnreadAggregator::spawn(feed.clone(), viewer.clone(), &policy);

    for m in [&fresh, &stale] {
        info!("{}: {}", m.id, lifecycle.status(m, now).label());
    }

    // bob talks until his quota runs out
    let sent = send_until_refused(&lifecycle, &feed, &fresh, "bob", policy.message_limit + 1);
    info!("bob sent {} messages", sent);
    info!(
        "bob has {} messages left in {}",
        lifecycle
            .quota()
            .remaining(&fresh.id, "bob")
            .count_or(policy.unlimited_sentinel),
        fresh.id
    );

    // the stale match can be revived once
    match lifecycle.reconnect(&stale, &viewer, Utc::now()) {
        Ok(()) => info!("{} reconnected", stale.id),
        Err(e) => warn!("{} not reconnected: {}", stale.id, e),
    }
    match lifecycle.send_message(&stale, "carol", "glad we reconnected", Utc::now()) {
        Ok(msg) => feed.add_message(msg),
        Err(e) => warn!("carol could not send: {}", e),
    }

    let deadline = tokio::time::sleep(policy.unread_debounce * 4 + Duration::from_secs(1));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            Some(counts) = updates.recv() => {
                info!("Unread for {}: {}", viewer, serde_json::to_string(&counts)?);
                if counts.get(&stale.id).unwrap_or(0) > 0 {
                    feed.mark_read(&fresh.id, &viewer);
                }
            }
            _ = &mut deadline => break,
        }
    }

    handle.shutdown().await;
    info!("Demo finished");
    Ok(())
}

/// Send from `sender` until the lifecycle refuses or `max_attempts` is hit.
/// Quota checks fail open when storage is down, so refusal alone may never come.
fn send_until_refused(
    lifecycle: &MatchLifecycle,
    feed: &MemoryFeed,
    m: &Match,
    sender: &str,
    max_attempts: u32,
) -> u32 {
    let mut sent = 0;
    for _ in 0..max_attempts {
        match lifecycle.send_message(m, sender, "still there?", Utc::now()) {
            Ok(msg) => {
                feed.add_message(msg);
                sent += 1;
            }
            Err(e) => {
                info!("{} stopped: {}", sender, e);
                break;
            }
        }
    }
    sent
}

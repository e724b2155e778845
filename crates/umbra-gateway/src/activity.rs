use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use umbra_types::api::OnlineUser;
use umbra_types::models::Role;

/// Last request time of every authenticated user, shared by the HTTP
/// middleware and the gateway.
#[derive(Clone, Default)]
pub struct ActivityTracker {
    users: Arc<RwLock<HashMap<i64, OnlineUser>>>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn touch(&self, user_id: i64, username: &str, role: Role) {
        self.touch_at(user_id, username, role, Utc::now()).await;
    }

    pub async fn touch_at(&self, user_id: i64, username: &str, role: Role, at: DateTime<Utc>) {
        let mut users = self.users.write().await;
        let entry = users.entry(user_id).or_insert_with(|| OnlineUser {
            id: user_id,
            username: username.to_string(),
            role,
            last_active_at: at,
        });
        entry.username = username.to_string();
        entry.role = role;
        entry.last_active_at = entry.last_active_at.max(at);
    }

    /// Users seen within `window`, most recently active first.
    pub async fn online(&self, window: Duration) -> Vec<OnlineUser> {
        self.online_at(Utc::now(), window).await
    }

    pub async fn online_at(&self, now: DateTime<Utc>, window: Duration) -> Vec<OnlineUser> {
        let cutoff = cutoff(now, window);
        let mut online: Vec<OnlineUser> = self
            .users
            .read()
            .await
            .values()
            .filter(|u| u.last_active_at >= cutoff)
            .cloned()
            .collect();
        online.sort_by(|a, b| b.last_active_at.cmp(&a.last_active_at).then(a.id.cmp(&b.id)));
        online
    }

    pub async fn online_count(&self, window: Duration) -> usize {
        let cutoff = cutoff(Utc::now(), window);
        self.users
            .read()
            .await
            .values()
            .filter(|u| u.last_active_at >= cutoff)
            .count()
    }

    /// Drops entries older than `window`. Returns how many were removed.
    pub async fn prune_at(&self, now: DateTime<Utc>, window: Duration) -> usize {
        let cutoff = cutoff(now, window);
        let mut users = self.users.write().await;
        let before = users.len();
        users.retain(|_, u| u.last_active_at >= cutoff);
        before - users.len()
    }
}

fn cutoff(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX);
    now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Background task that keeps the tracker bounded by recently active users.
pub async fn run_prune_loop(tracker: ActivityTracker, window: Duration, every: Duration) {
    let mut interval = tokio::time::interval(every);

    loop {
        interval.tick().await;

        let pruned = tracker.prune_at(Utc::now(), window).await;
        if pruned > 0 {
            debug!("Activity: pruned {} idle users", pruned);
        }
    }
}

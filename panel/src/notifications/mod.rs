//! Push notifications queued for the chat front-end

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use github_api::models::PushEvent;
use panel_api::models::Notification;
use tracing::{debug, info};

use crate::github::webhook::render_push;
use crate::storage::accounts::AccountStore;
use crate::storage::subscriptions::SubscriptionStore;
use crate::storage::UserId;

/// Default number of undelivered notifications kept per user
pub const DEFAULT_OUTBOX_CAPACITY: usize = 50;

/// Bounded per-user queues. When a queue is full the oldest entry is dropped.
pub struct Outbox {
    queues: RwLock<HashMap<UserId, VecDeque<Notification>>>,
    capacity: usize,
}

impl Outbox {
    pub fn new(capacity: usize) -> Self {
        Self {
            queues: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&self, user: UserId, notification: Notification) {
        let mut queues = self.queues.write().unwrap_or_else(|e| e.into_inner());
        let queue = queues.entry(user).or_default();
        if queue.len() >= self.capacity {
            queue.pop_front();
        }
        queue.push_back(notification);
    }

    /// Take everything queued for `user`, oldest first
    pub fn drain(&self, user: UserId) -> Vec<Notification> {
        let mut queues = self.queues.write().unwrap_or_else(|e| e.into_inner());
        queues
            .remove(&user)
            .map(|queue| queue.into_iter().collect())
            .unwrap_or_default()
    }

    pub fn pending(&self, user: UserId) -> usize {
        let queues = self.queues.read().unwrap_or_else(|e| e.into_inner());
        queues.get(&user).map(VecDeque::len).unwrap_or(0)
    }
}

impl Default for Outbox {
    fn default() -> Self {
        Self::new(DEFAULT_OUTBOX_CAPACITY)
    }
}

/// Queue a push notification for every subscriber of the repository.
///
/// Subscribers who opted out of their own pushes are skipped when their
/// GitHub login matches the pusher. Returns how many users were notified.
pub async fn fan_out_push(
    event: &PushEvent,
    subscriptions: &SubscriptionStore,
    accounts: &AccountStore,
    outbox: &Outbox,
) -> usize {
    let subscribers = subscriptions.subscribers(&event.repository.full_name).await;
    if subscribers.is_empty() {
        debug!("No subscribers for {}", event.repository.full_name);
        return 0;
    }

    let notification = render_push(event);
    let mut delivered = 0;
    for user in subscribers {
        if let Some(account) = accounts.get(user).await {
            if account.ignore_own_pushes
                && account.github_username.eq_ignore_ascii_case(&event.pusher.name)
            {
                debug!("Skipping own push for user {}", user);
                continue;
            }
        }
        outbox.push(user, notification.clone());
        delivered += 1;
    }

    info!(
        "Queued push notification for {} ({} users)",
        event.repository.full_name, delivered
    );
    delivered
}

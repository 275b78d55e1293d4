//! Incoming GitHub webhook deliveries

use chrono::Utc;
use github_api::models::PushEvent;
use hmac::{Hmac, Mac};
use panel_api::models::Notification;
use sha2::Sha256;

use crate::deploy::render::{escape_html, truncate_chars};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the delivery signature
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";
/// Header naming the event type
pub const EVENT_HEADER: &str = "x-github-event";

const LISTED_COMMITS: usize = 5;
const COMMIT_SUBJECT_CHARS: usize = 80;

/// Verify `sha256=<hex>` against the HMAC of `body`, in constant time
pub fn verify_signature(secret: &[u8], signature: &str, body: &[u8]) -> bool {
    let Some(hex_digest) = signature.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Chat message for a push: repository, pusher and the first commit subjects
pub fn render_push(event: &PushEvent) -> Notification {
    let mut text = format!(
        "New push to <b>{}</b> by <b>{}</b>",
        escape_html(&event.repository.full_name),
        escape_html(&event.pusher.name)
    );

    for commit in event.commits.iter().take(LISTED_COMMITS) {
        let subject = commit.message.lines().next().unwrap_or_default();
        text.push_str(&format!(
            "\n- {}",
            escape_html(&truncate_chars(subject, COMMIT_SUBJECT_CHARS))
        ));
    }
    if event.commits.len() > LISTED_COMMITS {
        text.push_str(&format!("\n+{} more", event.commits.len() - LISTED_COMMITS));
    }

    Notification {
        text,
        link: event
            .compare
            .clone()
            .or_else(|| Some(event.repository.html_url.clone())),
        created_at: Utc::now().to_rfc3339(),
    }
}

//! Best-effort operator notifications.
//!
//! Workflow handlers publish events onto an unbounded channel and return
//! immediately; a background task drains the channel and delivers emails.
//! Delivery failures are logged and never surface to the caller — a grant
//! request is submitted (or decided) whether or not the email goes out.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::config::EmailConfig;
use crate::storage::models::GrantRequest;
use crate::workflow::Decision;

const SENDGRID_SEND_URL: &str = "https://api.sendgrid.com/v3/mail/send";

#[derive(Debug, Clone)]
pub enum NotifyEvent {
    Decided {
        decision: Decision,
        request: GrantRequest,
    },
    Submitted(GrantRequest),
}

/// Cloneable publisher half of the notification outbox
#[derive(Clone)]
pub struct NotifyHandle {
    tx: mpsc::UnboundedSender<NotifyEvent>,
}

impl NotifyHandle {
    /// Queue an event for delivery. Never blocks and never fails the caller.
    pub fn publish(&self, event: NotifyEvent) {
        if self.tx.send(event).is_err() {
            warn!("Notifier task is gone; dropping notification event");
        }
    }
}

pub struct Notifier {
    client: reqwest::Client,
    config: EmailConfig,
}

impl Notifier {
    /// Spawn the delivery task and return a publisher handle for it
    pub fn spawn(config: EmailConfig, client: reqwest::Client) -> (NotifyHandle, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let notifier = Notifier { client, config };

        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                notifier.deliver(event).await;
            }
        });

        (NotifyHandle { tx }, task)
    }

    async fn deliver(&self, event: NotifyEvent) {
        let (subject, body) = match &event {
            NotifyEvent::Submitted(request) => (
                "New token grant request",
                format!(
                    "Request {id} from {email}\nFingerprint: {fp}\nReason: {reason}\n\nReview at {url}",
                    id = request.id,
                    email = request.contact_email,
                    fp = request.identity.truncated(),
                    reason = request.reason,
                    url = self.config.admin_url,
                ),
            ),
            NotifyEvent::Decided {
                decision: Decision::Reject,
                request,
            } => {
                // Rejections are logged only, no email
                debug!(request_id = %request.id, "Grant request rejected");
                return;
            }
            NotifyEvent::Decided {
                decision: Decision::Approve,
                request,
            } => (
                "Token grant request approved",
                format!(
                    "Request {id} for {fp} approved by {actor}",
                    id = request.id,
                    fp = request.identity.truncated(),
                    actor = request.decided_by.as_deref().unwrap_or("admin"),
                ),
            ),
        };

        let Some(api_key) = self.config.sendgrid_api_key.as_deref() else {
            debug!(subject, "No SendGrid API key configured; dropping notification");
            return;
        };

        let payload = serde_json::json!({
            "personalizations": [{ "to": [{ "email": self.config.admin_email }] }],
            "from": { "email": self.config.from_address },
            "subject": subject,
            "content": [{ "type": "text/plain", "value": body }],
        });

        let result = self
            .client
            .post(SENDGRID_SEND_URL)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                debug!(subject, "Notification email sent");
            }
            Ok(resp) => {
                error!(subject, status = %resp.status(), "Notification email rejected");
            }
            Err(e) => {
                error!(subject, error = %e, "Failed to send notification email");
            }
        }
    }
}

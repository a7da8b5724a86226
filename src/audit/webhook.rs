use std::time::Duration;

use reqwest::Client;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::TransitionRecord;

/// Failures delivering a record to the webhook endpoint.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("webhook returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Totals reported when the forwarding loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwardReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Drains an audit queue and POSTs each record as JSON to `url`.
pub struct WebhookForwarder {
    client: Client,
    url: String,
}

impl WebhookForwarder {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, WebhookError> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub async fn deliver(&self, record: &TransitionRecord) -> Result<(), WebhookError> {
        let response = self.client.post(&self.url).json(record).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(WebhookError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    /// Forward records until every sender is dropped.
    ///
    /// Failed deliveries are logged and counted, never retried.
    pub fn spawn(self, mut rx: mpsc::Receiver<TransitionRecord>) -> JoinHandle<ForwardReport> {
        tokio::spawn(async move {
            let mut report = ForwardReport::default();
            while let Some(record) = rx.recv().await {
                match self.deliver(&record).await {
                    Ok(()) => report.delivered += 1,
                    Err(e) => {
                        report.failed += 1;
                        tracing::warn!(
                            record = %record.record_id,
                            ticket = %record.ticket,
                            error = %e,
                            "audit webhook delivery failed"
                        );
                    }
                }
            }
            tracing::debug!(
                delivered = report.delivered,
                failed = report.failed,
                "audit forwarder stopped"
            );
            report
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::audit::{AuditSink, ChannelAuditSink};
    use crate::state_machine::{ActionKind, Actor, NewTicket, Status, Ticket, TicketId, WorkerId};

    fn record() -> TransitionRecord {
        let before = Ticket::from_intake(
            TicketId(3),
            NewTicket {
                client_name: "Client".into(),
                phone: "+70000000000".into(),
                address: "Street 1".into(),
                problem: "Broken".into(),
            },
            Utc::now(),
        );
        let mut after = before.clone();
        after.status = Status::Canceled;
        after.version = 2;
        TransitionRecord::between(
            ActionKind::Cancel,
            Actor::dispatcher(WorkerId(1)),
            &before,
            &after,
        )
    }

    #[tokio::test]
    async fn forwards_every_queued_record() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audit"))
            .and(body_partial_json(serde_json::json!({
                "action": "cancel",
                "new_status": "canceled",
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(2)
            .mount(&server)
            .await;

        let forwarder =
            WebhookForwarder::new(format!("{}/audit", server.uri()), Duration::from_secs(2))
                .unwrap();
        let (sink, rx) = ChannelAuditSink::bounded(8);
        let handle = forwarder.spawn(rx);

        sink.record(&record()).unwrap();
        sink.record(&record()).unwrap();
        drop(sink);

        let report = handle.await.unwrap();
        assert_eq!(report, ForwardReport { delivered: 2, failed: 0 });
    }

    #[tokio::test]
    async fn server_errors_are_counted_not_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("down"))
            .mount(&server)
            .await;

        let forwarder = WebhookForwarder::new(server.uri(), Duration::from_secs(2)).unwrap();
        let err = forwarder.deliver(&record()).await.unwrap_err();
        assert!(matches!(err, WebhookError::Status { status: 500, .. }));

        let (sink, rx) = ChannelAuditSink::bounded(8);
        let handle = forwarder.spawn(rx);
        sink.record(&record()).unwrap();
        drop(sink);
        assert_eq!(handle.await.unwrap(), ForwardReport { delivered: 0, failed: 1 });
    }

    #[test]
    fn status_error_display() {
        let err = WebhookError::Status {
            status: 503,
            body: "unavailable".into(),
        };
        assert_eq!(err.to_string(), "webhook returned status 503: unavailable");
    }
}

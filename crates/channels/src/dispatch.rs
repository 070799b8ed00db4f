//! Serialized, retrying outbound delivery.
//!
//! The transport drives a single automation session, so every outbound call
//! in the process funnels through one FIFO queue. Each queued send waits for
//! the transport to report `Connected`, gives the target conversation a
//! chance to materialize, then runs with a bounded retry on transient errors.

use std::{future::Future, sync::Arc, time::Duration};

use {
    tokio::sync::Mutex,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use wapanel_metrics::{counter, dispatch as dispatch_metrics, histogram, labels};

use crate::{
    Error,
    transport::{MediaOptions, MediaPayload, SentMessage, Transport},
};

/// Error text fragments that mark a transport failure as transient.
///
/// These are what the automation client reports while its page reloads or
/// reconnects; matching is case-insensitive.
const RETRYABLE_SIGNATURES: &[&str] = &[
    "evaluation failed",
    "execution context was destroyed",
    "not connected",
    "reload",
];

/// Whether a transport error message matches a transient failure signature.
pub fn is_retryable(message: &str) -> bool {
    let lower = message.to_lowercase();
    RETRYABLE_SIGNATURES.iter().any(|sig| lower.contains(sig))
}

/// Retry and polling budget for outbound sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchPolicy {
    /// Retries after the first attempt.
    pub retries: u32,
    pub backoff: Duration,
    pub ready_polls: u32,
    pub ready_interval: Duration,
    pub chat_polls: u32,
    pub chat_interval: Duration,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            retries: 5,
            backoff: Duration::from_millis(700),
            ready_polls: 40,
            ready_interval: Duration::from_millis(250),
            chat_polls: 10,
            chat_interval: Duration::from_millis(300),
        }
    }
}

/// Terminal outcome of a failed dispatch.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The transport never reported `Connected` within the polling budget.
    #[error("transport not ready after {polls} readiness checks")]
    TransportNotReady { polls: u32 },

    /// The transport call failed. `retryable` is true when the last error was
    /// transient and either the retry budget ran out or the transport stopped
    /// reporting `Connected` before the next attempt.
    #[error("send failed after {attempts} attempt(s): {source}")]
    SendFailed {
        attempts: u32,
        retryable: bool,
        #[source]
        source: Error,
    },
}

impl DispatchError {
    /// Whether trying the whole operation again later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::TransportNotReady { .. } => true,
            Self::SendFailed { retryable, .. } => *retryable,
        }
    }

    #[cfg(feature = "metrics")]
    fn error_type(&self) -> &'static str {
        match self {
            Self::TransportNotReady { .. } => "not_ready",
            Self::SendFailed {
                retryable: true, ..
            } => "retries_exhausted",
            Self::SendFailed { .. } => "fatal",
        }
    }
}

/// Process-wide outbound queue.
pub struct OutboundDispatcher {
    transport: Arc<dyn Transport>,
    policy: DispatchPolicy,
    // tokio's mutex is fair, so waiters are served in submission order.
    queue: Mutex<()>,
}

impl OutboundDispatcher {
    pub fn new(transport: Arc<dyn Transport>, policy: DispatchPolicy) -> Self {
        Self {
            transport,
            policy,
            queue: Mutex::new(()),
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn policy(&self) -> &DispatchPolicy {
        &self.policy
    }

    pub async fn send_text(&self, chat_id: &str, text: &str) -> Result<SentMessage, DispatchError> {
        let transport = self.transport.as_ref();
        self.send(chat_id, "send_text", || transport.send_text(chat_id, text))
            .await
    }

    pub async fn send_media(
        &self,
        chat_id: &str,
        media: &MediaPayload,
        options: &MediaOptions,
    ) -> Result<SentMessage, DispatchError> {
        let transport = self.transport.as_ref();
        self.send(chat_id, "send_media", || {
            transport.send_media(chat_id, media, options)
        })
        .await
    }

    /// Toggle the composing presence. A single queued call, not retried.
    pub async fn set_typing(&self, chat_id: &str, composing: bool) -> Result<(), DispatchError> {
        let _turn = self.queue.lock().await;
        let result = if composing {
            self.transport.set_typing(chat_id).await
        } else {
            self.transport.clear_typing(chat_id).await
        };
        result.map_err(|source| DispatchError::SendFailed {
            attempts: 1,
            retryable: false,
            source,
        })
    }

    /// Run one transport operation through the queue with readiness checks
    /// and bounded retry.
    ///
    /// `request` is invoked once per attempt, so it must build a fresh
    /// transport call each time.
    pub async fn send<T, F, Fut>(
        &self,
        chat_id: &str,
        operation: &'static str,
        mut request: F,
    ) -> Result<T, DispatchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = crate::Result<T>>,
    {
        #[cfg(feature = "metrics")]
        let queued_at = std::time::Instant::now();

        let _turn = self.queue.lock().await;

        #[cfg(feature = "metrics")]
        histogram!(dispatch_metrics::QUEUE_WAIT_SECONDS, labels::OPERATION => operation)
            .record(queued_at.elapsed().as_secs_f64());

        let result = self.send_locked(chat_id, operation, &mut request).await;

        #[cfg(feature = "metrics")]
        if let Err(ref e) = result {
            counter!(
                dispatch_metrics::FAILURES_TOTAL,
                labels::OPERATION => operation,
                labels::ERROR_TYPE => e.error_type()
            )
            .increment(1);
        }

        result
    }

    async fn send_locked<T, F, Fut>(
        &self,
        chat_id: &str,
        operation: &'static str,
        request: &mut F,
    ) -> Result<T, DispatchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = crate::Result<T>>,
    {
        let mut attempts = 0u32;
        let mut last_error: Option<Error> = None;

        loop {
            if let Err(not_ready) = self.wait_until_ready().await {
                // Report the send failure that led here, not just the timeout.
                let Some(source) = last_error else {
                    return Err(not_ready);
                };
                warn!(
                    chat_id,
                    operation,
                    attempts,
                    error = %source,
                    "transport dropped while retrying, giving up"
                );
                return Err(DispatchError::SendFailed {
                    attempts,
                    retryable: true,
                    source,
                });
            }
            self.wait_for_chat(chat_id).await;

            attempts += 1;
            #[cfg(feature = "metrics")]
            counter!(dispatch_metrics::ATTEMPTS_TOTAL, labels::OPERATION => operation)
                .increment(1);

            match request().await {
                Ok(value) => {
                    if attempts > 1 {
                        info!(chat_id, operation, attempts, "outbound send recovered after retry");
                    } else {
                        debug!(chat_id, operation, "outbound send delivered");
                    }
                    return Ok(value);
                },
                Err(err) => {
                    let retryable = is_retryable(&err.to_string());
                    let retries = attempts - 1;

                    if !retryable || retries >= self.policy.retries {
                        warn!(
                            chat_id,
                            operation,
                            attempts,
                            retryable,
                            error = %err,
                            "outbound send failed"
                        );
                        return Err(DispatchError::SendFailed {
                            attempts,
                            retryable,
                            source: err,
                        });
                    }

                    warn!(
                        chat_id,
                        operation,
                        attempts,
                        max_retries = self.policy.retries,
                        backoff_ms = self.policy.backoff.as_millis() as u64,
                        error = %err,
                        "transient transport error, waiting before retry"
                    );
                    #[cfg(feature = "metrics")]
                    counter!(dispatch_metrics::RETRIES_TOTAL, labels::OPERATION => operation)
                        .increment(1);
                    last_error = Some(err);
                    tokio::time::sleep(self.policy.backoff).await;
                },
            }
        }
    }

    async fn wait_until_ready(&self) -> Result<(), DispatchError> {
        let polls = self.policy.ready_polls.max(1);
        for poll in 0..polls {
            match self.transport.state().await {
                Ok(state) if state.is_connected() => return Ok(()),
                Ok(state) => debug!(?state, poll, "transport not connected yet"),
                Err(e) => debug!(error = %e, poll, "transport state query failed"),
            }
            tokio::time::sleep(self.policy.ready_interval).await;
        }
        warn!(polls, "transport never reported connected");
        Err(DispatchError::TransportNotReady { polls })
    }

    /// Poll until the transport can resolve the conversation. Some clients
    /// only materialize a conversation on first send, so running out of polls
    /// is not an error.
    async fn wait_for_chat(&self, chat_id: &str) {
        for poll in 0..self.policy.chat_polls {
            match self.transport.resolve_chat(chat_id).await {
                Ok(Some(_)) => return,
                Ok(None) => debug!(chat_id, poll, "conversation not materialized yet"),
                Err(e) => debug!(chat_id, poll, error = %e, "conversation lookup failed"),
            }
            tokio::time::sleep(self.policy.chat_interval).await;
        }
        debug!(chat_id, "conversation still unresolved, sending anyway");
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            testing::{MockTransport, TransportCall},
            transport::ConnectionState,
        },
        rstest::rstest,
    };

    fn fast_policy(retries: u32) -> DispatchPolicy {
        DispatchPolicy {
            retries,
            backoff: Duration::from_millis(1),
            ready_polls: 3,
            ready_interval: Duration::from_millis(1),
            chat_polls: 2,
            chat_interval: Duration::from_millis(1),
        }
    }

    #[rstest]
    #[case("Evaluation failed: TypeError", true)]
    #[case("Protocol error: Execution context was destroyed", true)]
    #[case("WhatsApp is not CONNECTED", true)]
    #[case("page reload in progress", true)]
    #[case("invalid wid", false)]
    #[case("", false)]
    fn classifies_error_signatures(#[case] message: &str, #[case] expected: bool) {
        assert_eq!(is_retryable(message), expected);
    }

    #[tokio::test]
    async fn retryable_failures_use_whole_budget() {
        let transport = Arc::new(MockTransport::connected());
        transport.fail_always("Evaluation failed: boom");
        let dispatcher = OutboundDispatcher::new(transport.clone(), fast_policy(5));

        let err = dispatcher.send_text("1@c.us", "hi").await.unwrap_err();

        assert_eq!(transport.send_attempts(), 6);
        match err {
            DispatchError::SendFailed {
                attempts,
                retryable,
                source,
            } => {
                assert_eq!(attempts, 6);
                assert!(retryable);
                assert!(source.to_string().contains("Evaluation failed"));
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn fatal_failure_is_attempted_once() {
        let transport = Arc::new(MockTransport::connected());
        transport.fail_always("invalid wid");
        let dispatcher = OutboundDispatcher::new(transport.clone(), fast_policy(5));

        let err = dispatcher.send_text("1@c.us", "hi").await.unwrap_err();

        assert_eq!(transport.send_attempts(), 1);
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn recovers_after_transient_failure() {
        let transport = Arc::new(MockTransport::connected());
        transport.fail_next("Execution context was destroyed");
        transport.fail_next("reload");
        let dispatcher = OutboundDispatcher::new(transport.clone(), fast_policy(5));

        dispatcher.send_text("1@c.us", "hi").await.unwrap();

        assert_eq!(transport.send_attempts(), 3);
        assert_eq!(transport.calls(), vec![TransportCall::Text {
            chat_id: "1@c.us".into(),
            text: "hi".into(),
        }]);
    }

    #[tokio::test]
    async fn never_connected_transport_is_not_ready() {
        let transport = Arc::new(MockTransport::connected());
        transport.set_state(ConnectionState::Other("OPENING".into()));
        let dispatcher = OutboundDispatcher::new(transport.clone(), fast_policy(5));

        let err = dispatcher.send_text("1@c.us", "hi").await.unwrap_err();

        assert!(matches!(err, DispatchError::TransportNotReady { polls: 3 }));
        assert!(err.is_transient());
        assert_eq!(transport.send_attempts(), 0);
    }

    #[tokio::test]
    async fn lost_connection_during_retry_keeps_send_error() {
        let transport = Arc::new(MockTransport::connected());
        transport.set_disconnect_on_failure(true);
        transport.fail_next("WhatsApp is not CONNECTED");
        let dispatcher = OutboundDispatcher::new(transport.clone(), fast_policy(5));

        let err = dispatcher.send_text("1@c.us", "hi").await.unwrap_err();

        assert_eq!(transport.send_attempts(), 1);
        assert!(err.is_transient());
        match err {
            DispatchError::SendFailed {
                attempts, source, ..
            } => {
                assert_eq!(attempts, 1);
                assert!(source.to_string().contains("not CONNECTED"));
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unresolved_chat_does_not_block_send() {
        let transport = Arc::new(MockTransport::connected());
        transport.set_chats_resolvable(false);
        let dispatcher = OutboundDispatcher::new(transport.clone(), fast_policy(0));

        dispatcher.send_text("new@c.us", "hola").await.unwrap();

        assert_eq!(transport.sent_texts(), vec![(
            "new@c.us".to_string(),
            "hola".to_string()
        )]);
    }

    #[tokio::test]
    async fn concurrent_sends_are_serialized_in_submission_order() {
        let transport =
            Arc::new(MockTransport::connected().with_send_delay(Duration::from_millis(20)));
        let dispatcher = Arc::new(OutboundDispatcher::new(transport.clone(), fast_policy(0)));

        let mut handles = Vec::new();
        for (chat, text) in [("a@c.us", "one"), ("b@c.us", "two"), ("a@c.us", "three")] {
            let dispatcher = Arc::clone(&dispatcher);
            handles.push(tokio::spawn(async move {
                dispatcher.send_text(chat, text).await
            }));
            // Give each task time to join the queue before the next one.
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(transport.max_in_flight(), 1);
        let texts: Vec<String> = transport.sent_texts().into_iter().map(|(_, t)| t).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn typing_toggles_are_single_calls() {
        let transport = Arc::new(MockTransport::connected());
        let dispatcher = OutboundDispatcher::new(transport.clone(), fast_policy(3));

        dispatcher.set_typing("1@c.us", true).await.unwrap();
        dispatcher.set_typing("1@c.us", false).await.unwrap();

        assert_eq!(transport.calls(), vec![
            TransportCall::TypingOn("1@c.us".into()),
            TransportCall::TypingOff("1@c.us".into()),
        ]);
    }

    #[tokio::test]
    async fn media_send_passes_options() {
        let transport = Arc::new(MockTransport::connected());
        let dispatcher = OutboundDispatcher::new(transport.clone(), fast_policy(0));
        let media = MediaPayload {
            mime_type: "audio/ogg".into(),
            filename: "hello.ogg".into(),
            data: vec![1, 2, 3],
        };

        dispatcher
            .send_media("1@c.us", &media, &MediaOptions {
                caption: None,
                as_voice: true,
            })
            .await
            .unwrap();

        assert_eq!(transport.calls(), vec![TransportCall::Media {
            chat_id: "1@c.us".into(),
            filename: "hello.ogg".into(),
            mime_type: "audio/ogg".into(),
            caption: None,
            as_voice: true,
        }]);
    }
}

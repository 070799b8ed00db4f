use std::sync::Arc;

use {
    tracing::{debug, info, warn},
    wapanel_channels::{DispatchError, InboundMessage, OutboundDispatcher},
    wapanel_sessions::FlagSets,
};

#[cfg(feature = "metrics")]
use wapanel_metrics::{auto_reply as auto_reply_metrics, counter, histogram, labels};

use crate::{
    actions::{Action, ActionReport, ActionRunner},
    notify::OutboundRecorder,
    state::AutoReplyState,
};

/// Whether a spent trigger stays spent when nothing was delivered.
///
/// Both default to `true`: a conversation gets one automated chance, even
/// when no rule matched or the reply could not be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerPolicy {
    pub consume_on_no_match: bool,
    pub consume_on_send_failure: bool,
}

impl Default for TriggerPolicy {
    fn default() -> Self {
        Self {
            consume_on_no_match: true,
            consume_on_send_failure: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    FromSelf,
    KnownContact,
    AlreadyTriggered,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::FromSelf => "from_self",
            Self::KnownContact => "known_contact",
            Self::AlreadyTriggered => "already_triggered",
        }
    }
}

/// Which configuration produced an automated reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySource {
    Rule { index: usize },
    Welcome,
}

impl ReplySource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rule { .. } => "rule",
            Self::Welcome => "welcome",
        }
    }
}

/// The reply chosen at decision time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedReply {
    Rule {
        index: usize,
        text: String,
        actions: Vec<Action>,
    },
    Welcome {
        text: String,
    },
    /// Eligible, but no rule matched and no welcome is configured.
    Nothing,
}

/// An eligible conversation, already marked as triggered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyPlan {
    pub chat_id: String,
    pub reply: PlannedReply,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Skip(SkipReason),
    Fire(ReplyPlan),
}

/// What an automated reply attempt ended with.
#[derive(Debug)]
pub enum AutoReplyOutcome {
    Skipped(SkipReason),
    /// The trigger was used without sending anything.
    NoReply,
    Replied {
        source: ReplySource,
        actions: Vec<ActionReport>,
    },
    DeliveryFailed {
        source: ReplySource,
        error: DispatchError,
    },
}

impl AutoReplyOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skipped(reason) => reason.as_str(),
            Self::NoReply => "no_reply",
            Self::Replied { .. } => "replied",
            Self::DeliveryFailed { .. } => "delivery_failed",
        }
    }
}

/// Decides and sends the one automated reply a conversation may get.
pub struct AutoReplyEngine {
    state: Arc<AutoReplyState>,
    flags: Arc<FlagSets>,
    dispatcher: Arc<OutboundDispatcher>,
    recorder: Arc<OutboundRecorder>,
    actions: ActionRunner,
    policy: TriggerPolicy,
}

impl AutoReplyEngine {
    pub fn new(
        state: Arc<AutoReplyState>,
        flags: Arc<FlagSets>,
        dispatcher: Arc<OutboundDispatcher>,
        recorder: Arc<OutboundRecorder>,
        actions: ActionRunner,
    ) -> Self {
        Self {
            state,
            flags,
            dispatcher,
            recorder,
            actions,
            policy: TriggerPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: TriggerPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn state(&self) -> &Arc<AutoReplyState> {
        &self.state
    }

    pub fn policy(&self) -> TriggerPolicy {
        self.policy
    }

    /// Run the eligibility gate for an inbound message.
    ///
    /// The check and the triggered mark (including its flush) run without an
    /// await point, so two messages racing on one conversation cannot both
    /// fire.
    pub fn decide(&self, msg: &dyn InboundMessage, sender_known: bool) -> Decision {
        let chat_id = msg.chat_id();
        let snapshot = self.state.snapshot();

        let skip = if !snapshot.enabled {
            Some(SkipReason::Disabled)
        } else if msg.is_from_self() {
            Some(SkipReason::FromSelf)
        } else if sender_known && !self.flags.overrides.contains(chat_id) {
            Some(SkipReason::KnownContact)
        } else {
            match self.flags.triggered.insert(chat_id) {
                Ok(true) => None,
                Ok(false) => Some(SkipReason::AlreadyTriggered),
                Err(e) => {
                    // Marked in memory, which is what gates the next message.
                    warn!(chat_id, error = %e, "trigger mark not persisted");
                    None
                },
            }
        };

        if let Some(reason) = skip {
            debug!(chat_id, reason = reason.as_str(), "auto-reply skipped");
            #[cfg(feature = "metrics")]
            counter!(auto_reply_metrics::DECISIONS_TOTAL, labels::OUTCOME => reason.as_str())
                .increment(1);
            return Decision::Skip(reason);
        }

        let body = msg.body().unwrap_or_default();
        let matched = snapshot
            .rules
            .find(body)
            .and_then(|hit| hit.rule.reply_text().map(|text| (hit, text)));
        let reply = match matched {
            Some((hit, text)) => PlannedReply::Rule {
                index: hit.index,
                text: text.to_string(),
                actions: hit.rule.actions.clone(),
            },
            None => match snapshot.welcome.clone() {
                Some(text) => PlannedReply::Welcome { text },
                None => PlannedReply::Nothing,
            },
        };

        info!(chat_id, reply = reply_label(&reply), "auto-reply triggered");
        #[cfg(feature = "metrics")]
        counter!(auto_reply_metrics::DECISIONS_TOTAL, labels::OUTCOME => "fire").increment(1);

        Decision::Fire(ReplyPlan {
            chat_id: chat_id.to_string(),
            reply,
        })
    }

    /// Deliver a planned reply and its action chain.
    ///
    /// Failures are logged and reported in the outcome, never returned as
    /// errors. Depending on [`TriggerPolicy`] an undelivered reply releases
    /// the conversation's trigger again.
    pub async fn execute(&self, plan: ReplyPlan) -> AutoReplyOutcome {
        #[cfg(feature = "metrics")]
        let started = std::time::Instant::now();

        let chat_id = plan.chat_id.as_str();
        let (source, text, actions) = match plan.reply {
            PlannedReply::Rule {
                index,
                text,
                actions,
            } => (ReplySource::Rule { index }, text, actions),
            PlannedReply::Welcome { text } => (ReplySource::Welcome, text, Vec::new()),
            PlannedReply::Nothing => {
                if !self.policy.consume_on_no_match {
                    self.release(chat_id);
                }
                return AutoReplyOutcome::NoReply;
            },
        };

        let sent = match self.dispatcher.send_text(chat_id, &text).await {
            Ok(sent) => sent,
            Err(error) => {
                warn!(
                    chat_id,
                    source = source.as_str(),
                    error = %error,
                    "auto-reply not delivered"
                );
                #[cfg(feature = "metrics")]
                counter!(
                    auto_reply_metrics::DELIVERY_FAILURES_TOTAL,
                    labels::SOURCE => source.as_str()
                )
                .increment(1);
                if !self.policy.consume_on_send_failure {
                    self.release(chat_id);
                }
                return AutoReplyOutcome::DeliveryFailed { source, error };
            },
        };
        self.recorder.record(chat_id, sent.id, Some(text), None).await;
        #[cfg(feature = "metrics")]
        counter!(auto_reply_metrics::REPLIES_SENT_TOTAL, labels::SOURCE => source.as_str())
            .increment(1);

        let reports = if actions.is_empty() {
            Vec::new()
        } else {
            self.actions.run(chat_id, &actions).await
        };

        #[cfg(feature = "metrics")]
        histogram!(auto_reply_metrics::CHAIN_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());

        AutoReplyOutcome::Replied {
            source,
            actions: reports,
        }
    }

    /// Decide and, when eligible, execute in one go.
    pub async fn handle(&self, msg: &dyn InboundMessage, sender_known: bool) -> AutoReplyOutcome {
        match self.decide(msg, sender_known) {
            Decision::Skip(reason) => AutoReplyOutcome::Skipped(reason),
            Decision::Fire(plan) => self.execute(plan).await,
        }
    }

    fn release(&self, chat_id: &str) {
        match self.flags.triggered.remove(chat_id) {
            Ok(_) => debug!(chat_id, "trigger released"),
            Err(e) => warn!(chat_id, error = %e, "trigger release not persisted"),
        }
    }
}

fn reply_label(reply: &PlannedReply) -> &'static str {
    match reply {
        PlannedReply::Rule { .. } => "rule",
        PlannedReply::Welcome { .. } => "welcome",
        PlannedReply::Nothing => "nothing",
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            media::MediaResolver,
            rules::{MatchKind, Rule},
            state::BotUpload,
        },
        std::time::Duration,
        wapanel_channels::{
            BroadcastEventSink, DispatchPolicy, SidecarInbound, testing::MockTransport,
        },
        wapanel_sessions::ConversationStore,
    };

    struct Harness {
        engine: AutoReplyEngine,
        transport: Arc<MockTransport>,
        flags: Arc<FlagSets>,
        store: Arc<ConversationStore>,
        _dir: tempfile::TempDir,
    }

    fn harness(rules: Vec<Rule>, welcome: Option<&str>) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::connected());
        let dispatcher = Arc::new(OutboundDispatcher::new(
            transport.clone(),
            DispatchPolicy {
                retries: 1,
                backoff: Duration::from_millis(1),
                ready_polls: 1,
                ready_interval: Duration::from_millis(1),
                chat_polls: 1,
                chat_interval: Duration::from_millis(1),
            },
        ));
        let store = Arc::new(ConversationStore::default());
        let recorder = Arc::new(OutboundRecorder::new(
            store.clone(),
            Arc::new(BroadcastEventSink::default()),
        ));
        let flags = Arc::new(FlagSets::load(dir.path()));
        let state = Arc::new(AutoReplyState::new());
        state.configure(BotUpload {
            welcome: welcome.map(str::to_string),
            rules,
        });
        let actions = ActionRunner::new(
            dispatcher.clone(),
            MediaResolver::new(dir.path(), Duration::from_secs(1)),
            recorder.clone(),
        );
        let engine = AutoReplyEngine::new(state, flags.clone(), dispatcher, recorder, actions);
        Harness {
            engine,
            transport,
            flags,
            store,
            _dir: dir,
        }
    }

    fn inbound(chat: &str, body: &str) -> SidecarInbound {
        SidecarInbound {
            chat_jid: chat.into(),
            sender_jid: chat.into(),
            body: Some(body.into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn fires_once_per_conversation() {
        let h = harness(vec![Rule::new(MatchKind::Includes, "", "hola")], None);

        for _ in 0..4 {
            h.engine.handle(&inbound("1@c.us", "hi"), false).await;
        }

        assert_eq!(h.transport.sent_texts().len(), 1);
        assert!(h.flags.triggered.contains("1@c.us"));
    }

    #[test]
    fn racing_threads_fire_exactly_once() {
        let h = harness(vec![Rule::new(MatchKind::Includes, "", "hola")], None);
        let msg = inbound("1@c.us", "hi");
        let start = std::sync::Barrier::new(8);

        let decisions: Vec<Decision> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        start.wait();
                        h.engine.decide(&msg, false)
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        let fired = decisions
            .iter()
            .filter(|d| matches!(d, Decision::Fire(_)))
            .count();
        assert_eq!(fired, 1);
        assert!(
            decisions
                .iter()
                .filter(|d| !matches!(d, Decision::Fire(_)))
                .all(|d| *d == Decision::Skip(SkipReason::AlreadyTriggered))
        );
        assert!(h.flags.triggered.contains("1@c.us"));
    }

    #[tokio::test]
    async fn rule_reply_is_sent_recorded_and_chained() {
        let rule = Rule::new(MatchKind::Equals, "hi", "  A  ").with_actions(vec![Action::Text {
            text: "follow-up".into(),
        }]);
        let h = harness(vec![rule, Rule::new(MatchKind::Includes, "h", "B")], Some("W"));

        let outcome = h.engine.handle(&inbound("1@c.us", "hi"), false).await;

        match outcome {
            AutoReplyOutcome::Replied { source, actions } => {
                assert_eq!(source, ReplySource::Rule { index: 0 });
                assert_eq!(actions.len(), 1);
            },
            other => panic!("unexpected outcome: {other:?}"),
        }
        let texts: Vec<String> = h.transport.sent_texts().into_iter().map(|(_, t)| t).collect();
        assert_eq!(texts, vec!["A", "follow-up"]);
        assert_eq!(h.store.history("1@c.us").len(), 2);
    }

    #[tokio::test]
    async fn welcome_fallback_never_runs_actions() {
        let h = harness(vec![Rule::new(MatchKind::Equals, "x", "A")], Some("Bienvenido"));

        let outcome = h.engine.handle(&inbound("1@c.us", "hello"), false).await;

        assert!(matches!(outcome, AutoReplyOutcome::Replied {
            source: ReplySource::Welcome,
            ref actions,
        } if actions.is_empty()));
        assert_eq!(h.transport.sent_texts(), vec![(
            "1@c.us".to_string(),
            "Bienvenido".to_string()
        )]);
    }

    #[tokio::test]
    async fn blank_rule_reply_falls_back_to_welcome() {
        let h = harness(vec![Rule::new(MatchKind::Includes, "", " ")], Some("W"));
        let outcome = h.engine.handle(&inbound("1@c.us", "hello"), false).await;
        assert!(matches!(outcome, AutoReplyOutcome::Replied {
            source: ReplySource::Welcome,
            ..
        }));
    }

    #[tokio::test]
    async fn no_match_without_welcome_still_consumes_trigger() {
        let h = harness(vec![Rule::new(MatchKind::Equals, "x", "A")], None);

        let outcome = h.engine.handle(&inbound("1@c.us", "hello"), false).await;

        assert!(matches!(outcome, AutoReplyOutcome::NoReply));
        assert!(h.transport.calls().is_empty());
        assert!(h.flags.triggered.contains("1@c.us"));
    }

    #[tokio::test]
    async fn no_match_policy_can_release_trigger() {
        let mut h = harness(vec![Rule::new(MatchKind::Equals, "x", "A")], None);
        h.engine = h.engine.with_policy(TriggerPolicy {
            consume_on_no_match: false,
            consume_on_send_failure: true,
        });

        h.engine.handle(&inbound("1@c.us", "hello"), false).await;
        assert!(!h.flags.triggered.contains("1@c.us"));

        h.engine.handle(&inbound("1@c.us", "x"), false).await;
        assert_eq!(h.transport.sent_texts().len(), 1);
    }

    #[tokio::test]
    async fn failed_delivery_keeps_trigger_by_default() {
        let h = harness(vec![], Some("W"));
        h.transport.fail_always("invalid wid");

        let outcome = h.engine.handle(&inbound("1@c.us", "hello"), false).await;

        assert!(matches!(outcome, AutoReplyOutcome::DeliveryFailed { .. }));
        assert!(h.flags.triggered.contains("1@c.us"));
        assert!(h.store.history("1@c.us").is_empty());
    }

    #[tokio::test]
    async fn failed_delivery_policy_can_release_trigger() {
        let mut h = harness(vec![], Some("W"));
        h.engine = h.engine.with_policy(TriggerPolicy {
            consume_on_no_match: true,
            consume_on_send_failure: false,
        });
        h.transport.fail_always("invalid wid");

        h.engine.handle(&inbound("1@c.us", "hello"), false).await;

        assert!(!h.flags.triggered.contains("1@c.us"));
    }

    #[tokio::test]
    async fn gate_conditions() {
        let h = harness(vec![Rule::new(MatchKind::Includes, "", "hola")], None);

        let mut own = inbound("1@c.us", "hi");
        own.from_me = true;
        assert_eq!(
            h.engine.decide(&own, false),
            Decision::Skip(SkipReason::FromSelf)
        );
        assert_eq!(
            h.engine.decide(&inbound("2@c.us", "hi"), true),
            Decision::Skip(SkipReason::KnownContact)
        );

        h.flags.overrides.insert("2@c.us").unwrap();
        assert!(matches!(
            h.engine.decide(&inbound("2@c.us", "hi"), true),
            Decision::Fire(_)
        ));

        h.engine.state().disable();
        assert_eq!(
            h.engine.decide(&inbound("3@c.us", "hi"), false),
            Decision::Skip(SkipReason::Disabled)
        );
        assert!(!h.flags.triggered.contains("3@c.us"));
    }
}

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use {
    serde_json::json,
    tokio::sync::broadcast,
    wapanel_auto_reply::{AutoReplyOutcome, Decision, SkipReason},
    wapanel_channels::{
        BroadcastEventSink, ChatInfo, MediaPayload, PanelEvent, SidecarInbound,
        testing::{MockTransport, TransportCall},
    },
    wapanel_config::{DispatchConfig, PanelConfig},
    wapanel_gateway::{ChatLookup, InboundReceipt, PanelService},
};

struct Panel {
    service: PanelService,
    transport: Arc<MockTransport>,
    events: broadcast::Receiver<PanelEvent>,
    dir: tempfile::TempDir,
}

fn config(dir: &tempfile::TempDir) -> PanelConfig {
    PanelConfig {
        data_dir: Some(dir.path().to_path_buf()),
        dispatch: DispatchConfig {
            retries: 2,
            backoff_ms: 1,
            ready_polls: 2,
            ready_interval_ms: 1,
            chat_polls: 1,
            chat_interval_ms: 1,
        },
        ..PanelConfig::default()
    }
}

fn panel_in(dir: tempfile::TempDir) -> Panel {
    let transport = Arc::new(MockTransport::connected());
    let sink = Arc::new(BroadcastEventSink::new(1024));
    let events = sink.subscribe();
    let service = PanelService::from_config(&config(&dir), transport.clone(), sink).unwrap();
    Panel {
        service,
        transport,
        events,
        dir,
    }
}

fn panel() -> Panel {
    panel_in(tempfile::tempdir().unwrap())
}

fn stranger(chat: &str, body: &str) -> SidecarInbound {
    SidecarInbound {
        chat_jid: chat.into(),
        sender_jid: chat.into(),
        sender_name: Some("Cliente".into()),
        body: Some(body.into()),
        is_my_contact: Some(false),
        timestamp: Some(1_700_000_000),
        ..Default::default()
    }
}

async fn settle(receipt: InboundReceipt) -> Option<AutoReplyOutcome> {
    match receipt.reply {
        Some(handle) => Some(handle.await.unwrap()),
        None => None,
    }
}

fn drain(events: &mut broadcast::Receiver<PanelEvent>) -> Vec<PanelEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

#[tokio::test]
async fn auto_reply_fires_once_per_conversation() {
    let p = panel();
    p.service
        .configure_bot(json!({
            "rules": [
                {"type": "equals", "match": "hi", "reply": "A"},
                {"type": "includes", "match": "h", "reply": "B"}
            ]
        }))
        .unwrap();

    for body in ["hi", "hi", "hello"] {
        let receipt = p.service.on_inbound(&stranger("1@c.us", body)).await;
        settle(receipt).await;
    }

    assert_eq!(p.transport.sent_texts(), vec![(
        "1@c.us".to_string(),
        "A".to_string()
    )]);
    assert!(p.service.flags().triggered.contains("1@c.us"));
    let persisted = std::fs::read_to_string(p.dir.path().join("bot_triggers.json")).unwrap();
    assert!(persisted.contains("1@c.us"));
}

#[tokio::test]
async fn slow_chain_does_not_block_other_chats() {
    let p = panel();
    p.service
        .configure_bot(json!({
            "rules": [
                {"type": "equals", "match": "lento", "reply": "A",
                 "actions": [{"do": "delay", "ms": 400}, {"do": "text", "text": "A2"}]},
                {"type": "equals", "match": "rapido", "reply": "B"}
            ]
        }))
        .unwrap();
    let started = std::time::Instant::now();

    let slow = p.service.on_inbound(&stranger("1@c.us", "lento")).await;
    let fast = p.service.on_inbound(&stranger("2@c.us", "rapido")).await;

    settle(fast).await.unwrap();
    assert!(started.elapsed() < std::time::Duration::from_millis(300));
    let texts: Vec<String> = p.transport.sent_texts().into_iter().map(|(_, t)| t).collect();
    assert_eq!(texts, vec!["A", "B"]);

    settle(slow).await.unwrap();
    let texts: Vec<String> = p.transport.sent_texts().into_iter().map(|(_, t)| t).collect();
    assert_eq!(texts, vec!["A", "B", "A2"]);
}

#[tokio::test]
async fn no_match_without_welcome_consumes_trigger_silently() {
    let p = panel();
    p.service
        .configure_bot(json!({"rules": [{"type": "equals", "match": "x", "reply": "A"}]}))
        .unwrap();

    let receipt = p.service.on_inbound(&stranger("1@c.us", "hello")).await;
    let outcome = settle(receipt).await.unwrap();

    assert!(matches!(outcome, AutoReplyOutcome::NoReply));
    assert!(p.transport.calls().is_empty());
    assert!(p.service.flags().triggered.contains("1@c.us"));
}

#[tokio::test]
async fn inbound_message_is_recorded_and_broadcast() {
    let mut p = panel();

    let receipt = p.service.on_inbound(&stranger("1@c.us", "hola")).await;
    assert!(receipt.created);
    assert_eq!(receipt.decision, Decision::Skip(SkipReason::Disabled));

    let history = p.service.messages("1@c.us").unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].timestamp_ms, 1_700_000_000_000);
    assert!(!history[0].from_me);

    let events = drain(&mut p.events);
    assert!(matches!(events[0], PanelEvent::NewMessage { .. }));
    match &events[1] {
        PanelEvent::ChatUpdated { name, body, .. } => {
            assert_eq!(name, "Cliente");
            assert_eq!(body, "hola");
        },
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(matches!(events[2], PanelEvent::ChatCreated { .. }));
    assert!(matches!(events[3], PanelEvent::Chats { .. }));

    let again = p.service.on_inbound(&stranger("1@c.us", "otra")).await;
    assert!(!again.created);
    assert_eq!(drain(&mut p.events).len(), 2);
}

#[tokio::test]
async fn hidden_conversation_revives_on_new_message() {
    let p = panel();
    p.service.on_inbound(&stranger("1@c.us", "hola")).await;

    let forgotten = p
        .service
        .forget_chat(&ChatLookup::name("cliente"))
        .await
        .unwrap();
    assert_eq!(forgotten, "1@c.us");
    assert!(p.service.visible_chats().is_empty());
    assert!(p.service.messages("1@c.us").unwrap().is_empty());
    assert!(p.service.overrides().list.contains(&"1@c.us".to_string()));

    let receipt = p.service.on_inbound(&stranger("1@c.us", "sigo aqui")).await;

    assert!(receipt.unhidden);
    assert!(!p.service.flags().hidden.contains("1@c.us"));
    let visible: Vec<String> = p.service.visible_chats().into_iter().map(|c| c.id).collect();
    assert_eq!(visible, vec!["1@c.us"]);
}

#[tokio::test]
async fn forget_chat_lets_the_bot_fire_again() {
    let p = panel();
    p.service
        .configure_bot(json!({"welcome": "Bienvenido", "rules": []}))
        .unwrap();
    settle(p.service.on_inbound(&stranger("1@c.us", "a")).await).await;
    p.service
        .forget_chat(&ChatLookup::chat_id("1@c.us"))
        .await
        .unwrap();
    settle(p.service.on_inbound(&stranger("1@c.us", "b")).await).await;

    assert_eq!(p.transport.sent_texts().len(), 2);
}

#[tokio::test]
async fn known_contact_is_looked_up_and_skipped() {
    let p = panel();
    p.service
        .configure_bot(json!({"welcome": "Bienvenido", "rules": []}))
        .unwrap();
    p.transport.add_known_contact("1@c.us");
    let mut msg = stranger("1@c.us", "hola");
    msg.is_my_contact = None;

    let receipt = p.service.on_inbound(&msg).await;

    assert_eq!(receipt.decision, Decision::Skip(SkipReason::KnownContact));
    assert!(p.transport.calls().is_empty());
}

#[tokio::test]
async fn operator_first_contact_still_gets_auto_reply() {
    let p = panel();
    p.service
        .configure_bot(json!({"welcome": "Bienvenido", "rules": []}))
        .unwrap();
    p.transport.add_chat(ChatInfo {
        id: "5215550001@c.us".into(),
        name: "Ana".into(),
        is_group: false,
    });

    // Already carries the country code, so it is not prefixed again.
    let sent = p.service.send_to("52 1555 0001", "Hola Ana").await.unwrap();
    assert!(sent.from_me);
    assert_eq!(p.service.store().chat("5215550001@c.us").unwrap().name, "Ana");

    let mut reply = stranger("5215550001@c.us", "gracias");
    reply.is_my_contact = Some(true);
    let outcome = settle(p.service.on_inbound(&reply).await).await;

    assert!(matches!(outcome, Some(AutoReplyOutcome::Replied { .. })));
    let texts: Vec<String> = p.transport.sent_texts().into_iter().map(|(_, t)| t).collect();
    assert_eq!(texts, vec!["Hola Ana", "Bienvenido"]);
}

#[tokio::test]
async fn operator_send_failures_surface_as_errors() {
    let p = panel();
    p.transport.fail_always("Evaluation failed: page reloading");

    let err = p.service.send_text("1@c.us", "hola").await.unwrap_err();

    assert!(err.is_transient());
    assert_eq!(err.status_code(), 503);
    assert_eq!(p.transport.send_attempts(), 3);
    assert!(p.service.messages("1@c.us").unwrap().is_empty());

    let err = p.service.send_text("1@c.us", "   ").await.unwrap_err();
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn bot_reply_failure_is_swallowed() {
    let p = panel();
    p.service
        .configure_bot(json!({"welcome": "Bienvenido", "rules": []}))
        .unwrap();
    p.transport.fail_always("invalid wid");

    let outcome = settle(p.service.on_inbound(&stranger("1@c.us", "hola")).await).await;

    assert!(matches!(
        outcome,
        Some(AutoReplyOutcome::DeliveryFailed { .. })
    ));
    assert!(p.service.flags().triggered.contains("1@c.us"));
    assert_eq!(p.service.messages("1@c.us").unwrap().len(), 1);
}

#[tokio::test]
async fn operator_media_is_recorded_with_attachment_preview() {
    let p = panel();
    let media = MediaPayload {
        mime_type: "audio/ogg".into(),
        filename: "nota.ogg".into(),
        data: vec![1, 2, 3],
    };

    let stored = p
        .service
        .send_media("1@c.us", media, None, true)
        .await
        .unwrap();

    assert_eq!(stored.preview(), "[Attachment]");
    assert!(matches!(
        p.transport.calls().as_slice(),
        [TransportCall::Media { as_voice: true, .. }]
    ));
}

#[tokio::test]
async fn ready_registers_visible_chats_only() {
    let mut p = panel();
    p.service.flags().hidden.insert("hidden@c.us").unwrap();

    p.service
        .on_ready(vec![
            ChatInfo::lite("a@c.us"),
            ChatInfo::lite("hidden@c.us"),
            ChatInfo::lite("b@c.us"),
        ])
        .await;

    assert_eq!(p.service.visible_chats().len(), 2);
    assert!(!p.service.store().contains("hidden@c.us"));
    let events = drain(&mut p.events);
    assert_eq!(events[0], PanelEvent::Ready);
}

#[tokio::test]
async fn flag_sets_survive_restart() {
    let p = panel();
    p.service.mark_stranger(&ChatLookup::number("5550001")).unwrap();
    p.service.on_inbound(&stranger("2@c.us", "hola")).await;
    p.service
        .forget_chat(&ChatLookup::chat_id("2@c.us"))
        .await
        .unwrap();
    let dir = p.dir;

    let restarted = panel_in(dir);

    assert_eq!(restarted.service.overrides().count, 2);
    assert!(restarted.service.flags().hidden.contains("2@c.us"));
    restarted
        .service
        .unmark_stranger(&ChatLookup::number("5550001"))
        .unwrap();
    assert_eq!(restarted.service.overrides().list, vec!["2@c.us"]);
}

#[tokio::test]
async fn startup_rules_file_enables_bot() {
    let dir = tempfile::tempdir().unwrap();
    let rules = dir.path().join("bot.json");
    std::fs::write(&rules, r#"{"welcome": "Hola", "rules": [{"reply": "x"}]}"#).unwrap();
    let mut cfg = config(&dir);
    cfg.auto_reply.rules_file = Some(rules);

    let service = PanelService::from_config(
        &cfg,
        Arc::new(MockTransport::connected()),
        Arc::new(BroadcastEventSink::default()),
    )
    .unwrap();

    let status = service.bot_status();
    assert!(status.enabled);
    assert_eq!(status.rules, 1);
    assert_eq!(status.welcome.as_deref(), Some("Hola"));
    assert!(!service.disable_bot().enabled);
}

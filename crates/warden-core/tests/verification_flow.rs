//! End-to-end verification flows against a recording gateway.

use std::time::Duration;

use uuid::Uuid;

use warden_core::config::WardenConfig;
use warden_core::harness::{
    announce_payload, default_engine, engine_with, inventory_payload,
};
use warden_core::policy::VerificationPolicy;
use warden_core::types::ClientId;
use warden_crypto::KeyMaterial;
use warden_proto::WireMessage;

#[tokio::test(start_paused = true)]
async fn happy_path_verifies_and_welcomes() {
    let (engine, gw) = default_engine();
    let client = gw.connect("alice");

    engine.on_client_connected(client, "alice").await;
    let sent = gw.sent_to(client);
    assert_eq!(sent.first(), Some(&WireMessage::PresenceRequest));

    engine
        .on_inbound_message(client, &announce_payload("companion"))
        .await;
    assert!(gw
        .sent_to(client)
        .iter()
        .any(|m| matches!(m, WireMessage::AcknowledgePresence { .. })));

    // Grace pause elapses, the inventory request goes out.
    tokio::time::sleep(Duration::from_secs(2)).await;
    let check_id = gw.requested_check_id(client).expect("inventory requested");

    engine
        .on_inbound_message(
            client,
            &inventory_payload(&check_id, &["java:17", "sodium:0.5.8"]),
        )
        .await;

    assert!(engine.is_approved(client).await);
    assert!(gw.kicks().is_empty());
    assert_eq!(gw.notices().len(), 1);

    let stats = engine.stats();
    assert_eq!(stats.verified, 1);
    assert_eq!(stats.rejected, 0);
}

#[tokio::test(start_paused = true)]
async fn silent_client_is_kicked_after_handshake_deadline() {
    let (engine, gw) = default_engine();
    let client = gw.connect("bob");

    engine.on_client_connected(client, "bob").await;
    tokio::time::sleep(Duration::from_secs(11)).await;

    let kicks = gw.kicks();
    assert_eq!(kicks.len(), 1);
    assert!(kicks[0].1.contains("companion module"));
    assert!(!engine.is_approved(client).await);
}

#[tokio::test(start_paused = true)]
async fn announcement_from_wrong_module_does_not_count() {
    let (engine, gw) = default_engine();
    let client = gw.connect("carol");

    engine.on_client_connected(client, "carol").await;
    engine
        .on_inbound_message(client, &announce_payload("impostor"))
        .await;
    // No acknowledgement for the impostor.
    assert!(!gw
        .sent_to(client)
        .iter()
        .any(|m| matches!(m, WireMessage::AcknowledgePresence { .. })));

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(gw.kicks().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn three_unanswered_requests_one_rejection() {
    let (engine, gw) = default_engine();
    let client = gw.connect("dave");

    engine.on_client_connected(client, "dave").await;
    engine
        .on_inbound_message(client, &announce_payload("companion"))
        .await;

    // Grace + three full response windows with no reply.
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(gw.inventory_request_count(client), 1);
    tokio::time::sleep(Duration::from_secs(16)).await;
    assert_eq!(gw.inventory_request_count(client), 2);
    tokio::time::sleep(Duration::from_secs(16)).await;
    assert_eq!(gw.inventory_request_count(client), 3);
    tokio::time::sleep(Duration::from_secs(16)).await;

    let kicks = gw.kicks();
    assert_eq!(kicks.len(), 1, "exactly one rejection");
    assert!(kicks[0].1.contains("No module list"));
    assert_eq!(gw.inventory_request_count(client), 3);
    assert_eq!(engine.stats().rejected, 1);
}

#[tokio::test(start_paused = true)]
async fn undeliverable_requests_exhaust_budget_and_reject() {
    let (engine, gw) = default_engine();
    let client = gw.connect("erin");

    engine.on_client_connected(client, "erin").await;
    engine
        .on_inbound_message(client, &announce_payload("companion"))
        .await;
    gw.set_fail_sends(true);

    tokio::time::sleep(Duration::from_secs(2)).await;

    let kicks = gw.kicks();
    assert_eq!(kicks.len(), 1);
    assert!(kicks[0].1.contains("Could not request"));
    assert_eq!(gw.inventory_request_count(client), 0);
}

#[tokio::test(start_paused = true)]
async fn late_response_after_rejection_is_dropped() {
    let (engine, gw) = default_engine();
    let client = gw.connect("frank");

    engine.on_client_connected(client, "frank").await;
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(gw.kicks().len(), 1);

    let before = engine.stats().dropped;
    engine
        .on_inbound_message(client, &inventory_payload("chk-deadbeef", &["x:1"]))
        .await;
    assert!(!engine.is_approved(client).await);
    assert_eq!(engine.stats().dropped, before + 1);
}

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_pending_timers() {
    let (engine, gw) = default_engine();
    let client = gw.connect("grace");

    engine.on_client_connected(client, "grace").await;
    engine.on_client_disconnected(client).await;

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(gw.kicks().is_empty());
    assert!(!engine.is_approved(client).await);
}

#[tokio::test(start_paused = true)]
async fn whitelisted_name_bypasses_verification() {
    let mut config = WardenConfig::default();
    config.whitelist.insert("vip".to_string());
    let (engine, gw) = engine_with(
        config,
        VerificationPolicy::permissive(),
        KeyMaterial::disabled(),
    );
    let client = gw.connect("vip");

    engine.on_client_connected(client, "vip").await;
    assert!(engine.is_approved(client).await);
    assert!(gw.sent_to(client).is_empty());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(gw.kicks().is_empty());
}

#[tokio::test(start_paused = true)]
async fn alternate_protocol_client_bypasses_when_allowed() {
    let (engine, gw) = default_engine();
    let client = ClientId::from_uuid(Uuid::from_u64_pair(0, 99));
    gw.connect_as(client, "bridged");

    engine.on_client_connected(client, "bridged").await;
    assert!(engine.is_approved(client).await);
    assert!(gw.sent_to(client).is_empty());
}

#[tokio::test(start_paused = true)]
async fn alternate_protocol_client_verified_when_not_allowed() {
    let mut config = WardenConfig::default();
    config.allow_alternate_protocol = false;
    let (engine, gw) = engine_with(
        config,
        VerificationPolicy::permissive(),
        KeyMaterial::disabled(),
    );
    let client = ClientId::from_uuid(Uuid::from_u64_pair(0, 99));
    gw.connect_as(client, "bridged");

    engine.on_client_connected(client, "bridged").await;
    assert!(!engine.is_approved(client).await);
    assert_eq!(gw.sent_to(client).first(), Some(&WireMessage::PresenceRequest));
}

#[tokio::test(start_paused = true)]
async fn blacklisted_module_rejects_with_named_mods() {
    let (engine, gw) = engine_with(
        WardenConfig::default(),
        VerificationPolicy::new(
            ["java".to_string(), "fabricloader".to_string()],
            ["xray".to_string()],
            None,
        ),
        KeyMaterial::disabled(),
    );
    let client = gw.connect("hank");

    engine.on_client_connected(client, "hank").await;
    engine
        .on_inbound_message(client, &announce_payload("companion"))
        .await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    let check_id = gw.requested_check_id(client).unwrap();

    engine
        .on_inbound_message(
            client,
            &inventory_payload(&check_id, &["java:17", "XRay:2.0", "sodium:0.5"]),
        )
        .await;

    let kicks = gw.kicks();
    assert_eq!(kicks.len(), 1);
    assert!(kicks[0].1.contains("XRay"), "kick names the module: {}", kicks[0].1);
    assert!(!engine.is_approved(client).await);
}

#[tokio::test(start_paused = true)]
async fn module_count_ceiling_rejects() {
    let mut config = WardenConfig::default();
    config.enable_mod_count_threshold = true;
    config.max_mod_count = 2;
    let policy = VerificationPolicy::from_config(&config, []);
    let (engine, gw) = engine_with(config, policy, KeyMaterial::disabled());
    let client = gw.connect("ivy");

    engine.on_client_connected(client, "ivy").await;
    engine
        .on_inbound_message(client, &announce_payload("companion"))
        .await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    let check_id = gw.requested_check_id(client).unwrap();

    engine
        .on_inbound_message(
            client,
            &inventory_payload(&check_id, &["a:1", "b:1", "c:1"]),
        )
        .await;

    let kicks = gw.kicks();
    assert_eq!(kicks.len(), 1);
    assert!(kicks[0].1.contains('3') && kicks[0].1.contains('2'));
}

#[tokio::test(start_paused = true)]
async fn policy_reload_does_not_affect_in_flight_sessions() {
    let (engine, gw) = default_engine();
    let client = gw.connect("mia");

    engine.on_client_connected(client, "mia").await;
    engine
        .on_inbound_message(client, &announce_payload("companion"))
        .await;
    // Tighten the policy mid-flight.
    engine
        .reload_policy(VerificationPolicy::new([], ["sodium".to_string()], None))
        .await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    let check_id = gw.requested_check_id(client).unwrap();
    engine
        .on_inbound_message(client, &inventory_payload(&check_id, &["sodium:0.5"]))
        .await;
    // Started under the permissive snapshot, so still verified.
    assert!(engine.is_approved(client).await);
    assert!(gw.kicks().is_empty());

    // A session started after the reload sees the tightened policy.
    let second = gw.connect("nina");
    engine.on_client_connected(second, "nina").await;
    engine
        .on_inbound_message(second, &announce_payload("companion"))
        .await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    let check2 = gw.requested_check_id(second).unwrap();
    engine
        .on_inbound_message(second, &inventory_payload(&check2, &["sodium:0.5"]))
        .await;
    assert_eq!(gw.kicks().len(), 1);
    assert!(!engine.is_approved(second).await);
}

#[tokio::test(start_paused = true)]
async fn garbage_payloads_are_dropped_not_fatal() {
    let (engine, gw) = default_engine();
    let client = gw.connect("judy");

    engine.on_client_connected(client, "judy").await;
    engine.on_inbound_message(client, b"{]").await;
    engine.on_inbound_message(client, &[0xff, 0xfe, 0x00]).await;
    engine
        .on_inbound_message(client, br#"{"messageType": "NO_SUCH_TYPE"}"#)
        .await;
    assert!(gw.kicks().is_empty());
    assert_eq!(engine.stats().dropped, 3);

    // The session is intact and can still complete.
    engine
        .on_inbound_message(client, &announce_payload("companion"))
        .await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    let check_id = gw.requested_check_id(client).unwrap();
    engine
        .on_inbound_message(client, &inventory_payload(&check_id, &["java:17"]))
        .await;
    assert!(engine.is_approved(client).await);
}

#[tokio::test(start_paused = true)]
async fn server_bound_copies_of_server_messages_are_ignored() {
    let (engine, gw) = default_engine();
    let client = gw.connect("kate");

    engine.on_client_connected(client, "kate").await;
    let echo = WireMessage::RequestModList {
        check_id: "chk-echo".to_string(),
    }
    .encode_bytes();
    engine.on_inbound_message(client, &echo).await;
    assert!(gw.kicks().is_empty());
}

#[tokio::test(start_paused = true)]
async fn response_before_request_is_unsolicited() {
    let (engine, gw) = default_engine();
    let client = gw.connect("liam");

    engine.on_client_connected(client, "liam").await;
    engine
        .on_inbound_message(client, &inventory_payload("chk-early", &["x:1"]))
        .await;
    assert!(!engine.is_approved(client).await);
    assert!(gw.kicks().is_empty());
    assert_eq!(engine.stats().dropped, 1);
}

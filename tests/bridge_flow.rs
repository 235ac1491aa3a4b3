mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{FakeSession, PUBLIC_BASE, TestBridge, group_message};
use serde_json::json;
use std::time::Duration;
use tower::ServiceExt;
use wabridge::bus::EventBus;
use wabridge::gateway::build_router;
use wabridge::pipeline::dispatch::DispatchOutcome;
use wabridge::pipeline::{PipelineOutcome, run_event_loop};
use wabridge::session::SessionEvent;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn webhook(response: ResponseTemplate) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(response)
        .mount(&server)
        .await;
    server
}

async fn posted_payloads(server: &MockServer) -> Vec<serde_json::Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

#[tokio::test]
async fn test_group_image_with_caption_end_to_end() {
    let server = webhook(ResponseTemplate::new(200).set_body_json(json!({}))).await;
    let session = FakeSession::with_bob();
    session.add_media("img-1", b"\xff\xd8\xff\xe0 fake jpeg", "image/jpeg");
    let bridge = TestBridge::new(session, &format!("{}/hook", server.uri()));

    let outcome = bridge
        .pipeline
        .handle(&group_message("img-1", "image", "invoice"))
        .await;
    assert_eq!(
        outcome,
        PipelineOutcome::Dispatched(DispatchOutcome::Delivered {
            delete_requested: false,
            deleted: false,
        })
    );
    assert!(bridge.session.deleted_ids().is_empty());

    let payloads = posted_payloads(&server).await;
    assert_eq!(payloads.len(), 1);
    let payload = &payloads[0];
    assert_eq!(payload["type"], "image_with_caption");
    assert_eq!(payload["messageText"], "invoice");
    assert_eq!(payload["phoneNumber"], "1234");
    assert_eq!(payload["name"], "Bob");
    assert_eq!(payload["contactFound"], true);
    assert_eq!(payload["message"]["id"], "img-1");

    let url = payload["mediaData"]["url"].as_str().unwrap();
    let media_path = url.strip_prefix(PUBLIC_BASE).unwrap();
    assert!(media_path.starts_with("/temp/img-1_"));

    let resp = build_router(bridge.gateway_state())
        .oneshot(
            Request::builder()
                .uri(media_path)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = axum::body::to_bytes(resp.into_body(), 4096).await.unwrap();
    assert_eq!(&body[..], b"\xff\xd8\xff\xe0 fake jpeg");
}

#[tokio::test]
async fn test_delete_directive_deletes_once() {
    let server =
        webhook(ResponseTemplate::new(200).set_body_json(json!({"deleteMessage": true}))).await;
    let bridge = TestBridge::new(FakeSession::with_bob(), &format!("{}/hook", server.uri()));

    bridge
        .pipeline
        .handle(&group_message("t-1", "chat", "please delete"))
        .await;
    assert_eq!(bridge.session.deleted_ids(), vec!["t-1".to_string()]);
}

#[tokio::test]
async fn test_self_and_direct_messages_never_reach_webhook() {
    let server = webhook(ResponseTemplate::new(200)).await;
    let bridge = TestBridge::new(FakeSession::with_bob(), &format!("{}/hook", server.uri()));

    let mut own = group_message("own-1", "chat", "mine");
    own.from_me = true;
    let mut direct = group_message("dm-1", "chat", "hello");
    direct.from = "15551234567@c.us".into();
    direct.author = None;

    assert_eq!(bridge.pipeline.handle(&own).await, PipelineOutcome::Ignored);
    assert!(matches!(
        bridge.pipeline.handle(&direct).await,
        PipelineOutcome::NotForwarded(_)
    ));
    assert!(posted_payloads(&server).await.is_empty());
}

#[tokio::test]
async fn test_event_bus_drives_pipeline_and_status() {
    let server = webhook(ResponseTemplate::new(200)).await;
    let bridge = TestBridge::new(FakeSession::with_bob(), &format!("{}/hook", server.uri()));

    let mut bus = EventBus::new(16);
    let rx = bus.take_rx().unwrap();
    let sender = bus.sender();
    drop(bus);
    let event_loop = tokio::spawn(run_event_loop(
        rx,
        bridge.pipeline.clone(),
        bridge.broadcaster.clone(),
    ));

    sender.publish(SessionEvent::QrCode("2@abc".into())).await.unwrap();
    sender.publish(SessionEvent::Ready).await.unwrap();
    sender
        .publish(SessionEvent::Message(group_message("t-1", "chat", "hi")))
        .await
        .unwrap();
    drop(sender);
    event_loop.await.unwrap();

    let resp = build_router(bridge.gateway_state())
        .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
    let status: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(status, json!({"isConnected": true}));

    for _ in 0..100 {
        if !posted_payloads(&server).await.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let payloads = posted_payloads(&server).await;
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0]["messageText"], "hi");
}

#[tokio::test]
async fn test_webhook_failure_does_not_block_next_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    let bridge = TestBridge::new(FakeSession::with_bob(), &server.uri());

    let first = bridge.pipeline.handle(&group_message("a", "chat", "1")).await;
    let second = bridge.pipeline.handle(&group_message("b", "chat", "2")).await;

    assert_eq!(
        first,
        PipelineOutcome::Dispatched(DispatchOutcome::Rejected { status: 503 })
    );
    assert!(matches!(
        second,
        PipelineOutcome::Dispatched(DispatchOutcome::Delivered { .. })
    ));
    assert_eq!(posted_payloads(&server).await.len(), 2);
}

use super::*;
use crate::pipeline::classify::MessageKind;
use crate::pipeline::contacts::ResolvedContact;
use crate::pipeline::payload::{self, MediaOutcome};
use crate::session::testing::{MockSession, group_message};
use std::sync::atomic::Ordering;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn text_payload(id: &str) -> WebhookPayload {
    let msg = group_message(id, "chat", "hello");
    payload::build(
        &msg,
        &MessageKind::GroupText,
        &ResolvedContact::default(),
        MediaOutcome::NotApplicable,
    )
    .unwrap()
}

fn dispatcher_for(server: &MockServer, session: Arc<MockSession>) -> WebhookDispatcher {
    WebhookDispatcher::new(
        format!("{}/hook", server.uri()),
        Duration::from_secs(5),
        session,
    )
}

async fn respond_with(
    template: ResponseTemplate,
) -> (MockServer, Arc<MockSession>, DispatchOutcome) {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(template)
        .expect(1)
        .mount(&server)
        .await;
    let session = Arc::new(MockSession::default());
    let dispatcher = dispatcher_for(&server, session.clone());
    let outcome = dispatcher.dispatch(&text_payload("m1")).await;
    (server, session, outcome)
}

#[test]
fn test_parse_directive_strict_true() {
    assert!(parse_directive(r#"{"deleteMessage":true}"#).unwrap().wants_delete());
    assert!(!parse_directive(r#"{"deleteMessage":false}"#).unwrap().wants_delete());
    assert!(!parse_directive(r#"{"deleteMessage":"true"}"#).unwrap().wants_delete());
    assert!(!parse_directive(r#"{"deleteMessage":1}"#).unwrap().wants_delete());
    assert!(!parse_directive(r#"{"other":true}"#).unwrap().wants_delete());
    assert!(!parse_directive("").unwrap().wants_delete());
    assert!(!parse_directive("  \n").unwrap().wants_delete());
}

#[test]
fn test_parse_directive_rejects_malformed() {
    let err = parse_directive("not json").unwrap_err();
    assert_eq!(err.kind(), "response_parse");
    assert!(parse_directive("42").is_err());
}

#[tokio::test]
async fn test_posts_json_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(header("content-type", "application/json"))
        .and(body_partial_json(serde_json::json!({
            "chatId": "120363041234567890@g.us",
            "type": "text",
            "messageText": "hello",
            "message": { "id": "m1" }
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let session = Arc::new(MockSession::default());
    let dispatcher = dispatcher_for(&server, session);
    let outcome = dispatcher.dispatch(&text_payload("m1")).await;
    assert_eq!(
        outcome,
        DispatchOutcome::Delivered {
            delete_requested: false,
            deleted: false,
        }
    );
}

#[tokio::test]
async fn test_delete_true_deletes_once() {
    let (_server, session, outcome) = respond_with(
        ResponseTemplate::new(200).set_body_json(serde_json::json!({"deleteMessage": true})),
    )
    .await;

    assert_eq!(
        outcome,
        DispatchOutcome::Delivered {
            delete_requested: true,
            deleted: true,
        }
    );
    assert_eq!(session.deleted_ids(), vec!["m1".to_string()]);
}

#[tokio::test]
async fn test_delete_false_or_absent_keeps_message() {
    for body in [
        serde_json::json!({"deleteMessage": false}),
        serde_json::json!({}),
        serde_json::json!({"deleteMessage": "yes"}),
    ] {
        let (_server, session, outcome) =
            respond_with(ResponseTemplate::new(200).set_body_json(body)).await;
        assert!(matches!(
            outcome,
            DispatchOutcome::Delivered {
                delete_requested: false,
                ..
            }
        ));
        assert!(session.deleted_ids().is_empty());
    }
}

#[tokio::test]
async fn test_malformed_response_is_not_a_delete() {
    let (_server, session, outcome) =
        respond_with(ResponseTemplate::new(200).set_body_string("OK, thanks")).await;
    assert!(matches!(outcome, DispatchOutcome::Delivered { .. }));
    assert!(session.deleted_ids().is_empty());
}

#[tokio::test]
async fn test_non_success_status_is_rejected_without_retry() {
    let (_server, session, outcome) = respond_with(
        ResponseTemplate::new(500).set_body_json(serde_json::json!({"deleteMessage": true})),
    )
    .await;
    assert_eq!(outcome, DispatchOutcome::Rejected { status: 500 });
    assert!(session.deleted_ids().is_empty());
}

#[tokio::test]
async fn test_deletion_failure_still_delivered() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"deleteMessage": true})),
        )
        .mount(&server)
        .await;
    let session = Arc::new(MockSession::default());
    session.fail_delete.store(true, Ordering::SeqCst);
    let dispatcher = dispatcher_for(&server, session.clone());

    let outcome = dispatcher.dispatch(&text_payload("m1")).await;
    assert_eq!(
        outcome,
        DispatchOutcome::Delivered {
            delete_requested: true,
            deleted: false,
        }
    );
    assert_eq!(session.deleted_ids().len(), 1);
}

#[tokio::test]
async fn test_unreachable_webhook_fails() {
    let session = Arc::new(MockSession::default());
    let dispatcher = WebhookDispatcher::new(
        "http://127.0.0.1:1/hook",
        Duration::from_secs(2),
        session.clone(),
    );
    let outcome = dispatcher.dispatch(&text_payload("m1")).await;
    assert!(matches!(outcome, DispatchOutcome::Failed { .. }));
    assert!(session.deleted_ids().is_empty());
}

#[tokio::test]
async fn test_slow_webhook_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;
    let session = Arc::new(MockSession::default());
    let dispatcher = WebhookDispatcher::new(server.uri(), Duration::from_millis(50), session);

    let outcome = dispatcher.dispatch(&text_payload("m1")).await;
    assert!(matches!(outcome, DispatchOutcome::Failed { .. }));
}

use assert_json_diff::assert_json_include;
use axum::http::StatusCode;
use serde_json::json;

use inbox::message::{MessageFilter, MessageType, Source};
use inbox::storage::StorageBackend;

mod common;
use common::*;

#[tokio::test]
async fn telegram_text_message_is_stored_and_acked() {
    let app = TestApp::new();
    let update = json!({
        "update_id": 1,
        "message": {
            "message_id": 9,
            "date": 1717236000,
            "text": "Buy milk",
            "chat": {"id": 1, "type": "private"},
            "from": {"id": 2, "first_name": "Ana"}
        }
    });

    let (status, body) = app.post_json("/api/receive?source=telegram", &update).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": true}));

    let stored = app.remote.list(&MessageFilter::default()).await.unwrap();
    assert_eq!(stored.len(), 1);
    let message = &stored[0];
    assert_eq!(message.content, "Buy milk");
    assert_eq!(message.source, Source::Telegram);
    assert_eq!(message.message_type, Some(MessageType::Text));
    assert_eq!(message.created_at, received_at());
    assert_eq!(message.metadata["messageId"], json!(9));
    assert_eq!(message.metadata["chat"], json!({"id": 1, "type": "private"}));
}

#[tokio::test]
async fn twilio_form_link_is_classified_as_video() {
    let app = TestApp::new();
    let (status, body) = app
        .post_form(
            "/api/receive?source=sms",
            "Body=http://example.com/video.mp4&From=%2B15551234567&To=%2B15550000000&MessageSid=SM1",
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_json_include!(
        actual: body,
        expected: json!({
            "success": true,
            "id": 1,
            "message": "Message received and processed successfully"
        })
    );

    let message = app.remote.get(1).await.unwrap().unwrap();
    assert_eq!(message.content, "http://example.com/video.mp4");
    assert_eq!(message.message_type, Some(MessageType::Video));
    assert_eq!(message.metadata["from"], json!("+15551234567"));
    assert_eq!(message.metadata["messageSid"], json!("SM1"));
}

#[tokio::test]
async fn custom_json_keeps_caller_classification() {
    let app = TestApp::new();
    let (status, body) = app
        .post_json(
            "/api/receive?source=whatsapp",
            &json!({
                "content": "Budget review #finance",
                "category": "Work",
                "metadata": {"sender": "+15550001111"}
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));

    let message = app.remote.get(1).await.unwrap().unwrap();
    assert_eq!(message.category.as_deref(), Some("Work"));
    assert_eq!(message.tags, vec!["finance".to_string(), "budget".to_string()]);
    assert_eq!(message.message_type, Some(MessageType::Text));
}

#[tokio::test]
async fn every_source_yields_exactly_one_message() {
    let app = TestApp::new();
    for source in Source::ALL {
        let (status, _) = app
            .post_form(&format!("/api/receive?source={source}"), "Body=hello")
            .await;
        assert_eq!(status, StatusCode::OK);
    }
    let stored = app.remote.list(&MessageFilter::default()).await.unwrap();
    assert_eq!(stored.len(), Source::ALL.len());
    assert!(stored.iter().all(|m| m.content == "hello"));
}

#[tokio::test]
async fn unknown_or_missing_source_is_rejected() {
    let app = TestApp::new();
    for uri in ["/api/receive?source=fax", "/api/receive"] {
        let (status, body) = app.post_json(uri, &json!({"content": "x"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("Invalid source"));
    }
    assert!(app.events.is_empty());
}

#[tokio::test]
async fn unsupported_content_type_is_415() {
    let app = TestApp::new();
    let (status, body) = app
        .send_json(post(
            "/api/receive?source=sms",
            "text/plain",
            "hello".to_string(),
        ))
        .await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn malformed_payloads_are_400_and_not_logged() {
    let app = TestApp::new();

    let (status, body) = app
        .send_json(post(
            "/api/receive?source=whatsapp",
            "application/json",
            "{broken".to_string(),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = app
        .post_json("/api/receive?source=telegram", &json!({"update_id": 3}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.post_form("/api/receive?source=sms", "From=%2B1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(app.events.is_empty());
    assert!(app
        .remote
        .list(&MessageFilter::default())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn telegram_is_acked_even_when_storage_fails() {
    let app = TestApp::new();
    app.remote.set_offline(true);
    app.local.set_offline(true);

    let (status, body) = app
        .post_json(
            "/api/receive?source=telegram",
            &json!({"message": {"text": "lost but acked", "chat": {"id": 1}}}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": true}));

    // the delivery is still visible in the event log
    assert_eq!(app.events.snapshot()[0].content, "lost but acked");
}

#[tokio::test]
async fn other_channels_surface_storage_failures() {
    let app = TestApp::new();
    app.remote.set_offline(true);
    app.local.set_offline(true);

    let (status, body) = app
        .post_json("/api/receive?source=whatsapp", &json!({"content": "hi"}))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], json!("Failed to process message"));
    assert!(body["details"].as_str().unwrap().contains("all backends failed"));
    assert_eq!(app.events.len(), 1);
}

#[tokio::test]
async fn remote_outage_falls_back_to_local_cache() {
    let app = TestApp::new();
    app.remote.set_offline(true);

    let (status, body) = app
        .post_json("/api/receive?source=sms", &json!({"content": "offline"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], json!(-1));
    assert_eq!(app.local.get(-1).await.unwrap().unwrap().content, "offline");
}

#[tokio::test]
async fn status_route_reports_recent_deliveries() {
    let app = TestApp::new();
    let (status, body) = app.get_json("/api/receive").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "Message receiver API is working"}));

    app.post_form("/api/receive?source=whatsapp", "Body=first&From=a")
        .await;
    app.post_form("/api/receive?source=sms", "Body=second&From=b")
        .await;

    let (_, body) = app.get_json("/api/receive?showMessages=true").await;
    let events = body["webhookMessages"].as_array().unwrap();
    assert_eq!(events.len(), 2);
    assert_json_include!(
        actual: events[0].clone(),
        expected: json!({
            "content": "first",
            "source": "whatsapp",
            "metadata": {"from": "a"},
            "timestamp": "2024-06-01T10:00:00Z"
        })
    );
    assert_eq!(events[1]["content"], json!("second"));
}

#[tokio::test]
async fn event_log_keeps_the_latest_hundred() {
    let app = TestApp::new();
    for n in 0..120 {
        app.post_form("/api/receive?source=sms", &format!("Body=msg{n}"))
            .await;
    }
    let events = app.events.snapshot();
    assert_eq!(events.len(), 100);
    assert_eq!(events[0].content, "msg20");
    assert_eq!(events[99].content, "msg119");
}

#[tokio::test]
async fn oversized_bodies_are_refused() {
    let app = TestApp::new();
    let body = format!("Body={}", "a".repeat(MAX_BODY_SIZE + 1));
    let (status, _) = app
        .send(post(
            "/api/receive?source=sms",
            "application/x-www-form-urlencoded",
            body,
        ))
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

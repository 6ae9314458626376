use axum::extract::{Path, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde::Deserialize;
use tracing::{debug, error, instrument, warn, Span};

use crate::api::{IngestError, ReceiveResponse, StatusResponse, TelegramAck, WebhookStatus};
use crate::event_log::RawWebhookEvent;
use crate::message::{Message, Source};
use crate::normalize::{normalize, BodyKind};
use crate::prometheus::{
    report_persistence_failure, report_received, report_rejected, report_stored,
};
use crate::router;

pub const RECEIVED: &str = "Message received and processed successfully";
pub const WORKING: &str = "Message receiver API is working";
pub const TWIML_ACK: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
<Response><Message>Your message has been received and processed.</Message></Response>";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveQuery {
    pub source: Option<String>,
    pub show_messages: Option<String>,
}

/// Accepts one webhook delivery from any channel.
///
/// Telegram requires a bare `{"ok": true}` or it keeps redelivering, so once
/// its envelope decodes the delivery is acknowledged even if storing fails.
#[instrument(skip_all, fields(source, id))]
pub async fn receive(
    state: State<router::State>,
    Query(params): Query<ReceiveQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, IngestError> {
    let source = parse_source(params.source.as_deref().unwrap_or_default())?;

    let result = ingest(&state, source, &headers, &body).await;
    if source == Source::Telegram {
        return telegram_ack(result);
    }
    let stored = result?;
    Ok(Json(ReceiveResponse {
        success: true,
        id: stored.id,
        message: RECEIVED.to_string(),
    })
    .into_response())
}

/// Dedicated route per channel, as registered with the providers.
///
/// Twilio channels get a TwiML acknowledgment, Telegram the same bare ack as
/// [`receive`].
#[instrument(skip_all, fields(source, id))]
pub async fn webhook(
    state: State<router::State>,
    Path(channel): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, IngestError> {
    let source = parse_source(&channel)?;

    let result = ingest(&state, source, &headers, &body).await;
    if source == Source::Telegram {
        return telegram_ack(result);
    }
    result?;
    Ok(([(CONTENT_TYPE, "text/xml")], TWIML_ACK).into_response())
}

pub async fn webhook_status(
    Path(channel): Path<String>,
) -> Result<Json<WebhookStatus>, IngestError> {
    let label = match parse_source(&channel)? {
        Source::Telegram => "Telegram",
        Source::Whatsapp => "WhatsApp",
        Source::Sms => "SMS",
    };
    Ok(Json(WebhookStatus {
        status: format!("{label} webhook endpoint is active"),
    }))
}

fn parse_source(raw: &str) -> Result<Source, IngestError> {
    let source = raw.parse::<Source>().map_err(|_| {
        report_rejected(None, IngestError::InvalidSource.to_metric_tag());
        IngestError::InvalidSource
    })?;
    Span::current().record("source", source.as_str());
    Ok(source)
}

/// Telegram deliveries that decoded are acknowledged whatever happened to
/// the write.
fn telegram_ack(result: Result<Message, IngestError>) -> Result<Response, IngestError> {
    match result {
        Ok(_) | Err(IngestError::Persistence(_)) => {
            Ok(Json(TelegramAck { ok: true }).into_response())
        }
        Err(err) => Err(err),
    }
}

/// Normalize, log, classify and store one delivery.
async fn ingest(
    state: &router::State,
    source: Source,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Message, IngestError> {
    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let received_at = state.clock.now();

    let message = BodyKind::from_content_type(content_type)
        .and_then(|kind| normalize(source, kind, body, received_at))
        .map_err(|err| {
            warn!("rejected {} webhook: {}", source, err);
            report_rejected(Some(source), err.to_metric_tag());
            err
        })?;

    state.events.push(RawWebhookEvent {
        content: message.content.clone(),
        source,
        metadata: message.metadata.clone(),
        timestamp: received_at,
    });
    report_received(source);

    let processed = state.classifier.process(&message);
    debug!(
        message_type = %processed.stored_type(),
        category = processed.category.as_deref(),
        "classified message"
    );

    match state.store.create(&processed).await {
        Ok(stored) => {
            report_stored(source);
            if let Some(id) = stored.id {
                Span::current().record("id", id);
            }
            Ok(stored)
        }
        Err(err) => {
            error!("failed to store {} message: {}", source, err);
            report_persistence_failure(source, err.to_metric_tag());
            Err(IngestError::Persistence(err))
        }
    }
}

/// Health probe for webhook providers; optionally dumps the recent deliveries.
pub async fn status(
    state: State<router::State>,
    Query(params): Query<ReceiveQuery>,
) -> Json<StatusResponse> {
    let show = params
        .show_messages
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));

    Json(StatusResponse {
        message: WORKING.to_string(),
        webhook_messages: show.then(|| state.events.snapshot()),
    })
}

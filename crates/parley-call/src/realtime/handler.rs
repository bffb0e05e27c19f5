//! Outgoing frame builders and incoming frame classification.

use tracing::{debug, info, warn};

use super::types::{phoenix_topic, relay_topic, ChannelConfig, PhoenixMessage, RealtimeEvent};

fn frame(topic: String, event: &str, payload: serde_json::Value, msg_ref: String) -> PhoenixMessage {
    PhoenixMessage {
        topic,
        event: event.to_owned(),
        payload,
        msg_ref: Some(msg_ref),
    }
}

pub(crate) fn join_frame(
    topic: &str,
    config: ChannelConfig,
    access_token: Option<&str>,
    msg_ref: String,
) -> PhoenixMessage {
    frame(
        phoenix_topic(topic),
        "phx_join",
        config.to_join_payload(access_token),
        msg_ref,
    )
}

pub(crate) fn leave_frame(topic: &str, msg_ref: String) -> PhoenixMessage {
    frame(phoenix_topic(topic), "phx_leave", serde_json::json!({}), msg_ref)
}

pub(crate) fn broadcast_frame(
    topic: &str,
    event: &str,
    payload: serde_json::Value,
    msg_ref: String,
) -> PhoenixMessage {
    frame(
        phoenix_topic(topic),
        "broadcast",
        serde_json::json!({
            "type": "broadcast",
            "event": event,
            "payload": payload,
        }),
        msg_ref,
    )
}

pub(crate) fn heartbeat_frame(msg_ref: String) -> PhoenixMessage {
    frame("phoenix".to_owned(), "heartbeat", serde_json::json!({}), msg_ref)
}

/// Map an incoming frame to a client event. Heartbeat replies, presence
/// traffic and unknown events yield `None`.
pub(crate) fn classify(msg: &PhoenixMessage) -> Option<RealtimeEvent> {
    if msg.topic == "phoenix" {
        return None;
    }
    let topic = relay_topic(&msg.topic).to_owned();

    match msg.event.as_str() {
        "phx_reply" => {
            let status = msg.payload.get("status").and_then(|s| s.as_str())?;
            if status == "ok" {
                debug!(topic = %topic, "Channel reply: ok");
                Some(RealtimeEvent::ChannelJoined { topic })
            } else {
                let message = msg
                    .payload
                    .get("response")
                    .and_then(|r| r.get("reason"))
                    .and_then(|r| r.as_str())
                    .unwrap_or("unknown error")
                    .to_owned();
                warn!(topic = %topic, status, "Channel reply error");
                Some(RealtimeEvent::ChannelError { topic, message })
            }
        }
        "phx_error" => {
            warn!(topic = %topic, "Channel error");
            Some(RealtimeEvent::ChannelError {
                topic,
                message: "channel error".into(),
            })
        }
        "phx_close" => {
            info!(topic = %topic, "Channel closed");
            Some(RealtimeEvent::ChannelError {
                topic,
                message: "channel closed".into(),
            })
        }
        "broadcast" => {
            let event = msg.payload.get("event").and_then(|e| e.as_str())?.to_owned();
            let payload = msg
                .payload
                .get("payload")
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            debug!(topic = %topic, event = %event, "Broadcast received");
            Some(RealtimeEvent::Broadcast {
                topic,
                event,
                payload,
            })
        }
        other => {
            debug!(topic = %topic, event = %other, "Unhandled Phoenix event");
            None
        }
    }
}

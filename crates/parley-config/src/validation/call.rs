//! Validation for the `[call]` and `[signaling]` sections.

use crate::schema::ParleyConfig;

use super::helpers::{validate_range, validate_scheme};

/// Validate ICE server urls, timeouts, and queue bounds.
pub(crate) fn validate_call(errors: &mut Vec<String>, config: &ParleyConfig) {
    let call = &config.call;

    for url in &call.stun_servers {
        validate_scheme(errors, "call.stun_servers", url, &["stun:", "stuns:"]);
    }
    for (i, turn) in call.turn_servers.iter().enumerate() {
        if turn.urls.is_empty() {
            errors.push(format!("call.turn_servers[{i}].urls is empty"));
        }
        for url in &turn.urls {
            validate_scheme(
                errors,
                &format!("call.turn_servers[{i}].urls"),
                url,
                &["turn:", "turns:"],
            );
        }
        if turn.username.is_empty() || turn.credential.is_empty() {
            errors.push(format!(
                "call.turn_servers[{i}] requires both username and credential"
            ));
        }
    }

    validate_range(
        errors,
        "call.connect_timeout_ms",
        call.connect_timeout_ms,
        1_000,
        300_000,
    );
    validate_range(
        errors,
        "call.max_pending_candidates",
        call.max_pending_candidates as u64,
        1,
        1024,
    );
}

/// Validate relay heartbeat and backoff settings.
pub(crate) fn validate_signaling(errors: &mut Vec<String>, config: &ParleyConfig) {
    let signaling = &config.signaling;
    validate_range(
        errors,
        "signaling.heartbeat_interval_secs",
        signaling.heartbeat_interval_secs,
        5,
        60,
    );
    if signaling.reconnect_delay_secs > signaling.max_reconnect_delay_secs {
        errors.push(format!(
            "signaling.reconnect_delay_secs = {} exceeds max_reconnect_delay_secs = {}",
            signaling.reconnect_delay_secs, signaling.max_reconnect_delay_secs
        ));
    }
    if signaling.topic_prefix.is_empty() || signaling.topic_prefix.contains(':') {
        errors.push("signaling.topic_prefix must be non-empty and contain no ':'".into());
    }
}

//! Minimal Supabase Realtime client (Phoenix Channels v1 over WebSocket).
//!
//! Only what call signaling needs: channel join/leave, broadcast in both
//! directions, heartbeats, and reconnect with exponential backoff.

mod client;
mod connection;
mod handler;
mod types;

pub use client::RealtimeClient;
pub use types::{ChannelConfig, PhoenixMessage, RealtimeConfig, RealtimeEvent};

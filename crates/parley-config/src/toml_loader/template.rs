//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# Parley Configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[call]
# STUN servers are tried first, TURN relays after them.
# stun_servers = ["stun:stun.l.google.com:19302", "stun:stun1.l.google.com:19302"]
# ice_candidate_pool_size = 10   # 0-255
# bundle_policy = "max-bundle"    # balanced, max-compat, max-bundle
# rtcp_mux_policy = "require"     # negotiate, require
# connect_timeout_ms = 30000      # 1000-300000
# max_pending_candidates = 64     # 1-1024

# [[call.turn_servers]]
# urls = ["turn:relay.example.com:3478"]
# username = "user"
# credential = "secret"

[media.audio]
# echo_cancellation = true
# noise_suppression = true
# auto_gain_control = true
# channel_count = 1              # 1-2
# sample_rate = 48000            # 8000-96000

[media.camera]
# ideal_width = 1280
# ideal_height = 720
# max_width = 1920
# max_height = 1080
# ideal_frame_rate = 30
# max_frame_rate = 60            # 1-120
# facing_mode = "user"           # user, environment

[media.screen]
# show_cursor = true
# ideal_width = 1920
# ideal_height = 1080
# ideal_frame_rate = 30
# max_frame_rate = 60
# system_audio = true

[signaling]
# project_ref = ""               # Supabase project reference
# api_key = ""                   # Supabase anon key
# heartbeat_interval_secs = 25
# reconnect_delay_secs = 1
# max_reconnect_delay_secs = 30
# topic_prefix = "call"

[logging]
# level = "info"                 # trace, debug, info, warn, error
"##
    .to_string()
}

use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub relay: RelayConfig,
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = RelayConfig::default();
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parse("PORT").unwrap_or(8765),
            relay: RelayConfig {
                grace_window: env_parse("GRACE_WINDOW_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.grace_window),
                retention: env_parse("RETENTION_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.retention),
                duplicate_policy: env_parse("DUPLICATE_POLICY").unwrap_or(defaults.duplicate_policy),
                broadcast_viewer_counts: env_flag("BROADCAST_VIEWER_COUNTS")
                    .unwrap_or(defaults.broadcast_viewer_counts),
                auto_end_finished_games: env_flag("AUTO_END_FINISHED_GAMES")
                    .unwrap_or(defaults.auto_end_finished_games),
            },
        }
    }
}

/// Tunables of the live-game relay.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// How long a session survives its broadcaster dropping off.
    pub grace_window: Duration,
    /// How long an ended session stays queryable before it is dropped.
    pub retention: Duration,
    pub duplicate_policy: DuplicatePolicy,
    /// Push `viewer_count` events whenever a spectator joins or leaves.
    pub broadcast_viewer_counts: bool,
    /// End a session as soon as the board reaches mate, stalemate or a draw.
    pub auto_end_finished_games: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            grace_window: Duration::from_secs(15),
            retention: Duration::from_secs(600),
            duplicate_policy: DuplicatePolicy::Reject,
            broadcast_viewer_counts: true,
            auto_end_finished_games: true,
        }
    }
}

/// What happens when a broadcaster starts a game whose id already has a live
/// broadcaster.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DuplicatePolicy {
    Reject,
    Takeover,
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(DuplicatePolicy::Reject),
            "takeover" => Ok(DuplicatePolicy::Takeover),
            other => Err(format!("unknown duplicate policy '{other}'")),
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    let parsed = raw.trim().parse().ok();
    if parsed.is_none() {
        tracing::warn!("Ignoring {key}={raw:?}; using the default");
    }
    parsed
}

fn env_flag(key: &str) -> Option<bool> {
    let raw = env::var(key).ok()?;
    let parsed = parse_flag(&raw);
    if parsed.is_none() {
        tracing::warn!("Ignoring {key}={raw:?}; expected true/false, yes/no, on/off or 1/0");
    }
    parsed
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

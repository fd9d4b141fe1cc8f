//! Command line configuration
//!
//! Bind address, broadcast write guard, and the fixed seed set of rooms and
//! users the relay starts with.

use std::str::FromStr;
use std::time::Duration;

use clap::Parser;

use crate::error::AppError;
use crate::user::User;

/// Default per-write timeout for broadcast fan-out
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 5000;

/// Default per-connection outbound queue depth
pub const DEFAULT_OUTBOUND_BUFFER: usize = 32;

#[derive(Parser, Debug, Clone)]
#[command(name = "chat_relay")]
#[command(about = "Multi-room WebSocket chat relay", long_about = None)]
pub struct Config {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value_t = 3001)]
    pub port: u16,

    /// Maximum time a single broadcast write may wait on a slow client
    #[arg(long, default_value_t = DEFAULT_WRITE_TIMEOUT_MS)]
    pub write_timeout_ms: u64,

    /// Number of frames queued per connection before writes start waiting
    #[arg(long, default_value_t = DEFAULT_OUTBOUND_BUFFER)]
    pub outbound_buffer: usize,

    /// Room to create at startup (repeatable)
    #[arg(long = "room", value_name = "NAME", default_values_t = [
        "Public".to_string(),
        "Private Channel".to_string(),
    ])]
    pub rooms: Vec<String>,

    /// User to register at startup, as ID:DISPLAY NAME (repeatable)
    #[arg(long = "user", value_name = "ID:DISPLAY NAME", default_values_t = [
        UserSeed::new("JohnCena", "Johnathan Cena"),
    ])]
    pub users: Vec<UserSeed>,

    /// Reject messages from users who have not joined the target room
    #[arg(long)]
    pub require_membership: bool,
}

impl Config {
    /// Address to bind, e.g. `127.0.0.1:3001`
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Runtime settings shared with every connection
    pub fn settings(&self) -> RelaySettings {
        RelaySettings {
            write_timeout: Duration::from_millis(self.write_timeout_ms),
            outbound_buffer: self.outbound_buffer,
            require_membership: self.require_membership,
        }
    }
}

/// Settings the relay consults at runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelaySettings {
    pub write_timeout: Duration,
    pub outbound_buffer: usize,
    pub require_membership: bool,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            write_timeout: Duration::from_millis(DEFAULT_WRITE_TIMEOUT_MS),
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            require_membership: false,
        }
    }
}

/// A user seed parsed from `ID:DISPLAY NAME`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSeed {
    pub id: String,
    pub display_name: String,
}

impl UserSeed {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

impl FromStr for UserSeed {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, display_name) = s
            .split_once(':')
            .ok_or_else(|| AppError::InvalidUserSeed(s.to_string()))?;
        let (id, display_name) = (id.trim(), display_name.trim());
        if id.is_empty() || display_name.is_empty() {
            return Err(AppError::InvalidUserSeed(s.to_string()));
        }
        Ok(Self::new(id, display_name))
    }
}

impl std::fmt::Display for UserSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.id, self.display_name)
    }
}

impl From<UserSeed> for User {
    fn from(seed: UserSeed) -> Self {
        User::new(seed.id, seed.display_name)
    }
}

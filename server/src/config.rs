//! Server configuration.

use crate::error::ConfigError;
use std::net::SocketAddr;
use std::time::Duration;

/// Standard chess starting position, in the opaque board format the engine
/// understands.
pub const DEFAULT_INITIAL_POSITION: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the websocket listener binds to.
    pub listen_addr: SocketAddr,
    /// Engine executable, spawned once per game.
    pub engine_command: String,
    pub engine_args: Vec<String>,
    /// Board string sent with the `init` request.
    pub initial_position: String,
    /// Deadline for each engine reply line. Expiry counts as process
    /// unresponsiveness. Default: 5s.
    pub engine_reply_timeout: Duration,
    /// How long a terminated engine gets to exit after the sentinel before
    /// it is killed. Default: 2s.
    pub engine_shutdown_grace: Duration,
    /// Deadline for the client handshake message on a fresh connection.
    pub handshake_timeout: Duration,
    /// Window during which a disconnected player may reconnect and resume.
    /// Expiry forfeits the game. Default: 60s.
    pub reconnect_grace: Duration,
    /// How long a finished session stays in the directory for late
    /// reconnects and result display.
    pub session_retention: Duration,
    /// Sessions with no activity for this long are abandoned. Default: 30min.
    pub session_idle_timeout: Duration,
    /// Matchmaking entries older than this are dropped. Default: 5min.
    pub queue_stale_after: Duration,
    /// Interval of the background sweep task.
    pub sweep_interval: Duration,
    /// Minimum spacing between inbound messages per connection.
    pub min_message_interval: Duration,
    /// Inbound messages larger than this are rejected before parsing.
    pub max_message_bytes: usize,
    /// Move strings longer than this never reach the engine.
    pub max_move_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            engine_command: "chess-engine".to_string(),
            engine_args: vec!["--cli".to_string()],
            initial_position: DEFAULT_INITIAL_POSITION.to_string(),
            engine_reply_timeout: Duration::from_secs(5),
            engine_shutdown_grace: Duration::from_secs(2),
            handshake_timeout: Duration::from_secs(10),
            reconnect_grace: Duration::from_secs(60),
            session_retention: Duration::from_secs(120),
            session_idle_timeout: Duration::from_secs(1800),
            queue_stale_after: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(5),
            min_message_interval: Duration::from_millis(100),
            max_message_bytes: 10_000,
            max_move_len: 20,
        }
    }
}

impl ServerConfig {
    /// Default configuration with environment overrides applied.
    ///
    /// `GAME_ENGINE_CMD` replaces the engine command line (whitespace-split,
    /// first token is the executable) and `GAME_LISTEN_ADDR` the listen
    /// address.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(cmd) = std::env::var("GAME_ENGINE_CMD") {
            let mut parts = cmd.split_whitespace().map(str::to_string);
            config.engine_command = parts
                .next()
                .ok_or_else(|| ConfigError("GAME_ENGINE_CMD is empty".to_string()))?;
            config.engine_args = parts.collect();
        }

        if let Ok(addr) = std::env::var("GAME_LISTEN_ADDR") {
            config.listen_addr = addr
                .parse()
                .map_err(|e| ConfigError(format!("GAME_LISTEN_ADDR: {e}")))?;
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine_command.is_empty() {
            return Err(ConfigError("engine_command must not be empty".to_string()));
        }
        if self.initial_position.is_empty() {
            return Err(ConfigError(
                "initial_position must not be empty".to_string(),
            ));
        }
        if self.engine_reply_timeout.is_zero() {
            return Err(ConfigError(
                "engine_reply_timeout must be > 0".to_string(),
            ));
        }
        if self.reconnect_grace.is_zero() {
            return Err(ConfigError("reconnect_grace must be > 0".to_string()));
        }
        if self.sweep_interval.is_zero() {
            return Err(ConfigError("sweep_interval must be > 0".to_string()));
        }
        if self.max_message_bytes == 0 {
            return Err(ConfigError("max_message_bytes must be >= 1".to_string()));
        }
        if self.max_move_len == 0 {
            return Err(ConfigError("max_move_len must be >= 1".to_string()));
        }
        Ok(())
    }
}

//! One spawned game-logic process per active game.
//!
//! The instance owns the child process and its pipes, and drives the strict
//! request/reply cycle: each call writes exactly one line and reads exactly
//! one line back. `&mut self` on every protocol method means there is never
//! more than one outstanding request per process.

pub mod protocol;

use crate::config::ServerConfig;
use crate::error::EngineError;
use protocol::{EngineReply, EngineRequest, TERMINATE_SENTINEL};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;
use tracing::{debug, warn};

#[derive(Debug)]
pub struct EngineInstance {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    reply_timeout: Duration,
    shutdown_grace: Duration,
}

impl EngineInstance {
    /// Spawn the engine process and run the `init` exchange for the given
    /// starting position. Returns the instance together with the first
    /// reply (initial board and legal moves).
    pub async fn start(config: &ServerConfig) -> Result<(Self, EngineReply), EngineError> {
        let mut child = Command::new(&config.engine_command)
            .args(&config.engine_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Start(format!("spawn failed: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Start("engine stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Start("engine stdout unavailable".to_string()))?;

        let mut engine = Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            reply_timeout: config.engine_reply_timeout,
            shutdown_grace: config.engine_shutdown_grace,
        };

        let reply = engine
            .round_trip(&EngineRequest::init(&config.initial_position))
            .await
            .map_err(|e| EngineError::Start(e.to_string()))?;
        if reply.is_error() {
            return Err(EngineError::Start(reply.error));
        }
        Ok((engine, reply))
    }

    /// Submit one move for adjudication. The session suspends on this; a
    /// missed deadline is reported as unresponsiveness and the caller ends
    /// the game.
    pub async fn submit_move(&mut self, board: &str, mv: &str) -> Result<EngineReply, EngineError> {
        self.round_trip(&EngineRequest::make_move(board, mv)).await
    }

    async fn round_trip(&mut self, request: &EngineRequest<'_>) -> Result<EngineReply, EngineError> {
        let line = request.encode()?;
        debug!(request = %line, "engine request");
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        self.read_reply().await
    }

    async fn read_reply(&mut self) -> Result<EngineReply, EngineError> {
        // read_line buffers partial input; nothing is interpreted until a
        // full line has arrived.
        let mut line = String::new();
        let read = timeout(self.reply_timeout, self.reader.read_line(&mut line))
            .await
            .map_err(|_| EngineError::Unresponsive(self.reply_timeout))??;
        if read == 0 {
            return Err(EngineError::Closed);
        }
        debug!(reply = %line.trim(), "engine reply");
        EngineReply::decode(&line)
    }

    /// Ask the process to exit, then make sure it does. Consumes the
    /// instance, so a session can only terminate its engine once.
    pub async fn terminate(mut self) {
        if self.stdin.write_all(TERMINATE_SENTINEL.as_bytes()).await.is_ok()
            && self.stdin.write_all(b"\n").await.is_ok()
        {
            let _ = self.stdin.flush().await;
        }
        drop(self.stdin);

        match timeout(self.shutdown_grace, self.child.wait()).await {
            Ok(Ok(status)) => debug!(?status, "engine exited"),
            Ok(Err(e)) => warn!(error = %e, "waiting on engine failed"),
            Err(_) => {
                warn!("engine ignored terminate sentinel, killing");
                let _ = self.child.start_kill();
                let _ = self.child.wait().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INIT_REPLY: &str = r#"{"error":"","winner":"","board":"INIT","next_player":"player1","legal_next_moves":["e2-e4","d2-d4"]}"#;
    const MOVE_REPLY: &str = r#"{"error":"","winner":"","board":"AFTER","next_player":"player2","legal_next_moves":["e7-e5"]}"#;

    /// Engine stub: a shell one-liner speaking canned protocol lines.
    fn stub_config(script: &str) -> ServerConfig {
        ServerConfig {
            engine_command: "sh".to_string(),
            engine_args: vec!["-c".to_string(), script.to_string()],
            engine_reply_timeout: Duration::from_millis(500),
            engine_shutdown_grace: Duration::from_millis(200),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn start_and_move_round_trip() {
        let script = format!(
            "read -r _; echo '{INIT_REPLY}'; while read -r _; do echo '{MOVE_REPLY}'; done"
        );
        let config = stub_config(&script);
        let (mut engine, init) = EngineInstance::start(&config).await.unwrap();
        assert_eq!(init.board, "INIT");
        assert_eq!(init.legal_next_moves.len(), 2);

        let reply = engine.submit_move("INIT", "e2-e4").await.unwrap();
        assert_eq!(reply.board, "AFTER");
        assert_eq!(reply.next_side().unwrap(), shared::Side::Black);

        engine.terminate().await;
    }

    #[tokio::test]
    async fn start_fails_when_process_exits_early() {
        let config = stub_config("exit 0");
        let err = EngineInstance::start(&config).await.unwrap_err();
        assert!(matches!(err, EngineError::Start(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn start_fails_on_non_json_banner() {
        let config = stub_config("read -r _; echo 'hello world'; sleep 2");
        let err = EngineInstance::start(&config).await.unwrap_err();
        assert!(matches!(err, EngineError::Start(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn start_fails_when_init_is_rejected() {
        let config =
            stub_config(r#"read -r _; echo '{"error":"bad position"}'; sleep 2"#);
        let err = EngineInstance::start(&config).await.unwrap_err();
        match err {
            EngineError::Start(msg) => assert!(msg.contains("bad position"), "got: {msg}"),
            other => panic!("expected Start, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn silent_engine_is_unresponsive() {
        let script = format!("read -r _; echo '{INIT_REPLY}'; sleep 10");
        let config = stub_config(&script);
        let (mut engine, _) = EngineInstance::start(&config).await.unwrap();
        let err = engine.submit_move("INIT", "e2-e4").await.unwrap_err();
        assert!(matches!(err, EngineError::Unresponsive(_)), "got: {err:?}");
        engine.terminate().await;
    }

    #[tokio::test]
    async fn dead_engine_reports_closed_stream() {
        let script = format!("read -r _; echo '{INIT_REPLY}'; read -r _; exit 0");
        let config = stub_config(&script);
        let (mut engine, _) = EngineInstance::start(&config).await.unwrap();
        let err = engine.submit_move("INIT", "e2-e4").await.unwrap_err();
        assert!(matches!(err, EngineError::Closed), "got: {err:?}");
        engine.terminate().await;
    }

    #[tokio::test]
    async fn terminate_kills_a_stuck_process() {
        let script = format!("read -r _; echo '{INIT_REPLY}'; exec sleep 60");
        let config = stub_config(&script);
        let (engine, _) = EngineInstance::start(&config).await.unwrap();
        let started = std::time::Instant::now();
        engine.terminate().await;
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}

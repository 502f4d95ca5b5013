use anyhow::{Context, Result};
use common::{Command, Mode, Response, StandError};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{Mutex, mpsc};

use crate::{ControlCommand, DaemonState};

pub async fn start(
    state: Arc<Mutex<DaemonState>>,
    control_tx: mpsc::UnboundedSender<ControlCommand>,
) -> Result<()> {
    let socket_path = common::get_socket_path();

    // Remove old socket if it exists
    if socket_path.exists() {
        std::fs::remove_file(&socket_path)
            .with_context(|| format!("Failed to remove stale socket {}", socket_path.display()))?;
    }

    let listener = UnixListener::bind(&socket_path)
        .with_context(|| format!("Failed to bind {}", socket_path.display()))?;
    log::info!("IPC server listening on: {}", socket_path.display());

    loop {
        // Check if we should exit
        if state.lock().await.should_exit {
            break;
        }

        // Accept connections with timeout
        let accept_result =
            tokio::time::timeout(std::time::Duration::from_millis(100), listener.accept()).await;

        match accept_result {
            Ok(Ok((stream, _addr))) => {
                let state = state.clone();
                let tx = control_tx.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, state, tx).await {
                        log::error!("Error handling client: {}", e);
                    }
                });
            }
            Ok(Err(e)) => {
                log::error!("Error accepting connection: {}", e);
            }
            Err(_) => {
                // Timeout, continue loop to check exit condition
                continue;
            }
        }
    }

    // Clean up socket
    let _ = std::fs::remove_file(&socket_path);
    log::info!("IPC server stopped");
    Ok(())
}

async fn handle_client(
    stream: UnixStream,
    state: Arc<Mutex<DaemonState>>,
    control_tx: mpsc::UnboundedSender<ControlCommand>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let response = match serde_json::from_str::<Command>(&line) {
            Ok(command) => handle_command(command, &state, &control_tx).await,
            Err(e) => {
                log::warn!("Invalid command: {}", e);
                Response::Error(StandError::Ipc(format!("Invalid command: {}", e)))
            }
        };

        // Send response
        let response_json = serde_json::to_string(&response)?;
        writer.write_all(response_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;

        line.clear();
    }

    Ok(())
}

async fn handle_command(
    command: Command,
    state: &Arc<Mutex<DaemonState>>,
    control_tx: &mpsc::UnboundedSender<ControlCommand>,
) -> Response {
    log::debug!("Handling command: {:?}", command);

    let control = match command {
        Command::Ping => return Response::Pong,

        Command::Status => {
            let state = state.lock().await;
            return match state.status.clone() {
                Some(mut status) => {
                    status.uptime_secs = state.uptime_secs();
                    Response::Status(status)
                }
                None => Response::Error(StandError::Ipc(
                    "Status not yet available".to_string(),
                )),
            };
        }

        Command::SetPlaylist { paths } => {
            let paths: Vec<PathBuf> = paths
                .iter()
                .map(|p| PathBuf::from(shellexpand::tilde(p).as_ref()))
                .collect();

            let missing = paths.iter().filter(|p| !p.is_file()).count();
            if !paths.is_empty() && missing == paths.len() {
                return Response::Error(StandError::NotFound(format!(
                    "None of the {} clips exist",
                    paths.len()
                )));
            }
            if missing > 0 {
                log::warn!("Playlist contains {} missing clips", missing);
            }

            log::info!("Setting playlist: {} clips", paths.len());
            ControlCommand::SetPlaylist(paths)
        }

        Command::Rescan => ControlCommand::Rescan,

        Command::SetMode { is_day, calendar } => {
            log::info!("Setting mode: {}", Mode { is_day, calendar });
            ControlCommand::SetMode(Mode { is_day, calendar })
        }

        Command::AutoMode => ControlCommand::AutoMode,
        Command::Pause => ControlCommand::Pause,
        Command::Resume => ControlCommand::Resume,

        Command::Kill => {
            log::info!("Received kill command");
            ControlCommand::Shutdown
        }
    };

    if let Err(e) = control_tx.send(control) {
        return Response::Error(StandError::Ipc(format!(
            "Failed to send command to control loop: {}",
            e
        )));
    }

    Response::Ok
}

use anyhow::Result;
use clap::{Parser, Subcommand};
use common::{CalendarMode, Command, DisplayStatus, Response};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

#[derive(Parser)]
#[command(name = "standctl")]
#[command(about = "Standclock Video Display Control", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace the clip catalog with the given files
    Playlist {
        /// Video files (mov, mp4, 3gp, mkv); none clears the catalog
        paths: Vec<String>,
    },

    /// Re-scan the configured library sources
    Rescan,

    /// Set day/night and calendar mode (turns the automatic feed off)
    Mode {
        /// Night mode instead of day
        #[arg(short, long)]
        night: bool,

        /// Calendar period (neutral, halloween, christmas)
        #[arg(short, long, default_value = "neutral", value_parser = parse_calendar)]
        calendar: CalendarMode,
    },

    /// Hand mode control back to the automatic feed
    Auto,

    /// Pause playback
    Pause,

    /// Resume playback
    Resume,

    /// Query display status
    Status,

    /// Ping the daemon to check if it's running
    Ping,

    /// Kill the running daemon
    Kill,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let command = match cli.command {
        Commands::Playlist { paths } => Command::SetPlaylist {
            paths: paths.iter().map(|p| absolute_path(p)).collect(),
        },
        Commands::Rescan => Command::Rescan,
        Commands::Mode { night, calendar } => Command::SetMode {
            is_day: !night,
            calendar,
        },
        Commands::Auto => Command::AutoMode,
        Commands::Pause => Command::Pause,
        Commands::Resume => Command::Resume,
        Commands::Status => Command::Status,
        Commands::Ping => Command::Ping,
        Commands::Kill => Command::Kill,
    };

    match send_command(command).await {
        Ok(response) => {
            handle_response(response);
            Ok(())
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("\nIs the daemon running? Try starting it with: standclockd");
            std::process::exit(1);
        }
    }
}

fn parse_calendar(s: &str) -> Result<CalendarMode, String> {
    CalendarMode::parse(s)
        .ok_or_else(|| format!("unknown calendar mode '{}' (neutral, halloween, christmas)", s))
}

/// The daemon runs elsewhere; send absolute paths
fn absolute_path(path: &str) -> String {
    std::fs::canonicalize(Path::new(path))
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| path.to_string())
}

async fn send_command(command: Command) -> Result<Response> {
    let socket_path = common::get_socket_path();

    let stream = UnixStream::connect(&socket_path).await?;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    // Send command
    let command_json = serde_json::to_string(&command)?;
    writer.write_all(command_json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;

    // Read response
    let mut response_line = String::new();
    reader.read_line(&mut response_line).await?;

    let response: Response = serde_json::from_str(&response_line)?;
    Ok(response)
}

fn handle_response(response: Response) {
    match response {
        Response::Ok => {
            println!("✓ Success");
        }
        Response::Error(e) => {
            eprintln!("✗ Error: {}", e);
            std::process::exit(1);
        }
        Response::Status(status) => print_status(&status),
        Response::Pong => {
            println!("✓ Daemon is running");
        }
    }
}

fn print_status(status: &DisplayStatus) {
    println!("Daemon Status:");
    println!("  Version: {}", status.version);
    println!("  Uptime: {}s", status.uptime_secs);
    println!(
        "  Mode: {} ({})",
        status.mode,
        if status.auto_mode { "auto" } else { "manual" }
    );
    println!(
        "  Phase: {}{}",
        status.phase,
        if status.paused { " (paused)" } else { "" }
    );
    println!("  Catalog: {} clips", status.catalog_size);

    if let Some(color) = status.backdrop {
        println!("  Backdrop: {:?}", color);
    }
    if let Some(current) = &status.current {
        match status.remaining_ms {
            Some(ms) => println!("  Current: {} ({:.1}s left)", current, ms as f64 / 1000.0),
            None => println!("  Current: {}", current),
        }
    }
    if let Some(standby) = &status.standby {
        println!("  Standby: {}", standby);
    }
    println!(
        "  Opacity: A {:.2}, B {:.2}",
        status.opacity[0], status.opacity[1]
    );
}

//! Command-line utility for managing a running pixelpost instance
//!
//! Everything goes through the control socket:
//! - Queue inspection, retry, delete and forced dispatch
//! - Dead-letter inspection, requeue and delete
//! - System status, health and the recent activity log

use std::time::Duration;

use clap::{Parser, Subcommand};
use pixelpost_control::{
    ControlClient, DEFAULT_CONTROL_SOCKET, DeadLetterCommand, QueueCommand, RequestCommand,
    ResponseData, ResponsePayload, SystemCommand,
};

/// Command-line utility for managing pixelpost
#[derive(Parser, Debug)]
#[command(name = "pixelpostctl")]
#[command(about = "Manage a running pixelpost instance", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the control socket
    #[arg(short = 'c', long, default_value = DEFAULT_CONTROL_SOCKET)]
    control_socket: String,

    /// Token for a control socket with authentication enabled
    #[arg(short, long, env = "PIXELPOST_CONTROL_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Seconds to wait for a response
    #[arg(long, default_value = "60")]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Events waiting for delivery
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },
    /// Events that exhausted their retries
    Deadletter {
        #[command(subcommand)]
        action: DeadLetterAction,
    },
    /// System status and health
    System {
        #[command(subcommand)]
        action: SystemAction,
    },
}

#[derive(Subcommand, Debug)]
enum QueueAction {
    /// List queued events, newest first
    List {
        #[arg(long, default_value = "20")]
        limit: usize,
        #[arg(long, default_value = "0")]
        offset: usize,
    },
    /// Make an event eligible now with a fresh retry budget
    Retry { id: i64 },
    /// Remove an event from the queue
    Delete { id: i64 },
    /// Show queue and dead-letter counts
    Status,
    /// Run a dispatch pass immediately
    Process {
        /// Rows to read; defaults to the server's manual limit
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(Subcommand, Debug)]
enum DeadLetterAction {
    /// List dead-lettered events, newest first
    List {
        #[arg(long, default_value = "20")]
        limit: usize,
        #[arg(long, default_value = "0")]
        offset: usize,
    },
    /// Move an event back into the queue
    Retry { id: i64 },
    /// Discard a dead-lettered event
    Delete { id: i64 },
}

#[derive(Subcommand, Debug)]
enum SystemAction {
    /// Check if pixelpost is responding
    Ping,
    /// Get system status
    Status,
    /// Show the recent activity log
    Logs {
        #[arg(long, default_value = "50")]
        limit: usize,
    },
}

impl Commands {
    fn into_request(self) -> RequestCommand {
        match self {
            Self::Queue { action } => RequestCommand::Queue(match action {
                QueueAction::List { limit, offset } => QueueCommand::List { limit, offset },
                QueueAction::Retry { id } => QueueCommand::Retry { id },
                QueueAction::Delete { id } => QueueCommand::Delete { id },
                QueueAction::Status => QueueCommand::Status,
                QueueAction::Process { limit } => QueueCommand::ProcessNow { limit },
            }),
            Self::Deadletter { action } => RequestCommand::DeadLetter(match action {
                DeadLetterAction::List { limit, offset } => DeadLetterCommand::List { limit, offset },
                DeadLetterAction::Retry { id } => DeadLetterCommand::Retry { id },
                DeadLetterAction::Delete { id } => DeadLetterCommand::Delete { id },
            }),
            Self::System { action } => RequestCommand::System(match action {
                SystemAction::Ping => SystemCommand::Ping,
                SystemAction::Status => SystemCommand::Status,
                SystemAction::Logs { limit } => SystemCommand::Logs { limit },
            }),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let mut client =
        ControlClient::new(&cli.control_socket).with_timeout(Duration::from_secs(cli.timeout));
    if let Some(token) = cli.token {
        client = client.with_token(token);
    }

    client.check_socket_exists().map_err(|e| {
        anyhow::anyhow!("{e}\nIs pixelpost running? Is the socket path correct?")
    })?;

    let command = cli.command.into_request();
    let response = client.send(command.clone()).await?;

    match response.payload {
        ResponsePayload::Ok => {
            if matches!(command, RequestCommand::System(SystemCommand::Ping)) {
                println!("✓ pixelpost is responding");
            } else {
                println!("✓ Command completed successfully");
            }
        }
        ResponsePayload::Data(data) => print_data(&command, *data),
        ResponsePayload::Error(message) => anyhow::bail!("Server error: {message}"),
    }

    Ok(())
}

fn print_data(command: &RequestCommand, data: ResponseData) {
    match data {
        ResponseData::QueueList(rows) => {
            if rows.is_empty() {
                println!("Queue is empty");
                return;
            }
            println!("=== Queue ({} shown) ===\n", rows.len());
            for row in rows {
                println!("{row}");
            }
        }
        ResponseData::DeadLetterList(rows) => {
            if rows.is_empty() {
                println!("Dead-letter queue is empty");
                return;
            }
            println!("=== Dead letters ({} shown) ===\n", rows.len());
            for row in rows {
                println!("{row}");
            }
        }
        ResponseData::QueueStatus(summary) => {
            println!("=== Queue Status ===\n");
            print!("{summary}");
        }
        ResponseData::SystemStatus(status) => {
            println!("=== pixelpost Status ===\n");
            print!("{status}");
        }
        ResponseData::Logs(entries) => {
            if entries.is_empty() {
                println!("No activity recorded");
            }
            for entry in entries {
                println!("{entry}");
            }
        }
        ResponseData::Processed(count) => println!("✓ Processed {count} event(s)"),
        ResponseData::Requeued(Some(id)) => println!("✓ Requeued as item {id}"),
        ResponseData::Requeued(None) => println!("Nothing to requeue: no such dead letter"),
        ResponseData::Changed(true) => println!("✓ {}", describe(command)),
        ResponseData::Changed(false) => println!("Nothing changed: no such item"),
        ResponseData::Message(message) => println!("{message}"),
    }
}

fn describe(command: &RequestCommand) -> String {
    match command {
        RequestCommand::Queue(QueueCommand::Retry { id }) => format!("Item {id} marked for retry"),
        RequestCommand::Queue(QueueCommand::Delete { id }) => format!("Item {id} deleted"),
        RequestCommand::DeadLetter(DeadLetterCommand::Delete { id }) => {
            format!("Dead letter {id} deleted")
        }
        _ => "Command completed successfully".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn process_without_limit_defers_to_server() {
        let cli = Cli::parse_from(["pixelpostctl", "queue", "process"]);
        assert_eq!(
            cli.command.into_request(),
            RequestCommand::Queue(QueueCommand::ProcessNow { limit: None })
        );
    }

    #[test]
    fn deadletter_retry_parses_id() {
        let cli = Cli::parse_from(["pixelpostctl", "-c", "/run/pp.sock", "deadletter", "retry", "7"]);
        assert_eq!(cli.control_socket, "/run/pp.sock");
        assert_eq!(
            cli.command.into_request(),
            RequestCommand::DeadLetter(DeadLetterCommand::Retry { id: 7 })
        );
    }
}

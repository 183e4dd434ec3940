//! Chat Client - Entry Point
//!
//! Reads commands from stdin and prints whatever the server pushes, until
//! `/quit`, end of input, or loss of the server connection.

use std::io::Write;
use std::process::ExitCode;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::error;
use tracing_subscriber::EnvFilter;

use textchat::{ClientDriver, Command, Notice, Reply};

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so they do not interleave with chat output
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("textchat=warn")),
        )
        .init();

    println!("Client started. Type /login to begin.");

    let mut driver = ClientDriver::new();
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    loop {
        prompt();

        tokio::select! {
            line = input.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => return ExitCode::SUCCESS,
                    Err(e) => {
                        error!("Failed to read input: {}", e);
                        return ExitCode::FAILURE;
                    }
                };

                let command = match Command::parse(&line) {
                    Ok(Some(command)) => command,
                    Ok(None) => continue,
                    Err(usage) => {
                        println!("{}", usage);
                        continue;
                    }
                };

                match driver.execute(command).await {
                    Reply::Sent => {}
                    Reply::Local(text) => println!("{}", text),
                    Reply::Exit => {
                        println!("Exiting...");
                        return ExitCode::SUCCESS;
                    }
                }
            }
            Some(notice) = driver.next_notice() => {
                if notice == Notice::ConnectionLost {
                    println!("\n{}", notice);
                    return ExitCode::FAILURE;
                }
                println!("{}", notice);
            }
        }
    }
}

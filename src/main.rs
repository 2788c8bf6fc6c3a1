//! Parley chat server and client
//!
//! Usage:
//!   parley server [--port 8080] [--data-dir DIR]   # run the chat server
//!   parley register <user> <pass> [--data-dir DIR] # create an account
//!   parley client [--addr 127.0.0.1:8080]          # interactive chat client

use std::env;
use std::path::PathBuf;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::error;

use parley::server::state::ServerState;
use parley::{ChatClient, ChatClientConfig, ChatServer, ClientEvent, ServerConfig};
use parley::protocol::ServerFrame;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return Ok(());
    }

    match args[1].as_str() {
        "server" => run_server(&args).await?,
        "register" => run_register(&args).await?,
        "client" => run_client(&args).await?,
        "help" | "--help" | "-h" => print_usage(),
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            print_usage();
        }
    }

    Ok(())
}

fn print_usage() {
    println!("Parley - Room Chat Server with Durable History");
    println!();
    println!("USAGE:");
    println!("    parley server [OPTIONS]              Start the chat server");
    println!("    parley register <USER> <PASS> [OPTIONS]");
    println!("                                         Register an account");
    println!("    parley client [OPTIONS]              Start the interactive client");
    println!("    parley help                          Show this help message");
    println!();
    println!("OPTIONS:");
    println!("    --port <PORT>        Server port to listen on (default: 8080)");
    println!("    --data-dir <DIR>     Snapshot directory (default: current dir)");
    println!("    --addr <ADDR>        Server address for the client (default: 127.0.0.1:8080)");
    println!();
    println!("CLIENT COMMANDS:");
    println!("    /create <room>               Create a room and join it");
    println!("    /join <room>                 Join a room");
    println!("    /leave <room>                Leave a room");
    println!("    /msg <room> <text>           Send a message to a room");
    println!("    /dm <user> <text>            Send a direct message");
    println!("    /quit                        Disconnect and exit");
}

fn parse_flag<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|arg| arg == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn server_config(args: &[String]) -> anyhow::Result<ServerConfig> {
    let mut config = ServerConfig::default();

    if let Some(port) = parse_flag(args, "--port") {
        let port: u16 = port.parse().context("Invalid --port value")?;
        config.bind_addr.set_port(port);
    }
    if let Some(dir) = parse_flag(args, "--data-dir") {
        config.data_dir = PathBuf::from(dir);
    }

    Ok(config)
}

async fn run_server(args: &[String]) -> anyhow::Result<()> {
    let config = server_config(args)?;
    let mut server = ChatServer::load(config)
        .await
        .context("Failed to load server state")?;
    server.start().await.context("Server error")?;
    Ok(())
}

async fn run_register(args: &[String]) -> anyhow::Result<()> {
    let (username, password) = match (args.get(2), args.get(3)) {
        (Some(username), Some(password)) if !username.starts_with("--") => {
            (username.clone(), password.clone())
        }
        _ => {
            eprintln!("Usage: parley register <USER> <PASS> [--data-dir DIR]");
            return Ok(());
        }
    };

    let config = server_config(args)?;
    let state = ServerState::load(config)
        .await
        .context("Failed to open snapshot store")?;
    state
        .register_user(&username, &password)
        .await
        .context("Registration failed")?;

    println!("Registration successful, please login.");
    Ok(())
}

async fn run_client(args: &[String]) -> anyhow::Result<()> {
    let mut config = ChatClientConfig::default();
    if let Some(addr) = parse_flag(args, "--addr") {
        config.server_addr = addr.parse().context("Invalid --addr value")?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Enter Username:");
    let username = read_line(&mut lines).await?;
    println!("Enter Password:");
    let password = read_line(&mut lines).await?;

    let mut client = ChatClient::new(config);
    let mut events = match client.connect(&username, &password).await {
        Ok(events) => events,
        Err(e) => {
            eprintln!("{}", e.message());
            return Ok(());
        }
    };

    // Print incoming frames as they arrive
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ClientEvent::Frame(frame) => display_frame(&frame),
                ClientEvent::Disconnected(reason) => {
                    println!("Disconnected: {}", reason);
                    break;
                }
            }
        }
    });

    println!("Connected. Type /help for commands.");
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !handle_client_command(&client, line).await? {
            break;
        }
    }

    client.disconnect().await.ok();
    Ok(())
}

async fn read_line(
    lines: &mut tokio::io::Lines<BufReader<tokio::io::Stdin>>,
) -> anyhow::Result<String> {
    let line = lines
        .next_line()
        .await?
        .context("Input closed")?
        .trim()
        .to_string();
    Ok(line)
}

fn display_frame(frame: &ServerFrame) {
    match frame {
        ServerFrame::Success { success } => println!("{}", success),
        ServerFrame::Error { error } => println!("Error: {}", error),
        ServerFrame::Info { info } => println!("{}", info),
        ServerFrame::Delivery { sender, message, dm } => {
            if dm.as_deref() == Some("true") {
                println!("DM from {}: {}", sender, message);
            } else {
                println!("{}", message);
            }
        }
    }
}

/// Returns false when the client should exit
async fn handle_client_command(client: &ChatClient, line: &str) -> anyhow::Result<bool> {
    let (command, rest) = match line.split_once(' ') {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };

    let result = match command {
        "/create" => client.create_room(rest).await,
        "/join" => client.join_room(rest).await,
        "/leave" => client.leave_room(rest).await,
        "/msg" => match rest.split_once(' ') {
            Some((room, text)) => client.send_message(room, text).await,
            None => {
                println!("Usage: /msg <room> <text>");
                return Ok(true);
            }
        },
        "/dm" => match rest.split_once(' ') {
            Some((recipient, text)) => client.direct_message(recipient, text).await,
            None => {
                println!("Usage: /dm <user> <text>");
                return Ok(true);
            }
        },
        "/quit" => return Ok(false),
        "/help" => {
            print_usage();
            return Ok(true);
        }
        _ => {
            println!("Unknown command: {} (try /help)", command);
            return Ok(true);
        }
    };

    if let Err(e) = result {
        error!("Failed to send: {}", e);
    }
    Ok(true)
}

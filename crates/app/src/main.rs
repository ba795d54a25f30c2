//! bship - Battleship terminal client
//!
//! Connects with the configured nickname, then takes commands from stdin.
//! State changes and server notifications are logged as they happen.

use bship_core::{ClientConfig, SessionState};
use bship_net::{Notification, Session};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod command;
mod paths;

use command::{Command, HELP};

fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("Starting bship");

    let config = match paths::config_path(std::env::args().nth(1))
        .and_then(|path| ClientConfig::load(&path))
    {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(config)) {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(config: ClientConfig) -> bship_net::Result<()> {
    let (session, mut notifications) = Session::new(config.session.clone());

    session
        .connect(&config.server.address, config.server.port, &config.nickname)
        .await?;
    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "Failed to read stdin");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<Command>() {
                    Ok(Command::Quit) => break,
                    Ok(Command::Help) => println!("{}", HELP),
                    Ok(Command::State) => print_state(&session.state()),
                    Ok(command) => {
                        // Requests can take a while; keep reading input meanwhile
                        let session = session.clone();
                        tokio::spawn(async move { execute(&session, command).await });
                    }
                    Err(e) => println!("{}", e),
                }
            }
            Some(notification) = notifications.recv() => match notification {
                Notification::Navigate(scene) => info!(?scene, "Navigate"),
                Notification::Alert(alert) => warn!(?alert, "Alert"),
            },
        }
    }

    session.disconnect().await;
    info!("Bye");
    Ok(())
}

async fn execute(session: &Session, command: Command) {
    let name = format!("{:?}", command);
    let result = match command {
        Command::Create => session.create_room().await,
        Command::Join(code) => session.join_room(&code).await,
        Command::Leave => session.leave_room().await,
        Command::Board(board) => session.submit_board(&board).await,
        Command::Turn { row, col } => session.submit_turn(row, col).await,
        Command::State | Command::Help | Command::Quit => Ok(()),
    };
    match result {
        Ok(()) => info!(command = %name, "Done"),
        Err(e) => warn!(command = %name, kind = ?e.kind(), error = %e, "Failed"),
    }
}

fn print_state(state: &SessionState) {
    println!(
        "{:?} as '{}' room '{}' in_game={} your turn={}",
        state.connection,
        state.nickname(),
        state.room_code,
        state.in_game,
        state.player.on_turn
    );
    for (title, board) in [("you", &state.player.board), ("opponent", &state.opponent.board)] {
        println!("  {}:", title);
        for row in board.fields().chunks(bship_core::BOARD_SIZE) {
            let line: String = row
                .iter()
                .map(|f| match f {
                    bship_core::Field::None => '.',
                    bship_core::Field::Ship => '#',
                    bship_core::Field::Hit => 'X',
                    bship_core::Field::Miss => 'o',
                    bship_core::Field::Invalidated => '~',
                })
                .collect();
            println!("    {}", line);
        }
    }
}

//! CivicFix Watch: follows the issue board live from a terminal.
//!
//! Reads `CIVIC_*` environment variables (see [`config::WatchConfig`]),
//! connects the push channel and accepts simple commands on stdin.

mod config;
mod rest;
mod terminal;

use std::error::Error;
use std::sync::Arc;

use civic_core::{IssueId, ListingQuery, SessionIdentity, View};
use civic_live::{identity_channel, IdentityPublisher, LiveHandle, LiveSession, WsTransport};
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};

use config::WatchConfig;
use rest::HttpIssueApi;
use terminal::TerminalSurface;

const HELP: &str = "commands: vote <id> | page <n> | show <id> | admin [page] | \
                    login <user> <token> [admin] | logout | connect | disconnect | status | quit";

/// One line of user input.
#[derive(Debug, PartialEq)]
enum Input {
    Vote(IssueId),
    Page(u32),
    Show(IssueId),
    Admin(u32),
    Login(SessionIdentity),
    Logout,
    Connect,
    Disconnect,
    Status,
    Quit,
    Help,
}

fn number<N: std::str::FromStr>(word: Option<&str>) -> Option<N> {
    word?.trim_start_matches('#').parse().ok()
}

fn parse_input(line: &str) -> Option<Input> {
    let mut words = line.split_whitespace();
    let command = words.next()?;

    let input = match command {
        "vote" => Input::Vote(IssueId(number(words.next())?)),
        "page" => Input::Page(number(words.next())?),
        "show" => Input::Show(IssueId(number(words.next())?)),
        "admin" => Input::Admin(number(words.next()).unwrap_or(1)),
        "login" => {
            let user = words.next()?;
            let token = words.next()?;
            match words.next() {
                Some("admin") => Input::Login(SessionIdentity::admin(user, token)),
                _ => Input::Login(SessionIdentity::citizen(user, token)),
            }
        }
        "logout" => Input::Logout,
        "connect" => Input::Connect,
        "disconnect" => Input::Disconnect,
        "status" => Input::Status,
        "quit" | "exit" => Input::Quit,
        "help" | "?" => Input::Help,
        _ => return None,
    };
    Some(input)
}

/// Returns `false` when the client should exit.
async fn execute(
    input: Input,
    handle: &LiveHandle,
    identity: &IdentityPublisher,
) -> Result<bool, Box<dyn Error>> {
    match input {
        Input::Vote(id) => handle.vote(id).await?,
        Input::Page(n) => handle.navigate(View::Listing(ListingQuery::page(n))).await?,
        Input::Show(id) => handle.navigate(View::Detail(id)).await?,
        Input::Admin(n) => {
            handle
                .navigate(View::AdminDashboard(ListingQuery::page(n)))
                .await?
        }
        Input::Login(who) => identity.set(who),
        Input::Logout => identity.logout(),
        Input::Connect => handle.connect().await?,
        Input::Disconnect => handle.disconnect().await?,
        Input::Status => {
            let snapshot = handle.snapshot().await?;
            println!(
                "{:?}, {} issues, rooms {:?} ({} confirmed), {} pending, {} events handled, {} dropped",
                snapshot.status,
                snapshot.issues.len(),
                snapshot.rooms,
                snapshot.acknowledged_rooms.len(),
                snapshot.pending_mutations,
                snapshot.dispatch.handled,
                snapshot.dispatch.dropped
            );
        }
        Input::Help => println!("{HELP}"),
        Input::Quit => return Ok(false),
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    info!("Starting CivicFix Watch");

    let config = WatchConfig::from_env();
    info!("Push channel {}, API {}", config.push_url, config.api_url);

    let (identity, identity_rx) = identity_channel(config.identity());
    let (session, handle) = LiveSession::new(
        config.live_config(),
        WsTransport::new(config.handshake_timeout),
        Arc::new(HttpIssueApi::new(&config.api_url)),
        Box::new(TerminalSurface::stdout()),
        identity_rx,
    );
    let task = session.spawn();

    handle.connect().await?;
    handle.navigate(config.initial_view()).await?;
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let Some(input) = parse_input(&line) else {
            println!("unrecognized: {line}");
            continue;
        };
        if !execute(input, &handle, &identity).await? {
            break;
        }
    }

    handle.shutdown().await?;
    if let Err(e) = task.await {
        warn!("Session task ended abnormally: {e}");
    }
    info!("Bye");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_input("vote 42"), Some(Input::Vote(IssueId(42))));
        assert_eq!(parse_input("vote #42"), Some(Input::Vote(IssueId(42))));
        assert_eq!(parse_input("  page 3 "), Some(Input::Page(3)));
        assert_eq!(parse_input("admin"), Some(Input::Admin(1)));
        assert_eq!(parse_input("quit"), Some(Input::Quit));
        assert_eq!(
            parse_input("login 9 tok admin"),
            Some(Input::Login(SessionIdentity::admin("9", "tok")))
        );
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!(parse_input("vote"), None);
        assert_eq!(parse_input("vote abc"), None);
        assert_eq!(parse_input("login 9"), None);
        assert_eq!(parse_input("dance"), None);
    }
}

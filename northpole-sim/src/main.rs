//! North Pole presence simulator.
//!
//! Runs a handful of scripted bots on an in-process mesh, has one of them
//! leave half way through, then checks that every remaining bot ended up
//! with the same picture of the room.
//!
//! ```text
//! northpole-sim [-c presence.json] [-p 4] [-s 10]
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

mod bot;
mod report;

use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use log::{error, info, warn};
use northpole_presence::{MeshHub, PresenceConfig};

use bot::{Bot, FRAME};

/// Time allowed after the last input for throttled moves to flush.
const SETTLE: Duration = Duration::from_millis(1500);

/// Longest run accepted on the command line (one day).
const MAX_SECONDS: u64 = 86_400;

#[derive(Debug, Parser)]
#[command(name = "northpole-sim", version, about = "Simulate scripted peers in a North Pole room")]
struct SimArgs {
    /// JSON presence config shared by every bot
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of bots to spawn
    #[arg(short, long, default_value_t = 4, value_parser = clap::value_parser!(u16).range(1..))]
    peers: u16,

    /// How long the bots keep moving
    #[arg(
        short,
        long,
        default_value_t = 10,
        value_parser = clap::value_parser!(u64).range(1..=MAX_SECONDS)
    )]
    seconds: u64,
}

async fn simulate(args: SimArgs) -> Result<bool, Box<dyn Error>> {
    let base = match &args.config {
        Some(path) => PresenceConfig::from_json_file(path)?,
        None => PresenceConfig::default(),
    };
    base.validate()?;

    info!(
        "Simulating {} peers for {}s in room {}",
        args.peers, args.seconds, base.room
    );

    let hub = MeshHub::new();
    let peers = usize::from(args.peers);
    let mut bots = Vec::with_capacity(peers);
    for index in 0..peers {
        bots.push(Bot::spawn(&hub, &base, index)?);
    }

    let frames = args.seconds.saturating_mul(1000) / FRAME.as_millis() as u64;
    let drivers: Vec<_> = bots.iter().map(|bot| bot.drive(frames)).collect();

    // The last bot walks out half way through.
    let leaver = if bots.len() > 1 { bots.pop() } else { None };
    if let Some(leaver) = leaver {
        tokio::time::sleep(Duration::from_secs(args.seconds) / 2).await;
        info!("{} is leaving the room", leaver.name);
        leaver.leave().await;
    }

    for driver in drivers {
        if let Err(e) = driver.await {
            warn!("Input driver failed: {e}");
        }
    }
    tokio::time::sleep(SETTLE).await;

    let views: Vec<_> = bots.iter().map(Bot::view).collect();
    let problems = report::disagreements(&views);

    if let Some(first) = views.first() {
        println!("Leaderboard as seen by {}:", first.local.display_name);
        print!("{}", report::leaderboard(first));
        println!("{} chat lines exchanged", first.chat.len());
    }

    for problem in &problems {
        error!("Views disagree: {problem}");
    }

    for bot in bots {
        bot.leave().await;
    }
    let remaining = hub.peers(base.room.clone()).await?;
    if !remaining.is_empty() {
        warn!("{} peers still registered after shutdown", remaining.len());
    }

    Ok(problems.is_empty())
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = SimArgs::parse();

    match simulate(args).await {
        Ok(true) => {
            info!("All views agree");
            ExitCode::SUCCESS
        }
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("Simulation failed: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<SimArgs, clap::Error> {
        SimArgs::try_parse_from(std::iter::once("northpole-sim").chain(args.iter().copied()))
    }

    #[test]
    fn test_parse_defaults() {
        let args = parse(&[]).unwrap();
        assert_eq!((args.peers, args.seconds), (4, 10));
        assert!(args.config.is_none());
    }

    #[test]
    fn test_parse_flags() {
        let args = parse(&["--peers", "7", "--config", "p.json", "--seconds", "3"]).unwrap();
        assert_eq!((args.peers, args.seconds), (7, 3));
        assert_eq!(args.config, Some(PathBuf::from("p.json")));

        let short = parse(&["-p", "2", "-s", "1"]).unwrap();
        assert_eq!((short.peers, short.seconds), (2, 1));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse(&["--peers"]).is_err());
        assert!(parse(&["--peers", "many"]).is_err());
        assert!(parse(&["--peers", "0"]).is_err());
        assert!(parse(&["--fast"]).is_err());
    }

    #[test]
    fn test_parse_bounds_run_length() {
        assert!(parse(&["--seconds", "0"]).is_err());
        assert!(parse(&["--seconds", "86401"]).is_err());
        assert!(parse(&["--seconds", &u64::MAX.to_string()]).is_err());
        assert_eq!(parse(&["--seconds", "86400"]).unwrap().seconds, MAX_SECONDS);
    }
}

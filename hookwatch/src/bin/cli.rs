//! Command-line tools for hookwatch.
//!
//! Reads the same `HOOKWATCH_*` environment as the daemon.

use std::env;
use std::time::Duration;

use anyhow::{Result, anyhow};

use hookwatch::config::Config;
use hookwatch::history::{HistoryStore, RestHistoryStore};
use hookwatch::link::{DeviceLink, LinkEvent};
use hookwatch::types::EpochClock;

const DEFAULT_HISTORY_LIMIT: usize = 20;
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: hookwatch-cli <command>");
        eprintln!();
        eprintln!("Commands:");
        eprintln!("  probe <address>    Print the first reading from a device");
        eprintln!("  history [limit]    Show recent alerts, newest first");
        eprintln!();
        eprintln!("Environment:");
        eprintln!("  HOOKWATCH_HISTORY_URL, HOOKWATCH_HISTORY_KEY    Remote alert history");
        std::process::exit(1);
    }

    let command = &args[1];

    match command.as_str() {
        "probe" => {
            let address = args
                .get(2)
                .ok_or_else(|| anyhow!("probe needs a device address"))?;
            cmd_probe(address).await?
        }
        "history" => {
            let limit = match args.get(2) {
                Some(raw) => raw.parse()?,
                None => DEFAULT_HISTORY_LIMIT,
            };
            cmd_history(limit).await?
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            eprintln!("Run without arguments to see usage.");
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Connect to a device and print its first reading.
async fn cmd_probe(address: &str) -> Result<()> {
    let config = Config::from_env()?;
    let mut link = DeviceLink::new(config.link, reqwest::Client::new(), EpochClock::new());
    let mut events = link.subscribe();

    let endpoint = link.connect(address);
    println!("Endpoint: {:?}", endpoint);

    let reading = tokio::time::timeout(PROBE_TIMEOUT, async {
        loop {
            match events.recv().await {
                Ok(LinkEvent::Reading { reading, .. }) => return Some(reading),
                Ok(LinkEvent::Status(status)) => println!("Status:   {}", status),
                Ok(LinkEvent::SessionReset) => {}
                Err(_) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten();

    link.disconnect();

    let reading = reading.ok_or_else(|| anyhow!("no reading from {address} within {PROBE_TIMEOUT:?}"))?;
    println!("Device:   {}", reading.device_id);
    println!("Left:     {}", hook_label(reading.left_sensor));
    println!("Right:    {}", hook_label(reading.right_sensor));
    println!("Time:     {} ms", reading.timestamp_ms);
    if reading.is_unhooked() {
        println!("UNHOOKED");
    }

    Ok(())
}

/// Print recent alerts from the remote history.
async fn cmd_history(limit: usize) -> Result<()> {
    let config = Config::from_env()?;
    let history = config
        .history
        .ok_or_else(|| anyhow!("HOOKWATCH_HISTORY_URL and HOOKWATCH_HISTORY_KEY are required"))?;
    let store = RestHistoryStore::new(reqwest::Client::new(), history);

    let records = store.recent(limit).await?;
    if records.is_empty() {
        println!("(no alerts)");
    }
    for record in records {
        println!(
            "{}  {:<16} {:<10} {}",
            record.delivered_at_ms, record.device_id, record.status, record.title
        );
    }

    Ok(())
}

fn hook_label(hooked: bool) -> &'static str {
    if hooked { "hooked" } else { "unhooked" }
}

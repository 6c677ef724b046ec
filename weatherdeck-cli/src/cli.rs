use anyhow::Context;
use clap::{Parser, Subcommand};
use inquire::{CustomType, Password, PasswordDisplayMode, Text};
use tokio::io::{AsyncBufReadExt, BufReader};
use weatherdeck_core::{Config, Coordinates, LocationStore, Update};

use crate::{dashboard, render};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weatherdeck", version, about = "Personal weather dashboard")]
pub struct Cli {
    /// Show debug logs (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Set the weather API key and the coordinates used for "current location".
    Configure,

    /// Show weather for a place, from cache when it is less than an hour old.
    Show {
        /// Place name, e.g. "Paris" or "London, UK".
        place: String,
    },

    /// Show weather for the configured current location.
    Here,

    /// List the saved current location and recently viewed places.
    Recents,

    /// Keep running: refresh on the hour and read commands from stdin.
    Watch {
        /// Place to open with; defaults to the saved current location.
        place: Option<String>,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure => configure(),
            Command::Show { place } => show(&place).await,
            Command::Here => here().await,
            Command::Recents => recents(),
            Command::Watch { place } => watch(place).await,
        }
    }
}

fn configure() -> anyhow::Result<()> {
    let mut config = Config::load()?;

    let api_key = Password::new("WeatherAPI.com API key:")
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .with_help_message("Leave empty to keep the current key")
        .prompt()?;
    if !api_key.trim().is_empty() {
        config.set_api_key(api_key.trim().to_string());
    }

    let current = config
        .geolocation
        .coordinates()
        .map(|c| c.to_string())
        .unwrap_or_default();
    let coords = Text::new("Current location as \"lat,lon\":")
        .with_default(&current)
        .with_help_message("Leave empty to disable \"current location\"")
        .prompt()?;
    config.set_coordinates(parse_coordinates(&coords)?);

    let cooldown = CustomType::<u64>::new("Seconds between location lookups:")
        .with_default(config.geolocation.cooldown_secs)
        .prompt()?;
    config.geolocation.cooldown_secs = cooldown;

    config.save()?;
    println!("Saved {}", Config::config_file_path()?.display());
    Ok(())
}

async fn show(place: &str) -> anyhow::Result<()> {
    let config = Config::load()?;
    let (handle, mut updates) = dashboard::start(&config)?;

    handle.search(place).await?;
    let result = dashboard::settle(&handle, &mut updates, true).await;
    handle.shutdown().await?;

    println!("{}", render::card(&result?));
    Ok(())
}

async fn here() -> anyhow::Result<()> {
    let config = Config::load()?;
    let (handle, mut updates) = dashboard::start(&config)?;

    handle.locate().await?;
    let result = dashboard::settle(&handle, &mut updates, false).await;
    handle.shutdown().await?;

    println!("{}", render::card(&result?));
    Ok(())
}

fn recents() -> anyhow::Result<()> {
    let config = Config::load()?;
    let store = LocationStore::load(dashboard::storage_from_config(&config)?);

    match store.current() {
        Some(record) => println!("Current:  {}", render::line(record)),
        None => println!("Current:  (not set, run `weatherdeck here`)"),
    }
    if store.recents().is_empty() {
        println!("Recent:   (none)");
    }
    for (i, record) in store.recents().iter().enumerate() {
        println!("Recent {}: {}", i + 1, render::line(record));
    }
    Ok(())
}

const WATCH_HELP: &str = "Type a place to show it, or :here, :refresh, :hide, :show, :quit";

async fn watch(place: Option<String>) -> anyhow::Result<()> {
    let config = Config::load()?;
    let (handle, mut updates) = dashboard::start(&config)?;

    if let Some(place) = place {
        handle.search(&place).await?;
    }
    println!("{WATCH_HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Some(update) => print_update(update),
                None => break,
            },
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                match line.trim() {
                    ":quit" | ":q" => break,
                    ":here" => handle.locate().await?,
                    ":refresh" => handle.refresh().await?,
                    ":hide" => handle.set_visible(false).await?,
                    ":show" => handle.set_visible(true).await?,
                    ":help" => println!("{WATCH_HELP}"),
                    input => handle.search(input).await?,
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    handle.shutdown().await
}

fn print_update(update: Update) {
    match update {
        Update::Showing { record, from_cache } => {
            let source = if from_cache { "cached" } else { "live" };
            println!("\n{} ({source})", render::card(&record));
        }
        Update::Loading(true) => println!("Loading..."),
        Update::Loading(false) => {}
        Update::Failed(err) => println!("{}", err.user_message()),
        Update::LocationsChanged { current, recents } => {
            if let Some(current) = current {
                println!("  * {}", render::line(&current));
            }
            for record in &recents {
                println!("  - {}", render::line(record));
            }
        }
        Update::Geolocation(state) if state.is_busy() => {
            println!("Location button disabled for now");
        }
        Update::Geolocation(_) => println!("Location button available"),
    }
}

fn parse_coordinates(input: &str) -> anyhow::Result<Option<Coordinates>> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }

    let (lat, lon) = input
        .split_once(',')
        .with_context(|| format!("Expected \"lat,lon\", got \"{input}\""))?;
    let lat: f64 = lat.trim().parse().context("Invalid latitude")?;
    let lon: f64 = lon.trim().parse().context("Invalid longitude")?;

    anyhow::ensure!((-90.0..=90.0).contains(&lat), "Latitude out of range: {lat}");
    anyhow::ensure!((-180.0..=180.0).contains(&lon), "Longitude out of range: {lon}");

    Ok(Some(Coordinates { lat, lon }))
}

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line interface for the sound map.
//!
//! ```text
//! soundmap heatmap <west,south,east,north> [--json]
//! soundmap search <place...>
//! soundmap survey <lat> <lon> [--radius 1000]
//! soundmap legend
//! soundmap serve
//! ```
//!
//! Every command reads the same layered configuration as the server;
//! `--config` points at an override file (otherwise `SOUNDMAP_CONFIG`).

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use soundmap_app::{DEFAULT_SESSION, SoundMap};
use soundmap_config::AppConfig;
use soundmap_heatmap::RefreshOutcome;
use soundmap_models::{BoundingRegion, GeoPoint};

#[derive(Parser)]
#[command(name = "soundmap", about = "Estimate and explore urban noise levels")]
struct Cli {
    /// TOML file overriding the built-in configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and score the heatmap for a bounding box
    Heatmap {
        /// Bounding box as west,south,east,north
        #[arg(allow_hyphen_values = true)]
        bbox: String,
        /// Print the full layer as JSON
        #[arg(long)]
        json: bool,
    },
    /// Find a place and print the map region centered on it
    Search {
        /// Place name
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },
    /// Count roads and buildings around a point
    Survey {
        /// Latitude
        #[arg(allow_hyphen_values = true)]
        lat: f64,
        /// Longitude
        #[arg(allow_hyphen_values = true)]
        lon: f64,
        /// Radius in meters
        #[arg(long, default_value = "1000")]
        radius: u32,
    },
    /// Print the sound level legend
    Legend,
    /// Start the HTTP API server
    Serve,
}

fn load_config(path: Option<PathBuf>) -> Result<AppConfig, soundmap_config::ConfigError> {
    let path = path.or_else(|| {
        std::env::var(soundmap_config::CONFIG_PATH_ENV)
            .ok()
            .map(PathBuf::from)
    });
    AppConfig::load_with(path.as_deref(), |name| std::env::var(name).ok())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_custom_env("RUST_LOG");
    let cli = Cli::parse();
    let mut config = load_config(cli.config)?;

    match cli.command {
        Commands::Heatmap { bbox, json } => {
            let Some(region) = BoundingRegion::parse_bbox(&bbox)? else {
                eprintln!("Invalid bbox {bbox:?}: expected west,south,east,north");
                std::process::exit(2);
            };

            // A one-shot command has nothing to debounce.
            config.refresh.debounce_ms = 0;
            let soundmap = SoundMap::from_config(&config)?;

            let RefreshOutcome::Applied(layer) =
                soundmap.on_region_change(DEFAULT_SESSION, region).await?
            else {
                return Err("heatmap refresh was superseded".into());
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&layer)?);
                return Ok(());
            }

            println!("{:<12} {:<13} WEIGHT", "LATITUDE", "LONGITUDE");
            println!("{}", "-".repeat(34));
            for point in &layer.points {
                println!(
                    "{:<12.7} {:<13.7} {:.2}",
                    point.latitude, point.longitude, point.weight
                );
            }
            println!("\n{} point(s) in {region}", layer.points.len());

            let stats = soundmap.cache_stats().await;
            log::info!(
                "Cache: {} hits, {} misses, {} entries",
                stats.hits,
                stats.misses,
                stats.entries
            );
        }
        Commands::Search { query } => {
            let soundmap = SoundMap::from_config(&config)?;
            let query = query.join(" ");
            let region = soundmap.search(&query).await?;
            println!(
                "{query}: center ({:.6}, {:.6}), span {} x {}",
                region.latitude, region.longitude, region.latitude_delta, region.longitude_delta
            );
            println!("bbox: {}", region.bounds());
        }
        Commands::Survey { lat, lon, radius } => {
            let soundmap = SoundMap::from_config(&config)?;
            let center = GeoPoint::new(lat, lon)?;
            let survey = soundmap.survey(center, radius).await?;
            println!("Within {radius} m of {center}:");
            println!("  roads:     {}", survey.counts.road_count);
            println!("  buildings: {}", survey.counts.building_count);
            println!("  score:     {:.2}", survey.score);
        }
        Commands::Legend => {
            for band in SoundMap::legend() {
                println!("{:<8} {}", band.color, band.label);
            }
        }
        Commands::Serve => {
            // The server uses actix-web's runtime, so we need to run it
            // in a blocking task to avoid nesting tokio runtimes.
            tokio::task::spawn_blocking(move || {
                actix_web::rt::System::new().block_on(soundmap_server::run_server(config))
            })
            .await??;
        }
    }

    Ok(())
}

//! routewatch: CLI + JSON API for tracking a vehicle along a route.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use comfy_table::{Cell, Table};
use tracing_subscriber::EnvFilter;

use route_core::channel::{Channel, ManualChannel};
use route_core::config::{self, Config};
use route_core::polyline;
use route_core::tracker::RouteTracker;
use route_core::types::*;
use route_core::viewport::{Viewport, ViewportBounds};

mod events;
mod feed;
mod places;
mod route_source;
mod web;

use events::EventHub;
use feed::WebSocketChannel;
use places::{NominatimLookup, PlaceLookup};
use route_source::{HttpRouteSource, RouteSource};

#[derive(Parser)]
#[command(name = "routewatch", version, about = "Route decoder and live position tracker")]
struct Cli {
    /// Config file (default: ~/.routewatch/config.yaml)
    #[arg(long, global = true, env = "ROUTEWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode an encoded polyline and print its points, markers, and viewport
    Decode {
        /// Encoded polyline string
        polyline: String,
    },

    /// Encode "lat,lon" points into a polyline
    Encode {
        /// Points as "lat,lon" (negative values: use -- before the points)
        #[arg(required = true)]
        points: Vec<String>,
    },

    /// Fetch a route from the directions service and summarize it
    Route {
        #[arg(long)]
        start: String,

        #[arg(long)]
        end: String,

        /// Directions service URL (overrides config)
        #[arg(long, env = "ROUTEWATCH_ROUTE_URL")]
        url: Option<String>,
    },

    /// Track a route live and serve the JSON API until Ctrl-C
    Track {
        /// Encoded polyline (skips the directions service)
        #[arg(long, conflicts_with_all = ["start", "end"])]
        polyline: Option<String>,

        #[arg(long, requires = "end")]
        start: Option<String>,

        #[arg(long, requires = "start")]
        end: Option<String>,

        /// WebSocket position feed URL (overrides config)
        #[arg(long, env = "ROUTEWATCH_FEED_URL")]
        feed_url: Option<String>,

        /// Do not subscribe to the live feed
        #[arg(long)]
        no_feed: bool,

        /// Skip place-name lookups for the markers
        #[arg(long)]
        no_geocode: bool,

        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        port: Option<u16>,
    },

    /// Show the effective configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        init: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => config::load_config_from(path),
        None => config::load_config(),
    };

    let result = match cli.command {
        Commands::Decode { polyline } => cmd_decode(&polyline, &config),
        Commands::Encode { points } => cmd_encode(&points),
        Commands::Route { start, end, url } => run_async(cmd_route(start, end, url, config)),
        Commands::Track {
            polyline,
            start,
            end,
            feed_url,
            no_feed,
            no_geocode,
            host,
            port,
        } => run_async(cmd_track(TrackArgs {
            polyline,
            start,
            end,
            feed_url,
            no_feed,
            no_geocode,
            host,
            port,
            config,
        })),
        Commands::Config { init } => cmd_config(&config, init, cli.config.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run_async<F>(future: F) -> Result<()>
where
    F: std::future::Future<Output = Result<()>>,
{
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(future)
}

// ---------------------------------------------------------------------------
// decode / encode
// ---------------------------------------------------------------------------

fn cmd_decode(encoded: &str, config: &Config) -> Result<()> {
    let points = polyline::decode(encoded)?;
    print_route(&points, config.map.default_zoom);
    Ok(())
}

fn cmd_encode(points: &[String]) -> Result<()> {
    let coords = points
        .iter()
        .map(|p| {
            parse_coordinate(p).ok_or_else(|| {
                RouteError::MalformedEncoding(format!("expected \"lat,lon\", got {p:?}"))
            })
        })
        .collect::<Result<Vec<_>>>()?;
    println!("{}", polyline::encode(&coords)?);
    Ok(())
}

fn print_route(points: &[Coordinate], zoom: u8) {
    println!();
    println!("Route: {} points", points.len());

    let mut table = Table::new();
    table.set_header(vec!["#", "Lat", "Lon"]);
    for (i, p) in points.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i),
            Cell::new(format!("{:.5}", p.lat)),
            Cell::new(format!("{:.5}", p.lon)),
        ]);
    }
    println!("{table}");

    if let Some(markers) = RouteMarkers::from_route(points) {
        println!("  Start: {}", markers.start.position);
        println!("  End:   {}", markers.end.position);
    }

    match points
        .first()
        .map(|first| Viewport::derive(ViewportBounds::from_points(points), *first, zoom))
    {
        Some(Viewport::Fit(b)) => println!(
            "  Viewport: fit S {:.5} W {:.5} N {:.5} E {:.5}",
            b.south, b.west, b.north, b.east
        ),
        Some(Viewport::Center { center, zoom }) => {
            println!("  Viewport: center {center} zoom {zoom}")
        }
        None => {}
    }
    println!();
}

// ---------------------------------------------------------------------------
// route
// ---------------------------------------------------------------------------

async fn cmd_route(start: String, end: String, url: Option<String>, config: Config) -> Result<()> {
    let url = url.unwrap_or(config.route_service.url);
    let source = HttpRouteSource::new(&url);
    let encoded = source.fetch_route(&start, &end).await?;
    let points = polyline::decode(&encoded)?;

    println!("Encoded: {encoded}");
    print_route(&points, config.map.default_zoom);
    Ok(())
}

// ---------------------------------------------------------------------------
// track
// ---------------------------------------------------------------------------

struct TrackArgs {
    polyline: Option<String>,
    start: Option<String>,
    end: Option<String>,
    feed_url: Option<String>,
    no_feed: bool,
    no_geocode: bool,
    host: Option<String>,
    port: Option<u16>,
    config: Config,
}

async fn cmd_track(args: TrackArgs) -> Result<()> {
    let config = args.config;

    let encoded = match (args.polyline, args.start, args.end) {
        (Some(p), _, _) => p,
        (None, Some(start), Some(end)) => {
            let source = HttpRouteSource::new(&config.route_service.url);
            source.fetch_route(&start, &end).await?
        }
        _ => {
            return Err(RouteError::Config(
                "track needs --polyline or both --start and --end".into(),
            ))
        }
    };

    let feed_url = if args.no_feed {
        None
    } else {
        args.feed_url.or(config.feed.url.clone())
    };
    let channel: Box<dyn Channel> = match &feed_url {
        Some(url) => Box::new(WebSocketChannel::new(
            url,
            config.feed.reconnect_policy(),
            tokio::runtime::Handle::current(),
        )),
        None => {
            tracing::warn!("no live feed configured; the position stays at the route start");
            Box::new(ManualChannel::new())
        }
    };

    let tracker = Arc::new(
        RouteTracker::with_channel(channel).with_default_zoom(config.map.default_zoom),
    );
    let events = EventHub::new(256);
    tracker.subscribe(Arc::new(events.clone()));

    let generation = tracker.set_route(Some(&encoded))?;
    if let Some(route) = tracker.route() {
        print_route(&route, config.map.default_zoom);
    }

    if config.geocoder.enabled && !args.no_geocode {
        let lookup: Arc<dyn PlaceLookup> = Arc::new(NominatimLookup::new(&config.geocoder.url));
        tokio::spawn(places::resolve_markers(tracker.clone(), lookup, generation));
    }

    let state = Arc::new(web::AppState {
        tracker: tracker.clone(),
        events,
        map: config.map.clone(),
    });
    let host = args.host.unwrap_or(config.dashboard.host);
    let port = args.port.unwrap_or(config.dashboard.port);

    let served = web::serve(state, &host, port, async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutting down");
    })
    .await;

    tracker.dispose();
    served?;
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config(config: &Config, init: bool, path: Option<&std::path::Path>) -> Result<()> {
    if init {
        let written = match path {
            Some(p) => {
                config::save_config_to(config, p)?;
                p.to_path_buf()
            }
            None => config::save_config(config)?,
        };
        println!("Wrote {}", written.display());
        return Ok(());
    }

    print!("{}", config::serialize_config(config));
    Ok(())
}

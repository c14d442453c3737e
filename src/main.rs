mod relay;
mod state;

use crate::relay::QueryRelay;
use crate::state::catalog::CatalogStore;
use crate::state::coordinator::{CoordinatorConfig, ScanCoordinator};
use crate::state::history::RatingHistory;
use crate::state::lifecycle::SeasonLifecycleDetector;
use crate::state::live_status::LiveStatusEnricher;
use crate::state::refresher::PeriodicRefresher;
use crate::state::roster::{FileRoster, RosterSource};
use crate::state::scanner::LeaderboardScanner;
use crate::state::season_store::SeasonStore;
use crate::state::settings::Settings;
use anyhow::{Context, Result};
use env_logger::{Builder, Target};
use ladder_api::client::{LadderApi, TwitchApi};
use ladder_api::{LadderSource, StreamSource};
use log::{LevelFilter, info};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Serve,
    Ranking(u32),
    Catalog,
    Rescan(u32),
    Summary(String),
}

#[tokio::main]
async fn main() -> Result<()> {
    let Some(command) = handle_cli_args() else {
        return Ok(());
    };

    better_panic::install();
    dotenvy::dotenv().ok();
    init_logger();

    let settings = Settings::load();
    let engine = Engine::build(&settings).await?;

    match command {
        Command::Serve => serve(&engine, &settings).await?,
        Command::Ranking(season) => {
            let mut view = engine.coordinator.get_season(season).await?;
            engine.enricher.annotate(&mut view.entries).await;
            print_json(&view)?;
        }
        Command::Catalog => print_json(&engine.coordinator.catalog().await)?,
        Command::Rescan(season) => print_json(&engine.coordinator.force_rescan(season).await?)?,
        Command::Summary(player) => print_json(&engine.coordinator.player_summary(&player).await)?,
    }

    // Let background scans started by this invocation land on disk.
    engine.coordinator.drain().await;
    Ok(())
}

fn init_logger() {
    if std::env::var("RUST_LOG").is_ok() {
        env_logger::init();
        return;
    }
    Builder::new()
        .target(Target::Stderr)
        .filter_level(LevelFilter::Warn)
        .filter_module("ladderwatch", LevelFilter::Info)
        .filter_module("ladder_api", LevelFilter::Info)
        .init();
}

struct Engine {
    coordinator: ScanCoordinator,
    catalog: Arc<CatalogStore>,
    scanner: LeaderboardScanner,
    enricher: Arc<LiveStatusEnricher>,
}

impl Engine {
    async fn build(settings: &Settings) -> Result<Self> {
        let data_dir = &settings.data_dir;
        let store = Arc::new(SeasonStore::open(data_dir).await.context("opening season store")?);
        let catalog = Arc::new(
            CatalogStore::open(data_dir, settings.initial_season, |id| settings.season_label(id))
                .await
                .context("opening season catalog")?,
        );
        let history = Arc::new(RatingHistory::open(data_dir).await.context("opening rating history")?);

        let ladder: Arc<dyn LadderSource> = Arc::new(
            LadderApi::new(&settings.region, &settings.ladder_id)
                .with_endpoint(&settings.ladder_endpoint)
                .with_timeout(settings.scan.page_timeout),
        );
        let scanner = LeaderboardScanner::new(ladder);
        let roster: Arc<dyn RosterSource> = Arc::new(FileRoster::new(&settings.roster_path));

        let twitch: Arc<dyn StreamSource> = Arc::new(
            TwitchApi::new(settings.twitch_client_id.clone(), settings.twitch_token.clone())
                .with_base_url(&settings.twitch_base_url),
        );
        let enricher = LiveStatusEnricher::open(twitch, data_dir)
            .await
            .context("opening avatar cache")?
            .with_lookup_timeout(settings.scan.page_timeout);
        let enricher = Arc::new(enricher);

        let coordinator = ScanCoordinator::new(
            store,
            catalog.clone(),
            roster,
            scanner.clone(),
            history,
            CoordinatorConfig::from(settings),
        );
        Ok(Self { coordinator, catalog, scanner, enricher })
    }
}

async fn serve(engine: &Engine, settings: &Settings) -> Result<()> {
    let labels = settings.clone();
    let detector = SeasonLifecycleDetector::new(
        engine.coordinator.clone(),
        engine.catalog.clone(),
        engine.scanner.clone(),
        move |id| labels.season_label(id),
        settings.scan.page_timeout,
    );
    let lifecycle_task = tokio::spawn(detector.run(settings.probe_interval));

    let refresher = PeriodicRefresher::new(engine.coordinator.clone(), engine.enricher.clone(), settings.live_interval);
    let refresher_task = tokio::spawn(refresher.run());

    let listener = TcpListener::bind(&settings.bind)
        .await
        .with_context(|| format!("binding relay to {}", settings.bind))?;
    let relay = Arc::new(QueryRelay::new(
        engine.coordinator.clone(),
        engine.enricher.clone(),
        settings.admin_token.clone(),
    ));

    let outcome = tokio::select! {
        result = relay.serve(listener) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down, waiting for in-flight scans");
            Ok(())
        }
    };

    lifecycle_task.abort();
    refresher_task.abort();
    outcome
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// `None` when the invocation was fully handled here (help, version).
fn handle_cli_args() -> Option<Command> {
    match parse_args(std::env::args().skip(1)) {
        Ok(command) => command,
        Err(message) => {
            eprintln!("{message}\n\n{}", usage_text());
            std::process::exit(2);
        }
    }
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Option<Command>, String> {
    let Some(arg) = args.next() else {
        return Ok(Some(Command::Serve));
    };

    let season = |value: Option<String>| -> Result<u32, String> {
        let value = value.ok_or_else(|| format!("{arg} needs a season id"))?;
        value.parse().map_err(|_| format!("not a season id: {value}"))
    };

    let command = match arg.as_str() {
        "-h" | "--help" => {
            println!("{}", usage_text());
            return Ok(None);
        }
        "-V" | "--version" => {
            println!("ladderwatch {}", env!("CARGO_PKG_VERSION"));
            return Ok(None);
        }
        "serve" => Command::Serve,
        "ranking" => Command::Ranking(season(args.next())?),
        "catalog" => Command::Catalog,
        "rescan" => Command::Rescan(season(args.next())?),
        "summary" => {
            let player = args.next().ok_or_else(|| "summary needs a player id".to_string())?;
            Command::Summary(player)
        }
        _ => return Err(format!("Unknown argument: {arg}")),
    };
    Ok(Some(command))
}

fn usage_text() -> &'static str {
    "ladderwatch - roster leaderboard tracker

Usage:
  ladderwatch [serve]            run the season watcher and the websocket query relay
  ladderwatch ranking <season>   print a season's roster ranking as JSON
  ladderwatch catalog            print the known seasons
  ladderwatch rescan <season>    drop stored data for a season and rescan it
  ladderwatch summary <player>   print a player's rating history and past seasons
  ladderwatch --help
  ladderwatch --version

Environment (a .env file is read when present):
  LADDER_REGION, LADDER_ID       upstream ladder (default EU / battlegrounds)
  LADDER_DATA_DIR                snapshot, archive and catalog files (default ./data)
  LADDER_ROSTER_PATH             tracked players (default ./players.json)
  LADDER_CACHE_TTL_SECS          current-season staleness window (default 600)
  LADDER_BIND                    relay address (default 127.0.0.1:8787)
  LADDER_ADMIN_TOKEN             enables rescan over the relay
  TWITCH_CLIENT_ID, TWITCH_TOKEN streaming status lookups
  RUST_LOG                       log filter (default info)"
}

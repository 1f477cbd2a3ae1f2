//! Rally CLI - track players, matches, and scores from the terminal
//!
//! Every command works against the local replica; `rally sync` reconciles it
//! with the remote store when one is configured.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use rally_core::config::{EngineConfig, RemoteConfig, DEFAULT_SYNC_INTERVAL};
use rally_core::db::{
    keys, Database, GameRepository, MatchRepository, MetadataStore, PlayerRepository,
    SqliteGameRepository, SqliteMatchRepository, SqliteMetadataStore, SqlitePlayerRepository,
    SyncStore,
};
use rally_core::sync::{build_engine, ConnectivitySignal, HttpRemoteStore, RemoteStore, SyncEngine};
use rally_core::{DeviceIdentity, GameResult, Match, MatchId, Player, PlayerId};
use serde::Serialize;
use thiserror::Error;


#[derive(Parser)]
#[command(name = "rally")]
#[command(about = "Track table tennis players, matches, and scores")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Optional path to local database file
    #[arg(long, value_name = "PATH", global = true)]
    db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage player profiles
    #[command(subcommand)]
    Player(PlayerCommands),
    /// Manage matches
    #[command(subcommand)]
    Match(MatchCommands),
    /// Record and inspect per-game results
    #[command(subcommand)]
    Game(GameCommands),
    /// Reconcile the local replica with the remote store
    Sync {
        #[command(subcommand)]
        command: Option<SyncCommands>,
    },
}

#[derive(Subcommand)]
enum PlayerCommands {
    /// Create a new player profile
    #[command(alias = "new")]
    Add {
        /// Display name
        name: Vec<String>,
    },
    /// List players
    List {
        /// Number of players to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Rename a player
    Rename {
        /// Player ID or unique ID prefix
        id: String,
        /// New display name
        name: Vec<String>,
    },
    /// Link a player to a remote account, enabling sync for it
    Link {
        /// Player ID or unique ID prefix
        id: String,
        /// Remote account identifier
        account: String,
    },
    /// Fold a duplicate profile into a canonical one
    Merge {
        /// Duplicate player ID or unique ID prefix
        id: String,
        /// Canonical player ID or unique ID prefix
        into: String,
    },
}

#[derive(Subcommand)]
enum MatchCommands {
    /// Start a new match between two players
    #[command(alias = "new")]
    Add {
        /// Home player ID or unique ID prefix
        home: String,
        /// Away player ID or unique ID prefix
        away: String,
    },
    /// List matches, most recently started first
    List {
        /// Number of matches to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark a match as completed
    Complete {
        /// Match ID or unique ID prefix
        id: String,
    },
}

#[derive(Subcommand)]
enum GameCommands {
    /// Record the result of one game inside a match
    Record {
        /// Match ID or unique ID prefix
        match_id: String,
        /// Game number within the match, starting at 1
        number: u32,
        /// Home player's score
        home: u32,
        /// Away player's score
        away: u32,
    },
    /// List a match's games in play order
    List {
        /// Match ID or unique ID prefix
        match_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum SyncCommands {
    /// Show sync state without contacting the remote
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Keep syncing in the background until interrupted
    Watch {
        /// Seconds between cycles
        #[arg(short, long, default_value = "30")]
        interval: u64,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] rally_core::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Player name cannot be provided empty")]
    EmptyPlayerName,
    #[error("Player not found for id/prefix: {0}")]
    PlayerNotFound(String),
    #[error("Match not found for id/prefix: {0}")]
    MatchNotFound(String),
    #[error("{0}")]
    AmbiguousId(String),
    #[error(
        "Sync is not configured. Set RALLY_REMOTE_URL (and optionally RALLY_API_KEY) to enable `rally sync`."
    )]
    SyncNotConfigured,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rally=info".parse().expect("valid directive")),
        )
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);

    match cli.command {
        Commands::Player(command) => run_player(command, &db_path),
        Commands::Match(command) => run_match(command, &db_path),
        Commands::Game(command) => run_game(command, &db_path),
        Commands::Sync { command } => match command {
            None => run_sync(&db_path).await,
            Some(SyncCommands::Status { json }) => run_sync_status(json, &db_path),
            Some(SyncCommands::Watch { interval }) => run_sync_watch(interval, &db_path).await,
        },
    }
}

fn run_player(command: PlayerCommands, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let players = SqlitePlayerRepository::new(db.clone());

    match command {
        PlayerCommands::Add { name } => {
            let name = resolve_name(&name)?;
            let meta = SqliteMetadataStore::new(db);
            let device = DeviceIdentity::load_or_create(&meta)?;
            let player = players.create(&name, &device)?;
            println!("{}", player.id);
        }
        PlayerCommands::List { limit, json } => {
            let listed = players.list(limit, 0)?;
            if json {
                let items: Vec<PlayerListItem> = listed.iter().map(PlayerListItem::from).collect();
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else {
                for line in format_player_lines(&listed) {
                    println!("{line}");
                }
            }
        }
        PlayerCommands::Rename { id, name } => {
            let name = resolve_name(&name)?;
            let player_id = resolve_player_id(&players, &id)?;
            let player = players.rename(&player_id, &name)?;
            println!("{}", player.id);
        }
        PlayerCommands::Link { id, account } => {
            let player_id = resolve_player_id(&players, &id)?;
            let player = players.link_account(&player_id, &account)?;
            println!("{}", player.id);
        }
        PlayerCommands::Merge { id, into } => {
            let duplicate = resolve_player_id(&players, &id)?;
            let canonical = resolve_player_id(&players, &into)?;
            let player = players.merge(&duplicate, &canonical)?;
            println!("{}", player.id);
        }
    }

    Ok(())
}

fn run_match(command: MatchCommands, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let players = SqlitePlayerRepository::new(db.clone());
    let matches = SqliteMatchRepository::new(db);

    match command {
        MatchCommands::Add { home, away } => {
            let home = resolve_player_id(&players, &home)?;
            let away = resolve_player_id(&players, &away)?;
            let game_match = matches.create(&home, &away)?;
            println!("{}", game_match.id);
        }
        MatchCommands::List { limit, json } => {
            let listed = matches.list(limit, 0)?;
            if json {
                let items: Vec<MatchListItem> = listed
                    .iter()
                    .map(|game_match| MatchListItem::new(game_match, &players))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else {
                for line in format_match_lines(&listed, &players) {
                    println!("{line}");
                }
            }
        }
        MatchCommands::Complete { id } => {
            let match_id = resolve_match_id(&matches, &id)?;
            let game_match = matches.complete(&match_id)?;
            println!("{}", game_match.id);
        }
    }

    Ok(())
}

fn run_game(command: GameCommands, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let matches = SqliteMatchRepository::new(db.clone());
    let games = SqliteGameRepository::new(db);

    match command {
        GameCommands::Record {
            match_id,
            number,
            home,
            away,
        } => {
            let match_id = resolve_match_id(&matches, &match_id)?;
            let game = games.record(&match_id, number, home, away)?;
            println!("{}", game.id);
        }
        GameCommands::List { match_id, json } => {
            let match_id = resolve_match_id(&matches, &match_id)?;
            let listed = games.list_for_match(&match_id)?;
            if json {
                let items: Vec<GameListItem> = listed.iter().map(GameListItem::from).collect();
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else {
                for game in &listed {
                    println!("{}", format_game_line(game));
                }
            }
        }
    }

    Ok(())
}

async fn run_sync(db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let engine = build_sync_engine(&db)?;

    engine.sync_all().await;

    let pending = engine.pending_count()?;
    if pending == 0 {
        println!("Sync completed");
    } else {
        println!("Sync completed, {pending} record(s) still pending");
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct SyncStatus {
    device_id: String,
    pending_players: usize,
    pending_matches: usize,
    pending_games: usize,
    pending_total: usize,
    player_watermark: Option<String>,
    match_watermark: Option<String>,
    game_watermark: Option<String>,
    last_synced: Option<String>,
}

fn run_sync_status(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let status = collect_sync_status(&db)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("Device:  {}", status.device_id);
        println!(
            "Pending: {} ({} players, {} matches, {} games)",
            status.pending_total,
            status.pending_players,
            status.pending_matches,
            status.pending_games
        );
        println!(
            "Pulled through: players {}, matches {}, games {}",
            watermark_or_never(&status.player_watermark),
            watermark_or_never(&status.match_watermark),
            watermark_or_never(&status.game_watermark)
        );
        println!("Last synced: {}", watermark_or_never(&status.last_synced));
    }
    Ok(())
}

fn watermark_or_never(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("never")
}

async fn run_sync_watch(interval_secs: u64, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let engine = build_sync_engine(&db)?;

    let interval = if interval_secs == 0 {
        DEFAULT_SYNC_INTERVAL
    } else {
        Duration::from_secs(interval_secs)
    };

    engine.start(interval);
    println!("Syncing every {}s, press Ctrl-C to stop", interval.as_secs());
    tokio::signal::ctrl_c().await?;
    engine.stop();
    println!("Stopped");
    Ok(())
}

fn collect_sync_status(db: &Arc<Database>) -> Result<SyncStatus, CliError> {
    let players = SqlitePlayerRepository::new(db.clone());
    let matches = SqliteMatchRepository::new(db.clone());
    let games = SqliteGameRepository::new(db.clone());
    let meta = SqliteMetadataStore::new(db.clone());

    let device = DeviceIdentity::load_or_create(&meta)?;
    let pending_players = SyncStore::<Player>::count_unsynced(&players)?;
    let pending_matches = SyncStore::<Match>::count_unsynced(&matches)?;
    let pending_games = SyncStore::<GameResult>::count_unsynced(&games)?;

    let watermark = |key: &str| -> Result<Option<String>, CliError> {
        Ok(meta.watermark(key)?.map(format_sync_timestamp))
    };

    Ok(SyncStatus {
        device_id: device.as_str().to_string(),
        pending_players,
        pending_matches,
        pending_games,
        pending_total: pending_players + pending_matches + pending_games,
        player_watermark: watermark(keys::LAST_PLAYER_SYNC)?,
        match_watermark: watermark(keys::LAST_MATCH_SYNC)?,
        game_watermark: watermark(keys::LAST_GAME_SYNC)?,
        last_synced: watermark(keys::LAST_SYNCED)?,
    })
}

fn build_sync_engine(db: &Arc<Database>) -> Result<SyncEngine, CliError> {
    let config = RemoteConfig::from_env().ok_or(CliError::SyncNotConfigured)?;
    tracing::info!(endpoint = %config.endpoint, "Remote sync configured");
    let remote: Arc<dyn RemoteStore> = Arc::new(HttpRemoteStore::new(&config)?);
    let connectivity = Arc::new(ConnectivitySignal::new(true));
    Ok(build_engine(db, remote, connectivity, &EngineConfig::default())?)
}

fn open_database(path: &Path) -> Result<Arc<Database>, CliError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(Arc::new(Database::open(path)?))
}

fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("RALLY_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rally")
        .join("rally.db")
}

fn resolve_name(parts: &[String]) -> Result<String, CliError> {
    let name = parts.join(" ");
    let name = name.trim();
    if name.is_empty() {
        return Err(CliError::EmptyPlayerName);
    }
    Ok(name.to_string())
}

const RESOLVE_SCAN_LIMIT: usize = 500;

fn resolve_player_id(
    players: &SqlitePlayerRepository,
    query: &str,
) -> Result<PlayerId, CliError> {
    let query = query.trim();
    if let Ok(id) = query.parse::<PlayerId>() {
        if SyncStore::<Player>::get(players, &id.as_str())?.is_some() {
            return Ok(id);
        }
    }

    // Scan all profiles, merged duplicates included, so their history
    // stays addressable by id prefix
    let matching: Vec<PlayerId> = players
        .list_all(RESOLVE_SCAN_LIMIT, 0)?
        .into_iter()
        .filter(|player| player.id.as_str().starts_with(query))
        .map(|player| player.id)
        .collect();

    resolve_unique(matching, query)
        .ok_or_else(|| CliError::PlayerNotFound(query.to_string()))?
}

fn resolve_match_id(matches: &SqliteMatchRepository, query: &str) -> Result<MatchId, CliError> {
    let query = query.trim();
    if let Ok(id) = query.parse::<MatchId>() {
        if SyncStore::<Match>::get(matches, &id.as_str())?.is_some() {
            return Ok(id);
        }
    }

    let matching: Vec<MatchId> = matches
        .list(RESOLVE_SCAN_LIMIT, 0)?
        .into_iter()
        .filter(|game_match| game_match.id.as_str().starts_with(query))
        .map(|game_match| game_match.id)
        .collect();

    resolve_unique(matching, query)
        .ok_or_else(|| CliError::MatchNotFound(query.to_string()))?
}

/// Narrow prefix matches to exactly one id.
///
/// `None` means not found; the inner error reports ambiguity.
fn resolve_unique<T: ToString>(
    mut matching: Vec<T>,
    query: &str,
) -> Option<Result<T, CliError>> {
    match matching.len() {
        0 => None,
        1 => Some(Ok(matching.remove(0))),
        _ => {
            let options = matching
                .iter()
                .take(3)
                .map(|id| short_id(&id.to_string()))
                .collect::<Vec<_>>()
                .join(", ");
            Some(Err(CliError::AmbiguousId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            ))))
        }
    }
}

#[derive(Debug, Serialize)]
struct PlayerListItem {
    id: String,
    name: String,
    account_id: Option<String>,
    local_only: bool,
    synced: bool,
    created_at: String,
    updated_at: String,
}

impl From<&Player> for PlayerListItem {
    fn from(player: &Player) -> Self {
        Self {
            id: player.id.to_string(),
            name: player.name.clone(),
            account_id: player.account_id.clone(),
            local_only: player.is_local_only(),
            synced: player.synced,
            created_at: format_sync_timestamp(player.created_at),
            updated_at: format_sync_timestamp(player.updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
struct MatchListItem {
    id: String,
    home: String,
    away: String,
    completed: bool,
    started_at: String,
    synced: bool,
}

impl MatchListItem {
    fn new(game_match: &Match, players: &SqlitePlayerRepository) -> Self {
        Self {
            id: game_match.id.to_string(),
            home: player_name(players, &game_match.home_player),
            away: player_name(players, &game_match.away_player),
            completed: game_match.completed,
            started_at: format_sync_timestamp(game_match.started_at),
            synced: game_match.synced,
        }
    }
}

#[derive(Debug, Serialize)]
struct GameListItem {
    id: String,
    game_number: u32,
    home_score: u32,
    away_score: u32,
    synced: bool,
}

impl From<&GameResult> for GameListItem {
    fn from(game: &GameResult) -> Self {
        Self {
            id: game.id.to_string(),
            game_number: game.game_number,
            home_score: game.home_score,
            away_score: game.away_score,
            synced: game.synced,
        }
    }
}

fn format_player_lines(players: &[Player]) -> Vec<String> {
    let now = Utc::now();
    players
        .iter()
        .map(|player| {
            let marker = if player.is_local_only() { "local" } else { "" };
            format!(
                "{:<13}  {:<24}  {:<10}  {}",
                short_id(&player.id.to_string()),
                truncate(&player.name, 24),
                format_relative_time(player.updated_at, now),
                marker
            )
            .trim_end()
            .to_string()
        })
        .collect()
}

fn format_match_lines(matches: &[Match], players: &SqlitePlayerRepository) -> Vec<String> {
    let now = Utc::now();
    matches
        .iter()
        .map(|game_match| {
            let pairing = format!(
                "{} vs {}",
                player_name(players, &game_match.home_player),
                player_name(players, &game_match.away_player)
            );
            let state = if game_match.completed {
                "completed"
            } else {
                "in play"
            };
            format!(
                "{:<13}  {:<32}  {:<10}  {}",
                short_id(&game_match.id.to_string()),
                truncate(&pairing, 32),
                state,
                format_relative_time(game_match.started_at, now)
            )
        })
        .collect()
}

fn format_game_line(game: &GameResult) -> String {
    format!(
        "Game {}: {}-{}",
        game.game_number, game.home_score, game.away_score
    )
}

fn player_name(players: &SqlitePlayerRepository, id: &PlayerId) -> String {
    SyncStore::<Player>::get(players, &id.as_str())
        .ok()
        .flatten()
        .map_or_else(|| short_id(&id.to_string()), |player| player.name)
}

fn short_id(id: &str) -> String {
    id.chars().take(13).collect()
}

fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        value.to_string()
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = value.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

fn format_sync_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn format_relative_time(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = now.signed_duration_since(timestamp).num_milliseconds();
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

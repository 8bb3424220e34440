//! Command-line front end for the song library.
//!
//! # Responsibility
//! - Map subcommands onto `LibraryService` use cases.
//! - Exit non-zero on store, save or argument errors.

use clap::{Parser, Subcommand};
use log::error;
use songvault_core::service::DEFAULT_USERNAME;
use songvault_core::{
    default_log_level, init_logging, LibraryService, LogSettings, Song, StoreConfig,
    DEFAULT_STORE_NAME,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const DATA_DIR_NAME: &str = ".songvault";
const BACKGROUND_COMPLETION_TIMEOUT: Duration = Duration::from_secs(30);

/// SongVault - users, songs and background bulk deletes on a local store
#[derive(Parser)]
#[command(name = "songvault", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding the store and logs (default: ./.songvault)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Store name; the file is <data-dir>/<name>.sqlite3
    #[arg(long, global = true, default_value = DEFAULT_STORE_NAME)]
    store_name: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// User whose songs are listed and edited
    #[arg(long, global = true, default_value = DEFAULT_USERNAME)]
    username: String,
}

#[derive(Subcommand)]
enum Command {
    /// Add a "New Song" for the user, creating the user if needed
    Add,
    /// List the user's songs, newest first
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Rename the song at INDEX (as shown by `list`)
    Rename { index: usize, title: String },
    /// Delete the song at INDEX (as shown by `list`)
    Delete { index: usize },
    /// Delete every song (and, in the foreground, every user)
    DeleteAll {
        /// Delete songs on a background context
        #[arg(long)]
        background: bool,
    },
    /// Insert the preview user and a favorite sample song
    Seed,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("event=cli_exit module=cli status=error error={}", message);
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let data_dir = absolute_data_dir(cli.data_dir.as_deref())?;
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| default_log_level().to_string());
    init_logging(&LogSettings::new(level, data_dir.join("logs")).echo_to_stderr(true))
        .map_err(|err| err.to_string())?;

    let config = StoreConfig::new(&data_dir).with_name(cli.store_name.clone());
    let mut service = LibraryService::open(&config).map_err(|err| err.to_string())?;
    let username = cli.username.as_str();

    match cli.command {
        Command::Add => {
            let song = service.add_song(username).map_err(|err| err.to_string())?;
            println!("added \"{}\" for {}", song.title, username);
        }
        Command::List { json } => {
            let songs = service.songs_for_user(username);
            if json {
                let rendered =
                    serde_json::to_string_pretty(&songs).map_err(|err| err.to_string())?;
                println!("{rendered}");
            } else {
                print_songs(&songs);
            }
        }
        Command::Rename { index, title } => {
            let song = song_at(&mut service, username, index)?;
            service
                .update_song_title(song.object_id, &title)
                .map_err(|err| err.to_string())?;
            println!("renamed #{index} to \"{title}\"");
        }
        Command::Delete { index } => {
            let song = song_at(&mut service, username, index)?;
            service
                .delete_song(song.object_id)
                .map_err(|err| err.to_string())?;
            println!("deleted \"{}\"", song.title);
        }
        Command::DeleteAll { background: false } => {
            let deleted = service
                .delete_all_songs_and_users(|| println!("bulk delete finished"))
                .map_err(|err| err.to_string())?;
            println!("deleted {deleted} objects");
        }
        Command::DeleteAll { background: true } => {
            let done = Arc::new(AtomicBool::new(false));
            let signal = Arc::clone(&done);
            service.delete_all_songs_using_background(move || {
                signal.store(true, Ordering::Release);
                println!("background delete finished");
            });
            wait_for_completion(&mut service, &done)?;
            let remaining = service.songs_for_user(username).len();
            println!("{remaining} songs remain for {username}");
        }
        Command::Seed => {
            let (user, song) = service
                .seed_preview_data()
                .map_err(|err| err.to_string())?;
            println!("seeded \"{}\" for {}", song.title, user.username);
        }
    }
    Ok(())
}

fn absolute_data_dir(requested: Option<&Path>) -> Result<PathBuf, String> {
    let dir = requested
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DATA_DIR_NAME));
    if dir.is_absolute() {
        return Ok(dir);
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(dir))
        .map_err(|err| format!("cannot resolve working directory: {err}"))
}

fn song_at(service: &mut LibraryService, username: &str, index: usize) -> Result<Song, String> {
    let songs = service.songs_for_user(username);
    let count = songs.len();
    songs
        .into_iter()
        .nth(index)
        .ok_or_else(|| format!("no song at index {index} ({count} songs)"))
}

/// Drains the view context until the background completion has run.
fn wait_for_completion(service: &mut LibraryService, done: &AtomicBool) -> Result<(), String> {
    let deadline = Instant::now() + BACKGROUND_COMPLETION_TIMEOUT;
    while !done.load(Ordering::Acquire) {
        let now = Instant::now();
        if now >= deadline {
            return Err("timed out waiting for background delete".to_string());
        }
        service
            .controller_mut()
            .wait_for_main_queue(deadline - now);
    }
    Ok(())
}

fn print_songs(songs: &[Song]) {
    if songs.is_empty() {
        println!("no songs");
        return;
    }
    for (index, song) in songs.iter().enumerate() {
        println!(
            "{:>3}  {:<24} {:>7.1}s  recorded={}{}",
            index,
            song.title,
            song.duration,
            song.date_recorded,
            if song.is_favorite { "  *" } else { "" }
        );
    }
}

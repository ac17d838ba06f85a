//! Terminal front end for the course reader.
//!
//! - Parse the course id from the command line.
//! - Load `conf/config.toml` (or `COURSE_READER_CONFIG_PATH`).
//! - Wire the HTTP backend or offline collaborators plus the file cache.
//! - Drive the reader view-model from stdin commands.

use anyhow::{Context, Result, anyhow};
use course_reader::cache::{FileCache, LocalCache};
use course_reader::config::{AppConfig, config_path, load_config};
use course_reader::remote::http::{HttpBackend, is_transport_error};
use course_reader::remote::{AuthService, OfflineRemote, StaticAuth, User};
use course_reader::session::{CourseReader, ReaderCommand, ReaderOptions, ReaderServices, ReaderSnapshot};
use std::env;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

type ReloadHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

const HELP: &str = "commands: n | p | g <page> | t <topic> | c | note <text> | s | logout | q";

fn main() {
    let reload_handle = init_tracing();
    if let Err(err) = run(&reload_handle) {
        error!("{err:?}");
        std::process::exit(1);
    }
}

fn run(reload_handle: &ReloadHandle) -> Result<()> {
    let course_id = parse_args()?;
    let path = config_path();
    let config = load_config(&path);
    set_log_level(reload_handle, config.log_level.as_filter_str());
    info!(
        config = %path.display(),
        level = %config.log_level,
        remote = config.remote_enabled,
        "Starting course reader"
    );

    let services = build_services(&config)?;
    let auth = Arc::clone(&services.auth);
    let mut reader = CourseReader::open(&course_id, services, ReaderOptions::from(&config))?;
    info!(user = %reader.user().name, course_id = %course_id, "Reading");
    print_snapshot(&reader.snapshot());
    println!("{HELP}");

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("Failed to read stdin")?;
        let line = line.trim();
        if line == "q" {
            break;
        }
        if line == "logout" {
            auth.logout();
            info!("Signed out");
            break;
        }
        match parse_command(line) {
            Ok(command) => {
                let json_requested = matches!(command, ReaderCommand::GetSnapshot);
                let event = reader.apply_command(command);
                if json_requested {
                    let json = serde_json::to_string_pretty(&event.snapshot)
                        .context("Failed to encode snapshot")?;
                    println!("{json}");
                } else {
                    print_snapshot(&event.snapshot);
                }
            }
            Err(err) => println!("{err}\n{HELP}"),
        }
    }

    reader.shutdown();
    info!(stats = ?reader.sync_stats(), "Closing course reader");
    Ok(())
}

fn parse_args() -> Result<String> {
    env::args()
        .nth(1)
        .filter(|arg| !arg.trim().is_empty())
        .ok_or_else(|| anyhow!("Usage: course-reader <course-id>"))
}

const LOGIN_ATTEMPTS: usize = 3;

fn build_services(config: &AppConfig) -> Result<ReaderServices> {
    let file_cache = FileCache::new(&config.cache_dir);
    info!(cache_dir = %file_cache.root().display(), "Using local cache");
    let cache: Arc<dyn LocalCache> = Arc::new(file_cache);
    if !config.remote_enabled {
        info!("Remote store disabled; running offline");
        return Ok(offline_services(config, cache));
    }
    let backend = match HttpBackend::from_config(config) {
        Ok(backend) => Arc::new(backend),
        Err(err) => {
            warn!("Remote store unusable; running offline: {err:#}");
            return Ok(offline_services(config, cache));
        }
    };
    let verified = backend.verify();
    let auth = resolve_auth(backend.clone(), verified, config, prompt)?;
    Ok(ReaderServices {
        auth,
        catalog: backend.clone(),
        remote: backend,
        cache,
    })
}

/// Decide who reads. A verified or freshly signed-in user wins; the offline
/// identity is only used when the server never answered.
fn resolve_auth(
    auth: Arc<dyn AuthService>,
    verified: Result<Option<User>>,
    config: &AppConfig,
    ask: impl FnMut(&str) -> Result<String>,
) -> Result<Arc<dyn AuthService>> {
    match verified {
        Ok(Some(user)) => {
            info!(user_id = %user.id, "Restored session");
            return Ok(auth);
        }
        Ok(None) => {}
        Err(err) if is_transport_error(&err) => {
            warn!("Remote store unreachable; reading offline: {err:#}");
            return Ok(offline_auth(config));
        }
        Err(err) => warn!("Stored session rejected: {err:#}"),
    }
    match sign_in(auth.as_ref(), ask)? {
        SignIn::SignedIn => Ok(auth),
        SignIn::Unreachable => Ok(offline_auth(config)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignIn {
    SignedIn,
    Unreachable,
}

fn sign_in(auth: &dyn AuthService, mut ask: impl FnMut(&str) -> Result<String>) -> Result<SignIn> {
    for attempt in 1..=LOGIN_ATTEMPTS {
        let email = ask("email: ")?;
        if email.is_empty() {
            break;
        }
        let password = ask("password: ")?;
        match auth.login(&email, &password) {
            Ok(user) => {
                info!(user_id = %user.id, "Signed in");
                return Ok(SignIn::SignedIn);
            }
            Err(err) if is_transport_error(&err) => {
                warn!("Remote store unreachable; reading offline: {err:#}");
                return Ok(SignIn::Unreachable);
            }
            Err(err) => warn!(attempt, "Sign-in rejected: {err:#}"),
        }
    }
    Err(anyhow!("sign in required"))
}

fn offline_auth(config: &AppConfig) -> Arc<dyn AuthService> {
    Arc::new(StaticAuth::new(Some(offline_user(config))))
}

fn offline_services(config: &AppConfig, cache: Arc<dyn LocalCache>) -> ReaderServices {
    let offline = Arc::new(OfflineRemote);
    ReaderServices {
        auth: offline_auth(config),
        catalog: offline.clone(),
        remote: offline,
        cache,
    }
}

fn offline_user(config: &AppConfig) -> User {
    User {
        id: "offline".to_string(),
        name: config.offline_user_name.clone(),
        email: config.offline_user_email.clone(),
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{label}");
    io::stdout().flush().context("Failed to flush stdout")?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read stdin")?;
    Ok(line.trim().to_string())
}

/// Map a prompt line to a reader command. Page and topic numbers are 1-based.
fn parse_command(line: &str) -> Result<ReaderCommand> {
    let (head, rest) = match line.split_once(' ') {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };
    let command = match head {
        "n" => ReaderCommand::NextPage,
        "p" => ReaderCommand::PrevPage,
        "c" => ReaderCommand::MarkTopicComplete,
        "s" => ReaderCommand::GetSnapshot,
        "g" => ReaderCommand::SetPage {
            page: parse_position(rest)?,
        },
        "t" => ReaderCommand::SelectTopic {
            topic_idx: parse_position(rest)?,
        },
        "note" => ReaderCommand::SetNote {
            text: rest.to_string(),
        },
        other => return Err(anyhow!("unknown command `{other}`")),
    };
    Ok(command)
}

fn parse_position(raw: &str) -> Result<usize> {
    let value: usize = raw
        .parse()
        .with_context(|| format!("expected a number, got `{raw}`"))?;
    value
        .checked_sub(1)
        .ok_or_else(|| anyhow!("numbers start at 1"))
}

fn print_snapshot(snapshot: &ReaderSnapshot) {
    let topic_title = snapshot
        .topics
        .get(snapshot.active_topic_idx)
        .map_or("", |topic| topic.title.as_str());
    println!(
        "{} | topic {}/{} {} | page {}/{} {} | progress {}%{}",
        snapshot.course_title,
        snapshot.active_topic_idx + 1,
        snapshot.topics.len(),
        topic_title,
        snapshot.active_page + 1,
        snapshot.page_count,
        snapshot.page_ref.as_deref().unwrap_or("-"),
        snapshot.overall_progress,
        if snapshot.course_complete {
            " | course complete"
        } else {
            ""
        }
    );
    if let Some(note) = &snapshot.note {
        println!("note: {note}");
    }
}

fn init_tracing() -> ReloadHandle {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter_layer, handle) = reload::Layer::new(env_filter);
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_filter(filter_layer),
        )
        .init();
    handle
}

fn set_log_level(handle: &ReloadHandle, level: &str) {
    if env::var_os("RUST_LOG").is_some() {
        return;
    }
    let parsed = EnvFilter::builder()
        .parse(level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    if let Err(err) = handle.modify(|filter| *filter = parsed) {
        warn!(%level, "Failed to update log level from config: {err}");
    }
}

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use attendance_tracker::attendance::{compute_stats, AttendanceRecord, AttendanceStatus};
use attendance_tracker::config::{Config, ConfigOverrides};
use attendance_tracker::error::ScheduleError;
use attendance_tracker::extraction::{
    assign_ids, extract_schedule, mime_type_for, GeminiExtractor, RawScheduleEntry,
};
use attendance_tracker::output::csv::{records_to_csv, schedule_to_csv};
use attendance_tracker::output::render_json;
use attendance_tracker::output::table::{
    render_conflicts_table, render_day_table, render_schedule_table, render_stats_table,
};
use attendance_tracker::schedule::{
    detect_conflicts, ensure_fully_resolved, entries_for_day, resolve_conflicts,
    unresolved_conflicts, Conflict, Resolutions, ScheduleEntry, UuidIds, WEEKDAYS,
};
use attendance_tracker::server::run_server;
use attendance_tracker::store::{DataStore, JsonFileStore};
use chrono::{Datelike, Local, NaiveDate};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(Debug, Parser)]
#[command(
    name = "attendance-tracker",
    about = "Timetable conflict resolution and attendance tracking"
)]
struct Cli {
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(short, long)]
    data_dir: Option<String>,
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List same-slot group conflicts in a schedule file.
    Detect {
        #[arg(long)]
        input: PathBuf,
    },
    /// Keep one group per conflict, e.g. `--pick 1=G2`, then print, write or save.
    Resolve {
        #[arg(long)]
        input: PathBuf,
        #[arg(long = "pick", value_name = "N=GROUP")]
        picks: Vec<String>,
        #[arg(long)]
        strict: bool,
        #[arg(long)]
        write: Option<PathBuf>,
        /// Save the resolved schedule for this user, keeping their records.
        #[arg(long)]
        user: Option<String>,
    },
    /// Read a timetable image, apply any picks and optionally save it for a user.
    Extract {
        #[arg(long)]
        image: PathBuf,
        #[arg(long = "pick", value_name = "N=GROUP")]
        picks: Vec<String>,
        #[arg(long)]
        write: Option<PathBuf>,
        #[arg(long)]
        user: Option<String>,
    },
    /// Attendance percentage and counts for a user.
    Stats {
        #[arg(long)]
        user: String,
    },
    /// A day's classes, with today's marks when the day is today.
    Today {
        #[arg(long)]
        user: String,
        #[arg(long)]
        day: Option<String>,
    },
    /// Record attendance for one class on one date.
    Mark {
        #[arg(long)]
        user: String,
        #[arg(long)]
        entry: String,
        #[arg(long)]
        status: AttendanceStatus,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Run the REST API.
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Write or print the TOML config.
    Config {
        #[arg(long)]
        init: bool,
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load(Some(&config_path))?;
    let (host, port) = match &cli.command {
        Commands::Serve { host, port } => (host.clone(), *port),
        _ => (None, None),
    };
    config.apply_overrides(ConfigOverrides {
        data_dir: cli.data_dir.clone(),
        host,
        port,
    });

    match &cli.command {
        Commands::Config { init, show } => {
            if *init {
                Config::write_template(&config_path)?;
                println!("Wrote config template to {}", config_path.display());
            }
            if *show || !*init {
                println!("{}", render_json(&config)?);
            }
        }
        Commands::Serve { .. } => {
            let bind = format!("{}:{}", config.server.host, config.server.port);
            let addr: SocketAddr = bind
                .parse()
                .map_err(|e| anyhow!("invalid bind address {bind}: {e}"))?;
            run_server(config, addr).await?;
        }
        Commands::Detect { input } => {
            let schedule = read_schedule(input)?;
            let conflicts = detect_conflicts(&schedule);
            print_conflicts(&conflicts, cli.output)?;
        }
        Commands::Resolve {
            input,
            picks,
            strict,
            write,
            user,
        } => {
            let schedule = read_schedule(input)?;
            let resolved = apply_picks(&schedule, picks, *strict)?;
            if let Some(path) = write {
                write_schedule(path, &resolved)?;
            }
            match user {
                Some(user) => {
                    let saved = save_schedule(&open_store(&config)?, user, resolved).await?;
                    println!("Saved {saved} entries for {user}");
                }
                None if write.is_none() => print_schedule(&resolved, cli.output)?,
                None => {}
            }
        }
        Commands::Extract {
            image,
            picks,
            write,
            user,
        } => {
            let bytes = std::fs::read(image)
                .with_context(|| format!("failed reading image {}", image.display()))?;
            let extractor = GeminiExtractor::from_config(&config.extraction)?;
            let schedule =
                extract_schedule(&extractor, &bytes, mime_type_for(image), &UuidIds).await?;
            let conflicts = detect_conflicts(&schedule);
            print_schedule(&schedule, cli.output)?;
            if !conflicts.is_empty() {
                print_conflicts(&conflicts, cli.output)?;
            }
            if let Some(path) = write {
                write_schedule(path, &schedule)?;
            }

            if let Some(user) = user {
                let resolutions = parse_picks(picks, &conflicts)?;
                if let Err(err) = ensure_fully_resolved(&conflicts, &resolutions) {
                    warn!("{err}; pass --pick N=GROUP for each conflict to save for {user}");
                } else {
                    let resolved = resolve_conflicts(&schedule, &conflicts, &resolutions);
                    let saved = save_schedule(&open_store(&config)?, user, resolved).await?;
                    println!("Saved {saved} entries for {user}");
                }
            }
        }
        Commands::Stats { user } => {
            let store = open_store(&config)?;
            let data = store.load_data(user).await?;
            let stats = compute_stats(&data.records);
            match cli.output {
                OutputFormat::Table => println!("{}", render_stats_table(&stats)),
                OutputFormat::Json => println!("{}", render_json(&stats)?),
                OutputFormat::Csv => println!("{}", records_to_csv(&data.records)?),
            }
        }
        Commands::Today { user, day } => {
            let store = open_store(&config)?;
            let data = store.load_data(user).await?;
            let today = Local::now().date_naive();
            let today_name = WEEKDAYS[today.weekday().num_days_from_monday() as usize];
            let day = day.clone().unwrap_or_else(|| today_name.to_string());
            let date = day.eq_ignore_ascii_case(today_name).then_some(today);
            let entries = entries_for_day(&data.schedule, &day);
            match cli.output {
                OutputFormat::Table => {
                    println!("{}", render_day_table(&day, &entries, &data.records, date))
                }
                OutputFormat::Json => println!("{}", render_json(&entries)?),
                OutputFormat::Csv => {
                    let owned: Vec<ScheduleEntry> = entries.into_iter().cloned().collect();
                    println!("{}", schedule_to_csv(&owned)?);
                }
            }
        }
        Commands::Mark {
            user,
            entry,
            status,
            date,
        } => {
            let store = open_store(&config)?;
            let date = date.unwrap_or_else(|| Local::now().date_naive());
            let record = AttendanceRecord::new(&UuidIds, entry.clone(), date, *status);
            let data = store.mark_attendance(user, record).await?;
            let stats = compute_stats(&data.records);
            println!("Marked {entry} {status} on {date}");
            print_value(&stats, render_stats_table(&stats), cli.output)?;
        }
    }

    Ok(())
}

fn open_store(config: &Config) -> Result<JsonFileStore> {
    let dir = config.resolved_data_dir();
    JsonFileStore::open(&dir)
        .with_context(|| format!("failed opening data directory {}", dir.display()))
}

/// Accepts a bare entry array or a saved `{ schedule, records }` document.
fn read_schedule(path: &Path) -> Result<Vec<ScheduleEntry>> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("failed reading schedule {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&data)
        .with_context(|| format!("failed parsing schedule JSON {}", path.display()))?;
    let rows = match value.get("schedule") {
        Some(schedule) => schedule.clone(),
        None => value,
    };
    let raw: Vec<RawScheduleEntry> = serde_json::from_value(rows)
        .with_context(|| format!("{} is not a schedule", path.display()))?;
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    Ok(assign_ids(raw, &UuidIds)?)
}

/// Resolves a fresh detection with `N=GROUP` picks. Unpicked conflicts keep every group
/// unless `strict` is set.
fn apply_picks(
    schedule: &[ScheduleEntry],
    picks: &[String],
    strict: bool,
) -> Result<Vec<ScheduleEntry>> {
    let conflicts = detect_conflicts(schedule);
    let resolutions = parse_picks(picks, &conflicts)?;
    if strict {
        ensure_fully_resolved(&conflicts, &resolutions)?;
    } else {
        for conflict in unresolved_conflicts(&conflicts, &resolutions) {
            warn!("no pick for {}, keeping every group", conflict.slot());
        }
    }
    let resolved = resolve_conflicts(schedule, &conflicts, &resolutions);
    info!(
        "kept {} of {} entries across {} conflicts",
        resolved.len(),
        schedule.len(),
        conflicts.len()
    );
    Ok(resolved)
}

async fn save_schedule(
    store: &dyn DataStore,
    user: &str,
    schedule: Vec<ScheduleEntry>,
) -> Result<usize> {
    let data = store.replace_schedule(user, schedule).await?;
    info!(
        "saved {} entries for {user}, {} records kept",
        data.schedule.len(),
        data.records.len()
    );
    Ok(data.schedule.len())
}

fn write_schedule(path: &Path, schedule: &[ScheduleEntry]) -> Result<()> {
    std::fs::write(path, render_json(schedule)?)
        .with_context(|| format!("failed writing {}", path.display()))?;
    println!("Wrote {} entries to {}", schedule.len(), path.display());
    Ok(())
}

/// Maps `N=GROUP` picks onto the ids of a fresh detection. `N` is 1-based.
fn parse_picks(picks: &[String], conflicts: &[Conflict]) -> Result<Resolutions, ScheduleError> {
    let mut resolutions = Resolutions::new();
    for pick in picks {
        let (number, group) = pick
            .split_once('=')
            .ok_or_else(|| ScheduleError::InvalidSelection(pick.clone()))?;
        let number: usize = number
            .trim()
            .parse()
            .map_err(|_| ScheduleError::InvalidSelection(pick.clone()))?;
        let conflict = number
            .checked_sub(1)
            .and_then(|idx| conflicts.get(idx))
            .ok_or(ScheduleError::UnknownConflict(number))?;
        let group = group.trim();
        if conflict.option(group).is_none() {
            return Err(ScheduleError::InvalidSelection(pick.clone()));
        }
        resolutions.insert(conflict.id.clone(), group.to_string());
    }
    Ok(resolutions)
}

fn print_conflicts(conflicts: &[Conflict], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table if conflicts.is_empty() => println!("No conflicts found."),
        OutputFormat::Table => println!("{}", render_conflicts_table(conflicts)),
        OutputFormat::Json | OutputFormat::Csv => println!("{}", render_json(conflicts)?),
    }
    Ok(())
}

fn print_schedule(schedule: &[ScheduleEntry], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_schedule_table(schedule)),
        OutputFormat::Json => println!("{}", render_json(schedule)?),
        OutputFormat::Csv => println!("{}", schedule_to_csv(schedule)?),
    }
    Ok(())
}

fn print_value<T: Serialize>(value: &T, table: String, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table | OutputFormat::Csv => println!("{table}"),
        OutputFormat::Json => println!("{}", render_json(value)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use attendance_tracker::attendance::{AttendanceRecord, AttendanceStatus};
    use attendance_tracker::error::ScheduleError;
    use attendance_tracker::schedule::{detect_conflicts, ScheduleEntry, SequentialIds};
    use attendance_tracker::store::{DataStore, JsonFileStore};
    use chrono::NaiveDate;
    use serde_json::json;

    use super::{apply_picks, parse_picks, read_schedule, save_schedule};

    fn conflicts() -> Vec<attendance_tracker::schedule::Conflict> {
        detect_conflicts(&[
            ScheduleEntry::new("1", "Monday", "9:00 AM", "10:00 AM", "Math").with_group("G1"),
            ScheduleEntry::new("2", "Monday", "9:00 AM", "10:00 AM", "Physics").with_group("G2"),
        ])
    }

    #[test]
    fn picks_map_ordinals_to_conflict_ids() {
        let conflicts = conflicts();
        let resolutions = parse_picks(&["1=G2".to_string()], &conflicts).expect("parse picks");
        assert_eq!(resolutions.get(&conflicts[0].id).map(String::as_str), Some("G2"));
    }

    #[test]
    fn bad_picks_are_rejected() {
        let conflicts = conflicts();
        assert!(matches!(
            parse_picks(&["2=G1".to_string()], &conflicts),
            Err(ScheduleError::UnknownConflict(2))
        ));
        assert!(matches!(
            parse_picks(&["0=G1".to_string()], &conflicts),
            Err(ScheduleError::UnknownConflict(0))
        ));
        assert!(matches!(
            parse_picks(&["1-G1".to_string()], &conflicts),
            Err(ScheduleError::InvalidSelection(_))
        ));
        assert!(matches!(
            parse_picks(&["1=G3".to_string()], &conflicts),
            Err(ScheduleError::InvalidSelection(_))
        ));
    }

    #[tokio::test]
    async fn resolved_schedule_file_is_saved_for_a_user() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = dir.path().join("week.json");
        let rows = json!([
            {"day": "Monday", "startTime": "9:00 AM", "endTime": "10:00 AM", "subject": "Math", "group": "G1"},
            {"day": "Monday", "startTime": "9:00 AM", "endTime": "10:00 AM", "subject": "Physics", "group": "G2"},
            {"id": "art", "day": "Tuesday", "startTime": "9:00 AM", "endTime": "10:00 AM", "subject": "Art"}
        ]);
        std::fs::write(&input, rows.to_string()).expect("write schedule");

        let schedule = read_schedule(&input).expect("read schedule");
        assert_eq!(schedule.len(), 3);
        assert!(apply_picks(&schedule, &[], true).is_err());
        let resolved = apply_picks(&schedule, &["1=G2".to_string()], true).expect("resolve");

        let store = JsonFileStore::open(&dir.path().join("data")).expect("open store");
        let date = NaiveDate::from_ymd_opt(2024, 9, 3).expect("valid date");
        let seeded = vec![ScheduleEntry::new("art", "Tuesday", "9:00 AM", "10:00 AM", "Art")];
        store.replace_schedule("u1", seeded).await.expect("seed");
        store
            .mark_attendance(
                "u1",
                AttendanceRecord::new(
                    &SequentialIds::new("rec"),
                    "art",
                    date,
                    AttendanceStatus::Present,
                ),
            )
            .await
            .expect("mark");

        let saved = save_schedule(&store, "u1", resolved).await.expect("save");
        assert_eq!(saved, 2);
        let data = store.load_data("u1").await.expect("load");
        let subjects: Vec<&str> = data.schedule.iter().map(|e| e.subject.as_str()).collect();
        assert_eq!(subjects, vec!["Physics", "Art"]);
        assert_eq!(data.records.len(), 1);
    }
}

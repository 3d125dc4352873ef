mod config;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Local, LocalResult, Utc};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use gatehouse_core::{
    site_summary, AccessEventBus, AccessStore, Descriptor, NewPerson, PersonKind, PresenceStatus,
    Reconciler, ScanFlow, ScanKind, ScanOutcome, SessionAmendment, SiteSettings,
};
use gatehouse_store::{DescriptorCipher, SqliteStore};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "gatehouse", about = "Construction site access control CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage construction sites
    Site {
        #[command(subcommand)]
        command: SiteCommands,
    },
    /// Manage registered people
    Person {
        #[command(subcommand)]
        command: PersonCommands,
    },
    /// Search people by exact national id or name fragment
    Search {
        #[arg(short, long)]
        site: Uuid,
        query: String,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Record an entry for a person
    Entry {
        #[arg(short, long)]
        site: Uuid,
        person: Uuid,
        #[arg(short, long)]
        operator: Option<String>,
        #[arg(short, long)]
        note: Option<String>,
    },
    /// Record an exit for a person
    Exit {
        #[arg(short, long)]
        site: Uuid,
        person: Uuid,
        #[arg(short, long)]
        operator: Option<String>,
    },
    /// Identify a probe descriptor against a site's candidate pool
    Scan {
        #[command(subcommand)]
        command: ScanCommands,
    },
    /// List everyone currently inside a site
    Inside {
        #[arg(short, long)]
        site: Uuid,
    },
    /// Show today's presence summary for a site
    Summary {
        #[arg(short, long)]
        site: Uuid,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Close a session without an exit scan (supervisor)
    ForceExit {
        session: Uuid,
        #[arg(short, long)]
        operator: String,
        #[arg(short, long)]
        reason: String,
    },
    /// Void a session so it no longer counts for anything (supervisor)
    Void {
        session: Uuid,
        #[arg(short, long)]
        operator: String,
        #[arg(short, long)]
        reason: String,
    },
    /// Correct a session's recorded times or note (supervisor)
    Amend {
        session: Uuid,
        /// New entry time, RFC 3339
        #[arg(long)]
        entry_at: Option<String>,
        /// New exit time, RFC 3339
        #[arg(long)]
        exit_at: Option<String>,
        #[arg(long)]
        note: Option<String>,
        #[arg(short, long)]
        operator: String,
        #[arg(short, long)]
        reason: String,
    },
    /// Read or change per-site presence thresholds
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
    /// Show recent audit records for a site
    Audit {
        #[arg(short, long)]
        site: Uuid,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

#[derive(Subcommand)]
enum SiteCommands {
    /// Create a site
    Add { name: String },
    /// List all sites
    List,
}

#[derive(Subcommand)]
enum PersonCommands {
    /// Register a person at a site
    Add {
        #[arg(short, long)]
        site: Uuid,
        #[arg(long)]
        national_id: String,
        #[arg(long)]
        name: String,
        /// Register as a visitor instead of a worker
        #[arg(long)]
        visitor: bool,
        #[arg(long)]
        contractor: Option<String>,
        /// JSON file with the initial face descriptor
        #[arg(long)]
        descriptor: Option<PathBuf>,
    },
    /// List people registered at a site
    List {
        #[arg(short, long)]
        site: Uuid,
    },
    /// Set or clear a person's face descriptor
    Descriptor {
        person: Uuid,
        /// JSON file with the new descriptor
        #[arg(long, conflicts_with = "clear")]
        file: Option<PathBuf>,
        /// Remove the stored descriptor
        #[arg(long)]
        clear: bool,
        #[arg(short, long)]
        operator: Option<String>,
    },
}

#[derive(Subcommand)]
enum ScanCommands {
    /// Identify against everyone enrolled at the site
    Entry {
        #[arg(short, long)]
        site: Uuid,
        /// JSON file with the probe descriptor
        #[arg(long)]
        descriptor: PathBuf,
        /// Record the entry when the scan matches
        #[arg(long)]
        commit: bool,
        #[arg(short, long)]
        operator: Option<String>,
    },
    /// Identify against people currently inside
    Exit {
        #[arg(short, long)]
        site: Uuid,
        /// JSON file with the probe descriptor
        #[arg(long)]
        descriptor: PathBuf,
        /// Record the exit when the scan matches
        #[arg(long)]
        commit: bool,
        #[arg(short, long)]
        operator: Option<String>,
    },
}

#[derive(Subcommand)]
enum SettingsCommands {
    /// Show the thresholds in effect for a site
    Get {
        #[arg(short, long)]
        site: Uuid,
    },
    /// Change a site's presence thresholds, in hours
    Set {
        #[arg(short, long)]
        site: Uuid,
        #[arg(long)]
        warn: f64,
        #[arg(long)]
        crit: f64,
        #[arg(short, long)]
        operator: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    let store = open_store(&config).await?;
    let reconciler = Reconciler::new(store.clone(), AccessEventBus::default())
        .with_duplicate_window(config.duplicate_window_secs);

    match cli.command {
        Commands::Site { command } => match command {
            SiteCommands::Add { name } => {
                let site = store.create_site(name).await?;
                println!("created site {} ({})", site.name, site.site_id);
            }
            SiteCommands::List => {
                for site in store.list_sites().await? {
                    println!("{} {}", site.site_id, site.name);
                }
            }
        },
        Commands::Person { command } => match command {
            PersonCommands::Add { site, national_id, name, visitor, contractor, descriptor } => {
                let descriptor = descriptor.as_deref().map(read_descriptor).transpose()?;
                let kind = if visitor { PersonKind::Visitor } else { PersonKind::Worker };
                let person = store
                    .add_person(NewPerson {
                        site_id: site,
                        national_id,
                        full_name: name,
                        kind,
                        contractor,
                        descriptor,
                    })
                    .await?;
                println!("registered {} ({})", person.full_name, person.person_id);
            }
            PersonCommands::List { site } => {
                for person in store.list_people(site).await? {
                    let enrolled = if person.descriptor.is_some() { " [enrolled]" } else { "" };
                    let contractor = person.contractor.as_deref().unwrap_or("-");
                    println!(
                        "{} {} ({}) {} {}{}",
                        person.person_id,
                        person.full_name,
                        person.national_id,
                        person.kind,
                        contractor,
                        enrolled
                    );
                }
            }
            PersonCommands::Descriptor { person, file, clear, operator } => {
                if clear {
                    reconciler.set_descriptor(person, None, operator.as_deref()).await?;
                    println!("descriptor cleared");
                } else if let Some(file) = file {
                    let descriptor = read_descriptor(&file)?;
                    reconciler
                        .set_descriptor(person, Some(descriptor), operator.as_deref())
                        .await?;
                    println!("descriptor set");
                } else {
                    anyhow::bail!("pass --file <json> or --clear");
                }
            }
        },
        Commands::Search { site, query, limit } => {
            let hits = store.search_people(site, query, limit).await?;
            if hits.is_empty() {
                println!("no matches");
            }
            for hit in hits {
                let marker = if hit.is_inside() { " [inside]" } else { "" };
                println!(
                    "{} {} ({}){}",
                    hit.person.person_id, hit.person.full_name, hit.person.national_id, marker
                );
            }
        }
        Commands::Entry { site, person, operator, note } => {
            let session = reconciler
                .record_entry(site, person, operator.as_deref(), note.as_deref())
                .await?;
            println!(
                "entry recorded for {}: session {}",
                session.name_snapshot, session.session_id
            );
        }
        Commands::Exit { site, person, operator } => {
            let session = reconciler.record_exit(site, person, operator.as_deref()).await?;
            if let Some(exit_at) = session.exit_at {
                println!(
                    "exit recorded for {} at {}",
                    session.name_snapshot,
                    exit_at.to_rfc3339()
                );
            }
        }
        Commands::Scan { command } => match command {
            ScanCommands::Entry { site, descriptor, commit, operator } => {
                let probe = read_descriptor(&descriptor)?;
                let flow = ScanFlow::new(store.clone()).with_threshold(config.match_threshold);
                let outcome = flow.identify(site, ScanKind::Entry, &probe).await?;
                report_scan(&outcome);
                if commit {
                    if let ScanOutcome::Matched(hit) = outcome {
                        let session = reconciler
                            .record_entry(site, hit.person.person_id, operator.as_deref(), None)
                            .await?;
                        println!("entry recorded: session {}", session.session_id);
                    }
                }
            }
            ScanCommands::Exit { site, descriptor, commit, operator } => {
                let probe = read_descriptor(&descriptor)?;
                let flow = ScanFlow::new(store.clone()).with_threshold(config.match_threshold);
                let outcome = flow.identify(site, ScanKind::Exit, &probe).await?;
                report_scan(&outcome);
                if commit {
                    if let ScanOutcome::Matched(hit) = outcome {
                        let session = reconciler
                            .record_exit(site, hit.person.person_id, operator.as_deref())
                            .await?;
                        println!("exit recorded: session {}", session.session_id);
                    }
                }
            }
        },
        Commands::Inside { site } => {
            let summary = site_summary(&store, site, local_day_start(), Utc::now()).await?;
            if summary.inside.is_empty() {
                println!("nobody inside");
            }
            for record in &summary.inside {
                println!(
                    "{} ({}) in for {:.1} h [{}]",
                    record.session.name_snapshot,
                    record.session.national_id_snapshot,
                    record.hours,
                    status_tag(record.status)
                );
            }
        }
        Commands::Summary { site, json } => {
            let summary = site_summary(&store, site, local_day_start(), Utc::now()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("inside now:      {}", summary.inside_now);
                println!("entries today:   {}", summary.entries_today);
                println!("exits today:     {}", summary.exits_today);
                println!("over warn:       {}", summary.warn_count);
                println!("over critical:   {}", summary.crit_count);
            }
        }
        Commands::ForceExit { session, operator, reason } => {
            let closed = reconciler.force_exit(session, &operator, &reason).await?;
            println!("session {} force-closed", closed.session_id);
        }
        Commands::Void { session, operator, reason } => {
            let voided = reconciler.void_session(session, &operator, &reason).await?;
            println!("session {} voided", voided.session_id);
        }
        Commands::Amend { session, entry_at, exit_at, note, operator, reason } => {
            let amendment = SessionAmendment {
                entry_at: entry_at.as_deref().map(parse_utc).transpose()?,
                exit_at: exit_at.as_deref().map(parse_utc).transpose()?,
                note,
            };
            let amended = reconciler
                .amend_session(session, amendment, &operator, &reason)
                .await?;
            println!("session {} amended", amended.session_id);
        }
        Commands::Settings { command } => match command {
            SettingsCommands::Get { site } => {
                let s = store.settings(site).await?;
                println!("warn after {:.1} h, critical after {:.1} h", s.warn_hours, s.crit_hours);
            }
            SettingsCommands::Set { site, warn, crit, operator } => {
                let stored = reconciler
                    .update_settings(
                        SiteSettings {
                            site_id: site,
                            warn_hours: warn,
                            crit_hours: crit,
                            updated_at: Utc::now(),
                        },
                        operator.as_deref(),
                    )
                    .await?;
                println!(
                    "thresholds set: warn {:.1} h, critical {:.1} h",
                    stored.warn_hours, stored.crit_hours
                );
            }
        },
        Commands::Audit { site, limit } => {
            for record in store.recent_audit(site, limit).await? {
                let operator = record.operator.as_deref().unwrap_or("-");
                let entity = record
                    .entity_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "-".into());
                let note = record.note.as_deref().unwrap_or("");
                println!(
                    "{} {} by {} on {} {}",
                    record.recorded_at.to_rfc3339(),
                    record.action,
                    operator,
                    entity,
                    note
                );
            }
        }
    }

    Ok(())
}

async fn open_store(config: &Config) -> Result<SqliteStore> {
    let cipher = if config.encrypt {
        Some(DescriptorCipher::load_or_create(&config.key_path)?)
    } else {
        None
    };
    tracing::debug!(db = %config.db_path.display(), encrypted = config.encrypt, "opening store");
    Ok(SqliteStore::open(&config.db_path, cipher).await?)
}

fn read_descriptor(path: &Path) -> Result<Descriptor> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading descriptor file {}", path.display()))?;
    Ok(Descriptor::from_json(&raw)?)
}

fn parse_utc(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("invalid RFC 3339 timestamp: {s}"))?
        .with_timezone(&Utc))
}

/// Local midnight as a UTC instant; "today" on a site follows the wall clock.
fn local_day_start() -> DateTime<Utc> {
    let fallback = Utc::now() - Duration::hours(24);
    let Some(midnight) = Local::now().date_naive().and_hms_opt(0, 0, 0) else {
        return fallback;
    };
    match midnight.and_local_timezone(Local) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
        LocalResult::None => fallback,
    }
}

fn report_scan(outcome: &ScanOutcome) {
    match outcome {
        ScanOutcome::Matched(hit) => {
            let inside = if hit.open_session_id.is_some() { " (currently inside)" } else { "" };
            println!(
                "matched {} ({}) at distance {:.3}{}",
                hit.person.full_name, hit.person.national_id, hit.distance, inside
            );
        }
        ScanOutcome::NoMatch { best_distance: Some(d) } => {
            println!("no match; nearest candidate at distance {d:.3}");
        }
        ScanOutcome::NoMatch { best_distance: None } => println!("no match"),
        ScanOutcome::NoCandidates => println!("no candidates to match against"),
        ScanOutcome::NoFace => println!("no usable face in the frame"),
    }
}

fn status_tag(status: PresenceStatus) -> &'static str {
    match status {
        PresenceStatus::Ok => "ok",
        PresenceStatus::Warn => "warn",
        PresenceStatus::Crit => "crit",
    }
}

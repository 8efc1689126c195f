//! `roll`: record and report attendance from the command line.
//!
//! Reads `roll.toml` (or the path given with `--config`), opens the SQLite
//! store, loads the roster of known users, events and meetings, runs one
//! operation and prints its result as JSON on stdout. Logs go to stderr.
//!
//! ```
//! roll create --user 42 --parent-type event --parent 7 --submitted-by admin
//! roll stats --parent-type event --parent 7
//! roll summary --org acme --period monthly --from 2023-01-01 --to 2023-12-31
//! ```

mod roster;
mod settings;

use std::{path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::Context as _;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::{Args, Parser, Subcommand};
use roll_core::{
  EntityId, ErrorKind,
  bulk::BulkItem,
  directory::{ParentDirectories, StaticUsers},
  id::parse_record_id,
  query::{CallerContext, DateRange, RecordFilter},
  record::{AttendancePatch, AttendanceStatus, NewAttendance, ParentRef, ParentType},
  report::Period,
};
use roll_engine::AttendanceService;
use roll_store_sqlite::SqliteStore;
use serde::Serialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::{roster::Roster, settings::Settings};

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "roll", author, version, about = "Attendance tracking and reporting")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "roll.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Record one user's attendance.
  Create {
    #[arg(long)]
    user:         EntityId,
    #[command(flatten)]
    parent:       ParentArgs,
    #[arg(long, value_parser = AttendanceStatus::parse)]
    status:       Option<AttendanceStatus>,
    #[arg(long)]
    notes:        Option<String>,
    #[arg(long)]
    question:     Option<EntityId>,
    #[arg(long)]
    submitted_by: EntityId,
    /// Used only when the parent has no organization.
    #[arg(long)]
    org:          Option<EntityId>,
  },
  /// Record attendance for a batch of users read from a JSON file.
  Bulk {
    #[command(flatten)]
    parent:       ParentArgs,
    /// JSON array of `{ "user_id", "status"?, "notes"?, "question_id"? }`.
    #[arg(long)]
    items:        PathBuf,
    #[arg(long)]
    submitted_by: EntityId,
    #[arg(long)]
    org:          Option<EntityId>,
  },
  /// Fetch a record by id.
  Get { id: String },
  /// Fetch the record for a user at a parent, if any.
  Find {
    #[arg(long)]
    user:   EntityId,
    #[command(flatten)]
    parent: ParentArgs,
  },
  /// List records, newest first.
  List {
    #[command(flatten)]
    filter: FilterArgs,
    #[command(flatten)]
    caller: CallerArgs,
    #[arg(long, default_value_t = 0)]
    skip:   usize,
    #[arg(long)]
    limit:  Option<usize>,
  },
  /// Change the status, notes or question of a record.
  Update {
    id:             String,
    #[arg(long, value_parser = AttendanceStatus::parse)]
    status:         Option<AttendanceStatus>,
    #[arg(long, conflicts_with = "clear_notes")]
    notes:          Option<String>,
    /// Remove the record's notes.
    #[arg(long)]
    clear_notes:    bool,
    #[arg(long, conflicts_with = "clear_question")]
    question:       Option<EntityId>,
    /// Remove the record's question.
    #[arg(long)]
    clear_question: bool,
  },
  /// Permanently remove a record.
  Delete { id: String },
  /// Totals and present rate over matching records.
  Stats {
    #[command(flatten)]
    filter: FilterArgs,
    #[command(flatten)]
    caller: CallerArgs,
  },
  /// Time-bucketed totals for an organization.
  Summary {
    #[arg(long, value_parser = Period::parse, default_value = "daily")]
    period: Period,
    #[command(flatten)]
    filter: FilterArgs,
  },
  /// Expected users with no `present` record at a parent.
  NotAttended {
    #[command(flatten)]
    parent:   ParentArgs,
    expected: Vec<EntityId>,
  },
}

#[derive(Args)]
struct ParentArgs {
  #[arg(long, value_parser = ParentType::parse)]
  parent_type: ParentType,
  #[arg(long = "parent")]
  parent_id:   EntityId,
}

impl ParentArgs {
  fn into_ref(self) -> ParentRef { ParentRef::new(self.parent_type, self.parent_id) }
}

#[derive(Args)]
struct FilterArgs {
  #[arg(long)]
  user:         Option<EntityId>,
  #[arg(long = "parent")]
  parent_id:    Option<EntityId>,
  #[arg(long, value_parser = ParentType::parse)]
  parent_type:  Option<ParentType>,
  #[arg(long, value_parser = AttendanceStatus::parse)]
  status:       Option<AttendanceStatus>,
  #[arg(long)]
  question:     Option<EntityId>,
  #[arg(long)]
  submitted_by: Option<EntityId>,
  #[arg(long)]
  org:          Option<EntityId>,
  /// Earliest `created_at`, as RFC 3339 or a `YYYY-MM-DD` day (inclusive).
  #[arg(long, value_parser = parse_start)]
  from:         Option<DateTime<Utc>>,
  /// Latest `created_at`, as RFC 3339 or a `YYYY-MM-DD` day (inclusive).
  #[arg(long, value_parser = parse_end)]
  to:           Option<DateTime<Utc>>,
}

impl FilterArgs {
  fn into_filter(self) -> roll_core::Result<RecordFilter> {
    Ok(RecordFilter {
      user_id:         self.user,
      parent_id:       self.parent_id,
      parent_type:     self.parent_type,
      status:          self.status,
      question_id:     self.question,
      submitted_by:    self.submitted_by,
      organization_id: self.org,
      created:         DateRange::new(self.from, self.to)?,
    })
  }
}

/// Who is asking. Without `--caller` the query is unrestricted.
#[derive(Args)]
struct CallerArgs {
  #[arg(long)]
  caller: Option<EntityId>,
  #[arg(long, requires = "caller")]
  admin:  bool,
}

impl CallerArgs {
  fn restrict(self, filter: RecordFilter) -> RecordFilter {
    match self.caller {
      Some(user_id) => filter.restricted_to(&CallerContext { user_id, is_admin: self.admin }),
      None => filter,
    }
  }
}

fn parse_day(raw: &str, time: NaiveTime) -> Result<DateTime<Utc>, String> {
  if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
    return Ok(at.with_timezone(&Utc));
  }
  NaiveDate::parse_from_str(raw, "%Y-%m-%d")
    .map(|day| day.and_time(time).and_utc())
    .map_err(|_| format!("expected RFC 3339 or YYYY-MM-DD, got {raw:?}"))
}

fn parse_start(raw: &str) -> Result<DateTime<Utc>, String> {
  let midnight = NaiveTime::from_hms_opt(0, 0, 0).ok_or("invalid start-of-day time")?;
  parse_day(raw, midnight)
}

fn parse_end(raw: &str) -> Result<DateTime<Utc>, String> {
  let end_of_day =
    NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999).ok_or("invalid end-of-day time")?;
  parse_day(raw, end_of_day)
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
  // Initialise tracing. Stdout is reserved for results.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  match run(cli).await {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      let kind = e.downcast_ref::<roll_core::Error>().map(roll_core::Error::kind);
      tracing::error!("{e:#}");
      ExitCode::from(exit_code(kind))
    }
  }
}

/// Distinct exit statuses so scripts can react to the error kind.
fn exit_code(kind: Option<ErrorKind>) -> u8 {
  match kind {
    Some(ErrorKind::InvalidArgument) => 2,
    Some(ErrorKind::NotFound) => 3,
    Some(ErrorKind::Conflict) => 4,
    Some(ErrorKind::DeadlineExceeded) => 5,
    Some(ErrorKind::Internal) | None => 1,
  }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
  let settings = Settings::load(&cli.config)?;

  let store = SqliteStore::open(&settings.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", settings.store_path))?;

  let (users, parents) = match &settings.roster_path {
    Some(path) => Roster::load(path)?.into_directories(),
    None => {
      tracing::warn!("no roster_path configured; all user and parent lookups will miss");
      (StaticUsers::new(), ParentDirectories::new())
    }
  };
  tracing::debug!(users = users.len(), "roster loaded");

  let service =
    AttendanceService::new(Arc::new(store), Arc::new(users), parents, settings.engine.clone());

  match cli.command {
    Command::Create { user, parent, status, notes, question, submitted_by, org } => {
      let input = NewAttendance {
        user_id: user,
        parent: parent.into_ref(),
        status,
        notes,
        submitted_by,
        question_id: question,
        organization_id: org,
      };
      print_json(&service.writer.create(input).await?)
    }
    Command::Bulk { parent, items, submitted_by, org } => {
      let raw = std::fs::read_to_string(&items)
        .with_context(|| format!("reading bulk items {}", items.display()))?;
      let items: Vec<BulkItem> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing bulk items {}", items.display()))?;
      let report = service
        .writer
        .bulk_create(parent.into_ref(), items, submitted_by, org)
        .await?;
      print_json(&report)
    }
    Command::Get { id } => print_json(&service.reader.get_by_id(parse_record_id(&id)?).await?),
    Command::Find { user, parent } => {
      let found = service
        .reader
        .get_by_user_and_parent(&user, &parent.into_ref())
        .await?;
      print_json(&found)
    }
    Command::List { filter, caller, skip, limit } => {
      let filter = caller.restrict(filter.into_filter()?);
      print_json(&service.reader.list(filter, skip, limit).await?)
    }
    Command::Update { id, status, notes, clear_notes, question, clear_question } => {
      let patch = AttendancePatch {
        status,
        notes: set_or_clear(notes, clear_notes),
        question_id: set_or_clear(question, clear_question),
      };
      print_json(&service.writer.update(parse_record_id(&id)?, patch).await?)
    }
    Command::Delete { id } => print_json(&service.writer.delete(parse_record_id(&id)?).await?),
    Command::Stats { filter, caller } => {
      let filter = caller.restrict(filter.into_filter()?);
      print_json(&service.stats.compute_stats(filter).await?)
    }
    Command::Summary { period, filter } => {
      let mut filter = filter.into_filter()?;
      let org = filter
        .organization_id
        .take()
        .ok_or(roll_core::Error::InvalidArgument("summary requires --org".into()))?;
      let range = std::mem::take(&mut filter.created);
      let summary = service
        .summary
        .compute_summary(org, range, period, Some(filter))
        .await?;
      print_json(&summary)
    }
    Command::NotAttended { parent, expected } => {
      let missing = service
        .absence
        .get_not_attended(&parent.into_ref(), &expected)
        .await?;
      print_json(&missing)
    }
  }
}

/// `--clear-*` wins over an absent value; clap rejects passing both.
fn set_or_clear<T>(value: Option<T>, clear: bool) -> Option<Option<T>> {
  if clear { Some(None) } else { value.map(Some) }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
  let out = serde_json::to_string_pretty(value).context("failed to serialise result")?;
  println!("{out}");
  Ok(())
}

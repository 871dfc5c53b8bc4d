use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{ArgGroup, Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use school_roll_insights::api::ApiClient;
use school_roll_insights::config::{AppConfig, SourceKind};
use school_roll_insights::db::{self, PgSource};
use school_roll_insights::filter::{available_months, filter_by_search_term, FilterCriteria, MonthYear};
use school_roll_insights::models::{ingest_payments, AttendanceRecord, FeePayment, Mark, Scope};
use school_roll_insights::snapshot::TotalScope;
use school_roll_insights::source::RecordSource;
use school_roll_insights::store::{LoadOutcome, RecordStore};
use school_roll_insights::{report, view, LedgerError};

#[derive(Parser)]
#[command(name = "school-roll-insights")]
#[command(about = "Attendance and fee statistics for the school backend", long_about = None)]
struct Cli {
    /// Where records are read from
    #[arg(long, value_enum, default_value_t = SourceKind::Api, global = true)]
    source: SourceKind,
    /// Overrides BACKEND_URL
    #[arg(long, global = true)]
    backend_url: Option<String>,
    /// Overrides DATABASE_URL
    #[arg(long, global = true)]
    database_url: Option<String>,
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct ScopeArgs {
    /// Academic session, defaults to SCHOOL_SESSION_ID
    #[arg(long)]
    session: Option<String>,
    #[arg(long, requires = "section")]
    class: Option<String>,
    #[arg(long, requires = "class")]
    section: Option<String>,
}

#[derive(Args, Clone)]
#[command(group(
    ArgGroup::new("period")
        .args(["date", "from", "month"])
        .multiple(false)
))]
struct FilterArgs {
    /// Exact day, YYYY-MM-DD
    #[arg(long)]
    date: Option<NaiveDate>,
    /// Range start, YYYY-MM-DD
    #[arg(long, requires = "to")]
    from: Option<NaiveDate>,
    /// Range end, YYYY-MM-DD
    #[arg(long, requires = "from")]
    to: Option<NaiveDate>,
    /// Calendar month such as "JAN 2024"
    #[arg(long)]
    month: Option<String>,
    /// Case-insensitive name search
    #[arg(long)]
    search: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the mirror database schema
    InitDb,
    /// Load sample records into the mirror database
    Seed,
    /// Import attendance marks from a CSV file into the mirror
    ImportAttendance {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Import fee payments from a CSV file into the mirror
    ImportPayments {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Per-student attendance statistics
    Attendance {
        #[command(flatten)]
        scope: ScopeArgs,
        #[command(flatten)]
        filters: FilterArgs,
        /// Day used for the dashboard tally, defaults to today
        #[arg(long)]
        today: Option<NaiveDate>,
        /// What the dashboard total counts: full-roster or active-today
        #[arg(long, default_value = "full-roster")]
        total_scope: TotalScope,
        /// Write a markdown report here instead of printing the table
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Change one student's mark for a day and save the day back
    EditMark {
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        student: String,
        /// P, A, L or Present/Absent/Leave
        #[arg(long)]
        mark: Mark,
        #[arg(long)]
        marked_by: Option<String>,
    },
    /// Fee collection totals
    Fees {
        #[command(flatten)]
        scope: ScopeArgs,
        #[command(flatten)]
        filters: FilterArgs,
        /// Write a markdown report (with outstanding fees) here
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Online payments awaiting approval
    PendingPayments {
        #[arg(long)]
        search: Option<String>,
    },
}

impl ScopeArgs {
    fn resolve(&self, config: &AppConfig) -> anyhow::Result<Scope> {
        let session_id = self
            .session
            .clone()
            .or_else(|| config.session_id.clone())
            .context("--session or SCHOOL_SESSION_ID must be set")?;
        Ok(match (&self.class, &self.section) {
            (Some(class_id), Some(section)) => Scope::class_section(session_id, class_id, section),
            _ => Scope::whole_session(session_id),
        })
    }
}

impl FilterArgs {
    fn criteria(&self) -> anyhow::Result<Vec<FilterCriteria>> {
        let mut criteria = Vec::new();
        if let Some(date) = self.date {
            criteria.push(FilterCriteria::ExactDate(date));
        }
        if let (Some(start), Some(end)) = (self.from, self.to) {
            match FilterCriteria::date_range(start, end) {
                Ok(range) => criteria.push(range),
                Err(LedgerError::SingleDayRange { date }) => {
                    anyhow::bail!("start and end are both {date}; use --date {date} instead")
                }
                Err(err) => return Err(err.into()),
            }
        }
        if let Some(label) = &self.month {
            criteria.push(FilterCriteria::Month(MonthYear::parse_label(label)?));
        }
        if let Some(term) = &self.search {
            criteria.push(FilterCriteria::Search(term.clone()));
        }
        Ok(criteria)
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn connect(config: &AppConfig) -> anyhow::Result<PgPool> {
    let database_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set to reach the Postgres mirror")?;
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")
}

async fn open_source(kind: SourceKind, config: &AppConfig) -> anyhow::Result<Box<dyn RecordSource>> {
    match kind {
        SourceKind::Api => {
            let backend_url = config
                .backend_url
                .as_deref()
                .context("BACKEND_URL must be set to reach the school backend")?;
            Ok(Box::new(ApiClient::new(backend_url, config.http_timeout)?))
        }
        SourceKind::Db => Ok(Box::new(PgSource::new(connect(config).await?))),
    }
}

fn write_report(out: &Path, contents: String) -> anyhow::Result<()> {
    std::fs::write(out, contents)
        .with_context(|| format!("failed to write {}", out.display()))?;
    println!("Report written to {}.", out.display());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut config = AppConfig::from_env();
    if cli.backend_url.is_some() {
        config.backend_url = cli.backend_url.clone();
    }
    if cli.database_url.is_some() {
        config.database_url = cli.database_url.clone();
    }

    match cli.command {
        Commands::InitDb => {
            db::init_db(&connect(&config).await?).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&connect(&config).await?).await?;
            println!("Seed data inserted.");
        }
        Commands::ImportAttendance { csv } => {
            let inserted = db::import_attendance_csv(&connect(&config).await?, &csv).await?;
            println!("Stored {inserted} attendance marks from {}.", csv.display());
        }
        Commands::ImportPayments { csv } => {
            let inserted = db::import_payments_csv(&connect(&config).await?, &csv).await?;
            println!("Inserted {inserted} payments from {}.", csv.display());
        }
        Commands::Attendance {
            scope,
            filters,
            today,
            total_scope,
            out,
        } => {
            let scope = scope.resolve(&config)?;
            let criteria = filters.criteria()?;
            let source = open_source(cli.source, &config).await?;

            let mut store = RecordStore::<AttendanceRecord>::new();
            if let LoadOutcome::Applied { records } = store.load(source.as_ref(), scope.clone()).await? {
                tracing::info!(records, %scope, "attendance loaded");
            }
            if store.is_empty() {
                println!("No attendance recorded for {scope}.");
                return Ok(());
            }

            let today = today.unwrap_or_else(|| Local::now().date_naive());
            let snapshot = view::today_snapshot(store.records(), today, total_scope);
            let derived = view::derive_view(store.records(), &criteria)?;

            if let Some(out) = out {
                let contents =
                    report::build_attendance_report(&scope, &criteria, &derived, today, &snapshot);
                return write_report(&out, contents);
            }

            println!(
                "Today ({today}): {} students, {} present, {} absent, {} leave",
                snapshot.total, snapshot.present, snapshot.absent, snapshot.leave
            );
            let months: Vec<String> = available_months(store.records())
                .iter()
                .map(MonthYear::label)
                .collect();
            println!("Months on record: {}", months.join(", "));
            println!("Attendance {}:", report::criteria_label(&criteria));
            if derived.summaries.is_empty() {
                println!("No students match this selection.");
            }
            for summary in &derived.summaries {
                println!(
                    "- {} ({}-{}) {} present / {} absent / {} leave over {} days: {}",
                    summary.name,
                    summary.class_id,
                    summary.section,
                    summary.present_count,
                    summary.absent_count,
                    summary.leave_count,
                    summary.unique_date_count,
                    summary.attendance_percentage
                );
            }
        }
        Commands::EditMark {
            scope,
            date,
            student,
            mark,
            marked_by,
        } => {
            let scope = scope.resolve(&config)?;
            let source = open_source(cli.source, &config).await?;
            let mut store = RecordStore::<AttendanceRecord>::new();
            store.load_day(source.as_ref(), scope, date).await?;
            let edited = store.edit_mark(&student, date, mark, marked_by.as_deref())?;
            println!("{} marked {} on {}.", edited.student_name, mark.label(), date);
            let saved = store.save(source.as_ref()).await?;
            println!("Saved {saved} marks.");
        }
        Commands::Fees {
            scope,
            filters,
            out,
        } => {
            let scope = scope.resolve(&config)?;
            let criteria = filters.criteria()?;
            let source = open_source(cli.source, &config).await?;

            let mut store = RecordStore::<FeePayment>::new();
            store.load(source.as_ref(), scope.clone()).await?;
            let derived = view::derive_fee_view(store.records(), &criteria)?;

            if let Some(out) = out {
                let ledger = source.fetch_fee_ledger(&scope).await?;
                let contents = report::build_fee_report(&scope, &criteria, &derived, &ledger);
                return write_report(&out, contents);
            }

            let totals = &derived.totals;
            println!("Fee collection for {scope} ({}):", report::criteria_label(&criteria));
            println!("- Cash: {}", totals.cash_total);
            println!("- Online: {}", totals.online_total);
            println!("- Cheque: {}", totals.cheque_total);
            println!(
                "- Total: {} across {} payments",
                totals.grand_total, totals.payment_count
            );
        }
        Commands::PendingPayments { search } => {
            let backend_url = config
                .backend_url
                .as_deref()
                .context("BACKEND_URL must be set to reach the school backend")?;
            let client = ApiClient::new(backend_url, config.http_timeout)?;
            let payments = ingest_payments(&client.fetch_pending_payments().await?)?;
            let payments = filter_by_search_term(&payments, search.as_deref().unwrap_or(""));
            if payments.is_empty() {
                println!("No payments awaiting approval.");
                return Ok(());
            }
            for payment in &payments {
                println!(
                    "- {} {} ({}-{}): {} via {} [{}]",
                    payment.payment_date,
                    payment.student_name,
                    payment.class_id,
                    payment.section,
                    payment.amount,
                    payment.payment_mode,
                    payment.transaction_id.as_deref().unwrap_or("-")
                );
            }
        }
    }

    Ok(())
}

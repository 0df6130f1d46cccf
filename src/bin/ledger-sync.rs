//! CLI binary for syncing and browsing the ledger.

extern crate alloc;

use alloc::sync::Arc;
use core::fmt::Display;
use core::time::Duration;
use std::io::{self, BufRead as _, Write as _};
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand, ValueEnum};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, Table};
use indicatif::{ProgressBar, ProgressStyle};
use ledger_sync::ledger::{BootReport, Ledger, RealizeReport};
use ledger_sync::models::{
    AccountId, AccountView, ImportProfileId, ImportRuleId, RecurringTransactionId, Resource,
    Transaction, TransactionId, TransactionType, VirtualTransaction,
};
use ledger_sync::notify::{Level, Notification, Notifier};
use ledger_sync::offline::{OfflineQueue, RetryPolicy};
use ledger_sync::pipeline::{MutationReport, Outcome};
use ledger_sync::remote::HttpTransport;
use ledger_sync::storage::FileStorage;
use ledger_sync::undo::{
    ChannelInteraction, Confirmation, DestroyOutcome, DestroyTarget, Interaction, UndoDecision,
    UndoableDestroyer, UserEvent,
};
use owo_colors::OwoColorize;

/// Environment variable name for the API token.
const TOKEN_ENV: &str = "LEDGER_SYNC_TOKEN";
/// Environment variable name for the service base URL.
const URL_ENV: &str = "LEDGER_SYNC_URL";
/// How long a deletion can be undone.
const UNDO_WINDOW: Duration = Duration::from_secs(8);

/// The ledger as wired by this binary.
type CliLedger = Ledger<OfflineQueue<HttpTransport>>;

/// Ledger sync CLI: fetch, browse and edit personal finance data.
#[derive(Debug, Parser)]
#[command(name = "ledger-sync", version, about)]
struct Cli {
    /// Override the storage directory (default: XDG data dir).
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch everything from the server, realize recurring transactions
    /// and save locally.
    Sync,
    /// List accounts with their balances.
    Accounts,
    /// List transactions, optionally within a date range.
    Transactions(RangeArgs),
    /// Search transactions by description.
    Search {
        /// Text to look for.
        query: String,
    },
    /// Add a transaction.
    Add(AddArgs),
    /// Delete a record, with a confirmation and an undo window.
    Delete {
        /// Identifier of the record.
        id: String,
        /// What kind of record the id names.
        #[arg(long, value_enum, default_value_t = TargetKind::Transaction)]
        kind: TargetKind,
    },
    /// Show projected recurring transactions and balances.
    Project {
        /// Last day of the projection (YYYY-MM-DD).
        #[arg(long, value_parser = parse_date)]
        until: NaiveDate,
    },
    /// Create due transactions from recurring definitions.
    Realize,
    /// Export or import a backup.
    Backup {
        /// Backup direction.
        #[command(subcommand)]
        action: BackupAction,
    },
}

/// Arguments for the `transactions` subcommand.
#[derive(Debug, Args)]
struct RangeArgs {
    /// Start date (inclusive, YYYY-MM-DD).
    #[arg(long, value_parser = parse_date)]
    from: Option<NaiveDate>,
    /// End date (inclusive, YYYY-MM-DD).
    #[arg(long, value_parser = parse_date)]
    to: Option<NaiveDate>,
}

/// Arguments for the `add` subcommand.
#[derive(Debug, Args)]
struct AddArgs {
    /// Amount, such as 12.50.
    #[arg(long, value_parser = parse_amount)]
    amount: i64,
    /// Description shown in lists and searched by `search`.
    #[arg(long)]
    description: String,
    /// Transaction type: income, expense, transfer or debt.
    #[arg(long, value_parser = parse_kind)]
    kind: TransactionType,
    /// Account the money leaves.
    #[arg(long)]
    credit: String,
    /// Account the money enters.
    #[arg(long)]
    debit: String,
    /// Booking date (YYYY-MM-DD, default: today).
    #[arg(long, value_parser = parse_date)]
    date: Option<NaiveDate>,
}

/// Record kinds the `delete` subcommand accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TargetKind {
    /// A transaction.
    Transaction,
    /// An account and all of its transactions.
    Account,
    /// A recurring transaction definition.
    Recurring,
    /// An import rule.
    ImportRule,
    /// An import profile.
    ImportProfile,
}

/// Backup subcommands.
#[derive(Debug, Subcommand)]
enum BackupAction {
    /// Write a backup of the local data.
    Export {
        /// Output file (default: stdout).
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Replace all data, locally and on the server, with a backup.
    Import {
        /// Backup file to read.
        input: PathBuf,
    },
}

/// Parses a date string in `YYYY-MM-DD` format for clap.
fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|err| format!("{err}"))
}

/// Parses a non-negative decimal amount with at most two fractional
/// digits into minor units.
fn parse_amount(s: &str) -> Result<i64, String> {
    let invalid = || format!("invalid amount: {s}");
    let (whole, fraction) = s.split_once('.').unwrap_or((s, ""));
    let whole = i64::from(whole.parse::<u32>().map_err(|_err| invalid())?);
    let cents = match fraction.len() {
        0 => 0,
        1 => i64::from(fraction.parse::<u8>().map_err(|_err| invalid())?) * 10,
        2 => i64::from(fraction.parse::<u8>().map_err(|_err| invalid())?),
        _ => return Err(invalid()),
    };
    Ok(whole * 100 + cents)
}

/// Parses a transaction type name.
fn parse_kind(s: &str) -> Result<TransactionType, String> {
    match s.to_lowercase().as_str() {
        "income" => Ok(TransactionType::Income),
        "expense" => Ok(TransactionType::Expense),
        "transfer" => Ok(TransactionType::Transfer),
        "debt" => Ok(TransactionType::Debt),
        other => Err(format!("unknown transaction type: {other}")),
    }
}

/// Formats minor units as a decimal amount.
fn format_amount(minor: i64) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let abs = minor.unsigned_abs();
    format!("{sign}{}.{:02}", abs.div_euclid(100), abs.rem_euclid(100))
}

/// Returns today's local date.
fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Prints an error line and returns the failure exit code.
fn fail<E: Display>(context: &str, err: E) -> io::Result<ExitCode> {
    writeln!(
        io::stderr().lock(),
        "{} {context}: {err}",
        "error:".red().bold()
    )?;
    Ok(ExitCode::FAILURE)
}

/// Reads the API token from the environment.
fn read_token() -> io::Result<Option<String>> {
    match std::env::var(TOKEN_ENV) {
        Ok(val) if !val.is_empty() => Ok(Some(val)),
        _ => {
            let mut err = io::stderr().lock();
            writeln!(
                err,
                "{} {} environment variable is not set",
                "error:".red().bold(),
                TOKEN_ENV.bold()
            )?;
            writeln!(
                err,
                "  {} create a .env file with {}=<your_token>",
                "hint:".cyan(),
                TOKEN_ENV
            )?;
            Ok(None)
        }
    }
}

/// Prints rollback and restore notices as they happen.
#[derive(Debug)]
struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn notify(&self, notification: Notification) {
        let mut err = io::stderr().lock();
        let message = &notification.message;
        let written = match notification.level {
            Level::Success => writeln!(err, "{} {message}", "ok:".green().bold()),
            Level::Warning => writeln!(err, "{} {message}", "warning:".yellow().bold()),
            Level::Error => writeln!(err, "{} {message}", "error:".red().bold()),
        };
        if let Err(write_err) = written {
            tracing::debug!(error = %write_err, "could not print notification");
        }
    }
}

/// Confirmation and undo prompts answered on stdin.
///
/// A reader thread turns each input line into [`UserEvent`]s: `y` confirms,
/// `u` undoes, anything else cancels the prompt or dismisses the offer.
#[derive(Debug)]
struct TerminalInteraction {
    /// Event-driven prompt state.
    inner: ChannelInteraction,
}

impl TerminalInteraction {
    /// Starts the stdin reader.
    fn spawn() -> Self {
        let (inner, events) = ChannelInteraction::new(UNDO_WINDOW);
        let _reader = std::thread::spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                let answer: &[UserEvent] = match line.trim().to_lowercase().as_str() {
                    "y" | "yes" => &[UserEvent::Confirm],
                    "u" | "undo" => &[UserEvent::Undo],
                    _ => &[UserEvent::Cancel, UserEvent::Dismiss],
                };
                if answer.iter().any(|event| events.send(*event).is_err()) {
                    break;
                }
            }
        });
        Self { inner }
    }

    /// Prints a prompt without a trailing newline.
    fn prompt(text: &str) {
        let mut out = io::stdout().lock();
        if let Err(err) = write!(out, "{text} ").and_then(|()| out.flush()) {
            tracing::debug!(error = %err, "could not print prompt");
        }
    }
}

impl Interaction for TerminalInteraction {
    async fn confirm(&self, prompt: &str) -> Confirmation {
        Self::prompt(&format!("{prompt} {}", "[y/N]".dimmed()));
        self.inner.confirm(prompt).await
    }

    async fn offer_undo(&self, message: &str) -> UndoDecision {
        Self::prompt(&format!(
            "{} {}",
            message.green(),
            format_args!("Type u to undo ({}s).", UNDO_WINDOW.as_secs()).dimmed()
        ));
        let decision = self.inner.offer_undo(message).await;
        if decision == UndoDecision::Expired {
            Self::prompt("\n");
        }
        decision
    }
}

/// Creates the storage backend, using `data_dir` if provided or the
/// default XDG data directory otherwise.
fn create_storage(data_dir: Option<PathBuf>) -> ledger_sync::Result<FileStorage> {
    let dir = match data_dir {
        Some(dir) => dir,
        None => FileStorage::default_dir()?,
    };
    FileStorage::new(dir)
}

/// Builds the ledger on an HTTP transport behind the offline queue.
fn create_ledger(token: String) -> ledger_sync::Result<CliLedger> {
    let mut http = HttpTransport::builder().token(token);
    if let Ok(url) = std::env::var(URL_ENV)
        && !url.is_empty()
    {
        http = http.base_url(url);
    }
    let transport = OfflineQueue::new(http.build()?, RetryPolicy::default());
    Ledger::builder()
        .transport(transport)
        .notifier(Arc::new(TerminalNotifier))
        .build()
}

/// Runs the CLI, returning an appropriate exit code.
async fn run() -> io::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _dotenv = dotenvy::dotenv();

    let cli = Cli::parse();

    let Some(token) = read_token()? else {
        return Ok(ExitCode::FAILURE);
    };

    let storage = match create_storage(cli.data_dir) {
        Ok(storage) => storage,
        Err(err) => return fail("failed to initialize storage", err),
    };

    let ledger = match create_ledger(token) {
        Ok(ledger) => ledger,
        Err(err) => return fail("failed to build ledger", err),
    };

    if !matches!(cli.command, Command::Sync) && !load(&ledger, &storage).await? {
        return Ok(ExitCode::FAILURE);
    }

    let code = dispatch(&ledger, cli.command).await?;
    if code == ExitCode::SUCCESS
        && let Err(err) = ledger.save_to(&storage).await
    {
        return fail("failed to save local data", err);
    }
    Ok(code)
}

/// Loads the saved snapshot, printing an error if there is none.
async fn load(ledger: &CliLedger, storage: &FileStorage) -> io::Result<bool> {
    match ledger.load_from(storage, today()).await {
        Ok(true) => Ok(true),
        Ok(false) => {
            writeln!(
                io::stderr().lock(),
                "{} no local data, run {} first",
                "error:".red().bold(),
                "ledger-sync sync".bold()
            )?;
            Ok(false)
        }
        Err(err) => fail("failed to load local data", err).map(|_code| false),
    }
}

/// Dispatches to the appropriate subcommand handler.
async fn dispatch(ledger: &CliLedger, command: Command) -> io::Result<ExitCode> {
    match command {
        Command::Sync => cmd_sync(ledger).await,
        Command::Accounts => print_accounts_table(&ledger.accounts(), None),
        Command::Transactions(args) => {
            let from = args.from.unwrap_or(NaiveDate::MIN);
            let to = args.to.unwrap_or(NaiveDate::MAX);
            print_transactions_table("Transactions", &ledger.transactions_between(from, to))
        }
        Command::Search { query } => {
            print_transactions_table(&format!("Matches for \"{query}\""), &ledger.search(&query))
        }
        Command::Add(args) => cmd_add(ledger, args).await,
        Command::Delete { id, kind } => cmd_delete(ledger, id, kind).await,
        Command::Project { until } => cmd_project(ledger, until),
        Command::Realize => {
            let report = ledger.realize(today()).await;
            print_realize_summary(&report)
        }
        Command::Backup { action } => match action {
            BackupAction::Export { output } => cmd_export(ledger, output),
            BackupAction::Import { input } => cmd_import(ledger, &input).await,
        },
    }
}

/// Executes the `sync` subcommand.
async fn cmd_sync(ledger: &CliLedger) -> io::Result<ExitCode> {
    let spinner = make_spinner("Syncing with the ledger service...");
    match ledger.boot(today()).await {
        Ok(report) => {
            spinner.finish_and_clear();
            print_boot_summary(&report)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            spinner.finish_and_clear();
            fail("sync failed", err)
        }
    }
}

/// Executes the `add` subcommand.
async fn cmd_add(ledger: &CliLedger, args: AddArgs) -> io::Result<ExitCode> {
    let transaction = Transaction {
        id: TransactionId::random(),
        amount: args.amount,
        date: args.date.unwrap_or_else(today),
        description: args.description,
        kind: args.kind,
        credit_account_id: AccountId::new(args.credit),
        debit_account_id: AccountId::new(args.debit),
        recurring_transaction_id: None,
    };
    let spinner = make_spinner("Saving transaction...");
    let result = ledger.create(transaction).await;
    spinner.finish_and_clear();
    match result {
        Ok(report) => print_mutation(&report, &format!("transaction {}", report.value.id)),
        Err(err) => fail("transaction rejected", err),
    }
}

/// Executes the `delete` subcommand.
async fn cmd_delete(ledger: &CliLedger, id: String, kind: TargetKind) -> io::Result<ExitCode> {
    let target = match kind {
        TargetKind::Transaction => DestroyTarget::Transaction(TransactionId::new(id)),
        TargetKind::Account => DestroyTarget::Account(AccountId::new(id)),
        TargetKind::Recurring => {
            DestroyTarget::RecurringTransaction(RecurringTransactionId::new(id))
        }
        TargetKind::ImportRule => DestroyTarget::ImportRule(ImportRuleId::new(id)),
        TargetKind::ImportProfile => DestroyTarget::ImportProfile(ImportProfileId::new(id)),
    };
    let destroyer = UndoableDestroyer::new(TerminalInteraction::spawn());
    let outcome = match ledger.destroy_with_undo(&destroyer, target).await {
        Ok(outcome) => outcome,
        Err(err) => return fail("delete rejected", err),
    };
    let mut out = io::stdout().lock();
    match outcome {
        DestroyOutcome::Cancelled => writeln!(out, "{}", "Cancelled.".dimmed())?,
        DestroyOutcome::Failed(failure) => return fail("delete failed", failure),
        DestroyOutcome::Final(_) => writeln!(out, "{}", "Deleted.".green().bold())?,
        DestroyOutcome::Restored(_) => writeln!(out, "{}", "Restored.".green().bold())?,
        DestroyOutcome::PartiallyRestored(_) => {
            writeln!(out, "{}", "Partly restored.".yellow().bold())?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Executes the `project` subcommand.
fn cmd_project(ledger: &CliLedger, until: NaiveDate) -> io::Result<ExitCode> {
    let from = today();
    let upcoming: Vec<VirtualTransaction> = ledger
        .virtual_transactions(until)
        .into_iter()
        .filter(|item| item.date > from)
        .collect();
    print_virtuals_table(&upcoming)?;
    writeln!(io::stdout().lock())?;
    print_accounts_table(&ledger.accounts(), Some((ledger, until)))
}

/// Executes `backup export`.
fn cmd_export(ledger: &CliLedger, output: Option<PathBuf>) -> io::Result<ExitCode> {
    let text = match ledger.export_backup() {
        Ok(text) => text,
        Err(err) => return fail("backup failed", err),
    };
    match output {
        Some(path) => {
            std::fs::write(&path, text)?;
            writeln!(
                io::stdout().lock(),
                "{} {}",
                "Backup written to".green().bold(),
                path.display()
            )?;
        }
        None => writeln!(io::stdout().lock(), "{text}")?,
    }
    Ok(ExitCode::SUCCESS)
}

/// Executes `backup import`.
async fn cmd_import(ledger: &CliLedger, input: &PathBuf) -> io::Result<ExitCode> {
    let text = std::fs::read_to_string(input)?;
    let spinner = make_spinner("Restoring backup...");
    let result = ledger.import_backup(&text).await;
    spinner.finish_and_clear();
    match result {
        Ok(report) => print_mutation(&report, "backup"),
        Err(err) => fail("restore rejected", err),
    }
}

// ── Output formatting ────────────────────────────────────────────────

/// Prints how a mutation ended.
fn print_mutation<T>(report: &MutationReport<T>, what: &str) -> io::Result<ExitCode> {
    let mut out = io::stdout().lock();
    match report.outcome {
        Outcome::Succeeded => {
            writeln!(out, "{} {what}", "Saved".green().bold())?;
            Ok(ExitCode::SUCCESS)
        }
        Outcome::Reconciled(ref failure) => {
            writeln!(
                out,
                "{} {what} {}",
                "Saved".green().bold(),
                format_args!("(server already had it: {failure})").dimmed()
            )?;
            Ok(ExitCode::SUCCESS)
        }
        // The notifier already explained the rollback.
        Outcome::RolledBack(_) => Ok(ExitCode::FAILURE),
    }
}

/// Prints accounts in a table, optionally with balances projected to a
/// date.
fn print_accounts_table(
    accounts: &[AccountView],
    projected: Option<(&CliLedger, NaiveDate)>,
) -> io::Result<ExitCode> {
    let mut out = io::stdout().lock();
    if accounts.is_empty() {
        writeln!(out, "{}", "No accounts found.".dimmed())?;
        return Ok(ExitCode::SUCCESS);
    }
    let mut table = Table::new();
    _ = table.load_preset(UTF8_FULL);
    let mut header = vec![
        Cell::new("Name").fg(Color::Cyan),
        Cell::new("Type").fg(Color::Cyan),
        Cell::new("Balance").fg(Color::Cyan),
    ];
    if let Some((_, until)) = projected {
        header.push(Cell::new(format!("On {until}")).fg(Color::Cyan));
    }
    _ = table.set_header(header);
    for view in accounts {
        let mut row = vec![
            Cell::new(&view.account.name),
            Cell::new(view.account.kind),
            amount_cell(view.balance),
        ];
        if let Some((ledger, until)) = projected {
            let balance = ledger.projected_balance(&view.account.id, until);
            row.push(balance.map_or_else(|| Cell::new("-"), amount_cell));
        }
        _ = table.add_row(row);
    }
    writeln!(
        out,
        "{} {}",
        "Accounts".green().bold(),
        format_args!("({})", accounts.len()).dimmed()
    )?;
    writeln!(out)?;
    writeln!(out, "{table}")?;
    Ok(ExitCode::SUCCESS)
}

/// Colors an amount by sign.
fn amount_cell(minor: i64) -> Cell {
    let cell = Cell::new(format_amount(minor));
    if minor < 0 {
        cell.fg(Color::Red)
    } else {
        cell
    }
}

/// Prints transactions in a table.
fn print_transactions_table(title: &str, txs: &[Transaction]) -> io::Result<ExitCode> {
    let mut out = io::stdout().lock();
    if txs.is_empty() {
        writeln!(out, "{}", "No transactions found.".dimmed())?;
        return Ok(ExitCode::SUCCESS);
    }
    let mut table = Table::new();
    _ = table.load_preset(UTF8_FULL);
    _ = table.set_header(vec![
        Cell::new("Date").fg(Color::Cyan),
        Cell::new("Description").fg(Color::Cyan),
        Cell::new("Type").fg(Color::Cyan),
        Cell::new("Amount").fg(Color::Cyan),
        Cell::new("From").fg(Color::Cyan),
        Cell::new("To").fg(Color::Cyan),
        Cell::new("Id").fg(Color::Cyan),
    ]);
    for tx in txs {
        let amount = match tx.kind {
            TransactionType::Income => Cell::new(format_amount(tx.amount)).fg(Color::Green),
            TransactionType::Expense => Cell::new(format_amount(tx.amount)).fg(Color::Red),
            TransactionType::Debt | TransactionType::Transfer => {
                Cell::new(format_amount(tx.amount))
            }
        };
        _ = table.add_row(vec![
            Cell::new(tx.date),
            Cell::new(&tx.description),
            Cell::new(tx.kind),
            amount,
            Cell::new(&tx.credit_account_id),
            Cell::new(&tx.debit_account_id),
            Cell::new(&tx.id).fg(Color::DarkGrey),
        ]);
    }
    writeln!(
        out,
        "{} {}",
        title.green().bold(),
        format_args!("({})", txs.len()).dimmed()
    )?;
    writeln!(out)?;
    writeln!(out, "{table}")?;
    Ok(ExitCode::SUCCESS)
}

/// Prints projected transactions in a table.
fn print_virtuals_table(items: &[VirtualTransaction]) -> io::Result<()> {
    let mut out = io::stdout().lock();
    if items.is_empty() {
        writeln!(out, "{}", "No upcoming recurring transactions.".dimmed())?;
        return Ok(());
    }
    let mut table = Table::new();
    _ = table.load_preset(UTF8_FULL);
    _ = table.set_header(vec![
        Cell::new("Date").fg(Color::Cyan),
        Cell::new("Description").fg(Color::Cyan),
        Cell::new("Type").fg(Color::Cyan),
        Cell::new("Amount").fg(Color::Cyan),
    ]);
    for item in items {
        _ = table.add_row(vec![
            Cell::new(item.date),
            Cell::new(&item.description),
            Cell::new(item.kind),
            Cell::new(format_amount(item.amount)),
        ]);
    }
    writeln!(
        out,
        "{} {}",
        "Upcoming".green().bold(),
        format_args!("({})", items.len()).dimmed()
    )?;
    writeln!(out)?;
    writeln!(out, "{table}")?;
    Ok(())
}

/// Creates a spinner with the given message.
fn make_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message.to_owned());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

/// Prints a summary table of a boot.
fn print_boot_summary(report: &BootReport) -> io::Result<()> {
    let mut out = io::stdout().lock();
    writeln!(out, "{}", "Sync complete!".green().bold())?;
    writeln!(out)?;

    let mut table = Table::new();
    _ = table.load_preset(UTF8_FULL);
    _ = table.set_header(vec![
        Cell::new("Resource").fg(Color::Cyan),
        Cell::new("Count").fg(Color::Cyan),
    ]);
    for &(resource, count) in &report.fetched {
        let count_cell = if count > 0 {
            Cell::new(count).fg(Color::Green)
        } else {
            Cell::new(count).fg(Color::DarkGrey)
        };
        _ = table.add_row(vec![Cell::new(resource_title(resource)), count_cell]);
    }
    writeln!(out, "{table}")?;
    drop(out);
    print_realize_summary(&report.realization).map(|_code| ())
}

/// Returns a plural table label for a resource.
const fn resource_title(resource: Resource) -> &'static str {
    match resource {
        Resource::Account => "Accounts",
        Resource::Transaction => "Transactions",
        Resource::RecurringTransaction => "Recurring transactions",
        Resource::ImportRule => "Import rules",
        Resource::ImportRuleAction => "Import rule actions",
        Resource::ImportRuleCondition => "Import rule conditions",
        Resource::ImportProfile => "Import profiles",
        Resource::ImportProfileMapping => "Import profile mappings",
        Resource::Preference => "Preferences",
    }
}

/// Prints what a realization pass did.
fn print_realize_summary(report: &RealizeReport) -> io::Result<ExitCode> {
    let mut out = io::stdout().lock();
    writeln!(
        out,
        "{} {} created, {} definitions up to date",
        "Realized:".bold(),
        report.created,
        report.advanced
    )?;
    if report.failed > 0 {
        writeln!(
            out,
            "{} {} definitions will be retried on the next run",
            "warning:".yellow().bold(),
            report.failed
        )?;
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// Entry point.
fn main() -> ExitCode {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            let _ignored = writeln!(io::stderr(), "failed to start runtime: {err}");
            return ExitCode::FAILURE;
        }
    };
    match runtime.block_on(run()) {
        Ok(code) => code,
        Err(err) => {
            // Last-resort error output; if stderr itself failed, nothing
            // we can do.
            let _ignored = writeln!(io::stderr(), "fatal I/O error: {err}");
            ExitCode::FAILURE
        }
    }
}

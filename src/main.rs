mod activity;
mod advisor;
mod aggregate;
mod api;
mod cli;
mod config;
mod coordinator;
mod demo;
mod domain;
mod session;
mod view;

use anyhow::{Context, Result, bail};
use chrono::Local;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use rust_decimal::Decimal;
use serde_json::Value;
use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

use crate::activity::ActivityLog;
use crate::advisor::{AiClient, AiReply, ChatTranscript, ExtractedBill, Role};
use crate::api::{Backend, HttpBackend};
use crate::cli::{BillCmd, BudgetCmd, ChatArgs, Cli, Command, ConfigCmd, TxAddArgs, TxCmd};
use crate::config::{AppConfig, AppPaths, app_paths, load_or_init_config, now_utc, write_config};
use crate::coordinator::{Coordinator, FallbackPolicy, SyncOutcome};
use crate::domain::{
    BillStatus, Category, EntryKind, LedgerEntry, NewBill, NewBudget, NewTransaction, RecordId,
    parse_amount,
};
use crate::session::{Session, SessionStore};

const BAR_WIDTH: usize = 20;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    if let Err(err) = run() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

/// Everything a backend-bound command needs besides the coordinator.
struct Ctx {
    paths: AppPaths,
    cfg: AppConfig,
    cfg_path: std::path::PathBuf,
    ai_key: Option<String>,
    session: Session,
}

fn run() -> Result<()> {
    let Cli {
        home,
        api_base,
        ai_key,
        no_demo,
        command,
    } = Cli::parse();
    let paths = app_paths(home)?;
    let (mut cfg, cfg_path) = load_or_init_config(&paths)?;
    let sessions = SessionStore::new(&paths.config_dir);

    match command {
        Command::Login(args) => {
            let session = sessions.login(&args.email, args.name)?;
            println!("Logged in as {} ({})", session.display_name(), session.email);
            Ok(())
        }
        Command::Logout => {
            if sessions.logout()? {
                println!("Logged out.");
            } else {
                println!("(not logged in)");
            }
            Ok(())
        }
        Command::Whoami => {
            let session = sessions.require()?;
            println!("name\t{}", session.display_name());
            println!("email\t{}", session.email);
            println!("user_id\t{}", session.user_id);
            println!("since\t{}", session.started_at.to_rfc3339());
            Ok(())
        }
        Command::Config(cmd) => handle_config(cmd, &mut cfg, &cfg_path),
        Command::Log => {
            let log = ActivityLog::load(&paths.activity_log())?;
            if log.is_empty() {
                println!("(no activity)");
            }
            for line in log.iter() {
                println!("{line}");
            }
            Ok(())
        }
        Command::Bi { tool, url } => {
            sessions.require()?;
            println!("{}", cfg.bi_url(tool, url.as_deref()));
            Ok(())
        }
        command => {
            let session = sessions.require()?;
            let base = api_base.unwrap_or_else(|| cfg.api_base.clone());
            let backend = HttpBackend::new(&base, cfg.request_timeout())?;
            let policy = if no_demo || !cfg.demo_fallback {
                FallbackPolicy::Strict
            } else {
                FallbackPolicy::Demo
            };
            let log = ActivityLog::load(&paths.activity_log())?;
            let mut coord = Coordinator::new(backend, policy, log);
            let mut ctx = Ctx {
                paths,
                cfg,
                cfg_path,
                ai_key,
                session,
            };

            let result = dispatch(command, &mut coord, &mut ctx);
            // The activity log survives failed commands; that is where failures show up.
            coord.log().save(&ctx.paths.activity_log())?;
            result
        }
    }
}

fn dispatch(command: Command, coord: &mut Coordinator<HttpBackend>, ctx: &mut Ctx) -> Result<()> {
    match command {
        Command::Dashboard => {
            sync(coord, ctx)?;
            print_dashboard(&coord.state().transactions);
            Ok(())
        }
        Command::Tx(cmd) => handle_tx(cmd, coord, ctx),
        Command::Budget(cmd) => handle_budget(cmd, coord, ctx),
        Command::Bill(cmd) => handle_bill(cmd, coord, ctx),
        Command::Forecast { ai } => {
            if ai {
                sync(coord, ctx)?;
                let client = ai_client(ctx)?;
                let forecast = with_spinner("Forecasting spending...", || {
                    advisor::forecast_spending(
                        &client,
                        &ctx.session.user_id,
                        &coord.state().transactions,
                    )
                })?;
                print_ai_forecast(&forecast);
            } else {
                let backend = coord.backend();
                print_backend_report("forecast", backend.forecast());
            }
            Ok(())
        }
        Command::Risk => {
            print_backend_report("risk assessment", coord.backend().risk_assessment());
            Ok(())
        }
        Command::Advice => {
            sync(coord, ctx)?;
            let client = ai_client(ctx)?;
            let state = coord.state();
            let advice = with_spinner("Asking the AI advisor...", || {
                advisor::financial_advice(
                    &client,
                    &ctx.session.user_id,
                    &state.transactions,
                    &state.budgets,
                )
            })?;
            println!("{}", advice.trim());
            Ok(())
        }
        Command::Advisor { question } => {
            let question = question
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty())
                .unwrap_or_else(|| "Analyze my finances".to_string());
            let answer = with_spinner("Asking the advisor...", || {
                coord
                    .backend()
                    .ask_advisor(&question, &ctx.session.user_id)
            })
            .context("Backend advisor request failed")?;
            if !answer.answer.trim().is_empty() {
                println!("{}", answer.answer.trim());
            } else if !answer.raw.is_null() {
                println!("{}", serde_json::to_string_pretty(&answer.raw)?);
            } else {
                println!("(no answer)");
            }
            Ok(())
        }
        Command::Chat(args) => handle_chat(args, coord, ctx),
        Command::Inject { source } => {
            sync(coord, ctx)?;
            let event = demo::simulate(source, Uuid::new_v4(), Local::now());
            coord.inject(event);
            let state = coord.state();
            match source {
                demo::SimulatedSource::Bill => print_bills(&state.bills),
                _ => print_transactions(state.transactions.iter()),
            }
            Ok(())
        }
        Command::Login(_)
        | Command::Logout
        | Command::Whoami
        | Command::Config(_)
        | Command::Log
        | Command::Bi { .. } => unreachable!("handled before the backend is set up"),
    }
}

/// Runs the three reads and reports how the state was obtained.
fn sync(coord: &mut Coordinator<HttpBackend>, ctx: &mut Ctx) -> Result<()> {
    let outcome = coord.refresh()?;
    report_outcome(&outcome);
    if outcome.is_live() {
        ctx.cfg.last_sync_at = Some(now_utc());
        write_config(&ctx.cfg_path, &ctx.cfg)?;
    }
    Ok(())
}

fn report_outcome(outcome: &SyncOutcome) {
    match outcome {
        SyncOutcome::Fallback { reason } => {
            eprintln!("warning: backend offline, showing demo data ({reason})");
        }
        SyncOutcome::Stale { reason } => {
            eprintln!("warning: change saved, but the refresh failed ({reason})");
        }
        SyncOutcome::Live {
            budgets_applied,
            bills_applied,
        } => {
            if !budgets_applied {
                eprintln!("warning: budgets could not be refreshed; showing previous values");
            }
            if !bills_applied {
                eprintln!("warning: bills could not be refreshed; showing previous values");
            }
        }
    }
}

fn ai_client(ctx: &Ctx) -> Result<AiClient> {
    Ok(AiClient::new(
        &ctx.cfg.ai_base_url,
        ctx.ai_key.as_deref(),
        ctx.cfg.request_timeout(),
    )?)
}

fn with_spinner<T>(message: &str, f: impl FnOnce() -> T) -> T {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        pb.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
    }
    pb.enable_steady_tick(Duration::from_millis(80));
    pb.set_message(message.to_string());
    let out = f();
    pb.finish_and_clear();
    out
}

fn prompt_yes_no(prompt: &str) -> Result<bool> {
    eprint!("{prompt}");
    io::stderr().flush().ok();
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    let s = line.trim();
    if s.is_empty() {
        return Ok(true);
    }
    Ok(matches!(s.to_ascii_lowercase().as_str(), "y" | "yes"))
}

fn parse_category(raw: &str) -> Result<Category> {
    match Category::parse(raw) {
        Some(c) => Ok(c),
        None => {
            let known: Vec<&str> = Category::ALL.iter().map(|c| c.alias()).collect();
            bail!("Unknown category: '{raw}' (expected one of: {})", known.join(", "))
        }
    }
}

fn handle_tx(cmd: TxCmd, coord: &mut Coordinator<HttpBackend>, ctx: &mut Ctx) -> Result<()> {
    match cmd {
        TxCmd::List { search } => {
            sync(coord, ctx)?;
            let entries = &coord.state().transactions;
            let hits = view::search(entries, search.as_deref().unwrap_or(""));
            print_transactions(hits.into_iter());
            Ok(())
        }
        TxCmd::Add(args) => {
            let tx = new_transaction(args)?;
            let outcome = coord.add_transaction(&tx)?;
            report_outcome(&outcome);
            println!("Saved transaction: {} {}", view::money(tx.amount), tx.category);
            Ok(())
        }
        TxCmd::Scan => {
            sync(coord, ctx)?;
            let anomalies = coord.scan_anomalies();
            if anomalies.is_empty() {
                println!("(no anomalies)");
            } else {
                println!("type\tmessage\ttransaction");
                for a in &anomalies {
                    let id = a
                        .transaction_id()
                        .map(|id| id.to_string())
                        .unwrap_or_else(|| "-".to_string());
                    println!("{}\t{}\t{id}", a.kind, a.message);
                }
            }
            Ok(())
        }
    }
}

fn new_transaction(args: TxAddArgs) -> Result<NewTransaction> {
    let amount = parse_amount(&args.amount, "amount")?;
    if amount.is_zero() {
        bail!("Invalid amount: '{}' (must be greater than zero)", args.amount);
    }
    let date = match args.date {
        Some(d) => {
            if aggregate::entry_local_date(&d).is_none() {
                bail!("Invalid date: '{d}' (expected YYYY-MM-DD or YYYY-MM-DDTHH:MM)");
            }
            d
        }
        None => Local::now().format("%Y-%m-%dT%H:%M").to_string(),
    };
    Ok(NewTransaction {
        date,
        amount,
        kind: if args.income {
            EntryKind::Income
        } else {
            EntryKind::Expense
        },
        category: parse_category(&args.category)?,
        description: args.description.trim().to_string(),
        source: args.source,
    })
}

fn handle_budget(cmd: BudgetCmd, coord: &mut Coordinator<HttpBackend>, ctx: &mut Ctx) -> Result<()> {
    match cmd {
        BudgetCmd::List => {
            sync(coord, ctx)?;
            let budgets = &coord.state().budgets;
            if budgets.is_empty() {
                println!("(no budgets)");
                return Ok(());
            }
            println!("id\tcategory\tlimit\tspent\tused\tstatus");
            for b in budgets {
                let id = b.id.as_ref().map(|id| id.to_string()).unwrap_or_default();
                println!(
                    "{id}\t{}\t{}\t{}\t{}\t{}",
                    b.category,
                    view::money(b.limit),
                    view::money(b.spent),
                    view::percent(b.usage_ratio()),
                    b.status()
                );
            }
            Ok(())
        }
        BudgetCmd::Show { category } => {
            let category = parse_category(&category)?;
            sync(coord, ctx)?;
            let state = coord.state();
            let Some(budget) = state.budgets.iter().find(|b| b.category == category) else {
                bail!("No budget for category '{category}'");
            };
            println!("category\t{}", budget.category);
            println!("limit\t{}", view::money(budget.limit));
            println!("spent\t{}", view::money(budget.spent));
            println!("used\t{}", view::percent(budget.usage_ratio()));
            println!("status\t{}", budget.status());
            println!();
            let entries = view::budget_transactions(budget, &state.transactions);
            print_transactions(entries.into_iter());
            Ok(())
        }
        BudgetCmd::Add { category, limit } => {
            let budget = NewBudget {
                category: parse_category(&category)?,
                limit: parse_amount(&limit, "limit")?,
            };
            let outcome = coord.add_budget(&budget)?;
            report_outcome(&outcome);
            println!(
                "Created budget: {}\t{}",
                budget.category,
                view::money(budget.limit)
            );
            Ok(())
        }
        BudgetCmd::SetLimit { id, limit } => {
            let id: RecordId = id.parse()?;
            let limit = parse_amount(&limit, "limit")?;
            let outcome = coord.set_budget_limit(&id, limit)?;
            report_outcome(&outcome);
            println!("Updated budget {id}: limit {}", view::money(limit));
            Ok(())
        }
        BudgetCmd::Suggest { income } => {
            sync(coord, ctx)?;
            let income = match income {
                Some(raw) => parse_amount(&raw, "income")?,
                None => aggregate::summarize(&coord.state().transactions).total_income,
            };
            let client = ai_client(ctx)?;
            let suggestions = with_spinner("Asking the AI service for budget limits...", || {
                advisor::suggest_budgets(
                    &client,
                    &ctx.session.user_id,
                    &coord.state().transactions,
                    income,
                )
            })?;
            if suggestions.suggestions.is_empty() {
                println!("(no suggestions)");
                return Ok(());
            }
            println!("category\tsuggested\treason");
            for s in &suggestions.suggestions {
                println!(
                    "{}\t{}\t{}",
                    s.category,
                    view::money(s.suggested_limit),
                    s.reason
                );
            }
            Ok(())
        }
    }
}

fn handle_bill(cmd: BillCmd, coord: &mut Coordinator<HttpBackend>, ctx: &mut Ctx) -> Result<()> {
    match cmd {
        BillCmd::List => {
            sync(coord, ctx)?;
            print_bills(&coord.state().bills);
            Ok(())
        }
        BillCmd::Add {
            name,
            amount,
            due,
            recurring,
        } => {
            let bill = new_bill(&name, parse_amount(&amount, "amount")?, &due, recurring)?;
            let outcome = coord.add_bill(&bill)?;
            report_outcome(&outcome);
            println!("Saved bill: {}\t{}", bill.name, view::money(bill.amount));
            Ok(())
        }
        BillCmd::Pay { id, confirm } => {
            let id: RecordId = id.parse()?;
            if confirm && !prompt_yes_no(&format!("Mark bill {id} as paid? [Y/n] "))? {
                return Ok(());
            }
            let outcome = coord.pay_bill(&id)?;
            report_outcome(&outcome);
            println!("Paid bill {id}.");
            Ok(())
        }
        BillCmd::Extract { text, save } => {
            let client = ai_client(ctx)?;
            let reply = with_spinner("Reading the bill...", || {
                advisor::extract_bill(&client, &ctx.session.user_id, &text)
            })?;
            let Some(found) = reply.decode::<ExtractedBill>() else {
                if let AiReply::Unstructured(answer) = &reply {
                    eprintln!("AI answer: {}", answer.trim());
                }
                println!("(no bill found)");
                return Ok(());
            };
            println!("name\t{}", found.name);
            println!("amount\t{}", view::money(found.amount));
            println!("due\t{}", found.due_date);
            println!("recurring\t{}", view::yes_no(found.is_recurring));
            if save {
                let bill = new_bill(&found.name, found.amount, &found.due_date, found.is_recurring)?;
                let outcome = coord.add_bill(&bill)?;
                report_outcome(&outcome);
                println!("Saved bill: {}", bill.name);
            }
            Ok(())
        }
    }
}

fn new_bill(name: &str, amount: Decimal, due: &str, recurring: bool) -> Result<NewBill> {
    let name = name.trim();
    if name.is_empty() {
        bail!("Bill name must not be empty");
    }
    let due_date = chrono::NaiveDate::parse_from_str(due.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid due date: '{due}' (expected YYYY-MM-DD)"))?;
    Ok(NewBill {
        name: name.to_string(),
        amount,
        due_date: due_date.format("%Y-%m-%d").to_string(),
        status: BillStatus::Pending,
        is_recurring: recurring,
    })
}

fn handle_chat(args: ChatArgs, coord: &mut Coordinator<HttpBackend>, ctx: &mut Ctx) -> Result<()> {
    let path = ctx.paths.chat_transcript();
    let mut transcript = if args.reset {
        ChatTranscript::default()
    } else {
        ChatTranscript::load(&path)?
    };

    if let Some(message) = args.message.filter(|m| !m.trim().is_empty()) {
        let client = ai_client(ctx)?;
        sync(coord, ctx)?;
        let state = coord.state();
        let reply = with_spinner("Waiting for the advisor...", || {
            transcript
                .send(
                    &client,
                    &ctx.session.user_id,
                    &message,
                    &state.transactions,
                    &state.budgets,
                )
                .map(|m| m.map(|m| m.content.clone()))
        })?;
        if let Some(reply) = reply {
            println!("{reply}");
        }
    } else {
        for m in transcript.messages() {
            let who = match m.role {
                Role::Ai => "advisor",
                Role::User => "you",
            };
            println!("{who}\t{}", m.content);
        }
    }

    transcript.save(&path)
}

fn handle_config(cmd: ConfigCmd, cfg: &mut AppConfig, cfg_path: &Path) -> Result<()> {
    match cmd {
        ConfigCmd::Show => {
            println!("{}", serde_json::to_string_pretty(cfg)?);
            Ok(())
        }
        ConfigCmd::Set { key, value } => {
            cfg.set_key(&key, &value)?;
            write_config(cfg_path, cfg)?;
            println!("Set {key}.");
            Ok(())
        }
    }
}

fn print_dashboard(entries: &[LedgerEntry]) {
    let metrics = aggregate::summarize(entries);
    println!("income\t{}", view::money(metrics.total_income));
    println!("expense\t{}", view::money(metrics.total_expense));
    println!(
        "net\t{}",
        view::money(metrics.total_income - metrics.total_expense)
    );
    if metrics.undated > 0 {
        eprintln!(
            "warning: {} transaction(s) without a readable date left out of the trend",
            metrics.undated
        );
    }

    println!();
    println!("month\tbalance");
    if metrics.trend.is_empty() {
        println!("(no data)");
    }
    for point in &metrics.trend {
        println!("{}\t{}", point.label, view::money(point.cumulative_balance));
    }

    println!();
    println!("category\tspent\tshare");
    if metrics.top_categories.is_empty() {
        println!("(no data)");
    }
    let max = metrics
        .top_categories
        .first()
        .map(|c| c.total)
        .unwrap_or(Decimal::ZERO);
    for c in &metrics.top_categories {
        println!(
            "{}\t{}\t{}",
            c.category,
            view::money(c.total),
            view::bar(c.total, max, BAR_WIDTH)
        );
    }
}

fn print_transactions<'a>(entries: impl Iterator<Item = &'a LedgerEntry>) {
    let mut entries = entries.peekable();
    if entries.peek().is_none() {
        println!("(no transactions)");
        return;
    }
    println!("id\tdate\ttype\tcategory\tamount\tsource\tdescription\tflag");
    for e in entries {
        let kind = if e.is_income() { "income" } else { "expense" };
        let flag = match (&e.anomaly_reason, e.is_anomaly) {
            (Some(reason), true) => format!("ANOMALY: {reason}"),
            (None, true) => "ANOMALY".to_string(),
            _ => String::new(),
        };
        println!(
            "{}\t{}\t{kind}\t{}\t{}\t{}\t{}\t{flag}",
            e.id,
            e.date,
            e.category,
            view::money(e.amount),
            e.source,
            e.description
        );
    }
}

fn print_bills(bills: &[domain::Bill]) {
    let (pending, paid) = view::partition_bills(bills);
    for (title, group) in [("pending", pending), ("paid", paid)] {
        println!("{title}");
        if group.is_empty() {
            println!("(no bills)");
        } else {
            println!("id\tname\tdue\tamount\tstatus\trecurring");
            for b in group {
                println!(
                    "{}\t{}\t{}\t{}\t{}\t{}",
                    b.id,
                    b.name,
                    b.due_date,
                    view::money(b.amount),
                    b.status,
                    view::yes_no(b.is_recurring)
                );
            }
        }
        println!();
    }
}

/// Backend analytics are optional extras: a failure is reported and the command still succeeds.
fn print_backend_report(what: &str, report: Result<Value, api::ApiError>) {
    let value = match report {
        Ok(v) => v,
        Err(err) => {
            eprintln!("warning: {what} unavailable ({err})");
            println!("(no data)");
            return;
        }
    };
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, v) in map {
                match v {
                    Value::String(s) => println!("{key}\t{s}"),
                    other => println!("{key}\t{other}"),
                }
            }
        }
        Value::Null | Value::Object(_) => println!("(no data)"),
        other => println!("{}", serde_json::to_string_pretty(&other).unwrap_or_default()),
    }
}

fn print_ai_forecast(forecast: &advisor::SpendingForecast) {
    if forecast.predictions.is_empty() {
        println!("(no predictions)");
    } else {
        println!("month\texpense\tbalance");
        for p in &forecast.predictions {
            println!(
                "{}\t{}\t{}",
                p.month,
                view::money(p.projected_expense),
                view::money(p.projected_balance)
            );
        }
    }
    println!("forecast_balance\t{}", view::money(forecast.forecast_balance));
    for r in &forecast.risk_factors {
        println!("risk\t{r}");
    }
    for r in &forecast.recommendations {
        println!("recommendation\t{r}");
    }
}

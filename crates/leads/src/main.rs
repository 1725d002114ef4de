//! Leads CLI - run orchestration and contact-safety checks.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

use leads::abn::{AbnLookup, AbnLookupResult};
use leads::dispatch::DispatchedEvent;
use leads::finder::{AiEmailFinder, EmailDiscovery, EmailFinder, FindStatus, HunterFinder};
use leads::research::FirecrawlClient;
use leads::suppression::{SendGridFeed, SuppressionSync};
use leads::{
    classify, AdvanceOutcome, BatchDispatcher, ChannelDispatcher, ContactStatus, EngineConfig,
    Lead, LeadFilter, MemoryStore, PrescreenStage, PromptManager, ProviderClassifier,
    ResearchDepth, ResearchStage, Run, RunStateMachine, Store, SuppressionGuard,
    SuppressionRecord, SuppressionSource,
};
use llm::OpenAIProvider;

/// Leads CLI - qualify leads and keep outreach safe.
#[derive(Parser)]
#[command(name = "leads")]
#[command(about = "Lead lifecycle orchestration and contact-safety engine")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON snapshot holding runs, leads, and suppressions
    #[arg(long, global = true, env = "LEADS_STORE", default_value = "leads-store.json")]
    store: PathBuf,

    /// Directory of `.hbs` prompt overrides
    #[arg(long, global = true, env = "LEADS_PROMPTS_DIR")]
    prompts: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum FinderKind {
    Ai,
    Hunter,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Classify an email address
    Classify {
        email: String,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        #[arg(long)]
        position: Option<String>,
    },

    /// Create a run from a JSON file of `{ "name", "website" }` entries
    Import {
        file: PathBuf,
        /// Run name
        #[arg(long)]
        name: String,
    },

    /// List runs
    Runs,

    /// Advance a run and work it to completion in-process
    Advance {
        run_id: Uuid,
        /// Use deep research with web search
        #[arg(long)]
        deep: bool,
    },

    /// Force-restart a run with stuck or unfinished leads
    Restart {
        run_id: Uuid,
        /// Only re-queue; do not work the queue
        #[arg(long)]
        no_work: bool,
        #[arg(long)]
        deep: bool,
    },

    /// Merge runs into a new one, deduplicating leads
    Merge {
        #[arg(required = true, num_args = 2..)]
        run_ids: Vec<Uuid>,
        #[arg(long)]
        name: Option<String>,
    },

    /// Pause a run
    Pause { run_id: Uuid },

    /// Resume a paused run
    Resume { run_id: Uuid },

    /// Check whether an address may be contacted
    Check {
        email: String,
        #[arg(long)]
        domain: Option<String>,
    },

    /// Check every lead of a run
    BulkCheck { run_id: Uuid },

    /// Show whether a lead is ready for outreach
    Ready { lead_id: Uuid },

    /// Record outreach to a lead
    RecordContact { lead_id: Uuid },

    /// Manually suppress an address
    Suppress {
        email: String,
        #[arg(long)]
        reason: Option<String>,
    },

    /// Remove a suppression
    Unsuppress { email: String },

    /// Pull bounces, unsubscribes, and group unsubscribes from SendGrid
    Sync {
        /// Only entries created after this RFC 3339 time
        #[arg(long)]
        since: Option<DateTime<Utc>>,
    },

    /// Find contact emails for a run's researchable leads
    FindEmails {
        run_id: Uuid,
        #[arg(long, value_enum, default_value = "ai")]
        finder: FinderKind,
    },

    /// Look up an ABN in the business register
    Abn { abn: String },
}

#[derive(Debug, Deserialize)]
struct ImportEntry {
    name: String,
    #[serde(default)]
    website: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        EnvFilter::new("leads=debug,llm=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("leads=info,warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = EngineConfig::from_env();
    let memory = Arc::new(
        MemoryStore::load(&cli.store)
            .await
            .with_context(|| format!("loading {}", cli.store.display()))?,
    );
    let store: Arc<dyn Store> = memory.clone();
    let prompts_dir = cli.prompts.as_deref();

    let mutated = match cli.command {
        Commands::Classify {
            email,
            first_name,
            last_name,
            position,
        } => {
            let result = classify(
                &email,
                first_name.as_deref(),
                last_name.as_deref(),
                position.as_deref(),
            );
            if cli.json {
                print_json(&result)?;
            } else {
                let recommended = if result.is_recommended {
                    "recommended".green()
                } else {
                    "not recommended".yellow()
                };
                println!(
                    "{} {} score={} ({recommended})",
                    email.bold(),
                    result.category,
                    result.priority_score
                );
                println!("   {}", result.reasoning);
            }
            false
        }
        Commands::Import { file, name } => {
            run_import(&store, &file, name).await?;
            true
        }
        Commands::Runs => {
            let runs = store.list_runs().await?;
            if cli.json {
                print_json(&runs)?;
            } else {
                for run in &runs {
                    print_run(run);
                }
                println!("Total: {} runs", runs.len());
            }
            false
        }
        Commands::Advance { run_id, deep } => {
            let (machine, mut events) = build_machine(&store, &config, prompts_dir, deep)?;
            let outcome = machine.run_to_completion(run_id, &mut events).await?;
            print_outcome(&outcome, cli.json)?;
            true
        }
        Commands::Restart {
            run_id,
            no_work,
            deep,
        } => {
            let (machine, mut events) = build_machine(&store, &config, prompts_dir, deep)?;
            let report = machine.force_restart(run_id).await?;
            if cli.json {
                print_json(&report)?;
            } else {
                println!(
                    "{} {} leads: {} skipped, {} graded F, {} finished, {} stuck reset",
                    "Restarted".green(),
                    report.total_leads,
                    report.skipped,
                    report.graded_f,
                    report.terminal,
                    report.stuck_reset
                );
                println!(
                    "   Queued {} for prescreen and {} for research ({} failed batches)",
                    report.needing_prescreen,
                    report.needing_research,
                    report.failed_batches()
                );
            }
            if !no_work {
                while let Ok(event) = events.try_recv() {
                    machine.handle_event(&event).await?;
                }
                let outcome = machine.run_to_completion(run_id, &mut events).await?;
                print_outcome(&outcome, cli.json)?;
            }
            true
        }
        Commands::Merge { run_ids, name } => {
            let (machine, _events) = build_machine(&store, &config, prompts_dir, false)?;
            let report = machine.merge(&run_ids, name).await?;
            if cli.json {
                print_json(&report)?;
            } else {
                println!(
                    "{} {} runs into {}: kept {} of {} leads",
                    "Merged".green(),
                    report.source_run_ids.len(),
                    report.merged_run.id,
                    report.leads_kept,
                    report.leads_considered
                );
            }
            true
        }
        Commands::Pause { run_id } => {
            let (machine, _events) = build_machine(&store, &config, prompts_dir, false)?;
            print_run(&machine.pause(run_id).await?);
            true
        }
        Commands::Resume { run_id } => {
            let (machine, _events) = build_machine(&store, &config, prompts_dir, false)?;
            print_run(&machine.resume(run_id).await?);
            true
        }
        Commands::Check { email, domain } => {
            let guard = SuppressionGuard::new(store.clone());
            let check = guard.check(&email, domain.as_deref()).await?;
            if cli.json {
                print_json(&check)?;
            } else if check.can_contact() {
                println!("{} {}", "SAFE".green().bold(), check.email);
            } else {
                println!("{} {}", "BLOCKED".red().bold(), check.email);
                if let Some(reason) = &check.suppression_reason {
                    println!("   suppressed: {reason}");
                }
                if let Some(after) = check.cadence.can_contact_after.filter(|_| !check.cadence.can_contact) {
                    println!("   domain contacted recently, next contact after {}", after.format("%Y-%m-%d"));
                }
            }
            false
        }
        Commands::BulkCheck { run_id } => {
            let leads = store.list_leads(&LeadFilter::run(run_id)).await?;
            let report = SuppressionGuard::new(store.clone()).bulk_check(&leads).await?;
            if cli.json {
                print_json(&report)?;
            } else {
                for row in &report.results {
                    let status = match row.status {
                        ContactStatus::Safe => "SAFE".green(),
                        ContactStatus::Warning => "WARN".yellow(),
                        ContactStatus::Blocked => "BLOCK".red(),
                    };
                    println!(
                        "{status} {} {}",
                        row.business_name,
                        row.primary_email.as_deref().unwrap_or("-")
                    );
                    for reason in &row.reasons {
                        println!("      {reason}");
                    }
                }
                println!(
                    "Safe: {}  Warning: {}  Blocked: {}",
                    report.safe, report.warning, report.blocked
                );
            }
            false
        }
        Commands::Ready { lead_id } => {
            let lead = find_lead(&store, lead_id).await?;
            let decision = SuppressionGuard::new(store.clone()).ready_to_send(&lead).await?;
            if cli.json {
                print_json(&decision)?;
            } else if decision.is_ready() {
                println!("{} {}", "READY".green().bold(), lead.business_name);
            } else {
                println!("{} {}", "NOT READY".red().bold(), lead.business_name);
                println!("   {}", serde_json::to_string(&decision)?);
            }
            false
        }
        Commands::RecordContact { lead_id } => {
            let guard = SuppressionGuard::new(store.clone());
            match guard.record_lead_contact(lead_id, Utc::now()).await? {
                Some(tracking) => println!(
                    "{} {} (contact #{}, next after {})",
                    "Recorded".green(),
                    tracking.domain,
                    tracking.total_contacts,
                    tracking.can_contact_after.format("%Y-%m-%d")
                ),
                None => println!("{} lead has no domain; only the lead was stamped", "Recorded".yellow()),
            }
            true
        }
        Commands::Suppress { email, reason } => {
            let mut record = SuppressionRecord::new(&email, SuppressionSource::Manual);
            if let Some(reason) = reason {
                record = record.with_reason(reason);
            }
            let outcome = SuppressionGuard::new(store.clone()).suppress(record).await?;
            println!("{} {email} ({outcome:?})", "Suppressed".green());
            true
        }
        Commands::Unsuppress { email } => {
            let removed = SuppressionGuard::new(store.clone()).unsuppress(&email).await?;
            if removed {
                println!("{} {email}", "Removed".green());
            } else {
                println!("{} {email} was not suppressed", "Nothing to remove:".yellow());
            }
            removed
        }
        Commands::Sync { since } => {
            run_sync(&store, &config, since, cli.json).await?;
            true
        }
        Commands::FindEmails { run_id, finder } => {
            run_find_emails(&store, &config, prompts_dir, run_id, finder, cli.json).await?;
            true
        }
        Commands::Abn { abn } => {
            let lookup = AbnLookup::from_env()?.with_timeout(config.lookup_timeout);
            let result = lookup.lookup(&abn).await?;
            if cli.json {
                print_json(&result)?;
            } else {
                match result {
                    AbnLookupResult::Found(details) => {
                        println!("{} {} ({:?})", details.abn.bold(), details.entity_name, details.status);
                        for name in &details.business_names {
                            println!("   trading as {name}");
                        }
                    }
                    AbnLookupResult::NotFound => println!("{}", "Not found".yellow()),
                    AbnLookupResult::Unknown { reason } => {
                        println!("{} ({reason})", "Unknown".yellow());
                    }
                }
            }
            false
        }
    };

    if mutated {
        memory
            .save(&cli.store)
            .await
            .with_context(|| format!("saving {}", cli.store.display()))?;
        tracing::debug!(path = %cli.store.display(), "Store saved");
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_run(run: &Run) {
    let paused = if run.is_paused { " (paused)".yellow() } else { "".normal() };
    println!("{} {} [{}]{paused}", run.id, run.name.bold(), run.status);
    println!(
        "   {} leads, {}% | A:{} B:{} C:{} D:{} F:{}",
        run.total_leads,
        run.progress,
        run.grades.grade_a_count,
        run.grades.grade_b_count,
        run.grades.grade_c_count,
        run.grades.grade_d_count,
        run.grades.grade_f_count
    );
}

fn print_outcome(outcome: &AdvanceOutcome, json: bool) -> Result<()> {
    if json {
        return print_json(outcome);
    }
    match outcome {
        AdvanceOutcome::Paused => println!("{}", "Run is paused".yellow()),
        AdvanceOutcome::InProgress { in_flight } => {
            println!("{} {in_flight} leads still in flight", "In progress:".yellow());
        }
        AdvanceOutcome::Dispatched { stage, report } => println!(
            "{} {stage}: {} leads dispatched, {} batches failed",
            "Stalled in".yellow(),
            report.leads_dispatched,
            report.batches_failed
        ),
        AdvanceOutcome::Completed { run } => {
            println!("{}", "Run completed".green());
            print_run(run);
        }
    }
    Ok(())
}

async fn find_lead(store: &Arc<dyn Store>, lead_id: Uuid) -> Result<Lead> {
    store
        .get_lead(lead_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Lead {lead_id} not found"))
}

fn load_prompts(dir: Option<&Path>) -> Result<Arc<PromptManager>> {
    let prompts = match dir {
        Some(dir) => PromptManager::from_dir(dir)?,
        None => PromptManager::new()?,
    };
    Ok(Arc::new(prompts))
}

fn build_machine(
    store: &Arc<dyn Store>,
    config: &EngineConfig,
    prompts_dir: Option<&Path>,
    deep: bool,
) -> Result<(RunStateMachine, mpsc::UnboundedReceiver<DispatchedEvent>)> {
    let prompts = load_prompts(prompts_dir)?;
    let provider = Arc::new(OpenAIProvider::from_env());
    let ai = Arc::new(
        ProviderClassifier::new(provider, config.model.clone()).with_search_model(config.deep_model.clone()),
    );

    let depth = if deep || config.deep_research {
        ResearchDepth::Deep
    } else {
        ResearchDepth::Lightweight
    };
    let mut research = ResearchStage::new(ai.clone(), prompts.clone(), depth);
    match FirecrawlClient::from_env() {
        Ok(client) => research = research.with_fetcher(Arc::new(client)),
        Err(e) => tracing::warn!(error = %e, "Firecrawl not configured, researching without site content"),
    }

    let prescreen = PrescreenStage::new(ai, prompts).with_batch_size(config.prescreen_batch_size);
    let (channel, events) = ChannelDispatcher::new();
    let dispatcher = BatchDispatcher::new(Arc::new(channel), store.clone())
        .with_batch_size(config.dispatch_batch_size);

    let machine = RunStateMachine::new(store.clone(), dispatcher, Arc::new(prescreen), Arc::new(research))
        .with_pool(leads::BoundedPool::new(config.ai_concurrency));
    Ok((machine, events))
}

async fn run_import(store: &Arc<dyn Store>, file: &Path, name: String) -> Result<()> {
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let entries: Vec<ImportEntry> = serde_json::from_str(&content)?;
    if entries.is_empty() {
        anyhow::bail!("{} contains no leads", file.display());
    }

    let mut run = Run::new(name, entries.len() as u32);
    store.insert_run(run.clone()).await?;
    let mut leads = Vec::with_capacity(entries.len());
    for entry in entries {
        let lead = Lead::new(run.id, entry.name, entry.website);
        store.insert_lead(lead.clone()).await?;
        leads.push(lead);
    }

    run.transition(leads::RunStatus::Scraping, leads::entities::TransitionKind::Normal)?;
    run.transition(leads::RunStatus::Ready, leads::entities::TransitionKind::Normal)?;
    run.recount(&leads);
    store.update_run(&run).await?;

    tracing::info!(run_id = %run.id, leads = leads.len(), "Imported run");
    print_run(&run);
    Ok(())
}

async fn run_sync(
    store: &Arc<dyn Store>,
    config: &EngineConfig,
    since: Option<DateTime<Utc>>,
    json: bool,
) -> Result<()> {
    let feed = Arc::new(SendGridFeed::from_env()?);
    let (tx, mut rx) = mpsc::channel(32);
    let sync = SuppressionSync::new(store.clone(), feed, config.sync_page_size).with_progress(tx);

    let printer = tokio::spawn(async move {
        while let Some(progress) = rx.recv().await {
            eprintln!(
                "   {} page {}: {} fetched, {} new, {} updated",
                progress.feed, progress.page, progress.fetched, progress.inserted, progress.updated
            );
        }
    });
    let report = sync.sync_all(since).await;
    drop(sync);
    printer.await?;
    let report = report?;

    if json {
        return print_json(&report);
    }
    for feed in &report.feeds {
        let line = format!(
            "{}: {} fetched, {} new, {} updated, {} leads flagged",
            feed.feed, feed.fetched, feed.inserted, feed.updated, feed.leads_flagged
        );
        match &feed.error {
            Some(error) => println!("{} {line} ({error})", "PARTIAL".yellow()),
            None => println!("{} {line}", "OK".green()),
        }
    }
    println!("Inserted {} suppressions", report.inserted());
    Ok(())
}

async fn run_find_emails(
    store: &Arc<dyn Store>,
    config: &EngineConfig,
    prompts_dir: Option<&Path>,
    run_id: Uuid,
    kind: FinderKind,
    json: bool,
) -> Result<()> {
    let leads: Vec<Lead> = store
        .list_leads(&LeadFilter::run(run_id))
        .await?
        .into_iter()
        .filter(Lead::is_contact_eligible)
        .collect();

    let discovery = match kind {
        FinderKind::Ai => {
            let provider = Arc::new(OpenAIProvider::from_env());
            let ai = Arc::new(
                ProviderClassifier::new(provider, config.model.clone())
                    .with_search_model(config.deep_model.clone()),
            );
            let finder: Arc<dyn EmailFinder> = Arc::new(AiEmailFinder::new(ai, load_prompts(prompts_dir)?));
            EmailDiscovery::windowed(store.clone(), finder)
        }
        FinderKind::Hunter => {
            let finder: Arc<dyn EmailFinder> = Arc::new(HunterFinder::from_env()?);
            EmailDiscovery::sequential(store.clone(), finder)
        }
    };

    let report = discovery.discover(&leads).await;
    if json {
        return print_json(&report);
    }
    for result in &report.results {
        match &result.status {
            FindStatus::Found { emails, recommended } => println!(
                "{} {} ({emails} new, best {})",
                "FOUND".green(),
                result.business_name,
                recommended.as_deref().unwrap_or("-")
            ),
            FindStatus::NoneFound => println!("{} {}", "NONE".normal(), result.business_name),
            FindStatus::RateLimited { reason } | FindStatus::Failed { reason } => {
                println!("{} {} ({reason})", "FAILED".red(), result.business_name);
            }
        }
    }
    println!(
        "Found: {}  None: {}  Rate limited: {}  Failed: {}",
        report.found, report.none_found, report.rate_limited, report.failed
    );
    Ok(())
}

use std::sync::atomic::Ordering;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use grievance_common::{
    Config, GrievanceStatus, ListFilter, PageRequest, SourceKind, SubmissionForm, MAX_PAGE_SIZE,
};
use grievance_intake::{CycleSummary, GrievanceService};

#[derive(Parser)]
#[command(name = "grievance", about = "Civic grievance intake and tracking")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// File a citizen grievance
    Submit {
        #[arg(long)]
        description: String,
        #[arg(long)]
        heading: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        state: Option<String>,
        #[arg(long)]
        country: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
    },
    /// List grievances in sheet order
    List {
        #[arg(long)]
        status: Option<GrievanceStatus>,
        #[arg(long)]
        source: Option<SourceKind>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long, default_value_t = 0)]
        skip: usize,
        #[arg(long, default_value_t = MAX_PAGE_SIZE)]
        limit: usize,
    },
    /// Show one grievance
    Get { ticket_id: String },
    /// Move a grievance to its next status
    UpdateStatus {
        ticket_id: String,
        status: GrievanceStatus,
        /// Fail with a version conflict unless the stored version matches
        #[arg(long)]
        expected_version: Option<u64>,
    },
    /// Dashboard counts
    Stats,
    /// Run one scrape cycle over every configured source
    ScrapeAll,
    /// Run one scrape cycle for a single source
    ScrapeOne { source: String },
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Cancel the running cycle on Ctrl-C; in-flight writes still complete.
fn cancel_on_ctrl_c(service: &GrievanceService) {
    let flag = service.orchestrator().cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight work");
            flag.store(true, Ordering::Relaxed);
        }
    });
}

fn report(summary: &CycleSummary) -> Result<()> {
    eprintln!("{summary}");
    print_json(summary)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("grievance=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = Config::from_env()?;
    config.log_redacted();
    let service = GrievanceService::from_config(&config)?;

    match cli.command {
        Command::Submit {
            description,
            heading,
            category,
            city,
            state,
            country,
            name,
            email,
            phone,
        } => {
            let grievance = service
                .submit(SubmissionForm {
                    heading,
                    description,
                    category,
                    city,
                    state,
                    country,
                    name,
                    email,
                    phone,
                })
                .await?;
            info!(ticket_id = grievance.ticket_id.as_str(), "Submission recorded");
            print_json(&grievance)?;
        }
        Command::List {
            status,
            source,
            category,
            skip,
            limit,
        } => {
            let filter = ListFilter {
                status,
                source,
                category,
            };
            let page = service.list(&filter, PageRequest::new(skip, limit)).await?;
            print_json(&page)?;
        }
        Command::Get { ticket_id } => print_json(&service.get(&ticket_id).await?)?,
        Command::UpdateStatus {
            ticket_id,
            status,
            expected_version,
        } => {
            let updated = service
                .update_status(&ticket_id, status, expected_version)
                .await?;
            print_json(&updated)?;
        }
        Command::Stats => print_json(&service.stats().await?)?,
        Command::ScrapeAll => {
            info!(sources = ?service.source_names(), "Scraping all sources");
            cancel_on_ctrl_c(&service);
            report(&service.scrape_all().await)?;
        }
        Command::ScrapeOne { source } => {
            cancel_on_ctrl_c(&service);
            report(&service.scrape_one(&source).await?)?;
        }
    }

    Ok(())
}

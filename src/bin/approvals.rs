//! Pending approvals for the configured account.
//!
//! Usage:
//!   cargo run --bin approvals                      # list open jobs with applications
//!   cargo run --bin approvals -- accept <job> <freelancer>
//!   cargo run --bin approvals -- rate <escrow> <1-5>
//!
//! Accepting or rating needs `PRIVATE_KEY`. A rating is also
//! published to the event stream when a streams address is configured.

use alloy::primitives::{Address, U256};
use anyhow::{bail, Context};
use secureflow::actions::{accept_freelancer, rate_freelancer};
use secureflow::config::Config;
use secureflow::jobs::{Job, JobScanner};
use secureflow::notify::NotificationCenter;
use secureflow::onchain::{short_address, EscrowReader, SecureFlowClient};
use secureflow::store;
use secureflow::streams::{publisher, StreamPublisher};
use std::sync::Arc;
use tracing::{info, warn};

enum Command {
    List,
    Accept { job_id: u64, freelancer: Address },
    Rate { escrow_id: u64, rating: u8 },
}

fn parse_args(args: &[String]) -> anyhow::Result<Command> {
    match args.first().map(String::as_str) {
        None | Some("list") => Ok(Command::List),
        Some("accept") => {
            let [_, job, freelancer] = args else {
                bail!("usage: approvals accept <job-id> <freelancer-address>");
            };
            Ok(Command::Accept {
                job_id: job.parse().context("job id must be a number")?,
                freelancer: freelancer.parse().context("invalid freelancer address")?,
            })
        }
        Some("rate") => {
            let [_, escrow, rating] = args else {
                bail!("usage: approvals rate <escrow-id> <1-5>");
            };
            Ok(Command::Rate {
                escrow_id: escrow.parse().context("escrow id must be a number")?,
                rating: rating.parse().context("rating must be a number")?,
            })
        }
        Some(other) => bail!("unknown command: {other}"),
    }
}

fn print_job(job: &Job) {
    println!(
        "#{:<4} {} ({} application{}, {} days)",
        job.id,
        job.title,
        job.applications.len(),
        if job.applications.len() == 1 { "" } else { "s" },
        job.duration_days,
    );
    for app in &job.applications {
        let rating = match &app.rating {
            Some(r) if r.total > 0 => format!("{:.1}* ({})", r.stars(), r.total),
            Some(_) => "unrated".to_string(),
            None => "rating unavailable".to_string(),
        };
        let mut cover: String = app.cover_letter.chars().take(80).collect();
        if app.cover_letter.chars().count() > 80 {
            cover.push_str("...");
        }
        println!(
            "      {} {:>3}d  {:<18} {}  \"{}\"",
            short_address(&app.freelancer),
            app.proposed_timeline_days,
            rating,
            app.applied_at.format("%Y-%m-%d %H:%M"),
            cover,
        );
    }
}

fn publisher_for(config: &Config) -> Option<StreamPublisher> {
    let streams_address = config.streams_address().ok()?;
    match StreamPublisher::connect(&config.chain.rpc_url, streams_address, &config.account.private_key) {
        Ok(p) => Some(p),
        Err(e) => {
            warn!(error = %e, "stream publisher unavailable");
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    let _ = dotenvy::dotenv();

    let config = Config::discover()?;
    config.logging.init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = parse_args(&args)?;

    let account = config.account_address()?;
    let escrow_address = config.escrow_address()?;

    match command {
        Command::List => {
            let client = Arc::new(SecureFlowClient::connect_http(&config.chain.rpc_url, escrow_address)?);
            let scanner = JobScanner::new(client, config.scanner.page_size);
            let jobs = scanner.open_jobs_with_applications(account).await?;
            if jobs.is_empty() {
                println!("No pending approvals for {account}");
                return Ok(());
            }
            println!("Pending approvals for {account}\n");
            for job in &jobs {
                print_job(job);
                println!();
            }
        }
        Command::Accept { job_id, freelancer } => {
            if !config.has_signer() {
                bail!("accepting requires PRIVATE_KEY");
            }
            let client = Arc::new(SecureFlowClient::connect_with_signer(
                &config.chain.rpc_url,
                escrow_address,
                &config.account.private_key,
            )?);
            let scanner = JobScanner::new(client.clone(), config.scanner.page_size);
            let job = scanner
                .open_jobs_with_applications(account)
                .await?
                .into_iter()
                .find(|j| j.id == job_id)
                .with_context(|| format!("job {job_id} is not an open job of {account} with applications"))?;

            let accepted = accept_freelancer(client.as_ref(), &job, freelancer).await?;
            println!("Accepted {} for \"{}\" (tx {})", freelancer, job.title, accepted.tx_hash);

            let mut center = NotificationCenter::new(store::open(&config).await?, config.notifications.max_per_account);
            center.connect(account).await?;
            center.deliver(accepted.freelancer, accepted.notification).await?;
            info!(freelancer = %freelancer, job_id, "approval notification stored");
        }
        Command::Rate { escrow_id, rating } => {
            if !config.has_signer() {
                bail!("rating requires PRIVATE_KEY");
            }
            let client = SecureFlowClient::connect_with_signer(
                &config.chain.rpc_url,
                escrow_address,
                &config.account.private_key,
            )?;
            let tx_hash = rate_freelancer(&client, escrow_id, rating).await?;
            println!("Rated escrow #{escrow_id} with {rating} stars (tx {tx_hash})");

            let Some(publisher) = publisher_for(&config) else {
                return Ok(());
            };
            let summary = client.escrow_summary(escrow_id).await?;
            let Some(freelancer) = summary.beneficiary else {
                return Ok(());
            };
            let average = match client.freelancer_rating(freelancer).await {
                Ok(r) => U256::from(r.average),
                Err(e) => {
                    warn!(error = %e, "could not read updated average rating");
                    U256::ZERO
                }
            };
            let request = publisher::rating(escrow_id, freelancer, account, rating, average, StreamPublisher::now())?;
            if let Err(e) = publisher.send(request).await {
                warn!(error = %e, "rating event not published");
            }
        }
    }

    Ok(())
}

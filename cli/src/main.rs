pub mod cli;

use clap::Parser;

use backend::config::AppConfig;
use backend::service::build_service;
use cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    common::logger::init_logger("cli", false);

    let cli = Cli::parse();
    let cfg = AppConfig::from_env();
    let (scheduler, _store) = build_service(&cfg).await?;

    match cli.command {
        Command::Submit {
            kind,
            username,
            amount_kwh,
            battery_kwh,
        } => {
            let request_id = scheduler
                .submit_request(kind.into(), username, amount_kwh, battery_kwh)
                .await?;
            println!("submitted request #{request_id}");
        }
        Command::Status { request_id } => {
            let status = scheduler.get_request_status(request_id).await?;
            println!("{status:?}");
        }
        Command::Snapshot => {
            for entry in scheduler.snapshot().await {
                println!(
                    "#{} {} pile={:?} amount_kwh={} waiting_seconds={}",
                    entry.request_id,
                    entry.username,
                    entry.pile_id,
                    entry.amount_kwh,
                    entry.waiting_seconds
                );
            }
        }
        Command::Brake { pile_id } => {
            scheduler.brake(pile_id).await?;
            println!("pile {pile_id} braked");
        }
        Command::Recover { pile_id } => {
            scheduler.recover(pile_id).await?;
            println!("pile {pile_id} recovered");
        }
    }

    Ok(())
}

use clap::{Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PileKindArg {
    Slow,
    Fast,
}

impl From<PileKindArg> for core_types::PileKind {
    fn from(v: PileKindArg) -> Self {
        match v {
            PileKindArg::Slow => core_types::PileKind::Slow,
            PileKindArg::Fast => core_types::PileKind::Fast,
        }
    }
}

#[derive(Debug, Parser)]
#[clap(name = "charging-station", version)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Submit a charging request.
    Submit {
        #[clap(value_enum)]
        kind: PileKindArg,
        username: String,
        amount_kwh: Decimal,
        battery_kwh: Decimal,
    },
    /// Look up a request's status by id.
    Status { request_id: u16 },
    /// List every live request in the station.
    Snapshot,
    /// Take a pile offline and re-queue its work.
    Brake { pile_id: u32 },
    /// Bring a braked pile back online.
    Recover { pile_id: u32 },
}

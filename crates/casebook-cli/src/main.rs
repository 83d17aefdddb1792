mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;

use commands::fund::{CombineArgs, FundPerformanceArgs, PortfolioArgs};
use commands::lbo::{AccountsArgs, DebtScheduleArgs, EquityStructureArgs, ExitValuationArgs};
use commands::time_value::IrrArgs;
use commands::venture::{DilutionArgs, ReturnComparisonArgs};

/// Private equity and venture case-study calculators
#[derive(Parser)]
#[command(
    name = "casebook",
    version,
    about = "Private equity and venture case-study calculators",
    long_about = "A CLI for the return metrics behind private equity and venture \
                  case studies with decimal precision. Covers fund fee and carry \
                  waterfalls, blended portfolios, LBO debt schedules and exit \
                  valuation, equity structuring and Series C dilution."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// IRR, multiple and NPV of a yearly cash-flow series
    Irr(IrrArgs),
    /// Net LP cash flows, IRR and multiple for one fund vehicle
    FundPerformance(FundPerformanceArgs),
    /// Blended buyout, co-invest and VC portfolio
    Portfolio(PortfolioArgs),
    /// Sum several cash-flow series year by year
    Combine(CombineArgs),
    /// Margins, cash flow and growth from filed accounts
    Accounts(AccountsArgs),
    /// Senior and subordinated debt schedule
    DebtSchedule(DebtScheduleArgs),
    /// Exit equity value, IRR and multiple sensitivities
    ExitValuation(ExitValuationArgs),
    /// Post-deal split between rolled, locked and sponsor equity
    EquityStructure(EquityStructureArgs),
    /// Series C ownership with the pool before or after the round
    Dilution(DilutionArgs),
    /// Series C certificate versus VC fund returns
    ReturnComparison(ReturnComparisonArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Irr(args) => commands::time_value::run_irr(args),
        Commands::FundPerformance(args) => commands::fund::run_fund_performance(args),
        Commands::Portfolio(args) => commands::fund::run_portfolio(args),
        Commands::Combine(args) => commands::fund::run_combine(args),
        Commands::Accounts(args) => commands::lbo::run_accounts(args),
        Commands::DebtSchedule(args) => commands::lbo::run_debt_schedule(args),
        Commands::ExitValuation(args) => commands::lbo::run_exit_valuation(args),
        Commands::EquityStructure(args) => commands::lbo::run_equity_structure(args),
        Commands::Dilution(args) => commands::venture::run_dilution(args),
        Commands::ReturnComparison(args) => commands::venture::run_return_comparison(args),
        Commands::Version => {
            println!("casebook {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            log::debug!("command failed: {:?}", e);
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}

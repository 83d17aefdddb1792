use clap::{Args, ValueEnum};
use rust_decimal::Decimal;
use serde_json::Value;

use casebook_core::fund::aggregate::{self, CombineInput};
use casebook_core::fund::allocation::{self, AllocationLimits, AllocationSplit};
use casebook_core::fund::config::FundConfig;
use casebook_core::fund::performance::{self, FundPerformanceInput};
use casebook_core::fund::portfolio::{self, PortfolioInput};

use crate::input;

/// Fund terms available without an input file
#[derive(Debug, Clone, ValueEnum)]
pub enum FundPreset {
    Buyout,
    CoInvest,
    Venture,
}

impl FundPreset {
    fn config(&self) -> FundConfig {
        match self {
            FundPreset::Buyout => FundConfig::european_buyout(),
            FundPreset::CoInvest => FundConfig::buyout_co_invest(),
            FundPreset::Venture => FundConfig::european_venture(),
        }
    }
}

/// Arguments for a single-vehicle fund performance run
#[derive(Args)]
pub struct FundPerformanceArgs {
    /// Path to JSON/YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Fund terms to apply
    #[arg(long, value_enum, default_value = "buyout")]
    pub fund: FundPreset,

    /// Capital committed to the vehicle
    #[arg(long)]
    pub allocation: Option<Decimal>,

    /// Gross multiple on invested capital (defaults to the fund's target)
    #[arg(long)]
    pub gross_multiple: Option<Decimal>,

    /// Exit year, counted from first close
    #[arg(long, default_value_t = 10)]
    pub exit_year: u32,
}

pub fn run_fund_performance(args: FundPerformanceArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let perf_input: FundPerformanceInput = if let Some(ref path) = args.input {
        input::file::read_input(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        let allocation = args
            .allocation
            .ok_or("--allocation is required (or provide --input)")?;
        let config = args.fund.config();
        FundPerformanceInput {
            allocation,
            gross_multiple: args.gross_multiple.unwrap_or(config.expected_gross_multiple),
            exit_year: args.exit_year,
            config,
        }
    };

    let result = performance::analyze_fund_performance(&perf_input)?;
    Ok(serde_json::to_value(result)?)
}

/// Arguments for the blended buyout / co-invest / VC portfolio
#[derive(Args)]
pub struct PortfolioArgs {
    /// Path to JSON/YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Total capital; the current buyout/VC ratio is kept and re-clamped
    #[arg(long)]
    pub total_capital: Option<f64>,

    /// Buyout commitment; VC takes the remainder
    #[arg(long, conflicts_with = "vc")]
    pub buyout: Option<f64>,

    /// VC commitment; buyout takes the remainder
    #[arg(long)]
    pub vc: Option<f64>,

    /// Leave the co-invest vehicle out of the buyout allocation
    #[arg(long)]
    pub no_co_invest: bool,

    /// Gross multiple for the buyout vehicles
    #[arg(long)]
    pub buyout_multiple: Option<Decimal>,

    /// Gross multiple for the VC fund
    #[arg(long)]
    pub vc_multiple: Option<Decimal>,

    /// Exit year for the buyout vehicles
    #[arg(long)]
    pub buyout_exit_year: Option<u32>,

    /// Exit year for the VC fund
    #[arg(long)]
    pub vc_exit_year: Option<u32>,
}

pub fn run_portfolio(args: PortfolioArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let portfolio_input: PortfolioInput = if let Some(ref path) = args.input {
        input::file::read_input(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        portfolio_from_flags(&args)
    };

    let result = portfolio::analyze_portfolio(&portfolio_input)?;
    Ok(serde_json::to_value(result)?)
}

/// Apply the flags to the reference case in the order a user would edit the
/// allocation panel: co-invest toggle, total capital, then one strategy.
fn portfolio_from_flags(args: &PortfolioArgs) -> PortfolioInput {
    let mut p = PortfolioInput::default();
    let limits = AllocationLimits::from_funds(&p.funds);
    let mut split = AllocationSplit {
        buyout: p.buyout_allocation,
        vc: p.vc_allocation,
    };

    if args.no_co_invest {
        p.include_co_invest = false;
        split = allocation::toggle_co_invest(split, &limits, false);
    }
    if let Some(total) = args.total_capital {
        let (total, rebalanced) =
            allocation::rebalance_total_capital(total, split, &limits, p.include_co_invest);
        p.total_capital = total;
        split = rebalanced;
    }
    if let Some(buyout) = args.buyout {
        split = allocation::set_buyout_allocation(buyout, p.total_capital, &limits, p.include_co_invest);
    } else if let Some(vc) = args.vc {
        split = allocation::set_vc_allocation(vc, p.total_capital, &limits, p.include_co_invest);
    }

    p.buyout_allocation = split.buyout;
    p.vc_allocation = split.vc;
    if let Some(m) = args.buyout_multiple {
        p.buyout_multiple = m;
    }
    if let Some(m) = args.vc_multiple {
        p.vc_multiple = m;
    }
    if let Some(y) = args.buyout_exit_year {
        p.buyout_exit_year = y;
    }
    if let Some(y) = args.vc_exit_year {
        p.vc_exit_year = y;
    }
    p
}

/// Arguments for combining cash-flow series
#[derive(Args)]
pub struct CombineArgs {
    /// Path to JSON/YAML input file
    #[arg(long)]
    pub input: Option<String>,

    /// One series per flag (comma-separated, e.g. --series "-100,0,150")
    #[arg(long, allow_hyphen_values = true)]
    pub series: Vec<String>,
}

pub fn run_combine(args: CombineArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let combine_input: CombineInput = if let Some(ref path) = args.input {
        input::file::read_input(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else if !args.series.is_empty() {
        let series = args
            .series
            .iter()
            .map(|s| parse_series(s))
            .collect::<Result<Vec<_>, _>>()?;
        CombineInput { series }
    } else {
        return Err("--input <file.json>, stdin or --series required for combine".into());
    };

    let result = aggregate::analyze_combine(&combine_input)?;
    Ok(serde_json::to_value(result)?)
}

fn parse_series(raw: &str) -> Result<Vec<Decimal>, Box<dyn std::error::Error>> {
    raw.split(',')
        .map(|v| {
            v.trim()
                .parse::<Decimal>()
                .map_err(|e| -> Box<dyn std::error::Error> {
                    format!("Invalid cash flow '{}': {}", v.trim(), e).into()
                })
        })
        .collect()
}

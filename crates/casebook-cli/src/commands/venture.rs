use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use casebook_core::venture::dilution::{self, DilutionInput, PoolTiming};
use casebook_core::venture::return_comparison::{self, ReturnComparisonInput};

use crate::input;

/// Arguments for Series C dilution scenarios
#[derive(Args)]
pub struct DilutionArgs {
    /// Path to JSON/YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Pre-money valuation
    #[arg(long)]
    pub pre_money: Option<Decimal>,

    /// Series C round size
    #[arg(long)]
    pub series_c_amount: Option<Decimal>,

    /// Employee option pool target (0-100)
    #[arg(long)]
    pub employee_pool: Option<Decimal>,
}

fn dilution_from_flags(
    pre_money: Option<Decimal>,
    series_c_amount: Option<Decimal>,
    employee_pool: Option<Decimal>,
) -> DilutionInput {
    let reference = DilutionInput::reference();
    DilutionInput {
        pre_money: pre_money.unwrap_or(reference.pre_money),
        series_c_amount: series_c_amount.unwrap_or(reference.series_c_amount),
        employee_pool_percent: employee_pool.unwrap_or(reference.employee_pool_percent),
    }
}

pub fn run_dilution(args: DilutionArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let dilution_input: DilutionInput = if let Some(ref path) = args.input {
        input::file::read_input(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        dilution_from_flags(args.pre_money, args.series_c_amount, args.employee_pool)
    };

    let result = dilution::analyze_dilution(&dilution_input)?;
    Ok(serde_json::to_value(result)?)
}

/// Arguments for the certificate vs VC fund comparison
#[derive(Args)]
pub struct ReturnComparisonArgs {
    /// Path to JSON/YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Pre-money valuation
    #[arg(long)]
    pub pre_money: Option<Decimal>,

    /// Series C round size
    #[arg(long)]
    pub series_c_amount: Option<Decimal>,

    /// Employee option pool target (0-100)
    #[arg(long)]
    pub employee_pool: Option<Decimal>,

    /// Carve the pool out after the round instead of before
    #[arg(long)]
    pub pool_after: bool,

    /// IPO value as a multiple of the Series C post-money
    #[arg(long)]
    pub ipo_multiple: Option<Decimal>,

    /// Year of the IPO
    #[arg(long)]
    pub exit_year: Option<i32>,

    /// Amount committed to either vehicle
    #[arg(long)]
    pub investment: Option<Decimal>,
}

pub fn run_return_comparison(args: ReturnComparisonArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let comparison_input: ReturnComparisonInput = if let Some(ref path) = args.input {
        input::file::read_input(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        let mut c = ReturnComparisonInput::reference();
        c.dilution = dilution_from_flags(args.pre_money, args.series_c_amount, args.employee_pool);
        if args.pool_after {
            c.pool_timing = PoolTiming::After;
        }
        if let Some(m) = args.ipo_multiple {
            c.ipo_multiple = m;
        }
        if let Some(y) = args.exit_year {
            c.ipo_exit_year = y;
        }
        if let Some(amount) = args.investment {
            c.initial_investment = amount;
        }
        c
    };

    let result = return_comparison::analyze_return_comparison(&comparison_input)?;
    Ok(serde_json::to_value(result)?)
}

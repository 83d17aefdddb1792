use chrono::NaiveDate;
use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use casebook_core::lbo::accounts::{self, AccountsInput};
use casebook_core::lbo::debt_schedule::{self, DealTimeline, DebtScheduleInput};
use casebook_core::lbo::equity_structure::{self, EquityStructureInput};
use casebook_core::lbo::exit::{self, ExitValuationInput};

use crate::input;

/// Arguments for enriching filed accounts
#[derive(Args)]
pub struct AccountsArgs {
    /// Path to JSON/YAML input file
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_accounts(args: AccountsArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let accounts_input: AccountsInput = if let Some(ref path) = args.input {
        input::file::read_input(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        return Err("--input <file.json> or stdin required for accounts".into());
    };
    let result = accounts::analyze_accounts(&accounts_input)?;
    Ok(serde_json::to_value(result)?)
}

/// Arguments for the senior / subordinated debt schedule
#[derive(Args)]
pub struct DebtScheduleArgs {
    /// Path to JSON/YAML input file
    #[arg(long)]
    pub input: Option<String>,

    /// Override the transaction close date (YYYY-MM-DD)
    #[arg(long)]
    pub close_date: Option<NaiveDate>,

    /// Restrict the schedule to the holding period ending in this year
    #[arg(long)]
    pub exit_year: Option<i32>,
}

pub fn run_debt_schedule(args: DebtScheduleArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut schedule_input: DebtScheduleInput = if let Some(ref path) = args.input {
        input::file::read_input(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        return Err("--input <file.json> or stdin required for debt schedule".into());
    };
    if let Some(date) = args.close_date {
        schedule_input.timeline = DealTimeline::new(date);
    }
    if args.exit_year.is_some() {
        schedule_input.exit_year = args.exit_year;
    }

    let result = debt_schedule::analyze_debt_schedule(&schedule_input)?;
    Ok(serde_json::to_value(result)?)
}

/// Arguments for exit valuation and multiple sensitivities
#[derive(Args)]
pub struct ExitValuationArgs {
    /// Path to JSON/YAML input file
    #[arg(long)]
    pub input: Option<String>,

    /// Override the transaction close date (YYYY-MM-DD)
    #[arg(long)]
    pub close_date: Option<NaiveDate>,

    /// Exit year (defaults to the first year after the close)
    #[arg(long)]
    pub exit_year: Option<i32>,

    /// Override the entry EV/EBITDA multiple
    #[arg(long)]
    pub entry_multiple: Option<Decimal>,

    /// Override the exit EV/EBITDA multiple
    #[arg(long)]
    pub exit_multiple: Option<Decimal>,
}

pub fn run_exit_valuation(args: ExitValuationArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut exit_input: ExitValuationInput = if let Some(ref path) = args.input {
        input::file::read_input(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        return Err("--input <file.json> or stdin required for exit valuation".into());
    };
    if let Some(date) = args.close_date {
        exit_input.timeline = DealTimeline::new(date);
    }
    if args.exit_year.is_some() {
        exit_input.exit_year = args.exit_year;
    }
    if let Some(m) = args.entry_multiple {
        exit_input.entry_multiple = m;
    }
    if let Some(m) = args.exit_multiple {
        exit_input.exit_multiple = m;
    }

    let result = exit::analyze_exit_valuation(&exit_input)?;
    Ok(serde_json::to_value(result)?)
}

/// Arguments for the post-deal equity structure
#[derive(Args)]
pub struct EquityStructureArgs {
    /// Path to JSON/YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Share of continuing shareholders' value rolled into the deal (0-100)
    #[arg(long, default_value = "50")]
    pub rollover: Decimal,

    /// New equity required by the deal
    #[arg(long)]
    pub equity_plug: Option<Decimal>,

    /// Pre-deal equity value, used to value percentage-only stakes
    #[arg(long)]
    pub equity_value: Option<Decimal>,
}

pub fn run_equity_structure(args: EquityStructureArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let equity_input: EquityStructureInput = if let Some(ref path) = args.input {
        input::file::read_input(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        EquityStructureInput {
            management_rollover_percent: args.rollover,
            equity_plug: args.equity_plug,
            equity_value: args.equity_value,
            pre_deal_shareholders: equity_structure::reference_cap_table(),
            ownership_percent_total: None,
        }
    };

    let result = equity_structure::analyze_equity_structure(&equity_input)?;
    Ok(serde_json::to_value(result)?)
}

use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use casebook_core::time_value::{self, CashFlowInput};

use crate::input;

/// Arguments for stand-alone cash-flow analysis
#[derive(Args)]
pub struct IrrArgs {
    /// Path to JSON/YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Yearly cash flows starting at year 0 (comma-separated, e.g. "-100,0,0,150")
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub cash_flows: Option<Vec<Decimal>>,

    /// Discount rate as a decimal (e.g. 0.08) for an NPV figure
    #[arg(long)]
    pub discount_rate: Option<Decimal>,
}

pub fn run_irr(args: IrrArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let cf_input: CashFlowInput = if let Some(ref path) = args.input {
        input::file::read_input(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        let cash_flows = args
            .cash_flows
            .ok_or("--cash-flows is required (or provide --input)")?;
        CashFlowInput {
            cash_flows,
            discount_rate: args.discount_rate,
        }
    };

    let result = time_value::analyze_cash_flows(&cf_input)?;
    Ok(serde_json::to_value(result)?)
}

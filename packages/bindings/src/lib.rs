use napi::Result as NapiResult;
use napi_derive::napi;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use casebook_core::fund::allocation::{self, AllocationLimits, AllocationSplit};
use casebook_core::fund::config::CaseStudyFunds;

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

// ---------------------------------------------------------------------------
// Cash flows
// ---------------------------------------------------------------------------

#[napi]
pub fn analyze_cash_flows(input_json: String) -> NapiResult<String> {
    let input: casebook_core::time_value::CashFlowInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = casebook_core::time_value::analyze_cash_flows(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn combine_cash_flows(input_json: String) -> NapiResult<String> {
    let input: casebook_core::fund::aggregate::CombineInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output =
        casebook_core::fund::aggregate::analyze_combine(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Funds
// ---------------------------------------------------------------------------

#[napi]
pub fn fund_performance(input_json: String) -> NapiResult<String> {
    let input: casebook_core::fund::performance::FundPerformanceInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = casebook_core::fund::performance::analyze_fund_performance(&input)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn portfolio(input_json: String) -> NapiResult<String> {
    let input: casebook_core::fund::portfolio::PortfolioInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output =
        casebook_core::fund::portfolio::analyze_portfolio(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

/// Reference fund terms, for seeding a front end.
#[napi]
pub fn reference_funds() -> NapiResult<String> {
    serde_json::to_string(&CaseStudyFunds::reference()).map_err(to_napi_error)
}

/// One edit of the allocation panel.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum AllocationEdit {
    TotalCapital { value: f64 },
    Buyout { value: f64 },
    Vc { value: f64 },
    CoInvest { enabled: bool },
}

#[derive(Debug, Deserialize)]
struct AllocationRequest {
    #[serde(flatten)]
    edit: AllocationEdit,
    total_capital: Decimal,
    current: AllocationSplit,
    include_co_invest: bool,
    #[serde(default)]
    funds: CaseStudyFunds,
}

#[derive(Debug, Serialize)]
struct AllocationResponse {
    total_capital: Decimal,
    include_co_invest: bool,
    split: AllocationSplit,
    unallocated: Decimal,
}

#[napi]
pub fn edit_allocation(input_json: String) -> NapiResult<String> {
    let req: AllocationRequest = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let limits = AllocationLimits::from_funds(&req.funds);

    let mut total_capital = req.total_capital;
    let mut include_co_invest = req.include_co_invest;
    let split = match req.edit {
        AllocationEdit::TotalCapital { value } => {
            let (total, split) =
                allocation::rebalance_total_capital(value, req.current, &limits, include_co_invest);
            total_capital = total;
            split
        }
        AllocationEdit::Buyout { value } => {
            allocation::set_buyout_allocation(value, total_capital, &limits, include_co_invest)
        }
        AllocationEdit::Vc { value } => {
            allocation::set_vc_allocation(value, total_capital, &limits, include_co_invest)
        }
        AllocationEdit::CoInvest { enabled } => {
            include_co_invest = enabled;
            allocation::toggle_co_invest(req.current, &limits, enabled)
        }
    };

    let response = AllocationResponse {
        total_capital,
        include_co_invest,
        unallocated: split.unallocated(total_capital),
        split,
    };
    serde_json::to_string(&response).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// LBO
// ---------------------------------------------------------------------------

#[napi]
pub fn accounts(input_json: String) -> NapiResult<String> {
    let input: casebook_core::lbo::accounts::AccountsInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = casebook_core::lbo::accounts::analyze_accounts(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn debt_schedule(input_json: String) -> NapiResult<String> {
    let input: casebook_core::lbo::debt_schedule::DebtScheduleInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = casebook_core::lbo::debt_schedule::analyze_debt_schedule(&input)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn exit_valuation(input_json: String) -> NapiResult<String> {
    let input: casebook_core::lbo::exit::ExitValuationInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output =
        casebook_core::lbo::exit::analyze_exit_valuation(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn equity_structure(input_json: String) -> NapiResult<String> {
    let input: casebook_core::lbo::equity_structure::EquityStructureInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = casebook_core::lbo::equity_structure::analyze_equity_structure(&input)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Venture
// ---------------------------------------------------------------------------

#[napi]
pub fn dilution(input_json: String) -> NapiResult<String> {
    let input: casebook_core::venture::dilution::DilutionInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output =
        casebook_core::venture::dilution::analyze_dilution(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn return_comparison(input_json: String) -> NapiResult<String> {
    let input: casebook_core::venture::return_comparison::ReturnComparisonInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = casebook_core::venture::return_comparison::analyze_return_comparison(&input)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

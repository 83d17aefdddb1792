use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// All monetary values. Wraps Decimal to prevent accidental f64 usage.
pub type Money = Decimal;

/// Rates expressed as decimals (0.05 = 5%). IRRs are always rates.
pub type Rate = Decimal;

/// Percentages on a 0-100 scale (1.85 = 1.85%), as quoted in fund terms and cap tables.
pub type Percent = Decimal;

/// Multiples (e.g., 3.0x gross MOIC)
pub type Multiple = Decimal;

/// Year fractions or counts
pub type Years = Decimal;

/// Signed amounts indexed by whole-year offset from inception (index 0 = year 0).
/// Outflows are negative, inflows positive.
pub type CashFlowSeries = Vec<Money>;

/// Human-readable annotation of one contribution to a cash-flow series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashEvent {
    pub label: String,
    pub amount: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<Percent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u32>,
}

impl CashEvent {
    pub fn new(label: impl Into<String>, amount: Money, year: u32) -> Self {
        CashEvent {
            label: label.into(),
            amount,
            percent: None,
            year: Some(year),
        }
    }

    pub fn with_percent(mut self, percent: Option<Percent>) -> Self {
        self.percent = percent;
        self
    }
}

/// Convert a 0-100 percentage into a decimal rate.
pub fn percent_to_rate(percent: Percent) -> Rate {
    percent / Decimal::ONE_HUNDRED
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "rust_decimal_128bit".to_string(),
        },
    }
}

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::dilution::{series_c_ownership, DilutionInput, PoolTiming};
use crate::error::CasebookError;
use crate::time_value::annualised_return;
use crate::types::*;
use crate::CasebookResult;

/// Year the Series C round closed; fund life runs from here to the IPO.
pub const DEFAULT_ROUND_CLOSE_YEAR: i32 = 2022;

/// IRR reported when the net value is wiped out.
const TOTAL_LOSS_IRR_PERCENT: Decimal = dec!(-100);

fn default_round_close_year() -> i32 {
    DEFAULT_ROUND_CLOSE_YEAR
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnComparisonInput {
    pub dilution: DilutionInput,
    pub ipo_multiple: Multiple,
    /// Amount an investor commits to either vehicle
    pub initial_investment: Money,
    pub structuring_fee_percent: Percent,
    pub performance_fee_percent: Percent,
    /// Annual management fee of the VC fund
    pub management_fee_percent: Percent,
    pub carried_interest_percent: Percent,
    pub ipo_exit_year: i32,
    #[serde(default)]
    pub pool_timing: PoolTiming,
    #[serde(default = "default_round_close_year")]
    pub round_close_year: i32,
}

impl ReturnComparisonInput {
    pub fn reference() -> Self {
        ReturnComparisonInput {
            dilution: DilutionInput::reference(),
            ipo_multiple: Decimal::from(3),
            initial_investment: Decimal::from(1000),
            structuring_fee_percent: Decimal::from(2),
            performance_fee_percent: Decimal::from(10),
            management_fee_percent: Decimal::from(2),
            carried_interest_percent: Decimal::from(20),
            ipo_exit_year: 2024,
            pool_timing: PoolTiming::Before,
            round_close_year: DEFAULT_ROUND_CLOSE_YEAR,
        }
    }

    pub fn fund_life_years(&self) -> i32 {
        self.ipo_exit_year - self.round_close_year
    }
}

/// How the Series C exit value was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferenceOutcome {
    ProRata,
    /// 1x liquidation preference beat the pro-rata stake
    PreferenceApplied,
    /// Exit EV was below the preference, so the investor takes everything
    CappedByExitEv,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesCResult {
    pub exit_ev: Money,
    pub ownership: Decimal,
    pub pro_rata_value: Money,
    pub liquidation_preference: Money,
    pub stake: Money,
    pub investment: Money,
    pub multiple: Multiple,
    pub outcome: PreferenceOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleReturns {
    pub net_value: Money,
    /// Net value over the initial investment minus one, in percent
    pub net_return_percent: Percent,
    pub net_multiple: Multiple,
    /// Annualised over the fund life; `None` when the life is not positive
    pub irr_percent: Option<Percent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateResult {
    pub initial_investment: Money,
    pub structuring_fee: Money,
    pub face_value: Money,
    pub gross_value: Money,
    pub gross_multiple: Multiple,
    pub profit: Money,
    pub performance_fee: Money,
    pub total_fees: Money,
    pub returns: VehicleReturns,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VcFundResult {
    pub initial_investment: Money,
    pub gross_value: Money,
    pub gross_multiple: Multiple,
    pub profit: Money,
    pub management_fees: Money,
    pub carry: Money,
    pub total_fees: Money,
    pub returns: VehicleReturns,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vehicle {
    Certificate,
    VcFund,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonMetrics {
    pub net_value_diff: Money,
    pub return_diff: Percent,
    pub multiple_diff: Multiple,
    pub irr_diff: Option<Percent>,
    pub advantage: Vehicle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnComparison {
    pub fund_life_years: i32,
    pub series_c: SeriesCResult,
    pub certificate: CertificateResult,
    pub vc_fund: VcFundResult,
    pub comparison: ComparisonMetrics,
}

// ---------------------------------------------------------------------------
// Calculation
// ---------------------------------------------------------------------------

fn vehicle_returns(net_value: Money, initial: Money, life_years: i32) -> VehicleReturns {
    let net_multiple = net_value / initial;
    let irr_percent = if life_years <= 0 {
        None
    } else if net_value <= Decimal::ZERO {
        Some(TOTAL_LOSS_IRR_PERCENT)
    } else {
        annualised_return(net_multiple, Decimal::from(life_years))
            .map(|r| r * Decimal::ONE_HUNDRED)
    };
    VehicleReturns {
        net_value,
        net_return_percent: (net_multiple - Decimal::ONE) * Decimal::ONE_HUNDRED,
        net_multiple,
        irr_percent,
    }
}

/// Series C stake at the IPO: the better of pro-rata and the 1x preference,
/// never more than the whole exit EV.
pub fn series_c_exit(dilution: &DilutionInput, ownership: Decimal, ipo_multiple: Multiple) -> SeriesCResult {
    let exit_ev = dilution.post_money() * ipo_multiple;
    let pro_rata_value = exit_ev * ownership;
    let liquidation_preference = dilution.series_c_amount;
    let stake = pro_rata_value.max(liquidation_preference).min(exit_ev);

    let outcome = if stake == exit_ev && exit_ev < liquidation_preference {
        PreferenceOutcome::CappedByExitEv
    } else if stake > pro_rata_value {
        PreferenceOutcome::PreferenceApplied
    } else {
        PreferenceOutcome::ProRata
    };

    SeriesCResult {
        exit_ev,
        ownership,
        pro_rata_value,
        liquidation_preference,
        stake,
        investment: dilution.series_c_amount,
        multiple: stake / dilution.series_c_amount,
        outcome,
    }
}

/// Compare holding the Series C through a tracking certificate against a
/// VC fund that bought the same stake.
pub fn calculate_return_comparison(input: &ReturnComparisonInput) -> CasebookResult<ReturnComparison> {
    if input.initial_investment <= Decimal::ZERO {
        return Err(CasebookError::InvalidInput {
            field: "initial_investment".into(),
            reason: "Initial investment must be positive".into(),
        });
    }
    if input.dilution.series_c_amount <= Decimal::ZERO {
        return Err(CasebookError::InvalidInput {
            field: "dilution.series_c_amount".into(),
            reason: "Round size must be positive to value the preference".into(),
        });
    }

    let ownership = series_c_ownership(&input.dilution, input.pool_timing)?;
    let life = input.fund_life_years();
    let initial = input.initial_investment;
    let series_c = series_c_exit(&input.dilution, ownership, input.ipo_multiple);

    // --- Tracking certificate ---
    let structuring_fee = initial * percent_to_rate(input.structuring_fee_percent);
    let face_value = initial - structuring_fee;
    let cert_gross = face_value * series_c.multiple;
    let cert_profit = cert_gross - face_value;
    let performance_fee = if cert_profit > Decimal::ZERO {
        cert_profit * percent_to_rate(input.performance_fee_percent)
    } else {
        Decimal::ZERO
    };
    let certificate = CertificateResult {
        initial_investment: initial,
        structuring_fee,
        face_value,
        gross_value: cert_gross,
        gross_multiple: cert_gross / initial,
        profit: cert_profit,
        performance_fee,
        total_fees: structuring_fee + performance_fee,
        returns: vehicle_returns(cert_gross - performance_fee, initial, life),
    };

    // --- VC fund ---
    let vc_gross = initial * series_c.multiple;
    let management_fees =
        initial * percent_to_rate(input.management_fee_percent) * Decimal::from(life.max(0));
    let vc_profit = vc_gross - initial;
    let carry = if vc_profit > Decimal::ZERO {
        vc_profit * percent_to_rate(input.carried_interest_percent)
    } else {
        Decimal::ZERO
    };
    let vc_fund = VcFundResult {
        initial_investment: initial,
        gross_value: vc_gross,
        gross_multiple: vc_gross / initial,
        profit: vc_profit,
        management_fees,
        carry,
        total_fees: management_fees + carry,
        returns: vehicle_returns(vc_gross - management_fees - carry, initial, life),
    };

    // --- Comparison ---
    let cert = &certificate.returns;
    let vc = &vc_fund.returns;
    let comparison = ComparisonMetrics {
        net_value_diff: cert.net_value - vc.net_value,
        return_diff: cert.net_return_percent - vc.net_return_percent,
        multiple_diff: cert.net_multiple - vc.net_multiple,
        irr_diff: cert.irr_percent.zip(vc.irr_percent).map(|(c, v)| c - v),
        advantage: if cert.net_value >= vc.net_value {
            Vehicle::Certificate
        } else {
            Vehicle::VcFund
        },
    };

    Ok(ReturnComparison {
        fund_life_years: life,
        series_c,
        certificate,
        vc_fund,
        comparison,
    })
}

pub fn analyze_return_comparison(
    input: &ReturnComparisonInput,
) -> CasebookResult<ComputationOutput<ReturnComparison>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if input.ipo_multiple < Decimal::ZERO {
        return Err(CasebookError::InvalidInput {
            field: "ipo_multiple".into(),
            reason: "IPO multiple cannot be negative".into(),
        });
    }
    for (field, pct) in [
        ("structuring_fee_percent", input.structuring_fee_percent),
        ("performance_fee_percent", input.performance_fee_percent),
        ("management_fee_percent", input.management_fee_percent),
        ("carried_interest_percent", input.carried_interest_percent),
    ] {
        if pct < Decimal::ZERO || pct > Decimal::ONE_HUNDRED {
            return Err(CasebookError::InvalidInput {
                field: field.into(),
                reason: "Percentage must be between 0 and 100".into(),
            });
        }
    }

    let output = calculate_return_comparison(input)?;
    if output.fund_life_years <= 0 {
        warnings.push(format!(
            "IPO in {} is not after the {} close: IRR undefined",
            input.ipo_exit_year, input.round_close_year
        ));
    }
    match output.series_c.outcome {
        PreferenceOutcome::PreferenceApplied => {
            warnings.push("1x liquidation preference exceeds the pro-rata stake".into())
        }
        PreferenceOutcome::CappedByExitEv => {
            warnings.push("Exit EV below the liquidation preference".into())
        }
        PreferenceOutcome::ProRata => {}
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Series C exit with 1x preference, tracking certificate vs VC fund net returns",
        &serde_json::json!({
            "pool_timing": input.pool_timing,
            "ipo_multiple": input.ipo_multiple.to_string(),
            "fund_life_years": output.fund_life_years,
        }),
        warnings,
        elapsed,
        output,
    ))
}

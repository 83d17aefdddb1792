use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::time::Instant;

use crate::error::CasebookError;
use crate::types::*;
use crate::CasebookResult;

const SPONSOR_ROW_ID: &str = "sponsor-equity";
const SPONSOR_ROW_NAME: &str = "Sponsor equity";

/// One pre-deal shareholder. Either an explicit equity value or an ownership
/// percentage (converted with the deal equity value) identifies the stake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareholderStake {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equity_value: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ownership_percent: Option<Percent>,
    #[serde(default)]
    pub is_management: bool,
    /// Sells out entirely (e.g. the outgoing sponsor)
    #[serde(default)]
    pub exits_fully: bool,
    /// Fixed post-deal percentage, e.g. an employee pool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_post_deal_percent: Option<Percent>,
}

impl ShareholderStake {
    pub fn stake_id(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.name)
    }

    fn with_percent(id: &str, name: &str, percent: Decimal, is_management: bool) -> Self {
        ShareholderStake {
            id: Some(id.into()),
            name: name.into(),
            equity_value: None,
            ownership_percent: Some(percent),
            is_management,
            exits_fully: false,
            locked_post_deal_percent: None,
        }
    }
}

/// Cap table before the 2004 secondary buyout. The percentages sum to 105;
/// they are read against a declared total of 100.
pub fn reference_cap_table() -> Vec<ShareholderStake> {
    let mut outgoing = ShareholderStake::with_percent("3i", "3i Group", dec!(36.5), false);
    outgoing.exits_fully = true;
    let mut pool = ShareholderStake::with_percent(
        "employee-pool",
        "Employee Pool (authorised not issued)",
        dec!(5),
        true,
    );
    pool.locked_post_deal_percent = Some(dec!(5));
    vec![
        outgoing,
        ShareholderStake::with_percent("g-quiligotti", "Gerard Quiligotti", dec!(37.465), true),
        ShareholderStake::with_percent("astle", "Astle Holdings (Fawcett)", dec!(12.7), true),
        ShareholderStake::with_percent("g-clark", "Graham Clark", dec!(4.445), true),
        ShareholderStake::with_percent("m-raftery", "Martin Raftery", dec!(4.445), true),
        ShareholderStake::with_percent("d-howarth", "David Howarth", dec!(4.445), true),
        pool,
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareholderRow {
    pub id: String,
    pub name: String,
    pub equity_value: Option<Money>,
    pub ownership_percent: Option<Percent>,
    pub is_management: bool,
    pub exits_fully: bool,
    pub is_sponsor: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquityStructureInput {
    /// Share of the continuing shareholders' value that is rolled (0-100)
    pub management_rollover_percent: Percent,
    /// New equity required by the deal; absent before the deal is sized
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equity_plug: Option<Money>,
    /// Pre-deal equity value, used to value stakes given only as percentages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equity_value: Option<Money>,
    pub pre_deal_shareholders: Vec<ShareholderStake>,
    /// Declared percentage total; defaults to the sum of the stakes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ownership_percent_total: Option<Percent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquityStructureResult {
    pub management_rollover_percent: Percent,
    pub management_rollover_amount: Option<Money>,
    pub sponsor_equity_amount: Option<Money>,
    pub management_post_deal_ownership_percent: Option<Percent>,
    pub sponsor_post_deal_ownership_percent: Option<Percent>,
    pub pre_deal_structure: Vec<ShareholderRow>,
    pub post_deal_structure: Vec<ShareholderRow>,
    pub total_pre_deal_equity_value: Money,
    pub total_rolled_equity_amount: Option<Money>,
}

fn by_ownership_desc(a: &ShareholderRow, b: &ShareholderRow) -> Ordering {
    let key = |row: &ShareholderRow| row.ownership_percent.unwrap_or(Decimal::ZERO);
    key(b).cmp(&key(a))
}

/// `part / whole` as a percentage, `None` when there is nothing to divide by.
fn share_of(part: Option<Money>, whole: Option<Money>) -> Option<Percent> {
    match (part, whole) {
        (Some(part), Some(whole)) if whole > Decimal::ZERO => {
            Some(part * Decimal::ONE_HUNDRED / whole)
        }
        _ => None,
    }
}

/// Split the new equity between locked stakes, rolling shareholders and the
/// sponsor.
///
/// Allocation order is fixed: locked percentages are carved out of the plug
/// first, then continuing (non-exiting, non-locked) shareholders roll
/// `rollover%` of their pre-deal value, pro rata to that value and capped by
/// what is left of the plug. The sponsor funds the residual.
pub fn calculate_equity_structure(input: &EquityStructureInput) -> EquityStructureResult {
    let rollover_percent = input
        .management_rollover_percent
        .clamp(Decimal::ZERO, Decimal::ONE_HUNDRED);
    let stakes = &input.pre_deal_shareholders;

    // --- Pre-deal values ---
    let percent_sum: Decimal = stakes
        .iter()
        .map(|s| s.ownership_percent.unwrap_or(Decimal::ZERO))
        .sum();
    let denominator = match input.ownership_percent_total {
        Some(total) if total > Decimal::ZERO => total,
        _ => percent_sum,
    };

    let derived: Vec<Money> = stakes
        .iter()
        .map(|s| match (s.equity_value, input.equity_value, s.ownership_percent) {
            (Some(value), _, _) => value,
            (None, Some(deal_value), Some(pct)) if denominator > Decimal::ZERO => {
                pct * deal_value / denominator
            }
            _ => Decimal::ZERO,
        })
        .collect();

    let mut total_pre_deal_equity_value: Money = derived.iter().copied().sum();
    if total_pre_deal_equity_value.is_zero() {
        if let Some(deal_value) = input.equity_value {
            total_pre_deal_equity_value = deal_value;
        }
    }

    let mut pre_deal_structure: Vec<ShareholderRow> = stakes
        .iter()
        .zip(&derived)
        .map(|(s, value)| ShareholderRow {
            id: s.stake_id().to_string(),
            name: s.name.clone(),
            equity_value: Some(*value),
            ownership_percent: s
                .ownership_percent
                .or_else(|| share_of(Some(*value), Some(total_pre_deal_equity_value))),
            is_management: s.is_management,
            exits_fully: s.exits_fully,
            is_sponsor: false,
        })
        .collect();
    pre_deal_structure.sort_by(by_ownership_desc);

    // --- Plug allocation ---
    let plug = input.equity_plug.map(|p| p.max(Decimal::ZERO));

    let locked_percent_total: Decimal = stakes
        .iter()
        .filter_map(|s| s.locked_post_deal_percent)
        .sum();
    let locked_amount = plug.map(|p| (locked_percent_total * p / Decimal::ONE_HUNDRED).min(p));

    let rollover_pool: Vec<(&ShareholderStake, Money)> = stakes
        .iter()
        .zip(derived.iter().copied())
        .filter(|(s, _)| !s.exits_fully && s.locked_post_deal_percent.is_none())
        .collect();
    let pool_value: Money = rollover_pool.iter().map(|(_, v)| *v).sum();
    let rollover_base = rollover_percent * pool_value / Decimal::ONE_HUNDRED;

    let available = plug.map(|p| (p - locked_amount.unwrap_or(Decimal::ZERO)).max(Decimal::ZERO));
    let rollover_amount = available.map(|a| rollover_base.min(pool_value).min(a));
    let sponsor_amount = plug.map(|p| {
        (p - rollover_amount.unwrap_or(Decimal::ZERO) - locked_amount.unwrap_or(Decimal::ZERO))
            .max(Decimal::ZERO)
    });

    let rollover_share = |value: Money| -> Option<Money> {
        let amount = rollover_amount?;
        if pool_value > Decimal::ZERO {
            Some(value * amount / pool_value)
        } else {
            Some(amount / Decimal::from(rollover_pool.len().max(1)))
        }
    };

    // --- Post-deal rows ---
    let mut post_deal_structure: Vec<ShareholderRow> = stakes
        .iter()
        .zip(derived.iter().copied())
        .filter(|(s, _)| !s.exits_fully)
        .map(|(s, value)| {
            let contribution = match (s.locked_post_deal_percent, plug) {
                (Some(locked), Some(p)) => Some(locked * p / Decimal::ONE_HUNDRED),
                (Some(_), None) => None,
                (None, _) => match plug {
                    Some(_) => rollover_share(value),
                    None => None,
                },
            };
            let ownership_percent = s
                .locked_post_deal_percent
                .or_else(|| share_of(contribution, plug));
            ShareholderRow {
                id: s.stake_id().to_string(),
                name: s.name.clone(),
                equity_value: contribution,
                ownership_percent,
                is_management: s.is_management,
                exits_fully: false,
                is_sponsor: false,
            }
        })
        .collect();

    post_deal_structure.push(ShareholderRow {
        id: SPONSOR_ROW_ID.into(),
        name: SPONSOR_ROW_NAME.into(),
        equity_value: sponsor_amount,
        ownership_percent: share_of(sponsor_amount, plug),
        is_management: false,
        exits_fully: false,
        is_sponsor: true,
    });
    post_deal_structure.sort_by(by_ownership_desc);

    let total_rolled = plug.map(|p| p - sponsor_amount.unwrap_or(Decimal::ZERO));
    let management_pct = share_of(total_rolled, plug);
    let sponsor_pct = share_of(sponsor_amount, plug)
        .or_else(|| management_pct.map(|m| (Decimal::ONE_HUNDRED - m).max(Decimal::ZERO)));

    EquityStructureResult {
        management_rollover_percent: rollover_percent,
        management_rollover_amount: rollover_amount,
        sponsor_equity_amount: sponsor_amount,
        management_post_deal_ownership_percent: management_pct,
        sponsor_post_deal_ownership_percent: sponsor_pct,
        pre_deal_structure,
        post_deal_structure,
        total_pre_deal_equity_value,
        total_rolled_equity_amount: total_rolled,
    }
}

pub fn analyze_equity_structure(
    input: &EquityStructureInput,
) -> CasebookResult<ComputationOutput<EquityStructureResult>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if input.pre_deal_shareholders.is_empty() {
        return Err(CasebookError::InsufficientData(
            "At least one pre-deal shareholder is required".into(),
        ));
    }
    if let Some(plug) = input.equity_plug {
        if plug < Decimal::ZERO {
            return Err(CasebookError::InvalidInput {
                field: "equity_plug".into(),
                reason: "Equity plug cannot be negative".into(),
            });
        }
    }
    if input.management_rollover_percent < Decimal::ZERO
        || input.management_rollover_percent > Decimal::ONE_HUNDRED
    {
        warnings.push(format!(
            "Rollover {}% clamped to the 0-100 range",
            input.management_rollover_percent
        ));
    }
    let locked: Decimal = input
        .pre_deal_shareholders
        .iter()
        .filter_map(|s| s.locked_post_deal_percent)
        .sum();
    if locked > Decimal::ONE_HUNDRED {
        warnings.push("Locked post-deal percentages exceed 100%".into());
    }
    if input.equity_plug.is_none() {
        warnings.push("No equity plug supplied: post-deal amounts are undefined".into());
    }

    let output = calculate_equity_structure(input);

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Equity plug split: locked stakes, pro-rata management rollover, sponsor residual",
        &serde_json::json!({
            "management_rollover_percent": output.management_rollover_percent.to_string(),
            "shareholders": input.pre_deal_shareholders.len(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn stake(id: &str, pct: Decimal) -> ShareholderStake {
        ShareholderStake::with_percent(id, id, pct, true)
    }

    fn simple_input(plug: Option<Money>) -> EquityStructureInput {
        let mut seller = stake("seller", dec!(40));
        seller.exits_fully = true;
        seller.is_management = false;
        let mut pool = stake("pool", dec!(5));
        pool.locked_post_deal_percent = Some(dec!(5));
        EquityStructureInput {
            management_rollover_percent: dec!(20),
            equity_plug: plug,
            equity_value: Some(dec!(100)),
            pre_deal_shareholders: vec![seller, stake("ceo", dec!(40)), stake("cfo", dec!(15)), pool],
            ownership_percent_total: Some(dec!(100)),
        }
    }

    fn row<'a>(rows: &'a [ShareholderRow], id: &str) -> &'a ShareholderRow {
        rows.iter().find(|r| r.id == id).unwrap()
    }

    #[test]
    fn test_plug_allocation_order() {
        let r = calculate_equity_structure(&simple_input(Some(dec!(50))));
        assert_eq!(r.total_pre_deal_equity_value, dec!(100));
        // Locked 5% of 50, rollover 20% of (40 + 15)
        assert_eq!(r.management_rollover_amount, Some(dec!(11)));
        assert_eq!(r.sponsor_equity_amount, Some(dec!(36.5)));
        assert_eq!(r.total_rolled_equity_amount, Some(dec!(13.5)));
        assert_eq!(r.management_post_deal_ownership_percent, Some(dec!(27)));
        assert_eq!(r.sponsor_post_deal_ownership_percent, Some(dec!(73)));
    }

    #[test]
    fn test_rollover_is_pro_rata() {
        let r = calculate_equity_structure(&simple_input(Some(dec!(50))));
        let ceo = row(&r.post_deal_structure, "ceo");
        let cfo = row(&r.post_deal_structure, "cfo");
        assert_eq!(ceo.equity_value, Some(dec!(8)));
        assert_eq!(ceo.ownership_percent, Some(dec!(16)));
        assert_eq!(cfo.equity_value, Some(dec!(3)));
        assert_eq!(row(&r.post_deal_structure, "pool").ownership_percent, Some(dec!(5)));
    }

    #[test]
    fn test_exiting_shareholder_dropped_and_rows_sorted() {
        let r = calculate_equity_structure(&simple_input(Some(dec!(50))));
        let ids: Vec<&str> = r.post_deal_structure.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["sponsor-equity", "ceo", "cfo", "pool"]);
        let pre_ids: Vec<&str> = r.pre_deal_structure.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(pre_ids, vec!["seller", "ceo", "cfo", "pool"]);
    }

    #[test]
    fn test_post_deal_ownership_sums_to_100() {
        let r = calculate_equity_structure(&simple_input(Some(dec!(50))));
        let total: Decimal = r
            .post_deal_structure
            .iter()
            .filter_map(|r| r.ownership_percent)
            .sum();
        assert_eq!(total, dec!(100));
    }

    #[test]
    fn test_rollover_capped_by_remaining_plug() {
        let r = calculate_equity_structure(&simple_input(Some(dec!(10))));
        // Locked 0.5, available 9.5 < rollover base 11
        assert_eq!(r.management_rollover_amount, Some(dec!(9.5)));
        assert_eq!(r.sponsor_equity_amount, Some(Decimal::ZERO));
    }

    #[test]
    fn test_without_plug_post_deal_is_undefined() {
        let r = calculate_equity_structure(&simple_input(None));
        assert_eq!(r.management_rollover_amount, None);
        assert_eq!(r.sponsor_equity_amount, None);
        assert_eq!(r.management_post_deal_ownership_percent, None);
        assert_eq!(row(&r.post_deal_structure, "ceo").equity_value, None);
        assert_eq!(row(&r.post_deal_structure, "pool").ownership_percent, Some(dec!(5)));
    }

    #[test]
    fn test_rollover_percent_clamped() {
        let mut input = simple_input(Some(dec!(50)));
        input.management_rollover_percent = dec!(250);
        let r = calculate_equity_structure(&input);
        assert_eq!(r.management_rollover_percent, dec!(100));
        assert_eq!(r.management_rollover_amount, Some(dec!(47.5)));
    }

    #[test]
    fn test_explicit_equity_values_take_precedence() {
        let mut input = simple_input(Some(dec!(50)));
        input.pre_deal_shareholders[1].equity_value = Some(dec!(20));
        input.pre_deal_shareholders[1].ownership_percent = None;
        let r = calculate_equity_structure(&input);
        assert_eq!(r.total_pre_deal_equity_value, dec!(80));
        assert_eq!(row(&r.pre_deal_structure, "ceo").ownership_percent, Some(dec!(25)));
    }

    #[test]
    fn test_reference_cap_table() {
        let input = EquityStructureInput {
            management_rollover_percent: dec!(50),
            equity_plug: Some(dec!(30)),
            equity_value: Some(dec!(60)),
            pre_deal_shareholders: reference_cap_table(),
            ownership_percent_total: Some(dec!(100)),
        };
        let r = calculate_equity_structure(&input);
        assert_eq!(r.total_pre_deal_equity_value, dec!(63));
        assert!(r.post_deal_structure.iter().all(|row| row.id != "3i"));
        assert_eq!(r.post_deal_structure.len(), 7);
        let sponsor = row(&r.post_deal_structure, "sponsor-equity");
        assert!(sponsor.is_sponsor);
    }

    #[test]
    fn test_analyze_requires_shareholders() {
        let input = EquityStructureInput {
            management_rollover_percent: dec!(20),
            equity_plug: Some(dec!(10)),
            equity_value: None,
            pre_deal_shareholders: vec![],
            ownership_percent_total: None,
        };
        assert!(analyze_equity_structure(&input).is_err());
    }
}

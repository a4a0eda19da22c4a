use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::money::{round2, ExchangeRate};

/// An output amount in both currencies. Unlike [`super::MoneyValue`] there is
/// no primary side: CNY is always derived from USD.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Money {
    pub usd: Decimal,
    pub cny: Decimal,
}

impl Money {
    /// `None` when the CNY side does not fit in a `Decimal`.
    pub fn from_usd(usd: Decimal, rate: ExchangeRate) -> Option<Self> {
        let usd = round2(usd);
        let cny = usd.checked_mul(rate.value())?;
        Some(Self {
            usd,
            cny: round2(cny),
        })
    }
}

/// What the pricing engine computed for one document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CalculationResult {
    pub summary: Summary,
    pub cost_breakdown: CostBreakdown,
    pub intermediate_values: IntermediateValues,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_revenue: Money,
    pub total_cost: Money,
    pub gross_profit: Money,
    pub gross_profit_margin: Decimal,
    pub net_profit: Money,
    pub net_profit_margin: Decimal,
    pub profit_per_unit: Money,
    pub roi: Decimal,
    pub break_even_days: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CostBreakdown {
    pub purchase_cost: Money,
    pub shipping_cost: Money,
    pub advertising_cost: Money,
    pub referral_fee: Money,
    pub fba_fee: Money,
    pub storage_fee: Money,
    pub return_processing_fee: Money,
    pub unsellable_disposal_fee: Money,
    pub return_loss: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IntermediateValues {
    pub total_sales_quantity: Decimal,
    pub storage_coefficient: Decimal,
    pub actual_storage_fee_per_unit: Money,
    pub return_quantity: Decimal,
    pub resellable_quantity: Decimal,
    pub unsellable_quantity: Decimal,
    pub return_processing_fee_per_unit: Money,
}

impl CalculationResult {
    /// CSV rows of the headline figures, as offered by project export.
    pub fn summary_csv(&self) -> String {
        let s = &self.summary;
        let rows = [
            ("totalRevenue", s.total_revenue),
            ("totalCost", s.total_cost),
            ("grossProfit", s.gross_profit),
            ("netProfit", s.net_profit),
        ];
        let mut out = String::from("metric,value_usd,value_cny\n");
        for (metric, money) in rows {
            out.push_str(&format!("{metric},{},{}\n", money.usd, money.cny));
        }
        out
    }
}

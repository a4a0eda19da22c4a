//! The pricing engine: profit estimate for one [`CalculatorDocument`].
//!
//! Pure function of its input. All arithmetic runs in USD on unrounded
//! decimals; rounding happens only when outputs are produced.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use crate::error::{Error, Result};
use crate::models::*;

const HUNDRED: Decimal = dec!(100);
/// Return processing is charged at 20% of the referral fee, capped per unit.
const RETURN_PROCESSING_SHARE: Decimal = dec!(0.20);
const RETURN_PROCESSING_CAP: Decimal = dec!(5.0);
const DAYS_PER_MONTH: Decimal = dec!(30);

fn q2(value: Decimal) -> Decimal {
    round2(value)
}

fn q4(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero)
}

fn overflow() -> Error {
    Error::validation("amounts are too large to price")
}

fn mul(a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_mul(b).ok_or_else(overflow)
}

fn div(a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_div(b).ok_or_else(overflow)
}

fn sub(a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_sub(b).ok_or_else(overflow)
}

fn sum(terms: &[Decimal]) -> Result<Decimal> {
    terms
        .iter()
        .try_fold(Decimal::ZERO, |acc, term| acc.checked_add(*term))
        .ok_or_else(overflow)
}

/// `numerator / denominator`, or zero when there is nothing to divide by.
fn ratio(numerator: Decimal, denominator: Decimal) -> Result<Decimal> {
    if denominator > Decimal::ZERO {
        div(numerator, denominator)
    } else {
        Ok(Decimal::ZERO)
    }
}

/// Estimate profit for `doc`.
///
/// Fails with [`Error::Validation`] when the document is out of range or its
/// figures overflow the decimal range.
pub fn calculate(doc: &CalculatorDocument) -> Result<CalculationResult> {
    doc.validate()?;

    let rate = doc.exchange_rate();
    let money = |usd: Decimal| Money::from_usd(usd, rate).ok_or_else(overflow);
    let usd = |value: &MoneyValue| value.usd_basis(rate).ok_or_else(overflow);
    let pre = &doc.pre_purchase;
    let sale = &doc.during_sale;
    let after = &doc.after_sale;

    let unit_cost = usd(&pre.unit_cost)?;
    let quantity = Decimal::from(pre.quantity);
    let shipping_per_unit = usd(&pre.shipping_per_unit)?;

    let selling_price = usd(&sale.selling_price)?;
    let sales_days = Decimal::from(sale.sales_days);
    let referral_fee_rate = sale.referral_fee_rate / HUNDRED;
    let fba_fee_per_unit = usd(&sale.fba_fee_per_unit)?;
    let monthly_storage_fee = usd(&sale.monthly_storage_fee)?;

    let return_rate = after.return_rate / HUNDRED;
    let resellable_rate = after.resellable_rate / HUNDRED;

    // Before the sale
    let purchase_cost = mul(unit_cost, quantity)?;
    let shipping_cost = mul(shipping_per_unit, quantity)?;
    let total_pre_cost = sum(&[purchase_cost, shipping_cost])?;

    // During the sale
    let planned_sales = mul(Decimal::from(sale.daily_sales), sales_days)?;
    let sold = quantity.min(planned_sales);
    let total_revenue = mul(selling_price, sold)?;

    let advertising_cost = match sale.advertising_mode {
        AdvertisingMode::Budget => {
            let budget = match &sale.daily_ad_budget {
                Some(budget) => usd(budget)?,
                None => Decimal::ZERO,
            };
            mul(budget, sales_days)?
        }
        AdvertisingMode::Percentage => {
            let share = sale.ad_percentage.unwrap_or_default() / HUNDRED;
            mul(total_revenue, share)?
        }
    };

    let referral_fee_per_unit = mul(selling_price, referral_fee_rate)?;
    let total_referral_fee = mul(referral_fee_per_unit, sold)?;
    let total_fba_fee = mul(fba_fee_per_unit, sold)?;

    // Stock sits in the warehouse for half the sales period on average.
    let storage_coefficient = if sales_days > Decimal::ZERO {
        sales_days / dec!(2) / DAYS_PER_MONTH
    } else {
        Decimal::ZERO
    };
    let storage_fee_per_unit = mul(monthly_storage_fee, storage_coefficient)?;
    let total_storage_fee = mul(storage_fee_per_unit, sold)?;

    let gross_cost = sum(&[
        total_pre_cost,
        advertising_cost,
        total_referral_fee,
        total_fba_fee,
        total_storage_fee,
    ])?;
    let gross_profit = sub(total_revenue, gross_cost)?;
    let gross_profit_margin = mul(ratio(gross_profit, total_revenue)?, HUNDRED)?;

    // After the sale
    let return_quantity = mul(sold, return_rate)?;
    let return_fee_per_unit =
        mul(referral_fee_per_unit, RETURN_PROCESSING_SHARE)?.min(RETURN_PROCESSING_CAP);
    let total_return_fee = mul(return_fee_per_unit, return_quantity)?;

    let resellable_quantity = mul(return_quantity, resellable_rate)?;
    let unsellable_quantity = mul(return_quantity, Decimal::ONE - resellable_rate)?;
    let disposal_fee = mul(fba_fee_per_unit, unsellable_quantity)?;
    let return_loss = mul(sum(&[unit_cost, shipping_per_unit])?, unsellable_quantity)?;

    let refunded_referral_fee = mul(referral_fee_per_unit, return_quantity)?;
    let referral_fee = sub(total_referral_fee, refunded_referral_fee)?;

    let total_cost = sum(&[
        total_pre_cost,
        advertising_cost,
        referral_fee,
        total_fba_fee,
        total_storage_fee,
        total_return_fee,
        disposal_fee,
        return_loss,
    ])?;

    let net_profit = sub(total_revenue, total_cost)?;
    let net_profit_margin = mul(ratio(net_profit, total_revenue)?, HUNDRED)?;
    let profit_per_unit = ratio(net_profit, sold)?;

    let total_investment = sum(&[purchase_cost, shipping_cost, advertising_cost])?;
    let roi = mul(ratio(net_profit, total_investment)?, HUNDRED)?;

    let break_even_days = if sales_days > Decimal::ZERO {
        let daily_profit = div(net_profit, sales_days)?;
        if daily_profit > Decimal::ZERO {
            Some(q2(div(total_investment, daily_profit)?))
        } else {
            None
        }
    } else {
        None
    };

    Ok(CalculationResult {
        summary: Summary {
            total_revenue: money(total_revenue)?,
            total_cost: money(total_cost)?,
            gross_profit: money(gross_profit)?,
            gross_profit_margin: q2(gross_profit_margin),
            net_profit: money(net_profit)?,
            net_profit_margin: q2(net_profit_margin),
            profit_per_unit: money(profit_per_unit)?,
            roi: q2(roi),
            break_even_days,
        },
        cost_breakdown: CostBreakdown {
            purchase_cost: money(purchase_cost)?,
            shipping_cost: money(shipping_cost)?,
            advertising_cost: money(advertising_cost)?,
            referral_fee: money(referral_fee)?,
            fba_fee: money(total_fba_fee)?,
            storage_fee: money(total_storage_fee)?,
            return_processing_fee: money(total_return_fee)?,
            unsellable_disposal_fee: money(disposal_fee)?,
            return_loss: money(return_loss)?,
        },
        intermediate_values: IntermediateValues {
            total_sales_quantity: q2(sold),
            storage_coefficient: q4(storage_coefficient),
            actual_storage_fee_per_unit: money(storage_fee_per_unit)?,
            return_quantity: q2(return_quantity),
            resellable_quantity: q2(resellable_quantity),
            unsellable_quantity: q2(unsellable_quantity),
            return_processing_fee_per_unit: money(return_fee_per_unit)?,
        },
    })
}

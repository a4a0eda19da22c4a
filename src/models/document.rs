use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::money::{Currency, ExchangeRate, MoneyValue};
use crate::error::{Error, Result};

/// The editable estimate: every input the pricing engine reads.
///
/// The shape is fixed. Optional fields (`daily_ad_budget`, `ad_percentage`)
/// exist in every document but may be unset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CalculatorDocument {
    pub pre_purchase: PrePurchase,
    pub during_sale: DuringSale,
    pub after_sale: AfterSale,
    pub settings: Settings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PrePurchase {
    pub unit_cost: MoneyValue,
    pub quantity: u32,
    pub shipping_per_unit: MoneyValue,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DuringSale {
    pub selling_price: MoneyValue,
    pub daily_sales: u32,
    pub sales_days: u32,
    pub advertising_mode: AdvertisingMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_ad_budget: Option<MoneyValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ad_percentage: Option<Decimal>,
    #[serde(default = "default_referral_fee_rate")]
    pub referral_fee_rate: Decimal,
    pub fba_fee_per_unit: MoneyValue,
    pub monthly_storage_fee: MoneyValue,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AfterSale {
    #[serde(default = "default_return_rate")]
    pub return_rate: Decimal,
    #[serde(default = "default_resellable_rate")]
    pub resellable_rate: Decimal,
}

/// Shared session settings; also the payload of the settings store.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub exchange_rate: ExchangeRate,
}

/// How advertising spend is estimated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AdvertisingMode {
    /// A fixed daily budget over the sales period.
    Budget,
    /// A share of revenue.
    Percentage,
}

impl AdvertisingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Budget => "budget",
            Self::Percentage => "percentage",
        }
    }
}

pub const DEFAULT_AD_PERCENTAGE: Decimal = dec!(10);

fn default_referral_fee_rate() -> Decimal {
    dec!(15)
}

fn default_return_rate() -> Decimal {
    dec!(5)
}

fn default_resellable_rate() -> Decimal {
    dec!(80)
}

impl Default for CalculatorDocument {
    fn default() -> Self {
        Self {
            pre_purchase: PrePurchase {
                unit_cost: MoneyValue::zero(Currency::Usd),
                quantity: 0,
                shipping_per_unit: MoneyValue::zero(Currency::Usd),
            },
            during_sale: DuringSale {
                selling_price: MoneyValue::zero(Currency::Usd),
                daily_sales: 0,
                sales_days: 0,
                advertising_mode: AdvertisingMode::Percentage,
                daily_ad_budget: Some(MoneyValue::zero(Currency::Usd)),
                ad_percentage: Some(DEFAULT_AD_PERCENTAGE),
                referral_fee_rate: default_referral_fee_rate(),
                fba_fee_per_unit: MoneyValue::zero(Currency::Usd),
                monthly_storage_fee: MoneyValue::zero(Currency::Usd),
            },
            after_sale: AfterSale {
                return_rate: default_return_rate(),
                resellable_rate: default_resellable_rate(),
            },
            settings: Settings::default(),
        }
    }
}

impl CalculatorDocument {
    pub fn exchange_rate(&self) -> ExchangeRate {
        self.settings.exchange_rate
    }

    /// Copy of this document with every money field re-derived from its
    /// primary side at the document's own exchange rate.
    ///
    /// An unset `daily_ad_budget` stays unset.
    pub fn resynced(&self) -> Self {
        let rate = self.exchange_rate();
        let mut next = self.clone();
        for value in next.money_values_mut() {
            *value = value.synced(rate);
        }
        next
    }

    /// Copy of this document under a new exchange rate, fully resynced.
    pub fn with_exchange_rate(&self, rate: ExchangeRate) -> Self {
        let mut next = self.clone();
        next.settings.exchange_rate = rate;
        next.resynced()
    }

    /// Copy with the advertising mode switched, filling in whatever the new
    /// mode needs if it is missing.
    pub fn with_advertising_mode(&self, mode: AdvertisingMode) -> Self {
        let rate = self.exchange_rate();
        let mut next = self.clone();
        let sale = &mut next.during_sale;
        sale.advertising_mode = mode;
        match mode {
            AdvertisingMode::Budget if sale.daily_ad_budget.is_none() => {
                sale.daily_ad_budget = Some(MoneyValue::zero(Currency::Usd).synced(rate));
            }
            AdvertisingMode::Percentage if sale.ad_percentage.is_none() => {
                sale.ad_percentage = Some(DEFAULT_AD_PERCENTAGE);
            }
            _ => {}
        }
        next
    }

    pub fn money_values(&self) -> impl Iterator<Item = &MoneyValue> {
        [
            Some(&self.pre_purchase.unit_cost),
            Some(&self.pre_purchase.shipping_per_unit),
            Some(&self.during_sale.selling_price),
            self.during_sale.daily_ad_budget.as_ref(),
            Some(&self.during_sale.fba_fee_per_unit),
            Some(&self.during_sale.monthly_storage_fee),
        ]
        .into_iter()
        .flatten()
    }

    fn money_values_mut(&mut self) -> impl Iterator<Item = &mut MoneyValue> {
        [
            Some(&mut self.pre_purchase.unit_cost),
            Some(&mut self.pre_purchase.shipping_per_unit),
            Some(&mut self.during_sale.selling_price),
            self.during_sale.daily_ad_budget.as_mut(),
            Some(&mut self.during_sale.fba_fee_per_unit),
            Some(&mut self.during_sale.monthly_storage_fee),
        ]
        .into_iter()
        .flatten()
    }

    /// Whether every money field satisfies the sync invariant.
    pub fn is_synced(&self) -> bool {
        let rate = self.exchange_rate();
        self.money_values().all(|value| value.is_synced(rate))
    }

    /// Check the document against the ranges the pricing engine accepts.
    pub fn validate(&self) -> Result<()> {
        let money = [
            ("prePurchase.unitCost", Some(&self.pre_purchase.unit_cost)),
            ("prePurchase.shippingPerUnit", Some(&self.pre_purchase.shipping_per_unit)),
            ("duringSale.sellingPrice", Some(&self.during_sale.selling_price)),
            ("duringSale.dailyAdBudget", self.during_sale.daily_ad_budget.as_ref()),
            ("duringSale.fbaFeePerUnit", Some(&self.during_sale.fba_fee_per_unit)),
            ("duringSale.monthlyStorageFee", Some(&self.during_sale.monthly_storage_fee)),
        ];
        for (path, value) in money {
            if let Some(value) = value {
                if value.usd < Decimal::ZERO || value.cny < Decimal::ZERO {
                    return Err(Error::validation(format!("{path} must not be negative")));
                }
            }
        }

        let mut rates = vec![
            ("duringSale.referralFeeRate", self.during_sale.referral_fee_rate),
            ("afterSale.returnRate", self.after_sale.return_rate),
            ("afterSale.resellableRate", self.after_sale.resellable_rate),
        ];
        if let Some(pct) = self.during_sale.ad_percentage {
            rates.push(("duringSale.adPercentage", pct));
        }
        for (path, rate) in rates {
            if rate < Decimal::ZERO || rate > dec!(100) {
                return Err(Error::validation(format!("{path} must be between 0 and 100")));
            }
        }

        match self.during_sale.advertising_mode {
            AdvertisingMode::Budget if self.during_sale.daily_ad_budget.is_none() => Err(
                Error::validation("dailyAdBudget is required when advertisingMode=budget"),
            ),
            AdvertisingMode::Percentage if self.during_sale.ad_percentage.is_none() => Err(
                Error::validation("adPercentage is required when advertisingMode=percentage"),
            ),
            _ => Ok(()),
        }
    }
}

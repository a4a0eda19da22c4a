//! Typed single-field edits on a [`CalculatorDocument`].
//!
//! Every editable field has one [`FieldUpdate`] variant carrying a value of
//! the field's own type, so an edit can never name a field the document does
//! not have. [`FieldUpdate::from_path`] is the only way in from untyped input
//! (dotted camelCase paths from the wire or the CLI) and rejects unknown
//! paths and ill-typed values with [`Error::Validation`].

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::document::{AdvertisingMode, CalculatorDocument};
use super::money::MoneyValue;
use crate::error::{Error, Result};

/// The money-valued fields of a document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MoneyField {
    UnitCost,
    ShippingPerUnit,
    SellingPrice,
    DailyAdBudget,
    FbaFeePerUnit,
    MonthlyStorageFee,
}

impl MoneyField {
    pub const ALL: [MoneyField; 6] = [
        Self::UnitCost,
        Self::ShippingPerUnit,
        Self::SellingPrice,
        Self::DailyAdBudget,
        Self::FbaFeePerUnit,
        Self::MonthlyStorageFee,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            Self::UnitCost => "prePurchase.unitCost",
            Self::ShippingPerUnit => "prePurchase.shippingPerUnit",
            Self::SellingPrice => "duringSale.sellingPrice",
            Self::DailyAdBudget => "duringSale.dailyAdBudget",
            Self::FbaFeePerUnit => "duringSale.fbaFeePerUnit",
            Self::MonthlyStorageFee => "duringSale.monthlyStorageFee",
        }
    }

    /// Current value of this field, `None` only for an unset ad budget.
    pub fn get(&self, doc: &CalculatorDocument) -> Option<MoneyValue> {
        match self {
            Self::UnitCost => Some(doc.pre_purchase.unit_cost),
            Self::ShippingPerUnit => Some(doc.pre_purchase.shipping_per_unit),
            Self::SellingPrice => Some(doc.during_sale.selling_price),
            Self::DailyAdBudget => doc.during_sale.daily_ad_budget,
            Self::FbaFeePerUnit => Some(doc.during_sale.fba_fee_per_unit),
            Self::MonthlyStorageFee => Some(doc.during_sale.monthly_storage_fee),
        }
    }

    fn set(&self, doc: &mut CalculatorDocument, value: MoneyValue) {
        match self {
            Self::UnitCost => doc.pre_purchase.unit_cost = value,
            Self::ShippingPerUnit => doc.pre_purchase.shipping_per_unit = value,
            Self::SellingPrice => doc.during_sale.selling_price = value,
            Self::DailyAdBudget => doc.during_sale.daily_ad_budget = Some(value),
            Self::FbaFeePerUnit => doc.during_sale.fba_fee_per_unit = value,
            Self::MonthlyStorageFee => doc.during_sale.monthly_storage_fee = value,
        }
    }
}

impl fmt::Display for MoneyField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

impl FromStr for MoneyField {
    type Err = Error;

    fn from_str(path: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|field| field.path() == path)
            .ok_or_else(|| Error::validation(format!("{path} is not a money field")))
    }
}

/// One edit to one field of the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldUpdate {
    Money(MoneyField, MoneyValue),
    Quantity(u32),
    DailySales(u32),
    SalesDays(u32),
    AdvertisingMode(AdvertisingMode),
    AdPercentage(Option<Decimal>),
    ReferralFeeRate(Decimal),
    ReturnRate(Decimal),
    ResellableRate(Decimal),
}

const SCALAR_PATHS: [&str; 8] = [
    "prePurchase.quantity",
    "duringSale.dailySales",
    "duringSale.salesDays",
    "duringSale.advertisingMode",
    "duringSale.adPercentage",
    "duringSale.referralFeeRate",
    "afterSale.returnRate",
    "afterSale.resellableRate",
];

impl FieldUpdate {
    /// The dotted path of the field this update targets.
    pub fn path(&self) -> &'static str {
        match self {
            Self::Money(field, _) => field.path(),
            Self::Quantity(_) => SCALAR_PATHS[0],
            Self::DailySales(_) => SCALAR_PATHS[1],
            Self::SalesDays(_) => SCALAR_PATHS[2],
            Self::AdvertisingMode(_) => SCALAR_PATHS[3],
            Self::AdPercentage(_) => SCALAR_PATHS[4],
            Self::ReferralFeeRate(_) => SCALAR_PATHS[5],
            Self::ReturnRate(_) => SCALAR_PATHS[6],
            Self::ResellableRate(_) => SCALAR_PATHS[7],
        }
    }

    /// Build an update from a dotted path and an untyped value.
    pub fn from_path(path: &str, value: serde_json::Value) -> Result<Self> {
        if let Ok(field) = path.parse::<MoneyField>() {
            return Ok(Self::Money(field, typed(path, value)?));
        }
        let update = match path {
            "prePurchase.quantity" => Self::Quantity(typed(path, value)?),
            "duringSale.dailySales" => Self::DailySales(typed(path, value)?),
            "duringSale.salesDays" => Self::SalesDays(typed(path, value)?),
            "duringSale.advertisingMode" => Self::AdvertisingMode(typed(path, value)?),
            "duringSale.adPercentage" => Self::AdPercentage(typed(path, value)?),
            "duringSale.referralFeeRate" => Self::ReferralFeeRate(typed(path, value)?),
            "afterSale.returnRate" => Self::ReturnRate(typed(path, value)?),
            "afterSale.resellableRate" => Self::ResellableRate(typed(path, value)?),
            _ => return Err(Error::validation(format!("unknown field path: {path}"))),
        };
        Ok(update)
    }
}

fn typed<T: DeserializeOwned>(path: &str, value: serde_json::Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| Error::validation(format!("invalid value for {path}: {e}")))
}

/// Return a copy of `doc` with exactly one field replaced.
///
/// The input is left untouched and the copy owns all of its data, so
/// documents captured earlier (a saved snapshot, an in-flight request)
/// cannot observe the edit.
pub fn set_field(doc: &CalculatorDocument, update: FieldUpdate) -> CalculatorDocument {
    let mut next = doc.clone();
    match update {
        FieldUpdate::Money(field, value) => field.set(&mut next, value),
        FieldUpdate::Quantity(v) => next.pre_purchase.quantity = v,
        FieldUpdate::DailySales(v) => next.during_sale.daily_sales = v,
        FieldUpdate::SalesDays(v) => next.during_sale.sales_days = v,
        FieldUpdate::AdvertisingMode(v) => next.during_sale.advertising_mode = v,
        FieldUpdate::AdPercentage(v) => next.during_sale.ad_percentage = v,
        FieldUpdate::ReferralFeeRate(v) => next.during_sale.referral_fee_rate = v,
        FieldUpdate::ReturnRate(v) => next.after_sale.return_rate = v,
        FieldUpdate::ResellableRate(v) => next.after_sale.resellable_rate = v,
    }
    next
}

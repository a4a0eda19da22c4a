//! Domain models for the FBA planner.
//!
//! # Core Concepts
//!
//! ## The editing document
//!
//! - [`CalculatorDocument`]: every input of one profit estimate, a fixed-shape tree of
//!   scalars and [`MoneyValue`] fields plus the [`ExchangeRate`] they are held at.
//! - [`MoneyValue`]: one amount in USD and CNY. The side the user typed last is primary;
//!   the other side is always derived from it.
//! - [`FieldUpdate`]: a typed edit of exactly one document field, applied by [`set_field`].
//!
//! ## Computed output
//!
//! - [`CalculationResult`]: what the pricing engine derived from one document.
//!
//! ## Saved work
//!
//! - [`ProjectSnapshot`]: a named, persisted copy of a document and its result.
//! - [`ProjectForest`]: snapshots linked by `parent_id`, each with a unique branch path.

pub mod branch_path;
mod document;
mod field;
mod money;
mod project;
mod result;

pub use document::*;
pub use field::*;
pub use money::*;
pub use project::*;
pub use result::*;

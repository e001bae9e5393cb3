#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Conflux Expression
//!
//! The three small languages node parameters speak:
//!
//! - [`interpolate`] — `${path}` and `{{name}}` substitution against the
//!   data bus, with `{{name}}` falling back to credential lookup
//! - [`evaluate`] — the restricted expression language used by `if`
//!   conditions and the `code` handler
//! - [`Condition`] — the field/operator/value rules shared by `switch` and
//!   `filter`
//!
//! All three operate on `serde_json` values; none of them reach outside the
//! data they are handed.

pub mod condition;
pub mod eval;
pub mod interpolate;

pub use condition::{CombineWith, Condition, eval_condition, eval_conditions};
pub use eval::{EvalError, evaluate, evaluate_bool};
pub use interpolate::{NameResolver, interpolate, interpolate_value};

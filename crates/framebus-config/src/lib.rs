//! Rule-driven configuration loading.
//!
//! A [`ValidatedObject`] declares typed attributes and a list of [`Rule`]s.
//! [`ValidatedObject::load`] assigns values from a flat parameter bag,
//! coerces them to the declared [`TypeHint`], and applies the `default`,
//! `required` and `value` validators in that order. A failed validating
//! load restores every attribute.

pub mod coerce;
pub mod error;
pub mod object;
pub mod rule;
pub mod validator;
pub mod value;

pub use coerce::TypeHint;
pub use error::{ConfigError, Result};
pub use object::{AttributeError, ValidatedObject, ValidatedObjectBuilder};
pub use rule::{normalize, Callable, CallableError, Rule, RuleArg};
pub use validator::{ValidatorKind, REQUIRED_MESSAGE, VALUE_ALIASES};

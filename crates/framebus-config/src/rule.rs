use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::{ConfigError, Result};

/// Name key of a rule record.
pub const PARAMETER_KEY: &str = "parameter";

/// Error a callable rule value may return.
pub type CallableError = Box<dyn std::error::Error + Send + Sync + 'static>;

type CallableFn = dyn Fn(&[&str]) -> std::result::Result<Value, CallableError> + Send + Sync;

/// A function-valued rule argument.
///
/// Its result replaces the argument when the rule is applied. Only arities
/// zero and one (the attribute name) can be invoked.
#[derive(Clone)]
pub struct Callable {
    arity: usize,
    func: Arc<CallableFn>,
}

impl Callable {
    pub fn nullary<F>(func: F) -> Self
    where
        F: Fn() -> std::result::Result<Value, CallableError> + Send + Sync + 'static,
    {
        Self {
            arity: 0,
            func: Arc::new(move |_| func()),
        }
    }

    /// A callable receiving the attribute name.
    pub fn unary<F>(func: F) -> Self
    where
        F: Fn(&str) -> std::result::Result<Value, CallableError> + Send + Sync + 'static,
    {
        Self {
            arity: 1,
            func: Arc::new(move |args| func(args.first().copied().unwrap_or_default())),
        }
    }

    /// A callable of any declared arity; arities above one fail when applied.
    pub fn with_arity<F>(arity: usize, func: F) -> Self
    where
        F: Fn(&[&str]) -> std::result::Result<Value, CallableError> + Send + Sync + 'static,
    {
        Self {
            arity,
            func: Arc::new(func),
        }
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    fn invoke(&self, attribute: &str) -> Result<Value> {
        let outcome = match self.arity {
            0 => (self.func)(&[]),
            1 => (self.func)(&[attribute]),
            arity => {
                return Err(ConfigError::CallableArity {
                    attribute: attribute.to_string(),
                    arity,
                })
            }
        };
        outcome.map_err(|source| ConfigError::Callable {
            attribute: attribute.to_string(),
            source,
        })
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable").field("arity", &self.arity).finish()
    }
}

/// Argument of one validator key in a rule.
#[derive(Debug, Clone)]
pub enum RuleArg {
    Value(Value),
    Callable(Callable),
}

impl RuleArg {
    /// The concrete value, invoking a callable for `attribute`.
    pub fn resolve(&self, attribute: &str) -> Result<Value> {
        match self {
            RuleArg::Value(value) => Ok(value.clone()),
            RuleArg::Callable(callable) => callable.invoke(attribute),
        }
    }
}

impl From<Value> for RuleArg {
    fn from(value: Value) -> Self {
        RuleArg::Value(value)
    }
}

impl From<Callable> for RuleArg {
    fn from(callable: Callable) -> Self {
        RuleArg::Callable(callable)
    }
}

macro_rules! rule_arg_from {
    ($($ty:ty),*) => {
        $(impl From<$ty> for RuleArg {
            fn from(value: $ty) -> Self {
                RuleArg::Value(Value::from(value))
            }
        })*
    };
}

rule_arg_from!(bool, i32, i64, u32, u64, f64, &str, String);

/// One rule record: a parameter name and its validator entries in
/// declaration order.
#[derive(Debug, Clone)]
pub struct Rule {
    parameter: String,
    entries: Vec<(String, RuleArg)>,
}

impl Rule {
    /// Start a rule for `parameter`; `-` and `_` are interchangeable.
    pub fn new(parameter: impl Into<String>) -> Self {
        Self {
            parameter: parameter.into(),
            entries: Vec::new(),
        }
    }

    /// Add an entry under any validator key, including aliases.
    pub fn with(mut self, key: impl Into<String>, arg: impl Into<RuleArg>) -> Self {
        self.entries.push((key.into(), arg.into()));
        self
    }

    pub fn default_value(self, arg: impl Into<RuleArg>) -> Self {
        self.with("default", arg)
    }

    pub fn required(self, flag: impl Into<RuleArg>) -> Self {
        self.with("required", flag)
    }

    pub fn value(self, arg: impl Into<RuleArg>) -> Self {
        self.with("value", arg)
    }

    /// Parse a `{"parameter": <name>, <key>: <arg>, ...}` record.
    pub fn from_value(record: &Value) -> Result<Self> {
        let map: &Map<String, Value> = record
            .as_object()
            .ok_or_else(|| ConfigError::InvalidRule(format!("expected an object, got {record}")))?;
        let parameter = map
            .get(PARAMETER_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| ConfigError::InvalidRule("missing string 'parameter'".to_string()))?;

        let mut rule = Rule::new(parameter);
        for (key, value) in map {
            if key != PARAMETER_KEY {
                rule = rule.with(key.clone(), value.clone());
            }
        }
        Ok(rule)
    }

    /// The declared parameter name.
    pub fn parameter(&self) -> &str {
        &self.parameter
    }

    /// The attribute name this rule applies to.
    pub fn attribute(&self) -> String {
        normalize(&self.parameter)
    }

    pub fn entries(&self) -> &[(String, RuleArg)] {
        &self.entries
    }
}

/// Bag and rule names use `-` where attributes use `_`.
pub fn normalize(name: &str) -> String {
    name.replace('-', "_")
}

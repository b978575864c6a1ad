//! The fixed validator registry and per-attribute composite rules.

use serde_json::Value;
use tracing::warn;

use crate::error::Result;
use crate::rule::{Rule, RuleArg};
use crate::value::{contains, is_truthy, is_unset, loosely_equal, render};

/// Error recorded when a required attribute is still unset.
pub const REQUIRED_MESSAGE: &str = "Attribute is required";

/// Keys that resolve to the `value` validator.
pub const VALUE_ALIASES: &[&str] = &["valid", "choices", "in", "action", "function", "lambda"];

/// A validator in the registry. Declaration order is application order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValidatorKind {
    Default,
    Required,
    Value,
}

impl ValidatorKind {
    /// Every validator, in application order.
    pub const ALL: [ValidatorKind; 3] = [
        ValidatorKind::Default,
        ValidatorKind::Required,
        ValidatorKind::Value,
    ];

    /// Resolve a rule key, including aliases of `value`.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "default" => Some(ValidatorKind::Default),
            "required" => Some(ValidatorKind::Required),
            "value" => Some(ValidatorKind::Value),
            alias if VALUE_ALIASES.contains(&alias) => Some(ValidatorKind::Value),
            _ => None,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            ValidatorKind::Default => "default",
            ValidatorKind::Required => "required",
            ValidatorKind::Value => "value",
        }
    }
}

/// All rules for one attribute merged into one; later entries win.
#[derive(Debug, Clone)]
pub struct CompositeRule {
    attribute: String,
    default: Option<RuleArg>,
    required: Option<RuleArg>,
    value: Option<RuleArg>,
}

impl CompositeRule {
    fn new(attribute: String) -> Self {
        Self {
            attribute,
            default: None,
            required: None,
            value: None,
        }
    }

    fn merge(&mut self, rule: &Rule) {
        for (key, arg) in rule.entries() {
            let slot = match ValidatorKind::from_key(key) {
                Some(ValidatorKind::Default) => &mut self.default,
                Some(ValidatorKind::Required) => &mut self.required,
                Some(ValidatorKind::Value) => &mut self.value,
                None => {
                    warn!(attribute = %self.attribute, key = %key, "ignoring unknown validator");
                    continue;
                }
            };
            *slot = Some(arg.clone());
        }
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    fn arg(&self, kind: ValidatorKind) -> Option<&RuleArg> {
        match kind {
            ValidatorKind::Default => self.default.as_ref(),
            ValidatorKind::Required => self.required.as_ref(),
            ValidatorKind::Value => self.value.as_ref(),
        }
    }

    fn is_required(&self) -> Result<bool> {
        match &self.required {
            Some(arg) => Ok(is_truthy(&arg.resolve(&self.attribute)?)),
            None => Ok(false),
        }
    }

    /// Run every validator against `slot`, in registry order.
    ///
    /// Returns the per-attribute error messages; `Err` only for fatal
    /// callable failures. A callable `required` runs once per call.
    pub fn apply(&self, slot: &mut Value) -> Result<Vec<String>> {
        let required = self.is_required()?;
        let mut errors = Vec::new();
        for kind in ValidatorKind::ALL {
            let Some(arg) = self.arg(kind) else {
                continue;
            };
            match kind {
                ValidatorKind::Default => {
                    if is_unset(slot) {
                        *slot = arg.resolve(&self.attribute)?;
                    }
                }
                ValidatorKind::Required => {
                    if required && is_unset(slot) {
                        errors.push(REQUIRED_MESSAGE.to_string());
                    }
                }
                ValidatorKind::Value => {
                    if is_unset(slot) && !required {
                        continue;
                    }
                    let expected = arg.resolve(&self.attribute)?;
                    if let Some(message) = check_value(slot, &expected) {
                        errors.push(message);
                    }
                }
            }
        }
        Ok(errors)
    }
}

fn check_value(actual: &Value, expected: &Value) -> Option<String> {
    if let Value::Bool(accepted) = expected {
        return (!accepted).then(|| format!("Value {} is not valid", render(actual)));
    }

    let inside = match actual {
        Value::Array(items) if expected.is_array() || expected.is_object() => Some(
            items
                .iter()
                .all(|item| contains(expected, item) == Some(true)),
        ),
        single => contains(expected, single),
    };
    match inside {
        Some(true) => None,
        Some(false) => Some(format!(
            "Value {} is not in {}",
            render(actual),
            render(expected)
        )),
        None if loosely_equal(actual, expected) => None,
        None => Some(format!(
            "Value {} is not equal to {}",
            render(actual),
            render(expected)
        )),
    }
}

/// Group `rules` by attribute in first-appearance order.
pub fn compose(rules: &[Rule]) -> Vec<CompositeRule> {
    let mut composites: Vec<CompositeRule> = Vec::new();
    for rule in rules {
        let attribute = rule.attribute();
        let index = match composites.iter().position(|c| c.attribute == attribute) {
            Some(index) => index,
            None => {
                composites.push(CompositeRule::new(attribute));
                composites.len() - 1
            }
        };
        composites[index].merge(rule);
    }
    composites
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::rule::Callable;

    fn single(rule: Rule) -> CompositeRule {
        compose(&[rule]).remove(0)
    }

    #[test]
    fn aliases_resolve_to_value() {
        for alias in VALUE_ALIASES {
            assert_eq!(ValidatorKind::from_key(alias), Some(ValidatorKind::Value));
        }
        assert_eq!(ValidatorKind::from_key("minimum"), None);
    }

    #[test]
    fn default_then_required() {
        let rule = single(Rule::new("x").required(true).default_value(42));
        let mut slot = Value::Null;
        assert!(rule.apply(&mut slot).expect("apply").is_empty());
        assert_eq!(slot, json!(42));
    }

    #[test]
    fn missing_required_attribute() {
        let rule = single(Rule::new("x").required(true));
        let mut slot = Value::Null;
        assert_eq!(rule.apply(&mut slot).expect("apply"), vec![REQUIRED_MESSAGE]);
    }

    #[test]
    fn empty_values_are_unset() {
        let rule = single(Rule::new("x").required(true));
        for empty in [json!(""), json!([])] {
            let mut slot = empty;
            assert_eq!(rule.apply(&mut slot).expect("apply"), vec![REQUIRED_MESSAGE]);
        }

        let rule = single(Rule::new("x").default_value("d"));
        let mut slot = json!("");
        rule.apply(&mut slot).expect("apply");
        assert_eq!(slot, json!("d"));

        let rule = single(Rule::new("x").required(true));
        let mut slot = json!(0);
        assert!(rule.apply(&mut slot).expect("apply").is_empty());
    }

    #[test]
    fn callable_required_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let rule = single(
            Rule::new("mode")
                .with(
                    "required",
                    Callable::unary(move |_| {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(json!(true))
                    }),
                )
                .value(json!(["echo"])),
        );
        assert!(rule.apply(&mut json!("echo")).expect("apply").is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn default_never_overwrites() {
        let rule = single(Rule::new("x").default_value(42));
        let mut slot = json!(7);
        rule.apply(&mut slot).expect("apply");
        assert_eq!(slot, json!(7));
    }

    #[test]
    fn unset_optional_values_pass() {
        let rule = single(Rule::new("mode").value(json!(["echo", "reject"])));
        let mut slot = Value::Null;
        assert!(rule.apply(&mut slot).expect("apply").is_empty());
    }

    #[test]
    fn equality_and_membership() {
        let rule = single(Rule::new("n").value(10));
        assert_eq!(
            rule.apply(&mut json!(42)).expect("apply"),
            vec!["Value 42 is not equal to 10"]
        );
        assert!(rule.apply(&mut json!(10.0)).expect("apply").is_empty());

        let rule = single(Rule::new("mode").with("choices", json!(["echo", "reject"])));
        assert!(rule.apply(&mut json!("echo")).expect("apply").is_empty());
        assert_eq!(
            rule.apply(&mut json!("drop")).expect("apply"),
            vec![r#"Value drop is not in ["echo","reject"]"#]
        );
        assert!(rule.apply(&mut json!(["echo", "reject"])).expect("apply").is_empty());
        assert_eq!(rule.apply(&mut json!(["echo", "drop"])).expect("apply").len(), 1);
    }

    #[test]
    fn object_containers_match_keys() {
        let rule = single(Rule::new("mode").with("in", json!({"echo": 1, "reject": 2})));
        assert!(rule.apply(&mut json!("reject")).expect("apply").is_empty());
        assert_eq!(rule.apply(&mut json!("other")).expect("apply").len(), 1);
    }

    #[test]
    fn strings_are_not_containers() {
        let rule = single(Rule::new("mode").value("echo"));
        assert_eq!(
            rule.apply(&mut json!("ech")).expect("apply"),
            vec!["Value ech is not equal to echo"]
        );
    }

    #[test]
    fn boolean_values_gate_acceptance() {
        let rule = single(Rule::new("flag").with("valid", false));
        assert_eq!(rule.apply(&mut json!(1)).expect("apply"), vec!["Value 1 is not valid"]);
        let rule = single(Rule::new("flag").with("valid", true));
        assert!(rule.apply(&mut json!(1)).expect("apply").is_empty());
    }

    #[test]
    fn callable_result_is_checked() {
        let rule = single(
            Rule::new("mode").with("lambda", Callable::unary(|_| Ok(json!(["echo"])))),
        );
        assert!(rule.apply(&mut json!("echo")).expect("apply").is_empty());
        assert_eq!(rule.apply(&mut json!("reject")).expect("apply").len(), 1);
    }

    #[test]
    fn last_alias_wins() {
        let rule = single(Rule::new("n").with("valid", 1).with("choices", json!([2, 3])));
        assert!(rule.apply(&mut json!(2)).expect("apply").is_empty());
        assert_eq!(rule.apply(&mut json!(1)).expect("apply").len(), 1);
    }

    #[test]
    fn later_rules_for_the_same_attribute_merge() {
        let composites = compose(&[
            Rule::new("tick-ms").default_value(0),
            Rule::new("mode").value("echo"),
            Rule::new("tick_ms").default_value(50),
        ]);
        assert_eq!(composites.len(), 2);
        assert_eq!(composites[0].attribute(), "tick_ms");
        let mut slot = Value::Null;
        composites[0].apply(&mut slot).expect("apply");
        assert_eq!(slot, json!(50));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let rule = single(Rule::new("n").with("minimum", 3));
        assert!(rule.apply(&mut json!(1)).expect("apply").is_empty());
    }
}

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::coerce::TypeHint;
use crate::error::{ConfigError, Result};
use crate::rule::{normalize, Rule};
use crate::validator::{compose, CompositeRule};

/// One per-attribute validation failure from the last load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeError {
    pub attribute: String,
    pub error: String,
    /// Name of the object the attribute belongs to.
    pub module: String,
}

impl fmt::Display for AttributeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}: {}", self.module, self.attribute, self.error)
    }
}

#[derive(Debug, Clone)]
struct Attribute {
    name: String,
    hint: TypeHint,
    value: Value,
}

/// Builder for [`ValidatedObject`].
#[derive(Debug)]
pub struct ValidatedObjectBuilder {
    module: String,
    attributes: Vec<Attribute>,
    rules: Vec<Rule>,
}

impl ValidatedObjectBuilder {
    /// Declare an attribute that starts unset.
    pub fn attribute(self, name: impl Into<String>, hint: TypeHint) -> Self {
        self.attribute_with(name, hint, Value::Null)
    }

    /// Declare an attribute with an initial value.
    pub fn attribute_with(
        mut self,
        name: impl Into<String>,
        hint: TypeHint,
        initial: impl Into<Value>,
    ) -> Self {
        self.attributes.push(Attribute {
            name: name.into(),
            hint,
            value: initial.into(),
        });
        self
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(mut self, rules: impl IntoIterator<Item = Rule>) -> Self {
        self.rules.extend(rules);
        self
    }

    /// Merge the rules and check the declarations.
    ///
    /// Rules naming an undeclared attribute are dropped with a warning.
    pub fn build(self) -> Result<ValidatedObject> {
        for (index, attribute) in self.attributes.iter().enumerate() {
            if self.attributes[..index]
                .iter()
                .any(|earlier| earlier.name == attribute.name)
            {
                return Err(ConfigError::DuplicateAttribute(attribute.name.clone()));
            }
        }

        let rules = compose(&self.rules)
            .into_iter()
            .filter(|rule| {
                let declared = self.attributes.iter().any(|a| a.name == rule.attribute());
                if !declared {
                    warn!(module = %self.module, attribute = %rule.attribute(), "rule for undeclared attribute ignored");
                }
                declared
            })
            .collect();

        Ok(ValidatedObject {
            module: self.module,
            attributes: self.attributes,
            rules,
            errors: Vec::new(),
        })
    }
}

/// A set of typed attributes populated from a parameter bag under rules.
///
/// A failed validating load leaves every attribute at its pre-load value.
#[derive(Debug, Clone)]
pub struct ValidatedObject {
    module: String,
    attributes: Vec<Attribute>,
    rules: Vec<CompositeRule>,
    errors: Vec<AttributeError>,
}

impl ValidatedObject {
    /// Start declaring an object; `module` names it in error records.
    pub fn builder(module: impl Into<String>) -> ValidatedObjectBuilder {
        ValidatedObjectBuilder {
            module: module.into(),
            attributes: Vec::new(),
            rules: Vec::new(),
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// Assign matching bag entries, then optionally validate.
    ///
    /// Bag names are matched after replacing `-` with `_`; unknown names are
    /// skipped. With `validate`, returns `Ok(false)` when any rule failed and
    /// `Err` for a fatal callable error; both restore the pre-load values.
    pub fn load<I, K>(&mut self, bag: I, validate: bool) -> Result<bool>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        self.errors.clear();
        let snapshot: Vec<Value> = self.attributes.iter().map(|a| a.value.clone()).collect();

        for (name, value) in bag {
            let name = normalize(name.as_ref());
            match self.attributes.iter_mut().find(|a| a.name == name) {
                Some(attribute) => attribute.value = attribute.hint.coerce(value),
                None => debug!(module = %self.module, parameter = %name, "ignoring unknown parameter"),
            }
        }

        if !validate {
            return Ok(true);
        }

        match self.run_rules() {
            Ok(errors) if errors.is_empty() => Ok(true),
            Ok(errors) => {
                for error in &errors {
                    debug!(module = %self.module, attribute = %error.attribute, error = %error.error, "validation failed");
                }
                self.errors = errors;
                self.restore(snapshot);
                Ok(false)
            }
            Err(err) => {
                self.restore(snapshot);
                Err(err)
            }
        }
    }

    fn run_rules(&mut self) -> Result<Vec<AttributeError>> {
        let mut errors = Vec::new();
        for rule in &self.rules {
            let Some(attribute) = self
                .attributes
                .iter_mut()
                .find(|a| a.name == rule.attribute())
            else {
                continue;
            };
            for error in rule.apply(&mut attribute.value)? {
                errors.push(AttributeError {
                    attribute: attribute.name.clone(),
                    error,
                    module: self.module.clone(),
                });
            }
        }
        Ok(errors)
    }

    fn restore(&mut self, snapshot: Vec<Value>) {
        for (attribute, value) in self.attributes.iter_mut().zip(snapshot) {
            attribute.value = value;
        }
    }

    /// Errors recorded by the last load.
    pub fn errors(&self) -> &[AttributeError] {
        &self.errors
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes
            .iter()
            .find(|a| a.name == normalize(name))
            .map(|a| &a.value)
    }

    /// Assign one attribute directly, with coercion and without validation.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let name = normalize(name);
        let attribute = self
            .attributes
            .iter_mut()
            .find(|a| a.name == name)
            .ok_or(ConfigError::UnknownAttribute(name))?;
        attribute.value = attribute.hint.coerce(value.into());
        Ok(())
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|a| a.name.as_str())
    }

    /// All attributes as a JSON object keyed by attribute name.
    pub fn to_map(&self) -> Map<String, Value> {
        self.attributes
            .iter()
            .map(|a| (a.name.clone(), a.value.clone()))
            .collect()
    }

    /// Deserialize the current attribute values into `T`.
    pub fn extract<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(Value::Object(self.to_map()))?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::rule::Callable;

    fn settings() -> ValidatedObject {
        ValidatedObject::builder("serve")
            .attribute("reply_endpoint", TypeHint::Str)
            .attribute_with("tick_ms", TypeHint::Int, 0)
            .rule(Rule::new("reply-endpoint").default_value("tcp://127.0.0.1:5555"))
            .rule(Rule::new("tick-ms").value(Callable::nullary(|| Ok(json!(true)))))
            .build()
            .expect("settings")
    }

    #[test]
    fn load_without_validation_only_assigns() {
        let mut object = settings();
        assert!(object
            .load([("tick-ms", json!("25"))], false)
            .expect("load"));
        assert_eq!(object.get("tick_ms"), Some(&json!(25)));
        assert_eq!(object.get("reply_endpoint"), Some(&Value::Null));
    }

    #[test]
    fn unknown_parameters_are_skipped() {
        let mut object = settings();
        assert!(object
            .load([("frame-rate", json!(30))], true)
            .expect("load"));
        assert_eq!(object.get("reply-endpoint"), Some(&json!("tcp://127.0.0.1:5555")));
    }

    #[test]
    fn fatal_callable_errors_restore_values() {
        let mut object = ValidatedObject::builder("serve")
            .attribute_with("mode", TypeHint::Str, "echo")
            .rule(Rule::new("mode").with("function", Callable::with_arity(2, |_| Ok(json!(true)))))
            .build()
            .expect("object");

        let err = object
            .load([("mode", json!("reject"))], true)
            .expect_err("arity is fatal");
        assert!(matches!(err, ConfigError::CallableArity { arity: 2, .. }));
        assert_eq!(object.get("mode"), Some(&json!("echo")));
    }

    #[test]
    fn duplicate_attributes_are_rejected() {
        let result = ValidatedObject::builder("serve")
            .attribute("mode", TypeHint::Str)
            .attribute("mode", TypeHint::Any)
            .build();
        assert!(matches!(result, Err(ConfigError::DuplicateAttribute(name)) if name == "mode"));
    }

    #[test]
    fn set_coerces_and_checks_names() {
        let mut object = settings();
        object.set("tick-ms", "40").expect("set");
        assert_eq!(object.get("tick_ms"), Some(&json!(40)));
        assert!(matches!(
            object.set("frame_rate", 1),
            Err(ConfigError::UnknownAttribute(_))
        ));
    }

    #[test]
    fn extract_into_typed_settings() {
        #[derive(serde::Deserialize)]
        struct Serve {
            reply_endpoint: String,
            tick_ms: u64,
        }

        let mut object = settings();
        assert!(object.load([("tick_ms", json!(10))], true).expect("load"));
        let serve: Serve = object.extract().expect("extract");
        assert_eq!(serve.reply_endpoint, "tcp://127.0.0.1:5555");
        assert_eq!(serve.tick_ms, 10);
    }

    #[test]
    fn attribute_error_display() {
        let error = AttributeError {
            attribute: "n".to_string(),
            error: "Attribute is required".to_string(),
            module: "serve".to_string(),
        };
        assert_eq!(error.to_string(), "serve.n: Attribute is required");
    }
}

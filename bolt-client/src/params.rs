//! List and watch parameters
//!
//! Selectors use the cluster's equality-based syntax: comma-separated
//! `key=value`, `key==value` or `key!=value` requirements, all of which must
//! hold. Label selectors match `metadata.labels`; field selectors match a
//! dotted path into the object (e.g. `metadata.name`).

use serde_json::Value;

use crate::error::{ClusterError, Result};

/// Parameters narrowing a list or watch call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListParams {
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
}

impl ListParams {
    /// Only objects carrying label `key=value`
    pub fn labels(mut self, key: &str, value: &str) -> Self {
        self.label_selector = Some(append(self.label_selector.take(), key, value));
        self
    }

    /// Only objects whose field at `path` equals `value`
    pub fn fields(mut self, path: &str, value: &str) -> Self {
        self.field_selector = Some(append(self.field_selector.take(), path, value));
        self
    }

    /// Only the object called `name`
    pub fn name(name: &str) -> Self {
        Self::default().fields("metadata.name", name)
    }

    /// Query parameters for the REST API
    pub fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if let Some(labels) = &self.label_selector {
            query.push(("labelSelector", labels.clone()));
        }
        if let Some(fields) = &self.field_selector {
            query.push(("fieldSelector", fields.clone()));
        }
        query
    }

    /// Evaluates both selectors against a raw object
    ///
    /// Used by backends that filter client-side.
    pub fn matches(&self, object: &Value) -> Result<bool> {
        if let Some(labels) = &self.label_selector {
            let selector = Selector::parse(labels)?;
            let object_labels = &object["metadata"]["labels"];
            if !selector.matches(|key| object_labels.get(key).and_then(Value::as_str)) {
                return Ok(false);
            }
        }

        if let Some(fields) = &self.field_selector {
            let selector = Selector::parse(fields)?;
            if !selector.matches(|path| field(object, path)) {
                return Ok(false);
            }
        }

        Ok(true)
    }
}

fn append(selector: Option<String>, key: &str, value: &str) -> String {
    match selector {
        Some(existing) if !existing.is_empty() => format!("{},{}={}", existing, key, value),
        _ => format!("{}={}", key, value),
    }
}

fn field<'a>(object: &'a Value, path: &str) -> Option<&'a str> {
    path.split('.')
        .try_fold(object, |value, segment| value.get(segment))
        .and_then(Value::as_str)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Equals,
    NotEquals,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Requirement {
    key: String,
    operator: Operator,
    value: String,
}

/// A parsed equality selector
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Selector(Vec<Requirement>);

impl Selector {
    fn parse(selector: &str) -> Result<Self> {
        let mut requirements = Vec::new();

        for term in selector.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let (key, operator, value) = if let Some((key, value)) = term.split_once("!=") {
                (key, Operator::NotEquals, value)
            } else if let Some((key, value)) = term.split_once("==") {
                (key, Operator::Equals, value)
            } else if let Some((key, value)) = term.split_once('=') {
                (key, Operator::Equals, value)
            } else {
                return Err(ClusterError::InvalidRequest(format!(
                    "unsupported selector term '{}'",
                    term
                )));
            };

            let key = key.trim();
            if key.is_empty() {
                return Err(ClusterError::InvalidRequest(format!(
                    "selector term '{}' has no key",
                    term
                )));
            }

            requirements.push(Requirement {
                key: key.to_string(),
                operator,
                value: value.trim().to_string(),
            });
        }

        Ok(Self(requirements))
    }

    fn matches<'a>(&self, lookup: impl Fn(&str) -> Option<&'a str>) -> bool {
        self.0.iter().all(|req| {
            let actual = lookup(&req.key);
            match req.operator {
                Operator::Equals => actual == Some(req.value.as_str()),
                Operator::NotEquals => actual != Some(req.value.as_str()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object() -> Value {
        json!({
            "metadata": {
                "name": "train-wf-abcde",
                "labels": { "task": "train", "team": "ml" }
            },
            "status": { "phase": "Running" }
        })
    }

    #[test]
    fn test_builders_compose() {
        let params = ListParams::default().labels("task", "train").labels("team", "ml");
        assert_eq!(params.label_selector.as_deref(), Some("task=train,team=ml"));
        assert_eq!(
            ListParams::name("train").query(),
            vec![("fieldSelector", "metadata.name=train".to_string())]
        );
    }

    #[test]
    fn test_label_matching() {
        let obj = object();
        assert!(ListParams::default().labels("task", "train").matches(&obj).unwrap());
        assert!(!ListParams::default().labels("task", "eval").matches(&obj).unwrap());

        let not_equal = ListParams {
            label_selector: Some("team!=infra".to_string()),
            field_selector: None,
        };
        assert!(not_equal.matches(&obj).unwrap());
    }

    #[test]
    fn test_field_matching() {
        let obj = object();
        assert!(ListParams::name("train-wf-abcde").matches(&obj).unwrap());
        assert!(!ListParams::name("other").matches(&obj).unwrap());
        assert!(
            ListParams::default()
                .fields("status.phase", "Running")
                .matches(&obj)
                .unwrap()
        );
    }

    #[test]
    fn test_empty_params_match_everything() {
        assert!(ListParams::default().matches(&json!({})).unwrap());
    }

    #[test]
    fn test_invalid_selector() {
        let params = ListParams {
            label_selector: Some("task in (a,b)".to_string()),
            field_selector: None,
        };
        assert!(params.matches(&object()).is_err());
    }
}

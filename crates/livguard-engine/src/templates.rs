//! Named policy blueprints.
//!
//! A template is a baseline policy plus a closed set of typed variables that
//! may be substituted at instantiation time. Unknown variables and type
//! mismatches are rejected instead of ignored.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use livguard_core::error::{LivGuardError, Result};
use livguard_core::policy::Policy;

/// Variable value supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TemplateValue {
    Bool(bool),
    Integer(u64),
    Text(String),
}

impl TemplateValue {
    fn kind(&self) -> VariableKind {
        match self {
            TemplateValue::Bool(_) => VariableKind::Bool,
            TemplateValue::Integer(_) => VariableKind::Integer,
            TemplateValue::Text(_) => VariableKind::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableKind {
    Bool,
    Integer,
    Text,
}

impl VariableKind {
    fn as_str(self) -> &'static str {
        match self {
            VariableKind::Bool => "bool",
            VariableKind::Integer => "integer",
            VariableKind::Text => "text",
        }
    }
}

/// Variables every template accepts, with their expected kind.
pub const TEMPLATE_VARIABLES: [(&str, VariableKind); 7] = [
    ("name", VariableKind::Text),
    ("description", VariableKind::Text),
    ("parent", VariableKind::Text),
    ("memory_limit", VariableKind::Integer),
    ("cpu_time_limit_ms", VariableKind::Integer),
    ("max_document_size", VariableKind::Integer),
    ("require_signature", VariableKind::Bool),
];

#[derive(Debug, Clone, Serialize)]
pub struct PolicyTemplate {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub base: Policy,
}

impl PolicyTemplate {
    /// Build an uncommitted policy with `id` from this template.
    pub fn instantiate(
        &self,
        id: &str,
        variables: &BTreeMap<String, TemplateValue>,
    ) -> Result<Policy> {
        let mut policy = self.base.clone();
        policy.id = id.to_string();
        policy.name = format!("{} (from {})", self.base.name, self.name);
        policy.description = self.description.clone();

        for (name, value) in variables {
            let expected = TEMPLATE_VARIABLES
                .iter()
                .find(|(n, _)| *n == name.as_str())
                .map(|(_, k)| *k)
                .ok_or_else(|| LivGuardError::InvalidTemplateVariable {
                    name: name.clone(),
                    msg: "unknown variable".into(),
                })?;
            if value.kind() != expected {
                return Err(LivGuardError::InvalidTemplateVariable {
                    name: name.clone(),
                    msg: format!("expected {}, got {}", expected.as_str(), value.kind().as_str()),
                });
            }

            match (name.as_str(), value) {
                ("name", TemplateValue::Text(v)) => policy.name = v.clone(),
                ("description", TemplateValue::Text(v)) => policy.description = v.clone(),
                ("parent", TemplateValue::Text(v)) => policy.parent_policy_id = Some(v.clone()),
                ("memory_limit", TemplateValue::Integer(v)) => policy.security.wasm.memory_limit = *v,
                ("cpu_time_limit_ms", TemplateValue::Integer(v)) => {
                    policy.security.wasm.cpu_time_limit_ms = *v
                }
                ("max_document_size", TemplateValue::Integer(v)) => {
                    policy.admin.max_document_size = *v
                }
                ("require_signature", TemplateValue::Bool(v)) => {
                    policy.admin.require_signature = *v
                }
                _ => {}
            }
        }

        policy.validate().map_err(|e| match e {
            LivGuardError::InvalidPolicy(msg) => LivGuardError::InvalidTemplateVariable {
                name: "variables".into(),
                msg,
            },
            other => other,
        })?;
        Ok(policy)
    }
}

pub struct TemplateRegistry {
    templates: BTreeMap<String, PolicyTemplate>,
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TemplateRegistry {
    /// `basic-security` and `high-security`.
    pub fn builtin() -> Self {
        let basic = PolicyTemplate {
            id: "basic-security".into(),
            name: "Basic Security Policy".into(),
            description: "A basic security policy template with conservative settings".into(),
            category: "security".into(),
            base: Policy::new("template", "Default Security Policy"),
        };

        let mut strict = Policy::new("template", "Default Security Policy");
        strict.admin.require_signature = true;
        strict.admin.enforce_quarantine = true;
        strict.security.wasm.memory_limit = 8 * 1024 * 1024;
        let high = PolicyTemplate {
            id: "high-security".into(),
            name: "High Security Policy".into(),
            description: "A high security policy template with strict settings".into(),
            category: "security".into(),
            base: strict,
        };

        let mut templates = BTreeMap::new();
        templates.insert(basic.id.clone(), basic);
        templates.insert(high.id.clone(), high);
        Self { templates }
    }

    pub fn get(&self, id: &str) -> Result<&PolicyTemplate> {
        self.templates
            .get(id)
            .ok_or_else(|| LivGuardError::UnknownTemplate(id.to_string()))
    }

    pub fn ids(&self) -> Vec<&str> {
        self.templates.keys().map(String::as_str).collect()
    }
}

// jobmesh-core/src/runtime/template.rs
// ============================================================================
// Module: Jobmesh Template Compiler
// Description: Minimal `{{ .path | func }}` substitution over JSON contexts.
// Purpose: Compile task config and assets before plugin calls.
// Dependencies: crate::core, crate::interfaces, serde_json, time
// ============================================================================

//! ## Overview
//! Placeholders reference context values by dotted path, for example
//! `{{ .GLOBAL__BUCKET }}` or `{{ .secret.TOKEN }}`, and may pipe the value
//! through `Date`, `upper`, or `lower`. A missing key is an error so a typo
//! never compiles to an empty string silently.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

use crate::core::DomainError;
use crate::core::StringMap;
use crate::core::errors::ENTITY_JOB;
use crate::interfaces::TemplateCompiler;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Opening delimiter.
const OPEN: &str = "{{";
/// Closing delimiter.
const CLOSE: &str = "}}";

// ============================================================================
// SECTION: Compiler
// ============================================================================

/// Template compiler supporting dotted lookups and a few pipe functions.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleTemplateCompiler;

impl SimpleTemplateCompiler {
    /// Creates a compiler.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Renders one template string.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error for unterminated placeholders,
    /// unknown functions, or missing keys.
    pub fn render(
        &self,
        name: &str,
        template: &str,
        context: &Value,
    ) -> Result<String, DomainError> {
        let mut output = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find(OPEN) {
            output.push_str(&rest[..start]);
            let after = &rest[start + OPEN.len()..];
            let Some(end) = after.find(CLOSE) else {
                return Err(template_error(name, "unterminated placeholder"));
            };
            output.push_str(&evaluate(name, after[..end].trim(), context)?);
            rest = &after[end + CLOSE.len()..];
        }
        output.push_str(rest);
        Ok(output)
    }
}

impl TemplateCompiler for SimpleTemplateCompiler {
    fn compile(&self, templates: &StringMap, context: &Value) -> Result<StringMap, DomainError> {
        templates
            .iter()
            .map(|(key, template)| Ok((key.clone(), self.render(key, template, context)?)))
            .collect()
    }
}

// ============================================================================
// SECTION: Evaluation
// ============================================================================

/// Evaluates a placeholder body: `.path` followed by optional `| func`.
fn evaluate(name: &str, expression: &str, context: &Value) -> Result<String, DomainError> {
    let mut stages = expression.split('|').map(str::trim);
    let path = stages.next().unwrap_or_default();
    let Some(path) = path.strip_prefix('.') else {
        return Err(template_error(
            name,
            &format!("expression \"{expression}\" must start with '.'"),
        ));
    };
    let mut value = lookup(context, path)
        .ok_or_else(|| template_error(name, &format!("map has no entry for key \"{path}\"")))?;
    for function in stages {
        value = apply(name, function, &value)?;
    }
    Ok(value)
}

/// Resolves a dotted path to a string value.
fn lookup(context: &Value, path: &str) -> Option<String> {
    let mut current = context;
    if !path.is_empty() {
        for segment in path.split('.') {
            current = current.get(segment)?;
        }
    }
    match current {
        Value::String(text) => Some(text.clone()),
        Value::Null | Value::Object(_) | Value::Array(_) => None,
        other => Some(other.to_string()),
    }
}

/// Applies a pipe function.
fn apply(name: &str, function: &str, value: &str) -> Result<String, DomainError> {
    match function {
        "Date" => {
            let parsed = OffsetDateTime::parse(value, &Rfc3339)
                .map_err(|err| {
                    template_error(name, &format!("Date expects RFC 3339 input: {err}"))
                })?;
            parsed
                .format(format_description!("[year]-[month]-[day]"))
                .map_err(|err| template_error(name, &err.to_string()))
        }
        "upper" => Ok(value.to_uppercase()),
        "lower" => Ok(value.to_lowercase()),
        other => Err(template_error(name, &format!("function \"{other}\" not defined"))),
    }
}

/// Builds a template compilation error.
fn template_error(name: &str, detail: &str) -> DomainError {
    DomainError::invalid_argument(
        ENTITY_JOB,
        format!("failed to compile template {name}: {detail}"),
    )
}

// ============================================================================
// SECTION: Tests
// ============================================================================

/// Template rendering for node config values
///
/// Strings inside action params and LLM prompts are minijinja templates with
/// the node's resolved inputs bound to `input`. A string that is exactly one
/// `{{ expression }}` keeps the expression's JSON type instead of being
/// stringified.

use minijinja::Environment;
use serde_json::{json, Value};

/// Render a single template string
pub fn render_str(template: &str, inputs: &Value) -> Result<String, String> {
    let env = Environment::new();
    env.render_str(template, json!({ "input": inputs }))
        .map_err(|e| format!("template error: {}", e))
}

/// Recursively render every string in `value`
pub fn render_value(value: &Value, inputs: &Value) -> Result<Value, String> {
    let env = Environment::new();
    let scope = json!({ "input": inputs });
    render_with(&env, value, &scope)
}

fn render_with(env: &Environment<'_>, value: &Value, scope: &Value) -> Result<Value, String> {
    match value {
        Value::String(s) => render_string(env, s, scope),
        Value::Array(items) => items
            .iter()
            .map(|item| render_with(env, item, scope))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut rendered = serde_json::Map::with_capacity(map.len());
            for (key, item) in map {
                rendered.insert(key.clone(), render_with(env, item, scope)?);
            }
            Ok(Value::Object(rendered))
        }
        other => Ok(other.clone()),
    }
}

fn render_string(env: &Environment<'_>, s: &str, scope: &Value) -> Result<Value, String> {
    if !s.contains("{{") && !s.contains("{%") {
        return Ok(Value::String(s.to_string()));
    }

    if let Some(expression) = whole_expression(s) {
        let compiled = env
            .compile_expression(expression)
            .map_err(|e| format!("template error in '{}': {}", s, e))?;
        let result = compiled
            .eval(scope)
            .map_err(|e| format!("template error in '{}': {}", s, e))?;
        return serde_json::to_value(&result).map_err(|e| format!("template error in '{}': {}", s, e));
    }

    env.render_str(s, scope)
        .map(Value::String)
        .map_err(|e| format!("template error in '{}': {}", s, e))
}

/// `"{{ input.msg }}"` -> `Some("input.msg")`
fn whole_expression(s: &str) -> Option<&str> {
    let inner = s.trim().strip_prefix("{{")?.strip_suffix("}}")?;
    if inner.contains("{{") || inner.contains("}}") {
        return None;
    }
    Some(inner.trim())
}

/// Condition node: evaluate a Lua expression to pick a branch
///
/// The expression sees the resolved inputs as the global `input` and runs
/// in a fresh interpreter with `os`, `io`, `debug`, `package` and the file
/// loaders removed. Evaluation happens on the blocking pool under an
/// instruction hook that stops the script once the node is cancelled, and
/// the interpreter's heap is capped. Its result becomes the branch selector:
///
/// | result  | selector                        |
/// |---------|---------------------------------|
/// | boolean | `"true"` / `"false"`            |
/// | string  | the string                      |
/// | number  | Lua's `tostring` (`2`, `2.0`)   |
/// | nil     | `"false"`                       |
///
/// The node's own output value is its input, so downstream nodes on the
/// selected branch see the same data the condition saw.

use super::{NodeExecutor, NodeInvocation, NodeOutput};
use crate::error::NodeError;
use async_trait::async_trait;
use mlua::{HookTriggers, Lua, LuaSerdeExt, SerializeOptions, VmState};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

const SANDBOXED_GLOBALS: [&str; 8] = [
    "os", "io", "debug", "package", "require", "dofile", "loadfile", "load",
];

/// Instructions between cancellation checks
const HOOK_INTERVAL: u32 = 1_000;

/// Heap limit of one condition interpreter
const MEMORY_LIMIT_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Default, Clone, Copy)]
pub struct ConditionExecutor;

#[async_trait]
impl NodeExecutor for ConditionExecutor {
    async fn execute(&self, invocation: NodeInvocation) -> Result<NodeOutput, NodeError> {
        let expression = invocation.require_str("expression")?.to_string();
        let input = invocation.inputs.clone();
        let cancel = invocation.cancel.clone();

        let selector = tokio::task::spawn_blocking(move || evaluate(&expression, &input, &cancel))
            .await
            .map_err(|e| NodeError::Crashed(e.to_string()))??;

        tracing::debug!(
            "🔀 Condition '{}' selected branch '{}'",
            invocation.node_id,
            selector
        );

        Ok(NodeOutput::branch(invocation.inputs, selector))
    }
}

/// Evaluate `expression` against `input` and convert the result to a branch selector
///
/// Blocks the calling thread; returns `NodeError::Cancelled` once `cancel`
/// fires while the script is still running.
pub fn evaluate(expression: &str, input: &Value, cancel: &CancellationToken) -> Result<String, NodeError> {
    let lua = Lua::new();
    let expression_error = |e: mlua::Error| NodeError::Expression(e.to_string());

    lua.set_memory_limit(MEMORY_LIMIT_BYTES)
        .map_err(expression_error)?;

    let hook_cancel = cancel.clone();
    lua.set_hook(
        HookTriggers::new().every_nth_instruction(HOOK_INTERVAL),
        move |_lua, _debug| {
            if hook_cancel.is_cancelled() {
                Err(mlua::Error::runtime("condition cancelled"))
            } else {
                Ok(VmState::Continue)
            }
        },
    );

    let globals = lua.globals();
    for name in SANDBOXED_GLOBALS {
        globals.set(name, mlua::Nil).map_err(expression_error)?;
    }

    let options = SerializeOptions::new()
        .serialize_none_to_null(false)
        .serialize_unit_to_null(false);
    let lua_input = lua
        .to_value_with(input, options)
        .map_err(|e| NodeError::Expression(format!("cannot expose input: {}", e)))?;
    globals.set("input", lua_input).map_err(expression_error)?;

    let result = match lua.load(expression).set_name("condition").eval::<mlua::Value>() {
        Ok(result) => result,
        Err(_) if cancel.is_cancelled() => return Err(NodeError::Cancelled),
        Err(e) => return Err(expression_error(e)),
    };

    match result {
        mlua::Value::Nil => Ok("false".to_string()),
        mlua::Value::Boolean(b) => Ok(b.to_string()),
        mlua::Value::Integer(i) => Ok(i.to_string()),
        number @ mlua::Value::Number(_) => {
            let tostring: mlua::Function = globals.get("tostring").map_err(expression_error)?;
            tostring.call(number).map_err(expression_error)
        }
        mlua::Value::String(s) => s
            .to_str()
            .map(|s| s.to_string())
            .map_err(|e| NodeError::Expression(format!("invalid UTF-8 in result: {}", e))),
        other => Err(NodeError::Expression(format!(
            "expression must evaluate to a boolean, string, number or nil, got {}",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::types::{NodeKind, TriggerKind};
    use serde_json::json;
    use std::time::Duration;

    fn eval(expression: &str, input: &Value) -> Result<String, NodeError> {
        evaluate(expression, input, &CancellationToken::new())
    }

    #[test]
    fn converts_results_to_selectors() {
        let input = json!({ "score": 82, "tier": "gold", "missing": null });

        assert_eq!(eval("input.score > 70", &input).unwrap(), "true");
        assert_eq!(eval("input.score < 70", &input).unwrap(), "false");
        assert_eq!(eval("input.tier", &input).unwrap(), "gold");
        assert_eq!(eval("input.score + 1", &input).unwrap(), "83");
        assert_eq!(eval("input.missing", &input).unwrap(), "false");
    }

    #[test]
    fn floats_use_lua_formatting() {
        let input = json!({ "n": 4 });
        assert_eq!(eval("input.n / 2", &input).unwrap(), "2.0");
        assert_eq!(eval("3 / 2", &input).unwrap(), "1.5");
    }

    #[test]
    fn sandbox_hides_os_and_io() {
        assert!(eval("os.exit(1)", &Value::Null).is_err());
        assert!(eval("io.open('/etc/passwd')", &Value::Null).is_err());
        assert_eq!(eval("os == nil and io == nil", &Value::Null).unwrap(), "true");
    }

    #[test]
    fn tables_are_rejected() {
        let err = eval("{1, 2}", &Value::Null).unwrap_err();
        assert!(matches!(err, NodeError::Expression(msg) if msg.contains("table")));
    }

    #[test]
    fn runaway_allocation_hits_the_memory_limit() {
        let err = eval("string.rep('x', 64 * 1024 * 1024)", &Value::Null).unwrap_err();
        assert!(matches!(err, NodeError::Expression(_)));
    }

    #[test]
    fn infinite_loop_stops_when_cancelled() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            trigger.cancel();
        });

        let err = evaluate("(function() while true do end end)()", &Value::Null, &cancel).unwrap_err();
        assert!(matches!(err, NodeError::Cancelled));
        canceller.join().unwrap();
    }

    #[tokio::test]
    async fn output_is_the_input() {
        let invocation = NodeInvocation {
            execution_id: uuid::Uuid::new_v4(),
            node_id: "c".into(),
            kind: NodeKind::Condition,
            config: json!({ "expression": "input.ok" }).as_object().cloned().unwrap(),
            inputs: json!({ "ok": true }),
            trigger: TriggerKind::Manual,
            cancel: CancellationToken::new(),
        };

        let output = ConditionExecutor.execute(invocation).await.unwrap();
        assert_eq!(output.value, json!({ "ok": true }));
        assert_eq!(output.branch.as_deref(), Some("true"));
    }
}

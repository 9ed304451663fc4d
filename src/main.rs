/// Scenario engine command line
///
/// - `scenario-engine` runs schedule triggers until Ctrl-C
/// - `scenario-engine run <scenario_id> [input-json]` runs the active version once
///   and prints the execution record
/// - `scenario-engine import <scenario_id> <file.json>` stores and activates a new version

use anyhow::Result;
use clap::{Parser, Subcommand};
use scenario_engine::{app, config::Config, scenario::types::OrchestrationDefinition, ExecutionRequest};
use serde_json::Value;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "scenario-engine",
    about = "Orchestration engine for scenario graphs",
    version
)]
struct Cli {
    /// Without a subcommand, serve schedule triggers until Ctrl-C
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the active version of a scenario once and print the record
    Run {
        scenario_id: String,
        /// Caller input as a JSON document
        #[arg(value_parser = parse_json)]
        input: Option<Value>,
    },
    /// Store a definition file as a new active version
    Import {
        scenario_id: String,
        path: PathBuf,
    },
}

fn parse_json(raw: &str) -> Result<Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("invalid input JSON: {}", e))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let app = app::build(Config::default()).await?;

    match cli.command {
        None => app::serve(&app).await,
        Some(Command::Run { scenario_id, input }) => {
            let input = input.unwrap_or_else(|| serde_json::json!({}));
            let request = ExecutionRequest::manual(scenario_id, input, "cli");
            let record = app.engine.execute(request).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        Some(Command::Import { scenario_id, path }) => {
            let json = std::fs::read_to_string(&path)
                .map_err(|e| anyhow::anyhow!("Failed to read '{}': {}", path.display(), e))?;
            let definition = OrchestrationDefinition::from_json(&json)
                .map_err(|e| anyhow::anyhow!("Invalid definition in '{}': {}", path.display(), e))?;

            let version = app.registry.publish(&scenario_id, &definition, true).await?;
            tracing::info!("📦 Imported '{}' as version {}", scenario_id, version);
            println!("{}", version);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serde_json::json;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn no_subcommand_means_serve() {
        let cli = Cli::try_parse_from(["scenario-engine"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn run_parses_json_input() {
        let cli = Cli::try_parse_from(["scenario-engine", "run", "welcome", r#"{"msg":"hi"}"#]).unwrap();
        match cli.command {
            Some(Command::Run { scenario_id, input }) => {
                assert_eq!(scenario_id, "welcome");
                assert_eq!(input, Some(json!({ "msg": "hi" })));
            }
            other => panic!("expected run, got {:?}", other),
        }
    }

    #[test]
    fn run_rejects_malformed_input() {
        assert!(Cli::try_parse_from(["scenario-engine", "run", "welcome", "{nope"]).is_err());
    }

    #[test]
    fn import_takes_a_path() {
        let cli = Cli::try_parse_from(["scenario-engine", "import", "welcome", "flow.json"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Import { ref path, .. }) if path == &PathBuf::from("flow.json")
        ));
    }
}

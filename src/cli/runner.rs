//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands, OutputFormat};
use crate::config::{load_config, load_definition, AsyncStreamDefinition, ReadOptions};
use crate::error::{Error, Result};
use crate::message::{LogMessageRepository, MessageRepository};
use futures::TryStreamExt;
use serde_json::{json, Value};
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// CLI runner
pub struct Runner {
    cli: Cli,
    message_repository: Arc<dyn MessageRepository>,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self {
            cli,
            message_repository: Arc::new(LogMessageRepository),
        }
    }

    /// Use another sink for out-of-band messages
    #[must_use]
    pub fn with_message_repository(mut self, repository: Arc<dyn MessageRepository>) -> Self {
        self.message_repository = repository;
        self
    }

    /// Run the CLI command, writing to stdout
    pub async fn run(&self) -> Result<()> {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        self.run_with_output(&mut out).await
    }

    /// Run the CLI command, writing to `out`
    pub async fn run_with_output<W: Write>(&self, out: &mut W) -> Result<()> {
        match &self.cli.command {
            Commands::Read {
                test_read,
                polling_interval_secs,
            } => {
                let mut options = match test_read {
                    Some(max_slices) => ReadOptions::test_read(Some(*max_slices)),
                    None => ReadOptions::default(),
                };
                if let Some(secs) = polling_interval_secs {
                    options = options.with_polling_interval(Duration::from_secs(*secs));
                }
                self.read(&options, out).await
            }
            Commands::Validate => self.validate(out),
        }
    }

    /// Load the stream definition
    fn load_definition(&self) -> Result<AsyncStreamDefinition> {
        let path = self
            .cli
            .definition
            .as_ref()
            .ok_or_else(|| Error::config("No stream definition specified. Use --definition <path>"))?;
        load_definition(path)
    }

    /// Load config JSON
    fn load_config(&self) -> Result<Value> {
        // Inline config takes precedence
        if let Some(json_str) = &self.cli.config_json {
            return serde_json::from_str(json_str)
                .map_err(|e| Error::config(format!("Invalid config JSON: {e}")));
        }

        if let Some(path) = &self.cli.config {
            return load_config(path);
        }

        // Default empty config
        Ok(json!({}))
    }

    /// Run the bulk export
    async fn read<W: Write>(&self, options: &ReadOptions, out: &mut W) -> Result<()> {
        let definition = self.load_definition()?;
        let config = self.load_config()?;
        let retriever = definition.build(&config, Arc::clone(&self.message_repository), options)?;

        let start = Instant::now();
        let mut records = retriever.read_records()?;
        let mut count = 0u64;
        while let Some(record) = records.try_next().await? {
            self.output_message(
                out,
                &json!({
                    "type": "RECORD",
                    "record": {
                        "stream": definition.name,
                        "data": record,
                        "emitted_at": chrono::Utc::now().timestamp_millis(),
                    }
                }),
            )?;
            count += 1;
        }

        info!(stream = %definition.name, records = count, elapsed = ?start.elapsed(), "Bulk export finished");
        self.output_message(
            out,
            &json!({
                "type": "LOG",
                "log": {
                    "level": "INFO",
                    "message": format!("Read {} records from stream '{}'", count, definition.name)
                }
            }),
        )
    }

    /// Validate the definition and build it against the config
    fn validate<W: Write>(&self, out: &mut W) -> Result<()> {
        let definition = self.load_definition()?;
        let config = self.load_config()?;
        definition.build(
            &config,
            Arc::clone(&self.message_repository),
            &ReadOptions::default(),
        )?;

        self.output_message(
            out,
            &json!({
                "type": "LOG",
                "log": {
                    "level": "INFO",
                    "message": format!("Stream definition '{}' is valid", definition.name)
                }
            }),
        )
    }

    /// Output a message
    fn output_message<W: Write>(&self, out: &mut W, msg: &Value) -> Result<()> {
        let line = match self.cli.format {
            OutputFormat::Json => serde_json::to_string(msg)?,
            OutputFormat::Pretty => serde_json::to_string_pretty(msg)?,
        };
        writeln!(out, "{line}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write as _;

    const DEFINITION: &str = r#"
name: orders
http:
  base_url: https://api.example.com
  headers:
    Authorization: "Bearer {{ config.api_key }}"
creation:
  path: /exports
  method: POST
polling:
  path: "/exports/{{ creation_response.id }}"
download:
  path: "/exports/{{ creation_response.id }}/result"
status_mapping:
  running: [pending]
  completed: [done]
  failed: [error]
  timeout: [expired]
"#;

    fn definition_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(DEFINITION.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_validate_outputs_log() {
        let file = definition_file();
        let path = file.path().to_string_lossy().to_string();
        let cli = Cli::parse_from([
            "solidafy-bulk",
            "--definition",
            &path,
            "--config-json",
            r#"{"api_key": "k"}"#,
            "validate",
        ]);

        let mut out = Vec::new();
        Runner::new(cli).run_with_output(&mut out).await.unwrap();

        let line: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(line["type"], "LOG");
        assert_eq!(line["log"]["message"], "Stream definition 'orders' is valid");
    }

    #[tokio::test]
    async fn test_validate_missing_config_variable() {
        let file = definition_file();
        let path = file.path().to_string_lossy().to_string();
        let cli = Cli::parse_from(["solidafy-bulk", "--definition", &path, "validate"]);

        let err = Runner::new(cli)
            .run_with_output(&mut Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UndefinedVariable { .. }));
    }

    #[tokio::test]
    async fn test_missing_definition_argument() {
        let cli = Cli::parse_from(["solidafy-bulk", "validate"]);
        let err = Runner::new(cli)
            .run_with_output(&mut Vec::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("--definition"));
    }

    #[tokio::test]
    async fn test_invalid_inline_config() {
        let file = definition_file();
        let path = file.path().to_string_lossy().to_string();
        let cli = Cli::parse_from([
            "solidafy-bulk",
            "--definition",
            &path,
            "--config-json",
            "{not json",
            "validate",
        ]);
        let err = Runner::new(cli)
            .run_with_output(&mut Vec::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid config JSON"));
    }
}

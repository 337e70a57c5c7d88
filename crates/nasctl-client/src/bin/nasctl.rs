// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! nasctl - storage appliance management CLI
//!
//! Usage:
//!   nasctl [connection options] call <method> [params-json]
//!   nasctl [connection options] batch run <file|-> [--parallel] [--workers N] [--stop-on-error] [--dry-run]
//!   nasctl batch validate <file>
//!   nasctl batch sample [--output <file>] [--format yaml|json]

use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use nasctl_batch::{
    BatchEngine, BatchError, BatchFormat, BatchOptions, BatchSummary, ExecutorError, Operation,
    DEFAULT_MAX_WORKERS,
};
use nasctl_client::{ClientConfig, ClientError, Credentials, NasClient, RetryPolicy, with_retry};
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

/// Storage appliance management CLI
#[derive(Parser, Debug)]
#[command(name = "nasctl", version, about)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Enable debug logging.
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct ConnectionArgs {
    /// Appliance hostname or IP address.
    #[arg(long, env = "NASCTL_HOST", default_value = "localhost", global = true)]
    host: String,

    /// Appliance port.
    #[arg(long, env = "NASCTL_PORT", default_value_t = 443, global = true)]
    port: u16,

    /// Use plain ws:// instead of wss://.
    #[arg(long, global = true, default_value_t = false)]
    no_tls: bool,

    /// Accept any TLS certificate.
    #[arg(long, env = "NASCTL_SKIP_CERT_VERIFICATION", global = true, default_value_t = false)]
    insecure: bool,

    /// API key (preferred over username/password).
    #[arg(long, env = "NASCTL_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    #[arg(long, env = "NASCTL_USERNAME", global = true)]
    username: Option<String>,

    #[arg(long, env = "NASCTL_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,

    /// Attempts per call for connection and timeout failures.
    #[arg(long, default_value_t = 3, global = true)]
    attempts: u32,
}

impl ConnectionArgs {
    fn client_config(&self) -> Result<ClientConfig, ClientError> {
        let base = ClientConfig::from_env()?;
        let use_tls = base.use_tls && !self.no_tls;
        let skip_verify = base.skip_cert_verification || self.insecure;
        Ok(base
            .with_host(self.host.clone())
            .with_port(self.port)
            .with_tls(use_tls)
            .with_skip_cert_verification(skip_verify))
    }

    fn credentials(&self) -> Credentials {
        Credentials::new(
            self.api_key.clone(),
            self.username.clone(),
            self.password.clone(),
        )
    }

    fn retry_policy(&self) -> Result<RetryPolicy, ClientError> {
        let policy = RetryPolicy::default().with_max_attempts(self.attempts);
        policy.validate()?;
        Ok(policy)
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Invoke a single API method.
    Call {
        /// Method name, e.g. `system.info` or `pool.query`.
        method: String,
        /// Positional parameters as a JSON array.
        params: Option<String>,
    },
    /// Run many operations from a file.
    #[command(subcommand)]
    Batch(BatchCommand),
}

#[derive(Subcommand, Debug)]
enum BatchCommand {
    /// Execute a `.json`/`.yaml` batch file (`-` reads one JSON operation per
    /// line from stdin).
    Run {
        file: PathBuf,
        /// Run operations concurrently.
        #[arg(long, default_value_t = false)]
        parallel: bool,
        /// Concurrent operations in parallel mode.
        #[arg(long, default_value_t = DEFAULT_MAX_WORKERS)]
        workers: usize,
        /// Stop at the first failed operation (sequential mode only).
        #[arg(long, default_value_t = false)]
        stop_on_error: bool,
        /// Show the operations without executing them.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Check a batch file for structural problems.
    Validate { file: PathBuf },
    /// Write an example batch file.
    Sample {
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = SampleFormat::Yaml)]
        format: SampleFormat,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum SampleFormat {
    Yaml,
    Json,
}

impl From<SampleFormat> for BatchFormat {
    fn from(format: SampleFormat) -> Self {
        match format {
            SampleFormat::Yaml => BatchFormat::Yaml,
            SampleFormat::Json => BatchFormat::Json,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(default_level.into()))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code_for(&e))
        }
    }
}

fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<ClientError>())
        .map(ClientError::exit_code)
        .unwrap_or(1)
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Command::Call { method, params } => {
            let params = parse_params(params.as_deref())?;
            let policy = cli.connection.retry_policy()?;
            let credentials = cli.connection.credentials();
            let client = connect(&cli.connection).await?;

            let result = with_retry(&policy, || {
                client.authenticated_call(&credentials, &method, params.clone())
            })
            .await;
            client.disconnect().await;

            println!("{}", serde_json::to_string_pretty(&result?)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Batch(BatchCommand::Run {
            file,
            parallel,
            workers,
            stop_on_error,
            dry_run,
        }) => {
            let options = BatchOptions {
                parallel,
                max_workers: workers,
                stop_on_error,
            };
            // Reject bad flag combinations before touching the file or network
            let engine = BatchEngine::new(options)?;
            let operations = load_operations(&file)?;
            println!("Batch operations: {} operation(s)", operations.len());

            if dry_run {
                print_dry_run(&operations);
                return Ok(ExitCode::SUCCESS);
            }

            let policy = cli.connection.retry_policy()?;
            let credentials = cli.connection.credentials();
            let client = Arc::new(connect(&cli.connection).await?);
            let executor = {
                let client = client.clone();
                Arc::new(move |operation: Operation| {
                    let client = client.clone();
                    let policy = policy.clone();
                    let credentials = credentials.clone();
                    async move {
                        execute_operation(&client, &credentials, &policy, &operation)
                            .await
                            .map_err(ExecutorError::from_display)
                    }
                })
            };

            let results = engine.execute(operations, executor).await;
            client.disconnect().await;

            let summary = BatchSummary::from_results(&results);
            println!("{}", summary);
            Ok(if summary.all_succeeded() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Batch(BatchCommand::Validate { file }) => {
            let document = nasctl_batch::read_document(&file)?;
            let errors = nasctl_batch::validate_document(&document);
            if errors.is_empty() {
                let count = document["operations"].as_array().map_or(0, Vec::len);
                println!("{} is valid ({} operation(s))", file.display(), count);
                Ok(ExitCode::SUCCESS)
            } else {
                println!("{} has {} problem(s):", file.display(), errors.len());
                for error in errors {
                    println!("  - {}", error);
                }
                Ok(ExitCode::FAILURE)
            }
        }
        Command::Batch(BatchCommand::Sample { output, format }) => {
            let text = nasctl_batch::render_sample(format.into())?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &text)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Sample batch file written to {}", path.display());
                }
                None => {
                    let mut stdout = std::io::stdout().lock();
                    write!(stdout, "{}", text)?;
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn connect(args: &ConnectionArgs) -> Result<NasClient, ClientError> {
    let client = NasClient::new(args.client_config()?);
    client.ensure_authenticated(&args.credentials()).await?;
    Ok(client)
}

fn parse_params(raw: Option<&str>) -> Result<Vec<Value>, ClientError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(params)) => Ok(params),
        Ok(_) => Err(ClientError::Validation(
            "params must be a JSON array".to_string(),
        )),
        Err(e) => Err(ClientError::Validation(format!("params are not valid JSON: {}", e))),
    }
}

fn load_operations(file: &Path) -> Result<Vec<Operation>, BatchError> {
    if file == Path::new("-") {
        nasctl_batch::parse_json_lines(BufReader::new(std::io::stdin().lock()))
    } else {
        nasctl_batch::load_file(file)
    }
}

fn print_dry_run(operations: &[Operation]) {
    println!("Dry run mode - operations will not be executed");
    for (i, op) in operations.iter().enumerate() {
        println!("  {}. {} [{}]", i + 1, op.command, op.id);
        for (key, value) in &op.args {
            println!("     - {}: {}", key, value);
        }
    }
}

async fn execute_operation(
    client: &NasClient,
    credentials: &Credentials,
    policy: &RetryPolicy,
    operation: &Operation,
) -> Result<Value, ClientError> {
    let (method, params) = resolve_operation(operation)?;
    with_retry(policy, || {
        client.authenticated_call(credentials, &method, params.clone())
    })
    .await
}

const SUPPORTED_COMMANDS: &str = "dataset create, dataset list, snapshot create, \
                                  snapshot delete, snapshot list, pool list, call";

/// Map a batch command onto an API method and its positional params.
fn resolve_operation(operation: &Operation) -> Result<(String, Vec<Value>), ClientError> {
    let args = &operation.args;
    let words: Vec<&str> = operation.command.split_whitespace().collect();

    let (method, params) = match words.as_slice() {
        ["dataset", "create"] => {
            let name = first_str(args, &["name", "path"]).ok_or_else(|| {
                ClientError::Validation("dataset create requires 'name' or 'path' argument".into())
            })?;
            let mut data = Map::new();
            data.insert("name".into(), json!(name));
            data.insert(
                "type".into(),
                args.get("type").cloned().unwrap_or_else(|| json!("FILESYSTEM")),
            );
            copy_keys(args, &mut data, &["compression", "comments"]);
            ("pool.dataset.create".to_string(), vec![Value::Object(data)])
        }
        ["dataset", "list"] => {
            let filters = match first_str(args, &["pool"]) {
                Some(pool) => vec![json!(["pool", "=", pool])],
                None => Vec::new(),
            };
            ("pool.dataset.query".to_string(), vec![Value::Array(filters)])
        }
        ["snapshot", "create"] => {
            let (Some(dataset), Some(name)) =
                (first_str(args, &["dataset"]), first_str(args, &["snapshot_name"]))
            else {
                return Err(ClientError::Validation(
                    "snapshot create requires 'dataset' and 'snapshot_name' arguments".into(),
                ));
            };
            let mut data = Map::new();
            data.insert("dataset".into(), json!(dataset));
            data.insert("name".into(), json!(name));
            data.insert(
                "recursive".into(),
                args.get("recursive").cloned().unwrap_or(json!(false)),
            );
            copy_keys(args, &mut data, &["vmware_sync", "properties", "exclude"]);
            ("pool.snapshot.create".to_string(), vec![Value::Object(data)])
        }
        ["snapshot", "delete"] => {
            let id = first_str(args, &["snapshot_id", "snapshot"]).ok_or_else(|| {
                ClientError::Validation(
                    "snapshot delete requires 'snapshot_id' or 'snapshot' argument".into(),
                )
            })?;
            ("pool.snapshot.delete".to_string(), vec![json!(id)])
        }
        ["snapshot", "list"] => {
            let filters = match first_str(args, &["dataset"]) {
                Some(dataset) => vec![json!(["dataset", "=", dataset])],
                None => Vec::new(),
            };
            ("pool.snapshot.query".to_string(), vec![Value::Array(filters)])
        }
        ["pool", "list"] => ("pool.query".to_string(), vec![json!([])]),
        ["call"] => {
            let method = first_str(args, &["method"]).ok_or_else(|| {
                ClientError::Validation("call requires a 'method' argument".into())
            })?;
            let params = match args.get("params") {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(params)) => params.clone(),
                Some(_) => {
                    return Err(ClientError::Validation(
                        "call 'params' must be a list".into(),
                    ));
                }
            };
            (method.to_string(), params)
        }
        _ => {
            return Err(ClientError::Validation(format!(
                "Unknown command: '{}'. Supported commands: {}",
                operation.command, SUPPORTED_COMMANDS
            )));
        }
    };

    Ok((method, params))
}

fn first_str<'a>(args: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| args.get(*k).and_then(Value::as_str))
        .find(|v| !v.trim().is_empty())
}

fn copy_keys(from: &Map<String, Value>, to: &mut Map<String, Value>, keys: &[&str]) {
    for key in keys {
        if let Some(value) = from.get(*key) {
            to.insert((*key).to_string(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(command: &str, args: Value) -> Operation {
        let Value::Object(args) = args else {
            panic!("args must be an object");
        };
        Operation {
            id: "t".into(),
            command: command.into(),
            args,
        }
    }

    #[test]
    fn test_dataset_create_mapping() {
        let (method, params) = resolve_operation(&op(
            "dataset create",
            json!({"path": "tank/data", "compression": "lz4", "ignored": 1}),
        ))
        .unwrap();
        assert_eq!(method, "pool.dataset.create");
        assert_eq!(
            params,
            vec![json!({"name": "tank/data", "type": "FILESYSTEM", "compression": "lz4"})]
        );
    }

    #[test]
    fn test_list_mappings_build_filters() {
        let (method, params) =
            resolve_operation(&op("dataset list", json!({"pool": "tank"}))).unwrap();
        assert_eq!(method, "pool.dataset.query");
        assert_eq!(params, vec![json!([["pool", "=", "tank"]])]);

        let (method, params) = resolve_operation(&op("snapshot list", json!({}))).unwrap();
        assert_eq!(method, "pool.snapshot.query");
        assert_eq!(params, vec![json!([])]);

        let (method, _) = resolve_operation(&op("pool   list", json!({}))).unwrap();
        assert_eq!(method, "pool.query");
    }

    #[test]
    fn test_snapshot_mappings() {
        let (method, params) = resolve_operation(&op(
            "snapshot create",
            json!({"dataset": "tank/data", "snapshot_name": "nightly"}),
        ))
        .unwrap();
        assert_eq!(method, "pool.snapshot.create");
        assert_eq!(
            params,
            vec![json!({"dataset": "tank/data", "name": "nightly", "recursive": false})]
        );

        let (method, params) =
            resolve_operation(&op("snapshot delete", json!({"snapshot": "tank/data@nightly"})))
                .unwrap();
        assert_eq!(method, "pool.snapshot.delete");
        assert_eq!(params, vec![json!("tank/data@nightly")]);
    }

    #[test]
    fn test_call_passthrough() {
        let (method, params) = resolve_operation(&op(
            "call",
            json!({"method": "service.restart", "params": ["cifs"]}),
        ))
        .unwrap();
        assert_eq!(method, "service.restart");
        assert_eq!(params, vec![json!("cifs")]);
    }

    #[test]
    fn test_missing_arguments_and_unknown_commands() {
        for (command, args) in [
            ("dataset create", json!({})),
            ("snapshot create", json!({"dataset": "tank"})),
            ("snapshot delete", json!({})),
            ("call", json!({"params": []})),
            ("share create", json!({})),
        ] {
            let err = resolve_operation(&op(command, args)).unwrap_err();
            assert!(matches!(err, ClientError::Validation(_)), "{}", command);
        }
    }

    #[test]
    fn test_parse_params() {
        assert_eq!(parse_params(None).unwrap(), Vec::<Value>::new());
        assert_eq!(
            parse_params(Some(r#"["tank", {"limit": 1}]"#)).unwrap(),
            vec![json!("tank"), json!({"limit": 1})]
        );
        assert!(matches!(
            parse_params(Some(r#"{"not": "a list"}"#)),
            Err(ClientError::Validation(_))
        ));
        assert!(matches!(
            parse_params(Some("[")),
            Err(ClientError::Validation(_))
        ));
    }

    #[test]
    fn test_exit_codes_follow_client_errors() {
        let auth = anyhow::Error::new(ClientError::Authentication("denied".into()));
        assert_eq!(exit_code_for(&auth), 2);

        let config = anyhow::Error::new(ClientError::Configuration("no creds".into()))
            .context("while connecting");
        assert_eq!(exit_code_for(&config), 3);

        let other = anyhow::anyhow!("file not found");
        assert_eq!(exit_code_for(&other), 1);
    }

    #[test]
    fn test_cli_parses_batch_run() {
        let cli = Cli::try_parse_from([
            "nasctl",
            "--host",
            "nas.local",
            "--no-tls",
            "batch",
            "run",
            "ops.json",
            "--parallel",
            "--workers",
            "8",
        ])
        .unwrap();

        assert_eq!(cli.connection.host, "nas.local");
        assert!(cli.connection.no_tls);
        match cli.command {
            Command::Batch(BatchCommand::Run {
                file,
                parallel,
                workers,
                stop_on_error,
                dry_run,
            }) => {
                assert_eq!(file, PathBuf::from("ops.json"));
                assert!(parallel);
                assert_eq!(workers, 8);
                assert!(!stop_on_error);
                assert!(!dry_run);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_sample_format() {
        let cli = Cli::try_parse_from(["nasctl", "batch", "sample"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Batch(BatchCommand::Sample { format: SampleFormat::Yaml, output: None })
        ));

        let cli =
            Cli::try_parse_from(["nasctl", "batch", "sample", "--format", "json", "-o", "ops.json"])
                .unwrap();
        match cli.command {
            Command::Batch(BatchCommand::Sample { output, format }) => {
                assert_eq!(format, SampleFormat::Json);
                assert_eq!(BatchFormat::from(format), BatchFormat::Json);
                assert_eq!(output, Some(PathBuf::from("ops.json")));
            }
            other => panic!("unexpected command: {:?}", other),
        }

        assert!(Cli::try_parse_from(["nasctl", "batch", "sample", "--format", "toml"]).is_err());
    }
}

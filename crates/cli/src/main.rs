//! Fastbill CLI entry point.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Parse configuration** from flags, falling back to `FASTBILL_*`
//!    environment variables.
//! 2. **Wire observability**: install a `tracing-subscriber` formatter (plain
//!    or JSON) filtered by `RUST_LOG`. All spans and events emitted by the
//!    library crates flow through it.
//! 3. **Construct infrastructure**: an [`transport::HttpTransport`] injected
//!    into a [`protocol::Client`].
//! 4. **Run one call** and print the `RESPONSE` section as pretty JSON.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use protocol::{CallArgs, ClientConfig, Param, ProtocolError, DEFAULT_ENDPOINT, DEFAULT_TIMEOUT_SECS};
use serde_json::Value;
use tracing_subscriber::EnvFilter;
use transport::HttpTransport;

/// Call any Fastbill service by name.
///
/// The service is addressed by identifier: `customer_get` calls
/// `customer.get`.
#[derive(Debug, Parser)]
#[command(name = "fastbill", version)]
struct Cli {
    /// Service identifier, e.g. `customer_get` or `customer.get`.
    service: String,

    /// Filter object as JSON.
    #[arg(long, value_parser = parse_json)]
    filter: Option<Value>,

    /// Data object as JSON.
    #[arg(long, value_parser = parse_json)]
    data: Option<Value>,

    /// Maximum number of entities to return.
    #[arg(long)]
    limit: Option<u64>,

    /// Number of entities to skip.
    #[arg(long)]
    offset: Option<u64>,

    /// Account user (email address).
    #[arg(long, env = "FASTBILL_EMAIL")]
    email: String,

    /// Account API key.
    #[arg(long, env = "FASTBILL_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Service endpoint URL.
    #[arg(long, env = "FASTBILL_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Tag for this client instance, attached to every log span.
    #[arg(long, env = "FASTBILL_NAME")]
    name: Option<String>,

    /// Request timeout in seconds.
    #[arg(long, env = "FASTBILL_TIMEOUT", default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout: u64,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    fn config(&self) -> ClientConfig {
        let mut config = ClientConfig::new(&self.email, &self.api_key)
            .with_endpoint(&self.endpoint)
            .with_timeout_secs(self.timeout);
        if let Some(name) = &self.name {
            config = config.with_name(name);
        }
        config
    }

    fn call_args(&self) -> CallArgs {
        CallArgs {
            limit: self.limit,
            offset: self.offset,
            filter: self.filter.clone().map(Param::from),
            data: self.data.clone().map(Param::from),
        }
    }
}

fn parse_json(raw: &str) -> Result<Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("invalid JSON: {e}"))
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let config = cli.config();
    tracing::debug!(?config, service = %cli.service, "Starting call");
    let client = HttpTransport::client_builder(config)?
        .build()
        .context("invalid client configuration")?;

    match client.call(&cli.service, cli.call_args()) {
        Ok(response) => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(ProtocolError::RemoteRejection(rejection)) => {
            eprintln!("{} rejected the request:", rejection.service);
            for (error, field) in rejection.errors.iter().zip(rejection.broken_fields()) {
                eprintln!("  {error}  [{field}]");
            }
            Ok(ExitCode::from(2))
        }
        Err(err) => Err(err).with_context(|| format!("calling {}", cli.service)),
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);
    run(&cli)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_build_config_and_arguments() {
        let cli = Cli::try_parse_from([
            "fastbill",
            "customer_get",
            "--filter",
            r#"{"COUNTRY_CODE": "de"}"#,
            "--limit",
            "10",
            "--email",
            "fastbill@example.com",
            "--api-key",
            "4",
            "--name",
            "shop-de",
        ])
        .unwrap();

        let config = cli.config();
        assert_eq!(config.email, "fastbill@example.com");
        assert_eq!(config.name.as_deref(), Some("shop-de"));

        let args = cli.call_args();
        assert_eq!(args.limit, Some(10));
        assert_eq!(args.offset, None);
        assert_eq!(args.filter, Some(Param::map([("COUNTRY_CODE", "de")])));
        assert_eq!(args.data, None);
    }

    #[test]
    fn malformed_json_is_rejected_at_parse_time() {
        let result = Cli::try_parse_from([
            "fastbill",
            "customer_get",
            "--filter",
            "{not json",
            "--email",
            "fastbill@example.com",
            "--api-key",
            "4",
        ]);
        assert!(result.is_err());
    }
}

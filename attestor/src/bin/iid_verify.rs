//! Standalone EC2 instance identity document verifier.
//!
//! Runs one attestation through the same path the server uses and reports the
//! agent identity or the rejection.
//!
//! Usage:
//!   iid-verify --trust-domain example.org payload.json
//!   iid-verify --trust-domain example.org --config plugin.toml --format json payload.json
//!   iid-verify --trust-domain example.org --signing-cert aws-us-east-1.pem payload.json
//!
//! Exit code 0 = VALID, 1 = REJECTED, 2 = ERROR

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use iid_attestor::{
    AttestRequest, AttestationData, AttestorError, ConfigureRequest, GlobalConfig, Hooks,
    IidAttestorPlugin, TrustAnchor, PLUGIN_NAME,
};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "iid-verify",
    about = "Verify an AWS EC2 instance identity document attestation payload",
    long_about = "Check the payload signature against the AWS signing certificate, \
                  cross-check the instance with EC2 and print the agent SPIFFE ID. \
                  AWS credentials come from the config file, AWS_ACCESS_KEY_ID / \
                  AWS_SECRET_ACCESS_KEY, or the default provider chain."
)]
struct Args {
    /// Path to the attestation payload ({"document": ..., "signature": ...})
    payload: PathBuf,

    /// Trust domain the agent ID is issued in
    #[arg(long, env = "IID_TRUST_DOMAIN")]
    trust_domain: String,

    /// Plugin configuration file (TOML)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// AWS IID signing certificate (PEM) to use instead of the embedded one.
    /// Must be issued by AWS.
    #[arg(long)]
    signing_cert: Option<PathBuf>,

    /// Treat the document as already used by an attested agent
    #[arg(long)]
    attested_before: bool,

    #[arg(long, value_enum, default_value = "text")]
    format: Format,
}

#[derive(Serialize)]
struct Report {
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    spiffe_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(&args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(args: &Args) -> Result<ExitCode> {
    let configuration = match &args.config {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?,
        None => String::new(),
    };
    let payload = fs::read(&args.payload)
        .with_context(|| format!("Failed to read payload file {}", args.payload.display()))?;

    let trust_anchor = match &args.signing_cert {
        Some(path) => {
            let pem = fs::read(path).with_context(|| {
                format!("Failed to read signing certificate {}", path.display())
            })?;
            let anchor = TrustAnchor::from_aws_certificate_pem(&pem)
                .context("Invalid signing certificate")?;
            Some(anchor)
        }
        None => None,
    };

    let plugin = IidAttestorPlugin::with_hooks(Hooks {
        trust_anchor,
        ..Hooks::default()
    });
    plugin
        .configure(&ConfigureRequest {
            configuration,
            global_config: Some(GlobalConfig {
                trust_domain: args.trust_domain.clone(),
            }),
        })
        .context("Invalid plugin configuration")?;

    let outcome = plugin
        .attest(AttestRequest {
            attestation_data: Some(AttestationData {
                data_type: PLUGIN_NAME.to_string(),
                data: payload,
            }),
            attested_before: args.attested_before,
        })
        .await;

    let report = match outcome {
        Ok(resp) => Report {
            valid: resp.valid,
            spiffe_id: Some(resp.base_spiffe_id),
            error_code: None,
            error: None,
        },
        Err(e) => rejection(&e),
    };

    match args.format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        Format::Text => print_text_report(&report),
    }

    Ok(if report.valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn rejection(err: &AttestorError) -> Report {
    Report {
        valid: false,
        spiffe_id: None,
        error_code: Some(err.code()),
        error: Some(err.to_string()),
    }
}

fn print_text_report(report: &Report) {
    if report.valid {
        println!("VALID");
        if let Some(id) = &report.spiffe_id {
            println!("  agent ID: {}", id);
        }
        return;
    }
    println!("REJECTED");
    if let (Some(code), Some(error)) = (report.error_code, &report.error) {
        println!("  E{}: {}", code, error);
    }
}

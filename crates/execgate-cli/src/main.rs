//! execgate - governed command execution for agents
//!
//! ## Commands
//!
//! - `run`: execute one command through policy, approval and the runner
//! - `check`: show the policy verdict for a command without running it
//! - `serve`: execute NDJSON tool calls from stdin
//! - `schema`: print the exec tool descriptor
//! - `config`: print the effective configuration

mod prompt;
mod serve;
mod stdin;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use execgate_core::telemetry::{init_tracing, LogFormat};
use execgate_core::{
    descriptor, ApprovalMode, Approver, CommandRequest, ExecGovernor, GovernorConfig,
    StaticApprover, ToolResult, METRICS,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, Level};

#[derive(Parser)]
#[command(name = "execgate")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Policy-gated command execution for autonomous agents", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Config file (TOML if it ends in .toml, JSON otherwise)
    #[arg(long, global = true, env = "EXECGATE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a command through the governor
    Run {
        /// Working directory for the command
        #[arg(long)]
        cwd: Option<PathBuf>,

        /// Timeout in seconds (clamped to the configured maximum)
        #[arg(long)]
        timeout: Option<f64>,

        /// How to answer approval requests (default: from config)
        #[arg(long, value_enum)]
        approve: Option<ApproveArg>,

        /// Result format
        #[arg(long, value_enum, default_value = "text")]
        output: OutputFormat,

        /// Command and arguments
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        argv: Vec<String>,
    },

    /// Print the policy verdict for a command without running it
    Check {
        /// Working directory for the command
        #[arg(long)]
        cwd: Option<PathBuf>,

        /// Command and arguments
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        argv: Vec<String>,
    },

    /// Execute newline-delimited JSON tool calls read from stdin
    Serve {
        /// How to answer approval requests (stdin carries calls, so no prompt)
        #[arg(long, value_enum)]
        approve: Option<ApproveArg>,
    },

    /// Print the exec tool descriptor (name, label, parameter schema)
    Schema,

    /// Print the effective configuration as TOML
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ApproveArg {
    Prompt,
    Auto,
    Deny,
}

impl From<ApproveArg> for ApprovalMode {
    fn from(arg: ApproveArg) -> Self {
        match arg {
            ApproveArg::Prompt => ApprovalMode::Prompt,
            ApproveArg::Auto => ApprovalMode::AutoApprove,
            ApproveArg::Deny => ApprovalMode::AutoDeny,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(LogFormat::from_json_flag(cli.json), level);

    let config = load_config(cli.config.as_deref())?;

    let code = match cli.command {
        Commands::Run {
            cwd,
            timeout,
            approve,
            output,
            argv,
        } => cmd_run(config, cwd, timeout, approve, output, argv).await?,
        Commands::Check { cwd, argv } => {
            cmd_check(config, cwd, argv)?;
            ExitCode::SUCCESS
        }
        Commands::Serve { approve } => {
            let mode = approve.map(ApprovalMode::from).unwrap_or(config.approval_mode);
            if mode == ApprovalMode::Prompt {
                bail!("serve reads tool calls from stdin; use --approve auto or --approve deny");
            }
            let governor = ExecGovernor::new(config, static_approver(mode))
                .context("Invalid governor configuration")?;
            serve::cmd_serve(governor, ctrl_c_token()).await?;
            ExitCode::SUCCESS
        }
        Commands::Schema => {
            println!("{}", serde_json::to_string_pretty(&descriptor())?);
            ExitCode::SUCCESS
        }
        Commands::Config => {
            print!("{}", config.to_toml().context("Failed to render config")?);
            ExitCode::SUCCESS
        }
    };

    METRICS.flush();
    Ok(code)
}

fn load_config(path: Option<&std::path::Path>) -> Result<GovernorConfig> {
    let config = match path {
        Some(path) => GovernorConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => GovernorConfig::default(),
    };
    let config = config
        .with_env_overrides()
        .context("Invalid EXECGATE_* environment override")?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// A token cancelled by the first Ctrl-C.
fn ctrl_c_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("ctrl-c received, cancelling");
            trigger.cancel();
        }
    });
    cancel
}

fn static_approver(mode: ApprovalMode) -> Arc<dyn Approver> {
    match mode {
        ApprovalMode::AutoApprove => Arc::new(StaticApprover::approve_all()),
        _ => Arc::new(StaticApprover::deny_all("approvals are disabled (auto deny)")),
    }
}

fn build_request(argv: Vec<String>, cwd: Option<PathBuf>) -> Result<CommandRequest> {
    let mut argv = argv.into_iter();
    let Some(command) = argv.next() else {
        bail!("no command given");
    };
    let mut request = CommandRequest::new(format!("cli-{}", uuid::Uuid::new_v4()), command, argv);
    request.cwd = cwd;
    Ok(request)
}

async fn cmd_run(
    config: GovernorConfig,
    cwd: Option<PathBuf>,
    timeout: Option<f64>,
    approve: Option<ApproveArg>,
    output: OutputFormat,
    argv: Vec<String>,
) -> Result<ExitCode> {
    let mut request = build_request(argv, cwd)?;
    request.timeout_sec = timeout;

    let mode = approve.map(ApprovalMode::from).unwrap_or(config.approval_mode);
    let (approver, prompt_task) = match mode {
        ApprovalMode::Prompt => {
            let (approver, task) =
                prompt::prompt_approver().context("Failed to start approval prompt")?;
            (Arc::new(approver) as Arc<dyn Approver>, Some(task))
        }
        other => (static_approver(other), None),
    };

    let governor =
        ExecGovernor::new(config, approver).context("Invalid governor configuration")?;
    let result = governor.execute(request, ctrl_c_token()).await;
    if let Some(task) = prompt_task {
        task.abort();
    }

    match output {
        OutputFormat::Text => println!("{}", result.text()),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
    }
    Ok(ExitCode::from(exit_code(&result)))
}

/// Mirror the child's exit status when it exited on its own; 1 otherwise.
fn exit_code(result: &ToolResult) -> u8 {
    let d = &result.details;
    let exited = d.get("terminatedBy").and_then(|v| v.as_str()) == Some("none");
    match d.get("exitCode").and_then(|v| v.as_i64()) {
        Some(code) if exited => u8::try_from(code).unwrap_or(1),
        _ if result.error_kind().is_none() => 0,
        _ => 1,
    }
}

fn cmd_check(config: GovernorConfig, cwd: Option<PathBuf>, argv: Vec<String>) -> Result<()> {
    let request = build_request(argv, cwd)?;
    let governor = ExecGovernor::new(config, static_approver(ApprovalMode::AutoDeny))
        .context("Invalid governor configuration")?;
    let verdict = governor.check(&request).context("Invalid request")?;
    println!("{}", serde_json::to_string_pretty(&verdict)?);
    Ok(())
}

use anyhow::{bail, Context as _};
use clap::{Parser, Subcommand};
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::thread;
use tla_debugger::checker::Checker;
use tla_debugger::config::{
    DebuggerConfig, DisconnectPolicy, DEFAULT_INLINE_LIMIT, DEFAULT_MAX_CALL_DEPTH, EVALUATOR_STACK_SIZE,
};
use tla_debugger::console::run_console;
use tla_debugger::debugger::DebugSession;
use tla_debugger::eval::{Evaluator, NoopHook};
use tla_debugger::{dap, spec};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tla-debugger", version, about = "Step through the evaluation of a specification")]
struct Cli {
    /// Write logs to this file instead of stderr. Filter with TLA_DEBUGGER_LOG.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the Debug Adapter Protocol on stdin/stdout.
    Dap {
        /// Applied when the client disconnects without naming a policy.
        #[arg(long, value_enum, default_value_t = DisconnectPolicy::Release)]
        disconnect_policy: DisconnectPolicy,
    },
    /// Debug a spec document from the terminal.
    Debug {
        spec: PathBuf,
        /// Breakpoint as MODULE:LINE. Repeatable.
        #[arg(long = "break", value_name = "MODULE:LINE")]
        breakpoints: Vec<String>,
        #[arg(long)]
        no_stop_on_entry: bool,
        #[arg(long, value_enum, default_value_t = DisconnectPolicy::Release)]
        disconnect_policy: DisconnectPolicy,
        #[arg(long, default_value_t = DEFAULT_INLINE_LIMIT)]
        inline_limit: usize,
        /// Nested operator calls allowed before evaluation fails.
        #[arg(long, default_value_t = DEFAULT_MAX_CALL_DEPTH)]
        max_call_depth: usize,
    },
    /// Check a spec document without the debugger.
    Check {
        spec: PathBuf,
        #[arg(long, default_value_t = DEFAULT_MAX_CALL_DEPTH)]
        max_call_depth: usize,
    },
}

fn init_logging(log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env("TLA_DEBUGGER_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init(),
    }
    Ok(())
}

fn parse_breakpoint(text: &str) -> anyhow::Result<(String, u32)> {
    let Some((module, line)) = text.rsplit_once(':') else {
        bail!("breakpoint `{}` is not of the form MODULE:LINE", text);
    };
    let line = line
        .parse()
        .with_context(|| format!("breakpoint `{}` has an invalid line", text))?;
    Ok((module.to_string(), line))
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref())?;
    info!(version = env!("CARGO_PKG_VERSION"), "tla-debugger started");

    match cli.command {
        Command::Dap { disconnect_policy } => {
            dap::run_dap_mode(disconnect_policy)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Debug {
            spec,
            breakpoints,
            no_stop_on_entry,
            disconnect_policy,
            inline_limit,
            max_call_depth,
        } => {
            let spec = Arc::new(spec::load_file(&spec)?);
            let config = DebuggerConfig::new(disconnect_policy)
                .with_stop_on_entry(!no_stop_on_entry)
                .with_inline_limit(inline_limit)
                .with_max_call_depth(max_call_depth);
            let mut session = DebugSession::new(spec, config);
            for text in &breakpoints {
                let (module, line) = parse_breakpoint(text)?;
                session.add_breakpoint(&module, line)?;
            }
            let stdin = io::stdin();
            let verdict = run_console(&mut session, stdin.lock(), &mut io::stdout())?;
            Ok(exit_code(verdict.map_or(false, |v| v.is_success())))
        }
        Command::Check { spec, max_call_depth } => {
            let spec = Arc::new(spec::load_file(&spec)?);
            let evaluator = Arc::new(Evaluator::new(spec, Arc::new(NoopHook)).with_max_call_depth(max_call_depth));
            let verdict = thread::Builder::new()
                .name("evaluator".to_string())
                .stack_size(EVALUATOR_STACK_SIZE)
                .spawn(move || Checker::new(evaluator).run())
                .context("cannot start the evaluator thread")?
                .join()
                .map_err(|_| anyhow::anyhow!("the evaluator thread panicked"))?;
            println!("{}", verdict);
            Ok(exit_code(verdict.is_success()))
        }
    }
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

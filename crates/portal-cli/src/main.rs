// Copyright 2025 Portal Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Portal CLI Entry Point
//!
//! ## Usage
//!
//! ```bash
//! # Start an executor server
//! portal serve -b 127.0.0.1:7700
//!
//! # Run a script file remotely (outputs raw JSON)
//! portal run 127.0.0.1:7700 script.js
//!
//! # Add a function from a file and call it
//! portal call 127.0.0.1:7700 add.js add -a '[2, 3]'
//!
//! # Run a script without any network
//! portal eval script.js
//! ```

use anyhow::Result;
use argh::FromArgs;
use portal_executor::ExecutorConfig;
use std::time::Duration;

#[derive(FromArgs)]
/// Portal - async RPC bridge with an embedded JavaScript executor
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
    Run(RunArgs),
    Call(CallArgs),
    Eval(EvalArgs),
}

/// Arguments for starting an executor server.
///
/// Every accepted connection gets its own executor, so functions added by
/// one peer are invisible to the others.
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// accept connections and execute what peers send
struct ServeArgs {
    /// address to bind to
    #[argh(option, short = 'b', default = "\"127.0.0.1:7700\".into()")]
    bind: String,

    /// idle re-check interval for pending script promises, in milliseconds
    #[argh(option, long = "poll-interval-ms", default = "100")]
    poll_interval_ms: u64,

    /// nesting depth after which results are rejected as cyclic
    #[argh(option, long = "max-depth", default = "256")]
    max_depth: usize,

    /// do not give scripts a `console` object
    #[argh(switch, long = "no-console")]
    no_console: bool,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "run")]
/// run a script file on a remote executor
struct RunArgs {
    /// address of the executor
    #[argh(positional)]
    server_address: String,

    /// path to the script file; its body runs as a strict-mode function
    #[argh(positional)]
    script: String,

    /// connect timeout in milliseconds
    #[argh(option, long = "timeout-ms", default = "5000")]
    timeout_ms: u64,
}

/// Arguments for calling a function on a remote executor.
///
/// The function is added from its source file first, then invoked. Arguments
/// are a JSON array, one element per parameter.
///
/// ```bash
/// echo '(a, b) => a + b' > add.js
/// portal call 127.0.0.1:7700 add.js add -a '[2, 3]'
/// ```
#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// add a function from a file and call it remotely
struct CallArgs {
    /// address of the executor
    #[argh(positional)]
    server_address: String,

    /// path to a file holding a single function expression
    #[argh(positional)]
    function: String,

    /// name to register the function under
    #[argh(positional)]
    name: String,

    /// JSON array of arguments
    #[argh(option, short = 'a', long = "args", default = "\"[]\".into()")]
    args: String,

    /// connect timeout in milliseconds
    #[argh(option, long = "timeout-ms", default = "5000")]
    timeout_ms: u64,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "eval")]
/// run a script file through an in-process bridge
struct EvalArgs {
    /// path to the script file
    #[argh(positional)]
    script: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Keep stdout clean for the one-shot commands
    if matches!(cli.command, Commands::Serve(_)) {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    match cli.command {
        Commands::Serve(args) => run_serve(args).await,
        Commands::Run(args) => {
            let script = portal_cli::read_source(&args.script)?;
            let result = portal_cli::run_remote(
                &args.server_address,
                &script,
                Duration::from_millis(args.timeout_ms),
            )
            .await?;
            println!("{}", portal_cli::render(&result)?);
            Ok(())
        }
        Commands::Call(args) => {
            let source = portal_cli::read_source(&args.function)?;
            let params = portal_cli::parse_params(&args.args)?;
            let result = portal_cli::call_remote(
                &args.server_address,
                &args.name,
                &source,
                params,
                Duration::from_millis(args.timeout_ms),
            )
            .await?;
            println!("{}", portal_cli::render(&result)?);
            Ok(())
        }
        Commands::Eval(args) => {
            let script = portal_cli::read_source(&args.script)?;
            let result = portal_cli::eval_local(&script, ExecutorConfig::default()).await?;
            println!("{}", portal_cli::render(&result)?);
            Ok(())
        }
    }
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let config = ExecutorConfig::new()
        .with_poll_interval(Duration::from_millis(args.poll_interval_ms))
        .with_max_depth(args.max_depth)
        .with_console(!args.no_console);

    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind {}: {}", args.bind, e))?;

    let local = tokio::task::LocalSet::new();
    local.run_until(portal_cli::serve(listener, config)).await
}

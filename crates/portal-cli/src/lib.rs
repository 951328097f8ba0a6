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

//! # Portal CLI
//!
//! Command-line front end for the Portal RPC bridge.
//!
//! The `portal` binary wires the two bridge roles to real endpoints:
//!
//! - **Serving**: every accepted TCP connection gets its own listening
//!   executor, with its own engine and function registry
//! - **Client sessions**: an initiator connected to a remote executor runs a
//!   script file, or adds a function from a file and calls it
//! - **Local evaluation**: an in-process initiator/executor pair, no network
//!
//! ## Key Commands
//!
//! - `portal serve`: Accept connections and execute what peers send
//! - `portal run`: Run a script file on a remote executor
//! - `portal call`: Add a function from a file and invoke it remotely
//! - `portal eval`: Run a script file through an in-process bridge
//!
//! Results are printed as plain JSON on stdout, so the output can be piped to
//! tools such as `jq`.

pub mod server;
pub mod session;

use anyhow::{Context, Result};
use portal_common::ResolvedValue;
use std::path::Path;

pub use server::{serve, serve_connection};
pub use session::{call_remote, eval_local, run_remote};

/// Reads a script or function source file.
pub fn read_source(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read source file {}", path.display()))
}

/// Parses the `--args` option of `portal call`.
///
/// The value must be a JSON array; each element becomes one positional
/// argument.
pub fn parse_params(json: &str) -> Result<Vec<ResolvedValue>> {
    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| anyhow::anyhow!("Invalid JSON in args: {}", e))?;

    match value {
        serde_json::Value::Array(items) => {
            Ok(items.into_iter().map(ResolvedValue::from_json).collect())
        }
        other => Err(anyhow::anyhow!(
            "Arguments must be a JSON array, got: {}",
            other
        )),
    }
}

/// Renders a result as a single line of JSON.
pub fn render(value: &ResolvedValue) -> Result<String> {
    Ok(serde_json::to_string(&value.to_json())?)
}

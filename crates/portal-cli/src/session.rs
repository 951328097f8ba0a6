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

//! One-shot initiator sessions used by `run`, `call` and `eval`.

use anyhow::Result;
use portal_common::transport::{self, channel};
use portal_common::ResolvedValue;
use portal_executor::{Executor, ExecutorConfig};
use portal_initiator::Initiator;
use std::time::Duration;
use tokio::task::LocalSet;

async fn connect(addr: &str, timeout: Duration) -> Result<Initiator> {
    let (transport, inbox) = transport::connect(addr, timeout).await?;
    let initiator = Initiator::new(transport);
    initiator.listen(inbox);
    tracing::debug!("Connected to executor at {}", addr);
    Ok(initiator)
}

/// Runs `script` on the executor at `addr`.
pub async fn run_remote(addr: &str, script: &str, timeout: Duration) -> Result<ResolvedValue> {
    let initiator = connect(addr, timeout).await?;
    Ok(initiator.run_script(script).await?)
}

/// Adds `function_source` as `name` on the executor at `addr`, then calls it
/// with `params`.
pub async fn call_remote(
    addr: &str,
    name: &str,
    function_source: &str,
    params: Vec<ResolvedValue>,
    timeout: Duration,
) -> Result<ResolvedValue> {
    let initiator = connect(addr, timeout).await?;
    initiator.add_function(name, function_source).await?;
    Ok(initiator.run_function(name, params).await?)
}

/// Runs `script` through an in-process initiator/executor pair.
pub async fn eval_local(script: &str, config: ExecutorConfig) -> Result<ResolvedValue> {
    let ((initiator_side, replies), (executor_side, requests)) = channel::duplex();
    let executor = Executor::with_config(executor_side, config)?;
    executor.start();

    let initiator = Initiator::new(initiator_side);
    let listener = initiator.listen(replies);

    let local = LocalSet::new();
    let result = local
        .run_until(async move {
            let serving = executor.clone();
            let server = tokio::task::spawn_local(async move { serving.serve(requests).await });
            let result = initiator.run_script(script).await;
            executor.stop();
            server.abort();
            result
        })
        .await;

    listener.abort();
    Ok(result?)
}

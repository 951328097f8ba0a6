//! JavaScript bindings for scripts run by the executor
//!
//! The only native object exposed to scripts is `console`. Its output goes to
//! `tracing` under the `portal::script` target; it is not captured or sent to
//! the initiator.
//!
//! # JavaScript API
//!
//! - `console.log(...args)` / `console.info(...args)` - `INFO` events
//! - `console.warn(...args)` - `WARN` events
//! - `console.error(...args)` - `ERROR` events
//! - `console.debug(...args)` - `DEBUG` events

use boa_engine::{
    js_string,
    native_function::NativeFunction,
    object::{FunctionObjectBuilder, JsObject},
    property::Attribute,
    value::JsValue,
    Context,
};
use portal_common::protocol::error::{BridgeError, Result};
use portal_common::protocol::ResolvedValue;

use crate::runtime::conversions::to_plain;

/// Target of every event emitted by script `console` calls.
pub const SCRIPT_LOG_TARGET: &str = "portal::script";

/// Nesting shown when logging objects.
const LOG_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConsoleLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Renders console arguments the way browsers join them: strings verbatim,
/// everything else in its value form, separated by spaces.
fn format_args(args: &[JsValue], ctx: &mut Context) -> String {
    args.iter()
        .map(|arg| match to_plain(arg, ctx, LOG_DEPTH) {
            ResolvedValue::String(s) => s,
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn emit(level: ConsoleLevel, line: &str) {
    match level {
        ConsoleLevel::Debug => tracing::debug!(target: SCRIPT_LOG_TARGET, "{}", line),
        ConsoleLevel::Info => tracing::info!(target: SCRIPT_LOG_TARGET, "{}", line),
        ConsoleLevel::Warn => tracing::warn!(target: SCRIPT_LOG_TARGET, "{}", line),
        ConsoleLevel::Error => tracing::error!(target: SCRIPT_LOG_TARGET, "{}", line),
    }
}

/// Install the `console` global into the context.
///
/// # Errors
///
/// Returns an error if setting the properties or registering the global fails.
pub(crate) fn install_console(ctx: &mut Context) -> Result<()> {
    let console = JsObject::with_object_proto(ctx.intrinsics());

    let methods = [
        ("log", ConsoleLevel::Info),
        ("info", ConsoleLevel::Info),
        ("warn", ConsoleLevel::Warn),
        ("error", ConsoleLevel::Error),
        ("debug", ConsoleLevel::Debug),
    ];

    for (name, level) in methods {
        let function = FunctionObjectBuilder::new(
            ctx.realm(),
            NativeFunction::from_copy_closure(move |_this, args, context| {
                let line = format_args(args, context);
                emit(level, &line);
                Ok(JsValue::undefined())
            }),
        )
        .name(js_string!(name))
        .length(0)
        .build();

        console
            .set(js_string!(name), function, false, ctx)
            .map_err(|e| BridgeError::Engine(e.to_string()))?;
    }

    ctx.register_global_property(js_string!("console"), console, Attribute::all())
        .map_err(|e| BridgeError::Engine(e.to_string()))?;

    Ok(())
}

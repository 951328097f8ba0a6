//! The executor's script engine
//!
//! [`Engine`] owns one Boa context and its job queue. Every operation borrows
//! the context for its synchronous part only; the context is never borrowed
//! across an await point, so handlers running as separate local tasks share
//! it sequentially.
//!
//! Results are handed out as [`Resolvable`]s:
//!
//! | JavaScript | Resolvable |
//! |------------|------------|
//! | primitive | `Literal` |
//! | Promise | `Pending`, settled by draining the job queue |
//! | function | `Callable`, invoked with no arguments |
//! | Array | `Sequence` |
//! | other object | `Structure` of its own enumerable string keys |
//! | symbol, bigint | `Unrecognized` |

use boa_engine::{
    builtins::promise::PromiseState,
    js_string,
    object::{builtins::JsPromise, JsObject},
    value::JsValue,
    Context, JsError, JsNativeError, JsResult, Source,
};
use portal_common::protocol::error::{BridgeError, Result};
use portal_common::protocol::{ErrorPayload, ResolvedValue};
use portal_common::Resolvable;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::Notify;

use crate::config::ExecutorConfig;
use crate::runtime::bindings;
use crate::runtime::conversions::{
    array_elements, error_from_js, own_keys, primitive_to_resolved, resolved_to_js,
    unrecognized_kind,
};
use crate::runtime::job_executor::JobQueue;

/// Kind reported when a result nests deeper than the configured maximum.
pub const CYCLIC_KIND: &str = "cyclic or too deeply nested object";

/// A Boa context plus its job queue.
pub struct Engine {
    context: RefCell<Context>,
    jobs: Rc<JobQueue>,
    /// Fired after anything ran in the context; wakes pending promises.
    progress: Notify,
    poll_interval: Duration,
    max_depth: usize,
}

impl Engine {
    pub fn new(config: &ExecutorConfig) -> Result<Rc<Self>> {
        let jobs = Rc::new(JobQueue::new());
        let mut context = Context::builder()
            .job_executor(jobs.clone())
            .build()
            .map_err(|e| BridgeError::Engine(format!("Failed to create context: {}", e)))?;

        if config.install_console {
            bindings::install_console(&mut context)?;
        }

        Ok(Rc::new(Self {
            context: RefCell::new(context),
            jobs,
            progress: Notify::new(),
            poll_interval: config.poll_interval,
            max_depth: config.max_depth,
        }))
    }

    /// Compiles `script` as a strict-mode function body and calls it with an
    /// `undefined` receiver. `return` is allowed; globals (including added
    /// functions) are visible.
    pub fn run_script(self: &Rc<Self>, script: &str) -> Result<Resolvable> {
        let mut guard = self.context.borrow_mut();
        let ctx = &mut *guard;

        let outcome = compile_body(script, ctx)
            .and_then(|function| function.call(&JsValue::undefined(), &[], ctx));
        self.settle_jobs(ctx);

        let value = outcome.map_err(|e| error_from_js(e, ctx))?;
        self.to_resolvable(value, ctx, 0)
    }

    /// Evaluates `source` as an expression and binds the result as the global
    /// `name`, replacing any previous binding.
    pub fn define_global(&self, name: &str, source: &str) -> Result<()> {
        let mut guard = self.context.borrow_mut();
        let ctx = &mut *guard;

        let expression = format!("({}\n)", source);
        let value = ctx
            .eval(Source::from_bytes(&expression))
            .map_err(|e| error_from_js(e, ctx))?;

        ctx.global_object()
            .set(js_string!(name), value, true, ctx)
            .map_err(|e| error_from_js(e, ctx))?;
        self.settle_jobs(ctx);

        Ok(())
    }

    /// Calls the global `name` with `args`, passed as typed engine values.
    pub fn call_global(self: &Rc<Self>, name: &str, args: &[ResolvedValue]) -> Result<Resolvable> {
        let mut guard = self.context.borrow_mut();
        let ctx = &mut *guard;

        let target = ctx
            .global_object()
            .get(js_string!(name), ctx)
            .map_err(|e| error_from_js(e, ctx))?;
        let function = target
            .as_object()
            .filter(|f| f.is_callable())
            .ok_or_else(|| {
                BridgeError::Remote(ErrorPayload::exception(
                    "TypeError",
                    format!("{} is not a function", name),
                ))
            })?
            .clone();

        let args = args
            .iter()
            .map(|arg| resolved_to_js(arg, ctx))
            .collect::<Result<Vec<_>>>()?;

        let outcome = function.call(&JsValue::undefined(), &args, ctx);
        self.settle_jobs(ctx);

        let value = outcome.map_err(|e| error_from_js(e, ctx))?;
        self.to_resolvable(value, ctx, 0)
    }

    /// Maps an engine value onto the resolver's model.
    ///
    /// Arrays and objects are read eagerly; promises and functions capture the
    /// engine and touch the context only when the resolver reaches them.
    pub fn to_resolvable(
        self: &Rc<Self>,
        value: JsValue,
        ctx: &mut Context,
        depth: usize,
    ) -> Result<Resolvable> {
        if let Some(primitive) = primitive_to_resolved(&value) {
            return Ok(Resolvable::Literal(primitive));
        }
        if let Some(kind) = unrecognized_kind(&value) {
            return Ok(Resolvable::Unrecognized(kind.to_string()));
        }
        let Some(obj) = value.as_object() else {
            return Ok(Resolvable::Unrecognized("unknown".to_string()));
        };
        let obj = obj.clone();

        if depth >= self.max_depth {
            return Ok(Resolvable::Unrecognized(CYCLIC_KIND.to_string()));
        }

        if let Ok(promise) = JsPromise::from_object(obj.clone()) {
            return Ok(self.pending(promise, depth));
        }

        if obj.is_callable() {
            return Ok(self.callable(obj, depth));
        }

        if obj.is_array() {
            let items = array_elements(&obj, ctx)?
                .into_iter()
                .map(|element| self.to_resolvable(element, ctx, depth + 1))
                .collect::<Result<Vec<_>>>()?;
            return Ok(Resolvable::Sequence(items));
        }

        let keys = own_keys(&obj, ctx)?;
        let mut fields = Vec::with_capacity(keys.len());
        for key in keys {
            let field = obj
                .get(js_string!(key.as_str()), ctx)
                .map_err(|e| error_from_js(e, ctx))?;
            let field = self.to_resolvable(field, ctx, depth + 1)?;
            fields.push((key, field));
        }
        Ok(Resolvable::Structure(fields))
    }

    /// Drains the job queue and wakes every pending promise, since the code
    /// that just ran may have settled one directly.
    fn settle_jobs(&self, ctx: &mut Context) {
        self.jobs.run_until_idle(ctx);
        self.progress.notify_waiters();
    }

    fn pending(self: &Rc<Self>, promise: JsPromise, depth: usize) -> Resolvable {
        let engine = Rc::clone(self);
        Resolvable::pending(async move {
            loop {
                // Registered while the context is borrowed, so no progress
                // can slip in between the state check and the wait.
                let (progress, backlog) = {
                    let mut guard = engine.context.borrow_mut();
                    let ctx = &mut *guard;
                    if engine.jobs.run_until_idle(ctx) > 0 {
                        engine.progress.notify_waiters();
                    }

                    match promise.state() {
                        PromiseState::Pending => {}
                        PromiseState::Fulfilled(value) => {
                            return engine.to_resolvable(value, ctx, depth + 1);
                        }
                        PromiseState::Rejected(reason) => {
                            return Err(error_from_js(JsError::from_opaque(reason), ctx));
                        }
                    }
                    (engine.progress.notified(), engine.jobs.has_pending_jobs())
                };

                if backlog {
                    tokio::task::yield_now().await;
                    continue;
                }
                tokio::select! {
                    _ = progress => {}
                    _ = tokio::time::sleep(engine.poll_interval) => {}
                }
            }
        })
    }

    fn callable(self: &Rc<Self>, function: JsObject, depth: usize) -> Resolvable {
        let engine = Rc::clone(self);
        Resolvable::fallible(move || {
            let mut guard = engine.context.borrow_mut();
            let ctx = &mut *guard;

            let outcome = function.call(&JsValue::undefined(), &[], ctx);
            engine.settle_jobs(ctx);

            let value = outcome.map_err(|e| error_from_js(e, ctx))?;
            engine.to_resolvable(value, ctx, depth + 1)
        })
    }
}

/// Builds a function from `script` through the global `Function`
/// constructor, the way `new Function(body)` does.
fn compile_body(script: &str, ctx: &mut Context) -> JsResult<JsObject> {
    let constructor = ctx.global_object().get(js_string!("Function"), ctx)?;
    let constructor = constructor
        .as_object()
        .filter(|c| c.is_callable())
        .ok_or_else(|| JsNativeError::typ().with_message("Function constructor is unavailable"))?
        .clone();

    let body = format!("\"use strict\";\n{}", script);
    let function = constructor.call(
        &JsValue::undefined(),
        &[JsValue::new(js_string!(body.as_str()))],
        ctx,
    )?;

    let function = function
        .as_object()
        .ok_or_else(|| JsNativeError::typ().with_message("Function constructor returned a non-object"))?
        .clone();
    Ok(function)
}

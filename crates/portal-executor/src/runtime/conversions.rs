//! Wire value <-> JavaScript value conversions
//!
//! Arguments arrive as [`ResolvedValue`]s and are turned into engine values
//! directly, so strings stay strings and no source text is ever spliced.
//! Results take the other road through
//! [`Engine::to_resolvable`](super::engine::Engine::to_resolvable); this
//! module only holds the synchronous pieces of that mapping.
//!
//! # Type Mapping
//!
//! | ResolvedValue | JavaScript |
//! |---------------|------------|
//! | Undefined | undefined |
//! | Null | null |
//! | Bool | Boolean |
//! | Number | Number (NaN and infinities included) |
//! | String | String |
//! | Array | Array |
//! | Object | plain Object |

use boa_engine::{
    js_string,
    object::{builtins::JsArray, JsObject},
    value::JsValue,
    Context, JsError,
};
use portal_common::protocol::error::{BridgeError, Result};
use portal_common::protocol::{ErrorPayload, ResolvedValue};

/// Convert a wire value into an engine value.
pub fn resolved_to_js(value: &ResolvedValue, ctx: &mut Context) -> Result<JsValue> {
    match value {
        ResolvedValue::Undefined => Ok(JsValue::undefined()),
        ResolvedValue::Null => Ok(JsValue::null()),
        ResolvedValue::Bool(b) => Ok(JsValue::new(*b)),
        ResolvedValue::Number(n) => Ok(JsValue::new(*n)),
        ResolvedValue::String(s) => Ok(JsValue::new(js_string!(s.as_str()))),
        ResolvedValue::Array(items) => {
            let js_array = JsArray::new(ctx);
            for (i, item) in items.iter().enumerate() {
                let js_value = resolved_to_js(item, ctx)?;
                js_array.push(js_value, ctx).map_err(|e| {
                    BridgeError::Engine(format!("Failed to push array element {}: {}", i, e))
                })?;
            }
            Ok(js_array.into())
        }
        ResolvedValue::Object(fields) => {
            let js_obj = JsObject::with_object_proto(ctx.intrinsics());
            for (key, field) in fields {
                let js_value = resolved_to_js(field, ctx)?;
                js_obj
                    .create_data_property_or_throw(js_string!(key.as_str()), js_value, ctx)
                    .map_err(|e| {
                        BridgeError::Engine(format!("Failed to set property '{}': {}", key, e))
                    })?;
            }
            Ok(js_obj.into())
        }
    }
}

/// Maps primitive engine values; `None` for objects, symbols and bigints.
pub fn primitive_to_resolved(value: &JsValue) -> Option<ResolvedValue> {
    if value.is_undefined() {
        return Some(ResolvedValue::Undefined);
    }
    if value.is_null() {
        return Some(ResolvedValue::Null);
    }
    if let Some(b) = value.as_boolean() {
        return Some(ResolvedValue::Bool(b));
    }
    if let Some(n) = value.as_number() {
        return Some(ResolvedValue::Number(n));
    }
    if let Some(s) = value.as_string() {
        return Some(ResolvedValue::String(s.to_std_string_escaped()));
    }
    None
}

/// The kind reported for values the resolver cannot handle.
pub fn unrecognized_kind(value: &JsValue) -> Option<&'static str> {
    if value.is_symbol() {
        Some("symbol")
    } else if value.is_bigint() {
        Some("bigint")
    } else {
        None
    }
}

/// Own enumerable string keys of `obj`, as `Object.keys` reports them.
pub fn own_keys(obj: &JsObject, ctx: &mut Context) -> Result<Vec<String>> {
    let object_ctor = ctx
        .global_object()
        .get(js_string!("Object"), ctx)
        .map_err(|e| BridgeError::Engine(e.to_string()))?;
    let keys_fn = object_ctor
        .as_object()
        .map(|o| o.get(js_string!("keys"), ctx))
        .transpose()
        .map_err(|e| BridgeError::Engine(e.to_string()))?
        .ok_or_else(|| BridgeError::Engine("Object.keys is unavailable".into()))?;
    let keys_fn = keys_fn
        .as_object()
        .filter(|f| f.is_callable())
        .ok_or_else(|| BridgeError::Engine("Object.keys is not callable".into()))?
        .clone();

    let keys = keys_fn
        .call(&JsValue::undefined(), &[obj.clone().into()], ctx)
        .map_err(|e| error_from_js(e, ctx))?;
    let keys = keys
        .as_object()
        .and_then(|o| JsArray::from_object(o.clone()).ok())
        .ok_or_else(|| BridgeError::Engine("Object.keys did not return an array".into()))?;

    let length: usize = keys
        .length(ctx)
        .map_err(|e| BridgeError::Engine(format!("Failed to get key count: {}", e)))?
        .try_into()
        .map_err(|_| BridgeError::Engine("Key count overflow".into()))?;
    let mut result = Vec::with_capacity(length);
    for i in 0..length {
        let key = keys
            .get(i, ctx)
            .map_err(|e| BridgeError::Engine(format!("Failed to get key {}: {}", i, e)))?;
        if let Some(s) = key.as_string() {
            result.push(s.to_std_string_escaped());
        }
    }
    Ok(result)
}

/// Elements of an array object, in index order.
pub fn array_elements(obj: &JsObject, ctx: &mut Context) -> Result<Vec<JsValue>> {
    let array = JsArray::from_object(obj.clone())
        .map_err(|e| BridgeError::Engine(format!("Object is not a valid array: {}", e)))?;
    let length: usize = array
        .length(ctx)
        .map_err(|e| BridgeError::Engine(format!("Failed to get array length: {}", e)))?
        .try_into()
        .map_err(|_| BridgeError::Engine("Array length overflow".into()))?;

    let mut elements = Vec::with_capacity(length);
    for i in 0..length {
        let element = array.get(i, ctx).map_err(|e| error_from_js(e, ctx))?;
        elements.push(element);
    }
    Ok(elements)
}

/// Synchronous, best-effort copy of a value that is not a transport result:
/// thrown values and console arguments.
///
/// Functions, promises, symbols and bigints are rendered as strings and
/// property getters that throw read as `undefined`.
pub fn to_plain(value: &JsValue, ctx: &mut Context, depth: usize) -> ResolvedValue {
    if let Some(primitive) = primitive_to_resolved(value) {
        return primitive;
    }
    let Some(obj) = value.as_object() else {
        return display_string(value, ctx);
    };
    let obj = obj.clone();
    if depth == 0 || obj.is_callable() {
        return display_string(value, ctx);
    }

    if obj.is_array() {
        return match array_elements(&obj, ctx) {
            Ok(elements) => ResolvedValue::Array(
                elements
                    .iter()
                    .map(|e| to_plain(e, ctx, depth - 1))
                    .collect(),
            ),
            Err(_) => display_string(value, ctx),
        };
    }

    let Ok(keys) = own_keys(&obj, ctx) else {
        return display_string(value, ctx);
    };
    let mut fields = Vec::with_capacity(keys.len());
    for key in keys {
        let field = obj
            .get(js_string!(key.as_str()), ctx)
            .map(|v| to_plain(&v, ctx, depth - 1))
            .unwrap_or(ResolvedValue::Undefined);
        fields.push((key, field));
    }
    ResolvedValue::object(fields)
}

fn display_string(value: &JsValue, ctx: &mut Context) -> ResolvedValue {
    match value.to_string(ctx) {
        Ok(s) => ResolvedValue::String(s.to_std_string_escaped()),
        Err(_) => ResolvedValue::String(value.display().to_string()),
    }
}

/// Maximum nesting copied out of a thrown value.
const THROWN_VALUE_DEPTH: usize = 32;

/// Converts a thrown engine error into the payload sent to the initiator.
///
/// Error instances (native or user subclasses) become
/// [`ErrorPayload::Exception`] with their `name` and `message`; anything else
/// that was thrown is carried as a plain value.
pub fn error_payload(err: JsError, ctx: &mut Context) -> ErrorPayload {
    let is_exception = err.try_native(ctx).is_ok();
    let value = err.to_opaque(ctx);

    if is_exception {
        if let Some(obj) = value.as_object() {
            let obj = obj.clone();
            let name = read_string_property(&obj, "name", ctx).unwrap_or_else(|| "Error".into());
            let message = read_string_property(&obj, "message", ctx).unwrap_or_default();
            return ErrorPayload::exception(name, message);
        }
    }

    ErrorPayload::Value(to_plain(&value, ctx, THROWN_VALUE_DEPTH))
}

/// Wraps a thrown engine error as a bridge error.
pub fn error_from_js(err: JsError, ctx: &mut Context) -> BridgeError {
    BridgeError::Remote(error_payload(err, ctx))
}

fn read_string_property(obj: &JsObject, key: &str, ctx: &mut Context) -> Option<String> {
    let value = obj.get(js_string!(key), ctx).ok()?;
    if value.is_undefined() {
        return None;
    }
    value.to_string(ctx).ok().map(|s| s.to_std_string_escaped())
}

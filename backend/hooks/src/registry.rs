/// Hook trait and adapters.
///
/// Hooks are async data transformers: each receives the value produced by the
/// previous hook in its slot's chain and returns the value for the next one.
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

use hearth_core::WorkingMemory;

// ---------------------------------------------------------------------------
// Hook trait
// ---------------------------------------------------------------------------

/// A transformer registered on a hook slot.
#[async_trait]
pub trait Hook: Send + Sync {
    /// Transform `value`. `session` is present for slots that run inside a turn.
    async fn call(&self, value: Value, session: Option<&mut WorkingMemory>) -> Result<Value>;
}

// ---------------------------------------------------------------------------
// Closure adapters
// ---------------------------------------------------------------------------

/// Wraps a synchronous closure over raw JSON values.
pub struct FnHook<F> {
    f: F,
}

#[async_trait]
impl<F> Hook for FnHook<F>
where
    F: Fn(Value, Option<&mut WorkingMemory>) -> Result<Value> + Send + Sync,
{
    async fn call(&self, value: Value, session: Option<&mut WorkingMemory>) -> Result<Value> {
        (self.f)(value, session)
    }
}

/// Build a hook from a closure over JSON values.
pub fn hook_fn<F>(f: F) -> Arc<dyn Hook>
where
    F: Fn(Value, Option<&mut WorkingMemory>) -> Result<Value> + Send + Sync + 'static,
{
    Arc::new(FnHook { f })
}

/// Wraps a closure over a typed value; the JSON value is decoded before the call
/// and encoded after it.
pub struct TypedHook<T, F> {
    f: F,
    _marker: PhantomData<fn(T) -> T>,
}

#[async_trait]
impl<T, F> Hook for TypedHook<T, F>
where
    T: Serialize + DeserializeOwned + Send + 'static,
    F: Fn(T, Option<&mut WorkingMemory>) -> Result<T> + Send + Sync,
{
    async fn call(&self, value: Value, session: Option<&mut WorkingMemory>) -> Result<Value> {
        let input: T = serde_json::from_value(value)?;
        let output = (self.f)(input, session)?;
        Ok(serde_json::to_value(output)?)
    }
}

/// Build a hook from a closure over a typed value.
///
/// ```ignore
/// let shout = typed_hook(|prefix: String, _| Ok(prefix.to_uppercase()));
/// ```
pub fn typed_hook<T, F>(f: F) -> Arc<dyn Hook>
where
    T: Serialize + DeserializeOwned + Send + 'static,
    F: Fn(T, Option<&mut WorkingMemory>) -> Result<T> + Send + Sync + 'static,
{
    Arc::new(TypedHook { f, _marker: PhantomData })
}

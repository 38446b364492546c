//! Demo mutators over a single shared counter.

use replisync_core::{CoreError, CoreResult, MutatorRegistry, WriteTransaction};
use serde_json::{json, Value};

/// Key the counter mutators operate on.
pub const COUNTER_KEY: &str = "counter";

/// Registry with `increment`, `decrement` and `set` over [`COUNTER_KEY`].
///
/// `increment` and `decrement` take an optional `{"by": n}`, defaulting to 1.
/// `set` requires `{"value": n}`.
pub fn counter_mutators() -> CoreResult<MutatorRegistry> {
    let mut registry = MutatorRegistry::new();
    registry.register("increment", |tx, args| adjust(tx, step(args)?, i64::checked_add))?;
    registry.register("decrement", |tx, args| adjust(tx, step(args)?, i64::checked_sub))?;
    registry.register("set", |tx, args| {
        let value = args
            .get("value")
            .and_then(Value::as_i64)
            .ok_or_else(|| CoreError::rejected("set requires an integer \"value\""))?;
        tx.set(COUNTER_KEY, json!(value))
    })?;
    Ok(registry)
}

fn step(args: &Value) -> CoreResult<i64> {
    match args.get("by") {
        None | Some(Value::Null) => Ok(1),
        Some(by) => by
            .as_i64()
            .ok_or_else(|| CoreError::rejected("\"by\" must be an integer")),
    }
}

fn adjust(
    tx: &mut WriteTransaction<'_>,
    step: i64,
    op: fn(i64, i64) -> Option<i64>,
) -> CoreResult<()> {
    let current = match tx.get(COUNTER_KEY)? {
        Some(value) => value
            .as_i64()
            .ok_or_else(|| CoreError::rejected("counter is not an integer"))?,
        None => 0,
    };
    let next = op(current, step).ok_or_else(|| CoreError::rejected("counter overflow"))?;
    tx.set(COUNTER_KEY, json!(next))
}

//! Normalization of plan data before it is written or adopted.
//!
//! Input is untyped so that anything another writer stored (or anything
//! half-built in memory) can be passed in. Malformed parts degrade to
//! empty values; sanitizing never fails and is idempotent.

use serde_json::{Map, Value};

use crate::models::{Day, Meal, MealId, Snapshot, WeeklyPlan};

/// Sanitizes a `{meals, weeklyPlan}` value into a snapshot.
pub fn sanitize(value: &Value) -> Snapshot {
    Snapshot {
        meals: sanitize_meals(value.get("meals").unwrap_or(&Value::Null)),
        weekly_plan: sanitize_plan(value.get("weeklyPlan").unwrap_or(&Value::Null)),
    }
}

/// Re-normalizes a typed snapshot through the same path as untyped input.
pub fn sanitize_snapshot(snapshot: &Snapshot) -> Snapshot {
    sanitize(&snapshot.to_value())
}

/// Non-array input yields an empty library. Entries without a usable id are dropped.
pub fn sanitize_meals(value: &Value) -> Vec<Meal> {
    match value {
        Value::Array(items) => items.iter().filter_map(sanitize_meal).collect(),
        _ => Vec::new(),
    }
}

/// Always yields all seven days; non-object day values become empty.
pub fn sanitize_plan(value: &Value) -> WeeklyPlan {
    let mut plan = WeeklyPlan::new();
    if let Value::Object(days) = value {
        for day in Day::ALL {
            if let Some(meal) = days.get(day.name()).and_then(sanitize_meal) {
                plan.assign(day, meal);
            }
        }
    }
    plan
}

/// Reduces an object to the meal shape. `None` if it is not an object or
/// has no usable id.
pub fn sanitize_meal(value: &Value) -> Option<Meal> {
    let fields: &Map<String, Value> = value.as_object()?;
    let id = sanitize_id(fields.get("id")?)?;
    let ingredients = match fields.get("ingredients") {
        Some(Value::Array(items)) => items.iter().map(coerce_string).collect(),
        _ => Vec::new(),
    };

    Some(Meal {
        id,
        name: fields.get("name").map(coerce_string).unwrap_or_default(),
        ingredients,
        image: fields.get("image").map(coerce_string).unwrap_or_default(),
    })
}

fn sanitize_id(value: &Value) -> Option<MealId> {
    match value {
        Value::Number(n) => {
            if let Some(id) = n.as_i64() {
                Some(MealId::Int(id))
            } else {
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                        Some(MealId::Int(f as i64))
                    }
                    _ => Some(MealId::Text(n.to_string())),
                }
            }
        }
        Value::String(s) if !s.is_empty() => Some(MealId::Text(s.clone())),
        _ => None,
    }
}

fn coerce_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => String::new(),
    }
}

use serde_json::Value;

/// Deep-merges `overlay` into `base` in place. Objects merge key by key,
/// anything else in the overlay replaces the base value. A `null` in the
/// overlay leaves the base untouched.
pub fn merge_deep(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (_, Value::Null) => {}
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(existing) => merge_deep(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

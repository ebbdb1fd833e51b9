use std::collections::HashMap;

use super::{LABEL_EXPORTED_ID, LABEL_EXPORTED_NAME};

/// Attribute keys the runtime mixes into event attributes next to the container labels.
const RUNTIME_ATTRIBUTES: [&str; 4] = ["name", "image", "exitCode", "signal"];

/// Strips the leading `/` the Docker daemon prepends to container names.
pub fn trim_leading_slash(name: &str) -> &str {
    name.trim_start_matches('/')
}

/// Removes runtime attributes and sidecar bookkeeping labels from an event's attribute map,
/// leaving only the labels set by the container's owner.
pub fn strip_bookkeeping_labels(mut attributes: HashMap<String, String>) -> HashMap<String, String> {
    attributes.retain(|key, _| {
        !RUNTIME_ATTRIBUTES.contains(&key.as_str())
            && key != LABEL_EXPORTED_ID
            && key != LABEL_EXPORTED_NAME
    });
    attributes
}

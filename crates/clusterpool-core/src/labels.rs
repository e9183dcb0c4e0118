//! Label codec: `key=value` strings to label maps and back.
//!
//! Label maps are plain `String → String` bags. They are stored ordered so
//! that [`format`] output is stable across runs.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

/// Cluster labels, keyed by label name.
pub type Labels = BTreeMap<String, String>;

/// Longest value most cloud label implementations accept.
pub const MAX_LABEL_VALUE_LEN: usize = 63;

static DISALLOWED_VALUE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9_-]").expect("static pattern"));

/// Parse `key=value` entries into a label map.
///
/// Splits on the first `=`, so values may themselves contain `=`. Entries
/// without any `=` are skipped.
pub fn parse<I, S>(pairs: I) -> Labels
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut labels = Labels::new();
    for pair in pairs {
        let pair = pair.as_ref();
        match pair.split_once('=') {
            Some((key, value)) => {
                labels.insert(key.to_string(), value.to_string());
            }
            None => debug!(entry = pair, "ignoring label entry without '='"),
        }
    }
    labels
}

/// Overlay `overrides` on `base`. Keys in `overrides` win.
pub fn merge(base: &Labels, overrides: &Labels) -> Labels {
    merge_all([Some(base), Some(overrides)])
}

/// Overlay every layer in order; later layers win and `None` layers count
/// as empty.
pub fn merge_all<'a, I>(layers: I) -> Labels
where
    I: IntoIterator<Item = Option<&'a Labels>>,
{
    let mut merged = Labels::new();
    for layer in layers.into_iter().flatten() {
        merged.extend(layer.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    merged
}

/// Render labels as `k1=v1 k2=v2` for logs and terminal output.
pub fn format(labels: &Labels) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Make an arbitrary string safe to use as a label value: lowercase, every
/// character outside `[a-z0-9_-]` becomes `-`, capped at 63 characters.
pub fn sanitize_value(value: &str) -> String {
    let lowered = value.to_lowercase();
    let mut sanitized = DISALLOWED_VALUE_CHARS
        .replace_all(&lowered, "-")
        .into_owned();
    if sanitized.len() > MAX_LABEL_VALUE_LEN {
        // Only ASCII survives the replacement, so any index is a char boundary.
        sanitized.truncate(MAX_LABEL_VALUE_LEN);
    }
    sanitized
}

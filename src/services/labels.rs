use crate::models::IngredientSet;

/// Turns raw detector labels into a canonical ingredient set
pub fn normalize<I, S>(raw_labels: I) -> IngredientSet
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    raw_labels.into_iter().collect()
}

/// Canonical form of a single label, or `None` if nothing is left of it.
///
/// Lowercases, turns underscores into spaces, drops a local-name suffix that
/// starts at the first whitespace-preceded hyphen (`"ash gourd -kubhindo-"`),
/// and collapses whitespace. Applying it to its own output is a no-op.
pub fn normalize_label(raw: &str) -> Option<String> {
    let lowered = raw.trim().to_lowercase().replace('_', " ");
    let base = strip_local_suffix(&lowered);

    let canonical = base.split_whitespace().collect::<Vec<_>>().join(" ");
    (!canonical.is_empty()).then_some(canonical)
}

fn strip_local_suffix(label: &str) -> &str {
    let mut prev_is_space = false;
    for (idx, ch) in label.char_indices() {
        if ch == '-' && prev_is_space {
            return &label[..idx];
        }
        prev_is_space = ch.is_whitespace();
    }
    label
}

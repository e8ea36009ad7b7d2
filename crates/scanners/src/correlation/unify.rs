use crate::matcher::Bindings;

/// Whether an acquisition's captures are compatible with a cleanup's.
///
/// Every capture name the two share must hold the same text. An acquisition
/// that captured nothing only unifies with a cleanup that also captured
/// nothing: a cleanup that names a handle cannot refer to a discarded one.
pub fn unify(acquisition: &Bindings, cleanup: &Bindings) -> bool {
    if acquisition.is_empty() {
        return cleanup.is_empty();
    }
    acquisition.iter().all(|(name, value)| match cleanup.get(name) {
        Some(other) => same_value(value, other),
        None => true,
    })
}

fn same_value(left: &str, right: &str) -> bool {
    left == right || canonical(left) == canonical(right)
}

/// Strips one pair of matching quotes. Receivers stay significant:
/// `this.timer` and `timer` are different bindings.
fn canonical(value: &str) -> &str {
    ['"', '\'', '`']
        .iter()
        .find_map(|q| {
            value
                .strip_prefix(*q)
                .and_then(|rest| rest.strip_suffix(*q))
        })
        .unwrap_or(value)
}

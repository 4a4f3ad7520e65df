//! List arithmetic for non-exclusive membership.
//!
//! Several resources may each own a slice of one Vault list field (a group's
//! policies, its member entity IDs). Each one only adds what it declares and
//! only removes what it previously declared.

/// Elements added to and removed from `old` to reach `new`.
pub fn set_diff(old: &[String], new: &[String]) -> (Vec<String>, Vec<String>) {
    let added = unique(new.iter().filter(|v| !old.contains(v)));
    let removed = unique(old.iter().filter(|v| !new.contains(v)));
    (added, removed)
}

/// `existing − (old − new) + (new − existing)`.
///
/// Keeps the order of `existing`, appends additions in `new` order and never
/// produces duplicates.
pub fn reconcile_non_exclusive(existing: &[String], old: &[String], new: &[String]) -> Vec<String> {
    let (_, removed) = set_diff(old, new);
    let mut result = unique(existing.iter().filter(|v| !removed.contains(v)));
    for value in new {
        if !result.contains(value) {
            result.push(value.clone());
        }
    }
    result
}

/// `existing − remove`, used when a non-exclusive resource is destroyed.
pub fn remove_all(existing: &[String], remove: &[String]) -> Vec<String> {
    unique(existing.iter().filter(|v| !remove.contains(v)))
}

/// Elements of `ours` that are still present in `existing`.
pub fn intersect(ours: &[String], existing: &[String]) -> Vec<String> {
    unique(ours.iter().filter(|v| existing.contains(v)))
}

fn unique<'a>(values: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for v in values {
        if !out.contains(v) {
            out.push(v.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_set_diff() {
        let (added, removed) = set_diff(&s(&["a", "b", "c"]), &s(&["b", "d", "d"]));
        assert_eq!(added, s(&["d"]));
        assert_eq!(removed, s(&["a", "c"]));
    }

    #[test]
    fn test_reconcile_keeps_foreign_members() {
        // "x" belongs to another resource and must survive.
        let existing = s(&["x", "a", "b"]);
        let result = reconcile_non_exclusive(&existing, &s(&["a", "b"]), &s(&["b", "c"]));
        assert_eq!(result, s(&["x", "b", "c"]));
    }

    #[test]
    fn test_reconcile_first_apply() {
        let result = reconcile_non_exclusive(&s(&["x"]), &[], &s(&["a", "x"]));
        assert_eq!(result, s(&["x", "a"]));
    }

    #[test]
    fn test_reconcile_readds_member_removed_out_of_band() {
        // "a" was declared before, removed in Vault by someone else, and is
        // still declared: it comes back.
        let result = reconcile_non_exclusive(&s(&["x"]), &s(&["a"]), &s(&["a"]));
        assert_eq!(result, s(&["x", "a"]));
    }

    #[test]
    fn test_remove_all_and_intersect() {
        assert_eq!(remove_all(&s(&["x", "a", "b"]), &s(&["a", "z"])), s(&["x", "b"]));
        assert_eq!(intersect(&s(&["a", "b", "c"]), &s(&["c", "a"])), s(&["a", "c"]));
    }
}

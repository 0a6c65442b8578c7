//! Branch name allocation.
//!
//! Branch names are hierarchical: children of `main` are `main-1`, `main-2`;
//! children of `main-1` are `main-1-1`, `main-1-2`. A fork picks the
//! smallest positive child index not yet used under the parent.

/// Allocate the next child branch name under `parent`, given every branch
/// name that already exists for the job.
pub fn next_child_branch(existing: &[String], parent: &str) -> String {
    let prefix = format!("{parent}-");
    let mut used = std::collections::HashSet::new();
    for name in existing {
        if let Some(rest) = name.strip_prefix(&prefix) {
            // Direct children only: the suffix is a bare integer.
            if let Ok(n) = rest.parse::<u32>() {
                used.insert(n);
            }
        }
    }
    let mut n = 1;
    while used.contains(&n) {
        n += 1;
    }
    format!("{parent}-{n}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_first_child_of_main() {
        assert_eq!(next_child_branch(&names(&["main"]), "main"), "main-1");
    }

    #[test]
    fn test_smallest_unused_index() {
        assert_eq!(
            next_child_branch(&names(&["main", "main-1", "main-3"]), "main"),
            "main-2"
        );
    }

    #[test]
    fn test_grandchildren_do_not_count_as_children() {
        assert_eq!(
            next_child_branch(&names(&["main", "main-1", "main-1-1", "main-1-2"]), "main"),
            "main-2"
        );
        assert_eq!(
            next_child_branch(&names(&["main", "main-1", "main-1-1", "main-1-2"]), "main-1"),
            "main-1-3"
        );
    }

    #[test]
    fn test_dense_sequence() {
        let existing = names(&["main", "main-1", "main-2", "main-3"]);
        assert_eq!(next_child_branch(&existing, "main"), "main-4");
    }
}

use uuid::Uuid;

/// Unique username for one iteration: `prefix_<uuid>`.
///
/// A random v4 UUID keeps names distinct across concurrent and repeated
/// iterations without any shared counter.
pub fn username(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn keeps_prefix() {
        let name = username("perf_fund");
        assert!(name.starts_with("perf_fund_"));
        assert_eq!(name.len(), "perf_fund_".len() + 36);
    }

    #[test]
    fn distinct_across_many_calls() {
        let names: HashSet<_> = (0..10_000).map(|_| username("perf")).collect();
        assert_eq!(names.len(), 10_000);
    }
}

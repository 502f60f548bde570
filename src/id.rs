//! ID generation utilities for evalloop
//!
//! Provides functions for generating identifiers for runs, datasets and tasks.

use uuid::Uuid;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Short random hex suffix taken from a v4 UUID
fn random_suffix() -> String {
    let simple = Uuid::new_v4().simple().to_string();
    simple[..8].to_string()
}

/// Generate a unique evaluation run ID
///
/// Format: `run-{timestamp_ms}-{random_hex}`
/// Example: `run-1738300800123-a1b2c3d4`
pub fn generate_run_id() -> String {
    format!("run-{}-{}", now_ms(), random_suffix())
}

/// Generate a task ID for a controller run
///
/// Format: `task-{timestamp_ms}-{random_hex}`
pub fn generate_task_id() -> String {
    format!("task-{}-{}", now_ms(), random_suffix())
}

/// Generate a case ID from its dataset and position
///
/// Format: `{dataset_id}-{index:04}`
pub fn generate_case_id(dataset_id: &str, index: usize) -> String {
    format!("{}-{:04}", dataset_id, index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_returns_reasonable_timestamp() {
        let ts = now_ms();
        assert!(ts > 1577836800000); // 2020-01-01
        assert!(ts < 4102444800000); // 2100-01-01
    }

    #[test]
    fn test_generate_run_id_format() {
        let id = generate_run_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "run");
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_run_id_unique() {
        let a = generate_run_id();
        let b = generate_run_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_generate_task_id_prefix() {
        assert!(generate_task_id().starts_with("task-"));
    }

    #[test]
    fn test_generate_case_id() {
        assert_eq!(generate_case_id("qa", 7), "qa-0007");
        assert_eq!(generate_case_id("qa", 1234), "qa-1234");
    }
}

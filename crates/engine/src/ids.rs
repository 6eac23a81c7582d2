//! Identifier generation for plans and executions

use uuid::Uuid;

pub fn plan_id() -> String {
    format!("plan-{}", Uuid::new_v4())
}

pub fn execution_id() -> String {
    format!("exec-{}", Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_prefixed_and_unique() {
        let a = plan_id();
        let b = plan_id();
        assert!(a.starts_with("plan-"));
        assert_ne!(a, b);

        let exec = execution_id();
        assert!(exec.starts_with("exec-"));
        assert!(Uuid::parse_str(exec.trim_start_matches("exec-")).is_ok());
    }
}

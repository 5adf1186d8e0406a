// Invariant Framework
//
// Invariants are pure rules evaluated after each version is folded into
// the table state. Violations are detected *before* the state is handed
// to a caller.

use std::collections::HashSet;

use crate::actions::Action;
use crate::log::VersionBatch;
use crate::state::TableState;

/// Result of invariant evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantResult {
    Pass,
    Fail(String),
}

/// Trait implemented by all invariants.
///
/// Invariants must be:
/// - Pure
/// - Deterministic
/// - Side-effect free
pub trait Invariant: Send + Sync {
    fn name(&self) -> &'static str;

    fn validate(
        &self,
        previous_state: &TableState,
        batch: &VersionBatch,
        next_state: &TableState,
    ) -> InvariantResult;
}

/// Invariant engine that evaluates a set of invariants.
#[derive(Default)]
pub struct InvariantEngine {
    invariants: Vec<Box<dyn Invariant>>,
}

impl InvariantEngine {
    /// Create an engine with no invariants.
    pub fn new() -> Self {
        Self {
            invariants: Vec::new(),
        }
    }

    /// Create an engine with every built-in invariant registered.
    pub fn with_builtins() -> Self {
        let mut engine = Self::new();
        engine.register(NonNegativeFileSizes);
        engine.register(PartitionValuesMatchColumns);
        engine
    }

    /// Register an invariant.
    pub fn register<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }

    /// Evaluate all invariants.
    ///
    /// Stops at the first failure.
    pub fn evaluate(
        &self,
        previous_state: &TableState,
        batch: &VersionBatch,
        next_state: &TableState,
    ) -> Result<(), InvariantViolation> {
        for invariant in &self.invariants {
            match invariant.validate(previous_state, batch, next_state) {
                InvariantResult::Pass => continue,
                InvariantResult::Fail(reason) => {
                    return Err(InvariantViolation {
                        invariant: invariant.name(),
                        reason,
                    })
                }
            }
        }
        Ok(())
    }
}

/// Returned when an invariant is violated.
#[derive(Debug, thiserror::Error)]
#[error("invariant `{invariant}` violated: {reason}")]
pub struct InvariantViolation {
    pub invariant: &'static str,
    pub reason: String,
}

/// Files added in a batch have a non-negative size.
pub struct NonNegativeFileSizes;

impl Invariant for NonNegativeFileSizes {
    fn name(&self) -> &'static str {
        "non-negative-file-sizes"
    }

    fn validate(
        &self,
        _previous: &TableState,
        batch: &VersionBatch,
        _next: &TableState,
    ) -> InvariantResult {
        let negative = batch.actions.iter().find_map(|action| match action {
            Action::Add(add) if add.size() < 0 => Some(add),
            _ => None,
        });
        match negative {
            Some(add) => {
                InvariantResult::Fail(format!("`{}` has size {}", add.path(), add.size()))
            }
            None => InvariantResult::Pass,
        }
    }
}

/// Files added in a batch carry exactly the table's partition columns.
pub struct PartitionValuesMatchColumns;

impl Invariant for PartitionValuesMatchColumns {
    fn name(&self) -> &'static str {
        "partition-values-match-columns"
    }

    fn validate(
        &self,
        _previous: &TableState,
        batch: &VersionBatch,
        next: &TableState,
    ) -> InvariantResult {
        let columns: HashSet<&str> = next
            .metadata()
            .partition_columns
            .iter()
            .map(String::as_str)
            .collect();

        for action in &batch.actions {
            let Action::Add(add) = action else {
                continue;
            };
            let keys: HashSet<&str> = add.partition_values().keys().map(String::as_str).collect();
            if keys != columns {
                let mut found: Vec<_> = keys.into_iter().collect();
                found.sort_unstable();
                return InvariantResult::Fail(format!(
                    "`{}` has partition values for {:?}, table is partitioned by {:?}",
                    add.path(),
                    found,
                    next.metadata().partition_columns
                ));
            }
        }
        InvariantResult::Pass
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::actions::{AddFile, Metadata};

    struct RejectEverything;

    impl Invariant for RejectEverything {
        fn name(&self) -> &'static str {
            "reject-everything"
        }

        fn validate(
            &self,
            _previous: &TableState,
            _batch: &VersionBatch,
            _next: &TableState,
        ) -> InvariantResult {
            InvariantResult::Fail("nothing is allowed".into())
        }
    }

    fn partitioned_state(columns: &[&str]) -> TableState {
        let mut state = TableState::empty(-1);
        state.apply(
            Metadata::new_table("{}", columns.iter().map(|c| c.to_string()).collect(), 0).into(),
        );
        state
    }

    fn add_with_partitions(values: &[(&str, &str)]) -> Action {
        let values: HashMap<String, String> = values
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AddFile::try_new("f.parquet", values, 1, 0, true)
            .unwrap()
            .into()
    }

    #[test]
    fn engine_reports_first_failure() {
        let mut engine = InvariantEngine::new();
        engine.register(RejectEverything);

        let state = TableState::empty(-1);
        let batch = VersionBatch::new(0, vec![]);

        let err = engine.evaluate(&state, &batch, &state).unwrap_err();
        assert!(err.to_string().contains("reject-everything"));
    }

    #[test]
    fn empty_engine_passes() {
        let state = TableState::empty(-1);
        let engine = InvariantEngine::new();
        assert!(engine.is_empty());
        assert!(engine
            .evaluate(&state, &VersionBatch::new(0, vec![]), &state)
            .is_ok());
    }

    #[test]
    fn partition_values_must_match_columns() {
        let previous = partitioned_state(&["date"]);
        let action = add_with_partitions(&[("region", "eu")]);
        let mut next = previous.clone();
        next.apply(action.clone());

        let batch = VersionBatch::new(0, vec![action]);
        let result = PartitionValuesMatchColumns.validate(&previous, &batch, &next);

        assert!(matches!(result, InvariantResult::Fail(msg) if msg.contains("region")));
    }

    #[test]
    fn negative_file_size_fails() {
        let previous = partitioned_state(&[]);
        let action: Action = AddFile::try_new("neg.parquet", HashMap::new(), -1, 0, true)
            .unwrap()
            .into();
        let mut next = previous.clone();
        next.apply(action.clone());
        let batch = VersionBatch::new(0, vec![action]);

        let err = InvariantEngine::with_builtins()
            .evaluate(&previous, &batch, &next)
            .unwrap_err();
        assert_eq!(err.invariant, "non-negative-file-sizes");
        assert!(err.reason.contains("neg.parquet"));
    }

    #[test]
    fn matching_partition_values_pass() {
        let previous = partitioned_state(&["date"]);
        let action = add_with_partitions(&[("date", "2024-01-01")]);
        let mut next = previous.clone();
        next.apply(action.clone());

        let batch = VersionBatch::new(0, vec![action]);
        assert_eq!(
            InvariantEngine::with_builtins()
                .evaluate(&previous, &batch, &next)
                .map_err(|e| e.to_string()),
            Ok(())
        );
    }
}

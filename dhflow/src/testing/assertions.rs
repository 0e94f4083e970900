//! Assertions over run results and connection logs.

use crate::stages::{Counters, StageResult};

use super::mocks::ConnectionLog;

/// Asserts the counters of a result.
pub fn assert_counters(result: &StageResult, expected: Counters) {
    assert_eq!(
        result.counters, expected,
        "Expected counters {:?}, got {:?}",
        expected, result.counters
    );
}

/// Asserts that every acquired connection was released.
pub fn assert_connections_released(log: &ConnectionLog) {
    assert!(
        log.is_balanced(),
        "Expected every acquire to be released: {} acquires, {} releases",
        log.acquires,
        log.releases
    );
}

/// Asserts one commit, no rollback, and a balanced connection.
pub fn assert_committed_once(log: &ConnectionLog) {
    assert_eq!(log.commits, 1, "Expected exactly one commit, log: {log:?}");
    assert_eq!(log.rollbacks, 0, "Expected no rollback, log: {log:?}");
    assert_connections_released(log);
}

/// Asserts one rollback, no commit, and a balanced connection.
pub fn assert_rolled_back_once(log: &ConnectionLog) {
    assert_eq!(log.rollbacks, 1, "Expected exactly one rollback, log: {log:?}");
    assert_eq!(log.commits, 0, "Expected no commit, log: {log:?}");
    assert_connections_released(log);
}

/// Asserts that neither commit nor rollback were issued.
pub fn assert_no_transaction_control(log: &ConnectionLog) {
    assert_eq!(
        (log.commits, log.rollbacks, log.auto_commit_off),
        (0, 0, 0),
        "Expected no transaction control, log: {log:?}"
    );
}

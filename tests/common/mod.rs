//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod log_capture;
pub mod mock_helpers;

use modflow::kernel::ConnectorRef;
use std::time::Duration;

/// Create a test timeout duration
pub fn test_timeout() -> Duration {
    Duration::from_millis(100)
}

/// Assert that both ends agree on the edge between `a` and `b`.
pub fn assert_symmetric(a: &ConnectorRef, b: &ConnectorRef) {
    let forward = a.is_connected_to(b).expect("edge check failed");
    let backward = b.is_connected_to(a).expect("edge check failed");
    assert_eq!(
        forward, backward,
        "{} and {} disagree about their edge",
        a, b
    );
}

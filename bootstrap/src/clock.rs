//! The production `Clock`, grounded on `composable_rust_core::environment::Clock`'s
//! own doc example (`core` only sketches `SystemClock` in a comment, it isn't
//! exported) and `composable_rust_testing::mocks::FixedClock`'s unit-struct shape.

use chrono::{DateTime, Utc};
use composable_rust_core::environment::Clock;

/// Reads the actual wall clock. Tests use
/// `composable_rust_testing::mocks::FixedClock` instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unit tests for respawn back-off

use super::*;
use yare::parameterized;

#[parameterized(
    zero_attempts = { 0, 5, 0 },
    first_failure = { 1, 5, 1 },
    second_failure = { 2, 5, 3 },
    third_failure = { 3, 5, 7 },
    at_cap = { 5, 5, 31 },
    beyond_cap = { 9, 5, 31 },
    cap_zero = { 4, 0, 0 },
)]
fn delay_is_two_to_the_clamped_attempt_minus_one(id: u32, cap: u32, secs: u64) {
    assert_eq!(respawn_delay(id, cap), Duration::from_secs(secs));
}

#[test]
fn large_exponent_saturates_instead_of_overflowing() {
    let delay = respawn_delay(u32::MAX, u32::MAX);
    assert_eq!(delay, Duration::from_secs(u64::MAX - 1));
}

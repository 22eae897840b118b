// Copyright 2026 Aggregator Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Debug-only enforcement of the fixed lock order (§5): Service monitor, then
//! Aggregator monitor, never the other way round. A thread-local depth counter is
//! incremented for the lifetime of a held Service monitor and checked before the
//! Aggregator monitor is acquired; both sides compile to nothing in release builds.

#[cfg(debug_assertions)]
use std::cell::Cell;

#[cfg(debug_assertions)]
thread_local! {
    static SERVICE_LOCKS_HELD: Cell<u32> = const { Cell::new(0) };
}

/// Held for as long as a Service monitor is locked on this thread.
#[must_use]
pub(crate) struct ServiceLockGuard {
    _private: (),
}

pub(crate) fn enter_service_lock() -> ServiceLockGuard {
    #[cfg(debug_assertions)]
    SERVICE_LOCKS_HELD.with(|depth| depth.set(depth.get() + 1));
    ServiceLockGuard { _private: () }
}

impl Drop for ServiceLockGuard {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        SERVICE_LOCKS_HELD.with(|depth| depth.set(depth.get() - 1));
    }
}

/// Panics if this thread currently holds a Service monitor. Called immediately
/// before the Aggregator monitor is acquired.
pub(crate) fn assert_no_service_lock_held() {
    #[cfg(debug_assertions)]
    SERVICE_LOCKS_HELD.with(|depth| {
        assert_eq!(
            depth.get(),
            0,
            "lock order violation: Aggregator monitor acquired while a Service monitor is held"
        );
    });
}

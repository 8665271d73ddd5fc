//! Response classification: turning an operation's error into the flag set
//! that steers the executor.
//!
//! Success is structural (`Ok` from the operation), so classifiers only ever
//! see errors. `FAIL` marks the attempt failed, `BREAKABLE` feeds the
//! breaker's successive-failure counter, `RETRIABLE` permits another attempt.
//! An error classified with neither `BREAKABLE` nor `RETRIABLE` terminates the
//! call immediately with that error.

use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;

/// Bit-set over `{OK, FAIL, RETRIABLE, BREAKABLE}`.
///
/// `OK` and `FAIL` are mutually exclusive; `RETRIABLE` and `BREAKABLE` are
/// independent refinements of `FAIL`. Classifiers must not set `OK` on an
/// error.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct ResponseClass(u8);

impl ResponseClass {
    /// Attempt succeeded.
    pub const OK: Self = Self(1);
    /// Attempt failed.
    pub const FAIL: Self = Self(1 << 1);
    /// Failure counts toward tripping the resource's breaker.
    pub const BREAKABLE: Self = Self(1 << 2);
    /// Another attempt is permitted.
    pub const RETRIABLE: Self = Self(1 << 3);

    pub fn contains(self, flags: Self) -> bool {
        self.0 & flags.0 == flags.0
    }

    pub fn is_ok(self) -> bool {
        self.contains(Self::OK)
    }

    pub fn is_breakable(self) -> bool {
        self.contains(Self::BREAKABLE)
    }

    pub fn is_retriable(self) -> bool {
        self.contains(Self::RETRIABLE)
    }
}

impl BitOr for ResponseClass {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ResponseClass {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl std::fmt::Debug for ResponseClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = vec![];
        if self.contains(Self::OK) {
            parts.push("OK");
        }
        if self.contains(Self::FAIL) {
            parts.push("FAIL");
        }
        if self.contains(Self::BREAKABLE) {
            parts.push("BREAKABLE");
        }
        if self.contains(Self::RETRIABLE) {
            parts.push("RETRIABLE");
        }
        if parts.is_empty() {
            parts.push("EMPTY");
        }
        write!(f, "{}", parts.join("|"))
    }
}

/// Replaceable classifier: a pure function of the error value.
pub type Classifier<E> = Arc<dyn Fn(&E) -> ResponseClass + Send + Sync>;

/// Default classifier for network-shaped errors.
///
/// Walks the error's `source()` chain looking for an [`std::io::Error`] (the
/// usual transport error, possibly wrapped by an HTTP or RPC client):
///
/// - timed out or connection refused: `FAIL | BREAKABLE | RETRIABLE`
/// - any other I/O error: `FAIL | BREAKABLE`
/// - no I/O error in the chain but the message mentions a closed network
///   connection: `FAIL | BREAKABLE | RETRIABLE`
/// - anything else: `FAIL` only
pub fn network_error_classification(err: &(dyn std::error::Error + 'static)) -> ResponseClass {
    let mut class = ResponseClass::FAIL;

    let mut cursor: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(current) = cursor {
        if let Some(io_err) = current.downcast_ref::<std::io::Error>() {
            class |= ResponseClass::BREAKABLE;
            if matches!(
                io_err.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::ConnectionRefused
            ) {
                class |= ResponseClass::RETRIABLE;
            }
            return class;
        }
        cursor = current.source();
    }

    if err.to_string().contains("use of closed network connection") {
        return ResponseClass::FAIL | ResponseClass::BREAKABLE | ResponseClass::RETRIABLE;
    }

    class
}

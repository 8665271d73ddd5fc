//! Error type returned by [`FailPool::execute`](crate::FailPool::execute).

use std::fmt;

/// Outcome of an exhausted or rejected call.
///
/// The pool never rewrites the operation's error: a call either succeeds,
/// returns one of the two pool sentinels, or returns the last attempt's error
/// untouched inside [`Inner`](FailPoolError::Inner).
#[derive(Debug, Clone)]
pub enum FailPoolError<E> {
    /// Eligibility filtering left nothing to pick: every resource is either
    /// tripped by the breaker or over its bulkhead ceiling.
    AllResourcesDown,
    /// Every pick's retry budget was consumed by retriable failures.
    MaxRetry,
    /// The operation failed and the classifier ended the call; the error is
    /// surfaced verbatim.
    Inner(E),
}

impl<E: fmt::Display> fmt::Display for FailPoolError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllResourcesDown => write!(f, "All Resource Has Down"),
            Self::MaxRetry => write!(f, "Max retry but still failure"),
            Self::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for FailPoolError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
}

impl<E> FailPoolError<E> {
    /// True when every resource was filtered out at pick time.
    pub fn is_all_resources_down(&self) -> bool {
        matches!(self, Self::AllResourcesDown)
    }

    /// True when the pick and retry budgets ran out.
    pub fn is_max_retry(&self) -> bool {
        matches!(self, Self::MaxRetry)
    }

    /// True when this wraps the operation's own error.
    pub fn is_inner(&self) -> bool {
        matches!(self, Self::Inner(_))
    }

    /// Borrow the operation's error if present.
    pub fn as_inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }

    /// Take the operation's error if present.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::io;

    #[test]
    fn sentinel_messages() {
        let down: FailPoolError<io::Error> = FailPoolError::AllResourcesDown;
        assert_eq!(down.to_string(), "All Resource Has Down");

        let exhausted: FailPoolError<io::Error> = FailPoolError::MaxRetry;
        assert_eq!(exhausted.to_string(), "Max retry but still failure");
    }

    #[test]
    fn inner_error_is_surfaced_verbatim() {
        let err = FailPoolError::Inner(io::Error::new(io::ErrorKind::TimedOut, "deadline"));
        assert_eq!(err.to_string(), "deadline");
        assert!(err.source().is_some());
        assert_eq!(err.into_inner().unwrap().to_string(), "deadline");
    }

    #[test]
    fn predicates_identify_variants() {
        let down: FailPoolError<io::Error> = FailPoolError::AllResourcesDown;
        assert!(down.is_all_resources_down());
        assert!(!down.is_max_retry());
        assert!(down.as_inner().is_none());
        assert!(down.source().is_none());

        let exhausted: FailPoolError<io::Error> = FailPoolError::MaxRetry;
        assert!(exhausted.is_max_retry());

        let inner = FailPoolError::Inner(io::Error::other("boom"));
        assert!(inner.is_inner());
        assert!(inner.as_inner().is_some());
    }
}

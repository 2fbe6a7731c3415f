//! Exception type tags and the failure value raised by listeners.
//!
//! Classification is hierarchy-aware without reflection: every
//! [`ExceptionType`] carries an explicit parent chain, declared as constants.
//!
//! ```rust,ignore
//! use listener_errors::{ExceptionType, ILLEGAL_STATE};
//!
//! pub const PAYMENT_DECLINED: ExceptionType =
//!     ExceptionType::extends("PaymentDeclined", &ILLEGAL_STATE);
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// A named exception type with an optional supertype.
///
/// Two tags are the same type when their names match, so names must be unique
/// within an application.
#[derive(Debug, Clone, Copy)]
pub struct ExceptionType {
    name: &'static str,
    parent: Option<&'static ExceptionType>,
}

impl ExceptionType {
    /// A type with no supertype.
    pub const fn root(name: &'static str) -> Self {
        Self { name, parent: None }
    }

    /// A subtype of `parent`.
    pub const fn extends(name: &'static str, parent: &'static ExceptionType) -> Self {
        Self {
            name,
            parent: Some(parent),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn parent(&self) -> Option<&'static ExceptionType> {
        self.parent
    }

    /// This type followed by each supertype, most specific first.
    pub fn ancestors(&self) -> Ancestors {
        Ancestors { next: Some(*self) }
    }

    /// Whether `self` is `other` or one of its subtypes.
    pub fn is_a(&self, other: &ExceptionType) -> bool {
        self.ancestors().any(|t| t == *other)
    }
}

impl PartialEq for ExceptionType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ExceptionType {}

impl Hash for ExceptionType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for ExceptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Iterator over a type and its supertypes.
pub struct Ancestors {
    next: Option<ExceptionType>,
}

impl Iterator for Ancestors {
    type Item = ExceptionType;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        self.next = current.parent.copied();
        Some(current)
    }
}

pub const ERROR: ExceptionType = ExceptionType::root("Error");
pub const RUNTIME: ExceptionType = ExceptionType::extends("Runtime", &ERROR);
pub const ILLEGAL_STATE: ExceptionType = ExceptionType::extends("IllegalState", &RUNTIME);
pub const ILLEGAL_ARGUMENT: ExceptionType = ExceptionType::extends("IllegalArgument", &RUNTIME);
pub const TIMEOUT: ExceptionType = ExceptionType::extends("Timeout", &RUNTIME);

// Failures that redelivery cannot fix; not retryable by default.
pub const DESERIALIZATION: ExceptionType = ExceptionType::extends("Deserialization", &RUNTIME);
pub const MESSAGE_CONVERSION: ExceptionType = ExceptionType::extends("MessageConversion", &RUNTIME);
pub const CONVERSION: ExceptionType = ExceptionType::extends("Conversion", &RUNTIME);
pub const ARGUMENT_RESOLUTION: ExceptionType =
    ExceptionType::extends("ArgumentResolution", &RUNTIME);
pub const HANDLER_NOT_FOUND: ExceptionType = ExceptionType::extends("HandlerNotFound", &RUNTIME);
pub const TYPE_MISMATCH: ExceptionType = ExceptionType::extends("TypeMismatch", &RUNTIME);

/// Types the default classifier treats as not retryable.
pub const DEFAULT_NOT_RETRYABLE: [ExceptionType; 6] = [
    DESERIALIZATION,
    MESSAGE_CONVERSION,
    CONVERSION,
    ARGUMENT_RESOLUTION,
    HANDLER_NOT_FOUND,
    TYPE_MISMATCH,
];

/// The failure a listener raised while processing a record or batch.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ListenerException {
    kind: ExceptionType,
    message: String,
    #[source]
    cause: Option<Box<ListenerException>>,
}

impl ListenerException {
    pub fn new(kind: ExceptionType, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
        }
    }

    /// Wrap `cause`, e.g. a listener-invocation failure around the domain error.
    pub fn caused_by(mut self, cause: ListenerException) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn kind(&self) -> ExceptionType {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&ListenerException> {
        self.cause.as_deref()
    }

    /// This exception followed by its causes, outermost first.
    pub fn chain(&self) -> impl Iterator<Item = &ListenerException> {
        std::iter::successors(Some(self), |e| e.cause())
    }

    /// Innermost cause, or `self` when there is none.
    pub fn root_cause(&self) -> &ListenerException {
        self.chain().last().unwrap_or(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    const PAYMENT_DECLINED: ExceptionType =
        ExceptionType::extends("PaymentDeclined", &ILLEGAL_STATE);

    #[test]
    fn test_ancestors_most_specific_first() {
        let names: Vec<_> = PAYMENT_DECLINED.ancestors().map(|t| t.name()).collect();
        assert_eq!(names, ["PaymentDeclined", "IllegalState", "Runtime", "Error"]);
    }

    #[test]
    fn test_is_a() {
        assert!(PAYMENT_DECLINED.is_a(&ILLEGAL_STATE));
        assert!(PAYMENT_DECLINED.is_a(&ERROR));
        assert!(!PAYMENT_DECLINED.is_a(&ILLEGAL_ARGUMENT));
        assert!(!RUNTIME.is_a(&ILLEGAL_STATE));
    }

    #[test]
    fn test_equality_by_name() {
        let other = ExceptionType::root("IllegalState");
        assert_eq!(other, ILLEGAL_STATE);
        assert_ne!(ILLEGAL_STATE, ILLEGAL_ARGUMENT);
    }

    #[test]
    fn test_exception_chain() {
        let inner = ListenerException::new(DESERIALIZATION, "bad json");
        let outer = ListenerException::new(RUNTIME, "listener failed").caused_by(inner);

        assert_eq!(outer.to_string(), "Runtime: listener failed");
        assert_eq!(outer.chain().count(), 2);
        assert_eq!(outer.root_cause().kind(), DESERIALIZATION);
        assert_eq!(
            outer.source().map(|s| s.to_string()),
            Some("Deserialization: bad json".to_string())
        );
    }
}

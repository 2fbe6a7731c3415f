//! Retryable / not-retryable classification of listener exceptions.
//!
//! ## Lookup order
//!
//! ```text
//! exception ──▶ kind, parent, ..., root      first explicit entry wins
//!    │
//!    └─ cause ──▶ kind, parent, ..., root    only if nothing matched above
//!         │
//!         └─ ...
//!                                            no match: default verdict
//! ```
//!
//! The registry lives behind a shared lock. Every clone of an
//! [`ExceptionClassifier`] sees the same registry, and
//! [`ExceptionClassifier::set_classifications`] swaps it in one write so a
//! concurrent `classify` sees either the old registry or the new one.

use crate::exception::{ExceptionType, ListenerException, DEFAULT_NOT_RETRYABLE};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone)]
struct Classifications {
    entries: HashMap<ExceptionType, bool>,
    default_retryable: bool,
}

/// Shared, hierarchy-aware exception classifier.
#[derive(Debug, Clone)]
pub struct ExceptionClassifier {
    registry: Arc<RwLock<Classifications>>,
}

impl Default for ExceptionClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ExceptionClassifier {
    /// Retryable by default, with the [`DEFAULT_NOT_RETRYABLE`] types registered.
    pub fn new() -> Self {
        let entries = DEFAULT_NOT_RETRYABLE.iter().map(|t| (*t, false)).collect();
        Self::from_parts(entries, true)
    }

    /// No explicit entries; every exception gets `default_retryable`.
    pub fn empty(default_retryable: bool) -> Self {
        Self::from_parts(HashMap::new(), default_retryable)
    }

    fn from_parts(entries: HashMap<ExceptionType, bool>, default_retryable: bool) -> Self {
        Self {
            registry: Arc::new(RwLock::new(Classifications {
                entries,
                default_retryable,
            })),
        }
    }

    /// `true` if the failed record should be redelivered.
    pub fn classify(&self, exception: &ListenerException) -> bool {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);

        exception
            .chain()
            .find_map(|e| Self::lookup(&registry.entries, e.kind()))
            .unwrap_or(registry.default_retryable)
    }

    /// Verdict for a bare type, walking its supertypes.
    pub fn classify_type(&self, kind: ExceptionType) -> bool {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        Self::lookup(&registry.entries, kind).unwrap_or(registry.default_retryable)
    }

    fn lookup(entries: &HashMap<ExceptionType, bool>, kind: ExceptionType) -> Option<bool> {
        kind.ancestors().find_map(|t| entries.get(&t).copied())
    }

    pub fn add_not_retryable_exceptions(&self, types: &[ExceptionType]) {
        self.add(types, false);
    }

    pub fn add_retryable_exceptions(&self, types: &[ExceptionType]) {
        self.add(types, true);
    }

    fn add(&self, types: &[ExceptionType], retryable: bool) {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        for kind in types {
            registry.entries.insert(*kind, retryable);
        }
    }

    /// Replace the whole registry and default verdict.
    pub fn set_classifications(
        &self,
        classifications: HashMap<ExceptionType, bool>,
        default_retryable: bool,
    ) {
        let replacement = Classifications {
            entries: classifications,
            default_retryable,
        };
        *self.registry.write().unwrap_or_else(PoisonError::into_inner) = replacement;
    }

    /// Remove one explicit entry.
    ///
    /// `Some(previous)` when `kind` was registered, `None` when it never was.
    pub fn remove_classification(&self, kind: ExceptionType) -> Option<bool> {
        self.registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .remove(&kind)
    }

    /// Make unmatched exceptions not retryable; explicit entries are kept.
    pub fn default_false(&self) {
        self.registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .default_retryable = false;
    }

    pub fn default_retryable(&self) -> bool {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .default_retryable
    }

    /// Snapshot of the explicit entries.
    pub fn classifications(&self) -> HashMap<ExceptionType, bool> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .clone()
    }
}

/// Classification surface shared by every error handler shape.
///
/// Implementors provide [`RetryClassification::classifier`]; the mutators
/// default to forwarding there. Wrappers override them to forward to their
/// delegate instead.
pub trait RetryClassification {
    fn classifier(&self) -> &ExceptionClassifier;

    fn add_not_retryable_exceptions(&self, types: &[ExceptionType]) {
        self.classifier().add_not_retryable_exceptions(types);
    }

    fn add_retryable_exceptions(&self, types: &[ExceptionType]) {
        self.classifier().add_retryable_exceptions(types);
    }

    fn set_classifications(
        &self,
        classifications: HashMap<ExceptionType, bool>,
        default_retryable: bool,
    ) {
        self.classifier()
            .set_classifications(classifications, default_retryable);
    }

    fn remove_classification(&self, kind: ExceptionType) -> Option<bool> {
        self.classifier().remove_classification(kind)
    }

    fn default_false(&self) {
        self.classifier().default_false();
    }
}

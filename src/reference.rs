//! Payment reference generation
//!
//! A reference identifies exactly one checkout attempt. A retried checkout
//! gets a fresh reference; references are never reused.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque identifier for a single checkout attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct PaymentReference(String);

impl PaymentReference {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for PaymentReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for PaymentReference {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Produces references of the form `{order_id}-{tick}` where `tick` is a
/// microsecond timestamp forced to be strictly monotonic across calls, so two
/// generations for the same order in the same instant still differ.
#[derive(Debug, Default)]
pub struct ReferenceGenerator {
    last_tick: AtomicU64,
}

impl ReferenceGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generate(&self, order_id: &str) -> PaymentReference {
        let now = chrono::Utc::now().timestamp_micros().max(0) as u64;
        let mut prev = self.last_tick.load(Ordering::Relaxed);
        let tick = loop {
            let next = now.max(prev + 1);
            match self.last_tick.compare_exchange_weak(
                prev,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break next,
                Err(actual) => prev = actual,
            }
        };
        PaymentReference(format!("{}-{}", order_id, tick))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn references_carry_the_order_id_prefix() {
        let generator = ReferenceGenerator::new();
        let reference = generator.generate("ORD-100");
        assert!(reference.as_str().starts_with("ORD-100-"));
    }

    #[test]
    fn repeated_generation_for_the_same_order_never_collides() {
        let generator = ReferenceGenerator::new();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(generator.generate("ORD-100").into_inner()));
        }
    }

    #[test]
    fn concurrent_generation_is_unique() {
        let generator = std::sync::Arc::new(ReferenceGenerator::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let generator = generator.clone();
            handles.push(std::thread::spawn(move || {
                (0..1_000)
                    .map(|_| generator.generate("ORD-7").into_inner())
                    .collect::<Vec<_>>()
            }));
        }
        let mut seen = std::collections::HashSet::new();
        for handle in handles {
            for reference in handle.join().expect("worker thread panicked") {
                assert!(seen.insert(reference));
            }
        }
    }
}

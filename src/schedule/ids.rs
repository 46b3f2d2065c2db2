use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

/// Source of process-unique identifiers for entries and conflicts.
pub trait IdSource: Send + Sync {
    fn next_id(&self) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIds;

impl IdSource for UuidIds {
    fn next_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Monotonic `<namespace>-<n>` ids, starting at 1.
#[derive(Debug)]
pub struct SequentialIds {
    namespace: String,
    counter: AtomicU64,
}

impl SequentialIds {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            counter: AtomicU64::new(0),
        }
    }
}

impl IdSource for SequentialIds {
    fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{n}", self.namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::{IdSource, SequentialIds, UuidIds};

    #[test]
    fn sequential_ids_are_namespaced_and_increasing() {
        let ids = SequentialIds::new("conflict");
        assert_eq!(ids.next_id(), "conflict-1");
        assert_eq!(ids.next_id(), "conflict-2");
    }

    #[test]
    fn uuid_ids_do_not_repeat() {
        let ids = UuidIds;
        assert_ne!(ids.next_id(), ids.next_id());
    }
}

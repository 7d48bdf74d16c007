use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

/// Source of identifiers for newly created lists and tasks.
///
/// Implementations only need to make collisions unlikely; the mutator
/// re-draws any id already taken by a sibling.
pub trait IdSource: Send + Sync {
    fn next_id(&self) -> String;
}

/// Random v4 UUIDs. Distinct even for calls within the same instant.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIds;

impl IdSource for RandomIds {
    fn next_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Counter-based ids (`<prefix>1`, `<prefix>2`, ...), for deterministic output.
#[derive(Debug)]
pub struct SequentialIds {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl IdSource for SequentialIds {
    fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}{}", self.prefix, n)
    }
}

/// Draw ids until one is not in use among `siblings`.
pub(crate) fn fresh_id<'a, I>(source: &dyn IdSource, siblings: I) -> String
where
    I: Iterator<Item = &'a str> + Clone,
{
    loop {
        let candidate = source.next_id();
        if !siblings.clone().any(|id| id == candidate) {
            return candidate;
        }
    }
}

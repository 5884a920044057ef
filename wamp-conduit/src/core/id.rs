use std::{
    fmt::Display,
    sync::atomic::{
        AtomicU64,
        Ordering,
    },
};

use async_trait::async_trait;
use serde::{
    Deserialize,
    Serialize,
    de::{
        Unexpected,
        Visitor,
    },
};
use thiserror::Error;

/// An integer ID, used for identification of sessions, requests, and resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct Id(u64);

impl Id {
    /// The minimum allowable value of an ID.
    pub const MIN: Id = Id(1);

    /// The maximum allowable value of an ID.
    pub const MAX: Id = Id(1 << 53);

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl Default for Id {
    fn default() -> Self {
        Id::MIN
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Error for an ID being out of range.
#[derive(Debug, Error)]
#[error("{value} is out of range for IDs")]
pub struct IdOutOfRange {
    value: u64,
}

impl TryFrom<u64> for Id {
    type Error = IdOutOfRange;
    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value < Self::MIN.0 || value > Self::MAX.0 {
            Err(IdOutOfRange { value })
        } else {
            Ok(Id(value))
        }
    }
}

struct IdVisitor;

impl<'de> Visitor<'de> for IdVisitor {
    type Value = Id;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            formatter,
            "an unsigned integer in the range [{}, {}]",
            Id::MIN,
            Id::MAX
        )
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Id::try_from(v).map_err(|_| E::invalid_value(Unexpected::Unsigned(v), &self))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        u64::try_from(v)
            .ok()
            .and_then(|v| Id::try_from(v).ok())
            .ok_or_else(|| E::invalid_value(Unexpected::Signed(v), &self))
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_u64(IdVisitor)
    }
}

/// An ID allocator.
#[async_trait]
pub trait IdAllocator: Send + Sync {
    /// Generates a new ID.
    async fn generate_id(&self) -> Id;
}

/// An ID allocator that generates IDs from a random sequence.
///
/// Used for global-scoped IDs: sessions, publications, subscriptions, and registrations.
#[derive(Debug, Default)]
pub struct RandomIdAllocator {}

#[async_trait]
impl IdAllocator for RandomIdAllocator {
    async fn generate_id(&self) -> Id {
        Id((rand::random::<u64>() & (Id::MAX.0 - 1)) + 1)
    }
}

/// An ID allocator that generates IDs sequentially, wrapping back to [`Id::MIN`] after
/// [`Id::MAX`].
///
/// Used for session-scoped request IDs.
#[derive(Debug)]
pub struct SequentialIdAllocator {
    next: AtomicU64,
}

impl SequentialIdAllocator {
    /// Creates an allocator whose first ID is `first`.
    pub fn starting_at(first: Id) -> Self {
        Self {
            next: AtomicU64::new(first.0),
        }
    }

    pub fn next_id(&self) -> Id {
        let id = self
            .next
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |id| {
                Some(if id >= Id::MAX.0 { Id::MIN.0 } else { id + 1 })
            })
            .unwrap_or_else(|id| id);
        Id(id)
    }
}

impl Default for SequentialIdAllocator {
    fn default() -> Self {
        Self::starting_at(Id::MIN)
    }
}

#[async_trait]
impl IdAllocator for SequentialIdAllocator {
    async fn generate_id(&self) -> Id {
        self.next_id()
    }
}

#[cfg(test)]
mod id_test {
    use crate::core::id::{
        Id,
        IdAllocator,
        RandomIdAllocator,
        SequentialIdAllocator,
    };

    #[test]
    fn fails_deserialization_out_of_range() {
        assert_matches::assert_matches!(serde_json::from_str::<Id>(r#"0"#), Err(err) => {
            assert!(err.to_string().contains("expected an unsigned integer in the range"));
        });
        assert_matches::assert_matches!(serde_json::from_str::<Id>(r#"-1"#), Err(_));
        assert_matches::assert_matches!(serde_json::from_str::<Id>(r#"9007199254740993"#), Err(err) => {
            assert!(err.to_string().contains("expected an unsigned integer in the range"));
        });
    }

    #[tokio::test]
    async fn allocates_sequential_ids() {
        let allocator = SequentialIdAllocator::default();
        assert_eq!(allocator.generate_id().await, Id::MIN);
        assert_eq!(allocator.generate_id().await.value(), 2);
        assert_eq!(allocator.generate_id().await.value(), 3);
    }

    #[test]
    fn wraps_sequential_ids_after_max() {
        let allocator = SequentialIdAllocator::starting_at(Id::MAX);
        assert_eq!(allocator.next_id(), Id::MAX);
        assert_eq!(allocator.next_id(), Id::MIN);
    }

    #[tokio::test]
    async fn allocates_random_ids_in_range() {
        let allocator = RandomIdAllocator::default();
        for _ in 0..100 {
            let id = allocator.generate_id().await;
            assert!(id >= Id::MIN && id <= Id::MAX);
        }
    }
}

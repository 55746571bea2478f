//! Policies deciding when a batch is complete
//!
//! A `BatchCollector` knows two things about a batch type: when a batch
//! is ready to be flushed and how to create a fresh one. It never stores
//! a batch itself. The batch being filled is owned by the driver loop.
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::hash::{BuildHasher, Hash};
use std::iter;
use std::marker::PhantomData;

use crate::batchproc_types::Error;

/// Decides when a batch is ready and creates new batches
///
/// Implementations are expected to be total and free of side effects.
///
/// `new_batch` must not return a batch for which `is_ready` is already
/// `true`. Otherwise every item would cause a flush.
pub trait BatchCollector<B> {
    /// Returns `true` if `batch` should be flushed now.
    ///
    /// Called once per item after the item was merged into the batch.
    fn is_ready(&self, batch: &B) -> bool;

    /// Creates a fresh, empty batch.
    ///
    /// Called once per flush.
    fn new_batch(&self) -> B;
}

/// A `BatchCollector` that also knows how to merge an item into a batch
///
/// This is what `BatchProcessor::process` needs to drive a whole run.
pub trait ItemizedBatchCollector<B, S>: BatchCollector<B> {
    fn accumulate(&self, batch: &mut B, item: S);
}

impl<B, C> BatchCollector<B> for Box<C>
where
    C: BatchCollector<B> + ?Sized,
{
    fn is_ready(&self, batch: &B) -> bool {
        (**self).is_ready(batch)
    }

    fn new_batch(&self) -> B {
        (**self).new_batch()
    }
}

/// A collector made of a ready flag and a batch factory
///
/// # Example
///
/// ```rust
/// use batchproc::collector::{BatchCollector, FnCollector};
///
/// let collector = FnCollector::new(|batch: &Vec<u32>| batch.len() >= 2, Vec::<u32>::new);
///
/// assert!(!collector.is_ready(&vec![1u32]));
/// assert!(collector.is_ready(&vec![1u32, 2]));
/// ```
#[derive(Clone)]
pub struct FnCollector<R, F> {
    ready_flag: R,
    batch_factory: F,
}

impl<R, F> FnCollector<R, F> {
    pub fn new(ready_flag: R, batch_factory: F) -> Self {
        Self {
            ready_flag,
            batch_factory,
        }
    }
}

impl<B, R, F> BatchCollector<B> for FnCollector<R, F>
where
    R: Fn(&B) -> bool,
    F: Fn() -> B,
{
    fn is_ready(&self, batch: &B) -> bool {
        (self.ready_flag)(batch)
    }

    fn new_batch(&self) -> B {
        (self.batch_factory)()
    }
}

/// Batches which know the number of items they contain
pub trait BatchLen {
    fn batch_len(&self) -> usize;
}

impl<T> BatchLen for Vec<T> {
    fn batch_len(&self) -> usize {
        self.len()
    }
}

impl<T> BatchLen for VecDeque<T> {
    fn batch_len(&self) -> usize {
        self.len()
    }
}

impl<T, S> BatchLen for HashSet<T, S>
where
    T: Eq + Hash,
    S: BuildHasher,
{
    fn batch_len(&self) -> usize {
        self.len()
    }
}

impl<T> BatchLen for BTreeSet<T> {
    fn batch_len(&self) -> usize {
        self.len()
    }
}

impl<K, V, S> BatchLen for HashMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    fn batch_len(&self) -> usize {
        self.len()
    }
}

impl<K, V> BatchLen for BTreeMap<K, V> {
    fn batch_len(&self) -> usize {
        self.len()
    }
}

impl BatchLen for String {
    fn batch_len(&self) -> usize {
        self.len()
    }
}

/// Flushes a batch once it holds `max_size` items
///
/// Sets deduplicate items, so a `HashSet` batch may need more
/// items than `max_size` to be flushed.
pub struct SizeBasedCollector<B> {
    max_size: usize,
    _batch: PhantomData<fn() -> B>,
}

impl<B> SizeBasedCollector<B> {
    /// Fails if `max_size` is 0 since that would flush empty batches forever.
    pub fn new(max_size: usize) -> Result<Self, Error> {
        if max_size == 0 {
            return Err(Error::new("the maximum batch size must be greater than 0"));
        }

        Ok(Self {
            max_size,
            _batch: PhantomData,
        })
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

impl<B> Clone for SizeBasedCollector<B> {
    fn clone(&self) -> Self {
        Self {
            max_size: self.max_size,
            _batch: PhantomData,
        }
    }
}

impl<B> BatchCollector<B> for SizeBasedCollector<B>
where
    B: BatchLen + Default,
{
    fn is_ready(&self, batch: &B) -> bool {
        batch.batch_len() >= self.max_size
    }

    fn new_batch(&self) -> B {
        B::default()
    }
}

impl<B, S> ItemizedBatchCollector<B, S> for SizeBasedCollector<B>
where
    B: BatchLen + Default + Extend<S>,
{
    fn accumulate(&self, batch: &mut B, item: S) {
        batch.extend(iter::once(item));
    }
}

//! Fixed-bucket associative index from absolute path to a value.
//!
//! Buckets are chosen with the djb2 string hash reduced modulo the bucket
//! count. The bucket array never grows; with many more entries than buckets
//! lookups degrade toward a linear scan of the chain.

use std::ops::ControlFlow;

/// A value pushed out of the index by [`PathIndex::set`] or
/// [`PathIndex::remove`].
///
/// The caller owns it and has to say what happens to it: either
/// [`dispose`](Displaced::dispose) it or take it with
/// [`into_inner`](Displaced::into_inner).
#[must_use = "displaced index values must be disposed or taken"]
#[derive(Debug)]
pub struct Displaced<V>(Option<V>);

impl<V> Displaced<V> {
    pub fn dispose(self) {
        drop(self.0);
    }

    pub fn into_inner(self) -> Option<V> {
        self.0
    }

    pub fn is_some(&self) -> bool {
        self.0.is_some()
    }

    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }
}

pub(crate) fn djb2(key: &str) -> u64 {
    key.bytes()
        .fold(5381u64, |hash, byte| hash.wrapping_mul(33).wrapping_add(u64::from(byte)))
}

pub struct PathIndex<V> {
    buckets: Vec<Vec<(String, V)>>,
    count: usize,
}

impl<V> PathIndex<V> {
    /// Create an empty index with `bucket_count` chains (at least one).
    pub fn create(bucket_count: usize) -> Self {
        let bucket_count = bucket_count.max(1);
        let mut buckets = Vec::with_capacity(bucket_count);
        buckets.resize_with(bucket_count, Vec::new);
        PathIndex { buckets, count: 0 }
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    fn bucket_of(&self, path: &str) -> usize {
        (djb2(path) % self.buckets.len() as u64) as usize
    }

    fn position(&self, bucket: usize, path: &str) -> Option<usize> {
        self.buckets[bucket].iter().position(|(key, _)| key == path)
    }

    pub fn get(&self, path: &str) -> Option<&V> {
        let bucket = self.bucket_of(path);
        self.position(bucket, path)
            .map(|pos| &self.buckets[bucket][pos].1)
    }

    /// Store `value` under `path`, handing back whatever was there before.
    pub fn set(&mut self, path: &str, value: V) -> Displaced<V> {
        let bucket = self.bucket_of(path);
        match self.position(bucket, path) {
            Some(pos) => {
                let previous = std::mem::replace(&mut self.buckets[bucket][pos].1, value);
                Displaced(Some(previous))
            }
            None => {
                self.buckets[bucket].push((path.to_string(), value));
                self.count += 1;
                Displaced(None)
            }
        }
    }

    pub fn remove(&mut self, path: &str) -> Displaced<V> {
        let bucket = self.bucket_of(path);
        match self.position(bucket, path) {
            Some(pos) => {
                let (_, value) = self.buckets[bucket].swap_remove(pos);
                self.count -= 1;
                Displaced(Some(value))
            }
            None => Displaced(None),
        }
    }

    pub fn exists(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Visit every entry in unspecified order until the visitor breaks.
    pub fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(&str, &V) -> ControlFlow<()>,
    {
        for chain in &self.buckets {
            for (path, value) in chain {
                if visitor(path, value).is_break() {
                    return;
                }
            }
        }
    }

    /// Remove every entry, returning them for disposal.
    pub fn drain(&mut self) -> Vec<(String, V)> {
        self.count = 0;
        self.buckets
            .iter_mut()
            .flat_map(std::mem::take)
            .collect()
    }
}

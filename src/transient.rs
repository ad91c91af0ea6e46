//! Transients: single-owner batch mutation over the persistent vector.
//!
//! A transient owns a fresh edit token. Its operations run the same
//! tree walks as the persistent ones, but a node that is uniquely owned
//! *and* stamped with the transient's token is mutated in place instead
//! of copied, so a long run of edits allocates along each path once
//! rather than per edit. Converting back with [`TransientVector::persistent`]
//! consumes the transient; the token dies with it, and nodes still
//! carrying it are unreachable from any other transient.

use std::fmt;
use std::fmt::Debug;

use crate::mem::{MemoryPolicy, SharedMemory};
use crate::vector::node::Edit;
use crate::vector::Vector;

/// A mutable view of a [`Vector`]. Created by [`Vector::transient`],
/// dissolved by [`TransientVector::persistent`].
pub struct TransientVector<
    T,
    M: MemoryPolicy = SharedMemory,
    const BRANCH: usize = 32,
    const EXTRA: usize = 2,
> {
    vector: Vector<T, M, BRANCH, EXTRA>,
    edit: Edit,
}

impl<T, M: MemoryPolicy, const BRANCH: usize, const EXTRA: usize> Vector<T, M, BRANCH, EXTRA> {
    /// A transient over a snapshot of this vector. O(1): nothing is
    /// copied until the transient first writes to a shared node.
    pub fn transient(&self) -> TransientVector<T, M, BRANCH, EXTRA> {
        TransientVector {
            vector: self.clone(),
            edit: Edit::fresh(),
        }
    }
}

impl<T, M: MemoryPolicy, const BRANCH: usize, const EXTRA: usize>
    TransientVector<T, M, BRANCH, EXTRA>
{
    pub fn new() -> Self {
        Vector::new().transient()
    }

    pub fn len(&self) -> usize {
        self.vector.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vector.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.vector.get(index)
    }

    /// The immutable snapshot of the current state. Consumes the
    /// transient; its edit token can never be observed again.
    pub fn persistent(self) -> Vector<T, M, BRANCH, EXTRA> {
        self.vector
    }
}

impl<T: Clone, M: MemoryPolicy, const BRANCH: usize, const EXTRA: usize>
    TransientVector<T, M, BRANCH, EXTRA>
{
    pub fn push_back(&mut self, value: T) {
        self.vector.push_back_in(self.edit, value);
    }

    pub fn push_front(&mut self, value: T) {
        self.vector.push_front_in(self.edit, value);
    }

    /// Replaces position `index`. Panics out of range.
    pub fn set(&mut self, index: usize, value: T) {
        self.vector.update_in(self.edit, index, move |slot| *slot = value);
    }

    /// Applies `f` to position `index`. Panics out of range.
    pub fn update(&mut self, index: usize, f: impl FnOnce(&T) -> T) {
        self.vector.update_in(self.edit, index, move |slot| {
            let value = f(slot);
            *slot = value;
        });
    }

    /// Keeps the first `n` elements.
    pub fn take(&mut self, n: usize) {
        self.vector.take_in(self.edit, n);
    }

    /// Discards the first `n` elements.
    pub fn skip(&mut self, n: usize) {
        self.vector.skip_in(self.edit, n);
    }

    /// Appends the elements of `other`.
    pub fn append(&mut self, other: &Vector<T, M, BRANCH, EXTRA>) {
        self.vector.concat_in(self.edit, other);
    }
}

impl<T, M: MemoryPolicy, const BRANCH: usize, const EXTRA: usize> Default
    for TransientVector<T, M, BRANCH, EXTRA>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone, M: MemoryPolicy, const BRANCH: usize, const EXTRA: usize> Extend<T>
    for TransientVector<T, M, BRANCH, EXTRA>
{
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.push_back(value);
        }
    }
}

impl<T: Debug, M: MemoryPolicy, const BRANCH: usize, const EXTRA: usize> Debug
    for TransientVector<T, M, BRANCH, EXTRA>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.vector.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    type V4 = Vector<u64, SharedMemory, 4, 2>;

    #[test]
    fn build_and_freeze() {
        let mut t: TransientVector<u64, SharedMemory, 4, 2> = TransientVector::new();
        for i in 0..100 {
            t.push_back(i);
        }
        let v = t.persistent();
        v.check_invariants();
        assert_eq!(v.len(), 100);
        for i in 0..100 {
            assert_eq!(v[i as usize], i);
        }
    }

    #[test]
    fn source_survives_transient_edits() {
        let source: V4 = (0..200).collect();
        let before: Vec<u64> = source.iter().copied().collect();

        let mut t = source.transient();
        for i in 0..200 {
            t.set(i as usize, i + 1000);
        }
        t.skip(50);
        for i in 0..500 {
            t.push_back(i);
        }
        let edited = t.persistent();
        edited.check_invariants();

        let after: Vec<u64> = source.iter().copied().collect();
        assert_eq!(before, after);
        assert_eq!(edited.len(), 650);
    }

    #[test]
    fn back_to_back_transients() {
        let v0: V4 = (0..64).collect();
        let mut t1 = v0.transient();
        t1.push_back(64);
        let v1 = t1.persistent();
        // A second lineage over nodes stamped by the dead first token.
        let mut t2 = v1.transient();
        t2.push_back(65);
        t2.set(0, 9);
        let v2 = t2.persistent();
        v1.check_invariants();
        v2.check_invariants();
        assert_eq!(v1.len(), 65);
        assert_eq!(v2.len(), 66);
        assert_eq!(v1[0], 0);
        assert_eq!(v2[0], 9);
    }

    #[derive(Debug, Clone)]
    enum Op {
        PushBack(u64),
        PushFront(u64),
        Set(usize, u64),
        Take(usize),
        Skip(usize),
        Append(Vec<u64>),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            any::<u64>().prop_map(Op::PushBack),
            any::<u64>().prop_map(Op::PushFront),
            (any::<usize>(), any::<u64>()).prop_map(|(i, x)| Op::Set(i, x)),
            any::<usize>().prop_map(Op::Take),
            any::<usize>().prop_map(Op::Skip),
            prop::collection::vec(any::<u64>(), 0..40).prop_map(Op::Append),
        ]
    }

    proptest! {
        // The transient mirror of an operation sequence lands on the same
        // value as the persistent original.
        #[test]
        fn transient_equivalence(start in prop::collection::vec(any::<u64>(), 0..200),
                                 ops in prop::collection::vec(op_strategy(), 0..40)) {
            let base: V4 = start.iter().copied().collect();
            let mut persistent = base.clone();
            let mut transient = base.transient();

            for op in &ops {
                match op {
                    Op::PushBack(x) => {
                        persistent = persistent.push_back(*x);
                        transient.push_back(*x);
                    }
                    Op::PushFront(x) => {
                        persistent = persistent.push_front(*x);
                        transient.push_front(*x);
                    }
                    Op::Set(i, x) => {
                        if !persistent.is_empty() {
                            let i = i % persistent.len();
                            persistent = persistent.set(i, *x);
                            transient.set(i, *x);
                        }
                    }
                    Op::Take(n) => {
                        let n = n % (persistent.len() + 1);
                        persistent = persistent.take(n);
                        transient.take(n);
                    }
                    Op::Skip(n) => {
                        let n = n % (persistent.len() + 1);
                        persistent = persistent.skip(n);
                        transient.skip(n);
                    }
                    Op::Append(values) => {
                        let other: V4 = values.iter().copied().collect();
                        persistent = persistent.concat(&other);
                        transient.append(&other);
                    }
                }
            }

            let frozen = transient.persistent();
            frozen.check_invariants();
            persistent.check_invariants();
            prop_assert_eq!(frozen, persistent);
        }

        #[test]
        fn extend_is_bulk_append(start in prop::collection::vec(any::<u64>(), 0..100),
                                 bulk in prop::collection::vec(any::<u64>(), 0..300)) {
            let base: V4 = start.iter().copied().collect();
            let mut t = base.transient();
            t.extend(bulk.iter().copied());
            let v = t.persistent();
            v.check_invariants();
            let mut expected = start.clone();
            expected.extend_from_slice(&bulk);
            let got: Vec<u64> = v.iter().copied().collect();
            prop_assert_eq!(got, expected);
        }
    }
}

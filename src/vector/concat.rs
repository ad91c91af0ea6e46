//! Concatenation: a bottom-up merge of the two facing spines, with
//! bounded rebalancing at every level.
//!
//! The merge walks the right edge of the left tree and the left edge of
//! the right tree down to the leaves, then zips the two spines back up.
//! At each level the children around the seam are redistributed only when
//! their count exceeds the optimum by more than `EXTRA` slots; within the
//! slack, existing nodes are reused and keep their sharing.

use arrayvec::ArrayVec;

use super::node::{self, Edit, Inner, Node, NodeRef};
use super::Vector;
use crate::mem::{MemoryPolicy, Ref};

impl<T: Clone, M: MemoryPolicy, const BRANCH: usize, const EXTRA: usize>
    Vector<T, M, BRANCH, EXTRA>
{
    pub(crate) fn concat_in(&mut self, edit: Edit, other: &Self) {
        if other.size == 0 {
            return;
        }
        if self.size == 0 {
            *self = other.clone();
            return;
        }
        let total = self.size.checked_add(other.size).expect("length overflow");
        if total <= BRANCH {
            let mut elems = ArrayVec::new();
            elems.extend(self.iter().cloned());
            elems.extend(other.iter().cloned());
            *self = Vector {
                size: total,
                shift: Self::BITS,
                head: Self::empty_leaf(edit),
                root: Self::empty_leaf(edit),
                tail: Ref::new(Node::leaf(edit, elems)),
            };
            return;
        }

        // Fold the left tail and the right head into their trees, so the
        // merge sees two plain trees and the seam leaves sit inside them.
        let mut left_root = self.root.clone();
        let mut left_shift = self.shift;
        node::push_chunk_back(
            &mut left_root,
            &mut left_shift,
            self.root_size(),
            self.tail.clone(),
            edit,
        );
        let mut right_root = other.root.clone();
        let mut right_shift = other.shift;
        let right_tree_size = other.root_size() + other.head.leaf_ref().len();
        if other.head.leaf_ref().len() > 0 {
            node::push_chunk_front(
                &mut right_root,
                &mut right_shift,
                other.root_size(),
                other.head.clone(),
                edit,
            );
        }

        if right_tree_size == 0 {
            self.root = left_root;
            self.shift = left_shift;
        } else {
            let ls = if left_root.is_leaf() { 0 } else { left_shift };
            let rs = if right_root.is_leaf() { 0 } else { right_shift };
            self.root = Self::merge_rec(&left_root, ls, &right_root, rs, edit);
            self.shift = ls.max(rs) + Self::BITS;
        }
        self.tail = other.tail.clone();
        self.size = total;
        self.normalize_root(edit);
    }

    /// Merge two trees at shifts `ls` and `rs` (0 for bare leaves) into a
    /// node one level above the taller of the two, holding one or two
    /// children. Single-child results are unwrapped by the caller.
    fn merge_rec(
        left: &NodeRef<T, M, BRANCH>,
        ls: usize,
        right: &NodeRef<T, M, BRANCH>,
        rs: usize,
        edit: Edit,
    ) -> NodeRef<T, M, BRANCH> {
        let bits = Self::BITS;
        if ls == 0 && rs == 0 {
            let slots = Self::plan(vec![left.clone(), right.clone()], 0, edit);
            debug_assert!(slots.len() <= BRANCH);
            Self::pack_node(slots, bits, edit)
        } else if ls > rs {
            let li = left.inner_ref();
            let last = li.children.len() - 1;
            let center = Self::merge_rec(&li.children[last], ls - bits, right, rs, edit);
            let mid = center.inner_ref().children.iter().cloned().collect();
            Self::rebalance(Some(li), mid, None, ls, edit)
        } else if ls < rs {
            let ri = right.inner_ref();
            let center = Self::merge_rec(left, ls, &ri.children[0], rs - bits, edit);
            let mid = center.inner_ref().children.iter().cloned().collect();
            Self::rebalance(None, mid, Some(ri), rs, edit)
        } else {
            let li = left.inner_ref();
            let ri = right.inner_ref();
            let last = li.children.len() - 1;
            let center =
                Self::merge_rec(&li.children[last], ls - bits, &ri.children[0], rs - bits, edit);
            let mid = center.inner_ref().children.iter().cloned().collect();
            Self::rebalance(Some(li), mid, Some(ri), ls, edit)
        }
    }

    /// Gather the seam children at level `s - BITS` — everything of
    /// `left` but its last child, the merged center, everything of
    /// `right` but its first child — replan them, and wrap the result
    /// into a node at `s + BITS` with one or two children at `s`.
    fn rebalance(
        left: Option<&Inner<T, M, BRANCH>>,
        mid: Vec<NodeRef<T, M, BRANCH>>,
        right: Option<&Inner<T, M, BRANCH>>,
        s: usize,
        edit: Edit,
    ) -> NodeRef<T, M, BRANCH> {
        let bits = Self::BITS;
        let mut slots: Vec<NodeRef<T, M, BRANCH>> = Vec::new();
        if let Some(l) = left {
            slots.extend(l.children[..l.children.len() - 1].iter().cloned());
        }
        slots.extend(mid);
        if let Some(r) = right {
            slots.extend(r.children[1..].iter().cloned());
        }
        let mut slots = Self::plan(slots, s - bits, edit);
        if slots.len() <= BRANCH {
            let node = Self::pack_node(slots, s, edit);
            Self::pack_node(vec![node], s + bits, edit)
        } else {
            let second = slots.split_off(BRANCH);
            debug_assert!(second.len() <= BRANCH);
            let a = Self::pack_node(slots, s, edit);
            let b = Self::pack_node(second, s, edit);
            Self::pack_node(vec![a, b], s + bits, edit)
        }
    }

    /// The rebalancing policy: accept the current distribution when the
    /// slot count is within `EXTRA` of the optimum, otherwise repack.
    fn plan(
        slots: Vec<NodeRef<T, M, BRANCH>>,
        slot_shift: usize,
        edit: Edit,
    ) -> Vec<NodeRef<T, M, BRANCH>> {
        let total: usize = slots.iter().map(|slot| slot.slot_count()).sum();
        let optimal = (total + BRANCH - 1) / BRANCH;
        if slots.len() <= optimal + EXTRA {
            return slots;
        }
        Self::repack(slots, slot_shift, edit)
    }

    /// Left-to-right greedy redistribution: pull items into the current
    /// output slot until it is full, spill the rest into the next one.
    /// Slots that are already full pass through untouched when they land
    /// on an output boundary, keeping their sharing.
    fn repack(
        slots: Vec<NodeRef<T, M, BRANCH>>,
        slot_shift: usize,
        edit: Edit,
    ) -> Vec<NodeRef<T, M, BRANCH>> {
        let mut out = Vec::new();
        if slot_shift == 0 {
            let mut fill: ArrayVec<T, BRANCH> = ArrayVec::new();
            for slot in &slots {
                let elems = slot.leaf_ref();
                if fill.is_empty() && elems.len() == BRANCH {
                    out.push(slot.clone());
                    continue;
                }
                for value in elems {
                    fill.push(value.clone());
                    if fill.len() == BRANCH {
                        out.push(Ref::new(Node::leaf(edit, std::mem::take(&mut fill))));
                    }
                }
            }
            if !fill.is_empty() {
                out.push(Ref::new(Node::leaf(edit, fill)));
            }
        } else {
            let mut fill: Vec<NodeRef<T, M, BRANCH>> = Vec::new();
            for slot in &slots {
                if fill.is_empty() && slot.slot_count() == BRANCH {
                    out.push(slot.clone());
                    continue;
                }
                for child in &slot.inner_ref().children {
                    fill.push(child.clone());
                    if fill.len() == BRANCH {
                        out.push(Self::pack_node(std::mem::take(&mut fill), slot_shift, edit));
                    }
                }
            }
            if !fill.is_empty() {
                out.push(Self::pack_node(fill, slot_shift, edit));
            }
        }
        out
    }

    /// An inner node at shift `s` over `children`, with its size table
    /// computed — or dropped, when the children line up regular.
    fn pack_node(
        children: Vec<NodeRef<T, M, BRANCH>>,
        s: usize,
        edit: Edit,
    ) -> NodeRef<T, M, BRANCH> {
        let mut inner = Inner {
            children: children.into_iter().collect(),
            sizes: None,
        };
        inner.rebuild_sizes(s);
        Ref::new(Node::from_inner(edit, inner))
    }
}

#[cfg(test)]
mod tests {
    use crate::mem::SharedMemory;
    use crate::vector::Vector;
    use proptest::prelude::*;

    fn counting<const BRANCH: usize, const EXTRA: usize>(
        n: u64,
    ) -> Vector<u64, SharedMemory, BRANCH, EXTRA> {
        (0..n).collect()
    }

    #[test]
    fn concat_identity() {
        let empty: Vector<u64, SharedMemory, 4, 2> = Vector::new();
        let v = counting::<4, 2>(37);
        assert_eq!(empty.concat(&v), v);
        assert_eq!(v.concat(&empty), v);
    }

    #[test]
    fn concat_small() {
        let v = counting::<32, 2>(3);
        let c = v.concat(&v);
        c.check_invariants();
        assert_eq!(c.len(), 6);
        let expected: Vec<u64> = vec![0, 1, 2, 0, 1, 2];
        let got: Vec<u64> = c.iter().copied().collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn concat_crosses_levels() {
        let a = counting::<4, 2>(7);
        let b = counting::<4, 2>(7);
        let c = a.concat(&b);
        c.check_invariants();
        assert_eq!(c.len(), 14);
        assert_eq!(c[9], 2);
        let window: Vec<u64> = c.skip(1).take(12).iter().copied().collect();
        let expected: Vec<u64> = (1..13).map(|i| if i < 7 { i } else { i - 7 }).collect();
        assert_eq!(window, expected);
    }

    proptest! {
        #[test]
        fn concat_matches_model(a in prop::collection::vec(any::<u64>(), 0..300),
                                b in prop::collection::vec(any::<u64>(), 0..300)) {
            let va: Vector<u64, SharedMemory, 4, 2> = a.iter().copied().collect();
            let vb: Vector<u64, SharedMemory, 4, 2> = b.iter().copied().collect();
            let vc = va.concat(&vb);
            vc.check_invariants();
            let mut expected = a.clone();
            expected.extend_from_slice(&b);
            let got: Vec<u64> = vc.iter().copied().collect();
            prop_assert_eq!(got, expected);
            // Operands are unchanged.
            prop_assert_eq!(va.len(), a.len());
            prop_assert_eq!(vb.len(), b.len());
        }

        #[test]
        fn concat_associative(a in prop::collection::vec(any::<u64>(), 0..120),
                              b in prop::collection::vec(any::<u64>(), 0..120),
                              c in prop::collection::vec(any::<u64>(), 0..120)) {
            let va: Vector<u64, SharedMemory, 4, 2> = a.iter().copied().collect();
            let vb: Vector<u64, SharedMemory, 4, 2> = b.iter().copied().collect();
            let vc: Vector<u64, SharedMemory, 4, 2> = c.iter().copied().collect();
            let left = va.concat(&vb).concat(&vc);
            let right = va.concat(&vb.concat(&vc));
            left.check_invariants();
            right.check_invariants();
            prop_assert_eq!(left, right);
        }

        #[test]
        fn concat_without_slack(a in prop::collection::vec(any::<u64>(), 0..200),
                                b in prop::collection::vec(any::<u64>(), 0..200)) {
            let va: Vector<u64, SharedMemory, 4, 0> = a.iter().copied().collect();
            let vb: Vector<u64, SharedMemory, 4, 0> = b.iter().copied().collect();
            let vc = va.concat(&vb);
            vc.check_invariants();
            prop_assert_eq!(vc.len(), a.len() + b.len());
        }

        #[test]
        fn repeated_concat_stays_valid(n in 1u64..40, rounds in 1usize..6) {
            let unit = counting::<4, 2>(n);
            let mut acc = unit.clone();
            for _ in 0..rounds {
                acc = acc.concat(&unit);
                acc.check_invariants();
            }
            prop_assert_eq!(acc.len(), (rounds + 1) * n as usize);
        }

        #[test]
        fn concat_of_split_halves(values in prop::collection::vec(any::<u64>(), 0..400),
                                  cut: usize) {
            let v: Vector<u64, SharedMemory, 2, 2> = values.iter().copied().collect();
            let k = cut % (values.len() + 1);
            let (front, rest) = v.split_at(k);
            let glued = front.concat(&rest);
            glued.check_invariants();
            prop_assert_eq!(glued, v);
        }
    }
}

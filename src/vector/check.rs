//! Structural validation, used by the test suites after every operation.

use super::node::{Body, Node};
use super::Vector;
use crate::mem::MemoryPolicy;

impl<T, M: MemoryPolicy, const BRANCH: usize, const EXTRA: usize> Vector<T, M, BRANCH, EXTRA> {
    /// Walks the whole tree and panics on any violated invariant:
    /// child counts, shift accounting, size-table correctness, fullness
    /// of non-last children in regular nodes, and the head/tail contract.
    #[doc(hidden)]
    pub fn check_invariants(&self) {
        assert!(self.head.is_leaf(), "head is not a leaf");
        assert!(self.tail.is_leaf(), "tail is not a leaf");
        let head_len = self.head.leaf_ref().len();
        let tail_len = self.tail.leaf_ref().len();
        assert!(
            self.len() == 0 || tail_len > 0,
            "empty tail on a non-empty vector"
        );
        assert!(
            head_len + tail_len <= self.len(),
            "head and tail exceed the vector size"
        );
        let root_size = self.len() - head_len - tail_len;
        assert!(
            self.root_shift() >= Self::BITS && self.root_shift() % Self::BITS == 0,
            "bad root shift {}",
            self.root_shift()
        );
        if root_size == 0 {
            assert!(
                self.root_is_empty_leaf(),
                "dangling root on an empty root region"
            );
            assert_eq!(self.root_shift(), Self::BITS, "empty root with raised shift");
        } else if self.root_is_leaf() {
            assert_eq!(self.root_shift(), Self::BITS, "leaf root with raised shift");
            assert_eq!(self.root_leaf_len(), root_size, "leaf root size accounting");
        } else {
            // Single-child roots, regular or relaxed, never survive an
            // operation: they must have been unwrapped into their child.
            assert_ne!(
                self.root_child_count(),
                1,
                "single-child root was not unwrapped"
            );
            let counted = check_node(self.root_node(), self.root_shift());
            assert_eq!(counted, root_size, "root size accounting");
        }
    }

    fn root_node(&self) -> &Node<T, M, BRANCH> {
        &self.root
    }

    fn root_is_leaf(&self) -> bool {
        self.root.is_leaf()
    }

    fn root_is_empty_leaf(&self) -> bool {
        self.root.is_leaf() && self.root.leaf_ref().is_empty()
    }

    fn root_leaf_len(&self) -> usize {
        self.root.leaf_ref().len()
    }

    fn root_child_count(&self) -> usize {
        self.root.inner_ref().children.len()
    }
}

fn check_node<T, M: MemoryPolicy, const BRANCH: usize>(
    node: &Node<T, M, BRANCH>,
    shift: usize,
) -> usize {
    let bits = Node::<T, M, BRANCH>::BITS;
    match &node.body {
        Body::Leaf(elems) => {
            assert!(!elems.is_empty(), "empty leaf inside the tree");
            elems.len()
        }
        Body::Inner(inner) => {
            assert!(shift >= bits, "inner node below leaf level");
            let count = inner.children.len();
            assert!(count >= 1, "inner node without children");
            if shift == bits {
                for child in &inner.children {
                    assert!(child.is_leaf(), "non-leaf child at leaf level");
                }
            } else {
                for child in &inner.children {
                    assert!(!child.is_leaf(), "leaf child above leaf level");
                }
            }
            match &inner.sizes {
                Some(sizes) => {
                    assert!(count >= 2, "single-child node with a size table");
                    assert_eq!(sizes.len(), count, "size table length mismatch");
                    let mut previous = 0;
                    for (i, child) in inner.children.iter().enumerate() {
                        let size = check_node(child, shift - bits);
                        assert!(sizes[i] > previous, "size table not strictly increasing");
                        assert_eq!(
                            sizes[i] - previous,
                            size,
                            "size table entry disagrees with the subtree"
                        );
                        previous = sizes[i];
                    }
                    previous
                }
                None => {
                    let full = 1usize << shift;
                    let mut total = 0;
                    for (i, child) in inner.children.iter().enumerate() {
                        let size = check_node(child, shift - bits);
                        if i + 1 < count {
                            assert_eq!(size, full, "short child in a regular node");
                        }
                        total += size;
                    }
                    total
                }
            }
        }
    }
}

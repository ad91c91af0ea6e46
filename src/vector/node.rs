//! Node layout and the tree walks shared by the vector and its transient.
//!
//! A tree node is either a leaf of elements or an inner node of child
//! references. An inner node whose children are all full-width subtrees
//! (except possibly the last) is *regular* and addressed by radix
//! arithmetic alone; any other inner node is *relaxed* and carries a
//! cumulative size table. Every node also carries the [`Edit`] token of
//! the transient that allocated it, [`Edit::NONE`] for immutable history.

use std::sync::atomic::{AtomicU64, Ordering};

use arrayvec::ArrayVec;

use crate::mem::{AllocKind, AllocTag, MemoryPolicy, Ref};

/// Identity of a transient lineage. Compared only for equality; two nodes
/// with the same token were allocated under the same transient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Edit(u64);

impl Edit {
    pub(crate) const NONE: Edit = Edit(0);

    pub(crate) fn fresh() -> Edit {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Edit(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

pub(crate) type NodeRef<T, M, const BRANCH: usize> = Ref<Node<T, M, BRANCH>, M>;

pub(crate) struct Node<T, M: MemoryPolicy, const BRANCH: usize> {
    pub(crate) edit: Edit,
    pub(crate) body: Body<T, M, BRANCH>,
}

pub(crate) enum Body<T, M: MemoryPolicy, const BRANCH: usize> {
    Leaf(ArrayVec<T, BRANCH>),
    Inner(Inner<T, M, BRANCH>),
}

pub(crate) struct Inner<T, M: MemoryPolicy, const BRANCH: usize> {
    pub(crate) children: ArrayVec<NodeRef<T, M, BRANCH>, BRANCH>,
    /// `sizes[i]` is the element count of children `0..=i`. `None` for
    /// regular nodes.
    pub(crate) sizes: Option<Box<[usize]>>,
}

impl<T, M: MemoryPolicy, const BRANCH: usize> AllocTag for Node<T, M, BRANCH> {
    fn alloc_kind(&self) -> AllocKind {
        match self.body {
            Body::Leaf(_) => AllocKind::Leaf,
            Body::Inner(_) => AllocKind::Inner,
        }
    }
}

impl<T: Clone, M: MemoryPolicy, const BRANCH: usize> Clone for Node<T, M, BRANCH> {
    fn clone(&self) -> Self {
        let body = match &self.body {
            Body::Leaf(elems) => Body::Leaf(elems.clone()),
            Body::Inner(inner) => Body::Inner(Inner {
                children: inner.children.clone(),
                sizes: inner.sizes.clone(),
            }),
        };
        Node {
            edit: self.edit,
            body,
        }
    }
}

impl<T, M: MemoryPolicy, const BRANCH: usize> Node<T, M, BRANCH> {
    pub(crate) const BITS: usize = BRANCH.trailing_zeros() as usize;

    pub(crate) fn empty_leaf(edit: Edit) -> Self {
        Node {
            edit,
            body: Body::Leaf(ArrayVec::new()),
        }
    }

    pub(crate) fn leaf(edit: Edit, elems: ArrayVec<T, BRANCH>) -> Self {
        Node {
            edit,
            body: Body::Leaf(elems),
        }
    }

    pub(crate) fn unit_leaf(edit: Edit, value: T) -> Self {
        let mut elems = ArrayVec::new();
        elems.push(value);
        Node::leaf(edit, elems)
    }

    pub(crate) fn from_inner(edit: Edit, inner: Inner<T, M, BRANCH>) -> Self {
        Node {
            edit,
            body: Body::Inner(inner),
        }
    }

    pub(crate) fn inner(
        edit: Edit,
        children: ArrayVec<NodeRef<T, M, BRANCH>, BRANCH>,
        sizes: Option<Box<[usize]>>,
    ) -> Self {
        Node::from_inner(edit, Inner { children, sizes })
    }

    pub(crate) fn is_leaf(&self) -> bool {
        matches!(self.body, Body::Leaf(_))
    }

    pub(crate) fn leaf_ref(&self) -> &ArrayVec<T, BRANCH> {
        match &self.body {
            Body::Leaf(elems) => elems,
            Body::Inner(_) => panic!("leaf access on inner node"),
        }
    }

    pub(crate) fn leaf_mut(&mut self) -> &mut ArrayVec<T, BRANCH> {
        match &mut self.body {
            Body::Leaf(elems) => elems,
            Body::Inner(_) => panic!("leaf access on inner node"),
        }
    }

    pub(crate) fn inner_ref(&self) -> &Inner<T, M, BRANCH> {
        match &self.body {
            Body::Inner(inner) => inner,
            Body::Leaf(_) => panic!("inner access on leaf node"),
        }
    }

    pub(crate) fn inner_mut(&mut self) -> &mut Inner<T, M, BRANCH> {
        match &mut self.body {
            Body::Inner(inner) => inner,
            Body::Leaf(_) => panic!("inner access on leaf node"),
        }
    }

    /// Number of slots directly in this node: elements for a leaf,
    /// children for an inner node.
    pub(crate) fn slot_count(&self) -> usize {
        match &self.body {
            Body::Leaf(elems) => elems.len(),
            Body::Inner(inner) => inner.children.len(),
        }
    }

    /// Element count of the subtree, for a node at shift `shift`
    /// (leaves are at shift 0). O(1) on leaves and relaxed nodes, walks
    /// the right spine of regular nodes.
    pub(crate) fn tree_size(&self, shift: usize) -> usize {
        match &self.body {
            Body::Leaf(elems) => elems.len(),
            Body::Inner(inner) => match &inner.sizes {
                Some(sizes) => *sizes.last().expect("empty size table"),
                None => {
                    let count = inner.children.len();
                    ((count - 1) << shift)
                        + inner.children[count - 1].tree_size(shift - Self::BITS)
                }
            },
        }
    }
}

impl<T, M: MemoryPolicy, const BRANCH: usize> Inner<T, M, BRANCH> {
    pub(crate) const BITS: usize = BRANCH.trailing_zeros() as usize;
    pub(crate) const MASK: usize = BRANCH - 1;

    /// Child slot holding logical `index`, and the index relative to that
    /// child. `self` is at shift `shift`; `index` must be within the
    /// subtree.
    pub(crate) fn position(&self, shift: usize, index: usize) -> (usize, usize) {
        match &self.sizes {
            Some(sizes) => {
                let slot = sizes.partition_point(|&s| s <= index);
                let before = if slot == 0 { 0 } else { sizes[slot - 1] };
                (slot, index - before)
            }
            None => ((index >> shift) & Self::MASK, index & ((1 << shift) - 1)),
        }
    }

    pub(crate) fn child_size(&self, shift: usize, slot: usize) -> usize {
        match &self.sizes {
            Some(sizes) => sizes[slot] - if slot == 0 { 0 } else { sizes[slot - 1] },
            None => self.children[slot].tree_size(shift - Self::BITS),
        }
    }

    /// Recompute the size table from the children, dropping it again when
    /// the node turns out regular.
    pub(crate) fn rebuild_sizes(&mut self, shift: usize) {
        let full = 1usize << shift;
        let mut regular = true;
        let mut acc = 0;
        let mut table = Vec::with_capacity(self.children.len());
        for (i, child) in self.children.iter().enumerate() {
            let size = child.tree_size(shift - Self::BITS);
            acc += size;
            table.push(acc);
            if i + 1 < self.children.len() && size != full {
                regular = false;
            }
        }
        self.sizes = if regular || self.children.len() < 2 {
            None
        } else {
            Some(table.into_boxed_slice())
        };
    }

    /// Build the size table unconditionally, even if the node is still
    /// regular. Used right before an append that will break regularity.
    pub(crate) fn force_sizes(&mut self, shift: usize) {
        let mut acc = 0;
        let mut table = Vec::with_capacity(self.children.len());
        for child in &self.children {
            acc += child.tree_size(shift - Self::BITS);
            table.push(acc);
        }
        self.sizes = Some(table.into_boxed_slice());
    }
}

impl<T: Clone, M: MemoryPolicy, const BRANCH: usize> Ref<Node<T, M, BRANCH>, M> {
    /// The one copy-on-write primitive. Yields the node for in-place
    /// mutation iff this reference is unique and the node already belongs
    /// to `edit`; otherwise replaces it with a copy stamped with `edit`.
    pub(crate) fn make_edit(&mut self, edit: Edit) -> &mut Node<T, M, BRANCH> {
        if !(self.is_unique() && self.edit == edit) {
            let mut copy = (**self).clone();
            copy.edit = edit;
            *self = Ref::new(copy);
        }
        // SAFETY: either checked unique above or freshly allocated.
        unsafe { self.get_mut_unchecked() }
    }
}

fn append_entry(sizes: &mut Option<Box<[usize]>>, total: usize) {
    if let Some(s) = sizes {
        let mut table = Vec::with_capacity(s.len() + 1);
        table.extend_from_slice(s);
        table.push(total);
        *sizes = Some(table.into_boxed_slice());
    }
}

fn prepend_entry(sizes: &mut Option<Box<[usize]>>, first: usize) {
    if let Some(s) = sizes {
        let mut table = Vec::with_capacity(s.len() + 1);
        table.push(first);
        table.extend(s.iter().map(|&x| x + first));
        *sizes = Some(table.into_boxed_slice());
    }
}

fn truncate_entries(sizes: &mut Option<Box<[usize]>>, len: usize) {
    if let Some(s) = sizes {
        if len < 2 {
            *sizes = None;
        } else if s.len() > len {
            *sizes = Some(s[..len].to_vec().into_boxed_slice());
        }
    }
}

/// Clone-as-needed point update along one root-to-leaf path.
pub(crate) fn update_at<T, M, const BRANCH: usize>(
    node: &mut NodeRef<T, M, BRANCH>,
    shift: usize,
    index: usize,
    edit: Edit,
    f: impl FnOnce(&mut T),
) where
    T: Clone,
    M: MemoryPolicy,
{
    let node = node.make_edit(edit);
    match &mut node.body {
        Body::Leaf(elems) => f(&mut elems[index]),
        Body::Inner(inner) => {
            let (slot, sub) = inner.position(shift, index);
            let child_shift = shift - Inner::<T, M, BRANCH>::BITS;
            update_at(&mut inner.children[slot], child_shift, sub, edit, f);
        }
    }
}

/// Whether the right spine of `node` (at `shift`) can absorb one more
/// leaf without growing the tree.
pub(crate) fn has_back_room<T, M, const BRANCH: usize>(
    node: &Node<T, M, BRANCH>,
    shift: usize,
) -> bool
where
    M: MemoryPolicy,
{
    match &node.body {
        Body::Leaf(_) => false,
        Body::Inner(inner) => {
            if inner.children.len() < BRANCH {
                true
            } else if shift > Node::<T, M, BRANCH>::BITS {
                has_back_room(&inner.children[inner.children.len() - 1], shift - Node::<T, M, BRANCH>::BITS)
            } else {
                false
            }
        }
    }
}

pub(crate) fn has_front_room<T, M, const BRANCH: usize>(
    node: &Node<T, M, BRANCH>,
    shift: usize,
) -> bool
where
    M: MemoryPolicy,
{
    match &node.body {
        Body::Leaf(_) => false,
        Body::Inner(inner) => {
            if inner.children.len() < BRANCH {
                true
            } else if shift > Node::<T, M, BRANCH>::BITS {
                has_front_room(&inner.children[0], shift - Node::<T, M, BRANCH>::BITS)
            } else {
                false
            }
        }
    }
}

/// Wrap a leaf in single-child inner nodes up to `target_shift`.
fn make_spine<T, M, const BRANCH: usize>(
    chunk: NodeRef<T, M, BRANCH>,
    target_shift: usize,
    edit: Edit,
) -> NodeRef<T, M, BRANCH>
where
    T: Clone,
    M: MemoryPolicy,
{
    let bits = Node::<T, M, BRANCH>::BITS;
    let mut node = chunk;
    let mut shift = bits;
    while shift <= target_shift {
        let mut children = ArrayVec::new();
        children.push(node);
        node = Ref::new(Node::inner(edit, children, None));
        shift += bits;
    }
    node
}

/// Push a leaf as the new rightmost leaf of the tree rooted at `root`.
/// `root_size` is the element count under `root` before the push; `shift`
/// is updated in place when the tree grows.
pub(crate) fn push_chunk_back<T, M, const BRANCH: usize>(
    root: &mut NodeRef<T, M, BRANCH>,
    shift: &mut usize,
    root_size: usize,
    chunk: NodeRef<T, M, BRANCH>,
    edit: Edit,
) where
    T: Clone,
    M: MemoryPolicy,
{
    let bits = Node::<T, M, BRANCH>::BITS;
    let chunk_len = chunk.leaf_ref().len();
    if root_size == 0 {
        *root = chunk;
        *shift = bits;
        return;
    }
    if root.is_leaf() {
        let old_len = root.leaf_ref().len();
        let sizes = if old_len == BRANCH {
            None
        } else {
            Some(vec![old_len, old_len + chunk_len].into_boxed_slice())
        };
        let mut children = ArrayVec::new();
        children.push(root.clone());
        children.push(chunk);
        *root = Ref::new(Node::inner(edit, children, sizes));
        *shift = bits;
        return;
    }
    if has_back_room(root, *shift) {
        push_chunk_back_in(root, *shift, chunk, chunk_len, edit);
    } else {
        // No room along the right spine: add a level.
        let full = root_size == 1usize << (*shift + bits);
        let sizes = if full {
            None
        } else {
            Some(vec![root_size, root_size + chunk_len].into_boxed_slice())
        };
        let mut children = ArrayVec::new();
        children.push(root.clone());
        children.push(make_spine(chunk, *shift, edit));
        *root = Ref::new(Node::inner(edit, children, sizes));
        *shift += bits;
    }
}

fn push_chunk_back_in<T, M, const BRANCH: usize>(
    node: &mut NodeRef<T, M, BRANCH>,
    shift: usize,
    chunk: NodeRef<T, M, BRANCH>,
    chunk_len: usize,
    edit: Edit,
) where
    T: Clone,
    M: MemoryPolicy,
{
    let bits = Node::<T, M, BRANCH>::BITS;
    let node = node.make_edit(edit);
    let inner = node.inner_mut();
    if shift == bits {
        let last_partial = inner
            .children
            .last()
            .map_or(false, |c| c.leaf_ref().len() < BRANCH);
        if inner.sizes.is_none() && last_partial {
            inner.force_sizes(shift);
        }
        let total = inner
            .sizes
            .as_ref()
            .map(|s| *s.last().expect("empty size table") + chunk_len);
        if let Some(total) = total {
            append_entry(&mut inner.sizes, total);
        }
        inner.children.push(chunk);
        return;
    }
    let last = inner.children.len() - 1;
    if has_back_room(&inner.children[last], shift - bits) {
        if let Some(sizes) = &mut inner.sizes {
            *sizes.last_mut().expect("empty size table") += chunk_len;
        }
        push_chunk_back_in(&mut inner.children[last], shift - bits, chunk, chunk_len, edit);
    } else {
        let last_full = inner.children[last].tree_size(shift - bits) == 1usize << shift;
        if inner.sizes.is_none() && !last_full {
            inner.force_sizes(shift);
        }
        let total = inner
            .sizes
            .as_ref()
            .map(|s| *s.last().expect("empty size table") + chunk_len);
        if let Some(total) = total {
            append_entry(&mut inner.sizes, total);
        }
        inner.children.push(make_spine(chunk, shift - bits, edit));
    }
}

/// Push a leaf as the new leftmost leaf of the tree. The mirror of
/// [`push_chunk_back`]; levels above the lowest generally come out
/// relaxed, because the prepended subtree is not full-width.
pub(crate) fn push_chunk_front<T, M, const BRANCH: usize>(
    root: &mut NodeRef<T, M, BRANCH>,
    shift: &mut usize,
    root_size: usize,
    chunk: NodeRef<T, M, BRANCH>,
    edit: Edit,
) where
    T: Clone,
    M: MemoryPolicy,
{
    let bits = Node::<T, M, BRANCH>::BITS;
    let chunk_len = chunk.leaf_ref().len();
    if root_size == 0 {
        *root = chunk;
        *shift = bits;
        return;
    }
    if root.is_leaf() {
        let old_len = root.leaf_ref().len();
        let sizes = if chunk_len == BRANCH {
            None
        } else {
            Some(vec![chunk_len, chunk_len + old_len].into_boxed_slice())
        };
        let mut children = ArrayVec::new();
        children.push(chunk);
        children.push(root.clone());
        *root = Ref::new(Node::inner(edit, children, sizes));
        *shift = bits;
        return;
    }
    if has_front_room(root, *shift) {
        push_chunk_front_in(root, *shift, chunk, chunk_len, edit);
    } else {
        let mut children = ArrayVec::new();
        children.push(make_spine(chunk, *shift, edit));
        children.push(root.clone());
        let sizes = Some(vec![chunk_len, chunk_len + root_size].into_boxed_slice());
        *root = Ref::new(Node::inner(edit, children, sizes));
        *shift += bits;
    }
}

fn push_chunk_front_in<T, M, const BRANCH: usize>(
    node: &mut NodeRef<T, M, BRANCH>,
    shift: usize,
    chunk: NodeRef<T, M, BRANCH>,
    chunk_len: usize,
    edit: Edit,
) where
    T: Clone,
    M: MemoryPolicy,
{
    let bits = Node::<T, M, BRANCH>::BITS;
    let node = node.make_edit(edit);
    let inner = node.inner_mut();
    if shift == bits {
        // A full leaf in slot 0 keeps radix alignment; anything shorter
        // relaxes the node.
        if inner.sizes.is_none() && chunk_len < BRANCH {
            inner.force_sizes(shift);
        }
        prepend_entry(&mut inner.sizes, chunk_len);
        inner.children.insert(0, chunk);
        return;
    }
    if has_front_room(&inner.children[0], shift - bits) {
        push_chunk_front_in(&mut inner.children[0], shift - bits, chunk, chunk_len, edit);
        if let Some(sizes) = &mut inner.sizes {
            for entry in sizes.iter_mut() {
                *entry += chunk_len;
            }
        }
    } else {
        // The prepended spine holds fewer elements than a full child can,
        // so the node needs a table.
        if inner.sizes.is_none() {
            inner.force_sizes(shift);
        }
        prepend_entry(&mut inner.sizes, chunk_len);
        inner.children.insert(0, make_spine(chunk, shift - bits, edit));
    }
}

/// Crop the subtree to its first `n` elements (`1 <= n <= size`). The
/// boundary leaf is cut out of the tree and returned; it becomes the
/// caller's new tail. Right-edge cropping keeps regular nodes regular.
pub(crate) fn crop_back<T, M, const BRANCH: usize>(
    node: &mut NodeRef<T, M, BRANCH>,
    shift: usize,
    n: usize,
    edit: Edit,
) -> NodeRef<T, M, BRANCH>
where
    T: Clone,
    M: MemoryPolicy,
{
    let bits = Node::<T, M, BRANCH>::BITS;
    let node = node.make_edit(edit);
    let inner = node.inner_mut();
    let (slot, sub) = inner.position(shift, n - 1);
    let kept_in_child = sub + 1;
    inner.children.truncate(slot + 1);
    truncate_entries(&mut inner.sizes, slot + 1);
    if shift == bits {
        let mut leaf = inner.children.pop().expect("inner node without children");
        truncate_entries(&mut inner.sizes, slot);
        leaf.make_edit(edit).leaf_mut().truncate(kept_in_child);
        if inner.children.len() < 2 {
            inner.sizes = None;
        }
        return leaf;
    }
    let tail = crop_back(&mut inner.children[slot], shift - bits, kept_in_child, edit);
    let tail_len = tail.leaf_ref().len();
    if kept_in_child == tail_len {
        // The boundary child held nothing but the carved-out leaf.
        inner.children.pop();
        truncate_entries(&mut inner.sizes, slot);
    } else if let Some(sizes) = &mut inner.sizes {
        sizes[slot] = n - tail_len;
    }
    if inner.children.len() < 2 {
        inner.sizes = None;
    }
    tail
}

/// Drop the first `n` elements of the subtree (`1 <= n < size`). Returns
/// the remainder of the partially-cut boundary leaf, removed from the
/// tree, to become the caller's new head; `None` when the cut lands on a
/// leaf boundary.
pub(crate) fn crop_front<T, M, const BRANCH: usize>(
    node: &mut NodeRef<T, M, BRANCH>,
    shift: usize,
    n: usize,
    edit: Edit,
) -> Option<NodeRef<T, M, BRANCH>>
where
    T: Clone,
    M: MemoryPolicy,
{
    let bits = Node::<T, M, BRANCH>::BITS;
    let node = node.make_edit(edit);
    let inner = node.inner_mut();
    let (slot, sub) = inner.position(shift, n);
    let head = if sub == 0 {
        inner.children.drain(0..slot);
        None
    } else if shift == bits {
        let mut leaf = inner.children[slot].clone();
        inner.children.drain(0..=slot);
        leaf.make_edit(edit).leaf_mut().drain(0..sub);
        Some(leaf)
    } else {
        let child_size = inner.child_size(shift, slot);
        let head = crop_front(&mut inner.children[slot], shift - bits, sub, edit);
        let head_len = head.as_ref().map_or(0, |h| h.leaf_ref().len());
        if sub + head_len == child_size {
            inner.children.drain(0..=slot);
        } else {
            inner.children.drain(0..slot);
        }
        head
    };
    inner.rebuild_sizes(shift);
    head
}

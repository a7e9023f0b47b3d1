//! Pairing heap whose ordering is supplied at each call.
//!
//! Nodes live in an arena and link to their leftmost child and next sibling. The ordering is
//! not stored because the keys it compares (constraint slacks) change between calls; the heap
//! only promises that the root is minimal with respect to the comparisons it made.

#[derive(Debug, Clone)]
struct Node<T> {
    element: T,
    child: Option<usize>,
    sibling: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct PairingHeap<T> {
    nodes: Vec<Option<Node<T>>>,
    free: Vec<usize>,
    root: Option<usize>,
    len: usize,
}

impl<T> Default for PairingHeap<T> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            root: None,
            len: 0,
        }
    }
}

impl<T> PairingHeap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn find_min(&self) -> Option<&T> {
        self.root.map(|r| &self.node(r).element)
    }

    pub fn insert(&mut self, element: T, less: impl Fn(&T, &T) -> bool) {
        let node = Node {
            element,
            child: None,
            sibling: None,
        };
        let id = match self.free.pop() {
            Some(id) => {
                self.nodes[id] = Some(node);
                id
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        };
        self.len += 1;
        self.root = Some(match self.root {
            Some(root) => self.link(root, id, &less),
            None => id,
        });
    }

    pub fn delete_min(&mut self, less: impl Fn(&T, &T) -> bool) -> Option<T> {
        let root = self.root?;
        let node = self.nodes[root].take()?;
        self.free.push(root);
        self.len -= 1;
        self.root = node.child.map(|first| self.combine_siblings(first, &less));
        Some(node.element)
    }

    /// Moves every element of `other` into `self`, leaving `other` empty.
    pub fn merge(&mut self, other: &mut PairingHeap<T>, less: impl Fn(&T, &T) -> bool) {
        if other.is_empty() {
            return;
        }
        // Re-index the smaller arena.
        if other.nodes.len() > self.nodes.len() {
            std::mem::swap(self, other);
        }
        let Some(other_root) = other.root.take() else {
            return;
        };
        let shift = self.nodes.len();
        self.nodes.extend(other.nodes.drain(..).map(|slot| {
            slot.map(|mut n| {
                n.child = n.child.map(|c| c + shift);
                n.sibling = n.sibling.map(|s| s + shift);
                n
            })
        }));
        self.free.extend(other.free.drain(..).map(|f| f + shift));
        self.len += std::mem::take(&mut other.len);
        let other_root = other_root + shift;
        self.root = Some(match self.root {
            Some(root) => self.link(root, other_root, &less),
            None => other_root,
        });
    }

    fn node(&self, id: usize) -> &Node<T> {
        match &self.nodes[id] {
            Some(n) => n,
            None => unreachable!("heap links point at live nodes"),
        }
    }

    fn node_mut(&mut self, id: usize) -> &mut Node<T> {
        match &mut self.nodes[id] {
            Some(n) => n,
            None => unreachable!("heap links point at live nodes"),
        }
    }

    /// Links two roots without siblings; the larger becomes the leftmost child of the smaller.
    fn link(&mut self, a: usize, b: usize, less: &impl Fn(&T, &T) -> bool) -> usize {
        let (parent, child) = if less(&self.node(b).element, &self.node(a).element) {
            (b, a)
        } else {
            (a, b)
        };
        let first = self.node(parent).child;
        self.node_mut(child).sibling = first;
        self.node_mut(parent).child = Some(child);
        parent
    }

    /// Two-pass combining: pair up siblings left to right, then fold the pairs right to left.
    fn combine_siblings(&mut self, first: usize, less: &impl Fn(&T, &T) -> bool) -> usize {
        let mut trees = Vec::new();
        let mut next = Some(first);
        while let Some(id) = next {
            next = self.node_mut(id).sibling.take();
            trees.push(id);
        }

        let mut paired = Vec::with_capacity(trees.len().div_ceil(2));
        for pair in trees.chunks(2) {
            paired.push(match *pair {
                [a, b] => self.link(a, b, less),
                [a] => a,
                _ => unreachable!(),
            });
        }
        let mut root = paired.pop().unwrap_or(first);
        while let Some(t) = paired.pop() {
            root = self.link(t, root, less);
        }
        root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lt(a: &i32, b: &i32) -> bool {
        a < b
    }

    fn drain(h: &mut PairingHeap<i32>) -> Vec<i32> {
        let mut out = Vec::new();
        while let Some(v) = h.delete_min(lt) {
            out.push(v);
        }
        out
    }

    #[test]
    fn delete_min_yields_sorted_order() {
        let mut h = PairingHeap::new();
        for v in [5, 3, 9, 1, 7, 3, 0, 8] {
            h.insert(v, lt);
        }
        assert_eq!(h.len(), 8);
        assert_eq!(h.find_min(), Some(&0));
        assert_eq!(drain(&mut h), vec![0, 1, 3, 3, 5, 7, 8, 9]);
        assert!(h.is_empty());
        assert_eq!(h.delete_min(lt), None);
    }

    #[test]
    fn merge_moves_everything_and_empties_the_source() {
        let mut a = PairingHeap::new();
        let mut b = PairingHeap::new();
        for v in [4, 2, 6] {
            a.insert(v, lt);
        }
        for v in [5, 1, 3, 7, 9] {
            b.insert(v, lt);
        }
        a.delete_min(lt);
        a.merge(&mut b, lt);
        assert!(b.is_empty());
        assert_eq!(b.len(), 0);
        assert_eq!(a.len(), 7);
        assert_eq!(drain(&mut a), vec![1, 3, 4, 5, 6, 7, 9]);
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut h = PairingHeap::new();
        for v in 0..4 {
            h.insert(v, lt);
        }
        h.delete_min(lt);
        h.delete_min(lt);
        h.insert(-1, lt);
        h.insert(10, lt);
        assert_eq!(h.nodes.len(), 4);
        assert_eq!(drain(&mut h), vec![-1, 2, 3, 10]);
    }

    #[test]
    fn ordering_can_change_between_calls() {
        let mut h = PairingHeap::new();
        for v in [1, 2, 3] {
            h.insert(v, lt);
        }
        let gt = |a: &i32, b: &i32| a > b;
        h.insert(0, gt);
        // The root was chosen under the old ordering; 0 lost against 1 under `gt`.
        assert_eq!(h.find_min(), Some(&1));
    }
}

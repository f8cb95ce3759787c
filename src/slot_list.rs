use crate::die;

/// Index of a slot inside the pool arena
pub(crate) type SlotId = usize;

/// Intrusive doubly-linked list links, stored in each node
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Link {
    prev: Option<SlotId>,
    next: Option<SlotId>,
}

/// A node that can be chained in a [`SlotList`]
pub(crate) trait Linked {
    fn link(&self) -> &Link;
    fn link_mut(&mut self) -> &mut Link;
}

/// A doubly-linked list threaded through an arena of [`Linked`] nodes.
///
/// The list only stores its head and length, the nodes are owned by the arena
/// and addressed by index. A node must be in at most one list at a time.
#[derive(Debug, Default)]
pub(crate) struct SlotList {
    head: Option<SlotId>,
    len: usize,
}

impl SlotList {
    pub(crate) const fn new() -> Self {
        Self { head: None, len: 0 }
    }

    #[inline(always)]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Adds `id` at the front of the list
    ///
    /// # Complexity
    ///  * O(1)
    pub(crate) fn push_front<T: Linked>(&mut self, nodes: &mut [T], id: SlotId) {
        if let Some(old_head) = self.head {
            nodes[old_head].link_mut().prev = Some(id);
        }
        *nodes[id].link_mut() = Link {
            prev: None,
            next: self.head,
        };
        self.head = Some(id);
        self.len += 1;
    }

    /// Removes and returns the front of the list
    ///
    /// # Complexity
    ///  * O(1)
    pub(crate) fn pop_front<T: Linked>(&mut self, nodes: &mut [T]) -> Option<SlotId> {
        let id = self.head?;
        self.unlink(nodes, id);
        Some(id)
    }

    /// Removes `id` from the list, aborting when it is not a member.
    ///
    /// # Complexity
    ///  * O(n), the list is walked from its head up to `id`
    pub(crate) fn remove<T: Linked>(&mut self, nodes: &mut [T], id: SlotId) {
        if !self.contains(nodes, id) {
            die(&format!("Slot {id} is not a member of the list it is removed from"));
        }
        self.unlink(nodes, id);
    }

    fn unlink<T: Linked>(&mut self, nodes: &mut [T], id: SlotId) {
        let link = *nodes[id].link();
        match link.prev {
            Some(prev) => nodes[prev].link_mut().next = link.next,
            None => self.head = link.next,
        }
        if let Some(next) = link.next {
            nodes[next].link_mut().prev = link.prev;
        }
        *nodes[id].link_mut() = Link::default();
        self.len -= 1;
    }

    pub(crate) fn contains<T: Linked>(&self, nodes: &[T], id: SlotId) -> bool {
        self.iter(nodes).any(|it| it == id)
    }

    /// Returns the node `n` steps away from the head
    ///
    /// # Complexity
    ///  * O(n)
    pub(crate) fn nth<T: Linked>(&self, nodes: &[T], n: usize) -> Option<SlotId> {
        self.iter(nodes).nth(n)
    }

    pub(crate) fn iter<'a, T: Linked>(&self, nodes: &'a [T]) -> Iter<'a, T> {
        Iter {
            nodes,
            next: self.head,
        }
    }
}

pub(crate) struct Iter<'a, T: Linked> {
    nodes: &'a [T],
    next: Option<SlotId>,
}

impl<T: Linked> Iterator for Iter<'_, T> {
    type Item = SlotId;

    fn next(&mut self) -> Option<SlotId> {
        let id = self.next?;
        self.next = self.nodes[id].link().next;
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Node {
        link: Link,
    }
    impl Linked for Node {
        fn link(&self) -> &Link {
            &self.link
        }
        fn link_mut(&mut self) -> &mut Link {
            &mut self.link
        }
    }

    fn nodes(n: usize) -> Vec<Node> {
        (0..n).map(|_| Node::default()).collect()
    }

    fn collect(list: &SlotList, nodes: &[Node]) -> Vec<SlotId> {
        list.iter(nodes).collect()
    }

    #[test]
    fn test_empty() {
        let mut arena = nodes(2);
        let mut l = SlotList::new();
        assert_eq!(l.len(), 0);
        assert_eq!(l.head, None);
        assert_eq!(l.pop_front(&mut arena), None);
        assert!(!l.contains(&arena, 0));
        assert_eq!(l.nth(&arena, 0), None);
    }

    #[test]
    fn test_push_pop() {
        let mut arena = nodes(3);
        let mut l = SlotList::new();
        l.push_front(&mut arena, 0);
        l.push_front(&mut arena, 1);
        l.push_front(&mut arena, 2);
        assert_eq!(l.len(), 3);
        assert_eq!(collect(&l, &arena), vec![2, 1, 0]);
        assert_eq!(arena[1].link.prev, Some(2));
        assert_eq!(arena[1].link.next, Some(0));

        assert_eq!(l.pop_front(&mut arena), Some(2));
        assert_eq!(arena[2].link, Link::default());
        assert_eq!(arena[1].link.prev, None);
        assert_eq!(collect(&l, &arena), vec![1, 0]);
        assert_eq!(l.pop_front(&mut arena), Some(1));
        assert_eq!(l.pop_front(&mut arena), Some(0));
        assert_eq!(l.head, None);
        assert_eq!(l.len(), 0);
    }

    #[test]
    fn test_remove() {
        let mut arena = nodes(5);
        let mut l = SlotList::new();
        for id in 0..5 {
            l.push_front(&mut arena, id);
        }
        // middle
        l.remove(&mut arena, 2);
        assert_eq!(collect(&l, &arena), vec![4, 3, 1, 0]);
        assert_eq!(arena[3].link.next, Some(1));
        assert_eq!(arena[1].link.prev, Some(3));
        // tail
        l.remove(&mut arena, 0);
        assert_eq!(collect(&l, &arena), vec![4, 3, 1]);
        assert_eq!(arena[1].link.next, None);
        // head
        l.remove(&mut arena, 4);
        assert_eq!(collect(&l, &arena), vec![3, 1]);
        assert_eq!(l.head, Some(3));
        assert_eq!(arena[3].link.prev, None);
        assert_eq!(l.len(), 2);
        assert!(!l.contains(&arena, 2));
    }

    #[test]
    fn test_move_between_lists() {
        let mut arena = nodes(4);
        let mut a = SlotList::new();
        let mut b = SlotList::new();
        for id in (0..4).rev() {
            a.push_front(&mut arena, id);
        }
        let id = a.pop_front(&mut arena).unwrap();
        b.push_front(&mut arena, id);
        a.remove(&mut arena, 2);
        b.push_front(&mut arena, 2);
        assert_eq!(collect(&a, &arena), vec![1, 3]);
        assert_eq!(collect(&b, &arena), vec![2, 0]);
        assert_eq!(a.len() + b.len(), 4);
        assert_eq!(b.nth(&arena, 1), Some(0));
        assert_eq!(b.nth(&arena, 2), None);
    }

    const CHILD_ENV: &str = "COROPOOL_SLOT_LIST_CHILD";

    #[test]
    fn test_remove_non_member_aborts() {
        const NAME: &str = "slot_list::tests::test_remove_non_member_aborts";
        if std::env::var(CHILD_ENV).is_ok() {
            let mut arena = nodes(3);
            let mut l = SlotList::new();
            l.push_front(&mut arena, 0);
            l.push_front(&mut arena, 1);
            l.remove(&mut arena, 2);
            eprintln!("unreachable");
            return;
        }
        let output = std::process::Command::new(std::env::current_exe().unwrap())
            .args([NAME, "--exact", "--nocapture", "--test-threads=1"])
            .env(CHILD_ENV, "1")
            .output()
            .unwrap();
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(!output.status.success(), "{stderr}");
        assert!(stderr.contains("Slot 2 is not a member"), "{stderr}");
        assert!(!stderr.contains("unreachable"), "{stderr}");
    }
}

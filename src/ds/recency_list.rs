//! Recency list backed by a slot arena.
//!
//! Nodes live in a `Vec<Option<Node>>` with a free list and are linked by
//! [`SlotId`], so moving an entry to the front or unlinking it is O(1) and
//! never chases raw pointers.
//!
//! ```text
//!   head (MRU) ─► [id_3] ◄──► [id_1] ◄──► [id_2] ◄── tail (LRU)
//! ```
//!
//! New nodes enter at the head. Entries that were never touched again keep
//! their insertion order towards the tail, which is what breaks ties between
//! equally stale entries.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(usize);

impl SlotId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug)]
struct Node<T> {
    value: T,
    prev: Option<SlotId>,
    next: Option<SlotId>,
}

/// Doubly linked recency order over values of type `T`.
#[derive(Debug)]
pub struct RecencyList<T> {
    slots: Vec<Option<Node<T>>>,
    free: Vec<usize>,
    head: Option<SlotId>,
    tail: Option<SlotId>,
    len: usize,
}

impl<T> RecencyList<T> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, id: SlotId) -> bool {
        self.node(id).is_some()
    }

    pub fn get(&self, id: SlotId) -> Option<&T> {
        self.node(id).map(|node| &node.value)
    }

    /// Value at the least-recently-used end.
    pub fn back(&self) -> Option<&T> {
        self.tail.and_then(|id| self.get(id))
    }

    /// Inserts `value` as most recently used.
    pub fn push_front(&mut self, value: T) -> SlotId {
        let node = Node {
            value,
            prev: None,
            next: self.head,
        };
        let id = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(node);
                SlotId(idx)
            },
            None => {
                self.slots.push(Some(node));
                SlotId(self.slots.len() - 1)
            },
        };
        match self.head {
            Some(old_head) => {
                if let Some(head_node) = self.node_mut(old_head) {
                    head_node.prev = Some(id);
                }
            },
            None => self.tail = Some(id),
        }
        self.head = Some(id);
        self.len += 1;
        id
    }

    /// Removes and returns the least-recently-used value.
    pub fn pop_back(&mut self) -> Option<T> {
        let id = self.tail?;
        self.remove(id)
    }

    /// Unlinks `id` and frees its slot.
    pub fn remove(&mut self, id: SlotId) -> Option<T> {
        self.detach(id)?;
        let node = self.slots.get_mut(id.0)?.take()?;
        self.free.push(id.0);
        self.len -= 1;
        Some(node.value)
    }

    /// Moves `id` to the head; returns `false` if `id` is not live.
    pub fn move_to_front(&mut self, id: SlotId) -> bool {
        if !self.contains(id) {
            return false;
        }
        if self.head == Some(id) {
            return true;
        }
        self.detach(id);
        let old_head = self.head;
        if let Some(node) = self.node_mut(id) {
            node.prev = None;
            node.next = old_head;
        }
        if let Some(old_head) = old_head {
            if let Some(head_node) = self.node_mut(old_head) {
                head_node.prev = Some(id);
            }
        } else {
            self.tail = Some(id);
        }
        self.head = Some(id);
        true
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
        self.len = 0;
    }

    /// Iterates from most to least recently used.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        let mut current = self.head;
        std::iter::from_fn(move || {
            let node = self.node(current?)?;
            current = node.next;
            Some(&node.value)
        })
    }

    fn node(&self, id: SlotId) -> Option<&Node<T>> {
        self.slots.get(id.0).and_then(|slot| slot.as_ref())
    }

    fn node_mut(&mut self, id: SlotId) -> Option<&mut Node<T>> {
        self.slots.get_mut(id.0).and_then(|slot| slot.as_mut())
    }

    fn detach(&mut self, id: SlotId) -> Option<()> {
        let (prev, next) = {
            let node = self.node(id)?;
            (node.prev, node.next)
        };

        match prev {
            Some(prev_id) => {
                if let Some(prev_node) = self.node_mut(prev_id) {
                    prev_node.next = next;
                }
            },
            None => self.head = next,
        }
        match next {
            Some(next_id) => {
                if let Some(next_node) = self.node_mut(next_id) {
                    next_node.prev = prev;
                }
            },
            None => self.tail = prev,
        }

        if let Some(node) = self.node_mut(id) {
            node.prev = None;
            node.next = None;
        }
        Some(())
    }
}

impl<T> Default for RecencyList<T> {
    fn default() -> Self {
        Self::new()
    }
}

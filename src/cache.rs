use std::collections::HashMap;
use std::hash::Hash;

const NIL: usize = usize::MAX;

struct Node<K, V> {
    key: K,
    value: V,
    /// Towards the most recently used end.
    newer: usize,
    /// Towards the least recently used end.
    older: usize,
}

pub struct LruCache<K, V> {
    capacity: usize,
    index: HashMap<K, usize>,
    nodes: Vec<Option<Node<K, V>>>,
    free: Vec<usize>,
    newest: usize,
    oldest: usize,
}

impl<K: Hash + Eq + Clone, V> LruCache<K, V> {
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "LruCache capacity must be positive");
        LruCache {
            capacity,
            index: HashMap::with_capacity(capacity),
            nodes: Vec::with_capacity(capacity),
            free: Vec::new(),
            newest: NIL,
            oldest: NIL,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Looks up `key` and marks it as the most recently used entry.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let slot = *self.index.get(key)?;
        self.detach(slot);
        self.push_newest(slot);
        self.nodes[slot].as_ref().map(|n| &n.value)
    }

    /// Looks up `key` without touching its recency.
    pub fn peek(&self, key: &K) -> Option<&V> {
        let slot = *self.index.get(key)?;
        self.nodes[slot].as_ref().map(|n| &n.value)
    }

    /// Inserts or replaces `key` as the most recently used entry. If that pushes the cache over
    /// capacity, the least recently used entry is removed and returned.
    pub fn put(&mut self, key: K, value: V) -> Option<(K, V)> {
        if let Some(&slot) = self.index.get(&key) {
            if let Some(node) = self.nodes[slot].as_mut() {
                node.value = value;
            }
            self.detach(slot);
            self.push_newest(slot);
            return None;
        }

        let node = Node {
            key: key.clone(),
            value,
            newer: NIL,
            older: NIL,
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                slot
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        };
        self.index.insert(key, slot);
        self.push_newest(slot);

        if self.index.len() > self.capacity {
            self.pop_oldest()
        } else {
            None
        }
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let slot = self.index.remove(key)?;
        self.detach(slot);
        self.free.push(slot);
        self.nodes[slot].take().map(|n| n.value)
    }

    pub fn clear(&mut self) {
        self.index.clear();
        self.nodes.clear();
        self.free.clear();
        self.newest = NIL;
        self.oldest = NIL;
    }

    /// Keys from most to least recently used.
    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        let mut slot = self.newest;
        std::iter::from_fn(move || {
            let node = self.nodes.get(slot)?.as_ref()?;
            slot = node.older;
            Some(&node.key)
        })
    }

    fn pop_oldest(&mut self) -> Option<(K, V)> {
        let slot = self.oldest;
        if slot == NIL {
            return None;
        }
        self.detach(slot);
        self.free.push(slot);
        let node = self.nodes[slot].take()?;
        self.index.remove(&node.key);
        Some((node.key, node.value))
    }

    fn detach(&mut self, slot: usize) {
        let (newer, older) = match self.nodes[slot].as_ref() {
            Some(node) => (node.newer, node.older),
            None => return,
        };
        match newer {
            NIL => self.newest = older,
            n => self.link_mut(n).older = older,
        }
        match older {
            NIL => self.oldest = newer,
            o => self.link_mut(o).newer = newer,
        }
        let node = self.link_mut(slot);
        node.newer = NIL;
        node.older = NIL;
    }

    fn push_newest(&mut self, slot: usize) {
        let previous = self.newest;
        {
            let node = self.link_mut(slot);
            node.older = previous;
            node.newer = NIL;
        }
        match previous {
            NIL => self.oldest = slot,
            p => self.link_mut(p).newer = slot,
        }
        self.newest = slot;
    }

    fn link_mut(&mut self, slot: usize) -> &mut Node<K, V> {
        self.nodes[slot]
            .as_mut()
            .expect("recency list points at a vacant slot")
    }
}

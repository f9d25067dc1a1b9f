/// Distance between consecutive paper planes in the scene. Layer `i` sits at `-i * LAYER_SPACING`.
pub const LAYER_SPACING: f64 = 0.5;

pub fn layer_depth(index: usize) -> f64 {
    -(index as f64) * LAYER_SPACING
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub layer: usize,
    pub epoch: u64,
}

#[derive(Debug)]
struct Slot<T> {
    epoch: u64,
    committed: Option<u64>,
    value: Option<T>,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Slot {
            epoch: 0,
            committed: None,
            value: None,
        }
    }
}

#[derive(Debug)]
pub struct LayerSlots<T> {
    slots: Vec<Slot<T>>,
    active: usize,
}

impl<T> Default for LayerSlots<T> {
    fn default() -> Self {
        LayerSlots {
            slots: Vec::new(),
            active: 0,
        }
    }
}

impl<T> LayerSlots<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new cycle over `count` layers. Every slot's epoch advances, including slots past
    /// `count`, which are also emptied: outstanding work for them is dead.
    pub fn begin_cycle(&mut self, count: usize) -> Vec<Ticket> {
        if self.slots.len() < count {
            self.slots.resize_with(count, Slot::default);
        }
        self.active = count;
        for (layer, slot) in self.slots.iter_mut().enumerate() {
            slot.epoch += 1;
            if layer >= count {
                slot.value = None;
                slot.committed = None;
            }
        }
        (0..count).map(|layer| self.ticket(layer)).collect()
    }

    /// Starts new work for a single active layer, invalidating only that layer's older tickets.
    pub fn begin(&mut self, layer: usize) -> Option<Ticket> {
        if layer >= self.active {
            return None;
        }
        self.slots[layer].epoch += 1;
        Some(self.ticket(layer))
    }

    fn ticket(&self, layer: usize) -> Ticket {
        Ticket {
            layer,
            epoch: self.slots[layer].epoch,
        }
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        ticket.layer < self.active && self.slots[ticket.layer].epoch == ticket.epoch
    }

    /// Stores `value` if `ticket` is still the newest for its layer. Returns whether it was kept.
    pub fn commit(&mut self, ticket: Ticket, value: T) -> bool {
        if !self.is_current(ticket) {
            log::debug!(
                "dropping stale result for layer {} (epoch {})",
                ticket.layer,
                ticket.epoch
            );
            return false;
        }
        let slot = &mut self.slots[ticket.layer];
        slot.value = Some(value);
        slot.committed = Some(ticket.epoch);
        true
    }

    pub fn len(&self) -> usize {
        self.active
    }

    pub fn is_empty(&self) -> bool {
        self.active == 0
    }

    /// The most recent value for `layer`, even if newer work is still outstanding.
    pub fn latest(&self, layer: usize) -> Option<&T> {
        self.slots[..self.active].get(layer)?.value.as_ref()
    }

    /// Whether `layer` holds the result of its newest ticket.
    pub fn is_settled(&self, layer: usize) -> bool {
        self.slots[..self.active]
            .get(layer)
            .is_some_and(|s| s.committed == Some(s.epoch))
    }

    /// The value for `layer` only once it is settled.
    pub fn current(&self, layer: usize) -> Option<&T> {
        if self.is_settled(layer) {
            self.latest(layer)
        } else {
            None
        }
    }
}

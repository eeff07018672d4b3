//! Storage adapter contracts and reference implementations.
//!
//! The engine never touches a concrete container: every transfer goes
//! through one of the small adapter traits below, each offering the same
//! two-phase simulate-then-commit discipline (`simulate == true` must not
//! change state). A move that cannot proceed reports zero moved, never an
//! error.
//!
//! The reference implementations at the bottom back the command line driver
//! and the test suites; hosts embed their own.

use std::cell::RefCell;
use std::rc::Rc;

use fnv::FnvHashMap;

use crate::endpoint::{EndpointRef, Side};
use crate::transfer::ResourceKind;
use crate::{string, FluidName, ItemName};

/// Stack of a single item kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub item: ItemName,
    pub count: u32,
}

impl ItemStack {
    pub fn new(item: &str, count: u32) -> ItemStack {
        ItemStack {
            item: string::new_truncate(item),
            count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn same_item(&self, other: &ItemStack) -> bool {
        self.item == other.item
    }
}

/// Volume of a single fluid kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FluidStack {
    pub fluid: FluidName,
    pub amount: u32,
}

impl FluidStack {
    pub fn new(fluid: &str, amount: u32) -> FluidStack {
        FluidStack {
            fluid: string::new_truncate(fluid),
            amount,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.amount == 0
    }

    pub fn same_fluid(&self, other: &FluidStack) -> bool {
        self.fluid == other.fluid
    }
}

/// Slotted item storage adapter.
pub trait ItemHandler {
    fn slots(&self) -> usize;

    /// Copy of the stack in a slot, `None` when the slot is empty or out of
    /// range.
    fn peek(&self, slot: usize) -> Option<ItemStack>;

    /// Extracts up to `amount` items from one slot. With `simulate` no state
    /// changes. Returns what was (or would be) taken.
    fn extract(&mut self, slot: usize, amount: u32, simulate: bool) -> Option<ItemStack>;

    /// Inserts a stack wherever it fits, returning the accepted count.
    /// Accepting fewer items than offered is partial success, not an error.
    fn insert(&mut self, stack: &ItemStack, simulate: bool) -> u32;
}

/// Tank-like fluid storage adapter.
pub trait FluidHandler {
    /// Drains up to `amount` of whatever the storage holds.
    fn drain(&mut self, amount: u32, simulate: bool) -> Option<FluidStack>;

    /// Fills from the given stack, returning the accepted amount. An
    /// incompatible fluid accepts zero.
    fn fill(&mut self, stack: &FluidStack, simulate: bool) -> u32;
}

/// Energy storage adapter.
pub trait EnergyHandler {
    fn can_extract(&self) -> bool {
        true
    }

    fn can_receive(&self) -> bool {
        true
    }

    /// Extracts up to `amount`, returning what was (or would be) taken.
    fn extract(&mut self, amount: u32, simulate: bool) -> u32;

    /// Receives up to `amount`, returning what was (or would be) accepted.
    fn receive(&mut self, amount: u32, simulate: bool) -> u32;
}

/// Host-side resolution of the storage attached to an endpoint side.
///
/// This is the only capability the platform layer must supply next to the
/// tick driver: given an endpoint and one of its sides, hand out the storage
/// sitting behind that side, or `None` when nothing is attached.
pub trait Attachments<K: ResourceKind> {
    fn attached(&self, loc: &EndpointRef, side: Side) -> Option<K::Handle>;
}

/// Map-backed [`Attachments`] implementation.
pub struct AttachmentMap<K: ResourceKind> {
    map: FnvHashMap<(EndpointRef, Side), K::Handle>,
}

impl<K: ResourceKind> AttachmentMap<K> {
    pub fn new() -> Self {
        AttachmentMap {
            map: FnvHashMap::default(),
        }
    }

    pub fn attach(&mut self, loc: EndpointRef, side: Side, handle: K::Handle) {
        self.map.insert((loc, side), handle);
    }

    pub fn detach(&mut self, loc: &EndpointRef, side: Side) {
        self.map.remove(&(*loc, side));
    }
}

impl<K: ResourceKind> Default for AttachmentMap<K> {
    fn default() -> Self {
        AttachmentMap::new()
    }
}

impl<K: ResourceKind> Attachments<K> for AttachmentMap<K> {
    fn attached(&self, loc: &EndpointRef, side: Side) -> Option<K::Handle> {
        self.map.get(&(*loc, side)).cloned()
    }
}

// ---- reference storages ----

/// Fixed-slot inventory with a per-slot stack limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotInventory {
    slots: Vec<Option<ItemStack>>,
    stack_limit: u32,
}

impl SlotInventory {
    pub fn new(slots: usize) -> SlotInventory {
        SlotInventory::with_stack_limit(slots, 64)
    }

    pub fn with_stack_limit(slots: usize, stack_limit: u32) -> SlotInventory {
        SlotInventory {
            slots: vec![None; slots],
            stack_limit,
        }
    }

    /// Places a stack directly into a slot, for world setup.
    pub fn load_slot(&mut self, slot: usize, stack: ItemStack) {
        self.slots[slot] = if stack.is_empty() { None } else { Some(stack) };
    }

    /// Total count of one item kind across all slots.
    pub fn total_of(&self, item: &str) -> u32 {
        let name: ItemName = string::new_truncate(item);
        self.slots
            .iter()
            .flatten()
            .filter(|s| s.item == name)
            .map(|s| s.count)
            .sum()
    }

    /// Total item count across all slots.
    pub fn total(&self) -> u32 {
        self.slots.iter().flatten().map(|s| s.count).sum()
    }
}

impl ItemHandler for SlotInventory {
    fn slots(&self) -> usize {
        self.slots.len()
    }

    fn peek(&self, slot: usize) -> Option<ItemStack> {
        self.slots.get(slot)?.clone()
    }

    fn extract(&mut self, slot: usize, amount: u32, simulate: bool) -> Option<ItemStack> {
        if amount == 0 {
            return None;
        }
        let stack = self.slots.get_mut(slot)?.as_mut()?;
        let taken = amount.min(stack.count);
        let out = ItemStack {
            item: stack.item,
            count: taken,
        };
        if !simulate {
            stack.count -= taken;
            if stack.count == 0 {
                self.slots[slot] = None;
            }
        }
        Some(out)
    }

    fn insert(&mut self, stack: &ItemStack, simulate: bool) -> u32 {
        if stack.is_empty() {
            return 0;
        }
        let stack_limit = self.stack_limit;
        let mut remaining = stack.count;
        // top up matching stacks first
        for slot in self.slots.iter_mut() {
            if remaining == 0 {
                break;
            }
            if let Some(present) = slot.as_mut() {
                if present.item == stack.item {
                    let put = stack_limit.saturating_sub(present.count).min(remaining);
                    if !simulate {
                        present.count += put;
                    }
                    remaining -= put;
                }
            }
        }
        // then fall back to empty slots
        for slot in self.slots.iter_mut() {
            if remaining == 0 {
                break;
            }
            if slot.is_none() {
                let put = stack_limit.min(remaining);
                if !simulate {
                    *slot = Some(ItemStack {
                        item: stack.item,
                        count: put,
                    });
                }
                remaining -= put;
            }
        }
        stack.count - remaining
    }
}

/// Single-fluid tank with a fixed capacity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FluidTank {
    content: Option<FluidStack>,
    capacity: u32,
}

impl FluidTank {
    pub fn new(capacity: u32) -> FluidTank {
        FluidTank {
            content: None,
            capacity,
        }
    }

    /// Fills the tank directly, for world setup.
    pub fn load(&mut self, fluid: &str, amount: u32) {
        self.content = if amount == 0 {
            None
        } else {
            Some(FluidStack::new(fluid, amount.min(self.capacity)))
        };
    }

    pub fn amount(&self) -> u32 {
        self.content.as_ref().map(|c| c.amount).unwrap_or(0)
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn fluid(&self) -> Option<&FluidName> {
        self.content.as_ref().map(|c| &c.fluid)
    }
}

impl FluidHandler for FluidTank {
    fn drain(&mut self, amount: u32, simulate: bool) -> Option<FluidStack> {
        let content = self.content.as_mut()?;
        let taken = amount.min(content.amount);
        if taken == 0 {
            return None;
        }
        let out = FluidStack {
            fluid: content.fluid,
            amount: taken,
        };
        if !simulate {
            content.amount -= taken;
            if content.amount == 0 {
                self.content = None;
            }
        }
        Some(out)
    }

    fn fill(&mut self, stack: &FluidStack, simulate: bool) -> u32 {
        if stack.is_empty() {
            return 0;
        }
        let current = match &self.content {
            Some(c) if !c.same_fluid(stack) => return 0,
            Some(c) => c.amount,
            None => 0,
        };
        let accepted = (self.capacity - current).min(stack.amount);
        if accepted > 0 && !simulate {
            match self.content.as_mut() {
                Some(c) => c.amount += accepted,
                None => {
                    self.content = Some(FluidStack {
                        fluid: stack.fluid,
                        amount: accepted,
                    })
                }
            }
        }
        accepted
    }
}

/// Energy storage with symmetric transfer caps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnergyCell {
    stored: u32,
    capacity: u32,
    max_transfer: u32,
}

impl EnergyCell {
    pub fn new(capacity: u32, max_transfer: u32) -> EnergyCell {
        EnergyCell {
            stored: 0,
            capacity,
            max_transfer,
        }
    }

    /// Sets the stored amount directly, for world setup.
    pub fn load(&mut self, stored: u32) {
        self.stored = stored.min(self.capacity);
    }

    pub fn stored(&self) -> u32 {
        self.stored
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}

impl EnergyHandler for EnergyCell {
    fn extract(&mut self, amount: u32, simulate: bool) -> u32 {
        let taken = amount.min(self.max_transfer).min(self.stored);
        if !simulate {
            self.stored -= taken;
        }
        taken
    }

    fn receive(&mut self, amount: u32, simulate: bool) -> u32 {
        let accepted = amount
            .min(self.max_transfer)
            .min(self.capacity - self.stored);
        if !simulate {
            self.stored += accepted;
        }
        accepted
    }
}

/// Rate-limited infinite fluid source.
///
/// Fabricates fluid from nothing: production accrues into a backlog at
/// `rate` units per tick and is drained in chunks of at most `max_push`.
/// The backlog itself is capped at `max_push`, so an idle source never
/// accumulates an unbounded debt. Explicitly exempt from the conservation
/// invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BottomlessTank {
    fluid: FluidName,
    backlog: u32,
    rate: u32,
    max_push: u32,
}

impl BottomlessTank {
    pub fn new(fluid: &str, rate: u32, max_push: u32) -> BottomlessTank {
        BottomlessTank {
            fluid: string::new_truncate(fluid),
            backlog: 0,
            rate,
            max_push,
        }
    }

    /// Accrues production for the given number of elapsed ticks.
    pub fn advance(&mut self, ticks: u64) {
        let produced = (self.rate as u64 * ticks).min(self.max_push as u64) as u32;
        self.backlog = (self.backlog + produced).min(self.max_push);
    }

    pub fn backlog(&self) -> u32 {
        self.backlog
    }
}

impl FluidHandler for BottomlessTank {
    fn drain(&mut self, amount: u32, simulate: bool) -> Option<FluidStack> {
        let taken = amount.min(self.backlog).min(self.max_push);
        if taken == 0 {
            return None;
        }
        if !simulate {
            self.backlog -= taken;
        }
        Some(FluidStack {
            fluid: self.fluid,
            amount: taken,
        })
    }

    /// Source only, accepts nothing.
    fn fill(&mut self, _stack: &FluidStack, _simulate: bool) -> u32 {
        0
    }
}

/// Convenience constructor for shared storage handles.
pub fn shared<T>(storage: T) -> Rc<RefCell<T>> {
    Rc::new(RefCell::new(storage))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inventory_insert_prefers_matching_stacks() {
        let mut inv = SlotInventory::new(2);
        inv.load_slot(1, ItemStack::new("ore", 10));
        let accepted = inv.insert(&ItemStack::new("ore", 5), false);
        assert_eq!(accepted, 5);
        assert_eq!(inv.peek(1).unwrap().count, 15);
        assert!(inv.peek(0).is_none());
    }

    #[test]
    fn inventory_simulate_does_not_mutate() {
        let mut inv = SlotInventory::new(1);
        let accepted = inv.insert(&ItemStack::new("ore", 3), true);
        assert_eq!(accepted, 3);
        assert_eq!(inv.total(), 0);

        inv.load_slot(0, ItemStack::new("ore", 8));
        let taken = inv.extract(0, 2, true).unwrap();
        assert_eq!(taken.count, 2);
        assert_eq!(inv.total(), 8);
    }

    #[test]
    fn inventory_respects_stack_limit() {
        let mut inv = SlotInventory::with_stack_limit(1, 16);
        let accepted = inv.insert(&ItemStack::new("ore", 40), false);
        assert_eq!(accepted, 16);
    }

    #[test]
    fn tank_rejects_foreign_fluid() {
        let mut tank = FluidTank::new(1000);
        tank.load("water", 500);
        assert_eq!(tank.fill(&FluidStack::new("lava", 100), false), 0);
        assert_eq!(tank.fill(&FluidStack::new("water", 100), false), 100);
    }

    #[test]
    fn tank_drain_empties_content() {
        let mut tank = FluidTank::new(1000);
        tank.load("water", 250);
        let drained = tank.drain(400, false).unwrap();
        assert_eq!(drained.amount, 250);
        assert!(tank.drain(1, false).is_none());
        assert_eq!(tank.amount(), 0);
    }

    #[test]
    fn cell_respects_transfer_cap() {
        let mut cell = EnergyCell::new(10_000, 100);
        assert_eq!(cell.receive(500, false), 100);
        assert_eq!(cell.extract(500, false), 100);
    }

    #[test]
    fn bottomless_backlog_is_capped() {
        let mut spring = BottomlessTank::new("water", 250, 4000);
        spring.advance(1);
        assert_eq!(spring.backlog(), 250);
        spring.advance(100_000);
        assert_eq!(spring.backlog(), 4000);
    }

    #[test]
    fn bottomless_drains_bounded_chunks() {
        let mut spring = BottomlessTank::new("water", 250, 4000);
        spring.advance(16);
        let drained = spring.drain(10_000, false).unwrap();
        assert_eq!(drained.amount, 4000);
        assert!(spring.drain(1, false).is_none());
    }

    #[test]
    fn bottomless_accepts_nothing() {
        let mut spring = BottomlessTank::new("water", 250, 4000);
        assert_eq!(spring.fill(&FluidStack::new("water", 100), false), 0);
    }
}

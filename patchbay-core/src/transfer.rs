//! Resource kinds and their bounded transfer primitives.
//!
//! The routing and fairness skeleton in [`crate::grid`] is identical for
//! every resource; only the low-level move differs. [`ResourceKind`] is that
//! seam: one marker type per resource wires the right storage handle and
//! move primitive into the generic grid.
//!
//! Every primitive follows the same two-phase discipline: simulate first,
//! take `min(extractable, insertable)`, then commit exactly that amount.
//! Amount removed from the source always equals amount added to the
//! destination for a single move.

use std::cell::RefCell;
use std::rc::Rc;

use crate::storage::{EnergyHandler, FluidHandler, ItemHandler};

/// Shared handle to an attached item storage.
pub type ItemHandle = Rc<RefCell<dyn ItemHandler>>;
/// Shared handle to an attached fluid storage.
pub type FluidHandle = Rc<RefCell<dyn FluidHandler>>;
/// Shared handle to an attached energy storage.
pub type EnergyHandle = Rc<RefCell<dyn EnergyHandler>>;

/// One resource kind the engine can route.
pub trait ResourceKind {
    /// Kind name used in logs and snapshot headers.
    const NAME: &'static str;
    /// Default per-attempt transfer bound.
    const DEFAULT_AMOUNT: u32;
    /// Storage handle hosts hand out for attached storages.
    type Handle: Clone;

    /// Moves up to `budget` units from `src` to `dst`, returning the amount
    /// actually moved. Zero moved is the normal "try again next tick"
    /// outcome, never an error.
    fn transfer(src: &Self::Handle, dst: &Self::Handle, budget: u32) -> u32;
}

/// Discrete item routing.
pub struct Items;

impl ResourceKind for Items {
    const NAME: &'static str = "items";
    const DEFAULT_AMOUNT: u32 = 8;
    type Handle = ItemHandle;

    fn transfer(src: &ItemHandle, dst: &ItemHandle, budget: u32) -> u32 {
        if Rc::ptr_eq(src, dst) {
            return 0;
        }
        move_items(&mut *src.borrow_mut(), &mut *dst.borrow_mut(), budget)
    }
}

/// Bulk fluid routing.
pub struct Fluids;

impl ResourceKind for Fluids {
    const NAME: &'static str = "fluids";
    const DEFAULT_AMOUNT: u32 = 250;
    type Handle = FluidHandle;

    fn transfer(src: &FluidHandle, dst: &FluidHandle, budget: u32) -> u32 {
        if Rc::ptr_eq(src, dst) {
            return 0;
        }
        move_fluid(&mut *src.borrow_mut(), &mut *dst.borrow_mut(), budget)
    }
}

/// Energy routing.
pub struct Energy;

impl ResourceKind for Energy {
    const NAME: &'static str = "energy";
    const DEFAULT_AMOUNT: u32 = 1000;
    type Handle = EnergyHandle;

    fn transfer(src: &EnergyHandle, dst: &EnergyHandle, budget: u32) -> u32 {
        if Rc::ptr_eq(src, dst) {
            return 0;
        }
        move_energy(&mut *src.borrow_mut(), &mut *dst.borrow_mut(), budget)
    }
}

/// Moves up to `budget` items one unit at a time.
///
/// Each unit is simulated on both ends before it is committed, so a
/// destination that fills up mid-batch just ends the batch early: a partial
/// batch is partial success.
pub fn move_items(src: &mut dyn ItemHandler, dst: &mut dyn ItemHandler, budget: u32) -> u32 {
    if budget == 0 {
        return 0;
    }
    let mut moved = 0;
    for slot in 0..src.slots() {
        while moved < budget {
            let sim = match src.extract(slot, 1, true) {
                Some(s) if !s.is_empty() => s,
                _ => break,
            };
            if dst.insert(&sim, true) < sim.count {
                break;
            }
            let taken = match src.extract(slot, 1, false) {
                Some(s) if !s.is_empty() => s,
                _ => break,
            };
            let accepted = dst.insert(&taken, false);
            debug_assert_eq!(accepted, taken.count);
            if accepted == 0 {
                break;
            }
            moved += accepted;
        }
        if moved >= budget {
            break;
        }
    }
    moved
}

/// Moves up to `amount` fluid in one drain/fill pair.
///
/// Never drains more than the destination can take: both ends are simulated
/// first and exactly `min(drainable, fillable)` is committed.
pub fn move_fluid(src: &mut dyn FluidHandler, dst: &mut dyn FluidHandler, amount: u32) -> u32 {
    if amount == 0 {
        return 0;
    }
    let can_drain = match src.drain(amount, true) {
        Some(s) if !s.is_empty() => s,
        _ => return 0,
    };
    let can_fill = dst.fill(&can_drain, true);
    if can_fill == 0 {
        return 0;
    }
    let to_move = can_drain.amount.min(can_fill);
    let drained = match src.drain(to_move, false) {
        Some(s) if !s.is_empty() => s,
        _ => return 0,
    };
    let filled = dst.fill(&drained, false);
    debug_assert_eq!(filled, drained.amount);
    filled
}

/// Moves up to `amount` energy in one extract/receive pair.
pub fn move_energy(src: &mut dyn EnergyHandler, dst: &mut dyn EnergyHandler, amount: u32) -> u32 {
    if amount == 0 || !src.can_extract() || !dst.can_receive() {
        return 0;
    }
    let can_extract = src.extract(amount, true);
    if can_extract == 0 {
        return 0;
    }
    let can_receive = dst.receive(can_extract, true);
    if can_receive == 0 {
        return 0;
    }
    let to_move = can_extract.min(can_receive);
    let extracted = src.extract(to_move, false);
    if extracted == 0 {
        return 0;
    }
    dst.receive(extracted, false)
}

//! Tick processing for the grid.

use crate::endpoint::{EndpointRef, Side};
use crate::storage::Attachments;
use crate::transfer::ResourceKind;
use crate::Tick;

use super::Grid;

impl<K: ResourceKind> Grid<K> {
    /// Advances the grid to the host tick counter value.
    ///
    /// Transfers only run on period boundaries (`tick % period == 0`);
    /// off-period calls are cheap no-ops. For every master-enabled endpoint,
    /// every side with an enabled consumer role gets one pull attempt.
    /// Returns the total amount moved this tick.
    pub fn on_tick<A>(&mut self, tick: Tick, env: &A) -> u32
    where
        A: Attachments<K>,
    {
        self.clock = tick;
        if tick % self.config.period != 0 {
            return 0;
        }

        let work: Vec<(EndpointRef, Side)> = self
            .endpoints
            .iter()
            .filter(|(_, endpoint)| endpoint.is_enabled())
            .flat_map(|(loc, endpoint)| {
                Side::ALL
                    .iter()
                    .filter(|side| endpoint.side(**side).is_consumer_enabled())
                    .map(move |side| (*loc, *side))
                    .collect::<Vec<_>>()
            })
            .collect();

        let mut total = 0;
        for (loc, side) in work {
            total += self.pull_once(&loc, side, env);
        }
        if total > 0 {
            debug!("tick {}: moved {} {}", tick, total, K::NAME);
        }
        total
    }

    /// One round-robin pull attempt for a single consumer side.
    ///
    /// Scans the producer candidates for the side's key starting at the
    /// persisted cursor. The first successful transfer sets the cursor just
    /// past the serviced candidate and ends the scan: at most one success
    /// per side per tick, fairness over throughput. A scan with no success
    /// still advances the cursor by one so a persistently dry head
    /// candidate cannot starve the rest.
    fn pull_once<A>(&mut self, loc: &EndpointRef, side: Side, env: &A) -> u32
    where
        A: Attachments<K>,
    {
        let (key, cursor) = match self.endpoints.get(loc) {
            Some(endpoint) => {
                let state = endpoint.side(side);
                (state.key(), state.cursor)
            }
            None => return 0,
        };

        let dst = match env.attached(loc, side) {
            Some(handle) => handle,
            None => return 0,
        };

        let candidates = self.registry.snapshot_producers(key);
        if candidates.is_empty() {
            return 0;
        }
        let n = candidates.len();
        // persisted cursors may outlive shrinking candidate sets
        let start = cursor as usize % n;

        let mut matched: Option<(usize, u32)> = None;
        'scan: for i in 0..n {
            let idx = (start + i) % n;
            let candidate = candidates[idx];

            // stale registry entries and master-disabled endpoints are
            // skipped, not errors
            let producer_sides: Vec<Side> = match self.endpoints.get(&candidate) {
                Some(endpoint) if endpoint.is_enabled() => Side::ALL
                    .iter()
                    .copied()
                    .filter(|s| {
                        let state = endpoint.side(*s);
                        state.is_producer_enabled() && state.key() == key
                    })
                    .collect(),
                _ => continue,
            };

            for producer_side in producer_sides {
                let src = match env.attached(&candidate, producer_side) {
                    Some(handle) => handle,
                    None => continue,
                };
                let moved = K::transfer(&src, &dst, self.config.amount);
                if moved > 0 {
                    trace!(
                        "moved {} {} from {} ({}) to {} ({})",
                        moved,
                        K::NAME,
                        candidate,
                        producer_side,
                        loc,
                        side
                    );
                    matched = Some((idx, moved));
                    break 'scan;
                }
            }
        }

        let endpoint = match self.endpoints.get_mut(loc) {
            Some(endpoint) => endpoint,
            None => return 0,
        };
        match matched {
            Some((idx, moved)) => {
                endpoint.side_mut(side).cursor = ((idx + 1) % n) as u32;
                self.dirty = true;
                moved
            }
            None => {
                endpoint.side_mut(side).cursor = ((start + 1) % n) as u32;
                self.dirty = true;
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::SideRole;
    use crate::key::ColorKey;
    use crate::storage::{
        shared, AttachmentMap, EnergyCell, FluidTank, ItemStack, SlotInventory,
    };
    use crate::transfer::{Energy, Fluids, Items};
    use crate::Pos;

    use std::cell::RefCell;
    use std::rc::Rc;

    fn loc(x: i32) -> EndpointRef {
        EndpointRef::new("main", Pos::new(x, 0, 0))
    }

    fn key_f0() -> ColorKey {
        // packs to 0x00F0
        ColorKey::new(0, 15, 0, 0)
    }

    /// Wires one producer endpoint (side up) and one consumer endpoint
    /// (side down) under the same key, with the given storages attached.
    fn wire_pair(
        grid: &mut Grid<Items>,
        env: &mut AttachmentMap<Items>,
        src: Rc<RefCell<SlotInventory>>,
        dst: Rc<RefCell<SlotInventory>>,
    ) {
        grid.place(loc(0)).unwrap();
        grid.set_colors(&loc(0), key_f0()).unwrap();
        grid.set_role(&loc(0), Side::Up, SideRole::Producer).unwrap();
        env.attach(loc(0), Side::Up, src);

        grid.place(loc(1)).unwrap();
        grid.set_colors(&loc(1), key_f0()).unwrap();
        grid.set_role(&loc(1), Side::Down, SideRole::Consumer).unwrap();
        env.attach(loc(1), Side::Down, dst);
    }

    #[test]
    fn single_candidate_batch_transfer() {
        let mut grid: Grid<Items> = Grid::new();
        let mut env: AttachmentMap<Items> = AttachmentMap::new();

        let src = shared(SlotInventory::new(4));
        src.borrow_mut().load_slot(0, ItemStack::new("ore", 10));
        let dst = shared(SlotInventory::new(4));
        wire_pair(&mut grid, &mut env, src.clone(), dst.clone());

        assert_eq!(key_f0().pack(), 0x00F0);
        let moved = grid.on_tick(10, &env);
        assert_eq!(moved, 8);
        assert_eq!(src.borrow().total(), 2);
        assert_eq!(dst.borrow().total(), 8);
        // single candidate: success wraps the cursor back to 0
        assert_eq!(grid.endpoint(&loc(1)).unwrap().side(Side::Down).cursor, 0);
    }

    #[test]
    fn off_period_ticks_do_nothing() {
        let mut grid: Grid<Items> = Grid::new();
        let mut env: AttachmentMap<Items> = AttachmentMap::new();

        let src = shared(SlotInventory::new(1));
        src.borrow_mut().load_slot(0, ItemStack::new("ore", 10));
        let dst = shared(SlotInventory::new(1));
        wire_pair(&mut grid, &mut env, src.clone(), dst.clone());

        assert_eq!(grid.on_tick(7, &env), 0);
        assert_eq!(src.borrow().total(), 10);
    }

    #[test]
    fn no_destination_attachment_skips() {
        let mut grid: Grid<Items> = Grid::new();
        let mut env: AttachmentMap<Items> = AttachmentMap::new();

        let src = shared(SlotInventory::new(1));
        src.borrow_mut().load_slot(0, ItemStack::new("ore", 10));
        let dst = shared(SlotInventory::new(1));
        wire_pair(&mut grid, &mut env, src.clone(), dst);
        env.detach(&loc(1), Side::Down);

        assert_eq!(grid.on_tick(10, &env), 0);
        assert_eq!(src.borrow().total(), 10);
    }

    #[test]
    fn master_disabled_producer_is_skipped() {
        let mut grid: Grid<Items> = Grid::new();
        let mut env: AttachmentMap<Items> = AttachmentMap::new();

        let src = shared(SlotInventory::new(1));
        src.borrow_mut().load_slot(0, ItemStack::new("ore", 10));
        let dst = shared(SlotInventory::new(1));
        wire_pair(&mut grid, &mut env, src.clone(), dst.clone());
        grid.set_enabled(&loc(0), false).unwrap();

        assert_eq!(grid.on_tick(10, &env), 0);
        assert_eq!(dst.borrow().total(), 0);
    }

    #[test]
    fn key_mismatch_never_transfers() {
        let mut grid: Grid<Items> = Grid::new();
        let mut env: AttachmentMap<Items> = AttachmentMap::new();

        let src = shared(SlotInventory::new(1));
        src.borrow_mut().load_slot(0, ItemStack::new("ore", 10));
        let dst = shared(SlotInventory::new(1));
        wire_pair(&mut grid, &mut env, src.clone(), dst.clone());
        // recolor the consumer side onto another network
        grid.set_color(&loc(1), Side::Down, 0, 3).unwrap();

        assert_eq!(grid.on_tick(10, &env), 0);
        assert_eq!(dst.borrow().total(), 0);
    }

    #[test]
    fn round_robin_rotates_across_producers() {
        let mut grid: Grid<Items> = Grid::new();
        let mut env: AttachmentMap<Items> = AttachmentMap::new();

        let sources: Vec<Rc<RefCell<SlotInventory>>> = (0..3)
            .map(|i| {
                let inv = shared(SlotInventory::new(1));
                inv.borrow_mut().load_slot(0, ItemStack::new("ore", 64));
                grid.place(loc(i)).unwrap();
                grid.set_colors(&loc(i), key_f0()).unwrap();
                grid.set_role(&loc(i), Side::Up, SideRole::Producer).unwrap();
                env.attach(loc(i), Side::Up, inv.clone());
                inv
            })
            .collect();

        let dst = shared(SlotInventory::new(9));
        grid.place(loc(100)).unwrap();
        grid.set_colors(&loc(100), key_f0()).unwrap();
        grid.set_role(&loc(100), Side::Down, SideRole::Consumer)
            .unwrap();
        env.attach(loc(100), Side::Down, dst.clone());

        // one pull per period tick, each serviced from the next candidate
        for round in 1..=3u64 {
            grid.on_tick(round * 10, &env);
        }
        for src in &sources {
            assert_eq!(src.borrow().total(), 64 - 8);
        }
        assert_eq!(dst.borrow().total(), 24);
    }

    #[test]
    fn dry_head_candidate_cannot_starve_the_rest() {
        let mut grid: Grid<Items> = Grid::new();
        let mut env: AttachmentMap<Items> = AttachmentMap::new();

        // candidate 0 stays empty forever, candidate 1 has stock
        let dry = shared(SlotInventory::new(1));
        let full = shared(SlotInventory::new(1));
        full.borrow_mut().load_slot(0, ItemStack::new("ore", 64));
        for (i, inv) in [dry.clone(), full.clone()].iter().enumerate() {
            grid.place(loc(i as i32)).unwrap();
            grid.set_colors(&loc(i as i32), key_f0()).unwrap();
            grid.set_role(&loc(i as i32), Side::Up, SideRole::Producer)
                .unwrap();
            env.attach(loc(i as i32), Side::Up, inv.clone());
        }

        let dst = shared(SlotInventory::new(9));
        grid.place(loc(100)).unwrap();
        grid.set_colors(&loc(100), key_f0()).unwrap();
        grid.set_role(&loc(100), Side::Down, SideRole::Consumer)
            .unwrap();
        env.attach(loc(100), Side::Down, dst.clone());

        grid.on_tick(10, &env);
        assert_eq!(dst.borrow().total(), 8);
        // serviced candidate 1 from a scan started at 0, cursor wrapped past
        assert_eq!(grid.endpoint(&loc(100)).unwrap().side(Side::Down).cursor, 0);
    }

    #[test]
    fn failed_scan_still_advances_cursor() {
        let mut grid: Grid<Items> = Grid::new();
        let mut env: AttachmentMap<Items> = AttachmentMap::new();

        let dry_a = shared(SlotInventory::new(1));
        let dry_b = shared(SlotInventory::new(1));
        for (i, inv) in [dry_a, dry_b].iter().enumerate() {
            grid.place(loc(i as i32)).unwrap();
            grid.set_colors(&loc(i as i32), key_f0()).unwrap();
            grid.set_role(&loc(i as i32), Side::Up, SideRole::Producer)
                .unwrap();
            env.attach(loc(i as i32), Side::Up, inv.clone());
        }
        let dst = shared(SlotInventory::new(1));
        grid.place(loc(100)).unwrap();
        grid.set_colors(&loc(100), key_f0()).unwrap();
        grid.set_role(&loc(100), Side::Down, SideRole::Consumer)
            .unwrap();
        env.attach(loc(100), Side::Down, dst);

        assert_eq!(grid.endpoint(&loc(100)).unwrap().side(Side::Down).cursor, 0);
        grid.on_tick(10, &env);
        assert_eq!(grid.endpoint(&loc(100)).unwrap().side(Side::Down).cursor, 1);
        grid.on_tick(20, &env);
        assert_eq!(grid.endpoint(&loc(100)).unwrap().side(Side::Down).cursor, 0);
    }

    #[test]
    fn every_satisfiable_producer_is_serviced_within_n_rounds() {
        let mut grid: Grid<Items> = Grid::new();
        let mut env: AttachmentMap<Items> = AttachmentMap::new();
        let n = 4;

        let sources: Vec<Rc<RefCell<SlotInventory>>> = (0..n)
            .map(|i| {
                let inv = shared(SlotInventory::new(1));
                inv.borrow_mut().load_slot(0, ItemStack::new("ore", 64));
                grid.place(loc(i)).unwrap();
                grid.set_colors(&loc(i), key_f0()).unwrap();
                grid.set_role(&loc(i), Side::Up, SideRole::Producer).unwrap();
                env.attach(loc(i), Side::Up, inv.clone());
                inv
            })
            .collect();

        let dst = shared(SlotInventory::new(27));
        grid.place(loc(100)).unwrap();
        grid.set_colors(&loc(100), key_f0()).unwrap();
        grid.set_role(&loc(100), Side::Down, SideRole::Consumer)
            .unwrap();
        env.attach(loc(100), Side::Down, dst.clone());

        // n satisfiable producers, one pull per round: after n rounds every
        // one of them must have been drained at least once
        let mut serviced = vec![false; n as usize];
        for round in 1..=(n as u64) {
            let before: Vec<u32> =
                sources.iter().map(|s| s.borrow().total()).collect();
            grid.on_tick(round * 10, &env);
            for (i, src) in sources.iter().enumerate() {
                if src.borrow().total() < before[i] {
                    serviced[i] = true;
                }
            }
        }
        assert!(serviced.iter().all(|s| *s), "{:?}", serviced);
    }

    #[test]
    fn fluid_grid_conserves_volume() {
        let mut grid: Grid<Fluids> = Grid::new();
        let mut env: AttachmentMap<Fluids> = AttachmentMap::new();

        let src = shared(FluidTank::new(1000));
        src.borrow_mut().load("water", 600);
        let dst = shared(FluidTank::new(1000));

        grid.place(loc(0)).unwrap();
        grid.set_colors(&loc(0), key_f0()).unwrap();
        grid.set_role(&loc(0), Side::Up, SideRole::Producer).unwrap();
        env.attach(loc(0), Side::Up, src.clone());

        grid.place(loc(1)).unwrap();
        grid.set_colors(&loc(1), key_f0()).unwrap();
        grid.set_role(&loc(1), Side::Down, SideRole::Consumer).unwrap();
        env.attach(loc(1), Side::Down, dst.clone());

        let moved = grid.on_tick(10, &env);
        assert_eq!(moved, 250);
        assert_eq!(src.borrow().amount() + dst.borrow().amount(), 600);
    }

    #[test]
    fn energy_grid_moves_default_quantum() {
        let mut grid: Grid<Energy> = Grid::new();
        let mut env: AttachmentMap<Energy> = AttachmentMap::new();

        let src = shared(EnergyCell::new(100_000, 100_000));
        src.borrow_mut().load(50_000);
        let dst = shared(EnergyCell::new(100_000, 100_000));

        grid.place(loc(0)).unwrap();
        grid.set_role(&loc(0), Side::Up, SideRole::Producer).unwrap();
        env.attach(loc(0), Side::Up, src.clone());

        grid.place(loc(1)).unwrap();
        grid.set_role(&loc(1), Side::Down, SideRole::Consumer).unwrap();
        env.attach(loc(1), Side::Down, dst.clone());

        assert_eq!(grid.on_tick(10, &env), 1000);
        assert_eq!(src.borrow().stored(), 49_000);
        assert_eq!(dst.borrow().stored(), 1000);
    }

    #[test]
    fn stale_registry_entry_is_skipped() {
        use crate::registry::{LocationRecord, Registry};
        use crate::snapshot::Snapshot;

        let mut grid: Grid<Items> = Grid::new();
        let mut env: AttachmentMap<Items> = AttachmentMap::new();

        let src = shared(SlotInventory::new(1));
        src.borrow_mut().load_slot(0, ItemStack::new("ore", 10));
        let dst = shared(SlotInventory::new(1));
        wire_pair(&mut grid, &mut env, src, dst.clone());

        // inject a phantom producer ref that sorts ahead of the real one
        // and has no endpoint behind it, as stale persisted data would
        let mut data = grid.registry().to_data();
        data.producers
            .get_mut(&key_f0().pack().to_string())
            .unwrap()
            .push(LocationRecord {
                partition: "main".to_string(),
                x: -50,
                y: 0,
                z: 0,
            });
        let snapshot = Snapshot::new(
            "items",
            0,
            grid.endpoints().map(|(l, e)| (*l, e.clone())).collect(),
            Registry::from_data(data),
        );
        let bytes = snapshot.to_bytes(false).unwrap();
        let mut grid: Grid<Items> = Grid::from_snapshot(&bytes, false).unwrap();

        assert_eq!(grid.on_tick(10, &env), 8);
        assert_eq!(dst.borrow().total(), 8);
    }
}

//! Per-resource-kind engine instance.
//!
//! A [`Grid`] owns every live endpoint of one resource kind together with
//! the [`Registry`] their roles are advertised in. All endpoint mutation
//! goes through the grid so the registry can never drift out of sync with
//! endpoint state; leaking a stale registration is the single most damaging
//! bug this design guards against.

pub mod step;

use std::marker::PhantomData;

use fnv::FnvHashMap;

use crate::config::TransferConfig;
use crate::endpoint::{Advertised, Endpoint, EndpointRef, Side, SideRole};
use crate::error::Error;
use crate::key::ColorKey;
use crate::registry::Registry;
use crate::snapshot::Snapshot;
use crate::transfer::ResourceKind;
use crate::{Result, Tick};

/// One keyed exchange network engine for a single resource kind.
///
/// The grid is owned by a single control thread; mutation and snapshotting
/// both happen there. It has no internal threading and no async suspension:
/// each tick runs to completion synchronously.
pub struct Grid<K: ResourceKind> {
    endpoints: FnvHashMap<EndpointRef, Endpoint>,
    registry: Registry,
    /// Tick counter value seen by the last `on_tick` call.
    clock: Tick,
    config: TransferConfig,
    dirty: bool,
    _kind: PhantomData<K>,
}

impl<K: ResourceKind> Grid<K> {
    pub fn new() -> Grid<K> {
        Grid::with_config(TransferConfig::for_kind::<K>())
    }

    pub fn with_config(config: TransferConfig) -> Grid<K> {
        Grid {
            endpoints: FnvHashMap::default(),
            registry: Registry::new(),
            clock: 0,
            config,
            dirty: false,
            _kind: PhantomData,
        }
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: TransferConfig) {
        self.config = config;
    }

    pub fn clock(&self) -> Tick {
        self.clock
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn endpoint(&self, loc: &EndpointRef) -> Option<&Endpoint> {
        self.endpoints.get(loc)
    }

    pub fn endpoints(&self) -> impl Iterator<Item = (&EndpointRef, &Endpoint)> {
        self.endpoints.iter()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// True if endpoint or registry state changed since the last
    /// [`Grid::mark_clean`]; the host uses this to decide when to persist.
    pub fn is_dirty(&self) -> bool {
        self.dirty || self.registry.is_dirty()
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
        self.registry.mark_clean();
    }

    /// Creates a fresh endpoint at the given location.
    pub fn place(&mut self, loc: EndpointRef) -> Result<()> {
        if self.endpoints.contains_key(&loc) {
            return Err(Error::EndpointOccupied(loc));
        }
        debug!("placing endpoint at {}", loc);
        self.endpoints.insert(loc, Endpoint::new());
        self.dirty = true;
        // a fresh endpoint advertises nothing, no registry work needed
        Ok(())
    }

    /// Removes an endpoint, fully unregistering it first.
    pub fn remove(&mut self, loc: &EndpointRef) -> Result<()> {
        if self.endpoints.remove(loc).is_none() {
            return Err(Error::NoEndpoint(*loc));
        }
        debug!("removing endpoint at {}", loc);
        // purge instead of diffing against current state: guarantees no
        // stale registration survives removal, whatever state drifted
        self.registry.purge(loc);
        self.dirty = true;
        Ok(())
    }

    /// Cycles the role of one endpoint side:
    /// `None -> Producer -> Consumer -> Both -> None`.
    pub fn cycle_role(&mut self, loc: &EndpointRef, side: Side) -> Result<SideRole> {
        let (next, before, after) = {
            let endpoint = self
                .endpoints
                .get_mut(loc)
                .ok_or(Error::NoEndpoint(*loc))?;
            let before = endpoint.advertised();
            let next = endpoint.cycle_role(side);
            (next, before, endpoint.advertised())
        };
        self.resync(loc, &before, &after);
        self.dirty = true;
        Ok(next)
    }

    /// Sets the role of one endpoint side directly.
    pub fn set_role(&mut self, loc: &EndpointRef, side: Side, role: SideRole) -> Result<()> {
        let (before, after) = {
            let endpoint = self
                .endpoints
                .get_mut(loc)
                .ok_or(Error::NoEndpoint(*loc))?;
            let before = endpoint.advertised();
            endpoint.set_role(side, role);
            (before, endpoint.advertised())
        };
        self.resync(loc, &before, &after);
        self.dirty = true;
        Ok(())
    }

    /// Flips the enabled bit of one side; no effect while the side has no
    /// role. Returns whether anything was toggled.
    pub fn toggle_side_enabled(&mut self, loc: &EndpointRef, side: Side) -> Result<bool> {
        let (toggled, before, after) = {
            let endpoint = self
                .endpoints
                .get_mut(loc)
                .ok_or(Error::NoEndpoint(*loc))?;
            let before = endpoint.advertised();
            let toggled = endpoint.toggle_side_enabled(side);
            (toggled, before, endpoint.advertised())
        };
        self.resync(loc, &before, &after);
        if toggled {
            self.dirty = true;
        }
        Ok(toggled)
    }

    /// Replaces one color slot of one side.
    pub fn set_color(
        &mut self,
        loc: &EndpointRef,
        side: Side,
        slot: usize,
        color: u8,
    ) -> Result<()> {
        let (before, after) = {
            let endpoint = self
                .endpoints
                .get_mut(loc)
                .ok_or(Error::NoEndpoint(*loc))?;
            let before = endpoint.advertised();
            endpoint.set_color(side, slot, color);
            (before, endpoint.advertised())
        };
        self.resync(loc, &before, &after);
        self.dirty = true;
        Ok(())
    }

    /// Applies the same color key to all six sides.
    pub fn set_colors(&mut self, loc: &EndpointRef, colors: ColorKey) -> Result<()> {
        let (before, after) = {
            let endpoint = self
                .endpoints
                .get_mut(loc)
                .ok_or(Error::NoEndpoint(*loc))?;
            let before = endpoint.advertised();
            endpoint.set_colors(colors);
            (before, endpoint.advertised())
        };
        self.resync(loc, &before, &after);
        self.dirty = true;
        Ok(())
    }

    /// Flips the master switch. Registration is unaffected, only scheduling
    /// stops, so no registry resync happens here.
    pub fn set_enabled(&mut self, loc: &EndpointRef, enabled: bool) -> Result<()> {
        let endpoint = self
            .endpoints
            .get_mut(loc)
            .ok_or(Error::NoEndpoint(*loc))?;
        endpoint.set_enabled(enabled);
        self.dirty = true;
        Ok(())
    }

    /// Applies the difference between two advertised-facts snapshots to the
    /// registry. Mutations that leave the advertised facts untouched cause
    /// no registry churn at all.
    fn resync(&mut self, loc: &EndpointRef, before: &Advertised, after: &Advertised) {
        if before == after {
            return;
        }
        for key in before.producer_keys.difference(&after.producer_keys) {
            self.registry.unregister_producer(*key, loc);
        }
        for key in after.producer_keys.difference(&before.producer_keys) {
            self.registry.register_producer(*key, *loc);
        }
        for key in before.consumer_keys.difference(&after.consumer_keys) {
            self.registry.unregister_consumer(*key, loc);
        }
        for key in after.consumer_keys.difference(&before.consumer_keys) {
            self.registry.register_consumer(*key, *loc);
        }
    }

    /// Reconciles the registry with actual endpoint state, endpoint by
    /// endpoint. Run after loading persisted state: legacy role migration
    /// may have changed what an endpoint advertises compared to what the
    /// persisted registry recorded.
    fn resync_all(&mut self) {
        let locs: Vec<EndpointRef> = self.endpoints.keys().copied().collect();
        for loc in locs {
            let advertised = match self.endpoints.get(&loc) {
                Some(endpoint) => endpoint.advertised(),
                None => continue,
            };
            self.registry.purge(&loc);
            for key in &advertised.producer_keys {
                self.registry.register_producer(*key, loc);
            }
            for key in &advertised.consumer_keys {
                self.registry.register_consumer(*key, loc);
            }
        }
    }

    // ---- persistence ----

    /// Serializes the whole grid to a snapshot byte vector.
    pub fn to_snapshot(&self, compress: bool) -> Result<Vec<u8>> {
        let snapshot = Snapshot::new(
            K::NAME,
            self.clock,
            self.endpoints.clone(),
            self.registry.clone(),
        );
        snapshot.to_bytes(compress)
    }

    /// Restores a grid from snapshot bytes, then reconciles the registry
    /// against the loaded endpoints.
    pub fn from_snapshot(bytes: &[u8], compressed: bool) -> Result<Grid<K>> {
        let snapshot = Snapshot::from_bytes(bytes, compressed)?;
        if snapshot.metadata.kind != K::NAME {
            return Err(Error::FailedReadingSnapshot(format!(
                "kind mismatch: snapshot holds {}, grid wants {}",
                snapshot.metadata.kind,
                K::NAME
            )));
        }
        let mut grid = Grid {
            endpoints: snapshot.endpoints,
            registry: snapshot.registry,
            clock: snapshot.clock,
            config: TransferConfig::for_kind::<K>(),
            dirty: false,
            _kind: PhantomData,
        };
        grid.resync_all();
        grid.registry.mark_clean();
        info!(
            "restored {} grid: {} endpoints, clock {}",
            K::NAME,
            grid.endpoints.len(),
            grid.clock
        );
        Ok(grid)
    }
}

impl<K: ResourceKind> Default for Grid<K> {
    fn default() -> Self {
        Grid::new()
    }
}

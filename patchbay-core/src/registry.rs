//! Process-wide network registry.
//!
//! Two multimaps, key to producer locations and key to consumer locations,
//! spanning all partitions. The registry is owned by a single control thread
//! (the host tick thread); all mutation and snapshotting happens there, and
//! snapshots are copy-on-read so no live reference ever leaves.

use std::collections::HashSet;

use fnv::FnvHashMap;
use linked_hash_map::LinkedHashMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::endpoint::{EndpointRef, Pos};
use crate::key::NetworkKey;
use crate::{string, PartitionName, DEFAULT_PARTITION};

/// Key-to-locations registry for a single resource kind.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    producers: FnvHashMap<NetworkKey, HashSet<EndpointRef>>,
    consumers: FnvHashMap<NetworkKey, HashSet<EndpointRef>>,
    dirty: bool,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    /// Registers a producer location under a key. Registering the same
    /// location twice is a no-op after the first.
    pub fn register_producer(&mut self, key: NetworkKey, loc: EndpointRef) {
        Self::register(&mut self.producers, &mut self.dirty, key, loc);
    }

    /// Unregisters a producer location. Unregistering an absent location is
    /// a no-op.
    pub fn unregister_producer(&mut self, key: NetworkKey, loc: &EndpointRef) {
        Self::unregister(&mut self.producers, &mut self.dirty, key, loc);
    }

    pub fn register_consumer(&mut self, key: NetworkKey, loc: EndpointRef) {
        Self::register(&mut self.consumers, &mut self.dirty, key, loc);
    }

    pub fn unregister_consumer(&mut self, key: NetworkKey, loc: &EndpointRef) {
        Self::unregister(&mut self.consumers, &mut self.dirty, key, loc);
    }

    /// Removes a location from every bucket of both maps. The strongest
    /// guard against stale registrations surviving endpoint removal.
    pub fn purge(&mut self, loc: &EndpointRef) {
        let dirty = &mut self.dirty;
        for map in [&mut self.producers, &mut self.consumers].iter_mut() {
            map.retain(|_, set| {
                if set.remove(loc) {
                    *dirty = true;
                }
                !set.is_empty()
            });
        }
    }

    /// Sorted copy of all producer locations under a key.
    ///
    /// Sorting (partition, then coordinate) keeps round-robin cursors
    /// meaningful across queries even though set iteration order is not
    /// stable.
    pub fn snapshot_producers(&self, key: NetworkKey) -> Vec<EndpointRef> {
        Self::snapshot(&self.producers, key)
    }

    /// Sorted copy of all consumer locations under a key.
    pub fn snapshot_consumers(&self, key: NetworkKey) -> Vec<EndpointRef> {
        Self::snapshot(&self.consumers, key)
    }

    /// True if anything changed since the last [`Registry::mark_clean`].
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    fn register(
        map: &mut FnvHashMap<NetworkKey, HashSet<EndpointRef>>,
        dirty: &mut bool,
        key: NetworkKey,
        loc: EndpointRef,
    ) {
        if map.entry(key).or_insert_with(HashSet::new).insert(loc) {
            trace!("registered {} under key {}", loc, key);
            *dirty = true;
        }
    }

    fn unregister(
        map: &mut FnvHashMap<NetworkKey, HashSet<EndpointRef>>,
        dirty: &mut bool,
        key: NetworkKey,
        loc: &EndpointRef,
    ) {
        let set = match map.get_mut(&key) {
            Some(s) => s,
            None => return,
        };
        if set.remove(loc) {
            trace!("unregistered {} from key {}", loc, key);
            *dirty = true;
        }
        // prune empty buckets right away, keeps the persisted size bounded
        if set.is_empty() {
            map.remove(&key);
        }
    }

    fn snapshot(
        map: &FnvHashMap<NetworkKey, HashSet<EndpointRef>>,
        key: NetworkKey,
    ) -> Vec<EndpointRef> {
        let mut out: Vec<EndpointRef> = match map.get(&key) {
            Some(set) => set.iter().copied().collect(),
            None => return Vec::new(),
        };
        out.sort();
        out
    }
}

// ---- persisted form ----

/// One persisted location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationRecord {
    pub partition: String,
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

/// Persisted registry form: two sections, each keyed by the decimal string
/// of the packed network key.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RegistryData {
    #[serde(default)]
    pub producers: LinkedHashMap<String, Vec<LocationRecord>>,
    #[serde(default)]
    pub consumers: LinkedHashMap<String, Vec<LocationRecord>>,
}

impl Registry {
    pub fn to_data(&self) -> RegistryData {
        RegistryData {
            producers: section_to_data(&self.producers),
            consumers: section_to_data(&self.consumers),
        }
    }

    /// Rebuilds a registry from its persisted form.
    ///
    /// A single corrupt entry never fails the whole load: unparsable key
    /// strings are skipped, unrecognized partition names fall back to the
    /// default partition.
    pub fn from_data(data: RegistryData) -> Registry {
        Registry {
            producers: section_from_data(data.producers),
            consumers: section_from_data(data.consumers),
            dirty: false,
        }
    }
}

fn section_to_data(
    map: &FnvHashMap<NetworkKey, HashSet<EndpointRef>>,
) -> LinkedHashMap<String, Vec<LocationRecord>> {
    let mut keys: Vec<NetworkKey> = map.keys().copied().collect();
    keys.sort();

    let mut out = LinkedHashMap::new();
    for key in keys {
        let mut locs: Vec<EndpointRef> = map[&key].iter().copied().collect();
        locs.sort();
        let records = locs
            .into_iter()
            .map(|loc| LocationRecord {
                partition: loc.partition.to_string(),
                x: loc.pos.x,
                y: loc.pos.y,
                z: loc.pos.z,
            })
            .collect();
        out.insert(key.value().to_string(), records);
    }
    out
}

fn section_from_data(
    data: LinkedHashMap<String, Vec<LocationRecord>>,
) -> FnvHashMap<NetworkKey, HashSet<EndpointRef>> {
    let mut out: FnvHashMap<NetworkKey, HashSet<EndpointRef>> =
        FnvHashMap::default();
    for (key_string, records) in data {
        let key = match key_string.parse::<u16>() {
            Ok(v) => NetworkKey::new(v),
            Err(_) => {
                warn!("skipping unparsable registry key: {:?}", key_string);
                continue;
            }
        };
        let set = out.entry(key).or_insert_with(HashSet::new);
        for rec in records {
            let partition: PartitionName = match string::new(&rec.partition) {
                Ok(name) if !name.is_empty() => name,
                _ => {
                    warn!(
                        "unrecognized partition {:?}, falling back to {:?}",
                        rec.partition, DEFAULT_PARTITION
                    );
                    string::new_truncate(DEFAULT_PARTITION)
                }
            };
            set.insert(EndpointRef {
                partition,
                pos: Pos::new(rec.x, rec.y, rec.z),
            });
        }
        if set.is_empty() {
            out.remove(&key);
        }
    }
    out
}

impl Serialize for Registry {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_data().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Registry {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Registry::from_data(RegistryData::deserialize(deserializer)?))
    }
}

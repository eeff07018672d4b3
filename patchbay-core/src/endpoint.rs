//! Endpoint state: per-side roles, keys and round-robin cursors.
//!
//! An endpoint is one physical device with six independent sides. Each side
//! carries its own role, enabled flag, color key and round-robin cursor.
//! Roles are kept as plain enums here, the persisted form packs them back
//! into bitmasks at the serialization boundary only.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::error::Error;
use crate::key::{ColorKey, NetworkKey};
use crate::{string, PartitionName};

/// Number of independent sides on an endpoint.
pub const SIDE_COUNT: usize = 6;

/// One of the six sides of an endpoint.
///
/// Stable indices: down=0, up=1, north=2, south=3, west=4, east=5.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize_repr,
    Deserialize_repr,
)]
#[repr(u8)]
pub enum Side {
    Down = 0,
    Up = 1,
    North = 2,
    South = 3,
    West = 4,
    East = 5,
}

impl Side {
    pub const ALL: [Side; SIDE_COUNT] = [
        Side::Down,
        Side::Up,
        Side::North,
        Side::South,
        Side::West,
        Side::East,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// # Panics
    ///
    /// Panics if `index > 5`, that's a bug in the calling layer.
    pub fn from_index(index: usize) -> Side {
        assert!(index < SIDE_COUNT, "side index must be 0..5, got {}", index);
        Side::ALL[index]
    }
}

impl FromStr for Side {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "down" => Ok(Side::Down),
            "up" => Ok(Side::Up),
            "north" => Ok(Side::North),
            "south" => Ok(Side::South),
            "west" => Ok(Side::West),
            "east" => Ok(Side::East),
            _ => Err(Error::ParsingError(format!("not a side: {}", s))),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Side::Down => "down",
            Side::Up => "up",
            Side::North => "north",
            Side::South => "south",
            Side::West => "west",
            Side::East => "east",
        };
        write!(f, "{}", s)
    }
}

/// Role a single side can take in the network.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize_repr,
    Deserialize_repr,
)]
#[repr(u8)]
pub enum SideRole {
    None = 0,
    /// Source side, a "plug".
    Producer = 1,
    /// Sink side, a "point".
    Consumer = 2,
    /// Source and sink at once.
    Both = 3,
}

impl SideRole {
    /// Next role in the interaction cycle:
    /// `None -> Producer -> Consumer -> Both -> None`.
    pub fn cycle(self) -> SideRole {
        match self {
            SideRole::None => SideRole::Producer,
            SideRole::Producer => SideRole::Consumer,
            SideRole::Consumer => SideRole::Both,
            SideRole::Both => SideRole::None,
        }
    }

    pub fn is_producer(self) -> bool {
        matches!(self, SideRole::Producer | SideRole::Both)
    }

    pub fn is_consumer(self) -> bool {
        matches!(self, SideRole::Consumer | SideRole::Both)
    }
}

impl FromStr for SideRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(SideRole::None),
            "producer" | "plug" => Ok(SideRole::Producer),
            "consumer" | "point" => Ok(SideRole::Consumer),
            "both" => Ok(SideRole::Both),
            _ => Err(Error::ParsingError(format!("not a side role: {}", s))),
        }
    }
}

/// State of a single endpoint side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideState {
    pub role: SideRole,
    /// Only meaningful while `role != None`.
    pub enabled: bool,
    pub colors: ColorKey,
    /// Round-robin cursor: index into the last-fetched candidate snapshot.
    pub cursor: u32,
}

impl Default for SideState {
    fn default() -> Self {
        SideState {
            role: SideRole::None,
            enabled: true,
            colors: ColorKey::unset(),
            cursor: 0,
        }
    }
}

impl SideState {
    pub fn key(&self) -> NetworkKey {
        self.colors.network_key()
    }

    pub fn is_producer_enabled(&self) -> bool {
        self.role.is_producer() && self.enabled
    }

    pub fn is_consumer_enabled(&self) -> bool {
        self.role.is_consumer() && self.enabled
    }
}

/// Coordinate of an endpoint within its partition.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
pub struct Pos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Pos {
    pub fn new(x: i32, y: i32, z: i32) -> Pos {
        Pos { x, y, z }
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Endpoint identity: partition plus coordinate.
///
/// Ordered by partition name, then x, y, z, which keeps registry snapshots
/// stable across queries.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
pub struct EndpointRef {
    pub partition: PartitionName,
    pub pos: Pos,
}

impl EndpointRef {
    /// Creates a reference, truncating overlong partition names.
    pub fn new(partition: &str, pos: Pos) -> EndpointRef {
        EndpointRef {
            partition: string::new_truncate(partition),
            pos,
        }
    }
}

impl fmt::Display for EndpointRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.partition, self.pos)
    }
}

/// The registration facts an endpoint currently advertises: which keys it
/// produces under and which it consumes under. Used to keep the registry in
/// sync with minimal churn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Advertised {
    pub producer_keys: HashSet<NetworkKey>,
    pub consumer_keys: HashSet<NetworkKey>,
}

/// One physical device with six independently configured sides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "EndpointRecord", into = "EndpointRecord")]
pub struct Endpoint {
    sides: [SideState; SIDE_COUNT],
    /// Master switch: gates scheduling for the whole endpoint, but does not
    /// affect registration.
    enabled: bool,
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint {
            sides: Default::default(),
            enabled: true,
        }
    }
}

impl Endpoint {
    pub fn new() -> Endpoint {
        Endpoint::default()
    }

    pub fn side(&self, side: Side) -> &SideState {
        &self.sides[side.index()]
    }

    pub(crate) fn side_mut(&mut self, side: Side) -> &mut SideState {
        &mut self.sides[side.index()]
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn network_key(&self, side: Side) -> NetworkKey {
        self.side(side).key()
    }

    /// Sets the role of one side directly. Moving to `None` also clears the
    /// disabled flag so no disabled-but-roleless side persists.
    pub fn set_role(&mut self, side: Side, role: SideRole) {
        let state = self.side_mut(side);
        state.role = role;
        if role == SideRole::None {
            state.enabled = true;
        }
    }

    /// Cycles the role of one side:
    /// `None -> Producer -> Consumer -> Both -> None`.
    pub fn cycle_role(&mut self, side: Side) -> SideRole {
        let next = self.side(side).role.cycle();
        self.set_role(side, next);
        next
    }

    /// Flips the enabled bit of one side. No effect while the side has no
    /// role; returns whether anything was toggled.
    pub fn toggle_side_enabled(&mut self, side: Side) -> bool {
        let state = self.side_mut(side);
        if state.role == SideRole::None {
            return false;
        }
        state.enabled = !state.enabled;
        true
    }

    /// Replaces one color slot of one side.
    pub fn set_color(&mut self, side: Side, slot: usize, color: u8) {
        let state = self.side_mut(side);
        state.colors = state.colors.with(slot, color);
    }

    /// Applies the same color key to all six sides.
    pub fn set_colors(&mut self, colors: ColorKey) {
        for state in self.sides.iter_mut() {
            state.colors = colors;
        }
    }

    /// Computes the currently advertised registration facts. A side counts
    /// only while it has the matching role and its enabled bit set; the
    /// master switch deliberately does not factor in.
    pub fn advertised(&self) -> Advertised {
        let mut adv = Advertised::default();
        for state in self.sides.iter() {
            if state.is_producer_enabled() {
                adv.producer_keys.insert(state.key());
            }
            if state.is_consumer_enabled() {
                adv.consumer_keys.insert(state.key());
            }
        }
        adv
    }
}

fn default_enabled() -> bool {
    true
}

/// Persisted endpoint state.
///
/// Two schema generations coexist: the legacy one wrote a single packed
/// `key` for the whole endpoint, the current one writes `side_keys` per
/// side. Absent fields fall back to unset key, role `None`, enabled,
/// cursor 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointRecord {
    /// Legacy whole-endpoint packed key, kept for older readers.
    #[serde(default)]
    pub key: Option<u16>,
    /// Per-side packed keys; presence marks the current schema.
    #[serde(default)]
    pub side_keys: Option<Vec<u16>>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Bit i set = side i produces.
    #[serde(default)]
    pub producer_mask: u8,
    /// Bit i set = side i consumes.
    #[serde(default)]
    pub consumer_mask: u8,
    /// Bit i set = side i switched off.
    #[serde(default)]
    pub disabled_mask: u8,
    #[serde(default)]
    pub cursors: Vec<u32>,
}

impl From<EndpointRecord> for Endpoint {
    fn from(rec: EndpointRecord) -> Self {
        // records without per-side keys come from the legacy schema
        let legacy = rec.side_keys.is_none();
        let fallback = rec.key.unwrap_or_else(|| ColorKey::unset().pack());

        let mut endpoint = Endpoint {
            sides: Default::default(),
            enabled: rec.enabled,
        };
        for i in 0..SIDE_COUNT {
            let packed = match &rec.side_keys {
                Some(keys) => keys.get(i).copied().unwrap_or(fallback),
                None => fallback,
            };
            let produces = rec.producer_mask >> i & 1 != 0;
            let consumes = rec.consumer_mask >> i & 1 != 0;
            let role = match (produces, consumes) {
                (false, false) => SideRole::None,
                (true, false) => SideRole::Producer,
                (false, true) => SideRole::Consumer,
                (true, true) => {
                    if legacy {
                        // migration rule: legacy data never wrote Both, a
                        // side with both bits set canonicalizes to Consumer
                        warn!(
                            "legacy record with producer and consumer bits \
                             on side {}, keeping consumer",
                            i
                        );
                        SideRole::Consumer
                    } else {
                        SideRole::Both
                    }
                }
            };
            let disabled = rec.disabled_mask >> i & 1 != 0;
            endpoint.sides[i] = SideState {
                role,
                enabled: role == SideRole::None || !disabled,
                colors: ColorKey::unpack(packed),
                cursor: rec.cursors.get(i).copied().unwrap_or(0),
            };
        }
        endpoint
    }
}

impl From<Endpoint> for EndpointRecord {
    fn from(endpoint: Endpoint) -> Self {
        let mut producer_mask = 0u8;
        let mut consumer_mask = 0u8;
        let mut disabled_mask = 0u8;
        for (i, state) in endpoint.sides.iter().enumerate() {
            if state.role.is_producer() {
                producer_mask |= 1 << i;
            }
            if state.role.is_consumer() {
                consumer_mask |= 1 << i;
            }
            if state.role != SideRole::None && !state.enabled {
                disabled_mask |= 1 << i;
            }
        }
        EndpointRecord {
            key: Some(endpoint.sides[0].colors.pack()),
            side_keys: Some(
                endpoint.sides.iter().map(|s| s.colors.pack()).collect(),
            ),
            enabled: endpoint.enabled,
            producer_mask,
            consumer_mask,
            disabled_mask,
            cursors: endpoint.sides.iter().map(|s| s.cursor).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_cycle_covers_all_states() {
        let mut endpoint = Endpoint::new();
        assert_eq!(endpoint.cycle_role(Side::Up), SideRole::Producer);
        assert_eq!(endpoint.cycle_role(Side::Up), SideRole::Consumer);
        assert_eq!(endpoint.cycle_role(Side::Up), SideRole::Both);
        assert_eq!(endpoint.cycle_role(Side::Up), SideRole::None);
    }

    #[test]
    fn cycling_to_none_clears_disabled_bit() {
        let mut endpoint = Endpoint::new();
        endpoint.cycle_role(Side::Up);
        assert!(endpoint.toggle_side_enabled(Side::Up));
        assert!(!endpoint.side(Side::Up).enabled);

        endpoint.set_role(Side::Up, SideRole::None);
        assert!(endpoint.side(Side::Up).enabled);
    }

    #[test]
    fn toggle_is_noop_without_role() {
        let mut endpoint = Endpoint::new();
        assert!(!endpoint.toggle_side_enabled(Side::North));
        assert!(endpoint.side(Side::North).enabled);
    }

    #[test]
    fn advertised_ignores_master_switch() {
        let mut endpoint = Endpoint::new();
        endpoint.set_role(Side::Up, SideRole::Producer);
        endpoint.set_enabled(false);
        let adv = endpoint.advertised();
        assert_eq!(adv.producer_keys.len(), 1);
        assert!(adv.consumer_keys.is_empty());
    }

    #[test]
    fn advertised_skips_disabled_sides() {
        let mut endpoint = Endpoint::new();
        endpoint.set_role(Side::Up, SideRole::Producer);
        endpoint.toggle_side_enabled(Side::Up);
        assert!(endpoint.advertised().producer_keys.is_empty());
    }

    #[test]
    fn legacy_both_bits_prefer_consumer() {
        let rec = EndpointRecord {
            key: Some(5),
            side_keys: None,
            enabled: true,
            producer_mask: 0b000001,
            consumer_mask: 0b000001,
            disabled_mask: 0,
            cursors: vec![],
        };
        let endpoint = Endpoint::from(rec);
        assert_eq!(endpoint.side(Side::Down).role, SideRole::Consumer);
    }

    #[test]
    fn current_schema_both_bits_mean_both() {
        let rec = EndpointRecord {
            key: None,
            side_keys: Some(vec![5; SIDE_COUNT]),
            enabled: true,
            producer_mask: 0b000010,
            consumer_mask: 0b000010,
            disabled_mask: 0,
            cursors: vec![],
        };
        let endpoint = Endpoint::from(rec);
        assert_eq!(endpoint.side(Side::Up).role, SideRole::Both);
    }

    #[test]
    fn record_roundtrip_preserves_state() {
        let mut endpoint = Endpoint::new();
        endpoint.set_role(Side::West, SideRole::Both);
        endpoint.set_color(Side::West, 1, 12);
        endpoint.side_mut(Side::West).cursor = 7;
        endpoint.set_role(Side::East, SideRole::Producer);
        endpoint.toggle_side_enabled(Side::East);

        let rec = EndpointRecord::from(endpoint.clone());
        let loaded = Endpoint::from(rec);
        assert_eq!(loaded, endpoint);
    }

    #[test]
    fn absent_fields_default() {
        // empty table stands in for a record written before every field
        // existed
        let rec: EndpointRecord = toml::from_str("").unwrap();
        let endpoint = Endpoint::from(rec);
        assert!(endpoint.is_enabled());
        for side in Side::ALL.iter() {
            let state = endpoint.side(*side);
            assert_eq!(state.role, SideRole::None);
            assert!(state.enabled);
            assert!(state.colors.is_all_unset());
            assert_eq!(state.cursor, 0);
        }
    }

    #[test]
    fn refs_sort_by_partition_then_coordinate() {
        let mut refs = vec![
            EndpointRef::new("nether", Pos::new(0, 0, 0)),
            EndpointRef::new("main", Pos::new(2, 0, 0)),
            EndpointRef::new("main", Pos::new(1, 5, 5)),
        ];
        refs.sort();
        assert_eq!(refs[0].pos.x, 1);
        assert_eq!(refs[1].pos.x, 2);
        assert_eq!(refs[2].partition.as_str(), "nether");
    }
}

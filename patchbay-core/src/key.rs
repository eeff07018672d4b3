//! Network identity types.
//!
//! A network is identified by a 16-bit key packed from four independent
//! color slots. Two endpoints with equal packed keys belong to the same
//! logical network, no matter where they sit.

use std::fmt;

/// Reserved color id meaning "unset" (gray, dye id 7).
pub const UNSET_COLOR: u8 = 7;

/// Number of color slots making up a key.
pub const COLOR_SLOTS: usize = 4;

/// 4-slot color key.
///
/// Colors are stored as 0..15 dye ids, [`UNSET_COLOR`] meaning "unset".
/// Immutable value object, [`ColorKey::with`] returns a new key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColorKey {
    slots: [u8; COLOR_SLOTS],
}

impl ColorKey {
    /// Creates a key from four slot colors. Out-of-range colors are clamped
    /// into 0..15, not rejected.
    pub fn new(c0: u8, c1: u8, c2: u8, c3: u8) -> ColorKey {
        ColorKey {
            slots: [normalize(c0), normalize(c1), normalize(c2), normalize(c3)],
        }
    }

    /// Default key: all slots unset.
    pub fn unset() -> ColorKey {
        ColorKey {
            slots: [UNSET_COLOR; COLOR_SLOTS],
        }
    }

    /// Creates a key from a packed 16-bit value:
    /// `slot0 | slot1<<4 | slot2<<8 | slot3<<12`.
    pub fn unpack(packed: u16) -> ColorKey {
        ColorKey {
            slots: [
                (packed & 0xF) as u8,
                ((packed >> 4) & 0xF) as u8,
                ((packed >> 8) & 0xF) as u8,
                ((packed >> 12) & 0xF) as u8,
            ],
        }
    }

    /// Packs into a 16-bit value, the exact inverse of [`ColorKey::unpack`].
    pub fn pack(&self) -> u16 {
        (self.slots[0] as u16 & 0xF)
            | ((self.slots[1] as u16 & 0xF) << 4)
            | ((self.slots[2] as u16 & 0xF) << 8)
            | ((self.slots[3] as u16 & 0xF) << 12)
    }

    /// Network key for registries (same value as [`ColorKey::pack`]).
    pub fn network_key(&self) -> NetworkKey {
        NetworkKey::new(self.pack())
    }

    /// True if at least one slot is not unset.
    pub fn is_configured(&self) -> bool {
        self.slots.iter().any(|c| *c != UNSET_COLOR)
    }

    /// True if all slots are unset.
    pub fn is_all_unset(&self) -> bool {
        !self.is_configured()
    }

    /// Returns the color in the given slot.
    ///
    /// # Panics
    ///
    /// Panics if `slot > 3`, that's a bug in the calling layer.
    pub fn get(&self, slot: usize) -> u8 {
        assert!(slot < COLOR_SLOTS, "slot must be 0..3, got {}", slot);
        self.slots[slot]
    }

    /// Returns a new key with one slot replaced. Out-of-range colors are
    /// clamped into 0..15.
    ///
    /// # Panics
    ///
    /// Panics if `slot > 3`, that's a bug in the calling layer.
    pub fn with(&self, slot: usize, color: u8) -> ColorKey {
        assert!(slot < COLOR_SLOTS, "slot must be 0..3, got {}", slot);
        let mut slots = self.slots;
        slots[slot] = normalize(color);
        ColorKey { slots }
    }
}

impl Default for ColorKey {
    fn default() -> Self {
        ColorKey::unset()
    }
}

impl fmt::Display for ColorKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "[{},{},{},{}]",
            self.slots[0], self.slots[1], self.slots[2], self.slots[3]
        )
    }
}

fn normalize(color: u8) -> u8 {
    if color > 15 {
        15
    } else {
        color
    }
}

/// Value-object wrapper around the 16-bit packed network key.
///
/// Helps avoid mixing raw ints everywhere. Endpoints with equal keys belong
/// to the same logical network.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct NetworkKey(u16);

impl NetworkKey {
    pub fn new(value: u16) -> NetworkKey {
        NetworkKey(value)
    }

    pub fn value(&self) -> u16 {
        self.0
    }

    /// Unpacks back into the four color slots.
    pub fn colors(&self) -> ColorKey {
        ColorKey::unpack(self.0)
    }

    pub fn is_configured(&self) -> bool {
        self.colors().is_configured()
    }
}

impl From<ColorKey> for NetworkKey {
    fn from(colors: ColorKey) -> Self {
        colors.network_key()
    }
}

impl fmt::Display for NetworkKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[test]
fn pack_unpack_roundtrip_all_values() {
    for packed in 0..=u16::MAX {
        assert_eq!(ColorKey::unpack(packed).pack(), packed);
    }
}

#[test]
fn with_replaces_single_slot() {
    let key = ColorKey::unset().with(2, 14);
    assert_eq!(key.get(0), UNSET_COLOR);
    assert_eq!(key.get(1), UNSET_COLOR);
    assert_eq!(key.get(2), 14);
    assert_eq!(key.get(3), UNSET_COLOR);
}

#[test]
#[should_panic]
fn with_rejects_bad_slot() {
    ColorKey::unset().with(4, 0);
}

#[test]
fn out_of_range_colors_clamp() {
    let key = ColorKey::new(99, 16, 15, 0);
    assert_eq!(key.get(0), 15);
    assert_eq!(key.get(1), 15);
    assert_eq!(key.get(2), 15);
    assert_eq!(key.get(3), 0);
}

#[test]
fn configured_predicates() {
    assert!(ColorKey::unset().is_all_unset());
    assert!(!ColorKey::unset().is_configured());
    let key = ColorKey::unset().with(0, 3);
    assert!(key.is_configured());
    assert!(!key.is_all_unset());
}

#[test]
fn keys_equal_by_packed_value() {
    let a = ColorKey::new(1, 2, 3, 4).network_key();
    let b = NetworkKey::new(0x4321);
    assert_eq!(a, b);
}

//! This library implements the core patchbay engine.
//!
//! Endpoints advertise their sides as producers ("plugs") or consumers
//! ("points") under a shared 16-bit [`NetworkKey`]; endpoints with equal keys
//! belong to the same logical network, no physical connection required.
//! A per-resource-kind [`Grid`] owns the endpoints and the [`Registry`] of
//! advertised roles, and moves resource from producers to consumers on a
//! fixed tick period, rotating fairly among candidates so no single endpoint
//! starves or hogs bandwidth.
//!
//! The same routing skeleton is instantiated for three resource kinds:
//! discrete items, bulk fluid and energy. Only the low-level transfer
//! primitive differs between them, see the [`transfer`] module.
//!
//! # Host integration
//!
//! The engine expects exactly two things from its host: a call to
//! [`Grid::on_tick`] once per host tick, and an implementation of
//! [`storage::Attachments`] resolving the storage attached to an endpoint
//! side. Everything else (placement, UI, rendering) stays outside.
//!
//! # Example
//!
//! ```ignore
//! use patchbay_core::transfer::Items;
//! use patchbay_core::{EndpointRef, Grid, Pos};
//!
//! let mut grid: Grid<Items> = Grid::new();
//! let loc = EndpointRef::new("main", Pos::new(0, 0, 0));
//! grid.place(loc).unwrap();
//! ```

#[macro_use]
extern crate serde;
#[macro_use]
extern crate log;

// reexports
pub use endpoint::{Endpoint, EndpointRef, Pos, Side, SideRole};
pub use error::{Error, Result};
pub use grid::Grid;
pub use key::{ColorKey, NetworkKey};
pub use registry::Registry;

pub mod config;
pub mod endpoint;
pub mod error;
pub mod grid;
pub mod key;
pub mod registry;
pub mod snapshot;
pub mod storage;
pub mod string;
pub mod transfer;

mod util;

pub const VERSION: &'static str = env!("CARGO_PKG_VERSION");

/// Default name of the engine configuration file.
pub const CONFIG_FILE: &str = "patchbay.toml";

/// Partition used when a persisted partition name cannot be recognized.
pub const DEFAULT_PARTITION: &str = "main";

/// Fixed-size string used internally for indexing objects.
pub type StringId = arrayvec::ArrayString<[u8; 23]>;

/// Partition (world) string identifier type.
pub type PartitionName = StringId;
/// Item kind string identifier type.
pub type ItemName = StringId;
/// Fluid kind string identifier type.
pub type FluidName = StringId;

/// Tick counter type used throughout the library.
pub type Tick = u64;

//! World assembly from a layout file.
//!
//! A world file wires the platform-side pieces the engine deliberately
//! leaves out: named storages, endpoints of the three resource kinds, and
//! the attachments binding storages to endpoint sides. The engine itself
//! only ever sees the resulting grids and attachment maps.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use anyhow::{anyhow, Context, Result};

use patchbay_core::config::SimConfig;
use patchbay_core::storage::{
    AttachmentMap, BottomlessTank, EnergyCell, FluidTank, ItemStack, SlotInventory,
};
use patchbay_core::transfer::{
    Energy, EnergyHandle, FluidHandle, Fluids, ItemHandle, Items, ResourceKind,
};
use patchbay_core::{ColorKey, EndpointRef, Grid, Pos, Side, SideRole, Tick};

/// Commented template written by `patchbay new`.
pub const TEMPLATE: &str = r#"# patchbay world file
#
# Storages are named containers sitting "next to" endpoint sides; endpoints
# advertise their sides as producers (plugs) or consumers (points) under a
# 4-color network key. Endpoints sharing a key exchange resource every few
# ticks, round-robin fair.

[config.items]
tick_period = 10
move_batch = 8

[config.fluids]
tick_period = 10
transfer_amount = 250

[config.energy]
tick_period = 10
transfer_amount = 1000

# a chest with some ore...
[[storage]]
name = "mine_chest"
type = "inventory"
slots = 27
contents = [{ item = "ore", count = 40 }]

# ...feeding an empty chest on the same network
[[storage]]
name = "depot_chest"
type = "inventory"
slots = 27

[[endpoint]]
kind = "items"
partition = "main"
pos = [0, 0, 0]
side = [{ side = "up", role = "plug", colors = [14, 7, 7, 7], attach = "mine_chest" }]

[[endpoint]]
kind = "items"
partition = "main"
pos = [8, 0, 0]
side = [{ side = "down", role = "point", colors = [14, 7, 7, 7], attach = "depot_chest" }]
"#;

#[derive(Debug, Deserialize)]
pub struct WorldFile {
    #[serde(default)]
    pub config: SimConfig,
    #[serde(default)]
    pub storage: Vec<StorageDef>,
    #[serde(default)]
    pub endpoint: Vec<EndpointDef>,
}

#[derive(Debug, Deserialize)]
pub struct StorageDef {
    pub name: String,
    /// One of `inventory`, `tank`, `cell`, `spring`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub slots: Option<usize>,
    #[serde(default)]
    pub capacity: Option<u32>,
    #[serde(default)]
    pub fluid: Option<String>,
    #[serde(default)]
    pub amount: Option<u32>,
    #[serde(default)]
    pub stored: Option<u32>,
    #[serde(default)]
    pub max_transfer: Option<u32>,
    #[serde(default)]
    pub contents: Vec<ItemDef>,
}

#[derive(Debug, Deserialize)]
pub struct ItemDef {
    pub item: String,
    pub count: u32,
}

#[derive(Debug, Deserialize)]
pub struct EndpointDef {
    /// One of `items`, `fluids`, `energy`.
    pub kind: String,
    #[serde(default = "default_partition")]
    pub partition: String,
    pub pos: [i32; 3],
    #[serde(default)]
    pub enabled: Option<bool>,
    /// Whole-endpoint color key, applied to all six sides.
    #[serde(default)]
    pub colors: Option<[u8; 4]>,
    #[serde(default)]
    pub side: Vec<SideDef>,
}

#[derive(Debug, Deserialize)]
pub struct SideDef {
    pub side: String,
    /// Role name: `none`, `plug`/`producer`, `point`/`consumer`, `both`.
    pub role: String,
    #[serde(default)]
    pub colors: Option<[u8; 4]>,
    #[serde(default)]
    pub enabled: Option<bool>,
    /// Name of the storage attached behind this side.
    #[serde(default)]
    pub attach: Option<String>,
}

fn default_partition() -> String {
    patchbay_core::DEFAULT_PARTITION.to_string()
}

/// The three grids plus everything platform-side: storages and attachments.
pub struct World {
    items: Grid<Items>,
    fluids: Grid<Fluids>,
    energy: Grid<Energy>,
    item_env: AttachmentMap<Items>,
    fluid_env: AttachmentMap<Fluids>,
    energy_env: AttachmentMap<Energy>,
    inventories: Vec<(String, Rc<RefCell<SlotInventory>>)>,
    tanks: Vec<(String, Rc<RefCell<FluidTank>>)>,
    springs: Vec<(String, Rc<RefCell<BottomlessTank>>)>,
    cells: Vec<(String, Rc<RefCell<EnergyCell>>)>,
    clock: Tick,
}

impl World {
    pub fn from_path(path: &Path) -> Result<World> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed reading {}", path.to_string_lossy()))?;
        let file: WorldFile = toml::from_str(&text).context("failed parsing world file")?;
        World::build(file)
    }

    pub fn build(file: WorldFile) -> Result<World> {
        let mut config = file.config;
        config.sanitize();

        let mut world = World {
            items: Grid::with_config(config.items_transfer()),
            fluids: Grid::with_config(config.fluids_transfer()),
            energy: Grid::with_config(config.energy_transfer()),
            item_env: AttachmentMap::new(),
            fluid_env: AttachmentMap::new(),
            energy_env: AttachmentMap::new(),
            inventories: Vec::new(),
            tanks: Vec::new(),
            springs: Vec::new(),
            cells: Vec::new(),
            clock: 0,
        };

        let mut inv_map: HashMap<String, Rc<RefCell<SlotInventory>>> = HashMap::new();
        let mut tank_map: HashMap<String, Rc<RefCell<FluidTank>>> = HashMap::new();
        let mut spring_map: HashMap<String, Rc<RefCell<BottomlessTank>>> = HashMap::new();
        let mut cell_map: HashMap<String, Rc<RefCell<EnergyCell>>> = HashMap::new();

        for def in &file.storage {
            match def.kind.as_str() {
                "inventory" => {
                    let slots = def.slots.unwrap_or(27);
                    if def.contents.len() > slots {
                        return Err(anyhow!(
                            "storage {:?} holds more stacks than slots",
                            def.name
                        ));
                    }
                    let inv = Rc::new(RefCell::new(SlotInventory::new(slots)));
                    for (i, c) in def.contents.iter().enumerate() {
                        inv.borrow_mut().load_slot(i, ItemStack::new(&c.item, c.count));
                    }
                    inv_map.insert(def.name.clone(), inv.clone());
                    world.inventories.push((def.name.clone(), inv));
                }
                "tank" => {
                    let tank = Rc::new(RefCell::new(FluidTank::new(
                        def.capacity.unwrap_or(8000),
                    )));
                    if let Some(fluid) = &def.fluid {
                        tank.borrow_mut().load(fluid, def.amount.unwrap_or(0));
                    }
                    tank_map.insert(def.name.clone(), tank.clone());
                    world.tanks.push((def.name.clone(), tank));
                }
                "spring" => {
                    let fluid = def
                        .fluid
                        .as_ref()
                        .ok_or_else(|| anyhow!("spring {:?} needs a fluid", def.name))?;
                    let spring = Rc::new(RefCell::new(BottomlessTank::new(
                        fluid,
                        config.fluids.spring_rate,
                        config.fluids.spring_max_push,
                    )));
                    spring_map.insert(def.name.clone(), spring.clone());
                    world.springs.push((def.name.clone(), spring));
                }
                "cell" => {
                    let capacity = def.capacity.unwrap_or(100_000);
                    let cell = Rc::new(RefCell::new(EnergyCell::new(
                        capacity,
                        def.max_transfer.unwrap_or(capacity),
                    )));
                    cell.borrow_mut().load(def.stored.unwrap_or(0));
                    cell_map.insert(def.name.clone(), cell.clone());
                    world.cells.push((def.name.clone(), cell));
                }
                other => {
                    return Err(anyhow!(
                        "unknown storage type {:?} for {:?}",
                        other,
                        def.name
                    ))
                }
            }
        }

        for def in &file.endpoint {
            let loc = EndpointRef::new(
                &def.partition,
                Pos::new(def.pos[0], def.pos[1], def.pos[2]),
            );
            match def.kind.as_str() {
                "items" => configure_endpoint(
                    &mut world.items,
                    &mut world.item_env,
                    loc,
                    def,
                    |name| {
                        inv_map.get(name).map(|h| {
                            let handle: ItemHandle = h.clone();
                            handle
                        })
                    },
                )?,
                "fluids" => configure_endpoint(
                    &mut world.fluids,
                    &mut world.fluid_env,
                    loc,
                    def,
                    |name| {
                        if let Some(t) = tank_map.get(name) {
                            let handle: FluidHandle = t.clone();
                            return Some(handle);
                        }
                        spring_map.get(name).map(|s| {
                            let handle: FluidHandle = s.clone();
                            handle
                        })
                    },
                )?,
                "energy" => configure_endpoint(
                    &mut world.energy,
                    &mut world.energy_env,
                    loc,
                    def,
                    |name| {
                        cell_map.get(name).map(|h| {
                            let handle: EnergyHandle = h.clone();
                            handle
                        })
                    },
                )?,
                other => return Err(anyhow!("unknown endpoint kind {:?}", other)),
            }
        }

        Ok(world)
    }

    /// Advances the whole world by one tick.
    pub fn step(&mut self) -> (u32, u32, u32) {
        self.clock += 1;
        for (_, spring) in &self.springs {
            spring.borrow_mut().advance(1);
        }
        let items = self.items.on_tick(self.clock, &self.item_env);
        let fluids = self.fluids.on_tick(self.clock, &self.fluid_env);
        let energy = self.energy.on_tick(self.clock, &self.energy_env);
        (items, fluids, energy)
    }

    pub fn clock(&self) -> Tick {
        self.clock
    }

    pub fn endpoint_count(&self) -> usize {
        self.items.len() + self.fluids.len() + self.energy.len()
    }

    pub fn storage_count(&self) -> usize {
        self.inventories.len() + self.tanks.len() + self.springs.len() + self.cells.len()
    }

    /// Human-readable table of every storage's content.
    pub fn report(&self) -> String {
        let mut out = format!("--- world state after tick {} ---\n", self.clock);
        for (name, inv) in &self.inventories {
            out.push_str(&format!("{:<20} {} items\n", name, inv.borrow().total()));
        }
        for (name, tank) in &self.tanks {
            let tank = tank.borrow();
            match tank.fluid() {
                Some(fluid) => out.push_str(&format!(
                    "{:<20} {}/{} {}\n",
                    name,
                    tank.amount(),
                    tank.capacity(),
                    fluid
                )),
                None => out.push_str(&format!("{:<20} empty\n", name)),
            }
        }
        for (name, spring) in &self.springs {
            out.push_str(&format!(
                "{:<20} backlog {}\n",
                name,
                spring.borrow().backlog()
            ));
        }
        for (name, cell) in &self.cells {
            let cell = cell.borrow();
            out.push_str(&format!(
                "{:<20} {}/{} energy\n",
                name,
                cell.stored(),
                cell.capacity()
            ));
        }
        out
    }

    /// Writes one snapshot file per grid into the given directory.
    pub fn save_snapshots(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed creating {}", dir.to_string_lossy()))?;
        fs::write(dir.join("items.snap"), self.items.to_snapshot(true)?)?;
        fs::write(dir.join("fluids.snap"), self.fluids.to_snapshot(true)?)?;
        fs::write(dir.join("energy.snap"), self.energy.to_snapshot(true)?)?;
        Ok(())
    }
}

/// Places one endpoint into a grid and applies its side definitions, using
/// `resolve` to look up attached storages by name.
fn configure_endpoint<K, F>(
    grid: &mut Grid<K>,
    env: &mut AttachmentMap<K>,
    loc: EndpointRef,
    def: &EndpointDef,
    resolve: F,
) -> Result<()>
where
    K: ResourceKind,
    F: Fn(&str) -> Option<K::Handle>,
{
    grid.place(loc)?;
    if let Some(c) = def.colors {
        grid.set_colors(&loc, ColorKey::new(c[0], c[1], c[2], c[3]))?;
    }
    if let Some(enabled) = def.enabled {
        grid.set_enabled(&loc, enabled)?;
    }
    for sd in &def.side {
        let side: Side = sd.side.parse()?;
        let role: SideRole = sd.role.parse()?;
        grid.set_role(&loc, side, role)?;
        if let Some(c) = sd.colors {
            for (slot, color) in c.iter().enumerate() {
                grid.set_color(&loc, side, slot, *color)?;
            }
        }
        if sd.enabled == Some(false) {
            grid.toggle_side_enabled(&loc, side)?;
        }
        if let Some(name) = &sd.attach {
            let handle = resolve(name).ok_or_else(|| {
                anyhow!("no {} storage named {:?}", K::NAME, name)
            })?;
            env.attach(loc, side, handle);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_world_parses_and_runs() {
        let file: WorldFile = toml::from_str(TEMPLATE).unwrap();
        let mut world = World::build(file).unwrap();
        assert_eq!(world.endpoint_count(), 2);
        assert_eq!(world.storage_count(), 2);

        // the mine chest drains into the depot chest, one batch per period
        for _ in 0..50 {
            world.step();
        }
        let depot = &world.inventories[1].1;
        assert_eq!(depot.borrow().total(), 40);
    }

    #[test]
    fn unknown_attachment_is_an_error() {
        let toml_str = r#"
            [[endpoint]]
            kind = "items"
            pos = [0, 0, 0]
            side = [{ side = "up", role = "plug", attach = "nowhere" }]
        "#;
        let file: WorldFile = toml::from_str(toml_str).unwrap();
        assert!(World::build(file).is_err());
    }

    #[test]
    fn spring_fed_tank_fills_over_time() {
        let toml_str = r#"
            [[storage]]
            name = "well"
            type = "spring"
            fluid = "water"

            [[storage]]
            name = "basin"
            type = "tank"
            capacity = 2000

            [[endpoint]]
            kind = "fluids"
            pos = [0, 0, 0]
            side = [{ side = "up", role = "plug", attach = "well" }]

            [[endpoint]]
            kind = "fluids"
            pos = [1, 0, 0]
            side = [{ side = "up", role = "point", attach = "basin" }]
        "#;
        let file: WorldFile = toml::from_str(toml_str).unwrap();
        let mut world = World::build(file).unwrap();
        for _ in 0..100 {
            world.step();
        }
        let basin = &world.tanks[0].1;
        assert_eq!(basin.borrow().amount(), 2000);
    }
}

//! Prototype Resolver - Read-Only Game Data
//!
//! Static visual and geometric facts for entity and tile names. The table
//! is injected and immutable; an absent name is a representable state, not
//! an error.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::document::Direction;

/// Owned RGBA8 pixel buffer for prototypes carrying real sprite art.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pixmap {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Pixmap {
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        if x >= self.width || y >= self.height {
            return [0, 0, 0, 0];
        }
        let i = ((y * self.width + x) * 4) as usize;
        match self.pixels.get(i..i + 4) {
            Some(p) => [p[0], p[1], p[2], p[3]],
            None => [0, 0, 0, 0],
        }
    }
}

/// Where a sprite layer's pixels come from. Fixture tables use solid
/// colors; real game-data exports carry pixmaps cut from the atlas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpriteSource {
    Solid([u8; 4]),
    Pixmap(Pixmap),
}

/// Vertical slot a drawable occupies. The layout engine folds this into
/// the draw-order key; the compositor also uses it to split connection
/// passes around the entity pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderLayer {
    Below,
    #[default]
    Object,
    Above,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpriteLayer {
    pub source: SpriteSource,
    /// Offset of the sprite's top-left from the footprint's top-left,
    /// in grid units, north-facing.
    #[serde(default)]
    pub grid_offset: (f64, f64),
    /// Sprite extent in grid units.
    pub grid_size: (f64, f64),
    #[serde(default)]
    pub layer: RenderLayer,
    /// Whether the offset rotates with the entity direction.
    #[serde(default)]
    pub directional: bool,
}

/// Connection behavior class. Drives implicit adjacency stitching and
/// which side of the entity pass a wire draws on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrototypeClass {
    #[default]
    Standard,
    Belt,
    Pipe,
    Pole,
}

/// North-relative anchor where a wire visually attaches, indexed by
/// connector id (1-based in the exchange format).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ConnectorAnchor {
    pub offset: (f64, f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prototype {
    pub name: String,
    /// Footprint in grid cells, north-facing: (width, height).
    pub footprint: (u32, u32),
    #[serde(default)]
    pub class: PrototypeClass,
    /// Higher draws later within the same row. Poles and tall structures
    /// sit above ground furniture.
    #[serde(default)]
    pub draw_priority: i32,
    pub layers: Vec<SpriteLayer>,
    #[serde(default)]
    pub connectors: Vec<ConnectorAnchor>,
}

impl Prototype {
    /// Footprint rotated for an orientation. E/W swap the axes; diagonals
    /// only make sense for square footprints, which the layout engine
    /// enforces before calling this.
    pub fn rotated_footprint(&self, direction: Direction) -> (u32, u32) {
        let (w, h) = self.footprint;
        match direction {
            Direction::East | Direction::West => (h, w),
            _ => (w, h),
        }
    }

    /// Rotation-adjusted anchor offset for a connector id. Unknown ids
    /// anchor at the entity center so a wire still lands somewhere sane.
    pub fn connector_offset(&self, connector: u16, direction: Direction) -> (f64, f64) {
        let base = connector
            .checked_sub(1)
            .and_then(|i| self.connectors.get(i as usize))
            .map(|a| a.offset)
            .unwrap_or((0.0, 0.0));
        direction.rotate_offset(base)
    }
}

/// Immutable name -> prototype map, loaded once and shared read-only
/// across renders.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PrototypeTable {
    prototypes: HashMap<String, Prototype>,
}

impl PrototypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, prototype: Prototype) {
        self.prototypes.insert(prototype.name.clone(), prototype);
    }

    pub fn get(&self, name: &str) -> Option<&Prototype> {
        self.prototypes.get(name)
    }

    pub fn len(&self) -> usize {
        self.prototypes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prototypes.is_empty()
    }

    /// Load every `*.json` prototype file in a directory. Files that fail
    /// to parse are skipped with a warning; a game-data export can carry
    /// entries newer than this engine.
    pub fn load_from_dir(dir: &Path) -> Result<Self, std::io::Error> {
        let mut table = Self::new();
        if dir.exists() {
            for entry in fs::read_dir(dir)? {
                let path = entry?.path();
                if path.extension().map_or(false, |e| e == "json") {
                    let content = fs::read_to_string(&path)?;
                    match serde_json::from_str::<Prototype>(&content) {
                        Ok(prototype) => table.register(prototype),
                        Err(e) => log::warn!("skipping prototype file {path:?}: {e}"),
                    }
                }
            }
        }
        Ok(table)
    }

    /// Small built-in table covering the common test entities, so the CLI
    /// works without a game-data export on disk.
    pub fn builtin() -> Self {
        let mut table = Self::new();
        table.register(solid_proto(
            "transport-belt",
            (1, 1),
            PrototypeClass::Belt,
            0,
            [208, 176, 48, 255],
        ));
        table.register(solid_proto(
            "pipe",
            (1, 1),
            PrototypeClass::Pipe,
            0,
            [96, 156, 180, 255],
        ));
        table.register(solid_proto(
            "stone-furnace",
            (2, 2),
            PrototypeClass::Standard,
            0,
            [150, 120, 100, 255],
        ));
        table.register(solid_proto(
            "assembling-machine-2",
            (3, 3),
            PrototypeClass::Standard,
            0,
            [78, 120, 160, 255],
        ));
        table.register(solid_proto(
            "storage-tank",
            (3, 3),
            PrototypeClass::Pipe,
            1,
            [130, 130, 140, 255],
        ));

        let mut pole = solid_proto(
            "small-electric-pole",
            (1, 1),
            PrototypeClass::Pole,
            2,
            [112, 80, 48, 255],
        );
        pole.connectors = vec![
            ConnectorAnchor { offset: (0.0, -0.4) },
            ConnectorAnchor { offset: (0.0, -0.4) },
            ConnectorAnchor { offset: (0.0, -0.4) },
            ConnectorAnchor { offset: (0.0, -0.4) },
            ConnectorAnchor { offset: (0.0, -0.5) },
        ];
        table.register(pole);

        let mut combinator = solid_proto(
            "decider-combinator",
            (1, 2),
            PrototypeClass::Standard,
            1,
            [160, 64, 64, 255],
        );
        combinator.connectors = vec![
            ConnectorAnchor { offset: (-0.3, -0.8) },
            ConnectorAnchor { offset: (0.3, -0.8) },
            ConnectorAnchor { offset: (-0.3, 0.8) },
            ConnectorAnchor { offset: (0.3, 0.8) },
        ];
        table.register(combinator);

        table.register(solid_proto(
            "stone-path",
            (1, 1),
            PrototypeClass::Standard,
            0,
            [88, 88, 84, 255],
        ));
        table.register(solid_proto(
            "concrete",
            (1, 1),
            PrototypeClass::Standard,
            0,
            [72, 76, 80, 255],
        ));
        table
    }
}

fn solid_proto(
    name: &str,
    footprint: (u32, u32),
    class: PrototypeClass,
    draw_priority: i32,
    color: [u8; 4],
) -> Prototype {
    Prototype {
        name: name.to_string(),
        footprint,
        class,
        draw_priority,
        layers: vec![SpriteLayer {
            source: SpriteSource::Solid(color),
            grid_offset: (0.0, 0.0),
            grid_size: (footprint.0 as f64, footprint.1 as f64),
            layer: RenderLayer::Object,
            directional: false,
        }],
        connectors: vec![],
    }
}

/// Lookup result. Absence is valid and renders as a placeholder.
#[derive(Debug, Clone, Copy)]
pub enum Resolved<'a> {
    Known(&'a Prototype),
    Unknown,
}

impl<'a> Resolved<'a> {
    pub fn known(&self) -> Option<&'a Prototype> {
        match self {
            Self::Known(p) => Some(p),
            Self::Unknown => None,
        }
    }
}

/// Per-render resolver over an injected table, memoizing lookups for the
/// duration of one render call. Not shared across renders; the table
/// itself is immutable and safe for concurrent readers.
pub struct Resolver<'a> {
    table: &'a PrototypeTable,
    cache: RefCell<HashMap<String, Option<&'a Prototype>>>,
}

impl<'a> Resolver<'a> {
    pub fn new(table: &'a PrototypeTable) -> Self {
        Self {
            table,
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn lookup(&self, name: &str) -> Resolved<'a> {
        if let Some(hit) = self.cache.borrow().get(name) {
            return match *hit {
                Some(p) => Resolved::Known(p),
                None => Resolved::Unknown,
            };
        }
        let found = self.table.get(name);
        self.cache.borrow_mut().insert(name.to_string(), found);
        match found {
            Some(p) => Resolved::Known(p),
            None => Resolved::Unknown,
        }
    }
}

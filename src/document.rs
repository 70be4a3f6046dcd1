//! Document Model - Typed Blueprint Representation
//!
//! Pure data mirroring the exchange JSON schema. Invariant checks live in
//! `Blueprint::validate`; the codec calls it after parsing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A decoded document: either a single blueprint or a recursive book.
///
/// Externally tagged so the JSON wrapper keys (`blueprint` /
/// `blueprint_book`) round-trip unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Document {
    #[serde(rename = "blueprint")]
    Blueprint(Blueprint),
    #[serde(rename = "blueprint_book")]
    Book(Book),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub version: u64,
    #[serde(default, rename = "blueprints", skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<BookMember>,
    #[serde(default)]
    pub active_index: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookMember {
    #[serde(default)]
    pub index: u64,
    #[serde(flatten)]
    pub document: Document,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blueprint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Packed game map version (major/minor/patch/dev in 16-bit fields).
    #[serde(default)]
    pub version: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub icons: Vec<Icon>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<Entity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tiles: Vec<Tile>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wires: Vec<Wire>,
    /// Schedules, parameters and other fields rendering never reads.
    /// Preserved verbatim for re-encode.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Icon {
    pub index: u32,
    pub signal: Signal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub entity_number: u64,
    pub name: String,
    pub position: Position,
    #[serde(default, skip_serializing_if = "Direction::is_north")]
    pub direction: Direction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipe: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Center point of an entity in grid units. Footprint-aligned, so 1x1
/// entities sit on half coordinates and 2x2 entities on whole ones.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    pub name: String,
    pub position: TilePosition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TilePosition {
    pub x: i32,
    pub y: i32,
}

/// Eight-way entity orientation. Wire format: 0=N, 2=E, 4=S, 6=W with odd
/// values for diagonals. Values above 7 are a schema violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Direction {
    #[default]
    North = 0,
    NorthEast = 1,
    East = 2,
    SouthEast = 3,
    South = 4,
    SouthWest = 5,
    West = 6,
    NorthWest = 7,
}

impl TryFrom<u8> for Direction {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::North),
            1 => Ok(Self::NorthEast),
            2 => Ok(Self::East),
            3 => Ok(Self::SouthEast),
            4 => Ok(Self::South),
            5 => Ok(Self::SouthWest),
            6 => Ok(Self::West),
            7 => Ok(Self::NorthWest),
            other => Err(format!("direction out of range: {other}")),
        }
    }
}

impl From<Direction> for u8 {
    fn from(value: Direction) -> Self {
        value as u8
    }
}

impl Direction {
    pub fn is_north(&self) -> bool {
        *self == Self::North
    }

    pub fn is_cardinal(&self) -> bool {
        matches!(self, Self::North | Self::East | Self::South | Self::West)
    }

    /// Unit grid step toward this direction. Y grows downward, matching
    /// raster coordinates. Diagonals step on both axes.
    pub fn step(&self) -> (i32, i32) {
        match self {
            Self::North => (0, -1),
            Self::NorthEast => (1, -1),
            Self::East => (1, 0),
            Self::SouthEast => (1, 1),
            Self::South => (0, 1),
            Self::SouthWest => (-1, 1),
            Self::West => (-1, 0),
            Self::NorthWest => (-1, -1),
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Self::North => Self::South,
            Self::NorthEast => Self::SouthWest,
            Self::East => Self::West,
            Self::SouthEast => Self::NorthWest,
            Self::South => Self::North,
            Self::SouthWest => Self::NorthEast,
            Self::West => Self::East,
            Self::NorthWest => Self::SouthEast,
        }
    }

    /// Rotate a north-relative offset into this orientation. Diagonals use
    /// the preceding cardinal (connector anchors are defined per cardinal).
    pub fn rotate_offset(&self, offset: (f64, f64)) -> (f64, f64) {
        let (dx, dy) = offset;
        match self {
            Self::North | Self::NorthEast => (dx, dy),
            Self::East | Self::SouthEast => (-dy, dx),
            Self::South | Self::SouthWest => (-dx, -dy),
            Self::West | Self::NorthWest => (dy, -dx),
        }
    }
}

/// An explicit wire between two entity connectors, stored as the raw
/// `[entity, connector, entity, connector]` quad of the exchange format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wire(pub u64, pub u16, pub u64, pub u16);

impl Wire {
    pub fn source_entity(&self) -> u64 {
        self.0
    }

    pub fn source_connector(&self) -> u16 {
        self.1
    }

    pub fn target_entity(&self) -> u64 {
        self.2
    }

    pub fn target_connector(&self) -> u16 {
        self.3
    }

    /// Wire color from the connector id: odd circuit ids are red, even are
    /// green, ids 5 and up are copper (power poles and switches).
    pub fn kind(&self) -> WireKind {
        let id = self.1.max(self.3);
        if id >= 5 {
            WireKind::Copper
        } else if id % 2 == 1 {
            WireKind::Red
        } else {
            WireKind::Green
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireKind {
    Red,
    Green,
    Copper,
}

/// A structural problem found in an otherwise parseable document.
/// The codec surfaces these as `SchemaViolation`.
#[derive(Debug, Clone)]
pub struct SchemaIssue {
    pub path: String,
    pub message: String,
}

impl SchemaIssue {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Post-2.0 entity names mapped back to their canonical prototype names,
/// so one prototype table covers both eras of exported strings.
fn canonical_entity_name(name: &str) -> Option<&'static str> {
    Some(match name {
        "legacy-curved-rail" => "curved-rail",
        "legacy-straight-rail" => "straight-rail",
        "active-provider-chest" => "logistic-chest-active-provider",
        "passive-provider-chest" => "logistic-chest-passive-provider",
        "storage-chest" => "logistic-chest-storage",
        "buffer-chest" => "logistic-chest-buffer",
        "requester-chest" => "logistic-chest-requester",
        "bulk-inserter" => "stack-inserter",
        _ => return None,
    })
}

impl Document {
    /// Maximum book nesting below this node, 1 for a bare blueprint.
    pub fn depth(&self) -> usize {
        match self {
            Self::Blueprint(_) => 1,
            Self::Book(book) => {
                1 + book
                    .members
                    .iter()
                    .map(|m| m.document.depth())
                    .max()
                    .unwrap_or(0)
            }
        }
    }

    /// All blueprints in breadth-first order, book heads before children.
    pub fn blueprints(&self) -> Vec<&Blueprint> {
        let mut found = Vec::new();
        let mut work = std::collections::VecDeque::new();
        work.push_back(self);
        while let Some(doc) = work.pop_front() {
            match doc {
                Self::Blueprint(bp) => found.push(bp),
                Self::Book(book) => {
                    for member in &book.members {
                        work.push_back(&member.document);
                    }
                }
            }
        }
        found
    }

    /// The blueprint a book-level render shows: first in breadth-first
    /// order, matching how books present their head entry.
    pub fn first_blueprint(&self) -> Option<&Blueprint> {
        self.blueprints().into_iter().next()
    }

    /// Label shown for the whole document: the book's own label, falling
    /// back to the first blueprint's.
    pub fn head_label(&self) -> Option<&str> {
        match self {
            Self::Blueprint(bp) => bp.label.as_deref(),
            Self::Book(book) => book
                .label
                .as_deref()
                .or_else(|| self.first_blueprint().and_then(|bp| bp.label.as_deref())),
        }
    }

    /// Rewrite legacy entity names to canonical ones, recursively.
    pub fn normalize(&mut self) {
        match self {
            Self::Blueprint(bp) => {
                for entity in &mut bp.entities {
                    if let Some(canonical) = canonical_entity_name(&entity.name) {
                        entity.name = canonical.to_string();
                    }
                }
            }
            Self::Book(book) => {
                for member in &mut book.members {
                    member.document.normalize();
                }
            }
        }
    }
}

impl Blueprint {
    /// Structural invariants: unique entity numbers, at most four icons,
    /// every wire endpoint referencing a distinct existing entity.
    pub fn validate(&self) -> Result<(), SchemaIssue> {
        let mut ids = std::collections::HashSet::with_capacity(self.entities.len());
        for (i, entity) in self.entities.iter().enumerate() {
            if !ids.insert(entity.entity_number) {
                return Err(SchemaIssue::new(
                    format!("entities[{i}].entity_number"),
                    format!("duplicate entity number {}", entity.entity_number),
                ));
            }
        }

        if self.icons.len() > 4 {
            return Err(SchemaIssue::new(
                "icons",
                format!("at most 4 icons allowed, found {}", self.icons.len()),
            ));
        }

        for (i, wire) in self.wires.iter().enumerate() {
            if wire.source_entity() == wire.target_entity() {
                return Err(SchemaIssue::new(
                    format!("wires[{i}]"),
                    "wire connects an entity to itself",
                ));
            }
            if wire.source_connector() == 0 || wire.target_connector() == 0 {
                return Err(SchemaIssue::new(
                    format!("wires[{i}]"),
                    "connector ids start at 1",
                ));
            }
            for endpoint in [wire.source_entity(), wire.target_entity()] {
                if !ids.contains(&endpoint) {
                    return Err(SchemaIssue::new(
                        format!("wires[{i}]"),
                        format!("wire references missing entity {endpoint}"),
                    ));
                }
            }
        }

        Ok(())
    }

    pub fn entity(&self, entity_number: u64) -> Option<&Entity> {
        self.entities
            .iter()
            .find(|e| e.entity_number == entity_number)
    }
}

/// Human-readable form of a packed map version, e.g. "2.0.10".
pub fn format_version(version: u64) -> String {
    let major = (version >> 48) & 0xffff;
    let minor = (version >> 32) & 0xffff;
    let patch = (version >> 16) & 0xffff;
    format!("{major}.{minor}.{patch}")
}

//! Connection Resolver - Wires and Adjacency Stitches
//!
//! Explicit wires become sagged polylines between rotation-adjusted
//! connector anchors. Belt and pipe adjacency becomes a 4-bit stitch mask
//! consumed by sprite selection; it is a rendering concern, not a logical
//! network.

use std::collections::HashMap;

use crate::document::{Blueprint, Direction, WireKind};
use crate::layout::{Placement, PositionedScene};
use crate::pipeline::{RenderWarning, WarningKind};
use crate::prototype::{PrototypeClass, RenderLayer, Resolver};

/// Samples per wire polyline. Enough for the sag to read as a curve.
const WIRE_SEGMENTS: usize = 8;

/// A resolved visual link, ready for the compositor.
#[derive(Debug, Clone)]
pub enum RoutedConnection {
    /// An explicit wire, routed as a polyline in grid coordinates.
    ///
    /// Every wire the exchange format can express hangs over entities, so
    /// this resolver always emits `RenderLayer::Above`. The field exists
    /// for prototype sets with under-entity runs (buried pipes); the
    /// compositor already draws a below-entity pass for them.
    Polyline {
        kind: WireKind,
        layer: RenderLayer,
        points: Vec<(f64, f64)>,
    },
    /// An implicit belt/pipe join: the entity draws the sprite variant
    /// selected by `mask` instead of a separate line.
    Stitch { entity_number: u64, mask: u8 },
}

/// Neighbor bits in the stitch mask, N/E/S/W from low to high. Matches
/// the WSEN variant ordering of directional pipe sprites.
pub const MASK_NORTH: u8 = 1;
pub const MASK_EAST: u8 = 1 << 1;
pub const MASK_SOUTH: u8 = 1 << 2;
pub const MASK_WEST: u8 = 1 << 3;

/// Policy table for implicit adjacency. The exact compatibility rule is
/// not pinned down by the exchange format, so it stays data, not code.
#[derive(Debug, Clone)]
pub struct AdjacencyRules {
    /// Classes a pipe-class entity stitches to, undirected.
    pub pipe_peers: Vec<PrototypeClass>,
    /// Belts stitch only when one of the pair faces into the other.
    /// Disabled, any side-by-side belts join.
    pub belt_requires_facing: bool,
}

impl Default for AdjacencyRules {
    fn default() -> Self {
        Self {
            pipe_peers: vec![PrototypeClass::Pipe],
            belt_requires_facing: true,
        }
    }
}

/// Resolve every connection in the blueprint against the positioned
/// scene. Unresolvable wires are dropped with a warning; this stage
/// never fails.
pub fn resolve(
    blueprint: &Blueprint,
    scene: &PositionedScene,
    resolver: &Resolver<'_>,
    rules: &AdjacencyRules,
) -> (Vec<RoutedConnection>, Vec<RenderWarning>) {
    let mut routed = Vec::new();
    let mut warnings = Vec::new();

    let by_id: HashMap<u64, &Placement> = scene
        .placements
        .iter()
        .map(|p| (p.entity_number, p))
        .collect();

    // Parallel wires on the same entity pair fan out so red and green
    // stay visually distinct.
    let mut pair_counts: HashMap<(u64, u64), usize> = HashMap::new();
    for wire in &blueprint.wires {
        let key = pair_key(wire.source_entity(), wire.target_entity());
        *pair_counts.entry(key).or_insert(0) += 1;
    }
    let mut pair_seen: HashMap<(u64, u64), usize> = HashMap::new();

    for (i, wire) in blueprint.wires.iter().enumerate() {
        let (source, target) = match (
            by_id.get(&wire.source_entity()),
            by_id.get(&wire.target_entity()),
        ) {
            (Some(s), Some(t)) => (*s, *t),
            _ => {
                log::warn!("dropping wire {i}: endpoint missing from scene");
                warnings.push(RenderWarning::new(
                    WarningKind::DroppedConnection,
                    format!(
                        "wire {} -> {} references an entity missing from the scene",
                        wire.source_entity(),
                        wire.target_entity()
                    ),
                ));
                continue;
            }
        };

        let key = pair_key(wire.source_entity(), wire.target_entity());
        let slot = pair_seen.entry(key).or_insert(0);
        let lane = lane_offset(*slot, pair_counts[&key]);
        *slot += 1;

        let a = anchor(source, wire.source_connector(), resolver);
        let b = anchor(target, wire.target_connector(), resolver);
        routed.push(RoutedConnection::Polyline {
            kind: wire.kind(),
            layer: RenderLayer::Above,
            points: sagged_polyline(a, b, lane),
        });
    }

    let cells = occupancy(scene);
    for placement in &scene.placements {
        let mask = match placement.class {
            PrototypeClass::Pipe => pipe_mask(placement, &cells, rules),
            PrototypeClass::Belt => belt_mask(placement, &cells, rules),
            _ => continue,
        };
        if mask != 0 {
            routed.push(RoutedConnection::Stitch {
                entity_number: placement.entity_number,
                mask,
            });
        }
    }

    (routed, warnings)
}

fn pair_key(a: u64, b: u64) -> (u64, u64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Perpendicular lane displacement for the i-th of n parallel wires,
/// centered on zero.
fn lane_offset(index: usize, total: usize) -> f64 {
    (index as f64 - (total as f64 - 1.0) / 2.0) * 0.08
}

fn anchor(placement: &Placement, connector: u16, resolver: &Resolver<'_>) -> (f64, f64) {
    let offset = resolver
        .lookup(&placement.name)
        .known()
        .map(|proto| proto.connector_offset(connector, placement.direction))
        .unwrap_or((0.0, 0.0));
    (
        placement.position.x + offset.0,
        placement.position.y + offset.1,
    )
}

/// Quadratic sag between two anchors, approximating a hanging wire, with
/// a perpendicular lane shift applied across the whole span.
fn sagged_polyline(a: (f64, f64), b: (f64, f64), lane: f64) -> Vec<(f64, f64)> {
    let dx = b.0 - a.0;
    let dy = b.1 - a.1;
    let span = (dx * dx + dy * dy).sqrt();
    let sag = (span * 0.12).min(0.35);

    // Unit perpendicular; degenerate spans keep the lane shift vertical.
    let (px, py) = if span > f64::EPSILON {
        (-dy / span, dx / span)
    } else {
        (0.0, 1.0)
    };

    (0..=WIRE_SEGMENTS)
        .map(|i| {
            let t = i as f64 / WIRE_SEGMENTS as f64;
            let droop = sag * 4.0 * t * (1.0 - t);
            (
                a.0 + dx * t + px * lane,
                a.1 + dy * t + py * lane + droop,
            )
        })
        .collect()
}

/// Cell the stitch mask is evaluated from. Stitch sprites only exist on
/// 1x1 prototypes, where this is the single footprint cell.
fn cell_of(placement: &Placement) -> (i32, i32) {
    (
        placement.position.x.floor() as i32,
        placement.position.y.floor() as i32,
    )
}

fn cardinal_bits() -> [(Direction, u8); 4] {
    [
        (Direction::North, MASK_NORTH),
        (Direction::East, MASK_EAST),
        (Direction::South, MASK_SOUTH),
        (Direction::West, MASK_WEST),
    ]
}

/// Every cell covered by an entity footprint maps to its placement, so
/// multi-cell entities (tanks) are visible from all their edge cells.
fn occupancy(scene: &PositionedScene) -> HashMap<(i32, i32), &Placement> {
    let mut cells = HashMap::new();
    for placement in &scene.placements {
        let fp = placement.footprint;
        let x0 = fp.min_x.floor() as i32;
        let y0 = fp.min_y.floor() as i32;
        let x1 = (fp.max_x.ceil() as i32).max(x0 + 1);
        let y1 = (fp.max_y.ceil() as i32).max(y0 + 1);
        for y in y0..y1 {
            for x in x0..x1 {
                cells.insert((x, y), placement);
            }
        }
    }
    cells
}

/// Pipes join any grid-adjacent peer class, regardless of orientation.
fn pipe_mask(
    placement: &Placement,
    cells: &HashMap<(i32, i32), &Placement>,
    rules: &AdjacencyRules,
) -> u8 {
    let (x, y) = cell_of(placement);
    let mut mask = 0;
    for (dir, bit) in cardinal_bits() {
        let (dx, dy) = dir.step();
        if let Some(neighbor) = cells.get(&(x + dx, y + dy)) {
            // Multi-cell footprints occupy their own neighbor cells.
            if neighbor.entity_number != placement.entity_number
                && rules.pipe_peers.contains(&neighbor.class)
            {
                mask |= bit;
            }
        }
    }
    mask
}

/// Belts join a neighbor when flow is possible across the shared edge:
/// this belt faces into the neighbor, or the neighbor faces into us.
fn belt_mask(
    placement: &Placement,
    cells: &HashMap<(i32, i32), &Placement>,
    rules: &AdjacencyRules,
) -> u8 {
    let (x, y) = cell_of(placement);
    let mut mask = 0;
    for (dir, bit) in cardinal_bits() {
        let (dx, dy) = dir.step();
        let Some(neighbor) = cells.get(&(x + dx, y + dy)) else {
            continue;
        };
        if neighbor.class != PrototypeClass::Belt {
            continue;
        }
        if !rules.belt_requires_facing {
            mask |= bit;
            continue;
        }
        let outgoing = placement.direction == dir;
        let incoming = neighbor.direction == dir.opposite();
        if outgoing || incoming {
            mask |= bit;
        }
    }
    mask
}

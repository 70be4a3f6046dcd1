//! Layout Engine - Positions, Draw Order, Scale
//!
//! Maps every entity and tile onto the shared grid, computes the scene
//! bounding box, precomputes a pure draw-order key, and resolves the
//! pixel-per-cell scale. The compositor downstream is an ordered draw
//! loop with no decisions of its own.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::document::{Blueprint, Direction, Position};
use crate::pipeline::RenderOptions;
use crate::prototype::{PrototypeClass, Resolver};

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("entity {0} has a diagonal orientation on a non-square footprint")]
    InvalidOrientation(u64),

    #[error("document exceeds the element limit of {0}")]
    TooManyElements(usize),
}

/// Axis-aligned rectangle in grid units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridRect {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl GridRect {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn union(&self, other: &GridRect) -> GridRect {
        GridRect {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    pub fn contains_rect(&self, other: &GridRect) -> bool {
        other.min_x >= self.min_x
            && other.min_y >= self.min_y
            && other.max_x <= self.max_x
            && other.max_y <= self.max_y
    }
}

/// One entity placed on the grid, prototype facts already folded in.
#[derive(Debug, Clone)]
pub struct Placement {
    pub entity_number: u64,
    pub name: String,
    pub position: Position,
    pub direction: Direction,
    pub footprint: GridRect,
    pub class: PrototypeClass,
    pub known: bool,
    /// Pure sort key: (declared priority, footprint top in half-cells,
    /// footprint left in half-cells, entity number). Lower rows sort
    /// later and draw on top.
    pub sort_key: (i32, i64, i64, u64),
}

/// One tile cell. Tiles are stored by their integer top-left cell; their
/// visual center sits at +0.5 on both axes.
#[derive(Debug, Clone)]
pub struct PlacedTile {
    pub name: String,
    pub x: i32,
    pub y: i32,
}

/// Output of the layout stage: everything positioned, ordered and scaled.
#[derive(Debug, Clone)]
pub struct PositionedScene {
    /// Entities in final draw order.
    pub placements: Vec<Placement>,
    /// Tiles in row-major order, duplicates per cell collapsed (last wins).
    pub tiles: Vec<PlacedTile>,
    pub bounds: GridRect,
    /// Pixels per grid cell, uniform on both axes.
    pub scale: f64,
    pub width_px: u32,
    pub height_px: u32,
    /// True when the natural scale had to shrink to fit `max_dimension`.
    pub scaled_down: bool,
}

pub fn layout(
    blueprint: &Blueprint,
    resolver: &Resolver<'_>,
    options: &RenderOptions,
) -> Result<PositionedScene, LayoutError> {
    let element_count = blueprint.entities.len() + blueprint.tiles.len() + blueprint.wires.len();
    if element_count > options.max_elements {
        return Err(LayoutError::TooManyElements(options.max_elements));
    }

    let mut placements = Vec::with_capacity(blueprint.entities.len());
    for entity in &blueprint.entities {
        let resolved = resolver.lookup(&entity.name);
        let (footprint_cells, class, priority, known) = match resolved.known() {
            Some(proto) => {
                let (w, h) = proto.footprint;
                if !entity.direction.is_cardinal() && w != h {
                    return Err(LayoutError::InvalidOrientation(entity.entity_number));
                }
                (
                    proto.rotated_footprint(entity.direction),
                    proto.class,
                    proto.draw_priority,
                    true,
                )
            }
            // Unknown prototypes occupy a single cell placeholder.
            None => ((1, 1), PrototypeClass::Standard, 0, false),
        };

        let half_w = footprint_cells.0 as f64 / 2.0;
        let half_h = footprint_cells.1 as f64 / 2.0;
        let footprint = GridRect::new(
            entity.position.x - half_w,
            entity.position.y - half_h,
            entity.position.x + half_w,
            entity.position.y + half_h,
        );

        placements.push(Placement {
            entity_number: entity.entity_number,
            name: entity.name.clone(),
            position: entity.position,
            direction: entity.direction,
            footprint,
            class,
            known,
            sort_key: (
                priority,
                half_units(footprint.min_y),
                half_units(footprint.min_x),
                entity.entity_number,
            ),
        });
    }
    placements.sort_by_key(|p| p.sort_key);

    // Row-major with last-write-wins per cell.
    let mut tile_cells: BTreeMap<(i32, i32), String> = BTreeMap::new();
    for tile in &blueprint.tiles {
        tile_cells.insert((tile.position.y, tile.position.x), tile.name.clone());
    }
    let tiles: Vec<PlacedTile> = tile_cells
        .into_iter()
        .map(|((y, x), name)| PlacedTile { name, x, y })
        .collect();

    let bounds = compute_bounds(&placements, &tiles);

    let natural = options.tile_px as f64;
    let max_dim = options.max_dimension.max(16) as f64;
    let fit = (max_dim / bounds.width()).min(max_dim / bounds.height());
    let (scale, scaled_down) = if natural > fit {
        (fit, true)
    } else {
        (natural, false)
    };

    let width_px = px_extent(bounds.width(), scale, options.max_dimension);
    let height_px = px_extent(bounds.height(), scale, options.max_dimension);

    log::debug!(
        "layout: {} entities, {} tiles, bounds {:.1}x{:.1} cells, {}x{} px (scale {:.3})",
        placements.len(),
        tiles.len(),
        bounds.width(),
        bounds.height(),
        width_px,
        height_px,
        scale
    );

    Ok(PositionedScene {
        placements,
        tiles,
        bounds,
        scale,
        width_px,
        height_px,
        scaled_down,
    })
}

/// Entity coordinates land on half-cell increments; doubling keeps the
/// sort key exact in integers.
fn half_units(v: f64) -> i64 {
    (v * 2.0).round() as i64
}

fn px_extent(cells: f64, scale: f64, max_dimension: u32) -> u32 {
    (((cells * scale).round() as u32).max(1)).min(max_dimension.max(16))
}

fn compute_bounds(placements: &[Placement], tiles: &[PlacedTile]) -> GridRect {
    let mut bounds: Option<GridRect> = None;
    let mut fold = |rect: GridRect| {
        bounds = Some(match bounds {
            Some(b) => b.union(&rect),
            None => rect,
        });
    };

    for placement in placements {
        fold(placement.footprint);
    }
    for tile in tiles {
        fold(GridRect::new(
            tile.x as f64,
            tile.y as f64,
            tile.x as f64 + 1.0,
            tile.y as f64 + 1.0,
        ));
    }

    // Exact union, no padding: a single entity's scene bounds equal its
    // footprint. Empty scenes get a minimum box around the origin.
    bounds.unwrap_or(GridRect::new(-1.0, -1.0, 1.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Entity, Tile, TilePosition};
    use crate::pipeline::RenderOptions;
    use crate::prototype::PrototypeTable;

    fn entity(id: u64, name: &str, x: f64, y: f64, direction: Direction) -> Entity {
        Entity {
            entity_number: id,
            name: name.to_string(),
            position: Position { x, y },
            direction,
            recipe: None,
            extra: serde_json::Map::new(),
        }
    }

    fn blueprint(entities: Vec<Entity>, tiles: Vec<Tile>) -> Blueprint {
        Blueprint {
            label: None,
            version: 0,
            icons: vec![],
            entities,
            tiles,
            wires: vec![],
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn empty_scene_gets_minimum_bounds() {
        let table = PrototypeTable::builtin();
        let resolver = Resolver::new(&table);
        let scene = layout(&blueprint(vec![], vec![]), &resolver, &RenderOptions::default())
            .unwrap();
        assert_eq!(scene.bounds, GridRect::new(-1.0, -1.0, 1.0, 1.0));
        assert!(scene.width_px >= 1);
    }

    #[test]
    fn rotated_footprint_is_swapped() {
        let table = PrototypeTable::builtin();
        let resolver = Resolver::new(&table);
        // decider-combinator is 1x2 north-facing.
        let scene = layout(
            &blueprint(
                vec![entity(1, "decider-combinator", 0.0, 0.5, Direction::East)],
                vec![],
            ),
            &resolver,
            &RenderOptions::default(),
        )
        .unwrap();
        let fp = scene.placements[0].footprint;
        assert_eq!(fp.width(), 2.0);
        assert_eq!(fp.height(), 1.0);
    }

    #[test]
    fn diagonal_on_non_square_is_invalid() {
        let table = PrototypeTable::builtin();
        let resolver = Resolver::new(&table);
        let err = layout(
            &blueprint(
                vec![entity(7, "decider-combinator", 0.0, 0.5, Direction::NorthEast)],
                vec![],
            ),
            &resolver,
            &RenderOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, LayoutError::InvalidOrientation(7)));
    }

    #[test]
    fn draw_order_is_priority_then_row_then_column_then_id() {
        let table = PrototypeTable::builtin();
        let resolver = Resolver::new(&table);
        let scene = layout(
            &blueprint(
                vec![
                    entity(3, "transport-belt", 1.5, 1.5, Direction::North),
                    entity(1, "transport-belt", 0.5, 1.5, Direction::North),
                    entity(2, "transport-belt", 0.5, 0.5, Direction::North),
                    // Pole has higher draw priority, sorts after everything.
                    entity(4, "small-electric-pole", 0.5, 0.5, Direction::North),
                ],
                vec![],
            ),
            &resolver,
            &RenderOptions::default(),
        )
        .unwrap();
        let order: Vec<u64> = scene.placements.iter().map(|p| p.entity_number).collect();
        assert_eq!(order, vec![2, 1, 3, 4]);
    }

    #[test]
    fn element_limit_is_checked_up_front() {
        let table = PrototypeTable::builtin();
        let resolver = Resolver::new(&table);
        let entities: Vec<Entity> = (0..5)
            .map(|i| entity(i + 1, "pipe", i as f64 + 0.5, 0.5, Direction::North))
            .collect();
        let options = RenderOptions {
            max_elements: 4,
            ..RenderOptions::default()
        };
        let err = layout(&blueprint(entities, vec![]), &resolver, &options).unwrap_err();
        assert!(matches!(err, LayoutError::TooManyElements(4)));
    }

    #[test]
    fn duplicate_tiles_collapse_last_wins() {
        let table = PrototypeTable::builtin();
        let resolver = Resolver::new(&table);
        let tiles = vec![
            Tile {
                name: "stone-path".to_string(),
                position: TilePosition { x: 0, y: 0 },
            },
            Tile {
                name: "concrete".to_string(),
                position: TilePosition { x: 0, y: 0 },
            },
        ];
        let scene = layout(
            &blueprint(vec![], tiles),
            &resolver,
            &RenderOptions::default(),
        )
        .unwrap();
        assert_eq!(scene.tiles.len(), 1);
        assert_eq!(scene.tiles[0].name, "concrete");
    }

    #[test]
    fn oversized_scene_scales_down_uniformly() {
        let table = PrototypeTable::builtin();
        let resolver = Resolver::new(&table);
        let entities = vec![
            entity(1, "pipe", 0.5, 0.5, Direction::North),
            entity(2, "pipe", 299.5, 0.5, Direction::North),
        ];
        let options = RenderOptions {
            max_dimension: 600,
            ..RenderOptions::default()
        };
        let scene = layout(&blueprint(entities, vec![]), &resolver, &options).unwrap();
        assert!(scene.scaled_down);
        assert!(scene.width_px <= 600);
        assert!(scene.height_px <= 600);
        // Aspect ratio preserved within a pixel of rounding.
        let cells_ratio = scene.bounds.width() / scene.bounds.height();
        let px_ratio = scene.width_px as f64 / scene.height_px as f64;
        assert!((cells_ratio - px_ratio).abs() / cells_ratio < 0.05);
    }
}

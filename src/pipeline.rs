//! Render Pipeline - Single Entry Point
//!
//! Ties the stages together: codec, prototype resolution, layout,
//! connection routing, compositing. Fatal errors only come from the
//! decode/layout boundary; everything after a schema-valid document
//! degrades to warnings on a still-produced result.

use image::RgbaImage;
use serde::Serialize;
use thiserror::Error;

use crate::codec::{self, CodecError};
use crate::compositor;
use crate::connections::{self, AdjacencyRules};
use crate::document::{Blueprint, Document};
use crate::hashing;
use crate::layout::{self, GridRect, LayoutError};
use crate::prototype::{PrototypeTable, Resolver};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Layout(#[from] LayoutError),
}

#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Natural pixels per grid cell before any downscaling.
    pub tile_px: u32,
    /// Hard cap on either image axis, in pixels.
    pub max_dimension: u32,
    /// Upper bound on entities + tiles + wires, checked before layout.
    pub max_elements: usize,
    pub draw_grid: bool,
    pub show_overlays: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            tile_px: 32,
            max_dimension: 4096,
            max_elements: 50_000,
            draw_grid: true,
            show_overlays: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    UnknownPrototype,
    DroppedConnection,
    Scaled,
}

/// A non-fatal rendering problem, ordered by pipeline stage.
#[derive(Debug, Clone, Serialize)]
pub struct RenderWarning {
    pub kind: WarningKind,
    pub message: String,
}

impl RenderWarning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ElementCounts {
    pub entities: usize,
    pub tiles: usize,
    pub wires: usize,
}

/// Output of one render call. Ownership moves to the caller; the core
/// keeps nothing.
#[derive(Debug)]
pub struct RenderResult {
    pub image: RgbaImage,
    /// Pixels per grid cell actually used.
    pub scale: f64,
    /// Scene bounding box in grid units.
    pub bounds: GridRect,
    pub warnings: Vec<RenderWarning>,
    /// SHA-256 of the raster, hex. Equal documents and tables produce
    /// equal digests.
    pub digest: String,
    pub counts: ElementCounts,
}

impl RenderResult {
    pub fn has_warning(&self, kind: WarningKind) -> bool {
        self.warnings.iter().any(|w| w.kind == kind)
    }
}

/// The render pipeline over an injected, immutable prototype table.
pub struct Renderer<'a> {
    table: &'a PrototypeTable,
    options: RenderOptions,
    rules: AdjacencyRules,
}

impl<'a> Renderer<'a> {
    pub fn new(table: &'a PrototypeTable) -> Self {
        Self {
            table,
            options: RenderOptions::default(),
            rules: AdjacencyRules::default(),
        }
    }

    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_rules(mut self, rules: AdjacencyRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Decode an exchange string and render it. Books render their first
    /// blueprint in breadth-first order.
    pub fn render_string(&self, text: &str) -> Result<RenderResult, RenderError> {
        let document = codec::decode(text)?;
        self.render_document(&document)
    }

    pub fn render_document(&self, document: &Document) -> Result<RenderResult, RenderError> {
        // The codec guarantees at least one blueprint in any document it
        // produces; a hand-built empty book surfaces the same violation.
        let blueprint = document.first_blueprint().ok_or_else(|| {
            CodecError::schema("blueprint_book.blueprints", "no blueprints found in document")
        })?;
        self.render_blueprint(blueprint)
    }

    pub fn render_blueprint(&self, blueprint: &Blueprint) -> Result<RenderResult, RenderError> {
        let resolver = Resolver::new(self.table);
        let scene = layout::layout(blueprint, &resolver, &self.options)?;

        let mut warnings = Vec::new();
        if scene.scaled_down {
            warnings.push(RenderWarning::new(
                WarningKind::Scaled,
                format!(
                    "scene downscaled to fit {} px, {:.3} px/cell",
                    self.options.max_dimension, scene.scale
                ),
            ));
        }

        let (routed, connection_warnings) =
            connections::resolve(blueprint, &scene, &resolver, &self.rules);
        warnings.extend(connection_warnings);

        let (image, composite_warnings) =
            compositor::composite(&scene, &routed, &resolver, blueprint, &self.options);
        warnings.extend(composite_warnings);

        let digest = hashing::image_digest(&image);
        log::info!(
            "rendered \"{}\": {}x{} px, {} warnings",
            blueprint.label.as_deref().unwrap_or("(no label)"),
            image.width(),
            image.height(),
            warnings.len()
        );

        Ok(RenderResult {
            scale: scene.scale,
            bounds: scene.bounds,
            counts: ElementCounts {
                entities: blueprint.entities.len(),
                tiles: blueprint.tiles.len(),
                wires: blueprint.wires.len(),
            },
            warnings,
            digest,
            image,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Book, BookMember, Entity, Position};

    fn single_entity_blueprint() -> Blueprint {
        Blueprint {
            label: None,
            version: 0,
            icons: vec![],
            entities: vec![Entity {
                entity_number: 1,
                name: "stone-furnace".to_string(),
                position: Position { x: 0.0, y: 0.0 },
                direction: Default::default(),
                recipe: None,
                extra: serde_json::Map::new(),
            }],
            tiles: vec![],
            wires: vec![],
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn book_renders_first_blueprint() {
        let table = PrototypeTable::builtin();
        let doc = Document::Book(Book {
            label: Some("book".to_string()),
            version: 0,
            members: vec![BookMember {
                index: 0,
                document: Document::Blueprint(single_entity_blueprint()),
            }],
            active_index: 0,
        });
        let result = Renderer::new(&table).render_document(&doc).unwrap();
        assert_eq!(result.counts.entities, 1);
    }

    #[test]
    fn empty_book_is_schema_violation() {
        let table = PrototypeTable::builtin();
        let doc = Document::Book(Book {
            label: None,
            version: 0,
            members: vec![],
            active_index: 0,
        });
        let err = Renderer::new(&table).render_document(&doc).unwrap_err();
        assert!(matches!(
            err,
            RenderError::Codec(CodecError::SchemaViolation { .. })
        ));
    }

    #[test]
    fn warnings_are_ordered_by_stage() {
        let table = PrototypeTable::builtin();
        let mut bp = single_entity_blueprint();
        bp.entities.push(Entity {
            entity_number: 2,
            name: "mystery-machine".to_string(),
            position: Position { x: 500.5, y: 0.5 },
            direction: Default::default(),
            recipe: None,
            extra: serde_json::Map::new(),
        });
        let options = RenderOptions {
            max_dimension: 256,
            ..RenderOptions::default()
        };
        let result = Renderer::new(&table)
            .with_options(options)
            .render_blueprint(&bp)
            .unwrap();
        let kinds: Vec<WarningKind> = result.warnings.iter().map(|w| w.kind).collect();
        assert_eq!(
            kinds,
            vec![WarningKind::Scaled, WarningKind::UnknownPrototype]
        );
    }
}

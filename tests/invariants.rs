//! Pipeline Invariant Tests
//!
//! End-to-end guarantees of the decode-and-render pipeline, exercised
//! through the public API against the built-in prototype table.

use bprender_core::{
    codec,
    document::{
        Blueprint, Direction, Document, Entity, Icon, Position, Signal, Tile, TilePosition, Wire,
    },
    pipeline::{RenderOptions, Renderer, WarningKind},
    prototype::PrototypeTable,
    CodecError, RenderError,
};

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

fn blueprint(entities: Vec<Entity>, tiles: Vec<Tile>, wires: Vec<Wire>) -> Blueprint {
    Blueprint {
        label: Some("invariants".to_string()),
        version: (2u64 << 48) | (0u64 << 32),
        icons: vec![Icon {
            index: 1,
            signal: Signal {
                name: "transport-belt".to_string(),
                kind: None,
            },
        }],
        entities,
        tiles,
        wires,
        extra: serde_json::Map::new(),
    }
}

fn rich_document() -> Document {
    Document::Blueprint(blueprint(
        vec![
            entity(1, "small-electric-pole", 0.5, 0.5, Direction::North),
            entity(2, "small-electric-pole", 6.5, 0.5, Direction::North),
            entity(3, "transport-belt", 0.5, 2.5, Direction::East),
            entity(4, "transport-belt", 1.5, 2.5, Direction::East),
            entity(5, "assembling-machine-2", 4.5, 3.5, Direction::North),
        ],
        vec![
            Tile {
                name: "stone-path".to_string(),
                position: TilePosition { x: 0, y: 4 },
            },
            Tile {
                name: "concrete".to_string(),
                position: TilePosition { x: 1, y: 4 },
            },
        ],
        vec![Wire(1, 5, 2, 5), Wire(1, 1, 2, 1)],
    ))
}

#[test]
fn invariant_round_trip_is_semantically_equal() {
    let doc = rich_document();
    let decoded = codec::decode(&codec::encode(&doc).unwrap()).unwrap();
    assert_eq!(decoded, doc);

    // decode(encode(decode(s))) == decode(s)
    let text = codec::encode(&doc).unwrap();
    let once = codec::decode(&text).unwrap();
    let twice = codec::decode(&codec::encode(&once).unwrap()).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn invariant_round_trip_preserves_opaque_fields() {
    let mut doc = rich_document();
    if let Document::Blueprint(bp) = &mut doc {
        bp.extra.insert(
            "schedules".to_string(),
            serde_json::json!([{"locomotives": [1]}]),
        );
        bp.entities[0]
            .extra
            .insert("control_behavior".to_string(), serde_json::json!({"on": true}));
    }
    let decoded = codec::decode(&codec::encode(&doc).unwrap()).unwrap();
    assert_eq!(decoded, doc);
}

#[test]
fn invariant_rendering_is_deterministic() {
    let table = PrototypeTable::builtin();
    let renderer = Renderer::new(&table);
    let doc = rich_document();

    let a = renderer.render_document(&doc).unwrap();
    let b = renderer.render_document(&doc).unwrap();

    assert_eq!(a.digest, b.digest);
    assert_eq!(a.image.as_raw(), b.image.as_raw());
}

#[test]
fn invariant_bounds_contain_every_footprint() {
    let table = PrototypeTable::builtin();
    let renderer = Renderer::new(&table);
    let doc = rich_document();

    let result = renderer.render_document(&doc).unwrap();
    // The machine's 3x3 footprint reaches (6.0, 5.0); tiles reach y=5.
    assert!(result.bounds.min_x <= 0.0);
    assert!(result.bounds.min_y <= 0.0);
    assert!(result.bounds.max_x >= 6.0);
    assert!(result.bounds.max_y >= 5.0);
}

#[test]
fn invariant_rotation_swaps_non_square_footprint() {
    let table = PrototypeTable::builtin();
    let renderer = Renderer::new(&table);

    // decider-combinator is 1x2 facing north.
    let north = renderer
        .render_blueprint(&blueprint(
            vec![entity(1, "decider-combinator", 0.5, 0.0, Direction::North)],
            vec![],
            vec![],
        ))
        .unwrap();
    assert_eq!(north.bounds.width(), 1.0);
    assert_eq!(north.bounds.height(), 2.0);

    let east = renderer
        .render_blueprint(&blueprint(
            vec![entity(1, "decider-combinator", 0.0, 0.5, Direction::East)],
            vec![],
            vec![],
        ))
        .unwrap();
    assert_eq!(east.bounds.width(), 2.0);
    assert_eq!(east.bounds.height(), 1.0);

    // A half turn keeps the original extents.
    let south = renderer
        .render_blueprint(&blueprint(
            vec![entity(1, "decider-combinator", 0.5, 0.0, Direction::South)],
            vec![],
            vec![],
        ))
        .unwrap();
    assert_eq!(south.bounds.width(), 1.0);
    assert_eq!(south.bounds.height(), 2.0);
}

#[test]
fn invariant_unknown_prototype_renders_with_warning() {
    let table = PrototypeTable::builtin();
    let renderer = Renderer::new(&table);

    let result = renderer
        .render_blueprint(&blueprint(
            vec![entity(1, "modded-reactor-mk3", 0.5, 0.5, Direction::North)],
            vec![],
            vec![],
        ))
        .unwrap();

    assert!(result.has_warning(WarningKind::UnknownPrototype));
    let warning = result
        .warnings
        .iter()
        .find(|w| w.kind == WarningKind::UnknownPrototype)
        .unwrap();
    assert!(warning.message.contains("modded-reactor-mk3"));
}

#[test]
fn invariant_unsupported_version_is_rejected() {
    let text = codec::encode(&rich_document()).unwrap();
    let bumped = format!("3{}", &text[1..]);
    match codec::decode(&bumped) {
        Err(CodecError::UnsupportedVersion('3')) => {}
        other => panic!("expected UnsupportedVersion, got {other:?}"),
    }
}

#[test]
fn invariant_truncated_payload_never_decodes() {
    let text = codec::encode(&rich_document()).unwrap();
    for cut in [text.len() - 1, text.len() - 5, text.len() / 2] {
        match codec::decode(&text[..cut]) {
            Err(CodecError::CorruptPayload(_)) | Err(CodecError::MalformedEncoding(_)) => {}
            other => panic!("truncation at {cut} produced {other:?}"),
        }
    }
}

#[test]
fn invariant_wire_connections_route_completely() {
    let table = PrototypeTable::builtin();
    let renderer = Renderer::new(&table);

    let result = renderer
        .render_blueprint(&blueprint(
            vec![
                entity(1, "small-electric-pole", 0.5, 0.5, Direction::North),
                entity(2, "small-electric-pole", 7.5, 0.5, Direction::North),
                entity(3, "small-electric-pole", 7.5, 7.5, Direction::North),
            ],
            vec![],
            vec![Wire(1, 5, 2, 5), Wire(2, 5, 3, 5), Wire(1, 1, 3, 1)],
        ))
        .unwrap();

    // All endpoints exist: nothing dropped.
    assert!(!result.has_warning(WarningKind::DroppedConnection));
    assert_eq!(result.counts.wires, 3);
}

#[test]
fn invariant_scale_cap_preserves_aspect() {
    let table = PrototypeTable::builtin();
    let options = RenderOptions {
        max_dimension: 512,
        ..RenderOptions::default()
    };
    let renderer = Renderer::new(&table).with_options(options);

    // A 100x20 cell belt field wants 3200 px at natural scale.
    let mut entities = Vec::new();
    let mut id = 0;
    for y in 0..20 {
        for x in 0..100 {
            if (x + y) % 7 == 0 {
                id += 1;
                entities.push(entity(
                    id,
                    "transport-belt",
                    x as f64 + 0.5,
                    y as f64 + 0.5,
                    Direction::East,
                ));
            }
        }
    }
    let result = renderer
        .render_blueprint(&blueprint(entities, vec![], vec![]))
        .unwrap();

    assert!(result.has_warning(WarningKind::Scaled));
    assert!(result.image.width() <= 512);
    assert!(result.image.height() <= 512);

    let cells_ratio = result.bounds.width() / result.bounds.height();
    let px_ratio = result.image.width() as f64 / result.image.height() as f64;
    assert!((cells_ratio - px_ratio).abs() / cells_ratio < 0.05);
}

#[test]
fn invariant_single_entity_bounds_equal_footprint() {
    let table = PrototypeTable::builtin();
    let renderer = Renderer::new(&table);

    // stone-furnace is 2x2; centered at the origin its footprint is the
    // square from (-1,-1) to (1,1).
    let mut bp = blueprint(
        vec![entity(1, "stone-furnace", 0.0, 0.0, Direction::North)],
        vec![],
        vec![],
    );
    bp.icons.clear();
    bp.label = None;

    let result = renderer.render_blueprint(&bp).unwrap();
    assert!(result.warnings.is_empty());
    assert_eq!(result.bounds.min_x, -1.0);
    assert_eq!(result.bounds.min_y, -1.0);
    assert_eq!(result.bounds.max_x, 1.0);
    assert_eq!(result.bounds.max_y, 1.0);
    assert_eq!(result.image.width(), 64);
    assert_eq!(result.image.height(), 64);
}

#[test]
fn invariant_too_many_elements_fails_before_layout() {
    let table = PrototypeTable::builtin();
    let options = RenderOptions {
        max_elements: 10,
        ..RenderOptions::default()
    };
    let renderer = Renderer::new(&table).with_options(options);

    let entities: Vec<Entity> = (0..11)
        .map(|i| entity(i + 1, "pipe", i as f64 + 0.5, 0.5, Direction::North))
        .collect();
    let err = renderer
        .render_blueprint(&blueprint(entities, vec![], vec![]))
        .unwrap_err();
    assert!(matches!(
        err,
        RenderError::Layout(bprender_core::LayoutError::TooManyElements(10))
    ));
}

#[test]
fn invariant_book_round_trip_and_render() {
    use bprender_core::document::{Book, BookMember};

    let doc = Document::Book(Book {
        label: Some("library".to_string()),
        version: 0,
        members: vec![
            BookMember {
                index: 0,
                document: rich_document(),
            },
            BookMember {
                index: 1,
                document: Document::Blueprint(blueprint(
                    vec![entity(1, "pipe", 0.5, 0.5, Direction::North)],
                    vec![],
                    vec![],
                )),
            },
        ],
        active_index: 0,
    });

    let decoded = codec::decode(&codec::encode(&doc).unwrap()).unwrap();
    assert_eq!(decoded, doc);

    let table = PrototypeTable::builtin();
    let result = Renderer::new(&table).render_document(&decoded).unwrap();
    // The book's first blueprint is the rich one.
    assert_eq!(result.counts.entities, 5);
}

#[test]
fn invariant_rendered_png_is_writable() {
    let table = PrototypeTable::builtin();
    let renderer = Renderer::new(&table);
    let result = renderer.render_document(&rich_document()).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.png");
    result.image.save(&path).unwrap();
    assert!(path.metadata().unwrap().len() > 0);
}

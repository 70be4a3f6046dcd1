//! Compositor - Ordered Raster Drawing
//!
//! Draws the positioned scene onto one RGBA surface: ground and grid,
//! tiles, below-entity connection geometry, entities, above-entity wires,
//! then overlays. All order decisions were made by the layout engine;
//! this is a draw loop.

use std::collections::HashSet;

use image::RgbaImage;

use crate::connections::{RoutedConnection, MASK_EAST, MASK_NORTH, MASK_SOUTH, MASK_WEST};
use crate::document::{Blueprint, WireKind};
use crate::layout::{GridRect, Placement, PositionedScene};
use crate::pipeline::{RenderOptions, RenderWarning, WarningKind};
use crate::prototype::{Prototype, RenderLayer, Resolver, SpriteLayer, SpriteSource};

const GROUND_COLOR: [u8; 4] = [40, 40, 40, 255];
const GRID_COLOR: [u8; 4] = [60, 60, 60, 255];
const PLACEHOLDER_FILL: [u8; 4] = [88, 88, 96, 255];
const PLACEHOLDER_EDGE: [u8; 4] = [180, 180, 188, 255];
const LABEL_COLOR: [u8; 4] = [200, 200, 200, 255];
const ICON_CHIP_COLOR: [u8; 4] = [24, 24, 28, 230];

fn wire_color(kind: WireKind) -> [u8; 4] {
    match kind {
        WireKind::Red => [236, 70, 60, 255],
        WireKind::Green => [80, 216, 90, 255],
        WireKind::Copper => [222, 170, 96, 255],
    }
}

/// Grid-to-pixel transform for one render.
struct Canvas<'a> {
    image: &'a mut RgbaImage,
    origin: (f64, f64),
    scale: f64,
}

impl Canvas<'_> {
    fn to_px(&self, gx: f64, gy: f64) -> (f64, f64) {
        (
            (gx - self.origin.0) * self.scale,
            (gy - self.origin.1) * self.scale,
        )
    }

    fn blend(&mut self, x: i64, y: i64, color: [u8; 4]) {
        if x < 0 || y < 0 || x >= self.image.width() as i64 || y >= self.image.height() as i64 {
            return;
        }
        let dst = self.image.get_pixel_mut(x as u32, y as u32);
        let sa = color[3] as u32;
        if sa == 0 {
            return;
        }
        if sa == 255 {
            dst.0 = [color[0], color[1], color[2], 255];
            return;
        }
        let da = dst.0[3] as u32;
        let out_a = sa + da * (255 - sa) / 255;
        for i in 0..3 {
            let s = color[i] as u32;
            let d = dst.0[i] as u32;
            let num = s * sa + d * da * (255 - sa) / 255;
            dst.0[i] = if out_a > 0 { (num / out_a) as u8 } else { 0 };
        }
        dst.0[3] = out_a.min(255) as u8;
    }

    /// Fill a pixel-space rectangle given by fractional corners.
    fn fill_rect_px(&mut self, x0: f64, y0: f64, x1: f64, y1: f64, color: [u8; 4]) {
        let xs = x0.round() as i64;
        let ys = y0.round() as i64;
        let xe = x1.round() as i64;
        let ye = y1.round() as i64;
        for y in ys..ye {
            for x in xs..xe {
                self.blend(x, y, color);
            }
        }
    }

    fn fill_rect_grid(&mut self, rect: &GridRect, color: [u8; 4]) {
        let (x0, y0) = self.to_px(rect.min_x, rect.min_y);
        let (x1, y1) = self.to_px(rect.max_x, rect.max_y);
        self.fill_rect_px(x0, y0, x1, y1, color);
    }

    fn stroke_rect_grid(&mut self, rect: &GridRect, color: [u8; 4]) {
        let (x0, y0) = self.to_px(rect.min_x, rect.min_y);
        let (x1, y1) = self.to_px(rect.max_x, rect.max_y);
        self.fill_rect_px(x0, y0, x1, y0 + 1.0, color);
        self.fill_rect_px(x0, y1 - 1.0, x1, y1, color);
        self.fill_rect_px(x0, y0, x0 + 1.0, y1, color);
        self.fill_rect_px(x1 - 1.0, y0, x1, y1, color);
    }

    /// Stroke a pixel-space segment with a square brush. Steps at
    /// half-pixel pitch, so coverage is deterministic and gap free.
    fn line_px(&mut self, a: (f64, f64), b: (f64, f64), width: f64, color: [u8; 4]) {
        let dx = b.0 - a.0;
        let dy = b.1 - a.1;
        let len = (dx * dx + dy * dy).sqrt();
        let steps = (len * 2.0).ceil().max(1.0) as usize;
        let half = (width / 2.0).max(0.5);
        for i in 0..=steps {
            let t = i as f64 / steps as f64;
            let cx = a.0 + dx * t;
            let cy = a.1 + dy * t;
            let xs = (cx - half).round() as i64;
            let xe = (cx + half).round() as i64;
            let ys = (cy - half).round() as i64;
            let ye = (cy + half).round() as i64;
            for y in ys..ye.max(ys + 1) {
                for x in xs..xe.max(xs + 1) {
                    self.blend(x, y, color);
                }
            }
        }
    }

    fn polyline_grid(&mut self, points: &[(f64, f64)], width: f64, color: [u8; 4]) {
        for pair in points.windows(2) {
            let a = self.to_px(pair[0].0, pair[0].1);
            let b = self.to_px(pair[1].0, pair[1].1);
            self.line_px(a, b, width, color);
        }
    }

    /// Nearest-neighbor scale of a pixmap into a pixel-space rectangle.
    fn blit_pixmap_px(
        &mut self,
        pixmap: &crate::prototype::Pixmap,
        x0: f64,
        y0: f64,
        x1: f64,
        y1: f64,
    ) {
        let xs = x0.round() as i64;
        let ys = y0.round() as i64;
        let xe = (x1.round() as i64).max(xs + 1);
        let ye = (y1.round() as i64).max(ys + 1);
        let w = (xe - xs) as f64;
        let h = (ye - ys) as f64;
        for y in ys..ye {
            for x in xs..xe {
                let u = ((x - xs) as f64 / w * pixmap.width as f64) as u32;
                let v = ((y - ys) as f64 / h * pixmap.height as f64) as u32;
                self.blend(x, y, pixmap.pixel(u, v));
            }
        }
    }

    /// Draw text in the built-in 5x7 pixel font, top-left anchored.
    /// Returns the width drawn.
    fn text_px(&mut self, text: &str, x: f64, y: f64, px_per_dot: f64, color: [u8; 4]) -> f64 {
        let mut cursor = x;
        for ch in text.chars() {
            let glyph = glyph_rows(ch);
            for (row, bits) in glyph.iter().enumerate() {
                for col in 0..5u32 {
                    if bits & (0x10 >> col) != 0 {
                        let gx = cursor + col as f64 * px_per_dot;
                        let gy = y + row as f64 * px_per_dot;
                        self.fill_rect_px(gx, gy, gx + px_per_dot, gy + px_per_dot, color);
                    }
                }
            }
            cursor += 6.0 * px_per_dot;
        }
        cursor - x
    }
}

/// Composite the scene into a raster surface. Never fails; everything
/// that cannot draw becomes a warning.
pub fn composite(
    scene: &PositionedScene,
    connections: &[RoutedConnection],
    resolver: &Resolver<'_>,
    blueprint: &Blueprint,
    options: &RenderOptions,
) -> (RgbaImage, Vec<RenderWarning>) {
    let mut image = RgbaImage::new(scene.width_px, scene.height_px);
    let mut warnings = Vec::new();
    let mut unknown_seen: HashSet<String> = HashSet::new();

    let mut canvas = Canvas {
        image: &mut image,
        origin: (scene.bounds.min_x, scene.bounds.min_y),
        scale: scene.scale,
    };

    // Ground.
    let (w, h) = (scene.width_px as f64, scene.height_px as f64);
    canvas.fill_rect_px(0.0, 0.0, w, h, GROUND_COLOR);

    // Grid lines at cell pitch. Skipped below 4 px/cell where they would
    // drown the content.
    if options.draw_grid && scene.scale >= 4.0 {
        let mut gx = scene.bounds.min_x.ceil();
        while gx <= scene.bounds.max_x {
            let (px, _) = canvas.to_px(gx, 0.0);
            canvas.fill_rect_px(px, 0.0, px + 1.0, h, GRID_COLOR);
            gx += 1.0;
        }
        let mut gy = scene.bounds.min_y.ceil();
        while gy <= scene.bounds.max_y {
            let (_, py) = canvas.to_px(0.0, gy);
            canvas.fill_rect_px(0.0, py, w, py + 1.0, GRID_COLOR);
            gy += 1.0;
        }
    }

    // Tiles, already in row-major order.
    for tile in &scene.tiles {
        let cell = GridRect::new(
            tile.x as f64,
            tile.y as f64,
            tile.x as f64 + 1.0,
            tile.y as f64 + 1.0,
        );
        match resolver.lookup(&tile.name).known() {
            Some(proto) => {
                for layer in &proto.layers {
                    draw_sprite_layer(&mut canvas, layer, &cell);
                }
            }
            None => {
                canvas.fill_rect_grid(&cell, PLACEHOLDER_FILL);
                note_unknown(&mut warnings, &mut unknown_seen, &tile.name, "tile");
            }
        }
    }

    // Connection geometry beneath entities (pipe-layer polylines).
    draw_polylines(&mut canvas, connections, scene.scale, RenderLayer::Below);

    // Entities in precomputed draw order.
    for placement in &scene.placements {
        match resolver.lookup(&placement.name).known() {
            Some(proto) => {
                draw_entity(&mut canvas, placement, proto, connections);
            }
            None => {
                draw_placeholder(&mut canvas, placement);
                note_unknown(&mut warnings, &mut unknown_seen, &placement.name, "entity");
            }
        }
    }

    // Wires above entities.
    draw_polylines(&mut canvas, connections, scene.scale, RenderLayer::Above);

    // Overlays at fixed corner positions.
    if options.show_overlays {
        draw_overlays(&mut canvas, blueprint, scene);
    }

    (image, warnings)
}

fn note_unknown(
    warnings: &mut Vec<RenderWarning>,
    seen: &mut HashSet<String>,
    name: &str,
    what: &str,
) {
    if seen.insert(name.to_string()) {
        log::debug!("unknown {what} prototype: {name}");
        warnings.push(RenderWarning::new(
            WarningKind::UnknownPrototype,
            format!("unknown {what} prototype \"{name}\", drawn as placeholder"),
        ));
    }
}

fn draw_polylines(
    canvas: &mut Canvas<'_>,
    connections: &[RoutedConnection],
    scale: f64,
    pass: RenderLayer,
) {
    let width = (scale * 0.08).max(1.0);
    for connection in connections {
        if let RoutedConnection::Polyline {
            kind,
            layer,
            points,
        } = connection
        {
            if *layer == pass {
                canvas.polyline_grid(points, width, wire_color(*kind));
            }
        }
    }
}

fn draw_entity(
    canvas: &mut Canvas<'_>,
    placement: &Placement,
    proto: &Prototype,
    connections: &[RoutedConnection],
) {
    for layer in &proto.layers {
        let rect = sprite_rect(placement, layer);
        draw_sprite_layer(canvas, layer, &rect);
    }

    // Stitch arms toward connected neighbors, tinted like the base layer.
    let mask = connections.iter().find_map(|c| match c {
        RoutedConnection::Stitch {
            entity_number,
            mask,
        } if *entity_number == placement.entity_number => Some(*mask),
        _ => None,
    });
    if let Some(mask) = mask {
        let color = base_color(proto);
        let cx = placement.position.x;
        let cy = placement.position.y;
        let arm = 0.18;
        for (bit, (dx, dy)) in [
            (MASK_NORTH, (0.0f64, -0.5f64)),
            (MASK_EAST, (0.5, 0.0)),
            (MASK_SOUTH, (0.0, 0.5)),
            (MASK_WEST, (-0.5, 0.0)),
        ] {
            if mask & bit != 0 {
                let rect = GridRect::new(
                    cx.min(cx + dx) - arm * dy.abs(),
                    cy.min(cy + dy) - arm * dx.abs(),
                    cx.max(cx + dx) + arm * dy.abs(),
                    cy.max(cy + dy) + arm * dx.abs(),
                );
                canvas.fill_rect_grid(&rect, brighten(color, 24));
            }
        }
    }
}

/// Sprite rectangle for a layer on a placed entity. Directional layers
/// rotate their center displacement with the entity and swap extents for
/// east/west.
fn sprite_rect(placement: &Placement, layer: &SpriteLayer) -> GridRect {
    let fp = placement.footprint;
    if !layer.directional {
        let min_x = fp.min_x + layer.grid_offset.0;
        let min_y = fp.min_y + layer.grid_offset.1;
        return GridRect::new(
            min_x,
            min_y,
            min_x + layer.grid_size.0,
            min_y + layer.grid_size.1,
        );
    }

    let (sw, sh) = match placement.direction {
        crate::document::Direction::East | crate::document::Direction::West => {
            (layer.grid_size.1, layer.grid_size.0)
        }
        _ => layer.grid_size,
    };
    // Center displacement in the prototype's north frame, rotated into
    // the entity frame. The placed footprint is already rotated; undo
    // the swap to recover the north-facing extents.
    let (north_w, north_h) = match placement.direction {
        crate::document::Direction::East | crate::document::Direction::West => {
            (fp.height(), fp.width())
        }
        _ => (fp.width(), fp.height()),
    };
    let center_dx = layer.grid_offset.0 + layer.grid_size.0 / 2.0 - north_w / 2.0;
    let center_dy = layer.grid_offset.1 + layer.grid_size.1 / 2.0 - north_h / 2.0;
    let (rdx, rdy) = placement.direction.rotate_offset((center_dx, center_dy));
    let cx = placement.position.x + rdx;
    let cy = placement.position.y + rdy;
    GridRect::new(cx - sw / 2.0, cy - sh / 2.0, cx + sw / 2.0, cy + sh / 2.0)
}

fn draw_sprite_layer(canvas: &mut Canvas<'_>, layer: &SpriteLayer, rect: &GridRect) {
    match &layer.source {
        SpriteSource::Solid(color) => canvas.fill_rect_grid(rect, *color),
        SpriteSource::Pixmap(pixmap) => {
            let (x0, y0) = canvas.to_px(rect.min_x, rect.min_y);
            let (x1, y1) = canvas.to_px(rect.max_x, rect.max_y);
            canvas.blit_pixmap_px(pixmap, x0, y0, x1, y1);
        }
    }
}

fn base_color(proto: &Prototype) -> [u8; 4] {
    proto
        .layers
        .iter()
        .find_map(|l| match l.source {
            SpriteSource::Solid(c) => Some(c),
            SpriteSource::Pixmap(_) => None,
        })
        .unwrap_or(PLACEHOLDER_FILL)
}

fn brighten(color: [u8; 4], amount: u8) -> [u8; 4] {
    [
        color[0].saturating_add(amount),
        color[1].saturating_add(amount),
        color[2].saturating_add(amount),
        color[3],
    ]
}

fn draw_placeholder(canvas: &mut Canvas<'_>, placement: &Placement) {
    canvas.fill_rect_grid(&placement.footprint, PLACEHOLDER_FILL);
    canvas.stroke_rect_grid(&placement.footprint, PLACEHOLDER_EDGE);

    // Raw prototype name inside the box, clipped to its width.
    let (x0, y0) = canvas.to_px(placement.footprint.min_x, placement.footprint.min_y);
    let (x1, _) = canvas.to_px(placement.footprint.max_x, placement.footprint.max_y);
    let budget = ((x1 - x0 - 4.0) / 6.0).max(0.0) as usize;
    if budget > 0 {
        let clipped: String = placement.name.chars().take(budget).collect();
        canvas.text_px(&clipped, x0 + 2.0, y0 + 2.0, 1.0, PLACEHOLDER_EDGE);
    }
}

fn draw_overlays(canvas: &mut Canvas<'_>, blueprint: &Blueprint, scene: &PositionedScene) {
    // Icon chips along the top-left corner.
    let chip = (scene.scale * 0.55).clamp(9.0, 24.0);
    let mut x = 3.0;
    for icon in blueprint.icons.iter().take(4) {
        canvas.fill_rect_px(x, 3.0, x + chip, 3.0 + chip, ICON_CHIP_COLOR);
        let initial: String = icon.signal.name.chars().take(1).collect();
        canvas.text_px(&initial, x + 2.0, 4.0, (chip - 4.0) / 7.0, LABEL_COLOR);
        x += chip + 2.0;
    }

    // Label strip at the bottom-left.
    if let Some(label) = blueprint.label.as_deref() {
        let y = scene.height_px as f64 - 10.0;
        let budget = ((scene.width_px as f64 - 6.0) / 6.0).max(0.0) as usize;
        let clipped: String = label.chars().take(budget).collect();
        canvas.text_px(&clipped, 3.0, y, 1.0, LABEL_COLOR);
    }
}

/// 5x7 glyph bitmaps, MSB on the left of each row. Lowercase maps onto
/// the uppercase shapes; anything unmapped draws a hollow box.
fn glyph_rows(ch: char) -> [u8; 7] {
    match ch.to_ascii_uppercase() {
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x19, 0x15, 0x13, 0x11, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x0A, 0x04, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '-' => [0x00, 0x00, 0x00, 0x0E, 0x00, 0x00, 0x00],
        ' ' => [0x00; 7],
        _ => [0x1F, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1F],
    }
}

//! Blueprint Render Core - Decode-and-Render Pipeline
//!
//! Turns a versioned, compressed blueprint exchange string into a raster
//! image. Data flows one way through the stages:
//!
//! raw string -> codec -> document -> prototype resolution -> layout
//! -> connection routing -> compositor -> pixels
//!
//! Bad input fails fast at the codec/layout boundary with a typed error;
//! a schema-valid document always renders, with problems downgraded to
//! warnings on the result.

pub mod codec;
pub mod compositor;
pub mod connections;
pub mod document;
pub mod hashing;
pub mod layout;
pub mod pipeline;
pub mod prototype;

pub use codec::{decode, encode, CodecError};
pub use connections::{AdjacencyRules, RoutedConnection};
pub use document::{Blueprint, Document, Direction, WireKind};
pub use layout::{GridRect, LayoutError, PositionedScene};
pub use pipeline::{
    RenderError, RenderOptions, RenderResult, RenderWarning, Renderer, WarningKind,
};
pub use prototype::{Prototype, PrototypeTable, Resolved, Resolver};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

// Layered auto-layout for node graphs with pins and nested groups.
// Pipeline: cycle breaking, longest-path layering, routing nodes, barycenter
// crossing reduction, Brandes-Köpf coordinate assignment.

#![deny(clippy::all)]

// Internal modules (implementation details)
mod acyclic;
mod coordinate_system;
mod normalize;
mod order;
mod placement;
mod position;
mod rank;
mod utils;

// Public modules (user-facing API)
pub mod builder;
pub mod error;
pub mod graph;
pub mod layout;
pub mod types;

#[cfg(feature = "wasm")]
mod wasm;

// N-API bindings (exposed to Node.js)
#[cfg(feature = "napi")]
pub mod napi_interface;

// ===== Essential Public API =====
/// Main layout functions
pub use layout::{layout, layout_json, layout_snapshot};

/// Input/output types
pub use types::{
    GraphSnapshot, LayoutConfig, LayoutResult, Link, NodeSnapshot, PinDirection, PinSnapshot,
    Rect, Vector2,
};

/// Configuration enums
pub use types::{LayoutDirection, PositioningPolicy};

pub use error::LayoutError;

// ===== Advanced Public API (for direct graph manipulation) =====
pub use builder::{GraphBuilder, Measure, SnapshotMeasure};
pub use graph::{Edge, EdgeKey, Graph, Node, NodeId, NodeKind, Pin, PinId};
pub use order::crossings;
pub use position::{combine_values, CombinePolicy};

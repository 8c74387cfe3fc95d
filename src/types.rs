use crate::error::LayoutError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Sub};

pub const DEFAULT_HORIZONTAL_SPACING: f64 = 100.0;
pub const DEFAULT_VERTICAL_SPACING: f64 = 80.0;
pub const DEFAULT_GROUP_BORDER: f64 = 40.0;
pub const DEFAULT_MAX_ORDERING_ITERATIONS: usize = 10;

// 2D vector used for positions, sizes and pin offsets
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector2 {
    pub x: f64,
    pub y: f64,
}

impl Vector2 {
    pub const ZERO: Vector2 = Vector2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Vector2 { x, y }
    }

    #[inline]
    pub fn transposed(self) -> Self {
        Vector2 {
            x: self.y,
            y: self.x,
        }
    }
}

impl Add for Vector2 {
    type Output = Vector2;

    fn add(self, rhs: Vector2) -> Vector2 {
        Vector2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vector2 {
    fn add_assign(&mut self, rhs: Vector2) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vector2 {
    type Output = Vector2;

    fn sub(self, rhs: Vector2) -> Vector2 {
        Vector2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

// Axis-aligned rectangle, origin at the top-left corner
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_origin_size(origin: Vector2, size: Vector2) -> Self {
        Rect::new(origin.x, origin.y, size.x, size.y)
    }

    pub fn origin(&self) -> Vector2 {
        Vector2::new(self.x, self.y)
    }

    pub fn size(&self) -> Vector2 {
        Vector2::new(self.width, self.height)
    }

    pub fn left(&self) -> f64 {
        self.x
    }

    pub fn top(&self) -> f64 {
        self.y
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn union(&self, other: &Rect) -> Rect {
        let left = self.left().min(other.left());
        let top = self.top().min(other.top());
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect::new(left, top, right - left, bottom - top)
    }

    pub fn offset(&self, delta: Vector2) -> Rect {
        Rect::new(self.x + delta.x, self.y + delta.y, self.width, self.height)
    }

    pub fn transposed(&self) -> Rect {
        Rect::new(self.y, self.x, self.height, self.width)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PinDirection {
    #[serde(rename = "in")]
    In,
    #[serde(rename = "out")]
    Out,
}

impl PinDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            PinDirection::In => "in",
            PinDirection::Out => "out",
        }
    }
}

// ===== Snapshot (input) =====

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinSnapshot {
    pub id: String,
    pub direction: PinDirection,
    #[serde(default)]
    pub offset: Vector2,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: String,
    #[serde(default)]
    pub position: Vector2,
    #[serde(default)]
    pub size: Vector2,
    #[serde(default)]
    pub pins: Vec<PinSnapshot>,
    // Set for group nodes: externally resolved ids of the nodes the group contains
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<String>>,
}

impl NodeSnapshot {
    pub fn new(id: &str, position: Vector2, size: Vector2) -> Self {
        NodeSnapshot {
            id: id.to_string(),
            position,
            size,
            pins: Vec::new(),
            members: None,
        }
    }

    pub fn with_pin(mut self, id: &str, direction: PinDirection, offset: Vector2) -> Self {
        self.pins.push(PinSnapshot {
            id: id.to_string(),
            direction,
            offset,
        });
        self
    }

    pub fn with_members(mut self, members: &[&str]) -> Self {
        self.members = Some(members.iter().map(|m| m.to_string()).collect());
        self
    }
}

// Connection between two pins; the builder orients it from the out pin to the in pin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub from: String,
    pub to: String,
}

impl Link {
    pub fn new(from: &str, to: &str) -> Self {
        Link {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    #[serde(default)]
    pub nodes: Vec<NodeSnapshot>,
    #[serde(default)]
    pub links: Vec<Link>,
}

// ===== Configuration =====

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositioningPolicy {
    #[serde(rename = "evenly")]
    EvenlySpaced,
    #[serde(rename = "priority")]
    Priority,
    #[default]
    #[serde(rename = "top")]
    BrandesKopfTop,
    #[serde(rename = "median")]
    BrandesKopfMedian,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayoutDirection {
    #[default]
    #[serde(rename = "horizontal")]
    Horizontal, // Layers advance along x
    #[serde(rename = "vertical")]
    Vertical, // Layers advance along y
}

// Configuration options for the layout algorithm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub horizontal_spacing: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vertical_spacing: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_border: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_ordering_iterations: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub positioning: Option<PositioningPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<LayoutDirection>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        LayoutConfig {
            horizontal_spacing: Some(DEFAULT_HORIZONTAL_SPACING),
            vertical_spacing: Some(DEFAULT_VERTICAL_SPACING),
            group_border: Some(DEFAULT_GROUP_BORDER),
            max_ordering_iterations: Some(DEFAULT_MAX_ORDERING_ITERATIONS),
            positioning: Some(PositioningPolicy::default()),
            direction: Some(LayoutDirection::default()),
        }
    }
}

impl LayoutConfig {
    pub fn from_json(json: &str) -> Result<Self, LayoutError> {
        let config: LayoutConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn horizontal_spacing(&self) -> f64 {
        self.horizontal_spacing.unwrap_or(DEFAULT_HORIZONTAL_SPACING)
    }

    pub fn vertical_spacing(&self) -> f64 {
        self.vertical_spacing.unwrap_or(DEFAULT_VERTICAL_SPACING)
    }

    pub fn group_border(&self) -> f64 {
        self.group_border.unwrap_or(DEFAULT_GROUP_BORDER)
    }

    pub fn max_ordering_iterations(&self) -> usize {
        self.max_ordering_iterations
            .unwrap_or(DEFAULT_MAX_ORDERING_ITERATIONS)
    }

    pub fn positioning(&self) -> PositioningPolicy {
        self.positioning.unwrap_or_default()
    }

    pub fn direction(&self) -> LayoutDirection {
        self.direction.unwrap_or_default()
    }

    pub fn validate(&self) -> Result<(), LayoutError> {
        let checks = [
            ("horizontal_spacing", self.horizontal_spacing),
            ("vertical_spacing", self.vertical_spacing),
            ("group_border", self.group_border),
        ];
        for (name, value) in checks {
            if let Some(value) = value {
                if !value.is_finite() || value < 0.0 {
                    return Err(LayoutError::InvalidConfig(format!(
                        "{name} must be a finite, non-negative number (got {value})"
                    )));
                }
            }
        }
        Ok(())
    }
}

// Resolved configuration expressed in the layering frame, where layers advance
// along x and nodes of a layer are stacked along y
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct FrameSettings {
    pub(crate) direction: LayoutDirection,
    pub(crate) layer_spacing: f64,
    pub(crate) node_spacing: f64,
    pub(crate) group_border: f64,
    pub(crate) max_ordering_iterations: usize,
    pub(crate) positioning: PositioningPolicy,
}

impl FrameSettings {
    pub(crate) fn from_config(config: &LayoutConfig) -> Self {
        let direction = config.direction();
        let (layer_spacing, node_spacing) = match direction {
            LayoutDirection::Horizontal => (config.horizontal_spacing(), config.vertical_spacing()),
            LayoutDirection::Vertical => (config.vertical_spacing(), config.horizontal_spacing()),
        };
        FrameSettings {
            direction,
            layer_spacing,
            node_spacing,
            group_border: config.group_border(),
            max_ordering_iterations: config.max_ordering_iterations(),
            positioning: config.positioning(),
        }
    }
}

// ===== Result (output) =====

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutResult {
    // Final rectangle per snapshot node, in snapshot order
    pub rects: IndexMap<String, Rect>,
    pub bound: Rect,
}

impl LayoutResult {
    pub fn rect(&self, id: &str) -> Option<&Rect> {
        self.rects.get(id)
    }
}

// JSON request accepted by `layout_json` and the bindings
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct LayoutRequest {
    #[serde(default)]
    pub(crate) nodes: Vec<NodeSnapshot>,
    #[serde(default)]
    pub(crate) links: Vec<Link>,
    #[serde(default)]
    pub(crate) layout: LayoutConfig,
}

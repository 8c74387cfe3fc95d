use crate::types::{LayoutDirection, Rect, Vector2};

// The pipeline always works in a frame where layers advance along x and the
// nodes of one layer are stacked along y. Vertical layouts swap the axes on
// the way in and swap them back on the way out.

#[inline]
pub fn to_frame(v: Vector2, direction: LayoutDirection) -> Vector2 {
    match direction {
        LayoutDirection::Horizontal => v,
        LayoutDirection::Vertical => v.transposed(),
    }
}

pub fn rect_from_frame(rect: Rect, direction: LayoutDirection) -> Rect {
    match direction {
        LayoutDirection::Horizontal => rect,
        LayoutDirection::Vertical => rect.transposed(),
    }
}

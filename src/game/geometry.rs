//! Geometry and collision helpers shared by every simulation system

use std::f32::consts::{PI, TAU};

use serde::{Deserialize, Serialize};

/// Axis-aligned box in world units (top-left origin)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    pub fn contains_point(&self, px: f32, py: f32) -> bool {
        px >= self.x && px <= self.x + self.w && py >= self.y && py <= self.y + self.h
    }

    /// Box test against a circle, done by inflating the box by the radius.
    /// Corners are treated as square, which keeps wall sliding predictable.
    pub fn overlaps_inflated(&self, cx: f32, cy: f32, radius: f32) -> bool {
        cx > self.x - radius
            && cx < self.x + self.w + radius
            && cy > self.y - radius
            && cy < self.y + self.h + radius
    }

    /// Exact circle/box intersection (used for blast radii)
    pub fn intersects_circle(&self, cx: f32, cy: f32, radius: f32) -> bool {
        let nearest_x = cx.clamp(self.x, self.x + self.w);
        let nearest_y = cy.clamp(self.y, self.y + self.h);
        distance_sq(cx, cy, nearest_x, nearest_y) <= radius * radius
    }
}

pub fn distance_sq(ax: f32, ay: f32, bx: f32, by: f32) -> f32 {
    let dx = bx - ax;
    let dy = by - ay;
    dx * dx + dy * dy
}

pub fn distance(ax: f32, ay: f32, bx: f32, by: f32) -> f32 {
    distance_sq(ax, ay, bx, by).sqrt()
}

/// Normalize a vector; zero stays zero
pub fn normalize(x: f32, y: f32) -> (f32, f32) {
    let len = (x * x + y * y).sqrt();
    if len < 1e-6 {
        (0.0, 0.0)
    } else {
        (x / len, y / len)
    }
}

/// Clamp a vector's magnitude to at most 1
pub fn clamp_unit(x: f32, y: f32) -> (f32, f32) {
    if !x.is_finite() || !y.is_finite() {
        return (0.0, 0.0);
    }
    let len_sq = x * x + y * y;
    if len_sq > 1.0 {
        let len = len_sq.sqrt();
        (x / len, y / len)
    } else {
        (x, y)
    }
}

/// Wrap an angle into [-PI, PI]
pub fn wrap_angle(angle: f32) -> f32 {
    (angle + PI).rem_euclid(TAU) - PI
}

/// Signed shortest difference `to - from`, in [-PI, PI]
pub fn angle_diff(from: f32, to: f32) -> f32 {
    wrap_angle(to - from)
}

pub fn angle_to(ax: f32, ay: f32, bx: f32, by: f32) -> f32 {
    (by - ay).atan2(bx - ax)
}

pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Interpolate between two angles along the shortest arc
pub fn lerp_angle(from: f32, to: f32, t: f32) -> f32 {
    wrap_angle(from + angle_diff(from, to) * t)
}

/// Walk the segment in fixed steps and report whether any box blocks it
pub fn segment_blocked<'a, I>(ax: f32, ay: f32, bx: f32, by: f32, step: f32, boxes: I) -> bool
where
    I: IntoIterator<Item = &'a Rect> + Clone,
{
    let length = distance(ax, ay, bx, by);
    if length < 1e-3 {
        return false;
    }
    let steps = (length / step).ceil() as usize;
    for i in 1..steps {
        let t = i as f32 / steps as f32;
        let px = lerp(ax, bx, t);
        let py = lerp(ay, by, t);
        if boxes.clone().into_iter().any(|r| r.contains_point(px, py)) {
            return true;
        }
    }
    false
}

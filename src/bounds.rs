//! Axis-aligned bounds tests used by the overlay visibility filters.

/// World-space box, inclusive on every edge.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn new(min_x: f64, max_x: f64, min_y: f64, max_y: f64) -> Self {
        Self { min_x, max_x, min_y, max_y }
    }
}

impl From<TileBounds> for Bounds {
    fn from(b: TileBounds) -> Self {
        Self::new(b.min_x as f64, b.max_x as f64, b.min_y as f64, b.max_y as f64)
    }
}

/// Integer tile box, inclusive on every edge.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct TileBounds {
    pub min_x: i32,
    pub max_x: i32,
    pub min_y: i32,
    pub max_y: i32,
}

impl TileBounds {
    pub fn new(min_x: i32, max_x: i32, min_y: i32, max_y: i32) -> Self {
        Self { min_x, max_x, min_y, max_y }
    }

    /// Snaps world-space viewport edges outward to whole tiles.
    pub fn from_world(west: f64, east: f64, south: f64, north: f64) -> Self {
        Self::new(west.floor() as i32, east.ceil() as i32, south.floor() as i32, north.ceil() as i32)
    }

    /// Box spanning two points, grown by `margin` tiles on every side.
    pub fn around(a: (i32, i32), b: (i32, i32), margin: i32) -> Self {
        Self::new(
            a.0.min(b.0).saturating_sub(margin),
            a.0.max(b.0).saturating_add(margin),
            a.1.min(b.1).saturating_sub(margin),
            a.1.max(b.1).saturating_add(margin),
        )
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x as f64 + self.max_x as f64) / 2.0,
            (self.min_y as f64 + self.max_y as f64) / 2.0,
        )
    }

    /// Overlap of two boxes, `None` when they are disjoint or either is inverted.
    pub fn intersect(&self, other: &TileBounds) -> Option<TileBounds> {
        let b = TileBounds::new(
            self.min_x.max(other.min_x),
            self.max_x.min(other.max_x),
            self.min_y.max(other.min_y),
            self.max_y.min(other.max_y),
        );
        (b.min_x <= b.max_x && b.min_y <= b.max_y).then_some(b)
    }

    /// Grows the box to include the tile.
    pub fn include(&mut self, x: i32, y: i32) {
        self.min_x = self.min_x.min(x);
        self.max_x = self.max_x.max(x);
        self.min_y = self.min_y.min(y);
        self.max_y = self.max_y.max(y);
    }
}

/// Destination area of a transport, inclusive.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Rect {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl Rect {
    pub fn new(min_x: f64, max_x: f64, min_y: f64, max_y: f64) -> Self {
        Self { min_x, max_x, min_y, max_y }
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.min_x + self.max_x) / 2.0, (self.min_y + self.max_y) / 2.0)
    }
}

pub fn point_in_bounds(x: f64, y: f64, bounds: &Bounds) -> bool {
    x >= bounds.min_x && x <= bounds.max_x && y >= bounds.min_y && y <= bounds.max_y
}

/// Liang-Barsky clip of the segment against the box. True when some part of
/// the segment with parameter in [0, 1] lies inside.
pub fn segment_intersects_bounds(x1: f64, y1: f64, x2: f64, y2: f64, bounds: &Bounds) -> bool {
    let dx = x2 - x1;
    let dy = y2 - y1;
    let clips = [
        (-dx, x1 - bounds.min_x),
        (dx, bounds.max_x - x1),
        (-dy, y1 - bounds.min_y),
        (dy, bounds.max_y - y1),
    ];

    let mut t0 = 0.0f64;
    let mut t1 = 1.0f64;
    for (p, q) in clips {
        if p == 0.0 {
            // parallel to this edge
            if q < 0.0 {
                return false;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return false;
            }
            if r > t0 {
                t0 = r;
            }
        } else {
            if r < t0 {
                return false;
            }
            if r < t1 {
                t1 = r;
            }
        }
    }
    t0 <= t1
}

pub fn rect_intersects_bounds(rect: &Rect, bounds: &Bounds) -> bool {
    !(rect.max_x < bounds.min_x
        || rect.min_x > bounds.max_x
        || rect.max_y < bounds.min_y
        || rect.min_y > bounds.max_y)
}

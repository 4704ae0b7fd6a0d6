//! Integer pixel geometry used to place warped images in composite space.

/// Top-left placement of a warped image in composite coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> i64 {
        self.width as i64 * self.height as i64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_corner_size(tl: Point, size: Size) -> Self {
        Self::new(tl.x, tl.y, size.width, size.height)
    }

    pub fn tl(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn br(&self) -> Point {
        Point::new(self.x + self.width, self.y + self.height)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn area(&self) -> i64 {
        self.size().area()
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x < self.x + self.width && p.y >= self.y && p.y < self.y + self.height
    }

    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let bx = (self.x + self.width).max(other.x + other.width);
        let by = (self.y + self.height).max(other.y + other.height);
        Rect::new(x, y, bx - x, by - y)
    }

    pub fn intersect(&self, other: &Rect) -> Rect {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let bx = (self.x + self.width).min(other.x + other.width);
        let by = (self.y + self.height).min(other.y + other.height);
        if bx <= x || by <= y {
            return Rect::default();
        }
        Rect::new(x, y, bx - x, by - y)
    }
}

/// Bounding rectangle of a set of placed images: the final composite extent.
///
/// `corners` and `sizes` must have equal length.
pub fn result_roi(corners: &[Point], sizes: &[Size]) -> Rect {
    debug_assert_eq!(corners.len(), sizes.len());
    let mut roi = Rect::default();
    for (corner, size) in corners.iter().zip(sizes.iter()) {
        roi = roi.union(&Rect::from_corner_size(*corner, *size));
    }
    roi
}

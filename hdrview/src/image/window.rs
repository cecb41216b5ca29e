//! Integer vectors and axis-aligned windows.

use std::fmt;

/// A 2D integer vector, used for sizes and pixel positions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Vector2i {
    pub x: i32,
    pub y: i32,
}

impl Vector2i {
    pub const ZERO: Vector2i = Vector2i { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Number of elements in a `x` by `y` grid; zero for negative extents.
    pub fn area(&self) -> usize {
        self.x.max(0) as usize * self.y.max(0) as usize
    }
}

impl fmt::Display for Vector2i {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// An axis-aligned integer rectangle with exclusive upper bound.
///
/// The default box is the degenerate `(0,0)-(0,0)` window, which decoders
/// leave in place to mean "unset".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Box2i {
    pub min: Vector2i,
    pub max: Vector2i,
}

impl Box2i {
    pub const fn new(min: Vector2i, max: Vector2i) -> Self {
        Self { min, max }
    }

    /// A window at the origin covering `size`.
    pub const fn from_size(size: Vector2i) -> Self {
        Self {
            min: Vector2i::ZERO,
            max: size,
        }
    }

    /// True if the window has a positive extent on both axes.
    pub fn is_valid(&self) -> bool {
        self.max.x > self.min.x && self.max.y > self.min.y
    }

    pub fn size(&self) -> Vector2i {
        Vector2i::new(self.max.x - self.min.x, self.max.y - self.min.y)
    }
}

impl fmt::Display for Box2i {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.min, self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_window_is_unset() {
        let window = Box2i::default();
        assert!(!window.is_valid());
        assert_eq!(window.size(), Vector2i::ZERO);
    }

    #[test]
    fn test_validity_requires_both_axes() {
        assert!(Box2i::from_size(Vector2i::new(4, 4)).is_valid());
        assert!(!Box2i::from_size(Vector2i::new(4, 0)).is_valid());
        assert!(!Box2i::new(Vector2i::new(3, 0), Vector2i::new(1, 5)).is_valid());
    }

    #[test]
    fn test_offset_window_size() {
        let window = Box2i::new(Vector2i::new(-2, 1), Vector2i::new(6, 4));
        assert_eq!(window.size(), Vector2i::new(8, 3));
        assert_eq!(window.to_string(), "(-2, 1)(6, 4)");
    }

    #[test]
    fn test_area_clamps_negative() {
        assert_eq!(Vector2i::new(3, 5).area(), 15);
        assert_eq!(Vector2i::new(-3, 5).area(), 0);
    }
}

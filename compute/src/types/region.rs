//! Extents, offsets and copy regions.

/// Size of a resource or copy region, in elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent3d {
    /// Width (element count for buffers).
    pub width: u32,
    /// Height.
    pub height: u32,
    /// Depth.
    pub depth: u32,
}

impl Extent3d {
    /// Create a new extent.
    pub const fn new(width: u32, height: u32, depth: u32) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }

    /// Create a one-dimensional extent.
    pub const fn new_1d(width: u32) -> Self {
        Self::new(width, 1, 1)
    }

    /// Create a two-dimensional extent.
    pub const fn new_2d(width: u32, height: u32) -> Self {
        Self::new(width, height, 1)
    }

    /// Total number of elements.
    pub fn volume(&self) -> u64 {
        self.width as u64 * self.height as u64 * self.depth as u64
    }
}

/// Position of a copy region inside a resource, in elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Offset3d {
    /// X offset.
    pub x: u32,
    /// Y offset.
    pub y: u32,
    /// Z offset.
    pub z: u32,
}

impl Offset3d {
    /// The origin.
    pub const ZERO: Self = Self { x: 0, y: 0, z: 0 };

    /// Create a new offset.
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }
}

/// A box inside a resource: an offset plus an extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region {
    /// Start of the region.
    pub offset: Offset3d,
    /// Size of the region.
    pub extent: Extent3d,
}

impl Region {
    /// Create a region from an offset and an extent.
    pub const fn new(offset: Offset3d, extent: Extent3d) -> Self {
        Self { offset, extent }
    }

    /// Region covering `width` elements starting at `x`.
    pub const fn x(x: u32, width: u32) -> Self {
        Self::new(Offset3d::new(x, 0, 0), Extent3d::new_1d(width))
    }

    /// Region covering a `width` x `height` rectangle at `(x, y)`.
    pub const fn xy(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self::new(Offset3d::new(x, y, 0), Extent3d::new_2d(width, height))
    }

    /// Region covering a box at `(x, y, z)`.
    pub const fn xyz(x: u32, y: u32, z: u32, width: u32, height: u32, depth: u32) -> Self {
        Self::new(
            Offset3d::new(x, y, z),
            Extent3d::new(width, height, depth),
        )
    }

    /// Region covering the whole of `extent`.
    pub const fn whole(extent: Extent3d) -> Self {
        Self::new(Offset3d::ZERO, extent)
    }
}

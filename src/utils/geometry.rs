use std::fmt;
use std::marker::PhantomData;
use std::ops::{Add, AddAssign};

/// Type-level marker for the logical coordinate space
///
/// All xdg-shell geometry (window geometry, anchor rectangles, popup
/// placement) is expressed in surface-local logical coordinates.
#[derive(Debug)]
pub struct Logical;

/// Trait for types serving as a coordinate for other geometry utils
pub trait Coordinate: Sized + PartialOrd + Default + Copy + fmt::Debug {
    /// A Coordinate that is 0
    const ZERO: Self;
    /// Test if the coordinate is not negative
    fn non_negative(self) -> bool;
    /// Saturating addition
    fn saturating_add(self, other: Self) -> Self;
}

impl Coordinate for i32 {
    const ZERO: i32 = 0;

    #[inline]
    fn non_negative(self) -> bool {
        self >= 0
    }

    #[inline]
    fn saturating_add(self, other: Self) -> Self {
        i32::saturating_add(self, other)
    }
}

/// Implements the value traits of a two component geometry type, which cannot be derived
/// because of the `Kind` marker.
macro_rules! pair_impls {
    ($ty:ident, $a:ident, $b:ident) => {
        impl<N: Clone, Kind> Clone for $ty<N, Kind> {
            #[inline]
            fn clone(&self) -> Self {
                $ty {
                    $a: self.$a.clone(),
                    $b: self.$b.clone(),
                    _kind: PhantomData,
                }
            }
        }

        impl<N: Copy, Kind> Copy for $ty<N, Kind> {}

        impl<N: PartialEq, Kind> PartialEq for $ty<N, Kind> {
            #[inline]
            fn eq(&self, other: &Self) -> bool {
                self.$a == other.$a && self.$b == other.$b
            }
        }

        impl<N: Eq, Kind> Eq for $ty<N, Kind> {}

        impl<N: Default, Kind> Default for $ty<N, Kind> {
            #[inline]
            fn default() -> Self {
                $ty {
                    $a: N::default(),
                    $b: N::default(),
                    _kind: PhantomData,
                }
            }
        }

        impl<N: fmt::Debug, Kind> fmt::Debug for $ty<N, Kind> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_fmt(format_args!(
                    concat!(stringify!($ty), "<{}>"),
                    std::any::type_name::<Kind>()
                ))?;
                f.debug_struct("")
                    .field(stringify!($a), &self.$a)
                    .field(stringify!($b), &self.$b)
                    .finish()
            }
        }

        impl<N, Kind> From<$ty<N, Kind>> for (N, N) {
            #[inline]
            fn from(value: $ty<N, Kind>) -> (N, N) {
                (value.$a, value.$b)
            }
        }
    };
}

/*
 * Point
 */

/// A point as defined by its x and y coordinates
///
/// Operations on points are saturating.
pub struct Point<N, Kind> {
    /// horizontal coordinate
    pub x: N,
    /// vertical coordinate
    pub y: N,
    _kind: PhantomData<Kind>,
}

pair_impls!(Point, x, y);

impl<N, Kind> From<(N, N)> for Point<N, Kind> {
    #[inline]
    fn from((x, y): (N, N)) -> Point<N, Kind> {
        Point {
            x,
            y,
            _kind: PhantomData,
        }
    }
}

impl<N: Coordinate, Kind> Add for Point<N, Kind> {
    type Output = Point<N, Kind>;
    #[inline]
    fn add(self, other: Point<N, Kind>) -> Point<N, Kind> {
        Point {
            x: self.x.saturating_add(other.x),
            y: self.y.saturating_add(other.y),
            _kind: PhantomData,
        }
    }
}

impl<N: Coordinate, Kind> AddAssign for Point<N, Kind> {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

/*
 * Size
 */

/// A size as defined by its width and height
///
/// Constructors of this type ensure that the values are always positive via
/// `debug_assert!()`, however manually changing the values of the fields
/// can break this invariant.
pub struct Size<N, Kind> {
    /// horizontal extent
    pub w: N,
    /// vertical extent
    pub h: N,
    _kind: PhantomData<Kind>,
}

pair_impls!(Size, w, h);

impl<N: Coordinate, Kind> From<(N, N)> for Size<N, Kind> {
    #[inline]
    fn from((w, h): (N, N)) -> Size<N, Kind> {
        debug_assert!(
            w.non_negative() && h.non_negative(),
            "Attempting to create a `Size` of negative size: {:?}",
            (w, h)
        );
        Size {
            w,
            h,
            _kind: PhantomData,
        }
    }
}

/*
 * Rectangle
 */

/// A rectangle defined by its top-left corner and dimensions
pub struct Rectangle<N, Kind> {
    /// Location of the top-left corner of the rectangle
    pub loc: Point<N, Kind>,
    /// Size of the rectangle, as (width, height)
    pub size: Size<N, Kind>,
}

impl<N: Coordinate, Kind> Rectangle<N, Kind> {
    /// Create a new [`Rectangle`] from the coordinates of its top-left corner and its dimensions
    #[inline]
    pub fn from_loc_and_size(loc: impl Into<Point<N, Kind>>, size: impl Into<Size<N, Kind>>) -> Self {
        Rectangle {
            loc: loc.into(),
            size: size.into(),
        }
    }

    /// Create a new [`Rectangle`] from its dimensions, with location zero
    #[inline]
    pub fn from_size(size: Size<N, Kind>) -> Self {
        Rectangle {
            loc: (N::ZERO, N::ZERO).into(),
            size,
        }
    }
}

impl<N: fmt::Debug, Kind> fmt::Debug for Rectangle<N, Kind> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("Rectangle<{}>", std::any::type_name::<Kind>()))?;
        f.debug_struct("")
            .field("x", &self.loc.x)
            .field("y", &self.loc.y)
            .field("width", &self.size.w)
            .field("height", &self.size.h)
            .finish()
    }
}

impl<N: Coordinate, Kind> From<(N, N, N, N)> for Rectangle<N, Kind> {
    #[inline]
    fn from((x, y, w, h): (N, N, N, N)) -> Rectangle<N, Kind> {
        Rectangle::from_loc_and_size((x, y), (w, h))
    }
}

impl<N: Clone, Kind> Clone for Rectangle<N, Kind> {
    #[inline]
    fn clone(&self) -> Self {
        Rectangle {
            loc: self.loc.clone(),
            size: self.size.clone(),
        }
    }
}

impl<N: Copy, Kind> Copy for Rectangle<N, Kind> {}

impl<N: PartialEq, Kind> PartialEq for Rectangle<N, Kind> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.loc == other.loc && self.size == other.size
    }
}

impl<N: Eq, Kind> Eq for Rectangle<N, Kind> {}

impl<N: Default, Kind> Default for Rectangle<N, Kind> {
    #[inline]
    fn default() -> Self {
        Rectangle {
            loc: Default::default(),
            size: Default::default(),
        }
    }
}

use tracing::trace;

use crate::protocol::{xdg_positioner, xdg_wm_base, ConstraintAdjustment, Edges, Request};
use crate::shell::{PositionerError, ShellError};
use crate::transport::Transport;
use crate::utils::{Logical, Point, Rectangle, Serial, Size};

use super::{PositionerHandle, ShellObject, XdgShellSession};

/// The state of a positioner, as set by the client
///
/// This mirrors the `set_*` requests sent so far. It only becomes usable for a popup
/// once both the size and the anchor rectangle are set, see [`PositionerState::validate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PositionerState {
    /// Size of the rectangle that needs to be positioned
    pub rect_size: Option<Size<i32, Logical>>,
    /// Anchor rectangle in the parent surface coordinates relative to which the surface must be positioned
    pub anchor_rect: Option<Rectangle<i32, Logical>>,
    /// Edges defining the anchor point
    pub anchor_edges: Edges,
    /// Gravity direction for positioning the child surface
    pub gravity: Edges,
    /// Adjustments to do if previous criteria constrain the surface
    pub constraint_adjustment: ConstraintAdjustment,
    /// Offset placement relative to the anchor point
    pub offset: Point<i32, Logical>,
    /// When set reactive, the surface is reconstrained if the conditions used for constraining changed
    pub reactive: bool,
    /// The parent window geometry the compositor should use when calculating the popup position
    pub parent_size: Option<Size<i32, Logical>>,
    /// The serial of the parent configure this positioner answers
    pub parent_configure: Option<Serial>,
}

impl PositionerState {
    /// Whether both the size and the anchor rectangle were set
    pub fn is_complete(&self) -> bool {
        self.rect_size.is_some() && self.anchor_rect.is_some()
    }

    /// Freeze this state into a [`Positioner`] usable for a popup
    pub fn validate(&self) -> Result<Positioner, PositionerError> {
        let rect_size = self.rect_size.ok_or(PositionerError::MissingSize)?;
        let anchor_rect = self.anchor_rect.ok_or(PositionerError::MissingAnchorRect)?;

        if rect_size.w <= 0 || rect_size.h <= 0 {
            return Err(PositionerError::InvalidSize {
                width: rect_size.w,
                height: rect_size.h,
            });
        }
        if anchor_rect.size.w < 0 || anchor_rect.size.h < 0 {
            return Err(PositionerError::InvalidAnchorRect {
                width: anchor_rect.size.w,
                height: anchor_rect.size.h,
            });
        }
        if !self.anchor_edges.is_valid() {
            return Err(PositionerError::ContradictoryAnchor(self.anchor_edges));
        }
        if !self.gravity.is_valid() {
            return Err(PositionerError::ContradictoryGravity(self.gravity));
        }

        Ok(Positioner {
            rect_size,
            anchor_rect,
            anchor_edges: self.anchor_edges,
            gravity: self.gravity,
            constraint_adjustment: self.constraint_adjustment,
            offset: self.offset,
            reactive: self.reactive,
            parent_size: self.parent_size,
            parent_configure: self.parent_configure,
        })
    }
}

/// A complete positioner
///
/// Popups keep a copy of the positioner they were created (or last repositioned) with,
/// later changes to the protocol object do not affect them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Positioner {
    /// Size of the rectangle that needs to be positioned
    pub rect_size: Size<i32, Logical>,
    /// Anchor rectangle in the parent surface coordinates
    pub anchor_rect: Rectangle<i32, Logical>,
    /// Edges defining the anchor point
    pub anchor_edges: Edges,
    /// Gravity direction for positioning the child surface
    pub gravity: Edges,
    /// Adjustments to do if previous criteria constrain the surface
    pub constraint_adjustment: ConstraintAdjustment,
    /// Offset placement relative to the anchor point
    pub offset: Point<i32, Logical>,
    /// Whether the popup follows changes of its parent
    pub reactive: bool,
    /// The parent window geometry size used for positioning
    pub parent_size: Option<Size<i32, Logical>>,
    /// The serial of the parent configure this positioner answers
    pub parent_configure: Option<Serial>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    X,
    Y,
}

impl Axis {
    fn slide(self) -> ConstraintAdjustment {
        match self {
            Axis::X => ConstraintAdjustment::SLIDE_X,
            Axis::Y => ConstraintAdjustment::SLIDE_Y,
        }
    }

    fn flip(self) -> ConstraintAdjustment {
        match self {
            Axis::X => ConstraintAdjustment::FLIP_X,
            Axis::Y => ConstraintAdjustment::FLIP_Y,
        }
    }

    fn resize(self) -> ConstraintAdjustment {
        match self {
            Axis::X => ConstraintAdjustment::RESIZE_X,
            Axis::Y => ConstraintAdjustment::RESIZE_Y,
        }
    }

    /// The edge on the lower coordinates side
    fn low_edge(self) -> Edges {
        match self {
            Axis::X => Edges::LEFT,
            Axis::Y => Edges::TOP,
        }
    }

    fn span(self, rect: &Rectangle<i32, Logical>) -> (i32, i32) {
        match self {
            Axis::X => (rect.loc.x, rect.size.w),
            Axis::Y => (rect.loc.y, rect.size.h),
        }
    }

    fn set_span(self, rect: &mut Rectangle<i32, Logical>, (pos, len): (i32, i32)) {
        match self {
            Axis::X => {
                rect.loc.x = pos;
                rect.size.w = len;
            }
            Axis::Y => {
                rect.loc.y = pos;
                rect.size.h = len;
            }
        }
    }

    /// How far `rect` sticks out of `bounds` before and after them on this axis
    fn overflow(self, rect: &Rectangle<i32, Logical>, bounds: &Rectangle<i32, Logical>) -> (i32, i32) {
        let (pos, len) = self.span(rect);
        let (bpos, blen) = self.span(bounds);
        (
            bpos.saturating_sub(pos),
            pos.saturating_add(len).saturating_sub(bpos.saturating_add(blen)),
        )
    }
}

fn total_overflow((before, after): (i32, i32)) -> i32 {
    before.max(0).saturating_add(after.max(0))
}

impl Positioner {
    /// Get the anchor point for a popup as defined by this positioner.
    ///
    /// Defined by `xdg_positioner.set_anchor_rect` and
    /// `xdg_positioner.set_anchor`.
    pub fn anchor_point(&self) -> Point<i32, Logical> {
        let mut point = self.anchor_rect.loc;

        point.y = point.y.saturating_add(if self.anchor_edges.contains(Edges::TOP) {
            0
        } else if self.anchor_edges.contains(Edges::BOTTOM) {
            self.anchor_rect.size.h
        } else {
            self.anchor_rect.size.h / 2
        });

        point.x = point.x.saturating_add(if self.anchor_edges.contains(Edges::LEFT) {
            0
        } else if self.anchor_edges.contains(Edges::RIGHT) {
            self.anchor_rect.size.w
        } else {
            self.anchor_rect.size.w / 2
        });

        point
    }

    /// Get the geometry for a popup as defined by this positioner, without applying
    /// any constraint adjustment.
    ///
    /// `Rectangle::width` and `Rectangle::height` corresponds to the
    /// size set by `xdg_positioner.set_size`.
    ///
    /// `Rectangle::x` and `Rectangle::y` define the position of the
    /// popup relative to its parent surface's `window_geometry`.
    pub fn geometry(&self) -> Rectangle<i32, Logical> {
        let mut geometry = Rectangle {
            loc: self.offset,
            size: self.rect_size,
        };

        // Defines the anchor point for the anchor rectangle. The specified anchor
        // is used derive an anchor point that the child surface will be
        // positioned relative to. If a corner anchor is set (e.g. 'top_left' or
        // 'bottom_right'), the anchor point will be at the specified corner;
        // otherwise, the derived anchor point will be centered on the specified
        // edge, or in the center of the anchor rectangle if no edge is specified.
        geometry.loc += self.anchor_point();

        // Defines in what direction a surface should be positioned, relative to
        // the anchor point of the parent surface. If a corner gravity is
        // specified (e.g. 'bottom_right' or 'top_left'), then the child surface
        // will be placed towards the specified gravity; otherwise, the child
        // surface will be centered over the anchor point on any axis that had no
        // gravity specified.
        if self.gravity.contains(Edges::TOP) {
            geometry.loc.y = geometry.loc.y.saturating_sub(geometry.size.h);
        } else if !self.gravity.contains(Edges::BOTTOM) {
            geometry.loc.y = geometry.loc.y.saturating_sub(geometry.size.h / 2);
        }

        if self.gravity.contains(Edges::LEFT) {
            geometry.loc.x = geometry.loc.x.saturating_sub(geometry.size.w);
        } else if !self.gravity.contains(Edges::RIGHT) {
            geometry.loc.x = geometry.loc.x.saturating_sub(geometry.size.w / 2);
        }

        geometry
    }

    /// The same positioner with anchor and gravity mirrored on one axis
    fn flipped(&self, axis: Axis) -> Positioner {
        let mut flipped = *self;
        match axis {
            Axis::X => {
                flipped.anchor_edges = flipped.anchor_edges.flip_x();
                flipped.gravity = flipped.gravity.flip_x();
            }
            Axis::Y => {
                flipped.anchor_edges = flipped.anchor_edges.flip_y();
                flipped.gravity = flipped.gravity.flip_y();
            }
        }
        flipped
    }

    /// Place the popup inside `bounds`, following the constraint adjustments
    ///
    /// `bounds` are expressed in the same coordinate space as the anchor rectangle. The x
    /// axis is resolved before the y axis. On each overflowing axis the popup is slid if
    /// allowed, otherwise flipped if allowed and if that reduces the overflow, otherwise
    /// shrunk if allowed. At most one adjustment is applied per axis. Without any adjustment
    /// allowed the unconstrained geometry is returned as is.
    pub fn solve(&self, bounds: Rectangle<i32, Logical>) -> Rectangle<i32, Logical> {
        let mut geometry = self.geometry();
        for axis in [Axis::X, Axis::Y] {
            self.constrain_axis(axis, &mut geometry, &bounds);
        }
        geometry
    }

    fn constrain_axis(&self, axis: Axis, geometry: &mut Rectangle<i32, Logical>, bounds: &Rectangle<i32, Logical>) {
        let overflow = axis.overflow(geometry, bounds);
        if total_overflow(overflow) == 0 {
            return;
        }

        let (bpos, blen) = axis.span(bounds);
        if self.constraint_adjustment.contains(axis.slide()) {
            let (pos, len) = axis.span(geometry);
            let pos = if len > blen {
                // does not fit, keep the edge closest to the anchor visible
                if self.gravity.contains(axis.low_edge()) {
                    bpos.saturating_add(blen).saturating_sub(len)
                } else {
                    bpos
                }
            } else if overflow.0 > 0 {
                pos.saturating_add(overflow.0)
            } else {
                pos.saturating_sub(overflow.1)
            };
            trace!(?axis, from = axis.span(geometry).0, to = pos, "sliding popup");
            axis.set_span(geometry, (pos, len));
        } else if self.constraint_adjustment.contains(axis.flip()) {
            let flipped = self.flipped(axis).geometry();
            if total_overflow(axis.overflow(&flipped, bounds)) < total_overflow(overflow) {
                trace!(?axis, "flipping popup");
                axis.set_span(geometry, axis.span(&flipped));
            }
        } else if self.constraint_adjustment.contains(axis.resize()) {
            let (pos, len) = axis.span(geometry);
            let start = pos.max(bpos);
            let end = pos.saturating_add(len).min(bpos.saturating_add(blen));
            if end > start {
                trace!(?axis, from = len, to = end - start, "resizing popup");
                axis.set_span(geometry, (start, end - start));
            }
        }
    }
}

impl<T: Transport> XdgShellSession<T> {
    /// Create a new positioner
    pub fn create_positioner(&mut self) -> Result<PositionerHandle, ShellError> {
        let id = self.allocate_id();
        self.send(
            self.wm_base,
            Request::WmBase(xdg_wm_base::Request::CreatePositioner { id }),
        )?;
        self.objects
            .insert(id, ShellObject::Positioner(PositionerState::default()));
        trace!(positioner = %id, "created positioner");
        Ok(PositionerHandle(id))
    }

    /// The state accumulated by a positioner, `None` if it was destroyed
    pub fn positioner(&self, positioner: &PositionerHandle) -> Option<&PositionerState> {
        match self.objects.get(&positioner.0) {
            Some(ShellObject::Positioner(state)) => Some(state),
            _ => None,
        }
    }

    pub(super) fn positioner_mut(
        &mut self,
        positioner: &PositionerHandle,
    ) -> Result<&mut PositionerState, ShellError> {
        match self.objects.get_mut(&positioner.0) {
            Some(ShellObject::Positioner(state)) => Ok(state),
            _ => Err(ShellError::AlreadyDestroyed(positioner.0)),
        }
    }

    fn update_positioner(
        &mut self,
        positioner: &PositionerHandle,
        request: xdg_positioner::Request,
        update: impl FnOnce(&mut PositionerState),
    ) -> Result<(), ShellError> {
        self.positioner_mut(positioner)?;
        self.send(positioner.0, Request::Positioner(request))?;
        update(self.positioner_mut(positioner)?);
        Ok(())
    }

    /// Set the size of the popup to position
    ///
    /// Both dimensions must be strictly positive.
    pub fn set_positioner_size(
        &mut self,
        positioner: &PositionerHandle,
        width: i32,
        height: i32,
    ) -> Result<(), ShellError> {
        if width <= 0 || height <= 0 {
            return Err(PositionerError::InvalidSize { width, height }.into());
        }
        self.update_positioner(
            positioner,
            xdg_positioner::Request::SetSize { width, height },
            |state| state.rect_size = Some((width, height).into()),
        )
    }

    /// Set the anchor rectangle, relative to the window geometry of the parent
    pub fn set_positioner_anchor_rect(
        &mut self,
        positioner: &PositionerHandle,
        rect: Rectangle<i32, Logical>,
    ) -> Result<(), ShellError> {
        if rect.size.w < 0 || rect.size.h < 0 {
            return Err(PositionerError::InvalidAnchorRect {
                width: rect.size.w,
                height: rect.size.h,
            }
            .into());
        }
        self.update_positioner(
            positioner,
            xdg_positioner::Request::SetAnchorRect {
                x: rect.loc.x,
                y: rect.loc.y,
                width: rect.size.w,
                height: rect.size.h,
            },
            |state| state.anchor_rect = Some(rect),
        )
    }

    /// Set the edges of the anchor rectangle the popup is attached to
    pub fn set_positioner_anchor(
        &mut self,
        positioner: &PositionerHandle,
        anchor: Edges,
    ) -> Result<(), ShellError> {
        if !anchor.is_valid() {
            return Err(PositionerError::ContradictoryAnchor(anchor).into());
        }
        self.update_positioner(
            positioner,
            xdg_positioner::Request::SetAnchor { anchor },
            |state| state.anchor_edges = anchor,
        )
    }

    /// Set the direction the popup extends to from the anchor point
    pub fn set_positioner_gravity(
        &mut self,
        positioner: &PositionerHandle,
        gravity: Edges,
    ) -> Result<(), ShellError> {
        if !gravity.is_valid() {
            return Err(PositionerError::ContradictoryGravity(gravity).into());
        }
        self.update_positioner(
            positioner,
            xdg_positioner::Request::SetGravity { gravity },
            |state| state.gravity = gravity,
        )
    }

    /// Set how the popup may be adjusted when constrained
    pub fn set_positioner_constraint_adjustment(
        &mut self,
        positioner: &PositionerHandle,
        constraint_adjustment: ConstraintAdjustment,
    ) -> Result<(), ShellError> {
        self.update_positioner(
            positioner,
            xdg_positioner::Request::SetConstraintAdjustment { constraint_adjustment },
            |state| state.constraint_adjustment = constraint_adjustment,
        )
    }

    /// Set the offset of the popup from its anchor point
    pub fn set_positioner_offset(
        &mut self,
        positioner: &PositionerHandle,
        offset: Point<i32, Logical>,
    ) -> Result<(), ShellError> {
        self.update_positioner(
            positioner,
            xdg_positioner::Request::SetOffset {
                x: offset.x,
                y: offset.y,
            },
            |state| state.offset = offset,
        )
    }

    /// Make popups created from this positioner follow changes of their parent
    ///
    /// Requires version 3.
    pub fn set_positioner_reactive(&mut self, positioner: &PositionerHandle) -> Result<(), ShellError> {
        self.update_positioner(positioner, xdg_positioner::Request::SetReactive, |state| {
            state.reactive = true
        })
    }

    /// Set the parent size the popup position should be computed against
    ///
    /// Requires version 3.
    pub fn set_positioner_parent_size(
        &mut self,
        positioner: &PositionerHandle,
        parent_size: Size<i32, Logical>,
    ) -> Result<(), ShellError> {
        self.update_positioner(
            positioner,
            xdg_positioner::Request::SetParentSize {
                parent_width: parent_size.w,
                parent_height: parent_size.h,
            },
            |state| state.parent_size = Some(parent_size),
        )
    }

    /// Set the parent configure the popup position answers
    ///
    /// Requires version 3.
    pub fn set_positioner_parent_configure(
        &mut self,
        positioner: &PositionerHandle,
        serial: Serial,
    ) -> Result<(), ShellError> {
        self.update_positioner(
            positioner,
            xdg_positioner::Request::SetParentConfigure { serial },
            |state| state.parent_configure = Some(serial),
        )
    }

    /// Destroy a positioner
    ///
    /// Popups created from it keep their own copy and are not affected.
    pub fn destroy_positioner(&mut self, positioner: &PositionerHandle) -> Result<(), ShellError> {
        self.positioner_mut(positioner)?;
        self.send(positioner.0, Request::Positioner(xdg_positioner::Request::Destroy))?;
        self.tombstone(positioner.0);
        Ok(())
    }
}

//! Shell protocols negotiated by the client
//!
//! Only the xdg-shell family is implemented, see the [`xdg`] module.
//!
//! Every operation of the [`xdg::XdgShellSession`] returns a [`ShellError`] on failure. Errors are
//! always reported synchronously to the caller of the operation that detected them. The only
//! errors that can come out of event dispatch are [`ProtocolViolation`]s (and transport failures of
//! automatic replies); they are logged as warnings and never stop the session, a surface receiving
//! trailing events after being destroyed is an expected race.

use thiserror::Error;

use crate::protocol::{Edges, ObjectId};
use crate::transport::TransportError;
use crate::utils::Serial;

pub mod xdg;

use self::xdg::Role;

/// Errors returned by the operations of an [`xdg::XdgShellSession`]
#[derive(Debug, Error)]
pub enum ShellError {
    /// The surface already received a role
    #[error("surface {surface} already has the {role} role")]
    InvalidRole {
        /// The xdg_surface (or wl_surface) that already has a role
        surface: ObjectId,
        /// The role it has
        role: Role,
    },
    /// The positioner is incomplete or contradictory
    #[error("invalid positioner: {0}")]
    InvalidPositioner(#[from] PositionerError),
    /// The parent is missing, has no role or has been dismissed
    #[error("invalid parent {parent}: {reason}")]
    InvalidParent {
        /// The offending parent
        parent: ObjectId,
        /// Why it cannot be used
        reason: &'static str,
    },
    /// The object has been destroyed and accepts no further requests
    #[error("object {0} has already been destroyed")]
    AlreadyDestroyed(ObjectId),
    /// The popup has been dismissed by the compositor
    #[error("popup {0} has already been dismissed")]
    AlreadyDone(ObjectId),
    /// The popup already requested a grab
    #[error("popup {0} already requested a grab")]
    AlreadyGrabbed(ObjectId),
    /// The wl_surface already has a live xdg_surface
    #[error("wl_surface {0} already has an xdg_surface")]
    AlreadyConstructed(ObjectId),
    /// The object cannot be destroyed before the objects depending on it
    #[error("object {0} still has live children")]
    ChildrenAlive(ObjectId),
    /// A size or geometry argument is out of range
    #[error("invalid size {width}x{height}")]
    InvalidSize {
        /// Requested width
        width: i32,
        /// Requested height
        height: i32,
    },
    /// The request is newer than the bound xdg_wm_base version
    #[error("{request} requires xdg_wm_base version {since}, bound version is {version}")]
    Unsupported {
        /// Name of the request
        request: &'static str,
        /// Version introducing the request
        since: u32,
        /// Bound version
        version: u32,
    },
    /// The compositor or the application broke the protocol contract
    #[error("protocol violation: {0}")]
    ProtocolViolation(#[from] ProtocolViolation),
    /// The transport failed to send the request
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Reasons a positioner cannot be used for a popup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PositionerError {
    /// `set_size` was never called
    #[error("the size was never set")]
    MissingSize,
    /// `set_anchor_rect` was never called
    #[error("the anchor rectangle was never set")]
    MissingAnchorRect,
    /// Width or height are not strictly positive
    #[error("size {width}x{height} is not strictly positive")]
    InvalidSize {
        /// Requested width
        width: i32,
        /// Requested height
        height: i32,
    },
    /// Width or height of the anchor rectangle are negative
    #[error("anchor rectangle size {width}x{height} is negative")]
    InvalidAnchorRect {
        /// Requested width
        width: i32,
        /// Requested height
        height: i32,
    },
    /// The anchor combines opposite edges
    #[error("anchor {0:?} combines opposite edges")]
    ContradictoryAnchor(Edges),
    /// The gravity combines opposite edges
    #[error("gravity {0:?} combines opposite edges")]
    ContradictoryGravity(Edges),
}

/// A message that does not fit the current protocol state
///
/// These are not fatal: the offending message is dropped and the session carries on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    /// A serial that was never sent to this object
    #[error("serial {serial} was never issued for {object}")]
    UnknownSerial {
        /// The object the serial was used with
        object: ObjectId,
        /// The serial
        serial: Serial,
    },
    /// A configure whose serial is not newer than the previous one
    #[error("configure serial {serial} for {object} is not newer than the last one")]
    StaleConfigure {
        /// The surface
        object: ObjectId,
        /// The serial
        serial: Serial,
    },
    /// A `repositioned` event that does not match the outstanding token
    #[error("repositioned token {token} for popup {popup} does not match the outstanding {expected:?}")]
    UnknownRepositionToken {
        /// The popup
        popup: ObjectId,
        /// The token that arrived
        token: u32,
        /// The outstanding token
        expected: Option<u32>,
    },
    /// An event addressed to an identity that was never allocated
    #[error("event for unknown object {0}")]
    UnknownObject(ObjectId),
    /// An event that does not belong to the interface or state of its target
    #[error("unexpected {interface}.{event} event for {object}")]
    UnexpectedEvent {
        /// The target object
        object: ObjectId,
        /// Interface of the event
        interface: &'static str,
        /// Name of the event
        event: &'static str,
    },
}

//! Client side of the `xdg_shell` protocol
//!
//! This module tracks the shell objects an application creates and negotiates their geometry
//! with the compositor. It only handles the protocol exchanges, the actual drawing of
//! windows and the transport of messages are out of its scope.
//!
//! ## How to use it
//!
//! All objects are owned by an [`XdgShellSession`], created around a
//! [`Transport`](crate::transport::Transport) and the identity of an already bound
//! `xdg_wm_base` global:
//!
//! ```
//! use xdgsmith::protocol::{Edges, ObjectId};
//! use xdgsmith::shell::xdg::{XdgShellConfig, XdgShellSession};
//! use xdgsmith::transport::RecordingTransport;
//!
//! # fn main() -> Result<(), xdgsmith::shell::ShellError> {
//! let mut session = XdgShellSession::new(
//!     RecordingTransport::new(),
//!     ObjectId::new(3),
//!     XdgShellConfig::default(),
//! );
//!
//! // a toplevel window for an existing wl_surface
//! let surface = session.get_xdg_surface(ObjectId::new(10))?;
//! let toplevel = session.get_toplevel(&surface)?;
//! session.set_title(&toplevel, "Hello")?;
//!
//! // a popup below a button of that window
//! let positioner = session.create_positioner()?;
//! session.set_positioner_size(&positioner, 50, 30)?;
//! session.set_positioner_anchor_rect(&positioner, (0, 0, 100, 20).into())?;
//! session.set_positioner_anchor(&positioner, Edges::BOTTOM)?;
//! session.set_positioner_gravity(&positioner, Edges::BOTTOM)?;
//!
//! let popup_surface = session.get_xdg_surface(ObjectId::new(11))?;
//! let popup = session.get_popup(&popup_surface, &surface, &positioner)?;
//! session.destroy_positioner(&positioner)?;
//! # let _ = popup;
//! # Ok(())
//! # }
//! ```
//!
//! Inbound events are fed to [`XdgShellSession::dispatch`]. Configure proposals are buffered by a
//! [`ConfigureTracker`] per surface and forwarded to the listener registered on the
//! toplevel or popup; the application acknowledges them explicitly with
//! [`XdgShellSession::ack_configure`] once its next commit matches the proposal.
//!
//! ### Objects
//!
//! The application manipulates shell objects through typed handles:
//!
//! - [`PositionerHandle`]: a positioner, a value object describing how to place a popup.
//! - [`SurfaceHandle`]: an `xdg_surface`, the base of both roles, which carries the configure
//!   handshake.
//! - [`ToplevelHandle`]: an `xdg_toplevel` role object.
//! - [`PopupHandle`]: an `xdg_popup` role object.
//!
//! Handles are plain identities; using a handle of a destroyed object fails with
//! [`ShellError::AlreadyDestroyed`](crate::shell::ShellError::AlreadyDestroyed).

use std::fmt;

use crate::protocol::ObjectId;
use crate::utils::{Logical, Rectangle};

mod configure;
mod popup;
mod positioner;
mod session;
mod toplevel;

pub use self::configure::{Configure, ConfigureState, ConfigureTracker};
pub use self::popup::{Popup, PopupEvent, PopupListener, PopupState};
pub use self::positioner::{Positioner, PositionerState};
pub use self::session::{XdgShellConfig, XdgShellSession, XDG_WM_BASE_VERSION};
pub use self::toplevel::{Toplevel, ToplevelAttributes, ToplevelEvent, ToplevelListener, ToplevelState};

/// The role of an XDG toplevel surface.
pub const XDG_TOPLEVEL_ROLE: &str = "xdg_toplevel";

/// The role of an XDG popup surface.
pub const XDG_POPUP_ROLE: &str = "xdg_popup";

/// Role of an xdg_surface
///
/// Once assigned, the role of a surface never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// The surface is a toplevel window
    Toplevel,
    /// The surface is a popup
    Popup,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Toplevel => f.write_str(XDG_TOPLEVEL_ROLE),
            Role::Popup => f.write_str(XDG_POPUP_ROLE),
        }
    }
}

/// Handle to an `xdg_positioner`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PositionerHandle(pub(crate) ObjectId);

impl PositionerHandle {
    /// Identity of the positioner
    pub fn id(&self) -> ObjectId {
        self.0
    }
}

/// Handle to an `xdg_surface`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle {
    pub(crate) id: ObjectId,
    pub(crate) wl_surface: ObjectId,
}

impl SurfaceHandle {
    /// Identity of the xdg_surface
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Identity of the underlying wl_surface
    pub fn wl_surface(&self) -> ObjectId {
        self.wl_surface
    }
}

/// Handle to an `xdg_toplevel`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ToplevelHandle {
    pub(crate) id: ObjectId,
    pub(crate) surface: ObjectId,
}

impl ToplevelHandle {
    /// Identity of the xdg_toplevel
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Identity of the xdg_surface carrying this role
    pub fn xdg_surface(&self) -> ObjectId {
        self.surface
    }
}

/// Handle to an `xdg_popup`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PopupHandle {
    pub(crate) id: ObjectId,
    pub(crate) surface: ObjectId,
}

impl PopupHandle {
    /// Identity of the xdg_popup
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Identity of the xdg_surface carrying this role
    pub fn xdg_surface(&self) -> ObjectId {
        self.surface
    }
}

/// An xdg_surface and its role
#[derive(Debug)]
pub(crate) struct XdgSurface {
    pub(crate) wl_surface: ObjectId,
    pub(crate) role: SurfaceRole,
    pub(crate) window_geometry: Option<Rectangle<i32, Logical>>,
}

impl XdgSurface {
    fn new(wl_surface: ObjectId) -> XdgSurface {
        XdgSurface {
            wl_surface,
            role: SurfaceRole::None,
            window_geometry: None,
        }
    }

    /// The assigned role, even if its role object has been destroyed since
    pub(crate) fn role(&self) -> Option<Role> {
        match self.role {
            SurfaceRole::None => None,
            SurfaceRole::Toplevel(_) => Some(Role::Toplevel),
            SurfaceRole::Popup(_) => Some(Role::Popup),
        }
    }
}

#[derive(Debug)]
pub(crate) enum SurfaceRole {
    None,
    Toplevel(Toplevel),
    Popup(Popup),
}

/// Everything a protocol identity can be routed to
///
/// Role objects have their own identity on the wire, but their state lives in the
/// xdg_surface they were created from.
#[derive(Debug)]
pub(crate) enum ShellObject {
    Positioner(PositionerState),
    Surface(XdgSurface),
    Toplevel { surface: ObjectId },
    Popup { surface: ObjectId },
}

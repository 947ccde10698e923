//! The xdg-shell request and event vocabulary
//!
//! This module describes, for each xdg-shell interface, the requests the client can send and the
//! events the compositor can deliver, together with their opcodes and the interface version that
//! introduced them. It does not define any wire encoding: a [`Transport`](crate::transport::Transport)
//! receives fully typed [`Request`]s and the application feeds fully typed [`Event`]s back into the
//! [`XdgShellSession`](crate::shell::xdg::XdgShellSession).

use std::fmt;

use bitflags::bitflags;

use crate::utils::Serial;

/// Opaque identity of a protocol object
///
/// Identities of xdg-shell objects are allocated by the
/// [`XdgShellSession`](crate::shell::xdg::XdgShellSession). Identities of
/// foreign objects (`wl_surface`, `wl_seat`, `wl_output`) are allocated by whoever
/// created them and only passed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u32);

impl ObjectId {
    /// Wrap a raw protocol id
    pub const fn new(id: u32) -> ObjectId {
        ObjectId(id)
    }

    /// The raw protocol id
    pub const fn protocol_id(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

bitflags! {
    /// Edges of a rectangle, used for both the anchor and the gravity of a positioner
    ///
    /// An empty set means "centered". `TOP` and `BOTTOM` (or `LEFT` and `RIGHT`) cannot
    /// be combined.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Edges: u32 {
        /// The top edge
        const TOP = 1;
        /// The bottom edge
        const BOTTOM = 2;
        /// The left edge
        const LEFT = 4;
        /// The right edge
        const RIGHT = 8;
    }
}

impl Edges {
    /// Whether this edge set can be expressed by `xdg_positioner.anchor`/`gravity`
    pub fn is_valid(self) -> bool {
        !self.contains(Edges::TOP | Edges::BOTTOM) && !self.contains(Edges::LEFT | Edges::RIGHT)
    }

    /// Encode as the `xdg_positioner.anchor` / `xdg_positioner.gravity` enum value
    ///
    /// Returns `None` for contradictory edge sets.
    pub fn to_wire(self) -> Option<u32> {
        let value = match self {
            e if e.is_empty() => 0,
            e if e == Edges::TOP => 1,
            e if e == Edges::BOTTOM => 2,
            e if e == Edges::LEFT => 3,
            e if e == Edges::RIGHT => 4,
            e if e == Edges::TOP | Edges::LEFT => 5,
            e if e == Edges::BOTTOM | Edges::LEFT => 6,
            e if e == Edges::TOP | Edges::RIGHT => 7,
            e if e == Edges::BOTTOM | Edges::RIGHT => 8,
            _ => return None,
        };
        Some(value)
    }

    /// Decode an `xdg_positioner.anchor` / `xdg_positioner.gravity` enum value
    pub fn from_wire(value: u32) -> Option<Edges> {
        let edges = match value {
            0 => Edges::empty(),
            1 => Edges::TOP,
            2 => Edges::BOTTOM,
            3 => Edges::LEFT,
            4 => Edges::RIGHT,
            5 => Edges::TOP | Edges::LEFT,
            6 => Edges::BOTTOM | Edges::LEFT,
            7 => Edges::TOP | Edges::RIGHT,
            8 => Edges::BOTTOM | Edges::RIGHT,
            _ => return None,
        };
        Some(edges)
    }

    /// Mirror the horizontal component
    pub fn flip_x(self) -> Edges {
        let mut flipped = self - (Edges::LEFT | Edges::RIGHT);
        if self.contains(Edges::LEFT) {
            flipped |= Edges::RIGHT;
        }
        if self.contains(Edges::RIGHT) {
            flipped |= Edges::LEFT;
        }
        flipped
    }

    /// Mirror the vertical component
    pub fn flip_y(self) -> Edges {
        let mut flipped = self - (Edges::TOP | Edges::BOTTOM);
        if self.contains(Edges::TOP) {
            flipped |= Edges::BOTTOM;
        }
        if self.contains(Edges::BOTTOM) {
            flipped |= Edges::TOP;
        }
        flipped
    }
}

bitflags! {
    /// How a popup may be adjusted when its unconstrained placement violates the constraint bounds
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ConstraintAdjustment: u32 {
        /// Move the popup horizontally
        const SLIDE_X = 1;
        /// Move the popup vertically
        const SLIDE_Y = 2;
        /// Mirror anchor and gravity horizontally
        const FLIP_X = 4;
        /// Mirror anchor and gravity vertically
        const FLIP_Y = 8;
        /// Shrink the popup horizontally
        const RESIZE_X = 16;
        /// Shrink the popup vertically
        const RESIZE_Y = 32;
    }
}

bitflags! {
    /// States of a toplevel, as reported by `xdg_toplevel.configure`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ToplevelStates: u32 {
        /// The surface is maximized
        const MAXIMIZED = 1 << 0;
        /// The surface is fullscreen
        const FULLSCREEN = 1 << 1;
        /// The surface is being interactively resized
        const RESIZING = 1 << 2;
        /// The surface has keyboard focus or is otherwise highlighted
        const ACTIVATED = 1 << 3;
        /// The left edge is adjacent to another part of the tiling grid
        const TILED_LEFT = 1 << 4;
        /// The right edge is adjacent to another part of the tiling grid
        const TILED_RIGHT = 1 << 5;
        /// The top edge is adjacent to another part of the tiling grid
        const TILED_TOP = 1 << 6;
        /// The bottom edge is adjacent to another part of the tiling grid
        const TILED_BOTTOM = 1 << 7;
        /// The surface is not visible and should not render
        const SUSPENDED = 1 << 8;
    }
}

impl ToplevelStates {
    /// Decode the `states` array of `xdg_toplevel.configure`
    ///
    /// Values unknown to this version are ignored.
    pub fn from_wire(states: &[u32]) -> ToplevelStates {
        states
            .iter()
            .filter(|&&state| (1..=9).contains(&state))
            .fold(ToplevelStates::empty(), |acc, &state| {
                acc | ToplevelStates::from_bits_truncate(1 << (state - 1))
            })
    }

    /// Encode as the `states` array of `xdg_toplevel.configure`
    pub fn to_wire(self) -> Vec<u32> {
        self.iter().map(|state| state.bits().trailing_zeros() + 1).collect()
    }
}

bitflags! {
    /// Window management capabilities announced by `xdg_toplevel.wm_capabilities`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct WmCapabilities: u32 {
        /// `show_window_menu` is available
        const WINDOW_MENU = 1 << 0;
        /// `set_maximized` and `unset_maximized` are available
        const MAXIMIZE = 1 << 1;
        /// `set_fullscreen` and `unset_fullscreen` are available
        const FULLSCREEN = 1 << 2;
        /// `set_minimized` is available
        const MINIMIZE = 1 << 3;
    }
}

impl WmCapabilities {
    /// Decode the `capabilities` array of `xdg_toplevel.wm_capabilities`
    pub fn from_wire(capabilities: &[u32]) -> WmCapabilities {
        capabilities
            .iter()
            .filter(|&&cap| (1..=4).contains(&cap))
            .fold(WmCapabilities::empty(), |acc, &cap| {
                acc | WmCapabilities::from_bits_truncate(1 << (cap - 1))
            })
    }
}

/// Edge or corner grabbed by an interactive resize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ResizeEdge {
    /// No edge
    None = 0,
    /// Top edge
    Top = 1,
    /// Bottom edge
    Bottom = 2,
    /// Left edge
    Left = 4,
    /// Top-left corner
    TopLeft = 5,
    /// Bottom-left corner
    BottomLeft = 6,
    /// Right edge
    Right = 8,
    /// Top-right corner
    TopRight = 9,
    /// Bottom-right corner
    BottomRight = 10,
}

impl ResizeEdge {
    /// The `xdg_toplevel.resize_edge` enum value
    pub fn to_wire(self) -> u32 {
        self as u32
    }
}

macro_rules! xdg_interface {
    ($(#[$mod_meta:meta])* $module:ident, $name:literal,
     requests {
        $($(#[$req_meta:meta])* $req:ident $({ $($req_field:ident: $req_ty:ty),* $(,)? })? => ($req_op:literal, $req_since:literal),)*
     }
     events {
        $($(#[$ev_meta:meta])* $ev:ident $({ $($ev_field:ident: $ev_ty:ty),* $(,)? })? => ($ev_op:literal, $ev_since:literal),)*
     }) => {
        $(#[$mod_meta])*
        pub mod $module {
            #[allow(unused_imports)]
            use super::*;

            /// Name of the interface
            pub const INTERFACE: &str = $name;

            /// Requests the client can send on this interface
            #[allow(missing_docs)]
            #[derive(Debug, Clone, PartialEq, Eq)]
            pub enum Request {
                $($(#[$req_meta])* $req $({ $($req_field: $req_ty),* })?,)*
            }

            impl Request {
                /// Opcode of this request
                pub fn opcode(&self) -> u16 {
                    match *self {
                        $(Request::$req { .. } => $req_op,)*
                    }
                }

                /// Interface version that introduced this request
                pub fn since(&self) -> u32 {
                    match *self {
                        $(Request::$req { .. } => $req_since,)*
                    }
                }

                /// Protocol name of this request
                pub fn name(&self) -> &'static str {
                    match *self {
                        $(Request::$req { .. } => stringify!($req),)*
                    }
                }
            }

            /// Events the compositor can deliver on this interface
            #[allow(missing_docs)]
            #[derive(Debug, Clone, PartialEq, Eq)]
            pub enum Event {
                $($(#[$ev_meta])* $ev $({ $($ev_field: $ev_ty),* })?,)*
            }

            impl Event {
                /// Opcode of this event
                pub fn opcode(&self) -> u16 {
                    match *self {
                        $(Event::$ev { .. } => $ev_op,)*
                    }
                }

                /// Interface version that introduced this event
                pub fn since(&self) -> u32 {
                    match *self {
                        $(Event::$ev { .. } => $ev_since,)*
                    }
                }

                /// Protocol name of this event
                pub fn name(&self) -> &'static str {
                    match *self {
                        $(Event::$ev { .. } => stringify!($ev),)*
                    }
                }
            }
        }
    };
}

xdg_interface!(
    /// The global entry point of xdg-shell
    xdg_wm_base, "xdg_wm_base",
    requests {
        /// Destroy the xdg_wm_base object
        Destroy => (0, 1),
        /// Create a positioner object
        CreatePositioner { id: ObjectId } => (1, 1),
        /// Create an xdg_surface for a wl_surface
        GetXdgSurface { id: ObjectId, surface: ObjectId } => (2, 1),
        /// Respond to a ping event
        Pong { serial: Serial } => (3, 1),
    }
    events {
        /// Check if the client is alive
        Ping { serial: Serial } => (0, 1),
    }
);

xdg_interface!(
    /// Child surface positioner
    xdg_positioner, "xdg_positioner",
    requests {
        /// Destroy the positioner
        Destroy => (0, 1),
        /// Set the size of the to-be positioned rectangle
        SetSize { width: i32, height: i32 } => (1, 1),
        /// Set the anchor rectangle within the parent surface
        SetAnchorRect { x: i32, y: i32, width: i32, height: i32 } => (2, 1),
        /// Set anchor rectangle anchor
        SetAnchor { anchor: Edges } => (3, 1),
        /// Set child surface gravity
        SetGravity { gravity: Edges } => (4, 1),
        /// Set the adjustment to be done when constrained
        SetConstraintAdjustment { constraint_adjustment: ConstraintAdjustment } => (5, 1),
        /// Set surface position offset
        SetOffset { x: i32, y: i32 } => (6, 1),
        /// Continuously reconstrain the surface
        SetReactive => (7, 3),
        /// Set the parent window geometry size used for positioning
        SetParentSize { parent_width: i32, parent_height: i32 } => (8, 3),
        /// Set the parent configure this positioner answers
        SetParentConfigure { serial: Serial } => (9, 3),
    }
    events {}
);

xdg_interface!(
    /// Desktop user interface surface base interface
    xdg_surface, "xdg_surface",
    requests {
        /// Destroy the xdg_surface
        Destroy => (0, 1),
        /// Assign the xdg_toplevel surface role
        GetToplevel { id: ObjectId } => (1, 1),
        /// Assign the xdg_popup surface role
        GetPopup { id: ObjectId, parent: Option<ObjectId>, positioner: ObjectId } => (2, 1),
        /// Set the new window geometry
        SetWindowGeometry { x: i32, y: i32, width: i32, height: i32 } => (3, 1),
        /// Ack a configure event
        AckConfigure { serial: Serial } => (4, 1),
    }
    events {
        /// Suggest a surface change
        Configure { serial: Serial } => (0, 1),
    }
);

xdg_interface!(
    /// Toplevel surface
    xdg_toplevel, "xdg_toplevel",
    requests {
        /// Destroy the xdg_toplevel
        Destroy => (0, 1),
        /// Set the parent of this surface
        SetParent { parent: Option<ObjectId> } => (1, 1),
        /// Set surface title
        SetTitle { title: String } => (2, 1),
        /// Set application ID
        SetAppId { app_id: String } => (3, 1),
        /// Show the window menu
        ShowWindowMenu { seat: ObjectId, serial: Serial, x: i32, y: i32 } => (4, 1),
        /// Start an interactive move
        Move { seat: ObjectId, serial: Serial } => (5, 1),
        /// Start an interactive resize
        Resize { seat: ObjectId, serial: Serial, edges: ResizeEdge } => (6, 1),
        /// Set the maximum size
        SetMaxSize { width: i32, height: i32 } => (7, 1),
        /// Set the minimum size
        SetMinSize { width: i32, height: i32 } => (8, 1),
        /// Maximize the window
        SetMaximized => (9, 1),
        /// Unmaximize the window
        UnsetMaximized => (10, 1),
        /// Set the window as fullscreen on an output
        SetFullscreen { output: Option<ObjectId> } => (11, 1),
        /// Unset the window as fullscreen
        UnsetFullscreen => (12, 1),
        /// Set the window as minimized
        SetMinimized => (13, 1),
    }
    events {
        /// Suggest a surface change
        Configure { width: i32, height: i32, states: ToplevelStates } => (0, 1),
        /// Surface wants to be closed
        Close => (1, 1),
        /// Recommended window geometry bounds
        ConfigureBounds { width: i32, height: i32 } => (2, 4),
        /// Compositor capabilities
        WmCapabilities { capabilities: WmCapabilities } => (3, 5),
    }
);

xdg_interface!(
    /// Short-lived, popup surfaces for menus
    xdg_popup, "xdg_popup",
    requests {
        /// Remove the xdg_popup interface
        Destroy => (0, 1),
        /// Make the popup take an explicit grab
        Grab { seat: ObjectId, serial: Serial } => (1, 1),
        /// Recalculate the popup's location
        Reposition { positioner: ObjectId, token: u32 } => (2, 3),
    }
    events {
        /// Configure the popup surface
        Configure { x: i32, y: i32, width: i32, height: i32 } => (0, 1),
        /// Popup interaction is done
        PopupDone => (1, 1),
        /// Signal the completion of a repositioned request
        Repositioned { token: u32 } => (2, 3),
    }
);

/// Any request of the xdg-shell family
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// A request on `xdg_wm_base`
    WmBase(xdg_wm_base::Request),
    /// A request on `xdg_positioner`
    Positioner(xdg_positioner::Request),
    /// A request on `xdg_surface`
    Surface(xdg_surface::Request),
    /// A request on `xdg_toplevel`
    Toplevel(xdg_toplevel::Request),
    /// A request on `xdg_popup`
    Popup(xdg_popup::Request),
}

impl Request {
    /// Name of the interface this request belongs to
    pub fn interface(&self) -> &'static str {
        match self {
            Request::WmBase(_) => xdg_wm_base::INTERFACE,
            Request::Positioner(_) => xdg_positioner::INTERFACE,
            Request::Surface(_) => xdg_surface::INTERFACE,
            Request::Toplevel(_) => xdg_toplevel::INTERFACE,
            Request::Popup(_) => xdg_popup::INTERFACE,
        }
    }

    /// Opcode of this request within its interface
    pub fn opcode(&self) -> u16 {
        match self {
            Request::WmBase(r) => r.opcode(),
            Request::Positioner(r) => r.opcode(),
            Request::Surface(r) => r.opcode(),
            Request::Toplevel(r) => r.opcode(),
            Request::Popup(r) => r.opcode(),
        }
    }

    /// Interface version that introduced this request
    pub fn since(&self) -> u32 {
        match self {
            Request::WmBase(r) => r.since(),
            Request::Positioner(r) => r.since(),
            Request::Surface(r) => r.since(),
            Request::Toplevel(r) => r.since(),
            Request::Popup(r) => r.since(),
        }
    }

    /// Protocol name of this request
    pub fn name(&self) -> &'static str {
        match self {
            Request::WmBase(r) => r.name(),
            Request::Positioner(r) => r.name(),
            Request::Surface(r) => r.name(),
            Request::Toplevel(r) => r.name(),
            Request::Popup(r) => r.name(),
        }
    }

    /// Whether this request destroys the object it is sent on
    pub fn is_destructor(&self) -> bool {
        matches!(
            self,
            Request::WmBase(xdg_wm_base::Request::Destroy)
                | Request::Positioner(xdg_positioner::Request::Destroy)
                | Request::Surface(xdg_surface::Request::Destroy)
                | Request::Toplevel(xdg_toplevel::Request::Destroy)
                | Request::Popup(xdg_popup::Request::Destroy)
        )
    }
}

/// Any event of the xdg-shell family
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// An event on `xdg_wm_base`
    WmBase(xdg_wm_base::Event),
    /// An event on `xdg_surface`
    Surface(xdg_surface::Event),
    /// An event on `xdg_toplevel`
    Toplevel(xdg_toplevel::Event),
    /// An event on `xdg_popup`
    Popup(xdg_popup::Event),
}

impl Event {
    /// Name of the interface this event belongs to
    pub fn interface(&self) -> &'static str {
        match self {
            Event::WmBase(_) => xdg_wm_base::INTERFACE,
            Event::Surface(_) => xdg_surface::INTERFACE,
            Event::Toplevel(_) => xdg_toplevel::INTERFACE,
            Event::Popup(_) => xdg_popup::INTERFACE,
        }
    }

    /// Protocol name of this event
    pub fn name(&self) -> &'static str {
        match self {
            Event::WmBase(e) => e.name(),
            Event::Surface(e) => e.name(),
            Event::Toplevel(e) => e.name(),
            Event::Popup(e) => e.name(),
        }
    }

    /// Interface version that introduced this event
    pub fn since(&self) -> u32 {
        match self {
            Event::WmBase(e) => e.since(),
            Event::Surface(e) => e.since(),
            Event::Toplevel(e) => e.since(),
            Event::Popup(e) => e.since(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edges_wire_values() {
        assert_eq!(Edges::empty().to_wire(), Some(0));
        assert_eq!((Edges::BOTTOM | Edges::RIGHT).to_wire(), Some(8));
        assert_eq!((Edges::TOP | Edges::BOTTOM).to_wire(), None);
        assert_eq!(Edges::from_wire(6), Some(Edges::BOTTOM | Edges::LEFT));
        assert_eq!(Edges::from_wire(9), None);
    }

    #[test]
    fn edges_flip() {
        assert_eq!((Edges::TOP | Edges::LEFT).flip_x(), Edges::TOP | Edges::RIGHT);
        assert_eq!((Edges::TOP | Edges::LEFT).flip_y(), Edges::BOTTOM | Edges::LEFT);
        assert_eq!(Edges::empty().flip_x(), Edges::empty());
        assert_eq!(Edges::BOTTOM.flip_x(), Edges::BOTTOM);
    }

    #[test]
    fn contradictory_edges_are_invalid() {
        assert!(!(Edges::LEFT | Edges::RIGHT).is_valid());
        assert!(!(Edges::TOP | Edges::BOTTOM | Edges::LEFT).is_valid());
        assert!((Edges::TOP | Edges::RIGHT).is_valid());
    }

    #[test]
    fn toplevel_states_from_wire() {
        let states = ToplevelStates::from_wire(&[1, 4, 42]);
        assert_eq!(states, ToplevelStates::MAXIMIZED | ToplevelStates::ACTIVATED);
        assert_eq!(states.to_wire(), vec![1, 4]);
    }

    #[test]
    fn request_metadata() {
        let request = Request::Popup(xdg_popup::Request::Reposition {
            positioner: ObjectId::new(3),
            token: 7,
        });
        assert_eq!(request.interface(), "xdg_popup");
        assert_eq!(request.opcode(), 2);
        assert_eq!(request.since(), 3);
        assert_eq!(request.name(), "Reposition");
        assert!(!request.is_destructor());
        assert!(Request::Toplevel(xdg_toplevel::Request::Destroy).is_destructor());
    }
}

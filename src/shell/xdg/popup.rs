use std::fmt;

use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::protocol::{xdg_popup, xdg_surface, ObjectId, Request};
use crate::shell::{ProtocolViolation, ShellError};
use crate::transport::Transport;
use crate::utils::{Logical, Rectangle, Serial};

use super::configure::{AckOutcome, Configure, ConfigureTracker};
use super::{
    PopupHandle, Positioner, PositionerHandle, Role, ShellObject, SurfaceHandle, SurfaceRole, XdgShellSession,
    XdgSurface,
};

/// Callback receiving the events of a popup
pub type PopupListener = Box<dyn FnMut(&PopupHandle, &PopupEvent)>;

/// State of a popup proposed by the compositor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopupState {
    /// Position and size of the popup, relative to the window geometry of its parent
    pub geometry: Rectangle<i32, Logical>,
    /// Token of the reposition request this configure answers, if any
    pub reposition_token: Option<u32>,
}

/// Events delivered to a [`PopupListener`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopupEvent {
    /// A new proposal, to be acknowledged with
    /// [`XdgShellSession::ack_configure`] once applied
    Configure(Configure<PopupState>),
    /// The compositor dismissed the popup, it should be destroyed
    Done,
    /// The compositor processed the reposition request carrying `token`
    Repositioned {
        /// The token given to [`XdgShellSession::reposition`]
        token: u32,
    },
    /// The positioner of a reposition request is now in effect
    RepositionApplied {
        /// The token given to [`XdgShellSession::reposition`]
        token: u32,
    },
    /// The parent changed, this is where a reactive popup is now expected
    Reconstrained(Rectangle<i32, Logical>),
}

#[derive(Debug, Clone, Copy)]
struct PendingReposition {
    token: u32,
    positioner: Positioner,
    repositioned: bool,
    configure: Option<Serial>,
}

/// Client state of an `xdg_popup`
pub struct Popup {
    pub(super) id: ObjectId,
    pub(super) surface: ObjectId,
    pub(super) parent: ObjectId,
    positioner: Positioner,
    pub(super) configure: ConfigureTracker<PopupState>,
    pending: Option<Rectangle<i32, Logical>>,
    last_repositioned: Option<u32>,
    reposition: Option<PendingReposition>,
    constraint_bounds: Option<Rectangle<i32, Logical>>,
    grabbed: bool,
    done: bool,
    pub(super) destroyed: bool,
    listener: Option<PopupListener>,
}

impl fmt::Debug for Popup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Popup")
            .field("id", &self.id)
            .field("surface", &self.surface)
            .field("parent", &self.parent)
            .field("positioner", &self.positioner)
            .field("configure", &self.configure)
            .field("pending", &self.pending)
            .field("reposition", &self.reposition)
            .field("constraint_bounds", &self.constraint_bounds)
            .field("grabbed", &self.grabbed)
            .field("done", &self.done)
            .field("destroyed", &self.destroyed)
            .field("listener", &self.listener.as_ref().map(|_| "..."))
            .finish()
    }
}

impl Popup {
    fn new(id: ObjectId, surface: ObjectId, parent: ObjectId, positioner: Positioner) -> Popup {
        Popup {
            id,
            surface,
            parent,
            positioner,
            configure: ConfigureTracker::default(),
            pending: None,
            last_repositioned: None,
            reposition: None,
            constraint_bounds: None,
            grabbed: false,
            done: false,
            destroyed: false,
            listener: None,
        }
    }

    /// Handle of this popup
    pub fn handle(&self) -> PopupHandle {
        PopupHandle {
            id: self.id,
            surface: self.surface,
        }
    }

    /// The xdg_surface this popup is attached to
    pub fn parent(&self) -> ObjectId {
        self.parent
    }

    /// The positioner currently in effect
    ///
    /// A repositioned popup switches to its new positioner once the compositor
    /// answered and the matching configure was acknowledged.
    pub fn positioner(&self) -> &Positioner {
        &self.positioner
    }

    /// The configure handshake of this popup
    pub fn configure(&self) -> &ConfigureTracker<PopupState> {
        &self.configure
    }

    /// The geometry applied by the last acknowledgement
    pub fn current_geometry(&self) -> Option<Rectangle<i32, Logical>> {
        self.configure.current().map(|configure| configure.state.geometry)
    }

    /// Whether the first configure was acknowledged
    pub fn is_configured(&self) -> bool {
        self.configure.is_configured()
    }

    /// Whether a grab was requested for this popup
    pub fn is_grabbed(&self) -> bool {
        self.grabbed
    }

    /// Whether the compositor dismissed this popup
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Whether the role object was destroyed
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// The token of the reposition request the compositor has not answered yet
    pub fn outstanding_token(&self) -> Option<u32> {
        self.reposition
            .filter(|reposition| !reposition.repositioned)
            .map(|reposition| reposition.token)
    }

    /// Whether a reposition request is not fully applied yet
    pub fn is_repositioning(&self) -> bool {
        self.reposition.is_some()
    }

    /// The area the popup is expected to fit in, in the coordinate space of the anchor rectangle
    pub fn constraint_bounds(&self) -> Option<Rectangle<i32, Logical>> {
        self.constraint_bounds
    }

    /// Where the compositor is expected to place the popup
    ///
    /// This solves the positioner against the constraint bounds, or returns the
    /// unconstrained geometry if none were set. The compositor has the final word,
    /// the configured geometry may differ.
    pub fn expected_geometry(&self) -> Rectangle<i32, Logical> {
        match self.constraint_bounds {
            Some(bounds) => self.positioner.solve(bounds),
            None => self.positioner.geometry(),
        }
    }

    fn notify(&mut self, event: PopupEvent) {
        let handle = self.handle();
        if let Some(listener) = self.listener.as_mut() {
            listener(&handle, &event);
        }
    }

    pub(super) fn handle_event(&mut self, event: xdg_popup::Event) -> Result<(), ProtocolViolation> {
        if self.destroyed {
            trace!(popup = %self.id, event = event.name(), "discarding event for destroyed popup");
            return Ok(());
        }

        match event {
            xdg_popup::Event::Configure { x, y, width, height } => {
                if width <= 0 || height <= 0 {
                    return Err(ProtocolViolation::UnexpectedEvent {
                        object: self.id,
                        interface: xdg_popup::INTERFACE,
                        event: "Configure",
                    });
                }
                trace!(popup = %self.id, x, y, width, height, "popup configure");
                self.pending = Some(Rectangle::from((x, y, width, height)));
            }
            xdg_popup::Event::PopupDone => {
                if !self.done {
                    debug!(popup = %self.id, "popup dismissed");
                    self.done = true;
                    self.grabbed = false;
                    self.notify(PopupEvent::Done);
                }
            }
            xdg_popup::Event::Repositioned { token } => {
                let expected = self.outstanding_token();
                match self.reposition {
                    Some(ref mut reposition) if expected == Some(token) => reposition.repositioned = true,
                    _ => {
                        return Err(ProtocolViolation::UnknownRepositionToken {
                            popup: self.id,
                            token,
                            expected,
                        })
                    }
                }
                trace!(popup = %self.id, token, "repositioned");
                self.last_repositioned = Some(token);
                self.notify(PopupEvent::Repositioned { token });
                self.try_apply_reposition();
            }
        }
        Ok(())
    }

    /// Close the proposal started by the role configure
    pub(super) fn handle_configure(&mut self, serial: Serial) -> Result<(), ProtocolViolation> {
        if self.destroyed {
            trace!(popup = %self.id, %serial, "discarding configure for destroyed popup");
            return Ok(());
        }

        let geometry = self.pending.take().or_else(|| {
            self.configure
                .pending()
                .or_else(|| self.configure.current())
                .map(|configure| configure.state.geometry)
        });
        let Some(geometry) = geometry else {
            return Err(ProtocolViolation::UnexpectedEvent {
                object: self.surface,
                interface: xdg_surface::INTERFACE,
                event: "Configure",
            });
        };

        let state = PopupState {
            geometry,
            reposition_token: self.last_repositioned,
        };
        self.configure
            .configure(state, serial)
            .map_err(|serial| ProtocolViolation::StaleConfigure {
                object: self.surface,
                serial,
            })?;
        self.last_repositioned = None;
        if let Some(reposition) = self.reposition.as_mut() {
            reposition.configure = Some(serial);
        }
        self.notify(PopupEvent::Configure(Configure { state, serial }));
        Ok(())
    }

    /// Returns whether the applied geometry changed
    pub(super) fn acked(&mut self, serial: Serial) -> bool {
        let previous = self.current_geometry();
        let changed = match self.configure.ack(serial) {
            Some(AckOutcome::Applied(configure)) => {
                debug!(popup = %self.id, %serial, geometry = ?configure.state.geometry, "configure applied");
                previous != Some(configure.state.geometry)
            }
            _ => false,
        };
        self.try_apply_reposition();
        changed
    }

    /// Switch to the new positioner once the compositor answered and the following
    /// configure was acknowledged
    fn try_apply_reposition(&mut self) {
        let Some(reposition) = self.reposition else {
            return;
        };
        let acked = match (reposition.configure, self.configure.acked_serial()) {
            (Some(configure), Some(acked)) => acked.is_no_older_than(&configure),
            _ => false,
        };
        if !reposition.repositioned || !acked {
            return;
        }

        self.reposition = None;
        self.positioner = reposition.positioner;
        debug!(popup = %self.id, token = reposition.token, "reposition applied");
        self.notify(PopupEvent::RepositionApplied {
            token: reposition.token,
        });
    }

    /// Solve a reactive positioner again after a change of the parent
    pub(super) fn reconstrain(&mut self) {
        if self.done || self.destroyed || !self.positioner.reactive {
            return;
        }
        let Some(bounds) = self.constraint_bounds else {
            trace!(popup = %self.id, "reactive popup without constraint bounds");
            return;
        };
        let geometry = self.positioner.solve(bounds);
        debug!(popup = %self.id, ?geometry, "reconstrained reactive popup");
        self.notify(PopupEvent::Reconstrained(geometry));
    }
}

impl<T: Transport> XdgShellSession<T> {
    /// Assign the popup role to an xdg_surface
    ///
    /// The positioner state is copied, it can be modified or destroyed right after.
    pub fn get_popup(
        &mut self,
        surface: &SurfaceHandle,
        parent: &SurfaceHandle,
        positioner: &PositionerHandle,
    ) -> Result<PopupHandle, ShellError> {
        self.check_role(surface, Role::Popup)?;
        let snapshot = self.positioner_mut(positioner)?.validate()?;
        self.check_popup_parent(parent)?;

        let id = self.allocate_id();
        self.send(
            surface.id,
            Request::Surface(xdg_surface::Request::GetPopup {
                id,
                parent: Some(parent.id),
                positioner: positioner.0,
            }),
        )?;

        self.xdg_surface_mut(surface.id)?.role =
            SurfaceRole::Popup(Popup::new(id, surface.id, parent.id, snapshot));
        self.objects.insert(id, ShellObject::Popup { surface: surface.id });
        self.record_role(surface.wl_surface, Role::Popup);
        debug!(xdg_surface = %surface.id, popup = %id, parent = %parent.id, "assigned popup role");
        Ok(PopupHandle {
            id,
            surface: surface.id,
        })
    }

    fn check_popup_parent(&self, parent: &SurfaceHandle) -> Result<(), ShellError> {
        let invalid = |reason| ShellError::InvalidParent {
            parent: parent.id,
            reason,
        };
        let surface = self
            .xdg_surface(parent.id)
            .map_err(|_| invalid("the parent xdg_surface was destroyed"))?;
        match surface.role {
            SurfaceRole::None => Err(invalid("the parent has no role")),
            SurfaceRole::Toplevel(ref toplevel) if toplevel.destroyed => {
                Err(invalid("the parent role object was destroyed"))
            }
            SurfaceRole::Popup(ref popup) if popup.destroyed => Err(invalid("the parent role object was destroyed")),
            SurfaceRole::Popup(ref popup) if popup.done => Err(invalid("the parent popup was dismissed")),
            _ => Ok(()),
        }
    }

    /// Access the state of a popup, `None` once destroyed
    pub fn popup(&self, popup: &PopupHandle) -> Option<&Popup> {
        match self.xdg_surface(popup.surface).ok()?.role {
            SurfaceRole::Popup(ref state) if state.id == popup.id && !state.destroyed => Some(state),
            _ => None,
        }
    }

    pub(super) fn popup_mut(&mut self, popup: &PopupHandle) -> Result<&mut Popup, ShellError> {
        let surface = self
            .xdg_surface_mut(popup.surface)
            .map_err(|_| ShellError::AlreadyDestroyed(popup.id))?;
        match surface.role {
            SurfaceRole::Popup(ref mut state) if state.id == popup.id && !state.destroyed => Ok(state),
            _ => Err(ShellError::AlreadyDestroyed(popup.id)),
        }
    }

    /// Like [`Self::popup_mut`], refusing dismissed popups
    fn live_popup_mut(&mut self, popup: &PopupHandle) -> Result<&mut Popup, ShellError> {
        let state = self.popup_mut(popup)?;
        if state.done {
            return Err(ShellError::AlreadyDone(popup.id));
        }
        Ok(state)
    }

    /// Register the callback receiving the events of this popup
    ///
    /// Replaces any previous listener.
    pub fn set_popup_listener<F>(&mut self, popup: &PopupHandle, listener: F) -> Result<(), ShellError>
    where
        F: FnMut(&PopupHandle, &PopupEvent) + 'static,
    {
        self.popup_mut(popup)?.listener = Some(Box::new(listener));
        Ok(())
    }

    /// Set the area the popup is expected to fit in
    ///
    /// This is typically the output the parent is shown on, expressed relative to the parent
    /// window geometry. It is only used locally, by [`Popup::expected_geometry`] and to
    /// reconstrain reactive popups.
    pub fn set_popup_constraint_bounds(
        &mut self,
        popup: &PopupHandle,
        bounds: Option<Rectangle<i32, Logical>>,
    ) -> Result<(), ShellError> {
        self.popup_mut(popup)?.constraint_bounds = bounds;
        Ok(())
    }

    /// Request an explicit input grab for the popup, in response to the input event
    /// `serial` of `seat`
    ///
    /// Only the topmost popup of a chain can hold the grab. The compositor enforces it
    /// and dismisses the popup if the request is not acceptable.
    pub fn grab(&mut self, popup: &PopupHandle, seat: ObjectId, serial: Serial) -> Result<(), ShellError> {
        let state = self.live_popup_mut(popup)?;
        if state.grabbed {
            return Err(ShellError::AlreadyGrabbed(popup.id));
        }
        let parent = state.parent;
        if let Ok(XdgSurface {
            role: SurfaceRole::Popup(parent_popup),
            ..
        }) = self.xdg_surface(parent)
        {
            if !parent_popup.grabbed {
                debug!(
                    popup = %popup.id,
                    parent = %parent_popup.id,
                    "grab requested while the parent popup holds none, the compositor may dismiss it"
                );
            }
        }

        self.send(popup.id, Request::Popup(xdg_popup::Request::Grab { seat, serial }))?;
        self.popup_mut(popup)?.grabbed = true;
        Ok(())
    }

    /// Ask the compositor to place the popup again following `positioner`
    ///
    /// The popup keeps its current positioner until the compositor answered with
    /// `repositioned(token)` and the configure that follows was acknowledged. A new
    /// request supersedes the tracking of the previous one. Requires version 3.
    pub fn reposition(
        &mut self,
        popup: &PopupHandle,
        positioner: &PositionerHandle,
        token: u32,
    ) -> Result<(), ShellError> {
        self.live_popup_mut(popup)?;
        let snapshot = self.positioner_mut(positioner)?.validate()?;

        self.send(
            popup.id,
            Request::Popup(xdg_popup::Request::Reposition {
                positioner: positioner.0,
                token,
            }),
        )?;

        let state = self.popup_mut(popup)?;
        let previous = state.reposition.replace(PendingReposition {
            token,
            positioner: snapshot,
            repositioned: false,
            configure: None,
        });
        if let Some(previous) = previous {
            debug!(popup = %popup.id, previous = previous.token, token, "reposition superseded");
        }
        Ok(())
    }

    /// Destroy the popup role object
    ///
    /// Allowed once, even after the compositor dismissed the popup. Child popups
    /// must be destroyed first.
    pub fn destroy_popup(&mut self, popup: &PopupHandle) -> Result<(), ShellError> {
        self.popup_mut(popup)?;
        if !self.child_popups(popup.surface).is_empty() {
            return Err(ShellError::ChildrenAlive(popup.id));
        }

        self.send(popup.id, Request::Popup(xdg_popup::Request::Destroy))?;
        let state = self.popup_mut(popup)?;
        state.destroyed = true;
        state.grabbed = false;
        self.tombstone(popup.id);
        debug!(popup = %popup.id, "destroyed popup");
        Ok(())
    }

    /// The xdg_surfaces of the live popups whose parent is `parent`
    pub(super) fn child_popups(&self, parent: ObjectId) -> SmallVec<[ObjectId; 4]> {
        self.objects
            .iter()
            .filter_map(|(id, object)| match object {
                ShellObject::Surface(XdgSurface {
                    role: SurfaceRole::Popup(popup),
                    ..
                }) if popup.parent == parent && !popup.destroyed => Some(*id),
                _ => None,
            })
            .collect()
    }

    /// Solve the reactive children of `parent` again
    pub(super) fn reconstrain_children(&mut self, parent: ObjectId) {
        for child in self.child_popups(parent) {
            if let Ok(XdgSurface {
                role: SurfaceRole::Popup(popup),
                ..
            }) = self.xdg_surface_mut(child)
            {
                popup.reconstrain();
            }
        }
    }

    pub(super) fn handle_popup_event(&mut self, surface: ObjectId, event: xdg_popup::Event) -> Result<(), ShellError> {
        match self.xdg_surface_mut(surface)?.role {
            SurfaceRole::Popup(ref mut popup) => popup.handle_event(event).map_err(Into::into),
            _ => Ok(()),
        }
    }
}

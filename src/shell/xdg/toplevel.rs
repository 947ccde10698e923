use std::fmt;

use tracing::{debug, trace};

use crate::protocol::{xdg_surface, xdg_toplevel, ObjectId, Request, ResizeEdge, ToplevelStates, WmCapabilities};
use crate::shell::{ProtocolViolation, ShellError};
use crate::transport::Transport;
use crate::utils::{Logical, Point, Serial, Size};

use super::configure::{AckOutcome, Configure, ConfigureTracker};
use super::{Role, ShellObject, SurfaceHandle, SurfaceRole, ToplevelHandle, XdgShellSession};

/// Callback receiving the events of a toplevel
pub type ToplevelListener = Box<dyn FnMut(&ToplevelHandle, &ToplevelEvent)>;

/// State of a toplevel proposed by the compositor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ToplevelState {
    /// The suggested size of the window geometry, a zero dimension lets the client decide
    pub size: Size<i32, Logical>,
    /// The states of the window
    pub states: ToplevelStates,
}

impl ToplevelState {
    /// The size the application should use, if the compositor has an opinion
    ///
    /// Returns `None` when either dimension is zero: the application picks the size
    /// itself and must not resize to zero.
    pub fn suggested_size(&self) -> Option<Size<i32, Logical>> {
        if self.size.w > 0 && self.size.h > 0 {
            Some(self.size)
        } else {
            None
        }
    }
}

/// Events delivered to a [`ToplevelListener`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToplevelEvent {
    /// A new proposal, to be acknowledged with
    /// [`XdgShellSession::ack_configure`] once applied
    Configure(Configure<ToplevelState>),
    /// The user asked to close the window
    Close,
    /// Bounds the window geometry should fit in, `None` if unknown
    ConfigureBounds(Option<Size<i32, Logical>>),
    /// Window management features supported by the compositor
    WmCapabilities(WmCapabilities),
}

/// Properties of a toplevel set by the application
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToplevelAttributes {
    /// Title of the window
    pub title: Option<String>,
    /// Application identifier
    pub app_id: Option<String>,
    /// Minimum size, a zero dimension means unlimited
    pub min_size: Size<i32, Logical>,
    /// Maximum size, a zero dimension means unlimited
    pub max_size: Size<i32, Logical>,
    /// Parent window of a dialog
    pub parent: Option<ToplevelHandle>,
    /// The application asked to be maximized
    pub maximized: bool,
    /// The application asked to be fullscreen
    pub fullscreen: bool,
    /// The output requested for fullscreen
    pub fullscreen_output: Option<ObjectId>,
}

/// Client state of an `xdg_toplevel`
pub struct Toplevel {
    pub(super) id: ObjectId,
    pub(super) surface: ObjectId,
    pub(super) attributes: ToplevelAttributes,
    pub(super) configure: ConfigureTracker<ToplevelState>,
    pending: Option<ToplevelState>,
    bounds: Option<Size<i32, Logical>>,
    capabilities: Option<WmCapabilities>,
    close_requested: bool,
    pub(super) destroyed: bool,
    listener: Option<ToplevelListener>,
}

impl fmt::Debug for Toplevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Toplevel")
            .field("id", &self.id)
            .field("surface", &self.surface)
            .field("attributes", &self.attributes)
            .field("configure", &self.configure)
            .field("pending", &self.pending)
            .field("bounds", &self.bounds)
            .field("capabilities", &self.capabilities)
            .field("close_requested", &self.close_requested)
            .field("destroyed", &self.destroyed)
            .field("listener", &self.listener.as_ref().map(|_| "..."))
            .finish()
    }
}

impl Toplevel {
    fn new(id: ObjectId, surface: ObjectId) -> Toplevel {
        Toplevel {
            id,
            surface,
            attributes: ToplevelAttributes::default(),
            configure: ConfigureTracker::default(),
            pending: None,
            bounds: None,
            capabilities: None,
            close_requested: false,
            destroyed: false,
            listener: None,
        }
    }

    /// Handle of this toplevel
    pub fn handle(&self) -> ToplevelHandle {
        ToplevelHandle {
            id: self.id,
            surface: self.surface,
        }
    }

    /// Attributes set by the application
    pub fn attributes(&self) -> &ToplevelAttributes {
        &self.attributes
    }

    /// The configure handshake of this toplevel
    pub fn configure(&self) -> &ConfigureTracker<ToplevelState> {
        &self.configure
    }

    /// The last state applied by an acknowledgement
    pub fn current_state(&self) -> ToplevelState {
        self.configure
            .current()
            .map(|configure| configure.state)
            .unwrap_or_default()
    }

    /// The size the application should use, see [`ToplevelState::suggested_size`]
    pub fn suggested_size(&self) -> Option<Size<i32, Logical>> {
        self.current_state().suggested_size()
    }

    /// Whether the first configure was acknowledged
    pub fn is_configured(&self) -> bool {
        self.configure.is_configured()
    }

    /// The last bounds announced by the compositor
    pub fn bounds(&self) -> Option<Size<i32, Logical>> {
        self.bounds
    }

    /// Capabilities announced by the compositor
    ///
    /// Without announcement every capability is assumed.
    pub fn capabilities(&self) -> WmCapabilities {
        self.capabilities.unwrap_or_else(WmCapabilities::all)
    }

    /// Whether the compositor asked to close the window
    pub fn close_requested(&self) -> bool {
        self.close_requested
    }

    /// Whether the role object was destroyed
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    fn notify(&mut self, event: ToplevelEvent) {
        let handle = self.handle();
        if let Some(listener) = self.listener.as_mut() {
            listener(&handle, &event);
        }
    }

    pub(super) fn handle_event(&mut self, event: xdg_toplevel::Event) -> Result<(), ProtocolViolation> {
        if self.destroyed {
            trace!(toplevel = %self.id, event = event.name(), "discarding event for destroyed toplevel");
            return Ok(());
        }

        match event {
            xdg_toplevel::Event::Configure { width, height, states } => {
                if width < 0 || height < 0 {
                    return Err(ProtocolViolation::UnexpectedEvent {
                        object: self.id,
                        interface: xdg_toplevel::INTERFACE,
                        event: "Configure",
                    });
                }
                trace!(toplevel = %self.id, width, height, ?states, "toplevel configure");
                self.pending = Some(ToplevelState {
                    size: (width, height).into(),
                    states,
                });
            }
            xdg_toplevel::Event::Close => {
                debug!(toplevel = %self.id, "close requested");
                self.close_requested = true;
                self.notify(ToplevelEvent::Close);
            }
            xdg_toplevel::Event::ConfigureBounds { width, height } => {
                let bounds = if width > 0 && height > 0 {
                    Some((width, height).into())
                } else {
                    None
                };
                self.bounds = bounds;
                self.notify(ToplevelEvent::ConfigureBounds(bounds));
            }
            xdg_toplevel::Event::WmCapabilities { capabilities } => {
                self.capabilities = Some(capabilities);
                self.notify(ToplevelEvent::WmCapabilities(capabilities));
            }
        }
        Ok(())
    }

    /// Close the proposal started by the role configure
    pub(super) fn handle_configure(&mut self, serial: Serial) -> Result<(), ProtocolViolation> {
        if self.destroyed {
            trace!(toplevel = %self.id, %serial, "discarding configure for destroyed toplevel");
            return Ok(());
        }

        let state = match self.pending.take() {
            Some(state) => state,
            None => self
                .configure
                .pending()
                .map(|configure| configure.state)
                .unwrap_or_else(|| self.current_state()),
        };
        self.configure
            .configure(state, serial)
            .map_err(|serial| ProtocolViolation::StaleConfigure {
                object: self.surface,
                serial,
            })?;
        self.notify(ToplevelEvent::Configure(Configure { state, serial }));
        Ok(())
    }

    /// Returns whether the applied size changed
    pub(super) fn acked(&mut self, serial: Serial) -> bool {
        let previous = self.current_state();
        match self.configure.ack(serial) {
            Some(AckOutcome::Applied(configure)) => {
                debug!(toplevel = %self.id, %serial, state = ?configure.state, "configure applied");
                previous.size != configure.state.size
            }
            _ => false,
        }
    }
}

/// Sizes must not be negative and a non zero max must not be smaller than the min
fn check_size_bounds(min: Size<i32, Logical>, max: Size<i32, Logical>) -> Result<(), ShellError> {
    let too_small = |min: i32, max: i32| max != 0 && min > max;
    if too_small(min.w, max.w) || too_small(min.h, max.h) {
        return Err(ShellError::InvalidSize {
            width: min.w,
            height: min.h,
        });
    }
    Ok(())
}

impl<T: Transport> XdgShellSession<T> {
    /// Assign the toplevel role to an xdg_surface
    pub fn get_toplevel(&mut self, surface: &SurfaceHandle) -> Result<ToplevelHandle, ShellError> {
        self.check_role(surface, Role::Toplevel)?;

        let id = self.allocate_id();
        self.send(surface.id, Request::Surface(xdg_surface::Request::GetToplevel { id }))?;

        self.xdg_surface_mut(surface.id)?.role = SurfaceRole::Toplevel(Toplevel::new(id, surface.id));
        self.objects
            .insert(id, ShellObject::Toplevel { surface: surface.id });
        self.record_role(surface.wl_surface, Role::Toplevel);
        debug!(xdg_surface = %surface.id, toplevel = %id, "assigned toplevel role");
        Ok(ToplevelHandle {
            id,
            surface: surface.id,
        })
    }

    /// Access the state of a toplevel, `None` once destroyed
    pub fn toplevel(&self, toplevel: &ToplevelHandle) -> Option<&Toplevel> {
        match self.xdg_surface(toplevel.surface).ok()?.role {
            SurfaceRole::Toplevel(ref state) if state.id == toplevel.id && !state.destroyed => Some(state),
            _ => None,
        }
    }

    pub(super) fn toplevel_mut(&mut self, toplevel: &ToplevelHandle) -> Result<&mut Toplevel, ShellError> {
        let surface = self
            .xdg_surface_mut(toplevel.surface)
            .map_err(|_| ShellError::AlreadyDestroyed(toplevel.id))?;
        match surface.role {
            SurfaceRole::Toplevel(ref mut state) if state.id == toplevel.id && !state.destroyed => Ok(state),
            _ => Err(ShellError::AlreadyDestroyed(toplevel.id)),
        }
    }

    fn toplevel_request(
        &mut self,
        toplevel: &ToplevelHandle,
        request: xdg_toplevel::Request,
    ) -> Result<&mut Toplevel, ShellError> {
        self.toplevel_mut(toplevel)?;
        self.send(toplevel.id, Request::Toplevel(request))?;
        self.toplevel_mut(toplevel)
    }

    /// Register the callback receiving the events of this toplevel
    ///
    /// Replaces any previous listener.
    pub fn set_toplevel_listener<F>(&mut self, toplevel: &ToplevelHandle, listener: F) -> Result<(), ShellError>
    where
        F: FnMut(&ToplevelHandle, &ToplevelEvent) + 'static,
    {
        self.toplevel_mut(toplevel)?.listener = Some(Box::new(listener));
        Ok(())
    }

    /// Set the title of the window
    pub fn set_title(&mut self, toplevel: &ToplevelHandle, title: impl Into<String>) -> Result<(), ShellError> {
        let title = title.into();
        let request = xdg_toplevel::Request::SetTitle { title: title.clone() };
        self.toplevel_request(toplevel, request)?.attributes.title = Some(title);
        Ok(())
    }

    /// Set the application identifier of the window
    pub fn set_app_id(&mut self, toplevel: &ToplevelHandle, app_id: impl Into<String>) -> Result<(), ShellError> {
        let app_id = app_id.into();
        let request = xdg_toplevel::Request::SetAppId {
            app_id: app_id.clone(),
        };
        self.toplevel_request(toplevel, request)?.attributes.app_id = Some(app_id);
        Ok(())
    }

    /// Set or clear the parent of the window
    pub fn set_parent(
        &mut self,
        toplevel: &ToplevelHandle,
        parent: Option<&ToplevelHandle>,
    ) -> Result<(), ShellError> {
        if let Some(parent) = parent {
            if parent == toplevel {
                return Err(ShellError::InvalidParent {
                    parent: parent.id,
                    reason: "a toplevel cannot be its own parent",
                });
            }
            if self.toplevel(parent).is_none() {
                return Err(ShellError::InvalidParent {
                    parent: parent.id,
                    reason: "the parent toplevel was destroyed",
                });
            }
        }
        self.toplevel_request(
            toplevel,
            xdg_toplevel::Request::SetParent {
                parent: parent.map(|parent| parent.id),
            },
        )?
        .attributes
        .parent = parent.copied();
        Ok(())
    }

    /// Set the minimum size of the window geometry, zero meaning unlimited
    pub fn set_min_size(&mut self, toplevel: &ToplevelHandle, size: Size<i32, Logical>) -> Result<(), ShellError> {
        if size.w < 0 || size.h < 0 {
            return Err(ShellError::InvalidSize {
                width: size.w,
                height: size.h,
            });
        }
        check_size_bounds(size, self.toplevel_mut(toplevel)?.attributes.max_size)?;
        self.toplevel_request(
            toplevel,
            xdg_toplevel::Request::SetMinSize {
                width: size.w,
                height: size.h,
            },
        )?
        .attributes
        .min_size = size;
        Ok(())
    }

    /// Set the maximum size of the window geometry, zero meaning unlimited
    pub fn set_max_size(&mut self, toplevel: &ToplevelHandle, size: Size<i32, Logical>) -> Result<(), ShellError> {
        if size.w < 0 || size.h < 0 {
            return Err(ShellError::InvalidSize {
                width: size.w,
                height: size.h,
            });
        }
        check_size_bounds(self.toplevel_mut(toplevel)?.attributes.min_size, size)?;
        self.toplevel_request(
            toplevel,
            xdg_toplevel::Request::SetMaxSize {
                width: size.w,
                height: size.h,
            },
        )?
        .attributes
        .max_size = size;
        Ok(())
    }

    /// Ask for the window to be maximized or unmaximized
    ///
    /// The compositor answers with a configure, if at all.
    pub fn set_maximized(&mut self, toplevel: &ToplevelHandle, maximized: bool) -> Result<(), ShellError> {
        let request = if maximized {
            xdg_toplevel::Request::SetMaximized
        } else {
            xdg_toplevel::Request::UnsetMaximized
        };
        self.toplevel_request(toplevel, request)?.attributes.maximized = maximized;
        Ok(())
    }

    /// Ask for the window to be unmaximized
    pub fn unset_maximized(&mut self, toplevel: &ToplevelHandle) -> Result<(), ShellError> {
        self.set_maximized(toplevel, false)
    }

    /// Ask for the window to be fullscreen, optionally on a given `wl_output`
    pub fn set_fullscreen(&mut self, toplevel: &ToplevelHandle, output: Option<ObjectId>) -> Result<(), ShellError> {
        let state = self.toplevel_request(toplevel, xdg_toplevel::Request::SetFullscreen { output })?;
        state.attributes.fullscreen = true;
        state.attributes.fullscreen_output = output;
        Ok(())
    }

    /// Ask for the window to leave fullscreen
    pub fn unset_fullscreen(&mut self, toplevel: &ToplevelHandle) -> Result<(), ShellError> {
        let state = self.toplevel_request(toplevel, xdg_toplevel::Request::UnsetFullscreen)?;
        state.attributes.fullscreen = false;
        state.attributes.fullscreen_output = None;
        Ok(())
    }

    /// Ask for the window to be minimized
    pub fn set_minimized(&mut self, toplevel: &ToplevelHandle) -> Result<(), ShellError> {
        self.toplevel_request(toplevel, xdg_toplevel::Request::SetMinimized)?;
        Ok(())
    }

    /// Start an interactive move, in response to the input event `serial` of `seat`
    pub fn request_move(&mut self, toplevel: &ToplevelHandle, seat: ObjectId, serial: Serial) -> Result<(), ShellError> {
        self.toplevel_request(toplevel, xdg_toplevel::Request::Move { seat, serial })?;
        Ok(())
    }

    /// Start an interactive resize from `edge`, in response to the input event `serial` of `seat`
    pub fn request_resize(
        &mut self,
        toplevel: &ToplevelHandle,
        seat: ObjectId,
        serial: Serial,
        edge: ResizeEdge,
    ) -> Result<(), ShellError> {
        self.toplevel_request(
            toplevel,
            xdg_toplevel::Request::Resize {
                seat,
                serial,
                edges: edge,
            },
        )?;
        Ok(())
    }

    /// Show the window menu at `location`, relative to the window geometry
    pub fn show_window_menu(
        &mut self,
        toplevel: &ToplevelHandle,
        seat: ObjectId,
        serial: Serial,
        location: Point<i32, Logical>,
    ) -> Result<(), ShellError> {
        self.toplevel_request(
            toplevel,
            xdg_toplevel::Request::ShowWindowMenu {
                seat,
                serial,
                x: location.x,
                y: location.y,
            },
        )?;
        Ok(())
    }

    /// Destroy the toplevel role object
    ///
    /// The xdg_surface stays alive and keeps its role, it can only be destroyed afterwards.
    /// Popups parented to this window must be destroyed first.
    pub fn destroy_toplevel(&mut self, toplevel: &ToplevelHandle) -> Result<(), ShellError> {
        self.toplevel_mut(toplevel)?;
        if !self.child_popups(toplevel.surface).is_empty() {
            return Err(ShellError::ChildrenAlive(toplevel.id));
        }

        self.toplevel_request(toplevel, xdg_toplevel::Request::Destroy)?.destroyed = true;
        self.tombstone(toplevel.id);

        // dialogs of this window lose their parent
        for object in self.objects.values_mut() {
            if let ShellObject::Surface(surface) = object {
                if let SurfaceRole::Toplevel(ref mut child) = surface.role {
                    if child.attributes.parent.as_ref() == Some(toplevel) {
                        child.attributes.parent = None;
                    }
                }
            }
        }
        debug!(toplevel = %toplevel.id, "destroyed toplevel");
        Ok(())
    }

    pub(super) fn handle_toplevel_event(
        &mut self,
        surface: ObjectId,
        event: xdg_toplevel::Event,
    ) -> Result<(), ShellError> {
        match self.xdg_surface_mut(surface)?.role {
            SurfaceRole::Toplevel(ref mut toplevel) => toplevel.handle_event(event).map_err(Into::into),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toplevel() -> Toplevel {
        Toplevel::new(ObjectId::new(5), ObjectId::new(4))
    }

    #[test]
    fn zero_size_lets_the_client_decide() {
        let state = ToplevelState {
            size: (0, 0).into(),
            states: ToplevelStates::empty(),
        };
        assert_eq!(state.suggested_size(), None);
        let state = ToplevelState {
            size: (0, 600).into(),
            states: ToplevelStates::empty(),
        };
        assert_eq!(state.suggested_size(), None);
    }

    #[test]
    fn role_configure_is_completed_by_surface_configure() {
        let mut toplevel = toplevel();
        toplevel
            .handle_event(xdg_toplevel::Event::Configure {
                width: 800,
                height: 600,
                states: ToplevelStates::ACTIVATED,
            })
            .unwrap();
        assert!(toplevel.configure().pending().is_none());

        toplevel.handle_configure(Serial::from(1)).unwrap();
        let pending = toplevel.configure().pending().unwrap();
        assert_eq!(pending.state.size, Size::from((800, 600)));
        assert_eq!(pending.state.states, ToplevelStates::ACTIVATED);
        assert!(!toplevel.is_configured());

        assert!(toplevel.acked(Serial::from(1)));
        assert!(toplevel.is_configured());
        assert_eq!(toplevel.suggested_size(), Some(Size::from((800, 600))));
    }

    #[test]
    fn listener_sees_configure_and_close() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let events = Rc::new(RefCell::new(Vec::new()));
        let mut toplevel = toplevel();
        let seen = events.clone();
        toplevel.listener = Some(Box::new(move |_: &ToplevelHandle, event: &ToplevelEvent| {
            seen.borrow_mut().push(event.clone())
        }));

        toplevel
            .handle_event(xdg_toplevel::Event::Configure {
                width: 0,
                height: 0,
                states: ToplevelStates::empty(),
            })
            .unwrap();
        toplevel.handle_configure(Serial::from(3)).unwrap();
        toplevel.handle_event(xdg_toplevel::Event::Close).unwrap();

        let events = events.borrow();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], ToplevelEvent::Configure(Configure { serial, .. }) if serial == Serial::from(3)));
        assert_eq!(events[1], ToplevelEvent::Close);
        assert!(toplevel.close_requested());
    }

    #[test]
    fn negative_configure_is_a_violation() {
        let mut toplevel = toplevel();
        assert!(toplevel
            .handle_event(xdg_toplevel::Event::Configure {
                width: -1,
                height: 10,
                states: ToplevelStates::empty(),
            })
            .is_err());
    }

    #[test]
    fn capabilities_default_to_everything() {
        let mut toplevel = toplevel();
        assert_eq!(toplevel.capabilities(), WmCapabilities::all());
        toplevel
            .handle_event(xdg_toplevel::Event::WmCapabilities {
                capabilities: WmCapabilities::MAXIMIZE,
            })
            .unwrap();
        assert_eq!(toplevel.capabilities(), WmCapabilities::MAXIMIZE);
    }

    #[test]
    fn min_larger_than_max_is_rejected() {
        assert!(check_size_bounds((100, 100).into(), (50, 0).into()).is_err());
        assert!(check_size_bounds((100, 100).into(), (0, 0).into()).is_ok());
        assert!(check_size_bounds((100, 100).into(), (100, 200).into()).is_ok());
    }
}

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, trace, warn};

use crate::protocol::{xdg_surface, xdg_wm_base, Event, ObjectId, Request};
use crate::shell::{ProtocolViolation, ShellError};
use crate::transport::Transport;
use crate::utils::{Logical, Rectangle, Serial};

use super::configure::AckKind;
use super::{Role, ShellObject, SurfaceHandle, SurfaceRole, XdgSurface};

/// Highest `xdg_wm_base` version handled by the session
pub const XDG_WM_BASE_VERSION: u32 = 6;

/// Last identity of the client side range
const CLIENT_ID_MAX: u32 = 0xfeff_ffff;

/// Configuration of an [`XdgShellSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XdgShellConfig {
    /// The version `xdg_wm_base` was bound with
    ///
    /// Requests introduced by a later version fail with
    /// [`ShellError::Unsupported`].
    pub version: u32,
    /// Answer `ping` automatically
    ///
    /// When disabled, the serial is kept until [`XdgShellSession::pong`] is called.
    pub auto_pong: bool,
    /// First identity the session allocates for new objects
    pub first_id: u32,
}

impl Default for XdgShellConfig {
    fn default() -> Self {
        XdgShellConfig {
            version: XDG_WM_BASE_VERSION,
            auto_pong: true,
            first_id: 2,
        }
    }
}

#[derive(Debug, Default)]
struct WlSurfaceData {
    role: Option<Role>,
    xdg_surface: Option<ObjectId>,
}

#[derive(Debug, Clone, Copy)]
enum Target {
    Surface,
    Toplevel(ObjectId),
    Popup(ObjectId),
}

/// The client side of an `xdg_wm_base` global and of all the objects created from it
///
/// The session allocates the identities of the objects it creates, sends their requests
/// through its [`Transport`] and routes the events of the compositor back to them.
///
/// An identity stays reserved after its destroy request until the compositor confirms the
/// destruction with `wl_display.delete_id`, see [`XdgShellSession::handle_delete_id`].
/// Events reaching it in the meantime are discarded.
#[derive(Debug)]
pub struct XdgShellSession<T> {
    pub(super) transport: T,
    pub(super) config: XdgShellConfig,
    pub(super) wm_base: ObjectId,
    pub(super) objects: IndexMap<ObjectId, ShellObject>,
    pub(super) tombstones: IndexSet<ObjectId>,
    next_id: u32,
    wl_surfaces: IndexMap<ObjectId, WlSurfaceData>,
    pending_ping: Option<Serial>,
}

impl<T: Transport> XdgShellSession<T> {
    /// Create a session for the already bound `xdg_wm_base` object `wm_base`
    pub fn new(transport: T, wm_base: ObjectId, mut config: XdgShellConfig) -> XdgShellSession<T> {
        if config.version == 0 || config.version > XDG_WM_BASE_VERSION {
            warn!(
                version = config.version,
                "unsupported xdg_wm_base version, using {}", XDG_WM_BASE_VERSION
            );
            config.version = config.version.clamp(1, XDG_WM_BASE_VERSION);
        }
        let first_id = config.first_id.clamp(1, CLIENT_ID_MAX);
        XdgShellSession {
            transport,
            config,
            wm_base,
            objects: IndexMap::new(),
            tombstones: IndexSet::new(),
            next_id: first_id,
            wl_surfaces: IndexMap::new(),
            pending_ping: None,
        }
    }

    /// The configuration of this session
    pub fn config(&self) -> &XdgShellConfig {
        &self.config
    }

    /// The bound `xdg_wm_base` version
    pub fn version(&self) -> u32 {
        self.config.version
    }

    /// Identity of the `xdg_wm_base` object
    pub fn wm_base(&self) -> ObjectId {
        self.wm_base
    }

    /// Access the transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutable access to the transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Whether `id` was destroyed and waits for `delete_id`
    pub fn is_tombstoned(&self, id: ObjectId) -> bool {
        self.tombstones.contains(&id)
    }

    pub(super) fn allocate_id(&mut self) -> ObjectId {
        loop {
            let id = ObjectId::new(self.next_id);
            self.next_id = if self.next_id >= CLIENT_ID_MAX {
                self.config.first_id.clamp(1, CLIENT_ID_MAX)
            } else {
                self.next_id + 1
            };
            if id != self.wm_base
                && !self.objects.contains_key(&id)
                && !self.tombstones.contains(&id)
                && !self.wl_surfaces.contains_key(&id)
            {
                return id;
            }
        }
    }

    /// Hand a request to the transport
    ///
    /// Nothing is sent for destroyed objects or for requests the bound version does not know.
    pub(super) fn send(&mut self, object: ObjectId, request: Request) -> Result<(), ShellError> {
        if self.tombstones.contains(&object) {
            return Err(ShellError::AlreadyDestroyed(object));
        }
        let since = request.since();
        if since > self.config.version {
            return Err(ShellError::Unsupported {
                request: request.name(),
                since,
                version: self.config.version,
            });
        }

        trace!(%object, interface = request.interface(), request = request.name(), "sending request");
        self.transport.send_request(object, request)?;
        Ok(())
    }

    /// Forget an identity after its destroy request was sent
    pub(super) fn tombstone(&mut self, id: ObjectId) {
        self.objects.shift_remove(&id);
        self.tombstones.insert(id);
    }

    pub(super) fn xdg_surface(&self, id: ObjectId) -> Result<&XdgSurface, ShellError> {
        match self.objects.get(&id) {
            Some(ShellObject::Surface(surface)) => Ok(surface),
            _ => Err(ShellError::AlreadyDestroyed(id)),
        }
    }

    pub(super) fn xdg_surface_mut(&mut self, id: ObjectId) -> Result<&mut XdgSurface, ShellError> {
        match self.objects.get_mut(&id) {
            Some(ShellObject::Surface(surface)) => Ok(surface),
            _ => Err(ShellError::AlreadyDestroyed(id)),
        }
    }

    /// Check that `surface` can receive the role `role`
    ///
    /// The role of a wl_surface outlives its xdg_surface.
    pub(super) fn check_role(&self, surface: &SurfaceHandle, role: Role) -> Result<(), ShellError> {
        let xdg_surface = self.xdg_surface(surface.id)?;
        if let Some(existing) = xdg_surface.role() {
            return Err(ShellError::InvalidRole {
                surface: surface.id,
                role: existing,
            });
        }
        match self.wl_surfaces.get(&xdg_surface.wl_surface).and_then(|data| data.role) {
            Some(existing) if existing != role => Err(ShellError::InvalidRole {
                surface: xdg_surface.wl_surface,
                role: existing,
            }),
            _ => Ok(()),
        }
    }

    pub(super) fn record_role(&mut self, wl_surface: ObjectId, role: Role) {
        self.wl_surfaces.entry(wl_surface).or_default().role = Some(role);
    }

    /// Create an xdg_surface for the `wl_surface` identified by `wl_surface`
    ///
    /// The wl_surface must not have a live xdg_surface already.
    pub fn get_xdg_surface(&mut self, wl_surface: ObjectId) -> Result<SurfaceHandle, ShellError> {
        if let Some(existing) = self.wl_surfaces.get(&wl_surface).and_then(|data| data.xdg_surface) {
            debug!(%wl_surface, xdg_surface = %existing, "wl_surface already has an xdg_surface");
            return Err(ShellError::AlreadyConstructed(wl_surface));
        }

        // reserve the foreign identity before allocating ours
        self.wl_surfaces.entry(wl_surface).or_default();
        let id = self.allocate_id();
        self.send(
            self.wm_base,
            Request::WmBase(xdg_wm_base::Request::GetXdgSurface {
                id,
                surface: wl_surface,
            }),
        )?;
        self.objects
            .insert(id, ShellObject::Surface(XdgSurface::new(wl_surface)));
        self.wl_surfaces.entry(wl_surface).or_default().xdg_surface = Some(id);
        trace!(%wl_surface, xdg_surface = %id, "created xdg_surface");
        Ok(SurfaceHandle { id, wl_surface })
    }

    /// The role of an xdg_surface, `None` if it has none or was destroyed
    pub fn role(&self, surface: &SurfaceHandle) -> Option<Role> {
        self.xdg_surface(surface.id).ok()?.role()
    }

    /// The window geometry last set on an xdg_surface
    pub fn window_geometry(&self, surface: &SurfaceHandle) -> Option<Rectangle<i32, Logical>> {
        self.xdg_surface(surface.id).ok()?.window_geometry
    }

    /// Set the part of the surface that is the window, excluding decorations like shadows
    ///
    /// Reactive popups of this surface are reconstrained when the geometry changes.
    pub fn set_window_geometry(
        &mut self,
        surface: &SurfaceHandle,
        geometry: Rectangle<i32, Logical>,
    ) -> Result<(), ShellError> {
        if geometry.size.w <= 0 || geometry.size.h <= 0 {
            return Err(ShellError::InvalidSize {
                width: geometry.size.w,
                height: geometry.size.h,
            });
        }
        self.xdg_surface(surface.id)?;
        self.send(
            surface.id,
            Request::Surface(xdg_surface::Request::SetWindowGeometry {
                x: geometry.loc.x,
                y: geometry.loc.y,
                width: geometry.size.w,
                height: geometry.size.h,
            }),
        )?;

        let previous = self.xdg_surface_mut(surface.id)?.window_geometry.replace(geometry);
        if previous != Some(geometry) {
            self.reconstrain_children(surface.id);
        }
        Ok(())
    }

    /// Acknowledge the configure `serial` of a surface
    ///
    /// This tells the compositor that the next commit of the surface matches the proposal
    /// and every older one. Acknowledging a serial already covered by a previous
    /// acknowledgement sends nothing.
    pub fn ack_configure(&mut self, surface: &SurfaceHandle, serial: Serial) -> Result<(), ShellError> {
        let kind = match self.xdg_surface(surface.id)?.role {
            SurfaceRole::None => None,
            SurfaceRole::Toplevel(ref toplevel) if toplevel.destroyed => {
                return Err(ShellError::AlreadyDestroyed(toplevel.id))
            }
            SurfaceRole::Toplevel(ref toplevel) => toplevel.configure.check_ack(serial),
            SurfaceRole::Popup(ref popup) if popup.destroyed => return Err(ShellError::AlreadyDestroyed(popup.id)),
            SurfaceRole::Popup(ref popup) => popup.configure.check_ack(serial),
        };
        let kind = kind.ok_or(ProtocolViolation::UnknownSerial {
            object: surface.id,
            serial,
        })?;
        if kind == AckKind::Covered {
            trace!(xdg_surface = %surface.id, %serial, "configure already acked");
            return Ok(());
        }

        self.send(surface.id, Request::Surface(xdg_surface::Request::AckConfigure { serial }))?;

        let changed = match self.xdg_surface_mut(surface.id)?.role {
            SurfaceRole::Toplevel(ref mut toplevel) => toplevel.acked(serial),
            SurfaceRole::Popup(ref mut popup) => popup.acked(serial),
            SurfaceRole::None => false,
        };
        if changed {
            self.reconstrain_children(surface.id);
        }
        Ok(())
    }

    /// Destroy an xdg_surface
    ///
    /// Its role object and its child popups must be destroyed first. The role of the
    /// wl_surface is remembered: a new xdg_surface for it can only get the same role.
    pub fn destroy_surface(&mut self, surface: &SurfaceHandle) -> Result<(), ShellError> {
        let role_alive = match self.xdg_surface(surface.id)?.role {
            SurfaceRole::None => false,
            SurfaceRole::Toplevel(ref toplevel) => !toplevel.destroyed,
            SurfaceRole::Popup(ref popup) => !popup.destroyed,
        };
        if role_alive || !self.child_popups(surface.id).is_empty() {
            return Err(ShellError::ChildrenAlive(surface.id));
        }

        self.send(surface.id, Request::Surface(xdg_surface::Request::Destroy))?;
        self.tombstone(surface.id);
        if let Some(data) = self.wl_surfaces.get_mut(&surface.wl_surface) {
            data.xdg_surface = None;
        }
        debug!(xdg_surface = %surface.id, "destroyed xdg_surface");
        Ok(())
    }

    /// Forget a wl_surface destroyed by the application
    ///
    /// Its xdg_surface must have been destroyed before.
    pub fn wl_surface_destroyed(&mut self, wl_surface: ObjectId) -> Result<(), ShellError> {
        if let Some(xdg_surface) = self.wl_surfaces.get(&wl_surface).and_then(|data| data.xdg_surface) {
            debug!(%wl_surface, %xdg_surface, "wl_surface destroyed before its xdg_surface");
            return Err(ShellError::ChildrenAlive(wl_surface));
        }
        self.wl_surfaces.shift_remove(&wl_surface);
        Ok(())
    }

    /// Destroy the `xdg_wm_base` object
    ///
    /// Every xdg_surface must be destroyed first.
    pub fn destroy_wm_base(&mut self) -> Result<(), ShellError> {
        if self
            .objects
            .values()
            .any(|object| matches!(object, ShellObject::Surface(_)))
        {
            return Err(ShellError::ChildrenAlive(self.wm_base));
        }
        self.send(self.wm_base, Request::WmBase(xdg_wm_base::Request::Destroy))?;
        self.tombstones.insert(self.wm_base);
        debug!(wm_base = %self.wm_base, "destroyed xdg_wm_base");
        Ok(())
    }

    /// The ping waiting for [`XdgShellSession::pong`], when automatic pongs are disabled
    pub fn pending_ping(&self) -> Option<Serial> {
        self.pending_ping
    }

    /// Answer the pending ping `serial`
    pub fn pong(&mut self, serial: Serial) -> Result<(), ShellError> {
        if self.pending_ping != Some(serial) {
            return Err(ProtocolViolation::UnknownSerial {
                object: self.wm_base,
                serial,
            }
            .into());
        }
        self.send(self.wm_base, Request::WmBase(xdg_wm_base::Request::Pong { serial }))?;
        self.pending_ping = None;
        Ok(())
    }

    fn handle_ping(&mut self, serial: Serial) -> Result<(), ShellError> {
        if self.config.auto_pong {
            trace!(%serial, "answering ping");
            self.send(self.wm_base, Request::WmBase(xdg_wm_base::Request::Pong { serial }))
        } else {
            debug!(%serial, "ping waiting for the application");
            self.pending_ping = Some(serial);
            Ok(())
        }
    }

    /// The compositor released the identity `id`
    ///
    /// Call this for every `wl_display.delete_id` event. Identities the session does not
    /// know about are ignored.
    pub fn handle_delete_id(&mut self, id: ObjectId) {
        if self.tombstones.shift_remove(&id) {
            trace!(%id, "identity released");
        }
    }

    /// Route an event of the compositor to the object `object`
    ///
    /// Errors are protocol violations (or transport failures of automatic replies). They are
    /// logged and concern only the targeted object, the session stays usable.
    pub fn dispatch(&mut self, object: ObjectId, event: Event) -> Result<(), ShellError> {
        let result = self.route_event(object, event);
        if let Err(ref err) = result {
            warn!(%object, error = %err, "failed to handle event");
        }
        result
    }

    fn route_event(&mut self, object: ObjectId, event: Event) -> Result<(), ShellError> {
        let unexpected = |event: &Event| ProtocolViolation::UnexpectedEvent {
            object,
            interface: event.interface(),
            event: event.name(),
        };

        if self.tombstones.contains(&object) {
            trace!(%object, event = event.name(), "discarding event for destroyed object");
            return Ok(());
        }
        if event.since() > self.config.version {
            return Err(unexpected(&event).into());
        }

        if object == self.wm_base {
            return match event {
                Event::WmBase(xdg_wm_base::Event::Ping { serial }) => self.handle_ping(serial),
                other => Err(unexpected(&other).into()),
            };
        }

        let target = match self.objects.get(&object) {
            Some(ShellObject::Surface(_)) => Target::Surface,
            Some(ShellObject::Toplevel { surface }) => Target::Toplevel(*surface),
            Some(ShellObject::Popup { surface }) => Target::Popup(*surface),
            Some(ShellObject::Positioner(_)) => return Err(unexpected(&event).into()),
            None => return Err(ProtocolViolation::UnknownObject(object).into()),
        };
        trace!(%object, interface = event.interface(), event = event.name(), "dispatching event");

        match (target, event) {
            (Target::Surface, Event::Surface(xdg_surface::Event::Configure { serial })) => {
                self.handle_surface_configure(object, serial)
            }
            (Target::Toplevel(surface), Event::Toplevel(event)) => self.handle_toplevel_event(surface, event),
            (Target::Popup(surface), Event::Popup(event)) => self.handle_popup_event(surface, event),
            (_, event) => Err(unexpected(&event).into()),
        }
    }

    fn handle_surface_configure(&mut self, surface: ObjectId, serial: Serial) -> Result<(), ShellError> {
        match self.xdg_surface_mut(surface)?.role {
            SurfaceRole::None => Err(ProtocolViolation::UnexpectedEvent {
                object: surface,
                interface: xdg_surface::INTERFACE,
                event: "Configure",
            }
            .into()),
            SurfaceRole::Toplevel(ref mut toplevel) => toplevel.handle_configure(serial).map_err(Into::into),
            SurfaceRole::Popup(ref mut popup) => popup.handle_configure(serial).map_err(Into::into),
        }
    }
}

use std::cell::RefCell;
use std::rc::Rc;

use xdgsmith::protocol::{
    xdg_popup, xdg_surface, xdg_toplevel, xdg_wm_base, ConstraintAdjustment, Edges, Event, ObjectId, Request,
    ToplevelStates,
};
use xdgsmith::shell::xdg::{
    ConfigureState, PopupEvent, PopupHandle, PositionerHandle, Role, SurfaceHandle, ToplevelEvent, ToplevelHandle,
    XdgShellConfig, XdgShellSession,
};
use xdgsmith::shell::{PositionerError, ProtocolViolation, ShellError};
use xdgsmith::transport::{RecordingTransport, TransportError};
use xdgsmith::utils::{Point, Rectangle, Serial, Size};

const WM_BASE: ObjectId = ObjectId::new(1);

type Session = XdgShellSession<RecordingTransport>;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn session() -> Session {
    init_logging();
    XdgShellSession::new(RecordingTransport::new(), WM_BASE, XdgShellConfig::default())
}

fn sent(session: &Session) -> usize {
    session.transport().sent().len()
}

fn toplevel(session: &mut Session, wl_surface: u32) -> (SurfaceHandle, ToplevelHandle) {
    let surface = session.get_xdg_surface(ObjectId::new(wl_surface)).unwrap();
    let toplevel = session.get_toplevel(&surface).unwrap();
    (surface, toplevel)
}

fn menu_positioner(session: &mut Session) -> PositionerHandle {
    let positioner = session.create_positioner().unwrap();
    session.set_positioner_size(&positioner, 50, 30).unwrap();
    session
        .set_positioner_anchor_rect(&positioner, Rectangle::from((0, 0, 100, 20)))
        .unwrap();
    session.set_positioner_anchor(&positioner, Edges::BOTTOM).unwrap();
    session.set_positioner_gravity(&positioner, Edges::BOTTOM).unwrap();
    positioner
}

fn popup(
    session: &mut Session,
    wl_surface: u32,
    parent: &SurfaceHandle,
    positioner: &PositionerHandle,
) -> (SurfaceHandle, PopupHandle) {
    let surface = session.get_xdg_surface(ObjectId::new(wl_surface)).unwrap();
    let popup = session.get_popup(&surface, parent, positioner).unwrap();
    (surface, popup)
}

fn configure_toplevel(session: &mut Session, toplevel: &ToplevelHandle, size: (i32, i32), states: ToplevelStates, serial: u32) {
    session
        .dispatch(
            toplevel.id(),
            Event::Toplevel(xdg_toplevel::Event::Configure {
                width: size.0,
                height: size.1,
                states,
            }),
        )
        .unwrap();
    session
        .dispatch(
            toplevel.xdg_surface(),
            Event::Surface(xdg_surface::Event::Configure {
                serial: Serial::from(serial),
            }),
        )
        .unwrap();
}

fn configure_popup(session: &mut Session, popup: &PopupHandle, rect: (i32, i32, i32, i32), serial: u32) {
    session
        .dispatch(
            popup.id(),
            Event::Popup(xdg_popup::Event::Configure {
                x: rect.0,
                y: rect.1,
                width: rect.2,
                height: rect.3,
            }),
        )
        .unwrap();
    session
        .dispatch(
            popup.xdg_surface(),
            Event::Surface(xdg_surface::Event::Configure {
                serial: Serial::from(serial),
            }),
        )
        .unwrap();
}

fn record_popup_events(session: &mut Session, popup: &PopupHandle) -> Rc<RefCell<Vec<PopupEvent>>> {
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    session
        .set_popup_listener(popup, move |_, event| sink.borrow_mut().push(event.clone()))
        .unwrap();
    events
}

#[test]
fn toplevel_configure_handshake() {
    let mut session = session();
    let (surface, toplevel) = toplevel(&mut session, 10);

    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    session
        .set_toplevel_listener(&toplevel, move |_, event| sink.borrow_mut().push(event.clone()))
        .unwrap();

    configure_toplevel(&mut session, &toplevel, (800, 600), ToplevelStates::ACTIVATED, 1);
    configure_toplevel(
        &mut session,
        &toplevel,
        (1024, 768),
        ToplevelStates::MAXIMIZED | ToplevelStates::ACTIVATED,
        2,
    );
    assert_eq!(events.borrow().len(), 2);
    assert!(!session.toplevel(&toplevel).unwrap().is_configured());

    let before = sent(&session);
    session.ack_configure(&surface, Serial::from(2)).unwrap();
    assert_eq!(
        session.transport().last(),
        Some(&(
            surface.id(),
            Request::Surface(xdg_surface::Request::AckConfigure {
                serial: Serial::from(2)
            })
        ))
    );

    let state = session.toplevel(&toplevel).unwrap();
    assert!(state.is_configured());
    assert_eq!(state.configure().state(), ConfigureState::Acked);
    assert_eq!(state.suggested_size(), Some(Size::from((1024, 768))));
    assert!(state.current_state().states.contains(ToplevelStates::MAXIMIZED));

    // already covered by the ack of 2
    session.ack_configure(&surface, Serial::from(1)).unwrap();
    session.ack_configure(&surface, Serial::from(2)).unwrap();
    assert_eq!(sent(&session), before + 1);

    assert!(matches!(
        session.ack_configure(&surface, Serial::from(5)),
        Err(ShellError::ProtocolViolation(ProtocolViolation::UnknownSerial { .. }))
    ));
}

#[test]
fn acking_a_superseded_configure_keeps_the_newest_pending() {
    let mut session = session();
    let (surface, toplevel) = toplevel(&mut session, 10);

    configure_toplevel(&mut session, &toplevel, (800, 600), ToplevelStates::empty(), 1);
    configure_toplevel(&mut session, &toplevel, (640, 480), ToplevelStates::empty(), 2);
    session.ack_configure(&surface, Serial::from(1)).unwrap();

    let state = session.toplevel(&toplevel).unwrap();
    assert_eq!(state.configure().state(), ConfigureState::Acked);
    assert_eq!(state.configure().acked_serial(), Some(Serial::from(1)));
    assert!(state.configure().needs_ack());

    session.ack_configure(&surface, Serial::from(2)).unwrap();
    let state = session.toplevel(&toplevel).unwrap();
    assert!(!state.configure().needs_ack());
    assert_eq!(state.suggested_size(), Some(Size::from((640, 480))));
}

#[test]
fn serial_never_received_is_not_acked() {
    let mut session = session();
    let (surface, toplevel) = toplevel(&mut session, 10);

    configure_toplevel(&mut session, &toplevel, (800, 600), ToplevelStates::empty(), 10);
    configure_toplevel(&mut session, &toplevel, (640, 480), ToplevelStates::empty(), 20);

    let before = sent(&session);
    assert!(matches!(
        session.ack_configure(&surface, Serial::from(15)),
        Err(ShellError::ProtocolViolation(ProtocolViolation::UnknownSerial { serial, .. })) if serial == Serial::from(15)
    ));
    assert_eq!(sent(&session), before);
    let state = session.toplevel(&toplevel).unwrap();
    assert_eq!(state.configure().acked_serial(), None);
    assert!(!state.is_configured());

    session.ack_configure(&surface, Serial::from(10)).unwrap();
    assert_eq!(sent(&session), before + 1);
}

#[test]
fn zero_size_configure_lets_the_client_choose() {
    let mut session = session();
    let (surface, toplevel) = toplevel(&mut session, 10);
    configure_toplevel(&mut session, &toplevel, (0, 0), ToplevelStates::empty(), 1);
    session.ack_configure(&surface, Serial::from(1)).unwrap();
    assert_eq!(session.toplevel(&toplevel).unwrap().suggested_size(), None);
}

#[test]
fn toplevel_requests_update_attributes() {
    let mut session = session();
    let (_, toplevel) = toplevel(&mut session, 10);
    let (_, dialog) = self::toplevel(&mut session, 11);

    session.set_title(&toplevel, "Editor").unwrap();
    assert_eq!(
        session.transport().last(),
        Some(&(
            toplevel.id(),
            Request::Toplevel(xdg_toplevel::Request::SetTitle {
                title: "Editor".into()
            })
        ))
    );
    session.set_app_id(&toplevel, "org.example.editor").unwrap();
    session.set_min_size(&toplevel, Size::from((200, 100))).unwrap();
    session.set_maximized(&toplevel, true).unwrap();
    session.set_parent(&dialog, Some(&toplevel)).unwrap();

    assert!(matches!(
        session.set_max_size(&toplevel, Size::from((100, 100))),
        Err(ShellError::InvalidSize { .. })
    ));

    let attributes = session.toplevel(&toplevel).unwrap().attributes();
    assert_eq!(attributes.title.as_deref(), Some("Editor"));
    assert_eq!(attributes.app_id.as_deref(), Some("org.example.editor"));
    assert_eq!(attributes.min_size, Size::from((200, 100)));
    assert!(attributes.maximized);
    assert_eq!(
        session.toplevel(&dialog).unwrap().attributes().parent,
        Some(toplevel)
    );

    session.destroy_toplevel(&toplevel).unwrap();
    assert_eq!(session.toplevel(&dialog).unwrap().attributes().parent, None);
}

#[test]
fn destroyed_toplevel_rejects_requests_locally() {
    let mut session = session();
    let (surface, toplevel) = toplevel(&mut session, 10);

    assert!(matches!(
        session.destroy_surface(&surface),
        Err(ShellError::ChildrenAlive(id)) if id == surface.id()
    ));

    session.destroy_toplevel(&toplevel).unwrap();
    assert_eq!(
        session.transport().last(),
        Some(&(toplevel.id(), Request::Toplevel(xdg_toplevel::Request::Destroy)))
    );
    let before = sent(&session);

    assert!(matches!(
        session.set_title(&toplevel, "late"),
        Err(ShellError::AlreadyDestroyed(id)) if id == toplevel.id()
    ));
    assert!(matches!(
        session.destroy_toplevel(&toplevel),
        Err(ShellError::AlreadyDestroyed(_))
    ));
    assert_eq!(sent(&session), before);

    // trailing events are discarded until the compositor releases the identity
    session
        .dispatch(toplevel.id(), Event::Toplevel(xdg_toplevel::Event::Close))
        .unwrap();
    session.handle_delete_id(toplevel.id());
    assert!(matches!(
        session.dispatch(toplevel.id(), Event::Toplevel(xdg_toplevel::Event::Close)),
        Err(ShellError::ProtocolViolation(ProtocolViolation::UnknownObject(_)))
    ));

    session.destroy_surface(&surface).unwrap();
    assert!(session.is_tombstoned(surface.id()));
}

#[test]
fn close_is_only_a_notification() {
    let mut session = session();
    let (_, toplevel) = toplevel(&mut session, 10);
    let closed = Rc::new(RefCell::new(false));
    let sink = closed.clone();
    session
        .set_toplevel_listener(&toplevel, move |_, event| {
            if *event == ToplevelEvent::Close {
                *sink.borrow_mut() = true;
            }
        })
        .unwrap();

    session
        .dispatch(toplevel.id(), Event::Toplevel(xdg_toplevel::Event::Close))
        .unwrap();
    assert!(*closed.borrow());
    let state = session.toplevel(&toplevel).unwrap();
    assert!(state.close_requested());
    assert!(!state.is_destroyed());
}

#[test]
fn role_is_permanent() {
    let mut session = session();
    let (parent, _) = toplevel(&mut session, 10);
    let (surface, toplevel) = toplevel(&mut session, 11);
    let positioner = menu_positioner(&mut session);

    assert!(matches!(
        session.get_popup(&surface, &parent, &positioner),
        Err(ShellError::InvalidRole { role: Role::Toplevel, .. })
    ));
    assert!(matches!(
        session.get_toplevel(&surface),
        Err(ShellError::InvalidRole { role: Role::Toplevel, .. })
    ));

    session.destroy_toplevel(&toplevel).unwrap();
    session.destroy_surface(&surface).unwrap();

    // the wl_surface keeps its role across xdg_surfaces
    let surface = session.get_xdg_surface(ObjectId::new(11)).unwrap();
    assert!(matches!(
        session.get_popup(&surface, &parent, &positioner),
        Err(ShellError::InvalidRole { surface: wl_surface, role: Role::Toplevel }) if wl_surface == ObjectId::new(11)
    ));
    session.get_toplevel(&surface).unwrap();
    assert_eq!(session.role(&surface), Some(Role::Toplevel));
}

#[test]
fn popup_creation_is_validated() {
    let mut session = session();
    let (parent, _) = toplevel(&mut session, 10);

    let incomplete = session.create_positioner().unwrap();
    session
        .set_positioner_anchor_rect(&incomplete, Rectangle::from((0, 0, 10, 10)))
        .unwrap();
    let surface = session.get_xdg_surface(ObjectId::new(11)).unwrap();
    assert!(matches!(
        session.get_popup(&surface, &parent, &incomplete),
        Err(ShellError::InvalidPositioner(PositionerError::MissingSize))
    ));

    assert!(matches!(
        session.set_positioner_size(&incomplete, 0, 10),
        Err(ShellError::InvalidPositioner(PositionerError::InvalidSize { .. }))
    ));
    assert!(matches!(
        session.set_positioner_gravity(&incomplete, Edges::TOP | Edges::BOTTOM),
        Err(ShellError::InvalidPositioner(PositionerError::ContradictoryGravity(_)))
    ));

    let positioner = menu_positioner(&mut session);
    let roleless = session.get_xdg_surface(ObjectId::new(12)).unwrap();
    assert!(matches!(
        session.get_popup(&surface, &roleless, &positioner),
        Err(ShellError::InvalidParent { .. })
    ));

    // a dismissed popup cannot be a parent
    let (menu_surface, menu) = popup(&mut session, 13, &parent, &positioner);
    session
        .dispatch(menu.id(), Event::Popup(xdg_popup::Event::PopupDone))
        .unwrap();
    assert!(matches!(
        session.get_popup(&surface, &menu_surface, &positioner),
        Err(ShellError::InvalidParent { parent, .. }) if parent == menu_surface.id()
    ));

    // nothing was assigned by the failed attempts
    assert_eq!(session.role(&surface), None);
}

#[test]
fn positioner_is_copied_into_the_popup() {
    let mut session = session();
    let (parent, _) = toplevel(&mut session, 10);
    let positioner = menu_positioner(&mut session);
    let (_, popup) = popup(&mut session, 11, &parent, &positioner);

    session.set_positioner_size(&positioner, 500, 500).unwrap();
    session.destroy_positioner(&positioner).unwrap();

    let state = session.popup(&popup).unwrap();
    assert_eq!(state.positioner().rect_size, Size::from((50, 30)));
    assert_eq!(state.expected_geometry(), Rectangle::from((25, 20, 50, 30)));
    assert!(session.positioner(&positioner).is_none());
}

#[test]
fn done_popup_only_accepts_destroy() {
    let mut session = session();
    let (parent, _) = toplevel(&mut session, 10);
    let positioner = menu_positioner(&mut session);
    let (surface, popup) = popup(&mut session, 11, &parent, &positioner);
    let seat = ObjectId::new(50);

    session.grab(&popup, seat, Serial::from(20)).unwrap();
    assert!(matches!(
        session.grab(&popup, seat, Serial::from(21)),
        Err(ShellError::AlreadyGrabbed(_))
    ));

    let events = record_popup_events(&mut session, &popup);
    session
        .dispatch(popup.id(), Event::Popup(xdg_popup::Event::PopupDone))
        .unwrap();
    assert_eq!(*events.borrow(), vec![PopupEvent::Done]);
    assert!(session.popup(&popup).unwrap().is_done());

    let before = sent(&session);
    assert!(matches!(
        session.grab(&popup, seat, Serial::from(22)),
        Err(ShellError::AlreadyDone(_))
    ));
    assert!(matches!(
        session.reposition(&popup, &positioner, 1),
        Err(ShellError::AlreadyDone(_))
    ));
    assert_eq!(sent(&session), before);

    session.destroy_popup(&popup).unwrap();
    assert!(matches!(
        session.destroy_popup(&popup),
        Err(ShellError::AlreadyDestroyed(_))
    ));
    session.destroy_surface(&surface).unwrap();
}

#[test]
fn child_popups_are_destroyed_first() {
    let mut session = session();
    let (parent, _) = toplevel(&mut session, 10);
    let positioner = menu_positioner(&mut session);
    let (menu_surface, menu) = popup(&mut session, 11, &parent, &positioner);
    let (submenu_surface, submenu) = popup(&mut session, 12, &menu_surface, &positioner);

    assert!(matches!(
        session.destroy_popup(&menu),
        Err(ShellError::ChildrenAlive(id)) if id == menu.id()
    ));

    session.destroy_popup(&submenu).unwrap();
    session.destroy_surface(&submenu_surface).unwrap();
    session.destroy_popup(&menu).unwrap();
    session.destroy_surface(&menu_surface).unwrap();
}

#[test]
fn toplevel_outlives_its_popups() {
    let mut session = session();
    let (parent, window) = toplevel(&mut session, 10);
    let positioner = menu_positioner(&mut session);
    let (menu_surface, menu) = popup(&mut session, 11, &parent, &positioner);

    let before = sent(&session);
    assert!(matches!(
        session.destroy_toplevel(&window),
        Err(ShellError::ChildrenAlive(id)) if id == window.id()
    ));
    assert_eq!(sent(&session), before);
    assert!(!session.toplevel(&window).unwrap().is_destroyed());
    assert!(session.popup(&menu).is_some());

    session.destroy_popup(&menu).unwrap();
    session.destroy_surface(&menu_surface).unwrap();
    session.destroy_toplevel(&window).unwrap();
    session.destroy_surface(&parent).unwrap();
}

#[test]
fn reposition_waits_for_repositioned_and_ack() {
    let mut session = session();
    let (parent, _) = toplevel(&mut session, 10);
    let positioner = menu_positioner(&mut session);
    let (surface, popup) = popup(&mut session, 11, &parent, &positioner);
    configure_popup(&mut session, &popup, (25, 20, 50, 30), 1);
    session.ack_configure(&surface, Serial::from(1)).unwrap();

    let moved = menu_positioner(&mut session);
    session
        .set_positioner_offset(&moved, (0, 10).into())
        .unwrap();
    let events = record_popup_events(&mut session, &popup);

    session.reposition(&popup, &moved, 7).unwrap();
    assert_eq!(
        session.transport().last(),
        Some(&(
            popup.id(),
            Request::Popup(xdg_popup::Request::Reposition {
                positioner: moved.id(),
                token: 7
            })
        ))
    );
    assert_eq!(session.popup(&popup).unwrap().outstanding_token(), Some(7));

    assert!(matches!(
        session.dispatch(popup.id(), Event::Popup(xdg_popup::Event::Repositioned { token: 6 })),
        Err(ShellError::ProtocolViolation(ProtocolViolation::UnknownRepositionToken {
            token: 6,
            expected: Some(7),
            ..
        }))
    ));
    assert_eq!(session.popup(&popup).unwrap().outstanding_token(), Some(7));

    session
        .dispatch(popup.id(), Event::Popup(xdg_popup::Event::Repositioned { token: 7 }))
        .unwrap();
    assert_eq!(session.popup(&popup).unwrap().outstanding_token(), None);
    configure_popup(&mut session, &popup, (25, 30, 50, 30), 2);
    assert_eq!(session.popup(&popup).unwrap().positioner().offset, Point::from((0, 0)));

    session.ack_configure(&surface, Serial::from(2)).unwrap();
    let state = session.popup(&popup).unwrap();
    assert!(!state.is_repositioning());
    assert_eq!(state.positioner().offset, Point::from((0, 10)));
    assert_eq!(state.current_geometry(), Some(Rectangle::from((25, 30, 50, 30))));

    let events = events.borrow();
    assert_eq!(events[0], PopupEvent::Repositioned { token: 7 });
    assert!(matches!(events[1], PopupEvent::Configure(ref configure) if configure.state.reposition_token == Some(7)));
    assert_eq!(events[2], PopupEvent::RepositionApplied { token: 7 });
}

#[test]
fn reactive_popup_follows_its_parent() {
    let mut session = session();
    let (parent, _) = toplevel(&mut session, 10);
    let positioner = menu_positioner(&mut session);
    session.set_positioner_reactive(&positioner).unwrap();
    session
        .set_positioner_constraint_adjustment(&positioner, ConstraintAdjustment::SLIDE_X)
        .unwrap();
    let (_, popup) = popup(&mut session, 11, &parent, &positioner);
    session
        .set_popup_constraint_bounds(&popup, Some(Rectangle::from((0, 0, 40, 200))))
        .unwrap();
    let events = record_popup_events(&mut session, &popup);

    session
        .set_window_geometry(&parent, Rectangle::from((0, 0, 300, 200)))
        .unwrap();
    assert_eq!(
        *events.borrow(),
        vec![PopupEvent::Reconstrained(Rectangle::from((0, 20, 50, 30)))]
    );

    // unchanged geometry, nothing to do
    session
        .set_window_geometry(&parent, Rectangle::from((0, 0, 300, 200)))
        .unwrap();
    assert_eq!(events.borrow().len(), 1);
}

#[test]
fn transport_failure_leaves_state_untouched() {
    let mut session = session();
    let (_, toplevel) = toplevel(&mut session, 10);
    session.transport_mut().set_disconnected(true);

    assert!(matches!(
        session.set_title(&toplevel, "lost"),
        Err(ShellError::Transport(TransportError::Disconnected))
    ));
    assert!(matches!(
        session.destroy_toplevel(&toplevel),
        Err(ShellError::Transport(_))
    ));
    let state = session.toplevel(&toplevel).unwrap();
    assert_eq!(state.attributes().title, None);
    assert!(!state.is_destroyed());

    session.transport_mut().set_disconnected(false);
    session.destroy_toplevel(&toplevel).unwrap();
}

#[test]
fn events_for_unknown_or_mismatched_objects() {
    let mut session = session();
    let (surface, toplevel) = toplevel(&mut session, 10);

    assert!(matches!(
        session.dispatch(ObjectId::new(999), Event::Popup(xdg_popup::Event::PopupDone)),
        Err(ShellError::ProtocolViolation(ProtocolViolation::UnknownObject(_)))
    ));
    assert!(matches!(
        session.dispatch(toplevel.id(), Event::Popup(xdg_popup::Event::PopupDone)),
        Err(ShellError::ProtocolViolation(ProtocolViolation::UnexpectedEvent { .. }))
    ));
    // configure serials only move forward
    configure_toplevel(&mut session, &toplevel, (10, 10), ToplevelStates::empty(), 5);
    assert!(matches!(
        session.dispatch(
            surface.id(),
            Event::Surface(xdg_surface::Event::Configure {
                serial: Serial::from(4)
            })
        ),
        Err(ShellError::ProtocolViolation(ProtocolViolation::StaleConfigure { .. }))
    ));

    // the session stays usable
    session.ack_configure(&surface, Serial::from(5)).unwrap();
}

#[test]
fn ping_is_answered_automatically() {
    let mut session = session();
    session
        .dispatch(
            WM_BASE,
            Event::WmBase(xdg_wm_base::Event::Ping {
                serial: Serial::from(3),
            }),
        )
        .unwrap();
    assert_eq!(
        session.transport().last(),
        Some(&(
            WM_BASE,
            Request::WmBase(xdg_wm_base::Request::Pong {
                serial: Serial::from(3)
            })
        ))
    );
}

#[test]
fn wm_base_is_destroyed_last() {
    let mut session = session();
    let (surface, toplevel) = toplevel(&mut session, 10);
    assert!(matches!(
        session.destroy_wm_base(),
        Err(ShellError::ChildrenAlive(id)) if id == WM_BASE
    ));

    session.destroy_toplevel(&toplevel).unwrap();
    session.destroy_surface(&surface).unwrap();
    session.wl_surface_destroyed(surface.wl_surface()).unwrap();
    session.destroy_wm_base().unwrap();
    assert!(matches!(
        session.create_positioner(),
        Err(ShellError::AlreadyDestroyed(id)) if id == WM_BASE
    ));
}

#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

//! # xdgsmith: the client side of xdg-shell
//!
//! This crate implements the state machines a Wayland client needs to drive the `xdg_shell`
//! protocol: placing popups with positioners, negotiating window geometry with the compositor
//! through the configure/acknowledge handshake, and keeping track of toplevel windows and
//! popup chains. It does not talk to a socket, does not draw anything and does not handle
//! input; those are provided by the application.
//!
//! ## Structure of the crate
//!
//! - [`protocol`] describes the requests and events of the xdg-shell interfaces.
//! - [`transport`] defines the [`Transport`](transport::Transport) trait the session sends its
//!   requests through.
//! - [`shell`] contains the session itself, in [`shell::xdg`], and the error types.
//! - [`utils`] holds the geometry and serial types shared by the above.
//!
//! ## General principles
//!
//! ### One session, one thread
//!
//! An [`XdgShellSession`](shell::xdg::XdgShellSession) owns every shell object created from one
//! `xdg_wm_base` global. It is driven from a single thread: the application calls its methods to
//! issue requests, and feeds it the events read from the connection with
//! [`dispatch`](shell::xdg::XdgShellSession::dispatch), one at a time. Nothing blocks and nothing
//! is retried.
//!
//! Requests are validated locally before being handed to the transport, so a failed operation
//! never leaves the session half updated. Protocol violations coming from the compositor are
//! reported from `dispatch` and only affect the object they target.
//!
//! ### Logging
//!
//! xdgsmith makes extensive use of [`tracing`] for its internal logging.
//!
//! For release builds it is recommended to limit the log level during compile time.
//! This can be done by adding a dependency to [`tracing`] and enabling the corresponding features.
//! For example to enable `trace` messages for debug builds, but limit release builds to `debug` add
//! the following in your binary crate `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! tracing = { version = "0.1", features = ["max_level_trace", "release_max_level_debug"] }
//! ```

pub mod protocol;
pub mod shell;
pub mod transport;
pub mod utils;

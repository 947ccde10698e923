use smallvec::SmallVec;
use tracing::trace;

use crate::utils::Serial;

/// A configure proposal received from the compositor
///
/// `state` is the role specific part of the proposal, completed by the serial of the
/// `xdg_surface.configure` event that closed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Configure<S> {
    /// The proposed state
    pub state: S,
    /// The serial to acknowledge it with
    pub serial: Serial,
}

/// Progress of the configure handshake of a surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigureState {
    /// No configure was ever received, the surface must not attach a buffer yet
    Unconfigured,
    /// A proposal is waiting for an acknowledgement
    Pending,
    /// The latest acknowledgement sent covers every proposal received so far, or the newest
    /// proposal is still waiting (see [`ConfigureTracker::needs_ack`])
    Acked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AckKind {
    /// The serial of the newest proposal
    Latest,
    /// An older proposal that was superseded before being acknowledged
    Superseded,
    /// Already covered by a previous acknowledgement, nothing to send
    Covered,
}

#[derive(Debug)]
pub(crate) enum AckOutcome<S> {
    Applied(Configure<S>),
    Superseded,
    Covered,
}

/// Buffer of configure proposals for one surface
///
/// Only the newest unacknowledged proposal is kept: a new configure replaces the pending one.
/// Acknowledging a serial implicitly acknowledges every older one. Compositor serials are
/// global to the connection, so the serials a surface actually received are remembered
/// individually: those still waiting for an acknowledgement, and the last few covered ones.
#[derive(Debug)]
pub struct ConfigureTracker<S> {
    state: ConfigureState,
    pending: Option<Configure<S>>,
    current: Option<Configure<S>>,
    last_serial: Option<Serial>,
    acked_serial: Option<Serial>,
    unacked: SmallVec<[Serial; 4]>,
    covered: SmallVec<[Serial; 4]>,
}

/// How many serials are remembered in each of the unacked and covered sets
const MAX_TRACKED_SERIALS: usize = 16;

fn truncate_oldest(serials: &mut SmallVec<[Serial; 4]>) {
    if serials.len() > MAX_TRACKED_SERIALS {
        let excess = serials.len() - MAX_TRACKED_SERIALS;
        serials.drain(..excess);
    }
}

impl<S> Default for ConfigureTracker<S> {
    fn default() -> Self {
        ConfigureTracker {
            state: ConfigureState::Unconfigured,
            pending: None,
            current: None,
            last_serial: None,
            acked_serial: None,
            unacked: SmallVec::new(),
            covered: SmallVec::new(),
        }
    }
}

impl<S: Clone> ConfigureTracker<S> {
    /// Progress of the handshake
    pub fn state(&self) -> ConfigureState {
        self.state
    }

    /// The newest proposal not acknowledged yet
    pub fn pending(&self) -> Option<&Configure<S>> {
        self.pending.as_ref()
    }

    /// The last proposal applied by an acknowledgement
    pub fn current(&self) -> Option<&Configure<S>> {
        self.current.as_ref()
    }

    /// The serial of the last acknowledgement sent
    pub fn acked_serial(&self) -> Option<Serial> {
        self.acked_serial
    }

    /// The serial of the newest proposal received
    pub fn last_serial(&self) -> Option<Serial> {
        self.last_serial
    }

    /// Whether at least one proposal was acknowledged
    ///
    /// Until then, the surface must not attach a buffer.
    pub fn is_configured(&self) -> bool {
        self.acked_serial.is_some()
    }

    /// Whether a proposal is waiting for an acknowledgement
    pub fn needs_ack(&self) -> bool {
        self.pending.is_some()
    }

    /// Record a new proposal, superseding the pending one
    ///
    /// Fails with the offending serial if it is not newer than the last one received.
    pub(crate) fn configure(&mut self, state: S, serial: Serial) -> Result<(), Serial> {
        if let Some(last) = self.last_serial {
            if serial <= last {
                return Err(serial);
            }
        }

        self.last_serial = Some(serial);
        self.unacked.push(serial);
        truncate_oldest(&mut self.unacked);
        self.state = ConfigureState::Pending;
        if let Some(superseded) = self.pending.replace(Configure { state, serial }) {
            trace!(serial = %superseded.serial, "configure superseded before being acked");
        }
        Ok(())
    }

    /// Classify an acknowledgement without changing anything
    ///
    /// Returns `None` for a serial this surface never received, even if it lies between
    /// two serials it did receive.
    pub(crate) fn check_ack(&self, serial: Serial) -> Option<AckKind> {
        if self.covered.contains(&serial) {
            return Some(AckKind::Covered);
        }
        if !self.unacked.contains(&serial) {
            return None;
        }

        match self.pending {
            Some(ref pending) if pending.serial == serial => Some(AckKind::Latest),
            _ => Some(AckKind::Superseded),
        }
    }

    /// Move every received serial up to `serial` from the unacked set to the covered set
    fn cover(&mut self, serial: Serial) {
        let mut unacked = SmallVec::new();
        for received in self.unacked.drain(..) {
            if serial.is_no_older_than(&received) {
                self.covered.push(received);
            } else {
                unacked.push(received);
            }
        }
        self.unacked = unacked;
        truncate_oldest(&mut self.covered);
        self.acked_serial = Some(serial);
        self.state = ConfigureState::Acked;
    }

    /// Acknowledge `serial`
    ///
    /// Acking the newest proposal applies it. Acking an older one only moves the acknowledged
    /// serial forward, the newest proposal stays pending.
    pub(crate) fn ack(&mut self, serial: Serial) -> Option<AckOutcome<S>> {
        let outcome = match self.check_ack(serial)? {
            AckKind::Covered => AckOutcome::Covered,
            AckKind::Superseded => {
                self.cover(serial);
                AckOutcome::Superseded
            }
            AckKind::Latest => {
                self.cover(serial);
                let applied = self.pending.take()?;
                self.current = Some(applied.clone());
                AckOutcome::Applied(applied)
            }
        };
        Some(outcome)
    }
}

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Level 1: connection state. Only meaningful for explicit (paired) links;
/// the auto link rejects level-1 queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnState {
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
    Broken,
}

/// Level 2: operation state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MainState {
    Ready,
    BusyCbProcEvt,
    BusySubEvt,
    BusyUnsubEvt,
    Undefined,
}

impl MainState {
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            MainState::BusyCbProcEvt | MainState::BusySubEvt | MainState::BusyUnsubEvt
        )
    }
}

/// Level 3: role-specific detail substate
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubState {
    Default,
    CmdInitiatorReady,
    CmdInitiatorBusyExecCmd,
    CmdExecutorReady,
    CmdExecutorBusyExecCmd,
    DatSenderReady,
    DatSenderBusySendDat,
    DatReceiverReady,
    DatReceiverBusyRecvDat,
}

impl SubState {
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            SubState::CmdInitiatorBusyExecCmd
                | SubState::CmdExecutorBusyExecCmd
                | SubState::DatSenderBusySendDat
                | SubState::DatReceiverBusyRecvDat
        )
    }
}

/// All three state levels, captured under one lock acquisition
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinkStateSnapshot {
    pub conn: ConnState,
    pub main: MainState,
    pub sub: SubState,
}

impl LinkStateSnapshot {
    /// Check the cross-level consistency rules that hold at every
    /// observation point:
    ///
    /// 1. a link that is neither Connected nor Disconnected is never Busy;
    /// 2. a Broken link has no in-flight work (main Ready or Undefined,
    ///    substate not busy).
    pub fn is_consistent(&self) -> bool {
        let settled = matches!(self.conn, ConnState::Connected | ConnState::Disconnected);
        if !settled && (self.main.is_busy() || self.sub.is_busy()) {
            return false;
        }
        if self.conn == ConnState::Broken
            && !matches!(self.main, MainState::Ready | MainState::Undefined)
        {
            return false;
        }
        true
    }
}

/// Holder of a link's 3-level state. Every transition happens under the one
/// internal mutex, so concurrent queries always observe a consistent
/// snapshot across all three levels.
///
/// A transport failure reported while user work is in flight is parked and
/// applied when the busy guard drops, so `Broken` is never observable
/// together with a busy state.
pub struct LinkStateCell {
    inner: Mutex<CellInner>,
}

struct CellInner {
    conn: ConnState,
    main: MainState,
    sub: SubState,
    pending_conn: Option<ConnState>,
}

impl LinkStateCell {
    pub fn new(conn: ConnState, sub: SubState) -> Self {
        Self {
            inner: Mutex::new(CellInner {
                conn,
                main: MainState::Ready,
                sub,
                pending_conn: None,
            }),
        }
    }

    pub fn snapshot(&self) -> LinkStateSnapshot {
        let inner = self.lock();
        LinkStateSnapshot {
            conn: inner.conn,
            main: inner.main,
            sub: inner.sub,
        }
    }

    /// Apply a connection-state transition. A transition away from the
    /// settled states (`Connected` / `Disconnected`) while work is in flight
    /// is deferred until the work exits, so no observer ever sees `Broken`
    /// or a half-closed state combined with a busy level.
    pub fn set_conn(&self, conn: ConnState) {
        let mut inner = self.lock();
        let busy = inner.main.is_busy() || inner.sub.is_busy();
        let settled = matches!(conn, ConnState::Connected | ConnState::Disconnected);
        if busy && !settled {
            inner.pending_conn = Some(conn);
        } else {
            inner.conn = conn;
            inner.pending_conn = None;
        }
    }

    pub fn conn(&self) -> ConnState {
        self.lock().conn
    }

    /// Enter a busy operation state; the returned guard restores the
    /// previous state on every exit path.
    pub fn enter_main(&self, busy: MainState) -> BusyMainGuard<'_> {
        let mut inner = self.lock();
        let previous = inner.main;
        inner.main = busy;
        BusyMainGuard {
            cell: self,
            previous,
        }
    }

    /// Enter a busy detail substate; the returned guard restores the
    /// previous substate on every exit path.
    pub fn enter_sub(&self, busy: SubState) -> BusySubGuard<'_> {
        let mut inner = self.lock();
        let previous = inner.sub;
        inner.sub = busy;
        BusySubGuard {
            cell: self,
            previous,
        }
    }

    /// Replace the resting substate (role reconfiguration)
    pub fn set_sub(&self, sub: SubState) {
        self.lock().sub = sub;
    }

    fn lock(&self) -> MutexGuard<'_, CellInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn exit_busy(&self, apply: impl FnOnce(&mut CellInner)) {
        let mut inner = self.lock();
        apply(&mut inner);
        if !inner.main.is_busy() && !inner.sub.is_busy() {
            if let Some(conn) = inner.pending_conn.take() {
                inner.conn = conn;
            }
        }
    }
}

pub struct BusyMainGuard<'a> {
    cell: &'a LinkStateCell,
    previous: MainState,
}

impl Drop for BusyMainGuard<'_> {
    fn drop(&mut self) {
        let previous = self.previous;
        self.cell.exit_busy(|inner| inner.main = previous);
    }
}

pub struct BusySubGuard<'a> {
    cell: &'a LinkStateCell,
    previous: SubState,
}

impl Drop for BusySubGuard<'_> {
    fn drop(&mut self) {
        let previous = self.previous;
        self.cell.exit_busy(|inner| inner.sub = previous);
    }
}

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use super::{Frame, FrameReceiver, FrameSender, RecvError, SendError};

// Frames parked in flight per direction. Kept small so a stalled reader
// exerts backpressure on the writer quickly.
const CHANNEL_DEPTH: usize = 16;

/// Build a paired in-process duplex channel. Returns the two endpoints'
/// (sender, receiver) halves.
pub fn duplex() -> (
    (Box<dyn FrameSender>, Box<dyn FrameReceiver>),
    (Box<dyn FrameSender>, Box<dyn FrameReceiver>),
) {
    let (a_to_b_tx, a_to_b_rx) = bounded(CHANNEL_DEPTH);
    let (b_to_a_tx, b_to_a_rx) = bounded(CHANNEL_DEPTH);
    (
        (
            Box::new(FifoSender { tx: a_to_b_tx }),
            Box::new(FifoReceiver { rx: b_to_a_rx }),
        ),
        (
            Box::new(FifoSender { tx: b_to_a_tx }),
            Box::new(FifoReceiver { rx: a_to_b_rx }),
        ),
    )
}

struct FifoSender {
    tx: Sender<Frame>,
}

impl FrameSender for FifoSender {
    fn send_frame(&mut self, frame: Frame) -> Result<(), SendError> {
        self.tx.send(frame).map_err(|_| SendError)
    }
}

struct FifoReceiver {
    rx: Receiver<Frame>,
}

impl FrameReceiver for FifoReceiver {
    fn recv_frame(&mut self) -> Result<Frame, RecvError> {
        self.rx.recv().map_err(|_| RecvError)
    }

    fn recv_frame_timeout(&mut self, timeout: Duration) -> Result<Option<Frame>, RecvError> {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(RecvError),
        }
    }
}

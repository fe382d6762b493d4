mod frame;

pub mod fifo;

cfg_if! {
    if #[cfg(feature = "transport_tcp")] {
        pub mod tcp;
    }
}

pub use frame::{Frame, MAX_FRAME_BODY};
pub use inner::{FrameReceiver, FrameSender, RecvError, SendError};

mod inner {
    use std::time::Duration;

    use super::Frame;

    /// The peer end is gone; nothing more can be written
    #[derive(Debug)]
    pub struct SendError;

    /// The channel failed or hit end-of-stream without an orderly Bye
    #[derive(Debug)]
    pub struct RecvError;

    /// Write half of a paired channel. Delivery is reliable and ordered;
    /// a send may block for transport-level backpressure.
    pub trait FrameSender: Send {
        fn send_frame(&mut self, frame: Frame) -> Result<(), SendError>;
    }

    /// Read half of a paired channel
    pub trait FrameReceiver: Send {
        /// Block until the next frame arrives
        fn recv_frame(&mut self) -> Result<Frame, RecvError>;

        /// Wait up to `timeout` for the next frame; `Ok(None)` when nothing
        /// arrived in time. Partial wire reads are buffered internally, so a
        /// timeout never loses frame synchronization.
        fn recv_frame_timeout(&mut self, timeout: Duration) -> Result<Option<Frame>, RecvError>;
    }
}

use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use ioc_shared::{IocError, IocResult};

use super::{Frame, FrameReceiver, FrameSender, RecvError, SendError, MAX_FRAME_BODY};

// Wire format: [kind u8][body length u32 LE][body]
const HEADER_LEN: usize = 5;

/// Split a connected loopback stream into its frame halves
pub fn split(stream: TcpStream) -> IocResult<(Box<dyn FrameSender>, Box<dyn FrameReceiver>)> {
    stream.set_nodelay(true).map_err(|_| IocError::LinkBroken)?;
    let read_half = stream.try_clone().map_err(|_| IocError::LinkBroken)?;
    Ok((
        Box::new(TcpFrameSender { stream }),
        Box::new(TcpFrameReceiver {
            stream: read_half,
            pending: Vec::new(),
        }),
    ))
}

struct TcpFrameSender {
    stream: TcpStream,
}

impl FrameSender for TcpFrameSender {
    fn send_frame(&mut self, frame: Frame) -> Result<(), SendError> {
        let body = frame.encode_body();
        let mut wire = Vec::with_capacity(HEADER_LEN + body.len());
        wire.push(frame.kind());
        wire.extend_from_slice(&(body.len() as u32).to_le_bytes());
        wire.extend_from_slice(&body);
        self.stream.write_all(&wire).map_err(|_| SendError)
    }
}

struct TcpFrameReceiver {
    stream: TcpStream,
    // bytes read off the socket but not yet assembled into a frame
    pending: Vec<u8>,
}

impl TcpFrameReceiver {
    fn try_parse(&mut self) -> Result<Option<Frame>, RecvError> {
        if self.pending.len() < HEADER_LEN {
            return Ok(None);
        }
        let kind = self.pending[0];
        let body_len = u32::from_le_bytes([
            self.pending[1],
            self.pending[2],
            self.pending[3],
            self.pending[4],
        ]) as usize;
        if body_len > MAX_FRAME_BODY {
            return Err(RecvError);
        }
        let total = HEADER_LEN + body_len;
        if self.pending.len() < total {
            return Ok(None);
        }
        let frame = Frame::decode(kind, &self.pending[HEADER_LEN..total]).map_err(|_| RecvError)?;
        self.pending.drain(..total);
        Ok(Some(frame))
    }

    fn read_some(&mut self) -> Result<usize, std::io::Error> {
        let mut buf = [0u8; 16 * 1024];
        let read = self.stream.read(&mut buf)?;
        self.pending.extend_from_slice(&buf[..read]);
        Ok(read)
    }
}

impl FrameReceiver for TcpFrameReceiver {
    fn recv_frame(&mut self) -> Result<Frame, RecvError> {
        self.stream.set_read_timeout(None).map_err(|_| RecvError)?;
        loop {
            if let Some(frame) = self.try_parse()? {
                return Ok(frame);
            }
            match self.read_some() {
                Ok(0) => return Err(RecvError),
                Ok(_) => {}
                Err(_) => return Err(RecvError),
            }
        }
    }

    fn recv_frame_timeout(&mut self, timeout: Duration) -> Result<Option<Frame>, RecvError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(frame) = self.try_parse()? {
                return Ok(Some(frame));
            }
            let remaining = match deadline.checked_duration_since(Instant::now()) {
                Some(remaining) if !remaining.is_zero() => remaining,
                _ => return Ok(None),
            };
            self.stream
                .set_read_timeout(Some(remaining.max(Duration::from_millis(1))))
                .map_err(|_| RecvError)?;
            match self.read_some() {
                Ok(0) => return Err(RecvError),
                Ok(_) => {}
                Err(err)
                    if err.kind() == ErrorKind::WouldBlock
                        || err.kind() == ErrorKind::TimedOut => {}
                Err(_) => return Err(RecvError),
            }
        }
    }
}

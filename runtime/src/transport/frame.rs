use ioc_shared::{IocError, IocResult};

/// One unit of transport traffic. Frames are delivered intact and in order;
/// the engines never depend on how a transport groups them into bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// Pairing request: the connector's token, link id, and usage bits
    Hello { token: u64, link: u64, usage: u8 },
    /// Pairing reply: the echoed token and the acceptor's link id
    HelloAck { token: u64, link: u64 },
    /// Orderly close notification; always the last frame on a link
    Bye,
    /// Command request with its correlation sequence
    CmdReq {
        seq: u64,
        cmd_id: u64,
        payload: Vec<u8>,
    },
    /// Command reply; `status` is an error wire code, zero for success
    CmdRsp {
        seq: u64,
        status: u16,
        payload: Vec<u8>,
    },
    /// A run of stream bytes
    Dat { bytes: Vec<u8> },
}

const KIND_HELLO: u8 = 1;
const KIND_HELLO_ACK: u8 = 2;
const KIND_BYE: u8 = 3;
const KIND_CMD_REQ: u8 = 4;
const KIND_CMD_RSP: u8 = 5;
const KIND_DAT: u8 = 6;

// Guard against a corrupt length prefix allocating unbounded memory
pub const MAX_FRAME_BODY: usize = 64 * 1024 * 1024 + 64;

impl Frame {
    pub fn kind(&self) -> u8 {
        match self {
            Frame::Hello { .. } => KIND_HELLO,
            Frame::HelloAck { .. } => KIND_HELLO_ACK,
            Frame::Bye => KIND_BYE,
            Frame::CmdReq { .. } => KIND_CMD_REQ,
            Frame::CmdRsp { .. } => KIND_CMD_RSP,
            Frame::Dat { .. } => KIND_DAT,
        }
    }

    /// Encode the frame body (everything after the kind and length prefix)
    pub fn encode_body(&self) -> Vec<u8> {
        match self {
            Frame::Hello { token, link, usage } => {
                let mut body = Vec::with_capacity(17);
                body.extend_from_slice(&token.to_le_bytes());
                body.extend_from_slice(&link.to_le_bytes());
                body.push(*usage);
                body
            }
            Frame::HelloAck { token, link } => {
                let mut body = Vec::with_capacity(16);
                body.extend_from_slice(&token.to_le_bytes());
                body.extend_from_slice(&link.to_le_bytes());
                body
            }
            Frame::Bye => Vec::new(),
            Frame::CmdReq {
                seq,
                cmd_id,
                payload,
            } => {
                let mut body = Vec::with_capacity(16 + payload.len());
                body.extend_from_slice(&seq.to_le_bytes());
                body.extend_from_slice(&cmd_id.to_le_bytes());
                body.extend_from_slice(payload);
                body
            }
            Frame::CmdRsp {
                seq,
                status,
                payload,
            } => {
                let mut body = Vec::with_capacity(10 + payload.len());
                body.extend_from_slice(&seq.to_le_bytes());
                body.extend_from_slice(&status.to_le_bytes());
                body.extend_from_slice(payload);
                body
            }
            Frame::Dat { bytes } => bytes.clone(),
        }
    }

    /// Decode a frame body received off the wire
    pub fn decode(kind: u8, body: &[u8]) -> IocResult<Frame> {
        match kind {
            KIND_HELLO => {
                if body.len() != 17 {
                    return Err(IocError::DataCorrupted);
                }
                Ok(Frame::Hello {
                    token: read_u64(&body[0..8])?,
                    link: read_u64(&body[8..16])?,
                    usage: body[16],
                })
            }
            KIND_HELLO_ACK => {
                if body.len() != 16 {
                    return Err(IocError::DataCorrupted);
                }
                Ok(Frame::HelloAck {
                    token: read_u64(&body[0..8])?,
                    link: read_u64(&body[8..16])?,
                })
            }
            KIND_BYE => {
                if !body.is_empty() {
                    return Err(IocError::DataCorrupted);
                }
                Ok(Frame::Bye)
            }
            KIND_CMD_REQ => {
                if body.len() < 16 {
                    return Err(IocError::DataCorrupted);
                }
                Ok(Frame::CmdReq {
                    seq: read_u64(&body[0..8])?,
                    cmd_id: read_u64(&body[8..16])?,
                    payload: body[16..].to_vec(),
                })
            }
            KIND_CMD_RSP => {
                if body.len() < 10 {
                    return Err(IocError::DataCorrupted);
                }
                let status = u16::from_le_bytes([body[8], body[9]]);
                Ok(Frame::CmdRsp {
                    seq: read_u64(&body[0..8])?,
                    status,
                    payload: body[10..].to_vec(),
                })
            }
            KIND_DAT => Ok(Frame::Dat {
                bytes: body.to_vec(),
            }),
            _ => Err(IocError::DataCorrupted),
        }
    }
}

fn read_u64(bytes: &[u8]) -> IocResult<u64> {
    let array: [u8; 8] = bytes.try_into().map_err(|_| IocError::DataCorrupted)?;
    Ok(u64::from_le_bytes(array))
}

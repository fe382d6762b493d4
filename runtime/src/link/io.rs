use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};

use ioc_shared::{IocError, SubState};

use crate::dat::DatReceiverHalf;
use crate::transport::{Frame, FrameReceiver};

use super::Link;

// How often the reader re-checks the shutdown flag while the wire is idle
const POLL: Duration = Duration::from_millis(25);

/// Per-link reader loop: demultiplex incoming frames to the engine halves.
/// Exits on shutdown, orderly Bye, or transport failure.
pub(crate) fn run_reader(link: Arc<Link>, mut receiver: Box<dyn FrameReceiver>) {
    loop {
        if link.shutdown.load(Ordering::Acquire) {
            break;
        }
        let frame = match receiver.recv_frame_timeout(POLL) {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(_) => {
                link.mark_broken();
                break;
            }
        };
        match frame {
            Frame::Dat { bytes } => match link.dat_receiver() {
                Some(DatReceiverHalf::Callback(handler)) => {
                    let _busy = link.state.enter_sub(SubState::DatReceiverBusyRecvDat);
                    if let Err(err) = handler.on_dat(link.id, &bytes) {
                        warn!("data callback on link {:?} failed: {err}", link.id);
                    }
                }
                Some(DatReceiverHalf::Polling(parking)) => {
                    if !parking.park(&bytes) {
                        break;
                    }
                }
                None => warn!("dropping data frame on link {:?} without a receiver role", link.id),
            },
            Frame::CmdReq {
                seq,
                cmd_id,
                payload,
            } => {
                let (status, payload) = match link.cmd_executor() {
                    Some(executor) => executor.handle(&link.state, link.id, cmd_id, payload),
                    None => (IocError::PermissionDenied.code(), Vec::new()),
                };
                if link
                    .send_frame(Frame::CmdRsp {
                        seq,
                        status,
                        payload,
                    })
                    .is_err()
                {
                    link.mark_broken();
                    break;
                }
            }
            Frame::CmdRsp {
                seq,
                status,
                payload,
            } => {
                if let Some(initiator) = link.cmd_initiator() {
                    initiator.complete(seq, status, payload);
                }
            }
            Frame::Bye => {
                link.peer_closed();
                break;
            }
            Frame::Hello { .. } | Frame::HelloAck { .. } => {
                debug!("handshake frame after pairing on link {:?}; ignoring", link.id);
            }
        }
    }
}

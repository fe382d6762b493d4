//! DAT engine over the in-process FIFO transport: byte-exact stream
//! reassembly, size validation, validation precedence, delivery-mode
//! exclusivity, and flow-control backpressure.

use std::sync::Arc;
use std::time::Duration;

use ioc_runtime::{
    BigMapKey, ConnArgs, DatDesc, DatReceiverArgs, Hub, IocError, LinkId, Options, SrvArgs,
    SrvFlags, SrvUri, Usage, MAX_DATA_CHUNK_SIZE,
};
use ioc_test::helpers::{init_logs, wait_until, DatCollector};

/// Bring up a polling-mode receiver service and a sender link, returning
/// (sender link, receiver link, service id).
fn polling_pair(hub: &Hub, path: &str, queue_capacity: Option<usize>) -> (LinkId, LinkId) {
    let mut srv_args = SrvArgs::new(SrvUri::fifo(path), Usage::DAT_RECEIVER);
    srv_args.usage_args.dat_queue_capacity = queue_capacity;
    let srv = hub.online_service(srv_args).unwrap();

    let connector = {
        let hub = hub.clone();
        let uri = SrvUri::fifo(path);
        std::thread::spawn(move || {
            let mut args = ConnArgs::new(uri, Usage::DAT_SENDER);
            args.usage_args.dat_queue_capacity = queue_capacity;
            hub.connect_service(args, &Options::timeout_ms(2_000))
        })
    };
    let receiver_link = hub.accept_client(srv, &Options::timeout_ms(2_000)).unwrap();
    let sender_link = connector.join().unwrap().unwrap();
    (sender_link, receiver_link)
}

/// Sent chunk boundaries do not survive; sent bytes do, exactly and in order
#[test]
fn polled_stream_reassembles_exactly() {
    init_logs();
    let hub = Hub::new();
    let (sender_link, receiver_link) = polling_pair(&hub, "dat/poll", None);

    let mut expected = Vec::new();
    for index in 0..5u8 {
        let mut chunk = format!("[Chunk {index}]").into_bytes();
        chunk.resize(1024, index);
        expected.extend_from_slice(&chunk);
        hub.send_dat(sender_link, DatDesc::from_vec(chunk), &Options::may_block())
            .unwrap();
    }
    hub.flush_dat(sender_link, &Options::may_block()).unwrap();

    // receive with a window size unrelated to the sender's chunking
    let mut received = Vec::new();
    while received.len() < expected.len() {
        let mut desc = DatDesc::with_capacity(700);
        hub.recv_dat(receiver_link, &mut desc, &Options::timeout_ms(2_000))
            .unwrap();
        received.extend_from_slice(desc.ptr_bytes());
    }
    assert_eq!(received, expected);

    // the stream is fully drained
    assert_eq!(
        hub.recv_dat(
            receiver_link,
            &mut DatDesc::with_capacity(16),
            &Options::non_block(),
        ),
        Err(IocError::NoData)
    );
    assert_eq!(
        hub.recv_dat(
            receiver_link,
            &mut DatDesc::with_capacity(16),
            &Options::immediate(),
        ),
        Err(IocError::Timeout)
    );
}

/// Zero-size and oversize sends are rejected before touching any buffer;
/// valid boundary sizes go through.
#[test]
fn size_validation_never_reaches_the_receiver() {
    init_logs();
    let hub = Hub::new();
    let collector = Arc::new(DatCollector::new());
    let mut args = SrvArgs::new(SrvUri::fifo("dat/sizes"), Usage::DAT_RECEIVER)
        .with_flags(SrvFlags::AUTO_ACCEPT);
    args.usage_args.dat = Some(DatReceiverArgs::new(collector.clone()));
    let srv = hub.online_service(args).unwrap();
    let sender_link = hub
        .connect_service(
            ConnArgs::new(SrvUri::fifo("dat/sizes"), Usage::DAT_SENDER),
            &Options::timeout_ms(2_000),
        )
        .unwrap();

    assert_eq!(
        hub.send_dat(sender_link, DatDesc::default(), &Options::may_block()),
        Err(IocError::ZeroData)
    );
    let oversize = vec![0u8; MAX_DATA_CHUNK_SIZE + 1];
    assert!(matches!(
        hub.send_dat(
            sender_link,
            DatDesc::from_vec(oversize),
            &Options::may_block(),
        ),
        Err(IocError::DataTooLarge { .. })
    ));

    // neither rejection reached the receiver
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(collector.calls(), 0);
    assert_eq!(collector.byte_len(), 0);

    // one byte and one megabyte both pass
    hub.send_dat(sender_link, DatDesc::from_bytes(&[42]), &Options::may_block())
        .unwrap();
    let megabyte = vec![7u8; 1024 * 1024];
    hub.send_dat(
        sender_link,
        DatDesc::from_vec(megabyte.clone()),
        &Options::may_block(),
    )
    .unwrap();
    hub.flush_dat(sender_link, &Options::may_block()).unwrap();

    let mut expected = vec![42u8];
    expected.extend_from_slice(&megabyte);
    assert!(wait_until(
        || collector.byte_len() == expected.len(),
        Duration::from_secs(5)
    ));
    assert_eq!(collector.bytes(), expected);

    hub.offline_service(srv).unwrap();
}

/// LinkId resolution strictly precedes descriptor validation, which strictly
/// precedes option validation, on both the send and receive paths.
#[test]
fn invalid_link_masks_every_other_error() {
    init_logs();
    let hub = Hub::new();
    let bogus = LinkId::from_u64(424_242);

    // zero-size AND oversize AND a bad link: the link wins
    assert_eq!(
        hub.send_dat(bogus, DatDesc::default(), &Options::non_block()),
        Err(IocError::NotExistLink)
    );
    assert_eq!(
        hub.send_dat(
            bogus,
            DatDesc::from_vec(vec![0u8; MAX_DATA_CHUNK_SIZE + 1]),
            &Options::non_block(),
        ),
        Err(IocError::NotExistLink)
    );
    assert_eq!(
        hub.recv_dat(bogus, &mut DatDesc::with_capacity(0), &Options::non_block()),
        Err(IocError::NotExistLink)
    );
    assert_eq!(hub.flush_dat(bogus, &Options::non_block()), Err(IocError::NotExistLink));

    // with a valid link, descriptor validation surfaces next
    let (sender_link, receiver_link) = polling_pair(&hub, "dat/precedence", None);
    assert_eq!(
        hub.send_dat(sender_link, DatDesc::default(), &Options::non_block()),
        Err(IocError::ZeroData)
    );
    assert_eq!(
        hub.recv_dat(
            receiver_link,
            &mut DatDesc::with_capacity(0),
            &Options::non_block(),
        ),
        Err(IocError::BufferTooSmall { capacity: 0 })
    );

    // role mismatches are caught after link resolution
    assert_eq!(
        hub.send_dat(
            receiver_link,
            DatDesc::from_bytes(&[1]),
            &Options::non_block(),
        ),
        Err(IocError::PermissionDenied)
    );
    assert_eq!(
        hub.recv_dat(
            sender_link,
            &mut DatDesc::with_capacity(8),
            &Options::non_block(),
        ),
        Err(IocError::PermissionDenied)
    );

    // a closed link resolves like an unknown one
    hub.close_link(sender_link).unwrap();
    assert_eq!(
        hub.send_dat(sender_link, DatDesc::default(), &Options::non_block()),
        Err(IocError::NotExistLink)
    );
}

/// A receiver that never polls eventually stalls the whole pipeline: the
/// sender sees `BufferFull` (non-blocking), `Timeout` (bounded), and a
/// parked blocking send that completes once the receiver drains. Nothing is
/// lost along the way.
#[test]
fn slow_receiver_backpressures_the_sender() {
    init_logs();
    let hub = Hub::new();
    let (sender_link, receiver_link) = polling_pair(&hub, "dat/slow", Some(4096));

    let chunk = vec![7u8; 1024];
    let mut sent = 0usize;
    let mut saw_full = false;
    for _ in 0..4096 {
        match hub.send_dat(
            sender_link,
            DatDesc::from_bytes(&chunk),
            &Options::non_block(),
        ) {
            Ok(()) => sent += chunk.len(),
            Err(IocError::BufferFull) => {
                saw_full = true;
                break;
            }
            Err(other) => panic!("unexpected send verdict: {other}"),
        }
    }
    assert!(
        saw_full,
        "an unread stream must eventually refuse non-blocking sends"
    );

    assert_eq!(
        hub.send_dat(
            sender_link,
            DatDesc::from_bytes(&chunk),
            &Options::timeout_ms(50),
        ),
        Err(IocError::Timeout)
    );

    // a blocking send parks, then completes once the receiver drains
    let parked = {
        let hub = hub.clone();
        let chunk = chunk.clone();
        std::thread::spawn(move || {
            hub.send_dat(
                sender_link,
                DatDesc::from_vec(chunk),
                &Options::may_block(),
            )
        })
    };

    let expected_total = sent + chunk.len();
    let mut received = 0usize;
    while received < expected_total {
        let mut desc = DatDesc::with_capacity(2048);
        match hub.recv_dat(receiver_link, &mut desc, &Options::timeout_ms(2_000)) {
            Ok(()) => {
                assert!(desc.ptr_bytes().iter().all(|byte| *byte == 7));
                received += desc.ptr_bytes().len();
            }
            Err(err) => panic!("drain stalled after {received} bytes: {err}"),
        }
    }
    parked.join().unwrap().unwrap();
    assert_eq!(received, expected_total, "no byte may be lost to backpressure");
}

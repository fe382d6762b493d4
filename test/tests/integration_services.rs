//! Service lifecycle and pairing: URI reservation, manual and automatic
//! accept, usage complement checks, broadcast, and teardown semantics.

use std::sync::Arc;
use std::time::Duration;

use ioc_runtime::{
    ConnArgs, ConnState, DatDesc, DatReceiverArgs, EvtDesc, Hub, IocError, Options, SrvArgs,
    SrvFlags, SrvUri, SubEvtArgs, Usage, UsageArgs,
};
use ioc_test::helpers::{init_logs, wait_until, DatCollector, EvtCounter, EVT_KEEPALIVE, EVT_KEEPALIVE_RELAY};

#[test]
fn fifo_connect_pairs_with_manual_accept() {
    init_logs();
    let hub = Hub::new();
    let srv = hub
        .online_service(SrvArgs::new(SrvUri::fifo("svc/typical"), Usage::EVT_PRODUCER))
        .unwrap();

    let connector = {
        let hub = hub.clone();
        std::thread::spawn(move || {
            hub.connect_service(
                ConnArgs::new(SrvUri::fifo("svc/typical"), Usage::EVT_CONSUMER),
                &Options::timeout_ms(2_000),
            )
        })
    };
    let producer_link = hub.accept_client(srv, &Options::timeout_ms(2_000)).unwrap();
    let consumer_link = connector.join().unwrap().unwrap();

    assert_eq!(
        hub.link_conn_state(producer_link).unwrap(),
        ConnState::Connected
    );
    assert_eq!(
        hub.link_conn_state(consumer_link).unwrap(),
        ConnState::Connected
    );

    // the consumer subscribes on its half; the producer posts on its own
    let counter = Arc::new(EvtCounter::new());
    hub.sub_evt(
        consumer_link,
        SubEvtArgs::new(counter.clone(), vec![EVT_KEEPALIVE]),
    )
    .unwrap();
    hub.post_evt(
        producer_link,
        EvtDesc::new(EVT_KEEPALIVE),
        &Options::may_block(),
    )
    .unwrap();
    assert!(wait_until(
        || counter.count(EVT_KEEPALIVE) == 1,
        Duration::from_secs(2)
    ));

    // an id nobody subscribed is rejected without queueing
    assert_eq!(
        hub.post_evt(
            producer_link,
            EvtDesc::new(EVT_KEEPALIVE_RELAY),
            &Options::non_block(),
        ),
        Err(IocError::NoEventConsumer)
    );

    hub.close_link(consumer_link).unwrap();
    assert_eq!(hub.close_link(consumer_link), Err(IocError::NotExistLink));
    assert_eq!(
        hub.link_state(consumer_link).unwrap_err(),
        IocError::NotExistLink
    );
    hub.offline_service(srv).unwrap();
}

#[test]
fn duplicate_uri_is_refused_until_released() {
    init_logs();
    let hub = Hub::new();
    let uri = SrvUri::fifo("svc/unique");
    let first = hub
        .online_service(SrvArgs::new(uri.clone(), Usage::EVT_PRODUCER))
        .unwrap();

    assert!(matches!(
        hub.online_service(SrvArgs::new(uri.clone(), Usage::EVT_PRODUCER)),
        Err(IocError::AlreadyExistService { .. })
    ));

    hub.offline_service(first).unwrap();
    assert_eq!(hub.offline_service(first), Err(IocError::NotExistService));

    // the URI is free again
    let second = hub
        .online_service(SrvArgs::new(uri, Usage::EVT_PRODUCER))
        .unwrap();
    hub.offline_service(second).unwrap();
}

#[test]
fn connect_to_unknown_uri_fails() {
    let hub = Hub::new();
    assert_eq!(
        hub.connect_service(
            ConnArgs::new(SrvUri::fifo("svc/nowhere"), Usage::EVT_CONSUMER),
            &Options::timeout_ms(100),
        )
        .unwrap_err(),
        IocError::NotExistService
    );
}

#[test]
fn accept_times_out_without_a_connector() {
    let hub = Hub::new();
    let srv = hub
        .online_service(SrvArgs::new(SrvUri::fifo("svc/lonely"), Usage::EVT_PRODUCER))
        .unwrap();
    assert_eq!(
        hub.accept_client(srv, &Options::timeout_ms(50)).unwrap_err(),
        IocError::Timeout
    );
    hub.offline_service(srv).unwrap();
}

#[test]
fn usage_outside_the_service_capabilities_is_refused() {
    let hub = Hub::new();
    let srv = hub
        .online_service(SrvArgs::new(SrvUri::fifo("svc/evt-only"), Usage::EVT_PRODUCER))
        .unwrap();
    assert_eq!(
        hub.connect_service(
            ConnArgs::new(SrvUri::fifo("svc/evt-only"), Usage::CMD_INITIATOR),
            &Options::timeout_ms(200),
        )
        .unwrap_err(),
        IocError::PermissionDenied
    );
    hub.offline_service(srv).unwrap();
}

#[test]
fn auto_accept_services_pair_without_accept_client() {
    init_logs();
    let hub = Hub::new();
    let collector = Arc::new(DatCollector::new());
    let mut args = SrvArgs::new(SrvUri::fifo("svc/auto"), Usage::DAT_RECEIVER)
        .with_flags(SrvFlags::AUTO_ACCEPT);
    args.usage_args.dat = Some(DatReceiverArgs::new(collector.clone()));
    let srv = hub.online_service(args).unwrap();

    // manual accept is not available on an auto-accept service
    assert!(matches!(
        hub.accept_client(srv, &Options::non_block()),
        Err(IocError::InvalidParam { .. })
    ));

    let link = hub
        .connect_service(
            ConnArgs::new(SrvUri::fifo("svc/auto"), Usage::DAT_SENDER),
            &Options::timeout_ms(2_000),
        )
        .unwrap();

    hub.send_dat(link, DatDesc::from_bytes(b"hello"), &Options::may_block())
        .unwrap();
    hub.flush_dat(link, &Options::may_block()).unwrap();
    assert!(wait_until(
        || collector.bytes() == b"hello".to_vec(),
        Duration::from_secs(2)
    ));

    hub.offline_service(srv).unwrap();
    // the surviving half observes the orderly shutdown
    assert!(wait_until(
        || matches!(
            hub.link_conn_state(link),
            Ok(ConnState::Disconnected) | Ok(ConnState::Broken)
        ),
        Duration::from_secs(2),
    ));
    hub.close_link(link).unwrap();
}

#[test]
fn broadcast_reaches_every_derived_consumer() {
    init_logs();
    let hub = Hub::new();
    let srv = hub
        .online_service(
            SrvArgs::new(SrvUri::fifo("svc/broadcast"), Usage::EVT_PRODUCER)
                .with_flags(SrvFlags::AUTO_ACCEPT | SrvFlags::BROADCAST_EVENT),
        )
        .unwrap();

    let mut counters = Vec::new();
    for _ in 0..3 {
        let counter = Arc::new(EvtCounter::new());
        let usage_args = UsageArgs {
            evt: Some(SubEvtArgs::new(counter.clone(), vec![EVT_KEEPALIVE])),
            ..UsageArgs::default()
        };
        hub.connect_service(
            ConnArgs::new(SrvUri::fifo("svc/broadcast"), Usage::EVT_CONSUMER)
                .with_usage_args(usage_args),
            &Options::timeout_ms(2_000),
        )
        .unwrap();
        counters.push(counter);
    }

    hub.broadcast_evt(srv, EvtDesc::new(EVT_KEEPALIVE), &Options::may_block())
        .unwrap();
    assert!(wait_until(
        || counters.iter().all(|counter| counter.count(EVT_KEEPALIVE) == 1),
        Duration::from_secs(2),
    ));

    // broadcast without the flag is refused
    let plain = hub
        .online_service(SrvArgs::new(SrvUri::fifo("svc/plain"), Usage::EVT_PRODUCER))
        .unwrap();
    assert_eq!(
        hub.broadcast_evt(plain, EvtDesc::new(EVT_KEEPALIVE), &Options::may_block()),
        Err(IocError::PermissionDenied)
    );

    hub.offline_service(srv).unwrap();
    hub.offline_service(plain).unwrap();
}

#[test]
fn offline_closes_every_derived_link() {
    init_logs();
    let hub = Hub::new();
    let srv = hub
        .online_service(SrvArgs::new(SrvUri::fifo("svc/teardown"), Usage::EVT_PRODUCER))
        .unwrap();

    let connector = {
        let hub = hub.clone();
        std::thread::spawn(move || {
            hub.connect_service(
                ConnArgs::new(SrvUri::fifo("svc/teardown"), Usage::EVT_CONSUMER),
                &Options::timeout_ms(2_000),
            )
        })
    };
    let accepted = hub.accept_client(srv, &Options::timeout_ms(2_000)).unwrap();
    let consumer_link = connector.join().unwrap().unwrap();

    hub.offline_service(srv).unwrap();
    assert_eq!(hub.link_state(accepted).unwrap_err(), IocError::NotExistLink);
    // the connector half survives but sees the disconnect
    assert!(wait_until(
        || matches!(
            hub.link_conn_state(consumer_link),
            Ok(ConnState::Disconnected) | Ok(ConnState::Broken)
        ),
        Duration::from_secs(2),
    ));
    hub.close_link(consumer_link).unwrap();
}

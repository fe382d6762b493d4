//! 3-level link state: resting substates per role, busy substates while
//! work is in flight, cross-level consistency at every observation point,
//! and settlement after close.

use std::sync::Arc;
use std::time::Duration;

use ioc_runtime::{
    CmdDesc, CmdExecutorArgs, ConnArgs, ConnState, Hub, IocError, LinkId, MainState, Options,
    SrvArgs, SrvUri, SubEvtArgs, SubState, Usage,
};
use ioc_test::helpers::{init_logs, wait_until, EchoExecutor, GatedHandler, CMD_PING, EVT_KEEPALIVE};

fn cmd_pair(hub: &Hub, path: &str, executor: Arc<EchoExecutor>) -> (LinkId, LinkId) {
    let mut args = SrvArgs::new(SrvUri::fifo(path), Usage::CMD_EXECUTOR);
    args.usage_args.cmd = Some(CmdExecutorArgs::new(executor, Vec::new()));
    let srv = hub.online_service(args).unwrap();

    let connector = {
        let hub = hub.clone();
        let uri = SrvUri::fifo(path);
        std::thread::spawn(move || {
            hub.connect_service(
                ConnArgs::new(uri, Usage::CMD_INITIATOR),
                &Options::timeout_ms(2_000),
            )
        })
    };
    let executor_link = hub.accept_client(srv, &Options::timeout_ms(2_000)).unwrap();
    let initiator_link = connector.join().unwrap().unwrap();
    (initiator_link, executor_link)
}

#[test]
fn resting_substates_follow_the_link_roles() {
    init_logs();
    let hub = Hub::new();
    let (initiator_link, executor_link) =
        cmd_pair(&hub, "state/resting", Arc::new(EchoExecutor::new()));

    let initiator = hub.link_state(initiator_link).unwrap();
    assert_eq!(initiator.conn, ConnState::Connected);
    assert_eq!(initiator.main, MainState::Ready);
    assert_eq!(initiator.sub, SubState::CmdInitiatorReady);
    assert!(initiator.is_consistent());

    let executor = hub.link_state(executor_link).unwrap();
    assert_eq!(executor.sub, SubState::CmdExecutorReady);
    assert!(executor.is_consistent());
}

/// While an exchange is in flight, the initiator and executor halves expose
/// their busy substates, and every snapshot stays consistent.
#[test]
fn busy_substates_track_an_in_flight_command() {
    init_logs();
    let hub = Hub::new();
    let (initiator_link, executor_link) = cmd_pair(
        &hub,
        "state/busy",
        Arc::new(EchoExecutor::with_delay(Duration::from_millis(300))),
    );

    let in_flight = {
        let hub = hub.clone();
        std::thread::spawn(move || {
            let mut cmd = CmdDesc::new(CMD_PING).with_request(b"state".to_vec());
            hub.exec_cmd(initiator_link, &mut cmd, &Options::may_block())
        })
    };

    assert!(wait_until(
        || hub.link_state(initiator_link).unwrap().sub == SubState::CmdInitiatorBusyExecCmd,
        Duration::from_secs(2),
    ));
    assert!(wait_until(
        || hub.link_state(executor_link).unwrap().sub == SubState::CmdExecutorBusyExecCmd,
        Duration::from_secs(2),
    ));

    // hammer the snapshots while the exchange runs; rules 1-2 must hold in
    // every single observation
    for _ in 0..100 {
        assert!(hub.link_state(initiator_link).unwrap().is_consistent());
        assert!(hub.link_state(executor_link).unwrap().is_consistent());
    }

    in_flight.join().unwrap().unwrap();
    assert!(wait_until(
        || hub.link_state(initiator_link).unwrap().sub == SubState::CmdInitiatorReady,
        Duration::from_secs(2),
    ));
    assert!(wait_until(
        || hub.link_state(executor_link).unwrap().sub == SubState::CmdExecutorReady,
        Duration::from_secs(2),
    ));
}

#[test]
fn dat_roles_expose_their_resting_substates() {
    init_logs();
    let hub = Hub::new();
    let srv = hub
        .online_service(SrvArgs::new(SrvUri::fifo("state/dat"), Usage::DAT_RECEIVER))
        .unwrap();
    let connector = {
        let hub = hub.clone();
        std::thread::spawn(move || {
            hub.connect_service(
                ConnArgs::new(SrvUri::fifo("state/dat"), Usage::DAT_SENDER),
                &Options::timeout_ms(2_000),
            )
        })
    };
    let receiver_link = hub.accept_client(srv, &Options::timeout_ms(2_000)).unwrap();
    let sender_link = connector.join().unwrap().unwrap();

    assert_eq!(
        hub.link_state(sender_link).unwrap().sub,
        SubState::DatSenderReady
    );
    assert_eq!(
        hub.link_state(receiver_link).unwrap().sub,
        SubState::DatReceiverReady
    );
}

/// The conles fabric reports BusyCbProcEvt exactly while a callback runs
#[test]
fn auto_link_main_state_tracks_callback_processing() {
    init_logs();
    let hub = Hub::new();
    let gated = Arc::new(GatedHandler::new());
    hub.sub_evt(
        LinkId::AUTO,
        SubEvtArgs::new(gated.clone(), vec![EVT_KEEPALIVE]),
    )
    .unwrap();

    assert_eq!(hub.link_state(LinkId::AUTO).unwrap().main, MainState::Ready);
    hub.post_evt(
        LinkId::AUTO,
        ioc_runtime::EvtDesc::new(EVT_KEEPALIVE),
        &Options::may_block(),
    )
    .unwrap();

    assert!(wait_until(
        || hub.link_state(LinkId::AUTO).unwrap().main == MainState::BusyCbProcEvt,
        Duration::from_secs(2),
    ));
    assert!(hub.link_state(LinkId::AUTO).unwrap().is_consistent());

    gated.open();
    assert!(wait_until(
        || hub.link_state(LinkId::AUTO).unwrap().main == MainState::Ready,
        Duration::from_secs(2),
    ));
}

#[test]
fn closed_links_stop_resolving() {
    init_logs();
    let hub = Hub::new();
    let (initiator_link, executor_link) =
        cmd_pair(&hub, "state/closed", Arc::new(EchoExecutor::new()));

    hub.close_link(initiator_link).unwrap();
    assert_eq!(
        hub.link_state(initiator_link).unwrap_err(),
        IocError::NotExistLink
    );
    assert_eq!(
        hub.link_conn_state(initiator_link).unwrap_err(),
        IocError::NotExistLink
    );

    // the surviving peer settles into Disconnected
    assert!(wait_until(
        || matches!(
            hub.link_conn_state(executor_link),
            Ok(ConnState::Disconnected) | Ok(ConnState::Broken)
        ),
        Duration::from_secs(2),
    ));
    assert!(hub.link_state(executor_link).unwrap().is_consistent());
}

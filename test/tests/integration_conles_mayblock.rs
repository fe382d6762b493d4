//! May-block EVT submission under queue pressure: a wedged consumer lets the
//! queue fill, and the next blocking post parks until dispatch resumes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ioc_runtime::{
    Capability, CapabilityId, EvtDesc, Hub, LinkId, MainState, Options, SubEvtArgs,
};
use ioc_test::helpers::{init_logs, wait_until, SleepyCounter, EVT_KEEPALIVE, EVT_SLEEP_999MS};

fn queue_depth(hub: &Hub) -> usize {
    match hub.capability(CapabilityId::ConlesModeEvent) {
        Capability::ConlesModeEvent {
            depth_evt_desc_queue,
            ..
        } => depth_evt_desc_queue,
        other => panic!("unexpected capability {other:?}"),
    }
}

#[test]
fn queue_full_may_block_post_blocks_until_dispatch_resumes() {
    init_logs();
    let hub = Hub::new();
    let depth = queue_depth(&hub);

    let sleepy = Arc::new(SleepyCounter::new(
        EVT_SLEEP_999MS,
        Duration::from_millis(999),
    ));
    hub.sub_evt(
        LinkId::AUTO,
        SubEvtArgs::new(sleepy.clone(), vec![EVT_SLEEP_999MS, EVT_KEEPALIVE]),
    )
    .unwrap();

    // posting the sleeper returns immediately; the 999 ms happen on the
    // dispatcher thread
    let post = Instant::now();
    hub.post_evt(
        LinkId::AUTO,
        EvtDesc::new(EVT_SLEEP_999MS),
        &Options::may_block(),
    )
    .unwrap();
    assert!(post.elapsed() < Duration::from_millis(100));

    assert!(wait_until(
        || hub.link_state(LinkId::AUTO).unwrap().main == MainState::BusyCbProcEvt,
        Duration::from_secs(2),
    ));

    // with the dispatcher wedged, exactly `depth` more posts fit
    let fill = Instant::now();
    for _ in 0..depth {
        hub.post_evt(
            LinkId::AUTO,
            EvtDesc::new(EVT_KEEPALIVE),
            &Options::may_block(),
        )
        .unwrap();
    }
    assert!(
        fill.elapsed() < Duration::from_millis(500),
        "posts into a non-full queue must not park"
    );

    // the queue is at capacity: this post parks until the sleeper finishes
    // and the dispatcher frees a slot
    let blocked = Instant::now();
    hub.post_evt(
        LinkId::AUTO,
        EvtDesc::new(EVT_KEEPALIVE),
        &Options::may_block(),
    )
    .unwrap();
    assert!(
        blocked.elapsed() >= Duration::from_millis(400),
        "a full queue must park a may-block post until dispatch resumes"
    );

    hub.force_proc_evt();
    assert!(wait_until(
        || sleepy.counter.count(EVT_KEEPALIVE) == depth as u64 + 1,
        Duration::from_secs(10),
    ));
    assert_eq!(sleepy.counter.count(EVT_SLEEP_999MS), 1);
}

#[test]
fn wakeup_releases_a_parked_dispatcher() {
    init_logs();
    let hub = Hub::new();
    // touch the fabric so a dispatcher exists and parks on the empty queue
    let snapshot = hub.link_state(LinkId::AUTO).unwrap();
    assert_eq!(snapshot.main, MainState::Ready);

    // a wakeup with nothing queued must not wedge anything
    hub.wakeup_proc_evt();
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(hub.link_state(LinkId::AUTO).unwrap().main, MainState::Ready);
}

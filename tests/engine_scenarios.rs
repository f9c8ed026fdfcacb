//! Engine scenario tests.
//!
//! Drive full rounds through [`Engine`] with an in-memory transport and a
//! paused tokio clock, so round deadlines fire instantly.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use netpinger::monitor::{RoundReport, RoundStats, Thresholds};
use netpinger::{
    ActionDispatcher, Engine, EngineError, EngineObserver, EngineSettings, GroupEvent, HostEvent,
    HostStatus, ReplyEvent, Transport, TransportError, TransportEvent, Verdict,
};
use tokio::sync::mpsc;

// =============================================================================
// Test Helpers
// =============================================================================

const IDENT: u16 = 0x4242;
const H1: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
const H2: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
const H3: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 3);

/// Answers echo requests for the hosts in `responders`, immediately.
///
/// Hosts in `failing` are rejected by `send`; hosts in `failing_late` are
/// accepted and then reported as failed on the event channel.
#[derive(Clone)]
struct FakeTransport {
    events: mpsc::Sender<TransportEvent>,
    responders: Arc<Mutex<HashSet<Ipv4Addr>>>,
    failing: Arc<Mutex<HashSet<Ipv4Addr>>>,
    failing_late: Arc<Mutex<HashSet<Ipv4Addr>>>,
    reply_identifier: Arc<Mutex<u16>>,
    sent: Arc<Mutex<Vec<(Ipv4Addr, u16, u16)>>>,
}

impl FakeTransport {
    fn set_responders(&self, hosts: &[Ipv4Addr]) {
        *self.responders.lock().unwrap() = hosts.iter().copied().collect();
    }

    fn set_failing(&self, hosts: &[Ipv4Addr]) {
        *self.failing.lock().unwrap() = hosts.iter().copied().collect();
    }

    fn set_failing_late(&self, hosts: &[Ipv4Addr]) {
        *self.failing_late.lock().unwrap() = hosts.iter().copied().collect();
    }

    fn set_reply_identifier(&self, identifier: u16) {
        *self.reply_identifier.lock().unwrap() = identifier;
    }

    fn sent(&self) -> Vec<(Ipv4Addr, u16, u16)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
    fn identifier(&self) -> u16 {
        IDENT
    }

    async fn send(
        &self,
        target: Ipv4Addr,
        identifier: u16,
        sequence: u16,
    ) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push((target, identifier, sequence));

        if self.failing.lock().unwrap().contains(&target) {
            return Err(TransportError::Send {
                target,
                reason: "network unreachable".to_string(),
            });
        }

        let fails_late = self.failing_late.lock().unwrap().contains(&target);
        if fails_late {
            let event = TransportEvent::SendFailed {
                target,
                sequence,
                error: TransportError::Send {
                    target,
                    reason: "no route to host".to_string(),
                },
            };
            self.events.send(event).await.expect("engine dropped receiver");
            return Ok(());
        }

        let answers = self.responders.lock().unwrap().contains(&target);
        if answers {
            let reply_identifier = *self.reply_identifier.lock().unwrap();
            let event = ReplyEvent::new(target, reply_identifier, sequence)
                .with_rtt(Duration::from_millis(1));
            self.events
                .send(event.into())
                .await
                .expect("engine dropped receiver");
        }
        Ok(())
    }
}

/// Records action invocations in order.
#[derive(Clone, Default)]
struct RecordingActions {
    calls: Arc<Mutex<Vec<&'static str>>>,
}

impl RecordingActions {
    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ActionDispatcher for RecordingActions {
    async fn on_alive(&self) {
        self.calls.lock().unwrap().push("alive");
    }

    async fn on_dead(&self) {
        self.calls.lock().unwrap().push("dead");
    }
}

/// What the engine reported through its observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Record {
    Host(Ipv4Addr, HostStatus),
    Group(Verdict, usize),
    SendFailed(Ipv4Addr),
}

#[derive(Default)]
struct RecordingObserver {
    records: Mutex<Vec<Record>>,
    rounds: Mutex<Vec<RoundStats>>,
}

impl RecordingObserver {
    fn take(&self) -> Vec<Record> {
        std::mem::take(&mut *self.records.lock().unwrap())
    }
}

impl EngineObserver for RecordingObserver {
    fn send_failed(&self, host: Ipv4Addr, _error: &TransportError) {
        self.records.lock().unwrap().push(Record::SendFailed(host));
    }

    fn host_changed(&self, host: Ipv4Addr, status: HostStatus) {
        self.records.lock().unwrap().push(Record::Host(host, status));
    }

    fn group_changed(&self, verdict: Verdict, up_count: usize, _total: usize) {
        self.records.lock().unwrap().push(Record::Group(verdict, up_count));
    }

    fn round_finished(&self, stats: &RoundStats) {
        self.rounds.lock().unwrap().push(*stats);
    }
}

struct Harness {
    engine: Engine<FakeTransport, RecordingActions>,
    transport: FakeTransport,
    actions: RecordingActions,
    observer: Arc<RecordingObserver>,
    inject: mpsc::Sender<TransportEvent>,
}

fn settings(
    targets: &[Ipv4Addr],
    alive_count: u32,
    dead_count: u32,
    group_alive: Option<usize>,
    group_dead: Option<usize>,
) -> EngineSettings {
    EngineSettings::new(
        targets.to_vec(),
        Duration::from_secs(1),
        Duration::from_secs(5),
        Thresholds::new(alive_count, dead_count).unwrap(),
        group_alive,
        group_dead,
    )
    .unwrap()
}

fn harness(
    targets: &[Ipv4Addr],
    alive_count: u32,
    dead_count: u32,
    group_alive: Option<usize>,
    group_dead: Option<usize>,
) -> Harness {
    let (tx, rx) = mpsc::channel(64);
    let transport = FakeTransport {
        events: tx.clone(),
        responders: Arc::default(),
        failing: Arc::default(),
        failing_late: Arc::default(),
        reply_identifier: Arc::new(Mutex::new(IDENT)),
        sent: Arc::default(),
    };
    let actions = RecordingActions::default();
    let observer = Arc::new(RecordingObserver::default());

    let settings = settings(targets, alive_count, dead_count, group_alive, group_dead);
    let engine = Engine::new(settings, transport.clone(), rx, actions.clone())
        .with_observer(observer.clone());

    Harness {
        engine,
        transport,
        actions,
        observer,
        inject: tx,
    }
}

impl Harness {
    async fn round(&mut self, responders: &[Ipv4Addr]) -> RoundReport {
        self.transport.set_responders(responders);
        self.engine.run_round().await.expect("round failed")
    }

    fn verdict(&self) -> Verdict {
        self.engine.snapshot().verdict
    }

    fn up_count(&self) -> usize {
        self.engine.snapshot().up_count
    }

    fn status(&self, host: Ipv4Addr) -> HostStatus {
        self.engine.snapshot().status_of(host).unwrap()
    }
}

// =============================================================================
// Host Hysteresis
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_single_host_comes_up_on_third_consecutive_reply() {
    let mut h = harness(&[H1], 3, 3, None, None);

    let r1 = h.round(&[]).await;
    assert!(r1.host_events.is_empty());
    assert_eq!(r1.stats.timed_out, 1);

    for _ in 0..2 {
        let r = h.round(&[H1]).await;
        assert!(r.host_events.is_empty());
        assert_eq!(h.status(H1), HostStatus::Down);
    }

    let r4 = h.round(&[H1]).await;
    assert_eq!(r4.host_events, vec![(H1, HostEvent::BecameUp)]);
    assert_eq!(h.status(H1), HostStatus::Up);
    assert_eq!(r4.group_events, vec![GroupEvent::BecameAlive]);
    assert_eq!(h.actions.calls(), vec!["alive"]);
}

#[tokio::test(start_paused = true)]
async fn test_up_host_does_not_re_fire() {
    let mut h = harness(&[H1], 2, 2, None, None);

    let mut up_events = 0;
    for _ in 0..8 {
        up_events += h.round(&[H1]).await.host_events.len();
    }
    assert_eq!(up_events, 1);
    assert_eq!(h.actions.calls(), vec!["alive"]);
}

#[tokio::test(start_paused = true)]
async fn test_isolated_loss_does_not_flap() {
    let mut h = harness(&[H1], 1, 2, None, None);
    h.round(&[H1]).await;
    assert_eq!(h.status(H1), HostStatus::Up);

    for responders in [&[][..], &[H1][..], &[][..], &[H1][..]] {
        let r = h.round(responders).await;
        assert!(r.host_events.is_empty());
    }
    assert_eq!(h.status(H1), HostStatus::Up);

    h.round(&[]).await;
    let r = h.round(&[]).await;
    assert_eq!(r.host_events, vec![(H1, HostEvent::BecameDown)]);
    assert_eq!(h.actions.calls(), vec!["alive", "dead"]);
}

// =============================================================================
// Group Aggregation
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_default_group_thresholds_require_all_hosts() {
    let mut h = harness(&[H1, H2, H3], 1, 1, None, None);

    h.round(&[H1, H2]).await;
    assert_eq!(h.up_count(), 2);
    assert_eq!(h.verdict(), Verdict::Dead);

    let r = h.round(&[H1, H2, H3]).await;
    assert_eq!(r.group_events, vec![GroupEvent::BecameAlive]);
    assert_eq!(h.verdict(), Verdict::Alive);

    let r = h.round(&[H2, H3]).await;
    assert_eq!(r.host_events, vec![(H1, HostEvent::BecameDown)]);
    assert!(r.group_events.is_empty());
    assert_eq!(h.up_count(), 2);
    assert_eq!(h.verdict(), Verdict::Alive);

    let r = h.round(&[]).await;
    assert_eq!(r.group_events, vec![GroupEvent::BecameDead]);
    assert_eq!(h.up_count(), 0);
    assert_eq!(h.verdict(), Verdict::Dead);

    assert_eq!(h.actions.calls(), vec!["alive", "dead"]);
}

#[tokio::test(start_paused = true)]
async fn test_quorum_group_thresholds() {
    let mut h = harness(&[H1, H2, H3], 1, 1, Some(2), Some(1));

    h.round(&[H1]).await;
    assert_eq!(h.verdict(), Verdict::Dead);

    let r = h.round(&[H1, H2]).await;
    assert_eq!(r.group_events, vec![GroupEvent::BecameAlive]);

    h.round(&[H1, H2, H3]).await;
    h.round(&[H1, H2]).await;
    assert_eq!(h.up_count(), 2);
    assert_eq!(h.verdict(), Verdict::Alive);

    let r = h.round(&[H1]).await;
    assert_eq!(r.group_events, vec![GroupEvent::BecameDead]);
    assert_eq!(h.up_count(), 1);
    assert_eq!(h.actions.calls(), vec!["alive", "dead"]);
}

#[tokio::test(start_paused = true)]
async fn test_up_count_matches_host_states() {
    let mut h = harness(&[H1, H2, H3], 2, 1, Some(1), None);
    let pattern: [&[Ipv4Addr]; 6] = [&[H1, H2], &[H1, H2], &[H2], &[H2, H3], &[H3], &[H1, H3]];

    for responders in pattern {
        h.round(responders).await;
        let snapshot = h.engine.snapshot();
        let up = snapshot
            .hosts
            .iter()
            .filter(|host| host.status == HostStatus::Up)
            .count();
        assert_eq!(snapshot.up_count, up);
    }
}

#[tokio::test(start_paused = true)]
async fn test_observer_sees_every_transition_once() {
    let mut h = harness(&[H1, H2, H3], 1, 1, None, None);
    let pattern: [&[Ipv4Addr]; 4] = [&[H1, H2], &[H1, H2, H3], &[H2, H3], &[]];

    for responders in pattern {
        let report = h.round(responders).await;
        let records = h.observer.take();

        let hosts: Vec<Record> = records
            .iter()
            .copied()
            .filter(|r| matches!(r, Record::Host(..)))
            .collect();
        let expected_hosts: Vec<Record> = report
            .host_events
            .iter()
            .map(|&(addr, event)| match event {
                HostEvent::BecameUp => Record::Host(addr, HostStatus::Up),
                HostEvent::BecameDown => Record::Host(addr, HostStatus::Down),
            })
            .collect();
        assert_eq!(hosts, expected_hosts);

        let groups: Vec<Record> = records
            .iter()
            .copied()
            .filter(|r| matches!(r, Record::Group(..)))
            .collect();
        let expected_groups: Vec<Record> = report
            .group_events
            .iter()
            .map(|event| match event {
                GroupEvent::BecameAlive => Record::Group(Verdict::Alive, h.up_count()),
                GroupEvent::BecameDead => Record::Group(Verdict::Dead, h.up_count()),
            })
            .collect();
        assert_eq!(groups, expected_groups);
    }

    let rounds = h.observer.rounds.lock().unwrap().len();
    assert_eq!(rounds, 4);
    assert_eq!(h.actions.calls(), vec!["alive", "dead"]);
}

#[tokio::test(start_paused = true)]
async fn test_observer_quiet_without_transitions() {
    let mut h = harness(&[H1, H2], 2, 2, None, None);

    h.round(&[H1]).await;
    h.round(&[H2]).await;
    assert!(h.observer.take().is_empty());
}

// =============================================================================
// Reply Matching
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_foreign_identifier_is_never_credited() {
    let mut h = harness(&[H1], 1, 1, None, None);
    h.transport.set_reply_identifier(IDENT.wrapping_add(1));

    let r = h.round(&[H1]).await;
    assert_eq!(r.stats.replies, 0);
    assert_eq!(r.stats.discarded, 1);
    assert_eq!(r.stats.timed_out, 1);
    assert_eq!(h.status(H1), HostStatus::Down);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_host_reply_is_discarded() {
    let mut h = harness(&[H1], 1, 1, None, None);
    h.inject
        .send(ReplyEvent::new(Ipv4Addr::new(192, 0, 2, 1), IDENT, 1).into())
        .await
        .unwrap();

    let r = h.round(&[]).await;
    assert_eq!(r.stats.discarded, 1);
    assert_eq!(r.stats.replies, 0);
}

#[tokio::test(start_paused = true)]
async fn test_late_reply_is_not_credited_to_next_round() {
    let mut h = harness(&[H1], 1, 1, None, None);

    let r1 = h.round(&[]).await;
    assert_eq!(r1.stats.timed_out, 1);

    // Reply for round 1 shows up after its deadline.
    h.inject
        .send(ReplyEvent::new(H1, IDENT, r1.stats.sequence).into())
        .await
        .unwrap();

    let r2 = h.round(&[]).await;
    assert_eq!(r2.stats.discarded, 1);
    assert_eq!(r2.stats.replies, 0);
    assert_eq!(r2.stats.timed_out, 1);
    assert_eq!(h.status(H1), HostStatus::Down);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_reply_counts_once() {
    let mut h = harness(&[H1], 2, 1, None, None);
    h.inject
        .send(ReplyEvent::new(H1, IDENT, 1).into())
        .await
        .unwrap();

    let r = h.round(&[H1]).await;
    assert_eq!(r.stats.replies, 1);
    assert_eq!(r.stats.discarded, 1);
    assert_eq!(h.engine.snapshot().hosts[0].streak, 1);
    assert_eq!(h.status(H1), HostStatus::Down);
}

// =============================================================================
// Round Mechanics & Errors
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_each_round_uses_a_fresh_sequence() {
    let mut h = harness(&[H1, H2], 1, 1, None, None);
    h.round(&[]).await;
    h.round(&[]).await;

    let sent = h.transport.sent();
    assert_eq!(
        sent,
        vec![
            (H1, IDENT, 1),
            (H2, IDENT, 1),
            (H1, IDENT, 2),
            (H2, IDENT, 2)
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_send_failure_does_not_abort_round() {
    let mut h = harness(&[H1, H2], 1, 1, Some(1), None);
    h.transport.set_failing(&[H1]);

    let r = h.round(&[H2]).await;
    assert_eq!(r.stats.sent, 2);
    assert_eq!(r.stats.send_failures, 1);
    assert_eq!(r.stats.replies, 1);
    assert_eq!(h.status(H2), HostStatus::Up);
    assert_eq!(h.verdict(), Verdict::Alive);
}

#[tokio::test(start_paused = true)]
async fn test_reported_send_failure_counts_and_times_out() {
    let mut h = harness(&[H1, H2], 1, 1, Some(1), None);
    h.transport.set_failing_late(&[H1]);

    let r = h.round(&[H1, H2]).await;
    assert_eq!(r.stats.sent, 2);
    assert_eq!(r.stats.send_failures, 1);
    assert_eq!(r.stats.replies, 1);
    assert_eq!(r.stats.timed_out, 1);
    assert_eq!(h.status(H1), HostStatus::Down);
    assert_eq!(h.status(H2), HostStatus::Up);
    assert!(h.observer.take().contains(&Record::SendFailed(H1)));
}

#[tokio::test(start_paused = true)]
async fn test_stale_send_failure_is_ignored() {
    let mut h = harness(&[H1], 1, 1, None, None);
    h.round(&[H1]).await;
    h.observer.take();

    h.inject
        .send(TransportEvent::SendFailed {
            target: H1,
            sequence: 1,
            error: TransportError::Send {
                target: H1,
                reason: "late".to_string(),
            },
        })
        .await
        .unwrap();
    let r = h.round(&[H1]).await;
    assert_eq!(r.stats.sequence, 2);
    assert_eq!(r.stats.send_failures, 0);
    assert!(h.observer.take().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_round_waits_for_the_deadline() {
    let mut h = harness(&[H1], 1, 1, None, None);

    let start = tokio::time::Instant::now();
    h.round(&[H1]).await;
    assert!(start.elapsed() >= Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_run_keeps_pinging_until_stopped() {
    let mut h = harness(&[H1], 1, 1, None, None);
    h.transport.set_responders(&[H1]);

    // One round is 1s of waiting plus 5s of pause.
    let result = tokio::time::timeout(Duration::from_secs(60), h.engine.run()).await;
    assert!(result.is_err(), "engine returned while its reply channel was open");

    let rounds = h.transport.sent().len();
    assert!(rounds >= 9, "expected at least 9 rounds, got {rounds}");
    assert_eq!(h.actions.calls(), vec!["alive"]);
}

/// Transport that never answers and holds no reply sender.
struct MuteTransport;

#[async_trait::async_trait]
impl Transport for MuteTransport {
    fn identifier(&self) -> u16 {
        IDENT
    }

    async fn send(&self, _: Ipv4Addr, _: u16, _: u16) -> Result<(), TransportError> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_run_fails_when_reply_channel_closes() {
    let (tx, rx) = mpsc::channel(1);
    let mut engine = Engine::new(
        settings(&[H1], 1, 1, None, None),
        MuteTransport,
        rx,
        RecordingActions::default(),
    );
    drop(tx);

    let err = engine.run().await.unwrap_err();
    assert!(matches!(err, EngineError::ReceiverClosed));
}

//! Integration tests for the participant state machine against an
//! in-memory coordinator.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::{AbortedArgs, ErrorCode, PreparedArgs, ShardIndex, TxnPartRequest};
use participant::{
    CallOutcome, Caller, CoordinatorClient, Participant, ParticipantError, ProtocolViolation,
    RetryPolicy, Rollbacker, Supervisor, TxnPartState, Vote, supervisor,
};
use rpc::RpcError;
use serde_json::Value;
use tokio::sync::Notify;

const TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct RecordingInner {
    votes: Mutex<Vec<Vote>>,
    attempts: AtomicU32,
    fail_next: AtomicU32,
    notify: Notify,
}

/// Records acknowledged votes; can be told to fail the next few calls.
#[derive(Clone, Default)]
struct RecordingCoordinator {
    inner: Arc<RecordingInner>,
}

impl RecordingCoordinator {
    fn fail_next(&self, calls: u32) {
        self.inner.fail_next.store(calls, Ordering::SeqCst);
    }

    fn attempts(&self) -> u32 {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    fn votes(&self) -> Vec<Vote> {
        self.inner.votes.lock().unwrap().clone()
    }

    async fn wait_for_votes(&self, count: usize) -> Vec<Vote> {
        tokio::time::timeout(TIMEOUT, async {
            loop {
                let notified = self.inner.notify.notified();
                let votes = self.votes();
                if votes.len() >= count {
                    return votes;
                }
                notified.await;
            }
        })
        .await
        .expect("timed out waiting for votes")
    }

    fn record(&self, vote: Vote) -> rpc::Result<()> {
        self.inner.attempts.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .inner
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(RpcError::ConnectionClosed);
        }
        self.inner.votes.lock().unwrap().push(vote);
        self.inner.notify.notify_waiters();
        Ok(())
    }
}

#[async_trait]
impl CoordinatorClient for RecordingCoordinator {
    async fn inform_prepared(&self, args: &PreparedArgs) -> rpc::Result<()> {
        self.record(Vote::Prepared(args.clone()))
    }

    async fn inform_aborted(&self, args: &AbortedArgs) -> rpc::Result<()> {
        self.record(Vote::Aborted(args.clone()))
    }
}

struct CountingRollbacker(Arc<AtomicUsize>);

#[async_trait]
impl Rollbacker for CountingRollbacker {
    async fn rollback(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Returns a fixed error code, optionally waiting on a gate first.
struct FixedCaller {
    err_code: ErrorCode,
    with_rollbacker: bool,
    gate: Option<Arc<Notify>>,
    calls: AtomicUsize,
    rollbacks: Arc<AtomicUsize>,
}

impl FixedCaller {
    fn new(err_code: i32) -> Self {
        Self {
            err_code: ErrorCode::new(err_code),
            with_rollbacker: true,
            gate: None,
            calls: AtomicUsize::new(0),
            rollbacks: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn without_rollbacker(mut self) -> Self {
        self.with_rollbacker = false;
        self
    }

    fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }
}

#[async_trait]
impl Caller for FixedCaller {
    async fn call(&self, _input: &Value) -> CallOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let rollbacker = self.with_rollbacker.then(|| {
            Box::new(CountingRollbacker(Arc::clone(&self.rollbacks))) as Box<dyn Rollbacker>
        });
        CallOutcome::new(self.err_code, rollbacker)
    }
}

struct TestHarness {
    participant: Participant<RecordingCoordinator>,
    coordinator: RecordingCoordinator,
    supervisor: Supervisor,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_retry(RetryPolicy::unlimited())
    }

    fn with_retry(retry: RetryPolicy) -> Self {
        let (reporter, supervisor) = supervisor();
        let coordinator = RecordingCoordinator::default();
        let participant = Participant::new(coordinator.clone(), retry, reporter);
        Self {
            participant,
            coordinator,
            supervisor,
        }
    }

    fn register(&self, name: &str, caller: FixedCaller) -> Arc<FixedCaller> {
        let caller = Arc::new(caller);
        self.participant
            .register_caller(name, caller.clone())
            .unwrap();
        caller
    }

    async fn next_violation(&mut self) -> ProtocolViolation {
        tokio::time::timeout(TIMEOUT, self.supervisor.next_violation())
            .await
            .expect("timed out waiting for violation")
            .expect("supervisor closed")
    }
}

fn request(txn_id: &str, shard: u32, call_name: &str) -> TxnPartRequest {
    TxnPartRequest::new(txn_id, shard, call_name, Value::Null)
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_prepare_then_commit() {
    let harness = TestHarness::new();
    let caller = harness.register("debit", FixedCaller::new(0));

    let part = harness.participant.submit_txn_part(request("t1", 0, "debit"));
    let votes = harness.coordinator.wait_for_votes(1).await;

    assert_eq!(
        votes,
        vec![Vote::Prepared(PreparedArgs {
            shard_index: ShardIndex::new(0),
            txn_id: "t1".into(),
            err_code: ErrorCode::OK,
        })]
    );
    assert_eq!(part.state(), TxnPartState::Prepared);
    assert_eq!(harness.participant.part_state(part.id()), Some(TxnPartState::Prepared));

    assert_eq!(part.id().as_str(), "t1-0");
    let state = harness.participant.commit(part.id()).unwrap();
    assert_eq!(state, Some(TxnPartState::Committed));
    assert_eq!(part.state(), TxnPartState::Committed);
    assert_eq!(harness.participant.in_flight(), 0);
    assert_eq!(caller.rollbacks.load(Ordering::SeqCst), 0);

    assert_eq!(harness.participant.commit(part.id()).unwrap(), None);
    assert_eq!(harness.participant.abort(part.id()).await.unwrap(), None);
    assert_eq!(part.state(), TxnPartState::Committed);
}

#[tokio::test]
async fn test_local_failure_rolls_back_and_votes_aborted() {
    let harness = TestHarness::new();
    let caller = harness.register("debit", FixedCaller::new(7));

    let part = harness.participant.submit_txn_part(request("t1", 0, "debit"));
    let votes = harness.coordinator.wait_for_votes(1).await;

    assert_eq!(
        votes,
        vec![Vote::Aborted(AbortedArgs {
            shard_index: ShardIndex::new(0),
            txn_id: "t1".into(),
            err_code: ErrorCode::new(7),
        })]
    );
    assert_eq!(part.state(), TxnPartState::Aborted);
    assert_eq!(part.err_code(), Some(ErrorCode::new(7)));
    assert_eq!(caller.rollbacks.load(Ordering::SeqCst), 1);
    assert_eq!(harness.participant.in_flight(), 0);

    // The coordinator's own abort arrives later and finds nothing.
    assert_eq!(harness.participant.abort(part.id()).await.unwrap(), None);
    assert_eq!(caller.rollbacks.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_abort_after_prepare_rolls_back_once() {
    let harness = TestHarness::new();
    let caller = harness.register("ok", FixedCaller::new(0));

    let part = harness.participant.submit_txn_part(request("t3", 0, "ok"));
    harness.coordinator.wait_for_votes(1).await;

    let state = harness.participant.abort(part.id()).await.unwrap();
    assert_eq!(state, Some(TxnPartState::Aborted));
    assert!(part.is_rolled_back());
    assert_eq!(caller.rollbacks.load(Ordering::SeqCst), 1);

    assert_eq!(harness.participant.abort(part.id()).await.unwrap(), None);
    assert_eq!(harness.participant.commit(part.id()).unwrap(), None);
    assert_eq!(caller.rollbacks.load(Ordering::SeqCst), 1);
    assert_eq!(part.state(), TxnPartState::Aborted);
}

#[tokio::test]
async fn test_abort_while_working_defers_rollback() {
    let harness = TestHarness::new();
    let gate = Arc::new(Notify::new());
    let caller = harness.register("slow", FixedCaller::new(0).gated(gate.clone()));

    let part = harness.participant.submit_txn_part(request("t4", 0, "slow"));
    eventually(|| caller.calls.load(Ordering::SeqCst) == 1).await;

    let state = harness.participant.abort(part.id()).await.unwrap();
    assert_eq!(state, Some(TxnPartState::Aborted));
    assert_eq!(caller.rollbacks.load(Ordering::SeqCst), 0);

    gate.notify_one();
    let votes = harness.coordinator.wait_for_votes(1).await;

    assert_eq!(
        votes,
        vec![Vote::Prepared(PreparedArgs {
            shard_index: ShardIndex::new(0),
            txn_id: "t4".into(),
            err_code: ErrorCode::OK,
        })]
    );
    assert_eq!(part.state(), TxnPartState::Aborted);
    assert_eq!(caller.rollbacks.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failure_after_abort_still_votes_aborted() {
    let harness = TestHarness::new();
    let gate = Arc::new(Notify::new());
    let caller = harness.register("slow", FixedCaller::new(7).gated(gate.clone()));

    let part = harness.participant.submit_txn_part(request("p1", 0, "slow"));
    eventually(|| caller.calls.load(Ordering::SeqCst) == 1).await;
    harness.participant.abort(part.id()).await.unwrap();

    gate.notify_one();
    let votes = harness.coordinator.wait_for_votes(1).await;

    assert_eq!(
        votes,
        vec![Vote::Aborted(AbortedArgs {
            shard_index: ShardIndex::new(0),
            txn_id: "p1".into(),
            err_code: ErrorCode::new(7),
        })]
    );
    assert_eq!(part.state(), TxnPartState::Aborted);
    assert_eq!(part.err_code(), Some(ErrorCode::new(7)));
    assert_eq!(caller.rollbacks.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(harness.coordinator.votes().len(), 1);
}

#[tokio::test]
async fn test_commit_on_working_part_is_rejected() {
    let harness = TestHarness::new();
    let gate = Arc::new(Notify::new());
    let caller = harness.register("slow", FixedCaller::new(0).gated(gate.clone()));

    let part = harness.participant.submit_txn_part(request("t5", 0, "slow"));
    eventually(|| caller.calls.load(Ordering::SeqCst) == 1).await;

    let result = harness.participant.commit(part.id());
    assert!(matches!(
        result,
        Err(ParticipantError::IllegalTransition {
            from: TxnPartState::Working,
            to: TxnPartState::Committed,
            ..
        })
    ));
    assert_eq!(harness.participant.in_flight(), 0);

    gate.notify_one();
    harness.coordinator.wait_for_votes(1).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_aborts_roll_back_each_part_once() {
    let harness = TestHarness::new();
    let caller = harness.register("ok", FixedCaller::new(0));

    let parts: Vec<_> = (0..50)
        .map(|shard| harness.participant.submit_txn_part(request("t6", shard, "ok")))
        .collect();
    harness.coordinator.wait_for_votes(parts.len()).await;

    let mut tasks = tokio::task::JoinSet::new();
    for part in &parts {
        for _ in 0..2 {
            let participant = harness.participant.clone();
            let id = part.id().clone();
            tasks.spawn(async move { participant.abort(&id).await });
        }
    }

    let mut removed = 0;
    while let Some(result) = tasks.join_next().await {
        if result.unwrap().unwrap().is_some() {
            removed += 1;
        }
    }

    assert_eq!(removed, parts.len());
    assert_eq!(caller.rollbacks.load(Ordering::SeqCst), parts.len());
    assert!(parts.iter().all(|part| part.state() == TxnPartState::Aborted));
    assert_eq!(harness.participant.in_flight(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_abort_racing_local_failure_rolls_back_once() {
    let harness = TestHarness::new();
    let caller = harness.register("fail", FixedCaller::new(3));

    let mut tasks = tokio::task::JoinSet::new();
    for shard in 0..50 {
        let part = harness.participant.submit_txn_part(request("t7", shard, "fail"));
        let participant = harness.participant.clone();
        tasks.spawn(async move { participant.abort(part.id()).await });
    }
    while let Some(result) = tasks.join_next().await {
        result.unwrap().unwrap();
    }

    eventually(|| caller.rollbacks.load(Ordering::SeqCst) >= 50).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let votes = harness.coordinator.wait_for_votes(50).await;
    assert_eq!(votes.len(), 50);
    assert!(votes.iter().all(|vote| matches!(
        vote,
        Vote::Aborted(args) if args.err_code == ErrorCode::new(3)
    )));
    assert_eq!(caller.rollbacks.load(Ordering::SeqCst), 50);
    assert_eq!(harness.participant.in_flight(), 0);
}

#[tokio::test]
async fn test_unregistered_caller_is_reported() {
    let mut harness = TestHarness::new();

    let part = harness.participant.submit_txn_part(request("t8", 0, "missing"));

    let violation = harness.next_violation().await;
    assert_eq!(
        violation,
        ProtocolViolation::UnregisteredCaller {
            part_id: part.id().clone(),
            call_name: "missing".to_string(),
        }
    );
    assert_eq!(part.state(), TxnPartState::Working);
    assert!(harness.coordinator.votes().is_empty());
}

#[tokio::test]
async fn test_failure_without_rollbacker_is_reported() {
    let mut harness = TestHarness::new();
    harness.register("bare", FixedCaller::new(4).without_rollbacker());

    let part = harness.participant.submit_txn_part(request("t9", 2, "bare"));

    let violation = harness.next_violation().await;
    assert!(matches!(violation, ProtocolViolation::MissingRollbacker { .. }));
    assert_eq!(part.state(), TxnPartState::Aborted);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(harness.coordinator.votes().is_empty());
}

#[tokio::test]
async fn test_abort_without_rollbacker_is_fatal() {
    let mut harness = TestHarness::new();
    harness.register("bare", FixedCaller::new(0).without_rollbacker());

    let part = harness.participant.submit_txn_part(request("t10", 0, "bare"));
    harness.coordinator.wait_for_votes(1).await;

    let result = harness.participant.abort(part.id()).await;
    assert!(result.is_err_and(|e| e.is_fatal()));
    assert!(matches!(
        harness.next_violation().await,
        ProtocolViolation::MissingRollbacker { .. }
    ));
}

#[tokio::test]
async fn test_duplicate_caller_is_rejected() {
    let harness = TestHarness::new();
    harness.register("ok", FixedCaller::new(0));

    let result = harness
        .participant
        .register_caller("ok", Arc::new(FixedCaller::new(0)));

    assert!(matches!(result, Err(ParticipantError::DuplicateCaller(name)) if name == "ok"));
    assert_eq!(harness.participant.callers().len(), 1);
}

#[tokio::test]
async fn test_vote_is_retried_until_acknowledged() {
    let harness = TestHarness::new();
    harness.register("ok", FixedCaller::new(0));
    harness.coordinator.fail_next(3);

    harness.participant.submit_txn_part(request("t11", 0, "ok"));
    harness.coordinator.wait_for_votes(1).await;

    assert_eq!(harness.coordinator.attempts(), 4);
}

#[tokio::test]
async fn test_capped_retries_leave_part_prepared() {
    let harness = TestHarness::with_retry(RetryPolicy::unlimited().with_max_attempts(2));
    harness.register("ok", FixedCaller::new(0));
    harness.coordinator.fail_next(10);

    let part = harness.participant.submit_txn_part(request("t12", 0, "ok"));
    eventually(|| harness.coordinator.attempts() == 2).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(harness.coordinator.attempts(), 2);
    assert!(harness.coordinator.votes().is_empty());
    assert_eq!(harness.participant.part_state(part.id()), Some(TxnPartState::Prepared));
}

#[tokio::test]
async fn test_state_changes_can_be_awaited() {
    let harness = TestHarness::new();
    let gate = Arc::new(Notify::new());
    harness.register("slow", FixedCaller::new(0).gated(gate.clone()));

    let part = harness.participant.submit_txn_part(request("t13", 0, "slow"));
    let mut states = part.subscribe();
    assert_eq!(*states.borrow(), TxnPartState::Working);

    gate.notify_one();
    tokio::time::timeout(TIMEOUT, states.wait_for(|state| *state == TxnPartState::Prepared))
        .await
        .unwrap()
        .unwrap();
}

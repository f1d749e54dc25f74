use super::*;
use crate::api::{Request, TransportErrorKind};
use crate::scenarios::SettleSpec;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Events = Arc<Mutex<Vec<String>>>;

struct ScriptedTransport {
    replies: Mutex<VecDeque<Result<Response, TransportError>>>,
    requests: Mutex<Vec<Request>>,
    events: Events,
}

impl ScriptedTransport {
    fn new(events: &Events, replies: Vec<Result<Response, TransportError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            events: Arc::clone(events),
        }
    }

    fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    fn execute(&self, request: &Request) -> Result<Response, TransportError> {
        self.events
            .lock()
            .unwrap()
            .push(format!("execute {}", request.operation));
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected request")
    }
}

struct RecordingClock {
    events: Events,
    cancel_during_sleep: bool,
}

impl RecordingClock {
    fn new(events: &Events) -> Self {
        Self {
            events: Arc::clone(events),
            cancel_during_sleep: false,
        }
    }
}

impl Clock for RecordingClock {
    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> Result<(), Cancelled> {
        self.events
            .lock()
            .unwrap()
            .push(format!("sleep {}", duration.as_secs()));
        if self.cancel_during_sleep {
            cancel.cancel();
            return Err(Cancelled);
        }
        Ok(())
    }
}

fn roots() -> ArtifactRoots {
    ArtifactRoots::new("/nonexistent/samples", "/nonexistent/input")
}

fn step(name: &str, operation: OperationId) -> StepSpec {
    StepSpec {
        name: name.to_string(),
        operation,
        description: None,
        after: Vec::new(),
        settle: None,
        path: BTreeMap::new(),
        query: BTreeMap::new(),
        body: None,
        artifacts: BTreeMap::new(),
        expect: Vec::new(),
        capture: BTreeMap::new(),
    }
}

fn scenario(steps: Vec<StepSpec>) -> ScenarioSpec {
    let mut vars = BTreeMap::new();
    vars.insert("channel".to_string(), "mychannel".to_string());
    ScenarioSpec {
        id: "test".to_string(),
        description: None,
        vars,
        steps,
    }
}

fn create_channel() -> StepSpec {
    let mut create = step("create_channel", OperationId::CreateChannel);
    create
        .path
        .insert("channel".to_string(), "${channel}".to_string());
    create.body = Some(json!({"envelope": "Q09ORklH"}));
    create.expect.push(Expectation::Equals {
        path: "/status".to_string(),
        value: json!("SUCCESS"),
    });
    create
}

fn join_channel() -> StepSpec {
    let mut join = step("join_channel", OperationId::JoinChannel);
    join.after = vec!["create_channel".to_string()];
    join.path
        .insert("channel".to_string(), "${channel}".to_string());
    join.body = Some(json!({"url": "grpc://0.0.0.0:7051", "opts": {"pem": "PEM"}}));
    join
}

fn install_fabcar(settle_secs: f64) -> StepSpec {
    let mut install = step("install_fabcar", OperationId::InstallChaincode);
    install.query.insert("peers".to_string(), "[0]".to_string());
    install.body = Some(json!({
        "chaincodeId": "fabcar",
        "chaincodePath": "fabcar",
        "chaincodeVersion": "1.0"
    }));
    install.settle = Some(SettleSpec {
        seconds: settle_secs,
        reason: "install completes asynchronously".to_string(),
    });
    install
}

fn instantiate_fabcar() -> StepSpec {
    let mut instantiate = step("instantiate_fabcar", OperationId::InstantiateChaincode);
    instantiate.after = vec!["install_fabcar".to_string()];
    instantiate
        .path
        .insert("channel".to_string(), "${channel}".to_string());
    instantiate.body = Some(json!({"chaincodeId": "fabcar", "chaincodeVersion": "1.0"}));
    instantiate
}

fn ok(body: serde_json::Value) -> Result<Response, TransportError> {
    Ok(Response::json(200, body))
}

#[test]
fn rejected_create_blocks_join_without_calling_it() {
    let events = Events::default();
    let transport = ScriptedTransport::new(&events, vec![ok(json!({"status": "BAD_REQUEST"}))]);
    let clock = RecordingClock::new(&events);
    let sequencer = Sequencer::new(&transport, &clock, roots());

    let run = sequencer
        .run(&scenario(vec![create_channel(), join_channel()]))
        .unwrap();

    assert!(matches!(
        run.outcome("create_channel"),
        Some(StepOutcome::Failed {
            kind: FailureKind::AssertionMismatch(_),
            response: Some(_)
        })
    ));
    match run.outcome("join_channel") {
        Some(StepOutcome::Blocked(BlockReason::Prerequisite(name))) => {
            assert_eq!(name, "create_channel");
        }
        other => panic!("expected join to be blocked, got {other:?}"),
    }
    assert_eq!(transport.requests().len(), 1);
    assert_eq!(run.failed_count(), 1);
    assert_eq!(run.blocked_count(), 1);
    assert!(!run.passed());
}

#[test]
fn blocked_steps_never_reach_the_transport() {
    let events = Events::default();
    let transport = ScriptedTransport::new(
        &events,
        vec![Err(TransportError::new(
            TransportErrorKind::Unreachable,
            "connection refused",
        ))],
    );
    let clock = RecordingClock::new(&events);
    let mut downstream = step("list", OperationId::ListChannels);
    downstream.after = vec!["join_channel".to_string()];
    let run = Sequencer::new(&transport, &clock, roots())
        .run(&scenario(vec![create_channel(), join_channel(), downstream]))
        .unwrap();

    assert!(matches!(
        run.outcome("create_channel"),
        Some(StepOutcome::Failed {
            kind: FailureKind::Transport(_),
            response: None
        })
    ));
    assert!(run.outcome("join_channel").unwrap().is_blocked());
    match run.outcome("list") {
        Some(StepOutcome::Blocked(BlockReason::Prerequisite(name))) => {
            assert_eq!(name, "join_channel");
        }
        other => panic!("expected list to be blocked, got {other:?}"),
    }
    assert_eq!(*events.lock().unwrap(), vec!["execute create_channel"]);
}

#[test]
fn expected_not_found_is_a_success() {
    let events = Events::default();
    let transport = ScriptedTransport::new(
        &events,
        vec![Ok(Response::json(404, json!({"error": {"statusCode": 404}})))],
    );
    let clock = RecordingClock::new(&events);
    let mut query = step("query_missing_block", OperationId::QueryLedger);
    query
        .path
        .insert("channel".to_string(), "${channel}".to_string());
    query
        .query
        .insert("blockId".to_string(), "99999".to_string());
    query.expect.push(Expectation::ErrorStatus { status: 404 });

    let run = Sequencer::new(&transport, &clock, roots())
        .run(&scenario(vec![query]))
        .unwrap();

    let Some(StepOutcome::Success(response)) = run.outcome("query_missing_block") else {
        panic!("expected success");
    };
    assert_eq!(response.status, 404);
    assert!(run.passed());
    assert_eq!(
        transport.requests()[0].path_and_query(),
        "/channels/mychannel/ledger?blockId=99999"
    );
}

#[test]
fn transport_failure_is_distinct_from_expected_error_status() {
    let events = Events::default();
    let transport = ScriptedTransport::new(
        &events,
        vec![Err(TransportError::new(
            TransportErrorKind::MalformedResponse,
            "body is not JSON",
        ))],
    );
    let clock = RecordingClock::new(&events);
    let mut query = step("query_missing_block", OperationId::QueryLedger);
    query
        .path
        .insert("channel".to_string(), "mychannel".to_string());
    query.expect.push(Expectation::ErrorStatus { status: 404 });

    let run = Sequencer::new(&transport, &clock, roots())
        .run(&scenario(vec![query]))
        .unwrap();
    match run.outcome("query_missing_block") {
        Some(StepOutcome::Failed {
            kind: FailureKind::Transport(err),
            ..
        }) => assert_eq!(err.kind, TransportErrorKind::MalformedResponse),
        other => panic!("expected transport failure, got {other:?}"),
    }
}

#[test]
fn settle_delay_completes_before_the_dependant_is_built() {
    let events = Events::default();
    let transport = ScriptedTransport::new(
        &events,
        vec![
            ok(json!({"peerResponses": []})),
            ok(json!({"status": "SUCCESS"})),
        ],
    );
    let clock = RecordingClock::new(&events);
    let run = Sequencer::new(&transport, &clock, roots())
        .run(&scenario(vec![install_fabcar(5.0), instantiate_fabcar()]))
        .unwrap();

    assert!(run.passed());
    assert_eq!(
        *events.lock().unwrap(),
        vec![
            "execute install_chaincode",
            "sleep 5",
            "execute instantiate_chaincode"
        ]
    );
}

#[test]
fn oversized_settle_is_rejected_before_any_request() {
    let events = Events::default();
    let transport = ScriptedTransport::new(&events, Vec::new());
    let clock = RecordingClock::new(&events);
    let result = Sequencer::new(&transport, &clock, roots())
        .run(&scenario(vec![install_fabcar(1e20), instantiate_fabcar()]));
    assert!(result.is_err());
    assert!(events.lock().unwrap().is_empty());
}

#[test]
fn failed_step_does_not_settle() {
    let events = Events::default();
    let transport = ScriptedTransport::new(
        &events,
        vec![Err(TransportError::new(TransportErrorKind::Timeout, "timed out"))],
    );
    let clock = RecordingClock::new(&events);
    let run = Sequencer::new(&transport, &clock, roots())
        .run(&scenario(vec![install_fabcar(5.0), instantiate_fabcar()]))
        .unwrap();

    assert_eq!(*events.lock().unwrap(), vec!["execute install_chaincode"]);
    assert!(run.outcome("instantiate_fabcar").unwrap().is_blocked());
}

#[test]
fn cancellation_while_settling_blocks_the_rest() {
    let events = Events::default();
    let transport = ScriptedTransport::new(&events, vec![ok(json!({"peerResponses": []}))]);
    let clock = RecordingClock {
        events: Arc::clone(&events),
        cancel_during_sleep: true,
    };
    let independent = step("list", OperationId::ListChannels);
    let run = Sequencer::new(&transport, &clock, roots())
        .run(&scenario(vec![
            install_fabcar(5.0),
            instantiate_fabcar(),
            independent,
        ]))
        .unwrap();

    assert!(run.cancelled);
    assert!(!run.passed());
    assert!(run.outcome("install_fabcar").unwrap().is_success());
    for name in ["instantiate_fabcar", "list"] {
        assert!(matches!(
            run.outcome(name),
            Some(StepOutcome::Blocked(BlockReason::Cancelled))
        ));
    }
    assert_eq!(transport.requests().len(), 1);
}

#[test]
fn pre_cancelled_token_runs_nothing() {
    let events = Events::default();
    let transport = ScriptedTransport::new(&events, Vec::new());
    let clock = RecordingClock::new(&events);
    let token = CancelToken::new();
    token.cancel();
    let run = Sequencer::new(&transport, &clock, roots())
        .with_cancel(token)
        .run(&scenario(vec![step("list", OperationId::ListChannels)]))
        .unwrap();
    assert!(run.cancelled);
    assert!(events.lock().unwrap().is_empty());
}

#[test]
fn stop_on_first_failure_blocks_independent_steps() {
    let events = Events::default();
    let transport = ScriptedTransport::new(&events, vec![ok(json!({"status": "FAILURE"}))]);
    let clock = RecordingClock::new(&events);
    let independent = step("list", OperationId::ListChannels);
    let run = Sequencer::new(&transport, &clock, roots())
        .with_policy(AbortPolicy::StopOnFirstFailure)
        .run(&scenario(vec![create_channel(), independent]))
        .unwrap();

    assert!(run.aborted);
    assert!(matches!(
        run.outcome("list"),
        Some(StepOutcome::Blocked(BlockReason::Aborted))
    ));
    assert_eq!(transport.requests().len(), 1);
}

#[test]
fn continue_policy_still_runs_independent_steps() {
    let events = Events::default();
    let transport = ScriptedTransport::new(
        &events,
        vec![
            ok(json!({"status": "FAILURE"})),
            ok(json!({"channels": []})),
        ],
    );
    let clock = RecordingClock::new(&events);
    let independent = step("list", OperationId::ListChannels);
    let run = Sequencer::new(&transport, &clock, roots())
        .run(&scenario(vec![create_channel(), independent]))
        .unwrap();
    assert!(!run.aborted);
    assert!(run.outcome("list").unwrap().is_success());
}

#[test]
fn build_errors_fail_without_a_network_call() {
    let events = Events::default();
    let transport = ScriptedTransport::new(&events, Vec::new());
    let clock = RecordingClock::new(&events);
    let mut instantiate = instantiate_fabcar();
    instantiate.after.clear();
    instantiate.body = Some(json!({"chaincodeId": "fabcar"}));
    let run = Sequencer::new(&transport, &clock, roots())
        .run(&scenario(vec![instantiate]))
        .unwrap();
    assert!(matches!(
        run.outcome("instantiate_fabcar"),
        Some(StepOutcome::Failed {
            kind: FailureKind::Request(RequestError::InvalidBody { .. }),
            ..
        })
    ));
    assert!(transport.requests().is_empty());
}

#[test]
fn missing_artifact_fails_the_step_before_sending() {
    let events = Events::default();
    let transport = ScriptedTransport::new(&events, Vec::new());
    let clock = RecordingClock::new(&events);
    let mut create = create_channel();
    create.body = None;
    create.artifacts.insert(
        "/envelope".to_string(),
        crate::scenarios::ArtifactRef {
            root: crate::scenarios::ArtifactRoot::Samples,
            path: "basic-network/config/channel.tx".to_string(),
            encoding: crate::scenarios::ArtifactEncoding::Base64,
        },
    );
    let run = Sequencer::new(&transport, &clock, roots())
        .run(&scenario(vec![create]))
        .unwrap();
    assert!(matches!(
        run.outcome("create_channel"),
        Some(StepOutcome::Failed {
            kind: FailureKind::Artifact(_),
            ..
        })
    ));
    assert!(transport.requests().is_empty());
}

#[test]
fn invalid_scenario_is_rejected_before_any_request() {
    let events = Events::default();
    let transport = ScriptedTransport::new(&events, Vec::new());
    let clock = RecordingClock::new(&events);
    let mut join = join_channel();
    join.after = vec!["missing".to_string()];
    let result = Sequencer::new(&transport, &clock, roots()).run(&scenario(vec![join]));
    assert!(result.is_err());
    assert!(events.lock().unwrap().is_empty());
}

#[test]
fn captured_values_feed_later_steps() {
    let events = Events::default();
    let transport = ScriptedTransport::new(
        &events,
        vec![
            ok(json!({"channels": [{"channel_id": "capturedchannel"}]})),
            ok(json!({"height": 3})),
        ],
    );
    let clock = RecordingClock::new(&events);
    let mut list = step("list", OperationId::ListChannels);
    list.capture
        .insert("found".to_string(), "/channels/0/channel_id".to_string());
    let mut info = step("info", OperationId::ChannelInfo);
    info.after = vec!["list".to_string()];
    info.path.insert("channel".to_string(), "${found}".to_string());

    let run = Sequencer::new(&transport, &clock, roots())
        .run(&scenario(vec![list, info]))
        .unwrap();
    assert!(run.passed());
    assert_eq!(transport.requests()[1].path, "/channels/capturedchannel");
}

#[test]
fn consumer_of_a_failed_capture_is_blocked() {
    let events = Events::default();
    let transport = ScriptedTransport::new(&events, vec![ok(json!({"channels": []}))]);
    let clock = RecordingClock::new(&events);
    let mut list = step("list", OperationId::ListChannels);
    list.capture
        .insert("found".to_string(), "/channels/0/channel_id".to_string());
    let mut info = step("info", OperationId::ChannelInfo);
    info.after = vec!["list".to_string()];
    info.path.insert("channel".to_string(), "${found}".to_string());

    let run = Sequencer::new(&transport, &clock, roots())
        .run(&scenario(vec![list, info]))
        .unwrap();
    assert!(run.outcome("list").unwrap().is_failed());
    assert!(matches!(
        run.outcome("info"),
        Some(StepOutcome::Blocked(BlockReason::Prerequisite(name))) if name == "list"
    ));
    assert_eq!(transport.requests().len(), 1);
}

#[test]
fn capture_without_dependency_is_rejected_before_running() {
    let events = Events::default();
    let transport = ScriptedTransport::new(&events, Vec::new());
    let clock = RecordingClock::new(&events);
    let mut list = step("list", OperationId::ListChannels);
    list.capture
        .insert("found".to_string(), "/channels/0/channel_id".to_string());
    let mut info = step("info", OperationId::ChannelInfo);
    info.path.insert("channel".to_string(), "${found}".to_string());

    let result = Sequencer::new(&transport, &clock, roots()).run(&scenario(vec![list, info]));
    assert!(result.is_err());
    assert!(events.lock().unwrap().is_empty());
}

#[test]
fn missing_capture_is_an_assertion_mismatch() {
    let events = Events::default();
    let transport = ScriptedTransport::new(&events, vec![ok(json!({"channels": []}))]);
    let clock = RecordingClock::new(&events);
    let mut list = step("list", OperationId::ListChannels);
    list.capture
        .insert("found".to_string(), "/channels/0/channel_id".to_string());
    let run = Sequencer::new(&transport, &clock, roots())
        .run(&scenario(vec![list]))
        .unwrap();
    match run.outcome("list") {
        Some(StepOutcome::Failed {
            kind: FailureKind::AssertionMismatch(details),
            ..
        }) => assert!(details[0].contains("capture found")),
        other => panic!("expected capture failure, got {other:?}"),
    }
}

#[test]
fn independent_runs_share_a_transport_across_threads() {
    let events = Events::default();
    let transport = ScriptedTransport::new(
        &events,
        vec![ok(json!({"channels": []})), ok(json!({"channels": []}))],
    );
    let clock = RecordingClock::new(&events);
    let runs: Vec<Run> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..2)
            .map(|_| {
                scope.spawn(|| {
                    Sequencer::new(&transport, &clock, roots())
                        .run(&scenario(vec![step("list", OperationId::ListChannels)]))
                        .unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert!(runs.iter().all(Run::passed));
    assert_eq!(transport.requests().len(), 2);
}

//! The synchronous callback path: scripts blocking in `host.call`, host
//! replies, caller adoption, delivery failure, and shutdown interplay.

use crossbeam_channel::Receiver;
use moonlet_engine::{
    CALL_FAILED_SENTINEL, Engine, EngineError, HostMessage, Pid, Router, STATUS_OK, Term,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const RECV_TIMEOUT: Duration = Duration::from_secs(10);

fn harness() -> (Arc<Router>, Pid, Receiver<HostMessage>, Engine) {
    let router = Arc::new(Router::new());
    let (caller, inbox) = router.register();
    let engine = Engine::spawn(caller, router.clone()).expect("engine spawn");
    (router, caller, inbox, engine)
}

fn expect_ok(inbox: &Receiver<HostMessage>) -> Term {
    match inbox.recv_timeout(RECV_TIMEOUT).expect("response") {
        HostMessage::Response(Term::Tuple(mut pair)) => {
            let value = pair.pop().unwrap();
            assert_eq!(pair.pop().unwrap(), Term::atom(STATUS_OK));
            value
        }
        other => panic!("expected a response, got {other:?}"),
    }
}

fn expect_callback(inbox: &Receiver<HostMessage>) -> Term {
    match inbox.recv_timeout(RECV_TIMEOUT).expect("callback") {
        HostMessage::Callback(term) => term,
        other => panic!("expected a callback, got {other:?}"),
    }
}

fn define(engine: &Engine, inbox: &Receiver<HostMessage>, caller: Pid, code: &str) {
    engine.submit_eval(code, caller).unwrap();
    expect_ok(inbox);
}

#[test]
fn test_callback_round_trip() {
    let (_router, caller, inbox, engine) = harness();
    define(
        &engine,
        &inbox,
        caller,
        "function ping() return host.call('ping') end",
    );

    engine.submit_call("ping", vec![], caller).unwrap();
    assert_eq!(expect_callback(&inbox), Term::binary("ping"));

    engine.submit_response(Term::atom("pong"), caller).unwrap();
    assert_eq!(expect_ok(&inbox), Term::binary("pong"));
}

#[test]
fn test_callback_argument_conventions() {
    let (_router, caller, inbox, engine) = harness();
    define(
        &engine,
        &inbox,
        caller,
        r#"
        function noargs() return host.call() end
        function multi() return host.call('a', 1, 2) end
        "#,
    );

    engine.submit_call("noargs", vec![], caller).unwrap();
    assert_eq!(expect_callback(&inbox), Term::atom("undefined"));
    engine.submit_response(Term::nil(), caller).unwrap();
    expect_ok(&inbox);

    engine.submit_call("multi", vec![], caller).unwrap();
    assert_eq!(
        expect_callback(&inbox),
        Term::tuple(vec![Term::binary("a"), Term::int(1), Term::int(2)])
    );
    engine.submit_response(Term::nil(), caller).unwrap();
    expect_ok(&inbox);
}

#[test]
fn test_reply_caller_is_adopted_for_next_callback() {
    let (router, caller_a, inbox_a, engine) = harness();
    let (caller_b, inbox_b) = router.register();
    define(
        &engine,
        &inbox_a,
        caller_a,
        r#"
        function chain()
            local first = host.call('first')
            local second = host.call('second')
            return first, second
        end
        "#,
    );

    engine.submit_call("chain", vec![], caller_a).unwrap();
    assert_eq!(expect_callback(&inbox_a), Term::binary("first"));

    // Answer as caller B: the script's next host.call must go to B.
    engine
        .submit_response(Term::binary("one"), caller_b)
        .unwrap();
    assert_eq!(expect_callback(&inbox_b), Term::binary("second"));

    engine
        .submit_response(Term::binary("two"), caller_a)
        .unwrap();
    // The task response still goes to the submitting caller, not the
    // adopted one.
    assert_eq!(
        expect_ok(&inbox_a),
        Term::tuple(vec![Term::binary("one"), Term::binary("two")])
    );
    assert!(inbox_b.is_empty());
}

#[test]
fn test_undeliverable_callback_returns_sentinel_to_script() {
    let (_router, caller, inbox, engine) = harness();
    define(
        &engine,
        &inbox,
        caller,
        r#"
        function try()
            outcome = host.call('anyone there?')
            return 1
        end
        "#,
    );

    // A caller nobody registered: the callback cannot be posted, and the
    // task's own response is dropped for the same reason.
    let ghost = Pid::from_raw(u64::MAX);
    engine.submit_call("try", vec![], ghost).unwrap();

    engine.submit_eval("return outcome", caller).unwrap();
    assert_eq!(expect_ok(&inbox), Term::binary(CALL_FAILED_SENTINEL));
}

#[test]
fn test_response_after_callback_settles_is_rejected() {
    let (_router, caller, inbox, engine) = harness();
    define(
        &engine,
        &inbox,
        caller,
        "function ping() return host.call('ping') end",
    );

    engine.submit_call("ping", vec![], caller).unwrap();
    expect_callback(&inbox);
    engine.submit_response(Term::atom("pong"), caller).unwrap();
    expect_ok(&inbox);

    assert!(matches!(
        engine.submit_response(Term::atom("pong"), caller),
        Err(EngineError::NoPendingCallback)
    ));
}

#[test]
fn test_stop_waits_for_pending_callback() {
    let (_router, caller, inbox, engine) = harness();
    let engine = Arc::new(engine);
    define(
        &engine,
        &inbox,
        caller,
        "function ping() return host.call('ping') end",
    );

    engine.submit_call("ping", vec![], caller).unwrap();
    expect_callback(&inbox);

    // stop() blocks until the in-flight task finishes, so it must run on
    // another thread while this one answers the callback.
    let stopper = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || engine.stop())
    };
    engine.submit_response(Term::atom("pong"), caller).unwrap();
    stopper.join().unwrap();

    assert_eq!(expect_ok(&inbox), Term::binary("pong"));
    assert!(matches!(
        engine.submit_eval("return 1", caller),
        Err(EngineError::Closed)
    ));
}

#[test]
fn test_host_atom_constructor() {
    let (_router, caller, inbox, engine) = harness();
    engine
        .submit_eval("return host.atom('ready')", caller)
        .unwrap();
    assert_eq!(expect_ok(&inbox), Term::atom("ready"));
}

#[test]
fn test_json_capability_is_installed() {
    let (_router, caller, inbox, engine) = harness();
    engine
        .submit_eval("return json.encode({1, 2, 3})", caller)
        .unwrap();
    assert_eq!(expect_ok(&inbox), Term::binary("[1,2,3]"));
}

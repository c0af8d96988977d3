//! Command binding: ownership, conflicts, release and dispatch.

use luna_runtime::testing::{ModuleFixture, RecordingHost};
use luna_runtime::{BindOutcome, LunaError, Runtime};
use std::rc::Rc;
use std::time::{Duration, Instant};

fn setup() -> (ModuleFixture, Rc<RecordingHost>) {
    (ModuleFixture::new(), Rc::new(RecordingHost::new()))
}

const ECHO_ARGS_BIND: &str = r##"
luna.bind(function(...)
    local args = { ... }
    luna.echo(select("#", ...) .. ":" .. table.concat(args, ","))
end, "cmd1")
return {}
"##;

#[test]
fn bind_receives_arguments_as_strings() {
    let (fixture, host) = setup();
    fixture.add_module("binder", ECHO_ARGS_BIND);
    let mut runtime = Runtime::new(fixture.config(), host.clone());
    runtime.run("binder").expect("run");

    runtime.submit_bind_invocation("cmd1 a bb ccc");
    let report = runtime.tick_at(Instant::now());

    assert_eq!(report.binds, 1);
    assert_eq!(host.echoes(), vec!["3:a,bb,ccc"]);
}

#[test]
fn bind_without_arguments() {
    let (fixture, host) = setup();
    fixture.add_module("binder", ECHO_ARGS_BIND);
    let mut runtime = Runtime::new(fixture.config(), host.clone());
    runtime.run("binder").expect("run");

    assert_eq!(runtime.dispatch_bind("cmd1"), BindOutcome::Invoked("cmd1".into()));
    assert_eq!(host.echoes(), vec!["0:"]);
}

#[test]
fn conflicting_bind_is_rejected_and_original_kept() {
    let (fixture, host) = setup();
    fixture.add_module("first", ECHO_ARGS_BIND);
    fixture.add_module(
        "second",
        r#"
        local ok, err = pcall(luna.bind, function() luna.echo("second") end, "cmd1")
        if not ok and string.find(tostring(err), "conflicting bind cmd1 already exists", 1, true) then
            luna.echo("conflict")
        end
        return {}
        "#,
    );
    let mut runtime = Runtime::new(fixture.config(), host.clone());
    runtime.run("first").expect("run first");
    runtime.run("second").expect("run second");

    assert_eq!(host.echoes(), vec!["conflict"]);
    assert_eq!(runtime.binding_owner("cmd1").as_deref(), Some("first"));

    runtime.dispatch_bind("cmd1 x");
    assert_eq!(host.echoes(), vec!["conflict", "1:x"]);
}

#[test]
fn unguarded_conflict_fails_the_load() {
    let (fixture, host) = setup();
    fixture.add_module("first", ECHO_ARGS_BIND);
    fixture.add_module("second", ECHO_ARGS_BIND);
    let mut runtime = Runtime::new(fixture.config(), host.clone());
    runtime.run("first").expect("run first");

    let err = runtime.run("second").expect_err("conflict");
    assert!(matches!(err, LunaError::Lua(_)));
    assert!(!runtime.is_running("second"));
    assert_eq!(runtime.binding_owner("cmd1").as_deref(), Some("first"));
}

#[test]
fn invalid_names_are_rejected() {
    let (fixture, host) = setup();
    fixture.add_module(
        "names",
        r#"
        for _, name in ipairs({ "abc", "1abc", "ab-cd" }) do
            local ok = pcall(luna.bind, function() end, name)
            luna.echo(name .. "=" .. tostring(ok))
        end
        return {}
        "#,
    );
    let mut runtime = Runtime::new(fixture.config(), host.clone());
    runtime.run("names").expect("run");

    assert_eq!(host.echoes(), vec!["abc=false", "1abc=false", "ab-cd=false"]);
    assert_eq!(runtime.binding_count(), 0);
}

#[test]
fn stop_releases_bindings_for_reuse() {
    let (fixture, host) = setup();
    fixture.add_module("first", ECHO_ARGS_BIND);
    fixture.add_module("second", ECHO_ARGS_BIND);
    let mut runtime = Runtime::new(fixture.config(), host.clone());
    runtime.run("first").expect("run first");
    assert_eq!(runtime.binding_count(), 1);

    assert_eq!(runtime.stop("first"), 1);
    assert_eq!(runtime.binding_count(), 0);
    assert_eq!(runtime.dispatch_bind("cmd1"), BindOutcome::Unknown("cmd1".into()));

    runtime.run("second").expect("run second");
    assert_eq!(runtime.binding_owner("cmd1").as_deref(), Some("second"));
}

#[test]
fn failed_load_releases_partial_bindings() {
    let (fixture, host) = setup();
    fixture.add_module(
        "halfway",
        r#"
        luna.bind(function() end, "early")
        error("gave up")
        "#,
    );
    let mut runtime = Runtime::new(fixture.config(), host.clone());

    assert!(runtime.run("halfway").is_err());
    assert_eq!(runtime.binding_count(), 0);
}

#[test]
fn bind_error_is_contained() {
    let (fixture, host) = setup();
    fixture.add_module(
        "faulty",
        r#"
        luna.bind(function() error("bad handler") end, "oops")
        luna.bind(function() luna.echo("fine") end, "fine")
        return {}
        "#,
    );
    let mut runtime = Runtime::new(fixture.config(), host.clone());
    runtime.run("faulty").expect("run");

    runtime.submit_bind_invocation("oops");
    runtime.submit_bind_invocation("fine");
    runtime.tick_at(Instant::now());

    assert_eq!(host.echoes(), vec!["fine"]);
    assert!(runtime.is_running("faulty"));
}

#[test]
fn ldo_runs_on_the_following_tick() {
    let (fixture, host) = setup();
    fixture.add_module(
        "chain",
        r#"
        luna.bind(function() luna.echo("one"); luna.ldo("step2 x") end, "step1")
        luna.bind(function(arg) luna.echo("two " .. arg) end, "step2")
        return {}
        "#,
    );
    let mut runtime = Runtime::new(fixture.config(), host.clone());
    runtime.run("chain").expect("run");

    let t0 = Instant::now();
    runtime.submit_bind_invocation("step1");
    let first = runtime.tick_at(t0);
    assert_eq!(first.binds, 1);
    assert_eq!(host.echoes(), vec!["one"]);

    let second = runtime.tick_at(t0 + Duration::from_millis(16));
    assert_eq!(second.binds, 1);
    assert_eq!(host.echoes(), vec!["one", "two x"]);
}

#[test]
fn self_resubmitting_bind_makes_progress() {
    let (fixture, host) = setup();
    fixture.add_module(
        "again",
        r#"
        luna.bind(function() luna.echo("again"); luna.ldo("again") end, "again")
        return {}
        "#,
    );
    let mut runtime = Runtime::new(fixture.config(), host.clone());
    runtime.run("again").expect("run");

    let t0 = Instant::now();
    runtime.submit_bind_invocation("again");
    for i in 0..3 {
        runtime.tick_at(t0 + Duration::from_millis(16 * i));
    }

    assert_eq!(host.echoes().len(), 3);
}

#[test]
fn yield_from_bind_is_rejected() {
    let (fixture, host) = setup();
    fixture.add_module(
        "impatient",
        r#"
        luna.bind(function() luna.yield() end, "wait")
        return {}
        "#,
    );
    let mut runtime = Runtime::new(fixture.config(), host.clone());
    runtime.run("impatient").expect("run");

    match runtime.dispatch_bind("wait") {
        BindOutcome::Failed { command, error } => {
            assert_eq!(command, "wait");
            assert!(
                error.contains("yielding is not supported"),
                "unexpected error: {error}"
            );
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[test]
fn bind_coroutine_recovers_after_raw_yield_and_error() {
    let (fixture, host) = setup();
    fixture.add_module(
        "flaky",
        r#"
        local calls = 0
        luna.bind(function(mode)
            calls = calls + 1
            if mode == "yield" then coroutine.yield() end
            if mode == "fail" then error("failed on purpose") end
            luna.echo("call " .. calls)
        end, "flaky")
        return {}
        "#,
    );
    let mut runtime = Runtime::new(fixture.config(), host.clone());
    runtime.run("flaky").expect("run");

    assert!(matches!(
        runtime.dispatch_bind("flaky yield"),
        BindOutcome::Failed { .. }
    ));
    assert!(matches!(
        runtime.dispatch_bind("flaky fail"),
        BindOutcome::Failed { .. }
    ));
    assert_eq!(
        runtime.dispatch_bind("flaky ok"),
        BindOutcome::Invoked("flaky".into())
    );
    assert_eq!(host.echoes(), vec!["call 3"]);
}

#[test]
fn long_arguments_are_truncated() {
    let (fixture, host) = setup();
    fixture.add_module(
        "sizer",
        r#"
        luna.bind(function(arg) luna.echo(tostring(#arg)) end, "size")
        return {}
        "#,
    );
    let mut runtime = Runtime::new(fixture.config(), host.clone());
    runtime.run("sizer").expect("run");

    let long = "x".repeat(5000);
    runtime.dispatch_bind(&format!("size {long}"));

    assert_eq!(host.echoes(), vec!["2047"]);
}

//! Executor behaviour against scripted in-memory processes.

use procstream::prelude::*;
use procstream::{ExecutorConfig, ProcessDataSourceFactory};
use procstream_host::HostError;
use procstream_test_utils::{init_tracing, with_timeout, HostProbe, Script, ScriptedHostFactory};
use std::sync::Arc;
use std::time::Duration;

type ScriptedExecutor = CommandExecutor<ProcessDataSourceFactory<ScriptedHostFactory>>;

fn executor_with(hosts: ScriptedHostFactory, config: ExecutorConfig) -> (ScriptedExecutor, Arc<HostProbe>) {
    let probe = hosts.probe();
    let executor = CommandExecutor::new(ProcessDataSourceFactory::new(hosts, config));
    (executor, probe)
}

fn executor(script: Script) -> (ScriptedExecutor, Arc<HostProbe>) {
    executor_with(ScriptedHostFactory::new(script), ExecutorConfig::default())
}

fn spec() -> CommandSpec {
    CommandSpec::with_args("fake-tool", "run").expect("valid spec")
}

fn failures(error: &Error) -> Vec<&Error> {
    match error {
        Error::Aggregate(aggregate) => aggregate.iter().collect(),
        other => vec![other],
    }
}

#[tokio::test]
async fn test_data_lines_are_delivered_in_order() {
    init_tracing();
    let (executor, probe) = executor(Script::lines(&["a", "b", "c"], &[]));
    let mut command = CollectLines::new(spec());

    with_timeout(executor.run(&mut command)).await.expect("run succeeds");

    assert_eq!(command.lines(), ["a", "b", "c"]);
    assert_eq!(command.spec().state(), CommandState::Completed);
    assert_eq!(probe.spawns(), 1);
    assert_eq!(probe.stop_requests(), 1);
    assert_eq!(probe.disposals(), 1);
}

#[tokio::test]
async fn test_error_fragments_become_one_error() {
    init_tracing();
    let (executor, _probe) = executor(Script::lines(&["partial"], &["E1", "E2", ""]));
    let mut command = CollectLines::new(spec());

    let err = with_timeout(executor.run(&mut command))
        .await
        .expect_err("error text fails the run");

    let failures = failures(&err);
    assert_eq!(failures.len(), 1, "got: {err}");
    match failures[0] {
        Error::Process { message, truncated } => {
            assert_eq!(message, "E1E2");
            assert!(!truncated);
        }
        other => panic!("expected a process error, got {other:?}"),
    }
    assert_eq!(command.lines(), ["partial"]);
    assert_eq!(command.spec().state(), CommandState::Faulted);
}

#[tokio::test]
async fn test_final_filter_turns_error_text_into_last_value() {
    init_tracing();
    let (executor, _probe) = executor(Script::lines(&["a"], &["warning: ", "deprecated flag"]));
    let spec = spec().with_error_filter(FnErrorFilter::new(
        |_: &str| false,
        |text: &str| text.starts_with("warning:"),
    ));
    let mut command = CollectLines::new(spec);

    with_timeout(executor.run(&mut command)).await.expect("benign error text");

    assert_eq!(command.lines(), ["a", "warning: deprecated flag"]);
    assert_eq!(command.last(), Some("warning: deprecated flag"));
    assert_eq!(command.spec().state(), CommandState::Completed);
}

#[tokio::test]
async fn test_fragment_filter_routes_benign_lines_as_values() {
    init_tracing();
    let (executor, _probe) = executor(Script::lines(&[], &["progress 10%", "fatal: no repo", "progress 20%"]));
    let spec = spec().with_error_filter(FnErrorFilter::new(
        |fragment: &str| fragment.starts_with("progress"),
        |_: &str| false,
    ));
    let mut command = CollectLines::new(spec);

    let err = with_timeout(executor.run(&mut command))
        .await
        .expect_err("remaining error text fails the run");

    assert_eq!(command.lines(), ["progress 10%", "progress 20%"]);
    assert!(
        matches!(failures(&err).as_slice(), [Error::Process { message, .. }] if message == "fatal: no repo"),
        "got: {err:?}"
    );
}

#[tokio::test]
async fn test_empty_error_lines_do_not_fail_the_run() {
    init_tracing();
    let (executor, _probe) = executor(Script::lines(&["ok"], &["", ""]));
    let mut command = CollectLines::new(spec());

    with_timeout(executor.run(&mut command)).await.expect("empty error text is success");
    assert_eq!(command.lines(), ["ok"]);
}

#[tokio::test]
async fn test_stop_from_command_delivers_nothing_further() {
    init_tracing();
    let data: Vec<String> = (1..=10).map(|i| i.to_string()).collect();
    let data: Vec<&str> = data.iter().map(String::as_str).collect();
    let (executor, probe) = executor(Script::lines(&data, &[]).hang_stdout());
    let mut command = CollectLines::new(spec()).take(3);

    with_timeout(executor.run(&mut command)).await.expect("voluntary stop");

    assert_eq!(command.lines(), ["1", "2", "3"]);
    assert_eq!(command.spec().state(), CommandState::Completed);
    assert!(probe.stop_requests() >= 1);
    assert_eq!(probe.disposals(), 1);
}

#[tokio::test]
async fn test_stop_from_closure_command() {
    init_tracing();
    let (executor, _probe) = executor(Script::lines(&["keep", "halt", "never"], &[]));
    let mut seen = Vec::new();
    let mut command = FnCommand::new(spec(), |value: &str| {
        seen.push(value.to_string());
        if value == "halt" {
            Flow::Stop
        } else {
            Flow::Continue
        }
    });

    with_timeout(executor.run(&mut command)).await.expect("voluntary stop");
    assert_eq!(command.spec().state(), CommandState::Completed);
    drop(command);
    assert_eq!(seen, ["keep", "halt"]);
}

#[tokio::test]
async fn test_timeout_stops_the_process() {
    init_tracing();
    let (executor, probe) = executor(Script::hanging());
    let spec = CommandSpec::with_timeout("fake-tool", "wait", Duration::from_millis(20)).expect("valid");
    let mut command = CollectLines::new(spec);

    let err = with_timeout(executor.run(&mut command))
        .await
        .expect_err("hanging process times out");

    assert!(err.is_timeout(), "got: {err}");
    assert!(!err.is_canceled());
    assert_eq!(command.spec().state(), CommandState::Timeout);
    assert_eq!(probe.stop_requests(), 1);
    assert_eq!(probe.disposals(), 1);
}

#[tokio::test]
async fn test_lines_before_timeout_are_delivered() {
    init_tracing();
    let (executor, _probe) = executor(Script::new().stdout("early").hang_stdout().hang_stderr());
    let spec = CommandSpec::with_timeout("fake-tool", "wait", Duration::from_millis(50)).expect("valid");
    let mut command = CollectLines::new(spec);

    let err = with_timeout(executor.run(&mut command)).await.expect_err("times out");

    assert!(err.is_timeout());
    assert_eq!(command.lines(), ["early"]);
}

#[tokio::test]
async fn test_external_cancellation() {
    init_tracing();
    let (executor, probe) = executor(Script::hanging());
    let mut command = CollectLines::new(spec());
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = with_timeout(executor.execute(&mut command, &cancel))
        .await
        .expect_err("canceled");

    assert!(err.is_canceled(), "got: {err}");
    assert!(matches!(err, Error::Aggregate(_)));
    assert_eq!(command.spec().state(), CommandState::Canceled);
    assert_eq!(probe.stop_requests(), 1);
    assert_eq!(probe.disposals(), 1);
}

#[tokio::test]
async fn test_already_canceled_is_rejected_without_spawning() {
    init_tracing();
    let (executor, probe) = executor(Script::lines(&["a"], &[]));
    let mut command = CollectLines::new(spec());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = executor
        .execute(&mut command, &cancel)
        .await
        .expect_err("rejected");

    assert!(matches!(err, Error::Canceled));
    assert_eq!(command.spec().state(), CommandState::NotStarted);
    assert_eq!(probe.spawns(), 0);
}

#[tokio::test]
async fn test_second_execution_is_rejected() {
    init_tracing();
    let (executor, probe) = executor(Script::lines(&["a"], &[]));
    let mut command = CollectLines::new(spec());

    with_timeout(executor.run(&mut command)).await.expect("first run");
    let err = executor.run(&mut command).await.expect_err("second run");

    assert!(matches!(err, Error::InvalidState(CommandState::Completed)));
    assert_eq!(command.spec().state(), CommandState::Completed);
    assert_eq!(command.lines(), ["a"]);
    assert_eq!(probe.spawns(), 1);
}

#[tokio::test]
async fn test_spawn_failure_faults_the_command() {
    init_tracing();
    let (executor, probe) =
        executor_with(ScriptedHostFactory::new(Script::new()).failing_spawn(), ExecutorConfig::default());
    let mut command = CollectLines::new(spec());

    let err = executor.run(&mut command).await.expect_err("spawn fails");

    assert!(matches!(err, Error::Spawn(HostError::SpawnFailed { .. })), "got: {err:?}");
    assert_eq!(command.spec().state(), CommandState::Faulted);
    assert_eq!(probe.spawns(), 1);
    assert_eq!(probe.stop_requests(), 0);
}

#[tokio::test]
async fn test_invalid_argument_string_is_a_spawn_error() {
    init_tracing();
    let (executor, probe) = executor(Script::lines(&["a"], &[]));
    let spec = CommandSpec::with_args("fake-tool", "--name 'unterminated").expect("valid");
    let mut command = CollectLines::new(spec);

    let err = executor.run(&mut command).await.expect_err("bad quoting");

    assert!(matches!(err, Error::Spawn(HostError::InvalidArguments(_))), "got: {err:?}");
    assert_eq!(probe.spawns(), 0);
}

#[tokio::test]
async fn test_arguments_are_split_for_the_host() {
    init_tracing();
    let (executor, probe) = executor(Script::lines(&[], &[]));
    let spec = CommandSpec::with_args("fake-tool", r#"log --format "%h %s" -n 3"#).expect("valid");
    let mut command = CollectLines::new(spec);

    with_timeout(executor.run(&mut command)).await.expect("run succeeds");

    let spawned = probe.last_spawn().expect("spawned");
    assert_eq!(spawned.program, "fake-tool");
    assert_eq!(spawned.args, ["log", "--format", "%h %s", "-n", "3"]);
}

#[tokio::test]
async fn test_shutdown_failure_is_reported_after_success() {
    init_tracing();
    let (executor, probe) =
        executor_with(ScriptedHostFactory::new(Script::lines(&["a"], &[])).failing_stop(), ExecutorConfig::default());
    let mut command = CollectLines::new(spec());

    let err = with_timeout(executor.run(&mut command)).await.expect_err("stop fails");

    assert!(matches!(failures(&err).as_slice(), [Error::Shutdown(_)]), "got: {err:?}");
    assert_eq!(command.spec().state(), CommandState::Completed);
    assert_eq!(command.lines(), ["a"]);
    assert_eq!(probe.disposals(), 1);
}

#[tokio::test]
async fn test_failed_voluntary_stop_faults_the_command() {
    init_tracing();
    let (executor, probe) = executor_with(
        ScriptedHostFactory::new(Script::lines(&["first", "second"], &[]).hang_stdout()).failing_stop(),
        ExecutorConfig::default(),
    );
    let mut command = CollectLines::new(spec()).take(1);

    let err = with_timeout(executor.run(&mut command)).await.expect_err("stop fails");

    assert!(matches!(failures(&err).as_slice(), [Error::Shutdown(_)]), "got: {err:?}");
    assert_eq!(command.spec().state(), CommandState::Faulted);
    assert_eq!(command.lines(), ["first"]);
    assert_eq!(probe.stop_requests(), 1);
    assert_eq!(probe.disposals(), 1);
}

#[tokio::test]
async fn test_shutdown_failure_is_added_to_primary_failure() {
    init_tracing();
    let (executor, _probe) = executor_with(
        ScriptedHostFactory::new(Script::hanging()).failing_stop(),
        ExecutorConfig::default(),
    );
    let spec = CommandSpec::with_timeout("fake-tool", "wait", Duration::from_millis(20)).expect("valid");
    let mut command = CollectLines::new(spec);

    let err = with_timeout(executor.run(&mut command)).await.expect_err("times out");

    assert!(
        matches!(failures(&err).as_slice(), [Error::Timeout(_), Error::Shutdown(_)]),
        "got: {err:?}"
    );
    assert_eq!(command.spec().state(), CommandState::Timeout);
}

#[tokio::test]
async fn test_streams_ending_without_closing_signal_complete() {
    init_tracing();
    let (executor, _probe) = executor(Script::new().stdout("x"));
    let mut command = CollectLines::new(spec());

    with_timeout(executor.run(&mut command)).await.expect("treated as closed");
    assert_eq!(command.lines(), ["x"]);
}

#[tokio::test]
async fn test_error_text_beyond_limit_is_truncated() {
    init_tracing();
    let config = ExecutorConfig {
        max_error_bytes: 4,
        ..ExecutorConfig::default()
    };
    let (executor, _probe) =
        executor_with(ScriptedHostFactory::new(Script::lines(&[], &["abc", "def", "g"])), config);
    let mut command = CollectLines::new(spec());

    let err = with_timeout(executor.run(&mut command)).await.expect_err("error text");

    assert!(
        matches!(
            failures(&err).as_slice(),
            [Error::Process { message, truncated: true }] if message == "abc"
        ),
        "got: {err:?}"
    );
}

#[tokio::test]
async fn test_truncated_error_text_is_never_benign() {
    init_tracing();
    let config = ExecutorConfig {
        max_error_bytes: 4,
        ..ExecutorConfig::default()
    };
    let hosts = ScriptedHostFactory::new(Script::lines(&["out"], &["abc", "def", "g"]));
    let (executor, _probe) = executor_with(hosts, config);
    let spec = spec().with_error_filter(FnErrorFilter::new(|_: &str| false, |_: &str| true));
    let mut command = CollectLines::new(spec);

    let err = with_timeout(executor.run(&mut command)).await.expect_err("truncated error text");

    assert!(
        matches!(
            failures(&err).as_slice(),
            [Error::Process { message, truncated: true }] if message == "abc"
        ),
        "got: {err:?}"
    );
    assert_eq!(command.lines(), ["out"]);
    assert_eq!(command.spec().state(), CommandState::Faulted);
}

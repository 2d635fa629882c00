// tests/plan_config.rs

use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use tempfile::NamedTempFile;

use opqueue::cli::CliArgs;
use opqueue::config::{ConfigFile, default_plan_path, load_and_validate};
use opqueue::errors::OpQueueError;
use opqueue::plan::{Plan, QueueOverrides, ReportingDelegate};
use opqueue::{DependencyFailurePolicy, DispatcherKind, OperationState};
use opqueue_test_utils::builders::{ConfigFileBuilder, OperationConfigBuilder};
use opqueue_test_utils::{init_tracing, with_timeout};

fn plan_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

#[test]
fn valid_plan_loads_with_defaults() {
    let file = plan_file(
        r#"
[queue]
max_concurrent_operations = 2
dispatcher = "inline"

[operation.login]
delay_ms = 10

[operation.fetch]
after = ["login"]
error = "network unreachable"
on_failed_dependency = "veto"
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();
    assert_eq!(cfg.queue.name, "opqueue");
    assert_eq!(cfg.queue.max_concurrent_operations, Some(2));
    assert_eq!(cfg.queue.dispatcher, DispatcherKind::Inline);

    let fetch = &cfg.operation["fetch"];
    assert_eq!(fetch.delay_ms, 0);
    assert_eq!(fetch.after, vec!["login".to_string()]);
    assert_eq!(fetch.error.as_deref(), Some("network unreachable"));
    assert_eq!(fetch.on_failed_dependency, DependencyFailurePolicy::Veto);
    assert_eq!(
        cfg.operation["login"].on_failed_dependency,
        DependencyFailurePolicy::Ignore
    );
}

#[test]
fn dependency_cycle_returns_structured_error() {
    let file = plan_file(
        r#"
[operation.A]
after = ["B"]

[operation.B]
after = ["A"]
"#,
    );

    match load_and_validate(file.path()) {
        Err(OpQueueError::DependencyCycle(msg)) => {
            assert!(msg.contains("cycle detected"));
            assert!(msg.contains("A") || msg.contains("B"));
        }
        Err(e) => panic!("Expected DependencyCycle error, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn unknown_dependency_returns_config_error() {
    let file = plan_file(
        r#"
[operation.A]
after = ["NonExistent"]
"#,
    );

    match load_and_validate(file.path()) {
        Err(OpQueueError::ConfigError(msg)) => {
            assert!(msg.contains("unknown dependency"));
            assert!(msg.contains("NonExistent"));
        }
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn self_dependency_in_plan_is_rejected() {
    let file = plan_file(
        r#"
[operation.A]
after = ["A"]
"#,
    );

    assert!(matches!(
        load_and_validate(file.path()),
        Err(OpQueueError::SelfDependency { .. })
    ));
}

#[test]
fn zero_concurrency_and_empty_plans_are_rejected() {
    let zero = plan_file(
        r#"
[queue]
max_concurrent_operations = 0

[operation.A]
"#,
    );
    assert!(matches!(
        load_and_validate(zero.path()),
        Err(OpQueueError::ConfigError(msg)) if msg.contains("max_concurrent_operations")
    ));

    let empty = plan_file("[queue]\nname = \"empty\"\n");
    assert!(matches!(
        load_and_validate(empty.path()),
        Err(OpQueueError::ConfigError(msg)) if msg.contains("at least one")
    ));
}

#[test]
fn unknown_dispatcher_is_a_toml_error() {
    let file = plan_file(
        r#"
[queue]
dispatcher = "gpu"

[operation.A]
"#,
    );

    assert!(matches!(
        load_and_validate(file.path()),
        Err(OpQueueError::TomlError(_))
    ));
}

#[test]
fn missing_file_is_an_io_error() {
    assert!(matches!(
        load_and_validate("/definitely/not/here/Plan.toml"),
        Err(OpQueueError::IoError(_))
    ));
}

#[test]
fn plan_submits_dependencies_first() {
    let cfg: ConfigFile = ConfigFileBuilder::new()
        .dispatcher(DispatcherKind::Inline)
        .with_operation("c", OperationConfigBuilder::new(0).after("b").build())
        .with_operation("b", OperationConfigBuilder::new(0).after("a").build())
        .with_operation("a", OperationConfigBuilder::new(0).build())
        .build();

    let plan = Plan::from_config(
        &cfg,
        QueueOverrides {
            max_concurrent: Some(3),
            ..QueueOverrides::default()
        },
    )
    .unwrap();
    let order: Vec<&str> = plan.operations().iter().map(|op| op.name()).collect();
    assert_eq!(order, vec!["a", "b", "c"]);
    assert_eq!(plan.queue().max_concurrent_operation_count(), Some(3));
}

#[tokio::test]
async fn plan_runs_to_completion_with_failures_and_vetoes() {
    init_tracing();

    let cfg = ConfigFileBuilder::new()
        .dispatcher(DispatcherKind::Tokio)
        .max_concurrent(2)
        .with_operation("login", OperationConfigBuilder::new(20).build())
        .with_operation(
            "fetch",
            OperationConfigBuilder::new(20)
                .after("login")
                .error("network unreachable")
                .build(),
        )
        .with_operation(
            "render",
            OperationConfigBuilder::new(20)
                .after("fetch")
                .veto_on_failed_dependency()
                .build(),
        )
        .with_operation(
            "audit",
            OperationConfigBuilder::new(20).after("fetch").build(),
        )
        .build();

    let plan = Plan::from_config(&cfg, QueueOverrides::default()).unwrap();
    let reporter = Arc::new(ReportingDelegate::default());
    plan.queue().set_delegate(&reporter);

    plan.submit().unwrap();
    with_timeout(plan.queue().wait_until_all_operations_are_finished()).await;

    assert_eq!(reporter.added(), 4);
    assert_eq!(reporter.finished(), 4);
    assert_eq!(reporter.failed(), 2);

    let summary = plan.summary();
    let by_name = |name: &str| {
        summary
            .iter()
            .find(|s| s.name == name)
            .cloned()
            .unwrap()
    };

    let login = by_name("login");
    assert!(login.executed && login.errors.is_empty());
    assert_eq!(login.state, OperationState::Finished);

    let fetch = by_name("fetch");
    assert!(fetch.executed);
    assert_eq!(fetch.errors, vec!["network unreachable".to_string()]);

    let render = by_name("render");
    assert!(!render.executed);
    assert_eq!(render.errors.len(), 1);

    let audit = by_name("audit");
    assert!(audit.executed && audit.errors.is_empty());
}

#[test]
fn builder_output_is_validated_like_a_file() {
    let raw = ConfigFileBuilder::new()
        .max_concurrent(0)
        .with_operation("a", OperationConfigBuilder::new(0).build())
        .build_raw();

    assert!(matches!(
        ConfigFile::try_from(raw),
        Err(OpQueueError::ConfigError(msg)) if msg.contains("max_concurrent_operations")
    ));
}

#[test]
fn dispatcher_override_replaces_the_plan_setting() {
    let cfg = ConfigFileBuilder::new()
        .dispatcher(DispatcherKind::Inline)
        .with_operation("a", OperationConfigBuilder::new(0).build())
        .build();

    // No tokio runtime on this thread, so the override is observable.
    let overridden = Plan::from_config(
        &cfg,
        QueueOverrides {
            dispatcher: Some(DispatcherKind::Tokio),
            ..QueueOverrides::default()
        },
    );
    assert!(matches!(overridden, Err(OpQueueError::NoRuntime)));

    assert!(Plan::from_config(&cfg, QueueOverrides::default()).is_ok());
}

#[test]
fn dispatcher_kind_parses_from_cli_text() {
    assert_eq!(" Inline ".parse::<DispatcherKind>(), Ok(DispatcherKind::Inline));
    assert_eq!("TOKIO".parse::<DispatcherKind>(), Ok(DispatcherKind::Tokio));
    assert!("gpu".parse::<DispatcherKind>().unwrap_err().contains("gpu"));

    let args = CliArgs::try_parse_from(["opqueue", "--dispatcher", "thread", "--max-concurrent", "2"])
        .unwrap();
    assert_eq!(args.dispatcher, Some(DispatcherKind::Thread));
    assert_eq!(args.max_concurrent, Some(2));
    assert_eq!(args.plan, None);
    assert_eq!(default_plan_path(), std::path::PathBuf::from("Plan.toml"));

    assert!(CliArgs::try_parse_from(["opqueue", "--dispatcher", "gpu"]).is_err());
}

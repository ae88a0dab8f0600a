use std::fs::{self, OpenOptions};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use easy_nodes::config::RELOAD_ON_EDIT;
use easy_nodes::error::{ConsistencyError, NodeError, RegistrationError};
use easy_nodes::module::ExpressionModule;
use easy_nodes::prelude::*;
use easy_nodes::runtime::live::{Fingerprint, LiveUpdateTracker, impl_cell, load_impl};
use serde_json::{Map, Value, json};

const MODULE_V1: &str = r#"
module: live_math
nodes:
  - name: combine
    category: Math
    inputs:
      - name: a
        type: INT
        default: 1
      - name: b
        type: INT
        default: 2
    outputs:
      - name: result
        type: INT
        expr: a + b
"#;

const MODULE_V2: &str = r#"
module: live_math
nodes:
  - name: combine
    category: Math
    inputs:
      - name: a
        type: INT
        default: 1
      - name: b
        type: INT
        default: 2
    outputs:
      - name: result
        type: INT
        expr: a * b
"#;

fn constant(value: i64) -> NodeFn {
    node_fn(move |_ctx, _args| Ok(Returned::single(value)))
}

fn touch(path: &Path, time: SystemTime) {
    OpenOptions::new()
        .write(true)
        .open(path)
        .expect("open module file")
        .set_modified(time)
        .expect("set mtime");
}

fn kwargs(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("kwargs must be an object"),
    }
}

#[test]
fn test_repeat_registration_requires_newer_and_different() {
    let mut tracker = LiveUpdateTracker::new();
    let cell = impl_cell(constant(0));
    let t0 = UNIX_EPOCH + Duration::from_secs(1_000);
    let v1 = Fingerprint::of_source(Some("return 1"));
    let v2 = Fingerprint::of_source(Some("return 2"));

    // 1. Initial registration
    tracker
        .register_function("m::f", "f", Some("m"), &cell, constant(1), v1, t0)
        .expect("first registration");
    let before = tracker.change_signal("m::f", ChangeToken::Neutral).expect("signal");

    // 2. Same timestamp is rejected
    let err = tracker
        .register_function("m::f", "f", Some("m"), &cell, constant(2), v2, t0)
        .unwrap_err();
    assert!(matches!(err, ConsistencyError::StaleTimestamp { .. }));

    // 3. Newer timestamp but identical fingerprint is rejected
    let err = tracker
        .register_function("m::f", "f", Some("m"), &cell, constant(2), v1, t0 + Duration::from_secs(1))
        .unwrap_err();
    assert!(matches!(err, ConsistencyError::SameFingerprint { .. }));

    // 4. Newer and different succeeds, swaps the shared cell and changes the signal
    tracker
        .register_function("m::f", "f", Some("m"), &cell, constant(2), v2, t0 + Duration::from_secs(2))
        .expect("update");
    let after = tracker.change_signal("m::f", ChangeToken::Neutral).expect("signal");
    assert_ne!(before, after);

    let implementation = load_impl(&cell);
    let returned = implementation(&CallContext::detached(), &Args::default()).expect("call");
    assert_eq!(returned, Returned::single(2));
}

#[test]
fn test_module_edit_hot_swaps_implementation() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("live_math.yaml");
    fs::write(&path, MODULE_V1).expect("write module");
    let t0 = SystemTime::now() - Duration::from_secs(60);
    touch(&path, t0);

    let mut registry = Registry::new(Settings::default())
        .with_builtin_types()
        .expect("builtins")
        .with_config(MapConfig::new().set(RELOAD_ON_EDIT, true));
    let names = ExpressionModule::register(&path, &mut registry).expect("register module");
    assert_eq!(names, vec!["Combine".to_string()]);

    // 1. Original behaviour
    let output = registry.invoke("Combine", kwargs(json!({"a": 3, "b": 4}))).expect("invoke v1");
    assert_eq!(output.result(), &[json!(7)]);
    let signal_v1 = registry.is_changed("Combine", Map::new()).expect("is_changed v1");

    // 2. Edit the file
    fs::write(&path, MODULE_V2).expect("rewrite module");
    touch(&path, t0 + Duration::from_secs(30));

    // 3. Same node identity, new behaviour and a new change signal
    let output = registry.invoke("Combine", kwargs(json!({"a": 3, "b": 4}))).expect("invoke v2");
    assert_eq!(output.result(), &[json!(12)]);
    let signal_v2 = registry.is_changed("Combine", Map::new()).expect("is_changed v2");
    assert_ne!(signal_v1, signal_v2);
    assert_eq!(registry.node_mappings().len(), 1);

    // 4. No further edit: the signal is stable
    let signal_again = registry.is_changed("Combine", Map::new()).expect("is_changed again");
    assert_eq!(signal_v2, signal_again);
}

#[test]
fn test_reload_disabled_keeps_old_implementation() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("live_math.yaml");
    fs::write(&path, MODULE_V1).expect("write module");
    let t0 = SystemTime::now() - Duration::from_secs(60);
    touch(&path, t0);

    let mut registry = Registry::new(Settings::default()).with_builtin_types().expect("builtins");
    ExpressionModule::register(&path, &mut registry).expect("register module");

    fs::write(&path, MODULE_V2).expect("rewrite module");
    touch(&path, t0 + Duration::from_secs(30));

    let output = registry.invoke("Combine", kwargs(json!({"a": 3, "b": 4}))).expect("invoke");
    assert_eq!(output.result(), &[json!(7)]);
}

#[test]
fn test_change_signal_mixes_custom_token() {
    let mut registry = Registry::new(Settings::default()).with_builtin_types().expect("builtins");
    let spec = FunctionSpec::new("demo", "load_file")
        .source("fn load_file(path) { read(path) }")
        .required("path", Annotation::of::<String>())
        .returns(Annotation::of::<String>());
    let options = NodeOptions::new().is_changed(|args| {
        let path: String = args.value("path")?;
        Ok(ChangeToken::of(&path))
    });
    registry
        .register_node(spec, options, node_fn(|_ctx, args| Ok(Returned::single(args.value::<String>("path")?))))
        .expect("register");

    let a = registry.is_changed("LoadFile", kwargs(json!({"path": "a.txt"}))).expect("a");
    let a_again = registry.is_changed("LoadFile", kwargs(json!({"path": "a.txt"}))).expect("a again");
    let b = registry.is_changed("LoadFile", kwargs(json!({"path": "b.txt"}))).expect("b");
    assert_eq!(a, a_again);
    assert_ne!(a, b);

    // Predicate errors surface as is_changed failures
    let err = registry.is_changed("LoadFile", Map::new()).unwrap_err();
    assert!(matches!(err, NodeError::IsChanged { .. }));
}

#[test]
fn test_always_run_signal_is_never_equal() {
    let mut registry = Registry::new(Settings::default()).with_builtin_types().expect("builtins");
    registry
        .register_node(
            FunctionSpec::new("demo", "random_seed").returns(Annotation::of::<i64>()),
            NodeOptions::new().always_run(),
            constant(4),
        )
        .expect("register");

    let first = registry.is_changed("RandomSeed", Map::new()).expect("signal");
    let second = registry.is_changed("RandomSeed", Map::new()).expect("signal");
    assert!(first.is_always());
    assert_ne!(first, second);
}

#[test]
fn test_registration_closes_after_first_evaluation() {
    let mut registry = Registry::new(Settings::default()).with_builtin_types().expect("builtins");
    registry
        .register_node(
            FunctionSpec::new("demo", "first").returns(Annotation::of::<i64>()),
            NodeOptions::new(),
            constant(1),
        )
        .expect("register");
    registry.invoke("First", Map::new()).expect("invoke");

    // Duplicates after close are silent no-ops, not errors
    let again = registry
        .register_node(
            FunctionSpec::new("demo", "first").returns(Annotation::of::<i64>()),
            NodeOptions::new(),
            constant(2),
        )
        .expect("no error once closed");
    assert!(again.is_none());
    assert_eq!(registry.num_registered(), 1);
}

#[test]
fn test_duplicate_names_are_rejected() {
    let mut registry = Registry::new(Settings::default()).with_builtin_types().expect("builtins");
    registry.reserve_host_node("LoadImage", "Load Image");
    registry
        .register_node(FunctionSpec::new("demo", "blend").returns(Annotation::of::<i64>()), NodeOptions::new(), constant(1))
        .expect("register");

    // 1. Same function identity
    let err = registry
        .register_node(FunctionSpec::new("demo", "blend").returns(Annotation::of::<i64>()), NodeOptions::new(), constant(1))
        .unwrap_err();
    assert!(matches!(err, NodeError::Registration(RegistrationError::DuplicateFunction(_))));

    // 2. Workflow name taken by the host
    let err = registry
        .register_node(FunctionSpec::new("other", "load_image").returns(Annotation::of::<i64>()), NodeOptions::new(), constant(1))
        .unwrap_err();
    assert!(matches!(err, NodeError::Registration(RegistrationError::DuplicateNode { .. })));

    // 3. Display name clash
    let err = registry
        .register_node(
            FunctionSpec::new("other", "blend_two").returns(Annotation::of::<i64>()),
            NodeOptions::new().display_name("Blend"),
            constant(1),
        )
        .unwrap_err();
    assert!(matches!(err, NodeError::Registration(RegistrationError::DuplicateDisplayName(_))));

    // 4. Two methods of one owner
    registry
        .register_node(
            FunctionSpec::new("demo", "run").method_of("Sharpen", Receiver::Static).returns(Annotation::of::<i64>()),
            NodeOptions::new(),
            constant(1),
        )
        .expect("first method");
    let err = registry
        .register_node(
            FunctionSpec::new("demo", "other_run").method_of("Sharpen", Receiver::Static).returns(Annotation::of::<i64>()),
            NodeOptions::new(),
            constant(1),
        )
        .unwrap_err();
    assert!(matches!(err, NodeError::Registration(RegistrationError::DuplicateOwner(_))));

    assert_eq!(registry.num_registered(), 2);
}

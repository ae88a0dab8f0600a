use std::fs;

use easy_nodes::module::{ExpressionModule, ModuleFile};
use easy_nodes::prelude::*;
use easy_nodes::runtime::context::{FsPreviewStore, PREVIEW_SUBFOLDER};
use serde_json::{Map, Value, json};

const MODULE: &str = r##"
module: text_tools
nodes:
  - name: repeat_text
    category: Text
    doc: |
      Repeats a string.
      Joins copies with a separator.
    color: "#336699"
    inputs:
      - name: text
        type: STRING
        default: "ab"
        multiline: true
      - name: times
        type: INT
        default: 2
        min: 1
        max: 10
        step: 1
      - name: separator
        type: STRING
        default: null
      - name: mode
        choices: [plain, loud]
    outputs:
      - name: joined
        type: STRING
        expr: 'if(times == 2, text + "-" + text, text)'
      - name: length
        type: INT
        expr: len(text) * times
    show: '"repeated " + text'
  - name: show_sum
    inputs:
      - name: a
        type: FLOAT
        default: 0.5
    outputs: []
    show: 'a + 1.0'
"##;

fn kwargs(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("kwargs must be an object"),
    }
}

#[test]
fn test_module_file_parses() {
    let file: ModuleFile = serde_yaml::from_str(MODULE).expect("parse module");
    assert_eq!(file.module, "text_tools");
    assert_eq!(file.nodes.len(), 2);
    assert_eq!(file.nodes[0].inputs[2].default, Some(Value::Null));
    assert_eq!(file.nodes[0].inputs[3].default, None);
}

#[test]
fn test_expression_nodes_register_and_run() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("text_tools.yaml");
    fs::write(&path, MODULE).expect("write module");

    let mut registry = Registry::new(Settings::default())
        .with_builtin_types()
        .expect("builtins")
        .with_preview_store(FsPreviewStore::new(dir.path().join("out")));
    let names = ExpressionModule::register(&path, &mut registry).expect("register module");
    assert_eq!(names, vec!["RepeatText".to_string(), "ShowSum".to_string()]);

    // 1. Schema
    let descriptor = registry.descriptor("RepeatText").expect("descriptor").clone();
    let host = descriptor.to_host_json();
    let inputs = &host["INPUT_TYPES"];
    assert_eq!(inputs["required"]["text"][1]["multiline"], json!(true));
    assert_eq!(inputs["required"]["times"][1]["min"], json!(1));
    assert_eq!(inputs["required"]["mode"], json!([["plain", "loud"]]));
    assert_eq!(inputs["optional"]["separator"][1]["forceInput"], json!(true));
    assert_eq!(host["RETURN_TYPES"], json!(["STRING", "INT"]));
    assert_eq!(host["RETURN_NAMES"], json!(["joined", "length"]));
    assert_eq!(host["CATEGORY"], json!("Text"));
    let description = host["DESCRIPTION"].as_str().expect("description");
    assert!(description.starts_with("EasyNodesInfo="));
    assert!(description.ends_with("Repeats a string.\nJoins copies with a separator."));
    assert!(descriptor.source_location.ends_with(":4"));

    // 2. Invocation with a text preview
    let output = registry
        .invoke("RepeatText", kwargs(json!({"text": "ab", "times": 2, "mode": "plain", "unique_id": "5"})))
        .expect("invoke");
    assert_eq!(output.result(), &[json!("ab-ab"), json!(4)]);
    assert_eq!(output.preview().expect("preview").text, vec!["repeated ab".to_string()]);

    // 3. Output-only node
    let show = registry.descriptor("ShowSum").expect("descriptor").clone();
    assert!(show.schema.is_output_node);
    let output = registry.invoke("ShowSum", kwargs(json!({"a": 1.5}))).expect("invoke");
    assert_eq!(output.result(), &[Value::Null]);
    assert_eq!(output.preview().expect("preview").text, vec!["2.5".to_string()]);
}

#[test]
fn test_expression_errors_become_invocation_errors() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("broken.yaml");
    fs::write(
        &path,
        "module: broken\nnodes:\n  - name: divide\n    inputs:\n      - name: a\n        type: INT\n    outputs:\n      - name: q\n        type: INT\n        expr: a / missing\n",
    )
    .expect("write module");

    let mut registry = Registry::new(Settings::default()).with_builtin_types().expect("builtins");
    ExpressionModule::register(&path, &mut registry).expect("register module");

    let err = registry.invoke("Divide", kwargs(json!({"a": 4}))).unwrap_err();
    let NodeError::Invocation(err) = err else {
        panic!("expected an invocation error");
    };
    assert!(err.to_string().contains("a / missing"));
}

#[test]
fn test_unknown_port_type_is_rejected() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("bad.yaml");
    fs::write(
        &path,
        "module: bad\nnodes:\n  - name: f\n    inputs:\n      - name: a\n        type: NOPE\n    outputs: []\n",
    )
    .expect("write module");

    let mut registry = Registry::new(Settings::default()).with_builtin_types().expect("builtins");
    let err = ExpressionModule::register(&path, &mut registry).unwrap_err();
    assert!(format!("{:#}", err).contains("NOPE"));
    assert!(registry.node_mappings().is_empty());
}

#[test]
fn test_preview_images_written_through_store() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut registry = Registry::new(Settings::default())
        .with_builtin_types()
        .expect("builtins")
        .with_config(MapConfig::new().set(easy_nodes::config::RETAIN_PREVIEWS, true))
        .with_preview_store(FsPreviewStore::new(dir.path()));
    registry
        .register_node(
            FunctionSpec::new("demo", "save_png"),
            NodeOptions::new(),
            node_fn(|ctx, _args| {
                ctx.show_image(b"\x89PNG fake")?;
                Ok(Returned::Nothing)
            }),
        )
        .expect("register");

    let output = registry.invoke("SavePng", kwargs(json!({"unique_id": "42"}))).expect("invoke");
    let preview = output.preview().expect("preview");
    let image = &preview.images[0];
    assert_eq!(image.kind, "output");
    assert!(image.filename.starts_with("preview-42_"));
    assert!(dir.path().join("output").join(PREVIEW_SUBFOLDER).join(&image.filename).exists());
}

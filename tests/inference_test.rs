use easy_nodes::error::{NodeError, RegistrationError};
use easy_nodes::node::inference::{EXTRA_PNGINFO, UNIQUE_ID, infer_inputs, infer_outputs};
use easy_nodes::node::widgets::{Choice, NumberInput, StringInput};
use easy_nodes::prelude::*;
use easy_nodes::types::PortType;
use easy_nodes::types::builtin::{IMAGE, INT, ImageTensor, STRING};
use serde_json::json;

fn builtin_registry() -> Registry {
    Registry::new(Settings::default())
        .with_builtin_types()
        .expect("builtin types")
}

fn noop() -> NodeFn {
    node_fn(|_ctx, _args| Ok(Returned::Nothing))
}

#[test]
fn test_numeric_widget_out_of_range_fails() {
    let err = NumberInput::bounded(11, 0, 10).unwrap_err();
    assert!(matches!(err, RegistrationError::AboveMaximum { .. }));

    let err = NumberInput::bounded(-1.5, 0.0, 1.0).unwrap_err();
    assert!(matches!(err, RegistrationError::BelowMinimum { .. }));

    NumberInput::bounded(5, 0, 10).expect("in range");

    let err = NumberInput::bounded(f64::NAN, 0.0, 1.0).unwrap_err();
    assert!(matches!(err, RegistrationError::NonFiniteDefault(_)));
}

#[test]
fn test_parameter_classification() {
    let registry = builtin_registry();
    let spec = FunctionSpec::new("demo", "classify")
        .required("image", Annotation::of::<ImageTensor>())
        .nullable("mask", Annotation::of::<ImageTensor>())
        .param("strength", Annotation::of::<f64>(), 0.5)
        .param("label", Annotation::of::<String>(), StringInput::new("hi").multiline())
        .param("extra", Annotation::of::<i64>(), NumberInput::new(1).optional())
        .param("secret", Annotation::of::<i64>(), NumberInput::new(2).optional().hidden())
        .param("flag", Annotation::of::<bool>(), true)
        .param("mode", Annotation::of::<String>(), Choice::new(["fast", "slow"]).expect("choice"))
        .required(UNIQUE_ID, Annotation::of::<String>());

    let inferred = infer_inputs(&spec, registry.types()).expect("inference");
    let schema = &inferred.schema;

    // 1. No default: required and force-input
    let image = schema.required.get("image").expect("image required");
    assert_eq!(image.port_type, PortType::named(IMAGE));
    assert_eq!(image.meta("forceInput"), Some(&json!(true)));

    // 2. Null default: optional and force-input
    let mask = schema.optional.get("mask").expect("mask optional");
    assert_eq!(mask.meta("optional"), Some(&json!(true)));
    assert_eq!(mask.meta("forceInput"), Some(&json!(true)));

    // 3. Primitive defaults are promoted to widgets and stay required
    let strength = schema.required.get("strength").expect("strength required");
    assert_eq!(strength.meta("default"), Some(&json!(0.5)));
    let label = schema.required.get("label").expect("label required");
    assert_eq!(label.meta("multiline"), Some(&json!(true)));

    // 4. Optional and hidden widgets
    assert!(schema.optional.contains("extra"));
    assert!(schema.hidden.contains("secret"));

    // 5. Non-widget concrete default is optional with its value
    let flag = schema.optional.get("flag").expect("flag optional");
    assert_eq!(flag.meta("default"), Some(&json!(true)));

    // 6. Choice becomes an enum port
    let mode = schema.required.get("mode").expect("mode required");
    assert_eq!(mode.port_type, PortType::Choice(vec!["fast".into(), "slow".into()]));
    assert_eq!(serde_json::to_value(mode).expect("serialize"), json!([["fast", "slow"]]));

    // 7. Reserved names keep their fixed hidden types
    assert!(!schema.required.contains(UNIQUE_ID));
    assert_eq!(serde_json::to_value(schema.hidden.get(UNIQUE_ID).expect("uid")).expect("ser"), json!("UNIQUE_ID"));
    assert!(schema.hidden.contains(EXTRA_PNGINFO));
}

#[test]
fn test_force_input_types_never_show_widgets() {
    let registry = builtin_registry();
    let spec = FunctionSpec::new("demo", "f").param("image", Annotation::of::<ImageTensor>(), json!(null));
    let inferred = infer_inputs(&spec, registry.types()).expect("inference");
    let image = inferred.schema.optional.get("image").expect("optional");
    assert_eq!(image.meta("forceInput"), Some(&json!(true)));
}

#[test]
fn test_instance_receiver_is_skipped() {
    let registry = builtin_registry();
    let spec = FunctionSpec::new("demo", "method")
        .method_of("Blur", Receiver::Instance)
        .required("self", Annotation::Empty)
        .required("radius", Annotation::of::<i64>());
    let inferred = infer_inputs(&spec, registry.types()).expect("inference");
    assert!(!inferred.schema.required.contains("self"));
    assert!(inferred.schema.required.contains("radius"));

    let spec = FunctionSpec::new("demo", "build")
        .method_of("Blur", Receiver::Class)
        .required("cls", Annotation::Empty)
        .required("radius", Annotation::of::<i64>());
    let inferred = infer_inputs(&spec, registry.types()).expect("inference");
    assert!(!inferred.schema.required.contains("cls"));
    assert!(inferred.schema.required.contains("radius"));

    let spec = FunctionSpec::new("demo", "make")
        .method_of("Blur", Receiver::Static)
        .required("radius", Annotation::of::<i64>());
    let inferred = infer_inputs(&spec, registry.types()).expect("inference");
    assert!(inferred.schema.required.contains("radius"));
}

#[test]
fn test_unregistered_parameter_type_fails() {
    struct Unknown;
    impl NativeType for Unknown {
        const KIND: ValueKind = ValueKind::Object;
    }
    let registry = builtin_registry();
    let spec = FunctionSpec::new("demo", "f").required("x", Annotation::of::<Unknown>());
    assert!(matches!(
        infer_inputs(&spec, registry.types()),
        Err(RegistrationError::UnregisteredType(_))
    ));
}

#[test]
fn test_tuple_return_with_list_element() {
    let registry = builtin_registry();
    let outputs = infer_outputs(
        &Annotation::tuple([Annotation::of::<i64>(), Annotation::list_of::<String>()]),
        registry.types(),
    )
    .expect("outputs");
    assert_eq!(outputs.types, vec![PortType::named(INT), PortType::named(STRING)]);
    assert_eq!(outputs.is_list, vec![false, true]);

    let single_list = infer_outputs(&Annotation::list_of::<i64>(), registry.types()).expect("outputs");
    assert_eq!(single_list.is_list, vec![true]);

    assert!(infer_outputs(&Annotation::Empty, registry.types()).expect("outputs").is_empty());
}

#[test]
fn test_no_outputs_promotes_to_output_node() {
    let mut registry = builtin_registry();
    let spec = FunctionSpec::new("demo", "save_result").required("value", Annotation::of::<i64>());
    let descriptor = registry
        .register_node(spec.clone(), NodeOptions::new(), noop())
        .expect("register")
        .expect("open registry");
    assert!(descriptor.schema.is_output_node);

    // Inferring again gives the same classification
    let outputs = infer_outputs(&spec.returns, registry.types()).expect("outputs");
    assert!(outputs.is_empty());
}

#[test]
fn test_return_names_must_match_outputs() {
    let mut registry = builtin_registry();
    let spec = FunctionSpec::new("demo", "pair").returns(Annotation::tuple([
        Annotation::of::<i64>(),
        Annotation::of::<i64>(),
    ]));
    let err = registry
        .register_node(spec, NodeOptions::new().return_names(["only_one"]), noop())
        .unwrap_err();
    assert!(matches!(
        err,
        NodeError::Registration(RegistrationError::ReturnNamesMismatch { names: 1, types: 2 })
    ));
    assert!(registry.node_mappings().is_empty());
}

#[test]
fn test_explicit_return_types_override_annotation() {
    let mut registry = builtin_registry();
    let spec = FunctionSpec::new("demo", "explicit").returns(Annotation::of::<i64>());
    let descriptor = registry
        .register_node(
            spec,
            NodeOptions::new()
                .return_types([Annotation::of::<String>(), Annotation::list_of::<f64>()])
                .return_names(["text", "values"]),
            noop(),
        )
        .expect("register")
        .expect("open registry");
    assert_eq!(descriptor.schema.outputs.is_list, vec![false, true]);
    assert_eq!(descriptor.schema.return_types()[0], PortType::named(STRING));
}

//! Running the example blocks through block instances

use serde_json::{json, Value};

use super::example_blocks::{
    counter, counter_stream, delayed_echo, doubler, fan_out, failing, greeter, passthrough, router,
    shared,
};
use crate::config::RuntimeConfig;
use crate::core::block::{handler_fn, BlockDefinition, BlockError, FunctionDecl};
use crate::core::error::RunError;
use crate::core::message::{BlockMessage, InputValue, OutputValue, StateValue};
use crate::core::types::TypeExpr;
use crate::core::BlockPinRef;
use crate::runtime::instance::{BlockInstance, InstancePhase, LoadRequest};
use crate::runtime::ports::{PortSlot, PortValue};

fn input(port: &str, pin: &str, value: Value) -> InputValue {
    InputValue {
        target: BlockPinRef::new(port, pin),
        value,
    }
}

fn outputs(messages: &[BlockMessage]) -> Vec<&OutputValue> {
    messages.iter().flat_map(|m| m.outputs.iter()).collect()
}

fn instance(definition: BlockDefinition) -> BlockInstance {
    BlockInstance::new(shared(definition), RuntimeConfig::default()).unwrap()
}

#[tokio::test]
async fn test_greeter_says_hello() {
    let mut greeter = instance(greeter());
    greeter
        .load(LoadRequest {
            inputs: vec![input("name", "", json!("Ada"))],
            ..LoadRequest::default()
        })
        .unwrap();

    let messages = greeter.run("greet").await.unwrap();
    let sent = outputs(&messages);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].source, BlockPinRef::new("greet", ""));
    assert_eq!(sent[0].value, json!("Hello Ada"));
    assert_eq!(sent[0].index, 0);
}

#[tokio::test]
async fn test_second_run_is_rejected() {
    let mut greeter = instance(greeter());
    greeter.set_inputs(vec![input("name", "", json!("Ada"))]).unwrap();
    greeter.run("greet").await.unwrap();

    let err = greeter.run("greet").await.unwrap_err();
    assert!(matches!(err, RunError::AlreadyRun { ref function } if function == "greet"));
    assert_eq!(greeter.phase(), InstancePhase::Completed);
}

#[tokio::test]
async fn test_list_outputs_follow_dynamic_refs() {
    let mut block = instance(fan_out());
    block
        .load(LoadRequest {
            dynamic_outputs: vec![BlockPinRef::new("items.0", ""), BlockPinRef::new("items.2", "")],
            ..LoadRequest::default()
        })
        .unwrap();

    match &block.ports()["items"] {
        PortSlot::List(slots) => {
            assert_eq!(slots.len(), 3);
            assert!(slots[0].is_some());
            assert!(slots[1].is_none());
            assert!(slots[2].is_some());
        }
        other => panic!("expected a list port, got {other:?}"),
    }

    let messages = block.run("emit").await.unwrap();
    let sources: Vec<String> = outputs(&messages)
        .iter()
        .map(|o| o.source.port.clone())
        .collect();
    assert_eq!(sources, vec!["items.0", "items.2"]);
    assert_eq!(outputs(&messages)[1].value, json!("item 2"));
}

#[tokio::test]
async fn test_sending_to_unallocated_index_fails() {
    let def = BlockDefinition::builder("Sparse")
        .field("items", TypeExpr::list(TypeExpr::output(TypeExpr::String)))
        .step(
            "emit",
            FunctionDecl::new(handler_fn(|scope, _| {
                scope.send("items.1", "late")?;
                Ok(Value::Null)
            })),
        )
        .build()
        .unwrap();
    let mut block = instance(def);
    block
        .create_ports(&[], &[BlockPinRef::new("items.0", "")])
        .unwrap();
    assert!(matches!(
        block.run("emit").await,
        Err(RunError::InvalidIndex { .. })
    ));
    assert_eq!(block.phase(), InstancePhase::Errored);
}

#[tokio::test]
async fn test_output_channel_sequence() {
    let mut block = instance(counter_stream());
    block.set_inputs(vec![input("stream", "count", json!(3))]).unwrap();

    let messages = block.run("stream").await.unwrap();
    let sent = outputs(&messages);
    assert_eq!(sent.len(), 4);
    for (i, output) in sent.iter().take(3).enumerate() {
        assert_eq!(output.index, i as u64);
        assert_eq!(output.value, json!({ "event": "Data", "data": i }));
    }
    assert_eq!(sent[3].index, 3);
    assert_eq!(sent[3].value, json!({ "event": "Close", "data": null }));
}

#[tokio::test]
async fn test_input_channel_data_and_close() {
    let mut block = instance(doubler());
    block
        .set_inputs(vec![input(
            "incoming",
            "",
            json!({ "state": "Open", "event": "Data", "data": "21" }),
        )])
        .unwrap();
    let messages = block.run("consume").await.unwrap();
    assert_eq!(
        outputs(&messages)[0].value,
        json!({ "event": "Data", "data": 42 })
    );

    let mut block = instance(doubler());
    block
        .set_inputs(vec![input(
            "incoming",
            "",
            json!({ "state": "Closed", "event": "Close", "data": null }),
        )])
        .unwrap();
    let messages = block.run("consume").await.unwrap();
    assert_eq!(
        outputs(&messages)[0].value,
        json!({ "event": "Close", "data": null })
    );
}

#[tokio::test]
async fn test_closing_plain_output_fails() {
    let def = BlockDefinition::builder("Plain")
        .field("out", TypeExpr::output(TypeExpr::String))
        .step(
            "finish",
            FunctionDecl::new(handler_fn(|scope, _| {
                scope.close("out")?;
                Ok(Value::Null)
            })),
        )
        .build()
        .unwrap();
    let mut block = instance(def);
    assert!(matches!(
        block.run("finish").await,
        Err(RunError::NotAChannel(name)) if name == "out"
    ));
}

#[tokio::test]
async fn test_state_is_loaded_updated_and_emitted() {
    let mut block = instance(counter());
    block
        .load(LoadRequest {
            state: vec![StateValue {
                state: "count".into(),
                value: json!(4),
            }],
            inputs: vec![input("increment", "source", json!("api"))],
            ..LoadRequest::default()
        })
        .unwrap();

    let messages = block.run("increment").await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].states[0].state, "count");
    assert_eq!(messages[0].states[0].value, json!(5));
    assert_eq!(messages[1].outputs[0].value, json!(5));
    assert_eq!(block.state("count"), Some(&json!(5)));
}

#[tokio::test]
async fn test_output_validation_can_be_disabled() {
    let def = || {
        BlockDefinition::builder("Typed")
            .field("out", TypeExpr::output(TypeExpr::Integer))
            .step(
                "send",
                FunctionDecl::new(handler_fn(|scope, _| {
                    scope.send("out", "not a number")?;
                    Ok(Value::Null)
                })),
            )
            .build()
            .unwrap()
    };

    let mut strict = instance(def());
    assert!(matches!(
        strict.run("send").await,
        Err(RunError::Validation { .. })
    ));

    let config = RuntimeConfig::default().with_validate_outputs(false);
    let mut lenient = BlockInstance::new(shared(def()), config).unwrap();
    let messages = lenient.run("send").await.unwrap();
    assert_eq!(outputs(&messages)[0].value, json!("not a number"));
}

#[tokio::test]
async fn test_block_error_drops_partial_batch() {
    let mut block = instance(failing());
    match block.run("explode").await {
        Err(RunError::Block(err)) => {
            assert_eq!(err.message, "boom");
            assert_eq!(err.data, json!({ "code": 7 }));
        }
        other => panic!("expected a block error, got {other:?}"),
    }
    assert_eq!(block.phase(), InstancePhase::Errored);
}

#[tokio::test]
async fn test_generic_passthrough() {
    let mut block = instance(passthrough(true));
    block
        .set_inputs(vec![
            input("schema", "", json!({ "type": "integer" })),
            input("value", "", json!(12)),
        ])
        .unwrap();

    let messages = block.run("forward").await.unwrap();
    assert_eq!(outputs(&messages)[0].source, BlockPinRef::new("out", ""));
    assert_eq!(outputs(&messages)[0].value, json!(12));
}

#[tokio::test]
async fn test_nested_dictionary_ports() {
    let mut block = instance(router());
    block
        .load(LoadRequest {
            dynamic_inputs: vec![BlockPinRef::new("routes.api", "headers.accept")],
            dynamic_outputs: vec![
                BlockPinRef::new("routes.api", "replies.0"),
                BlockPinRef::new("routes.web", "replies.0"),
            ],
            inputs: vec![
                input("routes.api", "path", json!("/v1")),
                input("routes.api", "headers.accept", json!("json")),
                input("routes.web", "path", json!("/")),
            ],
            ..LoadRequest::default()
        })
        .unwrap();

    assert_eq!(
        block.input_value(&BlockPinRef::new("routes.api", "headers.accept")),
        Some(json!("json"))
    );

    let messages = block.run("reply").await.unwrap();
    let sent: Vec<(String, Value)> = outputs(&messages)
        .iter()
        .map(|o| (o.source.to_string(), o.value.clone()))
        .collect();
    assert_eq!(
        sent,
        vec![
            ("routes.api/replies.0".to_string(), json!("api -> /v1")),
            ("routes.web/replies.0".to_string(), json!("web -> /")),
        ]
    );
}

#[tokio::test]
async fn test_async_body_with_variadic_arguments() {
    let mut block = instance(delayed_echo());
    block
        .set_inputs(vec![
            input("echo", "words.0", json!("one")),
            input("echo", "words.1", json!("two")),
        ])
        .unwrap();

    let messages = block.run("echo").await.unwrap();
    assert_eq!(outputs(&messages)[0].source, BlockPinRef::new("echo", "text"));
    assert_eq!(outputs(&messages)[0].value, json!("one two"));
}

#[tokio::test]
async fn test_list_input_port_pads_values() {
    let def = BlockDefinition::builder("Summer")
        .field("numbers", TypeExpr::list(TypeExpr::Integer.input()))
        .field("total", TypeExpr::output(TypeExpr::Integer))
        .step(
            "sum",
            FunctionDecl::new(handler_fn(|scope, _| {
                let total: i64 = scope
                    .values("numbers")
                    .iter()
                    .filter_map(Value::as_i64)
                    .sum();
                scope.send("total", total)?;
                Ok(Value::Null)
            })),
        )
        .build()
        .unwrap();
    let mut block = instance(def);
    block
        .set_inputs(vec![input("numbers.0", "", json!(2)), input("numbers.3", "", json!("5"))])
        .unwrap();

    match &block.ports()["numbers"] {
        PortSlot::List(slots) => {
            assert_eq!(slots.len(), 4);
            assert!(matches!(&slots[3], Some(PortValue::Value(v)) if *v == json!(5)));
        }
        other => panic!("expected a list port, got {other:?}"),
    }

    let messages = block.run("sum").await.unwrap();
    assert_eq!(outputs(&messages)[0].value, json!(7));
}

#[test]
fn test_invalid_list_index_on_input() {
    let def = BlockDefinition::builder("Summer")
        .field("numbers", TypeExpr::list(TypeExpr::Integer.input()))
        .build()
        .unwrap();
    let mut block = instance(def);
    assert!(matches!(
        block.set_inputs(vec![input("numbers.first", "", json!(1))]),
        Err(RunError::InvalidIndex { .. })
    ));
}

#[test]
fn test_oversized_list_index_is_rejected() {
    let def = || {
        BlockDefinition::builder("Summer")
            .field("numbers", TypeExpr::list(TypeExpr::Integer.input()))
            .field("items", TypeExpr::list(TypeExpr::output(TypeExpr::String)))
            .build()
            .unwrap()
    };

    for index in [usize::MAX.to_string(), "1000000000000".to_string()] {
        let mut block = instance(def());
        let input_port = format!("numbers.{index}");
        assert!(matches!(
            block.set_input(&BlockPinRef::new(input_port.as_str(), ""), json!(1)),
            Err(RunError::InvalidIndex { .. })
        ));

        let mut block = instance(def());
        let output_port = format!("items.{index}");
        assert!(matches!(
            block.create_ports(&[], &[BlockPinRef::new(output_port.as_str(), "")]),
            Err(RunError::InvalidIndex { .. })
        ));
    }
}

#[test]
fn test_out_of_range_integer_input_is_rejected() {
    let def = BlockDefinition::builder("Summer")
        .field("numbers", TypeExpr::list(TypeExpr::Integer.input()))
        .build()
        .unwrap();
    let mut block = instance(def);
    let target = BlockPinRef::new("numbers.0", "");
    assert!(matches!(
        block.set_input(&target, json!("1e20")),
        Err(RunError::Validation { .. })
    ));
    assert_eq!(block.input_value(&target), None);
}

#[tokio::test]
async fn test_body_can_report_on_error_port() {
    let def = BlockDefinition::builder("Reporter")
        .step(
            "check",
            FunctionDecl::new(handler_fn(|scope, _| {
                let report = BlockError::new("bad input").with_data(json!({ "field": "x" }));
                let report = serde_json::to_value(report)
                    .map_err(|e| RunError::validation("error", "", e.to_string()))?;
                scope.send("error", report)?;
                Ok(Value::Null)
            })),
        )
        .build()
        .unwrap();
    let mut block = instance(def);
    let messages = block.run("check").await.unwrap();
    assert_eq!(outputs(&messages)[0].source, BlockPinRef::new("error", ""));
    assert_eq!(
        outputs(&messages)[0].value,
        json!({ "message": "bad input", "data": { "field": "x" } })
    );
}

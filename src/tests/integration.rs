//! End-to-end runs through the registry and runtime

use serde_json::json;

use super::example_blocks::{counter, greeter, greeter_version, tool_user};
use crate::core::error::RunError;
use crate::core::message::{BlockMessage, BlockRunData};
use crate::core::registry::{BlockRegistry, RegistryError};
use crate::runtime::BlockRuntime;
use crate::RuntimeConfig;

fn runtime() -> BlockRuntime {
    let registry = BlockRegistry::new();
    registry.register(greeter()).unwrap();
    registry.register(greeter_version("Greeter_1_2")).unwrap();
    registry.register(tool_user()).unwrap();
    registry.register(counter()).unwrap();
    BlockRuntime::new(registry)
}

#[tokio::test]
async fn test_run_from_wire_data() {
    let data: BlockRunData = serde_json::from_value(json!({
        "name": "Greeter",
        "version": "^1",
        "function": "greet",
        "inputs": [{ "target": { "port": "name", "pin": "" }, "value": "Grace" }]
    }))
    .unwrap();

    let messages = runtime().run(data).await.unwrap();
    assert_eq!(
        serde_json::to_value(&messages).unwrap(),
        json!([{
            "outputs": [{
                "source": { "port": "greet", "pin": "" },
                "value": "Hello Grace",
                "index": 0
            }],
            "inputs": [],
            "redirects": [],
            "states": []
        }])
    );
}

#[test]
fn test_highest_matching_version_is_selected() {
    let runtime = runtime();
    assert_eq!(
        runtime.registry().find("Greeter", "^1").unwrap().version().to_string(),
        "1.2.0"
    );
    assert_eq!(
        runtime.registry().find("Greeter", "~1.0").unwrap().version().to_string(),
        "1.0.0"
    );
    assert_eq!(
        runtime.registry().find("Greeter", "").unwrap().version().to_string(),
        "1.2.0"
    );
    assert!(matches!(
        runtime.registry().find("Greeter", "^2"),
        Err(RegistryError::NoMatchingVersion { .. })
    ));
}

#[test]
fn test_interface_through_runtime() {
    let interface = runtime().interface("ToolUser", "*").unwrap();
    assert!(interface.ports.contains_key("scale"));
    assert!(interface.ports["collect"].is_function);
}

#[tokio::test]
async fn test_unknown_block_is_a_registry_error() {
    let data = BlockRunData {
        name: "Missing".into(),
        version: "*".into(),
        function: "run".into(),
        ..BlockRunData::default()
    };
    assert!(matches!(
        runtime().run(data).await,
        Err(RunError::Registry(RegistryError::BlockNotFound(name))) if name == "Missing"
    ));
}

#[tokio::test]
async fn test_unknown_function_is_reported() {
    let data = BlockRunData {
        name: "Greeter".into(),
        version: "1.0.0".into(),
        function: "wave".into(),
        ..BlockRunData::default()
    };
    assert!(matches!(
        runtime().run(data).await,
        Err(RunError::UnknownFunction(name)) if name == "wave"
    ));
}

#[tokio::test]
async fn test_strict_inputs_reject_unknown_pins() {
    let data = || BlockRunData {
        name: "Greeter".into(),
        version: "*".into(),
        function: "greet".into(),
        inputs: serde_json::from_value(json!([
            { "target": { "port": "name", "pin": "" }, "value": "Lin" },
            { "target": { "port": "nickname", "pin": "" }, "value": "L" }
        ]))
        .unwrap(),
        ..BlockRunData::default()
    };

    assert!(matches!(
        runtime().run(data()).await,
        Err(RunError::UnknownPin { .. })
    ));

    let registry = BlockRegistry::new();
    registry.register(greeter()).unwrap();
    let lenient = BlockRuntime::with_config(registry, RuntimeConfig::default().with_strict_inputs(false));
    let messages = lenient.run(data()).await.unwrap();
    assert_eq!(messages[0].outputs[0].value, json!("Hello Lin"));
}

#[tokio::test]
async fn test_each_run_gets_a_fresh_instance() {
    let runtime = runtime();
    let data = |count: i64| {
        serde_json::from_value::<BlockRunData>(json!({
            "name": "Counter",
            "version": "*",
            "function": "increment",
            "state": [{ "state": "count", "value": count }],
            "inputs": [{ "target": { "port": "increment", "pin": "source" }, "value": "cli" }]
        }))
        .unwrap()
    };

    let first = runtime.run(data(0)).await.unwrap();
    let second = runtime.run(data(10)).await.unwrap();
    assert_eq!(first[0], BlockMessage::state("count", json!(1)));
    assert_eq!(second[0], BlockMessage::state("count", json!(11)));
}

//! Composition properties: determinism, idempotence, list union, scalar
//! precedence and the authoring errors that abort composition.

use std::sync::Arc;

use rails_config::{
    BaseConfiguration, ComposeError, ConfigComposer, MergeRule, MergeRuleTable, RailFragment,
    RailRegistry, SelectionSet,
};
use serde_json::json;

const BASE_YAML: &str = r#"
models:
  - type: main
    engine: openai
    model: gpt-3.5-turbo-instruct
colang_version: "2.x"
"#;

fn base() -> BaseConfiguration {
    BaseConfiguration::from_yaml(BASE_YAML).unwrap()
}

/// Built-in rails plus a few test fragments that overlap on purpose.
fn composer() -> ConfigComposer {
    let registry = RailRegistry::builder()
        .with_builtin()
        .unwrap()
        .register(
            RailFragment::new("block_x", "Blocks topic X")
                .with_policy(json!({"topical_rails": {"topics": ["x"], "enabled": true}})),
        )
        .unwrap()
        .register(
            RailFragment::new("block_y", "Blocks topic Y")
                .with_policy(json!({"topical_rails": {"topics": ["y", "x"]}})),
        )
        .unwrap()
        .register(
            RailFragment::new("strict", "Strict sampling")
                .with_policy(json!({"sampling": {"temperature": 0.0, "mode": "strict"}})),
        )
        .unwrap()
        .register(
            RailFragment::new("creative", "Creative sampling")
                .with_policy(json!({"sampling": {"temperature": 0.9, "mode": "creative"}})),
        )
        .unwrap()
        .register(
            RailFragment::new("other_fact_checker", "Another fact checker")
                .with_flow(
                    "define flow double check\n  bot said something\n  $r = execute self_check_facts()",
                )
                .with_action("self_check_facts", "vendor.fact_checker"),
        )
        .unwrap()
        .register(
            RailFragment::new("dangling", "Flow with unbound action")
                .with_flow("define flow lookup\n  user said something\n  $r = execute web_search()"),
        )
        .unwrap()
        .register(
            RailFragment::new("legacy", "Legacy flows")
                .with_policy(json!({"colang_version": "1.0"})),
        )
        .unwrap()
        .build();

    ConfigComposer::new(Arc::new(registry))
}

#[test]
fn compose_is_deterministic() {
    let composer = composer();
    let selection = SelectionSet::new(["jailbreak_detection", "cove", "topical_politics"]);

    let first = composer.compose(&base(), &selection).unwrap();
    let second = composer.compose(&base(), &selection).unwrap();

    assert_eq!(first, second);
    assert_eq!(first.fingerprint(), second.fingerprint());
    assert_eq!(
        first.to_canonical_bytes().unwrap(),
        second.to_canonical_bytes().unwrap()
    );
    assert_eq!(first.policy_yaml().unwrap(), second.policy_yaml().unwrap());
    assert_eq!(first.flow_script(), second.flow_script());
}

#[test]
fn selection_order_changes_fingerprint() {
    let composer = composer();

    let a = composer
        .compose(&base(), &SelectionSet::new(["cove", "jailbreak_detection"]))
        .unwrap();
    let b = composer
        .compose(&base(), &SelectionSet::new(["jailbreak_detection", "cove"]))
        .unwrap();

    assert_ne!(a.fingerprint(), b.fingerprint());
    assert_eq!(a.flows()[0], b.flows()[1]);
}

#[test]
fn duplicate_selection_is_idempotent() {
    let composer = composer();

    let once = composer.compose(&base(), &SelectionSet::new(["cove"])).unwrap();
    let twice = composer
        .compose(&base(), &SelectionSet::new(["cove", "cove"]))
        .unwrap();

    assert_eq!(once, twice);
    assert_eq!(once.flows().len(), 2);
}

#[test]
fn stored_selection_with_duplicates_is_idempotent() {
    let composer = composer();

    let stored: SelectionSet =
        serde_json::from_str(r#"{"ids":["cove","jailbreak_detection","cove"]}"#).unwrap();
    let once = composer
        .compose(&base(), &SelectionSet::new(["cove", "jailbreak_detection"]))
        .unwrap();
    let again = composer.compose(&base(), &stored).unwrap();

    assert_eq!(once, again);
    assert_eq!(once.fingerprint(), again.fingerprint());
}

#[test]
fn shared_flow_block_appears_once() {
    let shared = "define flow greeting\n  user said hello\n  bot say hello";
    let indented = "\n      define flow greeting\n        user said hello\n        bot say hello\n    ";
    let registry = RailRegistry::builder()
        .register(RailFragment::new("greeter", "Greeter").with_flow(shared))
        .unwrap()
        .register(
            RailFragment::new("polite", "Polite greeter")
                .with_flow(indented)
                .with_flow("define flow farewell\n  user said bye\n  bot say bye"),
        )
        .unwrap()
        .build();
    let composer = ConfigComposer::new(Arc::new(registry));

    let composed = composer
        .compose(&base(), &SelectionSet::new(["greeter", "polite"]))
        .unwrap();

    assert_eq!(composed.flows().len(), 2);
    assert_eq!(composed.flows()[0], shared);
    assert_eq!(composed.flow_script().matches("define flow greeting").count(), 1);
    assert!(composed.has_rail("polite"));
}

#[test]
fn list_valued_keys_union_without_duplicates() {
    let composer = composer();

    let composed = composer
        .compose(&base(), &SelectionSet::new(["block_x", "block_y"]))
        .unwrap();

    let topics: Vec<&str> = composed
        .policy_section("topical_rails.topics")
        .and_then(|t| t.as_array())
        .unwrap()
        .iter()
        .filter_map(|t| t.as_str())
        .collect();

    assert_eq!(topics.len(), 2);
    assert!(topics.contains(&"x"));
    assert!(topics.contains(&"y"));
}

#[test]
fn rails_sections_from_different_fragments_coexist() {
    let composer = composer();

    let composed = composer
        .compose(
            &base(),
            &SelectionSet::new(["jailbreak_detection", "input_moderation", "cove"]),
        )
        .unwrap();

    assert_eq!(
        composed.policy_section("rails.input.flows"),
        Some(&json!(["check for jailbreak", "check input for harmful content"]))
    );
    assert_eq!(
        composed.policy_section("rails.output.flows"),
        Some(&json!(["self check facts"]))
    );
    // Base keys survive.
    assert_eq!(composed.policy_section("colang_version"), Some(&json!("2.x")));
    assert_eq!(composed.policy()["models"][0]["engine"], "openai");
}

#[test]
fn last_selected_scalar_wins() {
    let composer = composer();

    let strict_then_creative = composer
        .compose(&base(), &SelectionSet::new(["strict", "creative"]))
        .unwrap();
    assert_eq!(
        strict_then_creative.policy_section("sampling.mode"),
        Some(&json!("creative"))
    );

    let creative_then_strict = composer
        .compose(&base(), &SelectionSet::new(["creative", "strict"]))
        .unwrap();
    assert_eq!(
        creative_then_strict.policy_section("sampling.mode"),
        Some(&json!("strict"))
    );
}

#[test]
fn pinned_reject_rule_turns_overwrite_into_error() {
    let composer = composer().with_rules(
        MergeRuleTable::default().with_rule("sampling.mode", MergeRule::RejectOnConflict),
    );

    let err = composer
        .compose(&base(), &SelectionSet::new(["strict", "creative"]))
        .unwrap_err();

    assert!(matches!(err, ComposeError::Merge { ref rail, .. } if rail == "creative"));
}

#[test]
fn colang_version_conflict_is_rejected() {
    let err = composer()
        .compose(&base(), &SelectionSet::new(["legacy"]))
        .unwrap_err();

    assert!(matches!(err, ComposeError::Merge { ref rail, .. } if rail == "legacy"));
}

#[test]
fn unknown_rail_is_reported() {
    let err = composer()
        .compose(&base(), &SelectionSet::new(["cove", "no_such_rail"]))
        .unwrap_err();

    assert_eq!(err, ComposeError::UnknownRail("no_such_rail".to_string()));
}

#[test]
fn conflicting_action_bindings_are_rejected() {
    let err = composer()
        .compose(&base(), &SelectionSet::new(["cove", "other_fact_checker"]))
        .unwrap_err();

    match err {
        ComposeError::ActionConflict {
            name,
            existing,
            incoming,
        } => {
            assert_eq!(name, "self_check_facts");
            assert_eq!(existing.as_str(), "cove.self_check_facts");
            assert_eq!(incoming.as_str(), "vendor.fact_checker");
        }
        other => panic!("expected action conflict, got {other:?}"),
    }
}

#[test]
fn unbound_flow_action_is_rejected() {
    let err = composer()
        .compose(&base(), &SelectionSet::new(["dangling"]))
        .unwrap_err();

    assert_eq!(
        err,
        ComposeError::UnresolvedAction {
            flow: "lookup".to_string(),
            action: "web_search".to_string(),
        }
    );
}

#[test]
fn composed_configuration_records_bindings_and_rails() {
    let composed = composer()
        .compose(&base(), &SelectionSet::new(["jailbreak_detection", "cove"]))
        .unwrap();

    let labels: Vec<&str> = composed.rails().iter().map(|r| r.label.as_str()).collect();
    assert_eq!(
        labels,
        vec![
            "Jailbreak Detection",
            "Chain-of-Verification (Custom Fact-Checking)"
        ]
    );
    assert_eq!(
        composed.actions().get("self_check_facts").map(|a| a.as_str()),
        Some("cove.self_check_facts")
    );
    assert!(composed.flow_script().contains("define flow check for jailbreak"));
    assert!(composed.flow_script().contains("define flow self check facts"));
    assert_eq!(composed.policy_section("cove.max_questions"), Some(&json!(8)));
}

#[test]
fn menu_input_parses_into_selection() {
    let registry = RailRegistry::builtin();

    let selection = SelectionSet::parse("1 3, 1 jailbreak_detection", &registry).unwrap();
    assert_eq!(
        selection.ids(),
        &["cove", "input_moderation", "jailbreak_detection"]
    );

    assert!(SelectionSet::parse("", &registry).unwrap().is_empty());
    assert!(SelectionSet::parse("1 9", &registry).is_err());
}

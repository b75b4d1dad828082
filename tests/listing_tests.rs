//! Filtering, selector grammar, and listing round-trips through the
//! public surface.

use attest::cli::{render_human_listing, render_json_listing, ListingNode};
use attest::registry::build_root_suite;
use attest::{Registration, Selector, TestClass, TestError, TestFilter};

struct Parsing;

impl TestClass for Parsing {
    fn class_name() -> &'static str {
        "Parsing"
    }
    fn new() -> Self {
        Parsing
    }
}

struct Evaluation;

impl TestClass for Evaluation {
    fn class_name() -> &'static str {
        "Evaluation"
    }
    fn new() -> Self {
        Evaluation
    }
}

fn noop_parsing(_: &mut Parsing) -> Result<(), TestError> {
    Ok(())
}

fn noop_evaluation(_: &mut Evaluation) -> Result<(), TestError> {
    Ok(())
}

fn registration() -> Registration {
    Registration::new("lang-tests")
        .class::<Parsing>(&[("test_atoms", noop_parsing), ("test_lists", noop_parsing)])
        .class::<Evaluation>(&[("test_arithmetic", noop_evaluation)])
}

#[test]
fn human_listing_lists_every_leaf_once() {
    let root = build_root_suite(&registration(), &TestFilter::All);
    let listing = render_human_listing(&root);
    assert_eq!(
        listing.lines().collect::<Vec<_>>(),
        vec![
            "Parsing.test_atoms",
            "Parsing.test_lists",
            "Evaluation.test_arithmetic",
        ]
    );
}

#[test]
fn json_and_human_listings_agree_on_leaves() {
    let root = build_root_suite(&registration(), &TestFilter::All);
    let human: Vec<String> = render_human_listing(&root)
        .lines()
        .map(str::to_string)
        .collect();
    let parsed: ListingNode =
        serde_json::from_str(&render_json_listing(&root).unwrap()).unwrap();
    assert_eq!(parsed.leaf_names(), human);
}

#[test]
fn json_tree_nests_bundle_then_classes() {
    let root = build_root_suite(&registration(), &TestFilter::All);
    let value: serde_json::Value =
        serde_json::from_str(&render_json_listing(&root).unwrap()).unwrap();
    assert_eq!(value["name"], "All tests");
    assert_eq!(value["tests"][0]["name"], "lang-tests");
    assert_eq!(value["tests"][0]["tests"][0]["name"], "Parsing");
    assert_eq!(
        value["tests"][0]["tests"][0]["tests"][1]["name"],
        "Parsing.test_lists"
    );
}

#[test]
fn selected_filter_lists_only_matching_cases() {
    let filter = TestFilter::from_selectors(&["Parsing/test_lists".to_string()]);
    let root = build_root_suite(&registration(), &filter);
    assert_eq!(render_human_listing(&root), "Parsing.test_lists");
}

#[test]
fn filter_application_is_idempotent() {
    let filter = TestFilter::from_selectors(&["Parsing".to_string()]);
    let once = registration().filtered(&filter);
    let twice = once.filtered(&filter);
    assert_eq!(once.case_count(), 2);
    assert_eq!(once.case_count(), twice.case_count());

    let root_once = build_root_suite(&once, &filter);
    let root_twice = build_root_suite(&twice, &filter);
    assert_eq!(
        render_human_listing(&root_once),
        render_human_listing(&root_twice)
    );
}

#[test]
fn selectors_with_extra_segments_are_discarded() {
    let filter = TestFilter::from_selectors(&[
        "Parsing/test_atoms/extra".to_string(),
        "Evaluation".to_string(),
    ]);
    let root = build_root_suite(&registration(), &filter);
    assert_eq!(render_human_listing(&root), "Evaluation.test_arithmetic");
}

#[test]
fn selector_parse_accepts_both_forms() {
    assert_eq!(
        Selector::parse("Parsing").unwrap(),
        Selector {
            class: "Parsing".into(),
            method: None
        }
    );
    assert_eq!(
        Selector::parse("Parsing/test_atoms").unwrap(),
        Selector {
            class: "Parsing".into(),
            method: Some("test_atoms".into())
        }
    );
    assert!(Selector::parse("a/b/c").is_err());
}

#[test]
fn nonexistent_selector_yields_an_empty_tree() {
    let filter = TestFilter::from_selectors(&["Ghost".to_string()]);
    let root = build_root_suite(&registration(), &filter);
    assert_eq!(render_human_listing(&root), "");
    let value: serde_json::Value =
        serde_json::from_str(&render_json_listing(&root).unwrap()).unwrap();
    assert_eq!(value["name"], "Selected tests");
    assert_eq!(value["tests"], serde_json::json!([]));
}

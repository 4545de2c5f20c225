// crates/workstream-core/src/context/tests.rs
// ============================================================================
// Module: Context Extractor Tests
// Description: Channel precedence, validation ordering, default policy.
// Purpose: Ensure malformed candidates never reach the registry.
// Dependencies: workstream-core, serde_json
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test fixtures use explicit asserts and unwraps for clarity."
)]

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use serde_json::json;

use super::*;
use crate::model::Permission;
use crate::model::WorkstreamConfig;
use crate::model::WorkstreamStatus;
use crate::registry::Registry;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Directory double counting lookups.
struct CountingDirectory {
    inner: Registry,
    lookups: AtomicUsize,
}

impl WorkstreamDirectory for CountingDirectory {
    fn get(&self, name: &WorkstreamName) -> Option<Arc<WorkstreamConfig>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.get(name)
    }

    fn list(&self) -> Vec<Arc<WorkstreamConfig>> {
        self.inner.list()
    }
}

fn config(name: &str) -> WorkstreamConfig {
    WorkstreamConfig {
        name: WorkstreamName::parse(name).unwrap(),
        display_name: String::new(),
        description: String::new(),
        owner: String::new(),
        phase: String::new(),
        status: WorkstreamStatus::Active,
        data_path: PathBuf::from(format!("/srv/ws/{name}")),
        allowed_operations: BTreeSet::from([Permission::Read]),
    }
}

fn counting() -> Arc<CountingDirectory> {
    Arc::new(CountingDirectory {
        inner: Registry::from_configs(vec![config("ora"), config("mecca"), config("sales")]).unwrap(),
        lookups: AtomicUsize::new(0),
    })
}

fn op(path: &str) -> OperationDescriptor {
    OperationDescriptor::new(OperationKind::ReadArtefact, path)
}

// ============================================================================
// SECTION: Precedence
// ============================================================================

#[test]
fn query_wins_over_every_other_channel() {
    let extractor = ContextExtractor::new(counting());
    let operation = op("/api/workstream/sales/artefacts/x")
        .with_query("workstream", "ora")
        .with_header("X-Workstream", "mecca")
        .with_body(json!({ "workstream": "sales" }));
    let context = extractor.extract(&operation).unwrap();
    assert_eq!(context.workstream.as_str(), "ora");
    assert_eq!(context.detection_source, DetectionSource::Query);
}

#[test]
fn header_wins_over_body_and_path() {
    let extractor = ContextExtractor::new(counting());
    let operation = op("/api/workstream/sales")
        .with_header("X-Workstream", "mecca")
        .with_body(json!({ "workstream": "ora" }));
    let context = extractor.extract(&operation).unwrap();
    assert_eq!(context.workstream.as_str(), "mecca");
    assert_eq!(context.detection_source, DetectionSource::Header);
}

#[test]
fn body_wins_over_path() {
    let extractor = ContextExtractor::new(counting());
    let operation = op("/api/workstream/sales").with_body(json!({ "workstream": "ora" }));
    let context = extractor.extract(&operation).unwrap();
    assert_eq!(context.workstream.as_str(), "ora");
    assert_eq!(context.detection_source, DetectionSource::Body);
}

#[test]
fn path_channel_accepts_singular_and_plural_markers() {
    let extractor = ContextExtractor::new(counting());
    for path in ["/api/workstream/sales/artefacts/x", "/workstreams/sales/", "/api/workstream/sales"] {
        let context = extractor.extract(&op(path)).unwrap();
        assert_eq!(context.workstream.as_str(), "sales", "{path}");
        assert_eq!(context.detection_source, DetectionSource::Path);
    }
}

#[test]
fn blank_values_fall_through_to_the_next_channel() {
    let extractor = ContextExtractor::new(counting());
    let operation = op("/api/workstream/sales")
        .with_query("workstream", "")
        .with_header("x-workstream", "   ")
        .with_body(json!({ "workstream": "" }));
    let context = extractor.extract(&operation).unwrap();
    assert_eq!(context.detection_source, DetectionSource::Path);
}

#[test]
fn data_path_is_copied_from_the_registry() {
    let directory = counting();
    let extractor = ContextExtractor::new(directory.clone());
    let context = extractor.extract(&op("/").with_query("workstream", "ora")).unwrap();
    let registered = directory.inner.get(&context.workstream).unwrap();
    assert_eq!(context.data_path, registered.data_path);
}

// ============================================================================
// SECTION: Rejections
// ============================================================================

#[test]
fn missing_everywhere_is_missing_workstream() {
    let extractor = ContextExtractor::new(counting());
    assert_eq!(extractor.extract(&op("/api/health")), Err(ContextError::MissingWorkstream));
}

#[test]
fn malformed_candidates_never_reach_the_registry() {
    let directory = counting();
    let extractor = ContextExtractor::new(directory.clone());
    let overlong = "a".repeat(40);
    for candidate in ["../../../etc/passwd", "ora/../mecca", "a\\b", "ora\0", "ORA", overlong.as_str()] {
        let result = extractor.extract(&op("/").with_query("workstream", candidate));
        assert!(matches!(result, Err(ContextError::InvalidFormat(_))), "{candidate:?}");
    }
    let traversal = extractor.extract(&op("/api/workstream/../../etc"));
    assert!(matches!(traversal, Err(ContextError::InvalidFormat(_))));
    assert_eq!(directory.lookups.load(Ordering::SeqCst), 0);
}

#[test]
fn non_string_body_field_is_invalid_format() {
    let extractor = ContextExtractor::new(counting());
    let result = extractor.extract(&op("/").with_body(json!({ "workstream": 42 })));
    assert_eq!(result, Err(ContextError::InvalidFormat(FormatViolation::NonStringBodyField)));
    let null = extractor.extract(&op("/").with_body(json!({ "workstream": null })));
    assert_eq!(null, Err(ContextError::MissingWorkstream));
}

#[test]
fn well_formed_but_unregistered_is_unknown() {
    let extractor = ContextExtractor::new(counting());
    let result = extractor.extract(&op("/").with_header("x-workstream", "ghost"));
    assert_eq!(result, Err(ContextError::UnknownWorkstream));
}

// ============================================================================
// SECTION: Default Policy
// ============================================================================

#[test]
fn configured_default_applies_only_when_no_channel_supplies_one() {
    let extractor = ContextExtractor::new(counting())
        .with_default_policy(DefaultWorkstreamPolicy::Fallback(WorkstreamName::parse("ora").unwrap()));
    let fallback = extractor.extract(&op("/")).unwrap();
    assert_eq!(fallback.workstream.as_str(), "ora");
    assert_eq!(fallback.detection_source, DetectionSource::ConfiguredDefault);
    let explicit = extractor.extract(&op("/").with_query("workstream", "sales")).unwrap();
    assert_eq!(explicit.workstream.as_str(), "sales");
    let malformed = extractor.extract(&op("/").with_query("workstream", "../x"));
    assert!(matches!(malformed, Err(ContextError::InvalidFormat(_))));
}

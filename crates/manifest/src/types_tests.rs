// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unit tests for the manifest model

use super::*;

fn parse(json: &str) -> WorkerManifest {
    serde_json::from_str(json).unwrap()
}

#[test]
fn empty_object_is_a_valid_manifest() {
    let manifest = parse("{}");
    assert_eq!(manifest, WorkerManifest::default());
}

#[test]
fn fields_use_camel_case_keys() {
    let manifest = parse(
        r#"{
            "startupTimeout": 30000,
            "respawnCount": 4,
            "respawnClearTimeout": 120000,
            "livenessCounter": 5,
            "memleakGuardEnabled": true,
            "memleakGuardTrigger": 512,
            "memleakGuardCollectCore": true
        }"#,
    );
    assert_eq!(manifest.startup_timeout, Some(30_000));
    assert_eq!(manifest.respawn_count, Some(4));
    assert_eq!(manifest.respawn_clear_timeout, Some(120_000));
    assert_eq!(manifest.liveness_counter, Some(5));
    assert_eq!(manifest.memleak_guard_enabled, Some(true));
    assert_eq!(manifest.memleak_guard_trigger, Some(512));
    assert_eq!(manifest.memleak_guard_collect_core, Some(true));
}

#[test]
fn singular_tag_becomes_a_one_element_list() {
    let manifest = parse(r#"{"tag": "storage"}"#);
    assert_eq!(manifest.tags, ["storage"]);
}

#[test]
fn tags_list_parses_directly() {
    let manifest = parse(r#"{"tags": ["storage", "infra"]}"#);
    assert_eq!(manifest.tags, ["storage", "infra"]);
}

#[test]
fn unknown_fields_are_tolerated() {
    let manifest = parse(r#"{"args": ["-x"], "applicationSpecific": {"a": 1}}"#);
    assert_eq!(manifest.args, ["-x"]);
}

#[test]
fn wrong_types_are_rejected() {
    let err = serde_json::from_str::<WorkerManifest>(r#"{"startupTimeout": "soon"}"#);
    assert!(err.is_err());
}

#[test]
fn normalize_folds_depends_into_after() {
    let mut manifest = parse(r#"{"depends": ["dns"]}"#);
    manifest.normalize("web");
    assert_eq!(manifest.after, ["dns"]);
    assert_eq!(manifest.depends, None);
}

#[test]
fn normalize_prefers_after_over_depends() {
    let mut manifest = parse(r#"{"after": ["dns"], "depends": ["ntp"]}"#);
    manifest.normalize("web");
    assert_eq!(manifest.after, ["dns"]);
    assert_eq!(manifest.depends, None);
}

#[test]
fn executable_name_defaults_to_name_worker() {
    let manifest = parse("{}");
    assert_eq!(manifest.executable_name("dns"), format!("dnsWorker{}", std::env::consts::EXE_SUFFIX));

    let manifest = parse(r#"{"path": "bin/dnsd"}"#);
    assert_eq!(manifest.executable_name("dns"), "bin/dnsd");
}

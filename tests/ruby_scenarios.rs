//! End-to-end runs through a real Ruby interpreter.
//!
//! Each test returns early with a note when `ruby` is not installed.

use std::process::Command;

use indexmap::IndexMap;
use remote_run::flavour::Flavour;
use remote_run::printer::{OutputPrinter, StreamKind};
use remote_run::{ExecError, ExecutionConfig, ExecutionContext, RunSource};
use serde_json::{json, Value};

fn ruby_available() -> bool {
    let found = Command::new("ruby")
        .args(["-rjson", "-e", "exit 0"])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);
    if !found {
        println!("ruby not found; skipping");
    }
    found
}

fn context(cache_dir: &std::path::Path, tweak: impl FnOnce(&mut ExecutionConfig)) -> ExecutionContext {
    let mut config = ExecutionConfig::local(".");
    config.cache_dir = cache_dir.to_path_buf();
    tweak(&mut config);
    ExecutionContext::with_printers(
        config,
        OutputPrinter::silent(StreamKind::Stdout),
        OutputPrinter::silent(StreamKind::Stderr),
    )
    .unwrap()
}

fn locals(pairs: &[(&str, Value)]) -> IndexMap<String, Value> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

#[tokio::test]
async fn expression_value_without_reassignment() {
    if !ruby_available() {
        return;
    }
    let tmp = tempfile::tempdir().unwrap();
    let mut ctx = context(tmp.path(), |_| {});

    let outcome = ctx.execute("x + 1", &locals(&[("x", json!(41))])).await.unwrap();
    assert_eq!(outcome.value, json!(42));
    assert!(outcome.changed.is_empty());
    assert_eq!(outcome.source, RunSource::Live);
}

#[tokio::test]
async fn reassignment_is_recorded_and_replayed() {
    if !ruby_available() {
        return;
    }
    let tmp = tempfile::tempdir().unwrap();
    let code = "x = x + 1; x";
    let input = locals(&[("x", json!(41))]);

    let mut recorder = context(tmp.path(), |c| c.save_cache = true);
    let first = recorder.execute(code, &input).await.unwrap();
    assert_eq!(first.value, json!(42));
    assert_eq!(first.changed, locals(&[("x", json!(42))]));
    assert_eq!(first.source, RunSource::Recorded);
    assert!(recorder.cache().exists(&first.hash));

    let mut replayer = context(tmp.path(), |c| c.use_cache = true);
    let second = replayer.execute(code, &input).await.unwrap();
    assert_eq!(second.source, RunSource::Replayed);
    assert_eq!(second.value, first.value);
    assert_eq!(second.changed, first.changed);
    assert_eq!(second.hash, first.hash);
}

#[tokio::test]
async fn bindings_round_trip_unchanged() {
    if !ruby_available() {
        return;
    }
    let tmp = tempfile::tempdir().unwrap();
    let mut ctx = context(tmp.path(), |_| {});
    let input = locals(&[
        ("count", json!(-7)),
        ("name", json!("it's \"quoted\" #{not} interpolated ✓")),
        ("nested", json!({"a": [1, 2, {"b": null}], "c": {"d": true, "e": 1.5}})),
    ]);

    let outcome = ctx.execute("[count, name, nested]", &input).await.unwrap();
    assert_eq!(
        outcome.value,
        json!([input["count"], input["name"], input["nested"]])
    );
    assert!(outcome.changed.is_empty());
}

#[tokio::test]
async fn console_output_is_kept_apart_from_the_result() {
    if !ruby_available() {
        return;
    }
    let tmp = tempfile::tempdir().unwrap();
    let mut ctx = context(tmp.path(), |_| {});

    let outcome = ctx
        .execute("puts 'hello'\n$stderr.puts 'warn'\nprint 'tail'\n:done", &IndexMap::new())
        .await
        .unwrap();
    assert_eq!(outcome.value, json!("done"));
    assert_eq!(outcome.output, "hello\ntail");
    assert_eq!(outcome.errors, "warn\n");
}

#[tokio::test]
async fn raising_code_is_a_non_success_exit_and_not_cached() {
    if !ruby_available() {
        return;
    }
    let tmp = tempfile::tempdir().unwrap();
    let mut ctx = context(tmp.path(), |c| c.save_cache = true);

    let err = ctx.execute("raise 'nope'", &IndexMap::new()).await.unwrap_err();
    match err {
        ExecError::NonSuccessExit { stderr, .. } => assert!(stderr.contains("nope")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(ctx.cache().list().is_empty());
}

#[tokio::test]
async fn early_exit_skips_the_trailer() {
    if !ruby_available() {
        return;
    }
    let tmp = tempfile::tempdir().unwrap();
    let mut ctx = context(tmp.path(), |_| {});
    let err = ctx.execute("puts 'bye'; exit 0", &IndexMap::new()).await.unwrap_err();
    assert!(matches!(err, ExecError::MalformedResult(_)));
}

#[tokio::test]
async fn flavours_run_before_user_code() {
    if !ruby_available() {
        return;
    }
    let tmp = tempfile::tempdir().unwrap();
    let mut ctx = context(tmp.path(), |c| {
        c.flavours = vec![
            Flavour::Require { libraries: vec!["set".into()] },
            Flavour::Env { vars: vec![("RRUN_TEST_FLAVOUR".into(), "on".into())] },
        ];
    });

    let outcome = ctx
        .execute("[Set.new([1, 1]).size, ENV['RRUN_TEST_FLAVOUR']]", &IndexMap::new())
        .await
        .unwrap();
    assert_eq!(outcome.value, json!([1, "on"]));
}

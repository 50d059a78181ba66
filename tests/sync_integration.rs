//! End-to-end sync/clean flows with a mocked tool runner.

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::Value;
use tempfile::tempdir;

use b2_sync::config::Config;
use b2_sync::report::SyncAction;
use b2_sync::runner::{MockToolRunner, ToolOutput};
use b2_sync::sync::{CleanOutcome, SyncRunner};

const ACCOUNT_JSON: &str = r#"{"accountId": "abc", "downloadUrl": "https://f004.backblazeb2.com"}"#;

const SYNC_OUTPUT: &str = "\
upload: input/cat.jpg -> b2://fal-bucket/cat.jpg
update: input/dog.jpg -> b2://fal-bucket/dog.jpg
skip: input/bird.jpg -> b2://fal-bucket/bird.jpg (already exists)
delete: b2://fal-bucket/stale.jpg
error: input/bad.jpg -> b2://fal-bucket/bad.jpg (file error)
";

fn out(status: i32, stdout: &str, stderr: &str) -> ToolOutput {
    ToolOutput {
        status,
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
    }
}

fn test_config(output_dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.paths.output_dir = output_dir.to_path_buf();
    config.paths.input_dir = "input".into();
    config.processing.exclude_patterns.clear();
    config
}

/// Finds the single run directory created under the output root.
fn only_run_dir(output_root: &std::path::Path) -> std::path::PathBuf {
    let mut dirs: Vec<_> = fs::read_dir(output_root)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(dirs.len(), 1, "expected exactly one run directory");
    dirs.pop().unwrap()
}

#[tokio::test]
async fn sync_happy_flow_writes_log_and_link_files() {
    let output = tempdir().unwrap();
    let config = test_config(output.path());

    let mut runner = MockToolRunner::new();
    runner
        .expect_run()
        .returning(|_, args| match args.first().map(String::as_str) {
            // authorize short-circuit and later endpoint lookup
            Some("account") => Ok(out(0, ACCOUNT_JSON, "")),
            Some("sync") => {
                assert!(args.iter().any(|a| a == "--replace-newer"));
                assert!(args.iter().any(|a| a == "--delete"));
                assert!(args.iter().any(|a| a == "b2://fal-bucket/"));
                Ok(out(0, SYNC_OUTPUT, ""))
            }
            other => panic!("unexpected command: {other:?}"),
        });

    let report = SyncRunner::new(&config, &runner).sync(false).await.unwrap();

    assert_eq!(report.events.len(), 5);
    assert_eq!(report.summary.files_uploaded, 1);
    assert_eq!(report.summary.files_updated, 1);
    assert_eq!(report.summary.files_skipped, 1);
    assert_eq!(report.summary.files_deleted, 1);
    assert_eq!(report.summary.files_failed, 1);

    let run_dir = only_run_dir(output.path());
    let log_name = format!("{}_sync_log.json", run_dir.file_name().unwrap().to_str().unwrap());
    let doc: Value =
        serde_json::from_str(&fs::read_to_string(run_dir.join(log_name)).unwrap()).unwrap();
    assert_eq!(doc["run_metadata"]["total_files"], 5);
    assert_eq!(doc["run_metadata"]["bucket_name"], "fal-bucket");

    // links for the upload and the update, resolved against the account node
    let cat = fs::read_to_string(run_dir.join("cat.txt")).unwrap();
    assert_eq!(cat, "https://f004.backblazeb2.com/file/fal-bucket/cat.jpg");
    let dog = fs::read_to_string(run_dir.join("dog.txt")).unwrap();
    assert_eq!(dog, "https://f004.backblazeb2.com/file/fal-bucket/dog.jpg");
    assert!(!run_dir.join("bird.txt").exists());
    assert!(!run_dir.join("bad.txt").exists());
    assert!(!run_dir.join("FAILURE.md").exists());
}

#[tokio::test]
async fn sync_subprocess_failure_writes_failure_report_and_errors() {
    let output = tempdir().unwrap();
    let config = test_config(output.path());

    let mut runner = MockToolRunner::new();
    runner
        .expect_run()
        .returning(|_, args| match args.first().map(String::as_str) {
            Some("account") => Ok(out(0, ACCOUNT_JSON, "")),
            Some("sync") => Ok(out(1, "", "tree comparison failed")),
            other => panic!("unexpected command: {other:?}"),
        });

    let err = SyncRunner::new(&config, &runner)
        .sync(false)
        .await
        .expect_err("sync should propagate subprocess failure");
    assert!(err.to_string().contains("status 1"));

    let run_dir = only_run_dir(output.path());
    let failure = fs::read_to_string(run_dir.join("FAILURE.md")).unwrap();
    assert!(failure.contains("sync_operation"));
    assert!(failure.contains("tree comparison failed"));

    let log_name = format!("{}_sync_log.json", run_dir.file_name().unwrap().to_str().unwrap());
    let doc: Value =
        serde_json::from_str(&fs::read_to_string(run_dir.join(log_name)).unwrap()).unwrap();
    assert_eq!(doc["run_metadata"]["total_files"], 0);
    assert_eq!(doc["errors"][0]["kind"], "B2SyncFailure");
}

#[tokio::test]
async fn unauthorized_cli_runs_the_full_credential_flow() {
    let output = tempdir().unwrap();
    let config = test_config(output.path());

    let op_item = r#"{
        "fields": [
            {"label": "keyID", "value": "key-123"},
            {"label": "applicationKey", "value": "secret-456"},
            {"label": "Bucket", "value": "op-bucket"}
        ]
    }"#;

    let account_gets = AtomicUsize::new(0);
    let mut runner = MockToolRunner::new();
    runner.expect_run().returning(move |program, args| {
        match args.first().map(String::as_str) {
            Some("account") if args.get(1).map(String::as_str) == Some("get") => {
                // unauthorized on the first probe, authorized afterwards
                if account_gets.fetch_add(1, Ordering::SeqCst) == 0 {
                    Ok(out(1, "", "not authorized"))
                } else {
                    Ok(out(0, ACCOUNT_JSON, ""))
                }
            }
            Some("account") if args.get(1).map(String::as_str) == Some("list") => {
                assert!(program.contains("op"));
                Ok(out(0, "MY.1password.com", ""))
            }
            Some("account") if args.get(1).map(String::as_str) == Some("authorize") => {
                assert_eq!(args[2], "key-123");
                assert_eq!(args[3], "secret-456");
                Ok(out(0, "", ""))
            }
            Some("item") => Ok(out(0, op_item, "")),
            Some("sync") => {
                // the bucket from the 1Password item wins over the configured one
                assert!(args.iter().any(|a| a == "b2://op-bucket/"));
                Ok(out(0, "upload: input/a.jpg -> b2://op-bucket/a.jpg\n", ""))
            }
            other => panic!("unexpected command: {other:?}"),
        }
    });

    let report = SyncRunner::new(&config, &runner).sync(false).await.unwrap();
    assert_eq!(report.bucket_name, "op-bucket");
    assert_eq!(report.summary.files_uploaded, 1);
}

#[tokio::test]
async fn clean_with_force_empties_bucket_and_logs_file_count() {
    let output = tempdir().unwrap();
    let config = test_config(output.path());

    let listing = "--\nphoto1.jpg\nphoto2.jpg\nphoto3.jpg\n--\n";
    let mut runner = MockToolRunner::new();
    runner
        .expect_run()
        .returning(move |_, args| match args.first().map(String::as_str) {
            Some("account") => Ok(out(0, ACCOUNT_JSON, "")),
            Some("ls") => Ok(out(0, listing, "")),
            Some("rm") => {
                assert!(args.iter().any(|a| a == "--versions"));
                assert!(args.iter().any(|a| a == "--recursive"));
                Ok(out(0, "", ""))
            }
            Some("cancel-all-unfinished-large-files") => Ok(out(0, "", "")),
            other => panic!("unexpected command: {other:?}"),
        });

    let outcome = SyncRunner::new(&config, &runner)
        .clean(true, false)
        .await
        .unwrap();
    let report = match outcome {
        CleanOutcome::Completed(report) => report,
        other => panic!("expected completed clean, got {other:?}"),
    };
    assert_eq!(report.operation, "clean");
    assert_eq!(report.events.len(), 1);
    assert_eq!(report.events[0].action, SyncAction::Delete);
    assert_eq!(report.extra["files_deleted"], Value::from(3));

    let run_dir = only_run_dir(output.path());
    let log_name = format!("{}_clean_log.json", run_dir.file_name().unwrap().to_str().unwrap());
    let doc: Value =
        serde_json::from_str(&fs::read_to_string(run_dir.join(log_name)).unwrap()).unwrap();
    // caller-supplied count overrides the single synthetic delete event
    assert_eq!(doc["run_metadata"]["files_deleted"], 3);
    assert_eq!(doc["run_metadata"]["total_files"], 1);
}

#[tokio::test]
async fn clean_declined_at_the_prompt_deletes_nothing() {
    let output = tempdir().unwrap();
    let config = test_config(output.path());

    let mut runner = MockToolRunner::new();
    runner
        .expect_run()
        .returning(|_, args| match args.first().map(String::as_str) {
            Some("account") => Ok(out(0, ACCOUNT_JSON, "")),
            Some("ls") => Ok(out(0, "photo1.jpg\nphoto2.jpg\n", "")),
            other => panic!("delete command must not run after a decline: {other:?}"),
        });

    let outcome = SyncRunner::new(&config, &runner)
        .clean_with_confirmation(false, false, |bucket, file_count| {
            assert_eq!(bucket, "fal-bucket");
            assert_eq!(file_count, 2);
            Ok(false)
        })
        .await
        .unwrap();
    assert!(matches!(outcome, CleanOutcome::Cancelled));
    // the run directory exists but no log was written into it
    let run_dir = only_run_dir(output.path());
    assert_eq!(fs::read_dir(run_dir).unwrap().count(), 0);
}

#[tokio::test]
async fn clean_accepted_at_the_prompt_runs_the_deletion() {
    let output = tempdir().unwrap();
    let config = test_config(output.path());

    let mut runner = MockToolRunner::new();
    runner
        .expect_run()
        .returning(|_, args| match args.first().map(String::as_str) {
            Some("account") => Ok(out(0, ACCOUNT_JSON, "")),
            Some("ls") => Ok(out(0, "photo1.jpg\n", "")),
            Some("rm") => Ok(out(0, "", "")),
            Some("cancel-all-unfinished-large-files") => Ok(out(0, "", "")),
            other => panic!("unexpected command: {other:?}"),
        });

    let outcome = SyncRunner::new(&config, &runner)
        .clean_with_confirmation(false, false, |_, _| Ok(true))
        .await
        .unwrap();
    assert!(matches!(outcome, CleanOutcome::Completed(_)));
}

#[tokio::test]
async fn clean_dry_run_counts_but_never_deletes() {
    let output = tempdir().unwrap();
    let config = test_config(output.path());

    let mut runner = MockToolRunner::new();
    runner
        .expect_run()
        .returning(|_, args| match args.first().map(String::as_str) {
            Some("account") => Ok(out(0, ACCOUNT_JSON, "")),
            Some("ls") => Ok(out(0, "photo1.jpg\nphoto2.jpg\n", "")),
            other => panic!("delete command must not run in dry run: {other:?}"),
        });

    let outcome = SyncRunner::new(&config, &runner)
        .clean(false, true)
        .await
        .unwrap();
    match outcome {
        CleanOutcome::DryRun { file_count } => assert_eq!(file_count, 2),
        other => panic!("expected dry run outcome, got {other:?}"),
    }
}

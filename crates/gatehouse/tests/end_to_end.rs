//! End-to-end queue scenarios against a stub agent process.

#![cfg(unix)]

mod common;

use std::time::Duration;

use gatehouse::config::QueueConfig;
use gatehouse::db::job_repo;
use gatehouse::job::{JobStatus, Gender};

use common::{payload, TestHarness};

#[test]
fn submitted_job_runs_to_completion() {
    let harness = TestHarness::with_agent("echo registering; exit 0");
    let (dispatcher, pool) = harness.start();

    dispatcher.submit("v1", payload("Maria Santos")).unwrap();

    assert_eq!(
        harness.wait_terminal("v1", Duration::from_secs(10)),
        JobStatus::Completed
    );

    let view = dispatcher.status("v1").unwrap();
    assert_eq!(view.status, "completed");
    assert!(view.completed_at.is_some());
    assert_eq!(view.retry_count, 0);

    // Accepted + captured output in the diagnostic log.
    let logs = dispatcher.logs("v1").unwrap();
    assert!(logs.iter().any(|l| l.message.contains("accepted")));
    assert!(logs.iter().any(|l| l.message.contains("registering")));

    pool.shutdown();
    pool.wait();
}

#[test]
fn status_never_regresses_after_terminal() {
    let harness = TestHarness::with_agent("exit 0");
    let (dispatcher, pool) = harness.start();

    dispatcher.submit("v1", payload("Maria Santos")).unwrap();
    harness.wait_terminal("v1", Duration::from_secs(10));

    // A duplicate submission must not move the row out of completed.
    dispatcher.submit("v1", payload("Maria Santos")).unwrap();
    std::thread::sleep(Duration::from_millis(600));

    let row = job_repo::find_by_id(&harness.db, "v1").unwrap().unwrap();
    assert_eq!(row.status, "completed");

    pool.shutdown();
    pool.wait();
}

#[test]
fn restart_recovery_reprocesses_unfinished_rows() {
    let harness = TestHarness::with_agent("exit 0");

    // Rows left over from a "previous process": one pending, one stuck in
    // processing, one already done, one poison at the retry limit.
    job_repo::insert(&harness.db, "pending", r#"{"name":"A"}"#, false).unwrap();
    job_repo::insert(&harness.db, "stuck", r#"{"name":"B"}"#, false).unwrap();
    job_repo::update_status(&harness.db, "stuck", JobStatus::Processing, None, Some(7)).unwrap();
    job_repo::insert(&harness.db, "done", r#"{"name":"C"}"#, false).unwrap();
    job_repo::update_status(&harness.db, "done", JobStatus::Completed, None, Some(7)).unwrap();
    job_repo::insert(&harness.db, "poison", r#"{"name":"D"}"#, false).unwrap();
    for _ in 0..3 {
        job_repo::increment_retry(&harness.db, "poison").unwrap();
    }

    let (dispatcher, pool) = harness.start();
    let recovered = dispatcher.recover().unwrap();
    assert_eq!(recovered, 2);

    assert_eq!(
        harness.wait_terminal("pending", Duration::from_secs(10)),
        JobStatus::Completed
    );
    assert_eq!(
        harness.wait_terminal("stuck", Duration::from_secs(10)),
        JobStatus::Completed
    );

    // Recovery consumed one retry each.
    assert_eq!(
        job_repo::find_by_id(&harness.db, "pending").unwrap().unwrap().retry_count,
        1
    );

    // The poison row was left alone.
    let poison = job_repo::find_by_id(&harness.db, "poison").unwrap().unwrap();
    assert_eq!(poison.status, "pending");
    assert_eq!(poison.retry_count, 3);

    pool.shutdown();
    pool.wait();
}

#[test]
fn concurrent_jobs_respect_pool_capacity() {
    let queue_config = QueueConfig {
        worker_count: 2,
        ..Default::default()
    };
    let harness = TestHarness::with_agent_and_queue("sleep 0.3; exit 0", queue_config);
    let (dispatcher, pool) = harness.start();

    for i in 0..4 {
        dispatcher
            .submit(&format!("v{}", i), payload("Visitor"))
            .unwrap();
    }

    // Sample the active map while jobs are in flight.
    let mut max_processing = 0;
    for _ in 0..20 {
        max_processing = max_processing.max(pool.active_jobs().processing_count());
        std::thread::sleep(Duration::from_millis(50));
    }
    assert!(max_processing <= 2, "saw {} concurrent jobs", max_processing);

    for i in 0..4 {
        assert_eq!(
            harness.wait_terminal(&format!("v{}", i), Duration::from_secs(15)),
            JobStatus::Completed
        );
    }

    pool.shutdown();
    pool.wait();
}

#[test]
fn photo_jobs_materialize_and_clean_the_ephemeral_copy() {
    // The stub verifies the payload references a photo path and that the
    // file actually exists at run time.
    let harness = TestHarness::with_agent(
        r#"grep -q photo_path "$2" || exit 9
photo=$(grep -o '"photo_path": "[^"]*"' "$2" | cut -d'"' -f4)
test -f "$photo" || exit 8
exit 0"#,
    );
    let (dispatcher, pool) = harness.start();

    let mut with_photo = payload("Maria Santos");
    // 1x1 PNG, base64.
    with_photo.photo_base64 = Some(
        "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mP8z8BQDwAEhQGAhKmMIQAAAABJRU5ErkJggg=="
            .to_string(),
    );
    with_photo.gender = Gender::Female;
    dispatcher.submit("v1", with_photo).unwrap();

    assert_eq!(
        harness.wait_terminal("v1", Duration::from_secs(10)),
        JobStatus::Completed
    );

    // No payload, report or ephemeral photo left in the scratch area.
    let leftovers: Vec<_> = std::fs::read_dir(harness.scratch_dir())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name())
        .collect();
    assert!(leftovers.is_empty(), "scratch leftovers: {leftovers:?}");

    pool.shutdown();
    pool.wait();
}

#[test]
fn failed_business_run_is_not_recovered_by_default() {
    let harness = TestHarness::with_agent("echo 'record rejected' >&2; exit 1");
    let (dispatcher, pool) = harness.start();

    dispatcher.submit("v1", payload("Maria Santos")).unwrap();
    assert_eq!(
        harness.wait_terminal("v1", Duration::from_secs(10)),
        JobStatus::Failed
    );

    pool.shutdown();
    pool.wait();

    // A second start with the default policy leaves the failure alone.
    let (dispatcher2, pool2) = harness.start();
    assert_eq!(dispatcher2.recover().unwrap(), 0);

    pool2.shutdown();
    pool2.wait();
}

#[test]
fn failed_run_is_recovered_under_opt_in_policy() {
    let queue_config = QueueConfig {
        retry_failed_jobs: true,
        ..Default::default()
    };
    let harness = TestHarness::with_agent_and_queue("exit 1", queue_config);
    let (dispatcher, pool) = harness.start();

    dispatcher.submit("v1", payload("Maria Santos")).unwrap();
    assert_eq!(
        harness.wait_terminal("v1", Duration::from_secs(10)),
        JobStatus::Failed
    );
    pool.shutdown();
    pool.wait();

    let (dispatcher2, pool2) = harness.start();
    assert_eq!(dispatcher2.recover().unwrap(), 1);

    pool2.shutdown();
    pool2.wait();
}

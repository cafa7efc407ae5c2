//! End-to-end reconciliation passes against in-memory collaborators.

mod common;

use common::{FakeGateway, RecordingRun, custom_data, remote, suite};
use sauce_reconcile_core::config::ReconcileOptions;
use sauce_reconcile_core::engine::{
    FINISHED_MESSAGE, NO_SESSIONS_MESSAGE, ReconcileOutcome, ReconciliationEngine,
    STARTING_MESSAGE,
};
use sauce_reconcile_core::job_record::{
    Changeset, FAILURE_MESSAGE_KEY, JobRecord, JobSet, JobStatus, JobVisibility, TrackedField,
};
use sauce_reconcile_core::state::sanitize_build_identifier;
use sauce_reconcile_core::test_results::{CaseStatus, SuiteResult, TestCaseOutcome, TestResults};

const BUILD: &str = "jenkins-app-7";

fn run_pass(
    gateway: &FakeGateway,
    options: ReconcileOptions,
    prior: JobSet,
    log: &str,
    results: Option<TestResults>,
) -> (ReconcileOutcome, RecordingRun) {
    let engine = ReconciliationEngine::new(gateway, options);
    let mut run = RecordingRun::new(BUILD);
    let log = log.to_string();
    let outcome = engine.reconcile(&mut run, prior, &log, &results);
    (outcome, run)
}

// =========================================================================
// First pass
// =========================================================================

#[test]
fn login_test_end_to_end() {
    let gateway = FakeGateway::new();
    let results = suite(vec![TestCaseOutcome::new("LoginTest", CaseStatus::Passed)]);

    let (outcome, run) = run_pass(
        &gateway,
        ReconcileOptions::default(),
        JobSet::new(),
        "SauceOnDemandSessionID=abc123 job-name=LoginTest",
        Some(results),
    );

    assert_eq!(outcome.jobs.len(), 1);
    let record = outcome.jobs.get("abc123").unwrap();
    assert_eq!(record.name(), Some("LoginTest"));
    assert_eq!(record.status(), Some(JobStatus::Passed));
    assert_eq!(record.build(), Some(BUILD));

    let updates = gateway.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].0, "abc123");
    assert_eq!(
        updates[0].1,
        Changeset {
            passed: Some(true),
            name: Some("LoginTest".into()),
            build: Some(BUILD.into()),
            ..Changeset::default()
        }
    );

    assert_eq!(outcome.updates_sent, 1);
    assert!(outcome.updates_applied());
    assert_eq!(outcome.build_name, BUILD);
    assert!(outcome.persisted);
    assert_eq!(run.saved.as_ref().map(JobSet::len), Some(1));
    assert_eq!(run.lines, [STARTING_MESSAGE, FINISHED_MESSAGE]);
}

#[test]
fn remote_fetch_failure_still_yields_record() {
    let gateway = FakeGateway::new().unreachable("dead01");

    let (outcome, _run) = run_pass(
        &gateway,
        ReconcileOptions::default(),
        JobSet::new(),
        "noise\nSauceOnDemandSessionID=dead01 job-name=Checkout\nmore noise\n",
        None,
    );

    let record = outcome.jobs.get("dead01").unwrap();
    assert_eq!(record.name(), Some("Checkout"));
    assert_eq!(record.build(), Some(BUILD));
    assert!(record.status().is_none());
    assert_eq!(outcome.jobs_created, 1);

    let updates = gateway.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].1.field_names(), ["name", "build"]);
}

#[test]
fn reference_without_label_only_fills_build() {
    let gateway = FakeGateway::new();
    let (outcome, _run) = run_pass(
        &gateway,
        ReconcileOptions::default(),
        JobSet::new(),
        "SauceOnDemandSessionID=beef",
        None,
    );
    assert!(!outcome.jobs.get("beef").unwrap().has_name());
    assert_eq!(gateway.updates()[0].1.field_names(), ["build"]);
}

#[test]
fn empty_build_identifier_leaves_build_open() {
    let gateway = FakeGateway::new();
    let engine = ReconciliationEngine::new(&gateway, ReconcileOptions::default());
    let log = "SauceOnDemandSessionID=beef job-name=LoginTest".to_string();
    let no_results: Option<TestResults> = None;

    let mut run = RecordingRun::new(&sanitize_build_identifier("###"));
    let outcome = engine.reconcile(&mut run, JobSet::new(), &log, &no_results);
    assert_eq!(outcome.jobs.get("beef").unwrap().build(), None);
    assert_eq!(gateway.updates()[0].1.field_names(), ["name"]);

    gateway.clear_updates();
    let mut run = RecordingRun::new(BUILD);
    let outcome = engine.reconcile(&mut run, outcome.jobs, &log, &no_results);
    assert_eq!(outcome.jobs.get("beef").unwrap().build(), Some(BUILD));
    assert_eq!(gateway.updates()[0].1.field_names(), ["build"]);
}

#[test]
fn remote_values_are_not_overwritten() {
    let mut job = remote("abc123");
    job.name = Some("com.acme.LoginTest".into());
    job.build = Some("nightly-42".into());
    let gateway = FakeGateway::new().with_job(job);
    let results = suite(vec![TestCaseOutcome::new(
        "com.acme.LoginTest",
        CaseStatus::Failed,
    )]);

    let (outcome, _run) = run_pass(
        &gateway,
        ReconcileOptions::default(),
        JobSet::new(),
        "SauceOnDemandSessionID=abc123 job-name=LoginTest",
        Some(results),
    );

    let record = outcome.jobs.get("abc123").unwrap();
    assert_eq!(record.name(), Some("com.acme.LoginTest"));
    assert_eq!(record.build(), Some("nightly-42"));
    assert_eq!(record.status(), Some(JobStatus::Failed));
    assert_eq!(outcome.build_name, "nightly-42");

    let updates = gateway.updates();
    assert_eq!(updates[0].1.passed, Some(false));
    assert!(updates[0].1.name.is_none());
    assert!(updates[0].1.build.is_none());
}

#[test]
fn remote_status_blocks_inference() {
    let mut job = remote("abc123");
    job.passed = Some(false);
    let gateway = FakeGateway::new().with_job(job);
    let results = suite(vec![TestCaseOutcome::new("LoginTest", CaseStatus::Passed)]);

    let (outcome, _run) = run_pass(
        &gateway,
        ReconcileOptions {
            disable_usage_stats: true,
            ..ReconcileOptions::default()
        },
        JobSet::new(),
        "SauceOnDemandSessionID=abc123 job-name=LoginTest",
        Some(results),
    );

    assert_eq!(
        outcome.jobs.get("abc123").unwrap().status(),
        Some(JobStatus::Failed)
    );
    assert!(gateway.updates()[0].1.passed.is_none());
}

#[test]
fn duplicate_references_resolve_one_record() {
    let gateway = FakeGateway::new().with_job(remote("abc123"));
    let log = "SauceOnDemandSessionID=abc123 job-name=A\n\
               SauceOnDemandSessionID=abc123 job-name=A\n\
               SauceOnDemandSessionID=abc123 job-name=B\n";

    let (outcome, _run) = run_pass(&gateway, ReconcileOptions::default(), JobSet::new(), log, None);

    assert_eq!(outcome.references_found, 3);
    assert_eq!(outcome.jobs.len(), 1);
    assert_eq!(outcome.jobs_created, 1);
    assert_eq!(gateway.lookups(), 1);
    assert_eq!(outcome.jobs.get("abc123").unwrap().name(), Some("A"));
    assert_eq!(gateway.updates().len(), 1);
}

#[test]
fn sessions_in_suite_output_are_reconciled() {
    let gateway = FakeGateway::new();
    let results = TestResults::new(vec![SuiteResult {
        name: "web".into(),
        stdout: Some("starting\nSauceOnDemandSessionID=5a5a job-name=CartTest\n".into()),
        stderr: None,
        cases: vec![TestCaseOutcome::new("com.acme.CartTest", CaseStatus::Fixed)],
    }]);

    let (outcome, _run) = run_pass(
        &gateway,
        ReconcileOptions::default(),
        JobSet::new(),
        "",
        Some(results),
    );

    let record = outcome.jobs.get("5a5a").unwrap();
    assert_eq!(record.name(), Some("CartTest"));
    assert_eq!(record.status(), Some(JobStatus::Passed));
}

#[test]
fn jobs_keep_first_seen_order_after_prior_jobs() {
    let gateway = FakeGateway::new();
    let mut prior_record = JobRecord::new("0001");
    prior_record.set_if_unset(TrackedField::Build(BUILD.into()));
    let prior: JobSet = vec![prior_record].into();

    let (outcome, _run) = run_pass(
        &gateway,
        ReconcileOptions::default(),
        prior,
        "SauceOnDemandSessionID=0003\nSauceOnDemandSessionID=0002\nSauceOnDemandSessionID=0001\n",
        None,
    );

    let ids: Vec<_> = outcome.jobs.iter().map(JobRecord::job_id).collect();
    assert_eq!(ids, ["0001", "0003", "0002"]);
    assert_eq!(outcome.jobs_created, 2);
}

// =========================================================================
// Visibility and diagnostics
// =========================================================================

#[test]
fn visibility_is_sent_on_every_pass() {
    let gateway = FakeGateway::new();
    let options = ReconcileOptions {
        visibility: Some(JobVisibility::Team),
        ..ReconcileOptions::default()
    };
    let log = "SauceOnDemandSessionID=abc123 job-name=LoginTest";

    let (first, _run) = run_pass(&gateway, options, JobSet::new(), log, None);
    assert_eq!(
        gateway.updates()[0].1.visibility,
        Some(JobVisibility::Team)
    );

    gateway.clear_updates();
    let (_second, _run) = run_pass(&gateway, options, first.jobs, log, None);
    assert_eq!(
        gateway.updates(),
        vec![(
            "abc123".to_string(),
            Changeset {
                visibility: Some(JobVisibility::Team),
                ..Changeset::default()
            }
        )]
    );
}

#[test]
fn failed_job_gets_failure_message_and_keeps_custom_data() {
    let mut job = remote("f00d");
    job.custom_data = custom_data(&[("team", "checkout")]);
    let gateway = FakeGateway::new().with_job(job);
    let results = suite(vec![
        TestCaseOutcome::new("CartTest", CaseStatus::Failed)
            .with_stack_trace("AssertionError: total\n\tat Cart.total\n"),
    ]);

    let (outcome, _run) = run_pass(
        &gateway,
        ReconcileOptions::default(),
        JobSet::new(),
        "SauceOnDemandSessionID=f00d job-name=CartTest",
        Some(results),
    );

    let updates = gateway.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].1.passed, Some(false));
    assert_eq!(
        updates[0].1.custom_data,
        Some(custom_data(&[
            ("team", "checkout"),
            (FAILURE_MESSAGE_KEY, "AssertionError: total\n\tat Cart.total"),
        ]))
    );
    assert_eq!(
        outcome
            .jobs
            .get("f00d")
            .unwrap()
            .custom_data()
            .get(FAILURE_MESSAGE_KEY)
            .map(String::as_str),
        Some("AssertionError: total\n\tat Cart.total")
    );
}

#[test]
fn disabled_usage_stats_skip_diagnostics() {
    let gateway = FakeGateway::new();
    let results = suite(vec![
        TestCaseOutcome::new("CartTest", CaseStatus::Failed).with_stack_trace("boom"),
    ]);

    let (_outcome, _run) = run_pass(
        &gateway,
        ReconcileOptions {
            disable_usage_stats: true,
            ..ReconcileOptions::default()
        },
        JobSet::new(),
        "SauceOnDemandSessionID=f00d job-name=CartTest",
        Some(results),
    );

    let updates = gateway.updates();
    assert_eq!(updates[0].1.passed, Some(false));
    assert!(updates[0].1.custom_data.is_none());
}

// =========================================================================
// Idempotence and failure handling
// =========================================================================

#[test]
fn second_pass_sends_nothing() {
    let gateway = FakeGateway::new();
    let results = suite(vec![
        TestCaseOutcome::new("LoginTest", CaseStatus::Passed),
        TestCaseOutcome::new("CartTest", CaseStatus::Failed).with_stack_trace("boom"),
    ]);
    let log = "SauceOnDemandSessionID=abc123 job-name=LoginTest\n\
               SauceOnDemandSessionID=f00d job-name=CartTest\n";

    let (first, run) = run_pass(
        &gateway,
        ReconcileOptions::default(),
        JobSet::new(),
        log,
        Some(results.clone()),
    );
    assert_eq!(gateway.updates().len(), 2);

    gateway.clear_updates();
    let prior = run.saved.unwrap();
    let (second, _run) = run_pass(
        &gateway,
        ReconcileOptions::default(),
        prior,
        log,
        Some(results),
    );

    assert!(gateway.updates().is_empty());
    assert_eq!(second.updates_sent, 0);
    assert_eq!(second.jobs_created, 0);
    assert_eq!(
        second.jobs.get("f00d").unwrap().status(),
        first.jobs.get("f00d").unwrap().status()
    );
}

#[test]
fn rejected_updates_do_not_stop_the_pass() {
    let gateway = FakeGateway::new().rejecting_updates();

    let (outcome, run) = run_pass(
        &gateway,
        ReconcileOptions::default(),
        JobSet::new(),
        "SauceOnDemandSessionID=aa01\nSauceOnDemandSessionID=bb02\n",
        None,
    );

    assert_eq!(gateway.updates().len(), 2);
    assert_eq!(outcome.updates_failed, 2);
    assert!(!outcome.updates_applied());
    assert_eq!(outcome.jobs.len(), 2);
    assert!(run.saved.is_some());
}

#[test]
fn save_failure_is_reported_not_raised() {
    let gateway = FakeGateway::new();
    let engine = ReconciliationEngine::new(&gateway, ReconcileOptions::default());
    let mut run = RecordingRun::new(BUILD);
    run.fail_save = true;
    let log = String::from("SauceOnDemandSessionID=abc123");

    let outcome = engine.reconcile(&mut run, JobSet::new(), &log, &None::<TestResults>);

    assert!(!outcome.persisted);
    assert!(outcome.has_results());
}

#[test]
fn no_sessions_prints_notice_and_skips_save() {
    let gateway = FakeGateway::new();
    let (outcome, run) = run_pass(
        &gateway,
        ReconcileOptions::default(),
        JobSet::new(),
        "BUILD SUCCESSFUL\n",
        None,
    );

    assert!(!outcome.has_results());
    assert_eq!(outcome.build_name, BUILD);
    assert!(run.saved.is_none());
    assert_eq!(
        run.lines,
        [STARTING_MESSAGE, NO_SESSIONS_MESSAGE, FINISHED_MESSAGE]
    );
}

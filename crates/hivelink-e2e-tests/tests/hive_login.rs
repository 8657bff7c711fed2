//! End-to-end tests for the hive-login run.
//!
//! These tests verify:
//! 1. Cluster lookup by every identifier shape
//! 2. Hive discovery within and across control-plane environments
//! 3. Hive source precedence: endpoint file, then URL, then reuse
//! 4. Default-path Hive checks rediscover the Hive through the Hive URL only
//! 5. Every opened connection is released on success, failure and cancellation
//! 6. A blank elevation reason never reaches the network

use std::time::Duration;

use hivelink_broker::{
    BrokerError, CHECKS, CheckOutcome, ClientVariant, ClusterSearch, ErrorKind, FakeControlPlane,
    HiveLoginCheck, HiveSource, KubeResource, NoProgress, RunError, Step,
};
use hivelink_config::{Environment, Settings, ValueSource};
use hivelink_e2e_tests::{
    HIVE_API, HIVE_ID, INT_URL, PROD_URL, STAGE_URL, TARGET_EXTERNAL_ID, TARGET_ID, TARGET_NAME,
    Transcript, cross_environment, env_settings, hive_cluster, options, same_environment,
    write_endpoint_file,
};
use tempfile::TempDir;
use test_case::test_case;
use tokio_util::sync::CancellationToken;

async fn run_expecting_failure(
    fake: &FakeControlPlane,
    settings: &Settings,
    options: &hivelink_broker::CheckOptions,
) -> RunError {
    match HiveLoginCheck::new(fake, settings)
        .run(options, &mut NoProgress)
        .await
    {
        Ok(report) => panic!("run should fail, got {} passed checks", report.passed()),
        Err(err) => err,
    }
}

// ============================================================================
// Lookup and the default path
// ============================================================================

#[tokio::test]
async fn test_internal_id_with_environment_credentials_only() {
    let fake = same_environment();
    let settings = env_settings();
    let mut transcript = Transcript::default();

    let report = HiveLoginCheck::new(&fake, &settings)
        .run(&options(TARGET_ID), &mut transcript)
        .await
        .expect("run should pass");

    assert_eq!(report.cluster.internal_id(), TARGET_ID);
    assert_eq!(report.hive.internal_id(), HIVE_ID);
    assert_eq!(report.hive_source, HiveSource::ReuseTarget);
    assert_eq!(report.hive_url_source, None);

    // Standard checks pass, elevated checks are skipped without a reason.
    assert_eq!(report.passed(), 4);
    for outcome in &report.checks {
        let elevated = outcome.check().variant == ClientVariant::Elevated;
        assert_eq!(matches!(outcome, CheckOutcome::Skipped { .. }), elevated);
    }

    // One connection, reused for the Hive and its rediscovery, closed once.
    assert_eq!(fake.opened_urls(), vec![PROD_URL.to_string()]);
    assert!(fake.all_closed());
    assert!(fake.login_calls().iter().all(|call| call.reason.is_none()));

    // Standard clients read operators and namespaces, nothing privileged.
    let lists = fake.list_calls();
    assert!(lists.iter().all(|call| matches!(
        call.resource,
        KubeResource::ClusterOperators | KubeResource::Namespaces
    )));
    assert_eq!(
        lists.iter().filter(|call| call.resource == KubeResource::Namespaces).count(),
        4
    );
    assert!(transcript.contains("Got '0' namespaces"));

    assert!(transcript.contains("No separate Hive config given, reusing the target connection"));
    assert!(!transcript.contains("Using internal ID"));
}

#[test_case(TARGET_EXTERNAL_ID, ClusterSearch::ExternalId(TARGET_EXTERNAL_ID.into()) ; "external id")]
#[test_case(TARGET_NAME, ClusterSearch::DisplayNameContains(TARGET_NAME.into()) ; "display name")]
#[test_case("773jpgko", ClusterSearch::DisplayNameContains("773jpgko".into()) ; "partial display name")]
#[tokio::test]
async fn test_lookup_by_other_identifiers(identifier: &str, expected: ClusterSearch) {
    let fake = same_environment();
    let settings = env_settings();
    let mut transcript = Transcript::default();

    let report = HiveLoginCheck::new(&fake, &settings)
        .run(&options(identifier), &mut transcript)
        .await
        .expect("run should pass");

    assert_eq!(report.cluster.internal_id(), TARGET_ID);
    assert_eq!(fake.search_calls()[0], expected);
    assert!(transcript.contains(&format!(
        "Using internal ID '{TARGET_ID}' for provided cluster '{identifier}'"
    )));
}

#[tokio::test]
async fn test_ambiguous_display_name_fails_lookup() {
    let fake = same_environment().with_cluster(
        PROD_URL,
        hivelink_broker::fake::fake_cluster("hs-mc-773jpgko0-copy"),
    );
    let err = run_expecting_failure(&fake, &env_settings(), &options(TARGET_NAME)).await;

    assert_eq!(err.step, Step::LocateCluster);
    assert!(matches!(err.source, BrokerError::AmbiguousCluster { count: 2, .. }));
    assert!(fake.all_closed());
}

// ============================================================================
// Hive discovery across environments
// ============================================================================

#[tokio::test]
async fn test_cross_environment_hive_via_url_with_elevation() {
    let fake = cross_environment();
    let settings = env_settings();
    let opts = hivelink_broker::CheckOptions {
        hive_url: Some(STAGE_URL.into()),
        reason: Some("OHSS-1234 checking hive access".into()),
        ..options(TARGET_ID)
    };

    let report = HiveLoginCheck::new(&fake, &settings)
        .run(&opts, &mut NoProgress)
        .await
        .expect("run should pass");

    assert_eq!(report.passed(), CHECKS.len());
    assert_eq!(report.hive_source, HiveSource::UrlOverride(STAGE_URL.into()));
    assert_eq!(report.hive_url_source, Some(ValueSource::ExplicitOverride));
    // Target, the Hive link, then one staging connection per default-path Hive check.
    assert_eq!(
        fake.opened_urls(),
        vec![
            PROD_URL.to_string(),
            STAGE_URL.to_string(),
            STAGE_URL.to_string(),
            STAGE_URL.to_string(),
        ]
    );
    assert!(fake.all_closed());

    // The Hive is found by the shard's API URL on the staging connection.
    assert!(fake
        .search_calls()
        .contains(&ClusterSearch::ApiUrl(HIVE_API.into())));

    // Both elevated Hive checks found the target's ClusterDeployment.
    let probe_objects: Vec<_> = report
        .checks
        .iter()
        .filter_map(|outcome| match outcome {
            CheckOutcome::Passed { report, .. } => report.probe_object.clone(),
            CheckOutcome::Skipped { .. } => None,
        })
        .collect();
    let deployment = format!("uhc-production-{TARGET_ID}/{TARGET_NAME}");
    assert_eq!(probe_objects, vec![deployment.clone(), deployment]);

    // Elevated logins carry the trimmed reason; standard ones carry none.
    let elevated: Vec<_> = fake
        .login_calls()
        .into_iter()
        .filter_map(|call| call.reason)
        .collect();
    assert_eq!(elevated.len(), 4);
    assert!(elevated.iter().all(|r| r == "OHSS-1234 checking hive access"));
}

#[tokio::test]
async fn test_cross_environment_hive_via_settings_environment() {
    let fake = cross_environment();
    let settings = Settings::new().with_environment(Environment::from_pairs([
        ("OCM_URL", PROD_URL),
        ("OCM_TOKEN", "prod-token"),
        ("HIVE_OCM_URL", STAGE_URL),
    ]));

    let report = HiveLoginCheck::new(&fake, &settings)
        .run(&options(TARGET_ID), &mut NoProgress)
        .await
        .expect("run should pass");

    assert_eq!(report.hive_source, HiveSource::UrlOverride(STAGE_URL.into()));
    assert_eq!(report.hive_url_source, Some(ValueSource::EnvironmentVariable));
    assert!(fake.all_closed());
}

#[tokio::test]
async fn test_cross_environment_hive_via_endpoint_file() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_endpoint_file(dir.path(), STAGE_URL).expect("write endpoint file");
    // Without a Hive URL the default path searches production, so serve the Hive there too.
    let fake = cross_environment().with_cluster(PROD_URL, hive_cluster());
    let settings = env_settings();
    let opts = hivelink_broker::CheckOptions {
        hive_config: Some(path.clone()),
        ..options(TARGET_ID)
    };

    let report = HiveLoginCheck::new(&fake, &settings)
        .run(&opts, &mut NoProgress)
        .await
        .expect("run should pass");

    assert_eq!(report.hive_source, HiveSource::ConfigFile(path));
    assert_eq!(
        fake.opened_urls(),
        vec![PROD_URL.to_string(), STAGE_URL.to_string()]
    );
    assert!(fake.all_closed());
}

#[tokio::test]
async fn test_default_path_ignores_endpoint_file() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_endpoint_file(dir.path(), STAGE_URL).expect("write endpoint file");
    let fake = cross_environment();
    let opts = hivelink_broker::CheckOptions {
        hive_config: Some(path),
        ..options(TARGET_ID)
    };

    let err = run_expecting_failure(&fake, &env_settings(), &opts).await;

    assert_eq!(err.step, Step::BuildClient(CHECKS[6]));
    assert!(matches!(err.source, BrokerError::HiveNotFound { .. }));
    assert!(fake.all_closed());
}

#[tokio::test]
async fn test_endpoint_file_beats_url() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_endpoint_file(dir.path(), STAGE_URL).expect("write endpoint file");
    let fake = cross_environment().with_cluster(INT_URL, hive_cluster());
    let settings = env_settings();
    let opts = hivelink_broker::CheckOptions {
        hive_config: Some(path.clone()),
        hive_url: Some(INT_URL.into()),
        ..options(TARGET_ID)
    };

    let report = HiveLoginCheck::new(&fake, &settings)
        .run(&opts, &mut NoProgress)
        .await
        .expect("run should pass");

    // The link comes from the file; the default path follows the URL.
    assert_eq!(report.hive_source, HiveSource::ConfigFile(path));
    assert_eq!(
        fake.opened_urls(),
        vec![PROD_URL.to_string(), STAGE_URL.to_string(), INT_URL.to_string()]
    );
    assert!(fake.all_closed());
}

#[tokio::test]
async fn test_url_beats_reuse() {
    // Hive only exists in staging: reusing the target would not find it.
    let fake = cross_environment();
    let settings = env_settings();

    let err = run_expecting_failure(&fake, &settings, &options(TARGET_ID)).await;
    assert_eq!(err.step, Step::DiscoverHive);
    assert!(matches!(err.source, BrokerError::HiveNotFound { .. }));

    let fake = cross_environment();
    let opts = hivelink_broker::CheckOptions {
        hive_url: Some(STAGE_URL.into()),
        ..options(TARGET_ID)
    };
    let report = HiveLoginCheck::new(&fake, &settings)
        .run(&opts, &mut NoProgress)
        .await
        .expect("run should pass");
    assert_eq!(report.hive_source, HiveSource::UrlOverride(STAGE_URL.into()));
}

// ============================================================================
// Failure at every step releases every connection
// ============================================================================

#[test_case(|f| f.fail_open(PROD_URL), Step::BuildConnection, ErrorKind::Authentication ; "target connection rejected")]
#[test_case(|f| f.fail_search(PROD_URL), Step::LocateCluster, ErrorKind::Network ; "target search fails")]
#[test_case(|f| f.fail_open(STAGE_URL), Step::DiscoverHive, ErrorKind::Authentication ; "hive connection rejected")]
#[test_case(|f| f.fail_search(STAGE_URL), Step::DiscoverHive, ErrorKind::Network ; "hive search fails")]
#[test_case(|f| f.unreachable(TARGET_ID), Step::BuildClient(CHECKS[0]), ErrorKind::Network ; "target unreachable")]
#[test_case(|f| f.fail_login(HIVE_ID), Step::BuildClient(CHECKS[1]), ErrorKind::Authentication ; "hive login rejected")]
#[test_case(|f| f.fail_list(TARGET_ID, KubeResource::ClusterOperators), Step::ValidateClient(CHECKS[0]), ErrorKind::Validation ; "target operators unreadable")]
#[test_case(|f| f.fail_list(HIVE_ID, KubeResource::Namespaces), Step::ValidateClient(CHECKS[1]), ErrorKind::Validation ; "hive namespaces unreadable")]
#[test_case(|f| f.fail_open_after(STAGE_URL, 1), Step::BuildClient(CHECKS[6]), ErrorKind::Authentication ; "hive rediscovery rejected")]
#[test_case(|f| f.fail_open_after(STAGE_URL, 2), Step::BuildClient(CHECKS[7]), ErrorKind::Authentication ; "elevated hive rediscovery rejected")]
#[test_case(|f| f.with_objects(HIVE_ID, KubeResource::ClusterDeployments, vec![]), Step::ValidateClient(CHECKS[2]), ErrorKind::Validation ; "no clusterdeployment")]
#[test_case(
    |f| f.fail_list(TARGET_ID, KubeResource::Pods { namespace: "openshift-monitoring".into() }),
    Step::ValidateClient(CHECKS[4]),
    ErrorKind::Validation
    ; "elevated probe fails"
)]
#[tokio::test]
async fn test_failure_releases_connections(
    inject: fn(FakeControlPlane) -> FakeControlPlane,
    step: Step,
    kind: ErrorKind,
) {
    let fake = inject(cross_environment());
    let opts = hivelink_broker::CheckOptions {
        hive_url: Some(STAGE_URL.into()),
        reason: Some("OHSS-1234".into()),
        ..options(TARGET_ID)
    };

    let err = run_expecting_failure(&fake, &env_settings(), &opts).await;

    assert_eq!(err.step, step);
    assert_eq!(err.kind(), kind);
    assert!(fake.all_closed(), "every opened session must be closed once");
}

#[tokio::test]
async fn test_missing_environment_credentials_fail_before_network() {
    let fake = same_environment();
    let settings = Settings::new().with_environment(Environment::from_pairs([("OCM_URL", PROD_URL)]));

    let err = run_expecting_failure(&fake, &settings, &options(TARGET_ID)).await;

    assert_eq!(err.step, Step::BuildConnection);
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(fake.open_count(), 0);
}

// ============================================================================
// Elevation reasons
// ============================================================================

#[test_case("" ; "empty")]
#[test_case("   " ; "whitespace")]
#[tokio::test]
async fn test_blank_reason_makes_no_elevated_call(reason: &str) {
    let fake = same_environment();
    let opts = hivelink_broker::CheckOptions {
        reason: Some(reason.into()),
        ..options(TARGET_ID)
    };

    let err = run_expecting_failure(&fake, &env_settings(), &opts).await;

    // Checks a and b pass; c is the first elevated check.
    assert_eq!(err.step, Step::BuildClient(CHECKS[2]));
    assert!(matches!(err.source, BrokerError::MissingReason { .. }));
    assert_eq!(fake.login_calls().len(), 2);
    assert!(fake.login_calls().iter().all(|call| call.reason.is_none()));
    assert!(fake.all_closed());
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_cancellation_during_login_releases_connections() {
    let fake = cross_environment().stall_login(HIVE_ID);
    let settings = env_settings();
    let opts = hivelink_broker::CheckOptions {
        hive_url: Some(STAGE_URL.into()),
        ..options(TARGET_ID)
    };
    let token = CancellationToken::new();
    let canceller = token.clone();

    let check = HiveLoginCheck::new(&fake, &settings).with_cancellation(token);
    let mut progress = NoProgress;
    let (result, ()) = tokio::join!(check.run(&opts, &mut progress), async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let err = result.expect_err("run should be cancelled");
    assert_eq!(err.step, Step::BuildClient(CHECKS[1]));
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(fake.open_count(), 2);
    assert!(fake.all_closed());
}

#[tokio::test]
async fn test_cancelled_before_start_opens_nothing() {
    let fake = same_environment();
    let settings = env_settings();
    let token = CancellationToken::new();
    token.cancel();

    let err = HiveLoginCheck::new(&fake, &settings)
        .with_cancellation(token)
        .run(&options(TARGET_ID), &mut NoProgress)
        .await
        .expect_err("run should be cancelled");

    assert_eq!(err.step, Step::BuildConnection);
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(fake.open_count(), 0);
}

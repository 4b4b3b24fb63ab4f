//! Lifecycle integration tests
//!
//! Hook arming, scoped cleanup and infrastructure start/stop against
//! in-memory fakes.

use std::sync::Arc;

use assert_matches::assert_matches;
use chaosspec::{ArmState, HarnessError, HookCounts, HookMode, Scope, ServiceOptions, Suite};

mod common;
use common::{TestBed, TestFixtures};

#[tokio::test]
async fn test_start_and_stop_are_idempotent() {
    let bed = TestBed::standalone();

    bed.harness.start().await.unwrap();
    bed.harness.start().await.unwrap();

    assert_eq!(bed.runtime.networks_created(), 1);
    assert_eq!(bed.runtime.running_images(), vec![TestFixtures::ADMIN_IMAGE]);

    bed.harness.stop().await.unwrap();
    bed.harness.stop().await.unwrap();

    assert!(bed.runtime.active_networks().is_empty());
    assert!(bed.runtime.running_images().is_empty());
}

#[tokio::test]
async fn test_restart_after_stop_reprovisions() {
    let bed = TestBed::started().await;
    bed.harness.stop().await.unwrap();
    bed.harness.start().await.unwrap();

    assert_eq!(bed.runtime.networks_created(), 2);
    assert_eq!(bed.runtime.active_networks().len(), 1);
}

#[tokio::test]
async fn test_standalone_service_before_start_is_not_started() {
    let bed = TestBed::standalone();

    let result = bed.harness.create_service("echo", TestFixtures::echo()).await;

    let err = result.unwrap_err();
    assert_eq!(err.to_string(), "Toxiproxy network not started");
    assert!(bed.runtime.started().is_empty());
}

#[tokio::test]
async fn test_service_joins_shared_network_under_alias() {
    let bed = TestBed::started().await;

    let options = ServiceOptions::new(TestFixtures::REDIS_IMAGE)
        .ports([6379])
        .env("REDIS_ARGS", "--appendonly no")
        .alias("cache")
        .command(["redis-server"]);
    bed.harness.create_service("redis", options).await.unwrap();

    let network = bed.harness.manager().network().await.unwrap();
    let spec = bed.runtime.started().pop().unwrap();

    assert_eq!(spec.network.as_deref(), Some(network.name.as_str()));
    assert!(network.name.starts_with("chaosspec-"));
    assert_eq!(spec.aliases, vec!["cache".to_string()]);
    assert_eq!(spec.environment["REDIS_ARGS"], "--appendonly no");
    assert_eq!(spec.command, vec!["redis-server".to_string()]);
}

#[tokio::test]
async fn test_service_urls_follow_port_mappings() {
    let bed = TestBed::started().await;

    let options = ServiceOptions::new(TestFixtures::ECHO_IMAGE).ports([80, 443]);
    let echo = bed.harness.create_service("echo", options).await.unwrap();

    let http = echo.container.mapped_port(80).unwrap();
    let https = echo.container.mapped_port(443).unwrap();

    assert_eq!(echo.url().unwrap(), format!("http://localhost:{http}"));
    assert_eq!(echo.url_for(443).unwrap(), format!("http://localhost:{https}"));
    assert_matches!(
        echo.url_for(8080),
        Err(HarnessError::PortNotExposed { port: 8080, .. })
    );
    assert!(echo.proxy().is_none());
}

#[tokio::test]
async fn test_exec_runs_inside_service() {
    let bed = TestBed::started().await;
    let probe = bed
        .harness
        .create_service(
            "probe",
            ServiceOptions::new("curlimages/curl").command(["sleep", "3600"]),
        )
        .await
        .unwrap();

    let output = probe
        .exec(&["curl".to_string(), "-s".to_string()])
        .await
        .unwrap();
    assert!(output.success());
}

#[tokio::test]
async fn test_scoped_services_follow_their_bucket() {
    let bed = TestBed::started().await;

    bed.harness
        .create_service("echo", TestFixtures::echo())
        .await
        .unwrap();
    bed.harness
        .create_service(
            "redis",
            ServiceOptions::new(TestFixtures::REDIS_IMAGE)
                .ports([6379])
                .scope(Scope::Suite),
        )
        .await
        .unwrap();

    let report = bed.harness.cleanup_after_each_test().await;
    assert_eq!(report.ran, 1);
    assert_eq!(
        bed.runtime.running_images(),
        vec![TestFixtures::REDIS_IMAGE, TestFixtures::ADMIN_IMAGE]
    );

    // Suite bucket holds the redis stop and the manager stop
    let report = bed.harness.cleanup_after_suite().await;
    assert_eq!(report.ran, 2);
    assert!(bed.runtime.running_images().is_empty());
    assert!(bed.runtime.active_networks().is_empty());
}

#[tokio::test]
async fn test_service_stop_failures_are_swallowed() {
    let bed = TestBed::started().await;
    bed.harness
        .create_service("echo", TestFixtures::echo())
        .await
        .unwrap();

    bed.runtime.fail_stops();
    let report = bed.harness.cleanup_after_each_test().await;

    assert_eq!(report.ran, 1);
    assert_eq!(report.failed, 0);
}

#[tokio::test]
async fn test_chaos_file_autowires_and_hooks_fire_per_test() {
    let suite = Arc::new(Suite::new(TestFixtures::CHAOS_FILE));
    let bed = TestBed::with_framework(suite.clone());
    let harness = bed.harness.clone();

    assert!(harness.autowire().await.unwrap());
    assert!(!harness.autowire().await.unwrap());
    assert_eq!(harness.armer().state().await, ArmState::ArmedHooks);

    for name in ["first", "second"] {
        let harness = harness.clone();
        let admin = bed.admin.clone();
        suite
            .test(name, move || async move {
                let echo = harness
                    .create_service("echo", TestFixtures::proxied_echo())
                    .await?;
                let proxies = echo.proxy().expect("proxy requested");
                let addr = proxies.addr().await?;

                assert!(addr.starts_with("toxiproxy:"));
                assert_eq!(admin.names(), vec!["echo-proxy-80".to_string()]);
                anyhow::Ok(())
            })
            .await
            .unwrap();

        // After-each removed the proxy and stopped the service
        assert!(bed.admin.names().is_empty());
        assert_eq!(bed.runtime.running_images(), vec![TestFixtures::ADMIN_IMAGE]);
    }

    assert_eq!(
        suite.hook_counts(),
        HookCounts {
            before_all: 1,
            after_each: 1,
            after_all: 1
        }
    );
    assert_eq!(bed.runtime.networks_created(), 1);

    suite.finish().await.unwrap();

    assert!(bed.runtime.running_images().is_empty());
    assert!(bed.runtime.active_networks().is_empty());
}

#[tokio::test]
async fn test_outer_scope_arms_hooks_once() {
    let suite = Arc::new(Suite::new(TestFixtures::PLAIN_FILE));
    let bed = TestBed::with_framework(suite.clone());

    assert!(!bed.harness.autowire().await.unwrap());
    for _ in 0..3 {
        assert_eq!(bed.harness.ensure_hooks().await.unwrap(), HookMode::Hooks);
    }

    // Infrastructure only comes up in before-all
    assert_matches!(
        bed.harness.create_service("echo", TestFixtures::echo()).await,
        Err(HarnessError::NotStarted { .. })
    );
    assert_eq!(
        suite.hook_counts(),
        HookCounts {
            before_all: 1,
            after_each: 1,
            after_all: 1
        }
    );

    for name in ["first", "second"] {
        let harness = bed.harness.clone();
        suite
            .test(name, move || async move {
                assert_eq!(harness.ensure_hooks().await?, HookMode::Inline);
                harness.create_service("echo", TestFixtures::echo()).await?;
                anyhow::Ok(())
            })
            .await
            .unwrap();

        assert_eq!(bed.runtime.running_images(), vec![TestFixtures::ADMIN_IMAGE]);
    }

    // Repeated arming calls never added boundary callbacks
    assert_eq!(bed.runtime.networks_created(), 1);
    assert_eq!(suite.hook_counts().before_all, 1);

    suite.finish().await.unwrap();

    assert!(bed.runtime.running_images().is_empty());
    assert!(bed.runtime.active_networks().is_empty());
}

#[tokio::test]
async fn test_first_call_inside_test_runs_inline() {
    let suite = Arc::new(Suite::new(TestFixtures::PLAIN_FILE));
    let bed = TestBed::with_framework(suite.clone());
    let harness = bed.harness.clone();

    let inner = harness.clone();
    suite
        .test("inline", move || async move {
            inner.create_service("echo", TestFixtures::echo()).await?;
            assert_eq!(inner.ensure_hooks().await?, HookMode::Inline);
            anyhow::Ok(())
        })
        .await
        .unwrap();

    assert_eq!(harness.armer().state().await, ArmState::ArmedInline);
    assert_eq!(suite.hook_counts(), HookCounts::default());

    // No hooks: the service outlives the test until the caller drains
    assert_eq!(bed.runtime.running_images().len(), 2);
    assert_eq!(harness.cleanup_after_each_test().await.ran, 1);
    assert_eq!(bed.runtime.running_images(), vec![TestFixtures::ADMIN_IMAGE]);

    harness.cleanup_after_suite().await;
    assert!(bed.runtime.active_networks().is_empty());
}

#[tokio::test]
async fn test_concurrent_first_start_provisions_once() {
    let bed = TestBed::standalone();

    let (a, b, c) = tokio::join!(
        bed.harness.start(),
        bed.harness.start(),
        bed.harness.start()
    );
    a.unwrap();
    b.unwrap();
    c.unwrap();

    assert_eq!(bed.runtime.networks_created(), 1);
    assert_eq!(bed.harness.registry().pending(Scope::Suite), 1);
}

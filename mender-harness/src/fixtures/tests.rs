use std::sync::Arc;

use super::*;
use crate::config::WaitSettings;
use crate::environment::EnvState;
use crate::lock::SerializationLock;
use crate::testing::{FakeBackend, FakePlatform};

fn harness_with(backend: &FakeBackend, platform: &FakePlatform, machine: &str) -> (Harness, SerializationLock) {
    let mut config = HarnessConfig::default();
    config.machine_name = machine.to_string();
    config.health_wait = WaitSettings::new(3, 1);
    config.ssh_wait = WaitSettings::new(3, 1);
    config.device_wait = WaitSettings::new(3, 1);
    let lock = SerializationLock::new(None);
    let factory = Factory::new(Arc::new(config), Arc::new(backend.clone()), lock.clone());
    (Harness::new(factory, Arc::new(platform.clone())), lock)
}

fn harness_over(backend: &FakeBackend, services: Arc<dyn ServiceConnector>) -> Harness {
    let factory = Factory::new(
        Arc::new(HarnessConfig::default()),
        Arc::new(backend.clone()),
        SerializationLock::new(None),
    );
    Harness::new(factory, services)
}

fn harness(backend: &FakeBackend, platform: &FakePlatform) -> Harness {
    harness_with(backend, platform, "qemux86-64").0
}

#[tokio::test]
async fn test_standard_one_client_bootstrapped() {
    let backend = FakeBackend::new();
    let platform = FakePlatform::new(&backend);
    let harness = harness(&backend, &platform);

    let mut fixture = harness.standard_setup_one_client_bootstrapped().await.unwrap();
    assert_eq!(fixture.env.state().await, EnvState::Ready);
    assert!(fixture.device().unwrap().is_ssh_ready());

    let token = fixture.auth_token().await.unwrap();
    let accepted = fixture
        .devauth
        .get_devices_status(&token, "accepted", 1)
        .await
        .unwrap();
    assert_eq!(accepted.len(), 1);

    let env = fixture.env.clone();
    fixture.close().await;
    assert_eq!(env.state().await, EnvState::TornDown);
    assert!(backend.containers(env.name()).is_empty());
}

#[tokio::test]
async fn test_unbootstrapped_client_stays_pending() {
    let backend = FakeBackend::new();
    let platform = FakePlatform::new(&backend);
    let mut fixture = harness(&backend, &platform)
        .standard_setup_one_client()
        .await
        .unwrap();
    let token = fixture.auth_token().await.unwrap();
    let pending = fixture
        .devauth
        .get_devices_status(&token, "pending", 1)
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    fixture.close().await;
}

#[tokio::test]
async fn test_finalizer_registered_before_setup() {
    let backend = FakeBackend::new();
    backend.fail_up("compose up failed");
    let platform = FakePlatform::new(&backend);

    let err = harness(&backend, &platform)
        .standard_setup_one_client()
        .await
        .unwrap_err();
    assert!(matches!(err, HarnessError::Provisioning(_)));
    // Teardown still ran for the namespace that failed to come up
    assert_eq!(backend.count_calls("up "), 1);
    assert_eq!(backend.count_calls("down "), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_device_tears_down() {
    let backend = FakeBackend::new();
    backend.set_unreachable("mender-client");
    let platform = FakePlatform::new(&backend);

    let err = harness(&backend, &platform)
        .standard_setup_one_client()
        .await
        .unwrap_err();
    assert!(matches!(err, HarnessError::DeviceUnreachable { attempts: 3, .. }));
    let calls = backend.calls();
    let ns = calls[0].trim_start_matches("up ").to_string();
    assert!(backend.containers(&ns).is_empty());
    assert_eq!(calls.last().unwrap(), &format!("down {}", ns));
}

#[tokio::test]
async fn test_two_clients_share_one_environment() {
    let backend = FakeBackend::new();
    let platform = FakePlatform::new(&backend);
    let fixture = harness(&backend, &platform)
        .standard_setup_two_clients_bootstrapped()
        .await
        .unwrap();
    assert_eq!(fixture.device_group.len(), 2);
    assert_eq!(
        fixture.device_group.run("hostname").await.unwrap().len(),
        2
    );
    fixture.close().await;
}

#[tokio::test]
async fn test_legacy_client_skipped_off_qemu() {
    let backend = FakeBackend::new();
    let platform = FakePlatform::new(&backend);
    let (harness, _) = harness_with(&backend, &platform, "raspberrypi4");
    let err = harness.setup_with_legacy_client().await.unwrap_err();
    assert!(matches!(err, HarnessError::Skipped(_)));
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_custom_production_setup_holds_lock() {
    let backend = FakeBackend::new();
    let platform = FakePlatform::new(&backend);
    let (harness, lock) = harness_with(&backend, &platform, "qemux86-64");

    let fixture = harness.running_custom_production_setup().await.unwrap();
    assert!(lock.is_locked());
    assert!(fixture.device.is_none());
    fixture.close().await;
    assert!(!lock.is_locked());
}

#[tokio::test]
async fn test_custom_setup_never_resolves_gateway() {
    let backend = FakeBackend::new();
    let harness = harness_over(&backend, Arc::new(HttpServices));

    let mut fixture = harness.running_custom_production_setup().await.unwrap();
    assert!(fixture.device_group.is_empty());
    assert_eq!(backend.count_calls("exec "), 0);

    // No gateway container exists, so the first login is where it fails
    let err = fixture.auth_token().await.unwrap_err();
    assert!(matches!(err, HarnessError::Auth(_)), "{}", err);
    fixture.close().await;
}

#[tokio::test]
async fn test_extra_cleanup_runs_before_teardown() {
    let backend = FakeBackend::new();
    let platform = FakePlatform::new(&backend);
    let mut fixture = harness(&backend, &platform)
        .standard_setup_one_client()
        .await
        .unwrap();

    let seen = Arc::new(std::sync::Mutex::new(None));
    {
        let env = fixture.env.clone();
        let seen = seen.clone();
        fixture.scope_mut().add_finalizer("record state", move || async move {
            let state = env.state().await;
            *seen.lock().unwrap() = Some(state);
        });
    }
    let env = fixture.env.clone();
    fixture.close().await;
    assert_eq!(*seen.lock().unwrap(), Some(EnvState::Ready));
    assert_eq!(env.state().await, EnvState::TornDown);
}

#[tokio::test]
async fn test_mender_connect_1_0_populates_after_setup() {
    let backend = FakeBackend::new();
    let platform = FakePlatform::new(&backend);
    let fixture = harness(&backend, &platform)
        .setup_mender_connect_1_0()
        .await
        .unwrap();
    assert_eq!(fixture.device_group.len(), 1);
    assert_eq!(backend.count_calls("scale "), 1);
    fixture.close().await;
}

#[tokio::test]
async fn test_shared_setups_match_their_per_test_forms() {
    let backend = FakeBackend::new();
    let platform = FakePlatform::new(&backend);
    let harness = harness(&backend, &platform);

    let mut shared = harness
        .class_persistent_standard_setup_one_client_bootstrapped()
        .await
        .unwrap();
    assert_eq!(shared.env.topology(), Topology::Standard);
    assert_eq!(shared.device_group.len(), 1);
    let token = shared.auth_token().await.unwrap();
    let accepted = shared
        .devauth
        .get_devices_status(&token, "accepted", 1)
        .await
        .unwrap();
    assert_eq!(accepted.len(), 1);
    shared.close().await;

    let enterprise = harness.enterprise_no_client_class().await.unwrap();
    assert_eq!(enterprise.env.topology(), Topology::Enterprise);
    assert!(enterprise.device_group.is_empty());
    assert!(enterprise.tenant.is_none());
    enterprise.close().await;
}

#[tokio::test]
async fn test_enterprise_two_clients_bootstrapped() {
    let backend = FakeBackend::new();
    let platform = FakePlatform::new(&backend);
    let mut fixture = harness(&backend, &platform)
        .enterprise_two_clients_bootstrapped()
        .await
        .unwrap();

    let tenant = fixture.tenant.clone().unwrap();
    assert!(tenant.name.starts_with("test.mender.io-"));
    assert_eq!(fixture.auth.name, TENANT_AUTH_NAME);
    assert!(!fixture.auth.create_org);
    assert_eq!(fixture.device_group.len(), 2);
    for device in fixture.device_group.iter() {
        assert_eq!(
            backend.container_env(&device.container().name),
            vec![("TENANT_TOKEN".to_string(), tenant.tenant_token.clone())]
        );
    }

    let token = fixture.auth_token().await.unwrap();
    let accepted = fixture
        .devauth
        .get_devices_status(&token, "accepted", 2)
        .await
        .unwrap();
    assert_eq!(accepted.len(), 2);
    fixture.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_tenant_isolation() {
    let backend = FakeBackend::new();
    let platform = FakePlatform::new(&backend);
    let mut fixture = harness(&backend, &platform)
        .enterprise_one_client_bootstrapped()
        .await
        .unwrap();

    // A second tenant joins one device to the same environment
    let other = new_tenant(fixture.tenants().await.unwrap().as_ref(), "os")
        .await
        .unwrap();
    fixture
        .env
        .new_tenant_client("other-tenant-client", &other.tenant_token)
        .await
        .unwrap();

    let first_token = fixture.auth_token().await.unwrap();
    assert!(
        fixture
            .devauth
            .get_devices_status(&first_token, "pending", 1)
            .await
            .is_err(),
        "the other tenant's device must not be visible"
    );

    let identity = Arc::new(platform.clone());
    let mut other_auth = AuthContext::new(
        TENANT_AUTH_NAME,
        other.admin_username(),
        TENANT_PASSWORD,
        false,
        identity,
    );
    let other_token = other_auth.get_auth_token().await.unwrap();
    let pending = fixture
        .devauth
        .get_devices_status(&other_token, "pending", 1)
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);

    // The first tenant cannot accept it either
    let err = fixture
        .devauth
        .accept_devices(&first_token, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, HarnessError::Timeout(_)));
    fixture.close().await;
}

#[tokio::test]
async fn test_unknown_bootstrap_token_never_joins() {
    let backend = FakeBackend::new();
    let platform = FakePlatform::new(&backend);
    let mut fixture = harness(&backend, &platform)
        .enterprise_one_client_bootstrapped()
        .await
        .unwrap();
    fixture
        .env
        .new_tenant_client("rogue", "not-a-tenant-token")
        .await
        .unwrap();
    let token = fixture.auth_token().await.unwrap();
    let accepted = fixture
        .devauth
        .get_devices_status(&token, "accepted", 1)
        .await
        .unwrap();
    assert_eq!(accepted.len(), 1);
    fixture.close().await;
}

#[tokio::test]
async fn test_tenant_creation_failure_is_fatal() {
    let backend = FakeBackend::new();
    let platform = FakePlatform::new(&backend);
    platform.fail_create_org();

    let err = harness(&backend, &platform)
        .enterprise_one_client()
        .await
        .unwrap_err();
    assert!(matches!(err, HarnessError::TenantCreation(_)));
    assert!(platform.tenants().is_empty());
    assert_eq!(backend.count_calls("down "), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_dropped_fixture_still_tears_down() {
    let backend = FakeBackend::new();
    let platform = FakePlatform::new(&backend);
    let fixture = harness(&backend, &platform)
        .standard_setup_one_client()
        .await
        .unwrap();
    let env = fixture.env.clone();
    drop(fixture);
    assert_eq!(env.state().await, EnvState::TornDown);
    assert!(backend.containers(env.name()).is_empty());
}

#[tokio::test]
async fn test_demo_account_registers_once() {
    let backend = FakeBackend::new();
    let platform = FakePlatform::new(&backend);
    let harness = harness(&backend, &platform);
    let mut fixture = harness.standard_setup_one_client_bootstrapped().await.unwrap();
    assert_eq!(platform.user_count(), 1);

    fixture.auth.reset_auth_token();
    let token = fixture.auth_token().await.unwrap();
    assert_eq!(token, "jwt-mender-demo@example.com");
    assert_eq!(platform.user_count(), 1);
    fixture.close().await;
}

#[tokio::test]
async fn test_endpoint_url_untouched_outside_cluster() {
    let backend = FakeBackend::new();
    let platform = FakePlatform::new(&backend);
    let harness = harness(&backend, &platform);
    let url = "http://mender-tenantadm:8080/api/internal/v1/tenantadm/tenants";
    assert_eq!(harness.endpoint_url(url).await.unwrap(), url);
    harness.close().await;
}

use mender_harness::config::WaitSettings;
use mender_harness::filetransfer::{set_limits, FileTransferLimits};
use mender_harness::{EnvState, Harness, HarnessError};
use mender_shared::compose::set_image_tag;
use mender_shared::VersionType;
use release_tool::git::CliGit;
use release_tool::{ComponentMap, ReleaseTool};

use crate::e2e_containers::{copy_manifests, init_tracing, DeviceContainer};

#[tokio::test]
async fn e2e_device_proxy_against_container() {
    init_tracing();
    let device = DeviceContainer::start().await.unwrap();
    let proxy = device.proxy(WaitSettings::new(10, 1));

    proxy.ssh_is_opened().await.unwrap();
    assert!(proxy.is_ssh_ready());

    let out = proxy.run("echo hello").await.unwrap();
    assert_eq!(out.trim(), "hello");

    let failed = proxy.run("exit 3").await;
    assert!(failed.is_err(), "non-zero exit must fail: {:?}", failed);
    assert_eq!(proxy.run_unchecked("exit 3").await.unwrap().status, 3);

    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("payload.txt");
    std::fs::write(&local, "from the host\n").unwrap();
    proxy.put(&local, "/tmp").await.unwrap();
    assert_eq!(
        proxy.run("cat /tmp/payload.txt").await.unwrap(),
        "from the host\n"
    );
}

#[tokio::test]
async fn e2e_standard_setup_one_client() {
    let harness = Harness::from_env().unwrap();
    let mut fixture = harness
        .standard_setup_one_client_bootstrapped()
        .await
        .unwrap();
    assert_eq!(fixture.env.state().await, EnvState::Ready);

    let uname = fixture.device().unwrap().run("uname -n").await.unwrap();
    assert!(!uname.trim().is_empty());

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
}

#[tokio::test]
async fn e2e_filetransfer_max_file_size() {
    let harness = Harness::from_env().unwrap();
    let mut fixture = harness
        .standard_setup_one_client_bootstrapped()
        .await
        .unwrap();

    let token = fixture.auth_token().await.unwrap();
    let devid = fixture
        .devauth
        .get_devices_status(&token, "accepted", 1)
        .await
        .unwrap()[0]
        .id
        .clone();
    let deviceconnect = fixture.deviceconnect().await.unwrap();
    deviceconnect.wait_for_connect(&devid, &token).await.unwrap();

    let device = fixture.device().unwrap().clone();
    set_limits(
        &device,
        &FileTransferLimits::max_file_size(2),
        &deviceconnect,
        &devid,
        &token,
    )
    .await
    .unwrap();
    device.run("echo 'hello world' > /tmp/too-big").await.unwrap();

    let response = deviceconnect
        .download_file("/tmp/too-big", &devid, &token)
        .await
        .unwrap();
    match response.into_result() {
        Err(HarnessError::AccessDenied(msg)) => {
            assert!(msg.contains("the file size is over the limit"), "{}", msg)
        }
        other => panic!("expected access denied, got {:?}", other),
    }

    fixture.close().await;
}

#[tokio::test]
async fn e2e_release_tool_git_pin_leaves_docker_version() {
    init_tracing();
    let harness = Harness::from_env().unwrap();
    let dir = tempfile::tempdir().unwrap();
    copy_manifests(&harness.config().integration_dir, dir.path()).unwrap();

    let tool = ReleaseTool::new(
        dir.path(),
        ComponentMap::builtin().unwrap(),
        Box::new(CliGit::new(dir.path())),
    );
    assert_eq!(
        tool.version_of("deviceauth", VersionType::Git, None).unwrap(),
        "master"
    );

    let path = dir.path().join("git-versions.yml");
    let text = std::fs::read_to_string(&path).unwrap();
    let (pinned, count) = set_image_tag(&text, "deviceauth", "1.2.3-git");
    assert_eq!(count, 1);
    std::fs::write(&path, pinned).unwrap();

    assert_eq!(
        tool.version_of("deviceauth", VersionType::Git, None).unwrap(),
        "1.2.3-git"
    );
    assert_eq!(
        tool.version_of("deviceauth", VersionType::Docker, None).unwrap(),
        "mender-master"
    );
}

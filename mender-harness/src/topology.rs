//! Named container topologies and the manifests each one provisions

use std::fmt::Display;
use std::str::FromStr;

use crate::error::HarnessError;

const BASE_FILES: &[&str] = &[
    "docker-compose.yml",
    "docker-compose.testing.yml",
    "docker-compose.storage.minio.yml",
];
const ENTERPRISE_FILES: &[&str] = &[
    "docker-compose.enterprise.yml",
    "docker-compose.testing.enterprise.yml",
];

pub const QEMU_CLIENT_FILE: &str = "docker-compose.client.yml";
pub const MT_CLIENT_FILE: &str = "docker-compose.mt.client.yml";
pub const CLIENT_SERVICE: &str = "mender-client";

/// Port the QEMU client images forward to the emulated device's sshd
pub const QEMU_SSH_PORT: u16 = 8822;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topology {
    Standard,
    MonitorCommercial,
    DockerClient,
    RofsClient,
    Legacy,
    SignedArtifact,
    ShortLivedToken,
    Failover,
    Enterprise,
    EnterpriseSMTP,
    Custom,
    Compatibility,
    MTLS,
    LegacyMenderClient,
}

impl Topology {
    pub const ALL: [Topology; 14] = [
        Topology::Standard,
        Topology::MonitorCommercial,
        Topology::DockerClient,
        Topology::RofsClient,
        Topology::Legacy,
        Topology::SignedArtifact,
        Topology::ShortLivedToken,
        Topology::Failover,
        Topology::Enterprise,
        Topology::EnterpriseSMTP,
        Topology::Custom,
        Topology::Compatibility,
        Topology::MTLS,
        Topology::LegacyMenderClient,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topology::Standard => "standard",
            Topology::MonitorCommercial => "monitor-commercial",
            Topology::DockerClient => "docker-client",
            Topology::RofsClient => "rofs-client",
            Topology::Legacy => "legacy",
            Topology::SignedArtifact => "signed-artifact",
            Topology::ShortLivedToken => "short-lived-token",
            Topology::Failover => "failover",
            Topology::Enterprise => "enterprise",
            Topology::EnterpriseSMTP => "enterprise-smtp",
            Topology::Custom => "custom",
            Topology::Compatibility => "compatibility",
            Topology::MTLS => "mtls",
            Topology::LegacyMenderClient => "legacy-mender-client",
        }
    }

    /// Manifest selection for this topology. Pure: performs no I/O.
    pub fn params(&self) -> TopologyParams {
        match self {
            Topology::Standard => TopologyParams::new(base_files())
                .with_file(QEMU_CLIENT_FILE)
                .clients(1),
            Topology::MonitorCommercial => TopologyParams::new(enterprise_files(&[
                MT_CLIENT_FILE,
                "docker-compose.monitor-client.commercial.yml",
            ]))
            .enterprise()
            .clients(0),
            Topology::DockerClient => TopologyParams::new(base_files())
                .with_file("docker-compose.docker-client.yml")
                .access(DeviceAccess::Exec)
                .clients(1),
            Topology::RofsClient => TopologyParams::new(base_files())
                .with_file("docker-compose.client.rofs.yml")
                .clients(1),
            Topology::Legacy => TopologyParams::new(base_files())
                .with_file("extra/legacy-v1-client-testing/docker-compose.client.legacy-1.7.yml")
                .clients(1),
            Topology::SignedArtifact => TopologyParams::new(base_files())
                .with_file(QEMU_CLIENT_FILE)
                .with_file("extra/signed-artifact-client-testing/docker-compose.signed-client.yml")
                .clients(1),
            Topology::ShortLivedToken => TopologyParams::new(base_files())
                .with_file(QEMU_CLIENT_FILE)
                .with_file("extra/expired-token-testing/docker-compose.short-token.yml")
                .with_env("DEVICEAUTH_JWT_EXP_TIMEOUT", "0")
                .clients(1),
            Topology::Failover => TopologyParams::new(base_files())
                .with_file(QEMU_CLIENT_FILE)
                .with_file("extra/failover-testing/docker-compose.failover-server.yml")
                .clients(1),
            Topology::Enterprise => TopologyParams::new(enterprise_files(&[MT_CLIENT_FILE]))
                .enterprise()
                .clients(0),
            Topology::EnterpriseSMTP => TopologyParams::new(enterprise_files(&[
                MT_CLIENT_FILE,
                "extra/smtp-testing/docker-compose.smtp.yml",
            ]))
            .enterprise()
            .clients(0),
            Topology::Custom => TopologyParams::new(Vec::new()).exclusive().clients(0),
            Topology::Compatibility => TopologyParams::new(enterprise_files(&[
                "extra/integration-testing/docker-compose.compat.yml",
            ]))
            .enterprise()
            .access(DeviceAccess::Exec)
            .clients(1),
            Topology::MTLS => TopologyParams::new(enterprise_files(&[
                MT_CLIENT_FILE,
                "extra/mtls/docker-compose.mtls-test.yml",
            ]))
            .enterprise()
            .clients(0),
            Topology::LegacyMenderClient => TopologyParams::new(base_files())
                .with_file("extra/legacy-mender-client-testing/docker-compose.client-2.5.yml")
                .clients(0),
        }
    }
}

impl Display for Topology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topology {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topology::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| HarnessError::InvalidState(format!("unknown topology {}", s)))
    }
}

/// How the harness reaches a device's shell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceAccess {
    /// QEMU image: sshd inside the emulated device
    Ssh { port: u16 },
    /// The container itself is the device
    Exec,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyParams {
    /// Manifests relative to the integration directory
    pub compose_files: Vec<String>,
    pub client_service: String,
    pub default_clients: usize,
    pub enterprise: bool,
    pub access: DeviceAccess,
    pub env: Vec<(String, String)>,
    /// Needs the global serialization lock
    pub exclusive: bool,
}

impl TopologyParams {
    fn new(compose_files: Vec<String>) -> Self {
        Self {
            compose_files,
            client_service: CLIENT_SERVICE.to_string(),
            default_clients: 1,
            enterprise: false,
            access: DeviceAccess::Ssh {
                port: QEMU_SSH_PORT,
            },
            env: Vec::new(),
            exclusive: false,
        }
    }

    fn with_file(mut self, file: &str) -> Self {
        self.compose_files.push(file.to_string());
        self
    }

    fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    fn clients(mut self, n: usize) -> Self {
        self.default_clients = n;
        self
    }

    fn enterprise(mut self) -> Self {
        self.enterprise = true;
        self
    }

    fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    fn access(mut self, access: DeviceAccess) -> Self {
        self.access = access;
        self
    }

    /// Custom setups leave provisioning to the test body
    pub fn provisions(&self) -> bool {
        !self.compose_files.is_empty()
    }
}

fn base_files() -> Vec<String> {
    BASE_FILES.iter().map(|f| f.to_string()).collect()
}

fn enterprise_files(extra: &[&str]) -> Vec<String> {
    BASE_FILES
        .iter()
        .chain(ENTERPRISE_FILES)
        .chain(extra)
        .map(|f| f.to_string())
        .collect()
}

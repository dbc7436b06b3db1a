//! Session cache of `kubectl port-forward` processes

use reqwest::Url;
use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{info, warn};

use crate::error::{HarnessError, Result};

pub const FIRST_LOCAL_PORT: u16 = 8081;
const SETTLE_TIME: Duration = Duration::from_secs(3);

struct Forward {
    local_port: u16,
    child: Child,
}

/// One forwarded local port per in-cluster service host
pub struct PortForwards {
    kubectl: String,
    enabled: bool,
    next_port: u16,
    forwards: HashMap<String, Forward>,
}

impl PortForwards {
    pub fn new(kubectl: impl Into<String>, enabled: bool) -> Self {
        Self {
            kubectl: kubectl.into(),
            enabled,
            next_port: FIRST_LOCAL_PORT,
            forwards: HashMap::new(),
        }
    }

    /// Rewrites `url` to a local forward when it targets an in-cluster
    /// `mender-*` service; any other URL is returned unchanged.
    pub async fn endpoint_url(&mut self, url: &str) -> Result<String> {
        if !self.enabled {
            return Ok(url.to_string());
        }
        let parsed = Url::parse(url)
            .map_err(|e| HarnessError::InvalidState(format!("bad url {}: {}", url, e)))?;
        let host = match parsed.host_str() {
            Some(h) if h.starts_with("mender-") => h.to_string(),
            _ => return Ok(url.to_string()),
        };
        let remote_port = parsed.port_or_known_default().unwrap_or(80);

        let local_port = match self.forwards.get(&host) {
            Some(forward) => forward.local_port,
            None => self.spawn_forward(&host, remote_port).await?,
        };

        let mut rewritten = format!("http://localhost:{}{}", local_port, parsed.path());
        if let Some(query) = parsed.query() {
            rewritten.push('?');
            rewritten.push_str(query);
        }
        Ok(rewritten)
    }

    async fn spawn_forward(&mut self, host: &str, remote_port: u16) -> Result<u16> {
        let local_port = self.next_port;
        info!(
            "Forwarding localhost:{} to service/{}:{}",
            local_port, host, remote_port
        );
        let child = Command::new(&self.kubectl)
            .args([
                "port-forward".to_string(),
                format!("service/{}", host),
                format!("{}:{}", local_port, remote_port),
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| HarnessError::Exec(format!("failed to run {}: {}", self.kubectl, e)))?;

        self.forwards
            .insert(host.to_string(), Forward { local_port, child });
        self.next_port += 1;
        tokio::time::sleep(SETTLE_TIME).await;
        Ok(local_port)
    }

    pub fn len(&self) -> usize {
        self.forwards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forwards.is_empty()
    }

    /// Terminates every forwarding process
    pub async fn close(&mut self) {
        for (host, mut forward) in self.forwards.drain() {
            if let Err(e) = forward.child.kill().await {
                warn!("Failed to stop port-forward for {}: {}", host, e);
            }
        }
    }
}

impl Drop for PortForwards {
    fn drop(&mut self) {
        for (host, forward) in self.forwards.iter_mut() {
            if let Err(e) = forward.child.start_kill() {
                warn!("Failed to stop port-forward for {}: {}", host, e);
            }
        }
    }
}

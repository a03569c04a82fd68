//! Host-side WireGuard control: applying and removing peers on the live
//! interface and generating key material on the VPN host.
//!
//! Every operation here is best-effort. The database is authoritative; a
//! host that is unreachable or a script that fails never propagates an
//! error to the caller. With `apply_enabled = false` (the default) all
//! operations are no-ops that report "not attempted".

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::config::WireguardConfig;

/// Key material produced by the host's gen-key script. The private key
/// never leaves the host; only its path comes back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostKeyMaterial {
    pub private_key_path: String,

    pub public_key: String,
}

#[async_trait]
pub trait HostControl: Send + Sync {
    /// Apply a peer to the WireGuard interface. Returns true only when the
    /// script ran and exited 0.
    async fn apply_peer(&self, public_key: &str, allowed_ips: &str) -> bool;

    /// Remove a peer from the WireGuard interface. Same contract as
    /// [`Self::apply_peer`].
    async fn remove_peer(&self, public_key: &str) -> bool;

    /// Generate a keypair on the host. Returns `None` on any failure.
    async fn generate_key_on_host(&self, base_name: &str) -> Option<HostKeyMaterial>;
}

#[derive(Debug, Clone)]
pub struct HostController {
    enabled: bool,
    ssh_target: Option<String>,
    interface: String,
    apply_script: String,
    remove_script: String,
    genkey_script: String,
    keys_dir: String,
    timeout: Duration,
}

impl HostController {
    #[must_use]
    pub fn new(config: &WireguardConfig) -> Self {
        Self {
            enabled: config.apply_enabled,
            ssh_target: config.ssh_target.clone(),
            interface: config.interface.clone(),
            apply_script: config.apply_script.clone(),
            remove_script: config.remove_script.clone(),
            genkey_script: config.genkey_script.clone(),
            keys_dir: config.keys_dir.clone(),
            timeout: Duration::from_secs(config.script_timeout_seconds),
        }
    }

    fn build_command(&self, script: &str, args: &[&str]) -> Vec<String> {
        self.ssh_target.as_ref().map_or_else(
            || {
                let mut cmd = vec![script.to_string()];
                cmd.extend(args.iter().map(ToString::to_string));
                cmd
            },
            |target| build_ssh_command(target, script, args),
        )
    }

    async fn run_script(&self, script: &str, args: &[&str]) -> anyhow::Result<std::process::Output> {
        let argv = self.build_command(script, args);
        debug!(argv = ?argv, "Running host script");

        let output = tokio::time::timeout(
            self.timeout,
            Command::new(&argv[0]).args(&argv[1..]).output(),
        )
        .await
        .map_err(|_| anyhow::anyhow!("host script timed out after {:?}", self.timeout))??;

        Ok(output)
    }
}

#[async_trait]
impl HostControl for HostController {
    async fn apply_peer(&self, public_key: &str, allowed_ips: &str) -> bool {
        if !self.enabled {
            debug!("Host apply disabled; skipping");
            return false;
        }

        let args = [self.interface.as_str(), public_key, allowed_ips];
        match self.run_script(&self.apply_script, &args).await {
            Ok(output) if output.status.success() => {
                info!(public_key = %public_key, "WireGuard peer applied on host");
                true
            }
            Ok(output) => {
                error!(
                    status = ?output.status.code(),
                    stderr = %String::from_utf8_lossy(&output.stderr),
                    "Host apply script failed"
                );
                false
            }
            Err(e) => {
                error!(error = %e, "Failed to apply WireGuard peer on host");
                false
            }
        }
    }

    async fn remove_peer(&self, public_key: &str) -> bool {
        if !self.enabled {
            debug!("Host remove disabled; skipping");
            return false;
        }

        let args = [self.interface.as_str(), public_key];
        match self.run_script(&self.remove_script, &args).await {
            Ok(output) if output.status.success() => {
                info!(public_key = %public_key, "WireGuard peer removed on host");
                true
            }
            Ok(output) => {
                error!(
                    status = ?output.status.code(),
                    stderr = %String::from_utf8_lossy(&output.stderr),
                    "Host remove script failed"
                );
                false
            }
            Err(e) => {
                error!(error = %e, "Failed to remove WireGuard peer on host");
                false
            }
        }
    }

    async fn generate_key_on_host(&self, base_name: &str) -> Option<HostKeyMaterial> {
        if !self.enabled {
            debug!("Host key generation disabled; skipping");
            return None;
        }

        let args = [self.keys_dir.as_str(), base_name];
        let output = match self.run_script(&self.genkey_script, &args).await {
            Ok(output) => output,
            Err(e) => {
                error!(error = %e, "Failed to generate key on host");
                return None;
            }
        };

        if !output.status.success() {
            error!(
                status = ?output.status.code(),
                stderr = %String::from_utf8_lossy(&output.stderr),
                "Host key generation failed"
            );
            return None;
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        match parse_keygen_output(&stdout) {
            Some(material) => Some(material),
            None => {
                warn!(stdout = %stdout.trim(), "Unexpected keygen output");
                None
            }
        }
    }
}

/// Parse gen-key script stdout: lines of `KEY=value`, keys case-insensitive.
/// Both a `private` (key file path) and a `public` (key value) entry are
/// required.
fn parse_keygen_output(stdout: &str) -> Option<HostKeyMaterial> {
    let mut private = None;
    let mut public = None;

    for line in stdout.lines() {
        if let Some((key, value)) = line.split_once('=') {
            match key.trim().to_lowercase().as_str() {
                "private" => private = Some(value.trim().to_string()),
                "public" => public = Some(value.trim().to_string()),
                _ => {}
            }
        }
    }

    Some(HostKeyMaterial {
        private_key_path: private?,
        public_key: public?,
    })
}

/// Build the argv for remote execution: `ssh <target> "sudo <script> <args>"`.
/// The remote shell re-parses the command string, so the script path and
/// every argument are individually quoted.
fn build_ssh_command(target: &str, script: &str, args: &[&str]) -> Vec<String> {
    let quoted_args = args
        .iter()
        .map(|a| shell_quote(a))
        .collect::<Vec<_>>()
        .join(" ");

    vec![
        "ssh".to_string(),
        target.to_string(),
        format!("sudo {} {}", shell_quote(script), quoted_args),
    ]
}

/// Single-quote a string for POSIX shells. Embedded single quotes become
/// `'\''`.
fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./=@:,".contains(c))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

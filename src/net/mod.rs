mod runner;

pub use runner::{CmdError, CmdOutput, CommandRunner, NmcliRunner};

#[cfg(test)]
pub(crate) use runner::testing;

use std::collections::HashSet;
use std::time::Duration;

use log::{error, info, warn};
use tokio::time::sleep;

use crate::config::{Config, Timeouts};

const NMCLI: &str = "nmcli";
const HOSTNAMECTL: &str = "hostnamectl";
const CONNECT_SUCCESS_MARKER: &str = "successfully activated";
const WIRELESS_PROFILE_TYPE: &str = "802-11-wireless";

/// Let the interface settle between tearing down the old association and
/// requesting the new one.
const SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Terminal result of a connection-related operation. `Connected` is the only
/// variant carrying payload; its IP string is non-empty. Display text comes
/// from [`ConnectionOutcome::label`], never the other way around.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionOutcome {
    NotStarted,
    Scanning,
    Connecting,
    Connected { ip: String },
    NoIpAcquired,
    NotConnected,
    Timeout,
    ErrorOccurred,
    NoInterface,
}

impl ConnectionOutcome {
    pub fn label(&self) -> &str {
        match self {
            ConnectionOutcome::NotStarted => "Not Started",
            ConnectionOutcome::Scanning => "Scanning...",
            ConnectionOutcome::Connecting => "Connecting...",
            ConnectionOutcome::Connected { .. } => "Connected",
            ConnectionOutcome::NoIpAcquired => "No IP Acquired",
            ConnectionOutcome::NotConnected => "Not Connected",
            ConnectionOutcome::Timeout => "Timeout",
            ConnectionOutcome::ErrorOccurred => "Error Occurred",
            ConnectionOutcome::NoInterface => "No Interface",
        }
    }

    pub fn ip(&self) -> Option<&str> {
        match self {
            ConnectionOutcome::Connected { ip } => Some(ip),
            _ => None,
        }
    }

    /// Whether this status can correspond to an active or in-progress
    /// association worth tearing down.
    fn plausibly_active(&self) -> bool {
        !matches!(
            self,
            ConnectionOutcome::NotConnected
                | ConnectionOutcome::NotStarted
                | ConnectionOutcome::NoInterface
                | ConnectionOutcome::Scanning
        )
    }
}

/// Placeholder standing in for a real AP list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanSentinel {
    NoInterface,
    ScanError,
    NoMatchingAps,
}

impl ScanSentinel {
    pub fn label(&self) -> &'static str {
        match self {
            ScanSentinel::NoInterface => "No Interface",
            ScanSentinel::ScanError => "Scan Error",
            ScanSentinel::NoMatchingAps => "No Matching APs",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPoint {
    pub ssid: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Deduplicated, first-seen-ordered, prefix-filtered SSIDs
    Aps(Vec<AccessPoint>),
    Sentinel(ScanSentinel),
}

/// Drives the external network tool. Owns every timeout budget; no operation
/// returns an error across this boundary, only outcome values. Operations
/// must not run concurrently against the same interface, which holds because
/// only the menu task calls them, one at a time.
pub struct NetworkController<R: CommandRunner> {
    runner: R,
    hostname_prefix: String,
    interface_prefix: String,
    ssid_prefix: String,
    passphrase: String,
    timeouts: Timeouts,
}

impl<R: CommandRunner> NetworkController<R> {
    pub fn new(runner: R, config: &Config) -> Self {
        NetworkController {
            runner,
            hostname_prefix: config.network.hostname_prefix.clone(),
            interface_prefix: config.network.interface_prefix.clone(),
            ssid_prefix: config.network.ssid_prefix.clone(),
            passphrase: config.network.passphrase.clone(),
            timeouts: config.timeouts.clone(),
        }
    }

    /// First network device whose name matches the configured prefix. No
    /// retry; `None` is a valid, reported outcome.
    pub async fn discover_interface(&self) -> Option<String> {
        let out = match self
            .runner
            .run(
                NMCLI,
                &["-t", "-f", "DEVICE", "device", "status"],
                self.timeouts.discover(),
            )
            .await
        {
            Ok(out) if out.success => out,
            Ok(out) => {
                error!("device listing failed: {}", out.text.trim());
                return None;
            }
            Err(e) => {
                error!("device listing failed: {}", e);
                return None;
            }
        };

        let iface = out
            .text
            .lines()
            .map(str::trim)
            .find(|line| line.starts_with(&self.interface_prefix))
            .map(str::to_owned)?;

        info!("using wireless interface {}", iface);
        Some(iface)
    }

    /// Hostname derived from the last 4 alphanumeric characters of the
    /// interface name. A failure to apply it at the OS level yields a
    /// distinguishable fallback that is displayed, never swallowed.
    pub async fn assign_hostname(&self, iface: &str) -> String {
        let alnum: String = iface.chars().filter(char::is_ascii_alphanumeric).collect();
        let suffix = &alnum[alnum.len().saturating_sub(4)..];
        let hostname = format!("{}{}", self.hostname_prefix, suffix);

        match self
            .runner
            .run(
                HOSTNAMECTL,
                &["set-hostname", &hostname],
                self.timeouts.hostname(),
            )
            .await
        {
            Ok(out) if out.success => {
                info!("hostname set to {}", hostname);
                hostname
            }
            Ok(out) => {
                error!("failed to set hostname: {}", out.text.trim());
                format!("{}ERR", self.hostname_prefix)
            }
            Err(e) => {
                error!("failed to set hostname: {}", e);
                format!("{}ERR", self.hostname_prefix)
            }
        }
    }

    /// Best-effort teardown of every stored wireless profile touching the
    /// interface. A clean slate is an optimization, not a precondition, so
    /// failures are logged and the controller carries on.
    pub async fn reset_connections(&self, iface: &str) {
        info!("clearing stored wireless connections");

        match self
            .runner
            .run(
                NMCLI,
                &["-t", "-f", "NAME,DEVICE", "connection", "show", "--active"],
                self.timeouts.list(),
            )
            .await
        {
            Ok(out) if out.success => {
                for line in out.text.lines() {
                    let Some((name, device)) = line.split_once(':') else {
                        continue;
                    };
                    if device == iface && !name.is_empty() {
                        info!("deactivating connection {}", name);
                        match self
                            .runner
                            .run(NMCLI, &["connection", "down", name], self.timeouts.disconnect())
                            .await
                        {
                            Ok(out) if out.success => {}
                            Ok(out) => warn!("could not deactivate {}: {}", name, out.text.trim()),
                            Err(e) => warn!("could not deactivate {}: {}", name, e),
                        }
                    }
                }
            }
            Ok(out) => warn!("listing active connections failed: {}", out.text.trim()),
            Err(e) => warn!("listing active connections failed: {}", e),
        }

        match self
            .runner
            .run(
                NMCLI,
                &["-t", "-f", "UUID,TYPE", "connection", "show"],
                self.timeouts.list(),
            )
            .await
        {
            Ok(out) if out.success => {
                for line in out.text.lines() {
                    let Some((uuid, kind)) = line.split_once(':') else {
                        continue;
                    };
                    if kind.trim() == WIRELESS_PROFILE_TYPE {
                        info!("deleting wireless profile {}", uuid);
                        match self
                            .runner
                            .run(
                                NMCLI,
                                &["connection", "delete", "uuid", uuid],
                                self.timeouts.disconnect(),
                            )
                            .await
                        {
                            Ok(out) if out.success => {}
                            Ok(out) => warn!("could not delete {}: {}", uuid, out.text.trim()),
                            Err(e) => warn!("could not delete {}: {}", uuid, e),
                        }
                    }
                }
            }
            Ok(out) => warn!("listing stored connections failed: {}", out.text.trim()),
            Err(e) => warn!("listing stored connections failed: {}", e),
        }
    }

    /// Rescan, list, filter to the configured SSID prefix, dedupe preserving
    /// first-seen order.
    pub async fn scan(&self, iface: Option<&str>) -> ScanOutcome {
        let Some(iface) = iface else {
            warn!("cannot scan without a wireless interface");
            return ScanOutcome::Sentinel(ScanSentinel::NoInterface);
        };

        info!("scanning for wireless networks on {}", iface);

        match self
            .runner
            .run(
                NMCLI,
                &["device", "wifi", "rescan", "ifname", iface],
                self.timeouts.rescan(),
            )
            .await
        {
            Ok(out) if out.success => {}
            Ok(out) => {
                error!("wifi rescan failed: {}", out.text.trim());
                return ScanOutcome::Sentinel(ScanSentinel::ScanError);
            }
            Err(e) => {
                error!("wifi rescan failed: {}", e);
                return ScanOutcome::Sentinel(ScanSentinel::ScanError);
            }
        }

        let out = match self
            .runner
            .run(
                NMCLI,
                &[
                    "--escape", "no", "-t", "-f", "SSID", "device", "wifi", "list", "ifname",
                    iface,
                ],
                self.timeouts.list(),
            )
            .await
        {
            Ok(out) if out.success => out,
            Ok(out) => {
                error!("listing wifi networks failed: {}", out.text.trim());
                return ScanOutcome::Sentinel(ScanSentinel::ScanError);
            }
            Err(e) => {
                error!("listing wifi networks failed: {}", e);
                return ScanOutcome::Sentinel(ScanSentinel::ScanError);
            }
        };

        let mut seen = HashSet::new();
        let mut aps = Vec::new();
        for ssid in out.text.lines().map(str::trim) {
            if !ssid.is_empty() && ssid.starts_with(&self.ssid_prefix) && seen.insert(ssid) {
                aps.push(AccessPoint {
                    ssid: ssid.to_string(),
                });
            }
        }

        if aps.is_empty() {
            info!("no {} networks in range", self.ssid_prefix);
            return ScanOutcome::Sentinel(ScanSentinel::NoMatchingAps);
        }

        info!("found {} matching networks", aps.len());
        ScanOutcome::Aps(aps)
    }

    /// One join attempt, no internal retry; the caller decides whether to
    /// re-trigger. On success the assigned address is queried, with one
    /// additional attempt after a short grace period.
    pub async fn connect(&self, ssid: &str, iface: Option<&str>) -> ConnectionOutcome {
        let Some(iface) = iface else {
            warn!("cannot connect without a wireless interface");
            return ConnectionOutcome::NoInterface;
        };

        info!("connecting to {}", ssid);

        // Whatever association is on the interface goes first; the result
        // does not matter.
        let _ = self
            .runner
            .run(
                NMCLI,
                &["device", "disconnect", iface],
                self.timeouts.disconnect(),
            )
            .await;
        sleep(SETTLE_DELAY).await;

        let out = match self
            .runner
            .run(
                NMCLI,
                &[
                    "device",
                    "wifi",
                    "connect",
                    ssid,
                    "password",
                    &self.passphrase,
                    "ifname",
                    iface,
                ],
                self.timeouts.connect(),
            )
            .await
        {
            Ok(out) => out,
            Err(CmdError::Timeout) => {
                error!("connection to {} timed out", ssid);
                return ConnectionOutcome::Timeout;
            }
            Err(e) => {
                error!("connection attempt failed: {}", e);
                return ConnectionOutcome::ErrorOccurred;
            }
        };

        if !(out.success && out.text.contains(CONNECT_SUCCESS_MARKER)) {
            error!("failed to connect to {}: {}", ssid, out.text.trim());
            return ConnectionOutcome::NotConnected;
        }

        info!("connected to {}", ssid);

        if let Some(ip) = self.query_ip(iface).await {
            return ConnectionOutcome::Connected { ip };
        }

        // DHCP may still be running; give it one grace period.
        sleep(self.timeouts.ip_grace()).await;
        match self.query_ip(iface).await {
            Some(ip) => ConnectionOutcome::Connected { ip },
            None => ConnectionOutcome::NoIpAcquired,
        }
    }

    /// Idempotent from the caller's perspective: always reports
    /// `NotConnected`, and only issues a teardown when the previous status
    /// suggests there is something to tear down.
    pub async fn disconnect(
        &self,
        iface: Option<&str>,
        prev: &ConnectionOutcome,
    ) -> ConnectionOutcome {
        let Some(iface) = iface else {
            warn!("cannot disconnect without a wireless interface");
            return ConnectionOutcome::NotConnected;
        };

        if prev.plausibly_active() {
            info!("disconnecting {}", iface);
            match self
                .runner
                .run(
                    NMCLI,
                    &["device", "disconnect", iface],
                    self.timeouts.disconnect(),
                )
                .await
            {
                Ok(out) if out.success => info!("wireless interface disconnected"),
                Ok(out) => error!("disconnect failed: {}", out.text.trim()),
                Err(e) => error!("disconnect failed: {}", e),
            }
        }

        ConnectionOutcome::NotConnected
    }

    #[cfg(test)]
    pub(crate) fn runner(&self) -> &R {
        &self.runner
    }

    async fn query_ip(&self, iface: &str) -> Option<String> {
        let out = self
            .runner
            .run(
                NMCLI,
                &["-g", "IP4.ADDRESS", "device", "show", iface],
                self.timeouts.list(),
            )
            .await
            .ok()?;
        if !out.success {
            return None;
        }

        // Output looks like "10.0.0.5/24", possibly one line per address.
        let addr = out
            .text
            .lines()
            .next()
            .unwrap_or("")
            .split('/')
            .next()
            .unwrap_or("")
            .trim();
        (!addr.is_empty()).then(|| addr.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::runner::testing::FakeRunner;
    use super::*;

    fn controller(runner: FakeRunner) -> NetworkController<FakeRunner> {
        NetworkController::new(runner, &Config::default())
    }

    #[tokio::test]
    async fn test_discover_interface() {
        let runner = FakeRunner::new();
        runner.push_ok("lo\neth0\nwlxc83a45b9\n");
        let net = controller(runner);

        assert_eq!(
            net.discover_interface().await,
            Some("wlxc83a45b9".to_string())
        );
    }

    #[tokio::test]
    async fn test_discover_interface_absent() {
        let runner = FakeRunner::new();
        runner.push_ok("lo\neth0\n");
        let net = controller(runner);

        assert_eq!(net.discover_interface().await, None);
    }

    #[tokio::test]
    async fn test_discover_interface_tool_failure() {
        let runner = FakeRunner::new();
        runner.push_failure("Error: NetworkManager is not running.");
        let net = controller(runner);

        assert_eq!(net.discover_interface().await, None);
    }

    #[tokio::test]
    async fn test_assign_hostname() {
        let runner = FakeRunner::new();
        runner.push_ok("");
        let net = controller(runner);

        assert_eq!(net.assign_hostname("wlxc83a45b9").await, "RPi0-45b9");
    }

    #[tokio::test]
    async fn test_assign_hostname_fallback() {
        let runner = FakeRunner::new();
        runner.push_failure("Could not set property: Access denied");
        let net = controller(runner);

        assert_eq!(net.assign_hostname("wlxc83a45b9").await, "RPi0-ERR");
    }

    #[tokio::test]
    async fn test_scan_dedupes_preserving_order() {
        let runner = FakeRunner::new();
        runner.push_ok(""); // rescan
        runner.push_ok("QW-Home\nQW-Home\nOffice\nQW-Guest\n");
        let net = controller(runner);

        let outcome = net.scan(Some("wlx0")).await;
        assert_eq!(
            outcome,
            ScanOutcome::Aps(vec![
                AccessPoint {
                    ssid: "QW-Home".to_string()
                },
                AccessPoint {
                    ssid: "QW-Guest".to_string()
                },
            ])
        );
    }

    #[tokio::test]
    async fn test_scan_no_matching_aps() {
        let runner = FakeRunner::new();
        runner.push_ok("");
        runner.push_ok("Office\nCafe\n");
        let net = controller(runner);

        assert_eq!(
            net.scan(Some("wlx0")).await,
            ScanOutcome::Sentinel(ScanSentinel::NoMatchingAps)
        );
    }

    #[tokio::test]
    async fn test_scan_rescan_timeout() {
        let runner = FakeRunner::new();
        runner.push_timeout();
        let net = controller(runner);

        assert_eq!(
            net.scan(Some("wlx0")).await,
            ScanOutcome::Sentinel(ScanSentinel::ScanError)
        );
    }

    #[tokio::test]
    async fn test_scan_without_interface_skips_tool() {
        let runner = FakeRunner::new();
        let net = controller(runner);

        assert_eq!(
            net.scan(None).await,
            ScanOutcome::Sentinel(ScanSentinel::NoInterface)
        );
        assert!(net.runner.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_success() {
        let runner = FakeRunner::new();
        runner.push_ok(""); // pre-connect disconnect
        runner.push_ok("Device 'wlx0' successfully activated with 'b9f1'.");
        runner.push_ok("10.0.0.5/24\n");
        let net = controller(runner);

        assert_eq!(
            net.connect("QW-Home", Some("wlx0")).await,
            ConnectionOutcome::Connected {
                ip: "10.0.0.5".to_string()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_ip_after_grace_period() {
        let runner = FakeRunner::new();
        runner.push_ok("");
        runner.push_ok("Device 'wlx0' successfully activated with 'b9f1'.");
        runner.push_ok("\n");
        runner.push_ok("10.0.0.7/24\n");
        let net = controller(runner);

        assert_eq!(
            net.connect("QW-Home", Some("wlx0")).await,
            ConnectionOutcome::Connected {
                ip: "10.0.0.7".to_string()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_no_ip_acquired() {
        let runner = FakeRunner::new();
        runner.push_ok("");
        runner.push_ok("Device 'wlx0' successfully activated with 'b9f1'.");
        runner.push_ok("");
        runner.push_ok("");
        let net = controller(runner);

        assert_eq!(
            net.connect("QW-Home", Some("wlx0")).await,
            ConnectionOutcome::NoIpAcquired
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_rejected() {
        let runner = FakeRunner::new();
        runner.push_ok("");
        runner.push_failure("Error: Connection activation failed: (7) Secrets were required");
        let net = controller(runner);

        assert_eq!(
            net.connect("QW-Home", Some("wlx0")).await,
            ConnectionOutcome::NotConnected
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_exit_ok_without_marker() {
        let runner = FakeRunner::new();
        runner.push_ok("");
        runner.push_ok("Connection with UUID created");
        let net = controller(runner);

        assert_eq!(
            net.connect("QW-Home", Some("wlx0")).await,
            ConnectionOutcome::NotConnected
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout_then_disconnect() {
        let runner = FakeRunner::new();
        runner.push_ok("");
        runner.push_timeout();
        runner.push_ok(""); // the follow-up disconnect
        let net = controller(runner);

        let outcome = net.connect("QW-Home", Some("wlx0")).await;
        assert_eq!(outcome, ConnectionOutcome::Timeout);
        assert_eq!(
            net.disconnect(Some("wlx0"), &outcome).await,
            ConnectionOutcome::NotConnected
        );
    }

    #[tokio::test]
    async fn test_disconnect_idempotent() {
        let runner = FakeRunner::new();
        runner.push_ok("");
        let net = controller(runner);

        let first = net
            .disconnect(
                Some("wlx0"),
                &ConnectionOutcome::Connected {
                    ip: "10.0.0.5".to_string(),
                },
            )
            .await;
        assert_eq!(first, ConnectionOutcome::NotConnected);
        assert_eq!(net.runner.calls().len(), 1);

        // Already down: no second teardown command.
        let second = net.disconnect(Some("wlx0"), &first).await;
        assert_eq!(second, ConnectionOutcome::NotConnected);
        assert_eq!(net.runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_reset_connections_best_effort() {
        let runner = FakeRunner::new();
        runner.push_ok("QW-Home:wlx0\nWired connection 1:eth0\n");
        runner.push_ok(""); // connection down QW-Home
        runner.push_ok("5c8e:802-11-wireless\n91aa:802-3-ethernet\n");
        runner.push_failure("Error: unknown connection"); // delete fails, still non-fatal
        let net = controller(runner);

        net.reset_connections("wlx0").await;

        let calls = net.runner.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[1], "nmcli connection down QW-Home");
        assert_eq!(calls[3], "nmcli connection delete uuid 5c8e");
    }
}

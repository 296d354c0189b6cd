use std::time::Duration;

use log::{debug, error, info};
use tokio::sync::mpsc;
use tokio::time::sleep;

use crate::config::Config;
use crate::display::scroll::{LineRenderer, VISIBLE_ROWS};
use crate::display::TextScreen;
use crate::net::{
    AccessPoint, CommandRunner, ConnectionOutcome, NetworkController, ScanOutcome, ScanSentinel,
};
use crate::InputEvent;

/// How long the no-interface error stays up before falling back to the boot
/// screen.
const NO_INTERFACE_HOLD: Duration = Duration::from_secs(3);
/// How long the stopped notice stays up.
const STOPPED_HOLD: Duration = Duration::from_secs(2);
/// How long the goodbye notice stays up before the screen is blanked.
const GOODBYE_HOLD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Aps,
    Status,
}

/// The AP list as the menu sees it: a scan may be in flight, may have
/// produced a sentinel, or may have produced a real list. Only a non-empty
/// real list is selectable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApEntries {
    Pending,
    Sentinel(ScanSentinel),
    Aps(Vec<AccessPoint>),
}

impl ApEntries {
    pub fn selectable(&self) -> bool {
        matches!(self, ApEntries::Aps(aps) if !aps.is_empty())
    }

    pub fn len(&self) -> usize {
        match self {
            ApEntries::Aps(aps) => aps.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ssid_at(&self, index: usize) -> Option<&str> {
        match self {
            ApEntries::Aps(aps) => aps.get(index).map(|ap| ap.ssid.as_str()),
            _ => None,
        }
    }

    /// Display rows; sentinels collapse to a single message row.
    pub fn rows(&self) -> Vec<String> {
        match self {
            ApEntries::Pending => vec!["Scanning...".to_string()],
            ApEntries::Sentinel(sentinel) => vec![sentinel.label().to_string()],
            ApEntries::Aps(aps) => aps.iter().map(|ap| ap.ssid.clone()).collect(),
        }
    }
}

impl From<ScanOutcome> for ApEntries {
    fn from(outcome: ScanOutcome) -> Self {
        match outcome {
            ScanOutcome::Aps(aps) => ApEntries::Aps(aps),
            ScanOutcome::Sentinel(sentinel) => ApEntries::Sentinel(sentinel),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub status: ConnectionOutcome,
    /// Set only while `status` is `Connected`
    pub ssid: Option<String>,
}

/// The whole menu model. One instance, owned by the menu task; everything
/// that mutates it arrives through the event channel.
#[derive(Debug)]
pub struct MenuState {
    pub page: Page,
    pub running: bool,
    pub entries: ApEntries,
    pub selected: usize,
    pub scroll_offset: usize,
    pub hostname: String,
    pub interface: Option<String>,
    pub connection: ConnectionInfo,
}

impl MenuState {
    pub fn new(hostname_prefix: &str) -> Self {
        MenuState {
            page: Page::Aps,
            running: false,
            entries: ApEntries::Aps(Vec::new()),
            selected: 0,
            scroll_offset: 0,
            hostname: format!("{}XXXX", hostname_prefix),
            interface: None,
            connection: ConnectionInfo {
                status: ConnectionOutcome::NotStarted,
                ssid: None,
            },
        }
    }

    /// Clamp the selection and slide the four-row window after it. Returns
    /// false when the list is not selectable, i.e. the event is a no-op.
    pub fn apply_rotation(&mut self, delta: i32) -> bool {
        if !self.entries.selectable() {
            return false;
        }
        let len = self.entries.len();

        let selected = (self.selected as i64 + delta as i64).clamp(0, len as i64 - 1) as usize;
        if selected < self.scroll_offset {
            self.scroll_offset = selected;
        } else if selected >= self.scroll_offset + VISIBLE_ROWS {
            self.scroll_offset = selected + 1 - VISIBLE_ROWS;
        }
        self.scroll_offset = self.scroll_offset.min(len.saturating_sub(VISIBLE_ROWS));
        self.selected = selected;
        true
    }

    fn reset_list(&mut self) {
        self.entries = ApEntries::Pending;
        self.selected = 0;
        self.scroll_offset = 0;
    }
}

/// Owns the menu state, the network controller, and the renderer; consumes
/// input events strictly sequentially. A rotation that arrives while a
/// connect is in flight just waits in the channel.
pub struct MenuManager<R: CommandRunner, S: TextScreen + 'static> {
    state: MenuState,
    net: NetworkController<R>,
    renderer: LineRenderer<S>,
    start_pin: u8,
}

impl<R: CommandRunner, S: TextScreen + 'static> MenuManager<R, S> {
    pub fn new(net: NetworkController<R>, renderer: LineRenderer<S>, config: &Config) -> Self {
        MenuManager {
            state: MenuState::new(&config.network.hostname_prefix),
            net,
            renderer,
            start_pin: config.pins.start_switch.bcm(),
        }
    }

    pub async fn run(mut self, mut events: mpsc::Receiver<InputEvent>) {
        self.render_boot().await;

        while let Some(event) = events.recv().await {
            match event {
                InputEvent::Rotate { delta } => self.handle_rotate(delta).await,
                InputEvent::Click => self.handle_click().await,
                InputEvent::Start => self.handle_start().await,
                InputEvent::Stop => self.handle_stop().await,
                InputEvent::Shutdown => {
                    self.handle_shutdown().await;
                    break;
                }
            }
        }
    }

    async fn handle_rotate(&mut self, delta: i32) {
        if !self.state.running || self.state.page != Page::Aps {
            return;
        }
        if self.state.apply_rotation(delta) {
            self.render_current().await;
        }
    }

    async fn handle_click(&mut self) {
        if !self.state.running {
            return;
        }

        match self.state.page {
            Page::Aps => {
                let Some(ssid) = self
                    .state
                    .entries
                    .ssid_at(self.state.selected)
                    .map(str::to_owned)
                else {
                    debug!("click ignored: no selectable AP");
                    return;
                };
                let iface = self.state.interface.clone();

                info!("selected AP {}", ssid);
                self.state.page = Page::Status;
                self.state.connection = ConnectionInfo {
                    status: ConnectionOutcome::Connecting,
                    ssid: None,
                };
                self.render_current().await;

                let outcome = self.net.connect(&ssid, iface.as_deref()).await;
                self.state.connection.ssid =
                    matches!(outcome, ConnectionOutcome::Connected { .. }).then_some(ssid);
                self.state.connection.status = outcome;
                self.render_current().await;
            }
            Page::Status => {
                info!("returning to the AP page and rescanning");
                let iface = self.state.interface.clone();
                let prev = self.state.connection.status.clone();
                self.state.connection.status = self.net.disconnect(iface.as_deref(), &prev).await;
                self.state.connection.ssid = None;

                self.state.page = Page::Aps;
                self.state.reset_list();
                self.render_current().await;

                let outcome = self.net.scan(iface.as_deref()).await;
                self.state.entries = outcome.into();
                self.render_current().await;
            }
        }
    }

    async fn handle_start(&mut self) {
        if self.state.running {
            info!("start requested but the menu is already running");
            return;
        }

        info!("starting menu sequence");
        self.state.running = true;
        self.renderer.render_message(&["Project Starting"]).await;

        let Some(iface) = self.net.discover_interface().await else {
            error!("no usable wireless interface, returning to boot screen");
            self.renderer.render_message(&["ERROR:", "No USB WiFi!"]).await;
            sleep(NO_INTERFACE_HOLD).await;
            self.state.running = false;
            self.render_boot().await;
            return;
        };

        self.state.hostname = self.net.assign_hostname(&iface).await;
        self.net.reset_connections(&iface).await;
        self.state.interface = Some(iface.clone());

        self.state.page = Page::Aps;
        self.state.connection = ConnectionInfo {
            status: ConnectionOutcome::NotStarted,
            ssid: None,
        };
        self.state.reset_list();
        self.render_current().await;

        let outcome = self.net.scan(Some(&iface)).await;
        self.state.entries = outcome.into();
        self.state.connection.status = ConnectionOutcome::NotConnected;
        self.render_current().await;

        info!("menu sequence started");
    }

    async fn handle_stop(&mut self) {
        if !self.state.running {
            info!("stop requested but the menu is not running");
            self.render_boot().await;
            return;
        }

        info!("stopping menu sequence");
        self.state.running = false;

        let iface = self.state.interface.clone();
        let prev = self.state.connection.status.clone();
        self.state.connection.status = self.net.disconnect(iface.as_deref(), &prev).await;
        self.state.connection.ssid = None;

        self.renderer.render_message(&["Project Stopped."]).await;
        sleep(STOPPED_HOLD).await;
        self.render_boot().await;

        info!("menu sequence stopped");
    }

    async fn handle_shutdown(&mut self) {
        info!("shutting down");
        if self.state.running {
            self.state.running = false;
            let iface = self.state.interface.clone();
            let prev = self.state.connection.status.clone();
            self.state.connection.status = self.net.disconnect(iface.as_deref(), &prev).await;
            self.state.connection.ssid = None;
        }

        self.renderer.render_message(&["Goodbye!"]).await;
        sleep(GOODBYE_HOLD).await;
        self.renderer.clear().await;
    }

    async fn render_boot(&mut self) {
        let hint = format!("Press GPIO {} to", self.start_pin);
        self.renderer
            .render_message(&["System Ready", &hint, "start project."])
            .await;
    }

    async fn render_current(&mut self) {
        match self.state.page {
            Page::Aps => {
                let rows = self.state.entries.rows();
                let selected = self
                    .state
                    .entries
                    .selectable()
                    .then_some(self.state.selected);
                self.renderer
                    .render_ap_page(&rows, selected, self.state.scroll_offset)
                    .await;
            }
            Page::Status => {
                let connection = &self.state.connection;
                let hostname = self.state.hostname.clone();
                let status = connection.status.label().to_string();
                let ip = connection.status.ip().map(str::to_owned);
                let ssid = connection.ssid.clone();
                self.renderer
                    .render_status_page(&hostname, &status, ip.as_deref(), ssid.as_deref())
                    .await;
            }
        }
    }
}

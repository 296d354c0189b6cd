use std::sync::Arc;
use std::time::Duration;

use log::{error, warn};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use crate::config::Config;
use crate::display::{TextScreen, SCREEN_ROWS};

/// Content rows visible below the title line.
pub const VISIBLE_ROWS: usize = SCREEN_ROWS - 1;

/// Appended to a scrolling value so the wrap-around point is readable.
const SCROLL_SEPARATOR: &str = "   ";

/// How long a cancelled animator gets to acknowledge before it is aborted.
const ANIMATOR_STOP_TIMEOUT: Duration = Duration::from_millis(250);

struct Animator {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Owns the screen and every scroll animation on it. Every render is
/// stop-then-draw: all animators are cancelled and joined, the screen is
/// cleared, then the new page is drawn. No animator outlives a render call.
pub struct LineRenderer<S: TextScreen + 'static> {
    screen: Arc<Mutex<S>>,
    animators: Vec<Animator>,
    line_width: usize,
    tick: Duration,
}

impl<S: TextScreen + 'static> LineRenderer<S> {
    pub fn new(screen: Arc<Mutex<S>>, config: &Config) -> Self {
        LineRenderer {
            screen,
            animators: Vec::new(),
            line_width: config.display.line_width,
            tick: config.display.scroll_tick(),
        }
    }

    /// Fixed multi-line message (boot, starting, stopped, errors).
    pub async fn render_message(&mut self, lines: &[&str]) {
        self.reset().await;
        let mut screen = self.screen.lock().await;
        for (i, text) in lines.iter().take(SCREEN_ROWS).enumerate() {
            write_line(&mut *screen, i + 1, text, self.line_width);
        }
    }

    /// AP list page: title plus a four-row window into `rows`. Rows are
    /// truncated, never animated. `selected` is `None` for sentinel rows.
    pub async fn render_ap_page(&mut self, rows: &[String], selected: Option<usize>, offset: usize) {
        self.reset().await;
        let mut screen = self.screen.lock().await;
        write_line(&mut *screen, 1, "APs", self.line_width);

        if rows.is_empty() {
            write_line(&mut *screen, 2, "No APs found", self.line_width);
            write_line(&mut *screen, 3, "or filtered", self.line_width);
            return;
        }

        for (i, row) in rows.iter().skip(offset).take(VISIBLE_ROWS).enumerate() {
            let marker = if selected == Some(offset + i) { '>' } else { ' ' };
            write_line(
                &mut *screen,
                i + 2,
                &format!("{}{}", marker, row),
                self.line_width,
            );
        }
    }

    /// Status page: title plus labeled hostname/status/ip/ssid lines. Values
    /// too wide for the space after their label scroll on their own timers.
    pub async fn render_status_page(
        &mut self,
        hostname: &str,
        status: &str,
        ip: Option<&str>,
        ssid: Option<&str>,
    ) {
        self.reset().await;
        {
            let mut screen = self.screen.lock().await;
            write_line(&mut *screen, 1, "STATUS", self.line_width);
        }

        self.put_value(2, "H:", hostname).await;
        self.put_value(3, "S:", status).await;
        self.put_value(4, "IP:", ip.unwrap_or("-")).await;
        self.put_value(5, "AP:", ssid.unwrap_or("-")).await;
    }

    /// Stop all animation and blank the screen.
    pub async fn clear(&mut self) {
        self.reset().await;
    }

    async fn put_value(&mut self, line: usize, label: &str, value: &str) {
        let budget = self.line_width.saturating_sub(label.len());
        if value.chars().count() > budget {
            self.animate_line(line, label, value);
        } else {
            let mut screen = self.screen.lock().await;
            write_line(
                &mut *screen,
                line,
                &format!("{}{}", label, value),
                self.line_width,
            );
        }
    }

    fn animate_line(&mut self, line: usize, label: &str, value: &str) {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let screen = Arc::clone(&self.screen);
        let label = label.to_string();
        let width = self.line_width;
        let budget = width.saturating_sub(label.len());
        let tick = self.tick;
        let chars: Vec<char> = format!("{}{}", value, SCROLL_SEPARATOR).chars().collect();

        let handle = tokio::spawn(async move {
            let mut pos = 0usize;
            loop {
                let window: String = chars.iter().cycle().skip(pos).take(budget).collect();
                {
                    let mut screen = screen.lock().await;
                    write_line(&mut *screen, line, &format!("{}{}", label, window), width);
                }
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = sleep(tick) => {}
                }
                pos = (pos + 1) % chars.len();
            }
        });

        self.animators.push(Animator {
            stop: stop_tx,
            handle,
        });
    }

    async fn reset(&mut self) {
        self.stop_animators().await;
        let mut screen = self.screen.lock().await;
        if let Err(e) = screen.clear() {
            error!("display clear failed: {}", e);
        }
    }

    async fn stop_animators(&mut self) {
        for Animator { stop, handle } in self.animators.drain(..) {
            let _ = stop.send(true);
            let mut handle = handle;
            if timeout(ANIMATOR_STOP_TIMEOUT, &mut handle).await.is_err() {
                warn!("scroll animator did not stop in time, aborting it");
                handle.abort();
            }
        }
    }
}

fn write_line<S: TextScreen + ?Sized>(screen: &mut S, line: usize, text: &str, width: usize) {
    let text: String = format!("{:<width$}", text).chars().take(width).collect();
    if let Err(e) = screen.set_line(line, &text) {
        error!("display write failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::testing::MockScreen;

    fn renderer(screen: &Arc<Mutex<MockScreen>>) -> LineRenderer<MockScreen> {
        LineRenderer::new(Arc::clone(screen), &Config::default())
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_ap_page_marks_selection() {
        let screen = Arc::new(Mutex::new(MockScreen::new()));
        let mut renderer = renderer(&screen);

        let rows: Vec<String> = ["QW-Home", "QW-Guest", "QW-Lab", "QW-Attic", "QW-Shed"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        renderer.render_ap_page(&rows, Some(2), 1).await;

        let screen = screen.lock().await;
        assert_eq!(screen.lines[0].trim_end(), "APs");
        assert_eq!(screen.lines[1].trim_end(), " QW-Guest");
        assert_eq!(screen.lines[2].trim_end(), ">QW-Lab");
        assert_eq!(screen.lines[3].trim_end(), " QW-Attic");
        assert_eq!(screen.lines[4].trim_end(), " QW-Shed");
    }

    #[tokio::test]
    async fn test_ap_page_truncates_long_rows() {
        let screen = Arc::new(Mutex::new(MockScreen::new()));
        let mut renderer = renderer(&screen);

        let rows = vec!["QW-a-very-long-network-name".to_string()];
        renderer.render_ap_page(&rows, Some(0), 0).await;

        let screen = screen.lock().await;
        assert_eq!(screen.lines[1], ">QW-a-very-long-");
        assert_eq!(screen.lines[1].chars().count(), 16);
    }

    #[tokio::test]
    async fn test_status_page_static_lines() {
        let screen = Arc::new(Mutex::new(MockScreen::new()));
        let mut renderer = renderer(&screen);

        renderer
            .render_status_page("RPi0-45b9", "Connected", Some("10.0.0.5"), Some("QW-Home"))
            .await;
        settle().await;

        let screen = screen.lock().await;
        assert_eq!(screen.lines[0].trim_end(), "STATUS");
        assert_eq!(screen.lines[1].trim_end(), "H:RPi0-45b9");
        assert_eq!(screen.lines[2].trim_end(), "S:Connected");
        assert_eq!(screen.lines[3].trim_end(), "IP:10.0.0.5");
        assert_eq!(screen.lines[4].trim_end(), "AP:QW-Home");
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_value_scrolls_one_char_per_tick() {
        let screen = Arc::new(Mutex::new(MockScreen::new()));
        let mut renderer = renderer(&screen);
        let tick = Config::default().display.scroll_tick();

        // 14 chars fit after "H:"; this value does not.
        renderer
            .render_status_page("RPi0-45b9-extended", "Connected", None, None)
            .await;
        settle().await;

        assert_eq!(screen.lock().await.lines[1], "H:RPi0-45b9-exte");

        tokio::time::advance(tick).await;
        settle().await;
        assert_eq!(screen.lock().await.lines[1], "H:Pi0-45b9-exten");

        tokio::time::advance(tick).await;
        settle().await;
        assert_eq!(screen.lock().await.lines[1], "H:i0-45b9-extend");
    }

    #[tokio::test(start_paused = true)]
    async fn test_scroll_wraps_through_separator() {
        let screen = Arc::new(Mutex::new(MockScreen::new()));
        let mut renderer = renderer(&screen);
        let tick = Config::default().display.scroll_tick();

        renderer
            .render_status_page("RPi0-45b9-extended", "Connected", None, None)
            .await;
        settle().await;

        // Value is 18 chars + 3 separator = 21 positions; a full cycle comes
        // back to the initial window.
        let initial = screen.lock().await.lines[1].clone();
        for _ in 0..21 {
            tokio::time::advance(tick).await;
            settle().await;
        }
        assert_eq!(screen.lock().await.lines[1], initial);
    }

    #[tokio::test(start_paused = true)]
    async fn test_render_cancels_running_animators() {
        let screen = Arc::new(Mutex::new(MockScreen::new()));
        let mut renderer = renderer(&screen);
        let tick = Config::default().display.scroll_tick();

        renderer
            .render_status_page("RPi0-45b9-extended", "Connected", None, None)
            .await;
        settle().await;

        renderer.render_message(&["Project Stopped."]).await;
        settle().await;
        assert!(renderer.animators.is_empty());

        // A stale animator would overwrite line 2 on the next tick.
        let frozen = screen.lock().await.lines.clone();
        tokio::time::advance(tick * 3).await;
        settle().await;
        assert_eq!(screen.lock().await.lines, frozen);
    }
}

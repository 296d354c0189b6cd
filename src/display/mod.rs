pub mod scroll;

pub use scroll::LineRenderer;

use anyhow::Error;

#[cfg(feature = "pi")]
use anyhow::anyhow;
#[cfg(not(feature = "pi"))]
use log::debug;
#[cfg(feature = "pi")]
use rppal::i2c::I2c;
#[cfg(feature = "pi")]
use ssd1306::{mode::TerminalMode, prelude::*, I2CDisplayInterface, Ssd1306};

/// Rows the menu uses: title plus four content lines.
pub const SCREEN_ROWS: usize = 5;

/// Display collaborator contract. Lines are 1-based; anything beyond the
/// physical width is the renderer's problem, not the screen's.
pub trait TextScreen: Send {
    fn set_line(&mut self, line: usize, text: &str) -> Result<(), Error>;
    fn clear(&mut self) -> Result<(), Error>;
}

#[cfg(feature = "pi")]
pub struct OledScreen {
    display: Ssd1306<I2CInterface<I2c>, DisplaySize128x64, TerminalMode>,
}

#[cfg(not(feature = "pi"))]
#[allow(dead_code)]
pub struct OledScreen {
    lines: [String; SCREEN_ROWS],
}

#[cfg(feature = "pi")]
impl OledScreen {
    pub fn init() -> Result<Self, Error> {
        let i2c = I2c::new()?;
        let interface = I2CDisplayInterface::new(i2c);
        let mut display = Ssd1306::new(interface, DisplaySize128x64, DisplayRotation::Rotate0)
            .into_terminal_mode();
        display
            .init()
            .map_err(|e| anyhow!("display init failed: {:?}", e))?;
        display
            .clear()
            .map_err(|e| anyhow!("display clear failed: {:?}", e))?;
        Ok(OledScreen { display })
    }
}

#[cfg(feature = "pi")]
impl TextScreen for OledScreen {
    fn set_line(&mut self, line: usize, text: &str) -> Result<(), Error> {
        use core::fmt::Write;

        self.display
            .set_position(0, (line - 1) as u8)
            .map_err(|e| anyhow!("display seek failed: {:?}", e))?;
        self.display
            .write_str(text)
            .map_err(|_| anyhow!("display write failed"))?;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), Error> {
        self.display
            .clear()
            .map_err(|e| anyhow!("display clear failed: {:?}", e))?;
        Ok(())
    }
}

#[cfg(not(feature = "pi"))]
impl OledScreen {
    pub fn init() -> Result<Self, Error> {
        debug!("no display hardware, lines will be logged");
        Ok(OledScreen {
            lines: Default::default(),
        })
    }
}

#[cfg(not(feature = "pi"))]
impl TextScreen for OledScreen {
    fn set_line(&mut self, line: usize, text: &str) -> Result<(), Error> {
        debug!("[oled {}] {}", line, text);
        self.lines[line - 1] = text.to_string();
        Ok(())
    }

    fn clear(&mut self) -> Result<(), Error> {
        debug!("[oled] clear");
        self.lines = Default::default();
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// In-memory screen for renderer and menu tests.
    pub(crate) struct MockScreen {
        pub lines: [String; SCREEN_ROWS],
        pub clears: usize,
    }

    impl MockScreen {
        pub(crate) fn new() -> Self {
            MockScreen {
                lines: Default::default(),
                clears: 0,
            }
        }
    }

    impl TextScreen for MockScreen {
        fn set_line(&mut self, line: usize, text: &str) -> Result<(), Error> {
            self.lines[line - 1] = text.to_string();
            Ok(())
        }

        fn clear(&mut self) -> Result<(), Error> {
            self.lines = Default::default();
            self.clears += 1;
            Ok(())
        }
    }
}

pub mod config;
pub mod display;
pub mod input;
pub mod menu;
pub mod net;

pub mod prelude {
    pub use crate::{config::*, display::*, input::*, menu::*, net::*};
}

/// Hardware events delivered to the menu task. The input layer only ever
/// sends these; the menu task is the single writer of menu state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputEvent {
    /// Rotary steps accumulated since the last event, already quantized
    Rotate { delta: i32 },
    /// Rotary encoder push button
    Click,
    /// Start switch
    Start,
    /// Stop switch
    Stop,
    /// Termination signal; tear down and leave the event loop
    Shutdown,
}

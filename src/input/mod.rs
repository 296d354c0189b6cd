use anyhow::Error;
use log::info;
use tokio::sync::mpsc;

#[cfg(feature = "pi")]
use log::error;
#[cfg(feature = "pi")]
use rppal::gpio::{Gpio, InputPin, Trigger};
#[cfg(feature = "pi")]
use std::sync::{Arc, Mutex};
#[cfg(feature = "pi")]
use std::time::Duration;

use crate::config::Config;
use crate::InputEvent;

#[cfg(feature = "pi")]
const CLICK_DEBOUNCE: Duration = Duration::from_millis(100);
#[cfg(feature = "pi")]
const SWITCH_DEBOUNCE: Duration = Duration::from_millis(200);

/// Quarter steps per detent on the encoder.
#[cfg_attr(not(feature = "pi"), allow(dead_code))]
const QUARTERS_PER_DETENT: i32 = 4;

#[derive(Clone, Copy)]
#[cfg_attr(not(feature = "pi"), allow(dead_code))]
enum Channel {
    A,
    B,
}

/// Quadrature accumulator. Tracks both encoder channels and counts quarter
/// steps; a full detent is quantized into a signed delta and the remainder
/// carries over, so the menu only ever sees whole steps.
#[cfg_attr(not(feature = "pi"), allow(dead_code))]
struct EncoderState {
    a: bool,
    b: bool,
    quarters: i32,
}

#[cfg_attr(not(feature = "pi"), allow(dead_code))]
impl EncoderState {
    fn new(a: bool, b: bool) -> Self {
        EncoderState { a, b, quarters: 0 }
    }

    // Gray order 00 -> 01 -> 11 -> 10 is one rotation direction
    fn position(&self) -> i32 {
        match (self.a, self.b) {
            (false, false) => 0,
            (false, true) => 1,
            (true, true) => 2,
            (true, false) => 3,
        }
    }

    fn step(&mut self, channel: Channel, level: bool) -> Option<i32> {
        let before = self.position();
        match channel {
            Channel::A => self.a = level,
            Channel::B => self.b = level,
        }
        self.quarters += match (self.position() - before).rem_euclid(4) {
            1 => 1,
            3 => -1,
            // Bounce on the same channel or a missed transition
            _ => 0,
        };

        if self.quarters.abs() >= QUARTERS_PER_DETENT {
            let delta = self.quarters / QUARTERS_PER_DETENT;
            self.quarters -= delta * QUARTERS_PER_DETENT;
            Some(delta)
        } else {
            None
        }
    }
}

/// Turns GPIO edges into [`InputEvent`]s on the menu channel. Holds the pins
/// for as long as it lives; dropping it unhooks the interrupts.
#[cfg(feature = "pi")]
pub struct InputController {
    _encoder_a: InputPin,
    _encoder_b: InputPin,
    _encoder_button: InputPin,
    _start_switch: InputPin,
    _stop_switch: InputPin,
}

#[cfg(not(feature = "pi"))]
pub struct InputController {}

#[cfg(feature = "pi")]
impl InputController {
    pub async fn init(config: &Config, events: mpsc::Sender<InputEvent>) -> Result<Self, Error> {
        let gpio = Gpio::new()?;
        let mut encoder_a = gpio.get(config.pins.encoder_a.bcm())?.into_input_pullup();
        let mut encoder_b = gpio.get(config.pins.encoder_b.bcm())?.into_input_pullup();
        let mut encoder_button = gpio
            .get(config.pins.encoder_button.bcm())?
            .into_input_pullup();
        let mut start_switch = gpio.get(config.pins.start_switch.bcm())?.into_input_pullup();
        let mut stop_switch = gpio.get(config.pins.stop_switch.bcm())?.into_input_pullup();

        let state = Arc::new(Mutex::new(EncoderState::new(
            encoder_a.is_high(),
            encoder_b.is_high(),
        )));

        let state_a = Arc::clone(&state);
        let tx = events.clone();
        encoder_a.set_async_interrupt(Trigger::Both, None, move |event| {
            let level = matches!(event.trigger, Trigger::RisingEdge);
            if let Some(delta) = state_a.lock().unwrap().step(Channel::A, level) {
                send(&tx, InputEvent::Rotate { delta });
            }
        })?;

        let state_b = Arc::clone(&state);
        let tx = events.clone();
        encoder_b.set_async_interrupt(Trigger::Both, None, move |event| {
            let level = matches!(event.trigger, Trigger::RisingEdge);
            if let Some(delta) = state_b.lock().unwrap().step(Channel::B, level) {
                send(&tx, InputEvent::Rotate { delta });
            }
        })?;

        let tx = events.clone();
        encoder_button.set_async_interrupt(Trigger::FallingEdge, Some(CLICK_DEBOUNCE), move |_| {
            send(&tx, InputEvent::Click);
        })?;

        let tx = events.clone();
        start_switch.set_async_interrupt(Trigger::FallingEdge, Some(SWITCH_DEBOUNCE), move |_| {
            send(&tx, InputEvent::Start);
        })?;

        let tx = events;
        stop_switch.set_async_interrupt(Trigger::FallingEdge, Some(SWITCH_DEBOUNCE), move |_| {
            send(&tx, InputEvent::Stop);
        })?;

        info!("GPIO input ready");

        Ok(InputController {
            _encoder_a: encoder_a,
            _encoder_b: encoder_b,
            _encoder_button: encoder_button,
            _start_switch: start_switch,
            _stop_switch: stop_switch,
        })
    }
}

/// Interrupt callbacks run on the GPIO polling thread, outside the runtime.
#[cfg(feature = "pi")]
fn send(tx: &mpsc::Sender<InputEvent>, event: InputEvent) {
    if let Err(e) = tx.blocking_send(event) {
        error!("input event dropped: {}", e);
    }
}

#[cfg(not(feature = "pi"))]
impl InputController {
    pub async fn init(_config: &Config, _events: mpsc::Sender<InputEvent>) -> Result<Self, Error> {
        info!("GPIO support disabled, hardware input will not be delivered");
        Ok(InputController {})
    }
}

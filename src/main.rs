use std::sync::Arc;

use anyhow::Error;
use log::info;
use tokio::sync::{mpsc, Mutex};

use wifi_knob::prelude::*;
use wifi_knob::InputEvent;

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();

    // Load the config file
    println!("Starting config...");
    let config = Config::load()?;

    println!("Starting display...");
    let screen = Arc::new(Mutex::new(OledScreen::init()?));
    let renderer = LineRenderer::new(Arc::clone(&screen), &config);

    println!("Starting network controller...");
    let net = NetworkController::new(NmcliRunner, &config);

    // All input funnels through one channel; the menu task is the only
    // writer of menu state. Events arriving mid-operation queue here.
    let (event_tx, event_rx) = mpsc::channel(32);

    println!("Starting menu...");
    let menu = MenuManager::new(net, renderer, &config);
    let menu_handle = tokio::spawn(menu.run(event_rx));

    println!("Starting GPIO...");
    let _input = InputController::init(&config, event_tx.clone()).await?;

    println!("Running. Press Ctrl-C to exit.");
    tokio::signal::ctrl_c().await?;

    info!("termination signal received");
    event_tx.send(InputEvent::Shutdown).await?;
    menu_handle.await?;

    Ok(())
}

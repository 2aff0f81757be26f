use std::error::Error;
use std::time::Duration;

use minible::{ChannelSink, Config, Manager, PeripheralEvent};
use tracing::info;
use tracing::metadata::LevelFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{fmt, EnvFilter};

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let manager = Manager::init(Config::default());
    info!("authorization: {:?}", manager.authorization_status());

    let (sink, mut events) = ChannelSink::new();
    manager.set_callbacks(sink);

    info!("starting scan");
    manager.scan(None);
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_secs(2), events.next_event()).await {
        if let PeripheralEvent::Discovered(peripheral) = event {
            info!(
                "{} [{}] {}dBm {:?}",
                peripheral,
                peripheral.address(),
                peripheral.rssi(),
                peripheral.manufacturer_data()
            );
        }
    }
    manager.stop_scan();
    info!("scan stopped, {} peripherals registered", manager.len());

    manager.shutdown();
    Ok(())
}

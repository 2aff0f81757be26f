use std::error::Error;

use minible::{Config, Manager};
use tracing::info;
use tracing::metadata::LevelFilter;

fn main() -> Result<(), Box<dyn Error>> {
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
    manager.scan(None);

    // the simulated backend answers every request before returning
    for peripheral in manager.peripherals() {
        manager.connect(&peripheral);
        manager.get_services(&peripheral);
        info!("{}", peripheral);

        for service in peripheral.services().unwrap_or_default() {
            manager.get_characteristics(&peripheral, &service);
            info!("  service {:?}", service.uuid());
            for characteristic in service.characteristics().unwrap_or_default() {
                info!("    characteristic {:?}: {:?}", characteristic.uuid(), characteristic.properties());
                if characteristic.properties().is_notifiable() {
                    manager.set_notify(&peripheral, &characteristic);
                }
            }
        }

        manager.disconnect(&peripheral);
    }

    manager.shutdown();
    Ok(())
}

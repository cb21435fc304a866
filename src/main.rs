#[macro_use]
extern crate log;
extern crate log4rs;

extern crate log_panics;

extern crate tokio;
use tokio::net::TcpListener;

extern crate rust_ofp_core;
use rust_ofp_core::apps::StatsPolling;
use rust_ofp_core::config::ControllerConfig;
use rust_ofp_core::ofp_controller::DeviceController;

use std::path::Path;
use std::process;
use std::sync::Arc;

fn load_config() -> ControllerConfig {
    match std::env::args().nth(1) {
        Some(path) => match ControllerConfig::from_file(Path::new(&path)) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{}: {}", path, e);
                process::exit(1);
            }
        },
        None => ControllerConfig::default(),
    }
}

#[tokio::main]
async fn main() {
    let config = load_config();
    if let Err(e) = log4rs::init_file(&config.log_config, Default::default()) {
        eprintln!("Cannot initialise logging from {}: {}", config.log_config, e);
        process::exit(1);
    }
    log_panics::init();
    info!("rust_ofp_core starting");

    let listener = match TcpListener::bind(&config.listen_address).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Cannot listen on {}: {}", config.listen_address, e);
            process::exit(1);
        }
    };
    info!("OF controller running on {}", config.listen_address);

    let controller = Arc::new(DeviceController::new(config));
    controller.register_app(Box::new(StatsPolling::new(controller.clone())));
    tokio::spawn(controller.clone().run());
    controller.start();

    loop {
        match listener.accept().await {
            Ok((socket, addr)) => {
                info!("Accepted connection from {}", addr);
                if let Err(e) = socket.set_nodelay(true) {
                    warn!("Cannot disable Nagle on {}: {}", addr, e);
                }
                controller.register_device(socket);
            },
            Err(e) => error!("accept error = {:?}", e),
        }
    }
}

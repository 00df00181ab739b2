use std::io;
use std::sync::Arc;

use clap::Parser;
use simple_factors::{FactorLog, FactorService, ServerConfig, TcpServer};

fn main() -> io::Result<()> {
    env_logger::init();
    let config = ServerConfig::parse();

    let log = Arc::new(FactorLog::new(&config.log_file_name));
    println!("Logging to {}", log.path().display());

    let server = FactorService::new(log).start(config.listen_addr())?;
    println!("Server listening on {}", server.local_addr());

    // runs until the process is killed
    if server.join().is_err() {
        log::error!("server coroutine panicked");
    }
    Ok(())
}

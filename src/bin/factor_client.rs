use std::io;

use clap::Parser;
use simple_factors::{random_target, ClientConfig, Driver, FactorerClient};

fn main() -> io::Result<()> {
    env_logger::init();
    let config = ClientConfig::parse();

    // failed calls, including an unreachable server, are reported per call
    let mut client = FactorerClient::lazy(config.target.clone());
    if let Some(timeout) = config.timeout() {
        client.set_timeout(timeout);
    }

    let mut driver = Driver::new(client, &config, io::stdout().lock());
    driver.run(random_target)?;
    Ok(())
}

use clap::Parser;
use respkv::config::Config;
use respkv::{server, Error};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::parse();

    server::run(config).await
}

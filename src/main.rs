use std::{path::Path, str::FromStr, sync::Arc};

use anyhow::Result;
use ferry::{
    config::load_config,
    online::SessionService,
    server::{self, Context},
    world::Limbo,
};
use log::{info, LevelFilter};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config(Path::new("config.toml"))?;

    let level = LevelFilter::from_str(&config.log_level).unwrap_or(LevelFilter::Info);
    simple_logger::SimpleLogger::new().with_level(level).init()?;

    let listener = TcpListener::bind(config.address).await?;

    match &config.proxy {
        Some(proxy) => info!("Relaying to {} ({} servers)", proxy.default, proxy.servers.len()),
        None => info!("Serving limbo, auth {:?}", config.auth),
    }

    let world = Arc::new(Limbo::new(config.max_players));
    let context = Context::new(config, Arc::new(SessionService::new()?), world)?;

    server::serve(listener, context).await
}

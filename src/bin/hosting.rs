//! Hosting server binary.
//!
//! Runs the HTTP server that upgrades websocket sessions into live rooms.

use garland::hosting::Server;
use garland::settings::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    garland::init();
    Server::run(Settings::from_env()).await
}

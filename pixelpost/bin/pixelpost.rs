//! The pixelpost daemon
//!
//! Reads its configuration (see `pixelpost.config.ron`) and runs the queue,
//! scheduler, control socket and HTTP gateway until SIGINT or SIGTERM.

use pixelpost::controller::Pixelpost;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    Pixelpost::load()?.run().await
}

mod api;
mod app;
mod cache;
mod cleanup;
mod core;
mod error;
mod expiry;
mod fanout;
mod log_client;
mod metrics;
mod session;
mod subscription;

use app::FabricApp;

#[tokio::main]
async fn main() {
    if let Err(e) = FabricApp::run().await {
        eprintln!("\nError: {}\n", e);
        std::process::exit(1);
    }
}

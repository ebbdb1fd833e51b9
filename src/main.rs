/// Entry point for the autoexporter daemon.
///
/// This binary watches the local Docker daemon and starts a Prometheus exporter sidecar for
/// every container it recognizes, serving the resulting scrape targets over HTTP.
///
/// # Errors
///
/// Returns an error if initialization fails (e.g., invalid environment variables, an
/// unreachable Docker daemon) or if the Docker event stream fails.
///
/// # Examples
///
/// ```bash
/// RUST_LOG=autoexporter=debug AUTOEXPORTER_NETWORK=monitoring cargo run
/// ```
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    autoexporter::run().await
}

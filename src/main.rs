#[tokio::main]
async fn main() -> std::io::Result<()> {
    dmap_server::run_with_config().await
}

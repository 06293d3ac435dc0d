use keymarket_returns::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    server::run().await
}

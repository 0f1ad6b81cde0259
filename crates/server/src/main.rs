#[tokio::main]
async fn main() -> anyhow::Result<()> {
    waitlist_server::run().await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dashboard::start_server().await
}

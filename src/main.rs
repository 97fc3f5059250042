#[tokio::main]
async fn main() -> anyhow::Result<()> {
    xfercheck_lib::run().await
}

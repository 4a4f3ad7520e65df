#[tokio::main]
async fn main() -> anyhow::Result<()> {
    terravault::cli::run_cli().await
}

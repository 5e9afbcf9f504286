#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = lms_testing::run().await {
        eprintln!("lms-testing fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

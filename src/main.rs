#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = proctored_exams::run().await {
        eprintln!("proctored-exams fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = proctored_exams::run_worker().await {
        eprintln!("proctored-exams-worker fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

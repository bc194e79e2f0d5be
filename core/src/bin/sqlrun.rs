#[tokio::main]
async fn main() {
    if let Err(e) = sqlrun_core::cli::run_cli().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

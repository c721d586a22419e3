#[tokio::main]
async fn main() {
    if let Err(e) = hawkeye_lib::run().await {
        eprintln!("Hawk-Eye failed to start: {}", e);
        std::process::exit(1);
    }
}

#[tokio::main]
async fn main() {
    abqeri_server::start_server().await;
}

use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = visualfoundry_server::Cli::parse();
    if let Err(err) = visualfoundry_server::run(cli).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

use clap::Parser;

use tabd::cli::Cli;
use tabd::controller::Controller;
use tabd::logging;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let config = cli.apply(tabd_core::DaemonConfig::from_env());
    let controller = Controller::new(config);

    if let Err(err) = controller.run().await {
        tracing::error!(target = "tabd.main", error = %err, "daemon exited with an error");
        std::process::exit(1);
    }
}

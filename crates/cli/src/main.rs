// CLI modules
mod cli;
mod logging;

use clap::{Parser, Subcommand};
use cli::{args::Args, op::Op, Check, Cluster, Version};

command_enum! {
    (Check, Check),
    (Cluster, Cluster),
    (Version, Version),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let guards = logging::init(args.log_level, args.log_dir.as_deref());

    let ctx = cli::op::OpContext::new(
        args.config,
        args.timeout,
        args.push_metrics.then_some(args.push_gateway),
    );

    let code = match args.command.execute(&ctx).await {
        Ok(output) => {
            println!("{}", output);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    };

    // flush buffered log lines before exiting
    drop(guards);
    std::process::exit(code);
}

pub use clap::Parser;

use std::path::PathBuf;

use url::Url;

#[derive(Parser, Debug)]
#[command(name = "swarmkeeper")]
#[command(about = "Provision, scale and verify Swarm storage clusters")]
#[command(version)]
pub struct Args {
    /// Cluster configuration file
    #[arg(long, global = true, default_value = "config.toml")]
    pub config: PathBuf,

    /// Abort the whole run after this many seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    #[arg(long, global = true, default_value = "http://localhost:9091")]
    pub push_gateway: Url,

    /// Push check metrics to the gateway
    #[arg(long, global = true)]
    pub push_metrics: bool,

    #[arg(long, global = true, default_value = "info")]
    pub log_level: tracing::Level,

    /// Directory for log files (logs to stdout only if not set)
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::ops::check::CheckCommand;
    use crate::cli::ops::cluster::ClusterCommand;
    use crate::Command;

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::try_parse_from([
            "swarmkeeper",
            "check",
            "retrieval",
            "--upload-node-count",
            "2",
            "--seed=-7",
            "--push-metrics",
            "--timeout",
            "30",
        ])
        .unwrap();
        assert!(args.push_metrics);
        assert_eq!(args.timeout, Some(30));
        assert_eq!(args.config, PathBuf::from("config.toml"));
        match args.command {
            Command::Check(check) => match check.command {
                CheckCommand::Retrieval(retrieval) => {
                    assert_eq!(retrieval.upload_node_count, 2);
                    assert_eq!(retrieval.chunks_per_node, 1);
                    assert_eq!(retrieval.seed, Some(-7));
                }
                other => panic!("unexpected command: {other:?}"),
            },
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_file_size_in_megabytes() {
        let args = Args::try_parse_from([
            "swarmkeeper",
            "check",
            "file-retrieval",
            "--file-size",
            "0.5",
            "--full",
        ])
        .unwrap();
        match args.command {
            Command::Check(check) => match check.command {
                CheckCommand::FileRetrieval(files) => {
                    assert!(files.full);
                    assert_eq!(files.options().file_size, 512 * 1024);
                }
                other => panic!("unexpected command: {other:?}"),
            },
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cluster_setup_start_flag() {
        let args = Args::try_parse_from([
            "swarmkeeper",
            "--config",
            "cluster.toml",
            "cluster",
            "setup",
            "--start",
        ])
        .unwrap();
        assert_eq!(args.config, PathBuf::from("cluster.toml"));
        match args.command {
            Command::Cluster(cluster) => match cluster.command {
                ClusterCommand::Setup(setup) => assert!(setup.start),
                other => panic!("unexpected command: {other:?}"),
            },
            other => panic!("unexpected command: {other:?}"),
        }
    }
}

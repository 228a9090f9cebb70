use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "tally-node", version, about = "Order node of a quorum-voting cluster")]
pub struct Args {
    /// JSON config file.
    #[arg(long = "config", env = "TALLY_CONFIG", default_value = "config.json")]
    pub config_path: String,

    /// Overrides `node_id` from the config (NODE_ID is applied first).
    #[arg(long)]
    pub node_id: Option<String>,

    /// Overrides `listen_addr`, e.g. `0.0.0.0:8002`.
    #[arg(long = "listen")]
    pub listen_addr: Option<String>,

    /// Writes a default three-node config to `--config` and exits.
    #[arg(long)]
    pub init: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let args = Args::parse_from(["tally-node", "--config", "n2.json", "--node-id", "order-node-2", "--init"]);
        assert_eq!(args.config_path, "n2.json");
        assert_eq!(args.node_id.as_deref(), Some("order-node-2"));
        assert!(args.init);
        assert!(args.listen_addr.is_none());
    }
}

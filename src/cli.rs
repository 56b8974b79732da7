//! Command-line surface for the standalone `fm-bridge` process. This is
//! process-launch configuration only — the MCP tool calls made by a host
//! never go through `clap`.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "fm-bridge", version, about = "Read-only OData bridge for FileMaker, exposed over MCP")]
pub struct Cli {
    /// Path to a JSON config file layered under defaults and env vars.
    #[arg(long, env = "FM_BRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "FM_BRIDGE_LOG")]
    pub log_level: Option<String>,

    /// Tenant to connect on startup; falls back to the credential
    /// provider's default when omitted.
    #[arg(long, env = "FM_TENANT")]
    pub tenant: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_no_args() {
        let cli = Cli::parse_from(["fm-bridge"]);
        assert!(cli.tenant.is_none());
    }

    #[test]
    fn parses_tenant_flag() {
        let cli = Cli::parse_from(["fm-bridge", "--tenant", "ACME"]);
        assert_eq!(cli.tenant.as_deref(), Some("ACME"));
    }
}

//! ipcloudy - which cloud does an IP address live in?
//!
//! This is the command-line interface for the ipcloudy library.

use anyhow::Result;
use clap::Parser;
use ipcloudy::{IpCloudy, IpCloudyConfig};

/// Command-line arguments for the attribution tool.
#[derive(Parser, Debug)]
#[clap(author, version, about = "Attribute an IP address to a cloud provider", long_about = None)]
struct Args {
    /// IP address to attribute; your own public address when omitted
    ip: Option<String>,

    /// Enable the WHOIS organization fallback for unmatched addresses
    #[clap(short, long)]
    whois: bool,

    /// Refresh the provider ranges even when the local cache is fresh
    #[clap(long)]
    refresh: bool,

    /// Do not persist the range cache to disk
    #[clap(long)]
    no_persist: bool,

    /// Print the result as JSON
    #[clap(long)]
    json: bool,

    /// Increase logging verbosity (-v info, -vv debug, -vvv trace)
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    stderrlog::new()
        .verbosity(usize::from(args.verbose) + 1)
        .timestamp(stderrlog::Timestamp::Off)
        .init()?;

    let config = IpCloudyConfig::builder()
        .whois_fallback(args.whois)
        .persist(!args.no_persist)
        .build();
    if let Err(message) = config.validate() {
        anyhow::bail!("invalid configuration: {message}");
    }

    let mut engine = IpCloudy::new(config);
    engine.init(args.refresh).await;

    let attribution = match &args.ip {
        Some(ip) => engine.check(ip).await,
        None => engine.check_own().await?,
    };

    engine.shutdown();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&attribution)?);
    } else {
        match (&attribution.provider, &attribution.organization) {
            (Some(provider), _) => println!("{provider}"),
            (None, Some(organization)) => println!("whois: {organization}"),
            (None, None) => println!("unknown"),
        }
    }

    Ok(())
}

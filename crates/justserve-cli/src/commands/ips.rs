//! Ips command implementation.

use anyhow::Result;

use justserve_core::net;

use super::IpsArgs;

/// Run the ips command.
pub fn run(args: &IpsArgs) -> Result<()> {
    let ips = net::local_ips();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&ips)?);
    } else if ips.is_empty() {
        println!("No LAN addresses found.");
    } else {
        for ip in ips {
            println!("{ip}");
        }
    }
    Ok(())
}

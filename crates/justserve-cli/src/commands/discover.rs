//! Discover command implementation.

use anyhow::Result;

use justserve_core::p2p::discovery::Advertisement;

use super::DiscoverArgs;

/// Run the discover command.
pub async fn run(args: DiscoverArgs) -> Result<()> {
    let app = super::build_app();
    let window = args
        .timeout
        .unwrap_or_else(|| app.config().p2p.discovery_timeout.as_secs());

    if !args.json {
        println!();
        println!("Listening for transfers ({window}s)...");
        println!();
    }

    let peers = app
        .discover_p2p_peers(window)
        .await
        .inspect_err(super::show_suggestion)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&peers)?);
    } else {
        display_peers(&peers);
    }
    Ok(())
}

/// Display peers as a text table.
fn display_peers(peers: &[Advertisement]) {
    if peers.is_empty() {
        println!("  No transfers found.");
        println!();
        return;
    }

    println!("  {:8}  {}", "Code", "URL");
    println!("{}", "─".repeat(48));
    for peer in peers {
        println!("  {:8}  {}", peer.code, peer.url);
    }
    println!();
    println!("  Use 'justserve connect <url>' to see what a peer offers.");
}

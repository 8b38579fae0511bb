//! Connect command implementation.

use anyhow::Result;

use justserve_core::server::pages::format_transfer_size;

use super::ConnectArgs;

/// Run the connect command.
pub async fn run(args: ConnectArgs) -> Result<()> {
    let app = super::build_app();
    let info = app
        .connect_to_p2p_peer(&args.address)
        .await
        .inspect_err(super::show_suggestion)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    let is_dir = info["isDir"].as_bool().unwrap_or(false);
    println!();
    println!("  Name:  {}", info["fileName"].as_str().unwrap_or_default());
    println!(
        "  Size:  {}",
        format_transfer_size(info["fileSize"].as_u64().unwrap_or(0))
    );
    println!("  Type:  {}", if is_dir { "Folder (ZIP)" } else { "File" });
    println!("  Code:  {}", info["code"].as_str().unwrap_or_default());
    println!();
    println!("  Download: {}/p2p/download", base_url(&args.address));
    println!();
    Ok(())
}

fn base_url(address: &str) -> String {
    let trimmed = address.trim().trim_end_matches('/');
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

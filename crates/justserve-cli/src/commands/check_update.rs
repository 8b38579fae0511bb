//! Check-update command implementation.

use anyhow::Result;

use super::CheckUpdateArgs;

/// Run the check-update command.
pub async fn run(args: CheckUpdateArgs) -> Result<()> {
    let app = super::build_app();
    let info = app
        .check_update()
        .await
        .inspect_err(super::show_suggestion)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    if !info.available {
        println!("Already on the latest version ({})", app.version());
        return Ok(());
    }

    println!();
    println!("  Update available");
    println!("  Current: {}", app.version());
    println!("  Latest:  {}", info.version);
    if !info.download_url.is_empty() {
        println!("  Download: {}", info.download_url);
    }
    if !info.body.trim().is_empty() {
        println!();
        for line in info.body.lines().take(20) {
            println!("  {line}");
        }
    }
    println!();
    Ok(())
}

//! Proxy command implementation.

use anyhow::Result;

use super::ProxyArgs;
use crate::ui::CodeBox;

/// Run the proxy command.
pub async fn run(args: ProxyArgs) -> Result<()> {
    let app = super::build_app();

    let url = app
        .start_proxy(
            args.token.as_deref().unwrap_or_default(),
            &args.port,
            args.protocol.as_str(),
        )
        .await
        .inspect_err(super::show_suggestion)?;

    println!();
    println!("  Forwarding local port {}", args.port.trim_start_matches(':'));
    println!();
    CodeBox::new(&url).display();
    println!();
    println!("  Press Ctrl-C to stop");

    super::wait_for_ctrl_c().await?;
    app.shutdown().await;
    Ok(())
}

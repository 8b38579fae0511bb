//! Public command implementation.

use anyhow::Result;

use super::PublicArgs;
use crate::ui::CodeBox;

/// Run the public command.
pub async fn run(args: PublicArgs) -> Result<()> {
    let app = super::build_app();

    println!();
    println!("  Starting {} ...", app.config().tunnel.agent);

    let url = app
        .start_public_server(
            &args.path,
            &args.token,
            args.password.as_deref().unwrap_or_default(),
            args.upload,
        )
        .await
        .inspect_err(super::show_suggestion)?;

    println!();
    println!("  Serving {} publicly", args.path.display());
    println!();
    CodeBox::new(&url).with_qr(args.qr).display();
    println!();
    println!("  Press Ctrl-C to stop");

    super::wait_for_ctrl_c().await?;
    app.shutdown().await;
    println!();
    println!("  Tunnel closed.");
    Ok(())
}

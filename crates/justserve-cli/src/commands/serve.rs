//! Serve command implementation.

use anyhow::Result;

use super::ServeArgs;
use crate::ui::CodeBox;

/// Run the serve command.
pub async fn run(args: ServeArgs) -> Result<()> {
    let app = super::build_app();

    let url = app
        .start_local_server(
            &args.path,
            args.port.as_deref().unwrap_or_default(),
            args.password.as_deref().unwrap_or_default(),
            args.upload,
        )
        .await
        .inspect_err(super::show_suggestion)?;

    println!();
    println!("  Serving {}", args.path.display());
    println!();
    CodeBox::new(&url).with_qr(args.qr).display();
    println!();

    let port = url.rsplit(':').next().unwrap_or_default();
    let others: Vec<String> = app
        .local_ips()
        .into_iter()
        .map(|ip| format!("http://{ip}:{port}"))
        .filter(|other| *other != url)
        .collect();
    if !others.is_empty() {
        println!("  Also reachable at:");
        for other in others {
            println!("    {other}");
        }
        println!();
    }
    if args.password.as_deref().is_some_and(|p| !p.is_empty()) {
        println!("  Password protected (any username)");
    }
    if args.upload {
        println!("  Uploads enabled");
    }
    println!("  Press Ctrl-C to stop");

    super::wait_for_ctrl_c().await?;
    app.shutdown().await;
    println!();
    println!("  Stopped.");
    Ok(())
}

//! Send command implementation.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};

use justserve_core::app::App;
use justserve_core::notify::{ChannelNotifier, Event};
use justserve_core::p2p::{TransferSession, TransferStatus};
use justserve_core::server::pages::format_transfer_size;

use super::SendArgs;
use crate::ui::{format_progress, CodeBox};

/// Run the send command.
pub async fn run(args: SendArgs) -> Result<()> {
    let (notifier, mut events) = ChannelNotifier::new();
    let app = App::new(super::load_config(), Arc::new(notifier));

    let session = app
        .start_p2p_send(&args.path)
        .await
        .inspect_err(super::show_suggestion)?;

    if args.json {
        print_json("p2p-status", &session)?;
    } else {
        display_session(&session, args.qr);
    }

    let completed = loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl-C")?;
                break false;
            }
            event = events.recv() => {
                let Some(event) = event else { break false };
                if args.json {
                    println!("{}", serde_json::json!({
                        "event": event.name(),
                        "payload": event.payload(),
                    }));
                    if matches!(&event, Event::P2pStatus(s) if s.status == TransferStatus::Completed) {
                        break true;
                    }
                    continue;
                }
                match event {
                    Event::P2pProgress(s) => {
                        print!("\r  {:<40}", format_progress(s.bytes_transferred, s.file_size));
                        io::stdout().flush().ok();
                    }
                    Event::P2pStatus(s) => match s.status {
                        TransferStatus::Transferring => println!("  Receiver connected"),
                        TransferStatus::Completed => break true,
                        TransferStatus::Waiting | TransferStatus::Error => {}
                    },
                    Event::P2pError(msg) => {
                        println!();
                        eprintln!("  Transfer failed: {msg}");
                        eprintln!("  Still waiting, the receiver can retry");
                    }
                    Event::ServerError(msg) => eprintln!("  Server error: {msg}"),
                }
            }
        }
    };

    app.shutdown().await;
    if !args.json {
        println!();
        if completed {
            println!("  Transfer complete!");
        } else {
            println!("  Session stopped.");
        }
    }
    Ok(())
}

fn display_session(session: &TransferSession, qr: bool) {
    let kind = if session.is_dir { "folder" } else { "file" };
    println!();
    println!(
        "  Sending {} {} ({})",
        kind,
        session.file_name,
        format_transfer_size(session.file_size)
    );
    println!();
    CodeBox::new(&session.url)
        .with_code(&session.code)
        .with_qr(qr)
        .display();
    println!();
    println!("  Waiting for a receiver. Press Ctrl-C to stop");
}

fn print_json(event: &str, session: &TransferSession) -> Result<()> {
    let line = serde_json::json!({
        "event": event,
        "payload": serde_json::to_value(session)?,
    });
    println!("{line}");
    Ok(())
}

//! UI utilities for JustServe CLI.

use qrcode::render::unicode;
use qrcode::{EcLevel, QrCode};

use justserve_core::server::pages::format_transfer_size;

const BOX_WIDTH: usize = 33;

/// A formatted box announcing where something is reachable.
pub struct CodeBox<'a> {
    url: &'a str,
    code: Option<&'a str>,
    show_qr: bool,
}

impl<'a> CodeBox<'a> {
    /// Create a new box for `url`.
    #[must_use]
    pub const fn new(url: &'a str) -> Self {
        Self {
            url,
            code: None,
            show_qr: false,
        }
    }

    /// Add a transfer code to the box.
    #[must_use]
    pub const fn with_code(mut self, code: &'a str) -> Self {
        self.code = Some(code);
        self
    }

    /// Print a QR code of the URL below the box.
    #[must_use]
    pub const fn with_qr(mut self, show: bool) -> Self {
        self.show_qr = show;
        self
    }

    /// Display the box to stdout.
    pub fn display(&self) {
        for line in self.lines() {
            println!("{line}");
        }

        if self.show_qr {
            match render_qr(self.url) {
                Ok(qr) => {
                    println!();
                    for line in qr.lines() {
                        println!("  {line}");
                    }
                }
                Err(e) => tracing::warn!("Could not render QR code: {e}"),
            }
        }
    }

    fn lines(&self) -> Vec<String> {
        let mut content = Vec::new();
        if let Some(code) = self.code {
            content.push(format!("Code:  {}", format_code_spaced(code)));
        }
        content.push(self.url.to_string());

        let width = content
            .iter()
            .map(|line| line.chars().count() + 4)
            .max()
            .unwrap_or(0)
            .max(BOX_WIDTH);

        let mut lines = vec![
            format!("  ┌{}┐", "─".repeat(width)),
            format!("  │{}│", " ".repeat(width)),
        ];
        for line in &content {
            lines.push(format!("  │{}│", center_in_box(line, width)));
            lines.push(format!("  │{}│", " ".repeat(width)));
        }
        lines.push(format!("  └{}┘", "─".repeat(width)));
        lines
    }
}

fn format_code_spaced(code: &str) -> String {
    code.chars()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn center_in_box(content: &str, width: usize) -> String {
    let content_len = content.chars().count();
    let padding = width.saturating_sub(content_len);
    let left = padding / 2;
    let right = padding - left;
    format!("{}{}{}", " ".repeat(left), content, " ".repeat(right))
}

/// Render `data` as a terminal QR code using half-height blocks.
pub fn render_qr(data: &str) -> Result<String, qrcode::types::QrError> {
    let code = QrCode::with_error_correction_level(data, EcLevel::M)?;
    Ok(code
        .render::<unicode::Dense1x2>()
        .dark_color(unicode::Dense1x2::Light)
        .light_color(unicode::Dense1x2::Dark)
        .build())
}

/// One-line progress label, e.g. `1.50 MB / 3.00 MB (50%)`.
///
/// Folder downloads are ZIP streams whose final size is unknown, so the
/// percentage is capped at 100 and dropped when `total` is zero.
pub fn format_progress(done: u64, total: u64) -> String {
    if total == 0 {
        return format_transfer_size(done);
    }
    let percent = (done.saturating_mul(100) / total).min(100);
    format!(
        "{} / {} ({}%)",
        format_transfer_size(done),
        format_transfer_size(total),
        percent
    )
}

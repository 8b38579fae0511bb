//! HTML rendering for listings and landing pages.
//!
//! Every renderer here is a pure function from data to markup. Templates
//! are embedded at compile time and filled with already-escaped values in a
//! single left-to-right pass.

use std::borrow::Cow;
use std::io;
use std::path::Path;

use rust_embed::RustEmbed;

use super::paths::{encode_href, encode_path};

/// Embedded page templates.
#[derive(RustEmbed)]
#[folder = "src/server/assets/"]
#[include = "*.html"]
#[include = "*.css"]
struct Assets;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * 1024 * 1024;

/// Category icon shown next to a listing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Icon {
    /// The synthetic ".." entry
    Parent,
    /// A directory
    Folder,
    /// Raster or vector images
    Image,
    /// Video files
    Video,
    /// Audio files
    Audio,
    /// PDF documents
    Pdf,
    /// Compressed archives
    Archive,
    /// Installers, binaries and scripts
    Executable,
    /// Plain text
    Text,
    /// Source code and markup
    Code,
    /// Anything else
    File,
}

impl Icon {
    /// Emoji rendered for this category.
    pub const fn glyph(self) -> &'static str {
        match self {
            Self::Parent => "↩️",
            Self::Folder => "📁",
            Self::Image => "🖼️",
            Self::Video => "🎬",
            Self::Audio => "🎵",
            Self::Pdf => "📕",
            Self::Archive => "📦",
            Self::Executable => "💿",
            Self::Text => "📝",
            Self::Code => "💻",
            Self::File => "📄",
        }
    }
}

/// Pick the icon for an entry from its extension.
pub fn icon_for(name: &str, is_dir: bool) -> Icon {
    if is_dir {
        return Icon::Folder;
    }

    let ext = Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "jpg" | "jpeg" | "png" | "gif" | "bmp" | "svg" | "webp" | "ico" => Icon::Image,
        "mp4" | "mkv" | "avi" | "mov" | "wmv" | "flv" | "webm" => Icon::Video,
        "mp3" | "wav" | "ogg" | "flac" | "aac" | "m4a" => Icon::Audio,
        "pdf" => Icon::Pdf,
        "zip" | "rar" | "7z" | "tar" | "gz" | "bz2" | "xz" => Icon::Archive,
        "exe" | "msi" | "bat" | "sh" | "app" | "dmg" | "deb" | "rpm" => Icon::Executable,
        "txt" | "md" | "log" | "csv" | "ini" | "cfg" => Icon::Text,
        "go" | "js" | "ts" | "py" | "java" | "c" | "cpp" | "h" | "rs" | "html" | "css"
        | "json" | "xml" | "yaml" | "yml" | "toml" => Icon::Code,
        _ => Icon::File,
    }
}

/// One row of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// File name, not escaped
    pub name: String,
    /// Whether the entry is a directory
    pub is_dir: bool,
    /// Human-readable size, `-` for directories
    pub size_label: String,
    /// Category icon
    pub icon: Icon,
}

impl FileEntry {
    /// Rendering group: parent link, then directories, then files.
    pub fn sort_group(&self) -> u8 {
        match (self.icon, self.is_dir) {
            (Icon::Parent, _) => 0,
            (_, true) => 1,
            (_, false) => 2,
        }
    }

    fn parent() -> Self {
        Self {
            name: "..".to_string(),
            is_dir: true,
            size_label: "-".to_string(),
            icon: Icon::Parent,
        }
    }
}

/// Size label used by listings and the single-file page.
///
/// Two decimals of KB below 1 MiB, MB from there on.
pub fn format_size(bytes: u64) -> String {
    if bytes < MIB {
        format!("{:.2} KB", bytes as f64 / KIB as f64)
    } else {
        format!("{:.2} MB", bytes as f64 / MIB as f64)
    }
}

/// Size label used by the P2P landing page.
pub fn format_transfer_size(bytes: u64) -> String {
    if bytes > GIB {
        format!("{:.2} GB", bytes as f64 / GIB as f64)
    } else {
        format_size(bytes)
    }
}

/// Read `dir` into listing rows: directories first, then files, each in
/// byte-wise (case-sensitive) name order.
pub fn list_entries(dir: &Path) -> io::Result<Vec<FileEntry>> {
    let mut entries = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let metadata = entry.metadata();
        let is_dir = metadata.as_ref().is_ok_and(std::fs::Metadata::is_dir);

        let size_label = match &metadata {
            Ok(m) if !is_dir => format_size(m.len()),
            _ => "-".to_string(),
        };

        let icon = match metadata {
            Ok(_) => icon_for(&name, is_dir),
            Err(_) => Icon::File,
        };

        entries.push(FileEntry {
            name,
            is_dir,
            size_label,
            icon,
        });
    }

    entries.sort_by(|a, b| {
        a.sort_group()
            .cmp(&b.sort_group())
            .then_with(|| a.name.cmp(&b.name))
    });
    Ok(entries)
}

/// Render a directory listing for `request_path`.
///
/// A ".." row is prepended unless `request_path` is the served root.
pub fn render_listing(request_path: &str, entries: &[FileEntry], allow_upload: bool) -> String {
    let at_root = request_path == "/";
    let parent = (!at_root).then(FileEntry::parent);

    let rows: String = parent
        .iter()
        .chain(entries)
        .map(render_row)
        .collect::<Vec<_>>()
        .join("\n");

    let path = escape_html(request_path);
    let upload = if allow_upload {
        let action = escape_html(&encode_path(request_path));
        format!(
            r#"        <form class="upload" method="POST" action="{action}" enctype="multipart/form-data">
            <input type="file" name="file" required>
            <button class="btn" type="submit">Upload</button>
        </form>"#
        )
    } else {
        String::new()
    };

    fill(
        &template("listing.html"),
        &[
            ("path", &path),
            ("rows", &rows),
            ("upload", &upload),
            ("style", &style()),
        ],
    )
}

fn render_row(entry: &FileEntry) -> String {
    let mut href = encode_href(&entry.name);
    if entry.is_dir {
        href.push('/');
    }

    format!(
        r#"            <li class="entry"><a href="{href}"><span class="icon">{icon}</span><span class="name">{name}</span><span class="size">{size}</span></a></li>"#,
        href = escape_html(&href),
        icon = entry.icon.glyph(),
        name = escape_html(&entry.name),
        size = escape_html(&entry.size_label),
    )
}

/// Render the landing page of a single-file server.
pub fn render_file_page(name: &str, size: u64) -> String {
    fill(
        &template("file.html"),
        &[
            ("name", &escape_html(name)),
            ("href", &escape_html(&encode_href(name))),
            ("size", &format_size(size)),
            ("icon", icon_for(name, false).glyph()),
            ("style", &style()),
        ],
    )
}

/// Render the browser landing page of a P2P session.
pub fn render_transfer_page(name: &str, size: u64, is_dir: bool, code: &str) -> String {
    let (kind, icon) = if is_dir {
        ("Folder (ZIP)", Icon::Folder)
    } else {
        ("File", Icon::File)
    };

    fill(
        &template("transfer.html"),
        &[
            ("name", &escape_html(name)),
            ("size", &format_transfer_size(size)),
            ("kind", kind),
            ("icon", icon.glyph()),
            ("code", &escape_html(code)),
            ("style", &style()),
        ],
    )
}

/// Escape text for use inside HTML element content or quoted attributes.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn template(name: &str) -> Cow<'static, str> {
    match Assets::get(name) {
        Some(file) => match file.data {
            Cow::Borrowed(bytes) => String::from_utf8_lossy(bytes),
            Cow::Owned(bytes) => Cow::Owned(String::from_utf8_lossy(&bytes).into_owned()),
        },
        None => {
            tracing::error!("Missing embedded template {}", name);
            Cow::Borrowed("{{rows}}")
        }
    }
}

fn style() -> Cow<'static, str> {
    Assets::get("style.css").map_or(Cow::Borrowed(""), |file| match file.data {
        Cow::Borrowed(bytes) => String::from_utf8_lossy(bytes),
        Cow::Owned(bytes) => Cow::Owned(String::from_utf8_lossy(&bytes).into_owned()),
    })
}

/// Substitute `{{key}}` placeholders. Inserted values are never rescanned.
fn fill(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len() * 2);
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };

        let key = after[..end].trim();
        match vars.iter().find(|(k, _)| *k == key) {
            Some((_, value)) => out.push_str(value),
            None => out.push_str(&rest[start..start + end + 4]),
        }
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    out
}

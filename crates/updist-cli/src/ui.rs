//! Terminal output
//!
//! Plain `println!` with crossterm styling. Everything goes through
//! [`Output`] so `--json` can swap the human rendering for a single JSON
//! document on stdout.

use crossterm::style::{Color, Stylize};
use serde::Serialize;
use updist_schema::PackageInfo;

/// Status icons.
pub mod icons {
    /// Operation succeeded.
    pub const SUCCESS: &str = "✓";
    /// Operation failed.
    pub const ERROR: &str = "✗";
    /// Needs attention.
    pub const WARNING: &str = "⚠";
    /// Informational.
    pub const INFO: &str = "ℹ";
    /// Package is offered to nodes.
    pub const ACTIVE: &str = "●";
    /// Package is deactivated.
    pub const INACTIVE: &str = "○";
}

const VERSION_WIDTH: usize = 14;
const SIZE_WIDTH: usize = 10;

/// Output mode for one command invocation.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    json: bool,
}

impl Output {
    /// JSON mode when `json` is set, human mode otherwise.
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    /// Whether `--json` was given.
    pub fn is_json(&self) -> bool {
        self.json
    }

    /// Print `value` as pretty JSON. Returns false in human mode.
    pub fn json<T: Serialize>(&self, value: &T) -> anyhow::Result<bool> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        Ok(self.json)
    }

    /// Dimmed informational line; silent in JSON mode.
    pub fn info(&self, msg: &str) {
        if !self.json {
            println!("{} {}", icons::INFO.dark_grey(), msg);
        }
    }

    /// Green success line; silent in JSON mode.
    pub fn success(&self, msg: &str) {
        if !self.json {
            println!("{} {}", icons::SUCCESS.green(), msg);
        }
    }

    /// Yellow warning line; silent in JSON mode.
    pub fn warning(&self, msg: &str) {
        if !self.json {
            println!("{} {}", icons::WARNING.yellow(), msg);
        }
    }

    /// Error line on stderr, printed in both modes.
    pub fn error(&self, msg: &str) {
        eprintln!("{} {}", icons::ERROR.red(), msg);
    }

    /// A dimmed `label  value` line.
    pub fn field(&self, label: &str, value: &str) {
        if !self.json {
            println!("  {} {}", format!("{label:<16}").dark_grey(), value);
        }
    }

    /// One row of the package table.
    pub fn package_row(&self, info: &PackageInfo) {
        if self.json {
            return;
        }
        let (icon, color) = if info.active {
            (icons::ACTIVE, Color::Green)
        } else {
            (icons::INACTIVE, Color::DarkGrey)
        };
        let version = format!("{:<VERSION_WIDTH$}", info.version.to_string());
        let size = format!("{:>SIZE_WIDTH$}", format_size(info.file_size));
        println!(
            "  {} {} {}  {}  {}",
            icon.with(color),
            version.white().bold(),
            size.dark_grey(),
            info.id.to_string().dark_grey(),
            info.created_at.format("%Y-%m-%d %H:%M").to_string().dark_grey()
        );
    }

    /// Full details of one package.
    pub fn package_details(&self, info: &PackageInfo) {
        if self.json {
            return;
        }
        println!();
        println!("  {}", info.version.to_string().white().bold());
        println!();
        self.field("id", &info.id.to_string());
        self.field("status", if info.active { "active" } else { "inactive" });
        self.field("filename", &info.filename);
        self.field("size", &format_size(info.file_size));
        self.field("checksum", info.checksum.as_str());
        self.field("min client", info.minimum_client_version.as_str());
        self.field("published", &info.created_at.to_rfc3339());
        if let Some(platform) = &info.metadata.platform {
            self.field("platform", platform);
        }
        if let Some(arch) = &info.metadata.architecture {
            self.field("architecture", arch);
        }
        if info.metadata.breaking {
            self.field("breaking", "yes");
        }
        if info.metadata.security_update {
            self.field("security", "yes");
        }
        for (name, req) in &info.metadata.dependencies {
            self.field("depends", &format!("{name} {req}"));
        }
        println!();
        for line in info.changelog.lines() {
            println!("  {}", line.dark_grey());
        }
        println!();
    }
}

/// Human-readable byte count.
pub fn format_size(bytes: u64) -> String {
    let kb = bytes as f64 / 1024.0;
    let mb = kb / 1024.0;
    if mb >= 1024.0 {
        format!("{:.1} GB", mb / 1024.0)
    } else if kb >= 1024.0 {
        format!("{mb:.1} MB")
    } else if kb >= 1.0 {
        format!("{kb:.1} KB")
    } else {
        format!("{bytes} B")
    }
}

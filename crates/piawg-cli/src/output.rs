//! Output handling for the CLI

use anyhow::{Context, Result};
use piawg_vpn::{GenerateError, RegionInfo, Stage};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// Write the config to `path`, readable by the owner only.
pub fn write_config(path: &Path, config: &str) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options
        .open(path)
        .with_context(|| format!("Failed to write config to file '{}'", path.display()))?;
    file.write_all(config.as_bytes())
        .with_context(|| format!("Failed to write config to file '{}'", path.display()))?;
    Ok(())
}

/// Region listing, sorted by id
pub fn format_regions<'a>(regions: impl Iterator<Item = &'a RegionInfo>) -> String {
    let mut out = String::from("Available PIA regions:\n======================\n");
    let mut total = 0;
    for region in regions {
        let mut details = Vec::new();
        if !region.country.is_empty() {
            details.push(region.country.as_str());
        }
        if region.port_forward {
            details.push("port forwarding");
        }

        let mut line = format!("  {:<24} {}", region.id.as_str(), region.name);
        if !details.is_empty() {
            line.push_str(&format!(" ({})", details.join(", ")));
        }
        out.push_str(line.trim_end());
        out.push('\n');
        total += 1;
    }
    out.push_str(&format!("\nTotal: {} regions available\n", total));
    out.push_str("\nUsage example:\n  pia-wg-config -r uk_london USERNAME PASSWORD");
    out
}

/// Likely causes for a failed run, shown under the error message
pub fn failure_hints(err: &GenerateError, region: &str) -> Vec<String> {
    if err.is_unknown_region() {
        return vec![format!(
            "Invalid region '{}' (run 'pia-wg-config regions' to see available regions)",
            region
        )];
    }
    if err.is_auth_rejected() {
        return vec!["Invalid username or password".to_string()];
    }

    match err.stage() {
        Some(Stage::Directory) => vec![
            "Network connectivity issues".to_string(),
            "PIA server list unavailable".to_string(),
        ],
        Some(Stage::Certificate) => vec![
            "Network connectivity issues".to_string(),
            "PIA root certificate could not be downloaded".to_string(),
        ],
        Some(Stage::Auth) => vec![
            "Invalid username or password".to_string(),
            "Network connectivity issues".to_string(),
            "PIA service unavailable".to_string(),
        ],
        Some(Stage::Register) => vec![
            "Server communication issues".to_string(),
            "Region server unavailable".to_string(),
        ],
        Some(Stage::Render) => vec!["Unexpected response from the region server".to_string()],
        None => Vec::new(),
    }
}

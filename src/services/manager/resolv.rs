//! Managed resolv.conf writer.

use std::io;
use std::path::Path;

use crate::system::networkd::write_if_changed;

const HEADER: &str = "# This file is managed by Netconnect. Do not edit.\n";

/// Render and write the resolv.conf; returns whether the file changed.
///
/// # Errors
/// Returns an IO error when the file cannot be written.
pub fn write_resolvconf(path: &Path, nameservers: &[String]) -> io::Result<bool> {
    let mut content = String::from(HEADER);
    for server in nameservers {
        content.push_str(&format!("nameserver {server}\n"));
    }
    write_if_changed(path, &content)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn content_has_header_and_ordered_servers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("resolv.conf");

        let servers = vec!["8.8.8.8".to_string(), "8.8.4.4".to_string()];
        assert!(write_resolvconf(&path, &servers).unwrap());

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "# This file is managed by Netconnect. Do not edit.\n\
             nameserver 8.8.8.8\n\
             nameserver 8.8.4.4\n"
        );
    }

    #[test]
    fn unchanged_content_is_not_rewritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("resolv.conf");
        let servers = vec!["1.1.1.1".to_string()];

        assert!(write_resolvconf(&path, &servers).unwrap());
        assert!(!write_resolvconf(&path, &servers).unwrap());
        assert!(write_resolvconf(&path, &[]).unwrap());
    }
}

//! Loads the ordered list of targets from a host file.
//!
//! Three shapes are accepted:
//! - plain text: one address per line, optionally followed by a name
//! - XML: `<host name="...">address</host>` elements under any root
//! - JSON: `[{"address": "...", "name": "..."}]`

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::ping::Target;

#[derive(Debug, Error)]
pub enum HostsError {
    #[error("host file {} not found", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read host file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid XML host list: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("invalid JSON host list: {0}")]
    Json(#[from] serde_json::Error),

    #[error("host list contains no targets")]
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostFormat {
    Plain,
    Xml,
    Json,
}

impl HostFormat {
    /// Picks the format from the file extension, then from the content.
    pub fn detect(path: &Path, content: &str) -> Self {
        match path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase).as_deref() {
            Some("xml") => HostFormat::Xml,
            Some("json") => HostFormat::Json,
            _ => match content.trim_start().chars().next() {
                Some('<') => HostFormat::Xml,
                Some('[') => HostFormat::Json,
                _ => HostFormat::Plain,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct HostEntry {
    address: String,
    #[serde(default)]
    name: Option<String>,
}

pub fn load_hosts(path: &Path) -> Result<Vec<Target>, HostsError> {
    let content = fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            HostsError::NotFound(path.to_path_buf())
        } else {
            HostsError::Read {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    parse_hosts(&content, HostFormat::detect(path, &content))
}

pub fn parse_hosts(content: &str, format: HostFormat) -> Result<Vec<Target>, HostsError> {
    let targets = match format {
        HostFormat::Plain => parse_plain(content),
        HostFormat::Xml => parse_xml(content)?,
        HostFormat::Json => parse_json(content)?,
    };
    if targets.is_empty() {
        return Err(HostsError::Empty);
    }
    Ok(targets)
}

fn parse_plain(content: &str) -> Vec<Target> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| match line.split_once(char::is_whitespace) {
            Some((address, name)) => Target::new(Some(name), address),
            None => Target::new(None, line),
        })
        .collect()
}

fn parse_xml(content: &str) -> Result<Vec<Target>, HostsError> {
    let document = roxmltree::Document::parse(content)?;
    Ok(document
        .root_element()
        .children()
        .filter(|node| node.is_element() && node.tag_name().name() == "host")
        .filter_map(|node| {
            let address = node.text().map(str::trim).unwrap_or_default();
            if address.is_empty() {
                return None;
            }
            Some(Target::new(node.attribute("name"), address))
        })
        .collect())
}

fn parse_json(content: &str) -> Result<Vec<Target>, HostsError> {
    let entries: Vec<HostEntry> = serde_json::from_str(content)?;
    Ok(entries
        .iter()
        .filter(|entry| !entry.address.trim().is_empty())
        .map(|entry| Target::new(entry.name.as_deref(), &entry.address))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_plain_list() {
        let targets = parse_hosts("# office\n10.0.0.1\n\n  8.8.8.8   google dns \n", HostFormat::Plain).unwrap();
        assert_eq!(
            targets,
            vec![Target::new(None, "10.0.0.1"), Target::new(Some("google dns"), "8.8.8.8")]
        );
        assert_eq!(targets[0].name, "10.0.0.1");
    }

    #[test]
    fn test_xml_list_keeps_order_and_defaults_name() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <hosts>
                <host name="router">192.168.1.1</host>
                <host>example.com</host>
                <host name="empty">  </host>
                <other>ignored</other>
            </hosts>"#;
        let targets = parse_hosts(xml, HostFormat::Xml).unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0], Target::new(Some("router"), "192.168.1.1"));
        assert_eq!(targets[1].name, "example.com");
    }

    #[test]
    fn test_json_list() {
        let json = r#"[{"address": "1.1.1.1", "name": "cloudflare"}, {"address": "9.9.9.9"}]"#;
        let targets = parse_hosts(json, HostFormat::Json).unwrap();
        assert_eq!(targets[0].name, "cloudflare");
        assert_eq!(targets[1].name, "9.9.9.9");
    }

    #[test]
    fn test_malformed_inputs() {
        assert!(matches!(parse_hosts("<hosts><host>", HostFormat::Xml), Err(HostsError::Xml(_))));
        assert!(matches!(parse_hosts("[{\"name\": 1}]", HostFormat::Json), Err(HostsError::Json(_))));
        assert!(matches!(parse_hosts("# nothing\n", HostFormat::Plain), Err(HostsError::Empty)));
        assert!(matches!(parse_hosts("<hosts/>", HostFormat::Xml), Err(HostsError::Empty)));
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(HostFormat::detect(Path::new("hosts.XML"), ""), HostFormat::Xml);
        assert_eq!(HostFormat::detect(Path::new("hosts.json"), ""), HostFormat::Json);
        assert_eq!(HostFormat::detect(Path::new("hosts"), "  <hosts/>"), HostFormat::Xml);
        assert_eq!(HostFormat::detect(Path::new("hosts"), "[]"), HostFormat::Json);
        assert_eq!(HostFormat::detect(Path::new("hosts.txt"), "10.0.0.1"), HostFormat::Plain);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hosts.xml");
        assert!(matches!(load_hosts(&path), Err(HostsError::NotFound(p)) if p == path));
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hosts.xml");
        fs::write(&path, r#"<hosts><host name="a">10.0.0.1</host></hosts>"#).unwrap();
        assert_eq!(load_hosts(&path).unwrap(), vec![Target::new(Some("a"), "10.0.0.1")]);
    }
}

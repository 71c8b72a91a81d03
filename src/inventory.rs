//! DataNode inventory.
//!
//! The inventory is the ordered list of DataNodes together with the storage
//! directories every one of them carries. A node's position in the list is
//! what ties it to its `datanodeNN` tree in the fsgen output, so the order in
//! which nodes are configured matters and is preserved everywhere.

use std::fmt;

use colored::*;
use colourado::{ColorPalette, PaletteType};

use crate::error::{FsloadError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Hostname or address, exactly as configured.
    pub hostname: String,
    /// 1-based position in the configured node list.
    pub index: usize,
    /// RGB color used to prefix this node's output.
    color: (u8, u8, u8),
}

impl Node {
    pub fn new(hostname: impl Into<String>, index: usize) -> Self {
        Self {
            hostname: hostname.into(),
            index,
            color: (255, 255, 255),
        }
    }

    /// For pretty-printing the node name.
    /// Surrounds with brackets and colors it with the node's palette color.
    pub fn prettify(&self) -> ColoredString {
        let (r, g, b) = self.color;
        format!("{}", self).truecolor(r, g, b)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}]", self.hostname)
    }
}

#[derive(Debug, Clone)]
pub struct Inventory {
    nodes: Vec<Node>,
    storage_dirs: Vec<String>,
}

impl Inventory {
    /// Builds the inventory from whitespace-separated node and storage
    /// directory lists. Both must name at least one entry.
    pub fn resolve(datanodes: Option<&str>, storage_dirs: Option<&str>) -> Result<Self> {
        let hostnames = split_list(datanodes);
        if hostnames.is_empty() {
            return Err(FsloadError::config(
                "no DataNodes configured; set DATANODES to a whitespace-separated host list",
            ));
        }
        let storage_dirs = split_list(storage_dirs);
        if storage_dirs.is_empty() {
            return Err(FsloadError::config(
                "no storage directories configured; set STORAGE_DIRS to a whitespace-separated path list",
            ));
        }
        Ok(Self::new(hostnames, storage_dirs))
    }

    fn new(hostnames: Vec<String>, storage_dirs: Vec<String>) -> Self {
        let colors = ColorPalette::new(hostnames.len() as u32, PaletteType::Pastel, false).colors;
        let nodes = hostnames
            .into_iter()
            .zip(colors)
            .enumerate()
            .map(|(i, (hostname, color))| {
                let mut node = Node::new(hostname, i + 1);
                node.color = (
                    (color.red * 256.0) as u8,
                    (color.green * 256.0) as u8,
                    (color.blue * 256.0) as u8,
                );
                node
            })
            .collect();
        Self {
            nodes,
            storage_dirs,
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn storage_dirs(&self) -> &[String] {
        &self.storage_dirs
    }

    /// Looks a node up by its exact configured name. The first match wins.
    pub fn find(&self, hostname: &str) -> Result<&Node> {
        self.nodes
            .iter()
            .find(|node| node.hostname == hostname)
            .ok_or_else(|| {
                FsloadError::config(format!(
                    "'{}' is not one of the configured DataNodes ({})",
                    hostname,
                    self.nodes
                        .iter()
                        .map(|node| node.hostname.as_str())
                        .collect::<Vec<_>>()
                        .join(" ")
                ))
            })
    }
}

fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

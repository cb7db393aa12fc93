//! Anatomical region lookup table
//!
//! Parses FreeSurfer-style colour lookup tables: one `<id> <name> [...]` entry
//! per line, `#` comments and blank lines ignored. Columns after the name
//! (RGBA in a FreeSurferColorLUT) are accepted and discarded.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{ChiralityError, Result};

/// How table lines are split into fields
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TableFormat {
    /// Fixed delimiter; `None` splits on arbitrary whitespace
    pub separator: Option<char>,
}

/// Bidirectional id <-> region name mapping
#[derive(Clone, Debug, Default)]
pub struct RegionTable {
    id_to_name: HashMap<i32, String>,
    name_to_id: HashMap<String, i32>,
}

impl RegionTable {
    /// Read and parse a table file
    pub fn load(path: &Path, format: &TableFormat) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ChiralityError::io(path, e))?;
        let table = Self::parse(&text, format)?;
        log::debug!("Loaded {} regions from {}", table.len(), path.display());
        Ok(table)
    }

    /// Parse table text; both directions are built in one pass and must stay
    /// a bijection
    pub fn parse(text: &str, format: &TableFormat) -> Result<Self> {
        let mut table = RegionTable::default();

        for (lineno, raw) in text.lines().enumerate() {
            let line_no = lineno + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = match format.separator {
                Some(sep) => line.split(sep).map(str::trim).collect(),
                None => line.split_whitespace().collect(),
            };

            let malformed = |reason: String| ChiralityError::MalformedTable { line: line_no, reason };

            let id_field = fields.first().copied().unwrap_or_default();
            let id: i32 = id_field
                .parse()
                .map_err(|_| malformed(format!("'{}' is not an integer id", id_field)))?;
            let name = match fields.get(1) {
                Some(name) if !name.is_empty() => name.to_string(),
                _ => return Err(malformed(format!("id {} has no region name", id))),
            };

            if let Some(existing) = table.id_to_name.get(&id) {
                return Err(malformed(format!("id {} already maps to '{}'", id, existing)));
            }
            if let Some(existing) = table.name_to_id.get(&name) {
                return Err(malformed(format!("name '{}' already maps to id {}", name, existing)));
            }

            table.name_to_id.insert(name.clone(), id);
            table.id_to_name.insert(id, name);
        }

        Ok(table)
    }

    pub fn name_of(&self, id: i32) -> Result<&str> {
        self.id_to_name
            .get(&id)
            .map(String::as_str)
            .ok_or(ChiralityError::UnknownId { id, voxel: None })
    }

    pub fn id_of(&self, name: &str) -> Result<i32> {
        self.name_to_id
            .get(name)
            .copied()
            .ok_or_else(|| ChiralityError::UnknownName { name: name.to_string(), voxel: None })
    }

    pub fn len(&self) -> usize {
        self.id_to_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_name.is_empty()
    }

    /// All ids in ascending order
    pub fn ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.id_to_name.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

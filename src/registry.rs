//! Command registry loader.
//!
//! The registry answers one question for the lexer and parser: is this
//! identifier a known command root? Roots come from the mcdoc
//! `commands.json` tree, keeping only commands a datapack function may run
//! (integer `required_level` no higher than `MAX_LEVEL`).

use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde_json::Value;

use crate::error::{CompileError, CompileResult};

/// Max allowed `required_level` for commands.
const MAX_LEVEL: u64 = 2;

#[derive(Debug, Default)]
pub struct CommandRegistry {
    roots: BTreeSet<String>,
}

impl CommandRegistry {
    /// Loads the registry from a mcdoc `commands.json` file.
    pub fn load(path: impl AsRef<Path>) -> CompileResult<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| CompileError::Io(format!("Cannot open {}: {}", path.display(), e)))?;
        let json: Value = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| CompileError::Io(format!("JSON parse error in {}: {}", path.display(), e)))?;
        Self::from_value(&json)
    }

    /// Builds the registry from an already-parsed commands tree.
    pub fn from_value(json: &Value) -> CompileResult<Self> {
        let children = json
            .get("children")
            .and_then(Value::as_object)
            .ok_or_else(|| {
                CompileError::Io("Unexpected JSON format: missing top-level children".to_string())
            })?;

        let mut roots = BTreeSet::new();
        for (name, node) in children {
            match node.get("required_level").and_then(Value::as_u64) {
                Some(level) if level <= MAX_LEVEL => {
                    roots.insert(name.clone());
                }
                _ => {}
            }
        }

        Ok(CommandRegistry { roots })
    }

    /// True when `name` is a known command root.
    pub fn is_valid_root(&self, name: &str) -> bool {
        self.roots.contains(name)
    }

    /// Known command roots in sorted order.
    pub fn roots(&self) -> impl Iterator<Item = &str> {
        self.roots.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    pub fn test_registry() -> CommandRegistry {
        let doc = json!({
            "type": "root",
            "children": {
                "say": { "type": "literal", "required_level": 0 },
                "tellraw": { "type": "literal", "required_level": 2 },
                "stop": { "type": "literal", "required_level": 4 },
                "help": { "type": "literal" }
            }
        });
        CommandRegistry::from_value(&doc).unwrap()
    }

    #[test]
    fn filters_by_required_level() {
        let reg = test_registry();
        assert!(reg.is_valid_root("say"));
        assert!(reg.is_valid_root("tellraw"));
        // Too high a level, and no level at all.
        assert!(!reg.is_valid_root("stop"));
        assert!(!reg.is_valid_root("help"));
    }

    #[test]
    fn roots_are_sorted() {
        let reg = test_registry();
        let roots: Vec<&str> = reg.roots().collect();
        assert_eq!(roots, vec!["say", "tellraw"]);
    }

    #[test]
    fn rejects_malformed_document() {
        let doc = json!({ "type": "root" });
        assert!(CommandRegistry::from_value(&doc).is_err());
    }
}

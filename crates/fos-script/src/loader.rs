//! Module loader chain
//!
//! Loaders are tried in priority order: custom loaders, then the
//! filesystem search path, then built-in sources.

use std::collections::HashMap;

use crate::config::EnvConfig;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Source of one module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSource {
    pub bytes: Vec<u8>,
    /// Name used in error messages
    pub chunk: String,
}

impl ModuleSource {
    pub fn new(bytes: impl Into<Vec<u8>>, chunk: &str) -> Self {
        Self { bytes: bytes.into(), chunk: chunk.to_string() }
    }

    /// Source text with any leading BOM removed
    pub fn text(&self) -> String {
        let bytes = self.bytes.strip_prefix(UTF8_BOM).unwrap_or(&self.bytes);
        String::from_utf8_lossy(bytes).into_owned()
    }
}

/// Custom loader: module name to source, `None` when not found
pub type LoaderFn = Box<dyn Fn(&str) -> Option<ModuleSource>>;

pub struct LoaderChain {
    custom: Vec<LoaderFn>,
    search: EnvConfig,
    builtins: HashMap<String, String>,
}

impl LoaderChain {
    pub fn new(config: &EnvConfig) -> Self {
        Self {
            custom: Vec::new(),
            search: config.clone(),
            builtins: HashMap::new(),
        }
    }

    pub fn add_loader(&mut self, loader: LoaderFn) {
        self.custom.push(loader);
    }

    pub fn add_builtin(&mut self, name: &str, source: &str) {
        self.builtins.insert(name.to_string(), source.to_string());
    }

    pub fn load(&self, name: &str) -> Option<ModuleSource> {
        for loader in &self.custom {
            if let Some(source) = loader(name) {
                return Some(source);
            }
        }
        if let Some(source) = self.load_file(name) {
            return Some(source);
        }
        self.builtins.get(name).map(|src| ModuleSource::new(src.as_bytes(), &format!("builtin:{}", name)))
    }

    fn load_file(&self, name: &str) -> Option<ModuleSource> {
        for path in self.search.module_candidates(name) {
            match std::fs::read(&path) {
                Ok(bytes) => {
                    tracing::debug!("Loaded module {} from {}", name, path.display());
                    return Some(ModuleSource::new(bytes, &path.display().to_string()));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => tracing::warn!("Failed to read {}: {}", path.display(), e),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order() {
        let mut chain = LoaderChain::new(&EnvConfig::default());
        chain.add_builtin("Shared", "return { from: 'builtin' };");
        chain.add_builtin("Only", "return {};");
        chain.add_loader(Box::new(|name| {
            (name == "Shared").then(|| ModuleSource::new("return { from: 'custom' };", "custom:Shared"))
        }));

        assert_eq!(chain.load("Shared").unwrap().chunk, "custom:Shared");
        assert_eq!(chain.load("Only").unwrap().chunk, "builtin:Only");
        assert!(chain.load("Missing").is_none());
    }

    #[test]
    fn test_bom_stripped() {
        let source = ModuleSource::new(b"\xEF\xBB\xBFreturn {};".to_vec(), "bom");
        assert_eq!(source.text(), "return {};");
    }

    #[test]
    fn test_filesystem_loader() {
        let root = std::env::temp_dir().join(format!("fos-script-loader-{}", std::process::id()));
        std::fs::create_dir_all(root.join("Game")).unwrap();
        std::fs::write(root.join("Game/Door.js"), "return { open: true };").unwrap();

        let config = EnvConfig { script_roots: vec![root.clone()], ..Default::default() };
        let chain = LoaderChain::new(&config);
        let source = chain.load("Game.Door").unwrap();
        assert_eq!(source.text(), "return { open: true };");
        assert!(source.chunk.ends_with("Door.js"));

        std::fs::remove_dir_all(&root).unwrap();
    }
}

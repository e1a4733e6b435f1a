//! Environment configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Script environment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    /// Name used in logs
    pub name: String,
    /// Watchdog ticks a guarded script call may run before it is aborted (0 disables)
    pub dead_loop_timeout: u32,
    /// Watchdog tick in milliseconds
    pub watchdog_tick_ms: u64,
    /// Report accesses through released objects with field and class names
    pub dangling_check: bool,
    /// Directories searched by the filesystem loader, in order
    pub script_roots: Vec<PathBuf>,
    /// Search patterns; `?` is replaced by the module path (`.` becomes `/`)
    pub package_path: Vec<String>,
    /// Module required by `ScriptEnv::start`
    pub startup_module: Option<String>,
    /// VM heap limit in bytes
    pub memory_limit: usize,
    /// VM stack limit in bytes
    pub max_stack_size: usize,
    /// Allocation threshold that triggers a VM collection
    pub gc_threshold: usize,
    /// Classes whose default objects are bound when the environment starts
    pub pre_bind_classes: Vec<String>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            name: "main".to_string(),
            dead_loop_timeout: 0,
            watchdog_tick_ms: 1000,
            dangling_check: true,
            script_roots: Vec::new(),
            package_path: vec!["?.js".to_string(), "?/index.js".to_string()],
            startup_module: None,
            memory_limit: 64 * 1024 * 1024,
            max_stack_size: 1024 * 1024,
            gc_threshold: 4 * 1024 * 1024,
            pre_bind_classes: Vec::new(),
        }
    }
}

impl EnvConfig {
    /// Parse from JSON; missing fields keep their defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Candidate file paths for a module, in search order
    pub fn module_candidates(&self, module: &str) -> Vec<PathBuf> {
        let relative = module.replace('.', "/");
        let mut candidates = Vec::new();
        for root in &self.script_roots {
            for pattern in &self.package_path {
                candidates.push(root.join(pattern.replace('?', &relative)));
            }
        }
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EnvConfig::default();
        assert_eq!(config.dead_loop_timeout, 0);
        assert!(config.dangling_check);
    }

    #[test]
    fn test_from_json_partial() {
        let config = EnvConfig::from_json(r#"{ "name": "game", "dead_loop_timeout": 5 }"#).unwrap();
        assert_eq!(config.name, "game");
        assert_eq!(config.dead_loop_timeout, 5);
        assert_eq!(config.watchdog_tick_ms, 1000);
    }

    #[test]
    fn test_module_candidates() {
        let config = EnvConfig {
            script_roots: vec![PathBuf::from("/persistent"), PathBuf::from("/content")],
            package_path: vec!["?.js".to_string()],
            ..Default::default()
        };
        assert_eq!(
            config.module_candidates("Game.Hero"),
            vec![PathBuf::from("/persistent/Game/Hero.js"), PathBuf::from("/content/Game/Hero.js")]
        );
    }
}

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
}

impl Paths {
    pub fn new() -> Self {
        let base = dirs::home_dir()
            .map(|h| h.join(".agentmesh"))
            .unwrap_or_else(|| PathBuf::from(".agentmesh"));
        Self { base }
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self { base }
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.json")
    }

    /// Resolve a configured path: absolute paths and paths starting with
    /// `./` are used as given, `~/` expands to the home directory, anything
    /// else is taken relative to the base directory.
    pub fn resolve(&self, configured: &str) -> PathBuf {
        if let Some(rest) = configured.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        let p = PathBuf::from(configured);
        if p.is_absolute() || configured.starts_with("./") || configured.starts_with("../") {
            p
        } else {
            self.base.join(p)
        }
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_to_base() {
        let paths = Paths::with_base(PathBuf::from("/srv/mesh"));
        assert_eq!(paths.resolve("worker/ltm.db"), PathBuf::from("/srv/mesh/worker/ltm.db"));
        assert_eq!(paths.resolve("/tmp/ltm.db"), PathBuf::from("/tmp/ltm.db"));
        assert_eq!(paths.resolve("./ltm.db"), PathBuf::from("./ltm.db"));
    }
}

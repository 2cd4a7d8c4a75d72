use agentmesh_core::{iso_now, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Hosting platforms that only serve TLS.
const TLS_HOST_SUFFIXES: &[&str] = &[".railway.app", ".up.railway.app", ".herokuapp.com", ".vercel.app"];

/// Give a bare host a scheme. URLs that already carry one are returned
/// trimmed but otherwise untouched; an empty input stays empty.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    if url.is_empty() {
        return String::new();
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        return url.to_string();
    }
    if TLS_HOST_SUFFIXES.iter().any(|s| url.contains(s)) {
        return format!("https://{}", url);
    }
    if url.contains("localhost") || url.contains("127.0.0.1") {
        return format!("http://{}", url);
    }
    format!("https://{}", url)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub name: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub health_url: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub last_seen: Option<String>,
}

impl AgentRecord {
    pub fn offers(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }

    /// Health endpoint, derived from the base URL when none was registered.
    pub fn health_endpoint(&self) -> String {
        if self.health_url.is_empty() && !self.base_url.is_empty() {
            format!("{}/health", self.base_url.trim_end_matches('/'))
        } else {
            self.health_url.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub base_url: String,
    #[serde(default)]
    pub health_url: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    agents: Vec<AgentRecord>,
}

/// Durable agent membership, kept in registration order and mirrored to a
/// `{"agents": [...]}` JSON file after every change.
pub struct AgentRegistry {
    path: PathBuf,
    agents: RwLock<Vec<AgentRecord>>,
}

impl AgentRegistry {
    pub fn open(path: &Path) -> Self {
        let agents = if path.exists() {
            match Self::load(path) {
                Ok(agents) => {
                    info!(count = agents.len(), path = %path.display(), "Loaded agent registry");
                    agents
                }
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Failed to load registry, starting empty");
                    Vec::new()
                }
            }
        } else {
            if let Err(e) = write_registry(path, &[]) {
                warn!(path = %path.display(), error = %e, "Failed to create registry file");
            }
            Vec::new()
        };

        Self {
            path: path.to_path_buf(),
            agents: RwLock::new(agents),
        }
    }

    fn load(path: &Path) -> Result<Vec<AgentRecord>> {
        let content = std::fs::read_to_string(path)?;
        let file: RegistryFile = serde_json::from_str(&content)?;

        let mut agents: Vec<AgentRecord> = Vec::with_capacity(file.agents.len());
        for mut agent in file.agents {
            agent.base_url = normalize_url(&agent.base_url);
            agent.health_url = normalize_url(&agent.health_url);
            match agents.iter_mut().find(|a| a.name == agent.name) {
                Some(existing) => *existing = agent,
                None => agents.push(agent),
            }
        }
        Ok(agents)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert or replace an agent by name. The in-memory entry is kept even
    /// when persisting fails; the failure is reported as `false`.
    pub async fn register(&self, request: RegisterRequest) -> bool {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            warn!("Rejecting registration without a name");
            return false;
        }

        let record = AgentRecord {
            name: name.clone(),
            base_url: normalize_url(&request.base_url),
            health_url: normalize_url(&request.health_url),
            capabilities: request.capabilities,
            last_seen: Some(iso_now()),
        };

        let mut agents = self.agents.write().await;
        let base_url = record.base_url.clone();
        let capabilities = record.capabilities.clone();
        match agents.iter_mut().find(|a| a.name == name) {
            Some(existing) => *existing = record,
            None => agents.push(record),
        }

        match write_registry(&self.path, &agents) {
            Ok(()) => {
                info!(agent = %name, base_url = %base_url, capabilities = ?capabilities, "Registered agent");
                true
            }
            Err(e) => {
                error!(agent = %name, error = %e, "Agent registration could not be persisted");
                false
            }
        }
    }

    pub async fn get_all(&self) -> Vec<AgentRecord> {
        self.agents.read().await.clone()
    }

    pub async fn get(&self, name: &str) -> Option<AgentRecord> {
        self.agents.read().await.iter().find(|a| a.name == name).cloned()
    }

    pub async fn len(&self) -> usize {
        self.agents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.agents.read().await.is_empty()
    }

    /// Refresh `last_seen` for an agent that just answered.
    pub async fn touch(&self, name: &str) -> bool {
        let mut agents = self.agents.write().await;
        let Some(agent) = agents.iter_mut().find(|a| a.name == name) else {
            return false;
        };
        agent.last_seen = Some(iso_now());

        match write_registry(&self.path, &agents) {
            Ok(()) => {
                debug!(agent = %name, "Refreshed last_seen");
                true
            }
            Err(e) => {
                warn!(agent = %name, error = %e, "Failed to persist last_seen");
                false
            }
        }
    }

    pub async fn save(&self) -> Result<()> {
        let agents = self.agents.read().await;
        write_registry(&self.path, &agents)
    }
}

fn write_registry(path: &Path, agents: &[AgentRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let file = RegistryFile {
        agents: agents
            .iter()
            .cloned()
            .map(|mut a| {
                a.last_seen.get_or_insert_with(iso_now);
                a
            })
            .collect(),
    };
    let content = serde_json::to_string_pretty(&file)?;

    let mut tmp = path.to_path_buf().into_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, content)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(Error::Registry(format!("Failed to replace {}: {}", path.display(), e)));
    }
    Ok(())
}

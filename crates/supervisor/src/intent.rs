use agentmesh_core::Capability;

use crate::registry::AgentRecord;

/// Which agent should run what, as inferred from a prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Single {
        agent: AgentRecord,
        capability: Capability,
    },
    Multi {
        agent: AgentRecord,
        capabilities: Vec<Capability>,
    },
}

impl Intent {
    pub fn agent(&self) -> &AgentRecord {
        match self {
            Intent::Single { agent, .. } | Intent::Multi { agent, .. } => agent,
        }
    }

    pub fn capabilities(&self) -> Vec<Capability> {
        match self {
            Intent::Single { capability, .. } => vec![*capability],
            Intent::Multi { capabilities, .. } => capabilities.clone(),
        }
    }
}

/// Keyword router from free text to capabilities and then to an agent.
pub struct IntentRouter {
    capabilities: Vec<Capability>,
}

impl Default for IntentRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl IntentRouter {
    pub fn new() -> Self {
        Self {
            capabilities: Capability::ALL.to_vec(),
        }
    }

    /// Every capability the prompt mentions, in routing order.
    pub fn detect_matches(&self, prompt: &str) -> Vec<Capability> {
        let prompt_lower = prompt.to_lowercase();
        let mut matched: Vec<Capability> = Vec::new();
        for cap in &self.capabilities {
            if cap.matches(&prompt_lower) && !matched.contains(cap) {
                matched.push(*cap);
            }
        }
        matched
    }

    /// Pick the first agent (in registry order) offering any matched
    /// capability. Matched capabilities that agent lacks are dropped.
    pub fn detect_intent(&self, prompt: &str, agents: &[AgentRecord]) -> Option<Intent> {
        let matched = self.detect_matches(prompt);
        if matched.is_empty() {
            return None;
        }

        for agent in agents {
            let offered: Vec<Capability> = matched
                .iter()
                .copied()
                .filter(|c| agent.offers(c.as_str()))
                .collect();

            match offered.len() {
                0 => continue,
                1 => {
                    return Some(Intent::Single {
                        agent: agent.clone(),
                        capability: offered[0],
                    })
                }
                _ => {
                    return Some(Intent::Multi {
                        agent: agent.clone(),
                        capabilities: offered,
                    })
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(name: &str, caps: &[Capability]) -> AgentRecord {
        AgentRecord {
            name: name.to_string(),
            base_url: "http://localhost:8001".to_string(),
            health_url: "http://localhost:8001/health".to_string(),
            capabilities: caps.iter().map(|c| c.as_str().to_string()).collect(),
            last_seen: None,
        }
    }

    #[test]
    fn test_single_capability() {
        let router = IntentRouter::new();
        let agents = vec![agent("energy", &[Capability::BuildingEnergyAnalysis])];
        let intent = router
            .detect_intent("Analyze energy consumption for Building A", &agents)
            .unwrap();
        assert_eq!(
            intent,
            Intent::Single {
                agent: agents[0].clone(),
                capability: Capability::BuildingEnergyAnalysis,
            }
        );
    }

    #[test]
    fn test_no_match() {
        let router = IntentRouter::new();
        let agents = vec![agent("energy", &Capability::ALL)];
        assert!(router.detect_matches("What is the weather today?").is_empty());
        assert_eq!(router.detect_intent("What is the weather today?", &agents), None);
    }

    #[test]
    fn test_matches_keep_routing_order() {
        let router = IntentRouter::new();
        let matched = router.detect_matches("What will the bill be for solar panels?");
        assert_eq!(
            matched,
            vec![Capability::SolarEnergyEstimation, Capability::CostEstimation]
        );
    }

    #[test]
    fn test_multi_keeps_only_offered() {
        let router = IntentRouter::new();
        let agents = vec![agent(
            "energy",
            &[Capability::PeakLoadForecasting, Capability::CostEstimation],
        )];
        let intent = router
            .detect_intent("forecast tomorrow and estimate the cost, also solar", &agents)
            .unwrap();
        assert_eq!(
            intent.capabilities(),
            vec![Capability::PeakLoadForecasting, Capability::CostEstimation]
        );
        assert!(matches!(intent, Intent::Multi { .. }));
    }

    #[test]
    fn test_first_offering_agent_wins() {
        let router = IntentRouter::new();
        let agents = vec![
            agent("weather", &[]),
            agent("pricing", &[Capability::CostEstimation]),
            agent("energy", &Capability::ALL),
        ];
        let intent = router.detect_intent("how much money?", &agents).unwrap();
        assert_eq!(intent.agent().name, "pricing");
    }

    #[test]
    fn test_unoffered_match_is_none() {
        let router = IntentRouter::new();
        let agents = vec![agent("pricing", &[Capability::CostEstimation])];
        assert_eq!(router.detect_intent("photovoltaic output", &agents), None);
    }
}

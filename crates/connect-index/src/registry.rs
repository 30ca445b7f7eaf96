// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use connect_core::VerificationStatus;
use tracing::{debug, warn};

use crate::error::Error;
use crate::registration::{AgentRegistration, AgentType, InteractionMode};

/// Authoritative directory of agent registrations, mirroring the secondary
/// indexes the upstream registry keeps: by capability, by interaction mode,
/// by organization, and by owner.
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, AgentRegistration>>,
    capabilities_index: RwLock<HashMap<String, HashSet<String>>>,
    interaction_index: RwLock<HashMap<InteractionMode, HashSet<String>>>,
    organization_index: RwLock<HashMap<String, HashSet<String>>>,
    owner_index: RwLock<HashMap<String, HashSet<String>>>,
    verified_agents: RwLock<HashSet<String>>,
}

impl Default for AgentRegistry {
    fn default() -> Self {
        let mut interaction_index = HashMap::new();
        for mode in InteractionMode::ALL {
            interaction_index.insert(mode, HashSet::new());
        }
        AgentRegistry {
            agents: RwLock::new(HashMap::new()),
            capabilities_index: RwLock::new(HashMap::new()),
            interaction_index: RwLock::new(interaction_index),
            organization_index: RwLock::new(HashMap::new()),
            owner_index: RwLock::new(HashMap::new()),
            verified_agents: RwLock::new(HashSet::new()),
        }
    }
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Verify identity format, insert the registration, and update every
    /// secondary index atomically. On identity-verification failure, no
    /// state is left behind.
    pub fn register(&self, mut registration: AgentRegistration) -> Result<bool, Error> {
        if !registration.identity.verify_did_format() {
            warn!(agent_id = %registration.agent_id, "identity format check failed, refusing registration");
            return Ok(false);
        }
        registration.identity.verification_status = VerificationStatus::Verified;

        let agent_id = registration.agent_id.clone();
        self.update_indexes(&registration);
        self.verified_agents.write().unwrap().insert(agent_id.clone());
        self.agents.write().unwrap().insert(agent_id.clone(), registration);
        debug!(%agent_id, "registered agent");
        Ok(true)
    }

    fn update_indexes(&self, registration: &AgentRegistration) {
        let agent_id = &registration.agent_id;

        let mut caps = self.capabilities_index.write().unwrap();
        for name in registration.capability_names() {
            caps.entry(name.to_string()).or_default().insert(agent_id.clone());
        }
        drop(caps);

        let mut modes = self.interaction_index.write().unwrap();
        for mode in &registration.interaction_modes {
            modes.entry(*mode).or_default().insert(agent_id.clone());
        }
        drop(modes);

        if let Some(org) = &registration.organization_id {
            self.organization_index
                .write()
                .unwrap()
                .entry(org.clone())
                .or_default()
                .insert(agent_id.clone());
        }

        if let Some(owner) = &registration.owner_id {
            self.owner_index
                .write()
                .unwrap()
                .entry(owner.clone())
                .or_default()
                .insert(agent_id.clone());
        }
    }

    fn remove_from_indexes(&self, registration: &AgentRegistration) {
        let agent_id = &registration.agent_id;

        let mut caps = self.capabilities_index.write().unwrap();
        for name in registration.capability_names() {
            if let Some(set) = caps.get_mut(name) {
                set.remove(agent_id);
            }
        }
        drop(caps);

        let mut modes = self.interaction_index.write().unwrap();
        for mode in &registration.interaction_modes {
            if let Some(set) = modes.get_mut(mode) {
                set.remove(agent_id);
            }
        }
        drop(modes);

        if let Some(org) = &registration.organization_id {
            if let Some(set) = self.organization_index.write().unwrap().get_mut(org) {
                set.remove(agent_id);
            }
        }
        if let Some(owner) = &registration.owner_id {
            if let Some(set) = self.owner_index.write().unwrap().get_mut(owner) {
                set.remove(agent_id);
            }
        }
    }

    pub fn unregister(&self, agent_id: &str) -> bool {
        let removed = self.agents.write().unwrap().remove(agent_id);
        match removed {
            Some(registration) => {
                self.remove_from_indexes(&registration);
                self.verified_agents.write().unwrap().remove(agent_id);
                debug!(%agent_id, "unregistered agent");
                true
            }
            None => false,
        }
    }

    pub fn update_registration(
        &self,
        agent_id: &str,
        mutate: impl FnOnce(&mut AgentRegistration),
    ) -> Result<(), Error> {
        let mut agents = self.agents.write().unwrap();
        let registration = agents
            .get(agent_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(agent_id.to_string()))?;
        self.remove_from_indexes(&registration);
        let mut updated = registration;
        mutate(&mut updated);
        self.update_indexes(&updated);
        agents.insert(agent_id.to_string(), updated);
        Ok(())
    }

    pub fn get_registration(&self, agent_id: &str) -> Option<AgentRegistration> {
        self.agents.read().unwrap().get(agent_id).cloned()
    }

    pub fn get_all_agents(&self) -> Vec<AgentRegistration> {
        self.agents.read().unwrap().values().cloned().collect()
    }

    pub fn get_agent_type(&self, agent_id: &str) -> Option<AgentType> {
        self.agents.read().unwrap().get(agent_id).map(|r| r.agent_type)
    }

    pub fn get_by_capability(&self, capability_name: &str) -> Vec<AgentRegistration> {
        let agent_ids = self
            .capabilities_index
            .read()
            .unwrap()
            .get(capability_name)
            .cloned()
            .unwrap_or_default();
        self.resolve(&agent_ids)
    }

    pub fn get_all_capabilities(&self) -> Vec<String> {
        self.capabilities_index.read().unwrap().keys().cloned().collect()
    }

    pub fn get_by_interaction_mode(&self, mode: InteractionMode) -> Vec<AgentRegistration> {
        let agent_ids = self
            .interaction_index
            .read()
            .unwrap()
            .get(&mode)
            .cloned()
            .unwrap_or_default();
        self.resolve(&agent_ids)
    }

    pub fn get_by_organization(&self, organization_id: &str) -> Vec<AgentRegistration> {
        let agent_ids = self
            .organization_index
            .read()
            .unwrap()
            .get(organization_id)
            .cloned()
            .unwrap_or_default();
        self.resolve(&agent_ids)
    }

    pub fn get_by_owner(&self, owner_id: &str) -> Vec<AgentRegistration> {
        let agent_ids = self
            .owner_index
            .read()
            .unwrap()
            .get(owner_id)
            .cloned()
            .unwrap_or_default();
        self.resolve(&agent_ids)
    }

    pub fn get_verified_agents(&self) -> Vec<AgentRegistration> {
        let ids: Vec<String> = self.verified_agents.read().unwrap().iter().cloned().collect();
        self.resolve(&ids.into_iter().collect())
    }

    pub fn verify_agent(&self, agent_id: &str) -> bool {
        if self.agents.read().unwrap().contains_key(agent_id) {
            self.verified_agents.write().unwrap().insert(agent_id.to_string());
            true
        } else {
            false
        }
    }

    pub fn verify_owner(&self, agent_id: &str, owner_id: &str) -> bool {
        self.agents
            .read()
            .unwrap()
            .get(agent_id)
            .and_then(|r| r.owner_id.as_deref())
            .map(|owner| owner == owner_id)
            .unwrap_or(false)
    }

    fn resolve(&self, agent_ids: &HashSet<String>) -> Vec<AgentRegistration> {
        let agents = self.agents.read().unwrap();
        agent_ids
            .iter()
            .filter_map(|id| agents.get(id).cloned())
            .collect()
    }
}

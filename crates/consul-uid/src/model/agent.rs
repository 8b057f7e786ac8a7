use std::collections::BTreeMap;

/// A gossip-pool member, as seen by the agent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Member {
    pub name: String,
    pub addr: String,
    pub port: u16,
    pub tags: BTreeMap<String, String>,
    pub status: u8,
}

/// The subset of the agent configuration that matters to clients.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AgentConfig {
    pub node_name: String,
    pub datacenter: String,
}

/// Self-description of the agent a process is attached to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AgentDescriptor {
    pub config: AgentConfig,
    pub member: Member,
}

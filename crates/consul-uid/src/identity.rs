use std::sync::OnceLock;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    coordinator::AgentClient,
    error::{Error, Result},
};

/// Checks that `client_id` can name a client record.
///
/// # Errors
///
/// Returns [`Error::Configuration`] if the identity is empty, starts with `.`
/// (reserved for the namespace's bookkeeping keys), or contains `/`.
pub fn validate_client_id(client_id: &str) -> Result<()> {
    if client_id.is_empty() {
        return Err(Error::configuration("client id must not be empty"));
    }
    if client_id.starts_with('.') {
        return Err(Error::configuration(format!(
            "client id `{client_id}` cannot begin with \".\""
        )));
    }
    if client_id.contains('/') {
        return Err(Error::configuration(format!(
            "client id `{client_id}` must not contain a \"/\""
        )));
    }
    Ok(())
}

/// Resolves, once, the identity this process allocates under.
///
/// An explicitly configured identity wins; otherwise the name of the agent's
/// gossip member is used. The first successful resolution is kept for the
/// lifetime of the resolver; failures are not remembered.
#[derive(Debug, Default)]
pub struct IdentityResolver {
    explicit: Option<String>,
    resolved: OnceLock<String>,
}

impl IdentityResolver {
    /// Creates a resolver. `explicit` is ignored when blank.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a non-blank `explicit` identity is
    /// malformed.
    pub fn new(explicit: Option<&str>) -> Result<Self> {
        let explicit = explicit
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_owned);
        if let Some(id) = &explicit {
            validate_client_id(id)?;
        }
        Ok(Self {
            explicit,
            resolved: OnceLock::new(),
        })
    }

    /// The memoised identity, if it has been resolved already.
    pub fn cached(&self) -> Option<&str> {
        self.resolved.get().map(String::as_str)
    }

    /// Returns the identity, asking `agent` for its member name on first use
    /// when none was configured.
    ///
    /// # Errors
    ///
    /// - [`Error::CoordinationUnavailable`] if the agent cannot be reached or
    ///   does not describe itself.
    /// - [`Error::Configuration`] if the agent's member name is not a valid
    ///   client id.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
    pub fn resolve<A>(&self, agent: &A) -> Result<&str>
    where
        A: AgentClient + ?Sized,
    {
        if let Some(id) = self.resolved.get() {
            return Ok(id);
        }

        let id = match &self.explicit {
            Some(id) => id.clone(),
            None => {
                let descriptor = agent
                    .describe_agent()?
                    .ok_or_else(|| Error::unavailable("agent did not describe itself"))?;
                let name = descriptor.member.name.trim().to_owned();
                validate_client_id(&name)?;
                #[cfg(feature = "tracing")]
                tracing::debug!(client_id = %name, "resolved client id from agent member");
                name
            }
        };

        Ok(self.resolved.get_or_init(|| id))
    }
}

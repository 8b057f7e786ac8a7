use crate::{
    coordinator::SessionClient,
    error::{Error, Result},
    model::{SessionId, SessionSpec},
};

/// The session backing one `get` call.
///
/// Renewed before every attempt and replaced if the service dropped it. When
/// `destroy_on_drop` is set, the session is destroyed (best effort) however the
/// call ends, which also releases any lock it still holds.
pub(crate) struct Lease<'a, C>
where
    C: SessionClient + ?Sized,
{
    client: &'a C,
    spec: SessionSpec,
    current: Option<SessionId>,
    destroy_on_drop: bool,
}

impl<'a, C> Lease<'a, C>
where
    C: SessionClient + ?Sized,
{
    /// Creates the initial session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CoordinationUnavailable`] if the session cannot be
    /// created; without one no further step is meaningful.
    pub(crate) fn open(client: &'a C, spec: SessionSpec, destroy_on_drop: bool) -> Result<Self> {
        let Some(id) = client.create(&spec)? else {
            return Err(Error::unavailable(format!("unable to create session `{}`", spec.name)));
        };
        #[cfg(feature = "tracing")]
        tracing::debug!(session = %id, name = %spec.name, "created session");

        Ok(Self {
            client,
            spec,
            current: Some(id),
            destroy_on_drop,
        })
    }

    /// Renews the current session, creating a new one if it has been
    /// invalidated. Returns `None` if no live session could be obtained.
    ///
    /// # Errors
    ///
    /// Propagates transport failures.
    pub(crate) fn refresh(&mut self) -> Result<Option<&SessionId>> {
        let renewed = match &self.current {
            Some(id) => self.client.renew(id)?,
            None => false,
        };

        if !renewed {
            if let Some(_expired) = self.current.take() {
                #[cfg(feature = "tracing")]
                tracing::warn!(session = %_expired, "session no longer exists, creating a new one");
            }
            self.current = self.client.create(&self.spec)?;
            #[cfg(feature = "tracing")]
            match &self.current {
                Some(id) => tracing::debug!(session = %id, "replaced expired session"),
                None => tracing::warn!(name = %self.spec.name, "unable to replace expired session"),
            }
        }
        Ok(self.current.as_ref())
    }
}

impl<C> Drop for Lease<'_, C>
where
    C: SessionClient + ?Sized,
{
    fn drop(&mut self) {
        if !self.destroy_on_drop {
            return;
        }
        let Some(id) = self.current.take() else {
            return;
        };
        match self.client.destroy(&id) {
            Ok(true) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(session = %id, "destroyed session");
            }
            Ok(false) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(session = %id, "session destroy was rejected, leaving it to expire");
            }
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    session = %id,
                    error = %_e,
                    "unable to destroy session, leaving it to expire"
                );
            }
        }
    }
}

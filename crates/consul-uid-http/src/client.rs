use consul_uid::{
    AgentClient, AgentDescriptor, DeleteOptions, KeyValue, KvStore, PutOutcome, ReadOptions,
    SessionClient, SessionId, SessionInfo, SessionSpec, TransportError, WriteOptions,
};
use reqwest::{
    Proxy, StatusCode, Url,
    blocking::{Client, RequestBuilder, Response},
    header::{HeaderMap, HeaderName, HeaderValue},
};
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    config::ClientConfig,
    error::ClientError,
    wire::{
        AgentSelf, KvEntry, SessionCreateBody, SessionCreated, SessionEntry, format_go_duration,
    },
};

/// Header carrying the ACL token.
pub const TOKEN_HEADER: &str = "x-consul-token";

type Query = Vec<(&'static str, String)>;

/// A blocking client for a single Consul agent.
///
/// Implements [`KvStore`], [`SessionClient`] and [`AgentClient`], so it can
/// be handed straight to [`consul_uid::Allocator`]. Rejected writes come back
/// as unsuccessful [`PutOutcome`]s; only an unreachable agent, a refused
/// token, or a response that cannot be decoded is a [`TransportError`].
#[derive(Debug, Clone)]
pub struct ConsulClient {
    http: Client,
    base: Url,
    config: ClientConfig,
}

impl ConsulClient {
    /// Builds a client for the agent described by `config`.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] if the agent URL, token, or proxy is invalid,
    /// or if the underlying HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let base = config.base_url()?;

        let mut headers = HeaderMap::new();
        if let Some(token) = config.token.as_deref().filter(|token| !token.is_empty()) {
            let Ok(mut value) = HeaderValue::from_str(token) else {
                return Err(ClientError::InvalidToken);
            };
            value.set_sensitive(true);
            headers.insert(HeaderName::from_static(TOKEN_HEADER), value);
        }

        let builder = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers);
        let builder = match &config.proxy {
            Some(proxy) => builder.proxy(Proxy::all(proxy.as_str())?),
            None => builder.no_proxy(),
        };

        Ok(Self {
            http: builder.build()?,
            base,
            config,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Whether an agent answers at the configured address.
    pub fn is_reachable(&self) -> bool {
        self.http
            .get(self.base.clone())
            .send()
            .and_then(Response::text)
            .is_ok_and(|body| body.trim_start().starts_with("Consul Agent"))
    }

    fn endpoint<'a>(&self, path: impl IntoIterator<Item = &'a str>) -> Result<Url, TransportError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| TransportError::new(format!("`{}` cannot be a base URL", self.base)))?
            .pop_if_empty()
            .push(&self.config.version)
            .extend(path);
        Ok(url)
    }

    /// `/v1/kv/<key>`, with leading and trailing `/` stripped from the key.
    fn kv_url(&self, key: &str) -> Result<Url, TransportError> {
        let key = key.trim_matches('/');
        self.endpoint(core::iter::once("kv").chain(key.split('/')))
    }

    fn query(&self) -> Query {
        self.config
            .datacenter
            .iter()
            .map(|dc| ("dc", dc.clone()))
            .collect()
    }

    fn send(&self, request: RequestBuilder, what: &str) -> Result<Response, TransportError> {
        request
            .send()
            .map_err(|e| TransportError::with_source(format!("{what} failed"), e))
    }
}

/// Turns an unexpected status into a [`TransportError`], keeping the body for
/// diagnostics.
fn unexpected(what: &str, response: Response) -> TransportError {
    let status = response.status();
    let body = response.text().unwrap_or_default();
    TransportError::new(format!("{what} returned {status}: {}", body.trim()))
}

fn text_of(what: &str, response: Response) -> Result<String, TransportError> {
    response
        .text()
        .map_err(|e| TransportError::with_source(format!("{what}: unreadable response"), e))
}

fn malformed(
    what: &str,
    source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> TransportError {
    TransportError::with_source(format!("{what}: malformed response"), source)
}

fn is_denied(status: StatusCode) -> bool {
    matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
}

impl KvStore for ConsulClient {
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self, opts)))]
    fn get(&self, key: &str, opts: &ReadOptions) -> Result<Option<KeyValue>, TransportError> {
        let url = self.kv_url(key)?;
        let what = format!("GET {}", url.path());

        let mut query = self.query();
        if opts.consistent {
            query.push(("consistent", String::new()));
        }
        if let Some(index) = opts.index {
            query.push(("index", index.to_string()));
        }
        if let Some(wait) = opts.wait {
            query.push(("wait", format_go_duration(wait)));
        }

        let response = self.send(self.http.get(url).query(&query), &what)?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let entries: Vec<KvEntry> = response.json().map_err(|e| malformed(&what, e))?;
                entries
                    .into_iter()
                    .next()
                    .map(KvEntry::into_key_value)
                    .transpose()
                    .map_err(|e| malformed(&what, e))
            }
            _ => Err(unexpected(&what, response)),
        }
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "trace", skip(self, value, opts))
    )]
    fn put(
        &self,
        key: &str,
        value: &[u8],
        opts: &WriteOptions,
    ) -> Result<PutOutcome, TransportError> {
        let url = self.kv_url(key)?;
        let what = format!("PUT {}", url.path());

        let mut query = self.query();
        if let Some(flags) = opts.flags {
            query.push(("flags", flags.to_string()));
        }
        if let Some(cas) = opts.cas {
            query.push(("cas", cas.to_string()));
        }
        if let Some(session) = &opts.acquire {
            query.push(("acquire", session.as_str().to_owned()));
        }
        if let Some(session) = &opts.release {
            query.push(("release", session.as_str().to_owned()));
        }

        let request = self.http.put(url).query(&query).body(value.to_vec());
        let response = self.send(request, &what)?;
        let status = response.status();
        if is_denied(status) {
            return Err(unexpected(&what, response));
        }
        let body = text_of(&what, response)?;

        if status.is_success() && body.trim() == "true" {
            Ok(PutOutcome::accepted())
        } else {
            #[cfg(feature = "tracing")]
            tracing::debug!(%status, body = %body.trim(), "{what} rejected");
            Ok(PutOutcome::rejected(body.trim()))
        }
    }

    fn delete(&self, key: &str, opts: &DeleteOptions) -> Result<bool, TransportError> {
        let url = self.kv_url(key)?;
        let what = format!("DELETE {}", url.path());

        let mut query = self.query();
        if opts.recurse {
            query.push(("recurse", String::new()));
        }
        if let Some(cas) = opts.cas {
            query.push(("cas", cas.to_string()));
        }

        let response = self.send(self.http.delete(url).query(&query), &what)?;
        if !response.status().is_success() {
            return Err(unexpected(&what, response));
        }
        let body = text_of(&what, response)?;
        Ok(body.trim() == "true")
    }
}

impl SessionClient for ConsulClient {
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    fn create(&self, spec: &SessionSpec) -> Result<Option<SessionId>, TransportError> {
        let url = self.endpoint(["session", "create"])?;
        let what = format!("PUT {}", url.path());

        let body = SessionCreateBody::from(spec);
        let request = self.http.put(url).query(&self.query()).json(&body);
        let response = self.send(request, &what)?;
        let status = response.status();
        if is_denied(status) {
            return Err(unexpected(&what, response));
        }
        if !status.is_success() {
            let _body = response.text().unwrap_or_default();
            #[cfg(feature = "tracing")]
            tracing::warn!(%status, body = %_body.trim(), "unable to create session");
            return Ok(None);
        }

        let created: SessionCreated = response.json().map_err(|e| malformed(&what, e))?;
        Ok(Some(SessionId::from(created.id)))
    }

    fn renew(&self, id: &SessionId) -> Result<bool, TransportError> {
        let url = self.endpoint(["session", "renew", id.as_str()])?;
        let what = format!("PUT {}", url.path());

        let response = self.send(self.http.put(url).query(&self.query()), &what)?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            _ => Err(unexpected(&what, response)),
        }
    }

    fn destroy(&self, id: &SessionId) -> Result<bool, TransportError> {
        let url = self.endpoint(["session", "destroy", id.as_str()])?;
        let what = format!("PUT {}", url.path());

        let response = self.send(self.http.put(url).query(&self.query()), &what)?;
        if !response.status().is_success() {
            return Err(unexpected(&what, response));
        }
        let body = text_of(&what, response)?;
        Ok(body.trim() == "true")
    }

    fn info(&self, id: &SessionId) -> Result<Option<SessionInfo>, TransportError> {
        let url = self.endpoint(["session", "info", id.as_str()])?;
        let what = format!("GET {}", url.path());

        let response = self.send(self.http.get(url).query(&self.query()), &what)?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                // Older agents answer `null` for an unknown session.
                let entries: Option<Vec<SessionEntry>> =
                    response.json().map_err(|e| malformed(&what, e))?;
                entries
                    .unwrap_or_default()
                    .into_iter()
                    .next()
                    .map(SessionEntry::into_session_info)
                    .transpose()
                    .map_err(|e| malformed(&what, e))
            }
            _ => Err(unexpected(&what, response)),
        }
    }
}

impl AgentClient for ConsulClient {
    fn describe_agent(&self) -> Result<Option<AgentDescriptor>, TransportError> {
        let url = self.endpoint(["agent", "self"])?;
        let what = format!("GET {}", url.path());

        let response = self.send(self.http.get(url), &what)?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let agent: AgentSelf = response.json().map_err(|e| malformed(&what, e))?;
                Ok(Some(agent.into()))
            }
            _ => Err(unexpected(&what, response)),
        }
    }
}

#[cfg(test)]
mod tests;

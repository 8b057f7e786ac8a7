//! JSON shapes of the Consul HTTP API and their conversion into the
//! transport-independent model.

use core::time::Duration;
use std::collections::BTreeMap;

use base64::{Engine, engine::general_purpose::STANDARD};
use consul_uid::{
    AgentConfig, AgentDescriptor, KeyValue, Member, SessionBehavior, SessionId, SessionInfo,
    SessionSpec,
};
use serde::{Deserialize, Serialize};

/// A response field the model cannot represent.
#[derive(Debug, thiserror::Error)]
pub(crate) enum WireError {
    #[error("value of `{key}` is not valid base64")]
    Value {
        key: String,
        #[source]
        source: base64::DecodeError,
    },
    #[error("`{field}` is not a duration: {value}")]
    Duration { field: &'static str, value: String },
    #[error("unknown session behavior `{0}`")]
    Behavior(String),
}

/// One element of the array returned by `GET /v1/kv/<key>`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct KvEntry {
    pub key: String,
    /// Base64; `null` for keys created without a body.
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub flags: u64,
    #[serde(default)]
    pub create_index: u64,
    #[serde(default)]
    pub modify_index: u64,
    #[serde(default)]
    pub lock_index: u64,
    #[serde(default)]
    pub session: Option<String>,
}

impl KvEntry {
    pub(crate) fn into_key_value(self) -> Result<KeyValue, WireError> {
        let value = match &self.value {
            Some(encoded) => decode_value(&self.key, encoded)?,
            None => Vec::new(),
        };
        Ok(KeyValue {
            key: self.key,
            value,
            flags: self.flags,
            create_index: self.create_index,
            modify_index: self.modify_index,
            lock_index: self.lock_index,
            session: self.session.map(SessionId::from),
        })
    }
}

fn decode_value(key: &str, encoded: &str) -> Result<Vec<u8>, WireError> {
    STANDARD.decode(encoded).map_err(|source| WireError::Value {
        key: key.to_owned(),
        source,
    })
}

/// Body of `PUT /v1/session/create`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct SessionCreateBody {
    pub name: String,
    pub lock_delay: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    /// Omitted when empty so the agent applies its default `serfHealth`
    /// check.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub checks: Vec<String>,
    pub behavior: &'static str,
    #[serde(rename = "TTL", skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,
}

impl From<&SessionSpec> for SessionCreateBody {
    fn from(spec: &SessionSpec) -> Self {
        Self {
            name: spec.name.clone(),
            lock_delay: format_go_duration(spec.lock_delay),
            node: spec.node.clone(),
            checks: spec.checks.clone(),
            behavior: spec.behavior.as_str(),
            ttl: spec.ttl.map(format_go_duration),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SessionCreated {
    #[serde(rename = "ID")]
    pub id: String,
}

/// `LockDelay` is reported as nanoseconds, but older agents echo the string
/// form back.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum GoDuration {
    Nanos(u64),
    Text(String),
}

impl GoDuration {
    fn to_duration(&self, field: &'static str) -> Result<Duration, WireError> {
        match self {
            Self::Nanos(nanos) => Ok(Duration::from_nanos(*nanos)),
            Self::Text(text) => parse_duration_field(field, text),
        }
    }
}

/// One element of the array returned by `GET /v1/session/info/<id>`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct SessionEntry {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub node: Option<String>,
    #[serde(default)]
    pub checks: Option<Vec<String>>,
    /// Replaces `Checks` on newer agents.
    #[serde(default)]
    pub node_checks: Option<Vec<String>>,
    #[serde(default)]
    pub lock_delay: Option<GoDuration>,
    #[serde(default)]
    pub behavior: Option<String>,
    #[serde(rename = "TTL", default)]
    pub ttl: Option<String>,
    #[serde(default)]
    pub create_index: u64,
}

impl SessionEntry {
    pub(crate) fn into_session_info(self) -> Result<SessionInfo, WireError> {
        let lock_delay = match &self.lock_delay {
            Some(delay) => delay.to_duration("LockDelay")?,
            None => Duration::ZERO,
        };
        let behavior = match self.behavior.as_deref() {
            None | Some("") | Some("release") => SessionBehavior::Release,
            Some("delete") => SessionBehavior::Delete,
            Some(other) => return Err(WireError::Behavior(other.to_owned())),
        };
        let ttl = match self.ttl.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(text) => Some(parse_duration_field("TTL", text)?),
        };
        let checks = self.node_checks.or(self.checks).unwrap_or_default();

        let mut spec = SessionSpec::new(self.name)
            .with_lock_delay(lock_delay)
            .with_checks(checks)
            .with_behavior(behavior)
            .with_ttl(ttl);
        spec.node = self.node.filter(|node| !node.is_empty());

        Ok(SessionInfo {
            id: SessionId::from(self.id),
            spec,
            create_index: self.create_index,
        })
    }
}

/// Response of `GET /v1/agent/self`, reduced to what identity resolution
/// needs.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct AgentSelf {
    pub config: AgentSelfConfig,
    pub member: AgentMember,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct AgentSelfConfig {
    #[serde(default)]
    pub node_name: String,
    #[serde(default)]
    pub datacenter: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct AgentMember {
    pub name: String,
    #[serde(default)]
    pub addr: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub status: u8,
}

impl From<AgentSelf> for AgentDescriptor {
    fn from(agent: AgentSelf) -> Self {
        Self {
            config: AgentConfig {
                node_name: agent.config.node_name,
                datacenter: agent.config.datacenter,
            },
            member: Member {
                name: agent.member.name,
                addr: agent.member.addr,
                port: agent.member.port,
                tags: agent.member.tags,
                status: agent.member.status,
            },
        }
    }
}

/// Formats `d` the way Go's `time.Duration` parser accepts, using the
/// coarsest unit that is exact.
pub(crate) fn format_go_duration(d: Duration) -> String {
    let nanos = d.subsec_nanos();
    if nanos == 0 {
        format!("{}s", d.as_secs())
    } else if nanos % 1_000_000 == 0 {
        format!("{}ms", d.as_millis())
    } else {
        format!("{}ns", d.as_nanos())
    }
}

/// Parses a Go duration string such as `15s`, `1m30s` or `1.5h`.
///
/// Negative durations are not accepted.
pub(crate) fn parse_go_duration(s: &str) -> Option<Duration> {
    const NANOS_PER_SEC: u128 = 1_000_000_000;

    let s = s.trim();
    if s == "0" {
        return Some(Duration::ZERO);
    }
    if s.is_empty() {
        return None;
    }

    let mut total: u128 = 0;
    let mut rest = s;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_len);
        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);

        let unit_nanos: u128 = match unit {
            "ns" => 1,
            "us" | "\u{b5}s" | "\u{3bc}s" => 1_000,
            "ms" => 1_000_000,
            "s" => NANOS_PER_SEC,
            "m" => 60 * NANOS_PER_SEC,
            "h" => 3_600 * NANOS_PER_SEC,
            _ => return None,
        };
        total = total.checked_add(scaled_nanos(number, unit_nanos)?)?;
        rest = tail;
    }

    let secs = u64::try_from(total / NANOS_PER_SEC).ok()?;
    let nanos = u32::try_from(total % NANOS_PER_SEC).ok()?;
    Some(Duration::new(secs, nanos))
}

fn parse_duration_field(field: &'static str, text: &str) -> Result<Duration, WireError> {
    parse_go_duration(text).ok_or_else(|| WireError::Duration {
        field,
        value: text.to_owned(),
    })
}

/// `number` (`"12"`, `"1.5"`, `".25"`) times `unit_nanos`, truncated.
fn scaled_nanos(number: &str, unit_nanos: u128) -> Option<u128> {
    let (whole, frac) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(whole) || !all_digits(frac) || frac.len() > 18 {
        return None;
    }

    let whole: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().ok()?
    };
    let mut nanos = whole.checked_mul(unit_nanos)?;
    if !frac.is_empty() {
        let scale = 10u128.pow(u32::try_from(frac.len()).ok()?);
        let frac: u128 = frac.parse().ok()?;
        nanos = nanos.checked_add(frac * unit_nanos / scale)?;
    }
    Some(nanos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kv_entry_decodes_base64_value() {
        let body = r#"[{
            "LockIndex": 1,
            "Key": ".extensions/uid/svc/.available.lock",
            "Flags": 0,
            "Value": "Y2F0",
            "Session": "adf4238a-882b-9ddc-4a9d-5b6758e4159e",
            "CreateIndex": 100,
            "ModifyIndex": 200
        }]"#;
        let mut entries: Vec<KvEntry> = serde_json::from_str(body).unwrap();
        let kv = entries.remove(0).into_key_value().unwrap();

        assert_eq!(kv.key, ".extensions/uid/svc/.available.lock");
        assert_eq!(kv.value, b"cat");
        assert_eq!(kv.lock_index, 1);
        assert_eq!(kv.create_index, 100);
        assert_eq!(kv.modify_index, 200);
        assert_eq!(
            kv.session,
            Some(SessionId::from("adf4238a-882b-9ddc-4a9d-5b6758e4159e"))
        );
    }

    #[test]
    fn kv_entry_without_value_is_empty() {
        let body = r#"[{
            "Key": "k",
            "Value": null,
            "Flags": 0,
            "CreateIndex": 3,
            "ModifyIndex": 3,
            "LockIndex": 0
        }]"#;
        let mut entries: Vec<KvEntry> = serde_json::from_str(body).unwrap();
        let kv = entries.remove(0).into_key_value().unwrap();
        assert!(kv.value.is_empty());
        assert_eq!(kv.session, None);
    }

    #[test]
    fn kv_entry_with_broken_base64_is_rejected() {
        let entry = KvEntry {
            key: String::from("k"),
            value: Some(String::from("***")),
            flags: 0,
            create_index: 0,
            modify_index: 0,
            lock_index: 0,
            session: None,
        };
        assert!(matches!(
            entry.into_key_value(),
            Err(WireError::Value { key, .. }) if key == "k"
        ));
    }

    #[test]
    fn session_create_body_uses_go_durations() {
        let spec = SessionSpec::new(".extensions/uid/svc/cat")
            .with_lock_delay(Duration::from_secs(15))
            .with_ttl(Some(Duration::from_secs(30)));
        let json = serde_json::to_value(SessionCreateBody::from(&spec)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "Name": ".extensions/uid/svc/cat",
                "LockDelay": "15s",
                "Behavior": "release",
                "TTL": "30s",
            })
        );
    }

    #[test]
    fn session_create_body_keeps_node_and_checks() {
        let spec = SessionSpec::new("s")
            .with_node("node-a")
            .with_checks(vec![String::from("serfHealth"), String::from("web")])
            .with_behavior(SessionBehavior::Delete)
            .with_ttl(None);
        let json = serde_json::to_value(SessionCreateBody::from(&spec)).unwrap();
        assert_eq!(json["Node"], "node-a");
        assert_eq!(json["Checks"], serde_json::json!(["serfHealth", "web"]));
        assert_eq!(json["Behavior"], "delete");
        assert!(json.get("TTL").is_none());
    }

    #[test]
    fn session_entry_accepts_numeric_lock_delay() {
        let body = r#"[{
            "ID": "adf4238a-882b-9ddc-4a9d-5b6758e4159e",
            "Name": ".extensions/uid/svc/cat",
            "Node": "node-a",
            "NodeChecks": ["serfHealth"],
            "LockDelay": 15000000000,
            "Behavior": "release",
            "TTL": "30s",
            "CreateIndex": 1086449,
            "ModifyIndex": 1086449
        }]"#;
        let mut entries: Vec<SessionEntry> = serde_json::from_str(body).unwrap();
        let info = entries.remove(0).into_session_info().unwrap();

        assert_eq!(info.id.as_str(), "adf4238a-882b-9ddc-4a9d-5b6758e4159e");
        assert_eq!(info.spec.lock_delay, Duration::from_secs(15));
        assert_eq!(info.spec.ttl, Some(Duration::from_secs(30)));
        assert_eq!(info.spec.node.as_deref(), Some("node-a"));
        assert_eq!(info.spec.checks, ["serfHealth"]);
        assert_eq!(info.create_index, 1_086_449);
    }

    #[test]
    fn session_entry_accepts_textual_lock_delay() {
        let body = r#"{"ID": "x", "LockDelay": "1m30s", "Behavior": "delete", "TTL": ""}"#;
        let entry: SessionEntry = serde_json::from_str(body).unwrap();
        let info = entry.into_session_info().unwrap();
        assert_eq!(info.spec.lock_delay, Duration::from_secs(90));
        assert_eq!(info.spec.behavior, SessionBehavior::Delete);
        assert_eq!(info.spec.ttl, None);
    }

    #[test]
    fn agent_self_yields_member_name() {
        let body = r#"{
            "Config": {"Datacenter": "dc1", "NodeName": "node-a", "Server": true},
            "Member": {
                "Name": "node-a",
                "Addr": "10.0.0.4",
                "Port": 8301,
                "Tags": {"dc": "dc1", "role": "consul"},
                "Status": 1,
                "ProtocolMin": 1
            },
            "Stats": {}
        }"#;
        let agent: AgentSelf = serde_json::from_str(body).unwrap();
        let descriptor = AgentDescriptor::from(agent);

        assert_eq!(descriptor.member.name, "node-a");
        assert_eq!(descriptor.member.port, 8301);
        assert_eq!(descriptor.member.tags["role"], "consul");
        assert_eq!(descriptor.config.datacenter, "dc1");
        assert_eq!(descriptor.config.node_name, "node-a");
    }

    #[test]
    fn go_durations_round_trip_common_values() {
        for (text, expected) in [
            ("15s", Duration::from_secs(15)),
            ("0", Duration::ZERO),
            ("250ms", Duration::from_millis(250)),
            ("1m30s", Duration::from_secs(90)),
            ("1.5h", Duration::from_secs(5400)),
            ("10us", Duration::from_micros(10)),
            ("0.1s", Duration::from_millis(100)),
        ] {
            assert_eq!(parse_go_duration(text), Some(expected), "{text}");
        }
        assert_eq!(format_go_duration(Duration::from_secs(15)), "15s");
        assert_eq!(format_go_duration(Duration::from_millis(1500)), "1500ms");
        assert_eq!(
            format_go_duration(Duration::from_nanos(1_000_001)),
            "1000001ns"
        );
        assert_eq!(format_go_duration(Duration::ZERO), "0s");
    }

    #[test]
    fn malformed_go_durations_are_rejected() {
        for text in ["", "s", "15", "15x", "-5s", "1..5s", ".s"] {
            assert_eq!(parse_go_duration(text), None, "{text}");
        }
    }
}

use core::fmt;

use crate::error::{Error, Result};

/// Semantically private key root shared by every client-side extension.
pub const EXTENSIONS_ROOT: &str = ".extensions";

/// Key (relative to the namespace) guarding the available counter.
pub const LOCK_KEY: &str = ".available.lock";

/// Key (relative to the namespace) holding the next integer to hand out.
pub const COUNTER_KEY: &str = ".available.uid";

/// The key prefix isolating one allocation domain, `.extensions/uid/<name>`.
///
/// Every key an allocator touches is derived from here, so two allocators
/// with different names can never observe each other's counters.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Namespace {
    name: String,
    prefix: String,
}

impl Namespace {
    /// Validates `name` and builds the namespace for it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the name is empty after trimming,
    /// does not start with an alphanumeric character, contains whitespace, or
    /// has an empty or relative path segment (`a//b`, `a/`, `a/../b`).
    pub fn new(name: &str) -> Result<Self> {
        let name = name.trim();
        let Some(first) = name.chars().next() else {
            return Err(Error::configuration("namespace name must not be empty"));
        };
        if !first.is_alphanumeric() {
            return Err(Error::configuration(format!(
                "namespace name `{name}` cannot start with a special character"
            )));
        }
        if name.chars().any(char::is_whitespace) {
            return Err(Error::configuration(format!(
                "namespace name `{name}` must not contain whitespace"
            )));
        }
        if name.split('/').any(str::is_empty) {
            return Err(Error::configuration(format!(
                "namespace name `{name}` has an empty path segment"
            )));
        }
        if name.split('/').any(|segment| segment == "." || segment == "..") {
            return Err(Error::configuration(format!(
                "namespace name `{name}` has a relative path segment"
            )));
        }

        Ok(Self {
            prefix: format!("{EXTENSIONS_ROOT}/uid/{name}"),
            name: name.to_owned(),
        })
    }

    /// The validated name this namespace was built from.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The fully-qualified key prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn lock_key(&self) -> String {
        format!("{}/{LOCK_KEY}", self.prefix)
    }

    pub fn counter_key(&self) -> String {
        format!("{}/{COUNTER_KEY}", self.prefix)
    }

    /// The client record key for an already validated client identity.
    pub fn client_key(&self, client_id: &str) -> String {
        format!("{}/{client_id}", self.prefix)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_keys_under_the_extensions_root() {
        let ns = Namespace::new("orders").unwrap();
        assert_eq!(ns.name(), "orders");
        assert_eq!(ns.prefix(), ".extensions/uid/orders");
        assert_eq!(ns.lock_key(), ".extensions/uid/orders/.available.lock");
        assert_eq!(ns.counter_key(), ".extensions/uid/orders/.available.uid");
        assert_eq!(ns.client_key("cat"), ".extensions/uid/orders/cat");
        assert_eq!(ns.to_string(), ".extensions/uid/orders");
    }

    #[test]
    fn trims_surrounding_whitespace() {
        let ns = Namespace::new("  workers/eu  ").unwrap();
        assert_eq!(ns.name(), "workers/eu");
        assert_eq!(ns.prefix(), ".extensions/uid/workers/eu");
    }

    #[test]
    fn rejects_malformed_names() {
        let malformed = [
            "",
            "   ",
            ".hidden",
            "/abs",
            "-dash",
            "a b",
            "a//b",
            "trailing/",
            "a/../b",
            "a/./b",
            "a/..",
        ];
        for name in malformed {
            let err = Namespace::new(name).unwrap_err();
            assert!(
                matches!(err, Error::Configuration { .. }),
                "`{name}` should be rejected, got {err:?}"
            );
        }
    }

    #[test]
    fn relative_segments_name_the_problem() {
        let err = Namespace::new("svc/../orders").unwrap_err();
        assert!(err.to_string().contains("relative path segment"), "{err}");
    }

    #[test]
    fn dots_inside_a_segment_are_fine() {
        let ns = Namespace::new("svc/v1.2/..x").unwrap();
        assert_eq!(ns.prefix(), ".extensions/uid/svc/v1.2/..x");
    }

    #[test]
    fn accepts_non_ascii_alphanumerics() {
        assert!(Namespace::new("ñandú").is_ok());
        assert!(Namespace::new("9lives").is_ok());
    }
}

//! String-backed identifiers used across the crate.

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the raw identifier.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Job identity assigned by the scheduler plugin framework.
    TaskId
);

string_id!(
    /// Sandbox identity assigned by the cluster scheduler.
    SandboxId
);

string_id!(
    /// Tenant (team) identity.
    TeamId
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn ids_lookup_by_str() {
        let mut map = HashMap::new();
        map.insert(TaskId::from("task-1"), 1);
        assert_eq!(map.get("task-1"), Some(&1));
    }

    #[test]
    fn ids_serialize_transparently() {
        let id = SandboxId::new("sbx-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"sbx-1\"");
        let back: SandboxId = serde_json::from_str("\"sbx-1\"").unwrap();
        assert_eq!(back, id);
    }
}

//! Per-resource security descriptor

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Single ACL entry as exchanged on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RbacAccessControl {
    pub id: String,
    pub role: String,
}

/// Security attached to a protected resource
///
/// The ACL is keyed by principal id, so an id can hold at most one role.
/// On the wire it is a list of `{id, role}` entries; duplicates collapse
/// with the last entry winning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSecurity {
    pub default: String,
    #[serde(
        default,
        serialize_with = "serialize_acl",
        deserialize_with = "deserialize_acl"
    )]
    access_control_list: BTreeMap<String, String>,
}

impl ResourceSecurity {
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            default: default.into(),
            access_control_list: BTreeMap::new(),
        }
    }

    /// Builder-style ACL entry, used when seeding a descriptor
    pub fn with_entry(mut self, id: impl Into<String>, role: impl Into<String>) -> Self {
        self.access_control_list.insert(id.into(), role.into());
        self
    }

    /// Explicit role for `id`, if any
    pub fn role_of(&self, id: &str) -> Option<&str> {
        self.access_control_list.get(id).map(String::as_str)
    }

    /// ACL entry for `id`, falling back to the default role
    pub fn effective_role(&self, id: &str) -> &str {
        self.role_of(id).unwrap_or(&self.default)
    }

    pub fn entries(&self) -> impl Iterator<Item = RbacAccessControl> + '_ {
        self.access_control_list
            .iter()
            .map(|(id, role)| RbacAccessControl {
                id: id.clone(),
                role: role.clone(),
            })
    }

    pub fn len(&self) -> usize {
        self.access_control_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.access_control_list.is_empty()
    }

    /// Replaces any existing entry for `id`
    pub(crate) fn set_entry(&mut self, id: &str, role: &str) {
        self.access_control_list
            .insert(id.to_string(), role.to_string());
    }

    pub(crate) fn remove_entry(&mut self, id: &str) -> Option<String> {
        self.access_control_list.remove(id)
    }
}

fn serialize_acl<S>(acl: &BTreeMap<String, String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_seq(acl.iter().map(|(id, role)| RbacAccessControl {
        id: id.clone(),
        role: role.clone(),
    }))
}

fn deserialize_acl<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = Vec::<RbacAccessControl>::deserialize(deserializer)?;
    Ok(entries.into_iter().map(|e| (e.id, e.role)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_role_falls_back_to_default() {
        let security = ResourceSecurity::new("viewer").with_entry("alice", "editor");
        assert_eq!(security.effective_role("alice"), "editor");
        assert_eq!(security.effective_role("bob"), "viewer");
    }

    #[test]
    fn test_set_entry_last_write_wins() {
        let mut security = ResourceSecurity::new("none");
        security.set_entry("alice", "viewer");
        security.set_entry("alice", "editor");
        assert_eq!(security.len(), 1);
        assert_eq!(security.role_of("alice"), Some("editor"));
    }

    #[test]
    fn test_remove_entry_reverts_to_default() {
        let mut security = ResourceSecurity::new("viewer");
        security.set_entry("alice", "admin");
        assert_eq!(security.remove_entry("alice").as_deref(), Some("admin"));
        assert_eq!(security.effective_role("alice"), "viewer");
        assert!(security.is_empty());
    }

    #[test]
    fn test_wire_format() {
        let json = r#"{
            "default": "none",
            "accessControlList": [
                { "id": "alice", "role": "viewer" },
                { "id": "bob", "role": "editor" },
                { "id": "alice", "role": "admin" }
            ]
        }"#;
        let security: ResourceSecurity = serde_json::from_str(json).unwrap();
        assert_eq!(security.len(), 2);
        assert_eq!(security.role_of("alice"), Some("admin"));

        let value = serde_json::to_value(&security).unwrap();
        assert_eq!(value["default"], "none");
        assert_eq!(value["accessControlList"][0]["id"], "alice");
        assert_eq!(value["accessControlList"][1]["role"], "editor");
    }

    #[test]
    fn test_missing_acl_defaults_to_empty() {
        let security: ResourceSecurity = serde_json::from_str(r#"{"default":"viewer"}"#).unwrap();
        assert!(security.is_empty());
    }
}

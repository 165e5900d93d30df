use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::func_key::Destination;

/// One programmed key of a template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncKeyMapping {
    pub label: Option<String>,
    /// Busy lamp field supervision of the destination
    pub blf: bool,
    pub destination: Destination,
}

impl FuncKeyMapping {
    pub fn new(destination: Destination) -> Self {
        Self {
            label: None,
            blf: true,
            destination,
        }
    }
}

/// Func keys indexed by their position on the phone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncKeyTemplate {
    pub id: i64,
    pub tenant_uuid: String,
    pub name: Option<String>,
    /// Private templates belong to a single user
    pub private: bool,
    pub keys: BTreeMap<u32, FuncKeyMapping>,
}

impl FuncKeyTemplate {
    pub fn new(tenant_uuid: &str, name: Option<&str>) -> Self {
        Self {
            id: 0,
            tenant_uuid: tenant_uuid.to_string(),
            name: name.map(str::to_string),
            private: false,
            keys: BTreeMap::new(),
        }
    }

    pub fn with_key(mut self, position: u32, mapping: FuncKeyMapping) -> Self {
        self.keys.insert(position, mapping);
        self
    }

    /// Unsaved template holding our keys overridden by `other`'s
    pub fn merge(&self, other: &FuncKeyTemplate) -> FuncKeyTemplate {
        let mut keys = self.keys.clone();
        keys.extend(other.keys.iter().map(|(position, mapping)| (*position, mapping.clone())));

        FuncKeyTemplate {
            id: 0,
            tenant_uuid: self.tenant_uuid.clone(),
            name: None,
            private: false,
            keys,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::func_key::{CustomDestination, UserDestination};

    fn user_key(user_id: i64) -> FuncKeyMapping {
        FuncKeyMapping::new(Destination::User(UserDestination { user_id }))
    }

    #[test]
    fn test_merge_other_keys_win() {
        let shared = FuncKeyTemplate::new("tenant", Some("shared"))
            .with_key(1, user_key(10))
            .with_key(2, user_key(20));
        let private = FuncKeyTemplate::new("tenant", None).with_key(
            2,
            FuncKeyMapping::new(Destination::Custom(CustomDestination {
                exten: "*10".to_string(),
            })),
        );

        let merged = shared.merge(&private);
        assert_eq!(merged.keys.len(), 2);
        assert_eq!(merged.keys[&1], user_key(10));
        assert_eq!(merged.keys[&2], private.keys[&2]);
        assert_eq!(merged.id, 0);
        assert_eq!(merged.name, None);
    }

    #[test]
    fn test_merge_empty() {
        let template = FuncKeyTemplate::new("tenant", Some("t")).with_key(3, user_key(1));
        let merged = template.merge(&FuncKeyTemplate::new("tenant", None));
        assert_eq!(merged.keys, template.keys);
    }
}

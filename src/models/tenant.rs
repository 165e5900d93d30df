use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tenant {
    pub uuid: String,
    pub name: Option<String>,
}

impl Tenant {
    /// A tenant with a freshly generated v4 uuid
    pub fn new(name: Option<&str>) -> Self {
        Self {
            uuid: uuid::Uuid::new_v4().to_string(),
            name: name.map(str::to_string),
        }
    }
}

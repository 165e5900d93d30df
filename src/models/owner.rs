//! Groups, queues, conferences and outcalls: entities dialed through extensions

use serde::{Deserialize, Serialize};

use super::extension::{Extension, ExtensionOwnerKind};
use super::line::Line;

/// An entity whose denormalized fields mirror its main extension
pub trait ExtensionOwner {
    const KIND: ExtensionOwnerKind;

    fn owner_id(&self) -> i64;

    fn fix_main_extension(&mut self, main: Option<&Extension>);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Group {
    pub id: i64,
    pub tenant_uuid: String,
    pub name: String,
    pub number: Option<String>,
    pub context: Option<String>,
    /// Ring timeout in seconds
    pub timeout: Option<i64>,
    pub preprocess_subroutine: Option<String>,
    pub enabled: bool,
}

impl Group {
    pub fn new(tenant_uuid: &str, name: &str) -> Self {
        Self {
            id: 0,
            tenant_uuid: tenant_uuid.to_string(),
            name: name.to_string(),
            number: None,
            context: None,
            timeout: None,
            preprocess_subroutine: None,
            enabled: true,
        }
    }
}

impl ExtensionOwner for Group {
    const KIND: ExtensionOwnerKind = ExtensionOwnerKind::Group;

    fn owner_id(&self) -> i64 {
        self.id
    }

    fn fix_main_extension(&mut self, main: Option<&Extension>) {
        match main {
            Some(extension) => {
                self.number = Some(extension.exten.clone());
                self.context = Some(extension.context.clone());
            }
            None => self.number = None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Queue {
    pub id: i64,
    pub tenant_uuid: String,
    pub name: String,
    pub display_name: String,
    pub number: Option<String>,
    pub context: Option<String>,
    pub timeout: Option<i64>,
    pub preprocess_subroutine: Option<String>,
    pub enabled: bool,
}

impl Queue {
    pub fn new(tenant_uuid: &str, name: &str) -> Self {
        Self {
            id: 0,
            tenant_uuid: tenant_uuid.to_string(),
            name: name.to_string(),
            display_name: name.to_string(),
            number: None,
            context: None,
            timeout: None,
            preprocess_subroutine: None,
            enabled: true,
        }
    }
}

impl ExtensionOwner for Queue {
    const KIND: ExtensionOwnerKind = ExtensionOwnerKind::Queue;

    fn owner_id(&self) -> i64 {
        self.id
    }

    fn fix_main_extension(&mut self, main: Option<&Extension>) {
        match main {
            Some(extension) => {
                self.number = Some(extension.exten.clone());
                self.context = Some(extension.context.clone());
            }
            None => self.number = None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Conference {
    pub id: i64,
    pub tenant_uuid: String,
    pub name: Option<String>,
    pub number: Option<String>,
    pub context: Option<String>,
    /// 0 means unlimited
    pub max_users: i64,
    pub pin: Option<String>,
}

impl Conference {
    pub fn new(tenant_uuid: &str, name: Option<&str>) -> Self {
        Self {
            id: 0,
            tenant_uuid: tenant_uuid.to_string(),
            name: name.map(str::to_string),
            number: None,
            context: None,
            max_users: 50,
            pin: None,
        }
    }
}

impl ExtensionOwner for Conference {
    const KIND: ExtensionOwnerKind = ExtensionOwnerKind::Conference;

    fn owner_id(&self) -> i64 {
        self.id
    }

    fn fix_main_extension(&mut self, main: Option<&Extension>) {
        match main {
            Some(extension) => {
                self.number = Some(extension.exten.clone());
                self.context = Some(extension.context.clone());
            }
            None => self.number = None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Outcall {
    pub id: i64,
    pub tenant_uuid: String,
    pub name: String,
    /// Follows the main extension, `None` without one
    pub context: Option<String>,
    pub internal_caller_id: bool,
    pub ring_time: Option<i64>,
    pub enabled: bool,
    pub description: Option<String>,
}

impl Outcall {
    pub fn new(tenant_uuid: &str, name: &str) -> Self {
        Self {
            id: 0,
            tenant_uuid: tenant_uuid.to_string(),
            name: name.to_string(),
            context: None,
            internal_caller_id: false,
            ring_time: None,
            enabled: true,
            description: None,
        }
    }
}

impl ExtensionOwner for Outcall {
    const KIND: ExtensionOwnerKind = ExtensionOwnerKind::Outcall;

    fn owner_id(&self) -> i64 {
        self.id
    }

    fn fix_main_extension(&mut self, main: Option<&Extension>) {
        self.context = main.map(|extension| extension.context.clone());
    }
}

impl ExtensionOwner for Line {
    const KIND: ExtensionOwnerKind = ExtensionOwnerKind::Line;

    fn owner_id(&self) -> i64 {
        self.id
    }

    fn fix_main_extension(&mut self, main: Option<&Extension>) {
        match main {
            Some(extension) => self.update_extension(extension),
            None => self.clear_extension(),
        }
    }
}

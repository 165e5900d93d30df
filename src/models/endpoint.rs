//! Protocol-specific endpoint records backing lines and trunks

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Sip,
    Iax,
    Sccp,
    Custom,
}

impl Protocol {
    pub const ALL: [Protocol; 4] = [Protocol::Sip, Protocol::Iax, Protocol::Sccp, Protocol::Custom];

    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Sip => "sip",
            Protocol::Iax => "iax",
            Protocol::Sccp => "sccp",
            Protocol::Custom => "custom",
        }
    }

    /// Table holding endpoints of this protocol
    pub fn table(self) -> &'static str {
        match self {
            Protocol::Sip => "endpoint_sip",
            Protocol::Iax => "endpoint_iax",
            Protocol::Sccp => "endpoint_sccp",
            Protocol::Custom => "endpoint_custom",
        }
    }

    pub fn resource(self) -> &'static str {
        match self {
            Protocol::Sip => "SIPEndpoint",
            Protocol::Iax => "IAXEndpoint",
            Protocol::Sccp => "SCCPEndpoint",
            Protocol::Custom => "CustomEndpoint",
        }
    }
}

impl FromStr for Protocol {
    type Err = AppError;

    /// Case-insensitive, `"SIP"` and `"sip"` are the same protocol
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sip" => Ok(Protocol::Sip),
            "iax" => Ok(Protocol::Iax),
            "sccp" => Ok(Protocol::Sccp),
            "custom" => Ok(Protocol::Custom),
            _ => Err(AppError::value(format!("{} is not a valid line protocol", s))),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, sqlx::FromRow)]
pub struct EndpointSip {
    pub id: i64,
    /// Peer name, also used as the SIP username
    pub name: String,
    pub username: Option<String>,
    pub secret: Option<String>,
    /// `"Name" <Number>` formatted caller id
    pub callerid: Option<String>,
    pub context: Option<String>,
    pub host: String,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, sqlx::FromRow)]
pub struct EndpointSccp {
    pub id: i64,
    pub name: String,
    pub context: Option<String>,
    pub cid_name: Option<String>,
    pub cid_num: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, sqlx::FromRow)]
pub struct EndpointIax {
    pub id: i64,
    pub name: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub type_: String,
    pub host: String,
    pub category: String,
    pub context: Option<String>,
    pub callerid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, sqlx::FromRow)]
pub struct EndpointCustom {
    pub id: i64,
    pub interface: String,
    pub context: Option<String>,
    pub category: String,
}

/// An endpoint of any protocol, resolved once when its owner is loaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum Endpoint {
    Sip(EndpointSip),
    Iax(EndpointIax),
    Sccp(EndpointSccp),
    Custom(EndpointCustom),
}

impl Endpoint {
    pub fn protocol(&self) -> Protocol {
        match self {
            Endpoint::Sip(_) => Protocol::Sip,
            Endpoint::Iax(_) => Protocol::Iax,
            Endpoint::Sccp(_) => Protocol::Sccp,
            Endpoint::Custom(_) => Protocol::Custom,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            Endpoint::Sip(e) => e.id,
            Endpoint::Iax(e) => e.id,
            Endpoint::Sccp(e) => e.id,
            Endpoint::Custom(e) => e.id,
        }
    }

    pub(crate) fn set_id(&mut self, id: i64) {
        match self {
            Endpoint::Sip(e) => e.id = id,
            Endpoint::Iax(e) => e.id = id,
            Endpoint::Sccp(e) => e.id = id,
            Endpoint::Custom(e) => e.id = id,
        }
    }

    /// The field naming this endpoint, `None` when blank
    pub fn identifying_name(&self) -> Option<&str> {
        let name = match self {
            Endpoint::Sip(e) => e.name.as_str(),
            Endpoint::Iax(e) => e.name.as_str(),
            Endpoint::Sccp(e) => e.name.as_str(),
            Endpoint::Custom(e) => e.interface.as_str(),
        };
        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }

    pub fn context(&self) -> Option<&str> {
        match self {
            Endpoint::Sip(e) => e.context.as_deref(),
            Endpoint::Iax(e) => e.context.as_deref(),
            Endpoint::Sccp(e) => e.context.as_deref(),
            Endpoint::Custom(e) => e.context.as_deref(),
        }
    }

    pub fn set_context(&mut self, context: Option<String>) {
        match self {
            Endpoint::Sip(e) => e.context = context,
            Endpoint::Iax(e) => e.context = context,
            Endpoint::Sccp(e) => e.context = context,
            Endpoint::Custom(e) => e.context = context,
        }
    }

    /// Category column shared by SIP, IAX and custom endpoints
    pub(crate) fn set_category(&mut self, category: &str) {
        match self {
            Endpoint::Sip(e) => e.category = category.to_string(),
            Endpoint::Iax(e) => e.category = category.to_string(),
            Endpoint::Custom(e) => e.category = category.to_string(),
            Endpoint::Sccp(_) => {}
        }
    }

    pub fn same_endpoint(&self, protocol: Option<Protocol>, protocol_id: Option<i64>) -> bool {
        protocol == Some(self.protocol()) && protocol_id == Some(self.id())
    }
}

impl EndpointSip {
    pub fn new(name: Option<&str>) -> Self {
        Self {
            name: name.unwrap_or_default().to_string(),
            host: "dynamic".to_string(),
            category: "user".to_string(),
            ..Default::default()
        }
    }
}

impl EndpointSccp {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

impl EndpointIax {
    pub fn new(name: Option<&str>) -> Self {
        Self {
            name: name.unwrap_or_default().to_string(),
            ..Default::default()
        }
    }

    /// Defaults applied on creation when the caller left fields blank
    pub fn fill_default_values(&mut self) {
        if self.type_.is_empty() {
            self.type_ = "friend".to_string();
        }
        if self.host.is_empty() {
            self.host = "dynamic".to_string();
        }
        if self.category.is_empty() {
            self.category = "trunk".to_string();
        }
    }
}

impl EndpointCustom {
    pub fn new(interface: &str) -> Self {
        Self {
            interface: interface.to_string(),
            category: "user".to_string(),
            ..Default::default()
        }
    }
}

/// Validate a raw `(protocol, protocol_id)` pair read from a line or trunk row
pub fn parse_protocol_pair(
    protocol: Option<&str>,
    protocol_id: Option<i64>,
) -> AppResult<Option<(Protocol, i64)>> {
    match (protocol, protocol_id) {
        (None, None) => Ok(None),
        (Some(protocol), Some(id)) => Ok(Some((protocol.parse()?, id))),
        _ => Err(AppError::Internal(
            "protocol and protocol id must be set together".to_string(),
        )),
    }
}

use serde::{Deserialize, Serialize};

use super::endpoint::{Endpoint, Protocol};
use crate::error::{AppError, AppResult};

/// An outgoing trunk, backed by a SIP, IAX or custom endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trunk {
    pub id: i64,
    pub tenant_uuid: String,
    pub context: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    endpoint: Option<Endpoint>,
}

/// A trunk dialed by an outcall; lower priorities are tried first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct OutcallTrunk {
    pub outcall_id: i64,
    pub trunk_id: i64,
    pub priority: i64,
}

impl Trunk {
    pub fn new(tenant_uuid: &str) -> Self {
        Self {
            id: 0,
            tenant_uuid: tenant_uuid.to_string(),
            context: None,
            name: None,
            description: None,
            endpoint: None,
        }
    }

    pub(crate) fn with_endpoint(mut self, endpoint: Option<Endpoint>) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    pub fn endpoint_mut(&mut self) -> Option<&mut Endpoint> {
        self.endpoint.as_mut()
    }

    pub fn protocol(&self) -> Option<Protocol> {
        self.endpoint.as_ref().map(Endpoint::protocol)
    }

    pub fn protocol_id(&self) -> Option<i64> {
        self.endpoint.as_ref().map(Endpoint::id)
    }

    pub fn is_associated(&self) -> bool {
        self.endpoint.is_some()
    }

    pub fn is_associated_with(&self, endpoint: &Endpoint) -> bool {
        endpoint.same_endpoint(self.protocol(), self.protocol_id())
    }

    pub fn associate_endpoint(&mut self, endpoint: Endpoint) -> AppResult<()> {
        check_trunk_protocol(endpoint.protocol())?;
        self.endpoint = Some(endpoint);
        Ok(())
    }

    pub fn remove_endpoint(&mut self) -> Option<Endpoint> {
        self.endpoint.take()
    }

    pub fn update_name(&mut self) {
        self.name = self
            .endpoint
            .as_ref()
            .and_then(Endpoint::identifying_name)
            .map(str::to_string);
    }

    pub fn sync_endpoint_context(&mut self) {
        let context = self.context.clone();
        if let Some(endpoint) = self.endpoint.as_mut() {
            endpoint.set_context(context);
        }
    }

    /// `PROTOCOL/name` of the trunk peer, bare interface for custom
    pub fn interface(&self) -> Option<String> {
        let name = self.name.as_deref()?;
        match self.protocol()? {
            Protocol::Custom => Some(name.to_string()),
            protocol => Some(format!("{}/{}", protocol.as_str().to_uppercase(), name)),
        }
    }
}

pub fn check_trunk_protocol(protocol: Protocol) -> AppResult<()> {
    if protocol == Protocol::Sccp {
        return Err(AppError::input(
            "Cannot associate an endpoint of type 'sccp' to a trunk",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::endpoint::{EndpointCustom, EndpointIax, EndpointSccp};

    #[test]
    fn test_sccp_is_rejected() {
        let mut trunk = Trunk::new("tenant");
        let err = trunk
            .associate_endpoint(Endpoint::Sccp(EndpointSccp::new("1000")))
            .unwrap_err();
        assert!(err.is_input_error());
        assert!(!trunk.is_associated());
    }

    #[test]
    fn test_name_and_context_follow_endpoint() {
        let mut trunk = Trunk::new("tenant");
        trunk.context = Some("to-extern".to_string());
        trunk
            .associate_endpoint(Endpoint::Iax(EndpointIax::new(Some("provider"))))
            .unwrap();
        trunk.update_name();
        trunk.sync_endpoint_context();

        assert_eq!(trunk.name.as_deref(), Some("provider"));
        assert_eq!(trunk.interface().as_deref(), Some("IAX/provider"));
        assert_eq!(trunk.endpoint().and_then(Endpoint::context), Some("to-extern"));

        trunk.remove_endpoint();
        trunk.update_name();
        assert_eq!(trunk.name, None);
    }

    #[test]
    fn test_custom_interface() {
        let mut trunk = Trunk::new("tenant");
        trunk
            .associate_endpoint(Endpoint::Custom(EndpointCustom::new("dahdi/g1")))
            .unwrap();
        trunk.update_name();
        assert_eq!(trunk.interface().as_deref(), Some("dahdi/g1"));
    }
}

use serde::{Deserialize, Serialize};

use super::caller_id::{self, CallerId};
use super::endpoint::{Endpoint, Protocol};
use super::extension::Extension;
use crate::error::{AppError, AppResult};

/// A line of the PBX, backed by at most one protocol endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub id: i64,
    pub tenant_uuid: String,
    pub context: String,
    /// Derived from the endpoint, see [`Line::update_name`]
    pub name: Option<String>,
    /// Cache of the main extension's `exten`
    pub number: Option<String>,
    provisioning_id: i64,
    /// Slot of the line on its device
    pub position: i64,
    pub device_id: Option<String>,
    pub registrar: String,
    pub enabled: bool,
    pub description: Option<String>,
    endpoint: Option<Endpoint>,
}

impl Line {
    pub fn new(tenant_uuid: &str, context: &str) -> Self {
        Self {
            id: 0,
            tenant_uuid: tenant_uuid.to_string(),
            context: context.to_string(),
            name: None,
            number: None,
            provisioning_id: 0,
            position: 1,
            device_id: None,
            registrar: "default".to_string(),
            enabled: true,
            description: None,
            endpoint: None,
        }
    }

    pub(crate) fn with_storage(mut self, provisioning_id: i64, endpoint: Option<Endpoint>) -> Self {
        self.provisioning_id = provisioning_id;
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

    pub fn is_associated(&self, protocol: Option<Protocol>) -> bool {
        match (protocol, &self.endpoint) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(protocol), Some(endpoint)) => endpoint.protocol() == protocol,
        }
    }

    pub fn is_associated_with(&self, endpoint: &Endpoint) -> bool {
        endpoint.same_endpoint(self.protocol(), self.protocol_id())
    }

    pub fn associate_endpoint(&mut self, endpoint: Endpoint) {
        self.endpoint = Some(endpoint);
    }

    pub fn remove_endpoint(&mut self) -> Option<Endpoint> {
        self.endpoint.take()
    }

    /// `PROTOCOL/name`, or the bare interface for custom endpoints
    pub fn interface(&self) -> Option<String> {
        let name = self.name.as_deref()?;
        match self.protocol()? {
            Protocol::Custom => Some(name.to_string()),
            protocol => Some(format!("{}/{}", protocol.as_str().to_uppercase(), name)),
        }
    }

    pub fn caller_id_name(&self) -> Option<String> {
        match self.endpoint.as_ref()? {
            Endpoint::Sip(sip) => sip
                .callerid
                .as_deref()
                .and_then(CallerId::parse)
                .map(|caller_id| caller_id.name),
            Endpoint::Sccp(sccp) => sccp.cid_name.clone(),
            Endpoint::Iax(_) | Endpoint::Custom(_) => None,
        }
    }

    pub fn caller_id_num(&self) -> Option<String> {
        match self.endpoint.as_ref()? {
            Endpoint::Sip(sip) => sip
                .callerid
                .as_deref()
                .and_then(CallerId::parse)
                .and_then(|caller_id| caller_id.num),
            Endpoint::Sccp(sccp) => sccp.cid_num.clone(),
            Endpoint::Iax(_) | Endpoint::Custom(_) => None,
        }
    }

    pub fn set_caller_id_name(&mut self, value: &str) -> AppResult<()> {
        match self.endpoint.as_mut() {
            None => Err(AppError::input(
                "Cannot set caller id on a line without endpoint",
            )),
            Some(Endpoint::Sip(sip)) => {
                caller_id::validate_name(value)?;
                let num = sip
                    .callerid
                    .as_deref()
                    .and_then(CallerId::parse)
                    .and_then(|caller_id| caller_id.num);
                let caller_id = CallerId {
                    name: value.to_string(),
                    num,
                };
                sip.callerid = Some(caller_id.format());
                Ok(())
            }
            Some(Endpoint::Sccp(sccp)) => {
                sccp.cid_name = Some(value.to_string());
                Ok(())
            }
            Some(Endpoint::Custom(_)) => Err(AppError::input(
                "Cannot set caller id on endpoint of type 'custom'",
            )),
            Some(Endpoint::Iax(_)) => Err(AppError::input("Unsupported caller id protocol")),
        }
    }

    pub fn set_caller_id_num(&mut self, value: &str) -> AppResult<()> {
        match self.endpoint.as_mut() {
            None => Err(AppError::input(
                "Cannot set caller id on a line without endpoint",
            )),
            Some(Endpoint::Sip(sip)) => {
                caller_id::validate_num(value)?;
                let name = sip
                    .callerid
                    .as_deref()
                    .and_then(CallerId::parse)
                    .map(|caller_id| caller_id.name)
                    .ok_or_else(|| {
                        AppError::input("Cannot set caller id num without a caller id name")
                    })?;
                let caller_id = CallerId {
                    name,
                    num: Some(value.to_string()),
                };
                sip.callerid = Some(caller_id.format());
                Ok(())
            }
            Some(Endpoint::Sccp(_)) => Err(AppError::input(
                "Cannot set caller id num on endpoint of type 'sccp'",
            )),
            Some(Endpoint::Custom(_)) => Err(AppError::input(
                "Cannot set caller id on endpoint of type 'custom'",
            )),
            Some(Endpoint::Iax(_)) => Err(AppError::input("Unsupported caller id protocol")),
        }
    }

    pub fn update_extension(&mut self, extension: &Extension) {
        self.number = Some(extension.exten.clone());
        self.context = extension.context.clone();
    }

    pub fn clear_extension(&mut self) {
        self.number = None;
    }

    /// Follow the name of a SIP, SCCP or custom endpoint. An IAX endpoint
    /// leaves the line name alone.
    pub fn update_name(&mut self) {
        if let Some(Endpoint::Iax(_)) = self.endpoint {
            return;
        }
        self.name = self
            .endpoint
            .as_ref()
            .and_then(Endpoint::identifying_name)
            .map(str::to_string);
    }

    /// The endpoint dials out of the line's context
    pub fn sync_endpoint_context(&mut self) {
        let context = self.context.clone();
        if let Some(endpoint) = self.endpoint.as_mut() {
            endpoint.set_context(Some(context));
        }
    }

    pub fn associate_device(&mut self, device_id: &str) {
        self.device_id = Some(device_id.to_string()).filter(|id| !id.is_empty());
    }

    pub fn remove_device(&mut self) {
        self.device_id = None;
    }

    pub fn provisioning_code(&self) -> Option<String> {
        if self.provisioning_id == 0 {
            None
        } else {
            Some(self.provisioning_id.to_string())
        }
    }

    pub(crate) fn provisioning_id(&self) -> i64 {
        self.provisioning_id
    }

    pub fn set_provisioning_code(&mut self, code: Option<&str>) -> AppResult<()> {
        self.provisioning_id = match code {
            None => 0,
            Some(code) => {
                if code.is_empty() || !code.chars().all(|c| c.is_ascii_digit()) {
                    return Err(AppError::input(format!(
                        "provisioning code '{}' must be numeric",
                        code
                    )));
                }
                code.parse::<i64>().map_err(|_| {
                    AppError::input(format!("provisioning code '{}' is out of range", code))
                })?
            }
        };
        Ok(())
    }
}

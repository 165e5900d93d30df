pub mod caller_id;
pub mod endpoint;
pub mod extension;
pub mod func_key;
pub mod func_key_template;
pub mod line;
pub mod owner;
pub mod tenant;
pub mod trunk;

pub use caller_id::CallerId;
pub use endpoint::{Endpoint, EndpointCustom, EndpointIax, EndpointSccp, EndpointSip, Protocol};
pub use extension::{
    Extension, ExtensionAssociation, ExtensionAssociations, ExtensionOwnerKind, ForwardExtension,
    ServiceExtension,
};
pub use func_key::{Destination, DestinationType, ForwardType, FuncKey};
pub use func_key_template::{FuncKeyMapping, FuncKeyTemplate};
pub use line::Line;
pub use owner::{Conference, ExtensionOwner, Group, Outcall, Queue};
pub use tenant::Tenant;
pub use trunk::{OutcallTrunk, Trunk};

//! Func keys and their destination variants
//!
//! A func key is a programmable button pointing at exactly one destination.
//! The destination kind is carried by a numeric discriminator shared between
//! the `func_key` row and the row of the per-kind destination table, so the
//! discriminator of a func key can never drift from the variant attached to it.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AppError, AppResult};

/// Func key type of every key handled here (`func_key_type.id`)
pub const SPEEDDIAL_TYPE_ID: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationType {
    User,
    Group,
    Queue,
    Conference,
    Service,
    Forward,
    ParkPosition,
    Features,
    Paging,
    Custom,
    Agent,
    BsFilter,
    GroupMember,
}

impl DestinationType {
    pub const ALL: [DestinationType; 13] = [
        DestinationType::User,
        DestinationType::Group,
        DestinationType::Queue,
        DestinationType::Conference,
        DestinationType::Service,
        DestinationType::Forward,
        DestinationType::ParkPosition,
        DestinationType::Features,
        DestinationType::Paging,
        DestinationType::Custom,
        DestinationType::Agent,
        DestinationType::BsFilter,
        DestinationType::GroupMember,
    ];

    /// Fixed discriminator stored in `destination_type_id`
    pub fn id(self) -> i64 {
        match self {
            DestinationType::User => 1,
            DestinationType::Group => 2,
            DestinationType::Queue => 3,
            DestinationType::Conference => 4,
            DestinationType::Service => 5,
            DestinationType::Forward => 6,
            DestinationType::ParkPosition => 7,
            DestinationType::Features => 8,
            DestinationType::Paging => 9,
            DestinationType::Custom => 10,
            DestinationType::Agent => 11,
            DestinationType::BsFilter => 12,
            DestinationType::GroupMember => 13,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DestinationType::User => "user",
            DestinationType::Group => "group",
            DestinationType::Queue => "queue",
            DestinationType::Conference => "conference",
            DestinationType::Service => "service",
            DestinationType::Forward => "forward",
            DestinationType::ParkPosition => "park_position",
            DestinationType::Features => "features",
            DestinationType::Paging => "paging",
            DestinationType::Custom => "custom",
            DestinationType::Agent => "agent",
            DestinationType::BsFilter => "bsfilter",
            DestinationType::GroupMember => "groupmember",
        }
    }

    /// Table holding the destination rows of this kind
    pub fn table(self) -> &'static str {
        match self {
            DestinationType::User => "func_key_dest_user",
            DestinationType::Group => "func_key_dest_group",
            DestinationType::Queue => "func_key_dest_queue",
            DestinationType::Conference => "func_key_dest_conference",
            DestinationType::Service => "func_key_dest_service",
            DestinationType::Forward => "func_key_dest_forward",
            DestinationType::ParkPosition => "func_key_dest_park_position",
            DestinationType::Features => "func_key_dest_features",
            DestinationType::Paging => "func_key_dest_paging",
            DestinationType::Custom => "func_key_dest_custom",
            DestinationType::Agent => "func_key_dest_agent",
            DestinationType::BsFilter => "func_key_dest_bsfilter",
            DestinationType::GroupMember => "func_key_dest_groupmember",
        }
    }

    pub fn from_id(id: i64) -> AppResult<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.id() == id)
            .ok_or_else(|| AppError::value(format!("{} is not a valid destination type id", id)))
    }

    pub fn from_name(name: &str) -> AppResult<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.name() == name)
            .ok_or_else(|| AppError::value(format!("'{}' is not a valid destination type", name)))
    }
}

impl TryFrom<i64> for DestinationType {
    type Error = AppError;

    fn try_from(id: i64) -> Result<Self, Self::Error> {
        Self::from_id(id)
    }
}

impl fmt::Display for DestinationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserDestination {
    pub user_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupDestination {
    pub group_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueDestination {
    pub queue_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConferenceDestination {
    pub conference_id: i64,
}

/// Service extension such as `*90` (enable DND)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceDestination {
    pub extension_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForwardDestination {
    pub extension_id: i64,
    pub number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParkPositionDestination {
    pub parking_lot_id: i64,
    pub park_position: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeaturesDestination {
    pub features_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PagingDestination {
    pub paging_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomDestination {
    pub exten: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentDestination {
    pub agent_id: i64,
    pub extension_id: i64,
}

/// Boss-secretary filter member
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BsFilterDestination {
    pub filter_member_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupMemberDestination {
    pub group_id: i64,
    pub extension_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Destination {
    User(UserDestination),
    Group(GroupDestination),
    Queue(QueueDestination),
    Conference(ConferenceDestination),
    Service(ServiceDestination),
    Forward(ForwardDestination),
    ParkPosition(ParkPositionDestination),
    Features(FeaturesDestination),
    Paging(PagingDestination),
    Custom(CustomDestination),
    Agent(AgentDestination),
    #[serde(rename = "bsfilter")]
    BsFilter(BsFilterDestination),
    #[serde(rename = "groupmember")]
    GroupMember(GroupMemberDestination),
}

/// Identifying fields of a destination, sorted by field name
pub type DestinationTuple = Vec<(&'static str, String)>;

impl Destination {
    pub fn destination_type(&self) -> DestinationType {
        match self {
            Destination::User(_) => DestinationType::User,
            Destination::Group(_) => DestinationType::Group,
            Destination::Queue(_) => DestinationType::Queue,
            Destination::Conference(_) => DestinationType::Conference,
            Destination::Service(_) => DestinationType::Service,
            Destination::Forward(_) => DestinationType::Forward,
            Destination::ParkPosition(_) => DestinationType::ParkPosition,
            Destination::Features(_) => DestinationType::Features,
            Destination::Paging(_) => DestinationType::Paging,
            Destination::Custom(_) => DestinationType::Custom,
            Destination::Agent(_) => DestinationType::Agent,
            Destination::BsFilter(_) => DestinationType::BsFilter,
            Destination::GroupMember(_) => DestinationType::GroupMember,
        }
    }

    pub fn destination_type_id(&self) -> i64 {
        self.destination_type().id()
    }

    /// Reject a discriminator that does not belong to this variant
    pub fn check_destination_type_id(&self, destination_type_id: i64) -> AppResult<()> {
        let expected = self.destination_type_id();
        if destination_type_id != expected {
            return Err(AppError::input(format!(
                "destination type id {} does not match {} destination (expected {})",
                destination_type_id,
                self.destination_type(),
                expected
            )));
        }
        Ok(())
    }

    /// Canonical identifying fields, used to detect identical destinations
    pub fn to_tuple(&self) -> DestinationTuple {
        let mut fields: DestinationTuple = match self {
            Destination::User(d) => vec![("user_id", d.user_id.to_string())],
            Destination::Group(d) => vec![("group_id", d.group_id.to_string())],
            Destination::Queue(d) => vec![("queue_id", d.queue_id.to_string())],
            Destination::Conference(d) => vec![("conference_id", d.conference_id.to_string())],
            Destination::Service(d) => vec![("extension_id", d.extension_id.to_string())],
            Destination::Forward(d) => vec![
                ("number", d.number.clone().unwrap_or_default()),
                ("extension_id", d.extension_id.to_string()),
            ],
            Destination::ParkPosition(d) => vec![
                ("position", d.park_position.clone()),
                ("parking_lot_id", d.parking_lot_id.to_string()),
            ],
            Destination::Features(d) => vec![("features_id", d.features_id.to_string())],
            Destination::Paging(d) => vec![("paging_id", d.paging_id.to_string())],
            Destination::Custom(d) => vec![("exten", d.exten.clone())],
            Destination::Agent(d) => vec![
                ("extension_id", d.extension_id.to_string()),
                ("agent_id", d.agent_id.to_string()),
            ],
            Destination::BsFilter(d) => {
                vec![("filter_member_id", d.filter_member_id.to_string())]
            }
            Destination::GroupMember(d) => vec![
                ("group_id", d.group_id.to_string()),
                ("extension_id", d.extension_id.to_string()),
            ],
        };
        fields.sort();
        fields
    }
}

/// A func key with the destination it owns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncKey {
    pub id: i64,
    pub type_id: i64,
    destination: Destination,
}

impl FuncKey {
    /// Build an unsaved func key, checking the discriminator against the variant
    pub fn new(destination_type_id: i64, destination: Destination) -> AppResult<Self> {
        DestinationType::from_id(destination_type_id)?;
        destination.check_destination_type_id(destination_type_id)?;
        Ok(Self {
            id: 0,
            type_id: SPEEDDIAL_TYPE_ID,
            destination,
        })
    }

    pub fn for_destination(destination: Destination) -> Self {
        Self {
            id: 0,
            type_id: SPEEDDIAL_TYPE_ID,
            destination,
        }
    }

    pub(crate) fn from_parts(id: i64, type_id: i64, destination: Destination) -> Self {
        Self {
            id,
            type_id,
            destination,
        }
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn destination_type(&self) -> DestinationType {
        self.destination.destination_type()
    }

    pub fn destination_type_id(&self) -> i64 {
        self.destination.destination_type_id()
    }

    /// Swap the destination for another one of the same kind
    ///
    /// The discriminator is fixed once a destination is attached.
    pub fn replace_destination(&mut self, destination: Destination) -> AppResult<()> {
        destination.check_destination_type_id(self.destination_type_id())?;
        self.destination = destination;
        Ok(())
    }
}

/// Forward kinds as exposed to callers and as stored in `extensions.typeval`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForwardType {
    Unconditional,
    NoAnswer,
    Busy,
}

impl ForwardType {
    pub const ALL: [ForwardType; 3] = [
        ForwardType::Unconditional,
        ForwardType::NoAnswer,
        ForwardType::Busy,
    ];

    pub fn db_name(self) -> &'static str {
        match self {
            ForwardType::Unconditional => "fwdunc",
            ForwardType::NoAnswer => "fwdrna",
            ForwardType::Busy => "fwdbusy",
        }
    }

    pub fn model_name(self) -> &'static str {
        match self {
            ForwardType::Unconditional => "unconditional",
            ForwardType::NoAnswer => "noanswer",
            ForwardType::Busy => "busy",
        }
    }

    pub fn from_db(db_type: &str) -> AppResult<Self> {
        match db_type {
            "fwdunc" => Ok(ForwardType::Unconditional),
            "fwdrna" => Ok(ForwardType::NoAnswer),
            "fwdbusy" => Ok(ForwardType::Busy),
            other => Err(AppError::value(format!("'{}' is not a forward type", other))),
        }
    }

    pub fn from_model(model_type: &str) -> AppResult<Self> {
        match model_type {
            "unconditional" => Ok(ForwardType::Unconditional),
            "noanswer" => Ok(ForwardType::NoAnswer),
            "busy" => Ok(ForwardType::Busy),
            other => Err(AppError::value(format!("'{}' is not a forward type", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_type_ids_are_unique() {
        let mut ids: Vec<i64> = DestinationType::ALL.iter().map(|t| t.id()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), DestinationType::ALL.len());
    }

    #[test]
    fn test_destination_type_round_trip() {
        for destination_type in DestinationType::ALL {
            assert_eq!(
                DestinationType::from_id(destination_type.id()).unwrap(),
                destination_type
            );
            assert_eq!(
                DestinationType::from_name(destination_type.name()).unwrap(),
                destination_type
            );
        }
    }

    #[test]
    fn test_unknown_destination_type_is_value_error() {
        assert!(DestinationType::from_id(0).unwrap_err().is_value_error());
        assert!(DestinationType::from_id(99).unwrap_err().is_value_error());
        assert!(DestinationType::from_name("voicemail")
            .unwrap_err()
            .is_value_error());
    }

    #[test]
    fn test_func_key_rejects_mismatched_discriminator() {
        let destination = Destination::Queue(QueueDestination { queue_id: 4 });

        let err = FuncKey::new(DestinationType::User.id(), destination.clone()).unwrap_err();
        assert!(err.is_input_error());

        let func_key = FuncKey::new(3, destination).unwrap();
        assert_eq!(func_key.destination_type_id(), 3);
        assert_eq!(func_key.destination_type(), DestinationType::Queue);
    }

    #[test]
    fn test_func_key_rejects_unknown_discriminator() {
        let destination = Destination::User(UserDestination { user_id: 1 });
        assert!(FuncKey::new(42, destination).unwrap_err().is_value_error());
    }

    #[test]
    fn test_replace_destination_keeps_kind() {
        let mut func_key =
            FuncKey::for_destination(Destination::Paging(PagingDestination { paging_id: 1 }));

        func_key
            .replace_destination(Destination::Paging(PagingDestination { paging_id: 2 }))
            .unwrap();
        assert_eq!(
            func_key.destination(),
            &Destination::Paging(PagingDestination { paging_id: 2 })
        );

        let err = func_key
            .replace_destination(Destination::Custom(CustomDestination {
                exten: "1234".to_string(),
            }))
            .unwrap_err();
        assert!(err.is_input_error());
        assert_eq!(func_key.destination_type(), DestinationType::Paging);
    }

    #[test]
    fn test_to_tuple_is_sorted() {
        let agent = Destination::Agent(AgentDestination {
            agent_id: 7,
            extension_id: 3,
        });
        assert_eq!(
            agent.to_tuple(),
            vec![("agent_id", "7".to_string()), ("extension_id", "3".to_string())]
        );

        let forward = Destination::Forward(ForwardDestination {
            extension_id: 12,
            number: None,
        });
        assert_eq!(
            forward.to_tuple(),
            vec![("extension_id", "12".to_string()), ("number", String::new())]
        );
    }

    #[test]
    fn test_to_tuple_distinguishes_targets() {
        let first = Destination::BsFilter(BsFilterDestination { filter_member_id: 1 });
        let second = Destination::BsFilter(BsFilterDestination { filter_member_id: 2 });
        assert_ne!(first.to_tuple(), second.to_tuple());
        assert_eq!(first.to_tuple(), first.clone().to_tuple());
    }

    #[test]
    fn test_forward_type_converter() {
        assert_eq!(ForwardType::from_db("fwdrna").unwrap(), ForwardType::NoAnswer);
        assert_eq!(ForwardType::Busy.db_name(), "fwdbusy");
        assert_eq!(
            ForwardType::from_model("unconditional").unwrap().db_name(),
            "fwdunc"
        );
        assert!(ForwardType::from_db("fwdfoo").unwrap_err().is_value_error());
    }
}

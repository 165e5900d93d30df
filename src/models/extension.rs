//! Dialable extensions and the association of extensions to their owners

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::func_key::ForwardType;
use crate::error::{AppError, AppResult};

/// Owner type and value stored on an extension nobody owns
pub const FREE_OWNER_TYPE: &str = "user";
pub const FREE_OWNER_VALUE: &str = "0";

/// Owner type of the extensions dialing a PBX feature; `typeval` names it
pub const FEATURE_OWNER_TYPE: &str = "extenfeatures";

/// Feature names reachable through a service func key
pub const SERVICE_FEATURES: &[&str] = &[
    "enablevm",
    "vmusermsg",
    "vmuserpurge",
    "phonestatus",
    "recsnd",
    "calllistening",
    "directoryaccess",
    "fwdundoall",
    "pickup",
    "callrecord",
    "incallfilter",
    "enablednd",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtensionOwnerKind {
    Line,
    Group,
    Queue,
    Conference,
    Outcall,
}

impl ExtensionOwnerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ExtensionOwnerKind::Line => "line",
            ExtensionOwnerKind::Group => "group",
            ExtensionOwnerKind::Queue => "queue",
            ExtensionOwnerKind::Conference => "conference",
            ExtensionOwnerKind::Outcall => "outcall",
        }
    }

    /// Lines share free extensions instead of claiming them
    pub fn claims_extension(self) -> bool {
        self != ExtensionOwnerKind::Line
    }

    pub fn resource(self) -> &'static str {
        match self {
            ExtensionOwnerKind::Line => "LineExtension",
            ExtensionOwnerKind::Group => "GroupExtension",
            ExtensionOwnerKind::Queue => "QueueExtension",
            ExtensionOwnerKind::Conference => "ConferenceExtension",
            ExtensionOwnerKind::Outcall => "OutcallExtension",
        }
    }
}

impl FromStr for ExtensionOwnerKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "line" => Ok(ExtensionOwnerKind::Line),
            "group" => Ok(ExtensionOwnerKind::Group),
            "queue" => Ok(ExtensionOwnerKind::Queue),
            "conference" => Ok(ExtensionOwnerKind::Conference),
            "outcall" => Ok(ExtensionOwnerKind::Outcall),
            _ => Err(AppError::value(format!("{} is not an extension owner", s))),
        }
    }
}

impl fmt::Display for ExtensionOwnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extension {
    pub id: i64,
    pub tenant_uuid: String,
    pub context: String,
    pub exten: String,
    pub enabled: bool,
    #[serde(rename = "type")]
    pub type_: String,
    pub typeval: String,
}

impl Extension {
    pub fn new(tenant_uuid: &str, exten: &str, context: &str) -> Self {
        Self {
            id: 0,
            tenant_uuid: tenant_uuid.to_string(),
            context: context.to_string(),
            exten: exten.to_string(),
            enabled: true,
            type_: FREE_OWNER_TYPE.to_string(),
            typeval: FREE_OWNER_VALUE.to_string(),
        }
    }

    /// Extension dialing a PBX feature such as `fwdbusy` or `enablednd`
    pub fn feature(tenant_uuid: &str, exten: &str, context: &str, feature: &str) -> Self {
        Self {
            type_: FEATURE_OWNER_TYPE.to_string(),
            typeval: feature.to_string(),
            ..Self::new(tenant_uuid, exten, context)
        }
    }

    pub fn is_feature(&self) -> bool {
        self.type_ == FEATURE_OWNER_TYPE
    }

    pub fn is_free(&self) -> bool {
        self.type_ == FREE_OWNER_TYPE && self.typeval == FREE_OWNER_VALUE
    }

    /// The group, queue, conference or outcall claiming this extension
    pub fn owner(&self) -> Option<(ExtensionOwnerKind, i64)> {
        let kind = self.type_.parse::<ExtensionOwnerKind>().ok()?;
        let id = self.typeval.parse::<i64>().ok()?;
        Some((kind, id))
    }

    pub fn claim(&mut self, kind: ExtensionOwnerKind, owner_id: i64) -> AppResult<()> {
        match self.owner() {
            _ if !kind.claims_extension() && self.is_free() => Ok(()),
            Some((current, id)) if current == kind && id == owner_id => Ok(()),
            _ if kind.claims_extension() && self.is_free() => {
                self.type_ = kind.as_str().to_string();
                self.typeval = owner_id.to_string();
                Ok(())
            }
            _ => Err(AppError::input(format!(
                "Extension {}@{} is already associated to {} {}",
                self.exten, self.context, self.type_, self.typeval
            ))),
        }
    }

    pub fn release(&mut self) {
        self.type_ = FREE_OWNER_TYPE.to_string();
        self.typeval = FREE_OWNER_VALUE.to_string();
    }
}

/// Strip the dialplan pattern markers of a feature extension (`_*23.` -> `*23`)
pub fn clean_feature_exten(exten: &str) -> String {
    exten
        .strip_prefix('_')
        .unwrap_or(exten)
        .trim_end_matches('.')
        .to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceExtension {
    pub id: i64,
    pub exten: String,
    pub service: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardExtension {
    pub id: i64,
    pub exten: String,
    pub forward: ForwardType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ExtensionAssociation {
    pub extension_id: i64,
    pub main_extension: bool,
}

/// Outcome of removing one association from an owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dissociation {
    pub removed: ExtensionAssociation,
    /// Extension that became main in place of the removed one
    pub promoted: Option<i64>,
}

/// The extensions of a single owner, at most one of them main
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionAssociations {
    entries: Vec<ExtensionAssociation>,
}

impl ExtensionAssociations {
    pub fn new(entries: Vec<ExtensionAssociation>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[ExtensionAssociation] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn main(&self) -> Option<&ExtensionAssociation> {
        self.entries.iter().find(|entry| entry.main_extension)
    }

    pub fn contains(&self, extension_id: i64) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.extension_id == extension_id)
    }

    /// Add an extension, main only when the owner has no main yet
    pub fn associate(&mut self, extension_id: i64) -> AppResult<ExtensionAssociation> {
        if self.contains(extension_id) {
            return Err(AppError::input(format!(
                "Extension {} is already associated",
                extension_id
            )));
        }

        let association = ExtensionAssociation {
            extension_id,
            main_extension: self.main().is_none(),
        };
        self.entries.push(association.clone());
        Ok(association)
    }

    /// Remove an extension, promoting the lowest remaining id if it was main
    pub fn dissociate(&mut self, extension_id: i64) -> AppResult<Dissociation> {
        let position = self
            .entries
            .iter()
            .position(|entry| entry.extension_id == extension_id)
            .ok_or_else(|| AppError::not_found("ExtensionAssociation", [("extension_id", extension_id)]))?;

        let removed = self.entries.remove(position);
        let mut promoted = None;

        if removed.main_extension {
            if let Some(next) = self
                .entries
                .iter_mut()
                .filter(|entry| !entry.main_extension)
                .min_by_key(|entry| entry.extension_id)
            {
                next.main_extension = true;
                promoted = Some(next.extension_id);
            }
        }

        Ok(Dissociation { removed, promoted })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn main_ids(associations: &ExtensionAssociations) -> Vec<i64> {
        associations
            .entries()
            .iter()
            .filter(|entry| entry.main_extension)
            .map(|entry| entry.extension_id)
            .collect()
    }

    #[test]
    fn test_first_association_is_main() {
        let mut associations = ExtensionAssociations::default();
        assert!(associations.associate(7).unwrap().main_extension);
        assert!(!associations.associate(3).unwrap().main_extension);
        assert_eq!(main_ids(&associations), vec![7]);
    }

    #[test]
    fn test_duplicate_association_is_rejected() {
        let mut associations = ExtensionAssociations::default();
        associations.associate(7).unwrap();
        assert!(associations.associate(7).unwrap_err().is_input_error());
    }

    #[test]
    fn test_dissociate_main_promotes_lowest_id() {
        let mut associations = ExtensionAssociations::default();
        associations.associate(5).unwrap();
        associations.associate(9).unwrap();
        associations.associate(2).unwrap();

        let dissociation = associations.dissociate(5).unwrap();
        assert!(dissociation.removed.main_extension);
        assert_eq!(dissociation.promoted, Some(2));
        assert_eq!(main_ids(&associations), vec![2]);
    }

    #[test]
    fn test_dissociate_last_leaves_no_main() {
        let mut associations = ExtensionAssociations::default();
        associations.associate(5).unwrap();

        let dissociation = associations.dissociate(5).unwrap();
        assert_eq!(dissociation.promoted, None);
        assert!(associations.is_empty());
        assert!(associations.main().is_none());
    }

    #[test]
    fn test_dissociate_secondary_keeps_main() {
        let mut associations = ExtensionAssociations::default();
        associations.associate(5).unwrap();
        associations.associate(2).unwrap();

        let dissociation = associations.dissociate(2).unwrap();
        assert_eq!(dissociation.promoted, None);
        assert_eq!(main_ids(&associations), vec![5]);
    }

    #[test]
    fn test_dissociate_unknown_extension() {
        let mut associations = ExtensionAssociations::default();
        assert!(associations.dissociate(1).unwrap_err().is_not_found());
    }

    #[test]
    fn test_claim_and_release() {
        let mut extension = Extension::new("tenant", "2000", "default");
        assert!(extension.is_free());
        assert_eq!(extension.owner(), None);

        extension.claim(ExtensionOwnerKind::Group, 4).unwrap();
        assert_eq!(extension.owner(), Some((ExtensionOwnerKind::Group, 4)));
        extension.claim(ExtensionOwnerKind::Group, 4).unwrap();
        assert!(extension
            .claim(ExtensionOwnerKind::Queue, 1)
            .unwrap_err()
            .is_input_error());

        extension.release();
        assert!(extension.is_free());
    }

    #[test]
    fn test_feature_extension_cannot_be_claimed() {
        let mut extension = Extension::feature("tenant", "_*23.", "xivo-features", "fwdunc");
        assert!(extension.is_feature());
        assert!(!extension.is_free());
        assert!(extension
            .claim(ExtensionOwnerKind::Line, 1)
            .unwrap_err()
            .is_input_error());
        assert!(extension
            .claim(ExtensionOwnerKind::Group, 1)
            .unwrap_err()
            .is_input_error());
    }

    #[test]
    fn test_clean_feature_exten() {
        assert_eq!(clean_feature_exten("_*23."), "*23");
        assert_eq!(clean_feature_exten("*90"), "*90");
        assert_eq!(clean_feature_exten("_*735."), "*735");
    }

    #[test]
    fn test_lines_do_not_claim() {
        let mut extension = Extension::new("tenant", "1000", "default");
        extension.claim(ExtensionOwnerKind::Line, 1).unwrap();
        assert!(extension.is_free());

        extension.claim(ExtensionOwnerKind::Conference, 3).unwrap();
        assert!(extension
            .claim(ExtensionOwnerKind::Line, 1)
            .unwrap_err()
            .is_input_error());
    }
}

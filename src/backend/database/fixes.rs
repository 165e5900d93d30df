//! Recompute fields denormalized from endpoints and main extensions
//!
//! Every persistor write that can change an endpoint, an extension or an
//! association ends with one of these fixes on the owner it touched.

use sqlx::SqliteConnection;
use tracing::debug;

use super::endpoint::update_endpoint_row;
use super::extension::{extension_owners, main_extension};
use super::line::{load_line, update_line_row};
use super::owner::fix_owner;
use super::trunk::{load_trunk, update_trunk_row};
use crate::error::AppResult;
use crate::models::{Conference, ExtensionOwner, ExtensionOwnerKind, Group, Outcall, Queue};

pub struct LineFixes<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> LineFixes<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// Main extension to number and context, endpoint to name, context to endpoint
    pub async fn fix(&mut self, line_id: i64) -> AppResult<()> {
        let Some(mut line) = load_line(self.conn, line_id).await? else {
            debug!(line_id, "nothing to fix, line is gone");
            return Ok(());
        };

        let main = main_extension(self.conn, ExtensionOwnerKind::Line, line_id).await?;
        line.fix_main_extension(main.as_ref());
        line.update_name();
        line.sync_endpoint_context();

        update_line_row(self.conn, &line).await?;
        if let Some(endpoint) = line.endpoint() {
            update_endpoint_row(self.conn, endpoint).await?;
        }
        debug!(line_id, name = ?line.name, number = ?line.number, "line fixed");
        Ok(())
    }
}

pub struct TrunkFixes<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> TrunkFixes<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    pub async fn fix(&mut self, trunk_id: i64) -> AppResult<()> {
        let Some(mut trunk) = load_trunk(self.conn, trunk_id).await? else {
            debug!(trunk_id, "nothing to fix, trunk is gone");
            return Ok(());
        };

        trunk.update_name();
        trunk.sync_endpoint_context();

        update_trunk_row(self.conn, &trunk).await?;
        if let Some(endpoint) = trunk.endpoint() {
            update_endpoint_row(self.conn, endpoint).await?;
        }
        debug!(trunk_id, name = ?trunk.name, "trunk fixed");
        Ok(())
    }
}

/// Dispatch a fix to the owner kind
pub struct OwnerFixes<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> OwnerFixes<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    pub async fn fix(&mut self, kind: ExtensionOwnerKind, owner_id: i64) -> AppResult<()> {
        match kind {
            ExtensionOwnerKind::Line => LineFixes::new(self.conn).fix(owner_id).await,
            ExtensionOwnerKind::Group => fix_owner::<Group>(self.conn, owner_id).await,
            ExtensionOwnerKind::Queue => fix_owner::<Queue>(self.conn, owner_id).await,
            ExtensionOwnerKind::Conference => fix_owner::<Conference>(self.conn, owner_id).await,
            ExtensionOwnerKind::Outcall => fix_owner::<Outcall>(self.conn, owner_id).await,
        }
    }
}

/// Refresh every owner caching an edited extension
pub struct ExtensionFixes<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> ExtensionFixes<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    pub async fn fix(&mut self, extension_id: i64) -> AppResult<()> {
        for (kind, owner_id) in extension_owners(self.conn, extension_id).await? {
            debug!(extension_id, %kind, owner_id, "fixing owner of extension");
            OwnerFixes::new(self.conn).fix(kind, owner_id).await?;
        }
        Ok(())
    }
}

//! Ticket repository.
//!
//! Every status or claim change is a single compare-and-set statement: the
//! guard and the write happen together, so of two racing callers exactly one
//! observes the transition and the other gets [`DbError::StatusUnchanged`] or
//! a `false` swap result.

use super::{DbError, is_unique_violation};
use crate::platform::{ChannelId, GuildId, UserId};
use sqlx::SqlitePool;
use std::fmt;
use std::str::FromStr;

/// Stored ticket status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TicketStatus {
    Open,
    Closed,
}

impl TicketStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(TicketStatus::Open),
            "closed" => Ok(TicketStatus::Closed),
            other => Err(DbError::Corrupt(format!("unknown ticket status '{other}'"))),
        }
    }
}

/// One support conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    /// Store-assigned; doubles as the human-visible ticket number.
    pub id: i64,
    pub guild_id: GuildId,
    pub panel_id: i64,
    /// Unset between row insertion and channel provisioning.
    pub channel_id: Option<ChannelId>,
    pub owner_id: UserId,
    pub status: TicketStatus,
    pub claimed_by: Option<UserId>,
    pub created_at: i64,
}

impl Ticket {
    /// Zero-padded ticket number, e.g. `0007`.
    pub fn number(&self) -> String {
        format!("{:04}", self.id)
    }

    pub fn is_open(&self) -> bool {
        self.status == TicketStatus::Open
    }
}

type TicketRow = (i64, i64, i64, Option<i64>, i64, String, Option<i64>, i64);

const TICKET_COLUMNS: &str =
    "ticket_id, guild_id, panel_id, channel_id, owner_id, status, claimed_by, created_at";

fn ticket_from_row(row: TicketRow) -> Result<Ticket, DbError> {
    let (id, guild_id, panel_id, channel_id, owner_id, status, claimed_by, created_at) = row;
    Ok(Ticket {
        id,
        guild_id: GuildId::from_db(guild_id),
        panel_id,
        channel_id: channel_id.map(ChannelId::from_db),
        owner_id: UserId::from_db(owner_id),
        status: status.parse()?,
        claimed_by: claimed_by.map(UserId::from_db),
        created_at,
    })
}

/// Repository for ticket operations.
pub struct TicketRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> TicketRepository<'a> {
    /// Create a new ticket repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert an open ticket with no channel yet.
    ///
    /// Fails with [`DbError::OpenTicketExists`] when the owner already holds an
    /// open ticket on the panel; the partial unique index decides, so two
    /// concurrent inserts cannot both succeed.
    pub async fn create(
        &self,
        guild_id: GuildId,
        panel_id: i64,
        owner_id: UserId,
    ) -> Result<Ticket, DbError> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO tickets (guild_id, panel_id, owner_id, status, created_at)
            VALUES (?, ?, ?, 'open', ?)
            "#,
        )
        .bind(guild_id.to_db())
        .bind(panel_id)
        .bind(owner_id.to_db())
        .bind(now)
        .execute(self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                DbError::OpenTicketExists(panel_id)
            } else {
                DbError::from(e)
            }
        })?;

        Ok(Ticket {
            id: result.last_insert_rowid(),
            guild_id,
            panel_id,
            channel_id: None,
            owner_id,
            status: TicketStatus::Open,
            claimed_by: None,
            created_at: now,
        })
    }

    /// Find ticket by id.
    pub async fn find_by_id(&self, ticket_id: i64) -> Result<Option<Ticket>, DbError> {
        let row = sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE ticket_id = ?"
        ))
        .bind(ticket_id)
        .fetch_optional(self.pool)
        .await?;

        row.map(ticket_from_row).transpose()
    }

    /// Find the ticket bound to a channel.
    pub async fn find_by_channel(&self, channel_id: ChannelId) -> Result<Option<Ticket>, DbError> {
        let row = sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE channel_id = ?"
        ))
        .bind(channel_id.to_db())
        .fetch_optional(self.pool)
        .await?;

        row.map(ticket_from_row).transpose()
    }

    /// The owner's open ticket on a panel, if any.
    pub async fn find_open(&self, owner_id: UserId, panel_id: i64) -> Result<Option<Ticket>, DbError> {
        let row = sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE owner_id = ? AND panel_id = ? AND status = 'open'"
        ))
        .bind(owner_id.to_db())
        .bind(panel_id)
        .fetch_optional(self.pool)
        .await?;

        row.map(ticket_from_row).transpose()
    }

    /// Back-fill the provisioned channel.
    pub async fn set_channel(&self, ticket_id: i64, channel_id: ChannelId) -> Result<(), DbError> {
        let result = sqlx::query("UPDATE tickets SET channel_id = ? WHERE ticket_id = ?")
            .bind(channel_id.to_db())
            .bind(ticket_id)
            .execute(self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    DbError::ChannelInUse(channel_id.get())
                } else {
                    DbError::from(e)
                }
            })?;

        if result.rows_affected() == 0 {
            return Err(DbError::TicketNotFound(ticket_id));
        }
        Ok(())
    }

    /// Delete a ticket row. Returns whether a row was removed.
    pub async fn delete(&self, ticket_id: i64) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM tickets WHERE ticket_id = ?")
            .bind(ticket_id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Move a ticket to `status`.
    ///
    /// Fails with [`DbError::StatusUnchanged`] when the ticket already has that
    /// status, [`DbError::TicketNotFound`] when it does not exist, and
    /// [`DbError::OpenTicketExists`] when reopening would give the owner a
    /// second open ticket on the panel. Closing drops any claim in the same
    /// statement.
    pub async fn set_status(&self, ticket_id: i64, status: TicketStatus) -> Result<(), DbError> {
        let result = sqlx::query(
            r#"
            UPDATE tickets
            SET status = ?1,
                claimed_by = CASE WHEN ?1 = 'closed' THEN NULL ELSE claimed_by END
            WHERE ticket_id = ?2 AND status <> ?1
            "#,
        )
        .bind(status.as_str())
        .bind(ticket_id)
        .execute(self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                DbError::OpenTicketExists(ticket_id)
            } else {
                DbError::from(e)
            }
        })?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        match self.find_by_id(ticket_id).await? {
            Some(_) => Err(DbError::StatusUnchanged(ticket_id)),
            None => Err(DbError::TicketNotFound(ticket_id)),
        }
    }

    /// Swap the claimant from `expected` to `claimant` while the ticket is open.
    ///
    /// Returns `false` when the current claimant is not `expected` or the
    /// ticket is closed; the caller re-reads to find out which.
    pub async fn set_claimed_by(
        &self,
        ticket_id: i64,
        claimant: Option<UserId>,
        expected: Option<UserId>,
    ) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE tickets SET claimed_by = ?
            WHERE ticket_id = ? AND status = 'open' AND claimed_by IS ?
            "#,
        )
        .bind(claimant.map(UserId::to_db))
        .bind(ticket_id)
        .bind(expected.map(UserId::to_db))
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Delete rows whose channel was never back-filled and which are older
    /// than `max_age_secs`. Such rows are left behind by a crash between
    /// insertion and channel provisioning and would otherwise block their
    /// owner from opening a new ticket.
    pub async fn purge_unprovisioned(&self, max_age_secs: i64) -> Result<u64, DbError> {
        let cutoff = chrono::Utc::now().timestamp() - max_age_secs;
        let result = sqlx::query("DELETE FROM tickets WHERE channel_id IS NULL AND created_at <= ?")
            .bind(cutoff)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Number of open tickets in a guild.
    #[cfg(test)]
    pub async fn count_open(&self, guild_id: GuildId) -> Result<i64, DbError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM tickets WHERE guild_id = ? AND status = 'open'",
        )
        .bind(guild_id.to_db())
        .fetch_one(self.pool)
        .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, NewPanel};
    use crate::platform::RoleId;

    async fn setup() -> (Database, i64) {
        let db = Database::new(":memory:").await.unwrap();
        let panel = db
            .panels()
            .create(&NewPanel {
                guild_id: GuildId(1),
                name: "Support".to_string(),
                support_roles: vec![RoleId(10)],
                category_id: ChannelId(20),
                transcript_channel_id: ChannelId(30),
                claimable: true,
                description: None,
                button_text: None,
                welcome_message: None,
            })
            .await
            .unwrap();
        (db, panel.id)
    }

    #[tokio::test]
    async fn test_one_open_ticket_per_owner_and_panel() {
        let (db, panel_id) = setup().await;
        let first = db.tickets().create(GuildId(1), panel_id, UserId(5)).await.unwrap();
        assert_eq!(first.number(), "0001");

        let err = db
            .tickets()
            .create(GuildId(1), panel_id, UserId(5))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::OpenTicketExists(_)));

        // A different owner is unaffected.
        db.tickets().create(GuildId(1), panel_id, UserId(6)).await.unwrap();

        // Once closed, the owner may open another.
        db.tickets().set_status(first.id, TicketStatus::Closed).await.unwrap();
        let second = db.tickets().create(GuildId(1), panel_id, UserId(5)).await.unwrap();
        assert_eq!(second.id, 3);

        // Reopening the first would now violate the invariant.
        let err = db
            .tickets()
            .set_status(first.id, TicketStatus::Open)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::OpenTicketExists(_)));
    }

    #[tokio::test]
    async fn test_set_status_is_compare_and_set() {
        let (db, panel_id) = setup().await;
        let ticket = db.tickets().create(GuildId(1), panel_id, UserId(5)).await.unwrap();

        db.tickets().set_status(ticket.id, TicketStatus::Closed).await.unwrap();
        let err = db
            .tickets()
            .set_status(ticket.id, TicketStatus::Closed)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::StatusUnchanged(_)));

        let err = db.tickets().set_status(42, TicketStatus::Closed).await.unwrap_err();
        assert!(matches!(err, DbError::TicketNotFound(42)));
    }

    #[tokio::test]
    async fn test_channel_binding_is_unique() {
        let (db, panel_id) = setup().await;
        let a = db.tickets().create(GuildId(1), panel_id, UserId(5)).await.unwrap();
        let b = db.tickets().create(GuildId(1), panel_id, UserId(6)).await.unwrap();

        db.tickets().set_channel(a.id, ChannelId(100)).await.unwrap();
        let err = db.tickets().set_channel(b.id, ChannelId(100)).await.unwrap_err();
        assert!(matches!(err, DbError::ChannelInUse(100)));

        let found = db.tickets().find_by_channel(ChannelId(100)).await.unwrap().unwrap();
        assert_eq!(found.id, a.id);

        assert!(db.tickets().delete(a.id).await.unwrap());
        assert!(!db.tickets().delete(a.id).await.unwrap());
        assert!(db.tickets().find_by_channel(ChannelId(100)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_swaps_and_close_clears_claim() {
        let (db, panel_id) = setup().await;
        let ticket = db.tickets().create(GuildId(1), panel_id, UserId(5)).await.unwrap();

        assert!(db.tickets().set_claimed_by(ticket.id, Some(UserId(7)), None).await.unwrap());
        assert!(!db.tickets().set_claimed_by(ticket.id, Some(UserId(8)), None).await.unwrap());
        let current = db.tickets().find_by_id(ticket.id).await.unwrap().unwrap();
        assert_eq!(current.claimed_by, Some(UserId(7)));

        db.tickets().set_status(ticket.id, TicketStatus::Closed).await.unwrap();
        let closed = db.tickets().find_by_id(ticket.id).await.unwrap().unwrap();
        assert_eq!(closed.claimed_by, None);

        // No claims on closed tickets.
        assert!(!db.tickets().set_claimed_by(ticket.id, Some(UserId(7)), None).await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_unprovisioned_rows() {
        let (db, panel_id) = setup().await;
        let stale = db.tickets().create(GuildId(1), panel_id, UserId(5)).await.unwrap();
        let live = db.tickets().create(GuildId(1), panel_id, UserId(6)).await.unwrap();
        db.tickets().set_channel(live.id, ChannelId(100)).await.unwrap();

        assert_eq!(db.tickets().purge_unprovisioned(0).await.unwrap(), 1);
        assert!(db.tickets().find_by_id(stale.id).await.unwrap().is_none());
        assert_eq!(db.tickets().count_open(GuildId(1)).await.unwrap(), 1);
    }
}

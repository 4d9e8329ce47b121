//! The record store: statement construction and CRUD over the shared
//! users table.

use std::sync::Arc;

use sqlx::any::{AnyArguments, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, AnyPool, Row};
use tracing::debug;

use crate::dialect::{BoolValue, ColumnKind, Dialect, MySql};
use crate::error::{Error, Result};
use crate::password;
use crate::user::{blank_password, new_stamp, normalize, User};

/// Persisted columns in lexical order, excluding the `Id` primary key,
/// each with the kind steering the dialect's read and bind expressions.
/// The SELECT list, the INSERT tuple and the UPDATE assignments all
/// follow this order.
const COLS: [(&str, ColumnKind); 14] = [
    ("AccessFailedCount", ColumnKind::Int),
    ("ConcurrencyStamp", ColumnKind::Text),
    ("Email", ColumnKind::Text),
    ("EmailConfirmed", ColumnKind::Bool),
    ("LockoutEnabled", ColumnKind::Bool),
    ("LockoutEnd", ColumnKind::DateTime),
    ("NormalizedEmail", ColumnKind::Text),
    ("NormalizedUserName", ColumnKind::Text),
    ("PasswordHash", ColumnKind::Text),
    ("PhoneNumber", ColumnKind::Text),
    ("PhoneNumberConfirmed", ColumnKind::Bool),
    ("SecurityStamp", ColumnKind::Text),
    ("TwoFactorEnabled", ColumnKind::Bool),
    ("UserName", ColumnKind::Text),
];

/// Access to the single shared table of registered users, usually called
/// `aspnetusers`. All engine-specific behavior is delegated to the
/// injected [`Dialect`].
pub struct UserStore {
    pool: AnyPool,
    pub(crate) table: String,
    dialect: Arc<dyn Dialect>,
    stmt: Statements,
}

/// The four statements, generated once at construction.
struct Statements {
    query_id: String,
    query_name: String,
    insert: String,
    update: String,
}

fn statements(dialect: &dyn Dialect, table: &str) -> Statements {
    let name_list = COLS.map(|(col, _)| col).join(", ");
    // Id travels as text everywhere, so it heads the read list like any
    // other text column.
    let read_list = std::iter::once(dialect.read_expr("Id", ColumnKind::Text))
        .chain(COLS.iter().map(|&(col, kind)| dialect.read_expr(col, kind)))
        .collect::<Vec<_>>()
        .join(", ");
    Statements {
        query_id: format!(
            "SELECT {read_list} FROM {table} WHERE Id = {}",
            dialect.param(1)
        ),
        query_name: format!(
            "SELECT {read_list} FROM {table} WHERE NormalizedUserName = {}",
            dialect.param(1)
        ),
        insert: format!(
            "INSERT INTO {table} (Id, {name_list}) VALUES ({})",
            params(dialect),
        ),
        update: format!(
            "UPDATE {table} SET {} WHERE Id = {} AND ConcurrencyStamp = {}",
            assignments(dialect),
            dialect.param(COLS.len() + 1),
            dialect.param(COLS.len() + 2)
        ),
    }
}

fn params(dialect: &dyn Dialect) -> String {
    std::iter::once(dialect.bind_expr(1, ColumnKind::Text))
        .chain(
            COLS.iter()
                .enumerate()
                .map(|(i, &(_, kind))| dialect.bind_expr(i + 2, kind)),
        )
        .collect::<Vec<_>>()
        .join(", ")
}

fn assignments(dialect: &dyn Dialect) -> String {
    COLS.iter()
        .enumerate()
        .map(|(i, &(col, kind))| format!("{col} = {}", dialect.bind_expr(i + 1, kind)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn bind_bool<'q>(
    q: Query<'q, Any, AnyArguments<'q>>,
    v: BoolValue,
) -> Query<'q, Any, AnyArguments<'q>> {
    match v {
        BoolValue::Native(b) => q.bind(b),
        BoolValue::Int(i) => q.bind(i),
    }
}

fn opt_text(row: &AnyRow, index: usize) -> Result<String> {
    Ok(row.try_get::<Option<String>, _>(index)?.unwrap_or_default())
}

impl UserStore {
    /// Store over `table` in the given pool, with the default MySQL
    /// dialect.
    pub fn new(pool: AnyPool, table: &str) -> Self {
        Self::with_dialect(pool, table, Arc::new(MySql))
    }

    /// Store over `table` using an explicit engine dialect.
    pub fn with_dialect(pool: AnyPool, table: &str, dialect: Arc<dyn Dialect>) -> Self {
        let stmt = statements(dialect.as_ref(), table);
        debug!(table, "prepared user store statements");
        Self {
            pool,
            table: table.to_owned(),
            dialect,
            stmt,
        }
    }

    /// The underlying connection pool, for callers that manage other
    /// tables alongside this one.
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Look up a registered user by primary key.
    pub async fn find_by_id(&self, id: &str) -> Result<User> {
        let row = sqlx::query(&self.stmt.query_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => self.unpack(&row),
            None => Err(Error::NotFound),
        }
    }

    /// Look up a registered user by name (typically an email address).
    /// The name is normalized and matched against the unique
    /// `NormalizedUserName` key.
    pub async fn find_by_name(&self, name: &str) -> Result<User> {
        let row = sqlx::query(&self.stmt.query_name)
            .bind(normalize(name))
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => self.unpack(&row),
            None => Err(Error::NotFound),
        }
    }

    /// Create a new user entry with a freshly hashed password, returning
    /// [`Error::AlreadyExists`] if the name is already registered.
    pub async fn new_user(&self, name: &str, email: &str, password: &str) -> Result<User> {
        if blank_password(password) {
            return Err(Error::MissingPassword);
        }
        // Advisory fast path only. The unique index on NormalizedUserName
        // is what actually rejects a duplicate, so the insert below
        // decides; a hit here is not acted on.
        match self.find_by_name(name).await {
            Ok(_) | Err(Error::NotFound) => {}
            Err(e) => return Err(e),
        }

        let user = User {
            id: new_stamp(),
            user_name: name.to_owned(),
            normalized_user_name: normalize(name),
            email: email.to_owned(),
            normalized_email: normalize(email),
            password_hash: password::hash_password(password),
            security_stamp: new_stamp(),
            concurrency_stamp: new_stamp(),
            ..User::default()
        };

        let d = self.dialect.as_ref();
        let q = sqlx::query(&self.stmt.insert)
            .bind(user.id.as_str())
            .bind(user.access_failed_count)
            .bind(user.concurrency_stamp.as_str())
            .bind(user.email.as_str());
        let q = bind_bool(q, d.encode_bool(user.email_confirmed));
        let q = bind_bool(q, d.encode_bool(user.lockout_enabled));
        let q = q
            .bind(user.lockout_end.map(|t| d.encode_datetime(t)))
            .bind(user.normalized_email.as_str())
            .bind(user.normalized_user_name.as_str())
            .bind(user.password_hash.as_str())
            .bind(user.phone_number.as_str());
        let q = bind_bool(q, d.encode_bool(user.phone_number_confirmed));
        let q = q.bind(user.security_stamp.as_str());
        let q = bind_bool(q, d.encode_bool(user.two_factor_enabled));
        let q = q.bind(user.user_name.as_str());

        if let Err(e) = q.execute(&self.pool).await {
            if d.is_duplicate(&e) {
                return Err(Error::AlreadyExists);
            }
            return Err(e.into());
        }
        Ok(user)
    }

    /// Replace the stored values for a user, keyed by ID and guarded by
    /// the concurrency stamp. If no row matches, the record was updated
    /// or deleted underfoot and [`Error::Concurrency`] is returned with
    /// `user` untouched; the caller should refetch to see what changed.
    /// On success `user` receives the freshly generated stamp to present
    /// on its next update.
    pub async fn update(&self, user: &mut User) -> Result<()> {
        let stamp = new_stamp();
        let d = self.dialect.as_ref();
        let q = sqlx::query(&self.stmt.update)
            .bind(user.access_failed_count)
            .bind(stamp.as_str())
            .bind(user.email.as_str());
        let q = bind_bool(q, d.encode_bool(user.email_confirmed));
        let q = bind_bool(q, d.encode_bool(user.lockout_enabled));
        let q = q
            .bind(user.lockout_end.map(|t| d.encode_datetime(t)))
            .bind(user.normalized_email.as_str())
            .bind(user.normalized_user_name.as_str())
            .bind(user.password_hash.as_str())
            .bind(user.phone_number.as_str());
        let q = bind_bool(q, d.encode_bool(user.phone_number_confirmed));
        let q = q.bind(user.security_stamp.as_str());
        let q = bind_bool(q, d.encode_bool(user.two_factor_enabled));
        let q = q
            .bind(user.user_name.as_str())
            .bind(user.id.as_str())
            .bind(user.concurrency_stamp.as_str());

        let result = q.execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            // lost race: updated (hence a new stamp) or deleted by
            // another process
            return Err(Error::Concurrency);
        }
        user.concurrency_stamp = stamp;
        Ok(())
    }

    /// Decode one fetched row into a [`User`], routing boolean and
    /// datetime columns through the dialect. Column positions follow
    /// `Id` plus [`COLS`].
    fn unpack(&self, row: &AnyRow) -> Result<User> {
        let d = self.dialect.as_ref();
        let lockout_end = row
            .try_get::<Option<String>, _>(6)?
            .map(|raw| d.decode_datetime(&raw))
            .transpose()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        Ok(User {
            id: row.try_get(0)?,
            access_failed_count: row.try_get(1)?,
            concurrency_stamp: opt_text(row, 2)?,
            email: opt_text(row, 3)?,
            email_confirmed: d.decode_bool(row, 4)?,
            lockout_enabled: d.decode_bool(row, 5)?,
            lockout_end,
            normalized_email: opt_text(row, 7)?,
            normalized_user_name: opt_text(row, 8)?,
            password_hash: opt_text(row, 9)?,
            phone_number: opt_text(row, 10)?,
            phone_number_confirmed: d.decode_bool(row, 11)?,
            security_stamp: opt_text(row, 12)?,
            two_factor_enabled: d.decode_bool(row, 13)?,
            user_name: opt_text(row, 14)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{Postgres, Sqlite};

    #[test]
    fn sqlite_statements_are_uncast() {
        let stmt = statements(&Sqlite, "aspnetusers");
        assert_eq!(
            stmt.query_name,
            "SELECT Id, AccessFailedCount, ConcurrencyStamp, Email, EmailConfirmed, \
             LockoutEnabled, LockoutEnd, NormalizedEmail, NormalizedUserName, PasswordHash, \
             PhoneNumber, PhoneNumberConfirmed, SecurityStamp, TwoFactorEnabled, UserName \
             FROM aspnetusers WHERE NormalizedUserName = ?"
        );
        assert!(stmt.insert.ends_with(
            "VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ));
        assert!(stmt.update.starts_with(
            "UPDATE aspnetusers SET AccessFailedCount = ?, ConcurrencyStamp = ?"
        ));
        assert!(stmt.update.ends_with("WHERE Id = ? AND ConcurrencyStamp = ?"));
    }

    #[test]
    fn mysql_statements_cast_unsupported_column_types() {
        let stmt = statements(&MySql, "aspnetusers");
        // bit(1), datetime(6) and longtext cannot cross the Any driver raw
        assert!(stmt.query_name.contains("CAST(EmailConfirmed AS UNSIGNED)"));
        assert!(stmt.query_name.contains("CAST(LockoutEnd AS CHAR)"));
        assert!(stmt.query_name.contains("CAST(PasswordHash AS CHAR)"));
        assert!(stmt.query_name.starts_with("SELECT CAST(Id AS CHAR), AccessFailedCount"));
        assert!(stmt.query_name.ends_with("FROM aspnetusers WHERE NormalizedUserName = ?"));
        assert!(stmt.insert.ends_with(
            "VALUES (?, ?, ?, ?, ?, ?, CAST(? AS DATETIME(6)), ?, ?, ?, ?, ?, ?, ?, ?)"
        ));
        assert!(stmt.update.contains("LockoutEnd = CAST(? AS DATETIME(6))"));
        assert!(stmt.update.ends_with("WHERE Id = ? AND ConcurrencyStamp = ?"));
    }

    #[test]
    fn postgres_statements_cast_booleans_and_timestamps() {
        let stmt = statements(&Postgres, "aspnetusers");
        assert!(stmt.query_name.contains("EmailConfirmed::int4"));
        assert!(stmt.query_name.contains(
            "to_char(LockoutEnd AT TIME ZONE 'UTC', 'YYYY-MM-DD HH24:MI:SS.US')"
        ));
        assert!(stmt.query_name.ends_with("WHERE NormalizedUserName = $1"));
        assert!(stmt.insert.ends_with(
            "VALUES ($1, $2, $3, $4, $5, $6, $7::timestamptz, $8, $9, $10, $11, $12, $13, $14, $15)"
        ));
        assert!(stmt.update.contains("LockoutEnd = $6::timestamptz"));
        assert!(stmt.update.ends_with("WHERE Id = $15 AND ConcurrencyStamp = $16"));
    }
}

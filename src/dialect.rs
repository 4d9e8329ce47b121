//! Per-engine SQL conventions.
//!
//! SQL databases disagree on some essentials: positional parameter syntax,
//! whether a boolean is a real type or a bit/tinyint column, how a
//! `datetime(6)` value travels over a driver without a native datetime
//! type, and what a duplicate-key error looks like. The Any driver adds
//! one more: it only carries NULL, integers, floats, text and blobs, so
//! columns outside that set must be cast into it in the statement text
//! itself — `bit(1)` and `longtext` on MySQL, `boolean` and `timestamptz`
//! on PostgreSQL. Everything engine-specific lives behind the [`Dialect`]
//! trait; the store itself never inspects driver errors or column
//! representations directly.

use sqlx::any::AnyRow;
use sqlx::Row;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// Wire form matching MySQL's `datetime(6)` literal, also used verbatim
/// for SQLite text columns.
const DATETIME6: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:6]");

/// Accepts stored values with or without a fractional part.
const DATETIME6_LAX: &[BorrowedFormatItem<'static>] = format_description!(
    version = 2,
    "[year]-[month]-[day] [hour]:[minute]:[second][optional [.[subsecond]]]"
);

fn datetime6_utc(t: OffsetDateTime) -> String {
    t.to_offset(UtcOffset::UTC)
        .format(DATETIME6)
        .expect("static datetime format")
}

/// What a column holds, as far as statement generation cares. Decides
/// which read and bind expressions a dialect wraps around it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Int,
    Text,
    Bool,
    DateTime,
}

/// The value a boolean column travels as, resolved once per adapter
/// rather than per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolValue {
    /// Engines whose driver accepts a real boolean parameter.
    Native(bool),
    /// Engines storing booleans in bit or integer columns.
    Int(i64),
}

/// Engine-specific conventions needed by the store. Implementations are
/// stateless; one is injected at store construction.
pub trait Dialect: Send + Sync {
    /// Token for the n'th positional parameter (1-based).
    fn param(&self, n: usize) -> String;

    /// Expression selecting `col` in a form the Any driver can decode.
    /// The default reads the column as-is; engines whose column types
    /// fall outside the driver's integer/text repertoire wrap it in a
    /// cast.
    fn read_expr(&self, col: &str, kind: ColumnKind) -> String {
        let _ = kind;
        col.to_owned()
    }

    /// Placeholder expression for the n'th parameter when it feeds a
    /// column of `kind`, casting where the engine will not coerce the
    /// bound value itself.
    fn bind_expr(&self, n: usize, kind: ColumnKind) -> String {
        let _ = kind;
        self.param(n)
    }

    /// Encode a boolean for binding into this engine.
    fn encode_bool(&self, v: bool) -> BoolValue;

    /// Decode the boolean column at `index` of a fetched row. Reads the
    /// integer form every built-in [`Dialect::read_expr`] produces.
    fn decode_bool(&self, row: &AnyRow, index: usize) -> Result<bool, sqlx::Error> {
        Ok(row.try_get::<i64, _>(index)? != 0)
    }

    /// Render a UTC instant in the engine's `datetime(6)` wire form.
    fn encode_datetime(&self, t: OffsetDateTime) -> String {
        datetime6_utc(t)
    }

    /// Parse a value previously written by [`Dialect::encode_datetime`]
    /// (or by the paired identity framework). The stored value is UTC.
    fn decode_datetime(&self, raw: &str) -> Result<OffsetDateTime, time::error::Parse> {
        PrimitiveDateTime::parse(raw, DATETIME6_LAX).map(PrimitiveDateTime::assume_utc)
    }

    /// True iff the error diagnoses an attempt to insert a duplicate key.
    fn is_duplicate(&self, err: &sqlx::Error) -> bool;
}

fn db_code(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) => db.code().map(|c| c.into_owned()),
        _ => None,
    }
}

/// Adapter for MySQL / MariaDB, the engine the shared table historically
/// lives on and the default for new stores. `bit(1)`, `datetime(6)` and
/// `longtext` columns are outside the Any driver's repertoire, so reads
/// cast them to unsigned integers and characters; datetime parameters
/// are cast back on the way in.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySql;

impl Dialect for MySql {
    fn param(&self, _n: usize) -> String {
        "?".to_owned()
    }

    fn read_expr(&self, col: &str, kind: ColumnKind) -> String {
        match kind {
            ColumnKind::Bool => format!("CAST({col} AS UNSIGNED)"),
            // longtext surfaces as a blob, datetime(6) not at all
            ColumnKind::Text | ColumnKind::DateTime => format!("CAST({col} AS CHAR)"),
            ColumnKind::Int => col.to_owned(),
        }
    }

    fn bind_expr(&self, n: usize, kind: ColumnKind) -> String {
        match kind {
            ColumnKind::DateTime => format!("CAST({} AS DATETIME(6))", self.param(n)),
            _ => self.param(n),
        }
    }

    fn encode_bool(&self, v: bool) -> BoolValue {
        BoolValue::Int(v as i64)
    }

    fn is_duplicate(&self, err: &sqlx::Error) -> bool {
        // 1062 "duplicate entry for key"; some driver paths surface the
        // SQLSTATE 23000 instead of the vendor number
        matches!(db_code(err).as_deref(), Some("1062") | Some("23000"))
    }
}

/// Adapter for PostgreSQL: numbered placeholders, native boolean
/// parameters. Boolean columns are read as `int4` and `timestamptz`
/// columns as UTC text, both being types the Any driver cannot decode
/// directly; datetime parameters carry an explicit `+00` offset and a
/// `::timestamptz` cast so the session time zone never matters.
#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl Dialect for Postgres {
    fn param(&self, n: usize) -> String {
        format!("${n}")
    }

    fn read_expr(&self, col: &str, kind: ColumnKind) -> String {
        match kind {
            ColumnKind::Bool => format!("{col}::int4"),
            ColumnKind::DateTime => {
                format!("to_char({col} AT TIME ZONE 'UTC', 'YYYY-MM-DD HH24:MI:SS.US')")
            }
            ColumnKind::Int | ColumnKind::Text => col.to_owned(),
        }
    }

    fn bind_expr(&self, n: usize, kind: ColumnKind) -> String {
        match kind {
            ColumnKind::DateTime => format!("{}::timestamptz", self.param(n)),
            _ => self.param(n),
        }
    }

    fn encode_bool(&self, v: bool) -> BoolValue {
        BoolValue::Native(v)
    }

    fn encode_datetime(&self, t: OffsetDateTime) -> String {
        datetime6_utc(t) + "+00"
    }

    fn is_duplicate(&self, err: &sqlx::Error) -> bool {
        matches!(db_code(err).as_deref(), Some("23505"))
    }
}

/// Adapter for SQLite: `?` placeholders, integer booleans, text
/// datetimes. Its storage classes already match the Any driver, so no
/// read or bind casts are needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sqlite;

impl Dialect for Sqlite {
    fn param(&self, _n: usize) -> String {
        "?".to_owned()
    }

    fn encode_bool(&self, v: bool) -> BoolValue {
        BoolValue::Int(v as i64)
    }

    fn is_duplicate(&self, err: &sqlx::Error) -> bool {
        // 2067 SQLITE_CONSTRAINT_UNIQUE, 1555 SQLITE_CONSTRAINT_PRIMARYKEY
        matches!(db_code(err).as_deref(), Some("2067") | Some("1555"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn placeholders_per_engine() {
        assert_eq!(MySql.param(1), "?");
        assert_eq!(MySql.param(7), "?");
        assert_eq!(Sqlite.param(3), "?");
        assert_eq!(Postgres.param(1), "$1");
        assert_eq!(Postgres.param(15), "$15");
    }

    #[test]
    fn bool_encoding_per_engine() {
        assert_eq!(MySql.encode_bool(true), BoolValue::Int(1));
        assert_eq!(MySql.encode_bool(false), BoolValue::Int(0));
        assert_eq!(Postgres.encode_bool(true), BoolValue::Native(true));
        assert_eq!(Sqlite.encode_bool(false), BoolValue::Int(0));
    }

    #[test]
    fn mysql_casts_outside_the_driver_repertoire() {
        assert_eq!(
            MySql.read_expr("EmailConfirmed", ColumnKind::Bool),
            "CAST(EmailConfirmed AS UNSIGNED)"
        );
        assert_eq!(
            MySql.read_expr("PasswordHash", ColumnKind::Text),
            "CAST(PasswordHash AS CHAR)"
        );
        assert_eq!(
            MySql.read_expr("LockoutEnd", ColumnKind::DateTime),
            "CAST(LockoutEnd AS CHAR)"
        );
        assert_eq!(
            MySql.read_expr("AccessFailedCount", ColumnKind::Int),
            "AccessFailedCount"
        );
        assert_eq!(
            MySql.bind_expr(6, ColumnKind::DateTime),
            "CAST(? AS DATETIME(6))"
        );
        assert_eq!(MySql.bind_expr(4, ColumnKind::Bool), "?");
    }

    #[test]
    fn postgres_casts_booleans_and_timestamps() {
        assert_eq!(
            Postgres.read_expr("EmailConfirmed", ColumnKind::Bool),
            "EmailConfirmed::int4"
        );
        assert_eq!(
            Postgres.read_expr("LockoutEnd", ColumnKind::DateTime),
            "to_char(LockoutEnd AT TIME ZONE 'UTC', 'YYYY-MM-DD HH24:MI:SS.US')"
        );
        assert_eq!(
            Postgres.read_expr("UserName", ColumnKind::Text),
            "UserName"
        );
        assert_eq!(
            Postgres.bind_expr(6, ColumnKind::DateTime),
            "$6::timestamptz"
        );
        assert_eq!(Postgres.bind_expr(4, ColumnKind::Bool), "$4");
    }

    #[test]
    fn sqlite_needs_no_casts() {
        assert_eq!(Sqlite.read_expr("EmailConfirmed", ColumnKind::Bool), "EmailConfirmed");
        assert_eq!(Sqlite.bind_expr(6, ColumnKind::DateTime), "?");
    }

    #[test]
    fn datetime_round_trip() {
        let t = datetime!(2024-03-01 08:15:30.123456 UTC);
        let raw = MySql.encode_datetime(t);
        assert_eq!(raw, "2024-03-01 08:15:30.123456");
        assert_eq!(MySql.decode_datetime(&raw).unwrap(), t);
    }

    #[test]
    fn postgres_datetime_carries_an_explicit_offset() {
        let t = datetime!(2024-03-01 08:15:30.123456 UTC);
        assert_eq!(Postgres.encode_datetime(t), "2024-03-01 08:15:30.123456+00");
        // reads come back through to_char, without the offset
        assert_eq!(
            Postgres.decode_datetime("2024-03-01 08:15:30.123456").unwrap(),
            t
        );
    }

    #[test]
    fn datetime_accepts_missing_fraction() {
        let t = Sqlite.decode_datetime("2024-03-01 08:15:30").unwrap();
        assert_eq!(t, datetime!(2024-03-01 08:15:30 UTC));
    }

    #[test]
    fn datetime_rejects_garbage() {
        assert!(MySql.decode_datetime("not a datetime").is_err());
    }

    #[test]
    fn non_database_errors_are_not_duplicates() {
        assert!(!MySql.is_duplicate(&sqlx::Error::RowNotFound));
        assert!(!Postgres.is_duplicate(&sqlx::Error::RowNotFound));
        assert!(!Sqlite.is_duplicate(&sqlx::Error::RowNotFound));
    }
}

//! User credential handling compatible with Microsoft's ASP.NET Core
//! Identity, including bitwise compatibility of values in the shared
//! users table (usually `aspnetusers`).
//!
//! This is useful when moving the server side of an application to Rust
//! without resetting anyone's password: a Rust service and an ASP.NET
//! service can run alongside each other against the same authentication
//! database, each verifying hashes the other wrote.
//!
//! [`User`] holds the values the identity framework keeps per user,
//! corresponding to `IdentityUser` (and derived `ApplicationUser`)
//! classes. It has a primary key `id`, a unique `user_name` key (via its
//! normalized form) and an `email` that need not be unique. In modern
//! applications the user name is usually itself an email address, but
//! may still differ from `email`. Add users with
//! [`UserStore::new_user`], find them with [`UserStore::find_by_id`] or
//! [`UserStore::find_by_name`], and write changes back with
//! [`UserStore::update`], which detects clashing concurrent updates via
//! the concurrency stamp.
//!
//! Engine differences (parameter markers, boolean and datetime column
//! representations, duplicate-key errors) are confined to a [`Dialect`]
//! chosen at store construction; MySQL is the default, with adapters for
//! PostgreSQL and SQLite included.
//!
//! The MySQL definition of the table can act as a guide for other
//! engines:
//!
//! ```sql
//! CREATE TABLE `aspnetusers` (
//!   `Id` varchar(127) NOT NULL,
//!   `AccessFailedCount` int(11) NOT NULL,
//!   `ConcurrencyStamp` longtext,
//!   `Email` varchar(256) DEFAULT NULL,
//!   `EmailConfirmed` bit(1) NOT NULL,
//!   `LockoutEnabled` bit(1) NOT NULL,
//!   `LockoutEnd` datetime(6) DEFAULT NULL,
//!   `NormalizedEmail` varchar(256) DEFAULT NULL,
//!   `NormalizedUserName` varchar(256) DEFAULT NULL,
//!   `PasswordHash` longtext,
//!   `PhoneNumber` longtext,
//!   `PhoneNumberConfirmed` bit(1) NOT NULL,
//!   `SecurityStamp` longtext,
//!   `TwoFactorEnabled` bit(1) NOT NULL,
//!   `UserName` varchar(256) DEFAULT NULL,
//!   PRIMARY KEY (`Id`),
//!   KEY `EmailIndex` (`NormalizedEmail`),
//!   UNIQUE KEY `UserNameIndex` (`NormalizedUserName`)
//! ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
//! ```
//!
//! Note that MySQL uses `bit(1)` rather than a boolean type, which is
//! why boolean coercion is part of the dialect.

mod auth;
pub mod dialect;
mod error;
pub mod password;
mod store;
mod user;

pub use dialect::{BoolValue, Dialect, MySql, Postgres, Sqlite};
pub use error::{Error, Result};
pub use password::{hash_password, verify_password, HashError};
pub use store::UserStore;
pub use user::User;

//! The execution collaborator a commit batch is sent through.
//!
//! Commit sends its whole batch in one [`Connection::query`] call and
//! reads the identifier correlation rows from the result. Connections
//! integrate with asupersync's structured concurrency via the `Cx`
//! context, so cancellation and timeouts belong to the connection, not to
//! change detection.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::parameter::Parameter;
use crate::row::Row;
use asupersync::{Cx, Outcome};

/// The database product a connection talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dialect {
    /// Microsoft SQL Server
    #[default]
    SqlServer,
    /// PostgreSQL
    Postgres,
    /// SQLite
    Sqlite,
    /// MySQL / MariaDB
    Mysql,
}

impl Dialect {
    pub const fn name(&self) -> &'static str {
        match self {
            Dialect::SqlServer => "sqlserver",
            Dialect::Postgres => "postgres",
            Dialect::Sqlite => "sqlite",
            Dialect::Mysql => "mysql",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlserver" | "mssql" | "tsql" => Ok(Dialect::SqlServer),
            "postgres" | "postgresql" | "pg" => Ok(Dialect::Postgres),
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            "mysql" | "mariadb" => Ok(Dialect::Mysql),
            other => Err(Error::InvalidArgument(format!(
                "unknown SQL dialect '{other}'"
            ))),
        }
    }
}

/// A database connection able to run a commit batch.
///
/// Implementations must be `Send + Sync` for use across async boundaries.
pub trait Connection: Send + Sync {
    /// The dialect batches for this connection are rendered in.
    fn dialect(&self) -> Dialect;

    /// Execute a batch and return the rows of its result set.
    ///
    /// An empty vector means the batch produced no rows (for example a
    /// batch of updates only).
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Parameter],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialect_parses_aliases() {
        assert_eq!("MSSQL".parse::<Dialect>().unwrap(), Dialect::SqlServer);
        assert_eq!("postgresql".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert_eq!("sqlite3".parse::<Dialect>().unwrap(), Dialect::Sqlite);
        assert_eq!("MariaDB".parse::<Dialect>().unwrap(), Dialect::Mysql);
        assert!("oracle".parse::<Dialect>().is_err());
        assert_eq!(Dialect::Postgres.to_string(), "postgres");
    }
}

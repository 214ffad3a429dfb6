use derive_new::new;
use snafu::{Location, ResultExt as _, Snafu};
use surrealdb::{
    engine::any::Any,
    opt::{
        auth::{self, Credentials, Jwt, Signin},
        IntoQuery, QueryResult,
    },
    Surreal,
};
use url::Url;

use crate::error::{ApplicationError, ConnectDatabaseSnafu};
use crate::Located;

pub type Result<T, E = DatabaseError> = std::result::Result<T, E>;

const SETUP: &str = include_str!("../schema.surrealql");

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DatabaseError {
    #[snafu(display("failed to query the database at {location}: {source}"))]
    DatabaseQuery {
        source: surrealdb::Error,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("failed to deserialize the database response at {location}: {source}"))]
    DatabaseDeserialize {
        source: surrealdb::Error,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("cannot connect to the database `{url}` at {location}: {source}"))]
    DatabaseConnection {
        url: Url,
        source: surrealdb::Error,
        #[snafu(implicit)]
        location: Location,
    },
}

impl Located for DatabaseError {
    fn location(&self) -> Location {
        match self {
            DatabaseError::DatabaseQuery { location, .. }
            | DatabaseError::DatabaseDeserialize { location, .. }
            | DatabaseError::DatabaseConnection { location, .. } => *location,
        }
    }
}

impl DatabaseError {
    /// Whether the statement ran past its `TIMEOUT` clause and was rolled back.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            DatabaseError::DatabaseQuery {
                source: surrealdb::Error::Db(surrealdb::error::Db::QueryTimedout),
                ..
            }
        )
    }
}

/// Connects to the configured database and makes sure the schema exists.
pub async fn connect(config: &DatabaseConfig) -> Result<Database, ApplicationError> {
    let database = Database::connect(config)
        .await
        .context(ConnectDatabaseSnafu)?;

    tracing::info!(url = %config.url, namespace = %config.namespace, database = %config.database, "connected to the database");
    Ok(database)
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Url,
    pub namespace: String,
    pub database: String,
    pub credentials: Option<DatabaseCredentials>,
}

impl DatabaseConfig {
    /// An in-memory database that only lives as long as its connection.
    pub fn in_memory() -> Self {
        DatabaseConfig {
            url: Url::parse("mem://").expect("static url is valid"),
            namespace: "test".to_string(),
            database: "test".to_string(),
            credentials: None,
        }
    }

    fn auth(&self) -> Option<impl Credentials<Signin, Jwt> + '_> {
        let credentials = self.credentials.as_ref()?;

        Some(auth::Database {
            namespace: &self.namespace,
            database: &self.database,
            username: &credentials.username,
            password: &credentials.password,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct DatabaseCredentials {
    pub username: String,
    pub password: String,
}

/// Represents a database wrapper.
///
/// The inner client is cheap to clone and shares one connection, so a `Database` can be handed to every request.
#[derive(Debug, Clone, new)]
pub struct Database {
    database: Surreal<Any>,
}

impl Database {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let url = &config.url;
        let database = surrealdb::engine::any::connect(url.as_str())
            .await
            .context(DatabaseConnectionSnafu { url: url.clone() })?;

        if let Some(auth) = config.auth() {
            database
                .signin(auth)
                .await
                .context(DatabaseConnectionSnafu { url: url.clone() })?;
        }

        database
            .use_ns(&config.namespace)
            .use_db(&config.database)
            .await
            .context(DatabaseConnectionSnafu { url: url.clone() })?;

        let database = Database::new(database);
        database.setup().await?;

        Ok(database)
    }

    /// Connects to a fresh in-memory database with the schema applied.
    pub async fn in_memory() -> Result<Self> {
        Database::connect(&DatabaseConfig::in_memory()).await
    }

    async fn setup(&self) -> Result<()> {
        self.database
            .query(SETUP)
            .await
            .context(DatabaseQuerySnafu)?
            .check()
            .context(DatabaseQuerySnafu)?;

        Ok(())
    }

    /// Create a builder to execute arbitrary SQL code on the database.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let top: Vec<VideoRow> = db.sql("SELECT * FROM video WHERE views > $views")
    ///                 .bind(("views", 100))
    ///                 .fetch().await?;
    /// ```
    ///
    /// The `fetch` method can deserialize the result into either a single value (`Option<T>`) or a collection of values (`Vec<T>`).
    pub fn sql(&self, query: impl IntoQuery) -> Query<'_> {
        let query = self.database.query(query);
        Query { query }
    }
}

impl std::ops::Deref for Database {
    type Target = Surreal<Any>;

    fn deref(&self) -> &Self::Target {
        &self.database
    }
}

#[derive(Debug)]
pub struct Query<'a> {
    query: surrealdb::method::Query<'a, Any>,
}

impl Query<'_> {
    pub fn bind(mut self, params: impl serde::Serialize) -> Self {
        let query = self.query;
        self.query = query.bind(params);
        self
    }

    /// Execute the query and deserialize the result of the first statement.
    pub async fn fetch<T: serde::de::DeserializeOwned>(self) -> Result<T>
    where
        usize: QueryResult<T>,
    {
        let mut statements = self
            .query
            .await
            .context(DatabaseQuerySnafu)?
            .check()
            .context(DatabaseQuerySnafu)?;
        let result = statements.take::<T>(0).context(DatabaseDeserializeSnafu)?;
        Ok(result)
    }
}

/// Makes every write of `video_id` fail the schema, so tests can see a storage failure.
#[cfg(test)]
pub(crate) async fn reject_video_id(database: &Database, video_id: &str) {
    let statement = format!(
        "DEFINE FIELD video_id ON video TYPE string ASSERT string::len($value) > 0 AND $value != '{video_id}'"
    );
    database
        .sql(statement)
        .fetch::<Option<serde_json::Value>>()
        .await
        .unwrap();
}

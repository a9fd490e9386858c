use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// The four crawler variants a repository can be registered as. Maps 1:1 to
/// `Crawler::{Filesystem, Git, GitlabGroup, Svn}` (C3) — `repository_type`
/// is how C2 decides which variant to construct for a given repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RepositoryType {
    Filesystem,
    Git,
    GitlabGroup,
    Svn,
}

impl RepositoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepositoryType::Filesystem => "FILESYSTEM",
            RepositoryType::Git => "GIT",
            RepositoryType::GitlabGroup => "GITLAB_GROUP",
            RepositoryType::Svn => "SVN",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "FILESYSTEM" => Some(RepositoryType::Filesystem),
            "GIT" => Some(RepositoryType::Git),
            "GITLAB_GROUP" => Some(RepositoryType::GitlabGroup),
            "SVN" => Some(RepositoryType::Svn),
            _ => None,
        }
    }
}

// sqlx stores repository_type as TEXT; decode/encode through the string form
// rather than deriving sqlx::Type, since SCREAMING_SNAKE_CASE is the wire
// format both Postgres and SQLite rows carry.
impl sqlx::Type<sqlx::Postgres> for RepositoryType {
    fn type_info() -> <sqlx::Postgres as sqlx::Database>::TypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }
}

impl sqlx::Type<sqlx::Sqlite> for RepositoryType {
    fn type_info() -> <sqlx::Sqlite as sqlx::Database>::TypeInfo {
        <String as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for RepositoryType {
    fn decode(
        value: <sqlx::Postgres as sqlx::Database>::ValueRef<'r>,
    ) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        RepositoryType::parse(&s).ok_or_else(|| format!("unknown repository_type '{s}'").into())
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for RepositoryType {
    fn decode(value: <sqlx::Sqlite as sqlx::Database>::ValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        RepositoryType::parse(&s).ok_or_else(|| format!("unknown repository_type '{s}'").into())
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for RepositoryType {
    fn encode_by_ref(
        &self,
        buf: &mut <sqlx::Postgres as sqlx::Database>::ArgumentBuffer<'q>,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode(self.as_str().to_string(), buf)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for RepositoryType {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str().to_string(), buf)
    }
}

/// A named ingestion source (C1 entity). Field-for-field per the data
/// model, plus the crash-recovery bookkeeping columns (`crawl_state`,
/// `crawl_started_at`, `last_crawl_duration_seconds`) supplemented from the
/// teacher's schema.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Repository {
    pub id: Uuid,
    pub name: String,
    /// Path (FILESYSTEM), clone URL (GIT), group URL (GITLAB_GROUP), or
    /// working-copy URL (SVN).
    pub url: String,
    pub repository_type: RepositoryType,
    pub branch: Option<String>,
    pub enabled: bool,
    /// Opaque secret, encrypted at rest by `EncryptionService`. Never
    /// serialized back out to API callers.
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    pub gitlab_namespace: Option<String>,
    pub gitlab_excluded_projects: Option<String>,
    pub gitlab_excluded_patterns: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_crawled: Option<DateTime<Utc>>,
    /// Opaque cursor: commit hash (GIT/GITLAB_GROUP), revision number
    /// (SVN), or unused (FILESYSTEM). Crawler-owned; registry updates never
    /// touch this field.
    pub last_indexed_revision: Option<String>,
    pub auto_crawl_enabled: bool,
    pub cron_schedule: Option<String>,
    pub next_crawl_at: Option<DateTime<Utc>>,
    pub crawl_frequency_hours: Option<i32>,
    pub max_crawl_duration_minutes: Option<i32>,
    pub last_crawl_duration_seconds: Option<i32>,
    /// Non-terminal crawl-state marker ("starting"/"cloning"/"processing"/
    /// "indexing") written by C2 so a restart can distinguish "never
    /// crawled" from "crawl was interrupted mid-run".
    pub crawl_state: Option<String>,
    pub last_processed_project: Option<String>,
    pub crawl_started_at: Option<DateTime<Utc>>,
}

/// Fields accepted from `POST /repositories`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRepository {
    pub name: String,
    pub url: String,
    pub repository_type: RepositoryType,
    pub branch: Option<String>,
    pub enabled: Option<bool>,
    pub access_token: Option<String>,
    pub gitlab_namespace: Option<String>,
    pub gitlab_excluded_projects: Option<String>,
    pub gitlab_excluded_patterns: Option<String>,
    pub cron_schedule: Option<String>,
    pub crawl_frequency_hours: Option<i32>,
    pub max_crawl_duration_minutes: Option<i32>,
}

/// Fields accepted from `PUT /repositories/{id}`; every field optional,
/// `None` leaves the column untouched. `last_indexed_revision` is
/// deliberately absent — only the crawler updates it (§4.1 invariant).
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RepositoryPatch {
    pub name: Option<String>,
    pub url: Option<String>,
    pub branch: Option<String>,
    pub enabled: Option<bool>,
    pub access_token: Option<String>,
    pub gitlab_namespace: Option<String>,
    pub gitlab_excluded_projects: Option<String>,
    pub gitlab_excluded_patterns: Option<String>,
    pub cron_schedule: Option<String>,
    pub crawl_frequency_hours: Option<i32>,
    pub max_crawl_duration_minutes: Option<i32>,
}

/// Query filter for `list()` (C1).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RepositoryFilter {
    pub enabled: Option<bool>,
    pub kind: Option<RepositoryType>,
    pub q: Option<String>,
}

//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use libsql::{Connection, Database as LibSqlDatabase, Value, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::model::{
    CertificationSignal, Contact, ContactStatus, Job, JobStatus, MessageChannel, MessageDraft,
    NewContact,
};
use crate::store::migrations;
use crate::store::traits::{CreateOutcome, Database, DraftRevision};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn query_jobs(
        &self,
        sql: &str,
        params: Vec<Value>,
        op: &str,
    ) -> Result<Vec<Job>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        let mut jobs = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?
        {
            jobs.push(row_to_job(&row).map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?);
        }
        Ok(jobs)
    }

    async fn query_contacts(
        &self,
        sql: &str,
        params: Vec<Value>,
        op: &str,
    ) -> Result<Vec<Contact>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        let mut contacts = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?
        {
            contacts.push(row_to_contact(&row)?);
        }
        Ok(contacts)
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> Value {
    match s {
        Some(s) => Value::Text(s.to_string()),
        None => Value::Null,
    }
}

fn text(s: impl Into<String>) -> Value {
    Value::Text(s.into())
}

/// `'a', 'b'` from static status labels, for `IN (...)` clauses.
fn status_list(statuses: &[ContactStatus]) -> String {
    statuses
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn parse_column<T>(value: &str, column: &str) -> Result<T, DatabaseError>
where
    T: std::str::FromStr<Err = String>,
{
    value
        .parse()
        .map_err(|e| DatabaseError::Serialization(format!("contacts.{column}: {e}")))
}

const JOB_COLUMNS: &str =
    "id, status, company, role_title, job_description, resume_summary, updated_at";

/// Map a libsql Row to a Job. Column order matches JOB_COLUMNS.
fn row_to_job(row: &libsql::Row) -> Result<Job, libsql::Error> {
    let status: String = row.get(1)?;
    let updated: String = row.get(6)?;
    Ok(Job {
        id: row.get(0)?,
        status: JobStatus::from(status),
        company: row.get(2)?,
        role_title: row.get(3)?,
        job_description: row.get(4)?,
        resume_summary: row.get(5)?,
        updated_at: parse_datetime(&updated),
    })
}

const CONTACT_COLUMNS: &str = "seq, id, job_id, name, company, title, role, source, degree, \
     connected_on, status, certification, draft_text, draft_channel, draft_char_count, \
     draft_revision, drafted_at, final_message, profile_url, thread_id, created_at, updated_at";

/// Map a libsql Row to a Contact. Column order matches CONTACT_COLUMNS.
fn row_to_contact(row: &libsql::Row) -> Result<Contact, DatabaseError> {
    let get = |idx: i32| -> Result<String, DatabaseError> {
        row.get::<String>(idx)
            .map_err(|e| DatabaseError::Query(format!("contact row column {idx}: {e}")))
    };
    let opt = |idx: i32| row.get::<String>(idx).ok();

    let id = get(1)?;
    let id = Uuid::parse_str(&id)
        .map_err(|e| DatabaseError::Serialization(format!("contacts.id {id}: {e}")))?;

    let draft = match (opt(12), opt(13)) {
        (Some(text), Some(channel)) => {
            let channel: MessageChannel = parse_column(&channel, "draft_channel")?;
            Some(MessageDraft {
                char_count: row
                    .get::<i64>(14)
                    .map(|n| n as usize)
                    .unwrap_or_else(|_| text.chars().count()),
                revision: row.get::<i64>(15).map(|n| n as u32).unwrap_or(1),
                created_at: opt(16).map(|s| parse_datetime(&s)).unwrap_or_else(Utc::now),
                text,
                channel,
            })
        }
        _ => None,
    };

    Ok(Contact {
        id,
        seq: row
            .get::<i64>(0)
            .map_err(|e| DatabaseError::Query(format!("contact row seq: {e}")))?,
        job_id: get(2)?,
        name: get(3)?,
        company: get(4)?,
        title: opt(5),
        role: parse_column(&get(6)?, "role")?,
        source: parse_column(&get(7)?, "source")?,
        degree: parse_column(&get(8)?, "degree")?,
        connected_on: opt(9).and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
        status: parse_column(&get(10)?, "status")?,
        certification: opt(11)
            .map(|s| parse_column::<CertificationSignal>(&s, "certification"))
            .transpose()?,
        draft,
        final_message: opt(17),
        profile_url: opt(18),
        thread_id: opt(19),
        created_at: parse_datetime(&get(20)?),
        updated_at: parse_datetime(&get(21)?),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Jobs ────────────────────────────────────────────────────────

    async fn upsert_job(&self, job: &Job) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO jobs (id, status, company, role_title, job_description, resume_summary, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (id) DO UPDATE SET
                    status = ?2, company = ?3, role_title = ?4,
                    job_description = ?5, resume_summary = ?6, updated_at = ?7",
                params![
                    job.id.as_str(),
                    job.status.as_str(),
                    job.company.as_str(),
                    job.role_title.as_str(),
                    job.job_description.as_str(),
                    job.resume_summary.as_str(),
                    job.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_job: {e}")))?;

        debug!(job_id = %job.id, status = %job.status, "Job upserted");
        Ok(())
    }

    async fn get_job(&self, id: &str) -> Result<Option<Job>, DatabaseError> {
        let jobs = self
            .query_jobs(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
                vec![text(id)],
                "get_job",
            )
            .await?;
        Ok(jobs.into_iter().next())
    }

    async fn list_jobs_by_status(&self, status: &JobStatus) -> Result<Vec<Job>, DatabaseError> {
        self.query_jobs(
            &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE status = ?1 ORDER BY updated_at ASC, id ASC"),
            vec![text(status.as_str())],
            "list_jobs_by_status",
        )
        .await
    }

    async fn list_eligible_jobs_without_contacts(
        &self,
        status: &JobStatus,
    ) -> Result<Vec<Job>, DatabaseError> {
        self.query_jobs(
            &format!(
                "SELECT {JOB_COLUMNS} FROM jobs j WHERE j.status = ?1
                 AND NOT EXISTS (SELECT 1 FROM contacts c WHERE c.job_id = j.id)
                 ORDER BY j.updated_at ASC, j.id ASC"
            ),
            vec![text(status.as_str())],
            "list_eligible_jobs_without_contacts",
        )
        .await
    }

    // ── Contacts ────────────────────────────────────────────────────

    async fn create_contact(&self, contact: &NewContact) -> Result<CreateOutcome, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let id = Uuid::new_v4();
        let name_key = contact.name_key();
        let company_key = contact.company_key();

        let inserted = self
            .conn()
            .execute(
                "INSERT INTO contacts (id, job_id, name, company, name_key, company_key, title, role,
                    source, degree, connected_on, status, profile_url, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)
                 ON CONFLICT (job_id, name_key, company_key, source) DO NOTHING",
                params![
                    id.to_string(),
                    contact.job_id(),
                    contact.name(),
                    contact.company(),
                    name_key.as_str(),
                    company_key.as_str(),
                    opt_text(contact.title()),
                    contact.role().as_str(),
                    contact.source().as_str(),
                    contact.degree().as_str(),
                    opt_text(
                        contact
                            .connected_on()
                            .map(|d| d.format("%Y-%m-%d").to_string())
                            .as_deref()
                    ),
                    ContactStatus::Ready.as_str(),
                    opt_text(contact.profile_url()),
                    now,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create_contact: {e}")))?;

        let stored = self
            .query_contacts(
                &format!(
                    "SELECT {CONTACT_COLUMNS} FROM contacts
                     WHERE job_id = ?1 AND name_key = ?2 AND company_key = ?3 AND source = ?4"
                ),
                vec![
                    text(contact.job_id()),
                    text(name_key),
                    text(company_key),
                    text(contact.source().as_str()),
                ],
                "create_contact",
            )
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "contact".into(),
                id: format!("{}/{}", contact.job_id(), contact.name()),
            })?;

        if inserted > 0 {
            debug!(contact_id = %stored.id, job_id = %stored.job_id, "Contact created");
            Ok(CreateOutcome::Created(stored))
        } else {
            debug!(contact_id = %stored.id, job_id = %stored.job_id, "Contact already exists");
            Ok(CreateOutcome::Existing(stored))
        }
    }

    async fn get_contact(&self, id: Uuid) -> Result<Option<Contact>, DatabaseError> {
        let contacts = self
            .query_contacts(
                &format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = ?1"),
                vec![text(id.to_string())],
                "get_contact",
            )
            .await?;
        Ok(contacts.into_iter().next())
    }

    async fn list_contacts_for_job(&self, job_id: &str) -> Result<Vec<Contact>, DatabaseError> {
        self.query_contacts(
            &format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE job_id = ?1 ORDER BY seq ASC"),
            vec![text(job_id)],
            "list_contacts_for_job",
        )
        .await
    }

    async fn list_contacts_by_status(
        &self,
        status: ContactStatus,
    ) -> Result<Vec<Contact>, DatabaseError> {
        self.query_contacts(
            &format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE status = ?1 ORDER BY seq ASC"),
            vec![text(status.as_str())],
            "list_contacts_by_status",
        )
        .await
    }

    async fn set_certification_signal(
        &self,
        id: Uuid,
        signal: CertificationSignal,
    ) -> Result<bool, DatabaseError> {
        let changed = self
            .conn()
            .execute(
                "UPDATE contacts SET certification = ?1, updated_at = ?2
                 WHERE id = ?3 AND certification IS NULL",
                params![signal.as_str(), Utc::now().to_rfc3339(), id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_certification_signal: {e}")))?;
        Ok(changed > 0)
    }

    async fn save_draft(
        &self,
        id: Uuid,
        draft: &MessageDraft,
        instruction: Option<&str>,
        expected: &[ContactStatus],
        new_status: ContactStatus,
    ) -> Result<bool, DatabaseError> {
        if expected.is_empty() {
            return Ok(false);
        }
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();

        let changed = conn
            .execute(
                &format!(
                    "UPDATE contacts SET draft_text = ?1, draft_channel = ?2, draft_char_count = ?3,
                        draft_revision = ?4, drafted_at = ?5, status = ?6, updated_at = ?7
                     WHERE id = ?8 AND status IN ({})",
                    status_list(expected)
                ),
                params![
                    draft.text.as_str(),
                    draft.channel.as_str(),
                    draft.char_count as i64,
                    draft.revision as i64,
                    draft.created_at.to_rfc3339(),
                    new_status.as_str(),
                    now.as_str(),
                    id.to_string(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_draft: {e}")))?;

        if changed == 0 {
            debug!(contact_id = %id, "Draft not saved; contact not in expected status");
            return Ok(false);
        }

        conn.execute(
            "INSERT INTO draft_revisions (contact_id, revision, channel, text, char_count, instruction, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id.to_string(),
                draft.revision as i64,
                draft.channel.as_str(),
                draft.text.as_str(),
                draft.char_count as i64,
                opt_text(instruction),
                now,
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("save_draft revision: {e}")))?;

        debug!(contact_id = %id, revision = draft.revision, status = %new_status, "Draft saved");
        Ok(true)
    }

    async fn mark_pending_approval(
        &self,
        id: Uuid,
        thread_id: &str,
    ) -> Result<bool, DatabaseError> {
        let changed = self
            .conn()
            .execute(
                &format!(
                    "UPDATE contacts SET status = ?1, thread_id = ?2, updated_at = ?3
                     WHERE id = ?4 AND status IN ({})",
                    status_list(&[ContactStatus::Drafted, ContactStatus::PendingApproval])
                ),
                params![
                    ContactStatus::PendingApproval.as_str(),
                    thread_id,
                    Utc::now().to_rfc3339(),
                    id.to_string(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_pending_approval: {e}")))?;
        Ok(changed > 0)
    }

    async fn update_contact_status(
        &self,
        id: Uuid,
        from: ContactStatus,
        to: ContactStatus,
    ) -> Result<bool, DatabaseError> {
        let changed = self
            .conn()
            .execute(
                "UPDATE contacts SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
                params![to.as_str(), Utc::now().to_rfc3339(), id.to_string(), from.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_contact_status: {e}")))?;

        if changed > 0 {
            debug!(contact_id = %id, %from, %to, "Contact status updated");
        }
        Ok(changed > 0)
    }

    async fn mark_contact_approved(
        &self,
        id: Uuid,
        final_message: &str,
        revision: u32,
    ) -> Result<bool, DatabaseError> {
        let changed = self
            .conn()
            .execute(
                "UPDATE contacts SET status = ?1, final_message = ?2, updated_at = ?3
                 WHERE id = ?4 AND status = ?5 AND draft_revision = ?6",
                params![
                    ContactStatus::Approved.as_str(),
                    final_message,
                    Utc::now().to_rfc3339(),
                    id.to_string(),
                    ContactStatus::PendingApproval.as_str(),
                    revision as i64,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_contact_approved: {e}")))?;
        Ok(changed > 0)
    }

    async fn list_draft_revisions(&self, id: Uuid) -> Result<Vec<DraftRevision>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT revision, channel, text, char_count, instruction, created_at
                 FROM draft_revisions WHERE contact_id = ?1 ORDER BY id ASC",
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_draft_revisions: {e}")))?;

        let mut revisions = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_draft_revisions: {e}")))?
        {
            let parse = |e: libsql::Error| DatabaseError::Query(format!("list_draft_revisions: {e}"));
            let channel: String = row.get(1).map_err(parse)?;
            let created: String = row.get(5).map_err(parse)?;
            revisions.push(DraftRevision {
                contact_id: id,
                revision: row.get::<i64>(0).map_err(parse)? as u32,
                channel: parse_column(&channel, "draft_revisions.channel")?,
                text: row.get(2).map_err(parse)?,
                char_count: row.get::<i64>(3).map_err(parse)? as usize,
                instruction: row.get::<String>(4).ok(),
                created_at: parse_datetime(&created),
            });
        }
        Ok(revisions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{DiscoveredContact, OverlapMatch};
    use crate::model::{ConnectionDegree, ContactRole, ContactSource};

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn job(id: &str, status: JobStatus) -> Job {
        Job::new(id, status, "Acme", "Data Eng").with_description("Epic Clarity experience")
    }

    fn discovered(name: &str, role: ContactRole) -> DiscoveredContact {
        DiscoveredContact {
            name: name.into(),
            title: Some("Engineering Manager".into()),
            role,
            profile_url: Some(format!("https://www.linkedin.com/in/{}/", name.replace(' ', ""))),
            connection_degree: ConnectionDegree::Second,
        }
    }

    async fn seeded_contact(db: &LibSqlBackend) -> Contact {
        let j = job("rec1", JobStatus::InProgress);
        db.upsert_job(&j).await.unwrap();
        db.create_contact(&NewContact::from_discovery(&j, &discovered("Jane Roe", ContactRole::HiringManager)))
            .await
            .unwrap()
            .contact()
            .clone()
    }

    // ── Job tests ───────────────────────────────────────────────────

    #[tokio::test]
    async fn upsert_and_get_job() {
        let db = test_db().await;
        let mut j = job("rec1", JobStatus::ToDo);
        db.upsert_job(&j).await.unwrap();

        j.status = JobStatus::InProgress;
        db.upsert_job(&j).await.unwrap();

        let fetched = db.get_job("rec1").await.unwrap().unwrap();
        assert_eq!(fetched.status, JobStatus::InProgress);
        assert_eq!(fetched.job_description, "Epic Clarity experience");
        assert!(db.get_job("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn eligible_jobs_exclude_other_statuses_and_jobs_with_contacts() {
        let db = test_db().await;
        db.upsert_job(&job("rec1", JobStatus::InProgress)).await.unwrap();
        db.upsert_job(&job("rec2", JobStatus::InProgress)).await.unwrap();
        db.upsert_job(&job("rec3", JobStatus::ToDo)).await.unwrap();

        let rec2 = db.get_job("rec2").await.unwrap().unwrap();
        db.create_contact(&NewContact::from_discovery(&rec2, &discovered("Jane Roe", ContactRole::Recruiter)))
            .await
            .unwrap();

        let eligible = db
            .list_eligible_jobs_without_contacts(&JobStatus::InProgress)
            .await
            .unwrap();
        let ids: Vec<&str> = eligible.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec!["rec1"]);

        let in_progress = db.list_jobs_by_status(&JobStatus::InProgress).await.unwrap();
        assert_eq!(in_progress.len(), 2);
    }

    // ── Contact tests ───────────────────────────────────────────────

    #[tokio::test]
    async fn create_contact_is_idempotent() {
        let db = test_db().await;
        let j = job("rec1", JobStatus::InProgress);
        db.upsert_job(&j).await.unwrap();

        let first = db
            .create_contact(&NewContact::from_discovery(&j, &discovered("Jane Roe", ContactRole::HiringManager)))
            .await
            .unwrap();
        let again = db
            .create_contact(&NewContact::from_discovery(&j, &discovered("  jane  ROE ", ContactRole::HiringManager)))
            .await
            .unwrap();

        assert!(first.is_created());
        assert!(!again.is_created());
        assert_eq!(first.contact().id, again.contact().id);
        assert_eq!(db.list_contacts_for_job("rec1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn same_person_from_both_sources_stays_separate() {
        let db = test_db().await;
        let j = job("rec1", JobStatus::InProgress);
        db.upsert_job(&j).await.unwrap();

        db.create_contact(&NewContact::from_discovery(&j, &discovered("Jane Roe", ContactRole::HiringManager)))
            .await
            .unwrap();
        let warm = db
            .create_contact(&NewContact::from_overlap(&OverlapMatch {
                name: "Jane Roe".into(),
                position: Some("Director".into()),
                role: ContactRole::HiringManager,
                company: "Acme".into(),
                connected_on: NaiveDate::from_ymd_opt(2023, 5, 15),
                job_id: "rec1".into(),
                profile_url: None,
            }))
            .await
            .unwrap();

        assert!(warm.is_created());
        let stored = warm.contact();
        assert_eq!(stored.source, ContactSource::OverlapImport);
        assert_eq!(stored.degree, ConnectionDegree::First);
        assert_eq!(stored.connected_on, NaiveDate::from_ymd_opt(2023, 5, 15));
        assert_eq!(db.list_contacts_for_job("rec1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn contacts_listed_in_discovery_order() {
        let db = test_db().await;
        let j = job("rec1", JobStatus::InProgress);
        db.upsert_job(&j).await.unwrap();
        for name in ["A One", "B Two", "C Three"] {
            db.create_contact(&NewContact::from_discovery(&j, &discovered(name, ContactRole::TeamMember)))
                .await
                .unwrap();
        }

        let ready = db.list_contacts_by_status(ContactStatus::Ready).await.unwrap();
        let names: Vec<&str> = ready.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["A One", "B Two", "C Three"]);
        assert!(ready.windows(2).all(|w| w[0].seq < w[1].seq));
    }

    #[tokio::test]
    async fn certification_signal_is_written_once() {
        let db = test_db().await;
        let c = seeded_contact(&db).await;

        assert!(db
            .set_certification_signal(c.id, CertificationSignal::RequirementWithoutSkill)
            .await
            .unwrap());
        assert!(!db
            .set_certification_signal(c.id, CertificationSignal::NoSignal)
            .await
            .unwrap());

        let fetched = db.get_contact(c.id).await.unwrap().unwrap();
        assert_eq!(
            fetched.certification,
            Some(CertificationSignal::RequirementWithoutSkill)
        );
    }

    #[tokio::test]
    async fn save_draft_is_conditional_on_status() {
        let db = test_db().await;
        let c = seeded_contact(&db).await;
        let draft = MessageDraft::new("Jane, your analytics team...", MessageChannel::ConnectionNote);

        assert!(db
            .save_draft(c.id, &draft, None, &[ContactStatus::Ready], ContactStatus::Drafted)
            .await
            .unwrap());
        // Second save from Ready no longer applies.
        assert!(!db
            .save_draft(c.id, &draft, None, &[ContactStatus::Ready], ContactStatus::Drafted)
            .await
            .unwrap());

        let fetched = db.get_contact(c.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, ContactStatus::Drafted);
        let stored = fetched.draft.unwrap();
        assert_eq!(stored.text, draft.text);
        assert_eq!(stored.char_count, draft.char_count);
        assert_eq!(stored.channel, MessageChannel::ConnectionNote);
        assert_eq!(db.list_draft_revisions(c.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn approval_flow_and_duplicate_approve() {
        let db = test_db().await;
        let c = seeded_contact(&db).await;
        let draft = MessageDraft::new("first", MessageChannel::ConnectionNote);
        db.save_draft(c.id, &draft, None, &[ContactStatus::Ready], ContactStatus::Drafted)
            .await
            .unwrap();

        assert!(db.mark_pending_approval(c.id, "thread-1").await.unwrap());

        let revised = draft.revised("second");
        assert!(db
            .save_draft(
                c.id,
                &revised,
                Some("make it shorter"),
                &[ContactStatus::PendingApproval],
                ContactStatus::PendingApproval,
            )
            .await
            .unwrap());

        assert!(db.mark_contact_approved(c.id, "second", 2).await.unwrap());
        assert!(!db.mark_contact_approved(c.id, "second", 2).await.unwrap());
        assert!(!db
            .update_contact_status(c.id, ContactStatus::PendingApproval, ContactStatus::Skipped)
            .await
            .unwrap());

        let fetched = db.get_contact(c.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, ContactStatus::Approved);
        assert_eq!(fetched.final_message.as_deref(), Some("second"));
        assert_eq!(fetched.thread_id.as_deref(), Some("thread-1"));
        assert_eq!(fetched.draft.unwrap().revision, 2);

        let history = db.list_draft_revisions(c.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].instruction.as_deref(), Some("make it shorter"));
    }

    #[tokio::test]
    async fn approve_of_a_superseded_draft_is_refused() {
        let db = test_db().await;
        let c = seeded_contact(&db).await;
        let draft = MessageDraft::new("first", MessageChannel::ConnectionNote);
        db.save_draft(c.id, &draft, None, &[ContactStatus::Ready], ContactStatus::Drafted)
            .await
            .unwrap();
        db.mark_pending_approval(c.id, "thread-1").await.unwrap();
        db.save_draft(
            c.id,
            &draft.revised("second"),
            Some("warmer"),
            &[ContactStatus::PendingApproval],
            ContactStatus::PendingApproval,
        )
        .await
        .unwrap();

        // Approval read revision 1 before the edit landed.
        assert!(!db.mark_contact_approved(c.id, "first", 1).await.unwrap());
        let fetched = db.get_contact(c.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, ContactStatus::PendingApproval);
        assert!(fetched.final_message.is_none());

        assert!(db.mark_contact_approved(c.id, "second", 2).await.unwrap());
    }

    #[tokio::test]
    async fn local_database_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("outreach.db");
        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.upsert_job(&job("rec1", JobStatus::InProgress)).await.unwrap();
        }
        let db = LibSqlBackend::new_local(&path).await.unwrap();
        assert!(db.get_job("rec1").await.unwrap().is_some());
    }
}

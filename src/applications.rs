use chrono::NaiveDateTime;
use diesel::{dsl::exists, prelude::*, result::DatabaseErrorKind, select, PgConnection};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::catalog::JobCatalog;
use crate::error::{AppError, AppResult, ErrorKind};
use crate::models::{Application, Job, NewApplication};
use crate::resume::{artifact_key, download_name, sanitize_filename};
use crate::schema::{applications, jobs, users};
use crate::storage::ArtifactStore;

#[derive(Debug, Clone)]
pub struct ResumeUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub job_id: Uuid,
    pub freelancer_id: Uuid,
    pub cover_letter: Option<String>,
    pub resume: Option<ResumeUpload>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    MissingResume,
    JobNotFound,
    DuplicateApplication,
}

impl Rejection {
    pub fn message(self) -> &'static str {
        match self {
            Rejection::MissingResume => "Please upload a resume!",
            Rejection::JobNotFound => "That job no longer exists.",
            Rejection::DuplicateApplication => "You have already applied for this job!",
        }
    }

    pub fn kind(self) -> ErrorKind {
        match self {
            Rejection::MissingResume => ErrorKind::MissingResume,
            Rejection::JobNotFound => ErrorKind::NotFound,
            Rejection::DuplicateApplication => ErrorKind::DuplicateApplication,
        }
    }
}

impl From<Rejection> for AppError {
    fn from(rejection: Rejection) -> Self {
        AppError::new(rejection.kind(), rejection.message())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Accepted(Uuid),
    Rejected(Rejection),
}

/// An application as its employer reviews it.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationView {
    pub id: Uuid,
    pub job_id: Uuid,
    pub job_title: String,
    pub freelancer_id: Uuid,
    pub freelancer_name: String,
    pub freelancer_email: String,
    pub cover_letter: Option<String>,
    pub resume_name: String,
    pub submitted_at: NaiveDateTime,
}

pub struct Applications<'a> {
    conn: &'a mut PgConnection,
}

impl<'a> Applications<'a> {
    pub fn new(conn: &'a mut PgConnection) -> Self {
        Applications { conn }
    }

    pub fn exists(&mut self, job_id: Uuid, freelancer_id: Uuid) -> QueryResult<bool> {
        select(exists(
            applications::table
                .filter(applications::job_id.eq(job_id))
                .filter(applications::freelancer_id.eq(freelancer_id)),
        ))
        .get_result(self.conn)
    }

    /// `Ok(false)` when the (job, freelancer) pair already has an application.
    pub fn insert(&mut self, application: &NewApplication) -> QueryResult<bool> {
        match diesel::insert_into(applications::table)
            .values(application)
            .execute(self.conn)
        {
            Ok(_) => Ok(true),
            Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    pub fn find(&mut self, application_id: Uuid) -> QueryResult<Option<Application>> {
        applications::table
            .find(application_id)
            .first(self.conn)
            .optional()
    }

    pub fn count_for_job(&mut self, job_id: Uuid) -> QueryResult<i64> {
        applications::table
            .filter(applications::job_id.eq(job_id))
            .count()
            .get_result(self.conn)
    }

    /// The job, if `employer_id` owns it, together with its applications.
    pub fn list_for_job(
        &mut self,
        job_id: Uuid,
        employer_id: Uuid,
    ) -> AppResult<(Job, Vec<ApplicationView>)> {
        let job = JobCatalog::new(self.conn)
            .find_owned(job_id, employer_id)?
            .ok_or_else(AppError::not_found_or_unauthorized)?;
        let views = self.load_views(employer_id, Some(job_id))?;
        Ok((job, views))
    }

    pub fn list_for_employer(&mut self, employer_id: Uuid) -> AppResult<Vec<ApplicationView>> {
        self.load_views(employer_id, None)
    }

    pub fn all_resume_paths(&mut self) -> QueryResult<Vec<String>> {
        applications::table
            .select(applications::resume_path)
            .load(self.conn)
    }

    fn load_views(
        &mut self,
        employer_id: Uuid,
        job_id: Option<Uuid>,
    ) -> AppResult<Vec<ApplicationView>> {
        let mut query = applications::table
            .inner_join(users::table)
            .inner_join(jobs::table)
            .filter(jobs::employer_id.eq(employer_id))
            .select((
                applications::all_columns,
                users::name,
                users::email,
                jobs::title,
            ))
            .order((applications::created_at.asc(), applications::id.asc()))
            .into_boxed();
        if let Some(job_id) = job_id {
            query = query.filter(applications::job_id.eq(job_id));
        }

        let rows: Vec<(Application, String, String, String)> = query.load(self.conn)?;
        Ok(rows
            .into_iter()
            .map(|(application, name, email, title)| ApplicationView {
                id: application.id,
                job_id: application.job_id,
                job_title: title,
                freelancer_id: application.freelancer_id,
                resume_name: download_name(&application.resume_path, &name),
                freelancer_name: name,
                freelancer_email: email,
                cover_letter: application.cover_letter,
                submitted_at: application.created_at,
            })
            .collect())
    }
}

/// Records a freelancer's application with its resume.
///
/// Nothing is written for a missing resume, an unknown job or a pair that
/// already applied. When a concurrent submission wins the unique constraint
/// after the resume was stored, the stored file is removed again.
pub async fn submit(
    conn: &mut PgConnection,
    artifacts: &dyn ArtifactStore,
    request: SubmitRequest,
) -> AppResult<Submission> {
    let SubmitRequest {
        job_id,
        freelancer_id,
        cover_letter,
        resume,
    } = request;

    let Some((filename, bytes)) = resume.and_then(|upload| {
        let filename = sanitize_filename(&upload.filename)?;
        (!upload.bytes.is_empty()).then_some((filename, upload.bytes))
    }) else {
        return Ok(Submission::Rejected(Rejection::MissingResume));
    };

    if JobCatalog::new(conn).find(job_id)?.is_none() {
        return Ok(Submission::Rejected(Rejection::JobNotFound));
    }

    if Applications::new(conn).exists(job_id, freelancer_id)? {
        info!(job_id = %job_id, freelancer_id = %freelancer_id, "duplicate application rejected");
        return Ok(Submission::Rejected(Rejection::DuplicateApplication));
    }

    let application_id = Uuid::new_v4();
    let resume_path = artifact_key(job_id, application_id, freelancer_id, &filename);
    artifacts.put(&resume_path, bytes).await?;

    let new_application = NewApplication {
        id: application_id,
        job_id,
        freelancer_id,
        cover_letter: cover_letter
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty()),
        resume_path: resume_path.clone(),
    };

    let inserted = Applications::new(conn).insert(&new_application);
    match inserted {
        Ok(true) => {
            info!(
                application_id = %application_id,
                job_id = %job_id,
                freelancer_id = %freelancer_id,
                "application submitted"
            );
            Ok(Submission::Accepted(application_id))
        }
        Ok(false) => {
            warn!(job_id = %job_id, freelancer_id = %freelancer_id, "lost application race");
            discard_artifact(artifacts, &resume_path).await;
            Ok(Submission::Rejected(Rejection::DuplicateApplication))
        }
        Err(err) => {
            discard_artifact(artifacts, &resume_path).await;
            Err(err.into())
        }
    }
}

async fn discard_artifact(artifacts: &dyn ArtifactStore, resume_path: &str) {
    if let Err(err) = artifacts.delete(resume_path).await {
        error!(error = ?err, resume_path = %resume_path, "failed to remove unreferenced resume");
    }
}

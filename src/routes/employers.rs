use axum::{
    extract::{Form, Path, State},
    http::HeaderMap,
    response::Redirect,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use super::FormPage;
use crate::{
    applications::{ApplicationView, Applications},
    auth::{Authorized, Employer},
    catalog::{JobCatalog, JobDraft},
    error::{AppError, AppResult, ErrorKind},
    models::Job,
    notice::{redirect_with, Notice, Page, PendingNotice},
    resume::{self, Resume},
    state::AppState,
};

const DASHBOARD_PATH: &str = "/employers/dashboard";
const UPLOAD_PATH: &str = "/employer/upload";

#[derive(Debug, Default, Deserialize)]
pub struct JobForm {
    pub title: Option<String>,
    pub description: Option<String>,
    pub salary: Option<String>,
    pub job_type: Option<String>,
}

impl JobForm {
    fn draft(&self) -> AppResult<JobDraft> {
        JobDraft::parse(
            self.title.as_deref(),
            self.description.as_deref(),
            self.salary.as_deref(),
            self.job_type.as_deref(),
        )
        .map_err(AppError::validation)
    }
}

#[derive(Debug, Serialize)]
pub struct EmployerJob {
    #[serde(flatten)]
    pub job: Job,
    pub application_count: i64,
}

#[derive(Debug, Serialize)]
pub struct EmployerDashboard {
    pub jobs: Vec<EmployerJob>,
}

#[derive(Debug, Serialize)]
pub struct JobEditPage {
    pub job: Job,
}

#[derive(Debug, Serialize)]
pub struct JobApplicationsPage {
    pub job: Job,
    pub applications: Vec<ApplicationView>,
}

#[derive(Debug, Serialize)]
pub struct ApplicationsPage {
    pub applications: Vec<ApplicationView>,
}

fn edit_path(job_id: Uuid) -> String {
    format!("/employer/job/edit/{job_id}")
}

pub async fn dashboard(
    employer: Authorized<Employer>,
    State(state): State<AppState>,
    pending: PendingNotice,
) -> AppResult<Page<EmployerDashboard>> {
    let mut conn = state.db()?;
    let jobs = JobCatalog::new(&mut conn).list_by_employer(employer.user_id())?;

    let mut entries = Vec::with_capacity(jobs.len());
    for job in jobs {
        let application_count = Applications::new(&mut conn).count_for_job(job.id)?;
        entries.push(EmployerJob {
            job,
            application_count,
        });
    }

    Ok(Page::new(pending, EmployerDashboard { jobs: entries }))
}

pub async fn upload_page(
    _employer: Authorized<Employer>,
    pending: PendingNotice,
) -> Page<FormPage> {
    Page::new(pending, FormPage { page: "upload-job" })
}

pub async fn upload_job(
    employer: Authorized<Employer>,
    State(state): State<AppState>,
    Form(form): Form<JobForm>,
) -> AppResult<(HeaderMap, Redirect)> {
    let draft = form.draft().map_err(|err| err.redirect_to(UPLOAD_PATH))?;

    let mut conn = state.db().map_err(|err| err.redirect_to(UPLOAD_PATH))?;
    let job_id = JobCatalog::new(&mut conn)
        .create(employer.user_id(), draft)
        .ok_or_else(|| {
            AppError::new(ErrorKind::Store, "Failed to upload job!").redirect_to(UPLOAD_PATH)
        })?;

    info!(job_id = %job_id, employer_id = %employer.user_id(), "job posted");
    Ok(redirect_with(
        DASHBOARD_PATH,
        Notice::success("Job uploaded successfully!"),
    ))
}

pub async fn edit_page(
    employer: Authorized<Employer>,
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    pending: PendingNotice,
) -> AppResult<Page<JobEditPage>> {
    let mut conn = state.db()?;
    let job = JobCatalog::new(&mut conn)
        .find_owned(job_id, employer.user_id())?
        .ok_or_else(|| AppError::not_found_or_unauthorized().redirect_to(DASHBOARD_PATH))?;
    Ok(Page::new(pending, JobEditPage { job }))
}

pub async fn edit_job(
    employer: Authorized<Employer>,
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Form(form): Form<JobForm>,
) -> AppResult<(HeaderMap, Redirect)> {
    let draft = form
        .draft()
        .map_err(|err| err.redirect_to(edit_path(job_id)))?;

    let mut conn = state.db().map_err(|err| err.redirect_to(DASHBOARD_PATH))?;
    if !JobCatalog::new(&mut conn).update(job_id, employer.user_id(), &draft) {
        return Err(AppError::not_found_or_unauthorized().redirect_to(DASHBOARD_PATH));
    }

    info!(job_id = %job_id, "job updated");
    Ok(redirect_with(
        DASHBOARD_PATH,
        Notice::success("Job updated successfully!"),
    ))
}

pub async fn delete_job(
    employer: Authorized<Employer>,
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> AppResult<(HeaderMap, Redirect)> {
    let mut conn = state.db().map_err(|err| err.redirect_to(DASHBOARD_PATH))?;
    let mut catalog = JobCatalog::new(&mut conn);
    let owned = catalog
        .find_owned(job_id, employer.user_id())
        .map_err(|err| AppError::from(err).redirect_to(DASHBOARD_PATH))?;
    let resume_paths = match owned {
        Some(_) => catalog
            .resume_paths(job_id)
            .map_err(|err| AppError::from(err).redirect_to(DASHBOARD_PATH))?,
        None => Vec::new(),
    };

    if !catalog.delete(job_id, employer.user_id()) {
        return Err(AppError::not_found_or_unauthorized().redirect_to(DASHBOARD_PATH));
    }
    drop(conn);

    for path in &resume_paths {
        if let Err(err) = state.artifacts.delete(path).await {
            error!(error = ?err, resume_path = %path, "failed to remove resume of deleted job");
        }
    }

    info!(
        job_id = %job_id,
        removed_resumes = resume_paths.len(),
        "job deleted"
    );
    Ok(redirect_with(
        DASHBOARD_PATH,
        Notice::success("Job deleted successfully!"),
    ))
}

pub async fn job_applications(
    employer: Authorized<Employer>,
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    pending: PendingNotice,
) -> AppResult<Page<JobApplicationsPage>> {
    let mut conn = state.db()?;
    let (job, applications) = Applications::new(&mut conn)
        .list_for_job(job_id, employer.user_id())
        .map_err(|err| err.redirect_to(DASHBOARD_PATH))?;

    Ok(Page::new(pending, JobApplicationsPage { job, applications }))
}

pub async fn all_applications(
    employer: Authorized<Employer>,
    State(state): State<AppState>,
    pending: PendingNotice,
) -> AppResult<Page<ApplicationsPage>> {
    let mut conn = state.db()?;
    let applications = Applications::new(&mut conn).list_for_employer(employer.user_id())?;
    Ok(Page::new(pending, ApplicationsPage { applications }))
}

pub async fn download_resume(
    employer: Authorized<Employer>,
    State(state): State<AppState>,
    Path(application_id): Path<Uuid>,
) -> AppResult<Resume> {
    let mut conn = state.db()?;
    resume::retrieve(
        &mut conn,
        state.artifacts.as_ref(),
        application_id,
        employer.user_id(),
    )
    .await
    .map_err(|err| err.redirect_to(DASHBOARD_PATH))
}

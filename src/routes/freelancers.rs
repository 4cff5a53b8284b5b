use axum::{
    extract::{Multipart, Path, Query, State},
    http::HeaderMap,
    response::Redirect,
};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::{
    applications::{self, Applications, Rejection, ResumeUpload, SubmitRequest, Submission},
    auth::{Authorized, Freelancer},
    browse::{browse, JobPage},
    catalog::JobCatalog,
    error::{AppError, AppResult},
    models::Job,
    notice::{redirect_with, Notice, Page, PendingNotice},
    state::AppState,
};

const DASHBOARD_PATH: &str = "/freelancers/dashboard";

#[derive(Debug, Default, Deserialize)]
pub struct BrowseQuery {
    #[serde(alias = "search")]
    pub q: Option<String>,
    pub page: Option<String>,
}

impl BrowseQuery {
    /// Unparseable page numbers fall back to the first page.
    fn page(&self) -> Option<usize> {
        self.page.as_deref().and_then(|raw| raw.trim().parse().ok())
    }
}

#[derive(Debug, Serialize)]
pub struct ApplyPage {
    pub job: Job,
    pub already_applied: bool,
}

fn apply_path(job_id: Uuid) -> String {
    format!("/job/apply/{job_id}")
}

pub async fn dashboard(
    _freelancer: Authorized<Freelancer>,
    State(state): State<AppState>,
    Query(query): Query<BrowseQuery>,
    pending: PendingNotice,
) -> AppResult<Page<JobPage>> {
    let mut conn = state.db()?;
    let listings = JobCatalog::new(&mut conn).list_all()?;
    let page = browse(listings, query.q.as_deref().unwrap_or_default(), query.page());
    Ok(Page::new(pending, page))
}

pub async fn apply_page(
    freelancer: Authorized<Freelancer>,
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    pending: PendingNotice,
) -> AppResult<Page<ApplyPage>> {
    let mut conn = state.db()?;
    let job = JobCatalog::new(&mut conn)
        .find(job_id)?
        .ok_or_else(|| AppError::from(Rejection::JobNotFound).redirect_to(DASHBOARD_PATH))?;
    let already_applied = Applications::new(&mut conn).exists(job_id, freelancer.user_id())?;
    Ok(Page::new(
        pending,
        ApplyPage {
            job,
            already_applied,
        },
    ))
}

pub async fn apply(
    freelancer: Authorized<Freelancer>,
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    multipart: Multipart,
) -> AppResult<(HeaderMap, Redirect)> {
    let back = apply_path(job_id);
    let (cover_letter, resume) = read_application_form(multipart)
        .await
        .map_err(|err| err.redirect_to(back.clone()))?;

    let mut conn = state.db().map_err(|err| err.redirect_to(back.clone()))?;
    let request = SubmitRequest {
        job_id,
        freelancer_id: freelancer.user_id(),
        cover_letter,
        resume,
    };
    let outcome = applications::submit(&mut conn, state.artifacts.as_ref(), request)
        .await
        .map_err(|err| err.redirect_to(back.clone()))?;

    match outcome {
        Submission::Accepted(_) => Ok(redirect_with(
            DASHBOARD_PATH,
            Notice::success("Application submitted successfully!"),
        )),
        Submission::Rejected(Rejection::JobNotFound) => {
            Err(AppError::from(Rejection::JobNotFound).redirect_to(DASHBOARD_PATH))
        }
        Submission::Rejected(rejection) => Err(AppError::from(rejection).redirect_to(back)),
    }
}

async fn read_application_form(
    mut multipart: Multipart,
) -> AppResult<(Option<String>, Option<ResumeUpload>)> {
    let mut cover_letter = None;
    let mut resume = None;

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        warn!(error = %err, "invalid multipart data");
        AppError::validation(format!("invalid form data: {err}"))
    })? {
        match field.name() {
            Some("cover_letter") => {
                let text = field.text().await.map_err(|err| {
                    warn!(error = %err, "failed to read cover letter");
                    AppError::validation("invalid cover letter")
                })?;
                cover_letter = Some(text);
            }
            Some("resume") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(|err| {
                    warn!(error = %err, "failed to read resume bytes");
                    AppError::validation("failed to read the uploaded resume")
                })?;
                resume = Some(ResumeUpload {
                    filename,
                    bytes: bytes.to_vec(),
                });
            }
            _ => {}
        }
    }

    Ok((cover_letter, resume))
}

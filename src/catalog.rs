use diesel::{prelude::*, PgConnection};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::models::{Job, NewJob};
use crate::schema::{applications, jobs, users};

pub const UNKNOWN_COMPANY: &str = "Unknown";

/// Validated job fields shared by create and edit.
#[derive(Debug, Clone, PartialEq)]
pub struct JobDraft {
    pub title: String,
    pub description: String,
    pub salary: f64,
    pub job_type: String,
}

impl JobDraft {
    pub fn parse(
        title: Option<&str>,
        description: Option<&str>,
        salary: Option<&str>,
        job_type: Option<&str>,
    ) -> Result<Self, String> {
        let title = required(title, "title")?;
        let description = required(description, "description")?;
        let job_type = required(job_type, "job type")?;
        let salary = required(salary, "salary")?
            .parse::<f64>()
            .map_err(|_| "salary must be a number".to_string())?;
        if !salary.is_finite() || salary < 0.0 {
            return Err("salary must be a non-negative number".to_string());
        }

        Ok(Self {
            title,
            description,
            salary,
            job_type,
        })
    }
}

fn required(value: Option<&str>, field: &str) -> Result<String, String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| format!("{field} is required"))
}

/// A job as freelancers see it while browsing.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JobListing {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub salary: f64,
    pub job_type: String,
    pub company_name: String,
}

#[derive(AsChangeset)]
#[diesel(table_name = jobs)]
struct JobChangeset<'a> {
    title: &'a str,
    description: &'a str,
    salary: f64,
    job_type: &'a str,
}

pub struct JobCatalog<'a> {
    conn: &'a mut PgConnection,
}

impl<'a> JobCatalog<'a> {
    pub fn new(conn: &'a mut PgConnection) -> Self {
        JobCatalog { conn }
    }

    /// `None` when the job could not be stored, for whatever reason.
    pub fn create(&mut self, employer_id: Uuid, draft: JobDraft) -> Option<Uuid> {
        let new_job = NewJob {
            id: Uuid::new_v4(),
            title: draft.title,
            description: draft.description,
            salary: draft.salary,
            job_type: draft.job_type,
            employer_id,
        };

        match diesel::insert_into(jobs::table)
            .values(&new_job)
            .execute(self.conn)
        {
            Ok(_) => Some(new_job.id),
            Err(err) => {
                warn!(error = %err, employer_id = %employer_id, "failed to create job");
                None
            }
        }
    }

    /// Only rows owned by `employer_id` are touched; `false` covers both
    /// "no such job" and "not yours".
    pub fn update(&mut self, job_id: Uuid, employer_id: Uuid, draft: &JobDraft) -> bool {
        let changeset = JobChangeset {
            title: &draft.title,
            description: &draft.description,
            salary: draft.salary,
            job_type: &draft.job_type,
        };

        match diesel::update(
            jobs::table
                .filter(jobs::id.eq(job_id))
                .filter(jobs::employer_id.eq(employer_id)),
        )
        .set(&changeset)
        .execute(self.conn)
        {
            Ok(rows) => rows > 0,
            Err(err) => {
                warn!(error = %err, job_id = %job_id, "failed to update job");
                false
            }
        }
    }

    /// Same ownership scoping as [`JobCatalog::update`]. Applications go with
    /// the job through the foreign key cascade.
    pub fn delete(&mut self, job_id: Uuid, employer_id: Uuid) -> bool {
        match diesel::delete(
            jobs::table
                .filter(jobs::id.eq(job_id))
                .filter(jobs::employer_id.eq(employer_id)),
        )
        .execute(self.conn)
        {
            Ok(rows) => rows > 0,
            Err(err) => {
                warn!(error = %err, job_id = %job_id, "failed to delete job");
                false
            }
        }
    }

    pub fn find(&mut self, job_id: Uuid) -> QueryResult<Option<Job>> {
        jobs::table.find(job_id).first(self.conn).optional()
    }

    pub fn find_owned(&mut self, job_id: Uuid, employer_id: Uuid) -> QueryResult<Option<Job>> {
        jobs::table
            .filter(jobs::id.eq(job_id))
            .filter(jobs::employer_id.eq(employer_id))
            .first(self.conn)
            .optional()
    }

    /// Resume keys of every application to `job_id`.
    pub fn resume_paths(&mut self, job_id: Uuid) -> QueryResult<Vec<String>> {
        applications::table
            .filter(applications::job_id.eq(job_id))
            .select(applications::resume_path)
            .load(self.conn)
    }

    pub fn list_by_employer(&mut self, employer_id: Uuid) -> QueryResult<Vec<Job>> {
        jobs::table
            .filter(jobs::employer_id.eq(employer_id))
            .order((jobs::created_at.asc(), jobs::id.asc()))
            .load(self.conn)
    }

    /// Every job in insertion order, with the employer's company name.
    pub fn list_all(&mut self) -> QueryResult<Vec<JobListing>> {
        let rows: Vec<(Job, Option<String>)> = jobs::table
            .left_join(users::table)
            .select((jobs::all_columns, users::company_name.nullable()))
            .order((jobs::created_at.asc(), jobs::id.asc()))
            .load(self.conn)?;

        Ok(rows
            .into_iter()
            .map(|(job, company)| JobListing {
                id: job.id,
                title: job.title,
                description: job.description,
                salary: job.salary,
                job_type: job.job_type,
                company_name: company
                    .filter(|name| !name.trim().is_empty())
                    .unwrap_or_else(|| UNKNOWN_COMPANY.to_string()),
            })
            .collect())
    }
}

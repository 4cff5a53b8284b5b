use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::{COOKIE, LOCATION, SET_COOKIE};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_migrations::MigrationHarness;
use http_body_util::BodyExt;
use jobboard::auth::session::SessionService;
use jobboard::config::AppConfig;
use jobboard::db::{self, PgPool, MIGRATIONS};
use jobboard::models::Job;
use jobboard::notice::Notice;
use jobboard::routes;
use jobboard::state::AppState;
use jobboard::storage::ArtifactStore;
use once_cell::sync::Lazy;
use tempfile::TempDir;
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub const PASSWORD: &str = "correct horse";

/// Artifact store kept in memory. Writes yield once so concurrent
/// submissions interleave the way they would against a disk.
#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl ArtifactStore for FakeStorage {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        tokio::task::yield_now().await;
        let mut guard = self.objects.lock().await;
        guard.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let guard = self.objects.lock().await;
        Ok(guard.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut guard = self.objects.lock().await;
        guard.remove(key);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>> {
        let guard = self.objects.lock().await;
        let mut keys: Vec<String> = guard.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

impl FakeStorage {
    #[allow(dead_code)]
    pub async fn object_count(&self) -> usize {
        let guard = self.objects.lock().await;
        guard.len()
    }

    #[allow(dead_code)]
    pub async fn keys(&self) -> Vec<String> {
        self.list().await.unwrap_or_default()
    }
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    storage: Arc<FakeStorage>,
    _upload_dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        let database_url = env::var("TEST_DATABASE_URL")
            .context("TEST_DATABASE_URL must be set for integration tests")?;
        let upload_dir = TempDir::new()?;

        let config = AppConfig {
            database_url: database_url.clone(),
            database_max_pool_size: 4,
            run_migrations: false,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            session_secret: "test-secret".to_string(),
            session_issuer: "test-issuer".to_string(),
            session_audience: "test-audience".to_string(),
            session_expiry_minutes: 60,
            session_cookie_secure: false,
            session_cookie_domain: None,
            upload_dir: upload_dir.path().to_path_buf(),
            max_upload_bytes: 1024 * 1024,
            cors_allowed_origin: None,
        };

        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let storage = Arc::new(FakeStorage::default());
        let storage_for_state: Arc<dyn ArtifactStore> = storage.clone();
        let sessions = SessionService::from_config(&config)?;
        let state = AppState::new(pool, config, storage_for_state, sessions);
        let router = routes::create_router(state.clone());

        Ok(Self {
            state,
            router,
            storage,
            _upload_dir: upload_dir,
        })
    }

    pub async fn cleanup(&self) -> Result<()> {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get cleanup connection: {err}"))?;
            truncate_all(&mut conn)?;
            Ok(())
        })
        .await
        .context("cleanup task panicked")?
    }

    #[allow(dead_code)]
    pub fn storage(&self) -> Arc<FakeStorage> {
        self.storage.clone()
    }

    /// Registers a freelancer and returns the session cookie pair.
    #[allow(dead_code)]
    pub async fn register_freelancer(&self, name: &str, email: &str) -> Result<String> {
        let response = self
            .post_form(
                "/freelancers/register",
                &[("name", name), ("email", email), ("password", PASSWORD)],
                None,
            )
            .await?;
        session_from(&response).context("freelancer registration set no session")
    }

    /// Registers an employer for `company` and returns the session cookie pair.
    #[allow(dead_code)]
    pub async fn register_employer(
        &self,
        name: &str,
        email: &str,
        company: &str,
    ) -> Result<String> {
        let response = self
            .post_form(
                "/employers/register",
                &[
                    ("name", name),
                    ("email", email),
                    ("password", PASSWORD),
                    ("company_name", company),
                    ("date_of_birth", "1985-06-01"),
                ],
                None,
            )
            .await?;
        session_from(&response).context("employer registration set no session")
    }

    #[allow(dead_code)]
    pub async fn post_job(&self, session: &str, title: &str, description: &str) -> Result<Uuid> {
        let response = self
            .post_form(
                "/employer/upload",
                &[
                    ("title", title),
                    ("description", description),
                    ("salary", "4200"),
                    ("job_type", "Remote"),
                ],
                Some(session),
            )
            .await?;
        anyhow::ensure!(
            location(&response) == Some("/employers/dashboard"),
            "job upload failed with {:?}",
            notice_from(&response)
        );

        let title = title.to_string();
        self.with_conn(move |conn| {
            use jobboard::schema::jobs::dsl;
            dsl::jobs
                .filter(dsl::title.eq(title))
                .order(dsl::created_at.desc())
                .select(dsl::id)
                .first::<Uuid>(conn)
                .context("posted job missing")
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn load_job(&self, job_id: Uuid) -> Result<Option<Job>> {
        self.with_conn(move |conn| {
            use jobboard::schema::jobs::dsl;
            dsl::jobs
                .find(job_id)
                .first::<Job>(conn)
                .optional()
                .context("failed to load job")
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn user_id(&self, email: &str) -> Result<Uuid> {
        let email = email.to_string();
        self.with_conn(move |conn| {
            use jobboard::schema::users::dsl;
            dsl::users
                .filter(dsl::email.eq(email))
                .select(dsl::id)
                .first::<Uuid>(conn)
                .context("user missing")
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn application_ids(&self, job_id: Uuid) -> Result<Vec<Uuid>> {
        self.with_conn(move |conn| {
            use jobboard::schema::applications::dsl;
            dsl::applications
                .filter(dsl::job_id.eq(job_id))
                .select(dsl::id)
                .load::<Uuid>(conn)
                .context("failed to load applications")
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn count_rows(&self, table: &'static str) -> Result<i64> {
        #[derive(QueryableByName)]
        struct Count {
            #[diesel(sql_type = diesel::sql_types::BigInt)]
            count: i64,
        }

        self.with_conn(move |conn| {
            let row = diesel::sql_query(format!("SELECT COUNT(*) AS count FROM {table}"))
                .get_result::<Count>(conn)
                .context("failed to count rows")?;
            Ok(row.count)
        })
        .await
    }

    pub async fn post_form(
        &self,
        path: &str,
        fields: &[(&str, &str)],
        session: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header("content-type", "application/x-www-form-urlencoded");
        if let Some(session) = session {
            builder = builder.header(COOKIE, session);
        }
        let request = builder.body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn get(&self, path: &str, cookie: Option<&str>) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(Method::GET).uri(path);
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        let request = builder.body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    #[allow(dead_code)]
    pub async fn apply(
        &self,
        job_id: Uuid,
        cover_letter: &str,
        resume: Option<(&str, &[u8])>,
        session: &str,
    ) -> Result<hyper::Response<Body>> {
        let boundary = format!("boundary-{}", Uuid::new_v4());
        let mut body = Vec::new();
        body.extend(format!("--{boundary}\r\n").as_bytes());
        body.extend(b"Content-Disposition: form-data; name=\"cover_letter\"\r\n\r\n");
        body.extend(cover_letter.as_bytes());
        body.extend(b"\r\n");

        if let Some((filename, data)) = resume {
            body.extend(format!("--{boundary}\r\n").as_bytes());
            body.extend(
                format!(
                    "Content-Disposition: form-data; name=\"resume\"; filename=\"{}\"\r\n",
                    filename
                )
                .as_bytes(),
            );
            body.extend(b"Content-Type: application/pdf\r\n\r\n");
            body.extend(data);
            body.extend(b"\r\n");
        }

        body.extend(format!("--{boundary}--\r\n").as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("/job/apply/{job_id}"))
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .header(COOKIE, session)
            .body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("connection task panicked")?
    }
}

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

#[allow(dead_code)]
pub async fn body_json(response: hyper::Response<Body>) -> Result<serde_json::Value> {
    let body = body_to_vec(response.into_body()).await?;
    Ok(serde_json::from_slice(&body)?)
}

/// The `Location` of a redirect response.
pub fn location(response: &hyper::Response<Body>) -> Option<&str> {
    response
        .headers()
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
}

fn set_cookie(response: &hyper::Response<Body>, name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|value| value.starts_with(&prefix))
        .and_then(|value| value.split(';').next())
        .map(str::to_string)
}

/// `session=<token>` from the response, ready for a `Cookie` header.
pub fn session_from(response: &hyper::Response<Body>) -> Option<String> {
    set_cookie(response, "session").filter(|pair| pair != "session=")
}

/// Whether the response expires the session cookie.
#[allow(dead_code)]
pub fn session_cleared(response: &hyper::Response<Body>) -> bool {
    set_cookie(response, "session").is_some_and(|pair| pair == "session=")
}

/// The notice a redirect response carries.
pub fn notice_from(response: &hyper::Response<Body>) -> Option<Notice> {
    set_cookie(response, "notice")
        .and_then(|pair| pair.strip_prefix("notice=").map(str::to_string))
        .and_then(|raw| Notice::parse(&raw))
}

#[allow(dead_code)]
pub fn assert_redirect(response: &hyper::Response<Body>, to: &str) {
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(response), Some(to));
}

async fn prepare_database(pool: &PgPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|err| anyhow!("failed to run migrations: {err}"))?;
        truncate_all(&mut conn)?;
        Ok(())
    })
    .await
    .context("migration task panicked")?
}

fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute("TRUNCATE TABLE applications, jobs, contacts, users CASCADE;")
        .context("failed to truncate tables")?;
    Ok(())
}

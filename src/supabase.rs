use crate::store::{SyncState, Task, TaskKind};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::time::Duration;

const REQUEST_TIMEOUT_SECS: u64 = 60; // 60 second timeout for API requests

/// An authenticated identity against the remote task store.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    pub access_token: String,
}

/// Remote task store collaborator: a table of task rows keyed by owner
/// identity + row id. Insert returns the server-assigned id.
#[async_trait]
pub trait TaskBackend: Send + Sync {
    async fn insert_task(
        &self,
        session: &Session,
        content: &str,
        kind: TaskKind,
    ) -> Result<String, Box<dyn Error + Send + Sync>>;

    async fn update_completed(
        &self,
        session: &Session,
        id: &str,
        completed: bool,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;

    async fn delete_task(
        &self,
        session: &Session,
        id: &str,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// All rows for the current identity, ordered by creation time descending.
    async fn list_tasks(
        &self,
        session: &Session,
    ) -> Result<Vec<Task>, Box<dyn Error + Send + Sync>>;
}

#[derive(Debug, Serialize)]
struct SignInRequest {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct SignInResponse {
    access_token: String,
    user: AuthUser,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
}

#[derive(Debug, Serialize)]
struct InsertTaskRequest<'a> {
    user_id: &'a str,
    content: &'a str,
    kind: &'a str,
}

#[derive(Debug, Serialize)]
struct UpdateCompletedRequest {
    completed: bool,
}

#[derive(Debug, Deserialize)]
struct TaskRow {
    id: String,
    content: String,
    kind: TaskKind,
    completed: bool,
    created_at: String,
}

impl TaskRow {
    fn into_task(self) -> Task {
        Task {
            id: self.id,
            content: self.content,
            kind: self.kind,
            completed: self.completed,
            created_at: self.created_at,
            sync: SyncState::Confirmed,
        }
    }
}

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(base_url: &str, anon_key: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
        }
    }

    /// Exchange email + password for a session token.
    pub async fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, Box<dyn Error + Send + Sync>> {
        let response = self
            .client
            .post(format!("{}/auth/v1/token?grant_type=password", self.base_url))
            .header("apikey", &self.anon_key)
            .header("Content-Type", "application/json")
            .json(&SignInRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();

            if status.as_u16() == 400 || status.as_u16() == 401 {
                return Err("Invalid email or password".into());
            }

            return Err(format!("Auth error ({}): {}", status, error_text).into());
        }

        let auth: SignInResponse = response.json().await?;

        Ok(Session {
            user_id: auth.user.id,
            access_token: auth.access_token,
        })
    }

    /// Best-effort token revocation. The in-memory session is dropped by the
    /// caller regardless of the outcome here.
    pub async fn sign_out(&self, session: &Session) -> Result<(), Box<dyn Error + Send + Sync>> {
        let response = self
            .client
            .post(format!("{}/auth/v1/logout", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(&session.access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(format!("Logout error ({}): {}", status, error_text).into());
        }

        Ok(())
    }

    fn tasks_url(&self) -> String {
        format!("{}/rest/v1/tasks", self.base_url)
    }
}

#[async_trait]
impl TaskBackend for SupabaseClient {
    async fn insert_task(
        &self,
        session: &Session,
        content: &str,
        kind: TaskKind,
    ) -> Result<String, Box<dyn Error + Send + Sync>> {
        let response = self
            .client
            .post(self.tasks_url())
            .header("apikey", &self.anon_key)
            .bearer_auth(&session.access_token)
            .header("Content-Type", "application/json")
            .header("Prefer", "return=representation")
            .json(&InsertTaskRequest {
                user_id: &session.user_id,
                content,
                kind: kind.as_str(),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(format!("Task insert error ({}): {}", status, error_text).into());
        }

        let rows: Vec<TaskRow> = response.json().await?;

        rows.into_iter()
            .next()
            .map(|row| row.id)
            .ok_or_else(|| "No row returned from task insert".into())
    }

    async fn update_completed(
        &self,
        session: &Session,
        id: &str,
        completed: bool,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let response = self
            .client
            .patch(format!("{}?id=eq.{}", self.tasks_url(), id))
            .header("apikey", &self.anon_key)
            .bearer_auth(&session.access_token)
            .header("Content-Type", "application/json")
            .json(&UpdateCompletedRequest { completed })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(format!("Task update error ({}): {}", status, error_text).into());
        }

        Ok(())
    }

    async fn delete_task(
        &self,
        session: &Session,
        id: &str,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let response = self
            .client
            .delete(format!("{}?id=eq.{}", self.tasks_url(), id))
            .header("apikey", &self.anon_key)
            .bearer_auth(&session.access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(format!("Task delete error ({}): {}", status, error_text).into());
        }

        Ok(())
    }

    async fn list_tasks(
        &self,
        session: &Session,
    ) -> Result<Vec<Task>, Box<dyn Error + Send + Sync>> {
        let response = self
            .client
            .get(format!(
                "{}?select=*&order=created_at.desc",
                self.tasks_url()
            ))
            .header("apikey", &self.anon_key)
            .bearer_auth(&session.access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(format!("Task list error ({}): {}", status, error_text).into());
        }

        let rows: Vec<TaskRow> = response.json().await?;

        Ok(rows.into_iter().map(TaskRow::into_task).collect())
    }
}

//! Per-job Unix socket listener.
//!
//! The socket is the only way in: nothing listens on the network, and the file is created with mode `0600` so only the agent's user can connect.
//! [`socket_path_in`] puts each socket in its own directory, created `0700`, so the file is never reachable by others between bind and chmod.
//!
//! Responses are streamed status-line first. If serializing or writing a body fails after the status was sent, hyper drops the connection; the client sees a truncated response and the server keeps serving.
use std::{
    fs, io,
    os::unix::fs::{DirBuilderExt, FileTypeExt, PermissionsExt},
    path::{Path, PathBuf},
    process,
    sync::Arc,
    time::Duration,
};

use kiln_core::{EnvStore, SessionToken};
use kiln_model::{JOB_API_SOCKET_ENV, JOB_API_TOKEN_ENV};
use tokio::{net::UnixListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{adapter::EnvStoreAdapter, error::ServerError, http::HttpApi};

/// Portable upper bound for `sockaddr_un.sun_path` (macOS: 104, Linux: 108).
const SOCKET_PATH_MAX: usize = 104;

/// How long `stop` waits for in-flight requests before aborting the server task.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Mode of a socket directory the server creates itself.
const DIR_MODE: u32 = 0o700;

/// Pick a fresh socket path for one job: `<dir>/job-api-<pid>-<rand>/api.sock`.
pub fn socket_path_in(dir: &Path) -> PathBuf {
    let suffix = Uuid::new_v4().simple().to_string();
    dir.join(format!("job-api-{}-{}", process::id(), &suffix[..12]))
        .join("api.sock")
}

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<io::Result<()>>,
}

/// Job Control API server for exactly one job.
///
/// Created when the job starts, stopped when it ends.
/// The store and token it carries are never shared with another job.
pub struct JobApiServer {
    socket_path: PathBuf,
    token: SessionToken,
    store: EnvStore,
    debug: bool,
    running: Option<Running>,
    /// Socket directory created by `start`, removed again on stop.
    owned_dir: Option<PathBuf>,
}

impl JobApiServer {
    /// Prepare a server for `store`, generating a fresh token.
    ///
    /// Nothing is bound until [`JobApiServer::start`].
    pub fn new(socket_path: impl Into<PathBuf>, store: EnvStore) -> Result<Self, ServerError> {
        let socket_path = socket_path.into();
        let len = socket_path.as_os_str().len();
        if len > SOCKET_PATH_MAX {
            return Err(ServerError::SocketPathTooLong {
                path: socket_path.display().to_string(),
                len,
                max: SOCKET_PATH_MAX,
            });
        }

        Ok(Self {
            socket_path,
            token: SessionToken::generate(),
            store,
            debug: false,
            running: None,
            owned_dir: None,
        })
    }

    /// Log every request at debug level.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn token(&self) -> &SessionToken {
        &self.token
    }

    pub fn store(&self) -> &EnvStore {
        &self.store
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Variables a job process needs to reach this server.
    pub fn job_env(&self) -> [(&'static str, String); 2] {
        [
            (
                JOB_API_SOCKET_ENV,
                self.socket_path.display().to_string(),
            ),
            (JOB_API_TOKEN_ENV, self.token.expose().to_owned()),
        ]
    }

    /// Bind the socket and start serving in a background task.
    pub async fn start(&mut self) -> Result<(), ServerError> {
        if self.running.is_some() {
            return Err(ServerError::AlreadyRunning);
        }

        self.prepare_dir()?;
        self.clear_stale_socket()?;

        let listener = UnixListener::bind(&self.socket_path).map_err(|source| ServerError::Bind {
            path: self.socket_path.display().to_string(),
            source,
        })?;
        fs::set_permissions(&self.socket_path, fs::Permissions::from_mode(0o600))?;

        let handler = Arc::new(EnvStoreAdapter::new(self.store.clone()));
        let router = HttpApi::new(handler, self.token.clone())
            .with_debug(self.debug)
            .router();

        let cancel = CancellationToken::new();
        let shutdown = cancel.clone();
        let task = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
        });

        info!(target: "kiln.api", socket = %self.socket_path.display(), "job api server started");
        self.running = Some(Running { cancel, task });
        Ok(())
    }

    /// Stop serving and remove the socket file.
    ///
    /// A socket file that cannot be removed is logged, not returned.
    pub async fn stop(&mut self) -> Result<(), ServerError> {
        let Some(Running { cancel, mut task }) = self.running.take() else {
            return Err(ServerError::NotRunning);
        };
        cancel.cancel();

        let result = match tokio::time::timeout(STOP_GRACE, &mut task).await {
            Ok(Ok(served)) => served.map_err(ServerError::from),
            Ok(Err(e)) => Err(ServerError::Join(e.to_string())),
            Err(_) => {
                warn!(
                    target: "kiln.api",
                    grace_ms = STOP_GRACE.as_millis() as u64,
                    "job api server did not drain in time; aborting"
                );
                task.abort();
                Ok(())
            }
        };

        self.remove_socket();
        info!(target: "kiln.api", socket = %self.socket_path.display(), "job api server stopped");
        result
    }

    /// Create the socket's directory if it is missing; an existing one is used as is.
    fn prepare_dir(&mut self) -> Result<(), ServerError> {
        let Some(dir) = self.socket_path.parent() else {
            return Ok(());
        };
        if dir.as_os_str().is_empty() || dir.is_dir() {
            return Ok(());
        }
        fs::DirBuilder::new()
            .recursive(true)
            .mode(DIR_MODE)
            .create(dir)?;
        self.owned_dir = Some(dir.to_path_buf());
        Ok(())
    }

    /// Remove a socket left behind by an earlier run; anything else at the path is an error.
    fn clear_stale_socket(&self) -> Result<(), ServerError> {
        let meta = match fs::symlink_metadata(&self.socket_path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if !meta.file_type().is_socket() {
            return Err(ServerError::NotASocket {
                path: self.socket_path.display().to_string(),
            });
        }
        debug!(socket = %self.socket_path.display(), "removing stale socket");
        fs::remove_file(&self.socket_path)?;
        Ok(())
    }

    fn remove_socket(&mut self) {
        match fs::remove_file(&self.socket_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                target: "kiln.api",
                socket = %self.socket_path.display(),
                error = %e,
                "failed to remove job api socket"
            ),
        }
        if let Some(dir) = self.owned_dir.take() {
            if let Err(e) = fs::remove_dir(&dir) {
                warn!(
                    target: "kiln.api",
                    dir = %dir.display(),
                    error = %e,
                    "failed to remove job api socket directory"
                );
            }
        }
    }
}

impl Drop for JobApiServer {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.cancel.cancel();
            running.task.abort();
            self.remove_socket();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use kiln_client::{Client, ClientError};
    use kiln_core::ProtectedKeys;
    use kiln_model::{ENV_PATH, ErrorResponse, JobEnv};
    use reqwest::StatusCode;
    use tempfile::TempDir;

    use super::*;

    async fn start_fixture() -> (TempDir, JobApiServer) {
        let dir = tempfile::tempdir().unwrap();
        let env = JobEnv::from_iter([
            ("KUZCO", "Llama"),
            ("KRONK", "Himbo"),
            ("YZMA", "Villain"),
            ("READONLY", "Should never change"),
        ]);
        let store = EnvStore::new(env, ProtectedKeys::new(["READONLY"]));
        let mut server = JobApiServer::new(socket_path_in(dir.path()), store).unwrap();
        server.start().await.unwrap();
        (dir, server)
    }

    fn client(server: &JobApiServer) -> Client {
        Client::new(server.socket_path(), server.token().expose()).unwrap()
    }

    fn raw(server: &JobApiServer) -> reqwest::Client {
        reqwest::Client::builder()
            .unix_socket(server.socket_path().to_path_buf())
            .build()
            .unwrap()
    }

    fn url(path: &str) -> String {
        format!("http://job-api{path}")
    }

    fn bearer(server: &JobApiServer) -> String {
        format!("Bearer {}", server.token().expose())
    }

    async fn expect_error(resp: reqwest::Response, status: StatusCode) -> String {
        assert_eq!(resp.status(), status);
        assert_eq!(
            resp.headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
            Some("application/json")
        );
        resp.json::<ErrorResponse>().await.unwrap().error
    }

    #[tokio::test]
    async fn update_then_read_reflects_changes() {
        let (_dir, mut server) = start_fixture().await;
        let cli = client(&server);

        let report = cli
            .env_update(BTreeMap::from([
                ("PACHA".to_string(), "Friend".to_string()),
                ("YZMA".to_string(), "Kitten".to_string()),
            ]))
            .await
            .unwrap();
        assert_eq!(report.added, vec!["PACHA"]);
        assert_eq!(report.updated, vec!["YZMA"]);

        let env = cli.env_get().await.unwrap();
        assert_eq!(env.get("YZMA").map(String::as_str), Some("Kitten"));
        assert_eq!(env.get("PACHA").map(String::as_str), Some("Friend"));

        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (_dir, mut server) = start_fixture().await;
        let cli = client(&server);

        let deleted = cli.env_delete(vec!["YZMA".to_string()]).await.unwrap();
        assert_eq!(deleted, vec!["YZMA"]);
        assert!(!cli.env_get().await.unwrap().contains_key("YZMA"));

        let deleted = cli
            .env_delete(vec!["YZMA".to_string(), "NOBODY".to_string()])
            .await
            .unwrap();
        assert!(deleted.is_empty());

        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn protected_delete_is_rejected_and_store_unchanged() {
        let (_dir, mut server) = start_fixture().await;
        let cli = client(&server);

        match cli
            .env_delete(vec!["KRONK".to_string(), "READONLY".to_string()])
            .await
        {
            Err(ClientError::Api { status, message }) => {
                assert_eq!(status, 422);
                assert!(message.contains("READONLY"));
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let env = cli.env_get().await.unwrap();
        assert_eq!(
            env.get("READONLY").map(String::as_str),
            Some("Should never change")
        );
        assert!(env.contains_key("KRONK"));

        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn protected_update_is_all_or_nothing() {
        let (_dir, mut server) = start_fixture().await;
        let http = raw(&server);

        let resp = http
            .patch(url(ENV_PATH))
            .header("Authorization", bearer(&server))
            .body(r#"{"env":{"PACHA":"Friend","READONLY":"changed"}}"#)
            .send()
            .await
            .unwrap();
        let message = expect_error(resp, StatusCode::UNPROCESSABLE_ENTITY).await;
        assert!(message.contains("protected"));

        assert_eq!(server.store().get("PACHA"), None);
        assert_eq!(
            server.store().get("READONLY").as_deref(),
            Some("Should never change")
        );

        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn null_value_rejects_whole_request() {
        let (_dir, mut server) = start_fixture().await;
        let http = raw(&server);

        let resp = http
            .patch(url(ENV_PATH))
            .header("Authorization", bearer(&server))
            .body(r#"{"env":{"PACHA":"Friend","YZMA":null}}"#)
            .send()
            .await
            .unwrap();
        let message = expect_error(resp, StatusCode::UNPROCESSABLE_ENTITY).await;
        assert!(message.contains("YZMA"));

        assert_eq!(server.store().get("PACHA"), None);
        assert_eq!(server.store().get("YZMA").as_deref(), Some("Villain"));

        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn update_response_is_byte_exact() {
        let (_dir, mut server) = start_fixture().await;
        let http = raw(&server);

        let resp = http
            .patch(url(ENV_PATH))
            .header("Authorization", bearer(&server))
            .body(r#"{"env":{"YZMA":"Kitten","PACHA":"Friend","CHICHA":"Wife"}}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.text().await.unwrap(),
            r#"{"added":["CHICHA","PACHA"],"updated":["YZMA"]}"#
        );

        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let (_dir, mut server) = start_fixture().await;
        let http = raw(&server);

        for body in ["", "{not json", r#"{"env":{"A":1}}"#, r#"{"env":["A"]}"#] {
            let resp = http
                .patch(url(ENV_PATH))
                .header("Authorization", bearer(&server))
                .body(body)
                .send()
                .await
                .unwrap();
            let message = expect_error(resp, StatusCode::BAD_REQUEST).await;
            assert!(message.starts_with("failed to decode request body"));
        }

        let resp = http
            .delete(url(ENV_PATH))
            .header("Authorization", bearer(&server))
            .body(r#"{"keys":"YZMA"}"#)
            .send()
            .await
            .unwrap();
        expect_error(resp, StatusCode::BAD_REQUEST).await;
        assert!(server.store().get("YZMA").is_some());

        let oversized = vec![b' '; 3 * 1024 * 1024];
        let resp = http
            .delete(url(ENV_PATH))
            .header("Authorization", bearer(&server))
            .body(oversized)
            .send()
            .await
            .unwrap();
        let message = expect_error(resp, StatusCode::BAD_REQUEST).await;
        assert!(message.starts_with("failed to decode request body"));

        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn every_route_requires_bearer() {
        let (_dir, mut server) = start_fixture().await;
        let http = raw(&server);

        let requests = [
            http.get(url(ENV_PATH)),
            http.patch(url(ENV_PATH)).body(r#"{"env":{"PACHA":"Friend"}}"#),
            http.delete(url(ENV_PATH)).body(r#"{"keys":["YZMA"]}"#),
            http.post(url(ENV_PATH)),
            http.get(url("/api/current-job/v0/nope")),
            http.get(url(ENV_PATH)).header("Authorization", "Bearer wrong"),
            http.get(url(ENV_PATH)).header("Authorization", server.token().expose()),
        ];
        for req in requests {
            let resp = req.send().await.unwrap();
            expect_error(resp, StatusCode::FORBIDDEN).await;
        }

        assert!(server.store().get("PACHA").is_none());
        assert!(server.store().get("YZMA").is_some());

        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn unknown_route_and_method() {
        let (_dir, mut server) = start_fixture().await;
        let http = raw(&server);

        let resp = http
            .get(url("/api/current-job/v1/env"))
            .header("Authorization", bearer(&server))
            .send()
            .await
            .unwrap();
        expect_error(resp, StatusCode::NOT_FOUND).await;

        let resp = http
            .post(url(ENV_PATH))
            .header("Authorization", bearer(&server))
            .send()
            .await
            .unwrap();
        let message = expect_error(resp, StatusCode::BAD_REQUEST).await;
        assert!(message.contains("POST"));

        let resp = http
            .head(url(ENV_PATH))
            .header("Authorization", bearer(&server))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_updates_apply_atomically() {
        let (_dir, mut server) = start_fixture().await;

        let mut tasks = Vec::new();
        for i in 0..16 {
            let cli = client(&server);
            tasks.push(tokio::spawn(async move {
                let value = i.to_string();
                cli.env_update(BTreeMap::from([
                    ("A".to_string(), value.clone()),
                    ("B".to_string(), value),
                ]))
                .await
                .unwrap()
            }));
        }

        let mut added = 0;
        for task in tasks {
            let report = task.await.unwrap();
            added += report.added.len();
        }
        // Exactly one request observed A and B absent.
        assert_eq!(added, 2);
        assert_eq!(server.store().get("A"), server.store().get("B"));

        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn lifecycle_creates_and_removes_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = socket_path_in(dir.path());
        let store = EnvStore::new(JobEnv::new(), ProtectedKeys::agent_defaults());
        let mut server = JobApiServer::new(&path, store).unwrap().with_debug(true);

        assert!(!path.exists());
        assert!(matches!(server.stop().await, Err(ServerError::NotRunning)));

        server.start().await.unwrap();
        assert!(server.is_running());
        assert!(path.exists());
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
        let parent = path.parent().unwrap();
        let dir_mode = fs::metadata(parent).unwrap().permissions().mode() & 0o777;
        assert_eq!(dir_mode, DIR_MODE);

        assert!(matches!(server.start().await, Err(ServerError::AlreadyRunning)));

        server.stop().await.unwrap();
        assert!(!server.is_running());
        assert!(!path.exists());
        assert!(!parent.exists());
    }

    #[tokio::test]
    async fn caller_owned_dir_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.sock");
        let store = EnvStore::new(JobEnv::new(), ProtectedKeys::agent_defaults());
        let mut server = JobApiServer::new(&path, store).unwrap();

        server.start().await.unwrap();
        server.stop().await.unwrap();
        assert!(!path.exists());
        assert!(dir.path().is_dir());
    }

    #[tokio::test]
    async fn stale_socket_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.sock");
        drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
        assert!(path.exists());

        let store = EnvStore::new(JobEnv::new(), ProtectedKeys::agent_defaults());
        let mut server = JobApiServer::new(&path, store).unwrap();
        server.start().await.unwrap();

        let env = client(&server).env_get().await.unwrap();
        assert!(env.is_empty());

        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn refuses_to_replace_non_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.sock");
        fs::write(&path, b"not a socket").unwrap();

        let store = EnvStore::new(JobEnv::new(), ProtectedKeys::agent_defaults());
        let mut server = JobApiServer::new(&path, store).unwrap();

        assert!(matches!(
            server.start().await,
            Err(ServerError::NotASocket { .. })
        ));
        assert!(!server.is_running());
        assert_eq!(fs::read(&path).unwrap(), b"not a socket");
    }

    #[test]
    fn rejects_overlong_socket_path() {
        let path = PathBuf::from(format!("/tmp/{}.sock", "x".repeat(SOCKET_PATH_MAX)));
        let store = EnvStore::new(JobEnv::new(), ProtectedKeys::default());
        assert!(matches!(
            JobApiServer::new(path, store),
            Err(ServerError::SocketPathTooLong { .. })
        ));
    }

    #[test]
    fn job_env_names_socket_and_token() {
        let store = EnvStore::new(JobEnv::new(), ProtectedKeys::default());
        let server = JobApiServer::new("/tmp/job.sock", store).unwrap();
        let [(socket_key, socket), (token_key, token)] = server.job_env();

        assert_eq!(socket_key, JOB_API_SOCKET_ENV);
        assert_eq!(socket, "/tmp/job.sock");
        assert_eq!(token_key, JOB_API_TOKEN_ENV);
        assert!(server.token().verify(&token));
    }
}

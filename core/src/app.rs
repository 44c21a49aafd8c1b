//! Builds the task and auth services from a [`Config`].

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::config::Config;
use crate::error::{Result, TaskflowError};
use crate::service::{AuthService, TaskService};
use crate::storage::{FileKeyValueStore, FirebaseAuth, FirestoreStore, LocalBackend, RemoteBackend};

pub struct Taskflow {
    pub tasks: TaskService,
    pub auth: AuthService,
    pub data_dir: PathBuf,
}

impl Taskflow {
    /// Wires both backends over one device store. The remote document
    /// store picks up the id token of whatever remote session is persisted
    /// at this point.
    pub fn open(config: &Config) -> Result<Self> {
        let kv = FileKeyValueStore::new(Some(config.data_dir()?))?;
        let data_dir = kv.dir().to_path_buf();
        let local = Arc::new(LocalBackend::new(kv.clone()));

        let Some(remote) = &config.remote else {
            debug!(dir = %data_dir.display(), "no remote configured, running local-only");
            return Ok(Self {
                tasks: TaskService::local_only(local.clone()),
                auth: AuthService::new(None, local),
                data_dir,
            });
        };

        let http = reqwest::Client::builder()
            .timeout(config.remote_timeout())
            .build()
            .map_err(|e| TaskflowError::Config(format!("http client: {}", e)))?;
        let firebase = Arc::new(FirebaseAuth::new(
            http.clone(),
            &remote.identity_endpoint,
            &remote.api_key,
            kv,
        ));
        let store = FirestoreStore::new(http, &remote.firestore_endpoint, &remote.project_id)
            .with_id_token(firebase.id_token()?);

        Ok(Self {
            tasks: TaskService::with_timeout(
                Arc::new(RemoteBackend::new(store)),
                local.clone(),
                config.remote_timeout(),
            ),
            auth: AuthService::new(Some(firebase), local),
            data_dir,
        })
    }
}

//! Test fixtures: a fully wired client over the fake transport, and records

use super::fake_transport::{FakeTransport, BASE_URL};
use fieldsync::client::{
    ApiClient, AuthGate, AuthTokens, Config, KeyValueStore, MemoryStore, SyncCoordinator,
    TokenStore, Transport, UploadDispatcher,
};
use fieldsync::shared::{AppConfig, Germplasm, GermplasmDetail, Media, Record, Survey};
use std::sync::Arc;

pub const SURVEY_URL: &str = "/ancient_tree/survey";
pub const GERMPLASM_URL: &str = "/germplasm/collect";
pub const ACCESS_TOKEN: &str = "access-0";
pub const REFRESH_TOKEN: &str = "refresh-0";

pub fn test_config() -> Config {
    Config::with_builder(
        AppConfig::builder()
            .server_url(BASE_URL)
            .data_dir(std::env::temp_dir().join("fieldsync-tests")),
    )
    .expect("test config is valid")
}

/// Client stack wired to a [`FakeTransport`]
pub struct Harness {
    pub transport: Arc<FakeTransport>,
    pub store: Arc<dyn KeyValueStore>,
    pub tokens: Arc<TokenStore>,
    pub gate: Arc<AuthGate>,
    pub api: Arc<ApiClient>,
    pub coordinator: Arc<SyncCoordinator>,
    pub dispatcher: UploadDispatcher,
}

impl Harness {
    /// Fresh store with a logged-in session
    pub async fn new() -> Self {
        Self::logged_in(Arc::new(MemoryStore::new())).await
    }

    /// Save a session into `store` and build the stack over it
    pub async fn logged_in(store: Arc<dyn KeyValueStore>) -> Self {
        let tokens = TokenStore::new(store.clone());
        tokens
            .save(AuthTokens {
                access_token: ACCESS_TOKEN.to_string(),
                refresh_token: REFRESH_TOKEN.to_string(),
                account_number: Some("ranger01".to_string()),
            })
            .await
            .expect("save session");
        Self::restore(store, Arc::new(FakeTransport::new())).await
    }

    /// Rebuild the stack over existing storage, as after a restart
    pub async fn restore(store: Arc<dyn KeyValueStore>, transport: Arc<FakeTransport>) -> Self {
        let config = test_config();
        let dyn_transport: Arc<dyn Transport> = transport.clone();
        let tokens = Arc::new(TokenStore::restore(store.clone()).await);
        let gate = Arc::new(AuthGate::new(
            config.clone(),
            dyn_transport.clone(),
            tokens.clone(),
        ));
        let api = Arc::new(ApiClient::new(config, dyn_transport, gate.clone()));
        let coordinator = Arc::new(
            SyncCoordinator::restore(store.clone())
                .await
                .expect("restore"),
        );
        let dispatcher = UploadDispatcher::new(api.clone());
        Self {
            transport,
            store,
            tokens,
            gate,
            api,
            coordinator,
            dispatcher,
        }
    }
}

pub fn oak(temp_id: &str) -> Record {
    Record::survey(Survey {
        common_name: Some("Oak".to_string()),
        tree_species: Some("Quercus robur".to_string()),
        ..Default::default()
    })
    .with_temp_id(temp_id)
}

pub fn oak_with_photo(temp_id: &str, photo: &str) -> Record {
    let mut record = oak(temp_id);
    if let fieldsync::shared::RecordBody::Survey(survey) = &mut record.body {
        survey.multimedia.push(Media::local(photo));
    }
    record
}

pub fn germplasm(temp_id: &str) -> Record {
    Record::germplasm(Germplasm {
        code_number: Some(format!("GP-{}", temp_id)),
        details: vec![GermplasmDetail {
            temp_id: Some(format!("{}-d0", temp_id)),
            collect_part: Some("seed".to_string()),
            ..Default::default()
        }],
        ..Default::default()
    })
    .with_temp_id(temp_id)
}

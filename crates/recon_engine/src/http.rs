//! HTTP remote store.
//!
//! This module maps [`RemoteStore`] calls onto the catalog's REST API.
//! The actual HTTP client is abstracted via a trait to allow different
//! implementations (reqwest, hyper, ureq, a loopback for tests, etc.).

use crate::error::{StoreError, StoreResult};
use crate::store::RemoteStore;
use recon_model::{Entity, EntityRef, Identified, Provenance, RequestOptions};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET.
    Get,
    /// POST.
    Post,
    /// DELETE.
    Delete,
}

/// An outgoing request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// Method.
    pub method: HttpMethod,
    /// Absolute URL including the query string.
    pub url: String,
    /// Header name/value pairs.
    pub headers: Vec<(String, String)>,
    /// JSON body, if any.
    pub body: Option<Vec<u8>>,
}

/// A received response.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Raw body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response with a JSON body.
    pub fn json(status: u16, body: &Value) -> Self {
        Self {
            status,
            body: body.to_string().into_bytes(),
        }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport.
/// An `Err` means no response was received at all.
pub trait HttpClient: Send + Sync {
    /// Sends a request and returns the response.
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, String>;
}

#[derive(Deserialize)]
struct UpsertResponse {
    #[serde(default)]
    entity: Option<Entity>,
}

#[derive(Deserialize)]
struct BulkUpsertResponse {
    #[serde(default)]
    entities: Vec<BulkItem>,
    #[serde(default)]
    errors: Vec<BulkError>,
}

#[derive(Deserialize)]
struct BulkItem {
    index: usize,
}

#[derive(Deserialize)]
struct BulkError {
    index: usize,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    entities: Vec<Entity>,
}

#[derive(Deserialize)]
struct BlueprintResponse {
    blueprint: Blueprint,
}

#[derive(Deserialize)]
struct Blueprint {
    #[serde(default)]
    relations: BTreeMap<String, BlueprintRelation>,
}

#[derive(Deserialize)]
struct BlueprintRelation {
    target: String,
}

#[derive(Serialize)]
struct BulkUpsertRequest<'a> {
    entities: Vec<&'a Entity>,
}

#[derive(Serialize)]
struct BulkDeleteRequest<'a> {
    entities: Vec<&'a str>,
}

/// Remote store backed by the catalog REST API.
pub struct HttpStore<C: HttpClient> {
    /// Base URL of the catalog API (e.g., "https://api.example.com").
    base_url: String,
    /// HTTP client implementation.
    client: C,
}

impl<C: HttpClient> HttpStore<C> {
    /// Creates a new HTTP store.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    fn user_agent(provenance: Provenance) -> String {
        format!("recon/{}/{}", env!("CARGO_PKG_VERSION"), provenance)
    }

    fn entities_url(&self, blueprint: &str) -> String {
        format!(
            "{}/v1/blueprints/{}/entities",
            self.base_url,
            urlencoding::encode(blueprint)
        )
    }

    fn upsert_query(options: &RequestOptions) -> String {
        format!(
            "upsert=true&merge={}&create_missing_related_entities={}&validation_only={}",
            options.merge, options.create_missing_related_entities, options.validation_only
        )
    }

    fn call<Res: DeserializeOwned>(
        &self,
        method: HttpMethod,
        url: String,
        body: Option<Vec<u8>>,
        provenance: Provenance,
    ) -> StoreResult<Res> {
        debug!(?method, %url, "store request");
        let request = HttpRequest {
            method,
            url,
            headers: vec![
                ("User-Agent".to_string(), Self::user_agent(provenance)),
                ("Content-Type".to_string(), "application/json".to_string()),
            ],
            body,
        };

        let response = self
            .client
            .send(request)
            .map_err(StoreError::transport_retryable)?;

        if !response.is_success() {
            let message = String::from_utf8_lossy(&response.body).into_owned();
            return Err(match response.status {
                404 => StoreError::NotFound(message),
                status => StoreError::Rejected { status, message },
            });
        }

        let body: &[u8] = if response.body.is_empty() {
            b"null"
        } else {
            &response.body
        };
        serde_json::from_slice(body)
            .map_err(|e| StoreError::Codec(format!("failed to decode response: {e}")))
    }

    fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
        serde_json::to_vec(value)
            .map_err(|e| StoreError::Codec(format!("failed to encode request: {e}")))
    }

    /// Groups item indices by blueprint, in order of first appearance.
    fn group_by_blueprint<T: Identified>(items: &[T]) -> Vec<(&str, Vec<usize>)> {
        let mut groups: Vec<(&str, Vec<usize>)> = Vec::new();
        for (index, item) in items.iter().enumerate() {
            match groups.iter_mut().find(|(bp, _)| *bp == item.blueprint()) {
                Some((_, indices)) => indices.push(index),
                None => groups.push((item.blueprint(), vec![index])),
            }
        }
        groups
    }

    fn upsert_group(
        &self,
        blueprint: &str,
        entities: &[&Entity],
        options: &RequestOptions,
        provenance: Provenance,
    ) -> Vec<StoreResult<Entity>> {
        let request = BulkUpsertRequest {
            entities: entities.to_vec(),
        };
        let response = Self::encode(&request).and_then(|body| {
            self.call::<BulkUpsertResponse>(
                HttpMethod::Post,
                format!(
                    "{}/bulk?{}",
                    self.entities_url(blueprint),
                    Self::upsert_query(options)
                ),
                Some(body),
                provenance,
            )
        });

        let response = match response {
            Ok(response) => response,
            Err(err) => return entities.iter().map(|_| Err(err.clone())).collect(),
        };

        let mut results: Vec<StoreResult<Entity>> = entities
            .iter()
            .map(|_| Err(StoreError::Codec("entity missing from bulk response".into())))
            .collect();
        for item in response.entities {
            if let Some(slot) = results.get_mut(item.index) {
                *slot = Ok(entities[item.index].clone());
            }
        }
        for error in response.errors {
            if let Some(slot) = results.get_mut(error.index) {
                *slot = Err(StoreError::Rejected {
                    status: 422,
                    message: error.message,
                });
            }
        }
        results
    }

    fn fetch_relation_targets(
        &self,
        blueprint: &str,
    ) -> StoreResult<BTreeMap<String, String>> {
        let response: BlueprintResponse = self.call(
            HttpMethod::Get,
            format!(
                "{}/v1/blueprints/{}",
                self.base_url,
                urlencoding::encode(blueprint)
            ),
            None,
            Provenance::Automated,
        )?;
        Ok(response
            .blueprint
            .relations
            .into_iter()
            .map(|(name, relation)| (name, relation.target))
            .collect())
    }
}

impl<C: HttpClient> RemoteStore for HttpStore<C> {
    fn upsert_one(
        &self,
        entity: &Entity,
        options: &RequestOptions,
        provenance: Provenance,
    ) -> StoreResult<Entity> {
        let body = Self::encode(entity)?;
        let response: UpsertResponse = self.call(
            HttpMethod::Post,
            format!(
                "{}?{}",
                self.entities_url(&entity.blueprint),
                Self::upsert_query(options)
            ),
            Some(body),
            provenance,
        )?;
        Ok(response.entity.unwrap_or_else(|| entity.clone()))
    }

    fn upsert_batch(
        &self,
        entities: &[Entity],
        options: &RequestOptions,
        provenance: Provenance,
    ) -> Vec<StoreResult<Entity>> {
        let mut results: Vec<Option<StoreResult<Entity>>> = entities.iter().map(|_| None).collect();

        for (blueprint, indices) in Self::group_by_blueprint(entities) {
            let group: Vec<&Entity> = indices.iter().map(|&i| &entities[i]).collect();
            let group_results = self.upsert_group(blueprint, &group, options, provenance);
            for (index, result) in indices.into_iter().zip(group_results) {
                results[index] = Some(result);
            }
        }

        results
            .into_iter()
            .map(|result| {
                result.unwrap_or_else(|| Err(StoreError::Codec("entity was not sent".into())))
            })
            .collect()
    }

    fn delete_one(
        &self,
        entity: &EntityRef,
        options: &RequestOptions,
        provenance: Provenance,
    ) -> StoreResult<()> {
        let _: Value = self.call(
            HttpMethod::Delete,
            format!(
                "{}/{}?delete_dependents={}",
                self.entities_url(&entity.blueprint),
                urlencoding::encode(&entity.identifier),
                options.delete_dependent_entities
            ),
            None,
            provenance,
        )?;
        Ok(())
    }

    fn delete_batch(
        &self,
        entities: &[EntityRef],
        options: &RequestOptions,
        provenance: Provenance,
    ) -> StoreResult<()> {
        let mut first_error = None;

        for (blueprint, indices) in Self::group_by_blueprint(entities) {
            let request = BulkDeleteRequest {
                entities: indices
                    .iter()
                    .map(|&i| entities[i].identifier.as_str())
                    .collect(),
            };
            let result = Self::encode(&request).and_then(|body| {
                self.call::<Value>(
                    HttpMethod::Post,
                    format!(
                        "{}/v1/blueprints/{}/bulk/entities/delete?delete_dependents={}",
                        self.base_url,
                        urlencoding::encode(blueprint),
                        options.delete_dependent_entities
                    ),
                    Some(body),
                    provenance,
                )
            });
            if let Err(err) = result {
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn related_entity_refs(&self, entities: &[EntityRef]) -> StoreResult<Vec<EntityRef>> {
        if entities.is_empty() {
            return Ok(Vec::new());
        }

        let rules: Vec<Value> = entities
            .iter()
            .map(|entity| {
                json!({
                    "combinator": "and",
                    "rules": [
                        { "property": "$identifier", "operator": "=", "value": entity.identifier },
                        { "property": "$blueprint", "operator": "=", "value": entity.blueprint },
                    ]
                })
            })
            .collect();
        let query = json!({ "combinator": "or", "rules": rules });

        let response: SearchResponse = self.call(
            HttpMethod::Post,
            format!("{}/v1/entities/search", self.base_url),
            Some(Self::encode(&query)?),
            Provenance::Automated,
        )?;

        let mut targets_by_blueprint: HashMap<String, BTreeMap<String, String>> = HashMap::new();
        let mut seen = HashSet::new();
        let mut related = Vec::new();

        for entity in &response.entities {
            if !targets_by_blueprint.contains_key(&entity.blueprint) {
                let targets = self.fetch_relation_targets(&entity.blueprint)?;
                targets_by_blueprint.insert(entity.blueprint.clone(), targets);
            }
            let relation_targets = &targets_by_blueprint[&entity.blueprint];

            for (name, target) in &entity.relations {
                let Some(target_blueprint) = relation_targets.get(name) else {
                    continue;
                };
                for identifier in target.identifiers() {
                    let related_ref = EntityRef::new(identifier.as_str(), target_blueprint.as_str());
                    if seen.insert(related_ref.clone()) {
                        related.push(related_ref);
                    }
                }
            }
        }

        Ok(related)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Replays canned responses and records requests.
    struct TestClient {
        responses: Mutex<VecDeque<Result<HttpResponse, String>>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl TestClient {
        fn new(responses: Vec<Result<HttpResponse, String>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().clone()
        }
    }

    impl HttpClient for TestClient {
        fn send(&self, request: HttpRequest) -> Result<HttpResponse, String> {
            self.requests.lock().push(request);
            self.responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err("no response set".into()))
        }
    }

    fn ok(body: Value) -> Result<HttpResponse, String> {
        Ok(HttpResponse::json(200, &body))
    }

    fn body_json(request: &HttpRequest) -> Value {
        serde_json::from_slice(request.body.as_ref().unwrap()).unwrap()
    }

    #[test]
    fn base_url_is_normalized() {
        let store = HttpStore::new("https://api.example.com/", TestClient::new(vec![]));
        assert_eq!(store.base_url(), "https://api.example.com");
    }

    #[test]
    fn upsert_one_request_shape() {
        let client = TestClient::new(vec![ok(json!({
            "ok": true,
            "entity": { "identifier": "svc", "blueprint": "service", "title": "Stored" }
        }))]);
        let store = HttpStore::new("https://api.example.com", client);

        let options = RequestOptions::new().with_merge(true);
        let stored = store
            .upsert_one(&Entity::new("svc", "service"), &options, Provenance::UserTriggered)
            .unwrap();
        assert_eq!(stored.title.as_deref(), Some("Stored"));

        let requests = store.client().requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(
            request.url,
            "https://api.example.com/v1/blueprints/service/entities?upsert=true&merge=true&create_missing_related_entities=false&validation_only=false"
        );
        assert!(request
            .headers
            .iter()
            .any(|(k, v)| k == "User-Agent" && v.ends_with("/user_triggered")));
        assert_eq!(body_json(request)["identifier"], "svc");
    }

    #[test]
    fn non_success_status_is_rejected() {
        let client = TestClient::new(vec![
            Ok(HttpResponse::json(422, &json!({"message": "bad relation"}))),
            Ok(HttpResponse::json(404, &json!({}))),
            Err("connection refused".into()),
        ]);
        let store = HttpStore::new("https://api.example.com", client);
        let options = RequestOptions::default();
        let entity = Entity::new("svc", "service");

        let err = store
            .upsert_one(&entity, &options, Provenance::Automated)
            .unwrap_err();
        assert!(matches!(err, StoreError::Rejected { status: 422, .. }));

        let err = store
            .delete_one(&entity.to_ref(), &options, Provenance::Automated)
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));

        let err = store
            .upsert_one(&entity, &options, Provenance::Automated)
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn upsert_batch_groups_by_blueprint_and_maps_errors() {
        let client = TestClient::new(vec![
            ok(json!({
                "entities": [{ "identifier": "a", "index": 0 }],
                "errors": [{ "identifier": "b", "index": 1, "message": "invalid" }]
            })),
            ok(json!({ "entities": [{ "identifier": "core", "index": 0 }] })),
        ]);
        let store = HttpStore::new("https://api.example.com", client);

        let entities = vec![
            Entity::new("a", "service"),
            Entity::new("core", "team"),
            Entity::new("b", "service"),
        ];
        let results = store.upsert_batch(&entities, &RequestOptions::default(), Provenance::Automated);

        assert!(results[0].is_ok());
        assert_eq!(results[1].as_ref().unwrap().identifier, "core");
        assert!(matches!(results[2], Err(StoreError::Rejected { .. })));

        let requests = store.client().requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].url.contains("/blueprints/service/entities/bulk?"));
        assert_eq!(body_json(&requests[0])["entities"].as_array().unwrap().len(), 2);
        assert!(requests[1].url.contains("/blueprints/team/entities/bulk?"));
    }

    #[test]
    fn failed_bulk_call_fails_its_group_only() {
        let client = TestClient::new(vec![
            Err("timeout".into()),
            ok(json!({ "entities": [{ "identifier": "core", "index": 0 }] })),
        ]);
        let store = HttpStore::new("https://api.example.com", client);

        let entities = vec![Entity::new("a", "service"), Entity::new("core", "team")];
        let results = store.upsert_batch(&entities, &RequestOptions::default(), Provenance::Automated);
        assert!(results[0].is_err());
        assert!(results[1].is_ok());
    }

    #[test]
    fn delete_requests() {
        let client = TestClient::new(vec![ok(json!({"ok": true})), ok(json!({"ok": true}))]);
        let store = HttpStore::new("https://api.example.com", client);
        let cascade = RequestOptions::new().with_delete_dependent_entities(true);

        store
            .delete_one(
                &EntityRef::new("my svc", "service"),
                &RequestOptions::default(),
                Provenance::Automated,
            )
            .unwrap();
        store
            .delete_batch(
                &[EntityRef::new("a", "service"), EntityRef::new("b", "service")],
                &cascade,
                Provenance::Automated,
            )
            .unwrap();

        let requests = store.client().requests();
        assert_eq!(requests[0].method, HttpMethod::Delete);
        assert_eq!(
            requests[0].url,
            "https://api.example.com/v1/blueprints/service/entities/my%20svc?delete_dependents=false"
        );
        assert_eq!(
            requests[1].url,
            "https://api.example.com/v1/blueprints/service/bulk/entities/delete?delete_dependents=true"
        );
        assert_eq!(body_json(&requests[1]), json!({ "entities": ["a", "b"] }));
    }

    #[test]
    fn related_refs_resolve_target_blueprints() {
        let client = TestClient::new(vec![
            ok(json!({
                "ok": true,
                "entities": [{
                    "identifier": "api",
                    "blueprint": "service",
                    "relations": { "owner": "core", "depends_on": ["db", "cache"], "unknown": "x" }
                }]
            })),
            ok(json!({
                "blueprint": {
                    "identifier": "service",
                    "relations": {
                        "owner": { "target": "team" },
                        "depends_on": { "target": "service" }
                    }
                }
            })),
        ]);
        let store = HttpStore::new("https://api.example.com", client);

        let related = store
            .related_entity_refs(&[EntityRef::new("api", "service")])
            .unwrap();
        assert_eq!(
            related,
            vec![
                EntityRef::new("db", "service"),
                EntityRef::new("cache", "service"),
                EntityRef::new("core", "team"),
            ]
        );

        let requests = store.client().requests();
        assert_eq!(requests[0].url, "https://api.example.com/v1/entities/search");
        assert_eq!(body_json(&requests[0])["rules"].as_array().unwrap().len(), 1);
        assert_eq!(requests[1].method, HttpMethod::Get);
        assert_eq!(requests[1].url, "https://api.example.com/v1/blueprints/service");
    }

    #[test]
    fn related_refs_of_nothing_makes_no_request() {
        let store = HttpStore::new("https://api.example.com", TestClient::new(vec![]));
        assert!(store.related_entity_refs(&[]).unwrap().is_empty());
        assert!(store.client().requests().is_empty());
    }
}

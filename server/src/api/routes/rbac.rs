//! RBAC decision and resource registry endpoints
//!
//! Business collaborators either post a resource's security descriptor and
//! get the decision for the calling principal back, or register the
//! resource here and manage its ACL through the registry routes. Each
//! request works against one snapshot of the active policy, and every
//! decision goes through its audited authorizer.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::api::auth::{Auth, PolicyHandle};
use crate::api::extractors::ValidatedJson;
use crate::api::types::ApiError;
use crate::core::constants::{AUDIT_TARGET, PERMISSION_DELETE, PERMISSION_READ_SECURITY};
use crate::domain::rbac::{
    RbacError, ResourceAuthorizer, ResourceSecurity, ResourceSecurityStore,
};

#[derive(Clone)]
pub struct RbacApiState {
    pub policy: PolicyHandle,
    pub store: ResourceSecurityStore,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CheckRequest {
    pub security: ResourceSecurity,
    #[validate(length(min = 1, max = 256))]
    pub owner_id: String,
    #[validate(length(min = 1, max = 64))]
    pub permission: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckResponse {
    pub allowed: bool,
    pub effective_role: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoleResponse {
    pub name: String,
    pub permissions: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RolesResponse {
    pub admin_role: String,
    pub roles: Vec<RoleResponse>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RoleRequest {
    #[validate(length(min = 1, max = 64))]
    pub role: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResourceResponse {
    pub resource_id: String,
    pub owner_id: String,
    pub security: ResourceSecurity,
}

pub fn routes(policy: PolicyHandle, store: ResourceSecurityStore) -> Router<()> {
    let state = RbacApiState { policy, store };
    Router::new()
        .route("/roles", get(list_roles))
        .route("/check", post(check))
        .route(
            "/resources/{resource_id}",
            post(create_resource)
                .get(get_resource)
                .delete(delete_resource),
        )
        .route(
            "/resources/{resource_id}/access/{permission}",
            get(resource_access),
        )
        .route(
            "/resources/{resource_id}/acl/{principal_id}",
            put(grant).delete(revoke),
        )
        .route("/resources/{resource_id}/default", put(set_default))
        .with_state(state)
}

/// Role catalog of the active policy
pub async fn list_roles(State(state): State<RbacApiState>) -> Json<RolesResponse> {
    let policy = state.policy.current();
    let catalog = policy.rbac().inner().catalog();
    let roles = catalog
        .role_names()
        .into_iter()
        .map(|name| {
            let mut permissions: Vec<String> = catalog.permissions_of(name).into_iter().collect();
            permissions.sort_unstable();
            RoleResponse {
                name: name.to_string(),
                permissions,
            }
        })
        .collect();
    Json(RolesResponse {
        admin_role: catalog.admin_role().to_string(),
        roles,
    })
}

/// Resource-level decision for the caller
pub async fn check(
    State(state): State<RbacApiState>,
    Auth(principal): Auth,
    ValidatedJson(req): ValidatedJson<CheckRequest>,
) -> Json<CheckResponse> {
    let policy = state.policy.current();
    let rbac = policy.rbac();
    let allowed = rbac.can_access(&principal, &req.security, &req.owner_id, &req.permission);
    let effective_role = rbac
        .inner()
        .effective_role(&req.security, principal.id())
        .to_string();
    Json(CheckResponse {
        allowed,
        effective_role,
    })
}

fn resource_not_found(resource_id: &str) -> ApiError {
    ApiError::not_found(
        "RESOURCE_NOT_FOUND",
        format!("Resource not found: {resource_id}"),
    )
}

/// Register a resource owned and administered by the caller
pub async fn create_resource(
    State(state): State<RbacApiState>,
    Auth(principal): Auth,
    Path(resource_id): Path<String>,
) -> Result<(StatusCode, Json<ResourceResponse>), ApiError> {
    let policy = state.policy.current();
    if !state
        .store
        .create(policy.rbac().inner(), &resource_id, &principal)
    {
        return Err(ApiError::conflict(
            "RESOURCE_EXISTS",
            format!("Resource already registered: {resource_id}"),
        ));
    }
    let (owner_id, security) = state
        .store
        .get(&resource_id)
        .ok_or_else(|| resource_not_found(&resource_id))?;
    tracing::info!(
        target: AUDIT_TARGET,
        resource = %resource_id,
        owner = %owner_id,
        "Resource registered"
    );
    Ok((
        StatusCode::CREATED,
        Json(ResourceResponse {
            resource_id,
            owner_id,
            security,
        }),
    ))
}

/// Security descriptor of a resource; requires `read_security`
pub async fn get_resource(
    State(state): State<RbacApiState>,
    Auth(principal): Auth,
    Path(resource_id): Path<String>,
) -> Result<Json<ResourceResponse>, ApiError> {
    let (owner_id, security) = state
        .store
        .get(&resource_id)
        .ok_or_else(|| resource_not_found(&resource_id))?;
    state.policy.current().rbac().check(
        &principal,
        &security,
        &owner_id,
        PERMISSION_READ_SECURITY,
    )?;
    Ok(Json(ResourceResponse {
        resource_id,
        owner_id,
        security,
    }))
}

/// Unregister a resource; requires `delete`
pub async fn delete_resource(
    State(state): State<RbacApiState>,
    Auth(principal): Auth,
    Path(resource_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let policy = state.policy.current();
    state
        .store
        .remove_checked(policy.rbac(), &principal, &resource_id, PERMISSION_DELETE)
        .map_err(|e| match e {
            RbacError::EntryNotFound(_) => resource_not_found(&resource_id),
            other => other.into(),
        })?;
    tracing::info!(
        target: AUDIT_TARGET,
        resource = %resource_id,
        principal = %principal.id(),
        "Resource removed"
    );
    Ok(StatusCode::NO_CONTENT)
}

/// Decision for the caller on a registered resource
pub async fn resource_access(
    State(state): State<RbacApiState>,
    Auth(principal): Auth,
    Path((resource_id, permission)): Path<(String, String)>,
) -> Result<Json<CheckResponse>, ApiError> {
    let policy = state.policy.current();
    let rbac = policy.rbac();
    let (allowed, effective_role) = state
        .store
        .inspect(&resource_id, |owner_id, security| {
            (
                rbac.can_access(&principal, security, owner_id, &permission),
                rbac.inner()
                    .effective_role(security, principal.id())
                    .to_string(),
            )
        })
        .ok_or_else(|| resource_not_found(&resource_id))?;
    Ok(Json(CheckResponse {
        allowed,
        effective_role,
    }))
}

/// Set the caller-chosen role for one principal
pub async fn grant(
    State(state): State<RbacApiState>,
    Auth(principal): Auth,
    Path((resource_id, principal_id)): Path<(String, String)>,
    ValidatedJson(req): ValidatedJson<RoleRequest>,
) -> Result<StatusCode, ApiError> {
    let policy = state.policy.current();
    state.store.grant(
        policy.rbac().inner(),
        &principal,
        &resource_id,
        &principal_id,
        &req.role,
    )?;
    tracing::info!(
        target: AUDIT_TARGET,
        resource = %resource_id,
        grantee = %principal_id,
        role = %req.role,
        by = %principal.id(),
        "ACL entry set"
    );
    Ok(StatusCode::NO_CONTENT)
}

pub async fn revoke(
    State(state): State<RbacApiState>,
    Auth(principal): Auth,
    Path((resource_id, principal_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let policy = state.policy.current();
    state
        .store
        .revoke(policy.rbac().inner(), &principal, &resource_id, &principal_id)?;
    tracing::info!(
        target: AUDIT_TARGET,
        resource = %resource_id,
        grantee = %principal_id,
        by = %principal.id(),
        "ACL entry removed"
    );
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_default(
    State(state): State<RbacApiState>,
    Auth(principal): Auth,
    Path(resource_id): Path<String>,
    ValidatedJson(req): ValidatedJson<RoleRequest>,
) -> Result<StatusCode, ApiError> {
    let policy = state.policy.current();
    state
        .store
        .set_default(policy.rbac().inner(), &principal, &resource_id, &req.role)?;
    tracing::info!(
        target: AUDIT_TARGET,
        resource = %resource_id,
        role = %req.role,
        by = %principal.id(),
        "Default role set"
    );
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use axum::Extension;
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request, StatusCode, header};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::api::auth::{ApiKeyGate, AuthPolicy, EndpointAuthorizationMatrix};
    use crate::domain::Principal;
    use crate::domain::rbac::{ResourceRbacEvaluator, RoleCatalog};

    fn evaluator() -> ResourceRbacEvaluator {
        let roles = BTreeMap::from([
            ("viewer".to_string(), vec!["read".to_string()]),
            (
                "editor".to_string(),
                vec!["read".to_string(), "write".to_string()],
            ),
        ]);
        ResourceRbacEvaluator::new(Arc::new(RoleCatalog::new(roles, "admin")), "none")
    }

    fn policy(evaluator: ResourceRbacEvaluator) -> AuthPolicy {
        AuthPolicy::new(
            ApiKeyGate::default(),
            EndpointAuthorizationMatrix::new(Vec::<String>::new(), Vec::new()),
            evaluator,
            false,
        )
    }

    fn handle() -> PolicyHandle {
        PolicyHandle::new(policy(evaluator()))
    }

    fn app(principal: Principal) -> Router {
        app_with_store(principal, ResourceSecurityStore::new())
    }

    fn app_with_store(principal: Principal, store: ResourceSecurityStore) -> Router {
        app_with_policy(principal, store, handle())
    }

    fn app_with_policy(
        principal: Principal,
        store: ResourceSecurityStore,
        policy: PolicyHandle,
    ) -> Router {
        routes(policy, store).layer(Extension(principal))
    }

    fn user(id: &str) -> Principal {
        Principal::from_bearer(
            id.to_string(),
            Some("acme".to_string()),
            None,
            vec!["Organization.User".to_string()],
        )
    }

    fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder().method(method).uri(uri);
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn call(app: Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(req).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    fn check_request(body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/check")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn security() -> Value {
        json!({
            "default": "none",
            "accessControlList": [
                { "id": "bob", "role": "viewer" },
                { "id": "carol", "role": "editor" },
            ],
        })
    }

    #[tokio::test]
    async fn test_list_roles() {
        let req = Request::builder().uri("/roles").body(Body::empty()).unwrap();
        let (status, body) = call(app(Principal::from_api_key("svc", "x")), req).await;
        assert_eq!(status, StatusCode::OK);
        let roles: RolesResponse = serde_json::from_value(body).unwrap();
        assert_eq!(roles.admin_role, "admin");
        let names: Vec<&str> = roles.roles.iter().map(|r| r.name.as_str()).collect();
        assert!(names.contains(&"viewer"));
        let editor = roles.roles.iter().find(|r| r.name == "editor").unwrap();
        assert_eq!(editor.permissions, vec!["read", "write"]);
    }

    #[tokio::test]
    async fn test_check_uses_acl_role() {
        let bob = user("bob");
        let req = check_request(json!({
            "security": security(),
            "owner_id": "alice",
            "permission": "read",
        }));
        let (status, body) = call(app(bob.clone()), req).await;
        assert_eq!(status, StatusCode::OK);
        let res: CheckResponse = serde_json::from_value(body).unwrap();
        assert!(res.allowed);
        assert_eq!(res.effective_role, "viewer");

        let req = check_request(json!({
            "security": security(),
            "owner_id": "alice",
            "permission": "write",
        }));
        let res: CheckResponse = serde_json::from_value(call(app(bob), req).await.1).unwrap();
        assert!(!res.allowed);
    }

    #[tokio::test]
    async fn test_check_owner_and_default_role() {
        let alice = user("alice");
        let req = check_request(json!({
            "security": security(),
            "owner_id": "alice",
            "permission": "delete",
        }));
        let res: CheckResponse = serde_json::from_value(call(app(alice), req).await.1).unwrap();
        assert!(res.allowed);
        assert_eq!(res.effective_role, "none");
    }

    #[tokio::test]
    async fn test_check_rejects_invalid_body() {
        let dave = user("dave");
        let req = check_request(json!({
            "security": security(),
            "owner_id": "alice",
            "permission": "",
        }));
        let (status, body) = call(app(dave.clone()), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");

        let req = check_request(json!({ "owner_id": "alice" }));
        assert_eq!(call(app(dave), req).await.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_register_resource() {
        let store = ResourceSecurityStore::new();
        let req = request(Method::POST, "/resources/ws-1", None);
        let (status, body) = call(app_with_store(user("alice"), store.clone()), req).await;
        assert_eq!(status, StatusCode::CREATED);
        let res: ResourceResponse = serde_json::from_value(body).unwrap();
        assert_eq!(res.owner_id, "alice");
        assert_eq!(res.security.role_of("alice"), Some("admin"));

        let req = request(Method::POST, "/resources/ws-1", None);
        let (status, body) = call(app_with_store(user("bob"), store), req).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "RESOURCE_EXISTS");
    }

    #[tokio::test]
    async fn test_read_security_requires_permission() {
        let store = ResourceSecurityStore::new();
        store.create(&evaluator(), "ws-1", &user("alice"));

        let req = request(Method::GET, "/resources/ws-1", None);
        let (status, body) = call(app_with_store(user("bob"), store.clone()), req).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "RESOURCE_PERMISSION_DENIED");

        let req = request(Method::GET, "/resources/ws-1", None);
        assert_eq!(
            call(app_with_store(user("alice"), store.clone()), req).await.0,
            StatusCode::OK
        );

        let req = request(Method::GET, "/resources/missing", None);
        let (status, body) = call(app_with_store(user("alice"), store), req).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "RESOURCE_NOT_FOUND");
    }

    async fn access(store: &ResourceSecurityStore, who: &str, permission: &str) -> CheckResponse {
        let req = request(
            Method::GET,
            &format!("/resources/ws-1/access/{permission}"),
            None,
        );
        let (status, body) = call(app_with_store(user(who), store.clone()), req).await;
        assert_eq!(status, StatusCode::OK);
        serde_json::from_value(body).unwrap()
    }

    #[tokio::test]
    async fn test_acl_lifecycle() {
        let store = ResourceSecurityStore::new();
        store.create(&evaluator(), "ws-1", &user("alice"));
        let res = access(&store, "bob", "read").await;
        assert!(!res.allowed);
        assert_eq!(res.effective_role, "none");

        let req = request(
            Method::PUT,
            "/resources/ws-1/acl/bob",
            Some(json!({ "role": "viewer" })),
        );
        assert_eq!(
            call(app_with_store(user("alice"), store.clone()), req).await.0,
            StatusCode::NO_CONTENT
        );
        let res = access(&store, "bob", "read").await;
        assert!(res.allowed);
        assert_eq!(res.effective_role, "viewer");
        assert!(!access(&store, "bob", "write").await.allowed);

        let req = request(Method::DELETE, "/resources/ws-1/acl/bob", None);
        assert_eq!(
            call(app_with_store(user("alice"), store.clone()), req).await.0,
            StatusCode::NO_CONTENT
        );
        assert!(!access(&store, "bob", "read").await.allowed);

        let req = request(Method::DELETE, "/resources/ws-1/acl/bob", None);
        let (status, body) = call(app_with_store(user("alice"), store), req).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "ENTRY_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_acl_mutation_errors() {
        let store = ResourceSecurityStore::new();
        store.create(&evaluator(), "ws-1", &user("alice"));

        let req = request(
            Method::PUT,
            "/resources/ws-1/acl/carol",
            Some(json!({ "role": "editor" })),
        );
        let (status, body) = call(app_with_store(user("bob"), store.clone()), req).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "PERMISSION_DENIED");

        let req = request(
            Method::PUT,
            "/resources/ws-1/default",
            Some(json!({ "role": "superuser" })),
        );
        let (status, body) = call(app_with_store(user("alice"), store.clone()), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "UNKNOWN_ROLE");

        let req = request(
            Method::PUT,
            "/resources/ws-1/default",
            Some(json!({ "role": "viewer" })),
        );
        assert_eq!(
            call(app_with_store(user("alice"), store.clone()), req).await.0,
            StatusCode::NO_CONTENT
        );
        assert!(store.can_access(&evaluator(), &user("dave"), "ws-1", "read"));
    }

    #[tokio::test]
    async fn test_delete_resource() {
        let store = ResourceSecurityStore::new();
        store.create(&evaluator(), "ws-1", &user("alice"));
        store
            .grant(&evaluator(), &user("alice"), "ws-1", "carol", "editor")
            .unwrap();

        let req = request(Method::DELETE, "/resources/ws-1", None);
        assert_eq!(
            call(app_with_store(user("carol"), store.clone()), req).await.0,
            StatusCode::FORBIDDEN
        );

        let req = request(Method::DELETE, "/resources/ws-1", None);
        assert_eq!(
            call(app_with_store(user("alice"), store.clone()), req).await.0,
            StatusCode::NO_CONTENT
        );
        assert!(store.get("ws-1").is_none());

        let req = request(Method::DELETE, "/resources/ws-1", None);
        let (status, body) = call(app_with_store(user("alice"), store), req).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "RESOURCE_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_concurrent_deletes_remove_once() {
        let store = ResourceSecurityStore::new();
        store.create(&evaluator(), "ws-1", &user("alice"));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let app = app_with_store(user("alice"), store.clone());
            tasks.push(tokio::spawn(async move {
                call(app, request(Method::DELETE, "/resources/ws-1", None))
                    .await
                    .0
            }));
        }
        let mut removed = 0;
        for task in tasks {
            match task.await.unwrap() {
                StatusCode::NO_CONTENT => removed += 1,
                status => assert_eq!(status, StatusCode::NOT_FOUND),
            }
        }
        assert_eq!(removed, 1);
    }

    #[tokio::test]
    async fn test_registry_follows_policy_reload() {
        let store = ResourceSecurityStore::new();
        let policy_handle = handle();
        store.create(&evaluator(), "ws-1", &user("alice"));
        store
            .grant(&evaluator(), &user("alice"), "ws-1", "bob", "viewer")
            .unwrap();

        let req = request(Method::GET, "/resources/ws-1/access/read", None);
        let app = app_with_policy(user("bob"), store.clone(), policy_handle.clone());
        let res: CheckResponse = serde_json::from_value(call(app, req).await.1).unwrap();
        assert!(res.allowed);

        // "viewer" loses read, "auditor" is new
        let roles = BTreeMap::from([
            ("viewer".to_string(), Vec::<String>::new()),
            ("auditor".to_string(), vec!["read".to_string()]),
        ]);
        policy_handle.replace(policy(ResourceRbacEvaluator::new(
            Arc::new(RoleCatalog::new(roles, "admin")),
            "none",
        )));

        let req = request(Method::GET, "/resources/ws-1/access/read", None);
        let app = app_with_policy(user("bob"), store.clone(), policy_handle.clone());
        let res: CheckResponse = serde_json::from_value(call(app, req).await.1).unwrap();
        assert!(!res.allowed);
        assert_eq!(res.effective_role, "viewer");

        // Grants validate against the reloaded catalog
        let req = request(
            Method::PUT,
            "/resources/ws-1/acl/bob",
            Some(json!({ "role": "auditor" })),
        );
        let app = app_with_policy(user("alice"), store.clone(), policy_handle.clone());
        assert_eq!(call(app, req).await.0, StatusCode::NO_CONTENT);

        let req = request(
            Method::PUT,
            "/resources/ws-1/acl/carol",
            Some(json!({ "role": "editor" })),
        );
        let app = app_with_policy(user("alice"), store.clone(), policy_handle.clone());
        let (status, body) = call(app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "UNKNOWN_ROLE");

        let req = request(Method::GET, "/resources/ws-1/access/read", None);
        let app = app_with_policy(user("bob"), store, policy_handle);
        let res: CheckResponse = serde_json::from_value(call(app, req).await.1).unwrap();
        assert!(res.allowed);
        assert_eq!(res.effective_role, "auditor");
    }
}

//! Identity API seam and its HTTP implementation.
//!
//! [`IdentityApi`] exposes exactly the calls the credential bootstrap needs,
//! each as an explicit lookup or create. Implementations never turn a
//! failed lookup into a create or a failed create into success.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use stackinit_shared::errors::{StackError, StackResult};

const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";
const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Named identity resource (project, role, user).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Resource {
    pub id: String,
    pub name: String,
}

/// Project-scoped password authentication request.
#[derive(Clone)]
pub struct PasswordAuth {
    pub username: String,
    pub password: String,
    pub project: String,
    pub domain_id: String,
}

impl std::fmt::Debug for PasswordAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordAuth")
            .field("username", &self.username)
            .field("project", &self.project)
            .field("domain_id", &self.domain_id)
            .finish_non_exhaustive()
    }
}

/// Authenticated token and the user it belongs to.
#[derive(Clone)]
pub struct Session {
    pub token: String,
    pub user_id: String,
}

/// Application credential as returned at creation; the secret is only
/// available at this point.
#[derive(Clone, Deserialize)]
pub struct IssuedCredential {
    pub id: String,
    pub name: String,
    pub secret: String,
}

#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub name: &'a str,
    pub password: &'a str,
    pub domain_id: &'a str,
    pub default_project_id: &'a str,
}

/// Calls used by the credential bootstrap.
pub trait IdentityApi {
    fn authenticate(&self, auth: &PasswordAuth) -> StackResult<Session>;

    fn find_project(
        &self,
        session: &Session,
        name: &str,
        domain_id: &str,
    ) -> StackResult<Option<Resource>>;
    fn create_project(
        &self,
        session: &Session,
        name: &str,
        domain_id: &str,
        description: &str,
    ) -> StackResult<Resource>;

    fn find_role(&self, session: &Session, name: &str) -> StackResult<Option<Resource>>;
    fn create_role(&self, session: &Session, name: &str) -> StackResult<Resource>;

    fn find_user(
        &self,
        session: &Session,
        name: &str,
        domain_id: &str,
    ) -> StackResult<Option<Resource>>;
    fn create_user(&self, session: &Session, user: &NewUser<'_>) -> StackResult<Resource>;

    fn has_role_assignment(
        &self,
        session: &Session,
        project_id: &str,
        user_id: &str,
        role_id: &str,
    ) -> StackResult<bool>;
    fn assign_role(
        &self,
        session: &Session,
        project_id: &str,
        user_id: &str,
        role_id: &str,
    ) -> StackResult<()>;

    /// Issue a credential owned by the session's own user, scoped to the
    /// session's project.
    fn create_application_credential(
        &self,
        session: &Session,
        name: &str,
        secret: &str,
        description: &str,
    ) -> StackResult<IssuedCredential>;
}

/// Blocking identity v3 client.
#[derive(Clone)]
pub struct KeystoneClient {
    agent: ureq::Agent,
    base_url: String,
}

impl KeystoneClient {
    /// `base_url` is the versioned endpoint, e.g. `http://localhost:5000/v3`.
    pub fn new(base_url: &str) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout_connect(CONNECT_TIMEOUT)
                .build(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Whether the endpoint answers HTTP at all.
    pub fn is_reachable(&self) -> bool {
        match self.agent.get(&self.base_url).call() {
            Ok(_) | Err(ureq::Error::Status(_, _)) => true,
            Err(ureq::Error::Transport(_)) => false,
        }
    }

    fn get(&self, session: &Session, path: &str, query: &[(&str, &str)]) -> StackResult<Value> {
        let mut request = self
            .agent
            .get(&self.url(path))
            .set(AUTH_TOKEN_HEADER, &session.token);
        for (key, value) in query {
            request = request.query(key, value);
        }
        let response = request.call().map_err(|e| request_error("GET", path, e))?;
        response.into_json().map_err(|e| body_error(path, e))
    }

    fn post(
        &self,
        session: Option<&Session>,
        path: &str,
        body: Value,
    ) -> StackResult<ureq::Response> {
        let mut request = self.agent.post(&self.url(path));
        if let Some(session) = session {
            request = request.set(AUTH_TOKEN_HEADER, &session.token);
        }
        request
            .send_json(body)
            .map_err(|e| request_error("POST", path, e))
    }

    fn find_one(
        &self,
        session: &Session,
        path: &str,
        collection: &str,
        query: &[(&str, &str)],
    ) -> StackResult<Option<Resource>> {
        let body = self.get(session, path, query)?;
        let items = body.get(collection).cloned().unwrap_or(Value::Null);
        let mut found: Vec<Resource> = serde_json::from_value(items).map_err(|e| {
            StackError::Identity(format!("unexpected {} listing: {}", collection, e))
        })?;
        if found.len() > 1 {
            return Err(StackError::Identity(format!(
                "{} {:?} is ambiguous: {} matches",
                collection,
                query,
                found.len()
            )));
        }
        Ok(found.pop())
    }

    fn create_one(
        &self,
        session: &Session,
        path: &str,
        member: &str,
        body: Value,
    ) -> StackResult<Resource> {
        let response = self.post(Some(session), path, json!({ member: body }))?;
        let mut value: Value = response.into_json().map_err(|e| body_error(path, e))?;
        let created = value.get_mut(member).map(Value::take).unwrap_or(Value::Null);
        serde_json::from_value(created)
            .map_err(|e| StackError::Identity(format!("unexpected {} body: {}", member, e)))
    }

    fn assignment_path(project_id: &str, user_id: &str, role_id: &str) -> String {
        format!("projects/{}/users/{}/roles/{}", project_id, user_id, role_id)
    }
}

impl IdentityApi for KeystoneClient {
    fn authenticate(&self, auth: &PasswordAuth) -> StackResult<Session> {
        let body = json!({
            "auth": {
                "identity": {
                    "methods": ["password"],
                    "password": {
                        "user": {
                            "name": auth.username,
                            "domain": { "id": auth.domain_id },
                            "password": auth.password,
                        }
                    }
                },
                "scope": {
                    "project": {
                        "name": auth.project,
                        "domain": { "id": auth.domain_id },
                    }
                }
            }
        });
        let response = self.post(None, "auth/tokens", body)?;
        let token = response
            .header(SUBJECT_TOKEN_HEADER)
            .map(str::to_string)
            .ok_or_else(|| StackError::Identity("token response without subject token".into()))?;
        let value: Value = response
            .into_json()
            .map_err(|e| body_error("auth/tokens", e))?;
        let user_id = value
            .pointer("/token/user/id")
            .and_then(Value::as_str)
            .ok_or_else(|| StackError::Identity("token response without user id".into()))?
            .to_string();

        Ok(Session { token, user_id })
    }

    fn find_project(
        &self,
        session: &Session,
        name: &str,
        domain_id: &str,
    ) -> StackResult<Option<Resource>> {
        self.find_one(
            session,
            "projects",
            "projects",
            &[("name", name), ("domain_id", domain_id)],
        )
    }

    fn create_project(
        &self,
        session: &Session,
        name: &str,
        domain_id: &str,
        description: &str,
    ) -> StackResult<Resource> {
        self.create_one(
            session,
            "projects",
            "project",
            json!({ "name": name, "domain_id": domain_id, "description": description }),
        )
    }

    fn find_role(&self, session: &Session, name: &str) -> StackResult<Option<Resource>> {
        self.find_one(session, "roles", "roles", &[("name", name)])
    }

    fn create_role(&self, session: &Session, name: &str) -> StackResult<Resource> {
        self.create_one(session, "roles", "role", json!({ "name": name }))
    }

    fn find_user(
        &self,
        session: &Session,
        name: &str,
        domain_id: &str,
    ) -> StackResult<Option<Resource>> {
        self.find_one(
            session,
            "users",
            "users",
            &[("name", name), ("domain_id", domain_id)],
        )
    }

    fn create_user(&self, session: &Session, user: &NewUser<'_>) -> StackResult<Resource> {
        self.create_one(
            session,
            "users",
            "user",
            json!({
                "name": user.name,
                "password": user.password,
                "domain_id": user.domain_id,
                "default_project_id": user.default_project_id,
                "enabled": true,
            }),
        )
    }

    fn has_role_assignment(
        &self,
        session: &Session,
        project_id: &str,
        user_id: &str,
        role_id: &str,
    ) -> StackResult<bool> {
        let path = Self::assignment_path(project_id, user_id, role_id);
        match self
            .agent
            .head(&self.url(&path))
            .set(AUTH_TOKEN_HEADER, &session.token)
            .call()
        {
            Ok(_) => Ok(true),
            Err(ureq::Error::Status(404, _)) => Ok(false),
            Err(e) => Err(request_error("HEAD", &path, e)),
        }
    }

    fn assign_role(
        &self,
        session: &Session,
        project_id: &str,
        user_id: &str,
        role_id: &str,
    ) -> StackResult<()> {
        let path = Self::assignment_path(project_id, user_id, role_id);
        self.agent
            .put(&self.url(&path))
            .set(AUTH_TOKEN_HEADER, &session.token)
            .call()
            .map_err(|e| request_error("PUT", &path, e))?;
        Ok(())
    }

    fn create_application_credential(
        &self,
        session: &Session,
        name: &str,
        secret: &str,
        description: &str,
    ) -> StackResult<IssuedCredential> {
        let path = format!("users/{}/application_credentials", session.user_id);
        let response = self.post(
            Some(session),
            &path,
            json!({
                "application_credential": {
                    "name": name,
                    "secret": secret,
                    "description": description,
                }
            }),
        )?;
        let mut value: Value = response.into_json().map_err(|e| body_error(&path, e))?;
        let issued = value
            .get_mut("application_credential")
            .map(Value::take)
            .unwrap_or(Value::Null);
        serde_json::from_value(issued).map_err(|e| {
            StackError::Identity(format!("unexpected application credential body: {}", e))
        })
    }
}

fn request_error(method: &str, path: &str, error: ureq::Error) -> StackError {
    match error {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            StackError::Identity(format!("{} {} returned {}: {}", method, path, code, body.trim()))
        }
        ureq::Error::Transport(t) => {
            StackError::Identity(format!("{} {} failed: {}", method, path, t))
        }
    }
}

fn body_error(path: &str, error: std::io::Error) -> StackError {
    StackError::Identity(format!("cannot decode response of {}: {}", path, error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tiny_http::{Header, Method, Request, Response, ResponseBox, Server};

    type Seen = Arc<Mutex<Vec<String>>>;

    /// Answer every request with `route` from a background thread and
    /// record it as `"<METHOD> <url>"`.
    fn serve<F>(route: F) -> (KeystoneClient, Seen)
    where
        F: Fn(&Request) -> ResponseBox + Send + 'static,
    {
        let server = Server::http("127.0.0.1:0").unwrap();
        let port = server.server_addr().to_ip().unwrap().port();
        let seen: Seen = Arc::default();
        let log = seen.clone();
        std::thread::spawn(move || {
            for request in server.incoming_requests() {
                let response = route(&request);
                log.lock()
                    .unwrap()
                    .push(format!("{} {}", request.method(), request.url()));
                let _ = request.respond(response);
            }
        });
        (KeystoneClient::new(&format!("http://127.0.0.1:{}/v3/", port)), seen)
    }

    fn json_response(status: u16, body: Value) -> ResponseBox {
        Response::from_string(body.to_string())
            .with_status_code(status)
            .boxed()
    }

    fn session() -> Session {
        Session {
            token: "admin-token".into(),
            user_id: "u-admin".into(),
        }
    }

    #[test]
    fn test_authenticate_reads_subject_token_and_user() {
        let (client, seen) = serve(|_| {
            Response::from_string(json!({ "token": { "user": { "id": "u-42" } } }).to_string())
                .with_status_code(201)
                .with_header(Header::from_bytes(SUBJECT_TOKEN_HEADER, "tok-1").unwrap())
                .boxed()
        });

        let session = client
            .authenticate(&PasswordAuth {
                username: "nova".into(),
                password: "pw".into(),
                project: "service".into(),
                domain_id: "default".into(),
            })
            .unwrap();
        assert_eq!(session.token, "tok-1");
        assert_eq!(session.user_id, "u-42");
        assert_eq!(*seen.lock().unwrap(), vec!["POST /v3/auth/tokens".to_string()]);
    }

    #[test]
    fn test_authenticate_without_subject_token_is_error() {
        let (client, _) =
            serve(|_| json_response(201, json!({ "token": { "user": { "id": "u" } } })));
        let err = client
            .authenticate(&PasswordAuth {
                username: "admin".into(),
                password: "admin".into(),
                project: "admin".into(),
                domain_id: "default".into(),
            })
            .err()
            .unwrap();
        assert!(matches!(err, StackError::Identity(_)));
    }

    #[test]
    fn test_role_assignment_lookup() {
        let (client, seen) = serve(|request| {
            assert_eq!(*request.method(), Method::Head);
            let status = if request.url().ends_with("/roles/r-granted") {
                204
            } else {
                404
            };
            Response::empty(status).boxed()
        });

        assert!(
            client
                .has_role_assignment(&session(), "p-1", "u-1", "r-granted")
                .unwrap()
        );
        assert!(
            !client
                .has_role_assignment(&session(), "p-1", "u-1", "r-other")
                .unwrap()
        );
        assert_eq!(
            seen.lock().unwrap()[0],
            "HEAD /v3/projects/p-1/users/u-1/roles/r-granted"
        );
    }

    #[test]
    fn test_listing_lookups() {
        let (client, seen) = serve(|request| {
            let url = request.url();
            if url.starts_with("/v3/users") {
                json_response(
                    200,
                    json!({ "users": [
                        { "id": "u-1", "name": "nova" },
                        { "id": "u-2", "name": "nova" },
                    ] }),
                )
            } else if url.starts_with("/v3/projects") {
                json_response(200, json!({ "projects": [{ "id": "p-1", "name": "service" }] }))
            } else {
                json_response(200, json!({ "roles": [] }))
            }
        });

        let err = client.find_user(&session(), "nova", "default").unwrap_err();
        assert!(matches!(err, StackError::Identity(ref m) if m.contains("ambiguous")));

        let project = client
            .find_project(&session(), "service", "default")
            .unwrap()
            .unwrap();
        assert_eq!(project.id, "p-1");

        assert_eq!(client.find_role(&session(), "service").unwrap(), None);

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], "GET /v3/users?name=nova&domain_id=default");
        assert_eq!(seen[2], "GET /v3/roles?name=service");
    }

    #[test]
    fn test_error_status_is_identity_error() {
        let (client, _) = serve(|_| {
            Response::from_string("Conflict occurred")
                .with_status_code(409)
                .boxed()
        });

        let err = client.create_role(&session(), "service").unwrap_err();
        match err {
            StackError::Identity(message) => {
                assert!(message.contains("409"), "{}", message);
                assert!(message.contains("Conflict occurred"), "{}", message);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_application_credential_is_created_for_session_user() {
        let (client, seen) = serve(|_| {
            json_response(
                201,
                json!({ "application_credential": {
                    "id": "ac-1",
                    "name": "nova-0011aabb",
                    "secret": "s3cret",
                } }),
            )
        });

        let issued = client
            .create_application_credential(&session(), "nova-0011aabb", "s3cret", "nova")
            .unwrap();
        assert_eq!(issued.id, "ac-1");
        assert_eq!(issued.secret, "s3cret");
        assert_eq!(
            seen.lock().unwrap()[0],
            "POST /v3/users/u-admin/application_credentials"
        );
    }

    #[test]
    fn test_readiness_check() {
        let (client, _) = serve(|_| Response::empty(401).boxed());
        assert!(client.is_reachable());
        assert!(!KeystoneClient::new("http://127.0.0.1:1/v3").is_reachable());
    }
}

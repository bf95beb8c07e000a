//! Credential Bootstrap Orchestrator.
//!
//! Establishes an administrator session, the shared service project and
//! role, then for each service its principal, role grant and application
//! credential. Every lookup-or-create is an explicit lookup followed by a
//! create only when absent, so re-running against a bootstrapped identity
//! service creates nothing new.

use stackinit_shared::errors::{StackError, StackResult};

use super::client::{IdentityApi, NewUser, PasswordAuth, Resource, Session};
use super::credentials::{ApplicationCredential, CredentialStore};
use crate::env::Environment;
use crate::runtime::constants::{identity, service_vars};

const PROJECT_DESCRIPTION: &str = "Service Project";

/// Progress of one bootstrap run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    Init,
    AdminSessionEstablished,
    ServiceProjectReady,
    ServiceRoleReady,
    Done,
}

/// Per-service progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrincipalState {
    PrincipalReady,
    RoleGranted,
    CredentialIssued,
    Persisted,
}

/// One service principal to provision.
#[derive(Clone)]
pub struct PrincipalRequest {
    pub service: String,
    pub password: String,
    /// Fixed credential secret; random when `None`.
    pub secret: Option<String>,
}

impl PrincipalRequest {
    /// `<SVC>_SERVICE_PASSWORD` (default: service name) and `<SVC>_APP_CRED_SECRET`.
    pub fn from_env(service: &str, env: &Environment) -> Self {
        Self {
            service: service.to_string(),
            password: env
                .service_var(service, service_vars::SERVICE_PASSWORD)
                .unwrap_or(service)
                .to_string(),
            secret: env
                .service_var(service, service_vars::APP_CRED_SECRET)
                .map(str::to_string),
        }
    }
}

#[derive(Clone)]
pub struct AdminCredentials {
    pub username: String,
    pub password: String,
    pub project: String,
}

impl AdminCredentials {
    pub fn new(password: &str) -> Self {
        Self {
            username: identity::ADMIN_USER.to_string(),
            password: password.to_string(),
            project: identity::ADMIN_PROJECT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrincipalOutcome {
    /// New credential issued and persisted.
    Issued { credential_id: String },
    /// A persisted record already existed; no credential was issued.
    Existing,
}

#[derive(Debug, Default)]
pub struct BootstrapReport {
    pub outcomes: Vec<(String, PrincipalOutcome)>,
    /// Services whose provisioning failed, with the reason.
    pub skipped: Vec<(String, String)>,
}

impl BootstrapReport {
    pub fn issued(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, PrincipalOutcome::Issued { .. }))
            .count()
    }
}

/// Unique per-run credential name: `<service>-<8 hex chars>`.
pub fn credential_name(service: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", service, &suffix[..8])
}

/// 256-bit random secret, hex encoded.
pub fn generate_secret() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}

pub struct CredentialBootstrap<'a, A: IdentityApi + ?Sized> {
    api: &'a A,
    store: &'a CredentialStore,
    admin: AdminCredentials,
    domain_id: String,
    state: BootstrapState,
}

impl<'a, A: IdentityApi + ?Sized> CredentialBootstrap<'a, A> {
    pub fn new(api: &'a A, store: &'a CredentialStore, admin: AdminCredentials) -> Self {
        Self {
            api,
            store,
            admin,
            domain_id: identity::DEFAULT_DOMAIN_ID.to_string(),
            state: BootstrapState::Init,
        }
    }

    pub fn state(&self) -> BootstrapState {
        self.state
    }

    fn advance(&mut self, next: BootstrapState) {
        tracing::debug!(from = ?self.state, to = ?next, "Credential bootstrap state");
        self.state = next;
    }

    /// Run the whole bootstrap.
    ///
    /// # Errors
    ///
    /// Failing to establish the administrator session, the service project
    /// or the service role is fatal. Per-service failures are reported in
    /// [`BootstrapReport::skipped`] instead.
    pub fn run(&mut self, principals: &[PrincipalRequest]) -> StackResult<BootstrapReport> {
        let admin = self
            .api
            .authenticate(&PasswordAuth {
                username: self.admin.username.clone(),
                password: self.admin.password.clone(),
                project: self.admin.project.clone(),
                domain_id: self.domain_id.clone(),
            })
            .map_err(|e| StackError::Identity(format!("administrative session: {}", e)))?;
        self.advance(BootstrapState::AdminSessionEstablished);

        let project = self
            .ensure_project(&admin)
            .map_err(|e| StackError::Identity(format!("service project: {}", e)))?;
        self.advance(BootstrapState::ServiceProjectReady);

        let role = self
            .ensure_role(&admin)
            .map_err(|e| StackError::Identity(format!("service role: {}", e)))?;
        self.advance(BootstrapState::ServiceRoleReady);

        let mut report = BootstrapReport::default();
        for request in principals {
            match self.provision(&admin, &project, &role, request) {
                Ok(outcome) => report.outcomes.push((request.service.clone(), outcome)),
                Err(e) => {
                    tracing::warn!(
                        service = %request.service,
                        error = %e,
                        "Credential provisioning failed, service will use password authentication"
                    );
                    report.skipped.push((request.service.clone(), e.to_string()));
                }
            }
        }

        self.advance(BootstrapState::Done);
        tracing::info!(
            issued = report.issued(),
            existing = report.outcomes.len() - report.issued(),
            skipped = report.skipped.len(),
            "Credential bootstrap complete"
        );
        Ok(report)
    }

    fn ensure_project(&self, admin: &Session) -> StackResult<Resource> {
        let name = identity::SERVICE_PROJECT;
        if let Some(project) = self.api.find_project(admin, name, &self.domain_id)? {
            tracing::debug!(project = %project.id, "Service project exists");
            return Ok(project);
        }
        let project = self
            .api
            .create_project(admin, name, &self.domain_id, PROJECT_DESCRIPTION)?;
        tracing::info!(project = %project.id, "Created service project");
        Ok(project)
    }

    fn ensure_role(&self, admin: &Session) -> StackResult<Resource> {
        let name = identity::SERVICE_ROLE;
        if let Some(role) = self.api.find_role(admin, name)? {
            return Ok(role);
        }
        let role = self.api.create_role(admin, name)?;
        tracing::info!(role = %role.id, "Created service role");
        Ok(role)
    }

    fn provision(
        &self,
        admin: &Session,
        project: &Resource,
        role: &Resource,
        request: &PrincipalRequest,
    ) -> StackResult<PrincipalOutcome> {
        let service = request.service.as_str();

        let user = match self.api.find_user(admin, service, &self.domain_id)? {
            Some(user) => user,
            None => {
                let user = self.api.create_user(
                    admin,
                    &NewUser {
                        name: service,
                        password: &request.password,
                        domain_id: &self.domain_id,
                        default_project_id: &project.id,
                    },
                )?;
                tracing::info!(service = %service, user = %user.id, "Created service principal");
                user
            }
        };
        log_progress(service, PrincipalState::PrincipalReady);

        if !self
            .api
            .has_role_assignment(admin, &project.id, &user.id, &role.id)?
        {
            self.api.assign_role(admin, &project.id, &user.id, &role.id)?;
            tracing::info!(service = %service, role = %role.name, "Granted service role");
        }
        log_progress(service, PrincipalState::RoleGranted);

        match self.store.load(service) {
            Ok(Some(existing)) => {
                tracing::info!(
                    service = %service,
                    credential = %existing.id,
                    "Application credential record exists, not issuing a new one"
                );
                return Ok(PrincipalOutcome::Existing);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    service = %service,
                    error = %e,
                    "Replacing unreadable credential record"
                );
            }
        }

        let session = self.api.authenticate(&PasswordAuth {
            username: service.to_string(),
            password: request.password.clone(),
            project: project.name.clone(),
            domain_id: self.domain_id.clone(),
        })?;
        let secret = request.secret.clone().unwrap_or_else(generate_secret);
        let issued = self.api.create_application_credential(
            &session,
            &credential_name(service),
            &secret,
            &format!("Service credential for {}", service),
        )?;
        log_progress(service, PrincipalState::CredentialIssued);

        let credential = ApplicationCredential::from(issued);
        self.store.save(service, &credential)?;
        log_progress(service, PrincipalState::Persisted);

        Ok(PrincipalOutcome::Issued {
            credential_id: credential.id,
        })
    }
}

fn log_progress(service: &str, state: PrincipalState) {
    tracing::debug!(service = %service, state = ?state, "Principal state");
}

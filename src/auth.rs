//! Roles, the permission table, and the request gate
//!
//! Route checks and in-service checks both read [`POLICY`]; there is no
//! other copy of who may do what.
use super::error::RecordError;
use super::types::labelled_enum;
use serde::Serialize;
use tracing::warn;

labelled_enum! {
    pub enum Role {
        SuperAdmin = (0, "SUPER_ADMIN"),
        Captain = (1, "CAPTAIN"),
        Secretary = (2, "SECRETARY"),
        Treasurer = (3, "TREASURER"),
        Kagawad = (4, "KAGAWAD"),
        HealthWorker = (5, "HEALTH_WORKER"),
        Staff = (6, "STAFF"),
    }
}

labelled_enum! {
    pub enum Module {
        Residents = (0, "RESIDENTS"),
        Households = (1, "HOUSEHOLDS"),
        Documents = (2, "DOCUMENTS"),
        Blotter = (3, "BLOTTER"),
        Budget = (4, "BUDGET"),
        Projects = (5, "PROJECTS"),
        Officials = (6, "OFFICIALS"),
        Health = (7, "HEALTH"),
        Disaster = (8, "DISASTER"),
        Reports = (9, "REPORTS"),
    }
}

labelled_enum! {
    pub enum Action {
        View = (0, "VIEW"),
        Create = (1, "CREATE"),
        Update = (2, "UPDATE"),
        Delete = (3, "DELETE"),
        Approve = (4, "APPROVE"),
        Export = (5, "EXPORT"),
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Grant {
    pub role: Role,
    pub module: Module,
    pub actions: &'static [Action],
}

const fn grant(role: Role, module: Module, actions: &'static [Action]) -> Grant {
    Grant {
        role,
        module,
        actions,
    }
}

use Action::{Approve, Create, Export, Update, View};

const READ: &[Action] = &[View];
const WRITE: &[Action] = &[View, Create, Update];
const WRITE_EXPORT: &[Action] = &[View, Create, Update, Export];
const READ_EXPORT: &[Action] = &[View, Export];

/// Who may do what. SUPER_ADMIN is not listed; it passes every check.
/// Hard deletes of residents and households are SUPER_ADMIN only.
pub const POLICY: &[Grant] = &[
    grant(Role::Captain, Module::Residents, WRITE_EXPORT),
    grant(Role::Captain, Module::Households, WRITE_EXPORT),
    grant(Role::Captain, Module::Documents, WRITE),
    grant(Role::Captain, Module::Blotter, WRITE),
    grant(Role::Captain, Module::Budget, &[View, Create, Update, Approve]),
    grant(Role::Captain, Module::Projects, WRITE),
    grant(Role::Captain, Module::Officials, WRITE),
    grant(Role::Captain, Module::Health, READ),
    grant(Role::Captain, Module::Disaster, WRITE_EXPORT),
    grant(Role::Captain, Module::Reports, READ_EXPORT),
    grant(Role::Secretary, Module::Residents, WRITE_EXPORT),
    grant(Role::Secretary, Module::Households, WRITE_EXPORT),
    grant(Role::Secretary, Module::Documents, WRITE),
    grant(Role::Secretary, Module::Blotter, WRITE),
    grant(Role::Secretary, Module::Officials, WRITE),
    grant(Role::Secretary, Module::Projects, READ),
    grant(Role::Secretary, Module::Disaster, WRITE_EXPORT),
    grant(Role::Secretary, Module::Reports, READ_EXPORT),
    grant(Role::Treasurer, Module::Budget, WRITE),
    grant(Role::Treasurer, Module::Projects, WRITE),
    grant(Role::Treasurer, Module::Documents, READ),
    grant(Role::Treasurer, Module::Residents, READ),
    grant(Role::Treasurer, Module::Reports, READ),
    grant(Role::Kagawad, Module::Residents, READ),
    grant(Role::Kagawad, Module::Households, READ),
    grant(Role::Kagawad, Module::Blotter, WRITE),
    grant(Role::Kagawad, Module::Projects, WRITE),
    grant(Role::Kagawad, Module::Disaster, WRITE),
    grant(Role::Kagawad, Module::Reports, READ),
    grant(Role::HealthWorker, Module::Health, WRITE),
    grant(Role::HealthWorker, Module::Residents, READ),
    grant(Role::HealthWorker, Module::Households, READ),
    grant(Role::HealthWorker, Module::Disaster, READ),
    grant(Role::HealthWorker, Module::Reports, READ),
    grant(Role::Staff, Module::Residents, &[View, Create]),
    grant(Role::Staff, Module::Households, &[View, Create]),
    grant(Role::Staff, Module::Documents, &[View, Create]),
    grant(Role::Staff, Module::Disaster, READ),
];

/// Route prefixes of the page and API surface.
const ROUTES: &[(&str, Module)] = &[
    ("/residents", Module::Residents),
    ("/households", Module::Households),
    ("/documents", Module::Documents),
    ("/blotter", Module::Blotter),
    ("/budget", Module::Budget),
    ("/projects", Module::Projects),
    ("/officials", Module::Officials),
    ("/health", Module::Health),
    ("/disaster", Module::Disaster),
    ("/reports", Module::Reports),
];

pub fn allowed(role: Role, module: Module, action: Action) -> bool {
    if role == Role::SuperAdmin {
        return true;
    }
    POLICY
        .iter()
        .any(|g| g.role == role && g.module == module && g.actions.contains(&action))
}

/// Page-level check: may `role` open anything under `path`?
/// The dashboard is open to every signed-in role; unknown paths deny.
pub fn allowed_path(role: Role, path: &str) -> bool {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let path = path.strip_prefix("/api").unwrap_or(path);
    if path == "/" || path == "/dashboard" {
        return true;
    }
    module_for_path(path).is_some_and(|module| allowed(role, module, Action::View))
}

pub fn module_for_path(path: &str) -> Option<Module> {
    ROUTES.iter().find_map(|(prefix, module)| {
        let rest = path.strip_prefix(prefix)?;
        (rest.is_empty() || rest.starts_with('/')).then_some(*module)
    })
}

/// The signed-in user as the identity provider describes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Actor {
    pub id: String,
    pub name: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: &str, name: &str, role: Role) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            role,
        }
    }
}

/// Session state of one request. An empty session is a signed-out caller.
#[derive(Debug, Clone, Default)]
pub struct Session(Option<Actor>);

impl Session {
    pub fn anonymous() -> Self {
        Self(None)
    }
    pub fn signed_in(actor: Actor) -> Self {
        Self(Some(actor))
    }
    pub fn actor(&self) -> Option<&Actor> {
        self.0.as_ref()
    }
}

impl From<Actor> for Session {
    fn from(actor: Actor) -> Self {
        Session::signed_in(actor)
    }
}

/// Source of the current actor. Sessions are issued elsewhere.
pub trait IdentityProvider {
    fn current_actor(&self) -> Option<Actor>;

    fn session(&self) -> Session {
        Session(self.current_actor())
    }
}

/// A fixed identity, used by the command line tool.
#[derive(Debug, Clone)]
pub struct StaticIdentity(pub Option<Actor>);

impl IdentityProvider for StaticIdentity {
    fn current_actor(&self) -> Option<Actor> {
        self.0.clone()
    }
}

/// Gate run before any handler logic. No session fails before the role check.
pub fn authorize(session: &Session, module: Module, action: Action) -> anyhow::Result<&Actor> {
    let Some(actor) = session.actor() else {
        warn!(module = %module, action = %action, "request without session");
        return Err(RecordError::Unauthenticated.into());
    };
    if !allowed(actor.role, module, action) {
        warn!(actor = %actor.id, role = %actor.role, module = %module, action = %action, "request denied");
        return Err(RecordError::Unauthorized {
            role: actor.role.as_str(),
            module: module.as_str(),
            action: action.as_str(),
        }
        .into());
    }
    Ok(actor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn super_admin_always_passes() {
        for module in Module::ALL {
            for action in Action::ALL {
                assert!(allowed(Role::SuperAdmin, *module, *action));
            }
        }
    }

    #[test]
    fn deletes_are_super_admin_only() {
        for role in Role::ALL.iter().filter(|r| **r != Role::SuperAdmin) {
            assert!(!allowed(*role, Module::Residents, Action::Delete));
            assert!(!allowed(*role, Module::Households, Action::Delete));
        }
    }

    #[test]
    fn only_captain_approves_budgets() {
        assert!(allowed(Role::Captain, Module::Budget, Action::Approve));
        assert!(!allowed(Role::Treasurer, Module::Budget, Action::Approve));
        assert!(allowed(Role::Treasurer, Module::Budget, Action::Create));
    }

    #[test]
    fn route_checks_use_the_same_table() {
        assert!(allowed_path(Role::HealthWorker, "/health/records/abc"));
        assert!(allowed_path(Role::HealthWorker, "/api/health?page=2"));
        assert!(!allowed_path(Role::HealthWorker, "/budget"));
        assert!(!allowed_path(Role::Staff, "/blotter"));
        assert!(!allowed_path(Role::Staff, "/healthcheck"));
        assert!(!allowed_path(Role::Captain, "/nowhere"));
        assert!(allowed_path(Role::Staff, "/dashboard"));
        assert!(allowed_path(Role::SuperAdmin, "/budget/2024"));
    }

    #[test]
    fn gate_checks_session_before_role() {
        let err = authorize(&Session::anonymous(), Module::Budget, Action::View).unwrap_err();
        assert!(matches!(
            RecordError::classify(&err),
            Some(RecordError::Unauthenticated)
        ));

        let staff = Session::signed_in(Actor::new("u1", "Ana", Role::Staff));
        let err = authorize(&staff, Module::Budget, Action::View).unwrap_err();
        assert_eq!(crate::error::status_code_of(&err), 403);

        let actor = authorize(&staff, Module::Residents, Action::Create).unwrap();
        assert_eq!(actor.id, "u1");
    }

    #[test]
    fn static_identity_yields_session() {
        let provider = StaticIdentity(Some(Actor::new("u2", "Ben", Role::Kagawad)));
        assert_eq!(provider.session().actor().map(|a| a.role), Some(Role::Kagawad));
        assert!(StaticIdentity(None).session().actor().is_none());
    }
}

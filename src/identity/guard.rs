//! Role-gated access to dashboard pages.
//!
//! A guard is evaluated against every session state the resolver publishes. It tells the
//! caller whether to wait, render (and whether to load the page's data now) or navigate away.

use serde::Serialize;

use super::principal::Role;
use super::session::SessionState;
use crate::notify::Notice;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Page {
    Customers,
    CustomerDetail,
    Staff,
}

impl Page {
    pub fn permits(&self, role: Option<&Role>) -> bool {
        match (self, role) {
            (_, None) => false,
            (Page::Staff, Some(r)) => r.is_admin(),
            (Page::Customers | Page::CustomerDetail, Some(r)) => r.is_staff(),
        }
    }

    /// Where a principal lacking the role is sent.
    pub fn denied_redirect(&self) -> Redirect {
        match self {
            Page::Staff => Redirect::Back,
            Page::Customers | Page::CustomerDetail => Redirect::SignIn,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Page::Customers => "customers",
            Page::CustomerDetail => "customer_detail",
            Page::Staff => "staff",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Redirect {
    SignIn,
    /// Previous page in navigation history.
    Back,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Session still resolving; do nothing yet.
    Pending,
    /// Render. `fetch` is set once per transition into the satisfied state.
    Allow { fetch: bool },
    Redirect { to: Redirect, notice: Notice },
}

impl GuardDecision {
    pub fn is_allowed(&self) -> bool { matches!(self, GuardDecision::Allow { .. }) }
}

#[derive(Debug, Clone)]
pub struct RouteGuard {
    page: Page,
    satisfied_for: Option<String>,
}

impl RouteGuard {
    pub fn new(page: Page) -> Self { Self { page, satisfied_for: None } }

    pub fn page(&self) -> Page { self.page }

    pub fn evaluate(&mut self, state: &SessionState) -> GuardDecision {
        if state.loading {
            return GuardDecision::Pending;
        }
        let decision = self.decide(state);
        if !decision.is_allowed() {
            self.satisfied_for = None;
        }
        decision
    }

    fn decide(&mut self, state: &SessionState) -> GuardDecision {
        if let Some(err) = &state.error {
            return GuardDecision::Redirect {
                to: Redirect::SignIn,
                notice: Notice::error("Authentication Error", err.message()),
            };
        }
        let Some(principal) = &state.principal else {
            return GuardDecision::Redirect {
                to: Redirect::SignIn,
                notice: Notice::error("User not logged in", "Login to access this page"),
            };
        };
        if !self.page.permits(state.role.as_ref()) {
            return GuardDecision::Redirect {
                to: self.page.denied_redirect(),
                notice: Notice::error("Access Denied", "You do not have permission to view this page."),
            };
        }
        // Token refreshes republish the same principal; those are not new transitions.
        let fetch = self.satisfied_for.as_deref() != Some(principal.uid.as_str());
        self.satisfied_for = Some(principal.uid.clone());
        GuardDecision::Allow { fetch }
    }
}

/// What the signed-in role may do once past the guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Capabilities {
    pub view_customers: bool,
    pub create_customers: bool,
    pub modify_customers: bool,
    pub manage_staff: bool,
}

impl Capabilities {
    pub fn none() -> Self { Self::default() }

    pub fn for_role(role: Option<&Role>) -> Self {
        match role {
            Some(Role::Admin) => Self { view_customers: true, create_customers: true, modify_customers: true, manage_staff: true },
            Some(Role::User) => Self { view_customers: true, create_customers: true, ..Self::none() },
            Some(Role::Unrecognized(_)) | None => Self::none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::identity::Principal;
    use crate::notify::NoticeLevel;

    fn signed_in(uid: &str, role: Option<&str>) -> SessionState {
        SessionState::resolved(Principal { uid: uid.into(), ..Default::default() }, role.map(Role::from))
    }

    #[test]
    fn unknown_tags_are_denied_everywhere() {
        for tag in ["viewer", "Admin", "", "root", "superuser"] {
            let s = signed_in("u", Some(tag));
            for page in [Page::Customers, Page::CustomerDetail, Page::Staff] {
                assert!(!RouteGuard::new(page).evaluate(&s).is_allowed(), "{tag} on {page:?}");
            }
        }
    }

    #[test]
    fn staff_page_is_admin_only() {
        let mut guard = RouteGuard::new(Page::Staff);
        match guard.evaluate(&signed_in("u", Some("user"))) {
            GuardDecision::Redirect { to, notice } => {
                assert_eq!(to, Redirect::Back);
                assert_eq!(notice.title, "Access Denied");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(guard.evaluate(&signed_in("a", Some("admin"))), GuardDecision::Allow { fetch: true });
    }

    #[test]
    fn no_role_record_is_denied() {
        let mut guard = RouteGuard::new(Page::Customers);
        match guard.evaluate(&signed_in("u", None)) {
            GuardDecision::Redirect { to, .. } => assert_eq!(to, Redirect::SignIn),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn loading_is_pending_and_keeps_latch() {
        let mut guard = RouteGuard::new(Page::Customers);
        assert_eq!(guard.evaluate(&SessionState::default()), GuardDecision::Pending);
        assert_eq!(guard.evaluate(&signed_in("u", Some("user"))), GuardDecision::Allow { fetch: true });
        assert_eq!(guard.evaluate(&SessionState::resolving(Principal { uid: "u".into(), ..Default::default() })), GuardDecision::Pending);
        assert_eq!(guard.evaluate(&signed_in("u", Some("user"))), GuardDecision::Allow { fetch: false });
        assert_eq!(guard.evaluate(&signed_in("other", Some("admin"))), GuardDecision::Allow { fetch: true });
    }

    #[test]
    fn sign_out_then_in_fetches_again() {
        let mut guard = RouteGuard::new(Page::Customers);
        assert!(matches!(guard.evaluate(&signed_in("u", Some("admin"))), GuardDecision::Allow { fetch: true }));
        match guard.evaluate(&SessionState::signed_out()) {
            GuardDecision::Redirect { to, notice } => {
                assert_eq!(to, Redirect::SignIn);
                assert_eq!(notice.title, "User not logged in");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(guard.evaluate(&signed_in("u", Some("admin"))), GuardDecision::Allow { fetch: true });
    }

    #[test]
    fn error_redirects_with_message() {
        let s = SessionState::failed(Principal::default(), AppError::transport("connect_failed", "store unreachable"));
        match RouteGuard::new(Page::Customers).evaluate(&s) {
            GuardDecision::Redirect { to, notice } => {
                assert_eq!(to, Redirect::SignIn);
                assert_eq!(notice.level, NoticeLevel::Error);
                assert_eq!(notice.description.as_deref(), Some("store unreachable"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn capabilities_follow_role() {
        assert!(Capabilities::for_role(Some(&Role::Admin)).manage_staff);
        let user = Capabilities::for_role(Some(&Role::User));
        assert!(user.view_customers && user.create_customers);
        assert!(!user.modify_customers && !user.manage_staff);
        assert_eq!(Capabilities::for_role(Some(&Role::from("x"))), Capabilities::none());
        assert_eq!(Capabilities::for_role(None), Capabilities::none());
    }
}

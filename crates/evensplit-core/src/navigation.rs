//! Session-gated navigation.
//!
//! The visible navigation tree is a pure function of the session: signed
//! out users see the unauthenticated flow, signed in users the main flow.
//! Crossing between flows throws away all history of the flow being left.

use thiserror::Error;
use tracing::debug;

use crate::auth::{AuthState, SessionWatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Unauthenticated,
    Authenticated,
}

impl Flow {
    pub fn for_state(state: AuthState) -> Self {
        match state {
            AuthState::Anonymous => Flow::Unauthenticated,
            AuthState::Authenticated => Flow::Authenticated,
        }
    }

    /// First screen shown when entering the flow
    pub fn root(&self) -> Route {
        match self {
            Flow::Unauthenticated => Route::Login,
            Flow::Authenticated => Route::Home,
        }
    }
}

/// Every screen, tagged by the flow it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    // Unauthenticated
    Landing,
    Login,
    SignUp,
    // Authenticated
    Home,
    CreateGroup,
    GroupDetails,
    AddExpense,
    SelectMembers,
    SettleUp,
    ExpenseSummary,
    Invitations,
    Profile,
    EditProfile,
}

impl Route {
    pub fn flow(&self) -> Flow {
        match self {
            Route::Landing | Route::Login | Route::SignUp => Flow::Unauthenticated,
            _ => Flow::Authenticated,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Route::Landing => "Welcome",
            Route::Login => "Login",
            Route::SignUp => "Sign Up",
            Route::Home => "Home",
            Route::CreateGroup => "Create Group",
            Route::GroupDetails => "Group Details",
            Route::AddExpense => "Add Expense",
            Route::SelectMembers => "Select Members",
            Route::SettleUp => "Settle Up",
            Route::ExpenseSummary => "Summary",
            Route::Invitations => "Invitations",
            Route::Profile => "Profile",
            Route::EditProfile => "Edit Information",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NavigationError {
    #[error("{route:?} belongs to the {route_flow:?} flow, but {active:?} is active")]
    WrongFlow {
        route: Route,
        route_flow: Flow,
        active: Flow,
    },
}

/// Navigation state for the active flow.
pub struct Navigator {
    watch: SessionWatch,
    flow: Flow,
    history: Vec<Route>,
}

impl Navigator {
    pub fn new(mut watch: SessionWatch) -> Self {
        let flow = Flow::for_state(watch.mark_seen());
        Self {
            watch,
            flow,
            history: vec![flow.root()],
        }
    }

    pub fn flow(&self) -> Flow {
        self.flow
    }

    pub fn current(&self) -> Route {
        self.history.last().copied().unwrap_or_else(|| self.flow.root())
    }

    pub fn history(&self) -> &[Route] {
        &self.history
    }

    /// Re-evaluate the flow against the session.
    /// Returns `true` if the flow switched (and history was discarded).
    pub fn sync(&mut self) -> bool {
        let flow = Flow::for_state(self.watch.mark_seen());
        if flow == self.flow {
            return false;
        }
        debug!(from = ?self.flow, to = ?flow, "Switching navigation flow");
        self.flow = flow;
        self.history.clear();
        self.history.push(flow.root());
        true
    }

    pub fn push(&mut self, route: Route) -> Result<(), NavigationError> {
        self.sync();
        if route.flow() != self.flow {
            return Err(NavigationError::WrongFlow {
                route,
                route_flow: route.flow(),
                active: self.flow,
            });
        }
        self.history.push(route);
        Ok(())
    }

    /// Go back one screen. The flow's root is never popped.
    pub fn pop(&mut self) -> Option<Route> {
        self.sync();
        if self.history.len() <= 1 {
            return None;
        }
        self.history.pop()
    }

    /// Wait for the session to change, then sync. Returns the active flow,
    /// or `None` once the session store is gone.
    pub async fn wait_for_change(&mut self) -> Option<Flow> {
        self.watch.changed().await?;
        self.sync();
        Some(self.flow)
    }
}

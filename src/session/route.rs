use super::{AuthState, AuthStatus};

/// Top-level screen for the current auth state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Splash,
    Login,
    ProfileSetup,
    Main,
}

impl Route {
    pub fn decide(state: &AuthState) -> Route {
        match state.status {
            AuthStatus::Uninitialized | AuthStatus::Initializing => Route::Splash,
            _ => match (&state.session, &state.profile) {
                (None, _) => Route::Login,
                (Some(_), Some(p)) if p.has_completed_setup => Route::Main,
                (Some(_), _) => Route::ProfileSetup,
            },
        }
    }
}

//! Bearer-token authentication and the per-request actor
//!
//! The middleware resolves `Authorization: Bearer <token>` to a user, attaches
//! that user's membre profile (if any) and stores the resulting [`Actor`] in
//! the request extensions. Handlers read it with `Extension<Actor>`.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use chantiers_common::api::{lookup_token, parse_bearer, ApiAuthError};
use chantiers_common::domain::{can, Action, ActorRole};
use tracing::{debug, warn};

use crate::db::membres::{self, Profile};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Authenticated caller of a request
#[derive(Debug, Clone)]
pub struct Actor {
    pub user_id: i64,
    pub username: String,
    pub is_staff: bool,
    /// Active membre profile linked to the user
    pub membre: Option<Profile>,
}

impl Actor {
    pub fn role(&self) -> ActorRole {
        if self.is_staff {
            ActorRole::Staff
        } else {
            match self.membre {
                Some(profile) => ActorRole::Membre(profile.role),
                None => ActorRole::Guest,
            }
        }
    }

    pub fn membre_id(&self) -> Option<i64> {
        self.membre.map(|p| p.id)
    }

    pub fn allows(&self, action: Action) -> bool {
        can(self.role(), action)
    }

    /// Capability check; 403 when the role may not perform `action`
    pub fn require(&self, action: Action) -> ApiResult<()> {
        if self.allows(action) {
            Ok(())
        } else {
            warn!(
                "Denied {} to user {} ({:?})",
                action.as_str(),
                self.username,
                self.role()
            );
            Err(ApiError::Forbidden(format!(
                "Your role may not perform {}",
                action.as_str()
            )))
        }
    }

    /// Capability check that also passes for the chef of the chantier concerned
    pub fn require_or_chef(&self, action: Action, chantier_chef: Option<i64>) -> ApiResult<()> {
        if chantier_chef == Some(self.user_id) {
            return Ok(());
        }
        self.require(action)
    }

    /// Capability check restricted to staff or the chantier's own chef
    pub fn require_owner(&self, action: Action, chantier_chef: Option<i64>) -> ApiResult<()> {
        self.require(action)?;
        if self.is_staff || chantier_chef == Some(self.user_id) {
            Ok(())
        } else {
            warn!("Denied {} to user {}: not the chantier chef", action.as_str(), self.username);
            Err(ApiError::Forbidden(
                "Only the chantier chef or staff may do this".to_string(),
            ))
        }
    }
}

fn auth_error(err: ApiAuthError) -> ApiError {
    match err {
        ApiAuthError::DatabaseError(msg) => ApiError::Internal(msg),
        other => ApiError::Unauthorized(other.to_string()),
    }
}

/// Authentication middleware
///
/// Returns 401 for a missing, malformed or unknown token. Applied to the
/// `/api/v1` routes only.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    let token = {
        let header = request
            .headers()
            .get(AUTHORIZATION)
            .ok_or(ApiAuthError::MissingHeader)
            .and_then(|value| value.to_str().map_err(|_| ApiAuthError::MalformedHeader))
            .map_err(auth_error)?;
        parse_bearer(header).map_err(auth_error)?.to_string()
    };

    let identity = lookup_token(&state.db, &token).await.map_err(auth_error)?;
    let membre = membres::profile_for_user(&state.db, identity.user_id).await?;
    debug!("Authenticated {} (membre {:?})", identity.username, membre);

    request.extensions_mut().insert(Actor {
        user_id: identity.user_id,
        username: identity.username,
        is_staff: identity.is_staff,
        membre,
    });

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chantiers_common::domain::RoleMembre;

    fn actor(is_staff: bool, role: Option<RoleMembre>) -> Actor {
        Actor {
            user_id: 7,
            username: "test".to_string(),
            is_staff,
            membre: role.map(|role| Profile { id: 3, role }),
        }
    }

    #[test]
    fn test_role_resolution() {
        assert_eq!(actor(true, Some(RoleMembre::Ouvrier)).role(), ActorRole::Staff);
        assert_eq!(
            actor(false, Some(RoleMembre::Chef)).role(),
            ActorRole::Membre(RoleMembre::Chef)
        );
        assert_eq!(actor(false, None).role(), ActorRole::Guest);
    }

    #[test]
    fn test_require_or_chef_passes_for_own_chantier() {
        let ouvrier = actor(false, Some(RoleMembre::Ouvrier));
        assert!(ouvrier.require(Action::ValidateHours).is_err());
        assert!(ouvrier.require_or_chef(Action::ValidateHours, Some(7)).is_ok());
        assert!(ouvrier.require_or_chef(Action::ValidateHours, Some(8)).is_err());
    }

    #[test]
    fn test_require_owner_needs_capability_and_ownership() {
        let chef = actor(false, Some(RoleMembre::Chef));
        assert!(chef.require_owner(Action::ModifyChantier, Some(7)).is_ok());
        assert!(matches!(
            chef.require_owner(Action::ModifyChantier, Some(99)),
            Err(ApiError::Forbidden(_))
        ));
        assert!(actor(true, None).require_owner(Action::ModifyChantier, None).is_ok());
        assert!(actor(false, Some(RoleMembre::Ouvrier))
            .require_owner(Action::ModifyChantier, Some(7))
            .is_err());
    }
}

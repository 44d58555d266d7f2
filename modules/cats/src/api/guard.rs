//! Role-based access for the cats API.
//!
//! Callers present their roles in the `x-roles` header (comma separated).
//! Handlers and controllers declare the roles they need as `Vec<Role>`
//! metadata under [`ROLES`]; handler metadata overrides the controller's.

use std::str::FromStr;

use serde::Serialize;
use wirekit::{async_trait, Args, ExecutionContext, Guard, Injectable};

pub const ROLES: &str = "roles";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Read,
    Write,
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "read" => Ok(Role::Read),
            "write" => Ok(Role::Write),
            _ => Err(()),
        }
    }
}

/// The caller, put into the request state by [`RolesGuard`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub roles: Vec<Role>,
}

impl Principal {
    fn from_header(value: Option<&str>) -> Self {
        let roles = value
            .unwrap_or_default()
            .split(',')
            .filter_map(|r| r.parse().ok())
            .collect();
        Self { roles }
    }

    pub fn has_any(&self, required: &[Role]) -> bool {
        required.iter().any(|r| self.roles.contains(r))
    }
}

pub struct RolesGuard;

impl Injectable for RolesGuard {
    fn construct(_: &mut Args) -> anyhow::Result<Self> {
        Ok(Self)
    }
}

#[async_trait]
impl Guard for RolesGuard {
    async fn can_activate(&self, ctx: &mut ExecutionContext) -> anyhow::Result<bool> {
        let principal = Principal::from_header(ctx.request().header("x-roles"));
        let required = ctx.reflector().get_all_and_override::<Vec<Role>>(ROLES);
        let allowed = match &required {
            Some(required) => principal.has_any(required),
            None => true,
        };
        if !allowed {
            tracing::debug!(?principal, ?required, "Missing role");
        }
        ctx.state_mut().insert(principal);
        Ok(allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roles_are_parsed_leniently() {
        let principal = Principal::from_header(Some("read, WRITE ,admin"));
        assert_eq!(principal.roles, vec![Role::Read, Role::Write]);
        assert!(Principal::from_header(None).roles.is_empty());
    }

    #[test]
    fn any_required_role_is_enough() {
        let reader = Principal {
            roles: vec![Role::Read],
        };
        assert!(reader.has_any(&[Role::Read, Role::Write]));
        assert!(!reader.has_any(&[Role::Write]));
        assert!(!reader.has_any(&[]));
    }
}

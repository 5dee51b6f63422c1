//! Request identity and precondition headers.

use super::WebError;
use crate::audit::{ActorContext, Role};
use crate::record::VersionToken;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;

pub const USER_NAME_HEADER: &str = "x-user-name";
pub const USER_ROLES_HEADER: &str = "x-user-roles";
pub const USER_EMAIL_HEADER: &str = "x-user-email";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, WebError> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|v| Some(v.trim()).filter(|v| !v.is_empty()))
            .map_err(|_| WebError::input(format!("header '{name}' is not valid text"))),
    }
}

/// The acting user, read from `X-User-Name`, `X-User-Roles` (comma separated)
/// and `X-User-Email`. A request without a name is anonymous.
#[derive(Debug, Clone)]
pub struct Actor(pub ActorContext);

impl Actor {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, WebError> {
        let Some(name) = header(headers, USER_NAME_HEADER)? else {
            return Ok(Self(ActorContext::anonymous()));
        };

        let mut actor = ActorContext::user(name);
        if let Some(roles) = header(headers, USER_ROLES_HEADER)? {
            for role in roles.split(',').map(str::trim).filter(|r| !r.is_empty()) {
                actor = actor.with_role(role.parse::<Role>().map_err(WebError::Input)?);
            }
        }
        if let Some(email) = header(headers, USER_EMAIL_HEADER)? {
            actor = actor.with_email(email);
        }
        Ok(Self(actor))
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = WebError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers)
    }
}

/// Row version from an `If-Match` header, when present.
#[derive(Debug, Clone, Copy, Default)]
pub struct IfMatch(pub Option<VersionToken>);

impl IfMatch {
    /// The body's token wins over the header. One of them is required.
    pub fn resolve(self, from_body: Option<VersionToken>) -> Result<VersionToken, WebError> {
        from_body
            .or(self.0)
            .ok_or_else(|| WebError::input("row_version (or an If-Match header) is required"))
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for IfMatch {
    type Rejection = WebError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match header(&parts.headers, "if-match")? {
            None => Ok(Self(None)),
            Some(raw) => raw.parse().map(|t| Self(Some(t))).map_err(WebError::Input),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn headers_build_the_actor() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_NAME_HEADER, HeaderValue::from_static("jsmith"));
        headers.insert(USER_ROLES_HEADER, HeaderValue::from_static("Staff, supervisor"));
        headers.insert(USER_EMAIL_HEADER, HeaderValue::from_static("jsmith@gym.ca"));

        let Actor(actor) = Actor::from_headers(&headers).unwrap();
        assert_eq!(actor.name(), "jsmith");
        assert!(actor.is_in_role(Role::Staff));
        assert!(actor.is_in_role(Role::Supervisor));
        assert!(!actor.is_in_role(Role::Admin));
        assert_eq!(actor.email(), Some("jsmith@gym.ca"));
    }

    #[test]
    fn missing_name_is_anonymous_and_bad_roles_are_rejected() {
        let Actor(actor) = Actor::from_headers(&HeaderMap::new()).unwrap();
        assert!(!actor.is_authenticated());

        let mut headers = HeaderMap::new();
        headers.insert(USER_NAME_HEADER, HeaderValue::from_static("x"));
        headers.insert(USER_ROLES_HEADER, HeaderValue::from_static("Janitor"));
        assert!(Actor::from_headers(&headers).is_err());
    }

    #[test]
    fn body_token_wins_over_if_match() {
        let header: VersionToken = "\"00000000000000aa\"".parse().unwrap();
        let body: VersionToken = "00000000000000bb".parse().unwrap();
        assert_eq!(IfMatch(Some(header)).resolve(Some(body)).unwrap(), body);
        assert_eq!(IfMatch(Some(header)).resolve(None).unwrap(), header);
        assert!(IfMatch(None).resolve(None).is_err());
    }
}

//! Caller identity extractor.
//!
//! The HTTP surface is stateless: callers identify themselves per request.
//! - `X-Palaver-User: <id>` (optionally `X-Palaver-Role: user|admin`) for
//!   authenticated principals supplied by a fronting application
//! - `X-Palaver-Client: <token>` for anonymous clients holding a token
//!
//! A request with neither gets a freshly minted ephemeral client token,
//! returned to the caller in the SSE `session` event.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use palaver_types::chat::{ChatIdentity, ChatSession};
use palaver_types::error::ChatError;
use palaver_types::usage::UserRole;

use crate::http::error::AppError;

pub const USER_HEADER: &str = "x-palaver-user";
pub const ROLE_HEADER: &str = "x-palaver-role";
pub const CLIENT_HEADER: &str = "x-palaver-client";

/// Who is calling, as declared by request headers.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSession {
    pub user_id: Option<String>,
    pub client_token: String,
    pub role: UserRole,
    /// The client token was minted for this request only.
    pub ephemeral: bool,
}

impl RequestSession {
    pub fn identity(&self) -> ChatIdentity {
        match &self.user_id {
            Some(user_id) => ChatIdentity::User(user_id.clone()),
            None => ChatIdentity::Client(self.client_token.clone()),
        }
    }

    /// Session for one bot. The client token is kept alongside the user id.
    pub fn chat_session(&self, bot_id: &str) -> Result<ChatSession, ChatError> {
        ChatSession::new(
            self.client_token.clone(),
            self.user_id.clone(),
            Some(self.client_token.clone()),
            bot_id,
        )
    }

    fn from_headers(parts: &Parts) -> Result<Self, AppError> {
        let header = |name: &str| -> Result<Option<String>, AppError> {
            match parts.headers.get(name) {
                Some(value) => {
                    let value = value
                        .to_str()
                        .map_err(|_| AppError::Validation(format!("invalid {name} header encoding")))?
                        .trim();
                    Ok((!value.is_empty()).then(|| value.to_string()))
                }
                None => Ok(None),
            }
        };

        let user_id = header(USER_HEADER)?;
        let role = match header(ROLE_HEADER)? {
            Some(role) => role.parse::<UserRole>().map_err(AppError::Validation)?,
            None if user_id.is_some() => UserRole::User,
            None => UserRole::Anonymous,
        };
        if user_id.is_none() && role != UserRole::Anonymous {
            return Err(AppError::Validation(format!(
                "{ROLE_HEADER} requires {USER_HEADER}"
            )));
        }

        let (client_token, ephemeral) = match header(CLIENT_HEADER)? {
            Some(token) => (token, false),
            None => (uuid::Uuid::new_v4().simple().to_string(), true),
        };

        Ok(Self {
            user_id,
            client_token,
            role,
            ephemeral,
        })
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequestSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_headers(parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/api/v1/history");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_anonymous_without_headers_is_ephemeral() {
        let first = RequestSession::from_headers(&parts(&[])).unwrap();
        let second = RequestSession::from_headers(&parts(&[])).unwrap();
        assert!(first.ephemeral);
        assert_eq!(first.role, UserRole::Anonymous);
        assert_eq!(first.client_token.len(), 32);
        assert_ne!(first.client_token, second.client_token);
        assert_eq!(first.identity(), ChatIdentity::Client(first.client_token.clone()));
    }

    #[test]
    fn test_client_header_is_reused() {
        let session = RequestSession::from_headers(&parts(&[(CLIENT_HEADER, "tok-1")])).unwrap();
        assert!(!session.ephemeral);
        assert_eq!(session.identity(), ChatIdentity::Client("tok-1".to_string()));
    }

    #[test]
    fn test_user_wins_and_defaults_to_user_role() {
        let session = RequestSession::from_headers(&parts(&[
            (USER_HEADER, "u1"),
            (CLIENT_HEADER, "tok-1"),
        ]))
        .unwrap();
        assert_eq!(session.role, UserRole::User);
        assert_eq!(session.identity(), ChatIdentity::User("u1".to_string()));

        let chat = session.chat_session("helper").unwrap();
        assert_eq!(chat.identity, ChatIdentity::User("u1".to_string()));
        assert_eq!(chat.session_token, "tok-1");
    }

    #[test]
    fn test_role_validation() {
        let admin = RequestSession::from_headers(&parts(&[
            (USER_HEADER, "u1"),
            (ROLE_HEADER, "admin"),
        ]))
        .unwrap();
        assert_eq!(admin.role, UserRole::Admin);

        assert!(RequestSession::from_headers(&parts(&[(ROLE_HEADER, "admin")])).is_err());
        assert!(
            RequestSession::from_headers(&parts(&[(USER_HEADER, "u1"), (ROLE_HEADER, "root")]))
                .is_err()
        );
    }
}

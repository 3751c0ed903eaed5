//! Delegated OAuth2 login and bearer token enforcement.

mod gateway;
mod middleware;
mod token;

pub use gateway::{
    generate_state, oauth_routes, AuthorizationRequest, OAuthGateway, TokenBundle, TokenResponse,
    UserInfo,
};
pub use middleware::{BearerAuthLayer, BearerAuthService, RequestContext};
pub use token::{mint_token, validate_token, BearerToken, Identity, TOKEN_TTL_SECS};

pub mod client;
pub mod models;
pub mod user_api;

pub use client::{auth_headers, ApiClient, ApiClientError, ApiResponse};
pub use models::{
    AccessLevel, ApiFailure, AuthenticatedUser, CreatedUser, FailureCode, FieldFailure, NewUser,
    ProfileEdit, RegeneratedToken, UserList, UserRecord,
};
pub use user_api::{ApiResult, HttpUserApi, UserApi};

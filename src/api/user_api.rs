use crate::api::client::{auth_headers, ApiClient, ApiClientError, ApiResponse};
use crate::api::models::{NewUser, ProfileEdit};
use async_trait::async_trait;
use std::collections::HashMap;

pub type ApiResult = Result<ApiResponse, ApiClientError>;

/// One method per user endpoint of the remote API.
///
/// Every method hands back the raw response; views decide what each status
/// code means for them.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait UserApi: Send + Sync {
    /// `POST /user/create`
    async fn create_user(&self, user: &NewUser) -> ApiResult;
    /// `POST /user/authenticate`
    async fn authenticate(&self, email: &str, password: &str) -> ApiResult;
    /// `POST /user/verify/{pk}`
    async fn verify(&self, pk: i64, code: &str) -> ApiResult;
    /// `GET /user/{pk}`
    async fn get_user(&self, pk: i64, token: &str) -> ApiResult;
    /// `POST /user/regenerateToken/{pk}`
    async fn regenerate_token(&self, pk: i64, password: &str) -> ApiResult;
    /// `POST /user/edit`
    async fn edit_user(&self, token: &str, edit: &ProfileEdit) -> ApiResult;
    /// `POST /user/changePassword`
    async fn change_password(&self, token: &str, old_password: &str, new_password: &str)
        -> ApiResult;
    /// `GET /user/list/`
    async fn list_users(&self, token: &str) -> ApiResult;
}

pub struct HttpUserApi {
    client: ApiClient,
}

impl HttpUserApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }
}

fn form<'a>(pairs: &[(&'a str, &'a str)]) -> HashMap<&'a str, &'a str> {
    pairs.iter().copied().collect()
}

#[async_trait]
impl UserApi for HttpUserApi {
    async fn create_user(&self, user: &NewUser) -> ApiResult {
        self.client.post("/user/create", Some(user), None).await
    }

    async fn authenticate(&self, email: &str, password: &str) -> ApiResult {
        let data = form(&[("email", email), ("password", password)]);
        self.client
            .post("/user/authenticate", Some(&data), None)
            .await
    }

    async fn verify(&self, pk: i64, code: &str) -> ApiResult {
        let data = form(&[("code", code)]);
        self.client
            .post(&format!("/user/verify/{}", pk), Some(&data), None)
            .await
    }

    async fn get_user(&self, pk: i64, token: &str) -> ApiResult {
        let headers = auth_headers(token)?;
        self.client
            .get(&format!("/user/{}", pk), Some(&headers))
            .await
    }

    async fn regenerate_token(&self, pk: i64, password: &str) -> ApiResult {
        let data = form(&[("password", password)]);
        self.client
            .post(&format!("/user/regenerateToken/{}", pk), Some(&data), None)
            .await
    }

    async fn edit_user(&self, token: &str, edit: &ProfileEdit) -> ApiResult {
        let headers = auth_headers(token)?;
        self.client
            .post("/user/edit", Some(edit), Some(&headers))
            .await
    }

    async fn change_password(
        &self,
        token: &str,
        old_password: &str,
        new_password: &str,
    ) -> ApiResult {
        let headers = auth_headers(token)?;
        let data = form(&[("oldPassword", old_password), ("newPassword", new_password)]);
        self.client
            .post("/user/changePassword", Some(&data), Some(&headers))
            .await
    }

    async fn list_users(&self, token: &str) -> ApiResult {
        let headers = auth_headers(token)?;
        self.client.get("/user/list/", Some(&headers)).await
    }
}

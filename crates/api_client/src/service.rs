//! Request construction for UpCloud API resources

use crate::client::Client;
use reqwest::{Method, RequestBuilder};
use serde::Serialize;
use types::{BuilderError, Result};

/// Handle used by provisioning steps to talk to the API.
///
/// Every method only prepares a request; callers decide when to send it.
#[derive(Debug, Clone)]
pub struct Service {
    client: Client,
}

#[derive(Debug, Serialize)]
struct TemplatizeRequest<'a> {
    storage: TemplatizeStorage<'a>,
}

#[derive(Debug, Serialize)]
struct TemplatizeStorage<'a> {
    title: &'a str,
}

impl Service {
    /// Create a new service around an authenticated client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Underlying client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Authenticated request for `path`, relative to the API base URL
    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self
            .client
            .base_url()
            .join(path.trim_start_matches('/'))
            .map_err(|e| BuilderError::Client(format!("invalid API path {:?}: {}", path, e)))?;

        Ok(self
            .client
            .http()
            .request(method, url)
            .basic_auth(self.client.username(), Some(self.client.password())))
    }

    /// Account details, useful for checking credentials
    pub fn get_account(&self) -> Result<RequestBuilder> {
        self.request(Method::GET, "account")
    }

    /// Details of a single storage
    pub fn get_storage_details(&self, storage_uuid: &str) -> Result<RequestBuilder> {
        self.request(Method::GET, &format!("storage/{}", storage_uuid))
    }

    /// Turn a storage into a template named `title`
    pub fn templatize_storage(&self, storage_uuid: &str, title: &str) -> Result<RequestBuilder> {
        let body = TemplatizeRequest {
            storage: TemplatizeStorage { title },
        };

        Ok(self
            .request(Method::POST, &format!("storage/{}/templatize", storage_uuid))?
            .json(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::AUTHORIZATION;

    fn service() -> Service {
        Service::new(Client::new("api-user", "secret").unwrap())
    }

    #[test]
    fn test_request_is_authenticated() {
        let request = service().get_account().unwrap().build().unwrap();

        assert_eq!(request.method(), &Method::GET);
        assert_eq!(request.url().as_str(), "https://api.upcloud.com/1.3/account");

        let auth = request.headers().get(AUTHORIZATION).unwrap();
        assert!(auth.to_str().unwrap().starts_with("Basic "));
    }

    #[test]
    fn test_independent_services_share_credentials() {
        let first = service().get_account().unwrap().build().unwrap();
        let second = service().get_account().unwrap().build().unwrap();

        assert_eq!(
            first.headers().get(AUTHORIZATION),
            second.headers().get(AUTHORIZATION)
        );
    }

    #[test]
    fn test_storage_details_path() {
        let request = service()
            .get_storage_details("01000000-0000-4000-8000-000030080200")
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(
            request.url().path(),
            "/1.3/storage/01000000-0000-4000-8000-000030080200"
        );
    }

    #[test]
    fn test_templatize_body() {
        let request = service()
            .templatize_storage("01000000-0000-4000-8000-000030080200", "ubuntu-20240309-140507")
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(request.method(), &Method::POST);
        assert!(request.url().path().ends_with("/templatize"));

        let body = request.body().and_then(|b| b.as_bytes()).unwrap();
        let json: serde_json::Value = serde_json::from_slice(body).unwrap();
        assert_eq!(json["storage"]["title"], "ubuntu-20240309-140507");
    }

    #[test]
    fn test_leading_slash_is_relative_to_base() {
        let request = service()
            .request(Method::GET, "/zone")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(request.url().as_str(), "https://api.upcloud.com/1.3/zone");
    }
}

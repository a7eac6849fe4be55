// Read/write seam shared by the live session and test doubles.

use std::future::Future;

use serde_json::Value;

use crate::error::Error;
use crate::response::ApicResponse;
use crate::session::Session;

/// The two calls the object model needs from a controller.
///
/// Implemented by [`Session`]; `acikit-core` provides an in-memory fake.
pub trait ApicClient: Send + Sync {
    /// GET a relative URL (`/api/...`), fully paginated.
    fn get(&self, url: &str) -> impl Future<Output = Result<ApicResponse, Error>> + Send;

    /// POST a nested managed-object document.
    fn push_to_apic(
        &self,
        url: &str,
        data: &Value,
    ) -> impl Future<Output = Result<ApicResponse, Error>> + Send;
}

impl ApicClient for Session {
    async fn get(&self, url: &str) -> Result<ApicResponse, Error> {
        Session::get(self, url).await
    }

    async fn push_to_apic(&self, url: &str, data: &Value) -> Result<ApicResponse, Error> {
        Session::push_to_apic(self, url, data).await
    }
}

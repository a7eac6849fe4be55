// Controller response envelope.
//
// Every read answers `{ "totalCount": "N", "imdata": [ {class: {...}}, ... ] }`,
// subscribing reads add `subscriptionId`, and failures put a single
// `{"error": {"attributes": {"code", "text"}}}` item in `imdata`.

use serde_json::{Value, json};

use crate::error::Error;

/// Parsed controller response (pages already merged by the session).
#[derive(Debug, Clone, PartialEq)]
pub struct ApicResponse {
    /// HTTP status of the (first) response.
    pub status: u16,
    /// Managed-object items, each shaped `{className: {attributes, children?}}`.
    pub imdata: Vec<Value>,
    /// `totalCount` as declared by the controller.
    pub total_count: usize,
    /// Present when the request subscribed (`subscription=yes`).
    pub subscription_id: Option<String>,
}

impl ApicResponse {
    /// Build from a successful body.
    pub fn from_body(status: u16, body: &Value) -> Result<Self, Error> {
        let imdata = match &body["imdata"] {
            Value::Array(items) => items.clone(),
            Value::Null => Vec::new(),
            other => {
                return Err(Error::Deserialization {
                    message: "imdata is not an array".into(),
                    body: other.to_string(),
                });
            }
        };
        let total_count = count_field(&body["totalCount"]).unwrap_or(imdata.len());
        let subscription_id = match &body["subscriptionId"] {
            Value::String(id) => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        };
        Ok(Self {
            status,
            imdata,
            total_count,
            subscription_id,
        })
    }

    /// Shape used by the fake controller and by tests.
    pub fn from_items(imdata: Vec<Value>) -> Self {
        Self {
            status: 200,
            total_count: imdata.len(),
            imdata,
            subscription_id: None,
        }
    }

    /// Merged JSON view: `{ "totalCount": "N", "imdata": [...] }`.
    pub fn json(&self) -> Value {
        let mut body = json!({
            "totalCount": self.total_count.to_string(),
            "imdata": self.imdata,
        });
        if let Some(id) = &self.subscription_id {
            body["subscriptionId"] = Value::String(id.clone());
        }
        body
    }

    pub fn is_empty(&self) -> bool {
        self.imdata.is_empty()
    }
}

fn count_field(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
        _ => None,
    }
}

/// Turn a failed response body into [`Error::Controller`].
///
/// Bodies without the structured error item keep their raw text.
pub(crate) fn controller_error(status: u16, body: &str) -> Error {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let attributes = parsed.as_ref().and_then(|v| {
        v["imdata"]
            .as_array()
            .and_then(|items| items.first())
            .map(|item| &item["error"]["attributes"])
            .filter(|attrs| attrs.is_object())
    });

    match attributes {
        Some(attrs) => Error::Controller {
            status,
            code: attrs["code"].as_str().unwrap_or_default().to_owned(),
            text: attrs["text"].as_str().unwrap_or_default().to_owned(),
        },
        None => Error::Controller {
            status,
            code: String::new(),
            text: body.chars().take(200).collect(),
        },
    }
}

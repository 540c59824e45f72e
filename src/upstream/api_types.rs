//! Serde types for the upstream RPC envelope, plus the format detector
//! that folds the legacy response shapes into one internal page type.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::UpstreamError;

// ============================================================================
// Request envelope
// ============================================================================

/// Positional paging parameter, the second element of `params`.
#[derive(Debug, Clone, Serialize)]
pub struct PagingParam {
  pub paging: Paging,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub orderings: Option<Vec<Ordering>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Paging {
  pub firstresult: usize,
  pub maxresults: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Ordering {
  pub field: String,
  pub direction: String,
}

/// Full request body: `{method, params: [filters, {paging, orderings?}], id}`.
#[derive(Debug, Serialize)]
pub struct RpcRequest {
  pub method: String,
  pub params: (Vec<Value>, PagingParam),
  pub id: u64,
}

impl RpcRequest {
  pub fn new(method: &str, filters: &[Value], first_result: usize, page_size: usize, id: u64) -> Self {
    Self {
      method: method.to_string(),
      params: (
        filters.to_vec(),
        PagingParam {
          paging: Paging {
            firstresult: first_result,
            maxresults: page_size,
          },
          orderings: None,
        },
      ),
      id,
    }
  }
}

// ============================================================================
// Response envelope
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RpcResponse {
  pub result: Option<Value>,
  pub error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
pub struct RpcError {
  #[serde(default)]
  pub code: i64,
  #[serde(default)]
  pub message: String,
}

/// Canonical page shape inside `result`.
#[derive(Debug, Deserialize)]
struct RawPage {
  rows: Vec<Value>,
  #[serde(default)]
  count: Option<u64>,
  #[serde(default)]
  next_start: Option<u64>,
  #[serde(default)]
  more_items_in_collection: Option<bool>,
}

/// One normalized page of upstream rows.
#[derive(Debug, Clone)]
pub struct Page {
  pub rows: Vec<Value>,
  /// Total collection size, when the upstream reports it.
  pub count: Option<u64>,
  pub next_start: Option<u64>,
  pub more: Option<bool>,
}

impl Page {
  /// Normalize a `result` payload into a page.
  ///
  /// The service has accumulated shapes over the years:
  /// - canonical: `{rows, count, start, limit, next_start, more_items_in_collection}`
  /// - bare array: `[...]`
  /// - `{success: true, data: [...]}`
  /// - `{response: [...]}`
  ///
  /// Everything is detected here, before any business logic sees the rows.
  pub fn from_result(result: Value) -> Result<Self, UpstreamError> {
    if let Value::Array(rows) = result {
      return Ok(Self::bare(rows));
    }

    if let Ok(raw) = serde_json::from_value::<RawPage>(result.clone()) {
      return Ok(Self {
        rows: raw.rows,
        count: raw.count,
        next_start: raw.next_start,
        more: raw.more_items_in_collection,
      });
    }

    if let Some(Value::Array(rows)) = result.get("data") {
      return Ok(Self::bare(rows.clone()));
    }

    if let Some(Value::Array(rows)) = result.get("response") {
      return Ok(Self::bare(rows.clone()));
    }

    Err(UpstreamError::InvalidResponse(format!(
      "unrecognized result shape: {}",
      summarize(&result)
    )))
  }

  fn bare(rows: Vec<Value>) -> Self {
    Self {
      rows,
      count: None,
      next_start: None,
      more: None,
    }
  }
}

/// Short description of a value for error messages, without dumping payloads
/// into the log.
fn summarize(value: &Value) -> String {
  match value {
    Value::Object(map) => {
      let keys: Vec<&str> = map.keys().map(String::as_str).take(8).collect();
      format!("object with keys [{}]", keys.join(", "))
    }
    Value::Array(a) => format!("array of {} items", a.len()),
    other => format!("{:?}", other),
  }
}

//! The non-binary response envelope: `{code, msg, data}` with HTTP 200 for
//! both success and business errors (§6). `AppError::into_response` builds
//! the error half; this module builds the success half.

use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

/// The success code paired with every `2xx` envelope. Error codes are all
/// in the `2005xx`/`2004xx` ranges (§7); `200000` is the unused low end of
/// that space, picked as the success sentinel since spec.md does not name
/// one explicitly (see DESIGN.md Open Question).
pub const SUCCESS_CODE: u32 = 200000;

pub fn ok<T: Serialize>(data: T) -> Json<Value> {
    Json(json!({
        "code": SUCCESS_CODE,
        "msg": "success",
        "data": data,
    }))
}

#![allow(missing_docs)]

use serde_json::json;
use shared::{ErrorResponse, SuccessResponse};

#[test]
pub fn success_shape() {
    let response = SuccessResponse::new(
        "backup_2024-01-01_00-00-00.json".to_string(),
        "2024-01-01T00:00:00+00:00".to_string(),
        42,
    );

    let value = serde_json::to_value(&response).unwrap();
    assert_eq!(value["success"], json!(true));
    assert_eq!(value["filename"], json!("backup_2024-01-01_00-00-00.json"));
    assert_eq!(value["timestamp"], json!("2024-01-01T00:00:00+00:00"));
    assert_eq!(value["size"], json!(42));
    assert!(value["message"].is_string());
}

#[test]
pub fn error_shape() {
    let value = serde_json::to_value(ErrorResponse::new("Access denied.")).unwrap();
    assert_eq!(value, json!({ "error": "Access denied." }));
}

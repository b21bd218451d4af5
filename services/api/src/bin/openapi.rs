//! services/api/src/bin/openapi.rs
//!
//! Dumps the REST API's OpenAPI 3.0 document to `openapi.json`, for client
//! generation and docs hosting outside the running server.

use api_lib::web::rest::ApiDoc;
use utoipa::OpenApi;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = "openapi.json";
    std::fs::write(path, ApiDoc::openapi().to_pretty_json()?)?;
    println!("OpenAPI document written to {path}");
    Ok(())
}

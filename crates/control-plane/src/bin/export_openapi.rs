// Export the OpenAPI document as JSON
//
// Usage: cargo run --bin export-openapi > docs/api/openapi.json
//
// Generates the document without starting the API server.

use placecrawl_control_plane::openapi::ApiDoc;

fn main() -> anyhow::Result<()> {
    println!("{}", ApiDoc::to_json()?);
    Ok(())
}
